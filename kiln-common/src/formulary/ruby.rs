// kiln-common/src/formulary/ruby.rs
// Reads the declarative stanzas of a Homebrew formula. Only top-level
// metadata, `depends_on` and the first `system "#{bin}/…"` call of the `test`
// block are understood; everything else in the file is ignored.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::dependency::Dependency;
use crate::error::{KilnError, Result};
use crate::model::checksum::Checksum;
use crate::model::formula::{FormulaDescriptor, SmokeTestSpec};

static CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*class\s+([A-Z][A-Za-z0-9]*)\s*<\s*Formula\b").unwrap());
static STANZA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*(desc|homepage|url|sha256|version|mirror)\s+"((?:[^"\\]|\\.)*)""#).unwrap()
});
static LICENSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*license\s+(.+)$").unwrap());
static DEPENDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*depends_on\s+"([^"]+)"(?:\s*=>\s*(.+))?"#).unwrap());
static TEST_SYSTEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r##"^\s*system\s+"#\{bin\}/([^"]+)"(.*)$"##).unwrap());
static QUOTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).unwrap());
static OPENS_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\bdo(?:\s*\|[^|]*\|)?\s*$)|(?:^\s*(?:def|if|unless|case|begin|class|module)\b)")
        .unwrap()
});
static END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*end\b").unwrap());
static TEST_BLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*test\s+do\s*$").unwrap());

#[derive(Default)]
struct RawFormula {
    class_name: Option<String>,
    desc: Option<String>,
    homepage: Option<String>,
    url: Option<String>,
    sha256: Option<String>,
    version: Option<String>,
    license: Option<String>,
    mirrors: Vec<String>,
    dependencies: Vec<Dependency>,
    test: Option<SmokeTestSpec>,
}

/// Parses a Homebrew-style formula. `name_hint` (normally the file stem) takes
/// precedence over the name derived from the class.
pub fn parse_formula(source: &str, name_hint: Option<&str>) -> Result<FormulaDescriptor> {
    let raw = scan(source);

    let name = name_hint
        .map(str::to_string)
        .or_else(|| raw.class_name.as_deref().map(class_to_formula_name))
        .ok_or_else(|| KilnError::Descriptor("Formula has no class definition".to_string()))?;

    let missing = |field: &str| KilnError::Descriptor(format!("Formula '{name}' has no {field} stanza"));
    let sha256 = raw.sha256.ok_or_else(|| missing("sha256"))?;

    let descriptor = FormulaDescriptor {
        description: raw.desc.unwrap_or_default(),
        homepage_url: raw.homepage.ok_or_else(|| missing("homepage"))?,
        source_url: raw.url.ok_or_else(|| missing("url"))?,
        checksum: Checksum::sha256(&sha256)?,
        license: raw.license.ok_or_else(|| missing("license"))?,
        build_dependencies: raw.dependencies,
        version: raw.version,
        mirrors: raw.mirrors,
        test: raw.test.unwrap_or_default(),
        name,
    };
    debug!(
        "Parsed Ruby formula '{}' with {} dependencies",
        descriptor.name,
        descriptor.build_dependencies.len()
    );
    Ok(descriptor)
}

fn scan(source: &str) -> RawFormula {
    let mut raw = RawFormula::default();
    // 0 = file level, 1 = class body, deeper = nested blocks.
    let mut depth = 0usize;
    let mut test_depth: Option<usize> = None;

    for line in source.lines() {
        let code = strip_comment(line);
        if code.trim().is_empty() {
            continue;
        }

        if END_RE.is_match(code) {
            if test_depth == Some(depth) {
                test_depth = None;
            }
            depth = depth.saturating_sub(1);
            continue;
        }

        if depth == 0 {
            if let Some(caps) = CLASS_RE.captures(code) {
                raw.class_name = Some(caps[1].to_string());
                depth = 1;
            }
            continue;
        }

        if depth == 1 {
            if TEST_BLOCK_RE.is_match(code) {
                depth += 1;
                test_depth = Some(depth);
                continue;
            }
            parse_class_level(code, &mut raw);
        } else if test_depth.is_some() && raw.test.is_none() {
            if let Some(caps) = TEST_SYSTEM_RE.captures(code) {
                let args = QUOTED_RE
                    .captures_iter(&caps[2])
                    .map(|c| unescape(&c[1]))
                    .collect();
                raw.test = Some(SmokeTestSpec {
                    executable: Some(caps[1].to_string()),
                    args,
                });
            }
        }

        if OPENS_BLOCK_RE.is_match(code) {
            depth += 1;
        }
    }
    raw
}

fn parse_class_level(code: &str, raw: &mut RawFormula) {
    if let Some(caps) = STANZA_RE.captures(code) {
        let value = unescape(&caps[2]);
        match &caps[1] {
            "desc" => raw.desc = Some(value),
            "homepage" => raw.homepage = Some(value),
            "url" => raw.url = Some(value),
            "sha256" => raw.sha256 = Some(value),
            "version" => raw.version = Some(value),
            "mirror" => raw.mirrors.push(value),
            _ => {}
        }
    } else if let Some(caps) = LICENSE_RE.captures(code) {
        let expr = &caps[1];
        let ids: Vec<String> = QUOTED_RE.captures_iter(expr).map(|c| unescape(&c[1])).collect();
        if !ids.is_empty() {
            let joiner = if expr.contains("all_of") { " AND " } else { " OR " };
            raw.license = Some(ids.join(joiner));
        }
    } else if let Some(caps) = DEPENDS_RE.captures(code) {
        let name = caps[1].to_string();
        match caps.get(2).map(|m| m.as_str()) {
            Some(tags) if tags.contains(":build") => raw.dependencies.push(Dependency::new_build(name)),
            Some(tags) if tags.contains(":test") => {
                debug!("Skipping test-only dependency '{name}'");
            }
            _ => raw.dependencies.push(Dependency::new_runtime(name)),
        }
    }
}

fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            '\\' if in_string => escaped = !escaped,
            '"' if !escaped => in_string = !in_string,
            '#' if !in_string => return &line[..i],
            _ => escaped = false,
        }
        if c != '\\' {
            escaped = false;
        }
    }
    line
}

fn unescape(s: &str) -> String {
    s.replace("\\\"", "\"").replace("\\\\", "\\")
}

/// `Leadr` -> `leadr`, `RipgrepAll` -> `ripgrep-all`, `PythonAT311` -> `python@311`.
fn class_to_formula_name(class: &str) -> String {
    let class = class.replace("AT", "@");
    let mut out = String::with_capacity(class.len() + 4);
    for (i, c) in class.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('@') {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
