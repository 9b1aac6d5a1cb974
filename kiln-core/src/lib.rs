// kiln-core/src/lib.rs

pub mod build;
pub mod check;
pub mod install;
pub mod uninstall;

pub use build::Toolchain;
pub use check::{verify, verify_default};
pub use install::{install, install_and_verify, InstallOptions};
pub use uninstall::uninstall;
