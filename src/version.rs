// Build-time identity from Cargo.toml, used by the CLI and the startup log line.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const NAME: &str = env!("CARGO_PKG_NAME");
