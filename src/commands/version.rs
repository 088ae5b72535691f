//! Command: print version information.

/// Version stamped at build time, or the crate version.
#[must_use]
pub fn version() -> &'static str {
    option_env!("ASFYAML_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the asfyaml version to stdout.
pub fn run() {
    println!("asfyaml {}", version());
}
