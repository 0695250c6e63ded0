//! Framework Version
//!
//! The plugin API version the host exposes, read at build time from
//! `package.metadata.plughost.framework_version` in Cargo.toml. Manifests
//! declare a `framework.version` constraint against it.

include!(concat!(env!("OUT_DIR"), "/framework_version.rs"));

/// The host framework version
pub fn framework_version() -> &'static str {
    FRAMEWORK_VERSION
}
