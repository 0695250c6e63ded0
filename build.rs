use std::env;
use std::fs;
use std::path::Path;

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let version_path = Path::new(&out_dir).join("framework_version.rs");

    // Read the framework version from Cargo.toml metadata
    let cargo_manifest = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR is set by cargo");
    let cargo_toml_path = Path::new(&cargo_manifest).join("Cargo.toml");
    let cargo_toml_content = fs::read_to_string(&cargo_toml_path)
        .expect("Failed to read Cargo.toml");

    let cargo_toml: toml::Value = cargo_toml_content.parse()
        .expect("Failed to parse Cargo.toml");

    let framework_version = cargo_toml
        .get("package")
        .and_then(|p| p.get("metadata"))
        .and_then(|m| m.get("plughost"))
        .and_then(|g| g.get("framework_version"))
        .and_then(|v| v.as_str())
        .expect("Failed to find package.metadata.plughost.framework_version in Cargo.toml");

    let version_content = format!(
        "// Generated from package.metadata.plughost.framework_version in Cargo.toml\n\
         pub const FRAMEWORK_VERSION: &str = {:?};\n",
        framework_version
    );

    fs::write(&version_path, version_content)
        .expect("Failed to write framework_version.rs");

    println!("cargo:rerun-if-changed=Cargo.toml");
}
