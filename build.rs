/// Tauri build script
/// Runs at compile time before the main application is built
/// - Injects app identity from the Cargo manifest into Rust code
/// - Processes tauri.conf.json configuration
fn main() {
    println!("cargo:rerun-if-changed=tauri.conf.json");

    let name = std::env::var("CARGO_PKG_NAME").unwrap_or_else(|_| "resume-shell".to_string());
    let version = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

    // Normalize name for file system use (lowercase, alphanumeric + hyphens only)
    let app_id = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect::<String>();

    println!("cargo:rustc-env=APP_NAME={}", name);
    println!("cargo:rustc-env=APP_VERSION={}", version);
    println!("cargo:rustc-env=APP_ID={}", app_id);

    tauri_build::build()
}
