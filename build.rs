//! Build script: on macOS, compiles a tiny Objective-C shim exposing the
//! AVFoundation microphone authorization check as plain C functions, the same
//! pattern production Tauri dictation apps in the wild use to avoid pulling in a
//! full Objective-C binding crate for a two-method surface.

fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "macos" {
        return;
    }

    println!("cargo:rerun-if-changed=src/audio/macos_mic_auth.m");
    cc::Build::new()
        .file("src/audio/macos_mic_auth.m")
        .flag("-fobjc-arc")
        .compile("dictation_core_mic_auth");

    println!("cargo:rustc-link-lib=framework=AVFoundation");
    println!("cargo:rustc-link-lib=framework=Foundation");
}
