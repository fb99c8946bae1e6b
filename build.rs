use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    // Embed the manifest that makes the process per-monitor DPI aware, so
    // screen coordinates are physical pixels
    let _ = embed_resource::compile("delta-buyer.rc", embed_resource::NONE);
    println!("cargo:rerun-if-changed=delta-buyer.rc");
    println!("cargo:rerun-if-changed=delta-buyer.manifest");

    // Copy templates and config next to the executable
    let target_dir = target_dir();
    copy_templates(&target_dir);
    copy_config(&target_dir);
}

/// target/release (or target/debug), derived from OUT_DIR.
fn target_dir() -> PathBuf {
    let out_dir = env::var("OUT_DIR").unwrap();
    // OUT_DIR is something like target/release/build/delta-buyer-xxx/out
    Path::new(&out_dir)
        .ancestors()
        .nth(3) // Go up 3 levels: out -> hash -> build -> release
        .expect("Could not find target directory")
        .to_path_buf()
}

/// Copies the template folder (digit glyphs, coin icon) to the target directory.
fn copy_templates(target_dir: &Path) {
    let template_src = Path::new("resources/template");
    let template_dst = target_dir.join("resources").join("template");

    if template_src.exists() {
        copy_dir_recursive(template_src, &template_dst);
        // Tell Cargo to re-run if templates change
        println!("cargo:rerun-if-changed=resources/template/");
    }
}

/// Recursively copies a directory and its contents.
fn copy_dir_recursive(src: &Path, dst: &Path) {
    let _ = fs::create_dir_all(dst);

    if let Ok(entries) = fs::read_dir(src) {
        for entry in entries.flatten() {
            let src_path = entry.path();
            let dst_path = dst.join(entry.file_name());

            if src_path.is_dir() {
                copy_dir_recursive(&src_path, &dst_path);
            } else {
                let _ = fs::copy(&src_path, &dst_path);
            }
        }
    }
}

/// Copies config.json to the target directory unless one is already there,
/// so a tuned config survives rebuilds.
fn copy_config(target_dir: &Path) {
    let config_src = Path::new("config.json");
    let config_dst = target_dir.join("config.json");

    if config_src.exists() && !config_dst.exists() {
        let _ = fs::copy(config_src, &config_dst);
    }
    println!("cargo:rerun-if-changed=config.json");
}
