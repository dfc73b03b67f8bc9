// build.rs
// Compiles the renderer's GLSL sources to SPIR-V when a Vulkan SDK is available.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_EXTENSIONS: [&str; 2] = ["vert", "frag"];

/// Returns true when `source` is newer than `output` or `output` is missing.
fn is_stale(source: &Path, output: &Path) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|meta| meta.modified()).ok();
    match (modified(source), modified(output)) {
        (Some(src), Some(dst)) => src > dst,
        _ => true,
    }
}

fn compile_shader(glslc: &Path, source: &Path, output: &Path) {
    let status = Command::new(glslc)
        .arg("--target-env=vulkan1.3")
        .arg(source)
        .arg("-o")
        .arg(output)
        .status();

    match status {
        Ok(s) if s.success() => eprintln!("info: Compiled {} -> {}", source.display(), output.display()),
        Ok(s) => panic!("glslc failed for {} with exit code {}", source.display(), s.code().unwrap_or(-1)),
        Err(e) => panic!("failed to execute glslc for {}: {e}", source.display()),
    }
}

fn main() {
    println!("cargo:rerun-if-changed=../../resources/shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var_os("SKIP_SHADERS").is_some() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Some(vulkan_sdk) = env::var_os("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        PathBuf::from(&vulkan_sdk).join("Bin").join("glslc.exe")
    } else {
        PathBuf::from(&vulkan_sdk).join("bin").join("glslc")
    };
    if !glslc.exists() {
        eprintln!("warning: glslc not found at {}, shader compilation skipped", glslc.display());
        return;
    }

    let shader_dir = PathBuf::from("../../resources/shaders");
    let target_dir = PathBuf::from("../../target/shaders");
    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        eprintln!("warning: Failed to create {}: {e}", target_dir.display());
        return;
    }

    let Ok(entries) = std::fs::read_dir(&shader_dir) else {
        eprintln!("info: No shader directory found at {}", shader_dir.display());
        return;
    };

    let mut compiled = 0;
    for path in entries.filter_map(Result::ok).map(|entry| entry.path()) {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            continue;
        };
        if !SHADER_EXTENSIONS.contains(&ext) {
            continue;
        }

        // default.vert -> default.vert.spv, so stages of one material never collide
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let mut output_name = file_name.to_os_string();
        output_name.push(".spv");
        let output = target_dir.join(output_name);

        // Every stage includes common.glsl
        if is_stale(&path, &output) || is_stale(&shader_dir.join("common.glsl"), &output) {
            compile_shader(&glslc, &path, &output);
            compiled += 1;
        }
    }

    eprintln!("info: {compiled} shader(s) compiled");
}
