//! Builds the shared-library fixtures used by `tests/system_library.rs`:
//! `stub/live` exports `DllCanUnloadNow` returning 1, `stub/idle` returning 0.
//! Skipped with a warning when no C compiler is available or on Windows.
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const FIXTURE: &str = "tests/fixtures/can_unload_now.c";

fn main() {
  println!("cargo:rerun-if-changed=build.rs");
  println!("cargo:rerun-if-changed={}", FIXTURE);

  if env::var("CARGO_CFG_TARGET_FAMILY").unwrap_or_default() != "unix" {
    return;
  }
  let out_dir = match env::var_os("OUT_DIR") {
    Some(dir) => PathBuf::from(dir),
    None => return,
  };
  let stub_dir = out_dir.join("stub");
  let file_name = stub_file_name();
  for (name, result) in &[("live", 1), ("idle", 0)] {
    if let Err(err) = compile_stub(&stub_dir.join(name), &file_name, *result) {
      println!("cargo:warning=skipping {} stub library: {}", name, err);
      return;
    }
  }
  println!("cargo:rustc-env=UNITEXLOADER_STUB_DIR={}", stub_dir.display());
}

fn stub_file_name() -> String {
  let os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
  let ext = if os == "macos" || os == "ios" { "dylib" } else { "so" };
  let suffix = if env::var("CARGO_CFG_TARGET_POINTER_WIDTH").as_deref() == Ok("64") {
    "64"
  } else {
    ""
  };
  format!("UnitexNet{}.{}", suffix, ext)
}

fn compile_stub(dir: &Path, file_name: &str, result: i32) -> Result<(), String> {
  fs::create_dir_all(dir).map_err(|e| e.to_string())?;
  let compiler = cc::Build::new()
    .cargo_metadata(false)
    .try_get_compiler()
    .map_err(|e| e.to_string())?;
  let status = compiler
    .to_command()
    .arg("-shared")
    .arg("-fPIC")
    .arg(format!("-DCAN_UNLOAD_NOW_RESULT={}", result))
    .arg("-o")
    .arg(dir.join(file_name))
    .arg(FIXTURE)
    .status()
    .map_err(|e| e.to_string())?;
  if status.success() {
    Ok(())
  } else {
    Err(format!("compiler exited with {}", status))
  }
}
