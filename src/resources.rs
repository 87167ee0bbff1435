use std::fs::{create_dir_all, File};
use std::io::{Error as IOError, Write};
use std::path::Path;

/// Writes the default settings file unless one already exists.
/// Returns whether a file was written.
pub fn write_settings_json<P: AsRef<Path>>(path: P) -> Result<bool, IOError> {
  let path = path.as_ref();
  if path.exists() {
    return Ok(false);
  }
  if let Some(p) = path.parent() {
    if !p.as_os_str().is_empty() && !p.exists() {
      create_dir_all(p)?;
    }
  }
  File::create(path)?.write_all(SETTINGS_JSON.as_bytes())?;
  Ok(true)
}

pub const SETTINGS_JSON: &str = r#"{
  "libraryName" : "UnitexNet",
  "libraryDir" : ".",
  "canUnloadSymbol" : "DllCanUnloadNow"
}
"#;
