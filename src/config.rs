use std::env::consts::DLL_EXTENSION;
use std::env::current_exe;
use std::fs::File;
use std::io::{BufReader, Error as IOError, Read};
use std::mem::size_of;
use std::path::{Path, PathBuf};

use serde_json::{error::Error as SerdeError, Value};
use thiserror::Error;

pub const DEFAULT_LIBRARY_NAME: &str = "UnitexNet";
pub const DEFAULT_CAN_UNLOAD_SYMBOL: &str = "DllCanUnloadNow";

const LIBRARY_NAME_KEY: &str = "libraryName";
const LIBRARY_DIR_KEY: &str = "libraryDir";
const CAN_UNLOAD_SYMBOL_KEY: &str = "canUnloadSymbol";

#[derive(Error, Debug)]
pub enum ConfigErr {
  #[error("{self:?}")]
  IOError(#[from] IOError),
  #[error("{self:?}")]
  SerdeError(#[from] SerdeError),
  #[error("could not find the directory of the running executable")]
  NoExecutableDirErr,
  #[error("`{0}` must be a string in setting file")]
  InvalidSettingErr(&'static str),
}

/// Word size of the running process, used to pick between the two builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitness {
  Bits32,
  Bits64,
}

impl Bitness {
  pub fn current() -> Bitness {
    if size_of::<usize>() == 8 {
      Bitness::Bits64
    } else {
      Bitness::Bits32
    }
  }
}

/// Candidate locations of the 64-bit and 32-bit builds of one library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPaths {
  path_64bit: PathBuf,
  path_32bit: PathBuf,
}

impl LibraryPaths {
  /// `<dir>/<name>64.<ext>` and `<dir>/<name>.<ext>`.
  pub fn in_dir<P: AsRef<Path>>(dir: P, library_name: &str) -> LibraryPaths {
    let dir = dir.as_ref();
    LibraryPaths {
      path_64bit: dir.join(format!("{}64.{}", library_name, DLL_EXTENSION)),
      path_32bit: dir.join(format!("{}.{}", library_name, DLL_EXTENSION)),
    }
  }
  pub fn beside_executable(library_name: &str) -> Result<LibraryPaths, ConfigErr> {
    Ok(LibraryPaths::in_dir(executable_dir()?, library_name))
  }
  pub fn path_64bit(&self) -> &Path {
    &self.path_64bit
  }
  pub fn path_32bit(&self) -> &Path {
    &self.path_32bit
  }
  pub fn select(&self, bitness: Bitness) -> &Path {
    match bitness {
      Bitness::Bits64 => &self.path_64bit,
      Bitness::Bits32 => &self.path_32bit,
    }
  }
  /// The candidate matching this process's pointer width.
  pub fn current(&self) -> &Path {
    self.select(Bitness::current())
  }
}

pub fn executable_dir() -> Result<PathBuf, ConfigErr> {
  let exe = current_exe()?;
  exe
    .parent()
    .map(Path::to_path_buf)
    .ok_or(ConfigErr::NoExecutableDirErr)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderSettings {
  pub library_name: String,
  /// `None` means the directory of the running executable.
  pub library_dir: Option<PathBuf>,
  pub can_unload_symbol: String,
}

impl Default for LoaderSettings {
  fn default() -> LoaderSettings {
    LoaderSettings {
      library_name: DEFAULT_LIBRARY_NAME.to_string(),
      library_dir: None,
      can_unload_symbol: DEFAULT_CAN_UNLOAD_SYMBOL.to_string(),
    }
  }
}

impl LoaderSettings {
  pub fn in_dir<P: Into<PathBuf>>(dir: P) -> LoaderSettings {
    LoaderSettings::default().with_library_dir(dir)
  }
  pub fn with_library_dir<P: Into<PathBuf>>(mut self, dir: P) -> LoaderSettings {
    self.library_dir = Some(dir.into());
    self
  }
  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<LoaderSettings, ConfigErr> {
    let path = path.as_ref();
    let mut buf = String::new();
    BufReader::new(File::open(path)?).read_to_string(&mut buf)?;
    let settings: Value = serde_json::from_str(&buf)?;
    LoaderSettings::from_json(&settings, path.parent())
  }
  /// Missing keys keep their defaults. A relative `libraryDir` is joined
  /// onto `base_dir` when one is given.
  pub fn from_json(settings: &Value, base_dir: Option<&Path>) -> Result<LoaderSettings, ConfigErr> {
    let mut loader_settings = LoaderSettings::default();
    if let Some(name) = get_str(settings, LIBRARY_NAME_KEY)? {
      loader_settings.library_name = name.to_string();
    }
    if let Some(symbol) = get_str(settings, CAN_UNLOAD_SYMBOL_KEY)? {
      loader_settings.can_unload_symbol = symbol.to_string();
    }
    if let Some(dir) = get_str(settings, LIBRARY_DIR_KEY)? {
      let dir = Path::new(dir);
      loader_settings.library_dir = Some(match base_dir {
        Some(base) if dir.is_relative() => base.join(dir),
        _ => dir.to_path_buf(),
      });
    }
    Ok(loader_settings)
  }
  pub fn paths(&self) -> Result<LibraryPaths, ConfigErr> {
    match &self.library_dir {
      Some(dir) => Ok(LibraryPaths::in_dir(dir, &self.library_name)),
      None => LibraryPaths::beside_executable(&self.library_name),
    }
  }
}

fn get_str<'a>(settings: &'a Value, key: &'static str) -> Result<Option<&'a str>, ConfigErr> {
  match settings.get(key) {
    None | Some(Value::Null) => Ok(None),
    Some(Value::String(s)) => Ok(Some(s.as_str())),
    Some(_) => Err(ConfigErr::InvalidSettingErr(key)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::io::Write;

  #[test]
  fn test_in_dir() {
    let paths = LibraryPaths::in_dir("/opt/unitex", "UnitexNet");
    assert_eq!(
      paths.path_64bit(),
      Path::new("/opt/unitex").join(format!("UnitexNet64.{}", DLL_EXTENSION))
    );
    assert_eq!(
      paths.path_32bit(),
      Path::new("/opt/unitex").join(format!("UnitexNet.{}", DLL_EXTENSION))
    );
  }

  #[test]
  fn test_select() {
    let paths = LibraryPaths::in_dir("lib", "engine");
    assert_eq!(paths.select(Bitness::Bits64), paths.path_64bit());
    assert_eq!(paths.select(Bitness::Bits32), paths.path_32bit());
    if cfg!(target_pointer_width = "64") {
      assert_eq!(Bitness::current(), Bitness::Bits64);
      assert_eq!(paths.current(), paths.path_64bit());
    } else {
      assert_eq!(Bitness::current(), Bitness::Bits32);
      assert_eq!(paths.current(), paths.path_32bit());
    }
  }

  #[test]
  fn test_beside_executable() {
    let dir = current_exe().unwrap().parent().unwrap().to_path_buf();
    let paths = LibraryPaths::beside_executable("UnitexNet").unwrap();
    assert_eq!(paths, LibraryPaths::in_dir(&dir, "UnitexNet"));
    assert_eq!(LoaderSettings::default().paths().unwrap(), paths);
  }

  #[test]
  fn test_from_json_defaults() {
    let settings = LoaderSettings::from_json(&json!({}), None).unwrap();
    assert_eq!(settings, LoaderSettings::default());
    assert_eq!(settings.library_name, "UnitexNet");
    assert_eq!(settings.can_unload_symbol, "DllCanUnloadNow");
    assert_eq!(settings.library_dir, None);
  }

  #[test]
  fn test_from_json() {
    let value = json!({
      "libraryName": "unitex",
      "libraryDir": "lib",
      "canUnloadSymbol": "unitex_can_unload_now"
    });
    let settings = LoaderSettings::from_json(&value, Some(Path::new("/etc/unitex"))).unwrap();
    assert_eq!(settings.library_name, "unitex");
    assert_eq!(settings.can_unload_symbol, "unitex_can_unload_now");
    assert_eq!(settings.library_dir, Some(PathBuf::from("/etc/unitex/lib")));

    let settings = LoaderSettings::from_json(&value, None).unwrap();
    assert_eq!(settings.library_dir, Some(PathBuf::from("lib")));
  }

  #[test]
  fn test_from_json_absolute_dir() {
    let dir = std::env::temp_dir();
    let value = json!({ "libraryDir": dir.to_str().unwrap() });
    let settings = LoaderSettings::from_json(&value, Some(Path::new("elsewhere"))).unwrap();
    assert_eq!(settings.library_dir, Some(dir));
  }

  #[test]
  fn test_from_json_invalid() {
    let err = LoaderSettings::from_json(&json!({ "libraryName": 3 }), None).unwrap_err();
    assert!(matches!(err, ConfigErr::InvalidSettingErr("libraryName")));
  }

  #[test]
  fn test_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unitexloader.json");
    File::create(&path)
      .unwrap()
      .write_all(br#"{ "libraryDir": "native" }"#)
      .unwrap();
    let settings = LoaderSettings::from_file(&path).unwrap();
    assert_eq!(settings.library_dir, Some(dir.path().join("native")));
    assert_eq!(
      settings.paths().unwrap(),
      LibraryPaths::in_dir(dir.path().join("native"), "UnitexNet")
    );
  }

  #[test]
  fn test_from_file_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    File::create(&path).unwrap().write_all(b"{ libraryDir").unwrap();
    assert!(matches!(
      LoaderSettings::from_file(&path),
      Err(ConfigErr::SerdeError(_))
    ));
    assert!(matches!(
      LoaderSettings::from_file(dir.path().join("missing.json")),
      Err(ConfigErr::IOError(_))
    ));
  }
}
