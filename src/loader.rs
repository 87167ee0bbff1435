use std::error::Error;
use std::ffi::c_void;
use std::path::Path;

use libloading::Library;
use log::warn;

pub type OpenErr = Box<dyn Error + Send + Sync>;

/// The operating system primitives the lifecycle manager consumes.
pub trait Loader {
  type Library;

  fn open(&self, path: &Path) -> Result<Self::Library, OpenErr>;

  /// Calls the library's liveness probe exported under `symbol`.
  /// `None` means the symbol is absent, which is not an error.
  fn can_unload_now(&self, library: &Self::Library, symbol: &str) -> Option<i32>;

  fn close(&self, library: Self::Library);
}

type CanUnloadNow = unsafe extern "system" fn() -> i32;

/// `dlopen`/`LoadLibraryW` through libloading.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLoader;

impl Loader for SystemLoader {
  type Library = Library;

  fn open(&self, path: &Path) -> Result<Library, OpenErr> {
    // SAFETY: loading runs the library's initialisers. The engine library
    // is a trusted native dependency of this process.
    let library = unsafe { Library::new(path) }?;
    Ok(library)
  }

  fn can_unload_now(&self, library: &Library, symbol: &str) -> Option<i32> {
    // SAFETY: the probe is declared as a zero-argument function returning
    // a 32-bit integer, with the platform's system calling convention.
    let probe = unsafe { library.get::<CanUnloadNow>(symbol.as_bytes()) }.ok()?;
    Some(unsafe { probe() })
  }

  fn close(&self, library: Library) {
    if let Err(e) = library.close() {
      warn!("failed to unload library: {}", e);
    }
  }
}

pub fn has_symbol(library: &Library, name: &str) -> bool {
  // SAFETY: the address is only checked for presence, never dereferenced.
  unsafe { library.get::<*const c_void>(name.as_bytes()) }.is_ok()
}
