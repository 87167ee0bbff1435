//! Load-once, reference-safe unload of the native engine library.
//!
//! An [`EngineLibrary`] owns at most one loaded handle. It loads the build
//! matching the process's pointer width when constructed, and releases it
//! only when the library's liveness probe (`DllCanUnloadNow` by default)
//! is absent or reports that no objects handed out by the library are
//! still alive.
//!
//! Every manager owns its handle independently. Loading the same path from
//! two managers is still fine: the operating system reference-counts the
//! mapping and only unmaps it after the last close.

use std::fmt;
use std::mem::forget;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;

use log::{debug, info, warn};
use thiserror::Error;

use super::config::{ConfigErr, LibraryPaths, LoaderSettings};
use super::loader::{self, Loader, OpenErr, SystemLoader};

#[derive(Error, Debug)]
pub enum LibraryErr {
  #[error("Could not load '{}'\nMake sure the library exists.", .path.display())]
  LoadErr { path: PathBuf, source: OpenErr },
  #[error("library is not loaded")]
  NotLoadedErr,
  #[error("{0}")]
  ConfigErr(#[from] ConfigErr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeOutcome {
  NotLoaded,
  Unloaded,
  /// The library still has live objects, so the handle was kept.
  Deferred,
}

impl fmt::Display for DisposeOutcome {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      DisposeOutcome::NotLoaded => write!(f, "not loaded"),
      DisposeOutcome::Unloaded => write!(f, "unloaded"),
      DisposeOutcome::Deferred => write!(f, "kept loaded (live objects outstanding)"),
    }
  }
}

struct LibraryHandle<T> {
  path: PathBuf,
  library: T,
}

pub struct EngineLibrary<L: Loader = SystemLoader> {
  loader: L,
  paths: LibraryPaths,
  can_unload_symbol: String,
  handle: Mutex<Option<LibraryHandle<L::Library>>>,
}

impl EngineLibrary<SystemLoader> {
  /// Loads `<name>64.<ext>` or `<name>.<ext>` from the executable's directory.
  pub fn new() -> Result<EngineLibrary, LibraryErr> {
    Self::from_settings(&LoaderSettings::default())
  }
  pub fn in_dir<P: Into<PathBuf>>(dir: P) -> Result<EngineLibrary, LibraryErr> {
    Self::from_settings(&LoaderSettings::in_dir(dir))
  }
  pub fn from_settings(settings: &LoaderSettings) -> Result<EngineLibrary, LibraryErr> {
    Self::with_loader(SystemLoader, settings)
  }
  pub fn has_symbol(&self, name: &str) -> Result<bool, LibraryErr> {
    self.with_library(|library| loader::has_symbol(library, name))
  }
}

impl<L: Loader> EngineLibrary<L> {
  pub fn with_loader(loader: L, settings: &LoaderSettings) -> Result<EngineLibrary<L>, LibraryErr> {
    let library = EngineLibrary {
      loader,
      paths: settings.paths()?,
      can_unload_symbol: settings.can_unload_symbol.clone(),
      handle: Mutex::new(None),
    };
    library.load()?;
    Ok(library)
  }

  /// Loads the library unless a handle is already held.
  pub fn load(&self) -> Result<(), LibraryErr> {
    let mut handle = self.lock();
    if let Some(h) = handle.as_ref() {
      debug!("{} is already loaded", h.path.display());
      return Ok(());
    }
    let path = self.paths.current().to_path_buf();
    let library = self
      .loader
      .open(&path)
      .map_err(|source| LibraryErr::LoadErr {
        path: path.clone(),
        source,
      })?;
    info!("loaded {}", path.display());
    *handle = Some(LibraryHandle { path, library });
    Ok(())
  }

  /// Unloads the library unless its liveness probe reports live objects.
  /// Calling this again after an unload is a no-op.
  pub fn dispose(&self) -> DisposeOutcome {
    let mut handle = self.lock();
    let h = match handle.take() {
      Some(h) => h,
      None => return DisposeOutcome::NotLoaded,
    };
    if let Some(live) = self.live_objects(&h.library) {
      warn!(
        "not unloading {}: library reports live objects ({})",
        h.path.display(),
        live
      );
      *handle = Some(h);
      return DisposeOutcome::Deferred;
    }
    self.loader.close(h.library);
    info!("unloaded {}", h.path.display());
    DisposeOutcome::Unloaded
  }

  /// Result of the liveness probe, `None` when the library does not export it.
  pub fn can_unload_now(&self) -> Result<Option<i32>, LibraryErr> {
    self.with_library(|library| self.loader.can_unload_now(library, &self.can_unload_symbol))
  }

  /// Runs `f` against the loaded library while holding the manager's lock,
  /// so the library cannot be unloaded underneath it. `f` must not call
  /// back into this manager's methods; `{:?}` on the manager is fine and
  /// shows the handle as locked.
  pub fn with_library<R, F: FnOnce(&L::Library) -> R>(&self, f: F) -> Result<R, LibraryErr> {
    let handle = self.lock();
    match handle.as_ref() {
      Some(h) => Ok(f(&h.library)),
      None => Err(LibraryErr::NotLoadedErr),
    }
  }

  pub fn is_loaded(&self) -> bool {
    self.lock().is_some()
  }
  pub fn loaded_path(&self) -> Option<PathBuf> {
    self.lock().as_ref().map(|h| h.path.clone())
  }
  pub fn paths(&self) -> &LibraryPaths {
    &self.paths
  }
  pub fn can_unload_symbol(&self) -> &str {
    &self.can_unload_symbol
  }

  fn live_objects(&self, library: &L::Library) -> Option<i32> {
    match self.loader.can_unload_now(library, &self.can_unload_symbol) {
      Some(0) | None => None,
      Some(live) => Some(live),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Option<LibraryHandle<L::Library>>> {
    self.handle.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Safety net for managers that were never disposed. The probe is skipped
/// while unwinding, and a library that is not known to be idle is leaked
/// instead of unloaded.
impl<L: Loader> Drop for EngineLibrary<L> {
  fn drop(&mut self) {
    let handle = match self.handle.get_mut() {
      Ok(handle) => handle.take(),
      Err(poisoned) => poisoned.into_inner().take(),
    };
    let handle = match handle {
      Some(handle) => handle,
      None => return,
    };
    if thread::panicking() {
      warn!("leaking {}: dropped while panicking", handle.path.display());
      forget(handle.library);
      return;
    }
    if let Some(live) = self.live_objects(&handle.library) {
      warn!(
        "leaking {}: library reports live objects ({})",
        handle.path.display(),
        live
      );
      forget(handle.library);
      return;
    }
    self.loader.close(handle.library);
    debug!("unloaded {} on drop", handle.path.display());
  }
}

impl<L: Loader> fmt::Debug for EngineLibrary<L> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut s = f.debug_struct("EngineLibrary");
    s.field("paths", &self.paths)
      .field("can_unload_symbol", &self.can_unload_symbol);
    match self.handle.try_lock() {
      Ok(handle) => {
        s.field("loaded_path", &handle.as_ref().map(|h| &h.path));
      }
      Err(TryLockError::Poisoned(poisoned)) => {
        let handle = poisoned.into_inner();
        s.field("loaded_path", &handle.as_ref().map(|h| &h.path));
      }
      Err(TryLockError::WouldBlock) => {
        s.field("loaded_path", &format_args!("<locked>"));
      }
    }
    s.finish()
  }
}
