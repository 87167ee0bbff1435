//! ```no_run
//! use unitexloader::prelude::*;
//!
//! // looks for UnitexNet64.<ext> (or UnitexNet.<ext> in a 32-bit process)
//! // next to the running executable
//! let library = EngineLibrary::new().unwrap();
//! println!("{:?}", library.loaded_path());
//!
//! // or in an explicit directory
//! let library = EngineLibrary::in_dir("/opt/unitex").unwrap();
//! assert!(library.has_symbol("DllCanUnloadNow").unwrap());
//!
//! // resolve and call engine functions while the handle is pinned
//! let version = library
//!   .with_library(|lib| unsafe {
//!     let f = lib.get::<unsafe extern "C" fn() -> u32>(b"GetUnitexVersion").unwrap();
//!     f()
//!   })
//!   .unwrap();
//! println!("{}", version);
//!
//! // unloads only if DllCanUnloadNow reports no live objects
//! match library.dispose() {
//!   DisposeOutcome::Deferred => println!("engine objects are still alive"),
//!   outcome => println!("{}", outcome),
//! }
//! ```

#![crate_name = "unitexloader"]

pub mod config;
pub mod library;
pub mod loader;
pub mod resources;

pub mod prelude {
  pub use crate::config::{Bitness, LibraryPaths, LoaderSettings};
  pub use crate::library::{DisposeOutcome, EngineLibrary, LibraryErr};
  pub use crate::loader::{Loader, SystemLoader};
}
