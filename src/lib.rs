//! Read-only access to Parallels Hard Disk images: the `DiskDescriptor.xml`
//! descriptor, its plain and sparse ("Compressed") backing files, and the
//! snapshot chains between them.
//!
//! [`PhdiHandle`] is the entry point: open a descriptor path, then read
//! logical disk bytes through it as you would through a file.

pub mod bytes;
pub mod error;
pub mod handle;
pub mod io;
pub mod model;
pub mod open;
pub mod sparse;
pub mod storage;
pub mod xml;

pub use error::{PhdiError, Result};
pub use handle::PhdiHandle;
pub use open::OpenOptions;
