//! I/O layer: the file handle pool (C9), block cache (C10), and the
//! logical-to-physical read pipeline (C11).

pub mod cache;
pub mod handle;
pub mod pool;

pub use cache::BlockCache;
pub use handle::ReadHandle;
pub use pool::FilePool;

/// Identity of one resolved image within a handle's lifetime: the extent it
/// belongs to and its position in that extent's image chain (0 = top image).
/// Stable for as long as the handle is open (spec.md §4.7).
pub type ImageId = (usize, usize);
