//! Storage / extent table (C8): resolves each `<Storage>` block's image
//! chain from the snapshot genealogy.

pub mod extent;

pub use extent::{Extent, ExtentTable};
