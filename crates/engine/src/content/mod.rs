//! Map loading. Reads a map file and its tilesets into an [`Area`].
//!
//! [`Area`]: crate::area::Area

mod format;
mod loader;
mod parse;
mod types;

pub use loader::load_area;
pub use types::{MapFormat, MapLoadError};
