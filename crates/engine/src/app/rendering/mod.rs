mod animation;
mod display_list;
mod images;
mod renderer;

pub use animation::Animation;
pub use display_list::{
    present, Canvas, ClipRect, DisplayItem, DisplayList, PAUSE_OVERLAY_ARGB,
};
pub use images::{ImageError, ImageId, ImageSource, ImageStore, StoredImage};
pub use renderer::Renderer;
