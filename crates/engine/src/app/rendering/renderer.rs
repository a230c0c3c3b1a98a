use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture};
use winit::window::Window;

use crate::grid::RVec2;

use super::display_list::{present, Canvas, ClipRect, DisplayList};
use super::images::{ImageId, ImageStore, StoredImage};

const CLEAR_COLOR: [u8; 4] = [0, 0, 0, 255];

/// Software framebuffer presenter backed by `pixels`.
pub struct Renderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    width: u32,
    height: u32,
}

impl Renderer {
    pub fn new(window: Arc<Window>) -> Result<Self, Error> {
        let size = window.inner_size();
        let pixels = Self::build_pixels(Arc::clone(&window), size.width, size.height)?;
        Ok(Self {
            window,
            pixels,
            width: size.width,
            height: size.height,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels = Self::build_pixels(Arc::clone(&self.window), width, height)?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn build_pixels(
        window: Arc<Window>,
        width: u32,
        height: u32,
    ) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(width, height, window);
        Pixels::new(width, height, surface)
    }

    pub fn present(&mut self, display: &mut DisplayList, images: &ImageStore) -> Result<(), Error> {
        let (width, height) = (self.width, self.height);
        let frame = self.pixels.frame_mut();
        for pixel in frame.chunks_exact_mut(4) {
            pixel.copy_from_slice(&CLEAR_COLOR);
        }
        let mut canvas = FrameCanvas::new(frame, width, height, images);
        present(display, &mut canvas);
        self.pixels.render()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelRect {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

impl PixelRect {
    fn intersect(self, other: PixelRect) -> PixelRect {
        PixelRect {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        }
    }
}

/// RGBA8 frame that implements [`Canvas`] with nearest-neighbour scaling.
pub(crate) struct FrameCanvas<'a> {
    frame: &'a mut [u8],
    width: u32,
    height: u32,
    images: &'a ImageStore,
    clips: Vec<PixelRect>,
}

impl<'a> FrameCanvas<'a> {
    pub(crate) fn new(
        frame: &'a mut [u8],
        width: u32,
        height: u32,
        images: &'a ImageStore,
    ) -> Self {
        Self {
            frame,
            width,
            height,
            images,
            clips: Vec::new(),
        }
    }

    fn active_clip(&self) -> PixelRect {
        let full = PixelRect {
            left: 0,
            top: 0,
            right: self.width as i32,
            bottom: self.height as i32,
        };
        self.clips.last().copied().unwrap_or(full).intersect(full)
    }
}

impl Canvas for FrameCanvas<'_> {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn push_clip(&mut self, rect: ClipRect) {
        let next = PixelRect {
            left: rect.x.round() as i32,
            top: rect.y.round() as i32,
            right: (rect.x + rect.width).round() as i32,
            bottom: (rect.y + rect.height).round() as i32,
        };
        let clip = self.active_clip().intersect(next);
        self.clips.push(clip);
    }

    fn pop_clip(&mut self) {
        self.clips.pop();
    }

    fn draw_image(&mut self, image: ImageId, x: f32, y: f32, scale: RVec2) {
        let Some(sprite) = self.images.get(image) else {
            return;
        };
        let clip = self.active_clip();
        draw_sprite_scaled(self.frame, self.width, clip, x, y, sprite, scale);
    }

    fn draw_rect(&mut self, x1: f32, x2: f32, y1: f32, y2: f32, argb: u32) {
        let clip = self.active_clip().intersect(PixelRect {
            left: x1.round() as i32,
            top: y1.round() as i32,
            right: x2.round() as i32,
            bottom: y2.round() as i32,
        });
        let color = [
            (argb >> 16) as u8,
            (argb >> 8) as u8,
            argb as u8,
            (argb >> 24) as u8,
        ];
        for py in clip.top..clip.bottom {
            for px in clip.left..clip.right {
                blend_pixel_rgba_clipped(self.frame, self.width as usize, px, py, color);
            }
        }
    }
}

fn pixel_offset(frame: &[u8], width: usize, x: i32, y: i32) -> Option<usize> {
    if x < 0 || y < 0 || x as usize >= width {
        return None;
    }
    let byte_offset = (y as usize)
        .checked_mul(width)
        .and_then(|row| row.checked_add(x as usize))
        .and_then(|pixel| pixel.checked_mul(4))?;
    (byte_offset + 4 <= frame.len()).then_some(byte_offset)
}

fn write_pixel_rgba_clipped(frame: &mut [u8], width: usize, x: i32, y: i32, color: [u8; 4]) {
    if let Some(offset) = pixel_offset(frame, width, x, y) {
        frame[offset..offset + 4].copy_from_slice(&color);
    }
}

fn blend_pixel_rgba_clipped(frame: &mut [u8], width: usize, x: i32, y: i32, color: [u8; 4]) {
    let Some(offset) = pixel_offset(frame, width, x, y) else {
        return;
    };
    let alpha = color[3] as u32;
    let inv = 255 - alpha;
    for channel in 0..3 {
        let dst = frame[offset + channel] as u32;
        frame[offset + channel] = ((color[channel] as u32 * alpha + dst * inv) / 255) as u8;
    }
    frame[offset + 3] = 255;
}

fn normalized_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

fn draw_sprite_scaled(
    frame: &mut [u8],
    width: u32,
    clip: PixelRect,
    left: f32,
    top: f32,
    sprite: &StoredImage,
    scale: RVec2,
) {
    if sprite.width == 0 || sprite.height == 0 {
        return;
    }
    if sprite.rgba.len() < sprite.width as usize * sprite.height as usize * 4 {
        return;
    }
    let scale_x = normalized_scale(scale.x);
    let scale_y = normalized_scale(scale.y);
    let left_px = left.floor() as i32;
    let top_px = top.floor() as i32;
    let scaled_w = (sprite.width as f32 * scale_x).ceil() as i32;
    let scaled_h = (sprite.height as f32 * scale_y).ceil() as i32;

    let area = clip.intersect(PixelRect {
        left: left_px,
        top: top_px,
        right: left_px + scaled_w,
        bottom: top_px + scaled_h,
    });
    let sprite_width = sprite.width as usize;
    for out_y in area.top..area.bottom {
        let src_y = (((out_y - top_px) as f32) / scale_y).floor() as u32;
        let src_y = src_y.min(sprite.height - 1) as usize;
        for out_x in area.left..area.right {
            let src_x = (((out_x - left_px) as f32) / scale_x).floor() as u32;
            let src_x = src_x.min(sprite.width - 1) as usize;
            let src = (src_y * sprite_width + src_x) * 4;
            let alpha = sprite.rgba[src + 3];
            if alpha == 0 {
                continue;
            }
            let color = [
                sprite.rgba[src],
                sprite.rgba[src + 1],
                sprite.rgba[src + 2],
                alpha,
            ];
            write_pixel_rgba_clipped(frame, width as usize, out_x, out_y, color);
        }
    }
}
