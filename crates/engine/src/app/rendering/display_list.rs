use crate::grid::RVec2;

use super::ImageId;

pub const PAUSE_OVERLAY_ARGB: u32 = 0x7F00_0000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayItem {
    pub image: ImageId,
    pub destination: RVec2,
    pub z: f32,
}

/// One frame's worth of draw requests plus the view transform to apply.
#[derive(Debug, Clone, Default)]
pub struct DisplayList {
    pub loop_x: bool,
    pub loop_y: bool,
    /// Letterbox offset in physical pixels (non-positive).
    pub padding: RVec2,
    pub scale: RVec2,
    /// Map offset in virtual pixels.
    pub scroll: RVec2,
    /// Physical window size.
    pub size: RVec2,
    pub items: Vec<DisplayItem>,
    pub color_overlay_argb: u32,
    pub paused: bool,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.color_overlay_argb = 0;
        self.paused = false;
    }

    pub fn push(&mut self, image: ImageId, destination: RVec2, z: f32) {
        self.items.push(DisplayItem {
            image,
            destination,
            z,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Render backend surface in physical pixels.
pub trait Canvas {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn push_clip(&mut self, rect: ClipRect);
    fn pop_clip(&mut self);
    fn draw_image(&mut self, image: ImageId, x: f32, y: f32, scale: RVec2);
    fn draw_rect(&mut self, x1: f32, x2: f32, y1: f32, y2: f32, argb: u32);
}

fn letterbox_clip(display: &DisplayList) -> ClipRect {
    let size = display.size;
    let bars = RVec2::new(-display.padding.x, -display.padding.y);
    let mut clip = ClipRect {
        x: bars.x,
        y: bars.y,
        width: size.x - 2.0 * bars.x,
        height: size.y - 2.0 * bars.y,
    };

    // Map edge in physical pixels; a positive value means the map is
    // narrower than the window on that axis.
    let map_edge = RVec2::new(
        -display.scroll.x * display.scale.x - display.padding.x,
        -display.scroll.y * display.scale.y - display.padding.y,
    );
    if !display.loop_x && map_edge.x > 0.0 {
        clip.x = clip.x.max(map_edge.x);
        clip.width = clip.width.min(size.x - 2.0 * map_edge.x);
    }
    if !display.loop_y && map_edge.y > 0.0 {
        clip.y = clip.y.max(map_edge.y);
        clip.height = clip.height.min(size.y - 2.0 * map_edge.y);
    }
    clip
}

/// Draws `display` onto `canvas`, back to front by z.
pub fn present(display: &mut DisplayList, canvas: &mut dyn Canvas) {
    display.items.sort_by(|a, b| a.z.total_cmp(&b.z));

    let window_w = canvas.width() as f32;
    let window_h = canvas.height() as f32;

    canvas.push_clip(letterbox_clip(display));
    for item in &display.items {
        let x = (item.destination.x - display.scroll.x) * display.scale.x - display.padding.x;
        let y = (item.destination.y - display.scroll.y) * display.scale.y - display.padding.y;
        canvas.draw_image(item.image, x, y, display.scale);
    }
    if display.color_overlay_argb & 0xFF00_0000 != 0 {
        canvas.draw_rect(0.0, window_w, 0.0, window_h, display.color_overlay_argb);
    }
    canvas.pop_clip();

    if display.paused {
        canvas.draw_rect(0.0, window_w, 0.0, window_h, PAUSE_OVERLAY_ARGB);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum CanvasOp {
        PushClip(ClipRect),
        PopClip,
        Image { image: ImageId, x: f32, y: f32 },
        Rect { x2: f32, y2: f32, argb: u32 },
    }

    #[derive(Debug, Default)]
    pub(crate) struct RecordingCanvas {
        pub(crate) width: u32,
        pub(crate) height: u32,
        pub(crate) ops: Vec<CanvasOp>,
    }

    impl RecordingCanvas {
        pub(crate) fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                ops: Vec::new(),
            }
        }

        pub(crate) fn rects(&self) -> Vec<&CanvasOp> {
            self.ops
                .iter()
                .filter(|op| matches!(op, CanvasOp::Rect { .. }))
                .collect()
        }
    }

    impl Canvas for RecordingCanvas {
        fn width(&self) -> u32 {
            self.width
        }

        fn height(&self) -> u32 {
            self.height
        }

        fn push_clip(&mut self, rect: ClipRect) {
            self.ops.push(CanvasOp::PushClip(rect));
        }

        fn pop_clip(&mut self) {
            self.ops.push(CanvasOp::PopClip);
        }

        fn draw_image(&mut self, image: ImageId, x: f32, y: f32, _scale: RVec2) {
            self.ops.push(CanvasOp::Image { image, x, y });
        }

        fn draw_rect(&mut self, _x1: f32, x2: f32, _y1: f32, y2: f32, argb: u32) {
            self.ops.push(CanvasOp::Rect { x2, y2, argb });
        }
    }

    fn unit_display() -> DisplayList {
        DisplayList {
            scale: RVec2::new(1.0, 1.0),
            size: RVec2::new(320.0, 240.0),
            ..DisplayList::default()
        }
    }

    #[test]
    fn transparent_overlay_draws_no_rect() {
        let mut display = unit_display();
        display.color_overlay_argb = 0x00FF_FFFF;
        let mut canvas = RecordingCanvas::new(320, 240);

        present(&mut display, &mut canvas);

        assert!(canvas.rects().is_empty());
    }

    #[test]
    fn visible_overlay_covers_whole_window() {
        let mut display = unit_display();
        display.color_overlay_argb = 0x0100_0000;
        let mut canvas = RecordingCanvas::new(640, 480);

        present(&mut display, &mut canvas);

        assert_eq!(
            canvas.rects(),
            vec![&CanvasOp::Rect {
                x2: 640.0,
                y2: 480.0,
                argb: 0x0100_0000
            }]
        );
    }

    #[test]
    fn paused_adds_dim_rect_outside_clip() {
        let mut display = unit_display();
        display.paused = true;
        let mut canvas = RecordingCanvas::new(320, 240);

        present(&mut display, &mut canvas);

        assert_eq!(
            canvas.ops.last(),
            Some(&CanvasOp::Rect {
                x2: 320.0,
                y2: 240.0,
                argb: PAUSE_OVERLAY_ARGB
            })
        );
        assert!(matches!(canvas.ops[canvas.ops.len() - 2], CanvasOp::PopClip));
    }

    #[test]
    fn items_draw_in_z_order_and_keep_ties_stable() {
        let mut display = unit_display();
        display.push(ImageId(1), RVec2::new(0.0, 0.0), 1.0);
        display.push(ImageId(2), RVec2::new(0.0, 0.0), -1.0);
        display.push(ImageId(3), RVec2::new(0.0, 0.0), 1.0);
        let mut canvas = RecordingCanvas::new(320, 240);

        present(&mut display, &mut canvas);

        let order: Vec<ImageId> = canvas
            .ops
            .iter()
            .filter_map(|op| match op {
                CanvasOp::Image { image, .. } => Some(*image),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec![ImageId(2), ImageId(1), ImageId(3)]);
    }

    #[test]
    fn items_are_scrolled_scaled_and_padded() {
        let mut display = unit_display();
        display.scale = RVec2::new(2.0, 2.0);
        display.scroll = RVec2::new(10.0, 5.0);
        display.padding = RVec2::new(-20.0, 0.0);
        display.push(ImageId(0), RVec2::new(30.0, 15.0), 0.0);
        let mut canvas = RecordingCanvas::new(320, 240);

        present(&mut display, &mut canvas);

        assert!(canvas.ops.contains(&CanvasOp::Image {
            image: ImageId(0),
            x: 60.0,
            y: 20.0
        }));
    }

    #[test]
    fn letterbox_padding_shrinks_clip() {
        let mut display = unit_display();
        display.padding = RVec2::new(-40.0, 0.0);
        let mut canvas = RecordingCanvas::new(320, 240);

        present(&mut display, &mut canvas);

        assert_eq!(
            canvas.ops.first(),
            Some(&CanvasOp::PushClip(ClipRect {
                x: 40.0,
                y: 0.0,
                width: 240.0,
                height: 240.0
            }))
        );
    }
}
