use crate::grid::{IVec2, RCoord, RVec2, TileGrid};

use super::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    /// The camera stays where it was last put.
    Manual,
    /// The camera re-centers on an entity every update.
    Follow(EntityId),
}

/// What the camera needs to know about the focused area to clamp itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportBounds {
    pub pixel_size: RVec2,
    pub loop_x: bool,
    pub loop_y: bool,
    pub tile_dim: IVec2,
}

impl ViewportBounds {
    pub fn from_grid(grid: &TileGrid) -> Self {
        let tile_dim = grid.tile_dim();
        Self {
            pixel_size: RVec2::new(
                (grid.width() * tile_dim.x) as f32,
                (grid.height() * tile_dim.y) as f32,
            ),
            loop_x: grid.loops_x(),
            loop_y: grid.loops_y(),
            tile_dim,
        }
    }
}

/// Camera over the focused area, in virtual pixels, plus the letterboxed
/// mapping onto the physical window.
#[derive(Debug, Clone)]
pub struct Viewport {
    phys_res: RVec2,
    virt_res: RVec2,
    offset: RVec2,
    mode: TrackingMode,
    area: Option<ViewportBounds>,
}

impl Viewport {
    pub fn new(virt_res: RVec2) -> Self {
        Self {
            phys_res: virt_res,
            virt_res,
            offset: RVec2::ZERO,
            mode: TrackingMode::Manual,
            area: None,
        }
    }

    pub fn set_size(&mut self, phys_res: RVec2) {
        self.phys_res = phys_res;
    }

    /// Re-runs tracking. `locate` resolves a followed entity to its pixel
    /// position.
    pub fn tick(&mut self, locate: impl FnOnce(EntityId) -> Option<RCoord>) {
        self.update(locate);
    }

    pub fn turn(&mut self, locate: impl FnOnce(EntityId) -> Option<RCoord>) {
        self.update(locate);
    }

    fn update(&mut self, locate: impl FnOnce(EntityId) -> Option<RCoord>) {
        if let TrackingMode::Follow(id) = self.mode {
            if let Some(position) = locate(id) {
                self.center_on_entity(position);
            }
        }
    }

    pub fn map_offset(&self) -> RVec2 {
        self.offset
    }

    /// Offset of the drawable region inside the window, in physical
    /// pixels. Never positive.
    pub fn letterbox_offset(&self) -> RVec2 {
        let cut = self.letterbox();
        RVec2::new(
            -cut.x * self.phys_res.x / 2.0,
            -cut.y * self.phys_res.y / 2.0,
        )
    }

    pub fn scale(&self) -> RVec2 {
        if self.virt_res.x <= 0.0 || self.virt_res.y <= 0.0 {
            return RVec2::new(1.0, 1.0);
        }
        let cut = self.letterbox();
        RVec2::new(
            self.phys_res.x / self.virt_res.x * (1.0 - cut.x),
            self.phys_res.y / self.virt_res.y * (1.0 - cut.y),
        )
    }

    pub fn phys_res(&self) -> RVec2 {
        self.phys_res
    }

    pub fn virt_res(&self) -> RVec2 {
        self.virt_res
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn jump_to_pt(&mut self, pt: RVec2) {
        self.mode = TrackingMode::Manual;
        self.center_on(pt);
    }

    /// Centers once on an entity standing at `position`.
    pub fn jump_to_entity(&mut self, position: RCoord) {
        self.mode = TrackingMode::Manual;
        self.center_on_entity(position);
    }

    pub fn track_entity(&mut self, id: EntityId, position: RCoord) {
        self.mode = TrackingMode::Follow(id);
        self.center_on_entity(position);
    }

    pub fn set_area(&mut self, area: Option<ViewportBounds>) {
        self.area = area;
    }

    fn center_on_entity(&mut self, position: RCoord) {
        let tile_dim = self.area.map_or(IVec2::ZERO, |area| area.tile_dim);
        self.center_on(RVec2::new(
            position.x + tile_dim.x as f32 / 2.0,
            position.y + tile_dim.y as f32 / 2.0,
        ));
    }

    fn center_on(&mut self, pt: RVec2) {
        let x = pt.x - self.virt_res.x / 2.0;
        let y = pt.y - self.virt_res.y / 2.0;
        self.offset = match self.area {
            Some(area) => RVec2::new(
                bound_dimension(self.virt_res.x, area.pixel_size.x, x, area.loop_x),
                bound_dimension(self.virt_res.y, area.pixel_size.y, y, area.loop_y),
            ),
            None => RVec2::new(x, y),
        };
    }

    /// Fraction of the window cut off per axis so the virtual resolution
    /// keeps its aspect ratio.
    fn letterbox(&self) -> RVec2 {
        if self.phys_res.y <= 0.0 || self.virt_res.y <= 0.0 {
            return RVec2::ZERO;
        }
        let phys_aspect = self.phys_res.x / self.phys_res.y;
        let virt_aspect = self.virt_res.x / self.virt_res.y;
        if phys_aspect > virt_aspect {
            RVec2::new(1.0 - virt_aspect / phys_aspect, 0.0)
        } else if phys_aspect < virt_aspect {
            RVec2::new(0.0, 1.0 - phys_aspect / virt_aspect)
        } else {
            RVec2::ZERO
        }
    }
}

/// Clamps one camera axis. Looping axes scroll freely; an area smaller
/// than the screen is centered.
fn bound_dimension(screen: f32, area: f32, offset: f32, loops: bool) -> f32 {
    if loops {
        return offset;
    }
    let wiggle = area - screen;
    if wiggle <= 0.0 {
        wiggle / 2.0
    } else {
        offset.clamp(0.0, wiggle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(width: f32, height: f32) -> ViewportBounds {
        ViewportBounds {
            pixel_size: RVec2::new(width, height),
            loop_x: false,
            loop_y: false,
            tile_dim: IVec2::new(16, 16),
        }
    }

    #[test]
    fn jump_centers_point_and_clamps_to_area() {
        let mut viewport = Viewport::new(RVec2::new(240.0, 160.0));
        viewport.set_area(Some(bounds(640.0, 480.0)));

        viewport.jump_to_pt(RVec2::new(320.0, 240.0));
        assert_eq!(viewport.map_offset(), RVec2::new(200.0, 160.0));

        viewport.jump_to_pt(RVec2::new(10.0, 10.0));
        assert_eq!(viewport.map_offset(), RVec2::ZERO);

        viewport.jump_to_pt(RVec2::new(630.0, 470.0));
        assert_eq!(viewport.map_offset(), RVec2::new(400.0, 320.0));
    }

    #[test]
    fn small_area_is_centered() {
        let mut viewport = Viewport::new(RVec2::new(240.0, 160.0));
        viewport.set_area(Some(bounds(160.0, 160.0)));

        viewport.jump_to_pt(RVec2::new(0.0, 0.0));

        assert_eq!(viewport.map_offset(), RVec2::new(-40.0, 0.0));
    }

    #[test]
    fn looping_axis_is_not_clamped() {
        let mut viewport = Viewport::new(RVec2::new(240.0, 160.0));
        let mut area = bounds(320.0, 320.0);
        area.loop_x = true;
        viewport.set_area(Some(area));

        viewport.jump_to_pt(RVec2::new(0.0, 0.0));

        assert_eq!(viewport.map_offset(), RVec2::new(-120.0, 0.0));
    }

    #[test]
    fn matching_aspect_has_no_letterbox() {
        let mut viewport = Viewport::new(RVec2::new(240.0, 160.0));
        viewport.set_size(RVec2::new(960.0, 640.0));

        assert_eq!(viewport.scale(), RVec2::new(4.0, 4.0));
        assert_eq!(viewport.letterbox_offset(), RVec2::ZERO);
    }

    #[test]
    fn wide_window_cuts_left_and_right() {
        let mut viewport = Viewport::new(RVec2::new(240.0, 160.0));
        viewport.set_size(RVec2::new(1200.0, 640.0));

        let scale = viewport.scale();
        assert!((scale.x - 4.0).abs() < 1e-4);
        assert!((scale.y - 4.0).abs() < 1e-4);
        let offset = viewport.letterbox_offset();
        assert!((offset.x + 120.0).abs() < 1e-3);
        assert_eq!(offset.y, 0.0);
    }

    #[test]
    fn tall_window_cuts_top_and_bottom() {
        let mut viewport = Viewport::new(RVec2::new(240.0, 160.0));
        viewport.set_size(RVec2::new(480.0, 480.0));

        let scale = viewport.scale();
        assert!((scale.x - 2.0).abs() < 1e-4);
        assert!((scale.y - 2.0).abs() < 1e-4);
        assert!((viewport.letterbox_offset().y + 80.0).abs() < 1e-3);
    }

    #[test]
    fn tracking_follows_entity_until_manual_jump() {
        let mut viewport = Viewport::new(RVec2::new(240.0, 160.0));
        viewport.set_area(Some(bounds(1600.0, 1600.0)));

        viewport.track_entity(EntityId(3), RCoord::new(400.0, 400.0, 0.0));
        assert_eq!(viewport.mode(), TrackingMode::Follow(EntityId(3)));
        assert_eq!(viewport.map_offset(), RVec2::new(288.0, 328.0));

        viewport.tick(|id| (id == EntityId(3)).then_some(RCoord::new(500.0, 400.0, 0.0)));
        assert_eq!(viewport.map_offset(), RVec2::new(388.0, 328.0));

        viewport.jump_to_entity(RCoord::new(200.0, 200.0, 0.0));
        assert_eq!(viewport.mode(), TrackingMode::Manual);
        viewport.turn(|_| Some(RCoord::new(900.0, 900.0, 0.0)));
        assert_eq!(viewport.map_offset(), RVec2::new(88.0, 128.0));
    }
}
