use crate::app::{DisplayList, Entity, Viewport};
use crate::grid::{isometric_z_offset, ICoord, ICube, IVec2, LayerKind, RVec2};

use super::Area;

/// Outcome of one pass over the visible tiles' animations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileScan {
    pub changed: bool,
    /// Distinct tile types inspected before the pass stopped.
    pub types_checked: usize,
}

impl Area {
    /// Visible tile range for `viewport`. Non-looping axes are clamped to
    /// the grid; looping axes are left for the caller to wrap.
    pub fn visible_tiles(&self, viewport: &Viewport) -> ICube {
        let screen = viewport.virt_res();
        let offset = viewport.map_offset();
        let tile_dim = self.grid.tile_dim();
        let (tile_w, tile_h) = (tile_dim.x as f32, tile_dim.y as f32);

        let mut x1 = (offset.x / tile_w).floor() as i32;
        let mut y1 = (offset.y / tile_h).floor() as i32;
        let mut x2 = ((offset.x + screen.x) / tile_w).ceil() as i32;
        let mut y2 = ((offset.y + screen.y) / tile_h).ceil() as i32;

        if !self.grid.loops_x() {
            x1 = x1.clamp(0, self.grid.width());
            x2 = x2.clamp(0, self.grid.width());
        }
        if !self.grid.loops_y() {
            y1 = y1.clamp(0, self.grid.height());
            y2 = y2.clamp(0, self.grid.height());
        }
        ICube::new(x1, y1, 0, x2, y2, self.grid.layer_count())
    }

    /// The visible tile range in pixel units, so entities count as
    /// visible as long as they touch a tile that gets drawn.
    fn visible_pixels(tiles: &ICube, tile_dim: IVec2) -> ICube {
        ICube::new(
            tiles.x1 * tile_dim.x,
            tiles.y1 * tile_dim.y,
            tiles.z1,
            tiles.x2 * tile_dim.x,
            tiles.y2 * tile_dim.y,
            tiles.z2,
        )
    }

    pub fn needs_redraw(&self, player: &dyn Entity, viewport: &Viewport, now: u64) -> bool {
        if self.redraw {
            return true;
        }
        let tiles = self.visible_tiles(viewport);
        let pixels = Self::visible_pixels(&tiles, self.grid.tile_dim());
        if player.needs_redraw(&pixels, now) {
            return true;
        }
        let entity_changed = self
            .characters
            .iter()
            .chain(&self.overlays)
            .any(|entity| entity.needs_redraw(&pixels, now));
        if entity_changed {
            return true;
        }
        self.scan_tile_animations(&tiles, now).changed
    }

    /// Checks whether any tile type shown inside `tiles` is due for a new
    /// animation frame. Each type is inspected at most once per pass no
    /// matter how many cells use it.
    pub fn scan_tile_animations(&self, tiles: &ICube, now: u64) -> TileScan {
        let generation = self.scan_generation.get().wrapping_add(1).max(1);
        self.scan_generation.set(generation);

        let mut types_checked = 0;
        for z in tiles.z1..tiles.z2 {
            if self.grid.layer_kind(z) != Some(LayerKind::Tiles) {
                continue;
            }
            for y in tiles.y1..tiles.y2 {
                for x in tiles.x1..tiles.x2 {
                    let Some(tile_type) = self
                        .grid
                        .get_tile(ICoord::new(x, y, z))
                        .and_then(|tile| tile.tile_type)
                        .and_then(|id| self.tile_types.get(id.index()))
                    else {
                        continue;
                    };
                    if !tile_type.mark_checked(generation) {
                        continue;
                    }
                    types_checked += 1;
                    if tile_type.anim.needs_redraw(now) {
                        return TileScan {
                            changed: true,
                            types_checked,
                        };
                    }
                }
            }
        }
        TileScan {
            changed: false,
            types_checked,
        }
    }

    /// Appends the visible scene to `display`, layer by layer, and clears
    /// the pending redraw.
    pub fn draw(
        &mut self,
        display: &mut DisplayList,
        player: &mut dyn Entity,
        viewport: &Viewport,
        now: u64,
    ) {
        let tiles = self.visible_tiles(viewport);
        for z in tiles.z1..tiles.z2 {
            if self.grid.layer_kind(z) == Some(LayerKind::Tiles) {
                self.draw_tiles(display, &tiles, z, now);
            }
            self.draw_entities(display, player, z, now);
        }
        display.color_overlay_argb = self.color_overlay_argb;
        self.redraw = false;
    }

    fn draw_tiles(&mut self, display: &mut DisplayList, tiles: &ICube, z: i32, now: u64) {
        let tile_dim = self.grid.tile_dim();
        let depth = self.grid.index_depth(z);
        for y in tiles.y1..tiles.y2 {
            for x in tiles.x1..tiles.x2 {
                let Some(id) = self
                    .grid
                    .get_tile(ICoord::new(x, y, z))
                    .and_then(|tile| tile.tile_type)
                else {
                    continue;
                };
                let Some(image) = self
                    .tile_types
                    .get_mut(id.index())
                    .and_then(|tile_type| tile_type.anim.frame(now))
                else {
                    continue;
                };
                let px = (x * tile_dim.x) as f32;
                let py = (y * tile_dim.y) as f32;
                let mut item_z = depth;
                if self.isometric {
                    item_z += isometric_z_offset(py, tile_dim.y);
                }
                display.push(image, RVec2::new(px, py), item_z);
            }
        }
    }

    fn draw_entities(
        &mut self,
        display: &mut DisplayList,
        player: &mut dyn Entity,
        z: i32,
        now: u64,
    ) {
        for entity in self.characters.iter_mut().chain(self.overlays.iter_mut()) {
            if entity.tile_coords().z == z {
                entity.draw(display, now);
            }
        }
        if player.tile_coords().z == z {
            player.draw(display, now);
        }
    }
}
