use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::grid::{
    isometric_z_offset, Exit, ExitDirection, ICoord, ICube, IVec2, RCoord, RVec2, TileFlags,
    TileTrigger,
};

use super::entity::{
    AreaBinding, Entity, EntityContext, EntityFactory, EntityId, EntityIdAllocator, EntityKind,
};
use super::{Animation, DisplayList, ImageError, ImageSource, MoveMode};

const DEFAULT_SPEED_TILES: f32 = 4.0;
const DEFAULT_FRAME_MS: u64 = 250;

/// Which walking rules a character follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterRole {
    Player,
    Npc,
    Overlay,
}

impl CharacterRole {
    fn nowalk(self) -> TileFlags {
        match self {
            CharacterRole::Player => TileFlags::NOWALK | TileFlags::NOWALK_PLAYER,
            CharacterRole::Npc => TileFlags::NOWALK | TileFlags::NOWALK_NPC,
            CharacterRole::Overlay => TileFlags::empty(),
        }
    }

    fn exempt(self) -> TileFlags {
        match self {
            CharacterRole::Player => TileFlags::NOWALK_EXIT,
            CharacterRole::Npc => TileFlags::empty(),
            CharacterRole::Overlay => TileFlags::all(),
        }
    }
}

/// On-disk entity descriptor.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CharacterSpec {
    pub image: PathBuf,
    pub tile_width: u32,
    pub tile_height: u32,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u64,
}

fn default_speed() -> f32 {
    DEFAULT_SPEED_TILES
}

fn default_frame_ms() -> u64 {
    DEFAULT_FRAME_MS
}

impl CharacterSpec {
    /// Loads the sprite sheet, resolving `image` against `base_dir`.
    pub fn load_sprite(
        &self,
        base_dir: &Path,
        images: &mut dyn ImageSource,
    ) -> Result<(Animation, IVec2), ImageError> {
        let path = base_dir.join(&self.image);
        let frames = images.load_tiles(&path, self.tile_width, self.tile_height)?;
        let size = IVec2::new(self.tile_width as i32, self.tile_height as i32);
        Ok((Animation::new(frames, self.frame_ms), size))
    }
}

/// A sprite that walks tile by tile.
#[derive(Debug)]
pub struct Character {
    id: EntityId,
    descriptor: String,
    role: CharacterRole,
    anim: Animation,
    image_size: IVec2,
    speed_tiles: f32,
    area: Option<AreaBinding>,
    r: RCoord,
    layer: i32,
    from: ICoord,
    dest: ICoord,
    facing: IVec2,
    velocity: IVec2,
    moving: bool,
    frozen: bool,
    dead: bool,
    redraw: bool,
    dest_exit: Option<Exit>,
    pending_exit: Option<Exit>,
}

impl Character {
    pub fn new(
        id: EntityId,
        descriptor: impl Into<String>,
        role: CharacterRole,
        anim: Animation,
        image_size: IVec2,
        speed_tiles: f32,
    ) -> Self {
        Self {
            id,
            descriptor: descriptor.into(),
            role,
            anim,
            image_size,
            speed_tiles,
            area: None,
            r: RCoord::new(0.0, 0.0, 0.0),
            layer: 0,
            from: ICoord::new(0, 0, 0),
            dest: ICoord::new(0, 0, 0),
            facing: IVec2::new(0, 1),
            velocity: IVec2::ZERO,
            moving: false,
            frozen: false,
            dead: false,
            redraw: true,
            dest_exit: None,
            pending_exit: None,
        }
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn role(&self) -> CharacterRole {
        self.role
    }

    pub fn area_descriptor(&self) -> Option<&str> {
        self.area.as_ref().map(|binding| binding.descriptor.as_str())
    }

    pub fn facing(&self) -> IVec2 {
        self.facing
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    pub fn destroy(&mut self) {
        self.dead = true;
    }

    /// Direction held by the controller. In real-time modes the character
    /// keeps stepping while this is non-zero.
    pub fn set_velocity(&mut self, velocity: IVec2) {
        self.velocity = velocity;
    }

    pub fn velocity(&self) -> IVec2 {
        self.velocity
    }

    /// Exit reached by the last completed step, if any.
    pub fn take_pending_exit(&mut self) -> Option<Exit> {
        self.pending_exit.take()
    }

    /// Origin of the last step.
    pub fn previous_tile(&self) -> ICoord {
        self.from
    }

    fn set_facing(&mut self, facing: IVec2) {
        let facing = IVec2::new(facing.x.signum(), facing.y.signum());
        if facing != self.facing {
            self.facing = facing;
            self.redraw = true;
        }
    }

    fn tile_pixels(&self, phys: ICoord) -> (f32, f32) {
        let dim = self.area.as_ref().map_or(IVec2::new(1, 1), |b| b.tile_dim);
        ((phys.x * dim.x) as f32, (phys.y * dim.y) as f32)
    }

    fn can_move(&self, ctx: &EntityContext<'_>, dest: ICoord, has_exit: bool) -> bool {
        if has_exit && self.exempt_from(TileFlags::NOWALK_EXIT) {
            return true;
        }
        match ctx.grid.get_tile(dest) {
            Some(tile) => {
                let blocking = self.role.nowalk() & !self.role.exempt();
                let crowded = self.occupies_tiles() && tile.is_occupied();
                !tile.has_flag(blocking, ctx.tile_types) && !crowded
            }
            None => self.exempt_from(TileFlags::NOWALK_AREA_BOUND),
        }
    }

    fn exempt_from(&self, flag: TileFlags) -> bool {
        self.role.exempt().contains(flag)
    }

    /// Starts a one-tile step in direction `delta`. Returns false when the
    /// step was refused. In turn mode the step completes immediately.
    pub fn move_by_tile(&mut self, delta: IVec2, ctx: &mut EntityContext<'_>) -> bool {
        if self.area.is_none() || self.moving || self.frozen {
            return false;
        }
        self.set_facing(delta);
        let facing = self.facing;

        let from = self.dest;
        let dest = if ctx.grid.in_bounds(from) {
            ctx.grid.move_dest(from, facing)
        } else {
            from + facing
        };

        let directional = ExitDirection::from_facing(facing).and_then(|direction| {
            ctx.grid
                .get_tile(from)
                .and_then(|tile| tile.exit_at(direction))
        });
        let dest_exit = directional
            .or_else(|| {
                ctx.grid
                    .get_tile(dest)
                    .and_then(|tile| tile.exit_at(ExitDirection::Normal))
            })
            .cloned();

        if !self.can_move(ctx, dest, dest_exit.is_some()) {
            return false;
        }

        ctx.run_tile_scripts(TileTrigger::Leave, from, Some(self.id));
        if self.occupies_tiles() {
            ctx.leave_tile(from);
            ctx.enter_tile(dest);
        }
        self.from = from;
        self.dest = dest;
        self.dest_exit = dest_exit;
        self.moving = true;
        self.redraw = true;

        if ctx.move_mode == MoveMode::Turn {
            self.finish_step(ctx);
        }
        true
    }

    fn finish_step(&mut self, ctx: &mut EntityContext<'_>) {
        let dest = ctx.grid.wrap(self.dest);
        let (x, y) = self.tile_pixels(dest);
        self.r.x = x;
        self.r.y = y;
        self.dest = dest;
        if ctx.grid.layer_kind(dest.z).is_some() {
            self.r.z = ctx.grid.index_depth(dest.z);
            self.layer = dest.z;
        }
        self.moving = false;
        self.redraw = true;
        self.arrived(ctx);
    }

    fn arrived(&mut self, ctx: &mut EntityContext<'_>) {
        if ctx.grid.in_bounds(self.dest) {
            let layermod = ctx
                .grid
                .get_tile(self.dest)
                .and_then(|tile| tile.layermod_at(ExitDirection::Normal));
            if let Some(depth) = layermod {
                let z = ctx.grid.depth_index(depth);
                if z != self.dest.z {
                    let moved = ICoord::new(self.dest.x, self.dest.y, z);
                    if self.occupies_tiles() {
                        ctx.leave_tile(self.dest);
                        ctx.enter_tile(moved);
                    }
                    self.dest = moved;
                }
                self.r.z = depth;
                self.layer = z;
            }
            ctx.run_tile_scripts(TileTrigger::Enter, self.dest, Some(self.id));
        }
        self.pending_exit = self.dest_exit.take();
        if let Some(exit) = &self.pending_exit {
            debug!(entity = self.id.0, area = %exit.area, "exit_reached");
        }
    }

    /// Teleports back to the origin of the last step without running
    /// scripts. Used when an exit could not be taken.
    pub fn step_back(&mut self, ctx: &mut EntityContext<'_>) {
        let back = self.from;
        if self.occupies_tiles() {
            ctx.leave_tile(self.dest);
            ctx.enter_tile(back);
        }
        let (x, y) = self.tile_pixels(back);
        self.r = RCoord::new(x, y, ctx.grid.index_depth(back.z));
        self.layer = back.z;
        self.dest = back;
        self.moving = false;
        self.dest_exit = None;
        self.pending_exit = None;
        self.redraw = true;
    }

    /// Runs the use script of the tile being faced.
    pub fn use_facing(&mut self, ctx: &mut EntityContext<'_>) {
        let target = self.dest + self.facing;
        ctx.run_tile_scripts(TileTrigger::Use, target, Some(self.id));
    }

    fn tween(&mut self, dt: u64, ctx: &mut EntityContext<'_>) {
        let tile_w = self.area.as_ref().map_or(1, |b| b.tile_dim.x);
        let pixels_per_second = self.speed_tiles * tile_w as f32;
        let traveled = pixels_per_second * dt as f32 / 1000.0;

        let (target_x, target_y) = self.tile_pixels(self.dest);
        let target = RCoord::new(target_x, target_y, self.r.z);
        let distance = self.r.distance_to(target);
        if distance <= traveled {
            self.finish_step(ctx);
        } else {
            let ratio = traveled / distance;
            self.r.x += (target.x - self.r.x) * ratio;
            self.r.y += (target.y - self.r.y) * ratio;
            self.redraw = true;
        }
    }

    fn draw_offset(&self) -> (f32, f32) {
        let tile = self.area.as_ref().map_or(self.image_size, |b| b.tile_dim);
        (
            ((tile.x - self.image_size.x) / 2) as f32,
            (tile.y - self.image_size.y) as f32,
        )
    }
}

impl Entity for Character {
    fn id(&self) -> EntityId {
        self.id
    }

    fn tick(&mut self, dt: u64, ctx: &mut EntityContext<'_>) {
        if self.area.is_none() {
            return;
        }
        if self.moving {
            self.tween(dt, ctx);
        }
        if !self.moving && self.pending_exit.is_none() && !self.velocity.is_zero() {
            let velocity = self.velocity;
            self.move_by_tile(velocity, ctx);
        }
    }

    fn turn(&mut self, ctx: &mut EntityContext<'_>) {
        if self.moving {
            self.finish_step(ctx);
        }
    }

    fn is_dead(&self) -> bool {
        self.dead
    }

    fn set_area(&mut self, binding: Option<AreaBinding>) {
        if let Some(binding) = &binding {
            self.r = binding.position;
            self.layer = binding.layer;
            let dim = binding.tile_dim;
            let tile = ICoord::new(
                (self.r.x / dim.x as f32).floor() as i32,
                (self.r.y / dim.y as f32).floor() as i32,
                binding.layer,
            );
            self.from = tile;
            self.dest = tile;
        }
        self.area = binding;
        self.moving = false;
        self.dest_exit = None;
        self.pending_exit = None;
        self.redraw = true;
    }

    fn needs_redraw(&self, visible_px: &ICube, now: u64) -> bool {
        if self.area.is_none() {
            return false;
        }
        let (dx, dy) = self.draw_offset();
        let left = (self.r.x + dx).floor() as i32;
        let top = (self.r.y + dy).floor() as i32;
        let right = left + self.image_size.x;
        let bottom = top + self.image_size.y;
        let visible = right > visible_px.x1
            && left < visible_px.x2
            && bottom > visible_px.y1
            && top < visible_px.y2;
        visible && (self.redraw || self.anim.needs_redraw(now))
    }

    fn draw(&mut self, display: &mut DisplayList, now: u64) {
        let Some(binding) = &self.area else {
            return;
        };
        let isometric = binding.isometric;
        let tile_h = binding.tile_dim.y;
        let (dx, dy) = self.draw_offset();
        if let Some(image) = self.anim.frame(now) {
            let mut z = self.r.z;
            if isometric {
                z += isometric_z_offset(self.r.y, tile_h);
            }
            display.push(image, RVec2::new(self.r.x + dx, self.r.y + dy), z);
        }
        self.redraw = false;
    }

    /// The tile this character holds. While stepping that is the
    /// destination.
    fn tile_coords(&self) -> ICoord {
        self.dest
    }

    fn pixel_coord(&self) -> RCoord {
        self.r
    }

    fn occupies_tiles(&self) -> bool {
        self.role != CharacterRole::Overlay
    }
}

/// Builds NPCs and overlays from JSON descriptors below `root`.
pub struct CharacterFactory<'a> {
    root: &'a Path,
    ids: &'a mut EntityIdAllocator,
    images: &'a mut dyn ImageSource,
}

impl<'a> CharacterFactory<'a> {
    pub fn new(
        root: &'a Path,
        ids: &'a mut EntityIdAllocator,
        images: &'a mut dyn ImageSource,
    ) -> Self {
        Self { root, ids, images }
    }

    fn read_spec(&self, path: &Path) -> Result<CharacterSpec, String> {
        let raw = fs::read_to_string(path).map_err(|err| err.to_string())?;
        serde_json::from_str(&raw).map_err(|err| err.to_string())
    }
}

impl EntityFactory for CharacterFactory<'_> {
    fn create(&mut self, descriptor: &str, kind: EntityKind) -> Option<Box<dyn Entity>> {
        let path = self.root.join(descriptor);
        let spec = match self.read_spec(&path) {
            Ok(spec) => spec,
            Err(error) => {
                warn!(descriptor, error = %error, "entity_descriptor_invalid");
                return None;
            }
        };
        let base_dir = path.parent().unwrap_or(self.root);
        let (anim, size) = match spec.load_sprite(base_dir, self.images) {
            Ok(sprite) => sprite,
            Err(error) => {
                warn!(descriptor, error = %error, "entity_sprite_failed");
                return None;
            }
        };
        let role = match kind {
            EntityKind::Npc => CharacterRole::Npc,
            EntityKind::Overlay => CharacterRole::Overlay,
        };
        let id = self.ids.allocate();
        Some(Box::new(Character::new(
            id, descriptor, role, anim, size, spec.speed,
        )))
    }
}
