//! One loaded map: its tile grid, tile types, entity roster and scripting
//! glue, plus the per-frame update, redraw and draw passes.

mod render;

use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::app::{
    AreaBinding, DataArea, Entity, EntityContext, EntityFactory, EntityId, EntityKind, MoveMode,
    MusicSink, Viewport, ViewportBounds,
};
use crate::grid::{ICoord, RCoord, TileGrid, TileSet, TileTrigger, TileType, VICoord};

pub use render::TileScan;

/// Everything the map loader produces for an area.
#[derive(Debug)]
pub struct AreaContents {
    pub grid: TileGrid,
    pub tile_types: Vec<TileType>,
    pub tile_sets: HashMap<PathBuf, TileSet>,
    pub name: String,
    pub music: Option<String>,
    pub color_overlay_argb: u32,
}

/// Per-frame collaborators owned by the session.
pub struct AreaUpdate<'a> {
    pub player: &'a mut dyn Entity,
    pub viewport: &'a mut Viewport,
    pub move_mode: MoveMode,
    pub now: u64,
}

pub struct Area {
    descriptor: String,
    name: String,
    music: Option<String>,
    color_overlay_argb: u32,
    grid: TileGrid,
    tile_types: Vec<TileType>,
    tile_sets: HashMap<PathBuf, TileSet>,
    characters: Vec<Box<dyn Entity>>,
    overlays: Vec<Box<dyn Entity>>,
    data_area: DataArea,
    been_focused: bool,
    redraw: bool,
    scan_generation: Cell<u64>,
    isometric: bool,
}

impl Area {
    pub fn new(contents: AreaContents, data_area: DataArea) -> Self {
        Self {
            descriptor: contents.grid.descriptor().to_owned(),
            name: contents.name,
            music: contents.music,
            color_overlay_argb: contents.color_overlay_argb,
            grid: contents.grid,
            tile_types: contents.tile_types,
            tile_sets: contents.tile_sets,
            characters: Vec::new(),
            overlays: Vec::new(),
            data_area,
            been_focused: false,
            redraw: true,
            scan_generation: Cell::new(0),
            isometric: true,
        }
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn music(&self) -> Option<&str> {
        self.music.as_deref()
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut TileGrid {
        self.redraw = true;
        &mut self.grid
    }

    pub fn tile_types(&self) -> &[TileType] {
        &self.tile_types
    }

    pub fn data_area(&self) -> &DataArea {
        &self.data_area
    }

    pub fn data_area_mut(&mut self) -> &mut DataArea {
        &mut self.data_area
    }

    pub fn been_focused(&self) -> bool {
        self.been_focused
    }

    pub fn is_isometric(&self) -> bool {
        self.isometric
    }

    pub fn set_isometric_depth(&mut self, isometric: bool) {
        self.isometric = isometric;
    }

    pub fn color_overlay_argb(&self) -> u32 {
        self.color_overlay_argb
    }

    pub fn set_color_overlay(&mut self, argb: u32) {
        self.color_overlay_argb = argb;
        self.redraw = true;
    }

    pub fn request_redraw(&mut self) {
        self.redraw = true;
    }

    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }

    pub fn viewport_bounds(&self) -> ViewportBounds {
        ViewportBounds::from_grid(&self.grid)
    }

    /// Fires the load hook the first time only, then (re)applies music and
    /// fires the focus hook.
    pub fn focus(&mut self, music: &mut dyn MusicSink) {
        if !self.been_focused {
            self.been_focused = true;
            self.data_area.on_load();
        }
        match &self.music {
            Some(path) => music.play(path),
            None => music.stop(),
        }
        self.data_area.on_focus();
        self.redraw = true;
        info!(area = %self.descriptor, "area_focused");
    }

    pub fn tick(&mut self, dt: u64, update: AreaUpdate<'_>) {
        self.data_area.tick(dt);
        let AreaUpdate {
            player,
            viewport,
            move_mode,
            now,
        } = update;
        {
            let mut ctx = EntityContext {
                grid: &mut self.grid,
                tile_types: &self.tile_types,
                data_area: &mut self.data_area,
                move_mode,
                now,
            };
            update_roster(&mut self.overlays, &mut ctx, |entity, ctx| entity.tick(dt, ctx));
            if move_mode != MoveMode::Turn {
                player.tick(dt, &mut ctx);
                update_roster(&mut self.characters, &mut ctx, |entity, ctx| {
                    entity.tick(dt, ctx)
                });
            }
        }
        let (characters, overlays) = (&self.characters, &self.overlays);
        viewport.tick(|id| locate(id, &*player, characters, overlays));
    }

    pub fn turn(&mut self, update: AreaUpdate<'_>) {
        self.data_area.turn();
        let AreaUpdate {
            player,
            viewport,
            move_mode,
            now,
        } = update;
        {
            let mut ctx = EntityContext {
                grid: &mut self.grid,
                tile_types: &self.tile_types,
                data_area: &mut self.data_area,
                move_mode,
                now,
            };
            player.turn(&mut ctx);
            update_roster(&mut self.characters, &mut ctx, |entity, ctx| entity.turn(ctx));
        }
        let (characters, overlays) = (&self.characters, &self.overlays);
        viewport.turn(|id| locate(id, &*player, characters, overlays));
    }

    pub fn entity_context(&mut self, move_mode: MoveMode, now: u64) -> EntityContext<'_> {
        EntityContext {
            grid: &mut self.grid,
            tile_types: &self.tile_types,
            data_area: &mut self.data_area,
            move_mode,
            now,
        }
    }

    pub fn run_tile_script(&mut self, trigger: TileTrigger, phys: ICoord, entity: Option<EntityId>) {
        self.entity_context(MoveMode::default(), 0)
            .run_tile_scripts(trigger, phys, entity);
        self.redraw = true;
    }

    pub fn enter_tile(&mut self, phys: ICoord) {
        if let Some(tile) = self.grid.get_tile_mut(phys) {
            tile.add_entity();
        }
    }

    pub fn leave_tile(&mut self, phys: ICoord) {
        if let Some(tile) = self.grid.get_tile_mut(phys) {
            tile.remove_entity();
        }
    }

    fn binding_at(&self, coords: VICoord) -> Option<AreaBinding> {
        let layer = self.grid.try_depth_index(coords.depth)?;
        Some(AreaBinding {
            descriptor: self.descriptor.clone(),
            tile_dim: self.grid.tile_dim(),
            position: self.grid.virt2virt(coords),
            layer,
            isometric: self.isometric,
        })
    }

    /// Places `entity` at `coords` and counts it on its tile. Returns false
    /// when `coords` names a depth this area does not have.
    pub fn attach(&mut self, entity: &mut dyn Entity, coords: VICoord) -> bool {
        let Some(binding) = self.binding_at(coords) else {
            warn!(
                area = %self.descriptor,
                depth = coords.depth,
                "attach_depth_unregistered"
            );
            return false;
        };
        entity.set_area(Some(binding));
        if entity.occupies_tiles() {
            self.enter_tile(entity.tile_coords());
        }
        self.redraw = true;
        true
    }

    pub fn detach(&mut self, entity: &mut dyn Entity) {
        if entity.occupies_tiles() {
            self.leave_tile(entity.tile_coords());
        }
        entity.set_area(None);
        self.redraw = true;
    }

    pub fn spawn_npc(
        &mut self,
        factory: &mut dyn EntityFactory,
        descriptor: &str,
        coords: VICoord,
    ) -> Option<EntityId> {
        self.spawn(factory, descriptor, coords, EntityKind::Npc)
    }

    pub fn spawn_overlay(
        &mut self,
        factory: &mut dyn EntityFactory,
        descriptor: &str,
        coords: VICoord,
    ) -> Option<EntityId> {
        self.spawn(factory, descriptor, coords, EntityKind::Overlay)
    }

    fn spawn(
        &mut self,
        factory: &mut dyn EntityFactory,
        descriptor: &str,
        coords: VICoord,
        kind: EntityKind,
    ) -> Option<EntityId> {
        if self.grid.try_depth_index(coords.depth).is_none() {
            warn!(
                area = %self.descriptor,
                descriptor,
                depth = coords.depth,
                "spawn_depth_unregistered"
            );
            return None;
        }
        let Some(mut entity) = factory.create(descriptor, kind) else {
            warn!(area = %self.descriptor, descriptor, "spawn_failed");
            return None;
        };
        if !self.attach(entity.as_mut(), coords) {
            return None;
        }
        let id = entity.id();
        debug!(area = %self.descriptor, descriptor, entity = id.0, "entity_spawned");
        match kind {
            EntityKind::Npc => self.characters.push(entity),
            EntityKind::Overlay => self.overlays.push(entity),
        }
        Some(id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut (dyn Entity + 'static)> {
        self.characters
            .iter_mut()
            .chain(self.overlays.iter_mut())
            .find(|entity| entity.id() == id)
            .map(|entity| entity.as_mut())
    }

    /// Tile set loaded from `image_path`, if any.
    pub fn get_tile_set(&self, image_path: &Path) -> Option<&TileSet> {
        let tile_set = self.tile_sets.get(image_path);
        if tile_set.is_none() {
            error!(
                area = %self.descriptor,
                path = %image_path.display(),
                "tileset_not_found"
            );
        }
        tile_set
    }

    pub fn phys2virt_vi(&self, phys: ICoord) -> VICoord {
        self.grid.phys2virt_vi(phys)
    }

    pub fn phys2virt_r(&self, phys: ICoord) -> RCoord {
        self.grid.phys2virt_r(phys)
    }

    pub fn virt2phys(&self, virt: VICoord) -> ICoord {
        self.grid.virt2phys(virt)
    }

    pub fn virt2phys_r(&self, virt: RCoord) -> ICoord {
        self.grid.virt2phys_r(virt)
    }

    pub fn virt2virt(&self, virt: VICoord) -> RCoord {
        self.grid.virt2virt(virt)
    }

    pub fn virt2virt_r(&self, virt: RCoord) -> VICoord {
        self.grid.virt2virt_r(virt)
    }

    pub fn in_bounds(&self, phys: ICoord) -> bool {
        self.grid.in_bounds(phys)
    }
}

/// Updates every entity, then detaches and drops the dead ones in the
/// same sweep.
fn update_roster(
    roster: &mut Vec<Box<dyn Entity>>,
    ctx: &mut EntityContext<'_>,
    mut step: impl FnMut(&mut dyn Entity, &mut EntityContext<'_>),
) {
    roster.retain_mut(|entity| {
        step(entity.as_mut(), ctx);
        if !entity.is_dead() {
            return true;
        }
        if entity.occupies_tiles() {
            ctx.leave_tile(entity.tile_coords());
        }
        entity.set_area(None);
        debug!(entity = entity.id().0, "entity_pruned");
        false
    });
}

fn locate(
    id: EntityId,
    player: &dyn Entity,
    characters: &[Box<dyn Entity>],
    overlays: &[Box<dyn Entity>],
) -> Option<RCoord> {
    if player.id() == id {
        return Some(player.pixel_coord());
    }
    characters
        .iter()
        .chain(overlays)
        .find(|entity| entity.id() == id)
        .map(|entity| entity.pixel_coord())
}

impl std::fmt::Debug for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Area")
            .field("descriptor", &self.descriptor)
            .field("name", &self.name)
            .field("characters", &self.characters.len())
            .field("overlays", &self.overlays.len())
            .field("been_focused", &self.been_focused)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::app::{Animation, AreaScripts, DisplayList, ImageId, LogMusic, ScriptContext};
    use crate::grid::{ICube, IVec2, LayerKind, RVec2, TileTypeId};

    /// Minimal entity that records what the area asked of it.
    #[derive(Debug)]
    pub(crate) struct Probe {
        pub(crate) id: EntityId,
        pub(crate) binding: Option<AreaBinding>,
        pub(crate) ticks: u32,
        pub(crate) turns: u32,
        pub(crate) dead: bool,
        pub(crate) die_on_update: bool,
        pub(crate) dirty: bool,
        pub(crate) occupies: bool,
    }

    impl Probe {
        pub(crate) fn new(id: u64) -> Self {
            Self {
                id: EntityId(id),
                binding: None,
                ticks: 0,
                turns: 0,
                dead: false,
                die_on_update: false,
                dirty: false,
                occupies: true,
            }
        }
    }

    impl Entity for Probe {
        fn id(&self) -> EntityId {
            self.id
        }

        fn tick(&mut self, _dt: u64, _ctx: &mut EntityContext<'_>) {
            self.ticks += 1;
            self.dead |= self.die_on_update;
        }

        fn turn(&mut self, _ctx: &mut EntityContext<'_>) {
            self.turns += 1;
            self.dead |= self.die_on_update;
        }

        fn is_dead(&self) -> bool {
            self.dead
        }

        fn set_area(&mut self, binding: Option<AreaBinding>) {
            self.binding = binding;
        }

        fn needs_redraw(&self, _visible_px: &ICube, _now: u64) -> bool {
            self.dirty
        }

        fn draw(&mut self, display: &mut DisplayList, _now: u64) {
            if let Some(binding) = &self.binding {
                display.push(
                    ImageId(900 + self.id.0 as u32),
                    RVec2::new(binding.position.x, binding.position.y),
                    binding.position.z,
                );
            }
        }

        fn tile_coords(&self) -> ICoord {
            self.binding.as_ref().map_or(ICoord::new(0, 0, 0), |b| {
                ICoord::new(
                    (b.position.x / b.tile_dim.x as f32) as i32,
                    (b.position.y / b.tile_dim.y as f32) as i32,
                    b.layer,
                )
            })
        }

        fn pixel_coord(&self) -> RCoord {
            self.binding
                .as_ref()
                .map_or(RCoord::new(0.0, 0.0, 0.0), |b| b.position)
        }

        fn occupies_tiles(&self) -> bool {
            self.occupies
        }
    }

    /// Hands out probes; `None` descriptors fail.
    pub(crate) struct ProbeFactory {
        pub(crate) next: u64,
        pub(crate) die_on_update: bool,
    }

    impl EntityFactory for ProbeFactory {
        fn create(&mut self, descriptor: &str, kind: EntityKind) -> Option<Box<dyn Entity>> {
            if descriptor == "missing.json" {
                return None;
            }
            self.next += 1;
            let mut probe = Probe::new(self.next);
            probe.die_on_update = self.die_on_update;
            probe.occupies = kind == EntityKind::Npc;
            Some(Box::new(probe))
        }
    }

    /// 10x10 area with a tile layer at depth 0 and an object layer at 1,
    /// every cell of the tile layer using type 0.
    pub(crate) fn sample_area() -> Area {
        let mut grid = TileGrid::new("sample.json", 10, 10).expect("grid");
        grid.set_tile_dim(IVec2::new(16, 16)).expect("tile dim");
        grid.allocate_layer(LayerKind::Tiles, 0.0).expect("tiles");
        grid.allocate_layer(LayerKind::Objects, 1.0).expect("objects");
        for y in 0..10 {
            for x in 0..10 {
                grid.get_tile_mut(ICoord::new(x, y, 0))
                    .expect("tile")
                    .tile_type = Some(TileTypeId(0));
            }
        }
        let contents = AreaContents {
            grid,
            tile_types: vec![
                TileType::new(Animation::still(ImageId(1))),
                TileType::new(Animation::new(vec![ImageId(2), ImageId(3)], 100)),
            ],
            tile_sets: HashMap::new(),
            name: "Sample".into(),
            music: Some("sample.ogg".into()),
            color_overlay_argb: 0,
        };
        Area::new(contents, DataArea::without_scripts("sample.json"))
    }

    struct Hooks {
        loads: Rc<Cell<u32>>,
        focuses: Rc<Cell<u32>>,
    }

    impl AreaScripts for Hooks {
        fn on_load(&mut self, _ctx: &mut ScriptContext<'_>) {
            self.loads.set(self.loads.get() + 1);
        }

        fn on_focus(&mut self, _ctx: &mut ScriptContext<'_>) {
            self.focuses.set(self.focuses.get() + 1);
        }
    }

    #[test]
    fn focus_fires_load_once_and_focus_every_time() {
        let loads = Rc::new(Cell::new(0));
        let focuses = Rc::new(Cell::new(0));
        let mut area = sample_area();
        *area.data_area_mut() = DataArea::new(
            "sample.json",
            Box::new(Hooks {
                loads: Rc::clone(&loads),
                focuses: Rc::clone(&focuses),
            }),
        );
        let mut music = LogMusic::new();

        area.focus(&mut music);
        area.focus(&mut music);

        assert_eq!(loads.get(), 1);
        assert_eq!(focuses.get(), 2);
        assert!(area.been_focused());
        assert_eq!(music.playing(), Some("sample.ogg"));
    }

    #[test]
    fn spawn_attaches_and_counts_occupancy() {
        let mut area = sample_area();
        let mut factory = ProbeFactory {
            next: 0,
            die_on_update: false,
        };

        let id = area
            .spawn_npc(&mut factory, "guard.json", VICoord::new(2, 3, 1.0))
            .expect("spawned");

        assert_eq!(area.character_count(), 1);
        assert!(area.grid().occupied(ICoord::new(2, 3, 1)));
        let entity = area.entity_mut(id).expect("entity");
        assert_eq!(entity.pixel_coord(), RCoord::new(32.0, 48.0, 1.0));
    }

    #[test]
    fn failed_spawn_inserts_nothing() {
        let mut area = sample_area();
        let mut factory = ProbeFactory {
            next: 0,
            die_on_update: false,
        };

        assert!(area
            .spawn_npc(&mut factory, "missing.json", VICoord::new(0, 0, 0.0))
            .is_none());
        assert!(area
            .spawn_overlay(&mut factory, "bird.json", VICoord::new(0, 0, 7.5))
            .is_none());

        assert_eq!(area.character_count(), 0);
        assert_eq!(area.overlay_count(), 0);
    }

    #[test]
    fn dead_entities_are_pruned_in_the_same_tick() {
        let mut area = sample_area();
        let mut factory = ProbeFactory {
            next: 0,
            die_on_update: true,
        };
        area.spawn_npc(&mut factory, "guard.json", VICoord::new(4, 4, 1.0))
            .expect("npc");
        area.spawn_overlay(&mut factory, "bird.json", VICoord::new(5, 5, 1.0))
            .expect("overlay");
        let mut player = Probe::new(100);
        let mut viewport = Viewport::new(RVec2::new(160.0, 160.0));

        area.tick(
            16,
            AreaUpdate {
                player: &mut player,
                viewport: &mut viewport,
                move_mode: MoveMode::Tile,
                now: 16,
            },
        );

        assert_eq!(area.character_count(), 0);
        assert_eq!(area.overlay_count(), 0);
        assert!(!area.grid().occupied(ICoord::new(4, 4, 1)));
        assert_eq!(player.ticks, 1);
    }

    fn roster_ids(roster: &[Box<dyn Entity>]) -> Vec<EntityId> {
        roster.iter().map(|entity| entity.id()).collect()
    }

    /// NPCs at (1..=3, 1) and overlays at (4..=5, 1) on the object layer;
    /// the second NPC and the first overlay die on their next update.
    fn mixed_roster() -> Area {
        let mut area = sample_area();
        let mut factory = ProbeFactory {
            next: 0,
            die_on_update: false,
        };
        for (x, dies) in [(1, false), (2, true), (3, false)] {
            factory.die_on_update = dies;
            area.spawn_npc(&mut factory, "guard.json", VICoord::new(x, 1, 1.0))
                .expect("npc");
        }
        for (x, dies) in [(4, true), (5, false)] {
            factory.die_on_update = dies;
            area.spawn_overlay(&mut factory, "bird.json", VICoord::new(x, 1, 1.0))
                .expect("overlay");
        }
        area
    }

    #[test]
    fn tick_prunes_only_dead_entities() {
        let mut area = mixed_roster();
        let mut player = Probe::new(100);
        let mut viewport = Viewport::new(RVec2::new(160.0, 160.0));

        area.tick(
            16,
            AreaUpdate {
                player: &mut player,
                viewport: &mut viewport,
                move_mode: MoveMode::Tile,
                now: 16,
            },
        );

        assert_eq!(roster_ids(&area.characters), vec![EntityId(1), EntityId(3)]);
        assert_eq!(roster_ids(&area.overlays), vec![EntityId(5)]);
        assert!(area.grid().occupied(ICoord::new(1, 1, 1)));
        assert!(!area.grid().occupied(ICoord::new(2, 1, 1)));
        assert!(area.grid().occupied(ICoord::new(3, 1, 1)));
    }

    #[test]
    fn turn_prunes_dead_characters_and_leaves_overlays() {
        let mut area = mixed_roster();
        let mut player = Probe::new(100);
        let mut viewport = Viewport::new(RVec2::new(160.0, 160.0));

        area.turn(AreaUpdate {
            player: &mut player,
            viewport: &mut viewport,
            move_mode: MoveMode::Turn,
            now: 0,
        });

        assert_eq!(roster_ids(&area.characters), vec![EntityId(1), EntityId(3)]);
        assert_eq!(roster_ids(&area.overlays), vec![EntityId(4), EntityId(5)]);
        assert!(area.grid().occupied(ICoord::new(1, 1, 1)));
        assert!(!area.grid().occupied(ICoord::new(2, 1, 1)));
        assert!(area.grid().occupied(ICoord::new(3, 1, 1)));
    }

    #[test]
    fn turn_mode_tick_leaves_characters_alone() {
        let mut area = sample_area();
        let mut factory = ProbeFactory {
            next: 0,
            die_on_update: true,
        };
        area.spawn_npc(&mut factory, "guard.json", VICoord::new(4, 4, 1.0))
            .expect("npc");
        let mut player = Probe::new(100);
        let mut viewport = Viewport::new(RVec2::new(160.0, 160.0));

        area.tick(
            16,
            AreaUpdate {
                player: &mut player,
                viewport: &mut viewport,
                move_mode: MoveMode::Turn,
                now: 16,
            },
        );
        assert_eq!(area.character_count(), 1);
        assert_eq!(player.ticks, 0);

        area.turn(AreaUpdate {
            player: &mut player,
            viewport: &mut viewport,
            move_mode: MoveMode::Turn,
            now: 16,
        });
        assert_eq!(player.turns, 1);
        assert_eq!(area.character_count(), 0);
    }

    #[test]
    fn tick_keeps_viewport_on_tracked_player() {
        let mut area = sample_area();
        let mut player = Probe::new(7);
        assert!(area.attach(&mut player, VICoord::new(5, 5, 1.0)));
        let mut viewport = Viewport::new(RVec2::new(80.0, 80.0));
        viewport.set_area(Some(area.viewport_bounds()));
        viewport.track_entity(EntityId(7), RCoord::new(0.0, 0.0, 1.0));

        area.tick(
            16,
            AreaUpdate {
                player: &mut player,
                viewport: &mut viewport,
                move_mode: MoveMode::Tile,
                now: 16,
            },
        );

        assert_eq!(viewport.map_offset(), RVec2::new(48.0, 48.0));
    }

    #[test]
    fn detach_releases_tile() {
        let mut area = sample_area();
        let mut player = Probe::new(1);
        area.attach(&mut player, VICoord::new(1, 1, 0.0));
        assert!(area.grid().occupied(ICoord::new(1, 1, 0)));

        area.detach(&mut player);

        assert!(!area.grid().occupied(ICoord::new(1, 1, 0)));
        assert!(player.binding.is_none());
    }

    #[test]
    fn missing_tile_set_is_absent() {
        let area = sample_area();
        assert!(area.get_tile_set(Path::new("nope.png")).is_none());
    }

    #[test]
    #[should_panic(expected = "unregistered layer depth")]
    fn unregistered_depth_conversion_is_fatal() {
        let area = sample_area();
        area.virt2phys(VICoord::new(0, 0, 3.0));
    }
}
