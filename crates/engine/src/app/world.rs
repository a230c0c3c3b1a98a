//! The running game session: area cache, player, camera, clock and pause
//! state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::area::{Area, AreaUpdate};
use crate::content::{load_area, MapLoadError};
use crate::grid::{IVec2, RVec2, VICoord};

use super::{
    Character, CharacterFactory, CharacterRole, CharacterSpec, DisplayList, EngineConfig, Entity,
    EntityId, EntityIdAllocator, ImageError, ImageStore, MoveMode, MusicSink, ScriptRegistry,
    Viewport,
};

pub const PLAYER_DESCRIPTOR: &str = "player";

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("failed to load area {descriptor}: {source}")]
    Area {
        descriptor: String,
        #[source]
        source: MapLoadError,
    },
    #[error("area {descriptor} has no layer at depth {depth}")]
    UnknownDepth { descriptor: String, depth: f32 },
    #[error("failed to load player sprite: {0}")]
    PlayerSprite(#[source] ImageError),
}

pub struct World {
    root: PathBuf,
    config: EngineConfig,
    images: ImageStore,
    music: Box<dyn MusicSink>,
    scripts: ScriptRegistry,
    ids: EntityIdAllocator,
    areas: HashMap<String, Area>,
    focused: Option<String>,
    player: Character,
    viewport: Viewport,
    last_time: Option<u64>,
    total: u64,
    paused: u32,
    user_paused: bool,
    redraw: bool,
}

impl World {
    /// Creates a session rooted at `root`. Area descriptors and the player
    /// sprite resolve against it. No area is focused yet.
    pub fn new(
        root: impl Into<PathBuf>,
        config: EngineConfig,
        player: &CharacterSpec,
        music: Box<dyn MusicSink>,
        scripts: ScriptRegistry,
    ) -> Result<Self, WorldError> {
        let root = root.into();
        let mut images = ImageStore::new();
        let mut ids = EntityIdAllocator::default();
        let (anim, size) = player
            .load_sprite(&root, &mut images)
            .map_err(WorldError::PlayerSprite)?;
        let player = Character::new(
            ids.allocate(),
            PLAYER_DESCRIPTOR,
            CharacterRole::Player,
            anim,
            size,
            player.speed,
        );
        info!(
            root = %root.display(),
            move_mode = ?config.move_mode,
            virt_width = config.virtual_resolution.x,
            virt_height = config.virtual_resolution.y,
            "world_created"
        );
        Ok(Self {
            viewport: Viewport::new(config.virtual_resolution),
            root,
            config,
            images,
            music,
            scripts,
            ids,
            areas: HashMap::new(),
            focused: None,
            player,
            last_time: None,
            total: 0,
            paused: 0,
            user_paused: false,
            redraw: true,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    pub fn player(&self) -> &Character {
        &self.player
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Game time in milliseconds. Does not advance while paused.
    pub fn time(&self) -> u64 {
        self.total
    }

    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    pub fn focused_area(&self) -> Option<&Area> {
        self.focused
            .as_deref()
            .and_then(|descriptor| self.areas.get(descriptor))
    }

    pub fn focused_area_mut(&mut self) -> Option<&mut Area> {
        focused_mut(&mut self.areas, &self.focused)
    }

    /// Advances the clock to `now` (milliseconds). The first call only
    /// records the time.
    pub fn update(&mut self, now: u64) {
        let Some(last) = self.last_time.replace(now) else {
            return;
        };
        let dt = now.saturating_sub(last);
        if self.paused > 0 {
            return;
        }
        self.total = self.total.saturating_add(dt);
        self.tick(dt);
    }

    fn tick(&mut self, dt: u64) {
        let move_mode = self.config.move_mode;
        let now = self.total;
        let Some(area) = focused_mut(&mut self.areas, &self.focused) else {
            return;
        };
        area.tick(
            dt,
            AreaUpdate {
                player: &mut self.player,
                viewport: &mut self.viewport,
                move_mode,
                now,
            },
        );
        self.take_player_exit();
    }

    /// Runs one world turn. Only turn-based movement has turns.
    pub fn turn(&mut self) {
        let move_mode = self.config.move_mode;
        if move_mode != MoveMode::Turn {
            return;
        }
        let now = self.total;
        let Some(area) = focused_mut(&mut self.areas, &self.focused) else {
            return;
        };
        area.turn(AreaUpdate {
            player: &mut self.player,
            viewport: &mut self.viewport,
            move_mode,
            now,
        });
        self.take_player_exit();
    }

    /// Loads `descriptor` (or reuses the cached area), moves the player
    /// there at `coords` and focuses it. On error the player stays where
    /// it was.
    pub fn focus_area(&mut self, descriptor: &str, coords: VICoord) -> Result<(), WorldError> {
        let mut area = match self.areas.remove(descriptor) {
            Some(area) => area,
            None => self.load(descriptor)?,
        };
        if area.grid().try_depth_index(coords.depth).is_none() {
            self.areas.insert(descriptor.to_owned(), area);
            return Err(WorldError::UnknownDepth {
                descriptor: descriptor.to_owned(),
                depth: coords.depth,
            });
        }

        match self.focused.take() {
            Some(old) if old == descriptor => area.detach(&mut self.player),
            Some(old) => {
                if let Some(old_area) = self.areas.get_mut(&old) {
                    old_area.detach(&mut self.player);
                }
            }
            None => {}
        }

        area.set_isometric_depth(self.config.isometric_depth);
        let attached = area.attach(&mut self.player, coords);
        debug_assert!(attached, "depth was validated before attaching");
        self.viewport.set_area(Some(area.viewport_bounds()));
        self.viewport
            .track_entity(self.player.id(), self.player.pixel_coord());
        area.focus(self.music.as_mut());

        self.areas.insert(descriptor.to_owned(), area);
        self.focused = Some(descriptor.to_owned());
        self.redraw = true;
        info!(
            area = descriptor,
            x = coords.x,
            y = coords.y,
            depth = coords.depth,
            "player_moved_to_area"
        );
        Ok(())
    }

    fn load(&mut self, descriptor: &str) -> Result<Area, WorldError> {
        let path = self.root.join(descriptor);
        let scripts = self.scripts.create(descriptor);
        let area = load_area(&path, descriptor, &mut self.images, scripts, self.total).map_err(
            |source| {
                error!(area = descriptor, error = %source, "area_load_failed");
                WorldError::Area {
                    descriptor: descriptor.to_owned(),
                    source,
                }
            },
        )?;
        debug!(area = descriptor, cached = self.areas.len() + 1, "area_cached");
        Ok(area)
    }

    fn take_player_exit(&mut self) {
        let Some(exit) = self.player.take_pending_exit() else {
            return;
        };
        if let Err(err) = self.focus_area(&exit.area, exit.coords) {
            warn!(area = %exit.area, error = %err, "exit_failed");
            let move_mode = self.config.move_mode;
            let now = self.total;
            if let Some(area) = focused_mut(&mut self.areas, &self.focused) {
                let mut ctx = area.entity_context(move_mode, now);
                self.player.step_back(&mut ctx);
                area.request_redraw();
            }
        }
    }

    /// Starts walking in `delta`. In turn mode this is one step followed
    /// by a world turn; otherwise the player keeps walking until
    /// [`World::stop_player`].
    pub fn move_player(&mut self, delta: IVec2) {
        if self.paused > 0 || delta.is_zero() {
            return;
        }
        let move_mode = self.config.move_mode;
        let now = self.total;
        let Some(area) = focused_mut(&mut self.areas, &self.focused) else {
            return;
        };
        if move_mode != MoveMode::Turn {
            self.player.set_velocity(delta);
        }
        let moved = {
            let mut ctx = area.entity_context(move_mode, now);
            self.player.move_by_tile(delta, &mut ctx)
        };
        if moved && move_mode == MoveMode::Turn {
            self.turn();
        }
    }

    pub fn stop_player(&mut self) {
        self.player.set_velocity(IVec2::ZERO);
    }

    /// Runs the use script of the tile the player faces.
    pub fn use_player(&mut self) {
        if self.paused > 0 {
            return;
        }
        let move_mode = self.config.move_mode;
        let now = self.total;
        if let Some(area) = focused_mut(&mut self.areas, &self.focused) {
            let mut ctx = area.entity_context(move_mode, now);
            self.player.use_facing(&mut ctx);
            area.request_redraw();
        }
    }

    /// Spawns an NPC from `descriptor` into the focused area.
    pub fn spawn_npc(&mut self, descriptor: &str, coords: VICoord) -> Option<EntityId> {
        let area = focused_mut(&mut self.areas, &self.focused)?;
        let mut factory = CharacterFactory::new(&self.root, &mut self.ids, &mut self.images);
        area.spawn_npc(&mut factory, descriptor, coords)
    }

    /// Spawns an overlay from `descriptor` into the focused area.
    pub fn spawn_overlay(&mut self, descriptor: &str, coords: VICoord) -> Option<EntityId> {
        let area = focused_mut(&mut self.areas, &self.focused)?;
        let mut factory = CharacterFactory::new(&self.root, &mut self.ids, &mut self.images);
        area.spawn_overlay(&mut factory, descriptor, coords)
    }

    pub fn is_paused(&self) -> bool {
        self.paused > 0
    }

    /// Pauses are counted; the world runs again once every pause has been
    /// matched by an unpause.
    pub fn set_paused(&mut self, paused: bool) {
        if !paused && self.paused == 0 {
            error!("unpause_without_pause");
            return;
        }
        if paused {
            self.paused += 1;
        } else {
            self.paused -= 1;
        }
        if self.paused > 0 {
            self.music.pause();
        } else {
            self.music.resume();
        }
        self.redraw = true;
        debug!(depth = self.paused, "pause_changed");
    }

    /// The pause key. Adds or removes one pause level of its own.
    pub fn toggle_user_pause(&mut self) {
        self.user_paused = !self.user_paused;
        self.set_paused(self.user_paused);
        info!(paused = self.user_paused, "user_pause_toggled");
    }

    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.viewport
            .set_size(RVec2::new(width as f32, height as f32));
        self.redraw = true;
    }

    pub fn needs_redraw(&self) -> bool {
        if self.redraw {
            return true;
        }
        if self.paused > 0 {
            return false;
        }
        self.focused_area()
            .is_some_and(|area| area.needs_redraw(&self.player, &self.viewport, self.total))
    }

    /// Fills `display` with the focused area as seen through the viewport.
    pub fn draw(&mut self, display: &mut DisplayList) {
        display.clear();
        display.padding = self.viewport.letterbox_offset();
        display.scale = self.viewport.scale();
        display.scroll = self.viewport.map_offset();
        display.size = self.viewport.phys_res();
        display.paused = self.paused > 0;
        let now = self.total;
        if let Some(area) = focused_mut(&mut self.areas, &self.focused) {
            display.loop_x = area.grid().loops_x();
            display.loop_y = area.grid().loops_y();
            area.draw(display, &mut self.player, &self.viewport, now);
        }
        self.redraw = false;
    }
}

fn focused_mut<'a>(
    areas: &'a mut HashMap<String, Area>,
    focused: &Option<String>,
) -> Option<&'a mut Area> {
    focused
        .as_deref()
        .and_then(move |descriptor| areas.get_mut(descriptor))
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("root", &self.root)
            .field("focused", &self.focused)
            .field("areas", &self.areas.len())
            .field("time", &self.total)
            .field("paused", &self.paused)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::app::{AreaScripts, ScriptContext};
    use crate::grid::ICoord;

    #[derive(Debug, Default)]
    struct Log {
        music: Vec<String>,
        ticks: Vec<u64>,
        turns: u32,
    }

    struct SharedMusic(Rc<RefCell<Log>>);

    impl MusicSink for SharedMusic {
        fn play(&mut self, path: &str) {
            self.0.borrow_mut().music.push(format!("play {path}"));
        }

        fn stop(&mut self) {
            self.0.borrow_mut().music.push("stop".to_string());
        }

        fn pause(&mut self) {
            self.0.borrow_mut().music.push("pause".to_string());
        }

        fn resume(&mut self) {
            self.0.borrow_mut().music.push("resume".to_string());
        }
    }

    struct Recorder(Rc<RefCell<Log>>);

    impl AreaScripts for Recorder {
        fn on_tick(&mut self, _ctx: &mut ScriptContext<'_>, dt: u64) {
            self.0.borrow_mut().ticks.push(dt);
        }

        fn on_turn(&mut self, _ctx: &mut ScriptContext<'_>) {
            self.0.borrow_mut().turns += 1;
        }
    }

    fn write_map(dir: &Path, name: &str, music: &str, objects: serde_json::Value) {
        let map = json!({
            "width": 3,
            "height": 3,
            "properties": { "name": name, "music": music },
            "tilesets": [{ "firstgid": 1, "source": "tiles.json" }],
            "layers": [
                {
                    "type": "tilelayer",
                    "width": 3,
                    "height": 3,
                    "properties": { "depth": "0" },
                    "data": [1, 1, 1, 1, 1, 1, 1, 1, 1]
                },
                {
                    "type": "objectgroup",
                    "properties": { "depth": "1" },
                    "objects": objects
                }
            ]
        });
        fs::write(dir.join(name), map.to_string()).expect("map");
    }

    struct Fixture {
        dir: TempDir,
        log: Rc<RefCell<Log>>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().expect("temp dir");
            let root = dir.path();
            image::RgbaImage::new(32, 32)
                .save(root.join("sheet.png"))
                .expect("sheet");
            image::RgbaImage::new(16, 16)
                .save(root.join("player.png"))
                .expect("player");
            let tileset = json!({
                "image": "sheet.png",
                "imagewidth": 32,
                "imageheight": 32,
                "tilewidth": 16,
                "tileheight": 16
            });
            fs::write(root.join("tiles.json"), tileset.to_string()).expect("tileset");
            fs::write(
                root.join("npc.json"),
                json!({ "image": "player.png", "tile_width": 16, "tile_height": 16 }).to_string(),
            )
            .expect("npc");
            write_map(
                root,
                "town.json",
                "town.ogg",
                json!([
                    {
                        "x": 32, "y": 0, "width": 16, "height": 16,
                        "properties": { "exit": "field.json,1,1,1" }
                    },
                    {
                        "x": 0, "y": 32, "width": 16, "height": 16,
                        "properties": { "exit": "nowhere.json,0,0,1" }
                    }
                ]),
            );
            write_map(root, "field.json", "field.ogg", json!([]));
            Self {
                dir,
                log: Rc::new(RefCell::new(Log::default())),
            }
        }

        fn world(&self, move_mode: MoveMode) -> World {
            let config = EngineConfig {
                move_mode,
                ..EngineConfig::default()
            };
            let spec = CharacterSpec {
                image: PathBuf::from("player.png"),
                tile_width: 16,
                tile_height: 16,
                speed: 4.0,
                frame_ms: 250,
            };
            let mut scripts = ScriptRegistry::new();
            let log = Rc::clone(&self.log);
            scripts.register("town.json", move || -> Box<dyn AreaScripts> {
                Box::new(Recorder(Rc::clone(&log)))
            });
            World::new(
                self.dir.path(),
                config,
                &spec,
                Box::new(SharedMusic(Rc::clone(&self.log))),
                scripts,
            )
            .expect("world")
        }
    }

    fn focused(world: &World) -> Option<&str> {
        world.focused_area().map(|area| area.descriptor())
    }

    #[test]
    fn focus_loads_once_and_starts_music() {
        let fixture = Fixture::new();
        let mut world = fixture.world(MoveMode::Tile);

        world
            .focus_area("town.json", VICoord::new(1, 0, 0.0))
            .expect("town");
        world
            .focus_area("town.json", VICoord::new(1, 1, 0.0))
            .expect("town again");

        assert_eq!(world.area_count(), 1);
        assert_eq!(focused(&world), Some("town.json"));
        assert_eq!(world.player().tile_coords(), ICoord::new(1, 1, 0));
        assert_eq!(fixture.log.borrow().music, vec!["play town.ogg", "play town.ogg"]);
        let area = world.focused_area().expect("area");
        assert!(!area.grid().occupied(ICoord::new(1, 0, 0)));
        assert!(area.grid().occupied(ICoord::new(1, 1, 0)));
    }

    #[test]
    fn failed_load_is_not_cached_and_keeps_focus() {
        let fixture = Fixture::new();
        let mut world = fixture.world(MoveMode::Tile);
        world
            .focus_area("town.json", VICoord::new(1, 1, 0.0))
            .expect("town");

        let err = world
            .focus_area("nowhere.json", VICoord::new(0, 0, 0.0))
            .expect_err("missing map");

        assert!(matches!(err, WorldError::Area { .. }));
        assert_eq!(world.area_count(), 1);
        assert_eq!(focused(&world), Some("town.json"));
        assert_eq!(world.player().tile_coords(), ICoord::new(1, 1, 0));
    }

    #[test]
    fn unknown_depth_keeps_the_player_in_place() {
        let fixture = Fixture::new();
        let mut world = fixture.world(MoveMode::Tile);
        world
            .focus_area("town.json", VICoord::new(1, 1, 0.0))
            .expect("town");

        let err = world
            .focus_area("field.json", VICoord::new(0, 0, 7.0))
            .expect_err("depth");

        assert!(matches!(err, WorldError::UnknownDepth { .. }));
        assert_eq!(focused(&world), Some("town.json"));
        assert_eq!(world.area_count(), 2);
    }

    #[test]
    fn first_update_does_not_tick_and_pause_stops_the_clock() {
        let fixture = Fixture::new();
        let mut world = fixture.world(MoveMode::Tile);
        world
            .focus_area("town.json", VICoord::new(1, 1, 0.0))
            .expect("town");

        world.update(1000);
        world.update(1016);
        world.set_paused(true);
        world.update(1100);
        world.set_paused(false);
        world.update(1200);

        assert_eq!(fixture.log.borrow().ticks, vec![16, 100]);
        assert_eq!(world.time(), 116);
        assert!(fixture.log.borrow().music.ends_with(&["pause".to_string(), "resume".to_string()]));
    }

    #[test]
    fn pauses_nest_and_unmatched_unpause_is_ignored() {
        let fixture = Fixture::new();
        let mut world = fixture.world(MoveMode::Tile);

        world.set_paused(false);
        assert!(!world.is_paused());

        world.toggle_user_pause();
        world.set_paused(true);
        world.toggle_user_pause();
        assert!(world.is_paused());
        world.set_paused(false);
        assert!(!world.is_paused());
    }

    #[test]
    fn turn_only_runs_in_turn_mode() {
        let fixture = Fixture::new();
        let mut world = fixture.world(MoveMode::Tile);
        world
            .focus_area("town.json", VICoord::new(1, 1, 0.0))
            .expect("town");

        world.turn();
        assert_eq!(fixture.log.borrow().turns, 0);

        let mut world = fixture.world(MoveMode::Turn);
        world
            .focus_area("town.json", VICoord::new(1, 1, 0.0))
            .expect("town");
        world.turn();
        assert_eq!(fixture.log.borrow().turns, 1);
    }

    #[test]
    fn stepping_onto_an_exit_in_turn_mode_changes_area() {
        let fixture = Fixture::new();
        let mut world = fixture.world(MoveMode::Turn);
        world
            .focus_area("town.json", VICoord::new(1, 0, 1.0))
            .expect("town");

        world.move_player(IVec2::new(1, 0));

        assert_eq!(focused(&world), Some("field.json"));
        assert_eq!(world.player().tile_coords(), ICoord::new(1, 1, 1));
        assert_eq!(fixture.log.borrow().turns, 1);
        assert_eq!(fixture.log.borrow().music.last().map(String::as_str), Some("play field.ogg"));
    }

    #[test]
    fn broken_exit_steps_the_player_back() {
        let fixture = Fixture::new();
        let mut world = fixture.world(MoveMode::Turn);
        world
            .focus_area("town.json", VICoord::new(0, 1, 1.0))
            .expect("town");

        world.move_player(IVec2::new(0, 1));

        assert_eq!(focused(&world), Some("town.json"));
        assert_eq!(world.player().tile_coords(), ICoord::new(0, 1, 1));
        let area = world.focused_area().expect("area");
        assert!(area.grid().occupied(ICoord::new(0, 1, 1)));
        assert!(!area.grid().occupied(ICoord::new(0, 2, 1)));
    }

    #[test]
    fn tile_mode_walks_onto_exit_during_updates() {
        let fixture = Fixture::new();
        let mut world = fixture.world(MoveMode::Tile);
        world
            .focus_area("town.json", VICoord::new(1, 0, 1.0))
            .expect("town");

        world.update(0);
        world.move_player(IVec2::new(1, 0));
        world.stop_player();
        assert_eq!(focused(&world), Some("town.json"));

        world.update(1000);

        assert_eq!(focused(&world), Some("field.json"));
        assert_eq!(world.player().tile_coords(), ICoord::new(1, 1, 1));
    }

    #[test]
    fn draw_fills_view_transform_and_clears_redraw() {
        let fixture = Fixture::new();
        let mut world = fixture.world(MoveMode::Tile);
        world.set_window_size(480, 320);
        world
            .focus_area("town.json", VICoord::new(1, 1, 0.0))
            .expect("town");
        assert!(world.needs_redraw());

        let mut display = DisplayList::new();
        world.draw(&mut display);

        assert_eq!(display.scale, RVec2::new(2.0, 2.0));
        assert_eq!(display.size, RVec2::new(480.0, 320.0));
        assert!(!display.paused);
        assert_eq!(display.items.len(), 10);
        assert!(!world.needs_redraw());

        world.toggle_user_pause();
        assert!(world.needs_redraw());
        world.draw(&mut display);
        assert!(display.paused);
    }

    #[test]
    fn spawned_npc_occupies_its_tile() {
        let fixture = Fixture::new();
        let mut world = fixture.world(MoveMode::Tile);
        world
            .focus_area("town.json", VICoord::new(1, 1, 0.0))
            .expect("town");

        let id = world.spawn_npc("npc.json", VICoord::new(2, 2, 0.0));

        assert!(id.is_some_and(|id| id != world.player().id()));
        let area = world.focused_area().expect("area");
        assert_eq!(area.character_count(), 1);
        assert!(area.grid().occupied(ICoord::new(2, 2, 0)));
        assert!(world.spawn_npc("ghost.json", VICoord::new(0, 0, 0.0)).is_none());
    }
}
