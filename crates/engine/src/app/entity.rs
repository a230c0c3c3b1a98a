use crate::grid::{ICoord, ICube, IVec2, RCoord, TileGrid, TileTrigger, TileType};

use super::data_area::{DataArea, TileEvent};
use super::{DisplayList, MoveMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

/// What an entity learns about the area it is placed in.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaBinding {
    pub descriptor: String,
    pub tile_dim: IVec2,
    pub position: RCoord,
    /// Physical layer index of `position.z`.
    pub layer: i32,
    pub isometric: bool,
}

/// Borrowed view of an area's grid and scripting glue handed to entities
/// while they update.
pub struct EntityContext<'a> {
    pub grid: &'a mut TileGrid,
    pub tile_types: &'a [TileType],
    pub data_area: &'a mut DataArea,
    pub move_mode: MoveMode,
    pub now: u64,
}

impl EntityContext<'_> {
    /// Runs the tile's own script for `trigger`, then its type's.
    pub fn run_tile_scripts(&mut self, trigger: TileTrigger, phys: ICoord, entity: Option<EntityId>) {
        let Some(tile) = self.grid.get_tile_mut(phys) else {
            return;
        };
        let own = tile.scripts.get(trigger);
        let inherited = tile
            .tile_type
            .and_then(|id| self.tile_types.get(id.index()))
            .and_then(|tile_type| tile_type.scripts.get(trigger));
        let event = TileEvent {
            trigger,
            coords: phys,
            entity,
        };
        for script in own.into_iter().chain(inherited) {
            self.data_area.run(script, &event, tile);
        }
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
}

/// The contract an area relies on for the player, NPCs and overlays.
pub trait Entity {
    fn id(&self) -> EntityId;

    fn tick(&mut self, dt: u64, ctx: &mut EntityContext<'_>);

    fn turn(&mut self, ctx: &mut EntityContext<'_>);

    fn is_dead(&self) -> bool;

    /// Attaches to an area at a position, or detaches with `None`.
    fn set_area(&mut self, binding: Option<AreaBinding>);

    /// Whether this entity changed on-screen pixels inside `visible_px`.
    fn needs_redraw(&self, visible_px: &ICube, now: u64) -> bool;

    fn draw(&mut self, display: &mut DisplayList, now: u64);

    fn tile_coords(&self) -> ICoord;

    fn pixel_coord(&self) -> RCoord;

    /// Whether the entity counts towards tile occupancy.
    fn occupies_tiles(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Npc,
    Overlay,
}

/// Builds entities from descriptors for an area's roster.
pub trait EntityFactory {
    fn create(&mut self, descriptor: &str, kind: EntityKind) -> Option<Box<dyn Entity>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AreaScripts, ScriptContext, ScriptTable};
    use crate::grid::{LayerKind, ScriptId, Tile, TileFlags, TileTypeId};
    use crate::app::{Animation, ImageId};

    fn grid_with_layer() -> TileGrid {
        let mut grid = TileGrid::new("ctx.json", 3, 3).expect("grid");
        grid.allocate_layer(LayerKind::Tiles, 0.0).expect("layer");
        grid
    }

    #[test]
    fn allocator_hands_out_increasing_ids() {
        let mut ids = EntityIdAllocator::default();
        assert_eq!(ids.allocate(), EntityId(0));
        assert_eq!(ids.allocate(), EntityId(1));
    }

    #[test]
    fn enter_and_leave_keep_occupancy() {
        let mut grid = grid_with_layer();
        let mut data = DataArea::without_scripts("ctx.json");
        let mut ctx = EntityContext {
            grid: &mut grid,
            tile_types: &[],
            data_area: &mut data,
            move_mode: MoveMode::Tile,
            now: 0,
        };
        let phys = ICoord::new(1, 1, 0);

        ctx.enter_tile(phys);
        assert!(ctx.grid.occupied(phys));
        ctx.leave_tile(phys);
        assert!(!ctx.grid.occupied(phys));
        ctx.leave_tile(ICoord::new(9, 9, 0));
    }

    struct Recorder;

    impl AreaScripts for Recorder {
        fn resolve(&self, name: &str) -> Option<ScriptId> {
            name.parse().ok().map(ScriptId)
        }

        fn run(
            &mut self,
            _ctx: &mut ScriptContext<'_>,
            script: ScriptId,
            _event: &TileEvent,
            tile: &mut Tile,
        ) {
            let bit = if script.0 == 1 {
                TileFlags::NOWALK
            } else {
                TileFlags::NOWALK_NPC
            };
            tile.flags |= bit;
        }
    }

    #[test]
    fn tile_scripts_run_own_then_inherited() {
        let mut grid = grid_with_layer();
        let mut tile_type = TileType::new(Animation::still(ImageId(0)));
        tile_type.scripts.on_enter = Some(ScriptId(2));
        let types = vec![tile_type];
        {
            let tile = grid.get_tile_mut(ICoord::new(0, 0, 0)).expect("tile");
            tile.scripts.on_enter = Some(ScriptId(1));
            tile.tile_type = Some(TileTypeId(0));
        }
        let mut data = DataArea::new("ctx.json", Box::new(Recorder));
        let mut ctx = EntityContext {
            grid: &mut grid,
            tile_types: &types,
            data_area: &mut data,
            move_mode: MoveMode::Tile,
            now: 0,
        };

        ctx.run_tile_scripts(TileTrigger::Enter, ICoord::new(0, 0, 0), None);
        ctx.run_tile_scripts(TileTrigger::Leave, ICoord::new(1, 0, 0), None);

        let flags = grid.get_tile(ICoord::new(0, 0, 0)).expect("tile").flags;
        assert!(flags.contains(TileFlags::NOWALK | TileFlags::NOWALK_NPC));
        assert!(grid.get_tile(ICoord::new(1, 0, 0)).expect("tile").flags.is_empty());
    }

    #[test]
    fn script_table_runs_through_context() {
        let mut grid = grid_with_layer();
        let table = ScriptTable::new().with_script("mark", |_, event, tile| {
            if event.trigger == TileTrigger::Use {
                tile.flags |= TileFlags::NOWALK_PLAYER;
            }
        });
        let mut data = DataArea::new("ctx.json", Box::new(table));
        let script = data.resolve("mark");
        grid.get_tile_mut(ICoord::new(2, 2, 0)).expect("tile").scripts.on_use = script;

        let mut ctx = EntityContext {
            grid: &mut grid,
            tile_types: &[],
            data_area: &mut data,
            move_mode: MoveMode::Turn,
            now: 0,
        };
        ctx.run_tile_scripts(TileTrigger::Use, ICoord::new(2, 2, 0), Some(EntityId(4)));

        assert!(grid
            .get_tile(ICoord::new(2, 2, 0))
            .expect("tile")
            .flags
            .contains(TileFlags::NOWALK_PLAYER));
    }
}
