use std::cell::Cell;

use bitflags::bitflags;
use tracing::error;

use crate::app::Animation;

use super::coords::{IVec2, VICoord};

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct TileFlags: u32 {
        const NOWALK = 0x001;
        const NOWALK_PLAYER = 0x002;
        const NOWALK_NPC = 0x004;
        const NOWALK_EXIT = 0x008;
        const NOWALK_AREA_BOUND = 0x010;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitDirection {
    Normal,
    Up,
    Down,
    Left,
    Right,
}

pub const EXIT_DIRECTION_COUNT: usize = 5;

impl ExitDirection {
    pub const ALL: [ExitDirection; EXIT_DIRECTION_COUNT] = [
        ExitDirection::Normal,
        ExitDirection::Up,
        ExitDirection::Down,
        ExitDirection::Left,
        ExitDirection::Right,
    ];

    pub fn from_facing(facing: IVec2) -> Option<Self> {
        match (facing.x, facing.y) {
            (0, 0) => Some(ExitDirection::Normal),
            (0, -1) => Some(ExitDirection::Up),
            (0, 1) => Some(ExitDirection::Down),
            (-1, 0) => Some(ExitDirection::Left),
            (1, 0) => Some(ExitDirection::Right),
            _ => None,
        }
    }

    /// Property-name suffix used by the map format, e.g. `exit:up`.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "" => Some(ExitDirection::Normal),
            "up" => Some(ExitDirection::Up),
            "down" => Some(ExitDirection::Down),
            "left" => Some(ExitDirection::Left),
            "right" => Some(ExitDirection::Right),
            _ => None,
        }
    }

    pub const fn index(self) -> usize {
        match self {
            ExitDirection::Normal => 0,
            ExitDirection::Up => 1,
            ExitDirection::Down => 2,
            ExitDirection::Left => 3,
            ExitDirection::Right => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exit {
    pub area: String,
    pub coords: VICoord,
}

/// Handle to a script resolved by the area's scripting glue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileTrigger {
    Enter,
    Leave,
    Use,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileScripts {
    pub on_enter: Option<ScriptId>,
    pub on_leave: Option<ScriptId>,
    pub on_use: Option<ScriptId>,
}

impl TileScripts {
    pub fn get(&self, trigger: TileTrigger) -> Option<ScriptId> {
        match trigger {
            TileTrigger::Enter => self.on_enter,
            TileTrigger::Leave => self.on_leave,
            TileTrigger::Use => self.on_use,
        }
    }

    pub fn set(&mut self, trigger: TileTrigger, script: Option<ScriptId>) {
        match trigger {
            TileTrigger::Enter => self.on_enter = script,
            TileTrigger::Leave => self.on_leave = script,
            TileTrigger::Use => self.on_use = script,
        }
    }
}

/// Index of a [`TileType`] in its area's type arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileTypeId(pub u32);

impl TileTypeId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Default)]
pub struct Tile {
    pub flags: TileFlags,
    pub scripts: TileScripts,
    pub tile_type: Option<TileTypeId>,
    exits: [Option<Exit>; EXIT_DIRECTION_COUNT],
    layermods: [Option<f32>; EXIT_DIRECTION_COUNT],
    entity_count: u32,
}

impl Tile {
    pub fn exit_at(&self, direction: ExitDirection) -> Option<&Exit> {
        self.exits[direction.index()].as_ref()
    }

    pub fn set_exit(&mut self, direction: ExitDirection, exit: Option<Exit>) {
        self.exits[direction.index()] = exit;
    }

    pub fn layermod_at(&self, direction: ExitDirection) -> Option<f32> {
        self.layermods[direction.index()]
    }

    pub fn set_layermod(&mut self, direction: ExitDirection, depth: Option<f32>) {
        self.layermods[direction.index()] = depth;
    }

    /// Checks this tile's own flags first, then the flags of its type.
    pub fn has_flag(&self, flag: TileFlags, types: &[TileType]) -> bool {
        if self.flags.intersects(flag) {
            return true;
        }
        self.tile_type
            .and_then(|id| types.get(id.index()))
            .is_some_and(|tile_type| tile_type.flags.intersects(flag))
    }

    pub fn entity_count(&self) -> u32 {
        self.entity_count
    }

    pub fn is_occupied(&self) -> bool {
        self.entity_count > 0
    }

    pub fn add_entity(&mut self) {
        self.entity_count = self.entity_count.saturating_add(1);
    }

    pub fn remove_entity(&mut self) {
        self.entity_count = self.entity_count.saturating_sub(1);
    }
}

#[derive(Debug, Clone)]
pub struct TileType {
    pub anim: Animation,
    pub flags: TileFlags,
    pub scripts: TileScripts,
    checked_generation: Cell<u64>,
}

impl TileType {
    pub fn new(anim: Animation) -> Self {
        Self {
            anim,
            flags: TileFlags::empty(),
            scripts: TileScripts::default(),
            checked_generation: Cell::new(0),
        }
    }

    /// Stamps this type for redraw scan `generation`. Returns false when it
    /// was already stamped during the same scan.
    pub(crate) fn mark_checked(&self, generation: u64) -> bool {
        if self.checked_generation.get() == generation {
            return false;
        }
        self.checked_generation.set(generation);
        true
    }
}

/// Maps positions inside one tileset image to tile types.
#[derive(Debug, Clone, Default)]
pub struct TileSet {
    width: usize,
    height: usize,
    types: Vec<TileTypeId>,
}

impl TileSet {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            types: Vec::with_capacity(width.saturating_mul(height)),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn add(&mut self, tile_type: TileTypeId) {
        self.types.push(tile_type);
    }

    pub fn set(&mut self, index: usize, tile_type: TileTypeId) -> bool {
        match self.types.get_mut(index) {
            Some(slot) => {
                *slot = tile_type;
                true
            }
            None => false,
        }
    }

    pub fn at_index(&self, index: usize) -> Option<TileTypeId> {
        self.types.get(index).copied()
    }

    pub fn at(&self, x: usize, y: usize) -> Option<TileTypeId> {
        if x >= self.width || y >= self.height {
            error!(
                x,
                y,
                width = self.width,
                height = self.height,
                "tileset_index_out_of_bounds"
            );
            return None;
        }
        self.at_index(y * self.width + x)
    }
}
