mod coords;
mod tile;
mod tile_grid;

use thiserror::Error;

pub use coords::{
    isometric_z_offset, DepthTable, ICoord, ICube, IVec2, RCoord, RVec2, VICoord,
    ISOMETRIC_ZOFF_PER_TILE,
};
pub use tile::{
    Exit, ExitDirection, ScriptId, Tile, TileFlags, TileScripts, TileSet, TileTrigger, TileType,
    TileTypeId, EXIT_DIRECTION_COUNT,
};
pub use tile_grid::{LayerKind, TileGrid};

#[derive(Debug, Error)]
pub enum GridError {
    #[error("layers cannot share a depth: {depth}")]
    DuplicateDepth { depth: f32 },
    #[error("layer depth must be a finite number, got {depth}")]
    InvalidDepth { depth: f32 },
    #[error("grid dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: i32, height: i32 },
    #[error("tile dimensions must be positive, got {width}x{height}")]
    InvalidTileDim { width: i32, height: i32 },
}
