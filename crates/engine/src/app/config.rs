use std::str::FromStr;

use serde::Deserialize;

use crate::grid::RVec2;

/// How entity movement is paced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveMode {
    /// The world only advances when the player takes a step.
    Turn,
    /// Real-time, tile-by-tile movement.
    #[default]
    Tile,
    /// Real-time free movement.
    NoTile,
}

impl FromStr for MoveMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "turn" => Ok(MoveMode::Turn),
            "tile" => Ok(MoveMode::Tile),
            "notile" | "no_tile" => Ok(MoveMode::NoTile),
            other => Err(format!("unknown move mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub move_mode: MoveMode,
    pub virtual_resolution: RVec2,
    pub isometric_depth: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            move_mode: MoveMode::default(),
            virtual_resolution: RVec2::new(240.0, 160.0),
            isometric_depth: true,
        }
    }
}
