use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::app::ImageError;
use crate::grid::GridError;

/// Map file backends, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapFormat {
    TiledJson,
}

impl MapFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Some(MapFormat::TiledJson),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum MapLoadError {
    #[error("no map loader for {path}")]
    UnsupportedFormat { path: PathBuf },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: tileset image failed: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
    #[error("{path}: {source}")]
    Grid {
        path: PathBuf,
        #[source]
        source: GridError,
    },
    #[error(
        "{path}: tileset tile size {found_width}x{found_height} contradicts earlier \
         {expected_width}x{expected_height}"
    )]
    TileDimMismatch {
        path: PathBuf,
        expected_width: i32,
        expected_height: i32,
        found_width: i32,
        found_height: i32,
    },
    #[error("{path}: object layer needs a tileset before it")]
    MissingTileDim { path: PathBuf },
    #[error("{path}: tileset firstgid {firstgid} overlaps gids up to {next_gid}")]
    OverlappingGids {
        path: PathBuf,
        firstgid: u32,
        next_gid: usize,
    },
    #[error("{path}: tile type id {id} is invalid")]
    InvalidTileTypeId { path: PathBuf, id: String },
    #[error("{path}: frame {frame} out of range for animated tile {id}")]
    FrameOutOfRange { path: PathBuf, id: usize, frame: String },
    #[error("{path}: first frame of tile {id} animation must be itself")]
    FrameNotSelf { path: PathBuf, id: usize },
    #[error("{path}: tile {id} needs both frames and speed or neither")]
    IncompleteAnimation { path: PathBuf, id: usize },
    #[error(
        "{path}: layer size {width}x{height} differs from map size {map_width}x{map_height}"
    )]
    LayerSizeMismatch {
        path: PathBuf,
        width: i64,
        height: i64,
        map_width: i32,
        map_height: i32,
    },
    #[error("{path}: layer data has {found} cells, expected {expected}")]
    LayerDataLength {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("{path}: {kind} layer needs a \"depth\" property")]
    MissingDepth { path: PathBuf, kind: &'static str },
    #[error("{path}: unknown tile gid {gid}")]
    UnknownGid { path: PathBuf, gid: u32 },
    #[error("{path}: each layer must be a tilelayer or objectgroup, found \"{kind}\"")]
    UnknownLayerType { path: PathBuf, kind: String },
    #[error("{path}: invalid property {name}=\"{value}\": {reason}")]
    InvalidProperty {
        path: PathBuf,
        name: String,
        value: String,
        reason: &'static str,
    },
    #[error("{path}: script \"{name}\" not found")]
    UnknownScript { path: PathBuf, name: String },
    #[error("{path}: object at ({x},{y}) size {width}x{height} leaves the map")]
    ObjectOutOfBounds {
        path: PathBuf,
        x: i64,
        y: i64,
        width: i64,
        height: i64,
    },
    #[error("{path}: layermod targets unknown depth {depth}")]
    UnknownLayermodDepth { path: PathBuf, depth: f32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_picked_by_extension() {
        assert_eq!(
            MapFormat::from_path(Path::new("areas/town.json")),
            Some(MapFormat::TiledJson)
        );
        assert_eq!(
            MapFormat::from_path(Path::new("areas/TOWN.JSON")),
            Some(MapFormat::TiledJson)
        );
        assert_eq!(MapFormat::from_path(Path::new("areas/town.tmx")), None);
        assert_eq!(MapFormat::from_path(Path::new("areas/town")), None);
    }
}
