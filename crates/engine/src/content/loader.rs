use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::app::{AreaScripts, Animation, DataArea, ImageId, ImageSource};
use crate::area::{Area, AreaContents};
use crate::grid::{
    ExitDirection, GridError, ICoord, IVec2, LayerKind, ScriptId, TileFlags, TileGrid,
    TileScripts, TileSet, TileTrigger, TileType, TileTypeId,
};

use super::format::{property, LayerFile, MapFile, ObjectFile, Properties, TilesetFile, TilesetRef};
use super::parse::{
    parse_argb, parse_depth, parse_exit, parse_flags, parse_loop, parse_speed, ParsedExit,
};
use super::types::{MapFormat, MapLoadError};

const SCRIPT_PROPERTIES: [(TileTrigger, &str); 3] = [
    (TileTrigger::Enter, "on_enter"),
    (TileTrigger::Leave, "on_leave"),
    (TileTrigger::Use, "on_use"),
];

/// Loads the map at `path` into a new area named `descriptor`. The backend
/// is picked from the file extension.
pub fn load_area(
    path: &Path,
    descriptor: &str,
    images: &mut dyn ImageSource,
    scripts: Box<dyn AreaScripts>,
    now: u64,
) -> Result<Area, MapLoadError> {
    match MapFormat::from_path(path) {
        Some(MapFormat::TiledJson) => load_tiled_json(path, descriptor, images, scripts, now),
        None => Err(MapLoadError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

fn load_tiled_json(
    path: &Path,
    descriptor: &str,
    images: &mut dyn ImageSource,
    scripts: Box<dyn AreaScripts>,
    now: u64,
) -> Result<Area, MapLoadError> {
    let map: MapFile = read_json(path)?;
    let data_area = DataArea::new(descriptor, scripts);

    let width = clamp_dimension(map.width);
    let height = clamp_dimension(map.height);
    let grid = TileGrid::new(descriptor, width, height).map_err(|source| MapLoadError::Grid {
        path: path.to_path_buf(),
        source,
    })?;

    let mut build = BuildContext {
        map_path: path,
        map_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        images,
        data_area: &data_area,
        now,
        grid,
        gids: vec![None],
        tile_dim: None,
        tile_types: Vec::new(),
        tile_sets: HashMap::new(),
        layermods: Vec::new(),
    };

    let meta = build.map_properties(&map.properties)?;
    for tileset in &map.tilesets {
        build.add_tileset(tileset)?;
    }
    for layer in &map.layers {
        match layer.kind.as_str() {
            "tilelayer" => build.add_tile_layer(layer)?,
            "objectgroup" => build.add_object_layer(layer)?,
            other => {
                return Err(MapLoadError::UnknownLayerType {
                    path: path.to_path_buf(),
                    kind: other.to_owned(),
                })
            }
        }
    }
    build.check_layermods()?;

    let BuildContext {
        grid,
        tile_types,
        tile_sets,
        ..
    } = build;
    info!(
        area = descriptor,
        width,
        height,
        layers = grid.layer_count(),
        tile_types = tile_types.len(),
        tile_sets = tile_sets.len(),
        "area_loaded"
    );
    let contents = AreaContents {
        grid,
        tile_types,
        tile_sets,
        name: meta.name,
        music: meta.music,
        color_overlay_argb: meta.color_overlay_argb,
    };
    Ok(Area::new(contents, data_area))
}

fn clamp_dimension(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, MapLoadError> {
    let text = fs::read_to_string(path).map_err(|source| MapLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| MapLoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn invalid_property(path: &Path, name: &str, value: &str, reason: &'static str) -> MapLoadError {
    MapLoadError::InvalidProperty {
        path: path.to_path_buf(),
        name: name.to_owned(),
        value: value.to_owned(),
        reason,
    }
}

/// Direction named by `name` when it is `base` or `base:dir`.
fn directional(name: &str, base: &str) -> Option<ExitDirection> {
    let rest = name.strip_prefix(base)?;
    if rest.is_empty() {
        return Some(ExitDirection::Normal);
    }
    ExitDirection::from_suffix(rest.strip_prefix(':')?)
}

struct MapMeta {
    name: String,
    music: Option<String>,
    color_overlay_argb: u32,
}

/// Properties of one object, applied to every tile it covers.
#[derive(Default)]
struct ObjectEffects {
    flags: TileFlags,
    scripts: TileScripts,
    exits: Vec<(ExitDirection, ParsedExit)>,
    layermods: Vec<(ExitDirection, f32)>,
}

/// Per-load state. The gid table lives here and is dropped with it.
struct BuildContext<'a> {
    map_path: &'a Path,
    map_dir: PathBuf,
    images: &'a mut dyn ImageSource,
    data_area: &'a DataArea,
    now: u64,
    grid: TileGrid,
    /// Global tile ids to types. Gid 0 is the empty tile.
    gids: Vec<Option<TileTypeId>>,
    tile_dim: Option<IVec2>,
    tile_types: Vec<TileType>,
    tile_sets: HashMap<PathBuf, TileSet>,
    layermods: Vec<f32>,
}

impl BuildContext<'_> {
    fn map_properties(&mut self, properties: &Properties) -> Result<MapMeta, MapLoadError> {
        let name = match property(properties, "name") {
            Some(name) => name.into_owned(),
            None => {
                info!(area = self.grid.descriptor(), "area_name_missing");
                String::new()
            }
        };
        let music = property(properties, "music").map(|music| music.into_owned());
        if let Some(raw) = property(properties, "loop") {
            let (loop_x, loop_y) = parse_loop(&raw);
            self.grid.set_looping(loop_x, loop_y);
        }
        let color_overlay_argb = match property(properties, "color_overlay") {
            Some(raw) => parse_argb(&raw)
                .map_err(|reason| invalid_property(self.map_path, "color_overlay", &raw, reason))?,
            None => 0,
        };
        Ok(MapMeta {
            name,
            music,
            color_overlay_argb,
        })
    }

    fn resolve_script(&self, path: &Path, name: &str) -> Result<ScriptId, MapLoadError> {
        self.data_area
            .resolve(name)
            .ok_or_else(|| MapLoadError::UnknownScript {
                path: path.to_path_buf(),
                name: name.to_owned(),
            })
    }

    fn scripts_from(&self, path: &Path, properties: &Properties) -> Result<TileScripts, MapLoadError> {
        let mut scripts = TileScripts::default();
        for (trigger, key) in SCRIPT_PROPERTIES {
            if let Some(name) = property(properties, key) {
                scripts.set(trigger, Some(self.resolve_script(path, &name)?));
            }
        }
        Ok(scripts)
    }

    fn use_tile_dim(&mut self, path: &Path, tile_width: u32, tile_height: u32) -> Result<(), MapLoadError> {
        let found = IVec2::new(tile_width as i32, tile_height as i32);
        match self.tile_dim {
            Some(expected) if expected != found => Err(MapLoadError::TileDimMismatch {
                path: path.to_path_buf(),
                expected_width: expected.x,
                expected_height: expected.y,
                found_width: found.x,
                found_height: found.y,
            }),
            Some(_) => Ok(()),
            None => {
                self.grid
                    .set_tile_dim(found)
                    .map_err(|source| MapLoadError::Grid {
                        path: path.to_path_buf(),
                        source,
                    })?;
                self.tile_dim = Some(found);
                Ok(())
            }
        }
    }

    fn add_tileset(&mut self, tileset: &TilesetRef) -> Result<(), MapLoadError> {
        let source = self.map_dir.join(&tileset.source);
        let file: TilesetFile = read_json(&source)?;
        self.use_tile_dim(&source, file.tilewidth, file.tileheight)?;

        let first_gid = tileset.firstgid as usize;
        if first_gid < self.gids.len() {
            return Err(MapLoadError::OverlappingGids {
                path: source,
                firstgid: tileset.firstgid,
                next_gid: self.gids.len(),
            });
        }

        let image_path = source
            .parent()
            .map(|dir| dir.join(&file.image))
            .unwrap_or_else(|| PathBuf::from(&file.image));
        let images = self
            .images
            .load_tiles(&image_path, file.tilewidth, file.tileheight)
            .map_err(|err| MapLoadError::Image {
                path: source.clone(),
                source: err,
            })?;

        self.gids.resize(first_gid, None);
        let first_type = self.tile_types.len();
        let mut set = TileSet::new(
            (file.imagewidth / file.tilewidth) as usize,
            (file.imageheight / file.tileheight) as usize,
        );
        for image in &images {
            let id = TileTypeId(self.tile_types.len() as u32);
            self.tile_types.push(TileType::new(Animation::still(*image)));
            self.gids.push(Some(id));
            set.add(id);
        }
        for (key, properties) in &file.tileproperties {
            self.apply_tile_properties(&source, key, properties, first_type, &images)?;
        }

        debug!(
            tileset = %source.display(),
            image = %image_path.display(),
            first_gid,
            tiles = images.len(),
            "tileset_loaded"
        );
        self.tile_sets.insert(image_path, set);
        Ok(())
    }

    fn apply_tile_properties(
        &mut self,
        path: &Path,
        key: &str,
        properties: &Properties,
        first_type: usize,
        images: &[ImageId],
    ) -> Result<(), MapLoadError> {
        let local = key
            .parse::<usize>()
            .ok()
            .filter(|id| *id < images.len())
            .ok_or_else(|| MapLoadError::InvalidTileTypeId {
                path: path.to_path_buf(),
                id: key.to_owned(),
            })?;

        let flags = match property(properties, "flags") {
            Some(raw) => Some(
                parse_flags(&raw).map_err(|reason| invalid_property(path, "flags", &raw, reason))?,
            ),
            None => None,
        };
        let scripts = self.scripts_from(path, properties)?;
        let anim = match (property(properties, "frames"), property(properties, "speed")) {
            (None, None) => None,
            (Some(frames), Some(speed)) => {
                let frame_ms = parse_speed(&speed)
                    .map_err(|reason| invalid_property(path, "speed", &speed, reason))?;
                let frames = frame_images(path, local, &frames, images)?;
                let mut anim = Animation::new(frames, frame_ms);
                anim.start_over(self.now);
                Some(anim)
            }
            _ => {
                return Err(MapLoadError::IncompleteAnimation {
                    path: path.to_path_buf(),
                    id: local,
                })
            }
        };

        let tile_type = &mut self.tile_types[first_type + local];
        if let Some(flags) = flags {
            tile_type.flags = flags;
        }
        for (trigger, _) in SCRIPT_PROPERTIES {
            if let Some(script) = scripts.get(trigger) {
                tile_type.scripts.set(trigger, Some(script));
            }
        }
        if let Some(anim) = anim {
            tile_type.anim = anim;
        }
        Ok(())
    }

    fn layer_depth(&self, layer: &LayerFile, kind: &'static str) -> Result<f32, MapLoadError> {
        let raw = property(&layer.properties, "depth").ok_or_else(|| MapLoadError::MissingDepth {
            path: self.map_path.to_path_buf(),
            kind,
        })?;
        parse_depth(&raw).map_err(|reason| invalid_property(self.map_path, "depth", &raw, reason))
    }

    fn allocate(&mut self, kind: LayerKind, depth: f32) -> Result<i32, MapLoadError> {
        self.grid
            .allocate_layer(kind, depth)
            .map_err(|source: GridError| MapLoadError::Grid {
                path: self.map_path.to_path_buf(),
                source,
            })
    }

    fn add_tile_layer(&mut self, layer: &LayerFile) -> Result<(), MapLoadError> {
        let width = layer.width.unwrap_or(0);
        let height = layer.height.unwrap_or(0);
        let map_width = self.grid.width();
        let map_height = self.grid.height();
        if width != i64::from(map_width) || height != i64::from(map_height) {
            return Err(MapLoadError::LayerSizeMismatch {
                path: self.map_path.to_path_buf(),
                width,
                height,
                map_width,
                map_height,
            });
        }

        let depth = self.layer_depth(layer, "tile")?;
        let z = self.allocate(LayerKind::Tiles, depth)?;

        let data = layer.data.as_deref().unwrap_or_default();
        let expected = map_width as usize * map_height as usize;
        if data.len() != expected {
            return Err(MapLoadError::LayerDataLength {
                path: self.map_path.to_path_buf(),
                expected,
                found: data.len(),
            });
        }

        let columns = map_width as usize;
        for (index, &gid) in data.iter().enumerate() {
            if gid == 0 {
                continue;
            }
            let tile_type = self
                .gids
                .get(gid as usize)
                .copied()
                .flatten()
                .ok_or_else(|| MapLoadError::UnknownGid {
                    path: self.map_path.to_path_buf(),
                    gid,
                })?;
            let phys = ICoord::new((index % columns) as i32, (index / columns) as i32, z);
            if let Some(tile) = self.grid.get_tile_mut(phys) {
                tile.tile_type = Some(tile_type);
            }
        }
        debug!(area = self.grid.descriptor(), z, depth, "tile_layer_loaded");
        Ok(())
    }

    fn add_object_layer(&mut self, layer: &LayerFile) -> Result<(), MapLoadError> {
        let depth = self.layer_depth(layer, "object")?;
        let z = self.allocate(LayerKind::Objects, depth)?;
        let tile_dim = self.tile_dim.ok_or_else(|| MapLoadError::MissingTileDim {
            path: self.map_path.to_path_buf(),
        })?;

        let mut applied = 0usize;
        for object in &layer.objects {
            let Some(properties) = &object.properties else {
                continue;
            };
            let (x, y, width, height) = self.object_rect(object, tile_dim)?;
            let effects = self.object_effects(properties)?;
            for dy in 0..height {
                for dx in 0..width {
                    let phys = ICoord::new(x + dx, y + dy, z);
                    if let Some(tile) = self.grid.get_tile_mut(phys) {
                        tile.flags |= effects.flags;
                        for (trigger, _) in SCRIPT_PROPERTIES {
                            if let Some(script) = effects.scripts.get(trigger) {
                                tile.scripts.set(trigger, Some(script));
                            }
                        }
                        for (direction, exit) in &effects.exits {
                            tile.set_exit(*direction, Some(exit.at_offset(dx, dy)));
                        }
                        for (direction, depth) in &effects.layermods {
                            tile.set_layermod(*direction, Some(*depth));
                        }
                    }
                }
            }
            applied += 1;
        }
        debug!(area = self.grid.descriptor(), z, depth, objects = applied, "object_layer_loaded");
        Ok(())
    }

    /// Object rectangle in tiles, checked against the map size.
    fn object_rect(&self, object: &ObjectFile, tile_dim: IVec2) -> Result<(i32, i32, i32, i32), MapLoadError> {
        let tile_w = f64::from(tile_dim.x);
        let tile_h = f64::from(tile_dim.y);
        let x = (object.x / tile_w).floor() as i64;
        let y = (object.y / tile_h).floor() as i64;
        let width = (object.width / tile_w).floor() as i64;
        let height = (object.height / tile_h).floor() as i64;
        if x < 0
            || y < 0
            || width < 0
            || height < 0
            || x + width > i64::from(self.grid.width())
            || y + height > i64::from(self.grid.height())
        {
            return Err(MapLoadError::ObjectOutOfBounds {
                path: self.map_path.to_path_buf(),
                x,
                y,
                width,
                height,
            });
        }
        Ok((x as i32, y as i32, width as i32, height as i32))
    }

    fn object_effects(&mut self, properties: &Properties) -> Result<ObjectEffects, MapLoadError> {
        let path = self.map_path;
        let mut effects = ObjectEffects {
            scripts: self.scripts_from(path, properties)?,
            ..ObjectEffects::default()
        };
        for (name, value) in properties {
            if SCRIPT_PROPERTIES.iter().any(|(_, key)| key == name) {
                continue;
            }
            let Some(raw) = property(properties, name) else {
                return Err(invalid_property(
                    path,
                    name,
                    &value.to_string(),
                    "property must be a string or number",
                ));
            };
            if name == "flags" {
                effects.flags |=
                    parse_flags(&raw).map_err(|reason| invalid_property(path, name, &raw, reason))?;
            } else if let Some(direction) = directional(name, "exit") {
                let exit =
                    parse_exit(&raw).map_err(|reason| invalid_property(path, name, &raw, reason))?;
                if direction == ExitDirection::Normal {
                    effects.flags |= TileFlags::NOWALK_NPC;
                }
                effects.exits.push((direction, exit));
            } else if let Some(direction) = directional(name, "layermod") {
                let depth =
                    parse_depth(&raw).map_err(|reason| invalid_property(path, name, &raw, reason))?;
                if direction == ExitDirection::Normal {
                    effects.flags |= TileFlags::NOWALK_NPC;
                }
                self.layermods.push(depth);
                effects.layermods.push((direction, depth));
            } else {
                debug!(area = self.grid.descriptor(), property = %name, "object_property_ignored");
            }
        }
        Ok(effects)
    }

    /// Layer-mods may point at layers declared later in the file, so they
    /// are checked once every layer exists.
    fn check_layermods(&self) -> Result<(), MapLoadError> {
        match self
            .layermods
            .iter()
            .find(|depth| self.grid.try_depth_index(**depth).is_none())
        {
            Some(depth) => Err(MapLoadError::UnknownLayermodDepth {
                path: self.map_path.to_path_buf(),
                depth: *depth,
            }),
            None => Ok(()),
        }
    }
}

/// Resolves a `frames` list of local tile ids to images. The first frame
/// must be the tile itself.
fn frame_images(
    path: &Path,
    id: usize,
    raw: &str,
    images: &[ImageId],
) -> Result<Vec<ImageId>, MapLoadError> {
    let mut frames = Vec::new();
    for entry in raw.split(',').map(str::trim) {
        let frame = entry
            .parse::<usize>()
            .ok()
            .and_then(|index| images.get(index).map(|image| (index, *image)))
            .ok_or_else(|| MapLoadError::FrameOutOfRange {
                path: path.to_path_buf(),
                id,
                frame: entry.to_owned(),
            })?;
        if frames.is_empty() && frame.0 != id {
            return Err(MapLoadError::FrameNotSelf {
                path: path.to_path_buf(),
                id,
            });
        }
        frames.push(frame.1);
    }
    Ok(frames)
}
