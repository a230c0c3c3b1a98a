use std::fs;
use std::path::{Path, PathBuf};

use engine::{
    resolve_root, CharacterSpec, EngineConfig, LogMusic, LoopConfig, MoveMode, RVec2,
    ScriptRegistry, StartupError, VICoord, World, WorldError,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

const MOVE_MODE_ENV_VAR: &str = "TSUNAGARI_MOVE_MODE";
const WORLD_FILE: &str = "world.json";

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) world: World,
}

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to read world file {path}: {source}")]
    ReadWorld {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse world file {path} at {json_path}: {source}")]
    ParseWorld {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid TSUNAGARI_MOVE_MODE override: {reason}")]
    MoveModeOverride { reason: String },
    #[error(transparent)]
    World(#[from] WorldError),
}

/// `assets/world.json`: which area to start in and how the game plays.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct WorldFile {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) move_mode: MoveMode,
    #[serde(default = "default_resolution")]
    pub(crate) virtual_resolution: Resolution,
    pub(crate) start_area: String,
    pub(crate) start_coords: StartCoords,
    pub(crate) player: CharacterSpec,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub(crate) struct Resolution {
    pub(crate) width: f32,
    pub(crate) height: f32,
}

fn default_resolution() -> Resolution {
    Resolution {
        width: 240.0,
        height: 160.0,
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub(crate) struct StartCoords {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) z: f32,
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    info!("=== Tsunagari Startup ===");

    let root = resolve_root()?;
    let assets_dir = root.join("assets");
    let world_file = load_world_file(&assets_dir.join(WORLD_FILE))?;
    let move_mode = move_mode_override(
        world_file.move_mode,
        std::env::var(MOVE_MODE_ENV_VAR).ok().as_deref(),
    )?;
    info!(
        root = %root.display(),
        world = %world_file.name,
        move_mode = ?move_mode,
        start_area = %world_file.start_area,
        "world_config"
    );

    let engine_config = EngineConfig {
        move_mode,
        virtual_resolution: RVec2::new(
            world_file.virtual_resolution.width,
            world_file.virtual_resolution.height,
        ),
        ..EngineConfig::default()
    };
    let mut world = World::new(
        assets_dir,
        engine_config,
        &world_file.player,
        Box::new(LogMusic::new()),
        ScriptRegistry::new(),
    )?;
    let start = world_file.start_coords;
    world.focus_area(
        &world_file.start_area,
        VICoord::new(start.x, start.y, start.z),
    )?;

    let config = LoopConfig {
        window_title: world_file.name,
        ..LoopConfig::default()
    };
    Ok(AppWiring { config, world })
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn load_world_file(path: &Path) -> Result<WorldFile, BootstrapError> {
    let raw = fs::read_to_string(path).map_err(|source| BootstrapError::ReadWorld {
        path: path.to_path_buf(),
        source,
    })?;
    let mut deserializer = serde_json::Deserializer::from_str(&raw);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
        let json_path = error.path().to_string();
        BootstrapError::ParseWorld {
            path: path.to_path_buf(),
            json_path,
            source: error.into_inner(),
        }
    })
}

fn move_mode_override(
    configured: MoveMode,
    raw: Option<&str>,
) -> Result<MoveMode, BootstrapError> {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => raw
            .parse::<MoveMode>()
            .map_err(|reason| BootstrapError::MoveModeOverride { reason }),
        None => Ok(configured),
    }
}
