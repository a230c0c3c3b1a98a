mod character;
mod config;
mod data_area;
mod entity;
mod input;
mod loop_runner;
mod music;
mod rendering;
mod viewport;
mod world;

pub use character::{Character, CharacterFactory, CharacterRole, CharacterSpec};
pub use config::{EngineConfig, MoveMode};
pub use data_area::{
    AreaScripts, DataArea, InProgressTimer, NoScripts, ScriptContext, ScriptFactory,
    ScriptRegistry, ScriptTable, TileEvent,
};
pub use entity::{
    AreaBinding, Entity, EntityContext, EntityFactory, EntityId, EntityIdAllocator, EntityKind,
};
pub use input::InputAction;
pub use loop_runner::{run_app, AppError, LoopConfig};
pub use music::{LogMusic, MusicSink};
pub use rendering::{
    present, Animation, Canvas, ClipRect, DisplayItem, DisplayList, ImageError, ImageId,
    ImageSource, ImageStore, Renderer, StoredImage, PAUSE_OVERLAY_ARGB,
};
pub use viewport::{TrackingMode, Viewport, ViewportBounds};
pub use world::{World, WorldError, PLAYER_DESCRIPTOR};
