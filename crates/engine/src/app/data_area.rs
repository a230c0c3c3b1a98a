use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use crate::grid::{ICoord, ScriptId, Tile, TileTrigger};

use super::EntityId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileEvent {
    pub trigger: TileTrigger,
    pub coords: ICoord,
    pub entity: Option<EntityId>,
}

/// A countdown that reports progress every tick and can fire a callback
/// once when it runs out.
pub struct InProgressTimer {
    duration_ms: u64,
    passed_ms: u64,
    progress: Option<Box<dyn FnMut(f32)>>,
    then: Option<Box<dyn FnOnce()>>,
    over: bool,
}

impl InProgressTimer {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            passed_ms: 0,
            progress: None,
            then: None,
            over: false,
        }
    }

    pub fn on_progress(mut self, callback: impl FnMut(f32) + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn then(mut self, callback: impl FnOnce() + 'static) -> Self {
        self.then = Some(Box::new(callback));
        self
    }

    pub fn is_over(&self) -> bool {
        self.over
    }

    pub fn tick(&mut self, dt: u64) {
        if self.over {
            return;
        }
        self.passed_ms = self.passed_ms.saturating_add(dt);
        if self.passed_ms >= self.duration_ms {
            self.over = true;
            if let Some(progress) = self.progress.as_mut() {
                progress(1.0);
            }
            if let Some(then) = self.then.take() {
                then();
            }
        } else if let Some(progress) = self.progress.as_mut() {
            progress(self.passed_ms as f32 / self.duration_ms as f32);
        }
    }
}

impl fmt::Debug for InProgressTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProgressTimer")
            .field("duration_ms", &self.duration_ms)
            .field("passed_ms", &self.passed_ms)
            .field("over", &self.over)
            .finish()
    }
}

/// What a script hook may touch besides its own state.
pub struct ScriptContext<'a> {
    descriptor: &'a str,
    timers: &'a mut Vec<InProgressTimer>,
}

impl ScriptContext<'_> {
    pub fn descriptor(&self) -> &str {
        self.descriptor
    }

    pub fn add_timer(&mut self, timer: InProgressTimer) {
        self.timers.push(timer);
    }
}

/// Per-area script hooks. Every hook defaults to doing nothing.
pub trait AreaScripts {
    fn on_load(&mut self, _ctx: &mut ScriptContext<'_>) {}

    fn on_focus(&mut self, _ctx: &mut ScriptContext<'_>) {}

    fn on_tick(&mut self, _ctx: &mut ScriptContext<'_>, _dt: u64) {}

    fn on_turn(&mut self, _ctx: &mut ScriptContext<'_>) {}

    /// Maps a script name used by the map file to a handle.
    fn resolve(&self, _name: &str) -> Option<ScriptId> {
        None
    }

    fn run(
        &mut self,
        _ctx: &mut ScriptContext<'_>,
        _script: ScriptId,
        _event: &TileEvent,
        _tile: &mut Tile,
    ) {
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoScripts;

impl AreaScripts for NoScripts {}

type TileScriptFn = Box<dyn FnMut(&mut ScriptContext<'_>, &TileEvent, &mut Tile)>;

/// Tile scripts bound by name to closures.
#[derive(Default)]
pub struct ScriptTable {
    names: HashMap<String, ScriptId>,
    scripts: Vec<TileScriptFn>,
}

impl ScriptTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(
        mut self,
        name: impl Into<String>,
        script: impl FnMut(&mut ScriptContext<'_>, &TileEvent, &mut Tile) + 'static,
    ) -> Self {
        let id = ScriptId(self.scripts.len() as u32);
        self.names.insert(name.into(), id);
        self.scripts.push(Box::new(script));
        self
    }
}

impl AreaScripts for ScriptTable {
    fn resolve(&self, name: &str) -> Option<ScriptId> {
        self.names.get(name).copied()
    }

    fn run(
        &mut self,
        ctx: &mut ScriptContext<'_>,
        script: ScriptId,
        event: &TileEvent,
        tile: &mut Tile,
    ) {
        if let Some(script) = self.scripts.get_mut(script.0 as usize) {
            script(ctx, event, tile);
        }
    }
}

/// Scripting glue owned by an area: its hooks plus running timers.
pub struct DataArea {
    descriptor: String,
    scripts: Box<dyn AreaScripts>,
    timers: Vec<InProgressTimer>,
}

impl DataArea {
    pub fn new(descriptor: impl Into<String>, scripts: Box<dyn AreaScripts>) -> Self {
        Self {
            descriptor: descriptor.into(),
            scripts,
            timers: Vec::new(),
        }
    }

    pub fn without_scripts(descriptor: impl Into<String>) -> Self {
        Self::new(descriptor, Box::new(NoScripts))
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    pub fn add_timer(&mut self, timer: InProgressTimer) {
        self.timers.push(timer);
    }

    fn split(&mut self) -> (&mut (dyn AreaScripts + 'static), ScriptContext<'_>) {
        (
            self.scripts.as_mut(),
            ScriptContext {
                descriptor: &self.descriptor,
                timers: &mut self.timers,
            },
        )
    }

    pub fn on_load(&mut self) {
        debug!(area = %self.descriptor, "area_on_load");
        let (scripts, mut ctx) = self.split();
        scripts.on_load(&mut ctx);
    }

    pub fn on_focus(&mut self) {
        let (scripts, mut ctx) = self.split();
        scripts.on_focus(&mut ctx);
    }

    /// Advances timers, dropping the ones that ran out, then runs the
    /// tick hook.
    pub fn tick(&mut self, dt: u64) {
        self.timers.retain_mut(|timer| {
            timer.tick(dt);
            !timer.is_over()
        });
        let (scripts, mut ctx) = self.split();
        scripts.on_tick(&mut ctx, dt);
    }

    pub fn turn(&mut self) {
        let (scripts, mut ctx) = self.split();
        scripts.on_turn(&mut ctx);
    }

    pub fn resolve(&self, name: &str) -> Option<ScriptId> {
        let script = self.scripts.resolve(name);
        if script.is_none() {
            warn!(area = %self.descriptor, script = name, "script_not_found");
        }
        script
    }

    pub fn run(&mut self, script: ScriptId, event: &TileEvent, tile: &mut Tile) {
        let (scripts, mut ctx) = self.split();
        scripts.run(&mut ctx, script, event, tile);
    }
}

impl fmt::Debug for DataArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataArea")
            .field("descriptor", &self.descriptor)
            .field("timers", &self.timers.len())
            .finish()
    }
}

pub type ScriptFactory = Box<dyn Fn() -> Box<dyn AreaScripts>>;

/// Script factories keyed by area descriptor.
#[derive(Default)]
pub struct ScriptRegistry {
    factories: HashMap<String, ScriptFactory>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        descriptor: impl Into<String>,
        factory: impl Fn() -> Box<dyn AreaScripts> + 'static,
    ) {
        self.factories.insert(descriptor.into(), Box::new(factory));
    }

    pub fn create(&self, descriptor: &str) -> Box<dyn AreaScripts> {
        match self.factories.get(descriptor) {
            Some(factory) => factory(),
            None => Box::new(NoScripts),
        }
    }
}
