use tracing::info;

/// Background music output. Areas hand it their music path on focus and
/// the session pauses it while the game is paused.
pub trait MusicSink {
    fn play(&mut self, path: &str);
    fn stop(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
}

/// Music sink that only records what would be playing.
#[derive(Debug, Default)]
pub struct LogMusic {
    playing: Option<String>,
    paused: bool,
}

impl LogMusic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playing(&self) -> Option<&str> {
        self.playing.as_deref()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl MusicSink for LogMusic {
    fn play(&mut self, path: &str) {
        if self.playing.as_deref() == Some(path) {
            return;
        }
        info!(path, "music_play");
        self.playing = Some(path.to_owned());
    }

    fn stop(&mut self) {
        if self.playing.take().is_some() {
            info!("music_stop");
        }
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }
}
