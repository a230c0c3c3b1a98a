use super::ImageId;

/// Frame timing for a looping sequence of images.
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    frames: Vec<ImageId>,
    frame_time_ms: u64,
    cycle_time_ms: u64,
    offset_ms: u64,
    frame_showing: usize,
}

impl Animation {
    pub fn still(image: ImageId) -> Self {
        Self::new(vec![image], 1)
    }

    pub fn new(frames: Vec<ImageId>, frame_time_ms: u64) -> Self {
        let frame_time_ms = frame_time_ms.max(1);
        let cycle_time_ms = frame_time_ms.saturating_mul(frames.len() as u64);
        Self {
            frames,
            frame_time_ms,
            cycle_time_ms,
            offset_ms: 0,
            frame_showing: 0,
        }
    }

    pub fn frames(&self) -> &[ImageId] {
        &self.frames
    }

    pub fn frame_time_ms(&self) -> u64 {
        self.frame_time_ms
    }

    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }

    pub fn start_over(&mut self, now: u64) {
        self.offset_ms = now;
        self.frame_showing = 0;
    }

    fn frame_index(&self, now: u64) -> usize {
        if self.cycle_time_ms == 0 {
            return 0;
        }
        let into_cycle = now.saturating_sub(self.offset_ms) % self.cycle_time_ms;
        (into_cycle / self.frame_time_ms) as usize
    }

    /// True when the frame due at `now` differs from the one last returned
    /// by [`Animation::frame`].
    pub fn needs_redraw(&self, now: u64) -> bool {
        self.is_animated() && self.frame_index(now) != self.frame_showing
    }

    pub fn frame(&mut self, now: u64) -> Option<ImageId> {
        if !self.is_animated() {
            return self.frames.first().copied();
        }
        self.frame_showing = self.frame_index(now);
        self.frames.get(self.frame_showing).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn still_animation_never_needs_redraw() {
        let mut anim = Animation::still(ImageId(3));
        assert!(!anim.needs_redraw(0));
        assert!(!anim.needs_redraw(10_000));
        assert_eq!(anim.frame(10_000), Some(ImageId(3)));
    }

    #[test]
    fn frame_advances_with_time_and_wraps() {
        let mut anim = Animation::new(vec![ImageId(0), ImageId(1), ImageId(2)], 100);

        assert_eq!(anim.frame(0), Some(ImageId(0)));
        assert_eq!(anim.frame(150), Some(ImageId(1)));
        assert_eq!(anim.frame(299), Some(ImageId(2)));
        assert_eq!(anim.frame(300), Some(ImageId(0)));
    }

    #[test]
    fn needs_redraw_tracks_last_returned_frame() {
        let mut anim = Animation::new(vec![ImageId(0), ImageId(1)], 250);
        anim.frame(0);

        assert!(!anim.needs_redraw(249));
        assert!(anim.needs_redraw(250));
        anim.frame(250);
        assert!(!anim.needs_redraw(400));
    }

    #[test]
    fn start_over_restarts_from_first_frame() {
        let mut anim = Animation::new(vec![ImageId(0), ImageId(1)], 100);
        anim.start_over(1_000);

        assert_eq!(anim.frame(1_050), Some(ImageId(0)));
        assert_eq!(anim.frame(1_100), Some(ImageId(1)));
    }

    #[test]
    fn empty_animation_has_no_frame() {
        let mut anim = Animation::new(Vec::new(), 100);
        assert_eq!(anim.frame(0), None);
        assert!(!anim.needs_redraw(500));
    }
}
