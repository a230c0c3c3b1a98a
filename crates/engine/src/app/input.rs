use winit::keyboard::{KeyCode, PhysicalKey};

use crate::grid::IVec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    Use,
    Pause,
}

impl InputAction {
    pub fn from_key(key: PhysicalKey) -> Option<Self> {
        let PhysicalKey::Code(code) = key else {
            return None;
        };
        match code {
            KeyCode::KeyW | KeyCode::ArrowUp => Some(InputAction::MoveUp),
            KeyCode::KeyS | KeyCode::ArrowDown => Some(InputAction::MoveDown),
            KeyCode::KeyA | KeyCode::ArrowLeft => Some(InputAction::MoveLeft),
            KeyCode::KeyD | KeyCode::ArrowRight => Some(InputAction::MoveRight),
            KeyCode::Space | KeyCode::Enter => Some(InputAction::Use),
            KeyCode::Escape => Some(InputAction::Pause),
            _ => None,
        }
    }

    /// Tile step for movement actions.
    pub fn direction(self) -> Option<IVec2> {
        match self {
            InputAction::MoveUp => Some(IVec2::new(0, -1)),
            InputAction::MoveDown => Some(IVec2::new(0, 1)),
            InputAction::MoveLeft => Some(IVec2::new(-1, 0)),
            InputAction::MoveRight => Some(IVec2::new(1, 0)),
            InputAction::Use | InputAction::Pause => None,
        }
    }
}

/// Movement keys currently held, most recent last. The newest key wins.
#[derive(Debug, Clone, Default)]
pub(crate) struct HeldMoves {
    stack: Vec<InputAction>,
}

impl HeldMoves {
    /// Returns false for key repeats of an already held key.
    pub(crate) fn press(&mut self, action: InputAction) -> bool {
        if action.direction().is_none() || self.stack.contains(&action) {
            return false;
        }
        self.stack.push(action);
        true
    }

    pub(crate) fn release(&mut self, action: InputAction) {
        self.stack.retain(|held| *held != action);
    }

    pub(crate) fn direction(&self) -> Option<IVec2> {
        self.stack.last().and_then(|action| action.direction())
    }
}
