//! Player state management

/// Player state machine
///
/// `Stopped` is both the initial state and the state every session ends in,
/// whether it completed, was stopped, or hit a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl PlayState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &PlayState) -> bool {
        use PlayState::*;

        match (self, target) {
            (Stopped, Playing) => true,
            (Playing, Paused) => true,
            (Paused, Playing) => true,
            (_, Stopped) => true,
            (a, b) if a == b => true,
            _ => false,
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            PlayState::Stopped => "Stopped",
            PlayState::Playing => "Playing",
            PlayState::Paused => "Paused",
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlayState::Playing)
    }
}

impl std::fmt::Display for PlayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
