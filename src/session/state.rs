use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Handshaking,
    Streaming,
    Paused,
    AwaitingPauseDecision,
    Ended,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Idle, Handshaking)
                | (Handshaking, Streaming)
                | (Handshaking, Ended)
                | (Streaming, Paused)
                | (Paused, AwaitingPauseDecision)
                | (AwaitingPauseDecision, Streaming)
                | (Streaming | Paused | AwaitingPauseDecision, Ended)
        )
    }

    /// Between handshake and stop.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Streaming | SessionState::Paused | SessionState::AwaitingPauseDecision
        )
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;

    #[test]
    fn test_transition_table() {
        assert!(Idle.can_transition_to(Handshaking));
        assert!(Handshaking.can_transition_to(Streaming));
        assert!(Streaming.can_transition_to(Paused));
        assert!(Paused.can_transition_to(AwaitingPauseDecision));
        assert!(AwaitingPauseDecision.can_transition_to(Streaming));
        assert!(Paused.can_transition_to(Ended));

        assert!(!Idle.can_transition_to(Streaming));
        assert!(!Paused.can_transition_to(Paused));
        assert!(!Paused.can_transition_to(Streaming));
        assert!(!Ended.can_transition_to(Idle));
        assert!(!Streaming.can_transition_to(AwaitingPauseDecision));
    }
}
