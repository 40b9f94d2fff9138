//! Device lifecycle state machine, expressed as an explicit enum instead of
//! a bag of booleans.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    BeingCreated,
    Alive,
    BeingDisconnected,
    Disconnected,
    Destroyed,
}

#[derive(Debug, thiserror::Error)]
#[error("illegal device state transition: {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: State,
    pub to: State,
}

impl State {
    /// Whether GPU work may currently be submitted: only once the device is
    /// `Alive`.
    pub fn accepts_work(self) -> bool {
        matches!(self, State::Alive)
    }

    fn allows(self, next: State) -> bool {
        use State::*;
        matches!(
            (self, next),
            (BeingCreated, Alive)
                | (BeingCreated, Disconnected)
                | (Alive, BeingDisconnected)
                | (Alive, Disconnected)
                | (BeingDisconnected, Disconnected)
                | (Disconnected, Destroyed)
                | (Alive, Destroyed)
        )
    }

    pub fn transition(&mut self, next: State) -> Result<(), IllegalTransition> {
        if self.allows(next) {
            *self = next;
            Ok(())
        } else {
            Err(IllegalTransition { from: *self, to: next })
        }
    }
}

impl Default for State {
    fn default() -> Self {
        State::BeingCreated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn being_created_can_fail_straight_to_disconnected() {
        let mut state = State::BeingCreated;
        state.transition(State::Disconnected).unwrap();
        assert_eq!(state, State::Disconnected);
    }

    #[test]
    fn alive_cannot_transition_back_to_being_created() {
        let mut state = State::Alive;
        assert!(state.transition(State::BeingCreated).is_err());
    }

    #[test]
    fn only_alive_accepts_work() {
        assert!(State::Alive.accepts_work());
        for other in [State::BeingCreated, State::BeingDisconnected, State::Disconnected, State::Destroyed] {
            assert!(!other.accepts_work());
        }
    }

    #[test]
    fn destroyed_is_terminal() {
        let mut state = State::Destroyed;
        for next in [State::BeingCreated, State::Alive, State::BeingDisconnected, State::Disconnected] {
            assert!(state.transition(next).is_err());
        }
    }
}
