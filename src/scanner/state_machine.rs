use crate::core::error::{ScanError, ScanResult};

#[derive(Debug, Clone, PartialEq)]
pub enum ScanState {
    Idle,
    Running,
    Completed,
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanEvent {
    Start,
    EndOfStream,
    Abort,
}

impl ScanState {
    pub fn transition(&self, event: ScanEvent, reason: Option<&str>) -> ScanResult<ScanState> {
        match (self, event) {
            (ScanState::Idle, ScanEvent::Start) => Ok(ScanState::Running),
            (ScanState::Running, ScanEvent::EndOfStream) => Ok(ScanState::Completed),
            (ScanState::Idle | ScanState::Running, ScanEvent::Abort) => Ok(ScanState::Failed {
                reason: reason.unwrap_or("aborted").to_string(),
            }),
            (state, event) => Err(ScanError::InvalidState(format!(
                "{:?} cannot handle {:?}",
                state, event
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Completed | ScanState::Failed { .. })
    }
}

pub struct StateMachine {
    state: ScanState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: ScanState::Idle,
        }
    }

    pub fn start(&mut self) -> ScanResult<()> {
        self.apply(ScanEvent::Start, None)
    }

    pub fn complete(&mut self) -> ScanResult<()> {
        self.apply(ScanEvent::EndOfStream, None)
    }

    pub fn fail(&mut self, reason: &str) -> ScanResult<()> {
        self.apply(ScanEvent::Abort, Some(reason))
    }

    fn apply(&mut self, event: ScanEvent, reason: Option<&str>) -> ScanResult<()> {
        self.state = self.state.transition(event, reason)?;
        Ok(())
    }

    pub fn current_state(&self) -> &ScanState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ScanState::Running
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.current_state(), &ScanState::Idle);

        sm.start().unwrap();
        assert!(sm.is_running());

        sm.complete().unwrap();
        assert_eq!(sm.current_state(), &ScanState::Completed);
        assert!(sm.current_state().is_terminal());
    }

    #[test]
    fn test_running_to_failed() {
        let mut sm = StateMachine::new();
        sm.start().unwrap();
        sm.fail("detector crashed").unwrap();
        assert!(matches!(
            sm.current_state(),
            ScanState::Failed { reason } if reason == "detector crashed"
        ));
    }

    #[test]
    fn test_invalid_transitions() {
        let mut sm = StateMachine::new();
        assert!(matches!(sm.complete(), Err(ScanError::InvalidState(_))));

        sm.start().unwrap();
        assert!(sm.start().is_err());

        sm.complete().unwrap();
        assert!(sm.fail("late").is_err());
        assert!(sm.start().is_err());
        assert_eq!(sm.current_state(), &ScanState::Completed);
    }
}
