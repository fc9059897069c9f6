/// Lifecycle of an upload session.
///
/// `Complete` and `Aborted` are terminal. `Aborting` is reachable from every
/// other state and never left except for `Aborted`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Initializing,
    Active,
    Completing,
    Complete,
    Aborting,
    Aborted,
}

impl SessionState {
    pub fn is_aborting_or_aborted(&self) -> bool {
        matches!(self, SessionState::Aborting | SessionState::Aborted)
    }
}
