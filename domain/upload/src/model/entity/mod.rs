mod configuration;
mod session_state;

#[rustfmt::skip]
pub use {
    configuration::*,
    session_state::SessionState,
};
