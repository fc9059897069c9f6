mod event;
mod part;
mod source;
mod target;

#[rustfmt::skip]
pub use {
    event::*,
    part::*,
    source::*,
    target::*,
};
