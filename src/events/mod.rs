//! Runtime events and the bus that carries them.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
