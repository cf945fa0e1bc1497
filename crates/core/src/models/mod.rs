//! Data models for the reservation core

mod capacity;
mod event;
mod hold;
mod seat;
mod ticket;

pub use capacity::*;
pub use event::*;
pub use hold::*;
pub use seat::*;
pub use ticket::*;
