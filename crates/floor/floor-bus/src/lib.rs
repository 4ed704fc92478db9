//! The Floor: a broker-less publish/subscribe and request/response bus.
//!
//! A [`Bus`] is a named pair of fixed-slot multi-writer queues, one per
//! direction. Every process attached to the same name shares both queues, so
//! anything a client publishes reaches every server-side [`Channel`] and the
//! other way round. Replies are matched to requests by position: the offset a
//! request was published at is its correlation token.

mod bus;
mod channel;
mod envelope;
mod error;
mod message;
mod registry;

pub use bus::{Backing, Bus, BusOptions, Side};
pub use channel::Channel;
pub use envelope::ENVELOPE_LEN;
pub use error::BusError;
pub use floor_events::{BookKey, MsgType};
pub use floor_icc::OpenMode;
pub use message::{Message, REF_UNSET};
pub use registry::BusRegistry;
