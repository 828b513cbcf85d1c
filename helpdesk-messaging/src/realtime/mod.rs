//! Realtime fan-out: conversation topics and the events pushed on them.

pub mod event;
pub mod hub;

pub use event::{EventKind, EventPayload, RealtimeEvent};
pub use hub::{ConnectionId, EventSender, RealtimeHub};
