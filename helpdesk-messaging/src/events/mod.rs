pub mod publisher;

pub use publisher::EventPublisher;
