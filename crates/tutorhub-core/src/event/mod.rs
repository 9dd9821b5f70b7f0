//! Save-event side channel.
//!
//! Provides a `SaveEventBus` that distributes `SaveEvent` messages to all
//! subscribers via a `tokio::sync::broadcast` channel.

pub mod bus;

pub use bus::SaveEventBus;
