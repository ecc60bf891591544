//! `retrace-middleware` – the signal plumbing.
//!
//! Routes asynchronous sensor and command traffic between the replay
//! engine and the outside world without caring about its meaning.
//!
//! # Modules
//!
//! - [`bus`] – [`SignalBus`][bus::SignalBus]: per-run, per-arm broadcast
//!   lanes for wrench readings and outgoing velocity commands, plus a
//!   single halt lane, built on Tokio broadcast channels.

pub mod bus;

pub use bus::SignalBus;
