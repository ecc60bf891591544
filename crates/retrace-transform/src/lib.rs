//! `retrace-transform` – reference-frame bookkeeping.
//!
//! Turns wrench readings expressed in a sensor frame into the command
//! frame the replay loop publishes in.
//!
//! # Modules
//!
//! - [`graph`] – [`FrameGraph`][graph::FrameGraph]: directed graph of
//!   named reference frames related by rigid-body transforms
//!   (translation + quaternion rotation), with BFS-composed lookups.
//! - [`wrench`] – [`WrenchTransformer`][wrench::WrenchTransformer]:
//!   re-expresses a [`WrenchStamped`][retrace_types::WrenchStamped] in a
//!   target frame, waiting a bounded time for the transform to become
//!   available.

pub mod graph;
pub mod wrench;

pub use graph::{FrameGraph, Quaternion, SharedFrameGraph, Transform3D};
pub use wrench::WrenchTransformer;
