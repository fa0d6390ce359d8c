//! # Tandem Synchronization Engine (tandem-sync)
//!
//! Keeps an independently clocked audio pipeline perceptually locked to a
//! visual pipeline while audio runs through its own effects path.
//!
//! **Purpose:** Start both pipelines at a shared future instant on a monotonic
//! host clock, compensate for the audio path's slower startup, correct drift on
//! discrete triggers, and fall back to video-only whenever audio is unavailable.
//!
//! **Architecture:** A single-task engine (`engine::SyncEngine`) owns all state
//! and is driven through a cloneable `engine::EngineHandle`. Pipelines and the
//! media loader are trait objects (`pipeline`); `pipeline::sim` provides
//! clock-driven stand-ins.

pub mod clock;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod state;

pub use engine::{Collaborators, Direction, DriftSample, EngineHandle, PlatformEvent, SyncEngine, TransportCommand};
pub use error::{Error, Result};
pub use state::{EngineStatus, SharedState};
