//! # Tandem Common Library
//!
//! Shared code for the Tandem synchronization crates:
//! - Event types (`SyncEvent`) and the broadcast `EventBus`
//! - Configuration loading (`SyncConfig`) and config file discovery
//! - Sample/time conversions used by the start and resync algorithms

pub mod config;
pub mod error;
pub mod events;
pub mod timing;

pub use config::SyncConfig;
pub use error::{Error, Result};
pub use events::{EventBus, SessionId, SyncEvent};
