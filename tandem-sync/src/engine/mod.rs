//! Synchronization engine
//!
//! **Module Structure:**
//! - `core.rs`: engine struct, run loop, dispatch, shared helpers
//! - `start.rs`: sessions, asset loading, synchronized start protocol
//! - `resync.rs`: drift measurement and correction
//! - `triggers.rs`: control surface and platform events
//! - `handle.rs`: cloneable `EngineHandle`
//! - `session.rs`, `sync_state.rs`, `queue.rs`, `messages.rs`: engine data

mod core;
mod handle;
mod messages;
mod queue;
mod resync;
mod session;
mod start;
mod sync_state;
mod triggers;

pub use self::core::{Collaborators, SyncEngine};
pub use handle::EngineHandle;
pub use messages::{PlatformEvent, TransportCommand};
pub use queue::{Direction, PlayQueue};
pub use resync::DriftSample;
