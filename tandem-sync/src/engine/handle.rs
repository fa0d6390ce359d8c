//! Cloneable control surface of a running engine
//!
//! Every control method enqueues a message and returns immediately; effects
//! are observed through `subscribe()` and `status()`.

use super::messages::{ControlCommand, EngineMessage, PlatformEvent};
use super::queue::Direction;
use super::resync::DriftSample;
use crate::error::{Error, Result};
use crate::pipeline::MediaItem;
use crate::state::{EngineStatus, SharedState};
use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use tandem_common::events::SyncEvent;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

/// Handle to a `SyncEngine`
///
/// Fails only with `Error::EngineClosed` once the engine task has stopped.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineMessage>,
    state: Arc<SharedState>,
}

impl EngineHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<EngineMessage>, state: Arc<SharedState>) -> Self {
        Self { tx, state }
    }

    fn send(&self, msg: EngineMessage) -> Result<()> {
        self.tx.send(msg).map_err(|_| Error::EngineClosed)
    }

    fn control(&self, command: ControlCommand) -> Result<()> {
        self.send(EngineMessage::Control(command))
    }

    /// Play `item` from the start (queued if not already)
    pub fn play(&self, item: MediaItem) -> Result<()> {
        self.control(ControlCommand::Play(item))
    }

    /// Replace the queue and play the item at `start_index`
    pub fn set_queue(&self, items: Vec<MediaItem>, start_index: usize) -> Result<()> {
        self.control(ControlCommand::SetQueue { items, start_index })
    }

    pub fn seek(&self, to_secs: f64) -> Result<()> {
        self.control(ControlCommand::Seek(to_secs))
    }

    pub fn toggle_pause(&self) -> Result<()> {
        self.control(ControlCommand::TogglePause)
    }

    pub fn advance(&self, direction: Direction) -> Result<()> {
        self.control(ControlCommand::Advance(direction))
    }

    pub fn set_effects_enabled(&self, enabled: bool) -> Result<()> {
        self.control(ControlCommand::SetEffectsEnabled(enabled))
    }

    /// Forward a platform or visual-pipeline notification
    pub fn platform_event(&self, event: PlatformEvent) -> Result<()> {
        self.send(EngineMessage::Platform(event))
    }

    /// Latest published status snapshot
    pub async fn status(&self) -> EngineStatus {
        self.state.get_status().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.state.subscribe_events()
    }

    /// Events as a stream; a lagging consumer skips what it missed
    pub fn event_stream(&self) -> impl Stream<Item = SyncEvent> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|result| async move {
            match result {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("Event stream lagged: {}", e);
                    None
                }
            }
        })
    }

    /// Drift reading taken on the engine task, without correcting it
    ///
    /// `None` while audio is not playing.
    pub async fn measure_drift(&self) -> Result<Option<DriftSample>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(EngineMessage::MeasureDrift(reply_tx))?;
        reply_rx.await.map_err(|_| Error::EngineClosed)
    }

    /// Stop the engine task; later calls fail with `EngineClosed`
    pub fn shutdown(&self) -> Result<()> {
        self.send(EngineMessage::Shutdown)
    }
}
