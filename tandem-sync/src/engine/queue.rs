//! Play Queue
//!
//! Ordered list of media items with a current index. Manual advance wraps at
//! both ends; end-of-item auto-advance only moves forward when a next item
//! exists (see `has_next`).

use crate::pipeline::MediaItem;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a manual advance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Previous,
}

/// Items in play order plus the selected index
#[derive(Debug, Default)]
pub struct PlayQueue {
    items: Vec<MediaItem>,
    current: Option<usize>,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the queue and select `start_index` (clamped to the last item)
    ///
    /// Returns the selected item, `None` for an empty list.
    pub fn set(&mut self, items: Vec<MediaItem>, start_index: usize) -> Option<MediaItem> {
        self.items = items;
        self.current = if self.items.is_empty() {
            None
        } else {
            Some(start_index.min(self.items.len() - 1))
        };
        self.current().cloned()
    }

    /// Select `item`, appending it if it is not queued yet
    pub fn play(&mut self, item: MediaItem) -> MediaItem {
        let index = match self.position_of(item.id) {
            Some(index) => index,
            None => {
                self.items.push(item);
                self.items.len() - 1
            }
        };
        self.current = Some(index);
        self.items[index].clone()
    }

    /// Move the selection one step, wrapping at both ends
    pub fn advance(&mut self, direction: Direction) -> Option<MediaItem> {
        let len = self.items.len();
        if len == 0 {
            return None;
        }
        let next = match (self.current, direction) {
            (None, Direction::Next) => 0,
            (None, Direction::Previous) => len - 1,
            (Some(i), Direction::Next) => (i + 1) % len,
            (Some(i), Direction::Previous) => (i + len - 1) % len,
        };
        self.current = Some(next);
        self.current().cloned()
    }

    /// Whether a forward step exists without wrapping
    pub fn has_next(&self) -> bool {
        matches!(self.current, Some(i) if i + 1 < self.items.len())
    }

    pub fn current(&self) -> Option<&MediaItem> {
        self.current.and_then(|i| self.items.get(i))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    fn position_of(&self, item_id: Uuid) -> Option<usize> {
        self.items.iter().position(|item| item.id == item_id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
