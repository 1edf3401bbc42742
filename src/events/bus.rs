// ABOUTME: In-process event bus over tokio broadcast channels.
// ABOUTME: Keeps a bounded history so late subscribers and tests can inspect past events.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

use super::{EventBus, EventError, PipelineEvent};

const CHANNEL_CAPACITY: usize = 1024;
const HISTORY_LIMIT: usize = 4096;

/// Broadcasts events to every subscriber and retains recent history.
#[derive(Debug)]
pub struct BroadcastBus {
    sender: broadcast::Sender<PipelineEvent>,
    history: Mutex<VecDeque<PipelineEvent>>,
    closed: AtomicBool,
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            history: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// Retained events, oldest first.
    pub fn history(&self) -> Vec<PipelineEvent> {
        self.history.lock().iter().cloned().collect()
    }

    /// Retained events with the given wire name.
    pub fn events_named(&self, name: &str) -> Vec<PipelineEvent> {
        self.history
            .lock()
            .iter()
            .filter(|event| event.name() == name)
            .cloned()
            .collect()
    }

    /// Stop accepting events. Later publishes fail with [`EventError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventBus for BroadcastBus {
    async fn publish(&self, event: PipelineEvent) -> Result<(), EventError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EventError::Closed);
        }

        tracing::debug!(event = event.name(), "publishing event");

        {
            let mut history = self.history.lock();
            if history.len() == HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // No receivers is not an error: history still records the event.
        let _ = self.sender.send(event);
        Ok(())
    }
}
