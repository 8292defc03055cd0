//! Broadcast of pipeline lifecycle events.

use pipesh_types::PipelineEvent;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Fan-out channel for [`PipelineEvent`]s.
///
/// Emitting never blocks; slow subscribers see `Lagged` instead of
/// holding up a pipeline.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: PipelineEvent) {
        tracing::trace!(?event, "pipeline event");
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipesh_types::JobId;

    #[tokio::test]
    async fn subscribers_see_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(PipelineEvent::Stopped { pipeline_id: JobId(4) });
        let got = rx.recv().await.expect("event");
        assert_eq!(got.pipeline_id(), JobId(4));
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        EventBus::new().emit(PipelineEvent::Stopped { pipeline_id: JobId(1) });
    }
}
