//! Progress bus (spec §5 C5): per-task publish/subscribe fan-out with
//! backlog replay for subscribers that attach after the pipeline has
//! already started publishing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use fortune_shared::event::EventKind;
use fortune_shared::{ErrorCategory, ProgressEvent};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Minimum number of recent events retained per task for late subscribers
/// (spec §5 C5: backlog of at least 128 events).
pub const BACKLOG_CAPACITY: usize = 128;

/// How long a task's channel is kept alive with no subscribers after the
/// task reaches a terminal state, before [`ProgressBus::sweep_idle`] drops it.
pub const GRACE_PERIOD: Duration = Duration::from_secs(60);

struct TaskChannel {
    sender: broadcast::Sender<ProgressEvent>,
    backlog: Mutex<VecDeque<ProgressEvent>>,
    next_seq: AtomicU64,
    terminal_since: Mutex<Option<Instant>>,
}

impl TaskChannel {
    fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(BACKLOG_CAPACITY.max(1));
        Self {
            sender,
            backlog: Mutex::new(VecDeque::with_capacity(BACKLOG_CAPACITY)),
            next_seq: AtomicU64::new(0),
            terminal_since: Mutex::new(None),
        }
    }

    fn record(&self, event: ProgressEvent) {
        if event.is_terminal() {
            *self.terminal_since.lock().expect("backlog mutex poisoned") = Some(Instant::now());
        }
        let mut backlog = self.backlog.lock().expect("backlog mutex poisoned");
        if backlog.len() == BACKLOG_CAPACITY {
            backlog.pop_front();
        }
        backlog.push_back(event.clone());
        // A send error just means there are currently no subscribers; the
        // event still lives in the backlog for whoever subscribes next.
        let _ = self.sender.send(event);
    }

    fn backlog_snapshot(&self) -> Vec<ProgressEvent> {
        self.backlog
            .lock()
            .expect("backlog mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    fn is_idle_past_grace(&self) -> bool {
        let terminal_since = self.terminal_since.lock().expect("backlog mutex poisoned");
        match *terminal_since {
            Some(at) => self.sender.receiver_count() == 0 && at.elapsed() >= GRACE_PERIOD,
            None => false,
        }
    }
}

/// A live subscription to a task's progress stream: the backlog replayed so
/// far, plus a receiver for events published from now on.
pub struct Subscription {
    pub backlog: Vec<ProgressEvent>,
    pub receiver: broadcast::Receiver<ProgressEvent>,
}

/// Central in-process hub that fans task progress out to any number of
/// subscribers (spec §5 C5 Progress Bus).
#[derive(Default)]
pub struct ProgressBus {
    channels: DashMap<Uuid, TaskChannel>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    fn channel_for(&self, task_id: Uuid) -> dashmap::mapref::one::Ref<'_, Uuid, TaskChannel> {
        self.channels.entry(task_id).or_insert_with(TaskChannel::new);
        self.channels.get(&task_id).expect("just inserted")
    }

    fn next_seq(&self, task_id: Uuid) -> u64 {
        self.channel_for(task_id).next_seq.fetch_add(1, Ordering::SeqCst)
    }

    pub fn publish_status(&self, task_id: Uuid, status_code: i32, message: impl Into<String>) {
        let seq = self.next_seq(task_id);
        self.channel_for(task_id)
            .record(ProgressEvent::status(task_id, seq, status_code, message));
    }

    pub fn publish_progress(
        &self,
        task_id: Uuid,
        status_code: i32,
        progress: i32,
        message: Option<String>,
    ) {
        let seq = self.next_seq(task_id);
        self.channel_for(task_id)
            .record(ProgressEvent::progress(task_id, seq, status_code, progress, message));
    }

    #[allow(clippy::too_many_arguments)]
    pub fn publish_complete(
        &self,
        task_id: Uuid,
        response_text: String,
        response_sections: serde_json::Value,
        confidence: Option<f64>,
        sources_used: Vec<String>,
        processing_time_ms: i64,
        can_generate_report: bool,
    ) {
        let seq = self.next_seq(task_id);
        self.channel_for(task_id).record(ProgressEvent::complete(
            task_id,
            seq,
            response_text,
            response_sections,
            confidence,
            sources_used,
            processing_time_ms,
            can_generate_report,
        ));
    }

    pub fn publish_error(&self, task_id: Uuid, category: ErrorCategory, message: impl Into<String>) {
        let seq = self.next_seq(task_id);
        self.channel_for(task_id)
            .record(ProgressEvent::error(task_id, seq, category, message));
    }

    pub fn publish_ping(&self, task_id: Uuid) {
        let seq = self.next_seq(task_id);
        self.channel_for(task_id).record(ProgressEvent::ping(task_id, seq));
    }

    /// Subscribe to a task's stream. Creates the channel lazily if this is
    /// the first subscriber (or the first publish already created it).
    pub fn subscribe(&self, task_id: Uuid) -> Subscription {
        let channel = self.channel_for(task_id);
        Subscription {
            backlog: channel.backlog_snapshot(),
            receiver: channel.sender.subscribe(),
        }
    }

    /// Whether any event has ever been published for this task.
    pub fn has_channel(&self, task_id: Uuid) -> bool {
        self.channels.contains_key(&task_id)
    }

    /// Drop channels whose task reached a terminal state and have had zero
    /// subscribers for at least [`GRACE_PERIOD`]. Intended to be called
    /// periodically by a background sweep task.
    pub fn sweep_idle(&self) -> usize {
        let stale: Vec<Uuid> = self
            .channels
            .iter()
            .filter(|entry| entry.value().is_idle_past_grace())
            .map(|entry| *entry.key())
            .collect();
        for task_id in &stale {
            self.channels.remove(task_id);
        }
        stale.len()
    }
}

/// Translate a receiver into owned [`ProgressEvent`]s, turning a detected gap
/// (the broadcast buffer overflowed for this subscriber) into a synthetic
/// [`EventKind::Lag`] event rather than silently skipping it.
pub async fn recv_or_lag(receiver: &mut broadcast::Receiver<ProgressEvent>) -> Option<ProgressEvent> {
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "progress bus subscriber lagged");
                return Some(ProgressEvent {
                    kind: EventKind::Lag,
                    lag_count: Some(skipped),
                    ..ProgressEvent::ping(Uuid::nil(), 0)
                });
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_before_subscribe_is_replayed_from_backlog() {
        let bus = ProgressBus::new();
        let task_id = Uuid::now_v7();
        bus.publish_status(task_id, 0, "queued");
        bus.publish_status(task_id, 1, "initializing");

        let sub = bus.subscribe(task_id);
        assert_eq!(sub.backlog.len(), 2);
        assert_eq!(sub.backlog[0].seq, 0);
        assert_eq!(sub.backlog[1].seq, 1);
    }

    #[test]
    fn seq_numbers_are_monotonic_across_publish_kinds() {
        let bus = ProgressBus::new();
        let task_id = Uuid::now_v7();
        bus.publish_status(task_id, 0, "queued");
        bus.publish_progress(task_id, 20, 40, None);
        bus.publish_complete(task_id, "done".into(), serde_json::json!({}), Some(0.9), vec![], 500, true);
        let sub = bus.subscribe(task_id);
        let seqs: Vec<u64> = sub.backlog.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn backlog_is_bounded_to_capacity() {
        let bus = ProgressBus::new();
        let task_id = Uuid::now_v7();
        for i in 0..(BACKLOG_CAPACITY + 10) {
            bus.publish_status(task_id, 2, format!("tick {i}"));
        }
        let sub = bus.subscribe(task_id);
        assert_eq!(sub.backlog.len(), BACKLOG_CAPACITY);
        assert_eq!(sub.backlog.front().unwrap().seq, 10);
    }

    #[tokio::test]
    async fn live_subscriber_receives_events_published_after_subscribe() {
        let bus = ProgressBus::new();
        let task_id = Uuid::now_v7();
        let mut sub = bus.subscribe(task_id);
        bus.publish_status(task_id, 2, "processing");
        let event = sub.receiver.recv().await.expect("event should arrive");
        assert_eq!(event.status_code, 2);
    }

    #[test]
    fn channel_exists_only_after_first_publish_or_subscribe() {
        let bus = ProgressBus::new();
        let task_id = Uuid::now_v7();
        assert!(!bus.has_channel(task_id));
        bus.publish_status(task_id, 0, "queued");
        assert!(bus.has_channel(task_id));
    }

    #[test]
    fn sweep_does_not_remove_active_non_terminal_channel() {
        let bus = ProgressBus::new();
        let task_id = Uuid::now_v7();
        bus.publish_status(task_id, 0, "queued");
        assert_eq!(bus.sweep_idle(), 0);
        assert!(bus.has_channel(task_id));
    }
}
