use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tr_core::TraceRelay;
use tracing::info;

pub async fn run(relay: TraceRelay, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        sweep_once(&relay, Utc::now());
    }
}

pub fn sweep_once(relay: &TraceRelay, now: DateTime<Utc>) -> usize {
    let removed = relay.sweep_expired(now);
    if removed > 0 {
        info!(removed, remaining = relay.len(), "cleaned up expired traces");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tr_core::{BroadcastHub, TraceRelay};
    use tr_events::{RetentionStore, TraceInput, TraceSource, TraceStatus};

    fn input(id: &str) -> TraceInput {
        TraceInput {
            id: Some(id.to_string()),
            timestamp: Utc::now(),
            command: "sleep 1".to_string(),
            status: TraceStatus::Completed,
            pid: 3,
            cwd: "/".to_string(),
            duration: Some("1sec".to_string()),
            data: None,
        }
    }

    #[test]
    fn sweep_drops_only_expired() {
        let relay = TraceRelay::new(
            RetentionStore::new(10, TimeDelta::hours(1)),
            BroadcastHub::new(4),
        );
        let now = Utc::now();
        relay.ingest_at(input("old"), TraceSource::Api, now - TimeDelta::hours(2));
        relay.ingest_at(input("recent"), TraceSource::Api, now - TimeDelta::minutes(30));
        relay.ingest_at(input("fresh"), TraceSource::Api, now);

        assert_eq!(sweep_once(&relay, now), 1);
        assert_eq!(sweep_once(&relay, now), 0);
        let ids: Vec<_> = relay.snapshot().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["recent", "fresh"]);
    }
}
