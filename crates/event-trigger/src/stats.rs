//! Send counters and latency collection.

use crate::message::MessageType;
use crate::report::LatencyStats;
use hdrhistogram::Histogram;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// Statistics for send operations, shared by all client tasks.
#[derive(Debug, Default)]
pub struct SendStats {
    pub messages_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub send_errors: AtomicU64,
    pub suppressed: AtomicU64,
    by_type: [AtomicU64; 5],
}

impl SendStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self, kind: MessageType, bytes: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        self.by_type[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent_of(&self, kind: MessageType) -> u64 {
        self.by_type[kind.index()].load(Ordering::Relaxed)
    }
}

const MAX_LATENCY_US: u64 = 60_000_000;

/// Collects latency samples into a histogram until every sender is dropped.
pub async fn collect_latencies(mut rx: mpsc::UnboundedReceiver<Duration>) -> Histogram<u64> {
    let mut histogram = empty_histogram();

    while let Some(duration) = rx.recv().await {
        let micros = (duration.as_micros() as u64).clamp(1, MAX_LATENCY_US);
        if let Err(e) = histogram.record(micros) {
            warn!("Dropping latency sample: {:?}", e);
        }
    }

    histogram
}

/// Creates an empty histogram covering 1us to 60s.
pub fn empty_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(1, MAX_LATENCY_US, 3).expect("static histogram bounds")
}

/// Computes latency statistics from a histogram.
pub fn compute_latency_stats(histogram: &Histogram<u64>) -> LatencyStats {
    if histogram.is_empty() {
        return LatencyStats::default();
    }

    LatencyStats {
        count: histogram.len(),
        min_us: histogram.min(),
        max_us: histogram.max(),
        mean_us: histogram.mean() as u64,
        p50_us: histogram.value_at_quantile(0.50),
        p95_us: histogram.value_at_quantile(0.95),
        p99_us: histogram.value_at_quantile(0.99),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sent_counts_by_type() {
        let stats = SendStats::new();
        stats.record_sent(MessageType::Data, 60);
        stats.record_sent(MessageType::Data, 61);
        stats.record_sent(MessageType::Critical, 90);
        stats.record_error();
        stats.record_suppressed();

        assert_eq!(stats.messages_sent.load(Ordering::Relaxed), 3);
        assert_eq!(stats.bytes_sent.load(Ordering::Relaxed), 211);
        assert_eq!(stats.sent_of(MessageType::Data), 2);
        assert_eq!(stats.sent_of(MessageType::Critical), 1);
        assert_eq!(stats.sent_of(MessageType::Info), 0);
        assert_eq!(stats.send_errors.load(Ordering::Relaxed), 1);
        assert_eq!(stats.suppressed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_collect_latencies() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(collect_latencies(rx));

        for ms in [1, 2, 3, 4, 100] {
            tx.send(Duration::from_millis(ms)).unwrap();
        }
        tx.send(Duration::ZERO).unwrap();
        drop(tx);

        let histogram = handle.await.unwrap();
        let stats = compute_latency_stats(&histogram);
        assert_eq!(stats.count, 6);
        assert!(stats.max_us >= 99_000);
        assert!(stats.p50_us >= 1_000 && stats.p50_us <= 3_100);
    }

    #[test]
    fn test_empty_histogram_stats() {
        let stats = compute_latency_stats(&empty_histogram());
        assert_eq!(stats.count, 0);
        assert_eq!(stats.format_ms(), "N/A");
    }
}
