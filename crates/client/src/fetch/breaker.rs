//! Per-domain circuit breaker.
//!
//! A domain is blocked once it has accumulated `threshold` failures and its
//! last failure is younger than the block duration. Expiry is lazy: the first
//! lookup after the window elapses drops the record. The map is swept when it
//! grows past [`SWEEP_THRESHOLD`] so dead domains do not accumulate.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Map size that triggers a sweep of expired records.
pub const SWEEP_THRESHOLD: usize = 1024;

/// Statuses that say the host, not the network, refuses us.
pub const UNCOOPERATIVE_STATUSES: [StatusCode; 3] =
    [StatusCode::FORBIDDEN, StatusCode::NOT_FOUND, StatusCode::TOO_MANY_REQUESTS];

pub fn is_uncooperative(status: StatusCode) -> bool {
    UNCOOPERATIVE_STATUSES.contains(&status)
}

#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    last_failure_at: Instant,
    consecutive_failures: u32,
}

impl FailureRecord {
    fn is_expired(&self, block_duration: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_failure_at) >= block_duration
    }
}

/// Tracks fetch failures per host.
#[derive(Debug)]
pub struct DomainCircuitBreaker {
    threshold: u32,
    block_duration: Duration,
    records: Mutex<HashMap<String, FailureRecord>>,
}

impl DomainCircuitBreaker {
    pub fn new(threshold: u32, block_duration: Duration) -> Self {
        Self { threshold: threshold.max(1), block_duration, records: Mutex::new(HashMap::new()) }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Whether fetches to `domain` should be skipped right now.
    pub async fn is_blocked(&self, domain: &str) -> bool {
        let mut records = self.records.lock().await;
        let now = Instant::now();
        match records.get(domain) {
            Some(record) if record.is_expired(self.block_duration, now) => {
                records.remove(domain);
                tracing::info!(domain, "domain unblocked");
                false
            }
            Some(record) => record.consecutive_failures >= self.threshold,
            None => false,
        }
    }

    /// Count one failure for `domain`. Returns the failure count within the
    /// current window.
    pub async fn record_failure(&self, domain: &str) -> u32 {
        let mut records = self.records.lock().await;
        let now = Instant::now();

        if records.len() >= SWEEP_THRESHOLD {
            let block_duration = self.block_duration;
            records.retain(|_, r| !r.is_expired(block_duration, now));
        }

        let record = records
            .entry(domain.to_string())
            .or_insert(FailureRecord { last_failure_at: now, consecutive_failures: 0 });
        if record.is_expired(self.block_duration, now) {
            record.consecutive_failures = 0;
        }
        record.consecutive_failures += 1;
        record.last_failure_at = now;

        let failures = record.consecutive_failures;
        if failures == self.threshold {
            tracing::warn!(domain, failures, block_secs = self.block_duration.as_secs(), "blocking domain");
        } else {
            tracing::debug!(domain, failures, "domain failure recorded");
        }
        failures
    }

    /// Forget the failure history of `domain`.
    pub async fn record_success(&self, domain: &str) {
        self.records.lock().await.remove(domain);
    }

    /// Drop every record whose block window has elapsed.
    pub async fn sweep(&self) -> usize {
        let mut records = self.records.lock().await;
        let before = records.len();
        let now = Instant::now();
        let block_duration = self.block_duration;
        records.retain(|_, r| !r.is_expired(block_duration, now));
        before - records.len()
    }

    /// Domains currently over the threshold and inside their window.
    pub async fn blocked_domains(&self) -> Vec<String> {
        let records = self.records.lock().await;
        let now = Instant::now();
        let mut blocked: Vec<String> = records
            .iter()
            .filter(|(_, r)| r.consecutive_failures >= self.threshold && !r.is_expired(self.block_duration, now))
            .map(|(d, _)| d.clone())
            .collect();
        blocked.sort();
        blocked
    }

    /// Number of tracked domains, blocked or not.
    pub async fn tracked(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test(start_paused = true)]
    async fn test_blocks_after_threshold() {
        let breaker = DomainCircuitBreaker::new(3, HOUR);
        assert!(!breaker.is_blocked("a.example").await);

        breaker.record_failure("a.example").await;
        breaker.record_failure("a.example").await;
        assert!(!breaker.is_blocked("a.example").await);

        assert_eq!(breaker.record_failure("a.example").await, 3);
        assert!(breaker.is_blocked("a.example").await);
        assert!(!breaker.is_blocked("b.example").await);
        assert_eq!(breaker.blocked_domains().await, vec!["a.example".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_one_blocks_immediately() {
        let breaker = DomainCircuitBreaker::new(1, HOUR);
        breaker.record_failure("a.example").await;
        assert!(breaker.is_blocked("a.example").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unblocks_after_duration() {
        let breaker = DomainCircuitBreaker::new(1, HOUR);
        breaker.record_failure("a.example").await;

        tokio::time::advance(HOUR - Duration::from_secs(1)).await;
        assert!(breaker.is_blocked("a.example").await);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!breaker.is_blocked("a.example").await);
        assert_eq!(breaker.tracked().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_window_restart_count() {
        let breaker = DomainCircuitBreaker::new(2, HOUR);
        breaker.record_failure("a.example").await;
        tokio::time::advance(HOUR).await;
        assert_eq!(breaker.record_failure("a.example").await, 1);
        assert!(!breaker.is_blocked("a.example").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets() {
        let breaker = DomainCircuitBreaker::new(2, HOUR);
        breaker.record_failure("a.example").await;
        breaker.record_success("a.example").await;
        breaker.record_failure("a.example").await;
        assert!(!breaker.is_blocked("a.example").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_expired() {
        let breaker = DomainCircuitBreaker::new(1, HOUR);
        breaker.record_failure("old.example").await;
        tokio::time::advance(HOUR).await;
        breaker.record_failure("new.example").await;

        assert_eq!(breaker.sweep().await, 1);
        assert_eq!(breaker.tracked().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_map_swept_when_large() {
        let breaker = DomainCircuitBreaker::new(3, HOUR);
        for i in 0..SWEEP_THRESHOLD {
            breaker.record_failure(&format!("d{i}.example")).await;
        }
        tokio::time::advance(HOUR).await;
        breaker.record_failure("fresh.example").await;
        assert_eq!(breaker.tracked().await, 1);
    }

    #[test]
    fn test_uncooperative_statuses() {
        assert!(is_uncooperative(StatusCode::FORBIDDEN));
        assert!(is_uncooperative(StatusCode::NOT_FOUND));
        assert!(is_uncooperative(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_uncooperative(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_uncooperative(StatusCode::OK));
    }
}
