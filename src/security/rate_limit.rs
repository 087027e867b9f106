//! Per-IP sliding-window rate limiting.
//!
//! Two windows per source address: inbound HTTP admissions and
//! control-channel opens, each pruned to the trailing minute.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Width of both sliding windows.
const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct IpBucket {
    /// Timestamps of admitted HTTP requests.
    requests: VecDeque<Instant>,
    /// Timestamps of admitted control-channel opens.
    opens: VecDeque<Instant>,
}

fn prune(window: &mut VecDeque<Instant>, now: Instant) {
    while let Some(front) = window.front() {
        if now.duration_since(*front) >= WINDOW {
            window.pop_front();
        } else {
            break;
        }
    }
}

/// Tracks per-IP admission windows for HTTP requests and control-channel opens.
pub struct RateTracker {
    buckets: DashMap<IpAddr, IpBucket>,
    config: RateLimitConfig,
}

impl RateTracker {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    /// Admit or refuse an inbound HTTP request from `ip`.
    pub fn allow_request(&self, ip: IpAddr) -> bool {
        self.allow_request_at(ip, Instant::now())
    }

    /// Admit or refuse a control-channel open from `ip`.
    pub fn allow_connection(&self, ip: IpAddr) -> bool {
        self.allow_connection_at(ip, Instant::now())
    }

    fn allow_request_at(&self, ip: IpAddr, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }
        let mut bucket = self.buckets.entry(ip).or_default();
        prune(&mut bucket.requests, now);
        if bucket.requests.len() < self.config.max_requests_per_minute {
            bucket.requests.push_back(now);
            true
        } else {
            metrics::record_rate_limited("http");
            false
        }
    }

    fn allow_connection_at(&self, ip: IpAddr, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }
        let mut bucket = self.buckets.entry(ip).or_default();
        prune(&mut bucket.opens, now);
        if bucket.opens.len() < self.config.max_connections_per_ip {
            bucket.opens.push_back(now);
            true
        } else {
            metrics::record_rate_limited("control");
            false
        }
    }

    /// Drop buckets whose windows are both empty. Called periodically to
    /// bound tracker size.
    pub fn prune_idle(&self) {
        let now = Instant::now();
        self.buckets.retain(|_, bucket| {
            prune(&mut bucket.requests, now);
            prune(&mut bucket.opens, now);
            !bucket.requests.is_empty() || !bucket.opens.is_empty()
        });
    }

    /// Number of tracked source addresses.
    pub fn tracked_ips(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(max_requests: usize, max_conns: usize) -> RateTracker {
        RateTracker::new(RateLimitConfig {
            enabled: true,
            max_requests_per_minute: max_requests,
            max_connections_per_ip: max_conns,
        })
    }

    fn ip(last: u8) -> IpAddr {
        format!("10.0.0.{last}").parse().unwrap()
    }

    #[test]
    fn test_exactly_max_requests_admitted() {
        let t = tracker(5, 10);
        let now = Instant::now();
        for _ in 0..5 {
            assert!(t.allow_request_at(ip(1), now));
        }
        assert!(!t.allow_request_at(ip(1), now));
    }

    #[test]
    fn test_window_slides() {
        let t = tracker(2, 10);
        let start = Instant::now();
        assert!(t.allow_request_at(ip(1), start));
        assert!(t.allow_request_at(ip(1), start));
        assert!(!t.allow_request_at(ip(1), start));
        // One minute later the window has emptied.
        assert!(t.allow_request_at(ip(1), start + WINDOW));
    }

    #[test]
    fn test_windows_are_independent() {
        let t = tracker(1, 2);
        let now = Instant::now();
        assert!(t.allow_request_at(ip(1), now));
        assert!(!t.allow_request_at(ip(1), now));
        // Connection window is untouched by request admissions.
        assert!(t.allow_connection_at(ip(1), now));
        assert!(t.allow_connection_at(ip(1), now));
        assert!(!t.allow_connection_at(ip(1), now));
    }

    #[test]
    fn test_addresses_are_independent() {
        let t = tracker(1, 1);
        let now = Instant::now();
        assert!(t.allow_request_at(ip(1), now));
        assert!(t.allow_request_at(ip(2), now));
        assert!(!t.allow_request_at(ip(1), now));
    }

    #[test]
    fn test_disabled_gate_admits_everything() {
        let t = RateTracker::new(RateLimitConfig {
            enabled: false,
            max_requests_per_minute: 1,
            max_connections_per_ip: 1,
        });
        for _ in 0..10 {
            assert!(t.allow_request(ip(1)));
            assert!(t.allow_connection(ip(1)));
        }
    }

    #[test]
    fn test_prune_idle_drops_empty_buckets() {
        let t = tracker(5, 5);
        let past = Instant::now() - WINDOW - Duration::from_secs(1);
        t.allow_request_at(ip(1), past);
        assert_eq!(t.tracked_ips(), 1);
        t.prune_idle();
        assert_eq!(t.tracked_ips(), 0);
    }
}
