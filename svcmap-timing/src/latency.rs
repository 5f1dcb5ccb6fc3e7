use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Floor for the adaptive probe timeout.
pub const MIN_ADAPTIVE_TIMEOUT: Duration = Duration::from_millis(800);
/// Ceiling for the adaptive probe timeout.
pub const MAX_ADAPTIVE_TIMEOUT: Duration = Duration::from_millis(4_000);

const DEFAULT_SRTT_US: u32 = 200_000;
const DEFAULT_RTTVAR_US: u32 = 50_000;

/// Jacobson/Karels RTT estimator for one IPv4 /24 (RFC 6298).
///
/// Formulas:
///   RTTVAR  = RTTVAR + (|sample - SRTT| - RTTVAR) / 4
///   SRTT    = SRTT + (sample - SRTT) / 8
///   timeout = clamp(SRTT + 4 * RTTVAR, 800ms, 4000ms)
///
/// Updates are lock-free; concurrent samples may lose an update, which
/// is acceptable for a smoothed estimate.
#[derive(Debug)]
pub struct SubnetLatency {
    srtt_us: AtomicU32,
    rttvar_us: AtomicU32,
}

impl Default for SubnetLatency {
    fn default() -> Self {
        Self {
            srtt_us: AtomicU32::new(DEFAULT_SRTT_US),
            rttvar_us: AtomicU32::new(DEFAULT_RTTVAR_US),
        }
    }
}

impl SubnetLatency {
    /// Feed one RTT sample in microseconds.
    pub fn update(&self, sample_us: u32) {
        let srtt = self.srtt_us.load(Ordering::Relaxed);
        let rttvar = self.rttvar_us.load(Ordering::Relaxed);

        let diff = sample_us as i64 - srtt as i64;
        let abs_diff = diff.unsigned_abs() as u32;

        let new_rttvar = (rttvar as i64 + (abs_diff as i64 - rttvar as i64) / 4).max(0) as u32;
        let new_srtt = (srtt as i64 + diff / 8).max(1) as u32;

        self.rttvar_us.store(new_rttvar, Ordering::Relaxed);
        self.srtt_us.store(new_srtt, Ordering::Relaxed);
    }

    pub fn srtt_us(&self) -> u32 {
        self.srtt_us.load(Ordering::Relaxed)
    }

    pub fn rttvar_us(&self) -> u32 {
        self.rttvar_us.load(Ordering::Relaxed)
    }

    /// SRTT + 4 * RTTVAR, clamped to the adaptive window.
    pub fn suggested_timeout(&self) -> Duration {
        let timeout_us =
            self.srtt_us.load(Ordering::Relaxed) as u64 + 4 * self.rttvar_us.load(Ordering::Relaxed) as u64;
        Duration::from_micros(timeout_us).clamp(MIN_ADAPTIVE_TIMEOUT, MAX_ADAPTIVE_TIMEOUT)
    }
}

/// Reader-preferring map from /24 prefix to its latency estimator.
///
/// Lookups take the read lock; the write lock is only taken the first
/// time a subnet is seen.
#[derive(Debug, Default)]
pub struct LatencyMap {
    inner: RwLock<HashMap<[u8; 3], Arc<SubnetLatency>>>,
}

impl LatencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn subnet_key(ip: Ipv4Addr) -> [u8; 3] {
        let o = ip.octets();
        [o[0], o[1], o[2]]
    }

    fn entry(&self, key: [u8; 3]) -> Arc<SubnetLatency> {
        if let Some(stats) = self.inner.read().expect("latency map poisoned").get(&key) {
            return Arc::clone(stats);
        }
        let mut map = self.inner.write().expect("latency map poisoned");
        Arc::clone(map.entry(key).or_default())
    }

    /// Record a successful probe's RTT for the sample's /24.
    pub fn record(&self, ip: Ipv4Addr, rtt: Duration) {
        let sample_us = rtt.as_micros().min(u128::from(u32::MAX)) as u32;
        self.entry(Self::subnet_key(ip)).update(sample_us);
    }

    /// Adaptive timeout for probes toward `ip`'s /24. An unseen subnet
    /// gets the default estimate, which clamps to the floor.
    pub fn suggested_timeout(&self, ip: Ipv4Addr) -> Duration {
        self.entry(Self::subnet_key(ip)).suggested_timeout()
    }

    pub fn tracked_subnets(&self) -> usize {
        self.inner.read().expect("latency map poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_subnet_suggests_floor() {
        let map = LatencyMap::new();
        // Defaults: 200ms + 4 * 50ms = 400ms, clamped up to the floor.
        assert_eq!(
            map.suggested_timeout(Ipv4Addr::new(203, 0, 113, 9)),
            MIN_ADAPTIVE_TIMEOUT
        );
    }

    #[test]
    fn estimator_converges_on_stable_rtt() {
        let stats = SubnetLatency::default();
        for _ in 0..64 {
            stats.update(100_000); // 100ms
        }
        let srtt = stats.srtt_us();
        assert!((95_000..=105_000).contains(&srtt), "srtt={srtt}");
        // Variance decays toward zero, so the suggestion settles at the floor.
        assert_eq!(stats.suggested_timeout(), MIN_ADAPTIVE_TIMEOUT);
    }

    #[test]
    fn slow_subnet_is_clamped_to_ceiling() {
        let stats = SubnetLatency::default();
        for _ in 0..64 {
            stats.update(3_900_000); // 3.9s samples
        }
        assert_eq!(stats.suggested_timeout(), MAX_ADAPTIVE_TIMEOUT);
    }

    #[test]
    fn samples_are_keyed_by_slash24() {
        let map = LatencyMap::new();
        map.record(Ipv4Addr::new(10, 1, 2, 3), Duration::from_millis(50));
        map.record(Ipv4Addr::new(10, 1, 2, 200), Duration::from_millis(50));
        map.record(Ipv4Addr::new(10, 1, 3, 3), Duration::from_millis(50));
        assert_eq!(map.tracked_subnets(), 2);
    }

    #[test]
    fn single_fast_sample_lowers_estimate() {
        let stats = SubnetLatency::default();
        let before = stats.srtt_us();
        stats.update(8_000);
        assert!(stats.srtt_us() < before);
    }
}
