mod latency;

pub use latency::{LatencyMap, SubnetLatency, MAX_ADAPTIVE_TIMEOUT, MIN_ADAPTIVE_TIMEOUT};
