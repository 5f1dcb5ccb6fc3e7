use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use thiserror::Error;
use tracing::{debug, warn};

/// Error recorded on the session when every resolution attempt fails.
pub const DNS_FAILED: &str = "DNS Resolution Failed";

/// Attempts per name: the initial try plus two retries, no backoff.
pub const DNS_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("resolver initialization failed: {0}")]
    Init(String),
}

/// Outcome of one resolution. The scanner only acts on the A answer;
/// MX records are informational.
#[derive(Debug, Clone, Default)]
pub struct DnsOutcome {
    pub ip: Option<Ipv4Addr>,
    pub mx_records: Vec<String>,
    pub error: String,
}

impl DnsOutcome {
    pub fn success(&self) -> bool {
        self.ip.is_some()
    }

    fn failure(error: impl Into<String>) -> Self {
        Self {
            ip: None,
            mx_records: Vec::new(),
            error: error.into(),
        }
    }
}

#[async_trait]
pub trait Resolve: Send + Sync {
    /// Resolve `name` to one IPv4 address within `timeout`.
    async fn resolve(&self, name: &str, timeout: Duration) -> DnsOutcome;
}

/// Library-backed resolver, preferred for throughput.
pub struct LibraryResolver {
    inner: TokioAsyncResolver,
}

impl LibraryResolver {
    /// Build from the system configuration, falling back to the
    /// resolver's defaults when /etc/resolv.conf is unusable.
    pub fn from_system() -> Result<Self, ResolveError> {
        let inner = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => resolver,
            Err(e) => {
                warn!("system resolver config unavailable ({e}), using defaults");
                TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
            }
        };
        Ok(Self { inner })
    }
}

#[async_trait]
impl Resolve for LibraryResolver {
    async fn resolve(&self, name: &str, timeout: Duration) -> DnsOutcome {
        let lookup = match tokio::time::timeout(timeout, self.inner.lookup_ip(name)).await {
            Ok(Ok(lookup)) => lookup,
            Ok(Err(e)) => return DnsOutcome::failure(e.to_string()),
            Err(_) => {
                return DnsOutcome::failure(format!(
                    "lookup timed out after {}ms",
                    timeout.as_millis()
                ))
            }
        };

        let ip = lookup.iter().find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        });
        if ip.is_none() {
            return DnsOutcome::failure("no IPv4 address in answer");
        }

        // Best effort; MX failures never fail the resolution.
        let mx_records = match tokio::time::timeout(timeout, self.inner.mx_lookup(name)).await {
            Ok(Ok(mx)) => mx
                .iter()
                .map(|rec| format!("{} {}", rec.preference(), rec.exchange()))
                .collect(),
            _ => Vec::new(),
        };

        debug!(name, ip = ?ip, mx = mx_records.len(), "resolved");
        DnsOutcome {
            ip,
            mx_records,
            error: String::new(),
        }
    }
}

/// Fallback resolver: blocking `ToSocketAddrs` lookup moved onto the
/// blocking pool, bounded by the same timeout.
pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
    async fn resolve(&self, name: &str, timeout: Duration) -> DnsOutcome {
        let name_owned = name.to_string();
        let lookup = tokio::task::spawn_blocking(move || {
            let addr = format!("{name_owned}:0");
            addr.to_socket_addrs().map(|addrs| {
                addrs.filter_map(|a| match a.ip() {
                    IpAddr::V4(v4) => Some(v4),
                    IpAddr::V6(_) => None,
                })
                .next()
            })
        });

        match tokio::time::timeout(timeout, lookup).await {
            Ok(Ok(Ok(Some(ip)))) => DnsOutcome {
                ip: Some(ip),
                mx_records: Vec::new(),
                error: String::new(),
            },
            Ok(Ok(Ok(None))) => DnsOutcome::failure("no IPv4 address in answer"),
            Ok(Ok(Err(e))) => DnsOutcome::failure(e.to_string()),
            Ok(Err(e)) => DnsOutcome::failure(format!("lookup task failed: {e}")),
            Err(_) => DnsOutcome::failure(format!(
                "lookup timed out after {}ms",
                timeout.as_millis()
            )),
        }
    }
}

/// Resolve with the fixed retry policy: up to [`DNS_ATTEMPTS`] tries,
/// stopping at the first answer that carries an address.
pub async fn resolve_with_retry(
    resolver: &dyn Resolve,
    name: &str,
    timeout: Duration,
) -> DnsOutcome {
    let mut last = DnsOutcome::failure(DNS_FAILED);
    for attempt in 1..=DNS_ATTEMPTS {
        let outcome = resolver.resolve(name, timeout).await;
        if outcome.success() {
            return outcome;
        }
        debug!(name, attempt, error = %outcome.error, "resolution attempt failed");
        last = outcome;
    }
    last
}
