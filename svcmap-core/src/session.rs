use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use svcmap_probe::ProbeEngine;
use svcmap_resolve::{resolve_with_retry, DnsOutcome, Resolve, DNS_FAILED};
use svcmap_timing::LatencyMap;
use svcmap_types::{ProbeMode, Protocol, ProtocolResult, ScanReport, Target};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    DnsRunning,
    ProbeRunning,
    Completed,
    Failed,
    Timeout,
}

/// State shared with in-flight probe tasks. Probes append results and
/// bump the completion counter; the scheduler polls the counter on its
/// sweep. The counter is incremented last so a releasable session
/// already holds every kept result.
pub struct SessionShared {
    completed: AtomicUsize,
    results: Mutex<Vec<ProtocolResult>>,
    only_success: bool,
    latency: Arc<LatencyMap>,
    ip: Option<Ipv4Addr>,
}

impl SessionShared {
    pub fn push_result(&self, result: ProtocolResult) {
        if result.accessible && result.attributes.response_time_ms > 0 {
            if let Some(ip) = self.ip {
                self.latency
                    .record(ip, Duration::from_millis(result.attributes.response_time_ms));
            }
        }

        if !(self.only_success && !result.accessible) {
            self.results.lock().expect("session results poisoned").push(result);
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

/// Per-target lifecycle: DNS, per-protocol port queues, result
/// aggregation. The session owns no socket; probes do.
pub struct Session {
    target: Target,
    dns: DnsOutcome,
    state: SessionState,
    queues: Vec<(Protocol, VecDeque<u16>)>,
    expected: usize,
    shared: Arc<SessionShared>,
    error: String,
    started: Instant,
}

impl Session {
    /// Resolve (unless the target is already an address) and build the
    /// port queues. A session whose DNS fails holds no queues and is
    /// immediately releasable.
    pub async fn new(
        mut target: Target,
        resolver: &dyn Resolve,
        dns_timeout: Duration,
        engines: &[Arc<dyn ProbeEngine>],
        probe_mode: ProbeMode,
        only_success: bool,
        latency: Arc<LatencyMap>,
    ) -> Self {
        let mut state = SessionState::Pending;
        let mut dns = DnsOutcome::default();
        let mut error = String::new();

        if let Some(ip) = target.ip {
            dns.ip = Some(ip);
        } else if let Some(name) = target.hostname.clone() {
            state = SessionState::DnsRunning;
            dns = resolve_with_retry(resolver, &name, dns_timeout).await;
            match dns.ip {
                Some(ip) => target.ip = Some(ip),
                None => {
                    debug!(name = %name, error = %dns.error, "session DNS failed");
                    state = SessionState::Failed;
                    error = DNS_FAILED.to_string();
                }
            }
        } else {
            state = SessionState::Failed;
            error = DNS_FAILED.to_string();
        }

        let mut queues = Vec::new();
        let mut expected = 0;
        if target.ip.is_some() {
            let mut available: Vec<u16> = Vec::new();
            for engine in engines {
                for &port in engine.ports() {
                    if !available.contains(&port) {
                        available.push(port);
                    }
                }
            }

            for engine in engines {
                let queue: VecDeque<u16> = match probe_mode {
                    ProbeMode::ProtocolDefaults => engine
                        .ports()
                        .iter()
                        .copied()
                        .filter(|port| available.contains(port))
                        .collect(),
                    ProbeMode::AllAvailable => available.iter().copied().collect(),
                };
                expected += queue.len();
                queues.push((engine.protocol(), queue));
            }

            state = if expected > 0 {
                SessionState::ProbeRunning
            } else {
                SessionState::Completed
            };
        }

        let shared = Arc::new(SessionShared {
            completed: AtomicUsize::new(0),
            results: Mutex::new(Vec::new()),
            only_success,
            latency,
            ip: target.ip,
        });

        Self {
            target,
            dns,
            state,
            queues,
            expected,
            shared,
            error,
            started: Instant::now(),
        }
    }

    /// Head of the first non-empty per-protocol queue.
    pub fn next_probe(&mut self) -> Option<(Protocol, u16)> {
        for (protocol, queue) in &mut self.queues {
            if let Some(port) = queue.pop_front() {
                return Some((*protocol, port));
            }
        }
        None
    }

    pub fn has_pending_ports(&self) -> bool {
        self.queues.iter().any(|(_, queue)| !queue.is_empty())
    }

    /// A session may be harvested when DNS failed before any probe was
    /// enqueued, when it never had work, or when every probe reported.
    pub fn releasable(&self) -> bool {
        if self.target.ip.is_none() && self.target.hostname.is_some() {
            return true;
        }
        if self.expected == 0 {
            return true;
        }
        self.shared.completed() >= self.expected
    }

    pub fn expected_probes(&self) -> usize {
        self.expected
    }

    pub fn completed_probes(&self) -> usize {
        self.shared.completed()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn dns(&self) -> &DnsOutcome {
        &self.dns
    }

    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.target.ip
    }

    pub fn host_label(&self) -> &str {
        self.target.host_label()
    }

    pub fn shared(&self) -> Arc<SessionShared> {
        Arc::clone(&self.shared)
    }

    /// Drain the session into its report. Consumes the session; the
    /// scheduler calls this exactly once, at harvest.
    pub fn into_report(mut self) -> ScanReport {
        if self.state == SessionState::ProbeRunning {
            self.state = SessionState::Completed;
        }
        let protocols = std::mem::take(
            &mut *self.shared.results.lock().expect("session results poisoned"),
        );
        ScanReport {
            domain: self.target.host_label().to_string(),
            ip: self.target.ip_string(),
            total_time_ms: self.started.elapsed().as_millis() as u64,
            protocols,
        }
    }
}
