use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use svcmap_probe::{run_probe, ProbeEngine};
use svcmap_resolve::Resolve;
use svcmap_timing::LatencyMap;
use svcmap_types::{ProbeMode, Protocol, ScanReport, ScannerConfig, Target};

use crate::session::Session;

/// Idle pause between scheduler sweeps.
const TICK: Duration = Duration::from_millis(5);

/// Owns the active session set and dispatches probes under the
/// admission cap. Single-threaded by construction: only this task
/// touches the session list.
pub struct Scheduler {
    cap: usize,
    batch_size: usize,
    dns_timeout: Duration,
    probe_timeout: Duration,
    probe_mode: ProbeMode,
    only_success: bool,
    engines: Vec<Arc<dyn ProbeEngine>>,
    resolver: Arc<dyn Resolve>,
    latency: Arc<LatencyMap>,
}

impl Scheduler {
    pub fn new(
        cap: usize,
        config: &ScannerConfig,
        engines: Vec<Arc<dyn ProbeEngine>>,
        resolver: Arc<dyn Resolve>,
        latency: Arc<LatencyMap>,
    ) -> Self {
        Self {
            cap,
            batch_size: config.batch_size.max(1),
            dns_timeout: config.dns_timeout,
            probe_timeout: config.probe_timeout,
            probe_mode: config.probe_mode,
            only_success: config.only_success,
            engines,
            resolver,
            latency,
        }
    }

    /// Run to completion: until the ingester is done, the buffer is
    /// drained, and every session has been harvested. On cancellation
    /// admission stops and in-flight probes are left to finish or time
    /// out.
    pub async fn run(
        &self,
        mut targets_rx: mpsc::Receiver<Target>,
        reports_tx: mpsc::Sender<ScanReport>,
        cancel: CancellationToken,
    ) {
        let mut sessions: Vec<Session> = Vec::new();
        let mut input_closed = false;

        loop {
            let mut quota = self
                .batch_size
                .min(self.cap.saturating_sub(sessions.len()).max(1));

            // Harvest releasable sessions into reports.
            let mut i = 0;
            while i < sessions.len() {
                if sessions[i].releasable() {
                    let session = sessions.swap_remove(i);
                    let report = session.into_report();
                    if reports_tx.send(report).await.is_err() {
                        warn!("result pipeline closed; report dropped");
                    }
                } else {
                    i += 1;
                }
            }

            // Feed sessions that still have pending ports.
            'feed: for session in sessions.iter_mut() {
                while quota > 0 {
                    match session.next_probe() {
                        Some((protocol, port)) => {
                            self.launch(session, protocol, port);
                            quota -= 1;
                        }
                        None => break,
                    }
                }
                if quota == 0 {
                    break 'feed;
                }
            }

            // Admit new targets while quota and cap allow. DNS runs
            // inline here; it is a no-op for IP targets.
            while quota > 0 && sessions.len() < self.cap && !cancel.is_cancelled() {
                match targets_rx.try_recv() {
                    Ok(target) => {
                        let mut session = Session::new(
                            target,
                            self.resolver.as_ref(),
                            self.dns_timeout,
                            &self.engines,
                            self.probe_mode,
                            self.only_success,
                            Arc::clone(&self.latency),
                        )
                        .await;
                        if let Some((protocol, port)) = session.next_probe() {
                            self.launch(&session, protocol, port);
                            quota -= 1;
                        }
                        sessions.push(session);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        input_closed = true;
                        break;
                    }
                }
            }

            if sessions.is_empty() && (input_closed || cancel.is_cancelled()) {
                break;
            }

            tokio::time::sleep(TICK).await;
        }

        info!("scan loop completed");
    }

    /// Spawn one probe task. The task owns its socket and deadline and
    /// reports back through the session's shared state.
    fn launch(&self, session: &Session, protocol: Protocol, port: u16) {
        let Some(ip) = session.ip() else {
            return;
        };
        let Some(engine) = self
            .engines
            .iter()
            .find(|e| e.protocol() == protocol)
            .cloned()
        else {
            warn!(%protocol, "no engine for scheduled probe");
            return;
        };

        let timeout = if self.probe_timeout.is_zero() {
            self.latency.suggested_timeout(ip)
        } else {
            self.probe_timeout
        };
        debug!(%protocol, %ip, port, timeout_ms = timeout.as_millis() as u64, "probe launched");

        let host = session.host_label().to_string();
        let shared = session.shared();
        tokio::spawn(async move {
            let result = run_probe(engine.as_ref(), &host, ip, port, timeout).await;
            shared.push_result(result);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use svcmap_probe::{ProbeError, ProbeStream};
    use svcmap_resolve::DnsOutcome;
    use svcmap_types::ProtocolAttributes;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct BannerEngine {
        ports: Vec<u16>,
        live: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProbeEngine for BannerEngine {
        fn protocol(&self) -> Protocol {
            Protocol::Ftp
        }

        fn ports(&self) -> &[u16] {
            &self.ports
        }

        async fn script(
            &self,
            stream: &mut ProbeStream,
            _host_label: &str,
            attrs: &mut ProtocolAttributes,
        ) -> Result<(), ProbeError> {
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(live, Ordering::SeqCst);

            let mut line = String::new();
            stream.read_line(&mut line).await?;
            attrs.banner = line.trim_end().to_string();

            tokio::time::sleep(Duration::from_millis(20)).await;
            self.live.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingResolver;

    #[async_trait]
    impl Resolve for FailingResolver {
        async fn resolve(&self, _name: &str, _timeout: Duration) -> DnsOutcome {
            DnsOutcome {
                ip: None,
                mx_records: Vec::new(),
                error: "NXDOMAIN".into(),
            }
        }
    }

    async fn banner_listener() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let _ = stream.write_all(b"220 test service\r\n").await;
                    tokio::time::sleep(Duration::from_millis(50)).await;
                });
            }
        });
        port
    }

    fn config() -> ScannerConfig {
        ScannerConfig {
            probe_timeout: Duration::from_millis(2_000),
            dns_timeout: Duration::from_millis(200),
            batch_size: 64,
            ..Default::default()
        }
    }

    async fn run_scheduler(
        cap: usize,
        targets: Vec<Target>,
        engines: Vec<Arc<dyn ProbeEngine>>,
    ) -> Vec<ScanReport> {
        let (targets_tx, targets_rx) = mpsc::channel(64);
        let (reports_tx, mut reports_rx) = mpsc::channel(64);

        for target in targets {
            targets_tx.send(target).await.unwrap();
        }
        drop(targets_tx);

        let scheduler = Scheduler::new(
            cap,
            &config(),
            engines,
            Arc::new(FailingResolver),
            Arc::new(LatencyMap::new()),
        );
        scheduler
            .run(targets_rx, reports_tx, CancellationToken::new())
            .await;

        let mut reports = Vec::new();
        while let Some(report) = reports_rx.recv().await {
            reports.push(report);
        }
        reports
    }

    #[tokio::test]
    async fn one_report_per_admitted_target() {
        let port = banner_listener().await;
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let engines: Vec<Arc<dyn ProbeEngine>> = vec![Arc::new(BannerEngine {
            ports: vec![port],
            live,
            peak,
        })];

        let targets = vec![
            Target::from_input("127.0.0.1"),
            Target::from_input("127.0.0.1"),
            Target::from_input("127.0.0.1"),
        ];
        let reports = run_scheduler(100, targets, engines).await;

        assert_eq!(reports.len(), 3);
        for report in &reports {
            assert_eq!(report.protocols.len(), 1);
            assert!(report.protocols[0].accessible);
            assert_eq!(report.protocols[0].attributes.banner, "220 test service");
            assert_eq!(report.protocols[0].port, port);
        }
    }

    #[tokio::test]
    async fn dns_failure_still_produces_a_report() {
        let port = banner_listener().await;
        let engines: Vec<Arc<dyn ProbeEngine>> = vec![Arc::new(BannerEngine {
            ports: vec![port],
            live: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        })];

        let targets = vec![
            Target::from_input("127.0.0.1"),
            Target::from_input("no-such-host.invalid"),
        ];
        let reports = run_scheduler(100, targets, engines).await;

        assert_eq!(reports.len(), 2);
        let failed = reports
            .iter()
            .find(|r| r.domain == "no-such-host.invalid")
            .unwrap();
        assert!(failed.protocols.is_empty());
        assert_eq!(failed.ip, "");
    }

    #[tokio::test]
    async fn session_cap_bounds_concurrent_probes() {
        let port = banner_listener().await;
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let engines: Vec<Arc<dyn ProbeEngine>> = vec![Arc::new(BannerEngine {
            ports: vec![port],
            live: Arc::clone(&live),
            peak: Arc::clone(&peak),
        })];

        let targets: Vec<Target> = (0..12).map(|_| Target::from_input("127.0.0.1")).collect();
        let reports = run_scheduler(2, targets, engines).await;

        assert_eq!(reports.len(), 12);
        // One port per session: in-flight probes never exceed the cap.
        assert!(peak.load(Ordering::SeqCst) <= 2, "peak {}", peak.load(Ordering::SeqCst));
    }
}
