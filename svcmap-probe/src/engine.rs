use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use svcmap_types::{Protocol, ProtocolAttributes, ProtocolResult};

/// Upper bound on buffered response bytes for any single probe.
pub(crate) const MAX_RESPONSE_SIZE: usize = 16 * 1024;

pub type ProbeStream = BufReader<TcpStream>;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Protocol(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One protocol's probe script.
///
/// Implementations only express the wire exchange; connection setup,
/// the deadline, timing, and result assembly live in [`run_probe`].
#[async_trait]
pub trait ProbeEngine: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Ports this engine probes by default.
    fn ports(&self) -> &[u16] {
        self.protocol().default_ports()
    }

    async fn script(
        &self,
        stream: &mut ProbeStream,
        host_label: &str,
        attrs: &mut ProtocolAttributes,
    ) -> Result<(), ProbeError>;
}

/// Drive one probe to completion.
///
/// The deadline covers connect and the whole script. The task owns the
/// socket, so whichever of the script or the deadline finishes first is
/// the single completion path; the socket closes when the future is
/// dropped.
pub async fn run_probe(
    engine: &dyn ProbeEngine,
    host_label: &str,
    ip: Ipv4Addr,
    port: u16,
    timeout: Duration,
) -> ProtocolResult {
    let protocol = engine.protocol();
    let mut result = ProtocolResult::new(protocol, host_label, port);

    let attempt = async {
        let stream = TcpStream::connect((ip, port))
            .await
            .map_err(|e| ProbeError::Connect(e.to_string()))?;
        let connected = Instant::now();
        let mut stream = BufReader::new(stream);
        let mut attrs = ProtocolAttributes::default();
        engine.script(&mut stream, host_label, &mut attrs).await?;
        Ok::<_, ProbeError>((attrs, connected.elapsed()))
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok((attrs, elapsed))) => {
            result.accessible = true;
            result.attributes = attrs;
            result.attributes.response_time_ms = elapsed.as_millis() as u64;
        }
        Ok(Err(e)) => {
            debug!(%protocol, %ip, port, error = %e, "probe failed");
            result.error = e.to_string();
        }
        Err(_) => {
            debug!(%protocol, %ip, port, timeout_ms = timeout.as_millis() as u64, "probe deadline hit");
            result.error = format!("{} probe timed out", protocol.name());
        }
    }
    result
}

/// Read one line, tolerating bare-LF terminators and non-UTF-8 bytes.
///
/// Returns `None` on EOF before any byte; a partial line at EOF is
/// still returned, so a server that sends bytes and closes counts as
/// having answered.
pub(crate) async fn read_line(stream: &mut ProbeStream) -> Result<Option<String>, ProbeError> {
    let mut raw = Vec::new();
    let n = stream.read_until(b'\n', &mut raw).await?;
    if n == 0 {
        return Ok(None);
    }
    while matches!(raw.last(), Some(b'\n') | Some(b'\r')) {
        raw.pop();
    }
    Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
}

/// Accumulate the response until a blank line ends the headers, EOF, or
/// the size cap. Body bytes that arrive in the same segments are kept
/// for signature sniffing.
pub(crate) async fn read_response_head(stream: &mut ProbeStream) -> Result<Vec<u8>, ProbeError> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 2048];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if contains_headers_end(&buf) || buf.len() >= MAX_RESPONSE_SIZE {
            break;
        }
    }
    if buf.is_empty() {
        return Err(ProbeError::Protocol(
            "connection closed before response (EOF)".to_string(),
        ));
    }
    Ok(buf)
}

fn contains_headers_end(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    struct LineEcho;

    #[async_trait]
    impl ProbeEngine for LineEcho {
        fn protocol(&self) -> Protocol {
            Protocol::Ftp
        }

        async fn script(
            &self,
            stream: &mut ProbeStream,
            _host_label: &str,
            attrs: &mut ProtocolAttributes,
        ) -> Result<(), ProbeError> {
            let line = read_line(stream)
                .await?
                .ok_or_else(|| ProbeError::Protocol("closed".to_string()))?;
            attrs.banner = line;
            Ok(())
        }
    }

    async fn one_shot_server(payload: &'static [u8]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(payload).await.unwrap();
        });
        port
    }

    #[tokio::test]
    async fn probe_records_banner_and_timing() {
        let port = one_shot_server(b"220 hello\r\n").await;
        let result = run_probe(
            &LineEcho,
            "host.test",
            Ipv4Addr::LOCALHOST,
            port,
            Duration::from_secs(2),
        )
        .await;
        assert!(result.accessible);
        assert_eq!(result.attributes.banner, "220 hello");
        assert!(result.error.is_empty());
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let result = run_probe(
            &LineEcho,
            "host.test",
            Ipv4Addr::LOCALHOST,
            port,
            Duration::from_millis(200),
        )
        .await;
        assert!(!result.accessible);
        assert!(result.error.contains("timed out"), "error: {}", result.error);
        assert_eq!(result.attributes.response_time_ms, 0);
    }

    #[tokio::test]
    async fn refused_connection_reports_connect_failure() {
        // Bind then drop to obtain a port nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = run_probe(
            &LineEcho,
            "host.test",
            Ipv4Addr::LOCALHOST,
            port,
            Duration::from_secs(2),
        )
        .await;
        assert!(!result.accessible);
        assert!(result.error.contains("connect failed"), "error: {}", result.error);
    }

    #[tokio::test]
    async fn close_after_accept_mentions_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let result = run_probe(
            &LineEcho,
            "host.test",
            Ipv4Addr::LOCALHOST,
            port,
            Duration::from_secs(2),
        )
        .await;
        assert!(!result.accessible);
        assert!(!result.error.is_empty());
    }

    #[tokio::test]
    async fn partial_line_at_eof_is_still_a_banner() {
        let port = one_shot_server(b"SSH-2.0-droplet").await;
        let result = run_probe(
            &LineEcho,
            "host.test",
            Ipv4Addr::LOCALHOST,
            port,
            Duration::from_secs(2),
        )
        .await;
        assert!(result.accessible);
        assert_eq!(result.attributes.banner, "SSH-2.0-droplet");
    }

    #[test]
    fn headers_end_detection() {
        assert!(contains_headers_end(b"HTTP/1.1 200 OK\r\n\r\nbody"));
        assert!(!contains_headers_end(b"HTTP/1.1 200 OK\r\nServer: x\r\n"));
    }
}
