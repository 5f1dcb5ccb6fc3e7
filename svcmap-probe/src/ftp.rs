use async_trait::async_trait;

use svcmap_types::{Protocol, ProtocolAttributes};

use crate::engine::{read_line, ProbeEngine, ProbeError, ProbeStream};

/// FTP: the first line of the 220 welcome is the banner; receiving any
/// line is success.
pub struct FtpProbe;

#[async_trait]
impl ProbeEngine for FtpProbe {
    fn protocol(&self) -> Protocol {
        Protocol::Ftp
    }

    async fn script(
        &self,
        stream: &mut ProbeStream,
        _host_label: &str,
        attrs: &mut ProtocolAttributes,
    ) -> Result<(), ProbeError> {
        let banner = read_line(stream).await?.ok_or_else(|| {
            ProbeError::Protocol("connection closed before banner (EOF)".to_string())
        })?;
        attrs.banner = banner;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::run_probe;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn banner_line_is_recorded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream
                .write_all(b"220 ProFTPD 1.3.8 Server ready.\r\n")
                .await
                .unwrap();
        });

        let result = run_probe(
            &FtpProbe,
            "ftp.example.com",
            Ipv4Addr::LOCALHOST,
            port,
            Duration::from_secs(2),
        )
        .await;
        assert!(result.accessible, "error: {}", result.error);
        assert_eq!(result.attributes.banner, "220 ProFTPD 1.3.8 Server ready.");
        assert!(result.attributes.details.is_none());
    }

    #[tokio::test]
    async fn silent_close_is_inaccessible() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let result = run_probe(
            &FtpProbe,
            "ftp.example.com",
            Ipv4Addr::LOCALHOST,
            port,
            Duration::from_secs(2),
        )
        .await;
        assert!(!result.accessible);
        assert!(result.error.contains("EOF"), "error: {}", result.error);
    }

    #[tokio::test]
    async fn empty_line_still_counts_as_answer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"\r\n").await.unwrap();
        });

        let result = run_probe(
            &FtpProbe,
            "ftp.example.com",
            Ipv4Addr::LOCALHOST,
            port,
            Duration::from_secs(2),
        )
        .await;
        assert!(result.accessible);
        assert_eq!(result.attributes.banner, "");
    }
}
