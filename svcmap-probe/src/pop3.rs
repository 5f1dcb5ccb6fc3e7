use async_trait::async_trait;

use svcmap_types::{Pop3Attributes, Protocol, ProtocolAttributes, ProtocolDetails};

use crate::engine::{read_line, ProbeEngine, ProbeError, ProbeStream};

/// POP3: the greeting alone decides accessibility. CAPA is not issued;
/// capability flags are populated opportunistically from tokens the
/// greeting happens to carry.
pub struct Pop3Probe;

#[async_trait]
impl ProbeEngine for Pop3Probe {
    fn protocol(&self) -> Protocol {
        Protocol::Pop3
    }

    async fn script(
        &self,
        stream: &mut ProbeStream,
        _host_label: &str,
        attrs: &mut ProtocolAttributes,
    ) -> Result<(), ProbeError> {
        let greeting = read_line(stream).await?.ok_or_else(|| {
            ProbeError::Protocol("connection closed before greeting (EOF)".to_string())
        })?;

        if !(greeting.starts_with("+OK") || greeting.contains("OK")) {
            return Err(ProbeError::Protocol(format!(
                "invalid POP3 greeting: {greeting}"
            )));
        }

        let mut pop3 = Pop3Attributes::default();
        scan_tokens(&greeting, &mut pop3);
        attrs.banner = greeting;
        attrs.details = Some(ProtocolDetails::Pop3(pop3));
        Ok(())
    }
}

fn scan_tokens(line: &str, pop3: &mut Pop3Attributes) {
    pop3.user |= line.contains("USER");
    pop3.top |= line.contains("TOP");
    pop3.pipelining |= line.contains("PIPELINING");
    pop3.uidl |= line.contains("UIDL");
    pop3.stls |= line.contains("STLS");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::run_probe;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn pop3_server(greeting: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(greeting.as_bytes()).await.unwrap();
        });
        port
    }

    #[tokio::test]
    async fn ok_greeting_is_accessible() {
        let port = pop3_server("+OK Dovecot ready.\r\n").await;
        let result = run_probe(
            &Pop3Probe,
            "pop.example.com",
            Ipv4Addr::LOCALHOST,
            port,
            Duration::from_secs(2),
        )
        .await;
        assert!(result.accessible, "error: {}", result.error);
        assert_eq!(result.attributes.banner, "+OK Dovecot ready.");
    }

    #[tokio::test]
    async fn err_greeting_fails() {
        let port = pop3_server("-ERR service unavailable\r\n").await;
        let result = run_probe(
            &Pop3Probe,
            "pop.example.com",
            Ipv4Addr::LOCALHOST,
            port,
            Duration::from_secs(2),
        )
        .await;
        assert!(!result.accessible);
        assert!(result.error.contains("invalid POP3 greeting"));
    }

    #[test]
    fn greeting_tokens_populate_flags() {
        let mut pop3 = Pop3Attributes::default();
        scan_tokens("+OK POP3 ready <UIDL STLS>", &mut pop3);
        assert!(pop3.uidl);
        assert!(pop3.stls);
        assert!(!pop3.user);
        assert!(!pop3.pipelining);
    }
}
