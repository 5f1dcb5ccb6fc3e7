use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use svcmap_types::{ImapAttributes, Protocol, ProtocolAttributes, ProtocolDetails};

use crate::engine::{read_line, ProbeEngine, ProbeError, ProbeStream};

const TAG: &str = "A001";

/// IMAP: read the untagged greeting, issue `A001 CAPABILITY`, collect
/// capability lines until the tagged completion arrives.
pub struct ImapProbe;

#[async_trait]
impl ProbeEngine for ImapProbe {
    fn protocol(&self) -> Protocol {
        Protocol::Imap
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
        if !(greeting.starts_with("* OK") || greeting.starts_with("* PREAUTH")) {
            return Err(ProbeError::Protocol(format!(
                "invalid IMAP greeting: {greeting}"
            )));
        }
        attrs.banner = greeting;

        stream
            .get_mut()
            .write_all(format!("{TAG} CAPABILITY\r\n").as_bytes())
            .await?;

        let mut imap = ImapAttributes::default();
        loop {
            let line = read_line(stream).await?.ok_or_else(|| {
                ProbeError::Protocol("connection closed during CAPABILITY (EOF)".to_string())
            })?;

            if line.contains(TAG) {
                if line.contains("OK") {
                    break;
                }
                return Err(ProbeError::Protocol(format!("CAPABILITY failed: {line}")));
            }
            parse_capability_line(&line, &mut imap);
        }
        attrs.details = Some(ProtocolDetails::Imap(imap));
        Ok(())
    }
}

fn parse_capability_line(line: &str, imap: &mut ImapAttributes) {
    let Some(rest) = line.strip_prefix("* CAPABILITY") else {
        return;
    };
    imap.capabilities = rest.trim().to_string();
    imap.imap4rev1 |= line.contains("IMAP4rev1");
    imap.starttls |= line.contains("STARTTLS");
    imap.quota |= line.contains("QUOTA");
    imap.acl |= line.contains("ACL");
    imap.auth_plain |= line.contains("AUTH=PLAIN");
    imap.auth_login |= line.contains("AUTH=LOGIN");
    imap.idle |= line.contains("IDLE");
    imap.unselect |= line.contains("UNSELECT");
    imap.uidplus |= line.contains("UIDPLUS");
}
