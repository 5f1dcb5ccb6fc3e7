use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use svcmap_types::{Protocol, ProtocolAttributes, ProtocolDetails, SmtpAttributes};

use crate::engine::{read_line, ProbeEngine, ProbeError, ProbeStream};

const EHLO_COMMAND: &[u8] = b"EHLO scanner\r\n";

/// SMTP: read the 220 greeting, send EHLO, collect capabilities until
/// the terminal `250 ` line.
pub struct SmtpProbe;

#[async_trait]
impl ProbeEngine for SmtpProbe {
    fn protocol(&self) -> Protocol {
        Protocol::Smtp
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
        if !greeting.starts_with("220") {
            return Err(ProbeError::Protocol(format!(
                "invalid SMTP greeting: {greeting}"
            )));
        }
        attrs.banner = greeting;

        stream.get_mut().write_all(EHLO_COMMAND).await?;

        let mut smtp = SmtpAttributes::default();
        loop {
            let line = read_line(stream).await?.ok_or_else(|| {
                ProbeError::Protocol("connection closed during EHLO response (EOF)".to_string())
            })?;
            parse_ehlo_line(&line, &mut smtp);
            // `250-` lines are continuations; `250 ` is the terminal line.
            if line.starts_with("250 ") {
                break;
            }
        }
        attrs.details = Some(ProtocolDetails::Smtp(smtp));
        Ok(())
    }
}

fn parse_ehlo_line(line: &str, smtp: &mut SmtpAttributes) {
    let capability = match line
        .strip_prefix("250-")
        .or_else(|| line.strip_prefix("250 "))
    {
        Some(rest) => rest,
        None => return,
    };

    match capability {
        "PIPELINING" => smtp.pipelining = true,
        "STARTTLS" => smtp.starttls = true,
        "8BITMIME" => smtp.eight_bit_mime = true,
        "DSN" => smtp.dsn = true,
        "SMTPUTF8" => smtp.utf8 = true,
        other if other.starts_with("SIZE") => {
            if let Some((_, value)) = other.split_once(' ') {
                if let Ok(limit) = value.trim().parse::<u64>() {
                    smtp.size_supported = true;
                    smtp.size_limit = limit;
                }
            }
        }
        other if other.starts_with("AUTH") => {
            if let Some((_, methods)) = other.split_once(' ') {
                smtp.auth_methods = methods.to_string();
            }
        }
        _ => {}
    }
}
