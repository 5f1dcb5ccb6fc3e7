use async_trait::async_trait;

use svcmap_types::{Protocol, ProtocolAttributes};

use crate::engine::{read_line, ProbeEngine, ProbeError, ProbeStream};

/// Telnet: same connect-and-read-one-line template as FTP/SSH. Option
/// negotiation bytes survive as lossily-decoded text in the banner.
pub struct TelnetProbe;

#[async_trait]
impl ProbeEngine for TelnetProbe {
    fn protocol(&self) -> Protocol {
        Protocol::Telnet
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
