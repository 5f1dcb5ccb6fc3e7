use async_trait::async_trait;

use svcmap_types::{Protocol, ProtocolAttributes};

use crate::engine::{read_line, ProbeEngine, ProbeError, ProbeStream};

/// SSH: the version identification line the server sends immediately
/// after connect is the banner.
pub struct SshProbe;

#[async_trait]
impl ProbeEngine for SshProbe {
    fn protocol(&self) -> Protocol {
        Protocol::Ssh
    }

    async fn script(
        &self,
        stream: &mut ProbeStream,
        _host_label: &str,
        attrs: &mut ProtocolAttributes,
    ) -> Result<(), ProbeError> {
        let banner = read_line(stream).await?.ok_or_else(|| {
            ProbeError::Protocol("connection closed before version line (EOF)".to_string())
        })?;
        attrs.banner = banner;
        Ok(())
    }
}
