mod engine;
mod ftp;
mod http;
mod imap;
mod pop3;
mod smtp;
mod ssh;
mod telnet;

use std::sync::Arc;

use svcmap_types::Protocol;

pub use engine::{run_probe, ProbeEngine, ProbeError, ProbeStream};
pub use ftp::FtpProbe;
pub use http::HttpProbe;
pub use imap::ImapProbe;
pub use pop3::Pop3Probe;
pub use smtp::SmtpProbe;
pub use ssh::SshProbe;
pub use telnet::TelnetProbe;

/// Instantiate one engine per enabled protocol, preserving order.
pub fn build_engines(enabled: &[Protocol]) -> Vec<Arc<dyn ProbeEngine>> {
    enabled
        .iter()
        .map(|proto| -> Arc<dyn ProbeEngine> {
            match proto {
                Protocol::Smtp => Arc::new(SmtpProbe),
                Protocol::Pop3 => Arc::new(Pop3Probe),
                Protocol::Imap => Arc::new(ImapProbe),
                Protocol::Http => Arc::new(HttpProbe),
                Protocol::Ftp => Arc::new(FtpProbe),
                Protocol::Telnet => Arc::new(TelnetProbe),
                Protocol::Ssh => Arc::new(SshProbe),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engines_follow_enabled_order() {
        let engines = build_engines(&[Protocol::Http, Protocol::Smtp]);
        assert_eq!(engines.len(), 2);
        assert_eq!(engines[0].protocol(), Protocol::Http);
        assert_eq!(engines[1].protocol(), Protocol::Smtp);
    }
}
