use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire protocols the prober understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Smtp,
    Pop3,
    Imap,
    Http,
    Ftp,
    Telnet,
    Ssh,
}

/// Declaration order is the round-robin order sessions drain their
/// per-protocol port queues in.
pub const ALL_PROTOCOLS: [Protocol; 7] = [
    Protocol::Smtp,
    Protocol::Pop3,
    Protocol::Imap,
    Protocol::Http,
    Protocol::Ftp,
    Protocol::Telnet,
    Protocol::Ssh,
];

impl Protocol {
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Smtp => "SMTP",
            Protocol::Pop3 => "POP3",
            Protocol::Imap => "IMAP",
            Protocol::Http => "HTTP",
            Protocol::Ftp => "FTP",
            Protocol::Telnet => "TELNET",
            Protocol::Ssh => "SSH",
        }
    }

    pub fn default_ports(&self) -> &'static [u16] {
        match self {
            Protocol::Smtp => &[25, 465, 587, 2525],
            Protocol::Pop3 => &[110, 995],
            Protocol::Imap => &[143, 993],
            Protocol::Http => &[80, 443, 8080, 8443],
            Protocol::Ftp => &[21, 990],
            Protocol::Telnet => &[23],
            Protocol::Ssh => &[22],
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("unknown protocol: {0}")]
pub struct UnknownProtocol(String);

impl FromStr for Protocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SMTP" => Ok(Protocol::Smtp),
            "POP3" => Ok(Protocol::Pop3),
            "IMAP" => Ok(Protocol::Imap),
            "HTTP" => Ok(Protocol::Http),
            "FTP" => Ok(Protocol::Ftp),
            "TELNET" => Ok(Protocol::Telnet),
            "SSH" => Ok(Protocol::Ssh),
            other => Err(UnknownProtocol(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpAttributes {
    pub pipelining: bool,
    pub starttls: bool,
    pub size_supported: bool,
    pub size_limit: u64,
    pub utf8: bool,
    pub eight_bit_mime: bool,
    pub dsn: bool,
    pub auth_methods: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pop3Attributes {
    pub stls: bool,
    pub sasl: bool,
    pub user: bool,
    pub top: bool,
    pub pipelining: bool,
    pub uidl: bool,
    pub capabilities: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImapAttributes {
    pub starttls: bool,
    pub quota: bool,
    pub acl: bool,
    pub imap4rev1: bool,
    pub auth_plain: bool,
    pub auth_login: bool,
    pub idle: bool,
    pub unselect: bool,
    pub uidplus: bool,
    pub capabilities: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpAttributes {
    pub server: String,
    pub content_type: String,
    pub status_code: u16,
}

/// Per-protocol attribute payload, keyed in JSON by protocol name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolDetails {
    Smtp(SmtpAttributes),
    Pop3(Pop3Attributes),
    Imap(ImapAttributes),
    Http(HttpAttributes),
}

/// Attributes common to every probe plus the protocol-specific payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolAttributes {
    pub banner: String,
    pub vendor: String,
    pub response_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ProtocolDetails>,
}

impl ProtocolAttributes {
    pub fn smtp(&self) -> Option<&SmtpAttributes> {
        match &self.details {
            Some(ProtocolDetails::Smtp(a)) => Some(a),
            _ => None,
        }
    }

    pub fn pop3(&self) -> Option<&Pop3Attributes> {
        match &self.details {
            Some(ProtocolDetails::Pop3(a)) => Some(a),
            _ => None,
        }
    }

    pub fn imap(&self) -> Option<&ImapAttributes> {
        match &self.details {
            Some(ProtocolDetails::Imap(a)) => Some(a),
            _ => None,
        }
    }

    pub fn http(&self) -> Option<&HttpAttributes> {
        match &self.details {
            Some(ProtocolDetails::Http(a)) => Some(a),
            _ => None,
        }
    }
}

/// Outcome of a single `(protocol, port)` probe against one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolResult {
    pub protocol: Protocol,
    /// The domain when one was supplied, else the address text.
    pub host: String,
    pub port: u16,
    pub accessible: bool,
    /// Empty on success; names the failing stage otherwise.
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub attributes: ProtocolAttributes,
}

impl ProtocolResult {
    pub fn new(protocol: Protocol, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
            accessible: false,
            error: String::new(),
            attributes: ProtocolAttributes::default(),
        }
    }
}

/// Everything learned about one target, emitted exactly once per
/// admitted target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub domain: String,
    pub ip: String,
    pub total_time_ms: u64,
    pub protocols: Vec<ProtocolResult>,
}

impl ScanReport {
    pub fn has_accessible(&self) -> bool {
        self.protocols.iter().any(|p| p.accessible)
    }
}
