use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// How a target was supplied on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// The input line was a well-formed IPv4 address; DNS is skipped.
    Ip,
    /// Anything else; resolved before probing.
    Hostname,
}

/// A single scan unit: one input line, optionally resolved to an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// The literal (trimmed) input line.
    pub input: String,
    /// The supplied name, when the input was not an address.
    pub hostname: Option<String>,
    /// Resolved address. Set at construction for IP inputs, after DNS
    /// for hostnames, never for failed resolutions.
    pub ip: Option<Ipv4Addr>,
}

impl Target {
    /// Classify a trimmed input line as an address or a hostname.
    pub fn from_input(line: &str) -> Self {
        match line.parse::<Ipv4Addr>() {
            Ok(ip) => Self {
                input: line.to_string(),
                hostname: None,
                ip: Some(ip),
            },
            Err(_) => Self {
                input: line.to_string(),
                hostname: Some(line.to_string()),
                ip: None,
            },
        }
    }

    pub fn from_ip(ip: Ipv4Addr) -> Self {
        Self {
            input: ip.to_string(),
            hostname: None,
            ip: Some(ip),
        }
    }

    pub fn kind(&self) -> TargetKind {
        if self.hostname.is_none() {
            TargetKind::Ip
        } else {
            TargetKind::Hostname
        }
    }

    /// The label used in protocol rows and the HTTP Host header:
    /// the domain when one was supplied, otherwise the address text.
    pub fn host_label(&self) -> &str {
        self.hostname.as_deref().unwrap_or(&self.input)
    }

    pub fn ip_string(&self) -> String {
        self.ip.map(|ip| ip.to_string()).unwrap_or_default()
    }
}
