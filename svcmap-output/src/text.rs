use std::fmt::Write;

use svcmap_types::ScanReport;

use crate::traits::{included_rows, OutputError, ReportFormatter};

/// Human-readable block per target; also serves the `report` format.
pub struct TextFormatter {
    only_success: bool,
}

impl TextFormatter {
    pub fn new(only_success: bool) -> Self {
        Self { only_success }
    }
}

fn flag(v: bool) -> &'static str {
    if v {
        "1"
    } else {
        "0"
    }
}

impl ReportFormatter for TextFormatter {
    fn format(&mut self, report: &ScanReport) -> Result<String, OutputError> {
        let rows: Vec<_> = included_rows(report, self.only_success).collect();
        if rows.is_empty() {
            return Ok(String::new());
        }

        let mut out = String::new();
        writeln!(out, "{} ({})", report.domain, report.ip)
            .map_err(|e| OutputError::FormatError(e.to_string()))?;

        for pr in rows {
            write!(
                out,
                "  [{}] {}:{} -> {}",
                pr.protocol,
                pr.host,
                pr.port,
                if pr.accessible { "OK" } else { "FAIL" }
            )
            .map_err(|e| OutputError::FormatError(e.to_string()))?;
            if !pr.error.is_empty() {
                write!(out, " ({})", pr.error).map_err(|e| OutputError::FormatError(e.to_string()))?;
            }
            out.push('\n');

            if pr.accessible {
                if !pr.attributes.banner.is_empty() {
                    writeln!(out, "    banner: {}", pr.attributes.banner)
                        .map_err(|e| OutputError::FormatError(e.to_string()))?;
                }
                if !pr.attributes.vendor.is_empty() {
                    writeln!(out, "    vendor: {}", pr.attributes.vendor)
                        .map_err(|e| OutputError::FormatError(e.to_string()))?;
                }
                if let Some(smtp) = pr.attributes.smtp() {
                    let size = if smtp.size_supported {
                        smtp.size_limit.to_string()
                    } else {
                        "unsupported".to_string()
                    };
                    let auth = if smtp.auth_methods.is_empty() {
                        "-"
                    } else {
                        smtp.auth_methods.as_str()
                    };
                    writeln!(
                        out,
                        "    features: PIPELINING={}, STARTTLS={}, 8BITMIME={}, DSN={}, SMTPUTF8={}, SIZE={}, AUTH={}",
                        flag(smtp.pipelining),
                        flag(smtp.starttls),
                        flag(smtp.eight_bit_mime),
                        flag(smtp.dsn),
                        flag(smtp.utf8),
                        size,
                        auth,
                    )
                    .map_err(|e| OutputError::FormatError(e.to_string()))?;
                }
            }
        }
        out.push('\n');
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svcmap_types::{
        Protocol, ProtocolAttributes, ProtocolDetails, ProtocolResult, SmtpAttributes,
    };

    fn smtp_report() -> ScanReport {
        ScanReport {
            domain: "mx.example.com".into(),
            ip: "203.0.113.10".into(),
            total_time_ms: 120,
            protocols: vec![
                ProtocolResult {
                    protocol: Protocol::Smtp,
                    host: "mx.example.com".into(),
                    port: 25,
                    accessible: true,
                    error: String::new(),
                    attributes: ProtocolAttributes {
                        banner: "220 mx.example.com ESMTP".into(),
                        vendor: String::new(),
                        response_time_ms: 30,
                        details: Some(ProtocolDetails::Smtp(SmtpAttributes {
                            pipelining: true,
                            starttls: true,
                            size_supported: true,
                            size_limit: 1024,
                            auth_methods: "PLAIN".into(),
                            ..Default::default()
                        })),
                    },
                },
                ProtocolResult {
                    protocol: Protocol::Smtp,
                    host: "mx.example.com".into(),
                    port: 465,
                    accessible: false,
                    error: "connect failed: connection refused".into(),
                    attributes: ProtocolAttributes::default(),
                },
            ],
        }
    }

    #[test]
    fn block_layout_matches_expectations() {
        let mut formatter = TextFormatter::new(false);
        let out = formatter.format(&smtp_report()).unwrap();
        assert!(out.starts_with("mx.example.com (203.0.113.10)\n"));
        assert!(out.contains("  [SMTP] mx.example.com:25 -> OK\n"));
        assert!(out.contains("    banner: 220 mx.example.com ESMTP\n"));
        assert!(out.contains("SIZE=1024, AUTH=PLAIN"));
        assert!(out.contains("  [SMTP] mx.example.com:465 -> FAIL (connect failed: connection refused)\n"));
    }

    #[test]
    fn only_success_drops_failures() {
        let mut formatter = TextFormatter::new(true);
        let out = formatter.format(&smtp_report()).unwrap();
        assert!(out.contains(":25 -> OK"));
        assert!(!out.contains("FAIL"));
    }

    #[test]
    fn fully_filtered_report_produces_nothing() {
        let mut report = smtp_report();
        report.protocols.retain(|pr| !pr.accessible);
        let mut formatter = TextFormatter::new(true);
        assert!(formatter.format(&report).unwrap().is_empty());
    }
}
