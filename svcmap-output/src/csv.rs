use std::fmt::Write;

use svcmap_types::{ProtocolAttributes, ScanReport};

use crate::traits::{included_rows, OutputError, ReportFormatter};

const HEADER: &str = "domain,ip,protocol,host,port,accessible,error,vendor,banner,response_time_ms,details";

pub struct CsvFormatter {
    only_success: bool,
}

impl CsvFormatter {
    pub fn new(only_success: bool) -> Self {
        Self { only_success }
    }
}

impl ReportFormatter for CsvFormatter {
    fn header(&self) -> Option<String> {
        Some(format!("{HEADER}\n"))
    }

    fn format(&mut self, report: &ScanReport) -> Result<String, OutputError> {
        let mut out = String::new();
        for pr in included_rows(report, self.only_success) {
            writeln!(
                out,
                "{},{},{},{},{},{},{},{},{},{},{}",
                csv_escape(&report.domain),
                csv_escape(&report.ip),
                csv_escape(pr.protocol.name()),
                csv_escape(&pr.host),
                pr.port,
                if pr.accessible { 1 } else { 0 },
                csv_escape(&pr.error),
                csv_escape(&pr.attributes.vendor),
                csv_escape(&pr.attributes.banner),
                pr.attributes.response_time_ms,
                csv_escape(&format_details(&pr.attributes)),
            )
            .map_err(|e| OutputError::FormatError(e.to_string()))?;
        }
        Ok(out)
    }
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn flag(v: bool) -> &'static str {
    if v {
        "1"
    } else {
        "0"
    }
}

/// Compact `key=value;` rendering of the attribute payload for the
/// trailing CSV column.
pub(crate) fn format_details(attrs: &ProtocolAttributes) -> String {
    let mut out = String::new();
    if !attrs.banner.is_empty() {
        out.push_str(&format!("banner={};", attrs.banner));
    }
    if !attrs.vendor.is_empty() {
        out.push_str(&format!("vendor={};", attrs.vendor));
    }
    if let Some(smtp) = attrs.smtp() {
        if !smtp.auth_methods.is_empty() || smtp.pipelining || smtp.starttls {
            out.push_str(&format!(
                "smtp{{pipelining={},starttls={},size_supported={},size_limit={},utf8={},8bitmime={},dsn={},auth={}}};",
                flag(smtp.pipelining),
                flag(smtp.starttls),
                flag(smtp.size_supported),
                smtp.size_limit,
                flag(smtp.utf8),
                flag(smtp.eight_bit_mime),
                flag(smtp.dsn),
                smtp.auth_methods,
            ));
        }
    }
    if let Some(pop3) = attrs.pop3() {
        if !pop3.capabilities.is_empty() {
            out.push_str(&format!("pop3{{{}}};", pop3.capabilities));
        }
    }
    if let Some(imap) = attrs.imap() {
        if !imap.capabilities.is_empty() {
            out.push_str(&format!("imap{{{}}};", imap.capabilities));
        }
    }
    if let Some(http) = attrs.http() {
        if !http.server.is_empty() || !http.content_type.is_empty() || http.status_code != 0 {
            out.push_str(&format!(
                "http{{server={},type={},code={}}};",
                http.server, http.content_type, http.status_code
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use svcmap_types::{
        HttpAttributes, Protocol, ProtocolDetails, ProtocolResult, SmtpAttributes,
    };

    fn report() -> ScanReport {
        ScanReport {
            domain: "example.com".into(),
            ip: "198.51.100.4".into(),
            total_time_ms: 90,
            protocols: vec![
                ProtocolResult {
                    protocol: Protocol::Smtp,
                    host: "example.com".into(),
                    port: 25,
                    accessible: true,
                    error: String::new(),
                    attributes: ProtocolAttributes {
                        banner: "220 hello, \"world\"".into(),
                        vendor: "Postfix".into(),
                        response_time_ms: 12,
                        details: Some(ProtocolDetails::Smtp(SmtpAttributes {
                            starttls: true,
                            ..Default::default()
                        })),
                    },
                },
                ProtocolResult {
                    protocol: Protocol::Http,
                    host: "example.com".into(),
                    port: 80,
                    accessible: false,
                    error: "connect failed: timed out".into(),
                    attributes: ProtocolAttributes::default(),
                },
            ],
        }
    }

    #[test]
    fn header_and_rows() {
        let mut formatter = CsvFormatter::new(false);
        assert_eq!(formatter.header().unwrap().trim_end(), HEADER);
        let out = formatter.format(&report()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("example.com,198.51.100.4,SMTP,"));
        assert!(lines[1].contains(",HTTP,"));
        assert!(lines[1].contains(",0,"));
    }

    #[test]
    fn quoting_doubles_embedded_quotes() {
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("plain"), "plain");
    }

    #[test]
    fn banner_with_comma_is_quoted_in_row() {
        let mut formatter = CsvFormatter::new(false);
        let out = formatter.format(&report()).unwrap();
        assert!(out.contains("\"220 hello, \"\"world\"\"\""));
    }

    #[test]
    fn only_success_drops_failed_rows() {
        let mut formatter = CsvFormatter::new(true);
        let out = formatter.format(&report()).unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.contains(",SMTP,"));
    }

    #[test]
    fn details_column_renders_http_block() {
        let attrs = ProtocolAttributes {
            banner: "HTTP/1.1 200 OK".into(),
            vendor: String::new(),
            response_time_ms: 5,
            details: Some(ProtocolDetails::Http(HttpAttributes {
                server: "nginx/1.24.0".into(),
                content_type: "text/html".into(),
                status_code: 200,
            })),
        };
        let details = format_details(&attrs);
        assert!(details.contains("http{server=nginx/1.24.0,type=text/html,code=200};"));
        assert!(details.starts_with("banner=HTTP/1.1 200 OK;"));
    }
}
