use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use svcmap_types::{HttpAttributes, Protocol, ProtocolAttributes, ProtocolDetails};

use crate::engine::{read_response_head, ProbeEngine, ProbeError, ProbeStream};

/// Server values that only identify a fronting load balancer; they
/// trigger the body sniff like an error status does.
const GENERIC_SERVER_MARKERS: [&str; 2] = ["Lego", "NWS"];

const BODY_SIGNATURES: [&str; 4] = ["nginx/", "apache/", "iis/", "litespeed"];

/// HTTP: minimal HEAD request, parse the status line and headers, and
/// sniff the buffered body for origin-server signatures when the edge
/// answer looks generic.
pub struct HttpProbe;

#[async_trait]
impl ProbeEngine for HttpProbe {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    async fn script(
        &self,
        stream: &mut ProbeStream,
        host_label: &str,
        attrs: &mut ProtocolAttributes,
    ) -> Result<(), ProbeError> {
        let request = format!(
            "HEAD / HTTP/1.1\r\nHost: {host_label}\r\nUser-Agent: curl/8.7.1\r\nAccept: */*\r\n\r\n"
        );
        stream.get_mut().write_all(request.as_bytes()).await?;

        let raw = read_response_head(stream).await?;
        let response = String::from_utf8_lossy(&raw).into_owned();

        let mut http = HttpAttributes::default();
        let status_line = parse_head(&response, &mut http);

        let mut banner = status_line;
        if !http.server.is_empty() {
            banner.push_str(&format!(" [{}]", http.server));
        }

        let generic = http.server.is_empty()
            || GENERIC_SERVER_MARKERS.iter().any(|m| http.server.contains(m));
        if http.status_code >= 400 || generic {
            if let Some(found) = sniff_body(&response) {
                banner.push_str(&format!(" (Detected: {found})"));
            }
        }

        attrs.banner = banner;
        attrs.details = Some(ProtocolDetails::Http(http));
        Ok(())
    }
}

/// Walk the header block (up to the first blank line), filling status
/// code, Server and Content-Type. Returns the status line.
fn parse_head(response: &str, http: &mut HttpAttributes) -> String {
    let mut status_line = String::new();
    for line in response.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            break;
        }

        if status_line.is_empty() && starts_with_ignore_case(line, "HTTP/") {
            status_line = line.to_string();
            if let Some((_, rest)) = line.split_once(' ') {
                if let Ok(code) = rest.chars().take(3).collect::<String>().parse::<u16>() {
                    http.status_code = code;
                }
            }
        } else if starts_with_ignore_case(line, "Server: ") {
            http.server = line[8..].to_string();
        } else if starts_with_ignore_case(line, "Content-Type: ") {
            http.content_type = line[14..].to_string();
        }
    }
    status_line
}

/// Case-insensitive search for an origin-server signature anywhere in
/// the response; the match is returned in its original casing, cut at
/// the first space, CR, LF, `<` or `"`.
fn sniff_body(response: &str) -> Option<String> {
    let lower = response.to_ascii_lowercase();
    for signature in BODY_SIGNATURES {
        if let Some(pos) = lower.find(signature) {
            let tail = &response[pos..];
            let end = tail
                .find([' ', '\r', '\n', '<', '"'])
                .unwrap_or(tail.len());
            return Some(tail[..end].to_string());
        }
    }
    None
}

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix)
}
