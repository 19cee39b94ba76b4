//! Text wire format shared by every peer on the group.
//!
//! An announcement is three newline-separated lines in fixed order:
//!
//! ```text
//! _services._dns-sd._udp.local PTR Greeter._tcp.local
//! Greeter._tcp.local SRV 0 0 9001 nas.local.
//! Greeter._tcp.local TXT tags=server,blue
//! ```
//!
//! A discovery query carries the pointer and text lines only. The names
//! borrow DNS-SD conventions but the payload is not DNS-SD compatible.

use shared::protocol::{
    HOST_SUFFIX, META_SERVICE_NAME, RECORD_LOCATION, RECORD_POINTER, RECORD_TEXT,
    SERVICE_SUFFIX, TAGS_MARKER,
};
use shared::types::ServiceRecord;
use crate::error::{DecodeError, DiscoveryError, Result};

/// Name and tags carried by any message, including discovery queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryQuery {
    pub name: String,
    pub tags: Vec<String>,
}

/// Encodes messages on behalf of one local host.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    hostname: String,
}

impl MessageCodec {
    pub fn new(hostname: impl Into<String>) -> Result<Self> {
        let hostname = hostname.into();
        if hostname.is_empty() || hostname.contains(char::is_whitespace) {
            return Err(DiscoveryError::InvalidArgument(format!(
                "invalid hostname {:?}",
                hostname
            )));
        }
        Ok(Self { hostname })
    }

    /// Codec for the system hostname
    pub fn from_system() -> Result<Self> {
        let hostname = hostname::get()?.to_string_lossy().to_string();
        Self::new(hostname)
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Host string peers will decode from our announcements
    pub fn advertised_host(&self) -> String {
        format!("{}{}", self.hostname, HOST_SUFFIX)
    }

    pub fn encode_announcement(&self, name: &str, port: u16, tags: &[String]) -> Vec<u8> {
        let asserted = asserted_name(name);
        format!(
            "{}\n{} {} 0 0 {} {}.\n{}",
            pointer_line(&asserted),
            asserted,
            RECORD_LOCATION,
            port,
            self.advertised_host(),
            text_line(&asserted, tags),
        )
        .into_bytes()
    }

    pub fn encode_discovery_query(&self, name: &str, tags: &[String]) -> Vec<u8> {
        let asserted = asserted_name(name);
        format!("{}\n{}", pointer_line(&asserted), text_line(&asserted, tags)).into_bytes()
    }
}

/// Rejects names and tags that could not survive an encode/decode pass.
pub fn validate(name: &str, tags: &[String]) -> Result<()> {
    if name.is_empty() {
        return Err(DiscoveryError::InvalidArgument("service name is empty".to_string()));
    }
    if name.contains(char::is_whitespace) || name.contains("._") {
        return Err(DiscoveryError::InvalidArgument(format!(
            "service name {:?} may not contain whitespace or '._'",
            name
        )));
    }
    for tag in tags {
        if tag.is_empty() || tag.contains(',') || tag.contains(|c| c == '\n' || c == '\r') {
            return Err(DiscoveryError::InvalidArgument(format!(
                "tag {:?} must be non-empty and free of commas and line breaks",
                tag
            )));
        }
    }
    Ok(())
}

/// Decodes an announcement. Lenient: an unparsable port becomes 0 and a
/// missing tag marker yields no tags, but each of the three lines must exist.
pub fn decode(buf: &[u8]) -> std::result::Result<ServiceRecord, DecodeError> {
    let text = std::str::from_utf8(buf).map_err(|_| DecodeError::NotUtf8)?;
    let lines = Lines::scan(text);

    let pointer = lines.pointer.ok_or(DecodeError::MissingPointer)?;
    let location = lines.location.ok_or(DecodeError::MissingLocation)?;
    let txt = lines.text.ok_or(DecodeError::MissingText)?;

    let name = service_name(pointer)?;
    let (host, port) = parse_location(location);
    let tags = parse_tags(txt);

    Ok(ServiceRecord { name, host, port, tags })
}

/// Extracts name and tags from any message carrying pointer and text lines.
pub fn decode_query(buf: &[u8]) -> std::result::Result<DiscoveryQuery, DecodeError> {
    let text = std::str::from_utf8(buf).map_err(|_| DecodeError::NotUtf8)?;
    let lines = Lines::scan(text);

    let pointer = lines.pointer.ok_or(DecodeError::MissingPointer)?;
    let txt = lines.text.ok_or(DecodeError::MissingText)?;

    Ok(DiscoveryQuery {
        name: service_name(pointer)?,
        tags: parse_tags(txt),
    })
}

fn asserted_name(name: &str) -> String {
    format!("{}{}", name, SERVICE_SUFFIX)
}

fn pointer_line(asserted: &str) -> String {
    format!("{} {} {}", META_SERVICE_NAME, RECORD_POINTER, asserted)
}

fn text_line(asserted: &str, tags: &[String]) -> String {
    format!("{} {} {}{}", asserted, RECORD_TEXT, TAGS_MARKER, tags.join(","))
}

/// First line of each record kind, keyed on the second token
#[derive(Default)]
struct Lines<'a> {
    pointer: Option<&'a str>,
    location: Option<&'a str>,
    text: Option<&'a str>,
}

impl<'a> Lines<'a> {
    fn scan(text: &'a str) -> Self {
        let mut lines = Self::default();
        for line in text.lines() {
            let slot = match line.split_whitespace().nth(1) {
                Some(RECORD_POINTER) => &mut lines.pointer,
                Some(RECORD_LOCATION) => &mut lines.location,
                Some(RECORD_TEXT) => &mut lines.text,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(line);
            }
        }
        lines
    }
}

fn service_name(pointer: &str) -> std::result::Result<String, DecodeError> {
    let target = pointer
        .split_whitespace()
        .nth(2)
        .ok_or(DecodeError::EmptyName)?;
    let name = target.split("._").next().unwrap_or_default();
    if name.is_empty() {
        return Err(DecodeError::EmptyName);
    }
    Ok(name.to_string())
}

fn parse_location(line: &str) -> (String, u16) {
    let fields: Vec<&str> = line.split_whitespace().skip(2).collect();
    let host = fields
        .last()
        .map(|h| h.strip_suffix('.').unwrap_or(h).to_string())
        .unwrap_or_default();
    let port = fields
        .len()
        .checked_sub(2)
        .and_then(|i| fields[i].parse::<u16>().ok())
        .unwrap_or(0);
    (host, port)
}

/// The tag list sits after the asserted name and record kind, so the marker
/// is only searched for past those two tokens.
fn parse_tags(line: &str) -> Vec<String> {
    let properties = skip_tokens(line, 2);
    match properties.find(TAGS_MARKER) {
        Some(idx) => properties[idx + TAGS_MARKER.len()..]
            .split(',')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

fn skip_tokens(line: &str, count: usize) -> &str {
    let mut rest = line;
    for _ in 0..count {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        rest = &rest[end..];
    }
    rest
}
