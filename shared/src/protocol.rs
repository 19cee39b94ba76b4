use std::net::Ipv4Addr;

/// Multicast group every peer joins
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// Multicast port every peer binds
pub const MULTICAST_PORT: u16 = 5353;

/// Multicast TTL for outgoing datagrams
pub const MULTICAST_TTL: u32 = 255;

/// Meta-name every announcement and query points from
pub const META_SERVICE_NAME: &str = "_services._dns-sd._udp.local";

/// Suffix appended to a service name to form its asserted name
pub const SERVICE_SUFFIX: &str = "._tcp.local";

/// Suffix appended to the local hostname in location lines
pub const HOST_SUFFIX: &str = ".local";

/// Record kinds, one per line of a message
pub const RECORD_POINTER: &str = "PTR";
pub const RECORD_LOCATION: &str = "SRV";
pub const RECORD_TEXT: &str = "TXT";

/// Marker preceding the comma-joined tag list in the text line
pub const TAGS_MARKER: &str = "tags=";

/// API path prefix
pub const API_PREFIX: &str = "/v1";
