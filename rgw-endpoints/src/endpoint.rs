use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use url::Url;

use crate::error::Error;

/// Shortest seed-file line that can possibly name an endpoint; anything
/// shorter is skipped as noise.
pub const MIN_ENDPOINT_LENGTH: usize = 3;

/// Immutable identity of a gateway endpoint, fixed at parse time.
///
/// The canonical `url` is the sole definition of endpoint identity: two
/// endpoints are the same endpoint exactly when their canonical URLs are
/// equal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// `http` or `https`, or whatever scheme the input carried explicitly.
    pub protocol: String,
    pub host: String,
    /// Decimal port, or empty when the input had none (or the default for the
    /// derived protocol, which the URL parser elides).
    pub port: String,
    /// `host:port`, or just `host` when the port is empty. Ring ordering key.
    pub host_and_port: String,
    /// `protocol://host_and_port`.
    pub url: String,
}

impl fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Parse a free-form endpoint string into its canonical descriptor.
///
/// Accepted shapes are `host`, `host:port`, `scheme://host:port` and
/// `//host:port`. A string without `//` is treated as authority-only. An
/// explicit scheme wins; otherwise port 443 implies `https` and everything
/// else is `http`. The mapping is idempotent: parsing a canonical URL yields
/// the descriptor that produced it.
pub fn parse_endpoint(input: &str) -> Result<EndpointDescriptor, Error> {
    let input = input.trim();
    let normalized = if input.contains("//") {
        input.to_owned()
    } else {
        format!("//{input}")
    };

    let base = Url::parse("http://placeholder.invalid").expect("static base URL is valid");
    let parsed = Url::options()
        .base_url(Some(&base))
        .parse(&normalized)
        .map_err(|err| Error::Parse(format!("{input:?}: {err}")))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| Error::Parse(format!("{input:?}: missing host")))?
        .to_owned();
    let mut port = parsed.port().map(|p| p.to_string()).unwrap_or_default();

    let protocol = if input.contains("://") {
        parsed.scheme().to_owned()
    } else if port == "443" {
        "https".to_owned()
    } else {
        "http".to_owned()
    };

    // The URL parser strips a port that is the default for an explicit
    // scheme; do the same for the derived one so repeated parses agree.
    if (protocol == "http" && port == "80") || (protocol == "https" && port == "443") {
        port.clear();
    }

    let host_and_port = if port.is_empty() {
        host.clone()
    } else {
        format!("{host}:{port}")
    };
    let url = format!("{protocol}://{host_and_port}");

    Ok(EndpointDescriptor {
        protocol,
        host,
        port,
        host_and_port,
        url,
    })
}

/// Membership state of an endpoint within a collection.
///
/// Written only while the owning collection's mutex is held.
#[derive(Debug)]
pub(crate) struct Membership {
    /// Generation stamp; anything below the collection's `valid_min_id` is
    /// stale and invisible to selection.
    pub id: u64,
    pub blacklisted: bool,
    /// Ring slot while linked, `None` once unlinked.
    pub slot: Option<usize>,
}

/// A shareable handle to a single gateway endpoint.
///
/// The handle is cheap to clone and is shared between the ring, the blacklist
/// map, and callers. A caller that holds on to a handle across a fleet
/// replacement or a demotion observes the change through the membership
/// state; selectors treat such handles as invalid and fall back to a fresh
/// pick.
#[derive(Clone, Debug)]
pub struct Endpoint {
    descriptor: Arc<EndpointDescriptor>,
    membership: Arc<RwLock<Membership>>,
}

impl Endpoint {
    /// Parse an endpoint string into a fresh, unlinked endpoint record.
    pub fn parse(input: &str) -> Result<Self, Error> {
        Ok(Self::from_descriptor(parse_endpoint(input)?))
    }

    pub(crate) fn from_descriptor(descriptor: EndpointDescriptor) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            membership: Arc::new(RwLock::new(Membership {
                id: 0,
                blacklisted: false,
                slot: None,
            })),
        }
    }

    pub fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    /// Canonical URL, e.g. `http://abc1.test:8080`.
    pub fn url(&self) -> &str {
        &self.descriptor.url
    }

    /// Ring ordering key, `host:port`.
    pub fn host_and_port(&self) -> &str {
        &self.descriptor.host_and_port
    }

    /// Generation stamp of the last fleet this endpoint was part of.
    pub fn id(&self) -> u64 {
        self.membership.read().id
    }

    pub fn is_blacklisted(&self) -> bool {
        self.membership.read().blacklisted
    }

    pub(crate) fn slot(&self) -> Option<usize> {
        self.membership.read().slot
    }

    pub(crate) fn set_id(&self, id: u64) {
        self.membership.write().id = id;
    }

    pub(crate) fn set_blacklisted(&self, blacklisted: bool) {
        self.membership.write().blacklisted = blacklisted;
    }

    pub(crate) fn set_slot(&self, slot: Option<usize>) {
        self.membership.write().slot = slot;
    }

    /// Stamp the endpoint into a new generation: fresh id, flag cleared.
    pub(crate) fn stamp(&self, id: u64) {
        let mut membership = self.membership.write();
        membership.id = id;
        membership.blacklisted = false;
    }

    /// Whether two handles refer to the same underlying record, as opposed to
    /// two records that merely share a canonical URL.
    pub(crate) fn same_record(&self, other: &Endpoint) -> bool {
        Arc::ptr_eq(&self.membership, &other.membership)
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.url == other.descriptor.url
    }
}

impl Eq for Endpoint {}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url())
    }
}
