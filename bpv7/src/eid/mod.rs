/*!
Endpoint identifiers.

An [`Eid`] names the source, destination or report-to endpoint of a bundle.
Every value has one canonical text form, produced by [`Display`](core::fmt::Display),
and parsing that text yields the same value again.  Because the rendering is
injective, structural equality of two `Eid`s is the same as equality of
their canonical strings.

The `dtn` scheme carries two special authorities: `api:me`, naming sinks
inside this process, and the bracketed `[scheme:specific]` form, which embeds
a convergence-layer address.
*/
use super::*;
use percent_encoding::{AsciiSet, CONTROLS, NON_ALPHANUMERIC, percent_encode};

mod cbor;
mod error;
mod parse;

pub use error::Error;
pub(crate) use cbor::{EidRegisters, eid_parser};
pub(crate) use parse::{DtnSsp, parse_dtn_ssp, parse_ipn_ssp, split_scheme};

#[cfg(test)]
mod str_tests;


// Encode set matching RFC 3986 unreserved characters (keeps alphanumerics, -, _, ., ~)
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

// Everything a demux or path may not carry as a literal
const DEMUX_ENCODE_SET: &AsciiSet = &CONTROLS.add(b' ').add(b'%');

const CLA_ENCODE_SET: &AsciiSet = &DEMUX_ENCODE_SET.add(b']');

/// The IANA "URI scheme code" of the `dtn` scheme
pub const DTN_IANA: u64 = 1;
/// The IANA "URI scheme code" of the `ipn` scheme
pub const IPN_IANA: u64 = 2;

/// The authority used by [`Eid::Api`] endpoints
pub const API_AUTHORITY: &str = "api:me";

/// Maximum length of a text scheme-specific part on the wire
pub const MAX_SSP_LEN: u64 = 1024;

#[derive(Default, Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(into = "String", try_from = "String")
)]
pub enum Eid {
    /// `dtn:none`
    #[default]
    Null,
    Dtn {
        node_name: Box<str>,
        demux: Box<str>,
    },
    Ipn {
        node: u64,
        service: u64,
    },
    /// `dtn://api:me/<path>`
    Api {
        path: Box<str>,
    },
    /// `dtn://[<scheme>:<specific>]/<demux>`
    Cla {
        scheme: Box<str>,
        specific: Box<str>,
        demux: Box<str>,
    },
    /// A scheme added to the extension registry
    Ext {
        iana: u64,
        scheme: Box<str>,
        ssp: Box<str>,
    },
}

/// Is `child` equal to, or below, `parent` in a `/` separated path
fn path_covers(parent: &str, child: &str) -> bool {
    match child.strip_prefix(parent) {
        None => false,
        Some(rest) => {
            parent.is_empty() || rest.is_empty() || parent.ends_with('/') || rest.starts_with('/')
        }
    }
}

impl Eid {
    /// Fails if `node_name` is empty
    pub fn dtn(node_name: &str, demux: &str) -> Result<Self, Error> {
        if node_name.is_empty() {
            return Err(Error::malformed("dtn", "empty node name"));
        }
        Ok(Self::Dtn {
            node_name: node_name.into(),
            demux: demux.into(),
        })
    }

    /// `ipn:0.0` is the null endpoint
    pub fn ipn(node: u64, service: u64) -> Self {
        if node == 0 && service == 0 {
            Self::Null
        } else {
            Self::Ipn { node, service }
        }
    }

    pub fn api(path: &str) -> Self {
        Self::Api { path: path.into() }
    }

    /// Fails unless `scheme` is a URI scheme name and `specific` is not
    /// empty
    pub fn cla(scheme: &str, specific: &str, demux: &str) -> Result<Self, Error> {
        if !parse::is_scheme_name(scheme) {
            return Err(Error::malformed("dtn", format!("invalid CLA scheme '{scheme}'")));
        }
        if specific.is_empty() {
            return Err(Error::malformed("dtn", "empty CLA address"));
        }
        Ok(Self::Cla {
            scheme: scheme.into(),
            specific: specific.into(),
            demux: demux.into(),
        })
    }

    /// Returns `true` the Eid is the 'null endpoint' as defined in RFC 9171.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Eid::Null)
    }

    /// A demux or path beginning with `~` names a group rather than a
    /// single endpoint
    pub fn is_singleton(&self) -> bool {
        match self {
            Eid::Dtn { demux, .. } | Eid::Cla { demux, .. } => !demux.starts_with('~'),
            Eid::Api { path } => !path.starts_with('~'),
            _ => true,
        }
    }

    /// The IANA scheme code used on the wire
    pub fn iana(&self) -> u64 {
        match self {
            Eid::Null | Eid::Dtn { .. } | Eid::Api { .. } | Eid::Cla { .. } => DTN_IANA,
            Eid::Ipn { .. } => IPN_IANA,
            Eid::Ext { iana, .. } => *iana,
        }
    }

    /// The same endpoint with its demux or service removed, i.e. the
    /// administrative endpoint of the node
    pub fn node_id(&self) -> Self {
        match self {
            Eid::Dtn { node_name, .. } => Eid::Dtn {
                node_name: node_name.clone(),
                demux: "".into(),
            },
            Eid::Ipn { node, .. } => Eid::Ipn {
                node: *node,
                service: 0,
            },
            Eid::Api { .. } => Eid::api(""),
            Eid::Cla {
                scheme, specific, ..
            } => Eid::Cla {
                scheme: scheme.clone(),
                specific: specific.clone(),
                demux: "".into(),
            },
            eid => eid.clone(),
        }
    }

    /// `true` if `other` is this endpoint or lies beneath it: the same node,
    /// with a demux that extends this one's.  The null endpoint has no
    /// authority over anything.
    pub fn is_authoritative_over(&self, other: &Eid) -> bool {
        match (self, other) {
            (
                Eid::Dtn {
                    node_name: n1,
                    demux: d1,
                },
                Eid::Dtn {
                    node_name: n2,
                    demux: d2,
                },
            ) => n1 == n2 && path_covers(d1, d2),
            (
                Eid::Ipn {
                    node: n1,
                    service: s1,
                },
                Eid::Ipn {
                    node: n2,
                    service: s2,
                },
            ) => n1 == n2 && (*s1 == 0 || s1 == s2),
            (Eid::Api { path: p1 }, Eid::Api { path: p2 }) => path_covers(p1, p2),
            (
                Eid::Cla {
                    scheme: s1,
                    specific: a1,
                    demux: d1,
                },
                Eid::Cla {
                    scheme: s2,
                    specific: a2,
                    demux: d2,
                },
            ) => s1 == s2 && a1 == a2 && path_covers(d1, d2),
            (Eid::Ext { .. }, Eid::Ext { .. }) => self == other,
            _ => false,
        }
    }

    /// The scheme-specific part, as written after `<scheme>:`
    pub(crate) fn ssp(&self) -> String {
        match self {
            Eid::Null => "none".into(),
            Eid::Dtn { node_name, demux } => format!(
                "//{}/{}",
                percent_encode(node_name.as_bytes(), URI_ENCODE_SET),
                percent_encode(demux.as_bytes(), DEMUX_ENCODE_SET)
            ),
            Eid::Ipn { node, service } => format!("{node}.{service}"),
            Eid::Api { path } => format!(
                "//{API_AUTHORITY}/{}",
                percent_encode(path.as_bytes(), DEMUX_ENCODE_SET)
            ),
            Eid::Cla {
                scheme,
                specific,
                demux,
            } => format!(
                "//[{scheme}:{}]/{}",
                percent_encode(specific.as_bytes(), CLA_ENCODE_SET),
                percent_encode(demux.as_bytes(), DEMUX_ENCODE_SET)
            ),
            Eid::Ext { ssp, .. } => ssp.to_string(),
        }
    }

    fn scheme(&self) -> &str {
        match self {
            Eid::Ipn { .. } => "ipn",
            Eid::Ext { scheme, .. } => scheme,
            _ => "dtn",
        }
    }
}

impl core::fmt::Display for Eid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.scheme(), self.ssp())
    }
}

impl From<Eid> for String {
    fn from(value: Eid) -> Self {
        value.to_string()
    }
}

impl core::str::FromStr for Eid {
    type Err = Error;

    /// Parses the built-in schemes only, use
    /// [`ExtensionRegistry::parse_eid`](crate::registry::ExtensionRegistry::parse_eid)
    /// to include registered extensions
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        registry::ExtensionRegistry::new().parse_eid(s)
    }
}

impl TryFrom<&str> for Eid {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for Eid {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
