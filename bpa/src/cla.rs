/*!
Convergence layer plumbing: peer addresses, the channels bundles are sent
over, and decoding the bundles arriving on an inbound byte stream.
*/

use super::*;
use futures::{Stream, StreamExt};
use hashbrown::HashMap;
use std::collections::VecDeque;
use std::sync::RwLock;
use terra_bpv7::codec::StreamDecoder;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("The channel is disconnected")]
    Disconnected,

    #[error("Bundle of {0} bytes is too big for the channel")]
    TooBig(u64),

    #[error("Stream ended part way through a bundle")]
    Truncated,

    #[error(transparent)]
    InvalidBundle(#[from] terra_bpv7::Error),

    #[error(transparent)]
    Internal(#[from] Box<dyn core::error::Error + Send + Sync>),
}

/// Where a peer can be reached
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClaAddress {
    Tcp(core::net::SocketAddr),
    Other { scheme: Box<str>, address: Box<str> },
}

impl ClaAddress {
    /// The address carried by a CLA endpoint id such as
    /// `dtn://[tcp:192.0.2.1:4556]/`
    pub fn from_eid(eid: &Eid) -> Option<Self> {
        match eid {
            Eid::Cla {
                scheme, specific, ..
            } => Some(match (scheme.as_ref(), specific.parse()) {
                ("tcp", Ok(addr)) => ClaAddress::Tcp(addr),
                _ => ClaAddress::Other {
                    scheme: scheme.clone(),
                    address: specific.clone(),
                },
            }),
            _ => None,
        }
    }
}

impl core::fmt::Display for ClaAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ClaAddress::Tcp(addr) => write!(f, "tcp:{addr}"),
            ClaAddress::Other { scheme, address } => write!(f, "{scheme}:{address}"),
        }
    }
}

/// An open connection to a peer
#[async_trait]
pub trait ClaChannel: Send + Sync {
    /// Serializes `bundle` onto the channel, returning the bytes sent
    async fn send_bundle(&self, bundle: &Bundle, registry: &ExtensionRegistry) -> Result<usize>;
}

#[async_trait]
pub trait LinkLocalTable: Send + Sync {
    async fn lookup_channel(&self, address: &ClaAddress) -> Option<Arc<dyn ClaChannel>>;
}

/// The channels currently open, by peer address
#[derive(Default)]
pub struct Links {
    channels: RwLock<HashMap<ClaAddress, Arc<dyn ClaChannel>>>,
}

impl Links {
    pub fn add(&self, address: ClaAddress, channel: Arc<dyn ClaChannel>) {
        debug!("Link to {address} is up");
        self.channels
            .write()
            .trace_expect("Failed to lock links")
            .insert(address, channel);
    }

    pub fn remove(&self, address: &ClaAddress) -> bool {
        debug!("Link to {address} is down");
        self.channels
            .write()
            .trace_expect("Failed to lock links")
            .remove(address)
            .is_some()
    }
}

#[async_trait]
impl LinkLocalTable for Links {
    async fn lookup_channel(&self, address: &ClaAddress) -> Option<Arc<dyn ClaChannel>> {
        self.channels
            .read()
            .trace_expect("Failed to lock links")
            .get(address)
            .cloned()
    }
}

struct Inbound<S> {
    bytes: Option<S>,
    decoder: StreamDecoder,
    ready: VecDeque<Bundle>,
}

/// Decodes the bundles arriving on a byte stream, chunked any way at all.
///
/// The stream ends after the first error: bytes following a malformed
/// bundle cannot be trusted to start a new one.  A stream that stops part
/// way through a bundle ends with [`Error::Truncated`].
pub fn recv_bundles<S>(
    bytes: S,
    registry: Arc<ExtensionRegistry>,
    blobs: Arc<dyn BlobFactory>,
) -> impl Stream<Item = Result<Bundle>> + Send
where
    S: Stream<Item = Bytes> + Send + Unpin,
{
    let inbound = Inbound {
        bytes: Some(bytes),
        decoder: StreamDecoder::new(registry, blobs),
        ready: VecDeque::new(),
    };

    futures::stream::unfold(inbound, |mut inbound| async move {
        loop {
            if let Some(bundle) = inbound.ready.pop_front() {
                return Some((Ok(bundle), inbound));
            }

            match inbound.bytes.as_mut()?.next().await {
                Some(chunk) => match inbound.decoder.push(&chunk) {
                    Ok(bundles) => inbound.ready.extend(bundles),
                    Err(e) => {
                        inbound.bytes = None;
                        return Some((Err(e.into()), inbound));
                    }
                },
                None => {
                    inbound.bytes = None;
                    if inbound.decoder.is_idle() {
                        return None;
                    }
                    return Some((Err(Error::Truncated), inbound));
                }
            }
        }
    })
}
