/*!
The bundle processing agent of a BPv7 node.

Bundles arrive as byte streams from convergence layers, or are submitted by
local applications.  Each one is validated and walked through the block
[`pipeline`], then delivered locally, forwarded to a peer, or parked in
[`storage`] until a link comes up or the bundle expires.  The
[`dispatcher::Dispatcher`] owns that flow; everything it talks to is a
collaborator trait so a node can supply its own routing, links, storage and
applications.
*/

mod dispatcher;

pub mod cla;
pub mod config;
pub mod node_ids;
pub mod pipeline;
pub mod report;
pub mod routes;
pub mod service;
pub mod storage;

#[cfg(feature = "serde")]
pub mod settings;

use std::sync::Arc;
use terra_bpv7::{
    BlobFactory, BlockProcessor, Bundle, BundleId, DtnTime, Eid, ExtensionRegistry, MetaBundle,
    PrimaryBlock, ProcessingContext, ProcessingError, ReasonCode, StatusAssertion, StatusReport,
};
use trace_err::*;
use tracing::{debug, error, info, instrument, trace, warn};

pub use dispatcher::Dispatcher;

// Re-export for consistency
pub use async_trait::async_trait;
pub use bytes::Bytes;
