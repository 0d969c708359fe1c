use super::*;
use core::time::Duration;
use std::num::NonZeroUsize;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Send the status reports bundles ask for
    pub status_reports: bool,

    /// Accept bundles that are not addressed to this node
    pub forwarding: bool,

    /// Reject bundles addressed to a group endpoint
    pub singleton_only: bool,

    /// Accept bundles from the null endpoint
    pub allow_anonymous: bool,

    #[cfg_attr(feature = "serde", serde(with = "seconds"))]
    pub max_lifetime: Duration,

    /// How far ahead of this node's clock a creation time may be
    #[cfg_attr(feature = "serde", serde(with = "seconds"))]
    pub max_timestamp_future: Duration,

    /// Largest block data accepted, in bytes, payload included
    pub max_block_size: u64,

    /// Passes through one processing phase before a bundle is given up on
    pub max_reprocessing_passes: usize,

    /// Largest payload held by the default in-memory blob factory
    pub max_volatile_blob_size: u64,

    #[cfg_attr(feature = "serde", serde(default = "default_poll_channel_depth"))]
    pub poll_channel_depth: NonZeroUsize,

    pub node_ids: node_ids::NodeIds,

    #[cfg_attr(feature = "serde", serde(skip))]
    pub storage: Option<Arc<dyn storage::Storage>>,

    #[cfg_attr(feature = "serde", serde(skip))]
    pub blob_factory: Option<Arc<dyn BlobFactory>>,
}

fn default_poll_channel_depth() -> NonZeroUsize {
    NonZeroUsize::new(16).trace_expect("16 is not zero")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            status_reports: false,
            forwarding: true,
            singleton_only: false,
            allow_anonymous: true,
            max_lifetime: Duration::from_secs(30 * 24 * 60 * 60),
            max_timestamp_future: Duration::from_secs(60),
            max_block_size: 16 * 1024 * 1024,
            max_reprocessing_passes: 8,
            max_volatile_blob_size: 16 * 1024 * 1024,
            poll_channel_depth: default_poll_channel_depth(),
            node_ids: node_ids::NodeIds::default(),
            storage: None,
            blob_factory: None,
        }
    }
}

impl Config {
    /// The configured blob factory, or an in-memory one
    pub fn blobs(&self) -> Arc<dyn BlobFactory> {
        self.blob_factory.clone().unwrap_or_else(|| {
            Arc::new(terra_bpv7::VolatileBlobFactory::new(
                self.max_volatile_blob_size,
            ))
        })
    }

    /// The configured storage, or an in-memory one
    pub fn storage(&self) -> Arc<dyn storage::Storage> {
        self.storage
            .clone()
            .unwrap_or_else(|| Arc::new(storage::VolatileStorage::default()))
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("status_reports", &self.status_reports)
            .field("forwarding", &self.forwarding)
            .field("singleton_only", &self.singleton_only)
            .field("allow_anonymous", &self.allow_anonymous)
            .field("max_lifetime", &self.max_lifetime)
            .field("max_timestamp_future", &self.max_timestamp_future)
            .field("max_block_size", &self.max_block_size)
            .field("max_reprocessing_passes", &self.max_reprocessing_passes)
            .field("node_ids", &self.node_ids)
            .finish_non_exhaustive()
    }
}

/// Durations are written as whole seconds
#[cfg(feature = "serde")]
mod seconds {
    use core::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
