/*!
The Bundle Protocol version 7 data model and wire format, RFC 9171.

A [`Bundle`] is decoded incrementally from bytes arriving in chunks of any
size ([`codec::BundleDecoder`]), and encoded lazily ([`codec::Chunks`]).
Endpoint schemes, block types and their [`BlockProcessor`]s can be added to
an [`ExtensionRegistry`] at start-up, which is shared read-only afterwards.
*/

use std::sync::Arc;
use tracing::*;

mod block;
mod block_flags;
mod block_type;
mod bundle;
mod bundle_flags;
mod creation_timestamp;
mod dtn_time;
mod error;
mod primary_block;

pub mod blob;
pub mod block_data;
pub mod builder;
pub mod bundle_id;
pub mod codec;
pub mod crc;
pub mod eid;
pub mod processor;
pub mod registry;
pub mod status_report;
pub mod tags;

pub use blob::{Blob, BlobFactory, BlobSink, VolatileBlob, VolatileBlobFactory};
pub use block::{BlockData, BundleAge, CanonicalBlock, ExtensionData, HopInfo};
pub use block_flags::BlockFlags;
pub use block_type::BlockType;
pub use bundle::{Bundle, MetaBundle};
pub use bundle_flags::BundleFlags;
pub use bundle_id::{BundleId, FragmentInfo};
pub use creation_timestamp::CreationTimestamp;
pub use crc::CrcType;
pub use dtn_time::DtnTime;
pub use eid::Eid;
pub use error::{CaptureFieldErr, Error};
pub use primary_block::{BUNDLE_PROTOCOL_VERSION, PrimaryBlock};
pub use processor::{BlockProcessor, ProcessingContext, ProcessingError};
pub use registry::ExtensionRegistry;
pub use status_report::{ReasonCode, StatusAssertion, StatusReport};
pub use tags::{TagValue, Tags};

use crc::CrcTap;
