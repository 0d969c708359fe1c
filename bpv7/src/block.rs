/*!
Canonical blocks and their type-specific data.

Built-in block types decode into their own [`BlockData`] variant.  Types
added through the extension registry decode into [`BlockData::Extension`],
and any other type is kept as raw bytes in [`BlockData::Unknown`] so it can
be forwarded unchanged.
*/

use super::*;
use bytes::Bytes;
use core::any::Any;
use std::time::Instant;

/// Hop count and limit, as carried by Hop Count and Scope Control Hop
/// Limit blocks
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HopInfo {
    pub limit: u64,
    pub count: u64,
}

impl HopInfo {
    pub fn new(limit: u64) -> Self {
        Self { limit, count: 0 }
    }

    pub fn increment(&mut self, hops: u64) {
        self.count = self.count.saturating_add(hops);
    }

    /// Hops remaining before the limit, never negative
    pub fn hops_to_live(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }

    pub fn exceeded(&self) -> bool {
        self.count > self.limit
    }
}

/// The Bundle Age, in milliseconds, plus the time spent at this node since
/// the value was last brought up to date
#[derive(Debug, Copy, Clone)]
pub struct BundleAge {
    millisecs: u64,
    since: Instant,
}

impl BundleAge {
    pub fn new(millisecs: u64) -> Self {
        Self {
            millisecs,
            since: Instant::now(),
        }
    }

    /// The age including time spent here so far
    pub fn current(&self) -> u64 {
        let elapsed = u64::try_from(self.since.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.millisecs.saturating_add(elapsed)
    }

    /// Fold the time spent here into the stored age
    pub fn update(&mut self) {
        let now = Instant::now();
        let elapsed = u64::try_from(now.duration_since(self.since).as_millis()).unwrap_or(u64::MAX);
        self.millisecs = self.millisecs.saturating_add(elapsed);
        self.since = now;
    }

    /// The stored age, without time spent here since the last update
    pub fn millisecs(&self) -> u64 {
        self.millisecs
    }
}

impl PartialEq for BundleAge {
    fn eq(&self, other: &Self) -> bool {
        self.millisecs == other.millisecs
    }
}

/// Data of a block type added through the extension registry
pub trait ExtensionData: Any + core::fmt::Debug + Send + Sync {}

impl dyn ExtensionData {
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        (self as &mut dyn Any).downcast_mut()
    }
}

#[derive(Debug)]
pub enum BlockData {
    Payload(Box<dyn Blob>),
    PreviousNode(Eid),
    BundleAge(BundleAge),
    HopCount(HopInfo),
    ScopeControlHopLimit(HopInfo),
    Manifest(Bytes),
    Routing(Bytes),
    FlowLabel(Bytes),
    Extension(Box<dyn ExtensionData>),
    /// A block type with no registered handler, kept verbatim
    Unknown(Bytes),
}

impl BlockData {
    pub fn payload(data: impl Into<Vec<u8>>) -> Self {
        Self::Payload(Box::new(VolatileBlob::from(data.into())))
    }

    pub fn as_payload(&self) -> Option<&dyn Blob> {
        match self {
            BlockData::Payload(blob) => Some(blob.as_ref()),
            _ => None,
        }
    }

    pub fn as_hop_info(&self) -> Option<&HopInfo> {
        match self {
            BlockData::HopCount(h) | BlockData::ScopeControlHopLimit(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_hop_info_mut(&mut self) -> Option<&mut HopInfo> {
        match self {
            BlockData::HopCount(h) | BlockData::ScopeControlHopLimit(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_extension<T: Any>(&self) -> Option<&T> {
        match self {
            BlockData::Extension(e) => e.downcast_ref(),
            _ => None,
        }
    }
}

/// A non-primary block
#[derive(Debug)]
pub struct CanonicalBlock {
    pub block_type: BlockType,
    pub number: u64,
    pub flags: BlockFlags,
    pub crc_type: CrcType,
    pub data: BlockData,
    /// Never serialized
    pub tags: Tags,
    pub(crate) declared_len: Option<u64>,
}

impl CanonicalBlock {
    pub fn new(
        block_type: BlockType,
        number: u64,
        flags: BlockFlags,
        crc_type: CrcType,
        data: BlockData,
    ) -> Self {
        Self {
            block_type,
            number,
            flags,
            crc_type,
            data,
            tags: Tags::default(),
            declared_len: None,
        }
    }

    /// The length of the block-type-specific data as it was received,
    /// `None` for a block created locally
    pub fn declared_len(&self) -> Option<u64> {
        self.declared_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hops_to_live() {
        let mut hop = HopInfo::new(5);
        for _ in 0..3 {
            hop.increment(1);
        }
        assert_eq!(hop.hops_to_live(), 2);
        assert!(!hop.exceeded());

        hop.increment(3);
        assert_eq!(hop.count, 6);
        assert_eq!(hop.hops_to_live(), 0);
        assert!(hop.exceeded());

        hop.increment(u64::MAX);
        assert_eq!(hop.hops_to_live(), 0);
    }

    #[test]
    fn age_never_decreases() {
        let mut age = BundleAge::new(1000);
        assert!(age.current() >= 1000);
        std::thread::sleep(std::time::Duration::from_millis(5));
        age.update();
        assert!(age.millisecs() >= 1005);
        assert!(age.current() >= age.millisecs());
    }

    #[derive(Debug, PartialEq)]
    struct Label(String);

    impl ExtensionData for Label {}

    #[test]
    fn extension_downcast() {
        let data = BlockData::Extension(Box::new(Label("x".into())));
        assert_eq!(data.as_extension::<Label>(), Some(&Label("x".into())));
        assert!(data.as_extension::<u32>().is_none());
        assert!(data.as_payload().is_none());
    }
}
