/// Canonical block type codes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlockType {
    Primary,
    Payload,
    Manifest,
    FlowLabel,
    PreviousNode,
    BundleAge,
    ScopeControlHopLimit,
    HopCount,
    Routing,
    Unrecognised(u64),
}

impl BlockType {
    /// Types handled by the built-in codec and processors
    pub const BUILTIN: [BlockType; 8] = [
        BlockType::Payload,
        BlockType::Manifest,
        BlockType::FlowLabel,
        BlockType::PreviousNode,
        BlockType::BundleAge,
        BlockType::ScopeControlHopLimit,
        BlockType::HopCount,
        BlockType::Routing,
    ];

    pub fn is_builtin(&self) -> bool {
        !matches!(self, BlockType::Primary | BlockType::Unrecognised(_))
    }
}

impl From<BlockType> for u64 {
    fn from(value: BlockType) -> Self {
        match value {
            BlockType::Primary => 0,
            BlockType::Payload => 1,
            BlockType::Manifest => 4,
            BlockType::FlowLabel => 5,
            BlockType::PreviousNode => 6,
            BlockType::BundleAge => 7,
            BlockType::ScopeControlHopLimit => 9,
            BlockType::HopCount => 10,
            BlockType::Routing => 192,
            BlockType::Unrecognised(v) => v,
        }
    }
}

impl From<u64> for BlockType {
    fn from(value: u64) -> Self {
        match value {
            0 => BlockType::Primary,
            1 => BlockType::Payload,
            4 => BlockType::Manifest,
            5 => BlockType::FlowLabel,
            6 => BlockType::PreviousNode,
            7 => BlockType::BundleAge,
            9 => BlockType::ScopeControlHopLimit,
            10 => BlockType::HopCount,
            192 => BlockType::Routing,
            value => BlockType::Unrecognised(value),
        }
    }
}

impl terra_cbor::encode::ToCbor for BlockType {
    fn to_cbor(&self, encoder: &mut terra_cbor::encode::Encoder) {
        encoder.emit(&u64::from(*self))
    }
}
