/// Block processing control flags, RFC 9171 Section 4.2.4
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockFlags {
    /// The block must be replicated in every fragment of the bundle
    pub must_replicate: bool,
    /// Transmit a status report if the block cannot be processed
    pub report_on_failure: bool,
    /// Delete the bundle if the block cannot be processed
    pub delete_bundle_on_failure: bool,
    /// Discard the block if it cannot be processed
    pub delete_block_on_failure: bool,
    /// The block was forwarded by a node that could not process it
    pub forwarded_unprocessed: bool,
    /// Bits this implementation does not interpret, kept for forwarding
    pub unrecognised: u64,
}

const MUST_REPLICATE: u64 = 1 << 0;
const REPORT_ON_FAILURE: u64 = 1 << 1;
const DELETE_BUNDLE_ON_FAILURE: u64 = 1 << 2;
const DELETE_BLOCK_ON_FAILURE: u64 = 1 << 4;
const FORWARDED_UNPROCESSED: u64 = 1 << 5;

impl From<BlockFlags> for u64 {
    fn from(value: BlockFlags) -> Self {
        let mut flags = value.unrecognised;
        if value.must_replicate {
            flags |= MUST_REPLICATE;
        }
        if value.report_on_failure {
            flags |= REPORT_ON_FAILURE;
        }
        if value.delete_bundle_on_failure {
            flags |= DELETE_BUNDLE_ON_FAILURE;
        }
        if value.delete_block_on_failure {
            flags |= DELETE_BLOCK_ON_FAILURE;
        }
        if value.forwarded_unprocessed {
            flags |= FORWARDED_UNPROCESSED;
        }
        flags
    }
}

impl From<u64> for BlockFlags {
    fn from(value: u64) -> Self {
        Self {
            must_replicate: value & MUST_REPLICATE != 0,
            report_on_failure: value & REPORT_ON_FAILURE != 0,
            delete_bundle_on_failure: value & DELETE_BUNDLE_ON_FAILURE != 0,
            delete_block_on_failure: value & DELETE_BLOCK_ON_FAILURE != 0,
            forwarded_unprocessed: value & FORWARDED_UNPROCESSED != 0,
            unrecognised: value
                & !(MUST_REPLICATE
                    | REPORT_ON_FAILURE
                    | DELETE_BUNDLE_ON_FAILURE
                    | DELETE_BLOCK_ON_FAILURE
                    | FORWARDED_UNPROCESSED),
        }
    }
}

impl terra_cbor::encode::ToCbor for BlockFlags {
    fn to_cbor(&self, encoder: &mut terra_cbor::encode::Encoder) {
        encoder.emit(&u64::from(*self))
    }
}
