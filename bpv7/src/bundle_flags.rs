/// Bundle processing control flags, RFC 9171 Section 4.2.3
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BundleFlags {
    pub is_fragment: bool,
    pub is_admin_record: bool,
    pub do_not_fragment: bool,
    pub app_ack_requested: bool,
    pub report_status_time: bool,
    pub receipt_report_requested: bool,
    pub forward_report_requested: bool,
    pub delivery_report_requested: bool,
    pub delete_report_requested: bool,
    pub unrecognised: u64,
}

const BITS: [u32; 9] = [0, 1, 2, 5, 6, 14, 16, 17, 18];

impl BundleFlags {
    fn bits(&self) -> [bool; 9] {
        [
            self.is_fragment,
            self.is_admin_record,
            self.do_not_fragment,
            self.app_ack_requested,
            self.report_status_time,
            self.receipt_report_requested,
            self.forward_report_requested,
            self.delivery_report_requested,
            self.delete_report_requested,
        ]
    }

    /// Any status report at all is requested
    pub fn any_report_requested(&self) -> bool {
        self.receipt_report_requested
            || self.forward_report_requested
            || self.delivery_report_requested
            || self.delete_report_requested
    }
}

impl From<u64> for BundleFlags {
    fn from(value: u64) -> Self {
        let known = BITS.iter().fold(0u64, |m, b| m | (1 << b));
        let set = |b: usize| value & (1 << BITS[b]) != 0;
        Self {
            is_fragment: set(0),
            is_admin_record: set(1),
            do_not_fragment: set(2),
            app_ack_requested: set(3),
            report_status_time: set(4),
            receipt_report_requested: set(5),
            forward_report_requested: set(6),
            delivery_report_requested: set(7),
            delete_report_requested: set(8),
            unrecognised: value & !known,
        }
    }
}

impl From<BundleFlags> for u64 {
    fn from(value: BundleFlags) -> Self {
        value
            .bits()
            .iter()
            .zip(BITS)
            .filter(|(set, _)| **set)
            .fold(value.unrecognised, |flags, (_, b)| flags | (1 << b))
    }
}

impl terra_cbor::encode::ToCbor for BundleFlags {
    fn to_cbor(&self, encoder: &mut terra_cbor::encode::Encoder) {
        encoder.emit(&u64::from(*self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlockFlags;

    #[test]
    fn bundle_bits() {
        let flags = BundleFlags::from((1 << 0) | (1 << 17) | (1 << 40));
        assert!(flags.is_fragment);
        assert!(flags.delivery_report_requested);
        assert!(!flags.is_admin_record);
        assert_eq!(flags.unrecognised, 1 << 40);
        assert_eq!(u64::from(flags), (1 << 0) | (1 << 17) | (1 << 40));
        assert!(flags.any_report_requested());
    }

    #[test]
    fn block_bits() {
        let flags = BlockFlags::from(0b10_0100u64 | (1 << 9));
        assert!(flags.delete_bundle_on_failure);
        assert!(flags.forwarded_unprocessed);
        assert!(!flags.delete_block_on_failure);
        assert_eq!(flags.unrecognised, 1 << 9);
        assert_eq!(u64::from(flags), 0b10_0100 | (1 << 9));
    }
}
