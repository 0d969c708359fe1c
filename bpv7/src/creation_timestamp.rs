use super::*;

/// A bundle creation timestamp, RFC 9171 Section 4.2.7.
///
/// A creation time of `None` (zero on the wire) means the source has no
/// accurate clock, and the bundle must then carry a Bundle Age block.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CreationTimestamp {
    pub creation_time: Option<DtnTime>,
    pub sequence_number: u64,
}

impl CreationTimestamp {
    /// Timestamp the current time, using the sub-millisecond part of the
    /// clock to separate bundles created within the same millisecond
    pub fn now() -> Self {
        let timestamp = time::OffsetDateTime::now_utc();
        Self {
            creation_time: timestamp.try_into().ok(),
            sequence_number: (timestamp.nanosecond() % 1_000_000) as u64,
        }
    }

    pub fn new(creation_time: u64, sequence_number: u64) -> Self {
        Self {
            creation_time: (creation_time != 0).then(|| DtnTime::new(creation_time)),
            sequence_number,
        }
    }

    pub fn millisecs(&self) -> u64 {
        self.creation_time.map(|t| t.millisecs()).unwrap_or(0)
    }
}

impl terra_cbor::encode::ToCbor for CreationTimestamp {
    fn to_cbor(&self, encoder: &mut terra_cbor::encode::Encoder) {
        encoder.emit_array(Some(2), |a| {
            a.emit(&self.millisecs());
            a.emit(&self.sequence_number);
        })
    }
}
