use super::*;
use core::time::Duration;

/// The only bundle protocol version understood
pub const BUNDLE_PROTOCOL_VERSION: u64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryBlock {
    pub flags: BundleFlags,
    pub crc_type: CrcType,
    pub destination: Eid,
    pub source: Eid,
    pub report_to: Eid,
    pub timestamp: CreationTimestamp,
    pub lifetime: Duration,
    pub fragment_info: Option<FragmentInfo>,
}

impl Default for PrimaryBlock {
    fn default() -> Self {
        Self {
            flags: BundleFlags::default(),
            crc_type: CrcType::CRC32_CASTAGNOLI,
            destination: Eid::Null,
            source: Eid::Null,
            report_to: Eid::Null,
            timestamp: CreationTimestamp::default(),
            lifetime: Duration::from_secs(24 * 60 * 60),
            fragment_info: None,
        }
    }
}

impl PrimaryBlock {
    pub fn id(&self) -> BundleId {
        BundleId {
            source: self.source.clone(),
            timestamp: self.timestamp,
            fragment_info: self.fragment_info,
        }
    }

    pub fn lifetime_millisecs(&self) -> u64 {
        u64::try_from(self.lifetime.as_millis()).unwrap_or(u64::MAX)
    }

    /// The absolute expiry, if the source had a clock
    pub fn expiry(&self) -> Option<DtnTime> {
        self.timestamp
            .creation_time
            .map(|created| created + self.lifetime)
    }

    /// With no creation time, expiry is judged from `age` instead
    pub fn is_expired(&self, now: DtnTime, age: Option<u64>) -> bool {
        match (self.expiry(), age) {
            (Some(expiry), _) => now >= expiry,
            (None, Some(age)) => age >= self.lifetime_millisecs(),
            (None, None) => false,
        }
    }

    /// Time remaining before expiry, zero if already expired
    pub fn remaining(&self, now: DtnTime, age: Option<u64>) -> Duration {
        let left = match (self.expiry(), age) {
            (Some(expiry), _) => expiry.saturating_since(now),
            (None, Some(age)) => self.lifetime_millisecs().saturating_sub(age),
            (None, None) => self.lifetime_millisecs(),
        };
        Duration::from_millis(left)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry() {
        let primary = PrimaryBlock {
            timestamp: CreationTimestamp::new(10_000, 0),
            lifetime: Duration::from_millis(500),
            ..Default::default()
        };
        assert_eq!(primary.expiry(), Some(DtnTime::new(10_500)));
        assert!(!primary.is_expired(DtnTime::new(10_499), None));
        assert!(primary.is_expired(DtnTime::new(10_500), None));
        assert_eq!(
            primary.remaining(DtnTime::new(10_100), None),
            Duration::from_millis(400)
        );

        let clockless = PrimaryBlock {
            timestamp: CreationTimestamp::new(0, 3),
            lifetime: Duration::from_millis(500),
            ..Default::default()
        };
        assert_eq!(clockless.expiry(), None);
        assert!(!clockless.is_expired(DtnTime::new(u64::MAX), Some(499)));
        assert!(clockless.is_expired(DtnTime::new(0), Some(500)));
    }
}
