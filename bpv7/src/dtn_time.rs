use core::ops::Add;

const DTN_EPOCH: time::OffsetDateTime = time::macros::datetime!(2000-01-01 00:00:00 UTC);

/// Milliseconds since 2000-01-01 00:00:00 UTC
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DtnTime {
    millisecs: u64,
}

impl DtnTime {
    pub fn now() -> Self {
        time::OffsetDateTime::now_utc()
            .try_into()
            .unwrap_or_default()
    }

    pub fn new(millisecs: u64) -> Self {
        Self { millisecs }
    }

    pub fn millisecs(&self) -> u64 {
        self.millisecs
    }

    /// Milliseconds from `earlier` to `self`, zero if `earlier` is later
    pub fn saturating_since(&self, earlier: DtnTime) -> u64 {
        self.millisecs.saturating_sub(earlier.millisecs)
    }
}

impl Add<core::time::Duration> for DtnTime {
    type Output = DtnTime;

    fn add(self, rhs: core::time::Duration) -> Self::Output {
        Self {
            millisecs: self
                .millisecs
                .saturating_add(u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

impl terra_cbor::encode::ToCbor for DtnTime {
    fn to_cbor(&self, encoder: &mut terra_cbor::encode::Encoder) {
        encoder.emit(&self.millisecs)
    }
}

impl TryFrom<time::OffsetDateTime> for DtnTime {
    type Error = time::error::ConversionRange;

    fn try_from(instant: time::OffsetDateTime) -> Result<Self, Self::Error> {
        let millisecs = (instant - DTN_EPOCH).whole_milliseconds();
        if millisecs < 0 || millisecs > u64::MAX as i128 {
            Err(time::error::ConversionRange)
        } else {
            Ok(Self {
                millisecs: millisecs as u64,
            })
        }
    }
}

impl From<DtnTime> for time::OffsetDateTime {
    fn from(dtn_time: DtnTime) -> Self {
        DTN_EPOCH.saturating_add(time::Duration::milliseconds(
            i64::try_from(dtn_time.millisecs).unwrap_or(i64::MAX),
        ))
    }
}

impl core::fmt::Display for DtnTime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let t = time::OffsetDateTime::from(*self);
        match t.format(&time::format_description::well_known::Rfc3339) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{}ms", self.millisecs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch() {
        let t = DtnTime::try_from(time::macros::datetime!(2000-01-01 00:00:01.5 UTC)).unwrap();
        assert_eq!(t.millisecs(), 1500);
        assert_eq!(
            time::OffsetDateTime::from(t),
            time::macros::datetime!(2000-01-01 00:00:01.5 UTC)
        );
        assert!(DtnTime::try_from(time::macros::datetime!(1999-12-31 23:59:59 UTC)).is_err());
    }
}
