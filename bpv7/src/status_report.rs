use super::*;

/// Status report reason codes, RFC 9171 Section 6.1.1
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReasonCode {
    #[default]
    NoAdditionalInformation,
    LifetimeExpired,
    ForwardedOverUnidirectionalLink,
    TransmissionCanceled,
    DepletedStorage,
    DestinationEndpointIDUnavailable,
    NoKnownRouteToDestinationFromHere,
    NoTimelyContactWithNextNodeOnRoute,
    BlockUnintelligible,
    HopLimitExceeded,
    TrafficPared,
    BlockUnsupported,
    Unassigned(u64),
}

impl From<ReasonCode> for u64 {
    fn from(value: ReasonCode) -> Self {
        match value {
            ReasonCode::NoAdditionalInformation => 0,
            ReasonCode::LifetimeExpired => 1,
            ReasonCode::ForwardedOverUnidirectionalLink => 2,
            ReasonCode::TransmissionCanceled => 3,
            ReasonCode::DepletedStorage => 4,
            ReasonCode::DestinationEndpointIDUnavailable => 5,
            ReasonCode::NoKnownRouteToDestinationFromHere => 6,
            ReasonCode::NoTimelyContactWithNextNodeOnRoute => 7,
            ReasonCode::BlockUnintelligible => 8,
            ReasonCode::HopLimitExceeded => 9,
            ReasonCode::TrafficPared => 10,
            ReasonCode::BlockUnsupported => 11,
            ReasonCode::Unassigned(v) => v,
        }
    }
}

impl From<u64> for ReasonCode {
    fn from(value: u64) -> Self {
        match value {
            0 => ReasonCode::NoAdditionalInformation,
            1 => ReasonCode::LifetimeExpired,
            2 => ReasonCode::ForwardedOverUnidirectionalLink,
            3 => ReasonCode::TransmissionCanceled,
            4 => ReasonCode::DepletedStorage,
            5 => ReasonCode::DestinationEndpointIDUnavailable,
            6 => ReasonCode::NoKnownRouteToDestinationFromHere,
            7 => ReasonCode::NoTimelyContactWithNextNodeOnRoute,
            8 => ReasonCode::BlockUnintelligible,
            9 => ReasonCode::HopLimitExceeded,
            10 => ReasonCode::TrafficPared,
            11 => ReasonCode::BlockUnsupported,
            v => ReasonCode::Unassigned(v),
        }
    }
}

impl terra_cbor::encode::ToCbor for ReasonCode {
    fn to_cbor(&self, encoder: &mut terra_cbor::encode::Encoder) {
        encoder.emit(&u64::from(*self))
    }
}

/// What a status report asserts about a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StatusAssertion {
    Received,
    Forwarded,
    Delivered,
    Deleted,
}

impl StatusAssertion {
    /// Whether `flags` ask for this kind of report
    pub fn requested(&self, flags: &BundleFlags) -> bool {
        match self {
            StatusAssertion::Received => flags.receipt_report_requested,
            StatusAssertion::Forwarded => flags.forward_report_requested,
            StatusAssertion::Delivered => flags.delivery_report_requested,
            StatusAssertion::Deleted => flags.delete_report_requested,
        }
    }
}

/// A status report to be sent to a bundle's report-to endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub bundle_id: BundleId,
    pub report_to: Eid,
    pub assertion: StatusAssertion,
    pub reason: ReasonCode,
    /// Present when the bundle asked for status times
    pub time: Option<DtnTime>,
}

impl StatusReport {
    /// A report on `primary`, or `None` if the bundle did not ask for one
    /// of this kind
    pub fn for_bundle(
        primary: &PrimaryBlock,
        assertion: StatusAssertion,
        reason: ReasonCode,
    ) -> Option<Self> {
        if !assertion.requested(&primary.flags) {
            return None;
        }
        Self::new(primary, assertion, reason)
    }

    /// A report regardless of the bundle's report flags.  Administrative
    /// records, and bundles with no report-to endpoint, are never reported on.
    pub fn new(
        primary: &PrimaryBlock,
        assertion: StatusAssertion,
        reason: ReasonCode,
    ) -> Option<Self> {
        if primary.flags.is_admin_record || primary.report_to.is_null() {
            return None;
        }
        Some(Self {
            bundle_id: primary.id(),
            report_to: primary.report_to.clone(),
            assertion,
            reason,
            time: primary.flags.report_status_time.then(DtnTime::now),
        })
    }
}
