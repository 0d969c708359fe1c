use super::*;
use thiserror::Error;

/// Why a bundle was dropped by the pipeline
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("Bundle has expired")]
    Expired,

    #[error("Bundle is not for this node and forwarding is disabled")]
    ForwardingDisabled,

    #[error("Destination is not a singleton endpoint")]
    NotSingleton,

    #[error("Lifetime exceeds the configured maximum")]
    LifetimeTooLong,

    #[error("Creation time is too far in the future")]
    FutureTimestamp,

    #[error("Block {0} exceeds the configured maximum size")]
    BlockTooLarge(u64),

    #[error("Block {0} must be processed but its type is unsupported")]
    MandatoryBlockUnsupported(u64),

    #[error("Anonymous bundles are not accepted")]
    AnonymousSource,

    #[error("CRC check failed")]
    CrcMismatch,

    #[error("Hop limit exceeded")]
    HopLimitExceeded,

    #[error("Processing did not settle within the pass limit")]
    ReprocessingLimit,

    #[error("Block {0} could not be processed")]
    BlockUnprocessable(u64),
}

impl Rejection {
    /// The reason given in a deletion status report
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            Rejection::Expired => ReasonCode::LifetimeExpired,
            Rejection::ForwardingDisabled => ReasonCode::NoKnownRouteToDestinationFromHere,
            Rejection::NotSingleton => ReasonCode::DestinationEndpointIDUnavailable,
            Rejection::LifetimeTooLong
            | Rejection::FutureTimestamp
            | Rejection::AnonymousSource
            | Rejection::ReprocessingLimit => ReasonCode::NoAdditionalInformation,
            Rejection::BlockTooLarge(_) => ReasonCode::TrafficPared,
            Rejection::MandatoryBlockUnsupported(_) | Rejection::BlockUnprocessable(_) => {
                ReasonCode::BlockUnsupported
            }
            Rejection::CrcMismatch => ReasonCode::BlockUnintelligible,
            Rejection::HopLimitExceeded => ReasonCode::HopLimitExceeded,
        }
    }
}
