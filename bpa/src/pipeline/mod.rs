/*!
Validation and per-block processing of a bundle.

A bundle goes through the [`Phase`]s in order: `Deserialized` and
`Reception` once on arrival, then `PrepareForTransmission` before each
attempt to send it, or `PutOnStorage` and later `PullFromStorage` while it
waits for a route.  In each phase every block's [`BlockProcessor`] is called
in ascending block-number order.  If any hook asks for it, the whole phase is
run again, up to the configured number of passes.

Cancellation is checked between blocks, never within one.
*/

mod rejection;

#[cfg(test)]
mod pipeline_tests;

use super::*;
use core::time::Duration;
use hashbrown::HashSet;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use rejection::Rejection;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("Processing cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Deserialized,
    Reception,
    PrepareForTransmission,
    PutOnStorage,
    PullFromStorage,
}

impl Phase {
    fn invoke(
        self,
        processor: &dyn BlockProcessor,
        bundle: &mut Bundle,
        number: u64,
        ctx: &ProcessingContext,
    ) -> Result<bool, ProcessingError> {
        match self {
            Phase::Deserialized => processor.on_block_deserialized(bundle, number, ctx),
            Phase::Reception => processor.on_reception_processing(bundle, number, ctx),
            Phase::PrepareForTransmission => {
                processor.on_prepare_for_transmission(bundle, number, ctx)
            }
            Phase::PutOnStorage => processor.on_put_on_storage(bundle, number, ctx),
            Phase::PullFromStorage => processor.on_pull_from_storage(bundle, number, ctx),
        }
    }

    /// Phases where a block that cannot be processed is dealt with according
    /// to its block flags
    fn applies_block_flags(self) -> bool {
        matches!(self, Phase::Reception | Phase::PrepareForTransmission)
    }
}

pub struct Pipeline {
    registry: Arc<ExtensionRegistry>,
    node_ids: node_ids::NodeIds,
    forwarding: bool,
    singleton_only: bool,
    allow_anonymous: bool,
    max_lifetime: Duration,
    max_timestamp_future: Duration,
    max_block_size: u64,
    max_passes: usize,
}

impl Pipeline {
    pub fn new(config: &config::Config, registry: Arc<ExtensionRegistry>) -> Self {
        Self {
            registry,
            node_ids: config.node_ids.clone(),
            forwarding: config.forwarding,
            singleton_only: config.singleton_only,
            allow_anonymous: config.allow_anonymous,
            max_lifetime: config.max_lifetime,
            max_timestamp_future: config.max_timestamp_future,
            max_block_size: config.max_block_size,
            max_passes: config.max_reprocessing_passes.max(1),
        }
    }

    pub fn node_ids(&self) -> &node_ids::NodeIds {
        &self.node_ids
    }

    /// Checks on the primary block and block headers, before any processor
    /// sees the bundle.  Expiry is checked first.
    pub fn validate(&self, bundle: &Bundle, now: DtnTime) -> Result<(), Rejection> {
        if bundle.is_expired(now) {
            return Err(Rejection::Expired);
        }

        if bundle.tags.crc_valid() == Some(false)
            || bundle
                .blocks()
                .iter()
                .any(|b| b.tags.crc_valid() == Some(false))
        {
            return Err(Rejection::CrcMismatch);
        }

        let primary = &bundle.primary;
        if primary.source.is_null() && !self.allow_anonymous {
            return Err(Rejection::AnonymousSource);
        }

        if primary.lifetime > self.max_lifetime {
            return Err(Rejection::LifetimeTooLong);
        }

        if let Some(created) = primary.timestamp.creation_time {
            if created > now + self.max_timestamp_future {
                return Err(Rejection::FutureTimestamp);
            }
        }

        if self.singleton_only && !primary.destination.is_singleton() {
            return Err(Rejection::NotSingleton);
        }

        if !self.forwarding && !self.node_ids.is_local(&primary.destination) {
            return Err(Rejection::ForwardingDisabled);
        }

        for block in bundle.blocks() {
            let len = block
                .declared_len()
                .or_else(|| block.data.as_payload().map(|p| p.len()))
                .unwrap_or(0);
            if len > self.max_block_size {
                return Err(Rejection::BlockTooLarge(block.number));
            }
        }
        Ok(())
    }

    /// A block this node cannot process that the bundle must not travel
    /// without
    pub fn check_mandatory_blocks(&self, bundle: &Bundle) -> Result<(), Rejection> {
        match bundle
            .blocks()
            .iter()
            .find(|b| b.flags.delete_bundle_on_failure && !self.registry.is_known(b.block_type))
        {
            Some(block) => Err(Rejection::MandatoryBlockUnsupported(block.number)),
            None => Ok(()),
        }
    }

    /// Runs one phase to completion.  Returns the status reports blocks
    /// asked for along the way.
    pub fn run(
        &self,
        bundle: &mut Bundle,
        phase: Phase,
        cancel: &CancellationToken,
    ) -> Result<Vec<StatusReport>, Error> {
        let mut ctx =
            ProcessingContext::new(self.node_ids.admin_endpoint(&bundle.primary.destination));
        let mut reports = Vec::new();
        let mut handled = HashSet::new();

        for pass in 1..=self.max_passes {
            ctx.pass = pass;
            let mut again = false;
            for number in bundle.block_numbers() {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }

                let Some(block) = bundle.block(number) else {
                    continue;
                };

                let processor = match self.registry.processor(block.block_type) {
                    Ok(processor) => processor,
                    Err(_) => {
                        if phase == Phase::Reception && handled.insert(number) {
                            trace!("No processor for block {number}");
                            self.unprocessable(bundle, number, &mut reports)?;
                        }
                        continue;
                    }
                };

                match phase.invoke(processor, bundle, number, &ctx) {
                    Ok(r) => again |= r,
                    Err(ProcessingError::HopLimitExceeded { count, limit }) => {
                        debug!("Hop count {count} exceeds limit {limit}");
                        return Err(Rejection::HopLimitExceeded.into());
                    }
                    Err(ProcessingError::MissingBlock(n)) => {
                        trace!("Block {n} went away during {phase:?}");
                    }
                    Err(e) => {
                        debug!("Block {number} failed {phase:?} processing: {e}");
                        if phase.applies_block_flags() {
                            if handled.insert(number) {
                                self.unprocessable(bundle, number, &mut reports)?;
                            }
                        } else if bundle
                            .block(number)
                            .is_some_and(|b| b.flags.delete_bundle_on_failure)
                        {
                            return Err(Rejection::BlockUnprocessable(number).into());
                        }
                    }
                }
            }

            if !again {
                return Ok(reports);
            }
            trace!("{phase:?} pass {pass} asked for reprocessing");
        }

        debug!(
            "Bundle {} still asked for reprocessing after {} passes",
            bundle.id(),
            self.max_passes
        );
        Err(Rejection::ReprocessingLimit.into())
    }

    /// RFC 9171 Section 5.6 step 3, for a block that could not be processed
    fn unprocessable(
        &self,
        bundle: &mut Bundle,
        number: u64,
        reports: &mut Vec<StatusReport>,
    ) -> Result<(), Rejection> {
        let Some(flags) = bundle.block(number).map(|b| b.flags) else {
            return Ok(());
        };

        if flags.report_on_failure {
            reports.extend(StatusReport::new(
                &bundle.primary,
                StatusAssertion::Received,
                ReasonCode::BlockUnsupported,
            ));
        }

        if flags.delete_bundle_on_failure {
            return Err(Rejection::BlockUnprocessable(number));
        }

        if flags.delete_block_on_failure {
            if let Err(e) = bundle.remove_block(number) {
                debug!("Cannot discard block {number}: {e}");
                return Err(Rejection::BlockUnprocessable(number));
            }
        } else if let Some(block) = bundle.block_mut(number) {
            block.flags.forwarded_unprocessed = true;
        }
        Ok(())
    }

    /// Validation, the mandatory block check, and the `Deserialized` phase
    pub fn on_deserialized(
        &self,
        bundle: &mut Bundle,
        cancel: &CancellationToken,
    ) -> Result<Vec<StatusReport>, Error> {
        self.validate(bundle, DtnTime::now())?;
        self.check_mandatory_blocks(bundle)?;
        self.run(bundle, Phase::Deserialized, cancel)
    }

    pub fn on_reception(
        &self,
        bundle: &mut Bundle,
        cancel: &CancellationToken,
    ) -> Result<Vec<StatusReport>, Error> {
        self.run(bundle, Phase::Reception, cancel)
    }

    pub fn on_prepare_for_transmission(
        &self,
        bundle: &mut Bundle,
        cancel: &CancellationToken,
    ) -> Result<Vec<StatusReport>, Error> {
        self.run(bundle, Phase::PrepareForTransmission, cancel)
    }

    pub fn on_put_on_storage(
        &self,
        bundle: &mut Bundle,
        cancel: &CancellationToken,
    ) -> Result<Vec<StatusReport>, Error> {
        self.run(bundle, Phase::PutOnStorage, cancel)
    }

    pub fn on_pull_from_storage(
        &self,
        bundle: &mut Bundle,
        cancel: &CancellationToken,
    ) -> Result<Vec<StatusReport>, Error> {
        self.run(bundle, Phase::PullFromStorage, cancel)
    }
}
