/*!
Per-block-type processing hooks.

A [`BlockProcessor`] is looked up through the [`ExtensionRegistry`] for each
block of a bundle as the bundle moves through its lifecycle.  Every hook
returns whether the bundle must be walked through the same phase again,
because the hook changed something other blocks depend on.
*/

use super::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Block {0} cannot be processed")]
    NotProcessable(u64),

    #[error("Hop limit exceeded: {count} hops of {limit}")]
    HopLimitExceeded { count: u64, limit: u64 },

    #[error("Bundle has no block {0}")]
    MissingBlock(u64),

    #[error(transparent)]
    Other(#[from] Box<dyn core::error::Error + Send + Sync>),
}

/// What a hook may know about the node doing the processing
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    /// The administrative endpoint of this node
    pub local_node: Eid,
    pub now: DtnTime,
    /// Which walk through the current phase this is, starting at 1.  Hooks
    /// that count events act on the first pass only.
    pub pass: usize,
}

impl ProcessingContext {
    pub fn new(local_node: Eid) -> Self {
        Self {
            local_node,
            now: DtnTime::now(),
            pass: 1,
        }
    }
}

/// Hooks called for one block, identified by `number`, within `bundle`.
///
/// The default for every hook does nothing and asks for no reprocessing.
pub trait BlockProcessor: Send + Sync {
    /// Right after decoding, before the bundle is accepted as valid
    fn on_block_deserialized(
        &self,
        _bundle: &mut Bundle,
        _number: u64,
        _ctx: &ProcessingContext,
    ) -> Result<bool, ProcessingError> {
        Ok(false)
    }

    /// When a bundle has been received from a peer or an application
    fn on_reception_processing(
        &self,
        _bundle: &mut Bundle,
        _number: u64,
        _ctx: &ProcessingContext,
    ) -> Result<bool, ProcessingError> {
        Ok(false)
    }

    /// Immediately before the bundle is handed to a convergence layer
    fn on_prepare_for_transmission(
        &self,
        _bundle: &mut Bundle,
        _number: u64,
        _ctx: &ProcessingContext,
    ) -> Result<bool, ProcessingError> {
        Ok(false)
    }

    /// Before the bundle is parked in storage
    fn on_put_on_storage(
        &self,
        _bundle: &mut Bundle,
        _number: u64,
        _ctx: &ProcessingContext,
    ) -> Result<bool, ProcessingError> {
        Ok(false)
    }

    /// After the bundle is taken back out of storage
    fn on_pull_from_storage(
        &self,
        _bundle: &mut Bundle,
        _number: u64,
        _ctx: &ProcessingContext,
    ) -> Result<bool, ProcessingError> {
        Ok(false)
    }
}

fn block_data(bundle: &mut Bundle, number: u64) -> Result<&mut BlockData, ProcessingError> {
    bundle
        .block_mut(number)
        .map(|b| &mut b.data)
        .ok_or(ProcessingError::MissingBlock(number))
}

/// For blocks with nothing to do: payload, manifest, routing, flow label
pub(crate) struct NullProcessor;

impl BlockProcessor for NullProcessor {}

pub(crate) struct BundleAgeProcessor;

impl BundleAgeProcessor {
    fn fold_elapsed(bundle: &mut Bundle, number: u64) -> Result<bool, ProcessingError> {
        match block_data(bundle, number)? {
            BlockData::BundleAge(age) => {
                age.update();
                Ok(false)
            }
            _ => Err(ProcessingError::NotProcessable(number)),
        }
    }
}

impl BlockProcessor for BundleAgeProcessor {
    fn on_prepare_for_transmission(
        &self,
        bundle: &mut Bundle,
        number: u64,
        _ctx: &ProcessingContext,
    ) -> Result<bool, ProcessingError> {
        Self::fold_elapsed(bundle, number)
    }

    fn on_put_on_storage(
        &self,
        bundle: &mut Bundle,
        number: u64,
        _ctx: &ProcessingContext,
    ) -> Result<bool, ProcessingError> {
        Self::fold_elapsed(bundle, number)
    }

    fn on_pull_from_storage(
        &self,
        bundle: &mut Bundle,
        number: u64,
        _ctx: &ProcessingContext,
    ) -> Result<bool, ProcessingError> {
        Self::fold_elapsed(bundle, number)
    }
}

/// Hop Count and Scope Control Hop Limit
pub(crate) struct HopLimitProcessor;

impl BlockProcessor for HopLimitProcessor {
    fn on_block_deserialized(
        &self,
        bundle: &mut Bundle,
        number: u64,
        _ctx: &ProcessingContext,
    ) -> Result<bool, ProcessingError> {
        match block_data(bundle, number)?.as_hop_info() {
            Some(_) => Ok(false),
            None => Err(ProcessingError::NotProcessable(number)),
        }
    }

    fn on_reception_processing(
        &self,
        bundle: &mut Bundle,
        number: u64,
        ctx: &ProcessingContext,
    ) -> Result<bool, ProcessingError> {
        let hop = block_data(bundle, number)?
            .as_hop_info_mut()
            .ok_or(ProcessingError::NotProcessable(number))?;
        if ctx.pass == 1 {
            hop.increment(1);
        }
        if hop.exceeded() {
            return Err(ProcessingError::HopLimitExceeded {
                count: hop.count,
                limit: hop.limit,
            });
        }
        Ok(false)
    }
}

pub(crate) struct PreviousNodeProcessor;

impl BlockProcessor for PreviousNodeProcessor {
    fn on_reception_processing(
        &self,
        bundle: &mut Bundle,
        number: u64,
        _ctx: &ProcessingContext,
    ) -> Result<bool, ProcessingError> {
        let previous = match block_data(bundle, number)? {
            BlockData::PreviousNode(eid) => eid.to_string(),
            _ => return Err(ProcessingError::NotProcessable(number)),
        };
        bundle
            .tags
            .set(tags::PREVIOUS_NODE, TagValue::Text(previous.into()));
        Ok(false)
    }

    fn on_prepare_for_transmission(
        &self,
        bundle: &mut Bundle,
        number: u64,
        ctx: &ProcessingContext,
    ) -> Result<bool, ProcessingError> {
        match block_data(bundle, number)? {
            BlockData::PreviousNode(eid) => {
                *eid = ctx.local_node.clone();
                Ok(false)
            }
            _ => Err(ProcessingError::NotProcessable(number)),
        }
    }
}
