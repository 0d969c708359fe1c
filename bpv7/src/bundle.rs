/*!
The in-memory bundle.

A [`Bundle`] has a single owner at any time: it is not `Clone`, and is
moved from stage to stage as it is processed.  Dropping it releases its
payload blob.
*/

use super::*;

#[derive(Debug)]
pub struct Bundle {
    pub primary: PrimaryBlock,
    /// In wire order, the payload last
    blocks: Vec<CanonicalBlock>,
    /// Never serialized
    pub tags: Tags,
}

/// A bundle reduced to its primary block, for indexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaBundle {
    pub primary: PrimaryBlock,
    pub tags: Tags,
}

impl MetaBundle {
    pub fn id(&self) -> BundleId {
        self.primary.id()
    }
}

impl Bundle {
    /// A bundle with a payload block numbered 1
    pub fn new(primary: PrimaryBlock, payload: Box<dyn Blob>) -> Self {
        let crc_type = primary.crc_type;
        Self {
            primary,
            blocks: vec![CanonicalBlock::new(
                BlockType::Payload,
                1,
                BlockFlags::default(),
                crc_type,
                BlockData::Payload(payload),
            )],
            tags: Tags::default(),
        }
    }

    /// Assemble a decoded bundle, checking the block list is coherent
    pub(crate) fn from_parts(
        primary: PrimaryBlock,
        blocks: Vec<CanonicalBlock>,
    ) -> Result<Self, Error> {
        let mut numbers = hashbrown::HashSet::new();
        let mut payload = false;
        let mut age = false;
        let mut seen = hashbrown::HashSet::new();
        for block in &blocks {
            if !numbers.insert(block.number) {
                return Err(Error::DuplicateBlockNumber(block.number));
            }
            match block.block_type {
                BlockType::Payload => {
                    if block.number != 1 {
                        return Err(Error::InvalidBlockNumber(block.number, block.block_type));
                    }
                    payload = true;
                }
                BlockType::BundleAge => age = true,
                _ => {}
            }
            if matches!(
                block.block_type,
                BlockType::PreviousNode
                    | BlockType::BundleAge
                    | BlockType::HopCount
                    | BlockType::ScopeControlHopLimit
            ) && !seen.insert(block.block_type)
            {
                return Err(Error::DuplicateBlocks(block.block_type));
            }
        }
        if !payload {
            return Err(Error::MissingPayload);
        }
        if primary.timestamp.creation_time.is_none() && !age {
            return Err(Error::MissingBundleAge);
        }
        Ok(Self {
            primary,
            blocks,
            tags: Tags::default(),
        })
    }

    pub fn id(&self) -> BundleId {
        self.primary.id()
    }

    pub fn meta(&self) -> MetaBundle {
        MetaBundle {
            primary: self.primary.clone(),
            tags: self.tags.clone(),
        }
    }

    pub fn blocks(&self) -> &[CanonicalBlock] {
        &self.blocks
    }

    /// Block numbers in ascending order
    pub fn block_numbers(&self) -> Vec<u64> {
        let mut numbers: Vec<u64> = self.blocks.iter().map(|b| b.number).collect();
        numbers.sort_unstable();
        numbers
    }

    pub fn block(&self, number: u64) -> Option<&CanonicalBlock> {
        self.blocks.iter().find(|b| b.number == number)
    }

    pub fn block_mut(&mut self, number: u64) -> Option<&mut CanonicalBlock> {
        self.blocks.iter_mut().find(|b| b.number == number)
    }

    pub fn find_block(&self, block_type: BlockType) -> Option<&CanonicalBlock> {
        self.blocks.iter().find(|b| b.block_type == block_type)
    }

    pub fn find_block_mut(&mut self, block_type: BlockType) -> Option<&mut CanonicalBlock> {
        self.blocks.iter_mut().find(|b| b.block_type == block_type)
    }

    /// Adds a block ahead of the payload, numbered one above the highest
    /// number in use, and returns its number
    pub fn add_block(&mut self, block_type: BlockType, flags: BlockFlags, data: BlockData) -> u64 {
        let number = self.blocks.iter().map(|b| b.number).max().unwrap_or(1) + 1;
        let block = CanonicalBlock::new(block_type, number, flags, self.primary.crc_type, data);
        let at = self
            .blocks
            .iter()
            .position(|b| b.block_type == BlockType::Payload)
            .unwrap_or(self.blocks.len());
        self.blocks.insert(at, block);
        number
    }

    /// The payload block cannot be removed
    pub fn remove_block(&mut self, number: u64) -> Result<CanonicalBlock, Error> {
        match self.blocks.iter().position(|b| b.number == number) {
            Some(i) if self.blocks[i].block_type != BlockType::Payload => Ok(self.blocks.remove(i)),
            Some(_) => Err(Error::InvalidBlockNumber(number, BlockType::Payload)),
            None => Err(Error::MissingBlock(number)),
        }
    }

    pub fn payload(&self) -> Option<&dyn Blob> {
        self.find_block(BlockType::Payload)
            .and_then(|b| b.data.as_payload())
    }

    pub fn previous_node(&self) -> Option<&Eid> {
        match self.find_block(BlockType::PreviousNode).map(|b| &b.data) {
            Some(BlockData::PreviousNode(eid)) => Some(eid),
            _ => None,
        }
    }

    /// The current Bundle Age in milliseconds, if the bundle has an age block
    pub fn age(&self) -> Option<u64> {
        match self.find_block(BlockType::BundleAge).map(|b| &b.data) {
            Some(BlockData::BundleAge(age)) => Some(age.current()),
            _ => None,
        }
    }

    pub fn hop_info(&self) -> Option<HopInfo> {
        self.blocks
            .iter()
            .find_map(|b| b.data.as_hop_info())
            .copied()
    }

    pub fn is_expired(&self, now: DtnTime) -> bool {
        self.primary.is_expired(now, self.age())
    }
}
