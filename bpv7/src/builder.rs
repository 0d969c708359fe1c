use super::*;

/// Assembles a new bundle originating at this node
pub struct Builder {
    bundle_flags: BundleFlags,
    crc_type: CrcType,
    source: Eid,
    destination: Eid,
    report_to: Option<Eid>,
    lifetime: core::time::Duration,
    extensions: Vec<BlockTemplate>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            bundle_flags: BundleFlags::default(),
            crc_type: CrcType::CRC32_CASTAGNOLI,
            source: Eid::Null,
            destination: Eid::Null,
            report_to: None,
            lifetime: core::time::Duration::from_secs(24 * 60 * 60),
            extensions: Vec::new(),
        }
    }
}

impl Builder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn flags(&mut self, flags: BundleFlags) -> &mut Self {
        self.bundle_flags = flags;
        self
    }

    pub fn crc_type(&mut self, crc_type: CrcType) -> &mut Self {
        self.crc_type = crc_type;
        self
    }

    pub fn source(&mut self, source: Eid) -> &mut Self {
        self.source = source;
        self
    }

    pub fn destination(&mut self, destination: Eid) -> &mut Self {
        self.destination = destination;
        self
    }

    /// Defaults to the source
    pub fn report_to(&mut self, report_to: Eid) -> &mut Self {
        self.report_to = Some(report_to);
        self
    }

    pub fn lifetime(&mut self, lifetime: core::time::Duration) -> &mut Self {
        self.lifetime = lifetime;
        self
    }

    pub fn add_extension_block(
        &mut self,
        block_type: BlockType,
        data: BlockData,
    ) -> BlockBuilder<'_> {
        BlockBuilder {
            template: BlockTemplate {
                block_type,
                flags: BlockFlags::default(),
                data,
            },
            builder: self,
        }
    }

    /// The bundle, timestamped now, with extension blocks numbered from 2
    /// in the order they were added
    pub fn build(self, payload: Box<dyn Blob>) -> Bundle {
        let primary = PrimaryBlock {
            flags: self.bundle_flags,
            crc_type: self.crc_type,
            report_to: self.report_to.unwrap_or_else(|| self.source.clone()),
            source: self.source,
            destination: self.destination,
            timestamp: CreationTimestamp::now(),
            lifetime: self.lifetime,
            fragment_info: None,
        };
        let mut bundle = Bundle::new(primary, payload);
        for block in self.extensions {
            bundle.add_block(block.block_type, block.flags, block.data);
        }
        bundle
    }
}

struct BlockTemplate {
    block_type: BlockType,
    flags: BlockFlags,
    data: BlockData,
}

pub struct BlockBuilder<'a> {
    builder: &'a mut Builder,
    template: BlockTemplate,
}

impl<'a> BlockBuilder<'a> {
    pub fn must_replicate(mut self, must_replicate: bool) -> Self {
        self.template.flags.must_replicate = must_replicate;
        self
    }

    pub fn report_on_failure(mut self, report_on_failure: bool) -> Self {
        self.template.flags.report_on_failure = report_on_failure;
        self
    }

    pub fn delete_bundle_on_failure(mut self, delete_bundle_on_failure: bool) -> Self {
        self.template.flags.delete_bundle_on_failure = delete_bundle_on_failure;
        self
    }

    pub fn delete_block_on_failure(mut self, delete_block_on_failure: bool) -> Self {
        self.template.flags.delete_block_on_failure = delete_block_on_failure;
        self
    }

    pub fn build(self) -> &'a mut Builder {
        self.builder.extensions.push(self.template);
        self.builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build() {
        let mut b = Builder::new();
        b.source("ipn:1.0".parse().unwrap())
            .destination("ipn:2.0".parse().unwrap())
            .crc_type(CrcType::CRC16_X25)
            .add_extension_block(BlockType::HopCount, BlockData::HopCount(HopInfo::new(8)))
            .delete_bundle_on_failure(true)
            .build()
            .add_extension_block(BlockType::BundleAge, BlockData::BundleAge(BundleAge::new(0)))
            .build();

        let bundle = b.build(Box::new(VolatileBlob::from(b"hello".as_slice())));
        assert_eq!(bundle.primary.report_to, Eid::ipn(1, 0));
        assert_eq!(bundle.block_numbers(), [1, 2, 3]);
        let hops = bundle.block(2).unwrap();
        assert_eq!(hops.block_type, BlockType::HopCount);
        assert!(hops.flags.delete_bundle_on_failure);
        assert_eq!(hops.crc_type, CrcType::CRC16_X25);
        assert!(bundle.primary.timestamp.creation_time.is_some());
    }
}
