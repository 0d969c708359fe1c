/*!
The extension registry.

Every block-type and EID-scheme specific behaviour is found here: how to
construct, parse and serialize a block's data, which [`BlockProcessor`]
handles it, and how to parse the scheme-specific part of an EID.

Built-in types and schemes are always checked first, then the tables filled
by the `add_extension_*` methods.  Registration needs `&mut self`, so it
happens while the node is being set up; afterwards the registry is shared
read-only behind an [`Arc`].
*/

use super::*;
use block_data::BlockDataParser;
use hashbrown::HashMap;
use processor::BlockProcessor;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown block type {0}")]
    UnknownBlockType(u64),

    #[error("No processor for block type {0}")]
    ProcessorNotFound(u64),

    #[error("{0} is already managed")]
    AlreadyManaged(String),
}

/// Makes the initial data of a new extension block
pub type BlockConstructor = Arc<dyn Fn() -> Box<dyn ExtensionData> + Send + Sync>;

/// Makes a parser for one extension block's data, given its declared length
pub type BlockParserConstructor =
    Arc<dyn Fn(Option<u64>) -> Result<Box<dyn BlockDataParser>, crate::Error> + Send + Sync>;

/// Encodes extension block data, without the enclosing byte string
pub type BlockSerializer = Arc<dyn Fn(&dyn ExtensionData) -> Vec<u8> + Send + Sync>;

/// Validates a scheme-specific part, returning its canonical form
pub type SspParser = Arc<dyn Fn(&str) -> Result<Box<str>, eid::Error> + Send + Sync>;

struct ExtensionBlock {
    constructor: BlockConstructor,
    parser: BlockParserConstructor,
    serializer: BlockSerializer,
    processor: Arc<dyn BlockProcessor>,
}

struct ExtensionScheme {
    scheme: Box<str>,
    parser: SspParser,
}

#[derive(Default)]
pub struct ExtensionRegistry {
    blocks: HashMap<u64, ExtensionBlock>,
    schemes: HashMap<u64, ExtensionScheme>,
    scheme_names: HashMap<Box<str>, u64>,
    cla_schemes: HashMap<Box<str>, SspParser>,
}

impl core::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("blocks", &self.blocks.keys().collect::<Vec<_>>())
            .field("schemes", &self.scheme_names)
            .field("cla_schemes", &self.cla_schemes.keys().collect::<Vec<_>>())
            .finish()
    }
}

static PAYLOAD: processor::NullProcessor = processor::NullProcessor;
static PREVIOUS_NODE: processor::PreviousNodeProcessor = processor::PreviousNodeProcessor;
static BUNDLE_AGE: processor::BundleAgeProcessor = processor::BundleAgeProcessor;
static HOP_COUNT: processor::HopLimitProcessor = processor::HopLimitProcessor;

impl ExtensionRegistry {
    /// A registry knowing only the built-in block types and schemes
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a block type.  Fails if the type is built in or already added.
    pub fn add_extension_block(
        &mut self,
        block_type: u64,
        constructor: impl Fn() -> Box<dyn ExtensionData> + Send + Sync + 'static,
        parser: impl Fn(Option<u64>) -> Result<Box<dyn BlockDataParser>, crate::Error>
        + Send
        + Sync
        + 'static,
        serializer: impl Fn(&dyn ExtensionData) -> Vec<u8> + Send + Sync + 'static,
        processor: Arc<dyn BlockProcessor>,
    ) -> Result<(), Error> {
        let t = BlockType::from(block_type);
        if !matches!(t, BlockType::Unrecognised(_)) || self.blocks.contains_key(&block_type) {
            return Err(Error::AlreadyManaged(format!("Block type {block_type}")));
        }
        self.blocks.insert(
            block_type,
            ExtensionBlock {
                constructor: Arc::new(constructor),
                parser: Arc::new(parser),
                serializer: Arc::new(serializer),
                processor,
            },
        );
        debug!("Registered extension block type {block_type}");
        Ok(())
    }

    /// Adds an EID scheme with its IANA scheme code
    pub fn add_extension_eid(
        &mut self,
        iana: u64,
        scheme: &str,
        parser: impl Fn(&str) -> Result<Box<str>, eid::Error> + Send + Sync + 'static,
    ) -> Result<(), Error> {
        if matches!(iana, eid::DTN_IANA | eid::IPN_IANA) || self.schemes.contains_key(&iana) {
            return Err(Error::AlreadyManaged(format!("EID scheme number {iana}")));
        }
        if matches!(scheme, "dtn" | "ipn") || self.scheme_names.contains_key(scheme) {
            return Err(Error::AlreadyManaged(format!("EID scheme '{scheme}'")));
        }
        self.schemes.insert(
            iana,
            ExtensionScheme {
                scheme: scheme.into(),
                parser: Arc::new(parser),
            },
        );
        self.scheme_names.insert(scheme.into(), iana);
        debug!("Registered EID scheme {scheme} ({iana})");
        Ok(())
    }

    /// Adds a convergence-layer scheme for `dtn://[<scheme>:<specific>]/`
    /// EIDs.  The parser returns the canonical form of `<specific>`.
    pub fn add_extension_cla_eid(
        &mut self,
        scheme: &str,
        parser: impl Fn(&str) -> Result<Box<str>, eid::Error> + Send + Sync + 'static,
    ) -> Result<(), Error> {
        if self.cla_schemes.contains_key(scheme) {
            return Err(Error::AlreadyManaged(format!("CLA scheme '{scheme}'")));
        }
        self.cla_schemes.insert(scheme.into(), Arc::new(parser));
        debug!("Registered CLA scheme {scheme}");
        Ok(())
    }

    /// Parses the text form of an EID
    pub fn parse_eid(&self, s: &str) -> Result<Eid, eid::Error> {
        let (scheme, ssp) = eid::split_scheme(s)?;
        self.eid_from_ssp(scheme, ssp)
    }

    pub(crate) fn eid_from_ssp(&self, scheme: &str, ssp: &str) -> Result<Eid, eid::Error> {
        match scheme {
            "dtn" => Ok(match eid::parse_dtn_ssp(ssp)? {
                eid::DtnSsp::None => Eid::Null,
                eid::DtnSsp::Api(path) => Eid::Api { path },
                eid::DtnSsp::Node { node_name, demux } => Eid::Dtn { node_name, demux },
                eid::DtnSsp::Cla {
                    scheme,
                    specific,
                    demux,
                } => self.cla_eid(scheme, specific, demux),
            }),
            "ipn" => eid::parse_ipn_ssp(ssp),
            _ => {
                let iana = self
                    .scheme_names
                    .get(scheme)
                    .ok_or_else(|| eid::Error::UnknownScheme(scheme.to_string()))?;
                let ext = self
                    .schemes
                    .get(iana)
                    .ok_or_else(|| eid::Error::UnknownScheme(scheme.to_string()))?;
                Ok(Eid::Ext {
                    iana: *iana,
                    scheme: ext.scheme.clone(),
                    ssp: (ext.parser)(ssp)?,
                })
            }
        }
    }

    fn cla_eid(&self, scheme: &str, specific: Box<str>, demux: Box<str>) -> Eid {
        let Some(parser) = self.cla_schemes.get(scheme) else {
            return Eid::Cla {
                scheme: scheme.into(),
                specific,
                demux,
            };
        };
        match parser(&specific) {
            Ok(specific) => Eid::Cla {
                scheme: scheme.into(),
                specific,
                demux,
            },
            Err(e) => {
                debug!("CLA scheme {scheme} rejected '{specific}': {e}");
                Eid::Dtn {
                    node_name: format!("[{scheme}:{specific}]").into(),
                    demux,
                }
            }
        }
    }

    /// The scheme name registered for an IANA scheme code
    pub(crate) fn eid_scheme(&self, iana: u64) -> Option<&str> {
        match iana {
            eid::DTN_IANA => Some("dtn"),
            eid::IPN_IANA => Some("ipn"),
            _ => self.schemes.get(&iana).map(|s| s.scheme.as_ref()),
        }
    }

    /// Whether blocks of this type are understood, built in or added
    pub fn is_known(&self, block_type: BlockType) -> bool {
        block_type.is_builtin() || self.blocks.contains_key(&u64::from(block_type))
    }

    /// Fresh data for a new block of `block_type`
    pub fn create_block_data(&self, block_type: BlockType) -> Result<BlockData, Error> {
        if let Some(data) = block_data::builtin_default(block_type) {
            return Ok(data);
        }
        let code = u64::from(block_type);
        self.blocks
            .get(&code)
            .map(|ext| BlockData::Extension((ext.constructor)()))
            .ok_or(Error::UnknownBlockType(code))
    }

    /// A parser for the data of a block of `block_type`.  Types that are
    /// neither built in nor added are parsed as opaque bytes.
    pub(crate) fn block_data_parser(
        self: &Arc<Self>,
        block_type: BlockType,
        len: Option<u64>,
        blobs: &dyn BlobFactory,
        max_size: u64,
    ) -> Result<Box<dyn BlockDataParser>, crate::Error> {
        match len {
            Some(len) if len > max_size && block_type != BlockType::Payload => {
                return Err(terra_cbor::decode::Error::TooLong(len, max_size).into());
            }
            _ => {}
        }
        if let Some(parser) = block_data::builtin_parser(self, block_type, len, blobs, max_size)? {
            return Ok(parser);
        }
        match self.blocks.get(&u64::from(block_type)) {
            Some(ext) => (ext.parser)(len),
            None => Ok(block_data::opaque_parser(max_size, BlockData::Unknown)),
        }
    }

    /// Encodes a block's data, except for a payload which is streamed
    pub(crate) fn serialize_block_data(
        &self,
        block_type: BlockType,
        data: &BlockData,
    ) -> Result<Vec<u8>, Error> {
        if let Some(data) = block_data::serialize_builtin(data) {
            return Ok(data);
        }
        let code = u64::from(block_type);
        match (data, self.blocks.get(&code)) {
            (BlockData::Extension(ext), Some(entry)) => Ok((entry.serializer)(ext.as_ref())),
            _ => Err(Error::UnknownBlockType(code)),
        }
    }

    /// The processor for `block_type`
    pub fn processor(&self, block_type: BlockType) -> Result<&dyn BlockProcessor, Error> {
        match block_type {
            BlockType::Payload
            | BlockType::Manifest
            | BlockType::FlowLabel
            | BlockType::Routing => Ok(&PAYLOAD),
            BlockType::PreviousNode => Ok(&PREVIOUS_NODE),
            BlockType::BundleAge => Ok(&BUNDLE_AGE),
            BlockType::HopCount | BlockType::ScopeControlHopLimit => Ok(&HOP_COUNT),
            block_type => {
                let code = u64::from(block_type);
                self.blocks
                    .get(&code)
                    .map(|ext| ext.processor.as_ref())
                    .ok_or(Error::ProcessorNotFound(code))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Priority(u64);

    impl ExtensionData for Priority {}

    struct PriorityProcessor;

    impl BlockProcessor for PriorityProcessor {}

    fn add_priority(registry: &mut ExtensionRegistry, code: u64) -> Result<(), Error> {
        registry.add_extension_block(
            code,
            || Box::new(Priority::default()),
            |_| {
                Ok(Box::new(block_data::CborBlockParser::uint(|v| {
                    Ok(BlockData::Extension(Box::new(Priority(v))))
                })) as Box<dyn BlockDataParser>)
            },
            |data| {
                let p = data.downcast_ref::<Priority>().map_or(0, |p| p.0);
                terra_cbor::encode::emit(&p)
            },
            Arc::new(PriorityProcessor),
        )
    }

    #[test]
    fn duplicates_rejected() {
        let mut registry = ExtensionRegistry::new();
        add_priority(&mut registry, 200).unwrap();
        assert!(matches!(
            add_priority(&mut registry, 200),
            Err(Error::AlreadyManaged(_))
        ));
        assert!(matches!(
            add_priority(&mut registry, 10),
            Err(Error::AlreadyManaged(_))
        ));

        registry
            .add_extension_eid(99, "xyz", |ssp| Ok(ssp.into()))
            .unwrap();
        assert!(registry.add_extension_eid(99, "abc", |ssp| Ok(ssp.into())).is_err());
        assert!(registry.add_extension_eid(98, "xyz", |ssp| Ok(ssp.into())).is_err());
        assert!(registry.add_extension_eid(2, "abc", |ssp| Ok(ssp.into())).is_err());
        assert!(registry.add_extension_eid(97, "dtn", |ssp| Ok(ssp.into())).is_err());

        registry
            .add_extension_cla_eid("tcp", |s| Ok(s.into()))
            .unwrap();
        assert!(registry.add_extension_cla_eid("tcp", |s| Ok(s.into())).is_err());
    }

    #[test]
    fn lookups() {
        let mut registry = ExtensionRegistry::new();
        add_priority(&mut registry, 200).unwrap();

        assert!(registry.processor(BlockType::HopCount).is_ok());
        assert!(registry.processor(BlockType::Unrecognised(200)).is_ok());
        assert_eq!(
            registry.processor(BlockType::Unrecognised(201)).err(),
            Some(Error::ProcessorNotFound(201))
        );

        assert!(matches!(
            registry.create_block_data(BlockType::Unrecognised(200)),
            Ok(BlockData::Extension(_))
        ));
        assert!(matches!(
            registry.create_block_data(BlockType::HopCount),
            Ok(BlockData::HopCount(_))
        ));
        assert_eq!(
            registry.create_block_data(BlockType::Unrecognised(201)).err(),
            Some(Error::UnknownBlockType(201))
        );
        assert!(registry.is_known(BlockType::Unrecognised(200)));
        assert!(!registry.is_known(BlockType::Unrecognised(201)));
    }

    #[test]
    fn extension_schemes() {
        let mut registry = ExtensionRegistry::new();
        assert_eq!(
            registry.parse_eid("xyz:foo"),
            Err(eid::Error::UnknownScheme("xyz".into()))
        );

        registry
            .add_extension_eid(99, "xyz", |ssp| {
                if ssp.is_empty() {
                    Err(eid::Error::malformed("xyz", "empty"))
                } else {
                    Ok(ssp.to_ascii_lowercase().into())
                }
            })
            .unwrap();
        let eid = registry.parse_eid("xyz:FOO").unwrap();
        assert_eq!(eid.to_string(), "xyz:foo");
        assert_eq!(eid.iana(), 99);
        assert_eq!(registry.parse_eid(&eid.to_string()).unwrap(), eid);
        assert!(registry.parse_eid("xyz:").is_err());

        let registry = Arc::new(registry);
        let data = terra_cbor::encode::emit(&eid);
        assert_eq!(registry.eid_from_cbor(&data).unwrap(), eid);
    }

    #[test]
    fn cla_schemes() {
        let mut registry = ExtensionRegistry::new();
        let generic = registry.parse_eid("dtn://[tcp:Host:4556]/in").unwrap();
        assert_eq!(generic, Eid::cla("tcp", "Host:4556", "in").unwrap());

        registry
            .add_extension_cla_eid("tcp", |s| {
                if s.contains(':') {
                    Ok(s.to_ascii_lowercase().into())
                } else {
                    Err(eid::Error::malformed("tcp", "missing port"))
                }
            })
            .unwrap();
        assert_eq!(
            registry.parse_eid("dtn://[tcp:Host:4556]/in").unwrap(),
            Eid::cla("tcp", "host:4556", "in").unwrap()
        );
        assert_eq!(
            registry.parse_eid("dtn://[tcp:host]/in").unwrap(),
            Eid::dtn("[tcp:host]", "in").unwrap()
        );
    }
}
