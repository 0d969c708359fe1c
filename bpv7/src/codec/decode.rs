use super::*;
use block_data::BlockDataParser;
use core::time::Duration;
use terra_cbor::decode::{
    Array, BoxedItem, ByteSink, ByteStream, Bytes as CborBytes, Custom, Item, Parser, Progress,
    Registers, Uint,
};

/// Limits applied while decoding
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecodeOptions {
    /// Largest accepted data of a non-payload block.  Payload size is left
    /// to the [`BlobFactory`].
    pub max_extension_size: u64,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_extension_size: 64 * 1024,
        }
    }
}

struct Context {
    registry: Arc<ExtensionRegistry>,
    blobs: Arc<dyn BlobFactory>,
    options: DecodeOptions,
}

/// Reports failures of the wrapped item as failures of a named field
struct Field<I> {
    name: &'static str,
    item: I,
}

impl<R, I> Item<R, Error> for Field<I>
where
    I: Item<R, Error>,
{
    fn parse(&mut self, input: &mut &[u8], regs: &mut R) -> Result<Progress, Error> {
        self.item.parse(input, regs).map_err(|e| match e {
            e @ Error::InvalidField { .. } => e,
            e => Error::InvalidField {
                field: self.name,
                source: e.into(),
            },
        })
    }
}

fn field<R, I>(name: &'static str, item: I) -> BoxedItem<R, Error>
where
    I: Item<R, Error> + 'static,
{
    Box::new(Field { name, item })
}

fn uint<R>(f: fn(&mut R, u64) -> Result<(), Error>) -> BoxedItem<R, Error>
where
    R: Registers + 'static,
{
    Box::new(Uint::new(move |r: &mut R, v| f(r, v)))
}

fn eid_field<R>(
    name: &'static str,
    registry: &Arc<ExtensionRegistry>,
    set: fn(&mut R, Eid),
) -> BoxedItem<R, Error>
where
    R: Registers + 'static,
{
    field(
        name,
        Custom::new(
            eid::eid_parser(registry),
            move |r: &mut R, e: eid::EidRegisters| -> Result<(), Error> {
                set(r, e.take()?);
                Ok(())
            },
        ),
    )
}

/// The CRC value, read as zeros by the tap
fn crc_field<R>(check: fn(&mut R, Vec<u8>) -> Result<(), Error>) -> BoxedItem<R, Error>
where
    R: Registers + 'static,
{
    field(
        "CRC value",
        CborBytes::new(move |r: &mut R, v: Vec<u8>| check(r, v))
            .with_limit(4)
            .masked(),
    )
}

fn arity(declared: u64, expected: u64) -> Result<(), Error> {
    match declared.cmp(&expected) {
        core::cmp::Ordering::Less => Err(terra_cbor::decode::Error::MissingItems(declared).into()),
        core::cmp::Ordering::Greater => Err(terra_cbor::decode::Error::AdditionalItems.into()),
        core::cmp::Ordering::Equal => Ok(()),
    }
}

#[derive(Default)]
struct PrimaryRegs {
    crc: CrcTap,
    primary: PrimaryBlock,
    fragment_offset: u64,
    crc_valid: Option<bool>,
}

impl Registers for PrimaryRegs {
    fn consumed(&mut self, data: &[u8]) {
        self.crc.update(data)
    }
}

impl PrimaryRegs {
    /// Number of items the primary block must have, once the flags and CRC
    /// type are known
    fn expected_len(&self) -> u64 {
        let mut len = 8;
        if self.primary.flags.is_fragment {
            len += 2;
        }
        if self.primary.crc_type != CrcType::None {
            len += 1;
        }
        len
    }
}

type PrimaryItem = BoxedItem<PrimaryRegs, Error>;

fn primary_parser(ctx: &Context) -> Parser<PrimaryRegs, Error> {
    let registry = ctx.registry.clone();
    let root = Array::with(
        move |r: &mut PrimaryRegs, index, len| -> Result<Option<PrimaryItem>, Error> {
            if index == 3 {
                if let Some(len) = len {
                    arity(len, r.expected_len())?;
                }
            }
            let fragment = r.primary.flags.is_fragment;
            let crc_index = if fragment { 10 } else { 8 };
            Ok(Some(match index {
                0 => uint(|_: &mut PrimaryRegs, v| {
                    if v != BUNDLE_PROTOCOL_VERSION {
                        return Err(Error::InvalidVersion(v));
                    }
                    Ok(())
                }),
                1 => uint(|r: &mut PrimaryRegs, v| {
                    r.primary.flags = v.into();
                    Ok(())
                }),
                2 => uint(|r: &mut PrimaryRegs, v| {
                    let crc_type = CrcType::try_from(v)?;
                    r.primary.crc_type = crc_type;
                    r.crc.start(crc_type);
                    Ok(())
                }),
                3 => eid_field("destination", &registry, |r: &mut PrimaryRegs, eid| {
                    r.primary.destination = eid
                }),
                4 => eid_field("source", &registry, |r: &mut PrimaryRegs, eid| {
                    r.primary.source = eid
                }),
                5 => eid_field("report-to", &registry, |r: &mut PrimaryRegs, eid| {
                    r.primary.report_to = eid
                }),
                6 => field(
                    "creation timestamp",
                    Array::fixed(vec![
                        uint(|r: &mut PrimaryRegs, t| {
                            r.primary.timestamp.creation_time = (t != 0).then(|| DtnTime::new(t));
                            Ok(())
                        }),
                        uint(|r: &mut PrimaryRegs, seq| {
                            r.primary.timestamp.sequence_number = seq;
                            Ok(())
                        }),
                    ]),
                ),
                7 => uint(|r: &mut PrimaryRegs, v| {
                    r.primary.lifetime = Duration::from_millis(v);
                    Ok(())
                }),
                8 if fragment => uint(|r: &mut PrimaryRegs, offset| {
                    r.fragment_offset = offset;
                    Ok(())
                }),
                9 if fragment => uint(|r: &mut PrimaryRegs, total_len| {
                    if r.fragment_offset >= total_len {
                        return Err(Error::InvalidFragmentInfo(r.fragment_offset, total_len));
                    }
                    r.primary.fragment_info = Some(FragmentInfo {
                        offset: r.fragment_offset,
                        total_len,
                    });
                    Ok(())
                }),
                i if i == crc_index && r.primary.crc_type != CrcType::None => {
                    crc_field(|r: &mut PrimaryRegs, v| {
                        r.crc_valid = Some(r.crc.check(r.primary.crc_type, &v)?);
                        Ok(())
                    })
                }
                _ => return Ok(None),
            }))
        },
    )
    .on_close(|r: &mut PrimaryRegs, count| -> Result<(), Error> {
        arity(count, r.expected_len())?;
        let flags = &r.primary.flags;
        if flags.any_report_requested() && (flags.is_admin_record || r.primary.source.is_null()) {
            return Err(Error::InvalidFlags);
        }
        Ok(())
    });
    Parser::new(Box::new(root), PrimaryRegs::default())
}

/// Hands a block's data to the parser for its type as it arrives
#[derive(Default)]
struct DataSink {
    parser: Option<Box<dyn BlockDataParser>>,
    received: u64,
}

impl ByteSink<BlockRegs, Error> for DataSink {
    fn start(&mut self, r: &mut BlockRegs, len: Option<u64>) -> Result<(), Error> {
        self.parser = Some(r.ctx.registry.block_data_parser(
            r.block_type,
            len,
            r.ctx.blobs.as_ref(),
            r.ctx.options.max_extension_size,
        )?);
        Ok(())
    }

    fn chunk(&mut self, _: &mut BlockRegs, data: &[u8]) -> Result<(), Error> {
        self.received += data.len() as u64;
        match self.parser.as_mut() {
            Some(parser) => parser.feed(data),
            None => Err(terra_cbor::decode::Error::Finished.into()),
        }
    }

    fn end(&mut self, r: &mut BlockRegs) -> Result<(), Error> {
        let parser = self
            .parser
            .take()
            .ok_or(terra_cbor::decode::Error::Finished)?;
        r.data = Some(parser.finish()?);
        r.declared_len = Some(self.received);
        Ok(())
    }
}

struct BlockRegs {
    ctx: Arc<Context>,
    crc: CrcTap,
    block_type: BlockType,
    number: u64,
    flags: BlockFlags,
    crc_type: CrcType,
    data: Option<BlockData>,
    declared_len: Option<u64>,
    crc_valid: Option<bool>,
}

impl Registers for BlockRegs {
    fn consumed(&mut self, data: &[u8]) {
        self.crc.update(data)
    }
}

impl BlockRegs {
    fn new(ctx: Arc<Context>) -> Self {
        Self {
            ctx,
            crc: CrcTap::default(),
            block_type: BlockType::Primary,
            number: 0,
            flags: BlockFlags::default(),
            crc_type: CrcType::None,
            data: None,
            declared_len: None,
            crc_valid: None,
        }
    }

    fn expected_len(&self) -> u64 {
        if self.crc_type == CrcType::None { 5 } else { 6 }
    }

    fn into_block(self) -> Result<CanonicalBlock, Error> {
        let data = self
            .data
            .ok_or(terra_cbor::decode::Error::MissingItems(4))?;
        let mut block = CanonicalBlock::new(
            self.block_type,
            self.number,
            self.flags,
            self.crc_type,
            data,
        );
        block.declared_len = self.declared_len;
        if let Some(valid) = self.crc_valid {
            if !valid {
                debug!("Block {} has an incorrect CRC", self.number);
            }
            block.tags.set(tags::CRC_CHECK, TagValue::Bool(valid));
        }
        Ok(block)
    }
}

type BlockItem = BoxedItem<BlockRegs, Error>;

fn block_parser(ctx: &Arc<Context>) -> Parser<BlockRegs, Error> {
    let root = Array::with(
        |r: &mut BlockRegs, index, _| -> Result<Option<BlockItem>, Error> {
            Ok(Some(match index {
                0 => uint(|r: &mut BlockRegs, v| {
                    r.block_type = v.into();
                    if r.block_type == BlockType::Primary {
                        return Err(Error::InvalidBlockType(v));
                    }
                    Ok(())
                }),
                1 => uint(|r: &mut BlockRegs, v| {
                    if v == 0 {
                        return Err(Error::InvalidBlockNumber(v, r.block_type));
                    }
                    r.number = v;
                    Ok(())
                }),
                2 => uint(|r: &mut BlockRegs, v| {
                    r.flags = v.into();
                    Ok(())
                }),
                3 => uint(|r: &mut BlockRegs, v| {
                    let crc_type = CrcType::try_from(v)?;
                    r.crc_type = crc_type;
                    r.crc.start(crc_type);
                    Ok(())
                }),
                4 => field("block data", ByteStream::new(DataSink::default())),
                5 if r.crc_type != CrcType::None => crc_field(|r: &mut BlockRegs, v| {
                    r.crc_valid = Some(r.crc.check(r.crc_type, &v)?);
                    Ok(())
                }),
                _ => return Ok(None),
            }))
        },
    )
    .on_open(|_: &mut BlockRegs, len| -> Result<(), Error> {
        match len {
            Some(len) if len < 5 => Err(terra_cbor::decode::Error::MissingItems(len).into()),
            Some(len) if len > 6 => Err(terra_cbor::decode::Error::AdditionalItems.into()),
            _ => Ok(()),
        }
    })
    .on_close(|r: &mut BlockRegs, count| -> Result<(), Error> {
        arity(count, r.expected_len())
    });
    Parser::new(Box::new(root), BlockRegs::new(ctx.clone()))
}

struct BundleRegs {
    ctx: Arc<Context>,
    primary: Option<PrimaryBlock>,
    primary_crc_valid: Option<bool>,
    blocks: Vec<CanonicalBlock>,
    bundle: Option<Bundle>,
}

impl Registers for BundleRegs {}

type BundleItem = BoxedItem<BundleRegs, Error>;

fn bundle_parser(ctx: Arc<Context>) -> Parser<BundleRegs, Error> {
    let root = Array::with(
        |r: &mut BundleRegs, index, _| -> Result<Option<BundleItem>, Error> {
            Ok(Some(if index == 0 {
                field(
                    "primary block",
                    Custom::new(
                        primary_parser(&r.ctx),
                        |r: &mut BundleRegs, p: PrimaryRegs| -> Result<(), Error> {
                            r.primary = Some(p.primary);
                            r.primary_crc_valid = p.crc_valid;
                            Ok(())
                        },
                    ),
                )
            } else {
                field(
                    "canonical block",
                    Custom::new(
                        block_parser(&r.ctx),
                        |r: &mut BundleRegs, b: BlockRegs| -> Result<(), Error> {
                            r.blocks.push(b.into_block()?);
                            Ok(())
                        },
                    ),
                )
            }))
        },
    )
    .on_close(|r: &mut BundleRegs, _| -> Result<(), Error> {
        let primary = r
            .primary
            .take()
            .ok_or(terra_cbor::decode::Error::MissingItems(0))?;
        let mut bundle = Bundle::from_parts(primary, core::mem::take(&mut r.blocks))?;
        if let Some(valid) = r.primary_crc_valid {
            if !valid {
                debug!("Bundle {} has an incorrect primary block CRC", bundle.id());
            }
            bundle.tags.set(tags::CRC_CHECK, TagValue::Bool(valid));
        }
        r.bundle = Some(bundle);
        Ok(())
    });

    let regs = BundleRegs {
        ctx,
        primary: None,
        primary_crc_valid: None,
        blocks: Vec::new(),
        bundle: None,
    };
    Parser::new(Box::new(root), regs)
}

/// Decodes one bundle from bytes arriving in chunks of any size.
///
/// Running out of input is not an error: [`BundleDecoder::feed`] simply
/// returns no bundle yet, and the next chunk carries on where the last one
/// stopped.  After an error the decoder must be discarded.
pub struct BundleDecoder {
    parser: Parser<BundleRegs, Error>,
}

impl BundleDecoder {
    pub fn new(registry: Arc<ExtensionRegistry>, blobs: Arc<dyn BlobFactory>) -> Self {
        Self::with_options(registry, blobs, DecodeOptions::default())
    }

    pub fn with_options(
        registry: Arc<ExtensionRegistry>,
        blobs: Arc<dyn BlobFactory>,
        options: DecodeOptions,
    ) -> Self {
        Self::from_context(Arc::new(Context {
            registry,
            blobs,
            options,
        }))
    }

    fn from_context(ctx: Arc<Context>) -> Self {
        Self {
            parser: bundle_parser(ctx),
        }
    }

    /// Decodes as much of `chunk` as belongs to this bundle, returning the
    /// number of bytes used and, once its last byte has arrived, the bundle
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(Option<Bundle>, usize), Error> {
        match self.parser.feed(chunk)? {
            (Progress::NeedMore, used) => Ok((None, used)),
            (Progress::Complete, used) => {
                let bundle = self
                    .parser
                    .registers_mut()
                    .bundle
                    .take()
                    .ok_or(terra_cbor::decode::Error::Finished)?;
                Ok((Some(bundle), used))
            }
        }
    }
}

/// Decodes consecutive bundles from one byte stream.
///
/// Once an error has been returned the stream cannot be trusted to be at a
/// bundle boundary, and every later call fails.
pub struct StreamDecoder {
    ctx: Arc<Context>,
    current: Option<BundleDecoder>,
    poisoned: bool,
}

impl StreamDecoder {
    pub fn new(registry: Arc<ExtensionRegistry>, blobs: Arc<dyn BlobFactory>) -> Self {
        Self::with_options(registry, blobs, DecodeOptions::default())
    }

    pub fn with_options(
        registry: Arc<ExtensionRegistry>,
        blobs: Arc<dyn BlobFactory>,
        options: DecodeOptions,
    ) -> Self {
        Self {
            ctx: Arc::new(Context {
                registry,
                blobs,
                options,
            }),
            current: None,
            poisoned: false,
        }
    }

    /// Feeds the next chunk of the stream, returning every bundle it
    /// completes
    pub fn push(&mut self, mut chunk: &[u8]) -> Result<Vec<Bundle>, Error> {
        if self.poisoned {
            return Err(terra_cbor::decode::Error::Finished.into());
        }
        let mut bundles = Vec::new();
        while !chunk.is_empty() {
            let ctx = &self.ctx;
            let decoder = self
                .current
                .get_or_insert_with(|| BundleDecoder::from_context(ctx.clone()));
            match decoder.feed(chunk) {
                Ok((Some(bundle), used)) => {
                    bundles.push(bundle);
                    self.current = None;
                    chunk = &chunk[used..];
                }
                Ok((None, _)) => break,
                Err(e) => {
                    self.poisoned = true;
                    self.current = None;
                    return Err(e);
                }
            }
        }
        Ok(bundles)
    }

    /// `true` when no bundle is partly decoded
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && !self.poisoned
    }
}

/// Decodes a bundle that is entirely in `data`
pub fn parse(
    data: &[u8],
    registry: &Arc<ExtensionRegistry>,
    blobs: Arc<dyn BlobFactory>,
) -> Result<Bundle, Error> {
    let mut decoder = BundleDecoder::new(registry.clone(), blobs);
    match decoder.feed(data)? {
        (Some(bundle), used) if used == data.len() => Ok(bundle),
        (Some(_), _) => Err(Error::AdditionalData),
        (None, _) => Err(terra_cbor::decode::Error::NotEnoughData.into()),
    }
}
