/*!
Parsing and serializing block-type-specific data.

The codec hands the content of each block's data byte string to a
[`BlockDataParser`] chunk by chunk, so no block needs to be held in one
buffer before it is understood.  Payloads go straight into a blob.
*/

use super::*;
use bytes::Bytes;
use std::sync::Arc;
use terra_cbor::decode::{Array, BoxedItem, Parser, Progress, Registers, Uint};

/// Receives the content of one block's data, in order
pub trait BlockDataParser: Send {
    fn feed(&mut self, data: &[u8]) -> Result<(), Error>;

    fn finish(self: Box<Self>) -> Result<BlockData, Error>;
}

/// Registers holding a single value
#[derive(Debug, Default)]
pub struct Slot<T>(pub T);

impl<T> Registers for Slot<T> {}

type Finish<R> = Box<dyn FnOnce(R) -> Result<BlockData, Error> + Send>;

/// Block data that is exactly one CBOR item, parsed by a resumable
/// [`Parser`]
pub struct CborBlockParser<R> {
    parser: Parser<R, Error>,
    complete: bool,
    finish: Finish<R>,
}

impl<R> CborBlockParser<R>
where
    R: Registers + Send + 'static,
{
    pub fn new(
        parser: Parser<R, Error>,
        finish: impl FnOnce(R) -> Result<BlockData, Error> + Send + 'static,
    ) -> Self {
        Self {
            parser,
            complete: false,
            finish: Box::new(finish),
        }
    }
}

impl CborBlockParser<Slot<u64>> {
    /// Data that is a single unsigned integer
    pub fn uint(finish: impl FnOnce(u64) -> Result<BlockData, Error> + Send + 'static) -> Self {
        let root = Uint::new(|r: &mut Slot<u64>, v| -> Result<(), Error> {
            r.0 = v;
            Ok(())
        });
        Self::new(Parser::new(Box::new(root), Slot::default()), move |r| {
            finish(r.0)
        })
    }
}

impl<R> BlockDataParser for CborBlockParser<R>
where
    R: Registers + Send,
{
    fn feed(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.complete {
            return if data.is_empty() {
                Ok(())
            } else {
                Err(Error::AdditionalData)
            };
        }
        let (progress, used) = self.parser.feed(data)?;
        if let Progress::Complete = progress {
            self.complete = true;
            if used < data.len() {
                return Err(Error::AdditionalData);
            }
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<BlockData, Error> {
        if !self.complete {
            return Err(terra_cbor::decode::Error::NotEnoughData.into());
        }
        let this = *self;
        (this.finish)(this.parser.into_registers())
    }
}

/// Collects the data as uninterpreted bytes, up to `max_size`
struct OpaqueParser {
    buf: Vec<u8>,
    max_size: u64,
    wrap: fn(Bytes) -> BlockData,
}

impl BlockDataParser for OpaqueParser {
    fn feed(&mut self, data: &[u8]) -> Result<(), Error> {
        let len = (self.buf.len() + data.len()) as u64;
        if len > self.max_size {
            return Err(terra_cbor::decode::Error::TooLong(len, self.max_size).into());
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<BlockData, Error> {
        Ok((self.wrap)(self.buf.into()))
    }
}

pub(crate) fn opaque_parser(
    max_size: u64,
    wrap: fn(Bytes) -> BlockData,
) -> Box<dyn BlockDataParser> {
    Box::new(OpaqueParser {
        buf: Vec::new(),
        max_size,
        wrap,
    })
}

struct PayloadParser {
    sink: Box<dyn BlobSink>,
}

impl BlockDataParser for PayloadParser {
    fn feed(&mut self, data: &[u8]) -> Result<(), Error> {
        self.sink.write(data).map_err(Into::into)
    }

    fn finish(self: Box<Self>) -> Result<BlockData, Error> {
        Ok(BlockData::Payload(self.sink.finish()?))
    }
}

fn hop_parser(wrap: fn(HopInfo) -> BlockData) -> Box<dyn BlockDataParser> {
    let root = Array::fixed(vec![
        Box::new(Uint::new(|r: &mut Slot<HopInfo>, limit| -> Result<(), Error> {
            r.0.limit = limit;
            Ok(())
        })) as BoxedItem<Slot<HopInfo>, Error>,
        Box::new(Uint::new(|r: &mut Slot<HopInfo>, count| -> Result<(), Error> {
            r.0.count = count;
            Ok(())
        })),
    ]);
    Box::new(CborBlockParser::new(
        Parser::new(Box::new(root), Slot::default()),
        move |r| Ok(wrap(r.0)),
    ))
}

pub(crate) fn builtin_parser(
    registry: &Arc<ExtensionRegistry>,
    block_type: BlockType,
    len: Option<u64>,
    blobs: &dyn BlobFactory,
    max_size: u64,
) -> Result<Option<Box<dyn BlockDataParser>>, Error> {
    let parser: Box<dyn BlockDataParser> = match block_type {
        BlockType::Payload => Box::new(PayloadParser {
            sink: blobs.create_blob(len)?,
        }),
        BlockType::PreviousNode => Box::new(CborBlockParser::new(
            eid::eid_parser(registry),
            |r: eid::EidRegisters| Ok(BlockData::PreviousNode(r.take()?)),
        )),
        BlockType::BundleAge => Box::new(CborBlockParser::uint(|millisecs| {
            Ok(BlockData::BundleAge(BundleAge::new(millisecs)))
        })),
        BlockType::HopCount => hop_parser(BlockData::HopCount),
        BlockType::ScopeControlHopLimit => hop_parser(BlockData::ScopeControlHopLimit),
        BlockType::Manifest => opaque_parser(max_size, BlockData::Manifest),
        BlockType::Routing => opaque_parser(max_size, BlockData::Routing),
        BlockType::FlowLabel => opaque_parser(max_size, BlockData::FlowLabel),
        BlockType::Primary | BlockType::Unrecognised(_) => return Ok(None),
    };
    Ok(Some(parser))
}

pub(crate) fn builtin_default(block_type: BlockType) -> Option<BlockData> {
    Some(match block_type {
        BlockType::Payload => BlockData::payload(Vec::new()),
        BlockType::PreviousNode => BlockData::PreviousNode(Eid::Null),
        BlockType::BundleAge => BlockData::BundleAge(BundleAge::new(0)),
        BlockType::HopCount => BlockData::HopCount(HopInfo::default()),
        BlockType::ScopeControlHopLimit => BlockData::ScopeControlHopLimit(HopInfo::default()),
        BlockType::Manifest => BlockData::Manifest(Bytes::new()),
        BlockType::Routing => BlockData::Routing(Bytes::new()),
        BlockType::FlowLabel => BlockData::FlowLabel(Bytes::new()),
        BlockType::Primary | BlockType::Unrecognised(_) => return None,
    })
}

/// `None` for extension data, which only its registered serializer knows
pub(crate) fn serialize_builtin(data: &BlockData) -> Option<Vec<u8>> {
    Some(match data {
        BlockData::Payload(blob) => blob.to_vec(),
        BlockData::PreviousNode(eid) => terra_cbor::encode::emit(eid),
        BlockData::BundleAge(age) => terra_cbor::encode::emit(&age.millisecs()),
        BlockData::HopCount(hop) | BlockData::ScopeControlHopLimit(hop) => {
            terra_cbor::encode::emit_array(Some(2), |a| {
                a.emit(&hop.limit);
                a.emit(&hop.count);
            })
        }
        BlockData::Manifest(b)
        | BlockData::Routing(b)
        | BlockData::FlowLabel(b)
        | BlockData::Unknown(b) => b.to_vec(),
        BlockData::Extension(_) => return None,
    })
}
