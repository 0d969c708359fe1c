use super::*;
use bytes::Bytes;
use crate::crc::{Digest, append_crc_value};
use terra_cbor::encode::{Encoder, Major};

fn encode_primary(primary: &PrimaryBlock) -> Vec<u8> {
    let mut flags = primary.flags;
    flags.is_fragment = primary.fragment_info.is_some();

    let mut count = 8;
    if primary.fragment_info.is_some() {
        count += 2;
    }
    if primary.crc_type != CrcType::None {
        count += 1;
    }

    let mut encoder = Encoder::new();
    encoder.emit_header(Major::Array, count);
    encoder.emit(&BUNDLE_PROTOCOL_VERSION);
    encoder.emit(&flags);
    encoder.emit(&primary.crc_type);
    encoder.emit(&primary.destination);
    encoder.emit(&primary.source);
    encoder.emit(&primary.report_to);
    encoder.emit(&primary.timestamp);
    encoder.emit(&primary.lifetime_millisecs());
    if let Some(fragment) = &primary.fragment_info {
        encoder.emit(&fragment.offset);
        encoder.emit(&fragment.total_len);
    }
    let mut data = encoder.build();

    let mut digest = primary.crc_type.digest();
    digest.update(&data);
    append_crc_value(primary.crc_type, &mut digest, &mut data);
    data
}

/// Everything of a canonical block up to and including the head of its
/// data byte string
fn block_head(block: &CanonicalBlock, data_len: u64) -> Vec<u8> {
    let mut encoder = Encoder::new();
    encoder.emit_header(
        Major::Array,
        if block.crc_type == CrcType::None { 5 } else { 6 },
    );
    encoder.emit(&block.block_type);
    encoder.emit(&block.number);
    encoder.emit(&block.flags);
    encoder.emit(&block.crc_type);
    encoder.emit_bytes_header(data_len);
    encoder.build()
}

fn encode_block(block: &CanonicalBlock, data: &[u8]) -> Vec<u8> {
    let mut out = block_head(block, data.len() as u64);
    out.extend_from_slice(data);
    let mut digest = block.crc_type.digest();
    digest.update(&out);
    append_crc_value(block.crc_type, &mut digest, &mut out);
    out
}

struct PayloadStream<'a> {
    chunks: Box<dyn Iterator<Item = Bytes> + Send + 'a>,
    digest: Digest,
    crc_type: CrcType,
}

enum State<'a> {
    Start,
    Blocks(usize),
    Payload(PayloadStream<'a>, usize),
    Done,
}

/// The encoded form of a bundle, produced piece by piece.
///
/// Payload content is yielded straight from its blob, so the whole bundle
/// is never held in one buffer.  Concatenating the chunks gives the bundle
/// as an indefinite-length CBOR array.
pub struct Chunks<'a> {
    bundle: &'a Bundle,
    registry: &'a ExtensionRegistry,
    state: State<'a>,
}

impl<'a> Chunks<'a> {
    fn new(bundle: &'a Bundle, registry: &'a ExtensionRegistry) -> Self {
        Self {
            bundle,
            registry,
            state: State::Start,
        }
    }

    fn next_block(&mut self, index: usize) -> Result<Bytes, Error> {
        let bundle = self.bundle;
        let Some(block) = bundle.blocks().get(index) else {
            self.state = State::Done;
            return Ok(Bytes::from_static(&[0xFF]));
        };
        match &block.data {
            BlockData::Payload(blob) => {
                let head = block_head(block, blob.len());
                let mut digest = block.crc_type.digest();
                digest.update(&head);
                self.state = State::Payload(
                    PayloadStream {
                        chunks: blob.chunks(),
                        digest,
                        crc_type: block.crc_type,
                    },
                    index + 1,
                );
                Ok(head.into())
            }
            data => {
                let encoded = self
                    .registry
                    .serialize_block_data(block.block_type, data)?;
                self.state = State::Blocks(index + 1);
                Ok(encode_block(block, &encoded).into())
            }
        }
    }
}

impl Iterator for Chunks<'_> {
    type Item = Result<Bytes, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match core::mem::replace(&mut self.state, State::Done) {
            State::Start => {
                let mut start = vec![0x9F];
                start.extend(encode_primary(&self.bundle.primary));
                self.state = State::Blocks(0);
                Some(Ok(start.into()))
            }
            State::Blocks(index) => Some(self.next_block(index)),
            State::Payload(mut stream, next) => match stream.chunks.next() {
                Some(chunk) => {
                    stream.digest.update(&chunk);
                    self.state = State::Payload(stream, next);
                    Some(Ok(chunk))
                }
                None => {
                    let mut trailer = Vec::new();
                    append_crc_value(stream.crc_type, &mut stream.digest, &mut trailer);
                    self.state = State::Blocks(next);
                    if trailer.is_empty() {
                        self.next()
                    } else {
                        Some(Ok(trailer.into()))
                    }
                }
            },
            State::Done => None,
        }
    }
}

impl Bundle {
    /// Encodes the bundle lazily, see [`Chunks`]
    pub fn serialize<'a>(&'a self, registry: &'a ExtensionRegistry) -> Chunks<'a> {
        Chunks::new(self, registry)
    }

    /// Encodes the bundle into one buffer
    pub fn to_vec(&self, registry: &ExtensionRegistry) -> Result<Vec<u8>, Error> {
        let mut data = Vec::new();
        for chunk in self.serialize(registry) {
            data.extend_from_slice(&chunk?);
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn primary_without_crc() {
        let primary = PrimaryBlock {
            crc_type: CrcType::None,
            destination: Eid::ipn(2, 1),
            source: Eid::ipn(1, 1),
            report_to: Eid::Null,
            timestamp: CreationTimestamp::new(0, 0),
            lifetime: core::time::Duration::from_millis(1000),
            ..Default::default()
        };
        assert_eq!(
            encode_primary(&primary),
            hex!("88 07 00 00 82 02 82 02 01 82 02 82 01 01 82 01 00 82 00 00 19 03e8")
        );
    }

    #[test]
    fn payload_streamed() {
        let mut sink = VolatileBlobFactory::default().create_blob(None).unwrap();
        sink.write(b"ab").unwrap();
        sink.write(b"cd").unwrap();
        let primary = PrimaryBlock {
            crc_type: CrcType::None,
            timestamp: CreationTimestamp::new(1, 0),
            ..Default::default()
        };
        let bundle = Bundle::new(primary, sink.finish().unwrap());
        let registry = ExtensionRegistry::new();

        let chunks: Vec<Bytes> = bundle
            .serialize(&registry)
            .collect::<Result<_, _>>()
            .unwrap();
        // Start, block head, two payload chunks, break
        assert_eq!(chunks.len(), 5);
        assert_eq!(&chunks[1][..], hex!("85 01 01 00 00 44"));
        assert_eq!(&chunks[2][..], b"ab");
        assert_eq!(&chunks[4][..], [0xFF]);
    }

    #[test]
    fn extension_without_serializer() {
        #[derive(Debug)]
        struct Opaque;
        impl ExtensionData for Opaque {}

        let mut bundle = Bundle::new(
            PrimaryBlock {
                timestamp: CreationTimestamp::new(1, 0),
                ..Default::default()
            },
            Box::new(VolatileBlob::from(Vec::new())),
        );
        bundle.add_block(
            BlockType::Unrecognised(200),
            BlockFlags::default(),
            BlockData::Extension(Box::new(Opaque)),
        );
        assert!(matches!(
            bundle.to_vec(&ExtensionRegistry::new()),
            Err(Error::Registry(registry::Error::UnknownBlockType(200)))
        ));
    }
}
