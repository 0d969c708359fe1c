use std::sync::Arc;
use terra_bpv7::{block_data::*, builder::Builder, codec::*, *};

#[derive(Debug, PartialEq)]
struct Priority(u64);

impl ExtensionData for Priority {}

struct PriorityProcessor;

impl BlockProcessor for PriorityProcessor {}

fn registry() -> Arc<ExtensionRegistry> {
    let mut registry = ExtensionRegistry::new();
    registry
        .add_extension_block(
            193,
            || Box::new(Priority(0)),
            |_| {
                Ok(Box::new(CborBlockParser::uint(|v| {
                    Ok(BlockData::Extension(Box::new(Priority(v))))
                })) as Box<dyn BlockDataParser>)
            },
            |data| {
                let p = data.downcast_ref::<Priority>().map_or(0, |p| p.0);
                terra_cbor::encode::emit(&p)
            },
            Arc::new(PriorityProcessor),
        )
        .unwrap();
    Arc::new(registry)
}

fn bundle(payload: &[u8]) -> Bundle {
    let mut b = Builder::new();
    b.source("dtn://source/".parse().unwrap())
        .destination("ipn:5.12".parse().unwrap())
        .report_to(Eid::Null)
        .add_extension_block(BlockType::BundleAge, BlockData::BundleAge(BundleAge::new(0)))
        .build()
        .add_extension_block(BlockType::HopCount, BlockData::HopCount(HopInfo::new(10)))
        .build()
        .add_extension_block(
            BlockType::Unrecognised(193),
            BlockData::Extension(Box::new(Priority(3))),
        )
        .delete_bundle_on_failure(true)
        .build();
    b.build(Box::new(VolatileBlob::from(payload)))
}

#[test]
fn encode_then_decode() {
    let registry = registry();
    let payload = b"0123456789012345678901234567890123456789";
    let original = bundle(payload);

    let mut decoder =
        StreamDecoder::new(registry.clone(), Arc::new(VolatileBlobFactory::default()));
    let mut decoded = Vec::new();
    for chunk in original.serialize(&registry) {
        decoded.extend(decoder.push(&chunk.unwrap()).unwrap());
    }
    assert!(decoder.is_idle());
    let [decoded] = <[Bundle; 1]>::try_from(decoded).unwrap();

    assert_eq!(decoded.id(), original.id());
    assert_eq!(decoded.primary.destination, Eid::ipn(5, 12));
    assert_eq!(decoded.payload().unwrap().to_vec(), payload);
    assert_eq!(decoded.hop_info(), Some(HopInfo::new(10)));
    assert_eq!(
        decoded
            .find_block(BlockType::Unrecognised(193))
            .and_then(|b| b.data.as_extension::<Priority>()),
        Some(&Priority(3))
    );
    assert_eq!(
        decoded.tags.get(tags::CRC_CHECK),
        Some(&TagValue::Bool(true))
    );
    assert!(
        decoded
            .blocks()
            .iter()
            .all(|b| b.tags.get(tags::CRC_CHECK) == Some(&TagValue::Bool(true)))
    );
}

#[test]
fn unregistered_extension_passes_through() {
    let registry = registry();
    let data = bundle(b"payload").to_vec(&registry).unwrap();

    // A node that does not know block type 193 keeps it as raw bytes
    let plain = Arc::new(ExtensionRegistry::new());
    let decoded = parse(&data, &plain, Arc::new(VolatileBlobFactory::default())).unwrap();
    let block = decoded.find_block(BlockType::Unrecognised(193)).unwrap();
    assert!(matches!(&block.data, BlockData::Unknown(b) if b[..] == [0x03]));
    assert!(block.flags.delete_bundle_on_failure);
    assert!(!plain.is_known(block.block_type));

    assert_eq!(decoded.to_vec(&plain).unwrap(), data);
}

#[test]
fn bundle_id_keys() {
    let registry = registry();
    let original = bundle(b"x");
    let key = original.id().to_key();
    assert_eq!(BundleId::from_key(&key, &registry).unwrap(), original.id());

    let json = serde_json::to_string(&original.id()).unwrap();
    let id: BundleId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, original.id());
}
