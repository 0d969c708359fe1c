use super::*;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use terra_bpv7::{
    BlockData, BlockFlags, BlockType, BundleAge, CreationTimestamp, HopInfo, TagValue,
    VolatileBlob, block_data::CborBlockParser, builder::Builder, tags,
};

#[derive(Debug)]
struct Marker(u64);

impl terra_bpv7::ExtensionData for Marker {}

/// Asks for reprocessing `extra` times, then settles
struct Unsettled {
    calls: AtomicUsize,
    extra: usize,
}

impl BlockProcessor for Unsettled {
    fn on_reception_processing(
        &self,
        _bundle: &mut Bundle,
        _number: u64,
        _ctx: &ProcessingContext,
    ) -> Result<bool, ProcessingError> {
        Ok(self.calls.fetch_add(1, Ordering::SeqCst) < self.extra)
    }
}

#[derive(Default)]
struct Recorder(Mutex<Vec<u64>>);

impl BlockProcessor for Recorder {
    fn on_prepare_for_transmission(
        &self,
        _bundle: &mut Bundle,
        number: u64,
        _ctx: &ProcessingContext,
    ) -> Result<bool, ProcessingError> {
        self.0.lock().unwrap().push(number);
        Ok(false)
    }
}

struct Refuses;

impl BlockProcessor for Refuses {
    fn on_reception_processing(
        &self,
        _bundle: &mut Bundle,
        number: u64,
        _ctx: &ProcessingContext,
    ) -> Result<bool, ProcessingError> {
        Err(ProcessingError::NotProcessable(number))
    }
}

fn register(registry: &mut ExtensionRegistry, block_type: u64, processor: Arc<dyn BlockProcessor>) {
    registry
        .add_extension_block(
            block_type,
            || Box::new(Marker(0)),
            |_| {
                Ok(Box::new(CborBlockParser::uint(|v| {
                    Ok(BlockData::Extension(Box::new(Marker(v))))
                })) as Box<dyn terra_bpv7::block_data::BlockDataParser>)
            },
            |data| terra_cbor::encode::emit(&data.downcast_ref::<Marker>().map_or(0, |m| m.0)),
            processor,
        )
        .unwrap();
}

fn config() -> config::Config {
    let mut config = config::Config::default();
    config.node_ids = [Eid::ipn(1, 0)].as_slice().try_into().unwrap();
    config
}

fn pipeline(config: &config::Config) -> Pipeline {
    Pipeline::new(config, Arc::new(ExtensionRegistry::new()))
}

fn builder() -> Builder {
    let mut b = Builder::new();
    b.source(Eid::ipn(7, 1)).destination(Eid::ipn(2, 1));
    b
}

fn bundle() -> Bundle {
    builder().build(Box::new(VolatileBlob::from(b"hello".as_slice())))
}

fn rejected(r: Result<Vec<StatusReport>, Error>) -> Option<Rejection> {
    match r {
        Err(Error::Rejected(r)) => Some(r),
        _ => None,
    }
}

#[test]
fn accepts_valid_bundle() {
    let p = pipeline(&config());
    let cancel = CancellationToken::new();
    let mut b = bundle();
    assert!(p.on_deserialized(&mut b, &cancel).unwrap().is_empty());
    assert!(p.on_reception(&mut b, &cancel).unwrap().is_empty());
}

#[test]
fn expiry_is_checked_first() {
    let mut config = config();
    config.allow_anonymous = false;
    config.forwarding = false;
    let p = pipeline(&config);

    let mut b = builder();
    b.source(Eid::Null).lifetime(Duration::ZERO);
    let b = b.build(Box::new(VolatileBlob::from(b"x".as_slice())));
    assert_eq!(p.validate(&b, DtnTime::now()), Err(Rejection::Expired));
}

#[test]
fn age_decides_expiry_without_a_clock() {
    let p = pipeline(&config());
    let mut b = bundle();
    b.primary.timestamp = CreationTimestamp::new(0, 1);
    b.primary.lifetime = Duration::from_secs(10);
    b.add_block(
        BlockType::BundleAge,
        BlockFlags::default(),
        BlockData::BundleAge(BundleAge::new(11_000)),
    );
    assert_eq!(p.validate(&b, DtnTime::now()), Err(Rejection::Expired));
}

#[test]
fn policy_rejections() {
    let now = DtnTime::now();

    let mut config = config();
    config.forwarding = false;
    let p = pipeline(&config);
    assert_eq!(p.validate(&bundle(), now), Err(Rejection::ForwardingDisabled));
    let mut b = bundle();
    b.primary.destination = Eid::ipn(1, 5);
    assert_eq!(p.validate(&b, now), Ok(()));

    let mut config = self::config();
    config.singleton_only = true;
    let p = pipeline(&config);
    let mut b = bundle();
    b.primary.destination = Eid::dtn("node", "~group").unwrap();
    assert_eq!(p.validate(&b, now), Err(Rejection::NotSingleton));

    let mut config = self::config();
    config.allow_anonymous = false;
    let p = pipeline(&config);
    let mut b = bundle();
    b.primary.source = Eid::Null;
    assert_eq!(p.validate(&b, now), Err(Rejection::AnonymousSource));

    let p = pipeline(&self::config());
    let mut b = bundle();
    b.primary.lifetime = Duration::from_secs(31 * 24 * 60 * 60);
    assert_eq!(p.validate(&b, now), Err(Rejection::LifetimeTooLong));

    let mut b = bundle();
    b.primary.timestamp = CreationTimestamp::new(now.millisecs() + 3_600_000, 0);
    assert_eq!(p.validate(&b, now), Err(Rejection::FutureTimestamp));

    let mut config = self::config();
    config.max_block_size = 4;
    let p = pipeline(&config);
    assert_eq!(p.validate(&bundle(), now), Err(Rejection::BlockTooLarge(1)));
}

#[test]
fn crc_mismatch() {
    let p = pipeline(&config());
    let mut b = bundle();
    b.block_mut(1)
        .unwrap()
        .tags
        .set(tags::CRC_CHECK, TagValue::Bool(false));
    assert_eq!(p.validate(&b, DtnTime::now()), Err(Rejection::CrcMismatch));

    let mut b = bundle();
    b.tags.set(tags::CRC_CHECK, TagValue::Bool(true));
    assert_eq!(p.validate(&b, DtnTime::now()), Ok(()));
}

#[test]
fn mandatory_unknown_block() {
    let p = pipeline(&config());
    let cancel = CancellationToken::new();

    let mut b = bundle();
    let n = b.add_block(
        BlockType::Unrecognised(200),
        BlockFlags {
            delete_bundle_on_failure: true,
            ..Default::default()
        },
        BlockData::Unknown(Bytes::from_static(&[0x01])),
    );
    assert_eq!(
        rejected(p.on_deserialized(&mut b, &cancel)),
        Some(Rejection::MandatoryBlockUnsupported(n))
    );

    // Without the flag the block is carried, marked as unprocessed
    let mut b = bundle();
    let n = b.add_block(
        BlockType::Unrecognised(200),
        BlockFlags::default(),
        BlockData::Unknown(Bytes::from_static(&[0x01])),
    );
    assert!(p.on_deserialized(&mut b, &cancel).is_ok());
    assert!(p.on_reception(&mut b, &cancel).unwrap().is_empty());
    assert!(b.block(n).unwrap().flags.forwarded_unprocessed);
}

#[test]
fn unknown_block_discarded() {
    let p = pipeline(&config());
    let cancel = CancellationToken::new();
    let mut b = bundle();
    let n = b.add_block(
        BlockType::Unrecognised(200),
        BlockFlags {
            delete_block_on_failure: true,
            ..Default::default()
        },
        BlockData::Unknown(Bytes::from_static(&[0x01])),
    );
    p.on_reception(&mut b, &cancel).unwrap();
    assert!(b.block(n).is_none());
    assert_eq!(b.block_numbers(), [1]);
}

#[test]
fn unprocessable_block_reports() {
    let mut registry = ExtensionRegistry::new();
    register(&mut registry, 210, Arc::new(Refuses));
    let p = Pipeline::new(&config(), Arc::new(registry));
    let cancel = CancellationToken::new();

    let mut b = bundle();
    let n = b.add_block(
        BlockType::Unrecognised(210),
        BlockFlags {
            report_on_failure: true,
            ..Default::default()
        },
        BlockData::Extension(Box::new(Marker(1))),
    );
    let reports = p.on_reception(&mut b, &cancel).unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].assertion, StatusAssertion::Received);
    assert_eq!(reports[0].reason, ReasonCode::BlockUnsupported);
    assert_eq!(reports[0].report_to, Eid::ipn(7, 1));
    assert!(b.block(n).unwrap().flags.forwarded_unprocessed);

    let mut b = bundle();
    let n = b.add_block(
        BlockType::Unrecognised(210),
        BlockFlags {
            delete_bundle_on_failure: true,
            ..Default::default()
        },
        BlockData::Extension(Box::new(Marker(1))),
    );
    assert_eq!(
        rejected(p.on_reception(&mut b, &cancel)),
        Some(Rejection::BlockUnprocessable(n))
    );
}

#[test]
fn hop_limit() {
    let p = pipeline(&config());
    let cancel = CancellationToken::new();
    let mut b = bundle();
    b.add_block(
        BlockType::HopCount,
        BlockFlags::default(),
        BlockData::HopCount(HopInfo::new(1)),
    );
    assert!(p.on_reception(&mut b, &cancel).is_ok());
    assert_eq!(
        rejected(p.on_reception(&mut b, &cancel)),
        Some(Rejection::HopLimitExceeded)
    );
}

#[test]
fn one_hop_per_reception() {
    let mut registry = ExtensionRegistry::new();
    register(
        &mut registry,
        220,
        Arc::new(Unsettled {
            calls: AtomicUsize::new(0),
            extra: 2,
        }),
    );
    let p = Pipeline::new(&config(), Arc::new(registry));

    let mut b = bundle();
    b.add_block(
        BlockType::HopCount,
        BlockFlags::default(),
        BlockData::HopCount(HopInfo::new(10)),
    );
    b.add_block(
        BlockType::Unrecognised(220),
        BlockFlags::default(),
        BlockData::Extension(Box::new(Marker(0))),
    );
    assert!(p.on_reception(&mut b, &CancellationToken::new()).is_ok());
    assert_eq!(b.hop_info().map(|h| h.count), Some(1));
}

#[test]
fn reprocessing_is_bounded() {
    let unsettled = Arc::new(Unsettled {
        calls: AtomicUsize::new(0),
        extra: usize::MAX,
    });
    let mut registry = ExtensionRegistry::new();
    register(&mut registry, 220, unsettled.clone());
    let mut config = config();
    config.max_reprocessing_passes = 3;
    let p = Pipeline::new(&config, Arc::new(registry));

    let mut b = bundle();
    b.add_block(
        BlockType::Unrecognised(220),
        BlockFlags::default(),
        BlockData::Extension(Box::new(Marker(0))),
    );
    assert_eq!(
        rejected(p.on_reception(&mut b, &CancellationToken::new())),
        Some(Rejection::ReprocessingLimit)
    );
    assert_eq!(unsettled.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn reprocessing_settles() {
    let unsettled = Arc::new(Unsettled {
        calls: AtomicUsize::new(0),
        extra: 2,
    });
    let mut registry = ExtensionRegistry::new();
    register(&mut registry, 220, unsettled.clone());
    let p = Pipeline::new(&config(), Arc::new(registry));

    let mut b = bundle();
    b.add_block(
        BlockType::Unrecognised(220),
        BlockFlags::default(),
        BlockData::Extension(Box::new(Marker(0))),
    );
    assert!(p.on_reception(&mut b, &CancellationToken::new()).is_ok());
    assert_eq!(unsettled.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn block_number_order() {
    let recorder = Arc::new(Recorder::default());
    let mut registry = ExtensionRegistry::new();
    register(&mut registry, 230, recorder.clone());
    let p = Pipeline::new(&config(), Arc::new(registry));

    let mut b = bundle();
    for i in 0..3 {
        b.add_block(
            BlockType::Unrecognised(230),
            BlockFlags::default(),
            BlockData::Extension(Box::new(Marker(i))),
        );
    }
    b.remove_block(3).unwrap();
    b.add_block(
        BlockType::Unrecognised(230),
        BlockFlags::default(),
        BlockData::Extension(Box::new(Marker(9))),
    );
    p.on_prepare_for_transmission(&mut b, &CancellationToken::new())
        .unwrap();
    assert_eq!(*recorder.0.lock().unwrap(), [2, 4, 5]);
}

#[test]
fn cancellation() {
    let p = pipeline(&config());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut b = bundle();
    assert!(matches!(
        p.on_reception(&mut b, &cancel),
        Err(Error::Cancelled)
    ));
}
