use std::sync::Arc;
use std::time::Duration;
use terra_bpa::{
    Bytes, Dispatcher, async_trait,
    cla::{self, ClaAddress, ClaChannel, Links},
    config::Config,
    routes::{Route, StaticRoutes},
    service::{Mailboxes, Registrar},
    storage::Storage,
};
use terra_bpv7::{
    Bundle, BundleFlags, Eid, ExtensionRegistry, ReasonCode, StatusAssertion, StatusReport,
    VolatileBlob, VolatileBlobFactory, builder::Builder,
};

const WAIT: Duration = Duration::from_secs(5);

/// Hands whatever is sent to the test
struct Channel(flume::Sender<Vec<u8>>);

#[async_trait]
impl ClaChannel for Channel {
    async fn send_bundle(
        &self,
        bundle: &Bundle,
        registry: &ExtensionRegistry,
    ) -> cla::Result<usize> {
        let data = bundle.to_vec(registry)?;
        let len = data.len();
        self.0
            .send_async(data)
            .await
            .map_err(|_| cla::Error::Disconnected)?;
        Ok(len)
    }
}

struct Node {
    dispatcher: Arc<Dispatcher>,
    registry: Arc<ExtensionRegistry>,
    routes: Arc<StaticRoutes>,
    links: Arc<Links>,
    apps: Arc<Mailboxes>,
    reports: flume::Receiver<StatusReport>,
}

fn peer() -> ClaAddress {
    ClaAddress::Tcp("192.0.2.5:4556".parse().unwrap())
}

fn node() -> Node {
    let mut config = Config::default();
    config.status_reports = true;
    config.node_ids = [Eid::ipn(1, 0)].as_slice().try_into().unwrap();

    let registry = Arc::new(ExtensionRegistry::new());
    let routes = Arc::new(StaticRoutes::default());
    routes.add(Route {
        to: Eid::ipn(5, 0),
        via: peer(),
        priority: 0,
    });
    let links = Arc::new(Links::default());
    let apps = Arc::new(Mailboxes::new(8));
    let (tx, reports) = flume::unbounded();

    let dispatcher = Dispatcher::new(
        &config,
        registry.clone(),
        routes.clone(),
        links.clone(),
        apps.clone(),
        Arc::new(tx),
    );
    Node {
        dispatcher,
        registry,
        routes,
        links,
        apps,
        reports,
    }
}

fn bundle(source: Eid, destination: Eid, flags: BundleFlags) -> Bundle {
    let mut b = Builder::new();
    b.source(source).destination(destination).flags(flags);
    b.build(Box::new(VolatileBlob::from(b"Hello, world".as_slice())))
}

async fn next<T>(rx: &flume::Receiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv_async())
        .await
        .expect("Timed out")
        .unwrap()
}

#[tokio::test]
async fn local_delivery() {
    let node = node();
    node.apps.register(Eid::ipn(1, 7), 1).await.unwrap();
    let inbox = node.apps.mailbox(&Eid::ipn(1, 7), 1).unwrap();

    let flags = BundleFlags {
        delivery_report_requested: true,
        ..Default::default()
    };
    let id = node
        .dispatcher
        .submit(bundle(Eid::ipn(1, 3), Eid::ipn(1, 7), flags))
        .unwrap();

    let delivered = next(&inbox).await;
    assert_eq!(delivered.id(), id);
    assert_eq!(delivered.payload().unwrap().to_vec(), b"Hello, world");

    let report = next(&node.reports).await;
    assert_eq!(report.assertion, StatusAssertion::Delivered);
    assert_eq!(report.bundle_id, id);

    node.dispatcher.shutdown().await;
}

#[tokio::test]
async fn forwarding() {
    let node = node();
    let (tx, sent) = flume::unbounded();
    node.links.add(peer(), Arc::new(Channel(tx)));

    let id = node
        .dispatcher
        .submit(bundle(Eid::ipn(1, 3), Eid::ipn(5, 12), BundleFlags::default()))
        .unwrap();

    let data = next(&sent).await;
    let forwarded = terra_bpv7::codec::parse(
        &data,
        &node.registry,
        Arc::new(VolatileBlobFactory::default()),
    )
    .unwrap();
    assert_eq!(forwarded.id(), id);
    assert_eq!(forwarded.primary.destination, Eid::ipn(5, 12));

    node.dispatcher.shutdown().await;
}

#[tokio::test]
async fn waits_for_link_up() {
    let node = node();
    let id = node
        .dispatcher
        .submit(bundle(Eid::ipn(1, 3), Eid::ipn(5, 12), BundleFlags::default()))
        .unwrap();

    let storage = node.dispatcher.storage().clone();
    tokio::time::timeout(WAIT, async {
        while !storage.contains(&id).await.unwrap() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Bundle was never stored");

    let (tx, sent) = flume::unbounded();
    node.links.add(peer(), Arc::new(Channel(tx)));
    node.dispatcher.link_up();

    let data = next(&sent).await;
    let forwarded = terra_bpv7::codec::parse(
        &data,
        &node.registry,
        Arc::new(VolatileBlobFactory::default()),
    )
    .unwrap();
    assert_eq!(forwarded.id(), id);
    assert!(!storage.contains(&id).await.unwrap());

    node.dispatcher.shutdown().await;
}

#[tokio::test]
async fn inbound_stream() {
    let node = node();
    node.apps.register(Eid::ipn(1, 7), 1).await.unwrap();
    let inbox = node.apps.mailbox(&Eid::ipn(1, 7), 1).unwrap();

    let flags = BundleFlags {
        receipt_report_requested: true,
        delivery_report_requested: true,
        ..Default::default()
    };
    let mut data = Vec::new();
    for seq in 0..2 {
        let mut b = bundle(Eid::ipn(2, 1), Eid::ipn(1, 7), flags);
        b.primary.timestamp.sequence_number = 100 + seq;
        data.extend(b.to_vec(&node.registry).unwrap());
    }
    let chunks: Vec<Bytes> = data.chunks(5).map(Bytes::copy_from_slice).collect();
    node.dispatcher
        .receive_stream(futures::stream::iter(chunks));

    for _ in 0..2 {
        assert_eq!(next(&inbox).await.primary.source, Eid::ipn(2, 1));
    }

    let mut assertions = Vec::new();
    for _ in 0..4 {
        let report = next(&node.reports).await;
        assert_eq!(report.report_to, Eid::ipn(2, 1));
        assertions.push(report.assertion);
    }
    assert_eq!(
        assertions
            .iter()
            .filter(|a| **a == StatusAssertion::Received)
            .count(),
        2
    );
    assert_eq!(
        assertions
            .iter()
            .filter(|a| **a == StatusAssertion::Delivered)
            .count(),
        2
    );

    node.dispatcher.shutdown().await;
}

#[tokio::test]
async fn expired_bundle_reported() {
    let node = node();
    let flags = BundleFlags {
        delete_report_requested: true,
        ..Default::default()
    };
    let mut b = Builder::new();
    b.source(Eid::ipn(2, 1))
        .destination(Eid::ipn(1, 7))
        .flags(flags)
        .lifetime(Duration::ZERO);
    let data = b
        .build(Box::new(VolatileBlob::from(b"late".as_slice())))
        .to_vec(&node.registry)
        .unwrap();

    node.dispatcher
        .receive_bundle(Bytes::from(data))
        .await
        .unwrap();

    let report = next(&node.reports).await;
    assert_eq!(report.assertion, StatusAssertion::Deleted);
    assert_eq!(report.reason, ReasonCode::LifetimeExpired);

    node.dispatcher.shutdown().await;
}

#[tokio::test]
async fn bpv6_refused() {
    let node = node();
    assert!(
        node.dispatcher
            .receive_bundle(Bytes::from_static(&[0x06, 0x00]))
            .await
            .is_err()
    );
    node.dispatcher.shutdown().await;
}

#[tokio::test]
async fn shutdown_leaves_parked_bundles() {
    let node = node();
    node.routes.remove(&Eid::ipn(5, 0));
    let id = node
        .dispatcher
        .submit(bundle(Eid::ipn(1, 3), Eid::ipn(5, 12), BundleFlags::default()))
        .unwrap();

    let storage = node.dispatcher.storage().clone();
    tokio::time::timeout(WAIT, async {
        while !storage.contains(&id).await.unwrap() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Bundle was never stored");

    tokio::time::timeout(WAIT, node.dispatcher.shutdown())
        .await
        .expect("Shutdown hung");
    assert!(storage.contains(&id).await.unwrap());

    assert!(matches!(
        node.dispatcher.submit(bundle(
            Eid::ipn(1, 3),
            Eid::ipn(5, 12),
            BundleFlags::default()
        )),
        Err(terra_bpa::pipeline::Error::Cancelled)
    ));
}
