mod dispatch;
mod ingress;
mod report;

use super::*;
use crate::{
    cla::LinkLocalTable, pipeline::Pipeline, report::StatusReporter, routes::RoutingTable,
    service::Registrar, storage::Storage,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Moves bundles from arrival to delivery, transmission or storage.
///
/// Every bundle in flight is owned by exactly one task.  Must be created
/// inside a Tokio runtime.
pub struct Dispatcher {
    cancel_token: CancellationToken,
    task_tracker: TaskTracker,
    registry: Arc<ExtensionRegistry>,
    pipeline: Pipeline,
    blobs: Arc<dyn BlobFactory>,
    storage: Arc<dyn Storage>,
    routes: Arc<dyn RoutingTable>,
    links: Arc<dyn LinkLocalTable>,
    registrar: Arc<dyn Registrar>,
    reporter: Arc<dyn StatusReporter>,
    ingress: flume::Sender<Bundle>,
    link_events: tokio::sync::watch::Sender<u64>,

    // Config options
    status_reports: bool,
}

impl Dispatcher {
    pub fn new(
        config: &config::Config,
        registry: Arc<ExtensionRegistry>,
        routes: Arc<dyn RoutingTable>,
        links: Arc<dyn LinkLocalTable>,
        registrar: Arc<dyn Registrar>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Arc<Self> {
        describe_metrics();

        let (tx, rx) = flume::bounded(config.poll_channel_depth.into());
        let dispatcher = Arc::new(Self {
            cancel_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
            pipeline: Pipeline::new(config, registry.clone()),
            registry,
            blobs: config.blobs(),
            storage: config.storage(),
            routes,
            links,
            registrar,
            reporter,
            ingress: tx,
            link_events: tokio::sync::watch::Sender::new(0),
            status_reports: config.status_reports,
        });

        let d = dispatcher.clone();
        dispatcher
            .task_tracker
            .spawn(async move { d.ingest(rx).await });

        info!("Dispatcher started for {:?}", config.node_ids);
        dispatcher
    }

    /// Stops accepting work, cancels every task, and waits for them.
    /// Bundles waiting in storage stay there.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
        info!("Dispatcher stopped");
    }

    /// A link has come up: every bundle waiting for a route tries again
    pub fn link_up(&self) {
        self.link_events.send_modify(|generation| *generation += 1);
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }
}

fn describe_metrics() {
    metrics::describe_counter!("bpa.bundle.received", "Bundles received from peers");
    metrics::describe_counter!("bpa.bundle.originated", "Bundles submitted by local applications");
    metrics::describe_counter!("bpa.bundle.delivered", "Bundles delivered to local applications");
    metrics::describe_counter!("bpa.bundle.forwarded", "Bundles sent to a peer");
    metrics::describe_counter!("bpa.bundle.stored", "Bundles parked waiting for a route");
    metrics::describe_counter!("bpa.bundle.dropped", "Bundles dropped, with the reason");
}
