use super::*;
use crate::{service::Delivery, storage::StoreOutcome};

enum Forwarded {
    Sent,
    Dropped,
    NoRoute(Bundle),
}

impl Dispatcher {
    /// Delivers, forwards or parks `bundle` until one of them sticks, or
    /// the bundle expires
    pub(super) async fn dispatch(self: &Arc<Self>, mut bundle: Bundle) {
        loop {
            if bundle.is_expired(DtnTime::now()) {
                return self.drop_bundle(bundle, ReasonCode::LifetimeExpired).await;
            }

            if self
                .pipeline
                .node_ids()
                .is_local(&bundle.primary.destination)
            {
                return self.deliver(bundle).await;
            }

            bundle = match self.forward(bundle).await {
                Forwarded::NoRoute(bundle) => bundle,
                Forwarded::Sent | Forwarded::Dropped => return,
            };

            bundle = match self.park(bundle).await {
                Some(bundle) => bundle,
                None => return,
            };
        }
    }

    #[instrument(skip_all)]
    async fn deliver(self: &Arc<Self>, bundle: Bundle) {
        let destination = bundle.primary.destination.clone();
        let primary = bundle.primary.clone();
        match self.registrar.deliver(&destination, bundle).await {
            Ok(Delivery::Accepted) => {
                trace!("Delivered bundle {} to {destination}", primary.id());
                metrics::counter!("bpa.bundle.delivered").increment(1);
                self.report(
                    &primary,
                    StatusAssertion::Delivered,
                    ReasonCode::NoAdditionalInformation,
                )
                .await;
            }
            Ok(Delivery::Declined(bundle)) => {
                debug!("Nothing accepted bundle {} for {destination}", primary.id());
                self.drop_bundle(bundle, ReasonCode::DestinationEndpointIDUnavailable)
                    .await;
            }
            Err(e) => {
                warn!("Delivery to {destination} failed: {e}");
                metrics::counter!("bpa.bundle.dropped", "reason" => "delivery failed").increment(1);
                self.report(
                    &primary,
                    StatusAssertion::Deleted,
                    ReasonCode::DestinationEndpointIDUnavailable,
                )
                .await;
            }
        }
    }

    /// Tries each next hop in turn
    #[instrument(skip_all)]
    async fn forward(self: &Arc<Self>, mut bundle: Bundle) -> Forwarded {
        let destination = bundle.primary.destination.clone();
        for address in self.routes.resolve_eid(&destination).await {
            let Some(channel) = self.links.lookup_channel(&address).await else {
                trace!("No open link to {address}");
                continue;
            };

            match self
                .pipeline
                .on_prepare_for_transmission(&mut bundle, &self.cancel_token)
            {
                Ok(reports) => self.send_reports(reports).await,
                Err(e) => {
                    self.rejected(bundle, e).await;
                    return Forwarded::Dropped;
                }
            }

            match channel.send_bundle(&bundle, &self.registry).await {
                Ok(len) => {
                    debug!("Sent bundle {} to {address}, {len} bytes", bundle.id());
                    metrics::counter!("bpa.bundle.forwarded").increment(1);
                    self.report(
                        &bundle.primary,
                        StatusAssertion::Forwarded,
                        ReasonCode::NoAdditionalInformation,
                    )
                    .await;
                    return Forwarded::Sent;
                }
                Err(e) => warn!("Failed to send bundle {} to {address}: {e}", bundle.id()),
            }
        }
        Forwarded::NoRoute(bundle)
    }

    /// Stores the bundle until a link comes up or its lifetime runs out,
    /// then takes it back out.  `None` if the bundle is gone.
    #[instrument(skip_all)]
    async fn park(self: &Arc<Self>, mut bundle: Bundle) -> Option<Bundle> {
        match self
            .pipeline
            .on_put_on_storage(&mut bundle, &self.cancel_token)
        {
            Ok(reports) => self.send_reports(reports).await,
            Err(e) => {
                self.rejected(bundle, e).await;
                return None;
            }
        }

        let id = bundle.id();
        let primary = bundle.primary.clone();
        let remaining = bundle.primary.remaining(DtnTime::now(), bundle.age());

        // Subscribe first, so a link coming up while storing is not missed
        let mut link_events = self.link_events.subscribe();
        match self.storage.store(bundle).await {
            Ok(StoreOutcome::Stored) => {
                debug!("Bundle {id} is waiting for a route");
                metrics::counter!("bpa.bundle.stored").increment(1);
            }
            Ok(StoreOutcome::Duplicate) => {
                debug!("Bundle {id} is already waiting for a route");
                return None;
            }
            Err(e) => {
                warn!("Failed to store bundle {id}: {e}");
                metrics::counter!("bpa.bundle.dropped", "reason" => "storage failed").increment(1);
                self.report(
                    &primary,
                    StatusAssertion::Deleted,
                    ReasonCode::DepletedStorage,
                )
                .await;
                return None;
            }
        }

        tokio::select! {
            _ = link_events.changed() => trace!("Link up, retrying bundle {id}"),
            _ = tokio::time::sleep(remaining) => trace!("Bundle {id} lifetime is up"),
            _ = self.cancel_token.cancelled() => return None,
        }

        let mut bundle = match self.storage.get(&id).await {
            Ok(Some(bundle)) => bundle,
            Ok(None) => {
                debug!("Bundle {id} has gone from storage");
                return None;
            }
            Err(e) => {
                error!("Failed to take bundle {id} from storage: {e}");
                return None;
            }
        };

        match self
            .pipeline
            .on_pull_from_storage(&mut bundle, &self.cancel_token)
        {
            Ok(reports) => {
                self.send_reports(reports).await;
                Some(bundle)
            }
            Err(e) => {
                self.rejected(bundle, e).await;
                None
            }
        }
    }
}
