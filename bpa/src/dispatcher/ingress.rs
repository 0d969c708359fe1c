use super::*;
use futures::{Stream, StreamExt};

impl Dispatcher {
    /// Decodes the bundles arriving on `bytes` in a task of its own, and
    /// processes each as it completes.  Ends with the stream, at the first
    /// malformed bundle, or at shutdown.
    pub fn receive_stream<S>(self: &Arc<Self>, bytes: S)
    where
        S: Stream<Item = Bytes> + Send + Unpin + 'static,
    {
        let d = self.clone();
        self.task_tracker.spawn(async move {
            let bundles = cla::recv_bundles(bytes, d.registry.clone(), d.blobs.clone());
            futures::pin_mut!(bundles);
            loop {
                let next = tokio::select! {
                    next = bundles.next() => next,
                    _ = d.cancel_token.cancelled() => break,
                };
                match next {
                    Some(Ok(bundle)) => {
                        if d.ingress.send_async(bundle).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Abandoning inbound stream: {e}");
                        break;
                    }
                    None => break,
                }
            }
        });
    }

    /// One complete bundle
    #[instrument(skip_all)]
    pub async fn receive_bundle(self: &Arc<Self>, data: Bytes) -> cla::Result<()> {
        match data.first() {
            None => return Err(cla::Error::Truncated),
            Some(0x06) => {
                trace!("Data looks like a BPv6 bundle");
                return Err(terra_bpv7::Error::InvalidVersion(6).into());
            }
            _ => {}
        }

        let bundle = terra_bpv7::codec::parse(&data, &self.registry, self.blobs.clone())?;
        self.ingress
            .send_async(bundle)
            .await
            .map_err(|_| cla::Error::Disconnected)
    }

    /// Accepts a bundle created on this node.  It is checked before this
    /// returns, then sent on its way in the background.
    pub fn submit(self: &Arc<Self>, bundle: Bundle) -> Result<BundleId, pipeline::Error> {
        if self.cancel_token.is_cancelled() {
            return Err(pipeline::Error::Cancelled);
        }
        self.pipeline.validate(&bundle, DtnTime::now())?;

        let id = bundle.id();
        metrics::counter!("bpa.bundle.originated").increment(1);
        let d = self.clone();
        self.task_tracker.spawn(async move { d.dispatch(bundle).await });
        Ok(id)
    }

    pub(super) async fn ingest(self: Arc<Self>, rx: flume::Receiver<Bundle>) {
        loop {
            let bundle = tokio::select! {
                r = rx.recv_async() => match r {
                    Ok(bundle) => bundle,
                    Err(_) => break,
                },
                _ = self.cancel_token.cancelled() => break,
            };

            let d = self.clone();
            self.task_tracker
                .spawn(async move { d.process_received(bundle).await });
        }
        trace!("Ingest loop finished");
    }

    #[instrument(skip_all)]
    async fn process_received(self: &Arc<Self>, mut bundle: Bundle) {
        metrics::counter!("bpa.bundle.received").increment(1);
        trace!("Received bundle {}", bundle.id());

        let reports = self
            .pipeline
            .on_deserialized(&mut bundle, &self.cancel_token)
            .and_then(|mut reports| {
                reports.extend(self.pipeline.on_reception(&mut bundle, &self.cancel_token)?);
                Ok(reports)
            });
        match reports {
            Ok(reports) => self.send_reports(reports).await,
            Err(e) => return self.rejected(bundle, e).await,
        }

        self.report(
            &bundle.primary,
            StatusAssertion::Received,
            ReasonCode::NoAdditionalInformation,
        )
        .await;
        self.dispatch(bundle).await
    }
}
