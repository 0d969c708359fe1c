use super::*;

impl Dispatcher {
    /// Sends the report `primary` asked for, if any, and if reporting is on
    pub(super) async fn report(
        &self,
        primary: &PrimaryBlock,
        assertion: StatusAssertion,
        reason: ReasonCode,
    ) {
        if !self.status_reports {
            return;
        }
        if let Some(report) = StatusReport::for_bundle(primary, assertion, reason) {
            self.send_report(report).await
        }
    }

    /// Reports produced by block processing
    pub(super) async fn send_reports(&self, reports: Vec<StatusReport>) {
        if !self.status_reports {
            return;
        }
        for report in reports {
            self.send_report(report).await
        }
    }

    async fn send_report(&self, report: StatusReport) {
        trace!(
            "Reporting {:?} of bundle {} to {}",
            report.assertion, report.bundle_id, report.report_to
        );
        if let Err(e) = self.reporter.report(report).await {
            warn!("Failed to send status report: {e}");
        }
    }

    pub(super) async fn rejected(&self, bundle: Bundle, e: pipeline::Error) {
        match e {
            pipeline::Error::Rejected(rejection) => {
                debug!("Bundle {} rejected: {rejection}", bundle.id());
                self.drop_bundle(bundle, rejection.reason_code()).await
            }
            pipeline::Error::Cancelled => {
                trace!("Processing of bundle {} cancelled", bundle.id())
            }
        }
    }

    #[instrument(skip(self, bundle))]
    pub(super) async fn drop_bundle(&self, bundle: Bundle, reason: ReasonCode) {
        metrics::counter!("bpa.bundle.dropped", "reason" => format!("{reason:?}")).increment(1);
        self.report(&bundle.primary, StatusAssertion::Deleted, reason)
            .await;
    }
}
