use super::*;

pub type Error = Box<dyn core::error::Error + Send + Sync>;

/// Sends status reports on their way, typically by wrapping them in an
/// administrative record bundle
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, report: StatusReport) -> Result<(), Error>;
}

/// Queues reports for something else to send
#[async_trait]
impl StatusReporter for flume::Sender<StatusReport> {
    async fn report(&self, report: StatusReport) -> Result<(), Error> {
        self.send_async(report).await.map_err(|e| e.into())
    }
}
