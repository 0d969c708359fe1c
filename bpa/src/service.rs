/*!
Local applications, and handing bundles over to them.
*/

use super::*;
use hashbrown::HashMap;
use std::sync::Mutex;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Endpoint {0} is already registered")]
    EndpointInUse(Eid),

    #[error("Endpoint {0} is not registered")]
    NotRegistered(Eid),

    #[error("Endpoint {0} is registered with a different cookie")]
    WrongCookie(Eid),

    #[error(transparent)]
    Internal(#[from] Box<dyn core::error::Error + Send + Sync>),
}

/// The outcome of offering a bundle to an application
#[derive(Debug)]
pub enum Delivery {
    Accepted,
    /// Handed back, e.g. because nobody is listening
    Declined(Bundle),
}

#[async_trait]
pub trait Registrar: Send + Sync {
    /// `cookie` identifies the registration, and must be given to
    /// unregister it
    async fn register(&self, eid: Eid, cookie: u64) -> Result<()>;

    async fn unregister(&self, eid: &Eid, cookie: u64) -> Result<()>;

    async fn deliver(&self, eid: &Eid, bundle: Bundle) -> Result<Delivery>;
}

struct Mailbox {
    cookie: u64,
    tx: flume::Sender<Bundle>,
    rx: flume::Receiver<Bundle>,
}

/// Holds delivered bundles in a bounded queue per endpoint until the
/// application collects them
pub struct Mailboxes {
    depth: usize,
    mailboxes: Mutex<HashMap<Eid, Mailbox>>,
}

impl Mailboxes {
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            mailboxes: Mutex::new(HashMap::new()),
        }
    }

    /// The queue for a registered endpoint
    pub fn mailbox(&self, eid: &Eid, cookie: u64) -> Result<flume::Receiver<Bundle>> {
        match self
            .mailboxes
            .lock()
            .trace_expect("Failed to lock mutex")
            .get(eid)
        {
            Some(m) if m.cookie == cookie => Ok(m.rx.clone()),
            Some(_) => Err(Error::WrongCookie(eid.clone())),
            None => Err(Error::NotRegistered(eid.clone())),
        }
    }
}

#[async_trait]
impl Registrar for Mailboxes {
    async fn register(&self, eid: Eid, cookie: u64) -> Result<()> {
        let mut mailboxes = self.mailboxes.lock().trace_expect("Failed to lock mutex");
        if mailboxes.contains_key(&eid) {
            return Err(Error::EndpointInUse(eid));
        }
        let (tx, rx) = flume::bounded(self.depth);
        info!("Registered endpoint {eid}");
        mailboxes.insert(eid, Mailbox { cookie, tx, rx });
        Ok(())
    }

    async fn unregister(&self, eid: &Eid, cookie: u64) -> Result<()> {
        let mut mailboxes = self.mailboxes.lock().trace_expect("Failed to lock mutex");
        match mailboxes.get(eid) {
            Some(m) if m.cookie == cookie => {
                mailboxes.remove(eid);
                info!("Unregistered endpoint {eid}");
                Ok(())
            }
            Some(_) => Err(Error::WrongCookie(eid.clone())),
            None => Err(Error::NotRegistered(eid.clone())),
        }
    }

    async fn deliver(&self, eid: &Eid, bundle: Bundle) -> Result<Delivery> {
        let Some(tx) = self
            .mailboxes
            .lock()
            .trace_expect("Failed to lock mutex")
            .get(eid)
            .map(|m| m.tx.clone())
        else {
            return Ok(Delivery::Declined(bundle));
        };

        match tx.try_send(bundle) {
            Ok(()) => Ok(Delivery::Accepted),
            Err(flume::TrySendError::Full(bundle)) => {
                debug!("Mailbox for {eid} is full");
                Ok(Delivery::Declined(bundle))
            }
            Err(flume::TrySendError::Disconnected(bundle)) => Ok(Delivery::Declined(bundle)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terra_bpv7::{VolatileBlob, builder::Builder};

    fn bundle() -> Bundle {
        let mut b = Builder::new();
        b.source(Eid::ipn(2, 1)).destination(Eid::ipn(1, 7));
        b.build(Box::new(VolatileBlob::from(b"hi".as_slice())))
    }

    #[tokio::test]
    async fn mailboxes() {
        let apps = Mailboxes::new(1);
        let eid = Eid::ipn(1, 7);
        assert!(matches!(
            apps.deliver(&eid, bundle()).await,
            Ok(Delivery::Declined(_))
        ));

        apps.register(eid.clone(), 42).await.unwrap();
        assert!(matches!(
            apps.register(eid.clone(), 43).await,
            Err(Error::EndpointInUse(_))
        ));
        assert!(matches!(apps.mailbox(&eid, 1), Err(Error::WrongCookie(_))));
        let rx = apps.mailbox(&eid, 42).unwrap();

        assert!(matches!(
            apps.deliver(&eid, bundle()).await,
            Ok(Delivery::Accepted)
        ));
        // Depth of one
        assert!(matches!(
            apps.deliver(&eid, bundle()).await,
            Ok(Delivery::Declined(_))
        ));
        assert_eq!(rx.recv_async().await.unwrap().primary.destination, eid);

        assert!(matches!(
            apps.unregister(&eid, 1).await,
            Err(Error::WrongCookie(_))
        ));
        apps.unregister(&eid, 42).await.unwrap();
        assert!(matches!(
            apps.unregister(&eid, 42).await,
            Err(Error::NotRegistered(_))
        ));
    }
}
