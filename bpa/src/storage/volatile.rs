use super::*;
use hashbrown::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Storage is full: {0} bundles")]
pub struct Full(pub usize);

#[derive(Default)]
struct Inner {
    bundles: HashMap<BundleId, Bundle>,
    index: HashMap<BundleId, MetaBundle>,
}

/// Keeps bundles in memory, lost on restart
pub struct VolatileStorage {
    inner: Mutex<Inner>,
    capacity: Option<usize>,
}

impl Default for VolatileStorage {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: None,
        }
    }
}

impl VolatileStorage {
    /// Refuses bundles once `capacity` are stored
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Storage for VolatileStorage {
    async fn store(&self, bundle: Bundle) -> Result<StoreOutcome> {
        let id = bundle.id();
        let mut inner = self.inner.lock().trace_expect("Failed to lock mutex");
        if inner.bundles.contains_key(&id) {
            trace!("Bundle {id} is already stored");
            return Ok(StoreOutcome::Duplicate);
        }
        if let Some(capacity) = self.capacity {
            if inner.bundles.len() >= capacity {
                return Err(Full(capacity).into());
            }
        }
        inner.index.insert(id.clone(), bundle.meta());
        inner.bundles.insert(id, bundle);
        Ok(StoreOutcome::Stored)
    }

    async fn get(&self, bundle_id: &BundleId) -> Result<Option<Bundle>> {
        let mut inner = self.inner.lock().trace_expect("Failed to lock mutex");
        inner.index.remove(bundle_id);
        Ok(inner.bundles.remove(bundle_id))
    }

    async fn contains(&self, bundle_id: &BundleId) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .trace_expect("Failed to lock mutex")
            .index
            .contains_key(bundle_id))
    }

    async fn list(&self) -> Result<Vec<MetaBundle>> {
        let mut v: Vec<MetaBundle> = self
            .inner
            .lock()
            .trace_expect("Failed to lock mutex")
            .index
            .values()
            .cloned()
            .collect();
        v.sort_unstable_by_key(|m| m.id());
        Ok(v)
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock().trace_expect("Failed to lock mutex");
        debug!("Clearing {} stored bundles", inner.bundles.len());
        inner.bundles.clear();
        inner.index.clear();
        Ok(())
    }
}
