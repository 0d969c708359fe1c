/*!
Where bundles wait while there is no route for them.

A stored bundle belongs to the storage until it is taken back out with
[`Storage::get`].
*/

use super::*;

mod volatile;

pub use volatile::VolatileStorage;

pub type Error = Box<dyn core::error::Error + Send + Sync>;
pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    /// A bundle with the same id is already stored, the new one was dropped
    Duplicate,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn store(&self, bundle: Bundle) -> Result<StoreOutcome>;

    /// Removes and returns the bundle
    async fn get(&self, bundle_id: &BundleId) -> Result<Option<Bundle>>;

    async fn contains(&self, bundle_id: &BundleId) -> Result<bool>;

    /// The primary blocks of everything stored
    async fn list(&self) -> Result<Vec<MetaBundle>>;

    async fn clear(&self) -> Result<()>;
}
