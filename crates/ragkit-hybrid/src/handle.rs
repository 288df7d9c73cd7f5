use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use ragkit_core::error::Result;

use crate::bundle::ArtifactBundle;

/// Shared slot holding the bundle queries run against.
///
/// Queries take a snapshot and keep it for their whole run, so a swap never
/// mixes parts of two bundles inside one query.
#[derive(Debug)]
pub struct BundleHandle {
    current: RwLock<Arc<ArtifactBundle>>,
}

impl BundleHandle {
    pub fn new(bundle: ArtifactBundle) -> Self {
        Self { current: RwLock::new(Arc::new(bundle)) }
    }

    pub fn snapshot(&self) -> Arc<ArtifactBundle> {
        // the slot only ever holds a complete Arc, so a poisoned lock is still consistent
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Publish a fully built bundle, returning the one it replaces.
    pub fn replace(&self, bundle: ArtifactBundle) -> Arc<ArtifactBundle> {
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, Arc::new(bundle))
    }

    /// Load a bundle from disk and swap it in. On failure the current bundle
    /// stays in place.
    ///
    /// The fresh bundle is always published. The returned flag compares the
    /// document table fingerprints only: dense or sparse indices rebuilt over
    /// an identical table are swapped in but report `false`.
    pub async fn reload(&self, dir: &Path, prefix: &str) -> Result<bool> {
        let fresh = ArtifactBundle::load(dir, prefix).await?;
        let fingerprint = fresh.fingerprint().to_string();
        let previous = self.replace(fresh);
        let changed = previous.fingerprint() != fingerprint;
        info!(changed, old = %previous.fingerprint(), new = %fingerprint, "bundle reloaded");
        Ok(changed)
    }
}
