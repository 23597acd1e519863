//! Loaded-model cache.

use super::{InferenceAdapter, ModelResolver};
use crate::error::{Error, Result};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Capacity-bounded LRU of loaded models, keyed by model reference.
///
/// Loading happens under the cache lock, so concurrent requests for the
/// same model load it once. Callers should invoke it from a blocking
/// context.
pub struct ModelCache {
    resolver: Arc<dyn ModelResolver>,
    entries: Mutex<LruCache<String, Arc<dyn InferenceAdapter>>>,
}

impl ModelCache {
    /// Create a cache holding at most `capacity` models (minimum 1).
    #[must_use]
    pub fn new(resolver: Arc<dyn ModelResolver>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            resolver,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruCache<String, Arc<dyn InferenceAdapter>>>> {
        self.entries.lock().map_err(|_| Error::Internal {
            message: "model cache lock poisoned".to_string(),
        })
    }

    /// Return the cached adapter or resolve and cache it.
    pub fn get_or_load(&self, model_ref: &str) -> Result<Arc<dyn InferenceAdapter>> {
        let mut entries = self.lock()?;
        if let Some(adapter) = entries.get(model_ref) {
            debug!(model = model_ref, "model cache hit");
            return Ok(Arc::clone(adapter));
        }
        let adapter = self.resolver.resolve(model_ref)?;
        if let Some((evicted, _)) = entries.push(model_ref.to_string(), Arc::clone(&adapter))
            && evicted != model_ref
        {
            info!("Evicted model {evicted} from cache");
        }
        Ok(adapter)
    }

    /// Resolve `model_ref` again, replacing any cached instance.
    pub fn load(&self, model_ref: &str) -> Result<Arc<dyn InferenceAdapter>> {
        let adapter = self.resolver.resolve(model_ref)?;
        self.lock()?
            .put(model_ref.to_string(), Arc::clone(&adapter));
        Ok(adapter)
    }

    /// Drop a cached model. In-flight jobs keep their own handle.
    pub fn evict(&self, model_ref: &str) -> Result<bool> {
        Ok(self.lock()?.pop(model_ref).is_some())
    }

    /// Drop every cached model.
    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    /// Cached model references, most recently used first.
    pub fn loaded(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.iter().map(|(k, _)| k.clone()).collect())
    }

    /// References known to the underlying resolver.
    #[must_use]
    pub fn known(&self) -> Vec<String> {
        self.resolver.known()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::inference::RawDetection;
    use crate::raster::PixelBuffer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Named(String);

    impl InferenceAdapter for Named {
        fn name(&self) -> &str {
            &self.0
        }
        fn labels(&self) -> &[String] {
            &[]
        }
        fn infer(&self, _: &PixelBuffer, _: f32) -> Result<Vec<RawDetection>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct CountingResolver {
        loads: AtomicUsize,
    }

    impl ModelResolver for CountingResolver {
        fn resolve(&self, model_ref: &str) -> Result<Arc<dyn InferenceAdapter>> {
            if model_ref == "missing" {
                return Err(Error::ModelNotFound {
                    name: model_ref.to_string(),
                });
            }
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Named(model_ref.to_string())))
        }
        fn known(&self) -> Vec<String> {
            Vec::new()
        }
    }

    #[test]
    fn test_get_or_load_caches() {
        let resolver = Arc::new(CountingResolver::default());
        let cache = ModelCache::new(resolver.clone(), 2);
        cache.get_or_load("a").unwrap();
        cache.get_or_load("a").unwrap();
        assert_eq!(resolver.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let resolver = Arc::new(CountingResolver::default());
        let cache = ModelCache::new(resolver, 2);
        cache.get_or_load("a").unwrap();
        cache.get_or_load("b").unwrap();
        cache.get_or_load("a").unwrap();
        cache.get_or_load("c").unwrap();
        assert_eq!(cache.loaded().unwrap(), vec!["c".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_explicit_load_evict_clear() {
        let resolver = Arc::new(CountingResolver::default());
        let cache = ModelCache::new(resolver.clone(), 4);
        cache.load("a").unwrap();
        cache.load("a").unwrap();
        assert_eq!(resolver.loads.load(Ordering::SeqCst), 2);
        assert!(cache.evict("a").unwrap());
        assert!(!cache.evict("a").unwrap());
        cache.get_or_load("b").unwrap();
        cache.clear().unwrap();
        assert!(cache.loaded().unwrap().is_empty());
    }

    #[test]
    fn test_not_found_is_not_cached() {
        let cache = ModelCache::new(Arc::new(CountingResolver::default()), 2);
        assert!(matches!(
            cache.get_or_load("missing"),
            Err(Error::ModelNotFound { .. })
        ));
        assert!(cache.loaded().unwrap().is_empty());
    }
}
