use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::error::LoadError;

type Slot<M> = Arc<OnceCell<Result<Arc<M>, LoadError>>>;

/// Process-wide store of loaded models keyed by model identifier.
///
/// Each identifier is loaded at most once; concurrent callers for the same id
/// block on the first loader instead of starting their own. A permanent
/// failure is remembered too, so later scorers degrade without retrying. A
/// transient fetch failure leaves the slot empty for the next caller.
pub struct ModelCache<M: ?Sized> {
    slots: Mutex<HashMap<String, Slot<M>>>,
}

impl<M: ?Sized> ModelCache<M> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_load<F>(&self, model_id: &str, loader: F) -> Result<Arc<M>, LoadError>
    where
        F: FnOnce() -> Result<Arc<M>, LoadError>,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots
                .entry(model_id.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let cached = slot.get_or_try_init(|| {
            let start = Instant::now();
            match loader() {
                Ok(model) => {
                    info!(
                        model = model_id,
                        load_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "Model loaded"
                    );
                    Ok(Ok(model))
                }
                Err(err) if err.is_transient() => {
                    warn!(model = model_id, error = %err, "Model fetch failed; will retry on next request");
                    Err(err)
                }
                Err(err) => {
                    warn!(model = model_id, error = %err, "Model load failed; backend disabled for this process");
                    Ok(Err(err))
                }
            }
        });
        match cached {
            Ok(result) => result.clone(),
            Err(err) => Err(err),
        }
    }

    /// Number of identifiers whose load has finished, successfully or not.
    pub fn resolved(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| slot.get().is_some()).count()
    }
}

impl<M: ?Sized> Default for ModelCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn loader_runs_once_per_model() {
        let cache: ModelCache<String> = ModelCache::new();
        let calls = AtomicUsize::new(0);
        let load = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new("weights".to_string()))
        };

        let first = cache.get_or_load("model-a", load).unwrap();
        let second = cache
            .get_or_load("model-a", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new("other".to_string()))
            })
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.resolved(), 1);
    }

    #[test]
    fn failures_are_remembered() {
        let cache: ModelCache<String> = ModelCache::new();
        let err = LoadError::Unavailable("test".into());
        assert_eq!(cache.get_or_load("broken", || Err(err.clone())), Err(err.clone()));
        let retried = cache.get_or_load("broken", || Ok(Arc::new("late".to_string())));
        assert_eq!(retried, Err(err));
    }

    #[test]
    fn fetch_failures_are_retried() {
        let cache: ModelCache<String> = ModelCache::new();
        let calls = AtomicUsize::new(0);
        let offline = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LoadError::Fetch {
                model: "remote".into(),
                reason: "connection reset".into(),
            })
        };

        assert!(matches!(cache.get_or_load("remote", offline), Err(LoadError::Fetch { .. })));
        assert_eq!(cache.resolved(), 0);

        let recovered = cache
            .get_or_load("remote", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new("weights".to_string()))
            })
            .unwrap();
        assert_eq!(*recovered, "weights");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.resolved(), 1);

        let cached = cache.get_or_load("remote", || Ok(Arc::new("reloaded".to_string()))).unwrap();
        assert!(Arc::ptr_eq(&recovered, &cached));
    }

    #[test]
    fn invalid_models_are_remembered() {
        let cache: ModelCache<String> = ModelCache::new();
        let err = LoadError::Invalid {
            model: "bad".into(),
            reason: "missing config.json".into(),
        };
        assert_eq!(cache.get_or_load("bad", || Err(err.clone())), Err(err.clone()));
        assert_eq!(cache.get_or_load("bad", || Ok(Arc::new("late".to_string()))), Err(err));
    }

    #[test]
    fn concurrent_callers_share_one_load() {
        let cache: Arc<ModelCache<String>> = Arc::new(ModelCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                std::thread::spawn(move || {
                    cache
                        .get_or_load("shared", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            Ok(Arc::new("weights".to_string()))
                        })
                        .is_ok()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
