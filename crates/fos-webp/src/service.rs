//! Capability Service
//!
//! Owns the shared [`CapabilityResult`] for every WebP image element of a
//! profile. Created once at startup and handed to elements by handle.
//!
//! Probing is explicit and guarded: [`CapabilityService::initiate`] starts a
//! probe cycle only when none is in flight and some feature is still unknown.
//! Each feature's outcome is recorded and persisted as soon as it settles;
//! [`CapabilityService::ready`] resolves once the whole cycle has settled.

use crate::cache::{CacheError, CapabilityCache};
use crate::capability::{CapabilityResult, WebpFeature};
use crate::config::CapabilityConfig;
use crate::decoder::{DecodeError, ImageDecoder, SourceDecoder};
use crate::probe::{ProbeOutcome, probe_feature};
use crate::selector::{ActualSource, select_source};
use crate::storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
use smol::channel::{self, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Where the probe lifecycle stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePhase {
    /// No cycle running; the result may be absent or partial
    Idle,
    /// A cycle has been spawned and not every probe has settled
    InFlight,
    /// Every feature is known
    Settled,
}

struct ServiceState {
    result: Option<CapabilityResult>,
    phase: ProbePhase,
    /// Bumped by `clear`; outcomes from an older generation are dropped
    generation: u64,
    waiters: Vec<Sender<CapabilityResult>>,
}

impl ServiceState {
    fn settled_result(&self) -> Option<CapabilityResult> {
        match (self.phase, self.result) {
            (ProbePhase::InFlight, _) => None,
            (_, Some(result)) if result.is_complete() => Some(result),
            _ => None,
        }
    }

    fn notify_waiters(&mut self, result: CapabilityResult) {
        for waiter in self.waiters.drain(..) {
            // The receiver may be gone if the element was dropped
            let _ = waiter.try_send(result);
        }
    }
}

struct Inner {
    cache: CapabilityCache,
    decoder: Arc<dyn SourceDecoder>,
    state: Mutex<ServiceState>,
    cycles: AtomicUsize,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one probe outcome and persist the updated result
    fn record(&self, generation: u64, feature: WebpFeature, supported: bool) {
        let mut state = self.lock_state();
        if state.generation != generation {
            tracing::debug!("Dropping WebP {} outcome from a cleared probe", feature);
            return;
        }
        let result = state.result.get_or_insert_with(CapabilityResult::new);
        result.set(feature, supported);

        // Persisting under the lock keeps writes in the same order as updates
        if let Err(e) = self.cache.store(result) {
            tracing::warn!("Failed to persist WebP {} capability: {}", feature, e);
        }
    }

    /// Settle the cycle started at `generation`
    ///
    /// When the result was cleared while the cycle ran, returns the features
    /// to probe again instead and moves `generation` forward.
    fn finish_cycle(&self, generation: &mut u64) -> Option<Vec<WebpFeature>> {
        let mut state = self.lock_state();
        let result = state.result.unwrap_or_default();

        if state.generation != *generation {
            let missing = result.missing();
            if !missing.is_empty() {
                *generation = state.generation;
                let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::info!(
                    "WebP capability cleared mid-probe, starting probe #{} ({} features)",
                    cycle,
                    missing.len()
                );
                return Some(missing);
            }
        }

        state.phase = if result.is_complete() {
            ProbePhase::Settled
        } else {
            ProbePhase::Idle
        };
        state.notify_waiters(result);

        tracing::info!(
            "WebP capability probe finished: lossy={} lossless={} alpha={} animation={}",
            result.supports(WebpFeature::Lossy),
            result.supports(WebpFeature::Lossless),
            result.supports(WebpFeature::Alpha),
            result.supports(WebpFeature::Animation),
        );
        None
    }
}

/// Shared WebP capability state
///
/// Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct CapabilityService {
    inner: Arc<Inner>,
}

impl CapabilityService {
    /// Create a service over `cache`, reading the persisted result once
    pub fn new(cache: CapabilityCache, decoder: Arc<dyn SourceDecoder>) -> Self {
        let result = match cache.load() {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Ignoring stored WebP capability: {}", e);
                None
            }
        };

        let phase = match result {
            Some(r) if r.is_complete() => ProbePhase::Settled,
            _ => ProbePhase::Idle,
        };

        if let Some(r) = &result {
            tracing::debug!("Loaded WebP capability from {:?}: {:?}", cache.key(), r);
        }

        Self {
            inner: Arc::new(Inner {
                cache,
                decoder,
                state: Mutex::new(ServiceState {
                    result,
                    phase,
                    generation: 0,
                    waiters: Vec::new(),
                }),
                cycles: AtomicUsize::new(0),
            }),
        }
    }

    /// Service over in-memory storage and the default decoder
    pub fn in_memory() -> Self {
        let cache = CapabilityCache::new(
            Arc::new(MemoryStorage::new()),
            crate::cache::DEFAULT_STORAGE_KEY,
        );
        Self::new(cache, Arc::new(ImageDecoder::new()))
    }

    /// Build storage and decoder from configuration
    pub fn from_config(config: &CapabilityConfig) -> Result<Self, StorageError> {
        let storage: Arc<dyn KeyValueStorage> = match &config.profile_dir {
            Some(dir) => Arc::new(FileStorage::open(dir, &config.origin)?),
            None => Arc::new(MemoryStorage::new()),
        };
        let cache = CapabilityCache::new(storage, config.storage_key.clone());
        Ok(Self::new(cache, Arc::new(ImageDecoder::new())))
    }

    /// Current result, `None` while nothing is known
    pub fn current(&self) -> Option<CapabilityResult> {
        self.inner.lock_state().result
    }

    /// Probe lifecycle phase
    pub fn phase(&self) -> ProbePhase {
        self.inner.lock_state().phase
    }

    /// Number of probe cycles started by this service
    pub fn cycles_started(&self) -> usize {
        self.inner.cycles.load(Ordering::SeqCst)
    }

    /// Underlying persistent cache
    pub fn cache(&self) -> &CapabilityCache {
        &self.inner.cache
    }

    /// Re-read the persisted result
    ///
    /// The stored value replaces the in-memory one unless a probe cycle is in
    /// flight, in which case the cycle's own results win.
    pub fn load(&self) -> Result<Option<CapabilityResult>, CacheError> {
        let loaded = self.inner.cache.load()?;

        let mut state = self.inner.lock_state();
        if state.phase != ProbePhase::InFlight {
            state.result = loaded;
            state.phase = match loaded {
                Some(r) if r.is_complete() => ProbePhase::Settled,
                _ => ProbePhase::Idle,
            };
        }
        Ok(loaded)
    }

    /// Persist and adopt an externally computed result
    pub fn save(&self, result: CapabilityResult) -> Result<(), CacheError> {
        let mut state = self.inner.lock_state();
        self.inner.cache.store(&result)?;
        state.result = Some(result);

        if state.phase != ProbePhase::InFlight {
            if result.is_complete() {
                state.phase = ProbePhase::Settled;
                state.notify_waiters(result);
            } else {
                state.phase = ProbePhase::Idle;
            }
        }
        Ok(())
    }

    /// Forget the persisted and in-memory result so the next `initiate`
    /// probes again
    ///
    /// A cycle in flight drops its pending outcomes and probes every feature
    /// again before settling, so its waiters still get a fresh result.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut state = self.inner.lock_state();
        self.inner.cache.clear()?;
        state.result = None;
        state.generation += 1;
        if state.phase != ProbePhase::InFlight {
            state.phase = ProbePhase::Idle;
        }
        Ok(())
    }

    /// Start a probe cycle unless one is in flight or everything is known
    ///
    /// Returns `true` when a new cycle was spawned.
    pub fn initiate(&self) -> bool {
        let (missing, generation) = {
            let mut state = self.inner.lock_state();
            if state.phase != ProbePhase::Idle {
                return false;
            }
            let missing = state.result.unwrap_or_default().missing();
            if missing.is_empty() {
                state.phase = ProbePhase::Settled;
                return false;
            }
            state.phase = ProbePhase::InFlight;
            (missing, state.generation)
        };

        let cycle = self.inner.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("Starting WebP capability probe #{} ({} features)", cycle, missing.len());

        smol::spawn(run_cycle(self.inner.clone(), missing, generation)).detach();
        true
    }

    /// Wait until every feature is known, starting a probe if needed
    pub async fn ready(&self) -> CapabilityResult {
        let receiver = {
            let mut state = self.inner.lock_state();
            if let Some(result) = state.settled_result() {
                return result;
            }
            let (sender, receiver) = channel::bounded(1);
            state.waiters.push(sender);
            receiver
        };

        self.initiate();

        match receiver.recv().await {
            Ok(result) => result,
            Err(_) => self.current().unwrap_or_default(),
        }
    }

    /// Select the source an element should render right now
    pub fn select<'a>(&self, src: &'a str, src_webp: Option<&'a str>) -> ActualSource<'a> {
        select_source(src, src_webp, self.current().as_ref())
    }
}

impl std::fmt::Debug for CapabilityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("CapabilityService")
            .field("cache", &self.inner.cache)
            .field("result", &state.result)
            .field("phase", &state.phase)
            .finish()
    }
}

/// Probe `features` concurrently, recording each outcome as it settles
async fn run_cycle(inner: Arc<Inner>, mut features: Vec<WebpFeature>, mut generation: u64) {
    loop {
        let tasks: Vec<_> = features
            .into_iter()
            .map(|feature| {
                let inner = inner.clone();
                smol::spawn(async move {
                    let decoder = inner.decoder.clone();
                    let outcome = smol::unblock(move || guarded_probe(&*decoder, feature)).await;
                    inner.record(generation, feature, outcome.is_supported());
                })
            })
            .collect();

        for task in tasks {
            task.await;
        }

        match inner.finish_cycle(&mut generation) {
            Some(missing) => features = missing,
            None => break,
        }
    }
}

/// Run one probe, turning a decoder panic into a failed outcome
///
/// A panic must not escape into the cycle, or the cycle would never settle.
fn guarded_probe(decoder: &dyn SourceDecoder, feature: WebpFeature) -> ProbeOutcome {
    panic::catch_unwind(AssertUnwindSafe(|| probe_feature(decoder, feature))).unwrap_or_else(|payload| {
        let message = panic_message(&*payload);
        tracing::warn!("WebP {} decoder panicked: {}", feature, message);
        ProbeOutcome::Failed(DecodeError::DecodeFailed(format!("decoder panicked: {message}")))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_STORAGE_KEY;
    use crate::decoder::{DecodeError, Dimensions};

    struct StaticDecoder {
        supported: Vec<WebpFeature>,
        calls: AtomicUsize,
    }

    impl StaticDecoder {
        fn new(supported: &[WebpFeature]) -> Arc<Self> {
            Arc::new(Self {
                supported: supported.to_vec(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl SourceDecoder for StaticDecoder {
        fn decode(&self, src: &str) -> Result<Dimensions, DecodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.supported.iter().any(|f| f.sample_uri() == src) {
                Ok(Dimensions::new(1, 1))
            } else {
                Err(DecodeError::UnsupportedFormat)
            }
        }
    }

    fn service_with(storage: Arc<MemoryStorage>, decoder: Arc<StaticDecoder>) -> CapabilityService {
        CapabilityService::new(CapabilityCache::new(storage, DEFAULT_STORAGE_KEY), decoder)
    }

    #[test]
    fn test_starts_unknown() {
        let service = service_with(Arc::new(MemoryStorage::new()), StaticDecoder::new(&[]));
        assert_eq!(service.current(), None);
        assert_eq!(service.phase(), ProbePhase::Idle);
    }

    #[test]
    fn test_ready_probes_all_features() {
        let storage = Arc::new(MemoryStorage::new());
        let decoder = StaticDecoder::new(&[WebpFeature::Lossy, WebpFeature::Alpha]);
        let service = service_with(storage.clone(), decoder.clone());

        let result = smol::block_on(service.ready());

        assert_eq!(result.lossy, Some(true));
        assert_eq!(result.lossless, Some(false));
        assert_eq!(result.alpha, Some(true));
        assert_eq!(result.animation, Some(false));
        assert_eq!(service.phase(), ProbePhase::Settled);
        assert_eq!(service.cycles_started(), 1);
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 4);
        // One write per feature
        assert_eq!(storage.write_count(), 4);
    }

    #[test]
    fn test_initiate_is_idempotent_after_settle() {
        let service = service_with(Arc::new(MemoryStorage::new()), StaticDecoder::new(&[]));
        smol::block_on(service.ready());

        assert!(!service.initiate());
        assert_eq!(service.cycles_started(), 1);
    }

    #[test]
    fn test_complete_cache_skips_probe() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set_item(DEFAULT_STORAGE_KEY, r#"{"lossy":true,"lossless":true,"alpha":false,"animation":true}"#)
            .unwrap();
        let decoder = StaticDecoder::new(&[]);
        let service = service_with(storage, decoder.clone());

        assert_eq!(service.phase(), ProbePhase::Settled);
        assert!(!service.initiate());

        let result = smol::block_on(service.ready());
        assert_eq!(result.alpha, Some(false));
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_partial_cache_probes_missing() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(DEFAULT_STORAGE_KEY, r#"{"lossy":false}"#).unwrap();
        let decoder = StaticDecoder::new(&WebpFeature::ALL);
        let service = service_with(storage, decoder.clone());

        let result = smol::block_on(service.ready());

        // Stored outcome is kept, only the three missing features are probed
        assert_eq!(result.lossy, Some(false));
        assert_eq!(result.alpha, Some(true));
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_corrupt_cache_is_unknown() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(DEFAULT_STORAGE_KEY, "not json").unwrap();
        let service = service_with(storage, StaticDecoder::new(&[]));

        assert_eq!(service.current(), None);
    }

    #[test]
    fn test_save_and_clear() {
        let storage = Arc::new(MemoryStorage::new());
        let service = service_with(storage.clone(), StaticDecoder::new(&[]));

        service.save(CapabilityResult::uniform(true)).unwrap();
        assert_eq!(service.phase(), ProbePhase::Settled);
        assert!(storage.get_item(DEFAULT_STORAGE_KEY).unwrap().is_some());

        service.clear().unwrap();
        assert_eq!(service.current(), None);
        assert_eq!(service.phase(), ProbePhase::Idle);
        assert!(storage.get_item(DEFAULT_STORAGE_KEY).unwrap().is_none());
    }

    #[test]
    fn test_load_adopts_stored_value() {
        let storage = Arc::new(MemoryStorage::new());
        let service = service_with(storage.clone(), StaticDecoder::new(&[]));

        storage
            .set_item(DEFAULT_STORAGE_KEY, r#"{"lossy":true,"lossless":false,"alpha":true,"animation":false}"#)
            .unwrap();
        let loaded = service.load().unwrap();

        assert_eq!(loaded, service.current());
        assert_eq!(service.phase(), ProbePhase::Settled);
    }
}
