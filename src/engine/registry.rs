//! Model Registry
//!
//! Holds the face analysis, swap and (optional) restoration engines for the
//! lifetime of the process. Each engine is loaded at most once; a failed load
//! leaves the other slots untouched so a later `ensure_ready` only retries
//! the missing piece. Readiness never regresses once reached.
//!
//! Inference calls are serialized through one lock because the engines are
//! not safe for concurrent use.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{info, warn};

use super::{FaceAnalyzer, FaceRestorer, FaceSwapper};

/// Engine types held by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Analysis,
    Swapper,
    Restorer,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [EngineKind::Analysis, EngineKind::Swapper, EngineKind::Restorer];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Analysis => "analysis",
            EngineKind::Swapper => "swapper",
            EngineKind::Restorer => "restorer",
        }
    }

    fn index(&self) -> usize {
        match self {
            EngineKind::Analysis => 0,
            EngineKind::Swapper => 1,
            EngineKind::Restorer => 2,
        }
    }
}

/// Constructs engines; called from a blocking thread
pub trait EngineFactory: Send + Sync {
    fn load_analyzer(&self) -> Result<Box<dyn FaceAnalyzer>>;
    fn load_swapper(&self) -> Result<Box<dyn FaceSwapper>>;
    fn load_restorer(&self) -> Result<Box<dyn FaceRestorer>>;
}

/// Exclusive access to the loaded engines for one request
pub struct Engines<'a> {
    pub analyzer: &'a mut dyn FaceAnalyzer,
    pub swapper: &'a mut dyn FaceSwapper,
    pub restorer: Option<&'a mut dyn FaceRestorer>,
}

#[derive(Default)]
struct EngineSlots {
    analyzer: Option<Box<dyn FaceAnalyzer>>,
    swapper: Option<Box<dyn FaceSwapper>>,
    restorer: Option<Box<dyn FaceRestorer>>,
}

/// Process-wide engine registry
pub struct ModelRegistry {
    factory: Box<dyn EngineFactory>,
    require_restorer: bool,
    slots: Mutex<EngineSlots>,
    loaded: [AtomicBool; 3],
    ready: AtomicBool,
    attempted: AtomicBool,
}

impl ModelRegistry {
    pub fn new(factory: Box<dyn EngineFactory>, require_restorer: bool) -> Self {
        Self {
            factory,
            require_restorer,
            slots: Mutex::new(EngineSlots::default()),
            loaded: [AtomicBool::new(false), AtomicBool::new(false), AtomicBool::new(false)],
            ready: AtomicBool::new(false),
            attempted: AtomicBool::new(false),
        }
    }

    /// Load every missing engine. Idempotent; blocks for the duration of the loads.
    pub fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        let mut slots = self.slots.lock();

        if slots.analyzer.is_none() {
            let analyzer = self.load(EngineKind::Analysis, || self.factory.load_analyzer())?;
            slots.analyzer = Some(analyzer);
        }

        if slots.swapper.is_none() {
            let swapper = self.load(EngineKind::Swapper, || self.factory.load_swapper())?;
            slots.swapper = Some(swapper);
        }

        if self.require_restorer && slots.restorer.is_none() {
            let restorer = self.load(EngineKind::Restorer, || self.factory.load_restorer())?;
            slots.restorer = Some(restorer);
        }

        self.ready.store(true, Ordering::Release);
        info!("All models loaded, registry ready");
        Ok(())
    }

    /// Automatic initialization trigger (startup preload or first request).
    ///
    /// Only the first caller runs `ensure_ready`; everyone else gets the
    /// current readiness, so a failed load is not repeated per request.
    pub fn ensure_ready_once(&self) -> Result<bool> {
        if self.is_ready() {
            return Ok(true);
        }
        if self.attempted.swap(true, Ordering::AcqRel) {
            return Ok(self.is_ready());
        }

        self.ensure_ready().map(|_| true).map_err(|e| {
            warn!("Model initialization failed: {:#}", e);
            e
        })
    }

    fn load<T>(&self, kind: EngineKind, loader: impl FnOnce() -> Result<T>) -> Result<T> {
        info!("Initializing {} engine...", kind.as_str());
        let start = Instant::now();

        let engine = loader().with_context(|| format!("Failed to initialize {} engine", kind.as_str()))?;

        self.loaded[kind.index()].store(true, Ordering::Release);
        info!("{} engine loaded in {:?}", kind.as_str(), start.elapsed());
        Ok(engine)
    }

    /// Whether every required engine is loaded
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Check if an engine is loaded
    pub fn is_loaded(&self, kind: EngineKind) -> bool {
        self.loaded[kind.index()].load(Ordering::Acquire)
    }

    /// Get status of all engines
    pub fn status(&self) -> Vec<(EngineKind, bool)> {
        EngineKind::ALL
            .iter()
            .map(|&kind| (kind, self.is_loaded(kind)))
            .collect()
    }

    /// Run `f` with exclusive access to the engines; `None` if not ready
    pub fn with_engines<R>(&self, f: impl FnOnce(&mut Engines<'_>) -> R) -> Option<R> {
        if !self.is_ready() {
            return None;
        }

        let mut guard = self.slots.lock();
        let slots = &mut *guard;

        let (Some(analyzer), Some(swapper)) = (slots.analyzer.as_deref_mut(), slots.swapper.as_deref_mut()) else {
            return None;
        };

        let mut engines = Engines {
            analyzer,
            swapper,
            restorer: slots
                .restorer
                .as_deref_mut()
                .map(|restorer| restorer as &mut dyn FaceRestorer),
        };

        Some(f(&mut engines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use image::DynamicImage;

    use crate::engine::{DetectedFace, RestoreOptions, Restored};

    struct NoopAnalyzer;
    impl FaceAnalyzer for NoopAnalyzer {
        fn analyze(&mut self, _: &DynamicImage) -> Result<Vec<DetectedFace>> {
            Ok(Vec::new())
        }
    }

    struct NoopSwapper;
    impl FaceSwapper for NoopSwapper {
        fn swap(&mut self, target: &DynamicImage, _: &DetectedFace, _: &DetectedFace) -> Result<DynamicImage> {
            Ok(target.clone())
        }
    }

    struct NoopRestorer;
    impl FaceRestorer for NoopRestorer {
        fn restore(&mut self, image: &DynamicImage, _: &RestoreOptions) -> Result<Restored> {
            Ok(Restored::Image(image.clone()))
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        analyzer_loads: AtomicUsize,
        swapper_loads: AtomicUsize,
        restorer_loads: AtomicUsize,
        swapper_failures_left: AtomicUsize,
    }

    impl EngineFactory for Arc<CountingFactory> {
        fn load_analyzer(&self) -> Result<Box<dyn FaceAnalyzer>> {
            self.analyzer_loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NoopAnalyzer))
        }

        fn load_swapper(&self) -> Result<Box<dyn FaceSwapper>> {
            self.swapper_loads.fetch_add(1, Ordering::SeqCst);
            let left = self.swapper_failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.swapper_failures_left.store(left - 1, Ordering::SeqCst);
                anyhow::bail!("swapper weights missing");
            }
            Ok(Box::new(NoopSwapper))
        }

        fn load_restorer(&self) -> Result<Box<dyn FaceRestorer>> {
            self.restorer_loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NoopRestorer))
        }
    }

    #[test]
    fn test_loads_at_most_once() {
        let factory = Arc::new(CountingFactory::default());
        let registry = ModelRegistry::new(Box::new(factory.clone()), false);

        assert!(!registry.is_ready());
        registry.ensure_ready().unwrap();
        registry.ensure_ready().unwrap();
        assert!(registry.is_ready());

        assert_eq!(factory.analyzer_loads.load(Ordering::SeqCst), 1);
        assert_eq!(factory.swapper_loads.load(Ordering::SeqCst), 1);
        assert_eq!(factory.restorer_loads.load(Ordering::SeqCst), 0);
        assert!(!registry.is_loaded(EngineKind::Restorer));
    }

    #[test]
    fn test_partial_failure_retries_missing_piece_only() {
        let factory = Arc::new(CountingFactory::default());
        factory.swapper_failures_left.store(1, Ordering::SeqCst);
        let registry = ModelRegistry::new(Box::new(factory.clone()), true);

        let err = registry.ensure_ready().unwrap_err();
        assert!(format!("{:#}", err).contains("swapper"));
        assert!(!registry.is_ready());
        assert!(registry.is_loaded(EngineKind::Analysis));
        assert!(registry.with_engines(|_| ()).is_none());

        registry.ensure_ready().unwrap();
        assert!(registry.is_ready());
        assert_eq!(factory.analyzer_loads.load(Ordering::SeqCst), 1);
        assert_eq!(factory.swapper_loads.load(Ordering::SeqCst), 2);
        assert_eq!(factory.restorer_loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_automatic_init_is_not_repeated_after_failure() {
        let factory = Arc::new(CountingFactory::default());
        factory.swapper_failures_left.store(1, Ordering::SeqCst);
        let registry = ModelRegistry::new(Box::new(factory.clone()), false);

        assert!(registry.ensure_ready_once().is_err());
        assert!(!registry.ensure_ready_once().unwrap());
        assert!(!registry.ensure_ready_once().unwrap());
        assert_eq!(factory.swapper_loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ready_never_regresses() {
        let factory = Arc::new(CountingFactory::default());
        let registry = ModelRegistry::new(Box::new(factory), true);

        assert!(registry.ensure_ready_once().unwrap());
        for _ in 0..3 {
            assert!(registry.is_ready());
            assert!(registry.ensure_ready_once().unwrap());
            let has_restorer = registry.with_engines(|engines| engines.restorer.is_some());
            assert_eq!(has_restorer, Some(true));
        }
    }
}
