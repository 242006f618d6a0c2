//! Name-indexed service manager with lazy singleton caching.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::config::{Config, ConfigSource};
use crate::errors::{BoxError, ConfigError, ManagerError};

/// A cached service instance, type-erased.
pub type Instance = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(&Config, &Resolver) -> Result<Instance, BoxError> + Send + Sync>;

thread_local! {
    // Names currently being constructed on this thread, outermost first.
    // Used to report the full chain on a circular resolution.
    static RESOLUTION_CHAIN: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Registry mapping names to service definitions, with a lazy
/// singleton cache and a layered configuration mapping.
///
/// Cloning is cheap and shares the same registry, cache and
/// configuration.
#[derive(Clone)]
pub struct ServiceManager {
    inner: Arc<Inner>,
}

struct Inner {
    definitions: RwLock<HashMap<String, Factory>>,
    config: RwLock<Config>,
    state: Mutex<ResolveState>,
    /// Signalled whenever an in-flight construction settles.
    settled: Condvar,
    stats: InnerStats,
}

struct ResolveState {
    cache: HashMap<String, Instance>,
    /// Names under construction, keyed to the constructing thread.
    in_flight: HashMap<String, ThreadId>,
}

#[derive(Default)]
struct InnerStats {
    total_resolutions: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
}

/// Narrow lookup capability handed to service factories.
///
/// Exposes only resolution and inspection, never ownership of the
/// manager, so definitions can depend on other services without
/// creating retention cycles.
pub struct Resolver<'a> {
    manager: &'a ServiceManager,
}

impl Resolver<'_> {
    pub fn get(&self, name: &str) -> Result<Instance, ManagerError> {
        self.manager.get(name)
    }

    pub fn get_as<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ManagerError> {
        self.manager.get_as(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.manager.has(name)
    }

    /// Snapshot of the manager's merged configuration.
    pub fn config(&self) -> Config {
        self.manager.config()
    }
}

impl ServiceManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                definitions: RwLock::new(HashMap::new()),
                config: RwLock::new(Config::new()),
                state: Mutex::new(ResolveState {
                    cache: HashMap::new(),
                    in_flight: HashMap::new(),
                }),
                settled: Condvar::new(),
                stats: InnerStats::default(),
            }),
        }
    }

    /// Register a service definition under `name`.
    ///
    /// The factory receives the assembled configuration and a
    /// [`Resolver`] for looking up other services. It runs at most once
    /// per manager; the produced instance is cached for the manager's
    /// lifetime. Duplicate names are rejected.
    pub fn register<T, F>(&self, name: impl Into<String>, factory: F) -> Result<(), ManagerError>
    where
        F: Fn(&Config, &Resolver) -> Result<T, BoxError> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let name = name.into();
        let mut definitions = self.inner.definitions.write();
        if definitions.contains_key(&name) {
            return Err(ManagerError::DuplicateName(name));
        }
        debug!(name = %name, "registered service definition");
        definitions.insert(
            name,
            Arc::new(move |config: &Config, resolver: &Resolver| {
                let service = factory(config, resolver)?;
                Ok(Arc::new(service) as Instance)
            }),
        );
        Ok(())
    }

    /// Resolve the service registered under `name`, constructing and
    /// caching it on first access.
    ///
    /// Two consecutive calls return the identical instance. Concurrent
    /// first access from several threads constructs exactly once; the
    /// losers wait for the winner's construction to settle. A failed
    /// construction caches nothing, so a later call retries.
    ///
    /// A definition that transitively resolves its own name fails with
    /// [`ManagerError::CircularResolution`], propagated as-is through
    /// any intermediate definitions. Cycle detection is per thread:
    /// a dependency cycle whose edges are first resolved from two
    /// different threads at once blocks both on the other's
    /// construction rather than erroring.
    pub fn get(&self, name: &str) -> Result<Instance, ManagerError> {
        self.inner
            .stats
            .total_resolutions
            .fetch_add(1, Ordering::Relaxed);
        let current = thread::current().id();

        {
            let mut state = self.inner.state.lock();
            loop {
                if let Some(instance) = state.cache.get(name) {
                    self.inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                    trace!(name, "cache hit");
                    return Ok(instance.clone());
                }
                match state.in_flight.get(name) {
                    // Re-entry from the thread already constructing this
                    // name: the definition depends on itself.
                    Some(tid) if *tid == current => {
                        let chain = RESOLUTION_CHAIN.with(|c| c.borrow().join(" -> "));
                        return Err(ManagerError::CircularResolution(format!(
                            "{} -> {}",
                            chain, name
                        )));
                    }
                    // Another thread is constructing; wait for it to
                    // settle, then re-check the cache.
                    Some(_) => self.inner.settled.wait(&mut state),
                    None => {
                        if !self.inner.definitions.read().contains_key(name) {
                            return Err(ManagerError::UnknownService(name.to_string()));
                        }
                        state.in_flight.insert(name.to_string(), current);
                        break;
                    }
                }
            }
        }

        self.inner
            .stats
            .cache_misses
            .fetch_add(1, Ordering::Relaxed);
        debug!(name, "constructing service");

        // Construction runs without any internal lock held, so the
        // factory may resolve its own dependencies through the resolver.
        let factory = match self.inner.definitions.read().get(name) {
            Some(factory) => factory.clone(),
            None => {
                self.abandon(name);
                return Err(ManagerError::UnknownService(name.to_string()));
            }
        };
        let config = self.inner.config.read().clone();
        let resolver = Resolver { manager: self };

        RESOLUTION_CHAIN.with(|c| c.borrow_mut().push(name.to_string()));
        let result = factory(&config, &resolver);
        RESOLUTION_CHAIN.with(|c| {
            c.borrow_mut().pop();
        });

        let mut state = self.inner.state.lock();
        state.in_flight.remove(name);
        let outcome = match result {
            Ok(instance) => {
                // Write-once: keep whatever is already cached.
                let cached = state
                    .cache
                    .entry(name.to_string())
                    .or_insert(instance)
                    .clone();
                Ok(cached)
            }
            // A circular resolution detected further down the chain
            // surfaces unwrapped so callers can match on the kind.
            Err(source) => Err(match source.downcast::<ManagerError>() {
                Ok(inner) if matches!(*inner, ManagerError::CircularResolution(_)) => *inner,
                Ok(inner) => ManagerError::Construction {
                    name: name.to_string(),
                    source: inner,
                },
                Err(source) => ManagerError::Construction {
                    name: name.to_string(),
                    source,
                },
            }),
        };
        self.inner.settled.notify_all();
        outcome
    }

    /// Typed resolution: [`get`](Self::get) plus a downcast.
    pub fn get_as<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ManagerError> {
        let instance = self.get(name)?;
        instance
            .downcast::<T>()
            .map_err(|_| ManagerError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Whether a definition is registered under `name`. Never
    /// instantiates.
    pub fn has(&self, name: &str) -> bool {
        self.inner.definitions.read().contains_key(name)
    }

    /// Merge an ordered sequence of configuration sources into the
    /// manager's configuration; later sources override overlapping
    /// keys.
    ///
    /// All sources are loaded before anything is merged, so a failing
    /// source leaves the existing configuration untouched.
    pub fn configure(
        &self,
        sources: impl IntoIterator<Item = ConfigSource>,
    ) -> Result<(), ManagerError> {
        let layers = sources
            .into_iter()
            .map(|source| source.load())
            .collect::<Result<Vec<_>, ConfigError>>()?;

        if !self.inner.state.lock().cache.is_empty() {
            warn!("configure called after services were instantiated; existing instances keep the configuration they saw");
        }

        let mut config = self.inner.config.write();
        for layer in layers {
            config.apply_layer(layer);
        }
        debug!(keys = config.len(), "configuration merged");
        Ok(())
    }

    /// Replace the configuration with an empty mapping.
    pub fn reset_config(&self) {
        self.inner.config.write().clear();
    }

    /// Snapshot of the merged configuration.
    pub fn config(&self) -> Config {
        self.inner.config.read().clone()
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            total_resolutions: self.inner.stats.total_resolutions.load(Ordering::Relaxed),
            cache_hits: self.inner.stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.inner.stats.cache_misses.load(Ordering::Relaxed),
        }
    }

    /// Drop the in-flight marker for `name` and wake waiters.
    fn abandon(&self, name: &str) {
        let mut state = self.inner.state.lock();
        state.in_flight.remove(name);
        self.inner.settled.notify_all();
    }
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolution counters.
#[derive(Debug, Clone)]
pub struct ManagerStats {
    pub total_resolutions: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

impl ManagerStats {
    pub fn hit_rate(&self) -> f64 {
        if self.total_resolutions == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_resolutions as f64
        }
    }
}
