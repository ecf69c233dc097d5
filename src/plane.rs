//! The governance plane: the surface applications consume.
//!
//! # Design Decisions
//! - Explicit dependency injection: the plane is constructed with its backend
//!   and sinks, never looked up through a global registry
//! - Every public entry point first checks the atomic initialized/destroyed
//!   flags and returns a deactivated error instead of touching released state
//! - Synchronous query paths are breaker-wrapped and not retried internally;
//!   degraded keys are served from cache before any live call

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tracing::{info, warn};

use crate::backend::{ControlPlaneBackend, Instance};
use crate::cache::SnapshotCache;
use crate::config::schema::DEFAULT_NAMESPACE;
use crate::config::{validate_config, PlaneConfig, ValidationError};
use crate::degrade::{BackupDiscovery, DegradationController};
use crate::error::PlaneError;
use crate::health::{HealthMonitor, DEFAULT_HEALTH_INTERVAL};
use crate::lifecycle::shutdown::{ShutdownContext, ShutdownOrchestrator};
use crate::lifecycle::Cancellation;
use crate::observability::{
    AlertSink, AuditSink, MetricsSnapshot, PlaneMetrics, TracingAlertSink, TracingAuditSink,
};
use crate::resilience::{CircuitBreaker, CircuitBreakerError, CircuitState, RetryManager};
use crate::watch::registry::{RetryGuards, WatcherRegistry};
use crate::watch::{ConfigReloadHook, ConfigWatcher, InstancesRefreshHook, ServiceWatcher, WatchCore, WatchKey};

pub const DEFAULT_BREAKER_THRESHOLD: f64 = 0.5;
pub const DEFAULT_BREAKER_WINDOW: Duration = Duration::from_secs(30);

/// Builder for [`GovernancePlane`]; only the backend is mandatory.
pub struct GovernancePlaneBuilder {
    backend: Arc<dyn ControlPlaneBackend>,
    audit: Option<Arc<dyn AuditSink>>,
    alerts: Option<Arc<dyn AlertSink>>,
    breaker_threshold: f64,
    breaker_window: Duration,
    health_interval: Duration,
}

impl GovernancePlaneBuilder {
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(sink);
        self
    }

    pub fn breaker(mut self, threshold: f64, window: Duration) -> Self {
        self.breaker_threshold = threshold;
        self.breaker_window = window;
        self
    }

    pub fn health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    pub fn build(self) -> GovernancePlane {
        GovernancePlane {
            backend: self.backend,
            breaker: Arc::new(CircuitBreaker::new(
                self.breaker_threshold,
                self.breaker_window,
            )),
            retry: ArcSwapOption::const_empty(),
            audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink)),
            alerts: self.alerts.unwrap_or_else(|| Arc::new(TracingAlertSink)),
            metrics: Arc::new(PlaneMetrics::default()),
            config: ArcSwapOption::const_empty(),
            core: ArcSwapOption::const_empty(),
            initialized: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            health_interval: self.health_interval,
            health_cancel: Mutex::new(None),
            restore_delegation: Mutex::new(None),
        }
    }
}

/// Resilience and change-propagation layer over a control-plane backend.
pub struct GovernancePlane {
    backend: Arc<dyn ControlPlaneBackend>,
    breaker: Arc<CircuitBreaker>,
    retry: ArcSwapOption<RetryManager>,
    audit: Arc<dyn AuditSink>,
    alerts: Arc<dyn AlertSink>,
    metrics: Arc<PlaneMetrics>,
    config: ArcSwapOption<PlaneConfig>,
    core: ArcSwapOption<WatchCore>,
    initialized: AtomicBool,
    destroyed: AtomicBool,
    health_interval: Duration,
    health_cancel: Mutex<Option<Cancellation>>,
    restore_delegation: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl GovernancePlane {
    pub fn builder(backend: Arc<dyn ControlPlaneBackend>) -> GovernancePlaneBuilder {
        GovernancePlaneBuilder {
            backend,
            audit: None,
            alerts: None,
            breaker_threshold: DEFAULT_BREAKER_THRESHOLD,
            breaker_window: DEFAULT_BREAKER_WINDOW,
            health_interval: DEFAULT_HEALTH_INTERVAL,
        }
    }

    pub fn new(backend: Arc<dyn ControlPlaneBackend>) -> Self {
        Self::builder(backend).build()
    }

    /// Validate and apply configuration, then start background work.
    ///
    /// Must run inside a Tokio runtime (the health loop is spawned here).
    /// Configuration errors surface synchronously and block startup.
    pub fn initialize(&self, config: PlaneConfig) -> Result<(), PlaneError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(PlaneError::Destroyed);
        }
        if self.initialized.swap(true, Ordering::SeqCst) {
            warn!("governance plane already initialized, ignoring");
            return Ok(());
        }
        if let Err(errors) = validate_config(&config) {
            self.initialized.store(false, Ordering::SeqCst);
            self.metrics.record_operation("initialize", "invalid_config");
            return Err(configuration_error(errors));
        }

        let core = Arc::new(WatchCore {
            backend: Arc::clone(&self.backend),
            cache: SnapshotCache::new(),
            degradation: DegradationController::new(Arc::clone(&self.metrics)),
            metrics: Arc::clone(&self.metrics),
            audit: Arc::clone(&self.audit),
            alerts: Arc::clone(&self.alerts),
            retry_policy: config.retry_policy(),
            namespace: config.namespace.clone(),
            registry: WatcherRegistry::new(),
            guards: RetryGuards::new(),
            refresh: RwLock::new(None),
            reload: RwLock::new(None),
        });

        let cancellation = Cancellation::new();
        let cancel = cancellation.handle();
        *self.health_cancel.lock().unwrap() = Some(cancellation);
        tokio::spawn(HealthMonitor::new(Arc::clone(&core), self.health_interval).run(cancel));

        self.retry
            .store(Some(Arc::new(RetryManager::new(config.retry_policy()))));
        self.core.store(Some(core));
        info!(namespace = %config.namespace, "governance plane initialized");
        self.config.store(Some(Arc::new(config)));
        self.metrics.record_operation("initialize", "success");
        Ok(())
    }

    fn ensure_ready(&self) -> Result<Arc<WatchCore>, PlaneError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(PlaneError::Destroyed);
        }
        self.core.load_full().ok_or(PlaneError::NotInitialized)
    }

    /// Watch change events for a service. Returns the single active watcher
    /// for that service; concurrent calls share one subscription.
    pub async fn watch_service(&self, name: &str) -> Result<Arc<ServiceWatcher>, PlaneError> {
        let core = self.ensure_ready()?;
        self.metrics.record_operation("watch_service", "success");
        core.watch_service(name).await
    }

    /// Watch change events for a configuration file.
    pub async fn watch_config(
        &self,
        file: &str,
        group: &str,
    ) -> Result<Arc<ConfigWatcher>, PlaneError> {
        let core = self.ensure_ready()?;
        self.metrics.record_operation("watch_config", "success");
        core.watch_config(file, group).await
    }

    /// Current instance list for a service. Degraded keys are served from the
    /// cached snapshot; live calls go through the circuit breaker and are not
    /// retried here. An open breaker also falls back to the cache when a
    /// snapshot exists.
    pub async fn get_service_instances(
        &self,
        service: &str,
    ) -> Result<Vec<Instance>, PlaneError> {
        let core = self.ensure_ready()?;
        let key = WatchKey::service(service);
        if core.degradation.is_degraded(&key) {
            if let Some(cached) = core.cache.instances(service) {
                self.metrics
                    .record_operation("get_service_instances", "degraded_cache");
                return Ok((*cached).clone());
            }
        }

        let backend = Arc::clone(&core.backend);
        let name = service.to_string();
        match self
            .breaker
            .call(|| async move { backend.query_instances(&name).await })
            .await
        {
            Ok(instances) => {
                core.cache.put_instances(service, instances.clone());
                self.metrics
                    .record_operation("get_service_instances", "success");
                Ok(instances)
            }
            Err(CircuitBreakerError::Open) => {
                // Open breaker: a stale snapshot beats a guaranteed failure.
                if let Some(cached) = core.cache.instances(service) {
                    self.metrics
                        .record_operation("get_service_instances", "breaker_cache");
                    return Ok((*cached).clone());
                }
                self.metrics
                    .record_operation("get_service_instances", "rejected");
                Err(PlaneError::CircuitOpen)
            }
            Err(CircuitBreakerError::Operation(err)) => {
                self.metrics
                    .record_operation("get_service_instances", "error");
                Err(PlaneError::Backend(err))
            }
        }
    }

    /// Current content of a configuration file.
    pub async fn get_config_value(&self, file: &str, group: &str) -> Result<String, PlaneError> {
        let core = self.ensure_ready()?;
        let key = WatchKey::config(file, group, &core.namespace);
        if core.degradation.is_degraded(&key) {
            if let Some(cached) = core.cache.config(file, group) {
                self.metrics
                    .record_operation("get_config_value", "degraded_cache");
                return Ok(cached.content.clone());
            }
        }

        let backend = Arc::clone(&core.backend);
        let (f, g) = (file.to_string(), group.to_string());
        match self
            .breaker
            .call(|| async move { backend.query_config(&f, &g).await })
            .await
        {
            Ok(config) => {
                let content = config.content.clone();
                core.cache.put_config(config);
                self.metrics.record_operation("get_config_value", "success");
                Ok(content)
            }
            Err(CircuitBreakerError::Open) => {
                if let Some(cached) = core.cache.config(file, group) {
                    self.metrics
                        .record_operation("get_config_value", "breaker_cache");
                    return Ok(cached.content.clone());
                }
                self.metrics.record_operation("get_config_value", "rejected");
                Err(PlaneError::CircuitOpen)
            }
            Err(CircuitBreakerError::Operation(err)) => {
                self.metrics.record_operation("get_config_value", "error");
                Err(PlaneError::Backend(err))
            }
        }
    }

    /// Ask the backend whether a request is admitted. A rejected (open
    /// breaker) call surfaces as `CircuitOpen`; callers back off themselves.
    pub async fn check_rate_limit(
        &self,
        service: &str,
        labels: &HashMap<String, String>,
    ) -> Result<bool, PlaneError> {
        let core = self.ensure_ready()?;
        let backend = Arc::clone(&core.backend);
        let name = service.to_string();
        let labels = labels.clone();
        match self
            .breaker
            .call(|| async move { backend.check_rate_limit(&name, &labels).await })
            .await
        {
            Ok(allowed) => {
                self.metrics.record_operation("check_rate_limit", "success");
                Ok(allowed)
            }
            Err(CircuitBreakerError::Open) => {
                self.metrics.record_operation("check_rate_limit", "rejected");
                Err(PlaneError::CircuitOpen)
            }
            Err(CircuitBreakerError::Operation(err)) => {
                self.metrics.record_operation("check_rate_limit", "error");
                Err(PlaneError::Backend(err))
            }
        }
    }

    /// Point-in-time counters.
    pub fn get_metrics(&self) -> Result<MetricsSnapshot, PlaneError> {
        self.ensure_ready()?;
        Ok(self.metrics.snapshot())
    }

    /// Health probe: ready and able to reach the backend without the breaker
    /// rejecting locally.
    pub fn check_health(&self) -> Result<(), PlaneError> {
        self.ensure_ready()?;
        if self.breaker.state() == CircuitState::Open {
            return Err(PlaneError::CircuitOpen);
        }
        Ok(())
    }

    /// The retry manager built from the active configuration, for app-level
    /// operations that want the same policy.
    pub fn retry_manager(&self) -> Result<Arc<RetryManager>, PlaneError> {
        self.ensure_ready()?;
        self.retry.load_full().ok_or(PlaneError::NotInitialized)
    }

    /// Namespace of the active configuration. Safe to call after destroy:
    /// falls back to "default".
    pub fn namespace(&self) -> String {
        if self.destroyed.load(Ordering::SeqCst) {
            return DEFAULT_NAMESPACE.to_string();
        }
        self.config
            .load_full()
            .map(|c| c.namespace.clone())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    /// Register the hook that hands control-plane delegation back to the host
    /// default during shutdown.
    pub fn set_delegation_restore(&self, restore: Box<dyn FnOnce() + Send>) {
        *self.restore_delegation.lock().unwrap() = Some(restore);
    }

    /// Register a best-effort fallback discovery path used when a service
    /// watch degrades.
    pub fn set_backup_discovery(&self, backup: BackupDiscovery) -> Result<(), PlaneError> {
        let core = self.ensure_ready()?;
        core.degradation.set_backup_discovery(backup);
        Ok(())
    }

    /// Register the dependent hook run after each service change (e.g. a
    /// load-balancer refresh).
    pub fn set_instances_refresh(&self, refresh: InstancesRefreshHook) -> Result<(), PlaneError> {
        let core = self.ensure_ready()?;
        *core.refresh.write().unwrap() = Some(refresh);
        Ok(())
    }

    /// Register the dependent hook run after each config change (e.g. a
    /// hot-reload trigger).
    pub fn set_config_reload(&self, reload: ConfigReloadHook) -> Result<(), PlaneError> {
        let core = self.ensure_ready()?;
        *core.reload.write().unwrap() = Some(reload);
        Ok(())
    }

    /// Tear the plane down. Idempotent: calling before initialization or
    /// after destruction is a no-op. Returns within the clamped shutdown
    /// timeout plus watcher-stop time even if the backend never answers.
    pub async fn cleanup_tasks(&self) -> Result<(), PlaneError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let timeout = self
            .config
            .load_full()
            .map(|c| c.shutdown_timeout())
            .unwrap_or(crate::config::schema::DEFAULT_SHUTDOWN_TIMEOUT);
        self.metrics.record_operation("cleanup", "start");
        info!(shutdown_timeout = ?timeout, "destroying governance plane");

        let ctx = ShutdownContext {
            restore_delegation: self.restore_delegation.lock().unwrap().take(),
            health: self.health_cancel.lock().unwrap().take(),
            core: self.core.swap(None),
            backend: Arc::clone(&self.backend),
            breaker: Arc::clone(&self.breaker),
            metrics: Arc::clone(&self.metrics),
        };
        ShutdownOrchestrator::new(timeout).run(ctx).await;

        self.config.store(None);
        self.retry.store(None);
        info!("governance plane destroyed");
        Ok(())
    }
}

fn configuration_error(errors: Vec<ValidationError>) -> PlaneError {
    let field = if errors.len() == 1 {
        errors[0].field.to_string()
    } else {
        "config".to_string()
    };
    let message = errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    PlaneError::Configuration { field, message }
}
