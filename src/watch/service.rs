//! Service-instance watcher.
//!
//! One long-lived subscription per service name. Change events run the
//! delivery pipeline synchronously on the watcher's task; error events
//! degrade the key and spawn at most one background retry loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendError, ChangePayload, Instance, Subscription, WatchEvent};
use crate::error::PlaneError;
use crate::lifecycle::{CancelHandle, Cancellation};
use crate::observability::AuditRecord;
use crate::resilience::backoff;
use crate::watch::{WatchCore, WatchKey};

pub type InstancesCallback = Box<dyn Fn(&[Instance]) + Send + Sync>;
pub type WatchErrorCallback = Box<dyn Fn(&PlaneError) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_changed: Option<InstancesCallback>,
    on_error: Option<WatchErrorCallback>,
}

/// Watches one service's instance list.
pub struct ServiceWatcher {
    service: String,
    key: WatchKey,
    core: Arc<WatchCore>,
    running: AtomicBool,
    cancel: Mutex<Cancellation>,
    replace_tx: Mutex<Option<mpsc::Sender<Subscription>>>,
    callbacks: Mutex<Callbacks>,
}

impl ServiceWatcher {
    pub fn new(core: &Arc<WatchCore>, service: &str) -> Self {
        Self {
            service: service.to_string(),
            key: WatchKey::service(service),
            core: Arc::clone(core),
            running: AtomicBool::new(false),
            cancel: Mutex::new(Cancellation::new()),
            replace_tx: Mutex::new(None),
            callbacks: Mutex::new(Callbacks::default()),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service
    }

    pub fn key(&self) -> &WatchKey {
        &self.key
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Replace the change callback. Last writer wins; events delivered before
    /// registration were simply not seen by it.
    pub fn set_on_instances_changed(&self, callback: InstancesCallback) {
        self.callbacks.lock().unwrap().on_changed = Some(callback);
    }

    /// Replace the error callback analogously.
    pub fn set_on_error(&self, callback: WatchErrorCallback) {
        self.callbacks.lock().unwrap().on_error = Some(callback);
    }

    /// Idempotent: a running watcher is left alone. Otherwise opens the
    /// backend subscription and spawns the delivery task.
    pub async fn start(self: &Arc<Self>) -> Result<(), PlaneError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.core.registry.adopt_service(self) {
            self.running.store(false, Ordering::SeqCst);
            return Err(PlaneError::watch(
                &self.key,
                "another watcher is active for this key",
            ));
        }

        let cancellation = Cancellation::new();
        let cancel = cancellation.handle();
        *self.cancel.lock().unwrap() = cancellation;

        let subscription = match self.core.backend.subscribe(&self.key).await {
            Ok(sub) => sub,
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                self.core.registry.remove_service(&self.service);
                return Err(PlaneError::watch(&self.key, err));
            }
        };

        let (replace_tx, replace_rx) = mpsc::channel(1);
        *self.replace_tx.lock().unwrap() = Some(replace_tx);

        let watcher = Arc::clone(self);
        tokio::spawn(async move { watcher.run(subscription, cancel, replace_rx).await });

        info!(service = %self.service, "service watcher started");
        self.core.audit.record(AuditRecord::new(
            "service_watch_start",
            &self.key,
            "ok",
            "",
        ));
        Ok(())
    }

    /// Idempotent: cancels the delivery task and any retry loop for this key
    /// and removes the watcher from the registry. Synchronous and cheap.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cancel.lock().unwrap().cancel();
        self.replace_tx.lock().unwrap().take();
        self.core.registry.remove_service(&self.service);
        info!(service = %self.service, "service watcher stopped");
        self.core
            .audit
            .record(AuditRecord::new("service_watch_stop", &self.key, "ok", ""));
    }

    async fn run(
        self: Arc<Self>,
        mut subscription: Subscription,
        mut cancel: CancelHandle,
        mut replace_rx: mpsc::Receiver<Subscription>,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                replacement = replace_rx.recv() => match replacement {
                    Some(sub) => subscription = sub,
                    None => break,
                },
                event = subscription.recv() => match event {
                    Some(WatchEvent::Change(ChangePayload::Instances(instances))) => {
                        self.handle_change(instances);
                    }
                    Some(WatchEvent::Change(other)) => {
                        warn!(key = %self.key, ?other, "unexpected payload family, dropped");
                    }
                    Some(WatchEvent::Error(err)) => {
                        self.handle_error(err);
                    }
                    None => {
                        // Stream ended; treat as an error and park until the
                        // retry loop installs a replacement.
                        self.handle_error(BackendError::StreamClosed);
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            replacement = replace_rx.recv() => match replacement {
                                Some(sub) => subscription = sub,
                                None => break,
                            },
                        }
                    }
                },
            }
        }
        debug!(service = %self.service, "service delivery task exiting");
    }

    fn handle_change(&self, instances: Vec<Instance>) {
        let healthy = instances.iter().filter(|i| i.healthy).count();
        let unhealthy = instances.len() - healthy;

        // 1. Replace the cached snapshot; a clean change clears degradation.
        self.core.cache.put_instances(&self.service, instances.clone());
        self.core.degradation.clear(&self.key);

        // 2. Audit.
        self.core.audit.record(AuditRecord::new(
            "service_change",
            &self.key,
            "ok",
            format!("{} instances", instances.len()),
        ));

        // 3. Generic change notification.
        self.core.metrics.record_watch_event("service");
        info!(
            service = %self.service,
            namespace = %self.core.namespace,
            healthy,
            unhealthy,
            "service change notification"
        );

        // 4. Dependent components (load-balancer refresh).
        if let Some(refresh) = self.core.refresh.read().unwrap().as_ref() {
            refresh(&self.service, &instances);
        }

        // 5. Health-status pass.
        if !instances.is_empty() && healthy == 0 {
            warn!(service = %self.service, total = instances.len(), "no healthy instances");
        }

        if let Some(on_changed) = self.callbacks.lock().unwrap().on_changed.as_ref() {
            on_changed(&instances);
        }
    }

    fn handle_error(self: &Arc<Self>, err: BackendError) {
        error!(key = %self.key, error = %err, "service watch error");
        self.core.metrics.record_watch_error("service");
        self.core.audit.record(AuditRecord::new(
            "service_watch_error",
            &self.key,
            "error",
            err.to_string(),
        ));
        self.core
            .alerts
            .alert(&self.key.to_string(), &err.to_string());
        self.core
            .degradation
            .activate(&self.key, &err.to_string(), &self.core.cache);

        let surfaced = PlaneError::watch(&self.key, &err);
        if let Some(on_error) = self.callbacks.lock().unwrap().on_error.as_ref() {
            on_error(&surfaced);
        }

        self.spawn_retry_loop();
    }

    /// Start the background re-subscribe loop unless one is already live for
    /// this key. The loop clears its own guard on every exit path.
    fn spawn_retry_loop(self: &Arc<Self>) {
        if !self.core.guards.try_acquire(&self.key) {
            debug!(key = %self.key, "retry loop already active, not spawning another");
            return;
        }
        self.core.metrics.record_retry_loop();

        let watcher = Arc::clone(self);
        let mut cancel = self.cancel.lock().unwrap().handle();
        tokio::spawn(async move {
            let policy = watcher.core.retry_policy.clone();
            let mut attempt: u32 = 0;
            loop {
                if attempt >= policy.max_attempts {
                    warn!(key = %watcher.key, attempts = attempt, "watch retry exhausted");
                    break;
                }
                attempt += 1;
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(key = %watcher.key, "watch retry cancelled");
                        break;
                    }
                    _ = sleep(backoff::delay_for(attempt, &policy)) => {}
                }
                match watcher.core.backend.subscribe(&watcher.key).await {
                    Ok(sub) => {
                        if watcher.install_subscription(sub).await {
                            info!(key = %watcher.key, attempt, "watch re-established");
                        }
                        break;
                    }
                    Err(err) => {
                        warn!(key = %watcher.key, attempt, error = %err, "re-subscribe failed");
                    }
                }
            }
            watcher.core.guards.release(&watcher.key);
        });
    }

    async fn install_subscription(&self, subscription: Subscription) -> bool {
        let tx = self.replace_tx.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(subscription).await.is_ok(),
            None => false,
        }
    }
}
