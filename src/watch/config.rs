//! Configuration-file watcher.
//!
//! Same lifecycle and retry discipline as the service watcher; the delivery
//! pipeline differs in its notification payload (content length), its
//! dependent hook (hot-reload trigger) and its final validation pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendError, ChangePayload, ConfigFile, Subscription, WatchEvent};
use crate::error::PlaneError;
use crate::lifecycle::{CancelHandle, Cancellation};
use crate::observability::AuditRecord;
use crate::resilience::backoff;
use crate::watch::service::WatchErrorCallback;
use crate::watch::{WatchCore, WatchKey};

pub type ConfigCallback = Box<dyn Fn(&ConfigFile) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_changed: Option<ConfigCallback>,
    on_error: Option<WatchErrorCallback>,
}

/// Watches one configuration file identified by (file, group).
pub struct ConfigWatcher {
    file: String,
    group: String,
    key: WatchKey,
    core: Arc<WatchCore>,
    running: AtomicBool,
    cancel: Mutex<Cancellation>,
    replace_tx: Mutex<Option<mpsc::Sender<Subscription>>>,
    callbacks: Mutex<Callbacks>,
}

impl ConfigWatcher {
    pub fn new(core: &Arc<WatchCore>, file: &str, group: &str) -> Self {
        Self {
            file: file.to_string(),
            group: group.to_string(),
            key: WatchKey::config(file, group, &core.namespace),
            core: Arc::clone(core),
            running: AtomicBool::new(false),
            cancel: Mutex::new(Cancellation::new()),
            replace_tx: Mutex::new(None),
            callbacks: Mutex::new(Callbacks::default()),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file
    }

    pub fn group_name(&self) -> &str {
        &self.group
    }

    pub fn key(&self) -> &WatchKey {
        &self.key
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Replace the change callback. Last writer wins.
    pub fn set_on_config_changed(&self, callback: ConfigCallback) {
        self.callbacks.lock().unwrap().on_changed = Some(callback);
    }

    pub fn set_on_error(&self, callback: WatchErrorCallback) {
        self.callbacks.lock().unwrap().on_error = Some(callback);
    }

    /// Idempotent start; see [`ServiceWatcher::start`](crate::watch::ServiceWatcher::start).
    pub async fn start(self: &Arc<Self>) -> Result<(), PlaneError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.core.registry.adopt_config(self) {
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
                self.core.registry.remove_config(&self.file, &self.group);
                return Err(PlaneError::watch(&self.key, err));
            }
        };

        let (replace_tx, replace_rx) = mpsc::channel(1);
        *self.replace_tx.lock().unwrap() = Some(replace_tx);

        let watcher = Arc::clone(self);
        tokio::spawn(async move { watcher.run(subscription, cancel, replace_rx).await });

        info!(file = %self.file, group = %self.group, "config watcher started");
        self.core
            .audit
            .record(AuditRecord::new("config_watch_start", &self.key, "ok", ""));
        Ok(())
    }

    /// Idempotent stop; cancels delivery and any retry loop for this key.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cancel.lock().unwrap().cancel();
        self.replace_tx.lock().unwrap().take();
        self.core.registry.remove_config(&self.file, &self.group);
        info!(file = %self.file, group = %self.group, "config watcher stopped");
        self.core
            .audit
            .record(AuditRecord::new("config_watch_stop", &self.key, "ok", ""));
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
                    Some(WatchEvent::Change(ChangePayload::Config(config))) => {
                        self.handle_change(config);
                    }
                    Some(WatchEvent::Change(other)) => {
                        warn!(key = %self.key, ?other, "unexpected payload family, dropped");
                    }
                    Some(WatchEvent::Error(err)) => {
                        self.handle_error(err);
                    }
                    None => {
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
        debug!(file = %self.file, group = %self.group, "config delivery task exiting");
    }

    fn handle_change(&self, config: ConfigFile) {
        let content_length = config.content.len();

        // 1. Replace the cached snapshot; a clean change clears degradation.
        self.core.cache.put_config(config.clone());
        self.core.degradation.clear(&self.key);

        // 2. Audit.
        self.core.audit.record(AuditRecord::new(
            "config_change",
            &self.key,
            "ok",
            format!("{} bytes", content_length),
        ));

        // 3. Generic change notification.
        self.core.metrics.record_watch_event("config");
        info!(
            file = %self.file,
            group = %self.group,
            namespace = %self.core.namespace,
            content_length,
            "config change notification"
        );

        // 4. Dependent components (hot-reload trigger).
        if let Some(reload) = self.core.reload.read().unwrap().as_ref() {
            reload(&config);
        }

        // 5. Validation pass.
        if content_length == 0 {
            warn!(file = %self.file, group = %self.group, "config change has empty content");
        }

        if let Some(on_changed) = self.callbacks.lock().unwrap().on_changed.as_ref() {
            on_changed(&config);
        }
    }

    fn handle_error(self: &Arc<Self>, err: BackendError) {
        error!(key = %self.key, error = %err, "config watch error");
        self.core.metrics.record_watch_error("config");
        self.core.audit.record(AuditRecord::new(
            "config_watch_error",
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
