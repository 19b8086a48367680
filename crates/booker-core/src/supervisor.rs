//! Health supervision for managed services.
//!
//! A [`ServiceManager`] owns a background probe loop that periodically runs
//! `self_check` and `health_check` on every managed service, in
//! registration order. A service that fails either check is removed from
//! the live set and is never re-admitted for the lifetime of the process;
//! callers always work from a snapshot of the live set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::traits::Service;

pub struct ServiceManager<S: Service + ?Sized> {
    inner: Arc<Inner<S>>,
    quit: CancellationToken,
}

struct Inner<S: ?Sized> {
    services: Mutex<Vec<Arc<S>>>,
    live_services: RwLock<HashMap<String, Arc<S>>>,
}

impl<S: Service + ?Sized + 'static> ServiceManager<S> {
    pub fn new(probe_interval: Duration) -> Self {
        let inner = Arc::new(Inner {
            services: Mutex::new(Vec::new()),
            live_services: RwLock::new(HashMap::new()),
        });
        let quit = CancellationToken::new();

        tokio::spawn(watch(inner.clone(), quit.clone(), probe_interval));

        Self { inner, quit }
    }

    /// Registers a service and marks it live.
    pub fn manage(&self, service: Arc<S>) {
        let name = service.name().to_string();
        self.inner
            .services
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(service.clone());
        self.inner
            .live_services
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name, service);
    }

    /// Snapshot of the currently healthy services.
    pub fn get_live_services(&self) -> Vec<Arc<S>> {
        self.inner
            .live_services
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Stops the probe loop.
    pub fn close(&self) {
        self.quit.cancel();
    }
}

impl<S: Service + ?Sized> Drop for ServiceManager<S> {
    fn drop(&mut self) {
        self.quit.cancel();
    }
}

async fn watch<S: Service + ?Sized>(
    inner: Arc<Inner<S>>,
    quit: CancellationToken,
    probe_interval: Duration,
) {
    loop {
        tokio::select! {
            () = quit.cancelled() => return,
            () = tokio::time::sleep(probe_interval) => {}
        }

        let managed: Vec<Arc<S>> = inner
            .services
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        for service in managed {
            let status = match service.self_check().await {
                Ok(()) => service.health_check().await,
                Err(err) => Err(err),
            };

            if let Err(reason) = status {
                tracing::warn!(service = service.name(), %reason, "service is down, removing from live set");
                inner
                    .live_services
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .remove(service.name());
            }
        }
    }
}
