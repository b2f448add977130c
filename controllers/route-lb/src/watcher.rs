//! Route watcher
//!
//! Consumes the route watch stream sequentially on a single task and turns
//! it into added/updated/deleted callbacks on the controller. A local cache
//! keyed by namespace/name retains the previous version of every route so
//! update callbacks carry both the pre-event and post-event object.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crds::Route;
use futures::TryStreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::watcher;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::controller::RouteController;
use crate::error::ControllerError;

/// Watches routes and feeds the controller, one event at a time.
pub struct RouteWatcher {
    api: Api<Route>,
    controller: Arc<RouteController>,
}

fn cache_key(route: &Route) -> String {
    format!("{}/{}", route.namespace().unwrap_or_default(), route.name_any())
}

impl RouteWatcher {
    /// Creates a watcher over `api` delivering to `controller`.
    pub fn new(api: Api<Route>, controller: Arc<RouteController>) -> Self {
        Self { api, controller }
    }

    /// Runs until the stream ends or `shutdown` flips. Events are processed
    /// to completion before the next one is read, so an in-flight workflow
    /// always finishes before shutdown takes effect.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ControllerError> {
        info!("Starting route watcher");

        let mut stream = Box::pin(watcher(self.api.clone(), watcher::Config::default()));
        let mut cache: HashMap<String, Route> = HashMap::new();
        // keys seen during the current re-list, used to detect deletions
        // that happened while the watch was disconnected
        let mut relisted: HashSet<String> = HashSet::new();

        loop {
            let event = tokio::select! {
                _ = shutdown.changed() => {
                    info!("Route watcher stopping");
                    return Ok(());
                }
                event = stream.try_next() => event
                    .map_err(|e| ControllerError::Watch(format!("watch stream error: {e}")))?,
            };
            let Some(event) = event else {
                return Ok(());
            };

            match event {
                watcher::Event::Init => {
                    debug!("route re-list started");
                    relisted.clear();
                }
                watcher::Event::InitApply(route) => {
                    relisted.insert(cache_key(&route));
                    self.dispatch_apply(&mut cache, route).await;
                }
                watcher::Event::Apply(route) => {
                    self.dispatch_apply(&mut cache, route).await;
                }
                watcher::Event::Delete(route) => {
                    cache.remove(&cache_key(&route));
                    self.controller.on_deleted(&route).await;
                }
                watcher::Event::InitDone => {
                    let stale: Vec<String> = cache
                        .keys()
                        .filter(|key| !relisted.contains(*key))
                        .cloned()
                        .collect();
                    for key in stale {
                        if let Some(route) = cache.remove(&key) {
                            info!("route {} disappeared during watch gap", key);
                            self.controller.on_deleted(&route).await;
                        }
                    }
                    relisted.clear();
                    info!("route re-list complete, {} routes cached", cache.len());
                }
            }
        }
    }

    async fn dispatch_apply(&self, cache: &mut HashMap<String, Route>, route: Route) {
        let key = cache_key(&route);
        match cache.insert(key, route.clone()) {
            Some(old) => self.controller.on_updated(&old, &route).await,
            None => self.controller.on_added(&route).await,
        }
    }
}
