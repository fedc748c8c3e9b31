//! Reflector-backed caches restricted by the cache policy.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use futures_util::{FutureExt, StreamExt, future::BoxFuture};
use kube::{
    Api, Resource,
    runtime::{
        Controller, WatchStreamExt,
        reflector::{self, Store, store::Writer},
        watcher,
    },
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::cache::CacheScope;

/// Server-side apply bookkeeping is never exposed to reconcilers.
pub fn strip_managed_fields<K: Resource>(obj: &mut K) {
    obj.meta_mut().managed_fields = None;
}

/// Read-only view over one or more reflector stores.
///
/// A namespace-scoped kind gets one store per namespace; a field-scoped or
/// unscoped kind gets a single store.
#[derive(Clone)]
pub struct ScopedCache<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    stores: Vec<Store<K>>,
}

impl<K> ScopedCache<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    pub fn state(&self) -> Vec<Arc<K>> {
        self.stores.iter().flat_map(|s| s.state()).collect()
    }

    pub fn get(&self, name: &str, namespace: Option<&str>) -> Option<Arc<K>> {
        self.stores.iter().find_map(|s| {
            s.find(|obj| {
                obj.meta().name.as_deref() == Some(name)
                    && obj.meta().namespace.as_deref() == namespace
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.stores.iter().all(|s| s.is_empty())
    }

    /// Resolves once every backing store has seen its initial list.
    pub async fn wait_until_ready(&self) -> bool {
        for store in &self.stores {
            if store.wait_until_ready().await.is_err() {
                return false;
            }
        }
        true
    }
}

/// Build the stores for `api` under `scope` and the watch futures that
/// feed them. The futures run until the process stops.
pub(crate) fn scoped<K>(
    api: Api<K>,
    dyntype: K::DynamicType,
    scope: Option<&CacheScope>,
) -> (ScopedCache<K>, Vec<BoxFuture<'static, ()>>)
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Eq + Hash + Clone + Send + Sync + 'static,
{
    let selectors = match scope {
        Some(scope) => scope.selectors(),
        None => vec![String::new()],
    };

    let mut stores = Vec::with_capacity(selectors.len());
    let mut feeds = Vec::with_capacity(selectors.len());
    for selector in selectors {
        let writer = Writer::new(dyntype.clone());
        stores.push(writer.as_reader());

        let mut config = watcher::Config::default();
        if !selector.is_empty() {
            config = config.fields(&selector);
        }
        let feed = reflector::reflector(
            writer,
            watcher(api.clone(), config)
                .default_backoff()
                .modify(strip_managed_fields),
        )
        .applied_objects()
        .for_each(move |res| {
            if let Err(e) = &res {
                debug!(selector = %selector, error = %e, "cache watch error");
            }
            futures_util::future::ready(())
        })
        .boxed();
        feeds.push(feed);
    }
    (ScopedCache { stores }, feeds)
}

/// A controller for `api` whose watch strips managed fields before
/// objects reach its store or the reconciler.
pub fn stripped_controller<K>(api: Api<K>, config: watcher::Config) -> Controller<K>
where
    K: Resource<DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    let (reader, writer) = reflector::store();
    let objects = watcher(api, config)
        .default_backoff()
        .modify(strip_managed_fields)
        .reflect(writer)
        .applied_objects();
    Controller::for_stream(objects, reader)
}
