//! Watch cache.
//!
//! Each [`Informer`] feeds a `kube_runtime` reflector from a list/watch
//! stream and forwards add, update and delete notifications to its handlers.
//! Reconcilers only ever read through a [`Store`]; the live API is used for
//! writes.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use futures::StreamExt;
use kube::{Api, Resource, ResourceExt};
use kube_runtime::reflector::{self, store::Writer, ObjectRef};
use kube_runtime::{watcher, WatchStreamExt};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ControllerError;
use crate::keys::object_key;

/// Receives change notifications from an [`Informer`].
///
/// Handlers run on the informer task and must not block.
pub trait EventHandler<K>: Send + Sync {
    fn on_add(&self, _obj: &K) {}

    fn on_update(&self, _old: &K, _new: &K) {}

    fn on_delete(&self, _obj: &K) {}
}

/// Read handle on the cache of one resource type, looked up by namespace
/// and name.
pub struct Store<K>
where
    K: Resource + 'static,
    K::DynamicType: Eq + Hash,
{
    reader: reflector::Store<K>,
    dyntype: K::DynamicType,
}

impl<K> Clone for Store<K>
where
    K: Resource + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            dyntype: self.dyntype.clone(),
        }
    }
}

impl<K> Debug for Store<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("len", &self.len()).finish()
    }
}

impl<K> Store<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    pub(crate) fn new(reader: reflector::Store<K>, dyntype: K::DynamicType) -> Self {
        Self { reader, dyntype }
    }

    /// Look up an object by namespace and name. An empty namespace means a
    /// cluster-scoped object.
    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
        let mut key = ObjectRef::new_with(name, self.dyntype.clone());
        if !namespace.is_empty() {
            key = key.within(namespace);
        }
        self.reader.get(&key)
    }

    /// Snapshot of every cached object
    pub fn list(&self) -> Vec<Arc<K>> {
        self.reader.state()
    }

    pub fn len(&self) -> usize {
        self.reader.state().len()
    }

    /// Wait until the initial list has been loaded
    pub async fn wait_until_ready(&self) -> Result<(), ControllerError> {
        self.reader
            .wait_until_ready()
            .await
            .map_err(|e| ControllerError::Watch(e.to_string()))
    }
}

/// Feeds a reflector from a list/watch stream and dispatches notifications.
pub struct Informer<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    kind: String,
    writer: Writer<K>,
    store: Store<K>,
    handlers: Vec<Arc<dyn EventHandler<K>>>,
    // Keys seen during the current (re)list
    listed: HashSet<String>,
    synced: bool,
}

impl<K> Informer<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Eq + Hash + Clone + Default,
{
    /// `kind` names the watched resource in logs
    pub fn new(kind: impl Into<String>) -> Self {
        Self::new_with(kind, K::DynamicType::default())
    }
}

impl<K> Informer<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    /// Informer for a resource whose type is only known at runtime
    pub fn new_with(kind: impl Into<String>, dyntype: K::DynamicType) -> Self {
        let writer = Writer::new(dyntype.clone());
        let store = Store::new(writer.as_reader(), dyntype);
        Self {
            kind: kind.into(),
            writer,
            store,
            handlers: Vec::new(),
            listed: HashSet::new(),
            synced: false,
        }
    }

    /// Register a handler for change notifications
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler<K>>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Read handle on this informer's cache
    pub fn store(&self) -> Store<K> {
        self.store.clone()
    }

    /// Run until cancelled. Stream errors are retried with backoff.
    pub async fn run(mut self, api: Api<K>, token: CancellationToken) -> Result<(), ControllerError> {
        info!("Starting {} informer", self.kind);

        let mut stream = Box::pin(watcher(api, watcher::Config::default()).default_backoff());
        loop {
            let event = tokio::select! {
                () = token.cancelled() => break,
                event = stream.next() => event,
            };
            match event {
                Some(Ok(event)) => self.process(event),
                Some(Err(e)) => warn!("{} watch error (will retry): {}", self.kind, e),
                None => return Err(ControllerError::Watch(format!("{} watch stream ended", self.kind))),
            }
        }

        info!("{} informer stopped", self.kind);
        Ok(())
    }

    /// Apply one watch event to the cache and notify handlers.
    ///
    /// The previous version of an object is read before the event is
    /// applied, so handlers see both sides of an update.
    pub(crate) fn process(&mut self, event: watcher::Event<K>) {
        match &event {
            watcher::Event::Init => {
                debug!("{} informer listing", self.kind);
                self.listed.clear();
                self.writer.apply_watcher_event(&event);
            }
            watcher::Event::InitApply(obj) => {
                self.listed.insert(object_key(obj));
                let previous = self.cached(obj);
                self.writer.apply_watcher_event(&event);
                self.dispatch_upsert(previous.as_deref(), obj);
            }
            watcher::Event::InitDone => {
                let gone: Vec<Arc<K>> = self
                    .store
                    .list()
                    .into_iter()
                    .filter(|obj| !self.listed.contains(&object_key(obj.as_ref())))
                    .collect();
                self.writer.apply_watcher_event(&event);
                self.listed.clear();
                for obj in &gone {
                    self.dispatch_delete(obj);
                }
                if !self.synced {
                    self.synced = true;
                    info!("{} cache synced with {} objects", self.kind, self.store.len());
                }
            }
            watcher::Event::Apply(obj) => {
                let previous = self.cached(obj);
                self.writer.apply_watcher_event(&event);
                self.dispatch_upsert(previous.as_deref(), obj);
            }
            watcher::Event::Delete(obj) => {
                // Prefer the cached copy so handlers see the last known owner refs
                let cached = self.cached(obj);
                self.writer.apply_watcher_event(&event);
                self.dispatch_delete(cached.as_deref().unwrap_or(obj));
            }
        }
    }

    fn cached(&self, obj: &K) -> Option<Arc<K>> {
        self.store.get(&obj.namespace().unwrap_or_default(), &obj.name_any())
    }

    fn dispatch_upsert(&self, previous: Option<&K>, obj: &K) {
        for handler in &self.handlers {
            match previous {
                Some(old) => handler.on_update(old, obj),
                None => handler.on_add(obj),
            }
        }
    }

    fn dispatch_delete(&self, obj: &K) {
        for handler in &self.handlers {
            handler.on_delete(obj);
        }
    }
}
