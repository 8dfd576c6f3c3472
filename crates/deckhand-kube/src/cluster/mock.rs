//! Mock cluster for testing
//!
//! Stores documents in memory, keyed by kind, namespace and name. Patches are
//! applied as JSON merge patches, so patching a stored document with itself
//! leaves it unchanged. Failures can be injected per kind and verb to exercise
//! retry and error paths without a Kubernetes cluster.

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use super::{Cluster, DeleteOptions, ResourceApi, ResourceKind, ResourceRef, document_name};
use crate::error::{KubeError, Result};

type StoreKey = (ResourceKind, Option<String>, String);

/// Verbs of [`ResourceApi`], for failure injection and call logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Read,
    Create,
    Patch,
    Delete,
    List,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub reads: usize,
    pub creates: usize,
    pub patches: usize,
    pub deletes: usize,
    pub lists: usize,
}

impl OperationCounts {
    /// Sum of all writes
    pub fn writes(&self) -> usize {
        self.creates + self.patches + self.deletes
    }

    fn bump(&mut self, verb: Verb) {
        match verb {
            Verb::Read => self.reads += 1,
            Verb::Create => self.creates += 1,
            Verb::Patch => self.patches += 1,
            Verb::Delete => self.deletes += 1,
            Verb::List => self.lists += 1,
        }
    }
}

/// A scripted failure: the next `times` calls of `verb` on `kind` fail with
/// an API status of `code`
#[derive(Debug, Clone)]
pub struct FailureSpec {
    pub kind: ResourceKind,
    pub verb: Verb,
    pub times: usize,
    pub code: u16,
}

#[derive(Default)]
struct MockState {
    store: RwLock<BTreeMap<StoreKey, JsonValue>>,
    operations: RwLock<HashMap<ResourceKind, OperationCounts>>,
    failures: RwLock<Vec<FailureSpec>>,
    calls: RwLock<Vec<(Verb, ResourceRef)>>,
    delete_options: RwLock<Vec<(ResourceRef, DeleteOptions)>>,
}

/// In-memory cluster for testing
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<MockState>,
}

impl MockCluster {
    /// Create a new empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document directly, bypassing counts and failures
    pub fn insert(&self, kind: ResourceKind, namespace: Option<&str>, document: JsonValue) {
        let name = document_name(&document).unwrap_or_default().to_string();
        let key = store_key(kind, namespace, &name);
        self.state.store.write().unwrap().insert(key, document);
    }

    /// Get a stored document
    pub fn get(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<JsonValue> {
        let key = store_key(kind, namespace, name);
        self.state.store.read().unwrap().get(&key).cloned()
    }

    /// Check whether a document is stored
    pub fn contains(&self, kind: ResourceKind, namespace: Option<&str>, name: &str) -> bool {
        self.get(kind, namespace, name).is_some()
    }

    /// Mutate a stored document in place, as a controller would.
    /// Returns false if the document does not exist.
    pub fn update<F>(&self, kind: ResourceKind, namespace: Option<&str>, name: &str, f: F) -> bool
    where
        F: FnOnce(&mut JsonValue),
    {
        let key = store_key(kind, namespace, name);
        let mut store = self.state.store.write().unwrap();
        match store.get_mut(&key) {
            Some(document) => {
                f(document);
                true
            }
            None => false,
        }
    }

    /// Make the next `times` calls of `verb` on `kind` fail with `code`
    pub fn fail_next(&self, kind: ResourceKind, verb: Verb, times: usize, code: u16) {
        self.state.failures.write().unwrap().push(FailureSpec {
            kind,
            verb,
            times,
            code,
        });
    }

    /// Get operation counts for one kind
    pub fn operation_counts(&self, kind: ResourceKind) -> OperationCounts {
        self.state
            .operations
            .read()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Get operation counts summed over all kinds
    pub fn total_counts(&self) -> OperationCounts {
        let ops = self.state.operations.read().unwrap();
        ops.values().fold(OperationCounts::default(), |mut acc, c| {
            acc.reads += c.reads;
            acc.creates += c.creates;
            acc.patches += c.patches;
            acc.deletes += c.deletes;
            acc.lists += c.lists;
            acc
        })
    }

    /// Reset operation counts and the call log
    pub fn reset_counts(&self) {
        self.state.operations.write().unwrap().clear();
        self.state.calls.write().unwrap().clear();
        self.state.delete_options.write().unwrap().clear();
    }

    /// Every call made, in order
    pub fn calls(&self) -> Vec<(Verb, ResourceRef)> {
        self.state.calls.read().unwrap().clone()
    }

    /// Calls of one verb, in order
    pub fn calls_of(&self, verb: Verb) -> Vec<ResourceRef> {
        self.calls()
            .into_iter()
            .filter(|(v, _)| *v == verb)
            .map(|(_, r)| r)
            .collect()
    }

    /// Options passed to each delete call, in order
    pub fn delete_options(&self) -> Vec<(ResourceRef, DeleteOptions)> {
        self.state.delete_options.read().unwrap().clone()
    }

    /// Count stored documents
    pub fn resource_count(&self) -> usize {
        self.state.store.read().unwrap().len()
    }
}

impl Cluster for MockCluster {
    fn api(&self, kind: ResourceKind) -> Arc<dyn ResourceApi> {
        Arc::new(MockResourceApi {
            kind,
            state: Arc::clone(&self.state),
        })
    }
}

struct MockResourceApi {
    kind: ResourceKind,
    state: Arc<MockState>,
}

impl MockResourceApi {
    /// Record the call and consume an injected failure if one matches
    fn record(&self, verb: Verb, name: &str, namespace: Option<&str>) -> Result<()> {
        let reference = ResourceRef::new(self.kind, name, namespace);
        self.state
            .operations
            .write()
            .unwrap()
            .entry(self.kind)
            .or_default()
            .bump(verb);
        self.state
            .calls
            .write()
            .unwrap()
            .push((verb, reference.clone()));

        let mut failures = self.state.failures.write().unwrap();
        if let Some(pos) = failures
            .iter()
            .position(|f| f.kind == self.kind && f.verb == verb && f.times > 0)
        {
            let code = failures[pos].code;
            failures[pos].times -= 1;
            if failures[pos].times == 0 {
                failures.remove(pos);
            }
            return Err(KubeError::status(
                code,
                status_reason(code),
                format!("injected failure on {:?} {}", verb, reference),
            ));
        }
        Ok(())
    }

    fn not_found(&self, name: &str) -> KubeError {
        KubeError::status(
            404,
            "NotFound",
            format!("{} \"{}\" not found", self.kind.as_str().to_lowercase(), name),
        )
    }
}

#[async_trait]
impl ResourceApi for MockResourceApi {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn read(&self, name: &str, namespace: Option<&str>) -> Result<JsonValue> {
        self.record(Verb::Read, name, namespace)?;
        let key = store_key(self.kind, namespace, name);
        self.state
            .store
            .read()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| self.not_found(name))
    }

    async fn create(&self, namespace: Option<&str>, document: &JsonValue) -> Result<JsonValue> {
        let name = document_name(document)
            .ok_or_else(|| KubeError::status(422, "Invalid", "metadata.name: Required value"))?
            .to_string();
        self.record(Verb::Create, &name, namespace)?;

        let key = store_key(self.kind, namespace, &name);
        let mut store = self.state.store.write().unwrap();
        if store.contains_key(&key) {
            return Err(KubeError::status(
                409,
                "AlreadyExists",
                format!("{} \"{}\" already exists", self.kind.as_str().to_lowercase(), name),
            ));
        }
        store.insert(key, document.clone());
        Ok(document.clone())
    }

    async fn patch(
        &self,
        name: &str,
        namespace: Option<&str>,
        patch: &JsonValue,
    ) -> Result<JsonValue> {
        self.record(Verb::Patch, name, namespace)?;
        let key = store_key(self.kind, namespace, name);
        let mut store = self.state.store.write().unwrap();
        let document = store.get_mut(&key).ok_or_else(|| self.not_found(name))?;
        merge_patch(document, patch);
        Ok(document.clone())
    }

    async fn delete(
        &self,
        name: &str,
        namespace: Option<&str>,
        options: DeleteOptions,
    ) -> Result<()> {
        self.record(Verb::Delete, name, namespace)?;
        self.state
            .delete_options
            .write()
            .unwrap()
            .push((ResourceRef::new(self.kind, name, namespace), options));

        let key = store_key(self.kind, namespace, name);
        self.state
            .store
            .write()
            .unwrap()
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| self.not_found(name))
    }

    async fn list(&self, namespace: Option<&str>, label_selector: &str) -> Result<Vec<JsonValue>> {
        self.record(Verb::List, "", namespace)?;
        let wanted = parse_selector(label_selector);
        let namespace = namespace.filter(|_| self.kind.is_namespaced());

        let store = self.state.store.read().unwrap();
        Ok(store
            .iter()
            .filter(|((kind, ns, _), _)| {
                *kind == self.kind && (namespace.is_none() || ns.as_deref() == namespace)
            })
            .filter(|(_, doc)| matches_labels(doc, &wanted))
            .map(|(_, doc)| doc.clone())
            .collect())
    }
}

fn store_key(kind: ResourceKind, namespace: Option<&str>, name: &str) -> StoreKey {
    (
        kind,
        namespace
            .filter(|_| kind.is_namespaced())
            .map(str::to_string),
        name.to_string(),
    )
}

fn status_reason(code: u16) -> &'static str {
    match code {
        400 => "BadRequest",
        403 => "Forbidden",
        404 => "NotFound",
        409 => "Conflict",
        422 => "Invalid",
        429 => "TooManyRequests",
        500 => "InternalError",
        503 => "ServiceUnavailable",
        504 => "Timeout",
        _ => "Unknown",
    }
}

/// Apply a JSON merge patch (RFC 7386)
fn merge_patch(target: &mut JsonValue, patch: &JsonValue) {
    let JsonValue::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = JsonValue::Object(Map::new());
    }
    if let JsonValue::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(
                    target_map.entry(key.clone()).or_insert(JsonValue::Null),
                    value,
                );
            }
        }
    }
}

/// Parse an equality selector such as `a=b,c=d`
fn parse_selector(selector: &str) -> Vec<(String, String)> {
    selector
        .split(',')
        .filter_map(|term| term.split_once('='))
        .map(|(k, v)| {
            (
                k.trim().to_string(),
                v.trim_start_matches('=').trim().to_string(),
            )
        })
        .collect()
}

fn matches_labels(document: &JsonValue, wanted: &[(String, String)]) -> bool {
    let labels = document.pointer("/metadata/labels");
    wanted.iter().all(|(k, v)| {
        labels
            .and_then(|l| l.get(k))
            .and_then(JsonValue::as_str)
            .is_some_and(|actual| actual == v)
    })
}
