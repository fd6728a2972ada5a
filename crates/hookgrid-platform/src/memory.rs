//! In-process platform test double, enabled by the `testing` feature.
//!
//! Records are kept per resource kind in insertion order. Listing supports
//! equality filters, `sort=created&order=desc`, and offset-cursor paging.
//! Service upgrades are simulated: `upgrade` puts the service into a
//! transition that settles after a configurable number of reads, and
//! individual services can be stalled or failed to exercise the error
//! paths of callers.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::client::{PlatformClient, PlatformFactory};
use crate::error::{PlatformError, PlatformResult};
use crate::types::{Collection, ListOpts, ResourceKind};

const DEFAULT_PAGE_SIZE: usize = 100;
const DEFAULT_UPGRADE_POLLS: u32 = 1;

/// Operation recorded in the call log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOp {
    Get,
    List,
    Create,
    Update,
    Delete,
    Action(String),
}

/// One entry of the call log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCall {
    pub op: CallOp,
    pub kind: ResourceKind,
    pub id: Option<String>,
}

struct Record {
    seq: u64,
    value: Value,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    records: HashMap<ResourceKind, BTreeMap<String, Record>>,
    calls: Vec<PlatformCall>,
    page_size: usize,
    upgrade_polls: u32,
    /// Reads left before an upgrading service settles.
    pending: HashMap<String, u32>,
    stalled: HashSet<String>,
    failed_transitions: HashMap<String, String>,
    failed_actions: HashMap<(String, String), u16>,
    failed_creates: HashMap<ResourceKind, u16>,
}

/// Thread-safe in-memory [`PlatformClient`]. Clones share state.
#[derive(Clone)]
pub struct InMemoryPlatform {
    inner: Arc<Mutex<Inner>>,
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                page_size: DEFAULT_PAGE_SIZE,
                upgrade_polls: DEFAULT_UPGRADE_POLLS,
                ..Inner::default()
            })),
        }
    }

    /// Number of reads an upgrading service stays transitioning.
    pub fn with_upgrade_polls(self, polls: u32) -> Self {
        self.lock().upgrade_polls = polls;
        self
    }

    pub fn with_page_size(self, page_size: usize) -> Self {
        self.lock().page_size = page_size.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Seeding and inspection ─────────────────────────────────────

    /// Store a record without logging a call. Returns its id.
    pub fn insert(&self, kind: ResourceKind, value: Value) -> String {
        self.lock().store(kind, value)
    }

    pub fn get(&self, kind: ResourceKind, id: &str) -> Option<Value> {
        self.lock()
            .records
            .get(&kind)
            .and_then(|records| records.get(id))
            .map(|r| r.value.clone())
    }

    /// All records of a kind, oldest first.
    pub fn all(&self, kind: ResourceKind) -> Vec<Value> {
        self.lock()
            .sorted(kind)
            .into_iter()
            .map(|r| r.value.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    // ── Failure injection ──────────────────────────────────────────

    /// Keep the service transitioning forever once upgraded.
    pub fn stall_transition(&self, service_id: &str) {
        self.lock().stalled.insert(service_id.to_string());
    }

    /// Settle the service's next upgrade into an error transition.
    pub fn fail_transition(&self, service_id: &str, message: &str) {
        self.lock()
            .failed_transitions
            .insert(service_id.to_string(), message.to_string());
    }

    /// Reject `action` on `id` with the given status.
    pub fn fail_action(&self, id: &str, action: &str, code: u16) {
        self.lock()
            .failed_actions
            .insert((id.to_string(), action.to_string()), code);
    }

    /// Reject every create of `kind` with the given status.
    pub fn fail_create(&self, kind: ResourceKind, code: u16) {
        self.lock().failed_creates.insert(kind, code);
    }
}

impl Inner {
    fn log(&mut self, op: CallOp, kind: ResourceKind, id: Option<&str>) {
        self.calls.push(PlatformCall {
            op,
            kind,
            id: id.map(str::to_string),
        });
    }

    fn store(&mut self, kind: ResourceKind, mut value: Value) -> String {
        self.next_id += 1;
        let seq = self.next_id;

        let id = match value.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("1{}{}", id_prefix(kind), seq),
        };
        if let Value::Object(fields) = &mut value {
            fields.insert("id".to_string(), Value::String(id.clone()));
        }

        self.records
            .entry(kind)
            .or_default()
            .insert(id.clone(), Record { seq, value });
        id
    }

    fn sorted(&self, kind: ResourceKind) -> Vec<&Record> {
        let mut records: Vec<&Record> = self
            .records
            .get(&kind)
            .map(|r| r.values().collect())
            .unwrap_or_default();
        records.sort_by_key(|r| r.seq);
        records
    }

    fn record_mut(&mut self, kind: ResourceKind, id: &str) -> PlatformResult<&mut Value> {
        self.records
            .get_mut(&kind)
            .and_then(|records| records.get_mut(id))
            .map(|r| &mut r.value)
            .ok_or_else(|| not_found(kind, id))
    }

    /// Advance a simulated upgrade by one read.
    fn tick(&mut self, service_id: &str) {
        if self.stalled.contains(service_id) {
            return;
        }
        let Some(left) = self.pending.get_mut(service_id) else {
            return;
        };
        *left = left.saturating_sub(1);
        if *left > 0 {
            return;
        }
        self.pending.remove(service_id);
        let failure = self.failed_transitions.remove(service_id);
        self.settle(service_id, failure);
    }

    fn settle(&mut self, service_id: &str, failure: Option<String>) {
        let Ok(Value::Object(fields)) = self.record_mut(ResourceKind::Service, service_id) else {
            return;
        };
        match failure {
            Some(message) => {
                fields.insert("state".into(), json!("error"));
                fields.insert("transitioning".into(), json!("error"));
                fields.insert("transitioningMessage".into(), json!(message));
            }
            None => {
                fields.insert("state".into(), json!("upgraded"));
                fields.insert("transitioning".into(), json!("no"));
                fields.insert("transitioningMessage".into(), Value::Null);
            }
        }
    }

    fn start_upgrade(&mut self, id: &str, body: &Value) -> PlatformResult<Value> {
        let strategy = body.get("inServiceStrategy").cloned().unwrap_or(Value::Null);
        let polls = self.upgrade_polls;

        let fields = match self.record_mut(ResourceKind::Service, id)? {
            Value::Object(fields) => fields,
            _ => return Err(not_found(ResourceKind::Service, id)),
        };
        for key in ["launchConfig", "secondaryLaunchConfigs"] {
            if let Some(config) = strategy.get(key).filter(|v| !v.is_null()) {
                fields.insert(key.to_string(), config.clone());
            }
        }
        fields.insert("upgrade".into(), body.clone());
        fields.insert("state".into(), json!("upgrading"));
        fields.insert("transitioning".into(), json!("yes"));

        if polls == 0 && !self.stalled.contains(id) {
            let failure = self.failed_transitions.remove(id);
            self.settle(id, failure);
        } else {
            self.pending.insert(id.to_string(), polls);
        }
        self.record_mut(ResourceKind::Service, id).map(|v| v.clone())
    }

    fn finish_upgrade(&mut self, id: &str) -> PlatformResult<Value> {
        let record = self.record_mut(ResourceKind::Service, id)?;
        if let Value::Object(fields) = &mut *record {
            fields.insert("state".into(), json!("active"));
            fields.insert("transitioning".into(), json!("no"));
        }
        Ok(record.clone())
    }
}

fn id_prefix(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Host => "h",
        ResourceKind::Service => "s",
        ResourceKind::GenericObject => "go",
        ResourceKind::ExternalHostEvent => "ev",
    }
}

fn not_found(kind: ResourceKind, id: &str) -> PlatformError {
    PlatformError::Status {
        code: 404,
        message: format!("{} {id} not found", kind.collection()),
    }
}

fn matches_filters(value: &Value, filters: &BTreeMap<String, String>) -> bool {
    filters
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "sort" | "order"))
        .all(|(key, expected)| match value.get(key) {
            Some(Value::String(s)) => s == expected,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == *expected,
        })
}

#[async_trait]
impl PlatformClient for InMemoryPlatform {
    async fn get_by_id(&self, kind: ResourceKind, id: &str) -> PlatformResult<Option<Value>> {
        let mut inner = self.lock();
        inner.log(CallOp::Get, kind, Some(id));
        if kind == ResourceKind::Service {
            inner.tick(id);
        }
        Ok(inner
            .records
            .get(&kind)
            .and_then(|records| records.get(id))
            .map(|r| r.value.clone()))
    }

    async fn list(&self, kind: ResourceKind, opts: &ListOpts) -> PlatformResult<Collection> {
        let mut inner = self.lock();
        inner.log(CallOp::List, kind, None);

        let mut matching: Vec<Value> = inner
            .sorted(kind)
            .into_iter()
            .filter(|r| matches_filters(&r.value, &opts.filters))
            .map(|r| r.value.clone())
            .collect();
        if opts.filters.get("order").is_some_and(|o| o == "desc") {
            matching.reverse();
        }

        let offset = match &opts.marker {
            Some(marker) => marker.parse::<usize>().map_err(|_| PlatformError::Status {
                code: 400,
                message: format!("invalid marker {marker}"),
            })?,
            None => 0,
        };
        let end = offset.saturating_add(inner.page_size).min(matching.len());
        let data = matching.get(offset..end).map(<[Value]>::to_vec).unwrap_or_default();
        let next = (end < matching.len()).then(|| end.to_string());

        Ok(Collection { data, next })
    }

    async fn create(&self, kind: ResourceKind, body: &Value) -> PlatformResult<Value> {
        let mut inner = self.lock();
        inner.log(CallOp::Create, kind, None);

        if let Some(code) = inner.failed_creates.get(&kind) {
            return Err(PlatformError::Status {
                code: *code,
                message: format!("create {} rejected", kind.collection()),
            });
        }

        if kind == ResourceKind::ExternalHostEvent
            && body.get("eventType").and_then(Value::as_str) == Some("host.evacuate")
            && body.get("deleteHost").and_then(Value::as_bool) == Some(true)
        {
            let host_id = body.get("hostId").and_then(Value::as_str).unwrap_or_default();
            let removed = inner
                .records
                .get_mut(&ResourceKind::Host)
                .and_then(|hosts| hosts.remove(host_id));
            if removed.is_none() {
                return Err(not_found(ResourceKind::Host, host_id));
            }
        }

        let id = inner.store(kind, body.clone());
        inner.record_mut(kind, &id).map(|v| v.clone())
    }

    async fn update(&self, kind: ResourceKind, id: &str, body: &Value) -> PlatformResult<Value> {
        let mut inner = self.lock();
        inner.log(CallOp::Update, kind, Some(id));

        let record = inner.record_mut(kind, id)?;
        if let (Value::Object(fields), Value::Object(changes)) = (&mut *record, body) {
            merge(fields, changes);
        }
        Ok(record.clone())
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> PlatformResult<()> {
        let mut inner = self.lock();
        inner.log(CallOp::Delete, kind, Some(id));

        inner
            .records
            .get_mut(&kind)
            .and_then(|records| records.remove(id))
            .map(|_| ())
            .ok_or_else(|| not_found(kind, id))
    }

    async fn action(
        &self,
        kind: ResourceKind,
        id: &str,
        action: &str,
        body: &Value,
    ) -> PlatformResult<Value> {
        let mut inner = self.lock();
        inner.log(CallOp::Action(action.to_string()), kind, Some(id));

        if let Some(code) = inner
            .failed_actions
            .get(&(id.to_string(), action.to_string()))
        {
            return Err(PlatformError::Status {
                code: *code,
                message: format!("action {action} on {id} rejected"),
            });
        }

        match (kind, action) {
            (ResourceKind::Service, "upgrade") => inner.start_upgrade(id, body),
            (ResourceKind::Service, "finishupgrade") => inner.finish_upgrade(id),
            _ => inner.record_mut(kind, id).map(|v| v.clone()),
        }
    }
}

fn merge(fields: &mut Map<String, Value>, changes: &Map<String, Value>) {
    for (key, value) in changes {
        fields.insert(key.clone(), value.clone());
    }
}

/// Hands out one isolated [`InMemoryPlatform`] per project.
#[derive(Clone, Default)]
pub struct InMemoryFactory {
    projects: Arc<Mutex<HashMap<String, InMemoryPlatform>>>,
}

impl InMemoryFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The platform for `project_id`, created empty on first use.
    pub fn project(&self, project_id: &str) -> InMemoryPlatform {
        self.projects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(project_id.to_string())
            .or_default()
            .clone()
    }
}

impl PlatformFactory for InMemoryFactory {
    fn client(&self, project_id: &str) -> PlatformResult<Arc<dyn PlatformClient>> {
        Ok(Arc::new(self.project(project_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_assigns_prefixed_ids() {
        let platform = InMemoryPlatform::new();
        let host = platform.insert(ResourceKind::Host, json!({"hostname": "a"}));
        let svc = platform.insert(ResourceKind::Service, json!({"name": "b"}));
        let fixed = platform.insert(ResourceKind::Host, json!({"id": "1h99"}));

        assert!(host.starts_with("1h"));
        assert!(svc.starts_with("1s"));
        assert_eq!(fixed, "1h99");
        assert_eq!(platform.get(ResourceKind::Host, &host).unwrap()["id"], host);
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn list_filters_and_sorts() {
        let platform = InMemoryPlatform::new();
        platform.insert(ResourceKind::GenericObject, json!({"key": "a", "name": "one"}));
        platform.insert(ResourceKind::GenericObject, json!({"key": "b", "name": "two"}));
        platform.insert(ResourceKind::GenericObject, json!({"key": "a", "name": "three"}));

        let page = platform
            .list(
                ResourceKind::GenericObject,
                &ListOpts::new().filter("key", "a").newest_first(),
            )
            .await
            .unwrap();
        let names: Vec<_> = page.data.iter().map(|v| v["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["three", "one"]);
        assert!(page.next.is_none());
    }

    #[tokio::test]
    async fn upgrade_settles_after_configured_polls() {
        let platform = InMemoryPlatform::new().with_upgrade_polls(2);
        let id = platform.insert(ResourceKind::Service, json!({"state": "active"}));

        let body = json!({"inServiceStrategy": {"launchConfig": {"imageUuid": "docker:app:2"}}});
        let started = platform
            .action(ResourceKind::Service, &id, "upgrade", &body)
            .await
            .unwrap();
        assert_eq!(started["transitioning"], "yes");
        assert_eq!(started["launchConfig"]["imageUuid"], "docker:app:2");

        let first = platform.get_by_id(ResourceKind::Service, &id).await.unwrap().unwrap();
        assert_eq!(first["transitioning"], "yes");
        let second = platform.get_by_id(ResourceKind::Service, &id).await.unwrap().unwrap();
        assert_eq!(second["state"], "upgraded");
        assert_eq!(second["transitioning"], "no");

        let done = platform
            .action(ResourceKind::Service, &id, "finishupgrade", &json!({}))
            .await
            .unwrap();
        assert_eq!(done["state"], "active");
    }

    #[tokio::test]
    async fn stalled_and_failed_transitions() {
        let platform = InMemoryPlatform::new();
        let stuck = platform.insert(ResourceKind::Service, json!({}));
        let broken = platform.insert(ResourceKind::Service, json!({}));
        platform.stall_transition(&stuck);
        platform.fail_transition(&broken, "pull failed");

        for id in [&stuck, &broken] {
            platform
                .action(ResourceKind::Service, id, "upgrade", &json!({}))
                .await
                .unwrap();
        }
        for _ in 0..3 {
            platform.get_by_id(ResourceKind::Service, &stuck).await.unwrap();
        }
        let stuck = platform.get(ResourceKind::Service, &stuck).unwrap();
        assert_eq!(stuck["transitioning"], "yes");

        let broken = platform.get_by_id(ResourceKind::Service, &broken).await.unwrap().unwrap();
        assert_eq!(broken["transitioning"], "error");
        assert_eq!(broken["transitioningMessage"], "pull failed");
    }

    #[tokio::test]
    async fn injected_action_failure() {
        let platform = InMemoryPlatform::new();
        let id = platform.insert(ResourceKind::Service, json!({}));
        platform.fail_action(&id, "upgrade", 422);

        let err = platform
            .action(ResourceKind::Service, &id, "upgrade", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 422);
        assert_eq!(
            platform.calls().last().unwrap().op,
            CallOp::Action("upgrade".to_string())
        );
    }

    #[tokio::test]
    async fn update_merges_and_missing_records_404() {
        let platform = InMemoryPlatform::new();
        let id = platform.insert(ResourceKind::Service, json!({"name": "web", "scale": 2}));

        let updated = platform
            .update(ResourceKind::Service, &id, &json!({"scale": 5}))
            .await
            .unwrap();
        assert_eq!(updated["scale"], 5);
        assert_eq!(updated["name"], "web");

        let err = platform
            .update(ResourceKind::Service, "missing", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 404);
        assert_eq!(
            platform.delete(ResourceKind::Host, "missing").await.unwrap_err().status(),
            404
        );
    }

    #[tokio::test]
    async fn factory_isolates_projects() {
        let factory = InMemoryFactory::new();
        factory
            .project("1a5")
            .insert(ResourceKind::GenericObject, json!({"key": "k"}));

        let other = factory.client("1a7").unwrap();
        let page = other
            .list(ResourceKind::GenericObject, &ListOpts::new())
            .await
            .unwrap();
        assert!(page.data.is_empty());
        assert_eq!(factory.project("1a5").all(ResourceKind::GenericObject).len(), 1);
    }
}
