//! In-memory admin API for tests.
//!
//! [`FakeAdmin`] keeps a component list and counts calls. Failures can be
//! queued per operation with [`FakeAdmin::fail_next`]; queued failures are
//! consumed in order before the operation starts succeeding again.

use crate::api::{AdminApi, AdminConnector};
use crate::error::ApiError;
use crate::model::{ComponentRepresentation, RealmRepresentation, SyncAction, UserQuery};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Operations whose failures can be scripted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    GetRealm,
    ListComponents,
    CreateComponent,
    DeleteComponent,
    QueryUsers,
    TriggerSync,
    RefreshToken,
}

#[derive(Default)]
struct State {
    components: Vec<ComponentRepresentation>,
    next_id: u64,
    failures: HashMap<FakeOp, VecDeque<ApiError>>,
    calls: HashMap<FakeOp, usize>,
    synced: Vec<(String, SyncAction)>,
}

pub struct FakeAdmin {
    realm: RealmRepresentation,
    state: Mutex<State>,
    refreshes: AtomicUsize,
}

impl FakeAdmin {
    pub fn new(realm: &str) -> Self {
        Self {
            realm: RealmRepresentation {
                id: format!("{realm}-id"),
                realm: realm.to_string(),
            },
            state: Mutex::new(State::default()),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Queues `error` as the result of the next call to `op`.
    pub fn fail_next(&self, op: FakeOp, error: ApiError) {
        let mut state = self.state.lock().unwrap();
        state.failures.entry(op).or_default().push_back(error);
    }

    /// Registers a component directly, as if left over by an earlier run.
    pub fn insert_component(&self, mut component: ComponentRepresentation) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("component-{}", state.next_id);
        component.id = Some(id.clone());
        state.components.push(component);
        id
    }

    pub fn components(&self) -> Vec<ComponentRepresentation> {
        self.state.lock().unwrap().components.clone()
    }

    pub fn calls(&self, op: FakeOp) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Successful sync triggers, in order.
    pub fn synced(&self) -> Vec<(String, SyncAction)> {
        self.state.lock().unwrap().synced.clone()
    }

    fn enter(&self, op: FakeOp) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(op).or_default() += 1;
        match state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AdminApi for FakeAdmin {
    fn realm_name(&self) -> &str {
        &self.realm.realm
    }

    async fn get_realm(&self, name: &str) -> Result<RealmRepresentation, ApiError> {
        self.enter(FakeOp::GetRealm)?;
        if name != self.realm.realm {
            return Err(ApiError::Status {
                status: 404,
                body: "{\"error\":\"Realm not found.\"}".to_string(),
            });
        }
        Ok(self.realm.clone())
    }

    async fn list_components(&self) -> Result<Vec<ComponentRepresentation>, ApiError> {
        self.enter(FakeOp::ListComponents)?;
        Ok(self.components())
    }

    async fn create_component(
        &self,
        component: &ComponentRepresentation,
    ) -> Result<(), ApiError> {
        self.enter(FakeOp::CreateComponent)?;
        self.insert_component(component.clone());
        Ok(())
    }

    async fn delete_component(&self, id: &str) -> Result<(), ApiError> {
        self.enter(FakeOp::DeleteComponent)?;
        let mut state = self.state.lock().unwrap();
        let before = state.components.len();
        state.components.retain(|c| c.id.as_deref() != Some(id));
        if state.components.len() == before {
            return Err(ApiError::Status {
                status: 404,
                body: "{\"error\":\"Could not find component\"}".to_string(),
            });
        }
        Ok(())
    }

    async fn query_users(&self, _query: &UserQuery) -> Result<Vec<serde_json::Value>, ApiError> {
        self.enter(FakeOp::QueryUsers)?;
        Ok(Vec::new())
    }

    async fn trigger_sync(
        &self,
        component_id: &str,
        action: SyncAction,
    ) -> Result<serde_json::Value, ApiError> {
        self.enter(FakeOp::TriggerSync)?;
        self.state
            .lock()
            .unwrap()
            .synced
            .push((component_id.to_string(), action));
        Ok(serde_json::json!({ "ignored": false, "added": 0, "updated": 0 }))
    }

    async fn refresh_token(&self) -> Result<(), ApiError> {
        self.enter(FakeOp::RefreshToken)?;
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out an already-built session.
pub struct StaticConnector(pub Arc<dyn AdminApi>);

#[async_trait]
impl AdminConnector for StaticConnector {
    async fn connect(&self) -> anyhow::Result<Arc<dyn AdminApi>> {
        Ok(self.0.clone())
    }
}
