//! State file structures for persisting managed resources

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use settle_core::resource::{ResourceId, State, Value};
use settle_core::status::Status;

use crate::backend::{BackendError, BackendResult};

/// The main state file structure that persists to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Incremented on every write
    pub serial: u64,
    /// Fixed at creation; a write into a different lineage is refused
    pub lineage: String,
    /// Version of settle that last wrote this state
    pub settle_version: String,
    /// Managed resources in creation order
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self::with_lineage(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_lineage(lineage: String) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage,
            settle_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.settle_version = env!("CARGO_PKG_VERSION").to_string();
    }

    /// Refuse to replace `stored` with this state
    pub fn check_successor_of(&self, stored: &StateFile) -> BackendResult<()> {
        if self.lineage != stored.lineage {
            return Err(BackendError::LineageMismatch {
                expected: stored.lineage.clone(),
                actual: self.lineage.clone(),
            });
        }
        if self.serial <= stored.serial {
            return Err(BackendError::StaleSerial {
                stored: stored.serial,
                attempted: self.serial,
            });
        }
        Ok(())
    }

    pub fn find_resource(&self, id: &ResourceId) -> Option<&ResourceState> {
        self.resources.iter().find(|r| r.matches(id))
    }

    /// Find a resource by its manifest name, whatever its type
    pub fn find_by_name(&self, name: &str) -> Option<&ResourceState> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Add or replace a resource, keeping its position if already recorded
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        match self
            .resources
            .iter_mut()
            .find(|r| r.resource_type == resource.resource_type && r.name == resource.name)
        {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    pub fn remove_resource(&mut self, id: &ResourceId) -> Option<ResourceState> {
        let pos = self.resources.iter().position(|r| r.matches(id))?;
        Some(self.resources.remove(pos))
    }

    /// Record the outcome of a create, update or read
    ///
    /// A state that no longer exists removes the record.
    pub fn record(&mut self, state: &State, provider: &str) {
        if state.exists {
            self.upsert_resource(ResourceState::from_state(state, provider));
        } else {
            self.remove_resource(&state.id);
        }
    }

    /// Every recorded resource as a [`State`], in creation order
    pub fn states(&self) -> Vec<State> {
        self.resources.iter().map(ResourceState::to_state).collect()
    }

    /// Recorded states keyed by resource, for the differ
    pub fn state_map(&self) -> HashMap<ResourceId, State> {
        self.resources
            .iter()
            .map(|r| (r.id(), r.to_state()))
            .collect()
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub resource_type: String,
    pub name: String,
    /// Provider name ("aws", "awscc")
    pub provider: String,
    /// Composite identifier addressing the resource remotely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Status observed when the last mutation settled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ResourceState {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            identifier: None,
            status: None,
            attributes: HashMap::new(),
        }
    }

    pub fn from_state(state: &State, provider: &str) -> Self {
        Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            provider: provider.to_string(),
            identifier: state.identifier.clone(),
            status: state.status.clone(),
            attributes: state
                .attributes
                .iter()
                .filter(|(_, v)| !matches!(v, Value::ResourceRef(..)))
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    fn matches(&self, id: &ResourceId) -> bool {
        self.resource_type == id.resource_type && self.name == id.name
    }

    pub fn to_state(&self) -> State {
        let attributes = self
            .attributes
            .iter()
            .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
            .collect();
        let mut state = State::existing(self.id(), attributes);
        state.identifier = self.identifier.clone();
        state.status = self.status.clone();
        state
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn volume(name: &str) -> ResourceState {
        ResourceState::new("kx.volume", name, "aws").with_identifier(format!("env-1,{}", name))
    }

    #[test]
    fn test_state_file_new() {
        let state = StateFile::new();
        assert_eq!(state.version, StateFile::CURRENT_VERSION);
        assert_eq!(state.serial, 0);
        assert!(!state.lineage.is_empty());
        assert!(state.resources.is_empty());
    }

    #[test]
    fn upsert_keeps_creation_order() {
        let mut state = StateFile::new();
        state.upsert_resource(volume("a"));
        state.upsert_resource(volume("b"));
        state.upsert_resource(volume("a").with_attribute("size", json!(2400)));

        let names: Vec<_> = state.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(state.resources[0].attributes["size"], json!(2400));
    }

    #[test]
    fn record_removes_absent_resources() {
        let mut state = StateFile::new();
        state.upsert_resource(volume("a"));

        state.record(&State::not_found(ResourceId::new("kx.volume", "a")), "aws");

        assert!(state.resources.is_empty());
        assert!(state.remove_resource(&ResourceId::new("kx.volume", "a")).is_none());
    }

    #[test]
    fn state_conversion_keeps_identifier_and_status() {
        let original = State::existing(
            ResourceId::new("kx.cluster", "hdb"),
            HashMap::from([
                ("node_count".to_string(), Value::Int(2)),
                (
                    "environment_id".to_string(),
                    Value::ResourceRef("main".to_string(), "id".to_string()),
                ),
            ]),
        )
        .with_identifier("env-1,hdb")
        .with_status(Status::from("RUNNING"));

        let recorded = ResourceState::from_state(&original, "aws");
        assert!(!recorded.attributes.contains_key("environment_id"));

        let restored = recorded.to_state();
        assert_eq!(restored.identifier.as_deref(), Some("env-1,hdb"));
        assert_eq!(restored.status, Some(Status::from("RUNNING")));
        assert_eq!(restored.attributes["node_count"], Value::Int(2));
        assert!(restored.exists);
    }

    #[test]
    fn successor_checks_lineage_and_serial() {
        let stored = StateFile::new();

        let mut next = stored.clone();
        next.increment_serial();
        assert!(next.check_successor_of(&stored).is_ok());
        assert!(matches!(
            stored.check_successor_of(&next),
            Err(BackendError::StaleSerial {
                stored: 1,
                attempted: 0
            })
        ));

        let mut other = StateFile::new();
        other.increment_serial();
        assert!(matches!(
            other.check_successor_of(&stored),
            Err(BackendError::LineageMismatch { .. })
        ));
    }

    #[test]
    fn test_state_file_serialization() {
        let mut state = StateFile::new();
        state.upsert_resource(volume("data").with_attribute("size", json!(1200)));

        let json = serde_json::to_string_pretty(&state).unwrap();
        let deserialized: StateFile = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, state);
    }
}
