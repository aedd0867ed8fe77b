//! Resource - Representing resources and their state

use std::collections::HashMap;

use crate::error::{ProviderError, ProviderResult};
use crate::status::Status;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Resource type (e.g., "kx.cluster", "elb.listener_policy")
    pub resource_type: String,
    /// Resource name (identifier specified in the manifest)
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    /// Reference to another resource's attribute (resource name, attribute name)
    ResourceRef(String, String),
}

impl Value {
    /// Convert to JSON. References have no JSON form and become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::ResourceRef(..) => serde_json::Value::Null,
        }
    }

    /// Convert from JSON
    ///
    /// `{"$ref": "name.attribute"}` becomes a [`Value::ResourceRef`]. Floats are
    /// truncated; `null` has no representation.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Value::Int),
            serde_json::Value::Array(arr) => {
                Some(Value::List(arr.iter().filter_map(Value::from_json).collect()))
            }
            serde_json::Value::Object(obj) => {
                if obj.len() == 1
                    && let Some(serde_json::Value::String(target)) = obj.get("$ref")
                    && let Some((name, attribute)) = target.split_once('.')
                {
                    return Some(Value::ResourceRef(name.to_string(), attribute.to_string()));
                }
                Some(Value::Map(
                    obj.iter()
                        .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                        .collect(),
                ))
            }
            serde_json::Value::Null => None,
        }
    }
}

/// Desired state declared in the manifest
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    fn invalid(&self, message: String) -> ProviderError {
        ProviderError::invalid_configuration(message).for_resource(self.id.clone())
    }

    /// Optional string attribute; a value of another type is an error
    pub fn get_str(&self, key: &str) -> ProviderResult<Option<&str>> {
        match self.attributes.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.invalid(format!("{} must be a string, got {:?}", key, other))),
        }
    }

    pub fn require_str(&self, key: &str) -> ProviderResult<&str> {
        self.get_str(key)?
            .ok_or_else(|| self.invalid(format!("{} is required", key)))
    }

    pub fn get_bool(&self, key: &str) -> ProviderResult<Option<bool>> {
        match self.attributes.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.invalid(format!("{} must be a bool, got {:?}", key, other))),
        }
    }

    pub fn get_i64(&self, key: &str) -> ProviderResult<Option<i64>> {
        match self.attributes.get(key) {
            None => Ok(None),
            Some(Value::Int(i)) => Ok(Some(*i)),
            Some(other) => Err(self.invalid(format!(
                "{} must be an integer, got {:?}",
                key, other
            ))),
        }
    }

    /// Integer attribute narrowed to the 32-bit width most remote APIs use
    pub fn get_i32(&self, key: &str) -> ProviderResult<Option<i32>> {
        match self.get_i64(key)? {
            None => Ok(None),
            Some(i) => i32::try_from(i)
                .map(Some)
                .map_err(|_| self.invalid(format!("{} is out of range: {}", key, i))),
        }
    }

    pub fn get_string_list(&self, key: &str) -> ProviderResult<Option<Vec<String>>> {
        match self.attributes.get(key) {
            None => Ok(None),
            Some(Value::List(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(self.invalid(format!(
                        "{} must contain only strings, got {:?}",
                        key, other
                    ))),
                })
                .collect::<ProviderResult<Vec<_>>>()
                .map(Some),
            Some(other) => Err(self.invalid(format!("{} must be a list, got {:?}", key, other))),
        }
    }

    pub fn get_string_map(&self, key: &str) -> ProviderResult<Option<HashMap<String, String>>> {
        match self.attributes.get(key) {
            None => Ok(None),
            Some(Value::Map(map)) => map
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => Ok((k.clone(), s.clone())),
                    other => Err(self.invalid(format!(
                        "{}.{} must be a string, got {:?}",
                        key, k, other
                    ))),
                })
                .collect::<ProviderResult<HashMap<_, _>>>()
                .map(Some),
            Some(other) => Err(self.invalid(format!("{} must be a map, got {:?}", key, other))),
        }
    }

    /// A map attribute viewed as a resource of its own, for nested blocks
    pub fn nested(&self, key: &str) -> ProviderResult<Option<Resource>> {
        match self.attributes.get(key) {
            None => Ok(None),
            Some(Value::Map(map)) => Ok(Some(Resource {
                id: self.id.clone(),
                attributes: map.clone(),
            })),
            Some(other) => Err(self.invalid(format!("{} must be a map, got {:?}", key, other))),
        }
    }

    /// A list of map attributes, each viewed as a nested block
    pub fn nested_list(&self, key: &str) -> ProviderResult<Vec<Resource>> {
        match self.attributes.get(key) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Map(map) => Ok(Resource {
                        id: self.id.clone(),
                        attributes: map.clone(),
                    }),
                    other => Err(self.invalid(format!(
                        "{} must contain only maps, got {:?}",
                        key, other
                    ))),
                })
                .collect(),
            Some(other) => Err(self.invalid(format!("{} must be a list, got {:?}", key, other))),
        }
    }
}

/// Current state fetched from actual infrastructure
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Composite identifier addressing the resource remotely (e.g., env-123,cluster-a)
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Last status observed for the resource, if the remote reports one
    pub status: Option<Status>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            status: None,
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            status: None,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Fill in attributes that the remote read did not report
    pub fn merge_missing(&mut self, generated: &HashMap<String, Value>) {
        for (key, value) in generated {
            self.attributes
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}
