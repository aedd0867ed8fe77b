//! Manifest - the JSON document a user hands to `settle`
//!
//! ```json
//! {
//!   "provider": { "name": "aws", "region": "us-east-1" },
//!   "backend": { "type": "local", "path": "settle.state.json" },
//!   "settings": { "poll_interval_secs": 15 },
//!   "resources": [
//!     { "type": "kx.environment", "name": "main", "attributes": { "name": "research" } },
//!     { "type": "kx.volume", "name": "data",
//!       "attributes": { "environment_id": { "$ref": "main.id" } } }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use settle_core::resource::{Resource, State, Value};
use settle_core::settings::LifecycleSettings;
use settle_state::{BackendConfig, StateFile};

/// Provider names the CLI knows how to construct
pub const PROVIDERS: &[&str] = &["aws", "awscc"];

const DEFAULT_REGION: &str = "ap-northeast-1";

/// Attribute name under which a resource's identifier can be referenced
pub const IDENTIFIER_ATTRIBUTE: &str = "identifier";

#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub settings: LifecycleSettings,
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

#[derive(Debug, Deserialize)]
pub struct ResourceDecl {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl ResourceDecl {
    pub fn to_resource(&self) -> Resource {
        let mut resource = Resource::new(&self.resource_type, &self.name);
        for (key, value) in &self.attributes {
            if let Some(value) = Value::from_json(value) {
                resource.attributes.insert(key.clone(), value);
            }
        }
        resource
    }
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&content).map_err(|e| format!("{}: {}", path.display(), e))
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))
    }

    pub fn resources(&self) -> Vec<Resource> {
        self.resources.iter().map(ResourceDecl::to_resource).collect()
    }

    /// Check everything that can be checked without calling the provider
    ///
    /// `supported` lists the resource types of the selected provider. All
    /// problems are reported together, one per line.
    pub fn validate(&self, supported: &[&str]) -> Result<(), String> {
        let mut errors = Vec::new();

        if !PROVIDERS.contains(&self.provider.name.as_str()) {
            errors.push(format!(
                "unknown provider '{}' (expected one of: {})",
                self.provider.name,
                PROVIDERS.join(", ")
            ));
        }

        let mut names = HashSet::new();
        for decl in &self.resources {
            if !supported.contains(&decl.resource_type.as_str()) {
                errors.push(format!(
                    "{}.{}: unsupported resource type '{}'",
                    decl.resource_type, decl.name, decl.resource_type
                ));
            }
            if !names.insert(decl.name.as_str()) {
                errors.push(format!("duplicate resource name '{}'", decl.name));
            }
        }

        for resource in self.resources() {
            for target in dependencies(&resource) {
                if target == resource.id.name {
                    errors.push(format!("{}: references itself", resource.id));
                } else if !names.contains(target.as_str()) {
                    errors.push(format!(
                        "{}: reference to undeclared resource '{}'",
                        resource.id, target
                    ));
                }
            }
        }

        if errors.is_empty() {
            sort_by_dependencies(&self.resources()).map(|_| ())
        } else {
            Err(errors.join("\n  "))
        }
    }
}

/// Names of the resources `resource` references
pub fn dependencies(resource: &Resource) -> HashSet<String> {
    let mut deps = HashSet::new();
    for value in resource.attributes.values() {
        collect_dependencies(value, &mut deps);
    }
    deps
}

fn collect_dependencies(value: &Value, deps: &mut HashSet<String>) {
    match value {
        Value::ResourceRef(name, _) => {
            deps.insert(name.clone());
        }
        Value::List(items) => {
            for item in items {
                collect_dependencies(item, deps);
            }
        }
        Value::Map(map) => {
            for v in map.values() {
                collect_dependencies(v, deps);
            }
        }
        _ => {}
    }
}

/// Order resources so that every resource follows the ones it references
///
/// Declaration order is kept wherever references allow it. A reference
/// cycle is an error.
pub fn sort_by_dependencies(resources: &[Resource]) -> Result<Vec<Resource>, String> {
    let by_name: HashMap<&str, &Resource> = resources
        .iter()
        .map(|r| (r.id.name.as_str(), r))
        .collect();

    fn visit<'a>(
        resource: &'a Resource,
        by_name: &HashMap<&str, &'a Resource>,
        visited: &mut HashSet<&'a str>,
        visiting: &mut Vec<&'a str>,
        sorted: &mut Vec<Resource>,
    ) -> Result<(), String> {
        let name = resource.id.name.as_str();
        if visited.contains(name) {
            return Ok(());
        }
        if let Some(pos) = visiting.iter().position(|n| *n == name) {
            let mut cycle = visiting[pos..].to_vec();
            cycle.push(name);
            return Err(format!("reference cycle: {}", cycle.join(" -> ")));
        }

        visiting.push(name);
        let mut deps: Vec<String> = dependencies(resource).into_iter().collect();
        deps.sort();
        for dep in deps {
            if let Some(&dep_resource) = by_name.get(dep.as_str()) {
                visit(dep_resource, by_name, visited, visiting, sorted)?;
            }
        }
        visiting.pop();

        visited.insert(name);
        sorted.push(resource.clone());
        Ok(())
    }

    let mut sorted = Vec::with_capacity(resources.len());
    let mut visited = HashSet::new();
    let mut visiting = Vec::new();
    for resource in resources {
        visit(resource, &by_name, &mut visited, &mut visiting, &mut sorted)?;
    }
    Ok(sorted)
}

/// Attribute values of already-managed resources, by resource name
#[derive(Debug, Default)]
pub struct Bindings {
    attributes: HashMap<String, HashMap<String, Value>>,
}

impl Bindings {
    pub fn from_state(state: &StateFile) -> Self {
        let mut bindings = Self::default();
        for recorded in &state.resources {
            bindings.record(&recorded.to_state());
        }
        bindings
    }

    /// Record the attributes of a settled resource; absent resources are forgotten
    pub fn record(&mut self, state: &State) {
        if !state.exists {
            self.remove(&state.id.name);
            return;
        }
        let mut attrs = state.attributes.clone();
        if let Some(identifier) = &state.identifier {
            attrs
                .entry(IDENTIFIER_ATTRIBUTE.to_string())
                .or_insert_with(|| Value::String(identifier.clone()));
        }
        self.attributes.insert(state.id.name.clone(), attrs);
    }

    pub fn remove(&mut self, name: &str) {
        self.attributes.remove(name);
    }

    /// Replace every reference that can be resolved; the rest stay references
    pub fn resolve(&self, resource: &Resource) -> Resource {
        Resource {
            id: resource.id.clone(),
            attributes: resource
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                .collect(),
        }
    }

    fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::ResourceRef(name, attribute) => match self
                .attributes
                .get(name)
                .and_then(|attrs| attrs.get(attribute))
            {
                Some(resolved) => self.resolve_value(resolved),
                None => value.clone(),
            },
            Value::List(items) => {
                Value::List(items.iter().map(|v| self.resolve_value(v)).collect())
            }
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }
}

/// References left in `resource` after resolution, as "name.attribute"
pub fn unresolved_refs(resource: &Resource) -> Vec<String> {
    fn collect(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::ResourceRef(name, attribute) => out.push(format!("{}.{}", name, attribute)),
            Value::List(items) => items.iter().for_each(|v| collect(v, out)),
            Value::Map(map) => map.values().for_each(|v| collect(v, out)),
            _ => {}
        }
    }

    let mut refs = Vec::new();
    for value in resource.attributes.values() {
        collect(value, &mut refs);
    }
    refs.sort();
    refs.dedup();
    refs
}
