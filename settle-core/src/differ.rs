//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the resources declared in the manifest with the state recorded
//! by the last apply and generates the Effects needed to converge.

use std::collections::{HashMap, HashSet};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = changed_attributes(&desired.attributes, &current.attributes);

    if changed.is_empty() {
        Diff::NoChange(desired.id.clone())
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Attributes whose desired value differs from the current one
///
/// Keys the current state does not report (write-only inputs such as
/// initialization scripts) and unresolved references are not compared.
/// Handlers that can change only some attributes in place use this to tell
/// which ones an update touches.
pub fn changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
) -> Vec<String> {
    let mut changed: Vec<String> = desired
        .iter()
        .filter(|(key, value)| !key.starts_with('_') && !matches!(value, Value::ResourceRef(..)))
        .filter_map(|(key, desired_value)| match current.get(key) {
            Some(current_value) if !matches_current(desired_value, current_value) => {
                Some(key.clone())
            }
            _ => None,
        })
        .collect();
    changed.sort();
    changed
}

/// Maps match when every declared entry matches; the remote may report more
fn matches_current(desired: &Value, current: &Value) -> bool {
    match (desired, current) {
        (Value::Map(desired), Value::Map(current)) => desired.iter().all(|(key, value)| {
            current
                .get(key)
                .is_some_and(|current_value| matches_current(value, current_value))
        }),
        (Value::ResourceRef(..), _) => true,
        _ => desired == current,
    }
}

/// Compute Diffs for the desired resources and deletions for everything
/// recorded in state but no longer declared
pub fn create_plan(desired: &[Resource], current_states: &HashMap<ResourceId, State>) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        match diff(resource, &current) {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update { id, from, to, .. } => plan.add(Effect::Update { id, from, to }),
            Diff::NoChange(_) => {}
        }
    }

    let declared: HashSet<&ResourceId> = desired.iter().map(|r| &r.id).collect();
    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|s| s.exists && !declared.contains(&s.id))
        .collect();
    orphans.sort_by_key(|s| s.id.to_string());
    for state in orphans {
        if let Some(identifier) = &state.identifier {
            plan.add(Effect::Delete {
                id: state.id.clone(),
                identifier: identifier.clone(),
            });
        }
    }

    plan
}

/// Delete every existing resource, last declared first
pub fn destroy_plan(states_in_creation_order: &[State]) -> Plan {
    let mut plan = Plan::new();
    for state in states_in_creation_order.iter().rev() {
        if let (true, Some(identifier)) = (state.exists, &state.identifier) {
            plan.add(Effect::Delete {
                id: state.id.clone(),
                identifier: identifier.clone(),
            });
        }
    }
    plan
}
