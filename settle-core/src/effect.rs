//! Effect - A side effect to be performed against a provider
//!
//! Effects are values; nothing happens until an [`Interpreter`](crate::interpreter::Interpreter)
//! executes them.

use crate::resource::{Resource, ResourceId, State};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Refresh the current state of a resource
    Read {
        id: ResourceId,
        identifier: Option<String>,
    },
    /// Create a resource and wait for it to settle
    Create(Resource),
    /// Update a resource in place and wait for it to settle
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
    },
    /// Delete a resource and wait until it is gone
    Delete { id: ResourceId, identifier: String },
}

impl Effect {
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Read { id, .. } | Effect::Update { id, .. } | Effect::Delete { id, .. } => id,
            Effect::Create(resource) => &resource.id,
        }
    }

    /// Whether this effect changes remote infrastructure
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Effect::Read { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Read { .. } => "read",
            Effect::Create(_) => "create",
            Effect::Update { .. } => "update",
            Effect::Delete { .. } => "delete",
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Create(resource) => write!(f, "+ {}", resource.id),
            Effect::Update { id, .. } => write!(f, "~ {}", id),
            Effect::Delete { id, identifier } => write!(f, "- {} ({})", id, identifier),
            Effect::Read { id, .. } => write!(f, "? {}", id),
        }
    }
}
