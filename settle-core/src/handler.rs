//! Resource handlers and the registry a provider builds them into
//!
//! A handler knows one remote resource type: how to translate declared
//! attributes into mutating calls, how to read the resource back, how to
//! probe its status and which transition tables govern its waits. It does
//! not wait itself; the reconciler drives the waits.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::error::{ErrorKind, ProviderError, ProviderResult};
use crate::hook::MutationHook;
use crate::probe::StatusProber;
use crate::provider::BoxFuture;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::status::Operation;
use crate::transition::{TableError, TransitionTables};

/// Result of a create dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    /// Composite identifier of the new resource
    pub identifier: String,
    /// Fields the remote generated (ARNs, IDs) that a later read may not return
    pub attributes: HashMap<String, Value>,
}

impl Created {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

pub trait ResourceHandler: StatusProber {
    /// Resource type name (e.g., "kx.cluster")
    fn resource_type(&self) -> &'static str;

    /// Number of parts in this type's composite identifier
    fn identifier_parts(&self) -> usize;

    fn transitions(&self) -> &TransitionTables;

    /// Issue the create call
    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<Created>>;

    /// Issue the update call
    fn update<'a>(
        &'a self,
        _identifier: &'a str,
        _from: &'a State,
        _to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        let resource_type = self.resource_type();
        Box::pin(async move {
            Err(ProviderError::unsupported(format!(
                "{} cannot be updated in place",
                resource_type
            )))
        })
    }

    /// Issue the delete call
    fn delete<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<()>>;

    /// Read the full attributes of an existing resource
    ///
    /// Returns a `NotFound` error if the resource does not exist.
    fn read<'a>(&'a self, id: &'a ResourceId, identifier: &'a str)
    -> BoxFuture<'a, ProviderResult<State>>;

    fn hook(&self) -> Option<&dyn MutationHook> {
        None
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("handler for {0} is already registered")]
    Duplicate(&'static str),

    #[error("invalid {operation} table for {resource_type}: {source}")]
    InvalidTable {
        resource_type: &'static str,
        operation: Operation,
        #[source]
        source: TableError,
    },
}

impl From<RegistryError> for ProviderError {
    fn from(e: RegistryError) -> Self {
        ProviderError::new(ErrorKind::InvalidConfiguration)
            .with_message(e.to_string())
            .with_cause(e)
    }
}

/// Handlers keyed by resource type
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn ResourceHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler after validating its transition tables
    pub fn register(&mut self, handler: impl ResourceHandler + 'static) -> Result<(), RegistryError> {
        let resource_type = handler.resource_type();
        if self.handlers.contains_key(resource_type) {
            return Err(RegistryError::Duplicate(resource_type));
        }

        let tables = handler.transitions();
        for operation in [Operation::Create, Operation::Update, Operation::Delete] {
            if let Some(table) = tables.for_operation(operation) {
                table.validate().map_err(|source| RegistryError::InvalidTable {
                    resource_type,
                    operation,
                    source,
                })?;
            }
        }

        log::debug!("registered handler for {}", resource_type);
        self.handlers.insert(resource_type, Arc::new(handler));
        Ok(())
    }

    pub fn with(mut self, handler: impl ResourceHandler + 'static) -> Result<Self, RegistryError> {
        self.register(handler)?;
        Ok(self)
    }

    pub fn get(&self, resource_type: &str) -> Option<&Arc<dyn ResourceHandler>> {
        self.handlers.get(resource_type)
    }

    /// Registered resource types, sorted
    pub fn resource_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("resource_types", &self.resource_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Observation;
    use crate::transition::TransitionTable;

    struct Fixed {
        resource_type: &'static str,
        tables: TransitionTables,
    }

    impl StatusProber for Fixed {
        fn probe<'a>(&'a self, _identifier: &'a str) -> BoxFuture<'a, ProviderResult<crate::probe::Observation>> {
            Box::pin(async { Ok(Observation::found("ACTIVE")) })
        }
    }

    impl ResourceHandler for Fixed {
        fn resource_type(&self) -> &'static str {
            self.resource_type
        }

        fn identifier_parts(&self) -> usize {
            2
        }

        fn transitions(&self) -> &TransitionTables {
            &self.tables
        }

        fn create<'a>(&'a self, _resource: &'a Resource) -> BoxFuture<'a, ProviderResult<Created>> {
            Box::pin(async { Ok(Created::new("env-1,a")) })
        }

        fn delete<'a>(&'a self, _identifier: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn read<'a>(
            &'a self,
            id: &'a ResourceId,
            identifier: &'a str,
        ) -> BoxFuture<'a, ProviderResult<State>> {
            Box::pin(async move {
                Ok(State::existing(id.clone(), HashMap::new()).with_identifier(identifier))
            })
        }
    }

    fn fixed(resource_type: &'static str, create: TransitionTable) -> Fixed {
        Fixed {
            resource_type,
            tables: TransitionTables {
                create: Some(create),
                ..Default::default()
            },
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = HandlerRegistry::new()
            .with(fixed("kx.volume", TransitionTable::new(&["CREATING"], &["ACTIVE"])))
            .unwrap()
            .with(fixed("kx.cluster", TransitionTable::new(&["CREATING"], &["RUNNING"])))
            .unwrap();

        assert_eq!(registry.resource_types(), vec!["kx.cluster", "kx.volume"]);
        assert!(registry.get("kx.volume").is_some());
        assert!(registry.get("kx.dataview").is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(fixed("kx.volume", TransitionTable::new(&["CREATING"], &["ACTIVE"])))
            .unwrap();
        let err = registry
            .register(fixed("kx.volume", TransitionTable::new(&["CREATING"], &["ACTIVE"])))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate("kx.volume")));
    }

    #[test]
    fn invalid_table_is_rejected_at_registration() {
        let err = HandlerRegistry::new()
            .with(fixed("kx.volume", TransitionTable::new(&["ACTIVE"], &["ACTIVE"])))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid create table for kx.volume: status ACTIVE appears in both the pending and target sets"
        );

        let provider_error = ProviderError::from(err);
        assert_eq!(provider_error.kind, ErrorKind::InvalidConfiguration);
    }

    #[tokio::test]
    async fn update_is_unsupported_by_default() {
        let handler = fixed("kx.scaling_group", TransitionTable::new(&["CREATING"], &["ACTIVE"]));
        let from = State::not_found(ResourceId::new("kx.scaling_group", "g"));
        let to = Resource::new("kx.scaling_group", "g");
        let err = handler.update("env-1,g", &from, &to).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unsupported);
    }
}
