//! FinSpace managed kdb (Kx) resources
//!
//! Every Kx resource lives inside an environment, so all identifiers except
//! the environment's own start with the environment id.

mod cluster;
mod database;
mod dataview;
mod environment;
mod scaling_group;
mod volume;

use std::collections::HashMap;

use aws_sdk_finspace::Client;
use settle_core::handler::{HandlerRegistry, RegistryError};
use settle_core::probe::Observation;
use settle_core::resource::{Resource, Value};

pub use cluster::KxClusterHandler;
pub use database::KxDatabaseHandler;
pub use dataview::KxDataviewHandler;
pub use environment::KxEnvironmentHandler;
pub use scaling_group::KxScalingGroupHandler;
pub use volume::KxVolumeHandler;

/// Register every Kx handler
pub fn register(registry: &mut HandlerRegistry, client: &Client) -> Result<(), RegistryError> {
    registry.register(KxEnvironmentHandler::new(client.clone()))?;
    registry.register(KxClusterHandler::new(client.clone()))?;
    registry.register(KxDatabaseHandler::new(client.clone()))?;
    registry.register(KxVolumeHandler::new(client.clone()))?;
    registry.register(KxDataviewHandler::new(client.clone()))?;
    registry.register(KxScalingGroupHandler::new(client.clone()))?;
    Ok(())
}

/// Idempotency token for a mutating call
pub(crate) fn client_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Observation from a status enum and its optional reason
///
/// A resource that reports no status is treated as still pending.
pub(crate) fn observe(status: Option<&str>, reason: Option<&str>) -> Observation {
    Observation::found(status.unwrap_or("UNKNOWN")).with_reason(reason)
}

pub(crate) fn string(value: &str) -> Value {
    Value::String(value.to_string())
}

pub(crate) fn string_list(values: &[String]) -> Value {
    Value::List(values.iter().map(|v| string(v)).collect())
}

/// Attribute map builder that skips absent values
#[derive(Default)]
pub(crate) struct Attributes(HashMap<String, Value>);

impl Attributes {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(mut self, key: &str, value: Value) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub(crate) fn str(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.set(key, string(v)),
            None => self,
        }
    }

    pub(crate) fn int(self, key: &str, value: Option<i32>) -> Self {
        match value {
            Some(v) => self.set(key, Value::Int(i64::from(v))),
            None => self,
        }
    }

    pub(crate) fn into_map(self) -> HashMap<String, Value> {
        self.0
    }
}

/// Tags to send with a create request; `None` when the manifest sets none
pub(crate) fn tags(resource: &Resource) -> settle_core::error::ProviderResult<Option<HashMap<String, String>>> {
    Ok(resource.get_string_map("tags")?.filter(|t| !t.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use settle_core::status::Status;

    #[test]
    fn observe_keeps_status_and_reason() {
        assert_eq!(
            observe(Some("CREATE_FAILED"), Some("subnet full")),
            Observation::Found {
                status: Status::from("CREATE_FAILED"),
                reason: Some("subnet full".to_string()),
            }
        );
        assert_eq!(observe(None, None), Observation::found("UNKNOWN"));
    }

    #[test]
    fn attributes_skip_absent_values() {
        let attrs = Attributes::new()
            .str("description", None)
            .str("name", Some("hdb"))
            .int("size", Some(1200))
            .into_map();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.get("size"), Some(&Value::Int(1200)));
    }

    #[test]
    fn client_tokens_are_unique() {
        assert_ne!(client_token(), client_token());
    }
}
