//! elb.listener_policy
//!
//! The set of policies enabled on one listener. Deleting it clears the set;
//! the listener itself belongs to the load balancer.

use aws_sdk_elasticloadbalancing::Client;
use settle_core::error::{ProviderError, ProviderResult};
use settle_core::handler::{Created, ResourceHandler};
use settle_core::identifier;
use settle_core::probe::{Observation, StatusProber};
use settle_core::provider::BoxFuture;
use settle_core::resource::{Resource, ResourceId, State, Value};
use settle_core::transition::TransitionTables;

use super::{describe_assignments, set_listener_policies};

const TABLES: TransitionTables = TransitionTables::immediate();

pub struct ListenerPolicyHandler {
    client: Client,
}

impl ListenerPolicyHandler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn policies(&self, identifier: &str) -> ProviderResult<Vec<String>> {
        let (load_balancer_name, port) = parse_identifier(identifier)?;
        let assignments = describe_assignments(&self.client, &load_balancer_name).await?;
        assignments
            .listener(port)
            .map(<[String]>::to_vec)
            .ok_or_else(|| {
                ProviderError::not_found()
                    .with_message(format!("listener {}:{}", load_balancer_name, port))
            })
    }

    async fn put(&self, resource: &Resource) -> ProviderResult<(String, i32)> {
        let load_balancer_name = resource.require_str("load_balancer_name")?;
        let port = resource.get_i32("load_balancer_port")?.ok_or_else(|| {
            ProviderError::invalid_configuration("load_balancer_port is required")
        })?;
        let policy_names = resource.get_string_list("policy_names")?.unwrap_or_default();
        set_listener_policies(&self.client, load_balancer_name, port, policy_names).await?;
        Ok((load_balancer_name.to_string(), port))
    }

    async fn create_listener_policy(&self, resource: &Resource) -> ProviderResult<Created> {
        let (load_balancer_name, port) = self.put(resource).await?;
        Ok(Created::new(identifier::encode(&[
            load_balancer_name,
            port.to_string(),
        ])))
    }

    async fn update_listener_policy(&self, identifier: &str, to: &Resource) -> ProviderResult<()> {
        let (load_balancer_name, port) = parse_identifier(identifier)?;
        let policy_names = to.get_string_list("policy_names")?.unwrap_or_default();
        set_listener_policies(&self.client, &load_balancer_name, port, policy_names).await
    }

    async fn clear(&self, identifier: &str) -> ProviderResult<()> {
        let (load_balancer_name, port) = parse_identifier(identifier)?;
        set_listener_policies(&self.client, &load_balancer_name, port, Vec::new()).await
    }

    async fn read_listener_policy(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let (load_balancer_name, port) = parse_identifier(identifier)?;
        let policy_names = self.policies(identifier).await?;
        let attributes = [
            (
                "load_balancer_name".to_string(),
                Value::String(load_balancer_name),
            ),
            (
                "load_balancer_port".to_string(),
                Value::Int(i64::from(port)),
            ),
            (
                "policy_names".to_string(),
                Value::List(policy_names.into_iter().map(Value::String).collect()),
            ),
        ]
        .into_iter()
        .collect();
        Ok(State::existing(id.clone(), attributes))
    }
}

/// `load_balancer_name,port`
fn parse_identifier(identifier: &str) -> ProviderResult<(String, i32)> {
    let (load_balancer_name, port) = identifier::decode_pair(identifier)?;
    let port = port.parse::<i32>().map_err(|_| {
        ProviderError::invalid_configuration(format!(
            "listener identifier {:?} does not end in a port number",
            identifier
        ))
    })?;
    Ok((load_balancer_name, port))
}

impl StatusProber for ListenerPolicyHandler {
    fn probe<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<Observation>> {
        Box::pin(async move {
            Observation::from_lookup(self.policies(identifier).await, |_| {
                Observation::found("AVAILABLE")
            })
        })
    }
}

impl ResourceHandler for ListenerPolicyHandler {
    fn resource_type(&self) -> &'static str {
        "elb.listener_policy"
    }

    fn identifier_parts(&self) -> usize {
        2
    }

    fn transitions(&self) -> &TransitionTables {
        &TABLES
    }

    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<Created>> {
        Box::pin(self.create_listener_policy(resource))
    }

    fn update<'a>(
        &'a self,
        identifier: &'a str,
        _from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.update_listener_policy(identifier, to))
    }

    fn delete<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.clear(identifier))
    }

    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.read_listener_policy(id, identifier))
    }
}

#[cfg(test)]
mod tests {
    use settle_core::error::ErrorKind;

    use super::*;

    #[test]
    fn identifier_carries_the_port() {
        assert_eq!(
            parse_identifier("web,443").unwrap(),
            ("web".to_string(), 443)
        );
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        let err = parse_identifier("web,https").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidConfiguration);

        let err = parse_identifier("web").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MalformedIdentifier { .. }));
    }
}
