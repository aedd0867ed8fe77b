//! Classic Elastic Load Balancing policies
//!
//! Policy calls complete synchronously. The awkward part is that a policy
//! in use by a listener or backend server port cannot be deleted, so the
//! policy handler carries a hook that moves those assignments out of the way.

mod listener_policy;
mod load_balancer_policy;

use aws_sdk_elasticloadbalancing::Client;
use settle_core::error::{ProviderError, ProviderResult};
use settle_core::handler::{HandlerRegistry, RegistryError};
use settle_core::provider::BoxFuture;

use crate::errors::sdk_error;

pub use listener_policy::ListenerPolicyHandler;
pub use load_balancer_policy::LoadBalancerPolicyHandler;

pub fn register(registry: &mut HandlerRegistry, client: &Client) -> Result<(), RegistryError> {
    registry.register(LoadBalancerPolicyHandler::new(client.clone()))?;
    registry.register(ListenerPolicyHandler::new(client.clone()))?;
    Ok(())
}

/// Policy names assigned to each listener and backend server port
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Assignments {
    pub listeners: Vec<(i32, Vec<String>)>,
    pub backends: Vec<(i32, Vec<String>)>,
}

impl Assignments {
    /// Listener and backend ports that use `policy`
    pub(crate) fn ports_using(&self, policy: &str) -> (Vec<i32>, Vec<i32>) {
        let using = |entries: &[(i32, Vec<String>)]| -> Vec<i32> {
            entries
                .iter()
                .filter(|(_, names)| names.iter().any(|n| n == policy))
                .map(|(port, _)| *port)
                .collect()
        };
        (using(&self.listeners), using(&self.backends))
    }

    pub(crate) fn listener(&self, port: i32) -> Option<&[String]> {
        self.listeners
            .iter()
            .find(|(p, _)| *p == port)
            .map(|(_, names)| names.as_slice())
    }

    pub(crate) fn backend(&self, port: i32) -> Option<&[String]> {
        self.backends
            .iter()
            .find(|(p, _)| *p == port)
            .map(|(_, names)| names.as_slice())
    }
}

/// The policy assignment calls, separate from the SDK client so hooks can
/// run against an in-memory load balancer
pub(crate) trait PolicyApi: Send + Sync {
    fn assignments<'a>(&'a self, load_balancer_name: &'a str)
    -> BoxFuture<'a, ProviderResult<Assignments>>;

    fn set_listener_policies<'a>(
        &'a self,
        load_balancer_name: &'a str,
        port: i32,
        policy_names: Vec<String>,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    fn set_backend_policies<'a>(
        &'a self,
        load_balancer_name: &'a str,
        port: i32,
        policy_names: Vec<String>,
    ) -> BoxFuture<'a, ProviderResult<()>>;
}

impl PolicyApi for Client {
    fn assignments<'a>(
        &'a self,
        load_balancer_name: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Assignments>> {
        Box::pin(describe_assignments(self, load_balancer_name))
    }

    fn set_listener_policies<'a>(
        &'a self,
        load_balancer_name: &'a str,
        port: i32,
        policy_names: Vec<String>,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(set_listener_policies(self, load_balancer_name, port, policy_names))
    }

    fn set_backend_policies<'a>(
        &'a self,
        load_balancer_name: &'a str,
        port: i32,
        policy_names: Vec<String>,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(set_backend_policies(self, load_balancer_name, port, policy_names))
    }
}

pub(crate) async fn describe_assignments(
    client: &Client,
    load_balancer_name: &str,
) -> ProviderResult<Assignments> {
    let output = client
        .describe_load_balancers()
        .load_balancer_names(load_balancer_name)
        .send()
        .await
        .map_err(|e| sdk_error("DescribeLoadBalancers", e))?;

    let description = output.load_balancer_descriptions().first().ok_or_else(|| {
        ProviderError::not_found().with_message(format!("load balancer {}", load_balancer_name))
    })?;

    let listeners = description
        .listener_descriptions()
        .iter()
        .filter_map(|ld| {
            let port = ld.listener()?.load_balancer_port();
            Some((port, ld.policy_names().to_vec()))
        })
        .collect();
    let backends = description
        .backend_server_descriptions()
        .iter()
        .filter_map(|bd| Some((bd.instance_port()?, bd.policy_names().to_vec())))
        .collect();

    Ok(Assignments {
        listeners,
        backends,
    })
}

pub(crate) async fn set_listener_policies(
    client: &Client,
    load_balancer_name: &str,
    port: i32,
    policy_names: Vec<String>,
) -> ProviderResult<()> {
    client
        .set_load_balancer_policies_of_listener()
        .load_balancer_name(load_balancer_name)
        .load_balancer_port(port)
        .set_policy_names(Some(policy_names))
        .send()
        .await
        .map_err(|e| sdk_error("SetLoadBalancerPoliciesOfListener", e))?;
    Ok(())
}

pub(crate) async fn set_backend_policies(
    client: &Client,
    load_balancer_name: &str,
    port: i32,
    policy_names: Vec<String>,
) -> ProviderResult<()> {
    client
        .set_load_balancer_policies_for_backend_server()
        .load_balancer_name(load_balancer_name)
        .instance_port(port)
        .set_policy_names(Some(policy_names))
        .send()
        .await
        .map_err(|e| sdk_error("SetLoadBalancerPoliciesForBackendServer", e))?;
    Ok(())
}
