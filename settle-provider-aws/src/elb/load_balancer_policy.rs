//! elb.load_balancer_policy
//!
//! Policies are immutable remotely, so an update deletes and recreates the
//! policy. Before the delete, the policy is removed from every listener and
//! backend server port using it; after a recreate it is put back.

use std::collections::HashMap;

use aws_sdk_elasticloadbalancing::Client;
use aws_sdk_elasticloadbalancing::types::{PolicyAttribute, PolicyDescription};
use settle_core::error::{ProviderError, ProviderResult};
use settle_core::handler::{Created, ResourceHandler};
use settle_core::hook::{HookContext, MutationHook};
use settle_core::identifier;
use settle_core::probe::{Observation, StatusProber};
use settle_core::provider::BoxFuture;
use settle_core::resource::{Resource, ResourceId, State, Value};
use settle_core::status::Operation;
use settle_core::transition::TransitionTables;

use super::PolicyApi;
use crate::errors::sdk_error;

const TABLES: TransitionTables = TransitionTables::immediate();

const LISTENER_PORTS: &str = "listener_ports";
const BACKEND_PORTS: &str = "backend_ports";

pub struct LoadBalancerPolicyHandler {
    client: Client,
    assignments: PolicyAssignments,
}

impl LoadBalancerPolicyHandler {
    pub fn new(client: Client) -> Self {
        Self {
            assignments: PolicyAssignments {
                client: client.clone(),
            },
            client,
        }
    }

    async fn describe(&self, identifier: &str) -> ProviderResult<PolicyDescription> {
        let (load_balancer_name, policy_name) = identifier::decode_pair(identifier)?;
        let output = self
            .client
            .describe_load_balancer_policies()
            .load_balancer_name(&load_balancer_name)
            .policy_names(&policy_name)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeLoadBalancerPolicies", e))?;

        output
            .policy_descriptions()
            .iter()
            .find(|p| p.policy_name() == Some(policy_name.as_str()))
            .cloned()
            .ok_or_else(|| ProviderError::not_found().with_message(format!("policy {}", policy_name)))
    }

    async fn create_policy(&self, resource: &Resource) -> ProviderResult<Created> {
        let load_balancer_name = resource.require_str("load_balancer_name")?;
        let policy_name = resource.require_str("policy_name")?;
        self.put_policy(load_balancer_name, policy_name, resource)
            .await?;
        Ok(Created::new(identifier::encode(&[
            load_balancer_name,
            policy_name,
        ])))
    }

    async fn put_policy(
        &self,
        load_balancer_name: &str,
        policy_name: &str,
        resource: &Resource,
    ) -> ProviderResult<()> {
        let mut attributes: Vec<_> = resource
            .get_string_map("policy_attributes")?
            .unwrap_or_default()
            .into_iter()
            .collect();
        attributes.sort();

        self.client
            .create_load_balancer_policy()
            .load_balancer_name(load_balancer_name)
            .policy_name(policy_name)
            .policy_type_name(resource.require_str("policy_type_name")?)
            .set_policy_attributes(Some(
                attributes
                    .into_iter()
                    .map(|(name, value)| {
                        PolicyAttribute::builder()
                            .attribute_name(name)
                            .attribute_value(value)
                            .build()
                    })
                    .collect(),
            ))
            .send()
            .await
            .map_err(|e| sdk_error("CreateLoadBalancerPolicy", e))?;
        Ok(())
    }

    async fn delete_policy(&self, identifier: &str) -> ProviderResult<()> {
        let (load_balancer_name, policy_name) = identifier::decode_pair(identifier)?;
        self.client
            .delete_load_balancer_policy()
            .load_balancer_name(load_balancer_name)
            .policy_name(policy_name)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteLoadBalancerPolicy", e))?;
        Ok(())
    }

    async fn replace_policy(&self, identifier: &str, to: &Resource) -> ProviderResult<()> {
        let (load_balancer_name, policy_name) = identifier::decode_pair(identifier)?;
        match self.delete_policy(identifier).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        self.put_policy(&load_balancer_name, &policy_name, to).await
    }

    async fn read_policy(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let (load_balancer_name, _) = identifier::decode_pair(identifier)?;
        let policy = self.describe(identifier).await?;

        let policy_attributes: HashMap<String, Value> = policy
            .policy_attribute_descriptions()
            .iter()
            .filter_map(|a| {
                Some((
                    a.attribute_name()?.to_string(),
                    Value::String(a.attribute_value().unwrap_or_default().to_string()),
                ))
            })
            .collect();

        let mut attributes = HashMap::from([
            (
                "load_balancer_name".to_string(),
                Value::String(load_balancer_name),
            ),
            (
                "policy_attributes".to_string(),
                Value::Map(policy_attributes),
            ),
        ]);
        if let Some(name) = policy.policy_name() {
            attributes.insert("policy_name".to_string(), Value::String(name.to_string()));
        }
        if let Some(type_name) = policy.policy_type_name() {
            attributes.insert(
                "policy_type_name".to_string(),
                Value::String(type_name.to_string()),
            );
        }
        Ok(State::existing(id.clone(), attributes))
    }
}

/// Moves a policy off the listeners and backend ports that use it, and back
pub(crate) struct PolicyAssignments<A = Client> {
    client: A,
}

impl<A: PolicyApi> PolicyAssignments<A> {
    async fn unassign(&self, identifier: &str) -> ProviderResult<HookContext> {
        let (load_balancer_name, policy_name) = identifier::decode_pair(identifier)?;
        let assignments = match self.client.assignments(&load_balancer_name).await {
            Ok(assignments) => assignments,
            Err(e) if e.is_not_found() => return Ok(HookContext::new()),
            Err(e) => return Err(e),
        };
        let (listener_ports, backend_ports) = assignments.ports_using(&policy_name);

        for port in &listener_ports {
            let remaining = without(assignments.listener(*port), &policy_name);
            log::info!(
                "removing policy {} from listener {}:{}",
                policy_name,
                load_balancer_name,
                port
            );
            self.client
                .set_listener_policies(&load_balancer_name, *port, remaining)
                .await?;
        }
        for port in &backend_ports {
            let remaining = without(assignments.backend(*port), &policy_name);
            log::info!(
                "removing policy {} from backend port {}:{}",
                policy_name,
                load_balancer_name,
                port
            );
            self.client
                .set_backend_policies(&load_balancer_name, *port, remaining)
                .await?;
        }

        Ok(HookContext::from([
            (LISTENER_PORTS.to_string(), ports_value(&listener_ports)),
            (BACKEND_PORTS.to_string(), ports_value(&backend_ports)),
        ]))
    }

    async fn reassign(&self, identifier: &str, context: HookContext) -> ProviderResult<()> {
        let (load_balancer_name, policy_name) = identifier::decode_pair(identifier)?;
        let listener_ports = ports_from(&context, LISTENER_PORTS);
        let backend_ports = ports_from(&context, BACKEND_PORTS);
        if listener_ports.is_empty() && backend_ports.is_empty() {
            return Ok(());
        }

        let assignments = self.client.assignments(&load_balancer_name).await?;
        for port in listener_ports {
            let names = with(assignments.listener(port), &policy_name);
            log::info!(
                "restoring policy {} on listener {}:{}",
                policy_name,
                load_balancer_name,
                port
            );
            self.client
                .set_listener_policies(&load_balancer_name, port, names)
                .await?;
        }
        for port in backend_ports {
            let names = with(assignments.backend(port), &policy_name);
            log::info!(
                "restoring policy {} on backend port {}:{}",
                policy_name,
                load_balancer_name,
                port
            );
            self.client
                .set_backend_policies(&load_balancer_name, port, names)
                .await?;
        }
        Ok(())
    }
}

impl<A: PolicyApi> MutationHook for PolicyAssignments<A> {
    fn before<'a>(
        &'a self,
        operation: Operation,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<HookContext>> {
        Box::pin(async move {
            match operation {
                Operation::Update | Operation::Delete => self.unassign(identifier).await,
                Operation::Create | Operation::Read => Ok(HookContext::new()),
            }
        })
    }

    fn after<'a>(
        &'a self,
        operation: Operation,
        identifier: &'a str,
        context: HookContext,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            match operation {
                Operation::Update => self.reassign(identifier, context).await,
                Operation::Create | Operation::Read | Operation::Delete => Ok(()),
            }
        })
    }
}

fn without(names: Option<&[String]>, policy: &str) -> Vec<String> {
    names
        .unwrap_or_default()
        .iter()
        .filter(|n| *n != policy)
        .cloned()
        .collect()
}

fn with(names: Option<&[String]>, policy: &str) -> Vec<String> {
    let mut names = without(names, policy);
    names.push(policy.to_string());
    names
}

fn ports_value(ports: &[i32]) -> Value {
    Value::List(ports.iter().map(|p| Value::Int(i64::from(*p))).collect())
}

fn ports_from(context: &HookContext, key: &str) -> Vec<i32> {
    match context.get(key) {
        Some(Value::List(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Int(port) => i32::try_from(*port).ok(),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

impl StatusProber for LoadBalancerPolicyHandler {
    fn probe<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<Observation>> {
        Box::pin(async move {
            Observation::from_lookup(self.describe(identifier).await, |_| {
                Observation::found("AVAILABLE")
            })
        })
    }
}

impl ResourceHandler for LoadBalancerPolicyHandler {
    fn resource_type(&self) -> &'static str {
        "elb.load_balancer_policy"
    }

    fn identifier_parts(&self) -> usize {
        2
    }

    fn transitions(&self) -> &TransitionTables {
        &TABLES
    }

    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<Created>> {
        Box::pin(self.create_policy(resource))
    }

    fn update<'a>(
        &'a self,
        identifier: &'a str,
        _from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.replace_policy(identifier, to))
    }

    fn delete<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.delete_policy(identifier))
    }

    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.read_policy(id, identifier))
    }

    fn hook(&self) -> Option<&dyn MutationHook> {
        Some(&self.assignments)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::elb::Assignments;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn without_removes_only_the_policy() {
        let current = names(&["tls", "stickiness"]);
        assert_eq!(without(Some(current.as_slice()), "tls"), names(&["stickiness"]));
        assert!(without(None, "tls").is_empty());
    }

    #[test]
    fn with_does_not_duplicate() {
        let current = names(&["stickiness", "tls"]);
        assert_eq!(with(Some(current.as_slice()), "tls"), names(&["stickiness", "tls"]));
        assert_eq!(with(None, "tls"), names(&["tls"]));
    }

    #[test]
    fn ports_survive_the_hook_context() {
        let context = HookContext::from([
            (LISTENER_PORTS.to_string(), ports_value(&[443, 8443])),
            (BACKEND_PORTS.to_string(), ports_value(&[])),
        ]);
        assert_eq!(ports_from(&context, LISTENER_PORTS), vec![443, 8443]);
        assert!(ports_from(&context, BACKEND_PORTS).is_empty());
        assert!(ports_from(&HookContext::new(), LISTENER_PORTS).is_empty());
    }

    /// One load balancer held in memory, recording every policy change
    #[derive(Default)]
    struct InMemoryElb {
        load_balancer: Option<(&'static str, Mutex<Assignments>)>,
        calls: Mutex<Vec<String>>,
    }

    impl InMemoryElb {
        fn with(name: &'static str, assignments: Assignments) -> Self {
            Self {
                load_balancer: Some((name, Mutex::new(assignments))),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn find(&self, name: &str) -> ProviderResult<&Mutex<Assignments>> {
            match &self.load_balancer {
                Some((lb, assignments)) if *lb == name => Ok(assignments),
                _ => Err(ProviderError::not_found().with_message(format!("load balancer {}", name))),
            }
        }

        fn set(
            &self,
            kind: &str,
            name: &str,
            port: i32,
            policy_names: Vec<String>,
        ) -> ProviderResult<()> {
            let mut assignments = self.find(name)?.lock().unwrap();
            let entries = if kind == "listener" {
                &mut assignments.listeners
            } else {
                &mut assignments.backends
            };
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {} [{}]", kind, port, policy_names.join(",")));
            match entries.iter_mut().find(|(p, _)| *p == port) {
                Some((_, names)) => *names = policy_names,
                None => entries.push((port, policy_names)),
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn current(&self) -> Assignments {
            self.find("web").unwrap().lock().unwrap().clone()
        }
    }

    impl PolicyApi for InMemoryElb {
        fn assignments<'a>(
            &'a self,
            load_balancer_name: &'a str,
        ) -> BoxFuture<'a, ProviderResult<Assignments>> {
            let result = self
                .find(load_balancer_name)
                .map(|assignments| assignments.lock().unwrap().clone());
            Box::pin(async move { result })
        }

        fn set_listener_policies<'a>(
            &'a self,
            load_balancer_name: &'a str,
            port: i32,
            policy_names: Vec<String>,
        ) -> BoxFuture<'a, ProviderResult<()>> {
            let result = self.set("listener", load_balancer_name, port, policy_names);
            Box::pin(async move { result })
        }

        fn set_backend_policies<'a>(
            &'a self,
            load_balancer_name: &'a str,
            port: i32,
            policy_names: Vec<String>,
        ) -> BoxFuture<'a, ProviderResult<()>> {
            let result = self.set("backend", load_balancer_name, port, policy_names);
            Box::pin(async move { result })
        }
    }

    fn web() -> PolicyAssignments<InMemoryElb> {
        PolicyAssignments {
            client: InMemoryElb::with(
                "web",
                Assignments {
                    listeners: vec![
                        (443, names(&["tls", "stickiness"])),
                        (80, names(&["stickiness"])),
                    ],
                    backends: vec![(8443, names(&["tls"]))],
                },
            ),
        }
    }

    #[tokio::test]
    async fn update_moves_policy_off_and_back_on() {
        let hook = web();

        let context = hook.before(Operation::Update, "web,tls").await.unwrap();

        assert_eq!(ports_from(&context, LISTENER_PORTS), vec![443]);
        assert_eq!(ports_from(&context, BACKEND_PORTS), vec![8443]);
        assert_eq!(
            hook.client.calls(),
            vec!["listener 443 [stickiness]", "backend 8443 []"]
        );
        assert_eq!(hook.client.current().ports_using("tls"), (vec![], vec![]));

        hook.after(Operation::Update, "web,tls", context).await.unwrap();

        assert_eq!(
            hook.client.calls(),
            vec![
                "listener 443 [stickiness]",
                "backend 8443 []",
                "listener 443 [stickiness,tls]",
                "backend 8443 [tls]",
            ]
        );
        assert_eq!(hook.client.current().ports_using("tls"), (vec![443], vec![8443]));
        assert_eq!(
            hook.client.current().listener(80),
            Some(&names(&["stickiness"])[..])
        );
    }

    #[tokio::test]
    async fn delete_unassigns_without_restoring() {
        let hook = web();

        let context = hook.before(Operation::Delete, "web,tls").await.unwrap();
        hook.after(Operation::Delete, "web,tls", context).await.unwrap();

        assert_eq!(hook.client.calls().len(), 2);
        assert_eq!(hook.client.current().ports_using("tls"), (vec![], vec![]));
    }

    #[tokio::test]
    async fn missing_load_balancer_needs_no_unassignment() {
        let hook = PolicyAssignments {
            client: InMemoryElb::default(),
        };

        let context = hook.before(Operation::Delete, "gone,tls").await.unwrap();

        assert!(context.is_empty());
        assert!(hook.client.calls().is_empty());
    }

    #[tokio::test]
    async fn unused_policy_is_left_alone() {
        let hook = web();

        let context = hook.before(Operation::Update, "web,unused").await.unwrap();
        hook.after(Operation::Update, "web,unused", context).await.unwrap();

        assert!(hook.client.calls().is_empty());
    }
}
