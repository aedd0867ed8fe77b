//! One handler type serving every Cloud Control resource configuration

use std::sync::Arc;

use settle_core::error::{ProviderError, ProviderResult};
use settle_core::handler::{Created, ResourceHandler};
use settle_core::hook::{HookContext, MutationHook};
use settle_core::probe::{Observation, StatusProber};
use settle_core::provider::BoxFuture;
use settle_core::resource::{Resource, ResourceId, State, Value};
use settle_core::status::Operation;
use settle_core::transition::TransitionTables;

use crate::cloudcontrol::CloudControl;
use crate::convert::{attached_vpc, attributes_from, desired_state, patch_operations};
use crate::resources::{ResourceConfig, VPC_GATEWAY_ATTACHMENT_CONFIG};

/// Cloud Control tracks the request; once it succeeds the resource is ready
const TABLES: TransitionTables = TransitionTables::immediate();

pub struct CloudControlHandler {
    config: &'static ResourceConfig,
    api: Arc<CloudControl>,
    hook: Option<Box<dyn MutationHook>>,
}

impl CloudControlHandler {
    pub fn new(config: &'static ResourceConfig, api: Arc<CloudControl>) -> Self {
        Self {
            config,
            api,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: impl MutationHook + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    async fn create_resource(&self, resource: &Resource) -> ProviderResult<Created> {
        let desired = desired_state(resource, self.config)?;
        let identifier = self
            .api
            .create_resource(self.config.aws_type_name, desired)
            .await?;
        Ok(Created::new(identifier))
    }

    async fn update_resource(
        &self,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<()> {
        let ops = patch_operations(from, to, self.config)?;
        if ops.is_empty() {
            log::debug!("{} {}: nothing to patch", self.config.resource_type, identifier);
        }
        self.api
            .update_resource(self.config.aws_type_name, identifier, ops)
            .await
    }

    async fn read_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let props = self
            .api
            .get_resource(self.config.aws_type_name, identifier)
            .await?;
        Ok(State::existing(id.clone(), attributes_from(&props, self.config)))
    }
}

impl StatusProber for CloudControlHandler {
    fn probe<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<Observation>> {
        Box::pin(async move {
            Observation::from_lookup(
                self.api
                    .get_resource(self.config.aws_type_name, identifier)
                    .await,
                |_| Observation::found("AVAILABLE"),
            )
        })
    }
}

impl ResourceHandler for CloudControlHandler {
    fn resource_type(&self) -> &'static str {
        self.config.resource_type
    }

    fn identifier_parts(&self) -> usize {
        1
    }

    fn transitions(&self) -> &TransitionTables {
        &TABLES
    }

    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<Created>> {
        Box::pin(self.create_resource(resource))
    }

    fn update<'a>(
        &'a self,
        identifier: &'a str,
        from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.update_resource(identifier, from, to))
    }

    fn delete<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(
            self.api
                .delete_resource(self.config.aws_type_name, identifier),
        )
    }

    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.read_resource(id, identifier))
    }

    fn hook(&self) -> Option<&dyn MutationHook> {
        self.hook.as_deref()
    }
}

/// Detaches an internet gateway from its VPC before it is deleted
///
/// The attachment is a resource of its own; it may have been made outside
/// the manifest, so it is looked up by gateway.
pub struct DetachFromVpc {
    api: Arc<CloudControl>,
}

impl DetachFromVpc {
    pub fn new(api: Arc<CloudControl>) -> Self {
        Self { api }
    }

    /// Identifier and VPC of the attachment holding `gateway_id`
    async fn attachment(&self, gateway_id: &str) -> ProviderResult<Option<(String, String)>> {
        let attachment_type = VPC_GATEWAY_ATTACHMENT_CONFIG.aws_type_name;
        for (identifier, listed) in self.api.list_resources(attachment_type).await? {
            let props = if listed.get("InternetGatewayId").is_some() {
                listed
            } else {
                match self.api.get_resource(attachment_type, &identifier).await {
                    Ok(props) => props,
                    Err(e) if e.is_not_found() => continue,
                    Err(e) => return Err(e),
                }
            };
            if let Some(vpc_id) = attached_vpc(&props, gateway_id) {
                return Ok(Some((identifier, vpc_id.to_string())));
            }
        }
        Ok(None)
    }

    async fn detach(&self, gateway_id: &str) -> ProviderResult<HookContext> {
        let Some((attachment, vpc_id)) = self.attachment(gateway_id).await? else {
            return Ok(HookContext::new());
        };

        log::info!("detaching {} from {}", gateway_id, vpc_id);
        match self
            .api
            .delete_resource(VPC_GATEWAY_ATTACHMENT_CONFIG.aws_type_name, &attachment)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                return Err(ProviderError::new(e.kind.clone())
                    .with_message(format!("could not detach {} from {}", gateway_id, vpc_id))
                    .with_cause(e));
            }
        }
        Ok(HookContext::from([(
            "vpc_id".to_string(),
            Value::String(vpc_id),
        )]))
    }
}

impl MutationHook for DetachFromVpc {
    fn before<'a>(
        &'a self,
        operation: Operation,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<HookContext>> {
        Box::pin(async move {
            match operation {
                Operation::Delete => self.detach(identifier).await,
                _ => Ok(HookContext::new()),
            }
        })
    }
}
