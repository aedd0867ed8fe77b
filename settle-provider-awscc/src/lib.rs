//! Settle AWS Cloud Control Provider
//!
//! ## Module Structure
//!
//! - `resources` - Resource type configurations
//! - `cloudcontrol` - Cloud Control API calls
//! - `request` - Request status tracking on the settle waiter
//! - `handler` - Resource handler shared by every configuration
//! - `convert` - Attribute <-> property conversion

pub mod cloudcontrol;
mod convert;
mod errors;
pub mod handler;
mod request;
pub mod resources;

use std::sync::Arc;

use aws_config::Region;
use aws_sdk_cloudcontrol::Client as CloudControlClient;
use settle_core::CancellationToken;
use settle_core::error::ProviderResult;
use settle_core::handler::{HandlerRegistry, RegistryError};
use settle_core::provider::{BoxFuture, Provider};
use settle_core::reconciler::Reconciler;
use settle_core::resource::{Resource, ResourceId, State};
use settle_core::settings::LifecycleSettings;

pub use cloudcontrol::CloudControl;
pub use handler::{CloudControlHandler, DetachFromVpc};

use resources::{CONFIGS, INTERNET_GATEWAY_CONFIG};

/// AWS Cloud Control Provider
pub struct AwsccProvider {
    reconciler: Reconciler,
    region: String,
}

impl AwsccProvider {
    /// Create a new AwsccProvider for the specified region
    pub async fn new(
        region: &str,
        settings: LifecycleSettings,
        cancel: CancellationToken,
    ) -> ProviderResult<Self> {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self::with_client(
            CloudControlClient::new(&config),
            region.to_string(),
            settings,
            cancel,
        )
    }

    pub fn with_client(
        client: CloudControlClient,
        region: String,
        settings: LifecycleSettings,
        cancel: CancellationToken,
    ) -> ProviderResult<Self> {
        let api = Arc::new(CloudControl::new(client, settings.clone(), cancel.clone()));
        let registry = registry(&api)?;
        Ok(Self {
            reconciler: Reconciler::new("awscc", registry)
                .with_settings(settings)
                .with_cancellation(cancel),
            region,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

fn registry(api: &Arc<CloudControl>) -> Result<HandlerRegistry, RegistryError> {
    let mut registry = HandlerRegistry::new();
    for config in CONFIGS.iter().copied() {
        let handler = CloudControlHandler::new(config, Arc::clone(api));
        if config.resource_type == INTERNET_GATEWAY_CONFIG.resource_type {
            registry.register(handler.with_hook(DetachFromVpc::new(Arc::clone(api))))?;
        } else {
            registry.register(handler)?;
        }
    }
    Ok(registry)
}

impl Provider for AwsccProvider {
    fn name(&self) -> &'static str {
        self.reconciler.name()
    }

    fn resource_types(&self) -> Vec<&'static str> {
        self.reconciler.resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        self.reconciler.read(id, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        self.reconciler.create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        self.reconciler.update(id, identifier, from, to)
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        self.reconciler.delete(id, identifier)
    }
}

#[cfg(test)]
mod tests {
    use settle_core::error::ErrorKind;

    use super::*;

    fn provider() -> AwsccProvider {
        let client = CloudControlClient::from_conf(
            aws_sdk_cloudcontrol::Config::builder()
                .behavior_version(aws_sdk_cloudcontrol::config::BehaviorVersion::latest())
                .region(Region::new("us-east-1"))
                .build(),
        );
        AwsccProvider::with_client(
            client,
            "us-east-1".to_string(),
            LifecycleSettings::default(),
            CancellationToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn registers_configured_types() {
        let provider = provider();
        assert_eq!(provider.name(), "awscc");
        assert_eq!(
            provider.resource_types(),
            vec![
                "ec2.internet_gateway",
                "ec2.vpc",
                "ec2.vpc_gateway_attachment",
                "lightsail.load_balancer"
            ]
        );
    }

    #[test]
    fn only_the_gateway_carries_a_hook() {
        let provider = provider();
        let registry = provider.reconciler.registry();
        assert!(registry.get("ec2.internet_gateway").unwrap().hook().is_some());
        assert!(registry.get("ec2.vpc").unwrap().hook().is_none());
    }

    #[tokio::test]
    async fn composite_identifier_is_rejected() {
        let provider = provider();
        let id = ResourceId::new("ec2.vpc", "main");
        let err = provider.read(&id, Some("vpc-1,extra")).await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MalformedIdentifier { .. }));
    }
}
