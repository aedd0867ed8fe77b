//! Settle AWS Provider
//!
//! FinSpace managed kdb resources and Classic Load Balancer policies, driven
//! through the generic reconciler so every mutation waits until it settles.

mod errors;
pub mod elb;
pub mod kx;

use aws_config::Region;
use aws_sdk_elasticloadbalancing::Client as ElbClient;
use aws_sdk_finspace::Client as FinspaceClient;
use settle_core::CancellationToken;
use settle_core::error::ProviderResult;
use settle_core::handler::HandlerRegistry;
use settle_core::provider::{BoxFuture, Provider};
use settle_core::reconciler::Reconciler;
use settle_core::resource::{Resource, ResourceId, State};
use settle_core::settings::LifecycleSettings;

/// AWS Provider
pub struct AwsProvider {
    reconciler: Reconciler,
    region: String,
}

impl AwsProvider {
    /// Create a new AWS Provider using the default credential chain
    pub async fn new(
        region: &str,
        settings: LifecycleSettings,
        cancel: CancellationToken,
    ) -> ProviderResult<Self> {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self::with_clients(
            FinspaceClient::new(&config),
            ElbClient::new(&config),
            region.to_string(),
        )
        .map(|provider| provider.configure(settings, cancel))
    }

    /// Create with specific clients (for testing)
    pub fn with_clients(
        finspace: FinspaceClient,
        elb: ElbClient,
        region: String,
    ) -> ProviderResult<Self> {
        let mut registry = HandlerRegistry::new();
        kx::register(&mut registry, &finspace)?;
        elb::register(&mut registry, &elb)?;
        log::debug!(
            "aws provider for {} handles {}",
            region,
            registry.resource_types().join(", ")
        );

        Ok(Self {
            reconciler: Reconciler::new("aws", registry),
            region,
        })
    }

    fn configure(mut self, settings: LifecycleSettings, cancel: CancellationToken) -> Self {
        self.reconciler = self
            .reconciler
            .with_settings(settings)
            .with_cancellation(cancel);
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

impl Provider for AwsProvider {
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

impl std::fmt::Debug for AwsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsProvider")
            .field("region", &self.region)
            .field("registry", self.reconciler.registry())
            .finish()
    }
}
