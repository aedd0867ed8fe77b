//! Reconciler - the generic [`Provider`] built from resource handlers
//!
//! Every mutation follows the same sequence: decode the identifier, run the
//! handler's hook, dispatch the call (retrying transient failures), wait on
//! the handler's transition table until the resource settles, then read the
//! resource back so the caller stores what the remote actually holds.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, ProviderResult};
use crate::handler::{HandlerRegistry, ResourceHandler};
use crate::identifier;
use crate::provider::{BoxFuture, Provider};
use crate::resource::{Resource, ResourceId, State};
use crate::settings::LifecycleSettings;
use crate::status::Operation;
use crate::waiter::{Outcome, Waiter};

pub struct Reconciler {
    name: &'static str,
    registry: HandlerRegistry,
    settings: LifecycleSettings,
    waiter: Waiter,
    cancel: CancellationToken,
}

impl Reconciler {
    pub fn new(name: &'static str, registry: HandlerRegistry) -> Self {
        let settings = LifecycleSettings::default();
        Self {
            name,
            registry,
            waiter: Waiter::new(settings.poll_interval()),
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: LifecycleSettings) -> Self {
        self.waiter = Waiter::new(settings.poll_interval());
        self.settings = settings;
        self
    }

    /// Observe `cancel` in every wait and retry backoff
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    fn handler(&self, id: &ResourceId) -> ProviderResult<Arc<dyn ResourceHandler>> {
        self.registry.get(&id.resource_type).cloned().ok_or_else(|| {
            ProviderError::invalid_configuration(format!(
                "provider {} has no resource type {}",
                self.name, id.resource_type
            ))
        })
    }

    /// Wait on the handler's table for `operation`, if it has one
    async fn settle(
        &self,
        handler: &dyn ResourceHandler,
        operation: Operation,
        identifier: &str,
    ) -> ProviderResult<Option<Outcome>> {
        let Some(table) = handler.transitions().for_operation(operation) else {
            return Ok(None);
        };
        let table = self.settings.apply(operation, table);
        log::info!(
            "waiting for {} {} to settle (timeout {:?})",
            handler.resource_type(),
            identifier,
            table.timeout
        );
        self.waiter
            .wait_for(handler, &table, identifier, table.timeout, &self.cancel)
            .await
            .map(Some)
    }

    async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let handler = self.handler(&resource.id)?;
        log::info!("creating {}", resource.id);

        let created = self
            .settings
            .retry
            .run(&format!("create {}", resource.id), &self.cancel, || {
                handler.create(resource)
            })
            .await?;
        let identifier = created.identifier.clone();
        identifier::decode(&identifier, handler.identifier_parts())
            .map_err(|e| e.during(Operation::Create, Some(&identifier)))?;

        let outcome = self
            .settle(handler.as_ref(), Operation::Create, &identifier)
            .await
            .map_err(|e| e.during(Operation::Create, Some(&identifier)))?;

        let mut state = handler
            .read(&resource.id, &identifier)
            .await
            .map_err(|e| e.during(Operation::Read, Some(&identifier)))?;
        state.merge_missing(&created.attributes);
        state.identifier = Some(identifier);
        if let Some(status) = outcome.as_ref().and_then(Outcome::status) {
            state.status = Some(status.clone());
        }
        Ok(state)
    }

    async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let handler = self.handler(id)?;
        identifier::decode(identifier, handler.identifier_parts())?;
        log::info!("updating {} ({})", id, identifier);

        let context = match handler.hook() {
            Some(hook) => Some(hook.before(Operation::Update, identifier).await?),
            None => None,
        };

        self.settings
            .retry
            .run(&format!("update {}", id), &self.cancel, || {
                handler.update(identifier, from, to)
            })
            .await?;
        let outcome = self
            .settle(handler.as_ref(), Operation::Update, identifier)
            .await?;

        if let (Some(hook), Some(context)) = (handler.hook(), context) {
            hook.after(Operation::Update, identifier, context).await?;
        }

        let mut state = handler.read(id, identifier).await?;
        state.identifier = Some(identifier.to_string());
        if let Some(status) = outcome.as_ref().and_then(Outcome::status) {
            state.status = Some(status.clone());
        }
        Ok(state)
    }

    /// A resource that is already gone counts as deleted
    async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let handler = self.handler(id)?;
        identifier::decode(identifier, handler.identifier_parts())?;
        log::info!("deleting {} ({})", id, identifier);

        let context = match handler.hook() {
            Some(hook) => Some(hook.before(Operation::Delete, identifier).await?),
            None => None,
        };

        let dispatched = self
            .settings
            .retry
            .run(&format!("delete {}", id), &self.cancel, || {
                handler.delete(identifier)
            })
            .await;
        match dispatched {
            Ok(()) => {
                self.settle(handler.as_ref(), Operation::Delete, identifier)
                    .await?;
            }
            Err(e) if e.is_not_found() => {
                log::info!("{} ({}) was already deleted", id, identifier);
            }
            Err(e) => return Err(e),
        }

        if let (Some(hook), Some(context)) = (handler.hook(), context) {
            hook.after(Operation::Delete, identifier, context).await?;
        }
        Ok(())
    }

    async fn read_resource(&self, id: &ResourceId, identifier: Option<&str>) -> ProviderResult<State> {
        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };
        let handler = self.handler(id)?;
        identifier::decode(identifier, handler.identifier_parts())?;

        match handler.read(id, identifier).await {
            Ok(mut state) => {
                state.identifier = Some(identifier.to_string());
                Ok(state)
            }
            Err(e) if e.is_not_found() => {
                log::debug!("{} ({}) not found", id, identifier);
                Ok(State::not_found(id.clone()))
            }
            Err(e) => Err(e),
        }
    }
}

impl Provider for Reconciler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn resource_types(&self) -> Vec<&'static str> {
        self.registry.resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(str::to_string);
        Box::pin(async move {
            self.read_resource(&id, identifier.as_deref())
                .await
                .map_err(|e| {
                    e.for_resource(id.clone())
                        .during(Operation::Read, identifier.as_deref())
                })
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            self.create_resource(&resource)
                .await
                .map_err(|e| e.for_resource(resource.id.clone()).during(Operation::Create, None))
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move {
            self.update_resource(&id, &identifier, &from, &to)
                .await
                .map_err(|e| e.for_resource(id.clone()).during(Operation::Update, Some(&identifier)))
        })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            self.delete_resource(&id, &identifier)
                .await
                .map_err(|e| e.for_resource(id.clone()).during(Operation::Delete, Some(&identifier)))
        })
    }
}
