//! Cloud Control API calls
//!
//! Mutations return only after their request has finished.

use aws_sdk_cloudcontrol::Client;
use settle_core::CancellationToken;
use settle_core::error::{ProviderError, ProviderResult};
use settle_core::settings::LifecycleSettings;
use settle_core::status::Operation;

use crate::errors::sdk_error;
use crate::request::RequestTracker;

pub struct CloudControl {
    client: Client,
    requests: RequestTracker,
}

impl CloudControl {
    pub fn new(client: Client, settings: LifecycleSettings, cancel: CancellationToken) -> Self {
        Self {
            requests: RequestTracker::new(client.clone(), settings, cancel),
            client,
        }
    }

    /// Current properties of a resource; `NotFound` if it does not exist
    pub async fn get_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> ProviderResult<serde_json::Value> {
        let output = self
            .client
            .get_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await
            .map_err(|e| sdk_error("GetResource", e))?;

        let properties = output
            .resource_description()
            .and_then(|d| d.properties())
            .ok_or_else(|| ProviderError::not_found().with_message(identifier.to_string()))?;
        serde_json::from_str(properties).map_err(|e| {
            ProviderError::api(format!("{} returned unreadable properties", type_name))
                .with_cause(e)
        })
    }

    /// Every resource of a type with whatever properties the list reports
    ///
    /// Some types list only their primary identifier; their properties come
    /// back as `null`.
    pub async fn list_resources(
        &self,
        type_name: &str,
    ) -> ProviderResult<Vec<(String, serde_json::Value)>> {
        let mut resources = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_resources()
                .type_name(type_name)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListResources", e))?;

            for description in output.resource_descriptions() {
                let Some(identifier) = description.identifier() else {
                    continue;
                };
                let properties = match description.properties() {
                    Some(properties) => serde_json::from_str(properties).map_err(|e| {
                        ProviderError::api(format!("{} listed unreadable properties", type_name))
                            .with_cause(e)
                    })?,
                    None => serde_json::Value::Null,
                };
                resources.push((identifier.to_string(), properties));
            }

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => return Ok(resources),
            }
        }
    }

    /// Create a resource and return the primary identifier Cloud Control assigned
    pub async fn create_resource(
        &self,
        type_name: &str,
        desired_state: serde_json::Value,
    ) -> ProviderResult<String> {
        let output = self
            .client
            .create_resource()
            .type_name(type_name)
            .desired_state(desired_state.to_string())
            .client_token(uuid::Uuid::new_v4().to_string())
            .send()
            .await
            .map_err(|e| sdk_error("CreateResource", e))?;

        self.requests
            .track(Operation::Create, output.progress_event())
            .await?
            .ok_or_else(|| ProviderError::api(format!("{} create returned no identifier", type_name)))
    }

    pub async fn update_resource(
        &self,
        type_name: &str,
        identifier: &str,
        patch_ops: Vec<serde_json::Value>,
    ) -> ProviderResult<()> {
        if patch_ops.is_empty() {
            return Ok(());
        }
        let patch_document = serde_json::Value::Array(patch_ops).to_string();

        let output = self
            .client
            .update_resource()
            .type_name(type_name)
            .identifier(identifier)
            .patch_document(patch_document)
            .client_token(uuid::Uuid::new_v4().to_string())
            .send()
            .await
            .map_err(|e| sdk_error("UpdateResource", e))?;

        self.requests
            .track(Operation::Update, output.progress_event())
            .await?;
        Ok(())
    }

    pub async fn delete_resource(&self, type_name: &str, identifier: &str) -> ProviderResult<()> {
        let output = self
            .client
            .delete_resource()
            .type_name(type_name)
            .identifier(identifier)
            .client_token(uuid::Uuid::new_v4().to_string())
            .send()
            .await
            .map_err(|e| sdk_error("DeleteResource", e))?;

        self.requests
            .track(Operation::Delete, output.progress_event())
            .await?;
        Ok(())
    }
}
