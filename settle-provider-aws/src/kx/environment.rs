//! kx.environment

use std::time::Duration;

use aws_sdk_finspace::Client;
use aws_sdk_finspace::operation::get_kx_environment::GetKxEnvironmentOutput;
use settle_core::error::{ProviderError, ProviderResult};
use settle_core::handler::{Created, ResourceHandler};
use settle_core::probe::{Observation, StatusProber};
use settle_core::provider::BoxFuture;
use settle_core::resource::{Resource, ResourceId, State};
use settle_core::transition::{TransitionTable, TransitionTables};

use super::{Attributes, client_token, observe, string};
use crate::errors::sdk_error;

const TABLES: TransitionTables = TransitionTables {
    create: Some(
        TransitionTable::new(&["CREATE_REQUESTED", "CREATING"], &["CREATED"])
            .failure(&["FAILED_CREATION"])
            .timeout(Duration::from_secs(75 * 60)),
    ),
    update: None,
    delete: Some(
        TransitionTable::deletion(&["DELETE_REQUESTED", "DELETING"], &["DELETED"])
            .failure(&["FAILED_DELETION"])
            .timeout(Duration::from_secs(75 * 60)),
    ),
};

pub struct KxEnvironmentHandler {
    client: Client,
}

impl KxEnvironmentHandler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get(&self, environment_id: &str) -> ProviderResult<GetKxEnvironmentOutput> {
        self.client
            .get_kx_environment()
            .environment_id(environment_id)
            .send()
            .await
            .map_err(|e| sdk_error("GetKxEnvironment", e))
    }

    async fn create_environment(&self, resource: &Resource) -> ProviderResult<Created> {
        let output = self
            .client
            .create_kx_environment()
            .name(resource.require_str("name")?)
            .kms_key_id(resource.require_str("kms_key_id")?)
            .set_description(resource.get_str("description")?.map(str::to_string))
            .set_tags(super::tags(resource)?)
            .client_token(client_token())
            .send()
            .await
            .map_err(|e| sdk_error("CreateKxEnvironment", e))?;

        let environment_id = output
            .environment_id()
            .ok_or_else(|| ProviderError::api("CreateKxEnvironment returned no environment id"))?;
        Ok(Created::new(environment_id).with_attribute(
            "arn",
            string(output.environment_arn().unwrap_or_default()),
        ))
    }

    async fn update_environment(&self, identifier: &str, to: &Resource) -> ProviderResult<()> {
        self.client
            .update_kx_environment()
            .environment_id(identifier)
            .name(to.require_str("name")?)
            .set_description(to.get_str("description")?.map(str::to_string))
            .client_token(client_token())
            .send()
            .await
            .map_err(|e| sdk_error("UpdateKxEnvironment", e))?;
        Ok(())
    }

    async fn read_environment(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let output = self.get(identifier).await?;
        let attributes = Attributes::new()
            .set("id", string(identifier))
            .str("name", output.name())
            .str("arn", output.environment_arn())
            .str("kms_key_id", output.kms_key_id())
            .str("description", output.description())
            .str("infrastructure_account_id", output.aws_account_id())
            .set(
                "availability_zones",
                super::string_list(output.availability_zone_ids()),
            );
        let state = State::existing(id.clone(), attributes.into_map());
        Ok(match output.status() {
            Some(status) => state.with_status(status.as_str().into()),
            None => state,
        })
    }
}

impl StatusProber for KxEnvironmentHandler {
    fn probe<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<Observation>> {
        Box::pin(async move {
            Observation::from_lookup(self.get(identifier).await, |output| {
                observe(output.status().map(|s| s.as_str()), None)
            })
        })
    }
}

impl ResourceHandler for KxEnvironmentHandler {
    fn resource_type(&self) -> &'static str {
        "kx.environment"
    }

    fn identifier_parts(&self) -> usize {
        1
    }

    fn transitions(&self) -> &TransitionTables {
        &TABLES
    }

    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<Created>> {
        Box::pin(self.create_environment(resource))
    }

    fn update<'a>(
        &'a self,
        identifier: &'a str,
        _from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.update_environment(identifier, to))
    }

    fn delete<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            self.client
                .delete_kx_environment()
                .environment_id(identifier)
                .client_token(client_token())
                .send()
                .await
                .map_err(|e| sdk_error("DeleteKxEnvironment", e))?;
            Ok(())
        })
    }

    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.read_environment(id, identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_valid() {
        assert!(TABLES.validate().is_ok());
    }

    #[test]
    fn create_waits_through_requested_states() {
        let create = TABLES.create.unwrap();
        assert!(create.is_pending(&"CREATE_REQUESTED".into()));
        assert!(create.is_target(&"CREATED".into()));
        assert!(create.is_failure(&"FAILED_CREATION".into()));
    }
}
