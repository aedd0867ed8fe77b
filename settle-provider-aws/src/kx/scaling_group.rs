//! kx.scaling_group
//!
//! Scaling groups cannot be updated; every change replaces the group.

use std::time::Duration;

use aws_sdk_finspace::Client;
use aws_sdk_finspace::operation::get_kx_scaling_group::GetKxScalingGroupOutput;
use settle_core::error::ProviderResult;
use settle_core::handler::{Created, ResourceHandler};
use settle_core::identifier;
use settle_core::probe::{Observation, StatusProber};
use settle_core::provider::BoxFuture;
use settle_core::resource::{Resource, ResourceId, State};
use settle_core::transition::{TransitionTable, TransitionTables};

use super::{Attributes, client_token, observe, string, string_list};
use crate::errors::sdk_error;

const TABLES: TransitionTables = TransitionTables {
    create: Some(
        TransitionTable::new(&["CREATING"], &["ACTIVE"])
            .failure(&["CREATE_FAILED"])
            .timeout(Duration::from_secs(45 * 60)),
    ),
    update: None,
    delete: Some(
        TransitionTable::deletion(&["DELETING"], &["DELETED"])
            .failure(&["DELETE_FAILED"])
            .timeout(Duration::from_secs(60 * 60)),
    ),
};

pub struct KxScalingGroupHandler {
    client: Client,
}

impl KxScalingGroupHandler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get(&self, identifier: &str) -> ProviderResult<GetKxScalingGroupOutput> {
        let (environment_id, scaling_group_name) = identifier::decode_pair(identifier)?;
        self.client
            .get_kx_scaling_group()
            .environment_id(environment_id)
            .scaling_group_name(scaling_group_name)
            .send()
            .await
            .map_err(|e| sdk_error("GetKxScalingGroup", e))
    }

    async fn create_scaling_group(&self, resource: &Resource) -> ProviderResult<Created> {
        let environment_id = resource.require_str("environment_id")?;
        let scaling_group_name = resource.require_str("name")?;

        self.client
            .create_kx_scaling_group()
            .environment_id(environment_id)
            .scaling_group_name(scaling_group_name)
            .host_type(resource.require_str("host_type")?)
            .availability_zone_id(resource.require_str("availability_zone_id")?)
            .set_tags(super::tags(resource)?)
            .client_token(client_token())
            .send()
            .await
            .map_err(|e| sdk_error("CreateKxScalingGroup", e))?;

        Ok(Created::new(identifier::encode(&[
            environment_id,
            scaling_group_name,
        ])))
    }

    async fn read_scaling_group(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let (environment_id, _) = identifier::decode_pair(identifier)?;
        let output = self.get(identifier).await?;
        let attributes = Attributes::new()
            .set("environment_id", string(&environment_id))
            .str("name", output.scaling_group_name())
            .str("arn", output.scaling_group_arn())
            .str("host_type", output.host_type())
            .str("availability_zone_id", output.availability_zone_id())
            .set("clusters", string_list(output.clusters()));

        let state = State::existing(id.clone(), attributes.into_map());
        Ok(match output.status() {
            Some(status) => state.with_status(status.as_str().into()),
            None => state,
        })
    }
}

impl StatusProber for KxScalingGroupHandler {
    fn probe<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<Observation>> {
        Box::pin(async move {
            Observation::from_lookup(self.get(identifier).await, |output| {
                observe(output.status().map(|s| s.as_str()), output.status_reason())
            })
        })
    }
}

impl ResourceHandler for KxScalingGroupHandler {
    fn resource_type(&self) -> &'static str {
        "kx.scaling_group"
    }

    fn identifier_parts(&self) -> usize {
        2
    }

    fn transitions(&self) -> &TransitionTables {
        &TABLES
    }

    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<Created>> {
        Box::pin(self.create_scaling_group(resource))
    }

    fn delete<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let (environment_id, scaling_group_name) = identifier::decode_pair(identifier)?;
            self.client
                .delete_kx_scaling_group()
                .environment_id(environment_id)
                .scaling_group_name(scaling_group_name)
                .client_token(client_token())
                .send()
                .await
                .map_err(|e| sdk_error("DeleteKxScalingGroup", e))?;
            Ok(())
        })
    }

    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.read_scaling_group(id, identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_valid_and_update_is_absent() {
        assert!(TABLES.validate().is_ok());
        assert!(TABLES.update.is_none());
    }
}
