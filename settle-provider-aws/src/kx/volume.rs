//! kx.volume

use std::time::Duration;

use aws_sdk_finspace::Client;
use aws_sdk_finspace::operation::get_kx_volume::GetKxVolumeOutput;
use aws_sdk_finspace::types::{KxAzMode, KxNas1Configuration, KxNas1Type, KxVolumeType};
use settle_core::error::ProviderResult;
use settle_core::handler::{Created, ResourceHandler};
use settle_core::identifier;
use settle_core::probe::{Observation, StatusProber};
use settle_core::provider::BoxFuture;
use settle_core::resource::{Resource, ResourceId, State, Value};
use settle_core::transition::{TransitionTable, TransitionTables};

use super::{Attributes, client_token, observe, string, string_list};
use crate::errors::sdk_error;

const TABLES: TransitionTables = TransitionTables {
    create: Some(
        TransitionTable::new(&["CREATING"], &["ACTIVE"])
            .failure(&["CREATE_FAILED"])
            .timeout(Duration::from_secs(30 * 60)),
    ),
    update: Some(
        TransitionTable::new(&["CREATING", "UPDATING"], &["ACTIVE", "UPDATED"])
            .failure(&["UPDATE_FAILED"])
            .timeout(Duration::from_secs(30 * 60)),
    ),
    delete: Some(
        TransitionTable::deletion(&["DELETING"], &["DELETED"])
            .failure(&["DELETE_FAILED"])
            .timeout(Duration::from_secs(45 * 60)),
    ),
};

pub struct KxVolumeHandler {
    client: Client,
}

impl KxVolumeHandler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get(&self, identifier: &str) -> ProviderResult<GetKxVolumeOutput> {
        let (environment_id, volume_name) = identifier::decode_pair(identifier)?;
        self.client
            .get_kx_volume()
            .environment_id(environment_id)
            .volume_name(volume_name)
            .send()
            .await
            .map_err(|e| sdk_error("GetKxVolume", e))
    }

    async fn create_volume(&self, resource: &Resource) -> ProviderResult<Created> {
        let environment_id = resource.require_str("environment_id")?;
        let volume_name = resource.require_str("name")?;

        let output = self
            .client
            .create_kx_volume()
            .environment_id(environment_id)
            .volume_name(volume_name)
            .volume_type(KxVolumeType::from(resource.get_str("type")?.unwrap_or("NAS_1")))
            .az_mode(KxAzMode::from(resource.require_str("az_mode")?))
            .set_availability_zone_ids(resource.get_string_list("availability_zones")?)
            .set_description(resource.get_str("description")?.map(str::to_string))
            .set_nas1_configuration(nas1_configuration(resource)?)
            .set_tags(super::tags(resource)?)
            .client_token(client_token())
            .send()
            .await
            .map_err(|e| sdk_error("CreateKxVolume", e))?;

        let mut created = Created::new(identifier::encode(&[environment_id, volume_name]));
        if let Some(arn) = output.volume_arn() {
            created = created.with_attribute("arn", string(arn));
        }
        Ok(created)
    }

    async fn update_volume(&self, identifier: &str, to: &Resource) -> ProviderResult<()> {
        let (environment_id, volume_name) = identifier::decode_pair(identifier)?;
        self.client
            .update_kx_volume()
            .environment_id(environment_id)
            .volume_name(volume_name)
            .set_description(to.get_str("description")?.map(str::to_string))
            .set_nas1_configuration(nas1_configuration(to)?)
            .client_token(client_token())
            .send()
            .await
            .map_err(|e| sdk_error("UpdateKxVolume", e))?;
        Ok(())
    }

    async fn read_volume(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let (environment_id, _) = identifier::decode_pair(identifier)?;
        let output = self.get(identifier).await?;

        let mut attributes = Attributes::new()
            .set("environment_id", string(&environment_id))
            .str("name", output.volume_name())
            .str("arn", output.volume_arn())
            .str("type", output.volume_type().map(|t| t.as_str()))
            .str("az_mode", output.az_mode().map(|m| m.as_str()))
            .str("description", output.description())
            .set("availability_zones", string_list(output.availability_zone_ids()));
        if let Some(nas1) = output.nas1_configuration() {
            let block = Attributes::new()
                .str("type", nas1.r#type().map(|t| t.as_str()))
                .int("size", nas1.size());
            attributes = attributes.set("nas1_configuration", Value::Map(block.into_map()));
        }

        let state = State::existing(id.clone(), attributes.into_map());
        Ok(match output.status() {
            Some(status) => state.with_status(status.as_str().into()),
            None => state,
        })
    }
}

fn nas1_configuration(resource: &Resource) -> ProviderResult<Option<KxNas1Configuration>> {
    let Some(nas1) = resource.nested("nas1_configuration")? else {
        return Ok(None);
    };
    Ok(Some(
        KxNas1Configuration::builder()
            .set_type(nas1.get_str("type")?.map(KxNas1Type::from))
            .set_size(nas1.get_i32("size")?)
            .build(),
    ))
}

impl StatusProber for KxVolumeHandler {
    fn probe<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<Observation>> {
        Box::pin(async move {
            Observation::from_lookup(self.get(identifier).await, |output| {
                observe(output.status().map(|s| s.as_str()), output.status_reason())
            })
        })
    }
}

impl ResourceHandler for KxVolumeHandler {
    fn resource_type(&self) -> &'static str {
        "kx.volume"
    }

    fn identifier_parts(&self) -> usize {
        2
    }

    fn transitions(&self) -> &TransitionTables {
        &TABLES
    }

    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<Created>> {
        Box::pin(self.create_volume(resource))
    }

    fn update<'a>(
        &'a self,
        identifier: &'a str,
        _from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.update_volume(identifier, to))
    }

    fn delete<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let (environment_id, volume_name) = identifier::decode_pair(identifier)?;
            self.client
                .delete_kx_volume()
                .environment_id(environment_id)
                .volume_name(volume_name)
                .client_token(client_token())
                .send()
                .await
                .map_err(|e| sdk_error("DeleteKxVolume", e))?;
            Ok(())
        })
    }

    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.read_volume(id, identifier))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use settle_core::error::ErrorKind;

    use super::*;

    #[test]
    fn tables_are_valid() {
        assert!(TABLES.validate().is_ok());
    }

    #[test]
    fn nas1_size_is_narrowed_with_range_check() {
        let block = |size: i64| {
            Resource::new("kx.volume", "data").with_attribute(
                "nas1_configuration",
                Value::Map(HashMap::from([
                    ("type".to_string(), string("SSD_250")),
                    ("size".to_string(), Value::Int(size)),
                ])),
            )
        };

        let config = nas1_configuration(&block(1200)).unwrap().unwrap();
        assert_eq!(config.size(), Some(1200));
        assert_eq!(config.r#type(), Some(&KxNas1Type::from("SSD_250")));

        let err = nas1_configuration(&block(1 << 40)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn absent_block_is_omitted() {
        let resource = Resource::new("kx.volume", "data");
        assert!(nas1_configuration(&resource).unwrap().is_none());
    }
}
