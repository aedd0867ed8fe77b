//! kx.dataview
//!
//! Dataviews never report a DELETED status; the delete wait ends when the
//! dataview can no longer be found.

use std::time::Duration;

use aws_sdk_finspace::Client;
use aws_sdk_finspace::operation::get_kx_dataview::GetKxDataviewOutput;
use aws_sdk_finspace::types::{KxAzMode, KxDataviewSegmentConfiguration};
use settle_core::error::ProviderResult;
use settle_core::handler::{Created, ResourceHandler};
use settle_core::identifier;
use settle_core::probe::{Observation, StatusProber};
use settle_core::provider::BoxFuture;
use settle_core::resource::{Resource, ResourceId, State};
use settle_core::transition::{TransitionTable, TransitionTables};

use super::{Attributes, client_token, observe, string};
use crate::errors::{build_error, sdk_error};

const TABLES: TransitionTables = TransitionTables {
    create: Some(
        TransitionTable::new(&["CREATING"], &["ACTIVE"])
            .failure(&["FAILED"])
            .timeout(Duration::from_secs(4 * 60 * 60)),
    ),
    update: Some(
        TransitionTable::new(&["UPDATING"], &["ACTIVE"])
            .failure(&["FAILED"])
            .timeout(Duration::from_secs(4 * 60 * 60)),
    ),
    delete: Some(
        TransitionTable::deletion(&["DELETING"], &[]).timeout(Duration::from_secs(4 * 60 * 60)),
    ),
};

pub struct KxDataviewHandler {
    client: Client,
}

impl KxDataviewHandler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get(&self, identifier: &str) -> ProviderResult<GetKxDataviewOutput> {
        let [environment_id, database_name, dataview_name] = identifier::decode_array(identifier)?;
        self.client
            .get_kx_dataview()
            .environment_id(environment_id)
            .database_name(database_name)
            .dataview_name(dataview_name)
            .send()
            .await
            .map_err(|e| sdk_error("GetKxDataview", e))
    }

    async fn create_dataview(&self, resource: &Resource) -> ProviderResult<Created> {
        let environment_id = resource.require_str("environment_id")?;
        let database_name = resource.require_str("database_name")?;
        let dataview_name = resource.require_str("name")?;

        self.client
            .create_kx_dataview()
            .environment_id(environment_id)
            .database_name(database_name)
            .dataview_name(dataview_name)
            .az_mode(KxAzMode::from(resource.require_str("az_mode")?))
            .set_availability_zone_id(resource.get_str("availability_zone_id")?.map(str::to_string))
            .set_changeset_id(resource.get_str("changeset_id")?.map(str::to_string))
            .set_segment_configurations(segment_configurations(resource)?)
            .set_auto_update(resource.get_bool("auto_update")?)
            .set_read_write(resource.get_bool("read_write")?)
            .set_description(resource.get_str("description")?.map(str::to_string))
            .set_tags(super::tags(resource)?)
            .client_token(client_token())
            .send()
            .await
            .map_err(|e| sdk_error("CreateKxDataview", e))?;

        Ok(Created::new(identifier::encode(&[
            environment_id,
            database_name,
            dataview_name,
        ])))
    }

    async fn update_dataview(&self, identifier: &str, to: &Resource) -> ProviderResult<()> {
        let [environment_id, database_name, dataview_name] = identifier::decode_array(identifier)?;
        self.client
            .update_kx_dataview()
            .environment_id(environment_id)
            .database_name(database_name)
            .dataview_name(dataview_name)
            .set_changeset_id(to.get_str("changeset_id")?.map(str::to_string))
            .set_segment_configurations(segment_configurations(to)?)
            .set_description(to.get_str("description")?.map(str::to_string))
            .client_token(client_token())
            .send()
            .await
            .map_err(|e| sdk_error("UpdateKxDataview", e))?;
        Ok(())
    }

    async fn read_dataview(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let [environment_id, database_name, _] = identifier::decode_array(identifier)?;
        let output = self.get(identifier).await?;
        let attributes = Attributes::new()
            .set("environment_id", string(&environment_id))
            .set("database_name", string(&database_name))
            .str("name", output.dataview_name())
            .str("az_mode", output.az_mode().map(|m| m.as_str()))
            .str("availability_zone_id", output.availability_zone_id())
            .str("changeset_id", output.changeset_id())
            .str("description", output.description());

        let state = State::existing(id.clone(), attributes.into_map());
        Ok(match output.status() {
            Some(status) => state.with_status(status.as_str().into()),
            None => state,
        })
    }
}

fn segment_configurations(
    resource: &Resource,
) -> ProviderResult<Option<Vec<KxDataviewSegmentConfiguration>>> {
    let segments = resource.nested_list("segment_configurations")?;
    if segments.is_empty() {
        return Ok(None);
    }
    segments
        .iter()
        .map(|segment| {
            KxDataviewSegmentConfiguration::builder()
                .set_db_paths(segment.get_string_list("db_paths")?)
                .volume_name(segment.require_str("volume_name")?)
                .set_on_demand(segment.get_bool("on_demand")?)
                .build()
                .map_err(|e| build_error("segment_configurations", e))
        })
        .collect::<ProviderResult<Vec<_>>>()
        .map(Some)
}

impl StatusProber for KxDataviewHandler {
    fn probe<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<Observation>> {
        Box::pin(async move {
            Observation::from_lookup(self.get(identifier).await, |output| {
                observe(output.status().map(|s| s.as_str()), output.status_reason())
            })
        })
    }
}

impl ResourceHandler for KxDataviewHandler {
    fn resource_type(&self) -> &'static str {
        "kx.dataview"
    }

    fn identifier_parts(&self) -> usize {
        3
    }

    fn transitions(&self) -> &TransitionTables {
        &TABLES
    }

    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<Created>> {
        Box::pin(self.create_dataview(resource))
    }

    fn update<'a>(
        &'a self,
        identifier: &'a str,
        _from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.update_dataview(identifier, to))
    }

    fn delete<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let [environment_id, database_name, dataview_name] =
                identifier::decode_array(identifier)?;
            self.client
                .delete_kx_dataview()
                .environment_id(environment_id)
                .database_name(database_name)
                .dataview_name(dataview_name)
                .client_token(client_token())
                .send()
                .await
                .map_err(|e| sdk_error("DeleteKxDataview", e))?;
            Ok(())
        })
    }

    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.read_dataview(id, identifier))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use settle_core::resource::Value;
    use settle_core::transition::NotFoundPolicy;

    use super::*;

    #[test]
    fn delete_settles_on_disappearance() {
        assert!(TABLES.validate().is_ok());
        let delete = TABLES.delete.unwrap();
        assert!(delete.target.is_empty());
        assert_eq!(delete.not_found, NotFoundPolicy::Settle);
    }

    #[test]
    fn segments_require_volume_name() {
        let segment = |entries: Vec<(&str, Value)>| {
            Resource::new("kx.dataview", "view").with_attribute(
                "segment_configurations",
                Value::List(vec![Value::Map(
                    entries
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect::<HashMap<_, _>>(),
                )]),
            )
        };

        let valid = segment(vec![
            ("db_paths", Value::List(vec![string("/*")])),
            ("volume_name", string("cache")),
        ]);
        let configs = segment_configurations(&valid).unwrap().unwrap();
        assert_eq!(configs.len(), 1);

        let missing = segment(vec![("db_paths", Value::List(vec![string("/*")]))]);
        assert!(segment_configurations(&missing).is_err());

        assert!(segment_configurations(&Resource::new("kx.dataview", "view")).unwrap().is_none());
    }
}
