//! kx.database
//!
//! Database calls complete synchronously; there is nothing to wait for.

use aws_sdk_finspace::Client;
use aws_sdk_finspace::operation::get_kx_database::GetKxDatabaseOutput;
use settle_core::error::ProviderResult;
use settle_core::handler::{Created, ResourceHandler};
use settle_core::identifier;
use settle_core::probe::{Observation, StatusProber};
use settle_core::provider::BoxFuture;
use settle_core::resource::{Resource, ResourceId, State};
use settle_core::transition::TransitionTables;

use super::{Attributes, client_token, string};
use crate::errors::sdk_error;

const TABLES: TransitionTables = TransitionTables::immediate();

pub struct KxDatabaseHandler {
    client: Client,
}

impl KxDatabaseHandler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get(&self, identifier: &str) -> ProviderResult<GetKxDatabaseOutput> {
        let (environment_id, database_name) = identifier::decode_pair(identifier)?;
        self.client
            .get_kx_database()
            .environment_id(environment_id)
            .database_name(database_name)
            .send()
            .await
            .map_err(|e| sdk_error("GetKxDatabase", e))
    }

    async fn create_database(&self, resource: &Resource) -> ProviderResult<Created> {
        let environment_id = resource.require_str("environment_id")?;
        let database_name = resource.require_str("name")?;

        let output = self
            .client
            .create_kx_database()
            .environment_id(environment_id)
            .database_name(database_name)
            .set_description(resource.get_str("description")?.map(str::to_string))
            .set_tags(super::tags(resource)?)
            .client_token(client_token())
            .send()
            .await
            .map_err(|e| sdk_error("CreateKxDatabase", e))?;

        let mut created = Created::new(identifier::encode(&[environment_id, database_name]));
        if let Some(arn) = output.database_arn() {
            created = created.with_attribute("arn", string(arn));
        }
        Ok(created)
    }

    async fn update_database(&self, identifier: &str, to: &Resource) -> ProviderResult<()> {
        let (environment_id, database_name) = identifier::decode_pair(identifier)?;
        self.client
            .update_kx_database()
            .environment_id(environment_id)
            .database_name(database_name)
            .set_description(to.get_str("description")?.map(str::to_string))
            .client_token(client_token())
            .send()
            .await
            .map_err(|e| sdk_error("UpdateKxDatabase", e))?;
        Ok(())
    }

    async fn read_database(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let (environment_id, _) = identifier::decode_pair(identifier)?;
        let output = self.get(identifier).await?;
        let attributes = Attributes::new()
            .set("environment_id", string(&environment_id))
            .str("name", output.database_name())
            .str("arn", output.database_arn())
            .str("description", output.description());
        Ok(State::existing(id.clone(), attributes.into_map()))
    }
}

impl StatusProber for KxDatabaseHandler {
    /// Databases report no status; existence is all there is to observe
    fn probe<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<Observation>> {
        Box::pin(async move {
            Observation::from_lookup(self.get(identifier).await, |_| Observation::found("AVAILABLE"))
        })
    }
}

impl ResourceHandler for KxDatabaseHandler {
    fn resource_type(&self) -> &'static str {
        "kx.database"
    }

    fn identifier_parts(&self) -> usize {
        2
    }

    fn transitions(&self) -> &TransitionTables {
        &TABLES
    }

    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<Created>> {
        Box::pin(self.create_database(resource))
    }

    fn update<'a>(
        &'a self,
        identifier: &'a str,
        _from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.update_database(identifier, to))
    }

    fn delete<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let (environment_id, database_name) = identifier::decode_pair(identifier)?;
            self.client
                .delete_kx_database()
                .environment_id(environment_id)
                .database_name(database_name)
                .client_token(client_token())
                .send()
                .await
                .map_err(|e| sdk_error("DeleteKxDatabase", e))?;
            Ok(())
        })
    }

    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.read_database(id, identifier))
    }
}
