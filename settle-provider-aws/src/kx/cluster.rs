//! kx.cluster
//!
//! Clusters can only be changed in place through their code configuration
//! (code bundle, initialization script, command line arguments). Any other
//! change needs the cluster to be replaced. Tags are set at creation and not
//! read back.

use std::time::Duration;

use aws_sdk_finspace::Client;
use aws_sdk_finspace::operation::get_kx_cluster::GetKxClusterOutput;
use aws_sdk_finspace::types::{
    CapacityConfiguration, CodeConfiguration, IpAddressType, KxAzMode,
    KxClusterCodeDeploymentConfiguration, KxClusterCodeDeploymentStrategy, KxClusterType,
    KxCommandLineArgument, KxDatabaseConfiguration, KxScalingGroupConfiguration, VpcConfiguration,
};
use settle_core::differ;
use settle_core::error::{ProviderError, ProviderResult};
use settle_core::handler::{Created, ResourceHandler};
use settle_core::identifier;
use settle_core::probe::{Observation, StatusProber};
use settle_core::provider::BoxFuture;
use settle_core::resource::{Resource, ResourceId, State, Value};
use settle_core::transition::{TransitionTable, TransitionTables};

use super::{Attributes, client_token, observe, string, string_list};
use crate::errors::{build_error, sdk_error};

const TABLES: TransitionTables = TransitionTables {
    create: Some(
        TransitionTable::new(&["PENDING", "CREATING"], &["RUNNING"])
            .failure(&["CREATE_FAILED"])
            .timeout(Duration::from_secs(4 * 60 * 60)),
    ),
    update: Some(
        TransitionTable::new(&["PENDING", "UPDATING"], &["RUNNING"])
            .timeout(Duration::from_secs(4 * 60 * 60)),
    ),
    delete: Some(
        TransitionTable::deletion(&["DELETING"], &["DELETED"])
            .failure(&["DELETE_FAILED"])
            .timeout(Duration::from_secs(4 * 60 * 60)),
    ),
};

/// Attributes an in-place update can change
const UPDATABLE: &[&str] = &["code", "initialization_script", "command_line_arguments"];

pub struct KxClusterHandler {
    client: Client,
}

impl KxClusterHandler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get(&self, identifier: &str) -> ProviderResult<GetKxClusterOutput> {
        let (environment_id, cluster_name) = identifier::decode_pair(identifier)?;
        self.client
            .get_kx_cluster()
            .environment_id(environment_id)
            .cluster_name(cluster_name)
            .send()
            .await
            .map_err(|e| sdk_error("GetKxCluster", e))
    }

    async fn create_cluster(&self, resource: &Resource) -> ProviderResult<Created> {
        let environment_id = resource.require_str("environment_id")?;
        let cluster_name = resource.require_str("name")?;

        let mut request = self
            .client
            .create_kx_cluster()
            .environment_id(environment_id)
            .cluster_name(cluster_name)
            .cluster_type(KxClusterType::from(resource.require_str("type")?))
            .release_label(resource.require_str("release_label")?)
            .az_mode(KxAzMode::from(resource.require_str("az_mode")?))
            .set_availability_zone_id(resource.get_str("availability_zone_id")?.map(str::to_string))
            .set_cluster_description(resource.get_str("description")?.map(str::to_string))
            .set_execution_role(resource.get_str("execution_role")?.map(str::to_string))
            .set_initialization_script(
                resource.get_str("initialization_script")?.map(str::to_string),
            )
            .set_command_line_arguments(command_line_arguments(resource)?)
            .set_code(code_configuration(resource)?)
            .set_tags(super::tags(resource)?)
            .client_token(client_token());

        if let Some(capacity) = resource.nested("capacity_configuration")? {
            request = request.capacity_configuration(
                CapacityConfiguration::builder()
                    .set_node_type(capacity.get_str("node_type")?.map(str::to_string))
                    .set_node_count(capacity.get_i32("node_count")?)
                    .build(),
            );
        }

        if let Some(vpc) = resource.nested("vpc_configuration")? {
            request = request.vpc_configuration(
                VpcConfiguration::builder()
                    .vpc_id(vpc.require_str("vpc_id")?)
                    .set_security_group_ids(vpc.get_string_list("security_group_ids")?)
                    .set_subnet_ids(vpc.get_string_list("subnet_ids")?)
                    .set_ip_address_type(vpc.get_str("ip_address_type")?.map(IpAddressType::from))
                    .build(),
            );
        }

        if let Some(scaling) = resource.nested("scaling_group_configuration")? {
            request = request.scaling_group_configuration(
                KxScalingGroupConfiguration::builder()
                    .scaling_group_name(scaling.require_str("scaling_group_name")?)
                    .set_memory_limit(scaling.get_i32("memory_limit")?)
                    .set_memory_reservation(scaling.get_i32("memory_reservation")?)
                    .set_node_count(scaling.get_i32("node_count")?)
                    .build()
                    .map_err(|e| build_error("scaling_group_configuration", e))?,
            );
        }

        for database in resource.nested_list("databases")? {
            request = request.databases(
                KxDatabaseConfiguration::builder()
                    .database_name(database.require_str("database_name")?)
                    .set_changeset_id(database.get_str("changeset_id")?.map(str::to_string))
                    .set_dataview_name(database.get_str("dataview_name")?.map(str::to_string))
                    .build()
                    .map_err(|e| build_error("databases", e))?,
            );
        }

        let output = request
            .send()
            .await
            .map_err(|e| sdk_error("CreateKxCluster", e))?;

        let mut created = Created::new(identifier::encode(&[environment_id, cluster_name]));
        if let Some(timestamp) = output.created_timestamp() {
            created = created.with_attribute("created_timestamp", Value::Int(timestamp.secs()));
        }
        Ok(created)
    }

    async fn update_code(&self, identifier: &str, from: &State, to: &Resource) -> ProviderResult<()> {
        let changes = code_changes(from, to)?;
        if changes.is_empty() {
            log::debug!("{}: no code configuration changes", identifier);
            return Ok(());
        }
        log::info!("{}: deploying code configuration ({})", identifier, changes.join(", "));

        let (environment_id, cluster_name) = identifier::decode_pair(identifier)?;
        let deployment = KxClusterCodeDeploymentConfiguration::builder()
            .deployment_strategy(KxClusterCodeDeploymentStrategy::Rolling)
            .build()
            .map_err(|e| build_error("deployment configuration", e))?;

        let mut request = self
            .client
            .update_kx_cluster_code_configuration()
            .environment_id(environment_id)
            .cluster_name(cluster_name)
            .set_initialization_script(to.get_str("initialization_script")?.map(str::to_string))
            .set_command_line_arguments(command_line_arguments(to)?)
            .deployment_configuration(deployment)
            .client_token(client_token());
        match code_configuration(to)? {
            Some(code) => request = request.code(code),
            None => {
                return Err(ProviderError::invalid_configuration(
                    "code is required to update a cluster's code configuration",
                ));
            }
        }

        request
            .send()
            .await
            .map_err(|e| sdk_error("UpdateKxClusterCodeConfiguration", e))?;
        Ok(())
    }

    async fn read_cluster(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let (environment_id, _) = identifier::decode_pair(identifier)?;
        let output = self.get(identifier).await?;

        let mut attributes = Attributes::new()
            .set("environment_id", string(&environment_id))
            .str("name", output.cluster_name())
            .str("type", output.cluster_type().map(|t| t.as_str()))
            .str("release_label", output.release_label())
            .str("az_mode", output.az_mode().map(|m| m.as_str()))
            .str("availability_zone_id", output.availability_zone_id())
            .str("description", output.cluster_description())
            .str("execution_role", output.execution_role())
            .str("initialization_script", output.initialization_script());

        if !output.command_line_arguments().is_empty() {
            let arguments = output
                .command_line_arguments()
                .iter()
                .filter_map(|arg| Some((arg.key()?.to_string(), string(arg.value()?))))
                .collect();
            attributes = attributes.set("command_line_arguments", Value::Map(arguments));
        }
        if let Some(capacity) = output.capacity_configuration() {
            let block = Attributes::new()
                .str("node_type", capacity.node_type())
                .int("node_count", capacity.node_count());
            attributes = attributes.set("capacity_configuration", Value::Map(block.into_map()));
        }
        if let Some(vpc) = output.vpc_configuration() {
            let block = Attributes::new()
                .str("vpc_id", vpc.vpc_id())
                .set("security_group_ids", string_list(vpc.security_group_ids()))
                .set("subnet_ids", string_list(vpc.subnet_ids()))
                .str("ip_address_type", vpc.ip_address_type().map(|t| t.as_str()));
            attributes = attributes.set("vpc_configuration", Value::Map(block.into_map()));
        }
        if let Some(code) = output.code() {
            let block = Attributes::new()
                .str("s3_bucket", code.s3_bucket())
                .str("s3_key", code.s3_key())
                .str("s3_object_version", code.s3_object_version());
            attributes = attributes.set("code", Value::Map(block.into_map()));
        }

        let state = State::existing(id.clone(), attributes.into_map());
        Ok(match output.status() {
            Some(status) => state.with_status(status.as_str().into()),
            None => state,
        })
    }
}

/// Changed attributes of an update, all of which must be code configuration
fn code_changes(from: &State, to: &Resource) -> ProviderResult<Vec<String>> {
    let (code, other): (Vec<String>, Vec<String>) =
        differ::changed_attributes(&to.attributes, &from.attributes)
            .into_iter()
            .partition(|key| UPDATABLE.contains(&key.as_str()));
    if !other.is_empty() {
        return Err(ProviderError::unsupported(format!(
            "kx.cluster can only update code configuration in place; changing {} requires replacement",
            other.join(", ")
        )));
    }
    Ok(code)
}

fn command_line_arguments(resource: &Resource) -> ProviderResult<Option<Vec<KxCommandLineArgument>>> {
    Ok(resource.get_string_map("command_line_arguments")?.map(|arguments| {
        let mut arguments: Vec<_> = arguments.into_iter().collect();
        arguments.sort();
        arguments
            .into_iter()
            .map(|(key, value)| KxCommandLineArgument::builder().key(key).value(value).build())
            .collect()
    }))
}

fn code_configuration(resource: &Resource) -> ProviderResult<Option<CodeConfiguration>> {
    let Some(code) = resource.nested("code")? else {
        return Ok(None);
    };
    Ok(Some(
        CodeConfiguration::builder()
            .s3_bucket(code.require_str("s3_bucket")?)
            .s3_key(code.require_str("s3_key")?)
            .set_s3_object_version(code.get_str("s3_object_version")?.map(str::to_string))
            .build(),
    ))
}

impl StatusProber for KxClusterHandler {
    fn probe<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<Observation>> {
        Box::pin(async move {
            Observation::from_lookup(self.get(identifier).await, |output| {
                observe(output.status().map(|s| s.as_str()), output.status_reason())
            })
        })
    }
}

impl ResourceHandler for KxClusterHandler {
    fn resource_type(&self) -> &'static str {
        "kx.cluster"
    }

    fn identifier_parts(&self) -> usize {
        2
    }

    fn transitions(&self) -> &TransitionTables {
        &TABLES
    }

    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<Created>> {
        Box::pin(self.create_cluster(resource))
    }

    fn update<'a>(
        &'a self,
        identifier: &'a str,
        from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.update_code(identifier, from, to))
    }

    fn delete<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let (environment_id, cluster_name) = identifier::decode_pair(identifier)?;
            self.client
                .delete_kx_cluster()
                .environment_id(environment_id)
                .cluster_name(cluster_name)
                .client_token(client_token())
                .send()
                .await
                .map_err(|e| sdk_error("DeleteKxCluster", e))?;
            Ok(())
        })
    }

    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.read_cluster(id, identifier))
    }
}
