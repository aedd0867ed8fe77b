//! Conversion between manifest attributes and Cloud Control properties

use std::collections::HashMap;

use serde_json::json;
use settle_core::error::{ProviderError, ProviderResult};
use settle_core::resource::{Resource, State, Value};

use crate::resources::ResourceConfig;

/// CloudFormation desired state for a create
pub(crate) fn desired_state(
    resource: &Resource,
    config: &ResourceConfig,
) -> ProviderResult<serde_json::Value> {
    let mut desired = serde_json::Map::new();
    for (name, aws_name) in config.writable() {
        if let Some(value) = resource.attributes.get(name) {
            desired.insert(aws_name.to_string(), to_json(name, value)?);
        }
    }
    if config.has_tags {
        let tags = build_tags(resource.attributes.get("tags"));
        if !tags.is_empty() {
            desired.insert("Tags".to_string(), json!(tags));
        }
    }
    Ok(serde_json::Value::Object(desired))
}

/// Manifest attributes from the properties Cloud Control reports
pub(crate) fn attributes_from(
    props: &serde_json::Value,
    config: &ResourceConfig,
) -> HashMap<String, Value> {
    let mut attributes: HashMap<String, Value> = config
        .attributes
        .iter()
        .filter_map(|(name, aws_name, _)| {
            let value = Value::from_json(props.get(*aws_name)?)?;
            Some((name.to_string(), value))
        })
        .collect();

    if config.has_tags
        && let Some(tags) = props.get("Tags").and_then(|v| v.as_array())
    {
        let tags = parse_tags(tags);
        if !tags.is_empty() {
            attributes.insert("tags".to_string(), Value::Map(tags));
        }
    }

    attributes
}

/// The VPC of a gateway attachment, if the attachment belongs to `gateway_id`
pub(crate) fn attached_vpc<'a>(props: &'a serde_json::Value, gateway_id: &str) -> Option<&'a str> {
    if props.get("InternetGatewayId")?.as_str()? != gateway_id {
        return None;
    }
    props.get("VpcId")?.as_str()
}

/// JSON Patch operations moving the remote from `from` to `to`
///
/// Only writable attributes the manifest declares are patched.
pub(crate) fn patch_operations(
    from: &State,
    to: &Resource,
    config: &ResourceConfig,
) -> ProviderResult<Vec<serde_json::Value>> {
    let mut ops = Vec::new();
    for (name, aws_name) in config.writable() {
        let Some(value) = to.attributes.get(name) else {
            continue;
        };
        let op = match from.attributes.get(name) {
            Some(current) if current == value => continue,
            Some(_) => "replace",
            None => "add",
        };
        ops.push(json!({
            "op": op,
            "path": format!("/{}", aws_name),
            "value": to_json(name, value)?,
        }));
    }

    if config.has_tags
        && let Some(tags) = to.attributes.get("tags")
        && from.attributes.get("tags") != Some(tags)
    {
        ops.push(json!({"op": "add", "path": "/Tags", "value": build_tags(Some(tags))}));
    }
    Ok(ops)
}

fn to_json(name: &str, value: &Value) -> ProviderResult<serde_json::Value> {
    if let Value::ResourceRef(resource, attribute) = value {
        return Err(ProviderError::invalid_configuration(format!(
            "{} refers to {}.{}, which has not been resolved",
            name, resource, attribute
        )));
    }
    Ok(value.to_json())
}

/// Build tags array in CloudFormation format, sorted by key
fn build_tags(user_tags: Option<&Value>) -> Vec<serde_json::Value> {
    let Some(Value::Map(user_tags)) = user_tags else {
        return Vec::new();
    };
    let mut keys: Vec<&String> = user_tags.keys().collect();
    keys.sort();
    keys.into_iter()
        .filter_map(|key| match &user_tags[key] {
            Value::String(v) => Some(json!({"Key": key, "Value": v})),
            _ => None,
        })
        .collect()
}

/// Parse tags from CloudFormation format to map
fn parse_tags(tags: &[serde_json::Value]) -> HashMap<String, Value> {
    tags.iter()
        .filter_map(|tag| {
            let key = tag.get("Key")?.as_str()?;
            let value = tag.get("Value")?.as_str()?;
            Some((key.to_string(), Value::String(value.to_string())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use settle_core::resource::ResourceId;

    use super::*;
    use crate::resources::{INTERNET_GATEWAY_CONFIG, VPC_CONFIG};

    fn tags(pairs: &[(&str, &str)]) -> Value {
        Value::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect(),
        )
    }

    #[test]
    fn desired_state_skips_read_only_attributes() {
        let vpc = Resource::new("ec2.vpc", "main")
            .with_attribute("cidr_block", Value::String("10.0.0.0/16".to_string()))
            .with_attribute("vpc_id", Value::String("vpc-1".to_string()))
            .with_attribute("tags", tags(&[("team", "data"), ("env", "prod")]));

        let desired = desired_state(&vpc, &VPC_CONFIG).unwrap();

        assert_eq!(
            desired,
            json!({
                "CidrBlock": "10.0.0.0/16",
                "Tags": [{"Key": "env", "Value": "prod"}, {"Key": "team", "Value": "data"}],
            })
        );
    }

    #[test]
    fn unresolved_reference_is_rejected() {
        let vpc = Resource::new("ec2.vpc", "main").with_attribute(
            "cidr_block",
            Value::ResourceRef("ipam".to_string(), "cidr".to_string()),
        );
        assert!(desired_state(&vpc, &VPC_CONFIG).is_err());
    }

    #[test]
    fn gateway_reads_id_and_tags() {
        let props = json!({
            "InternetGatewayId": "igw-1",
            "Tags": [{"Key": "Name", "Value": "edge"}],
        });

        let attributes = attributes_from(&props, &INTERNET_GATEWAY_CONFIG);

        assert_eq!(attributes["internet_gateway_id"], Value::String("igw-1".to_string()));
        assert_eq!(attributes["tags"], tags(&[("Name", "edge")]));
        assert_eq!(attributes.len(), 2);
    }

    #[test]
    fn attachment_matches_only_its_gateway() {
        let attachment = json!({
            "AttachmentType": "IGW",
            "InternetGatewayId": "igw-1",
            "VpcId": "vpc-1",
        });
        assert_eq!(attached_vpc(&attachment, "igw-1"), Some("vpc-1"));
        assert_eq!(attached_vpc(&attachment, "igw-2"), None);

        let vpn = json!({"AttachmentType": "VPN", "VpnGatewayId": "vgw-1", "VpcId": "vpc-1"});
        assert_eq!(attached_vpc(&vpn, "igw-1"), None);
    }

    #[test]
    fn patch_contains_only_changed_writable_attributes() {
        let from = State::existing(
            ResourceId::new("ec2.vpc", "main"),
            HashMap::from([
                ("cidr_block".to_string(), Value::String("10.0.0.0/16".to_string())),
                ("enable_dns_support".to_string(), Value::Bool(false)),
            ]),
        );
        let to = Resource::new("ec2.vpc", "main")
            .with_attribute("cidr_block", Value::String("10.0.0.0/16".to_string()))
            .with_attribute("enable_dns_support", Value::Bool(true))
            .with_attribute("enable_dns_hostnames", Value::Bool(true));

        let ops = patch_operations(&from, &to, &VPC_CONFIG).unwrap();

        assert_eq!(ops.len(), 2);
        assert!(ops.contains(&json!({"op": "replace", "path": "/EnableDnsSupport", "value": true})));
        assert!(ops.contains(&json!({"op": "add", "path": "/EnableDnsHostnames", "value": true})));
    }
}
