//! Resource type configurations for AWS Cloud Control API
//!
//! Maps each manifest resource type to its CloudFormation type name and
//! the manifest attribute <-> CloudFormation property names.

/// Attribute mapping: (manifest name, AWS property name, writable)
///
/// Read-only attributes are reported by read but never sent.
pub type AttrMapping = (&'static str, &'static str, bool);

/// Resource type configuration
#[derive(Debug)]
pub struct ResourceConfig {
    /// Manifest resource type (e.g., "ec2.vpc")
    pub resource_type: &'static str,
    /// AWS CloudFormation type name (e.g., "AWS::EC2::VPC")
    pub aws_type_name: &'static str,
    pub attributes: &'static [AttrMapping],
    /// Whether this resource type uses tags
    pub has_tags: bool,
}

impl ResourceConfig {
    pub fn writable(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.attributes
            .iter()
            .filter(|(_, _, writable)| *writable)
            .map(|(name, aws_name, _)| (*name, *aws_name))
    }
}

pub const VPC_CONFIG: ResourceConfig = ResourceConfig {
    resource_type: "ec2.vpc",
    aws_type_name: "AWS::EC2::VPC",
    attributes: &[
        ("vpc_id", "VpcId", false),
        ("cidr_block", "CidrBlock", true),
        ("enable_dns_hostnames", "EnableDnsHostnames", true),
        ("enable_dns_support", "EnableDnsSupport", true),
        ("instance_tenancy", "InstanceTenancy", true),
    ],
    has_tags: true,
};

pub const INTERNET_GATEWAY_CONFIG: ResourceConfig = ResourceConfig {
    resource_type: "ec2.internet_gateway",
    aws_type_name: "AWS::EC2::InternetGateway",
    attributes: &[("internet_gateway_id", "InternetGatewayId", false)],
    has_tags: true,
};

/// Attaches an internet gateway to a VPC; identified as `IGW|<vpc id>`
pub const VPC_GATEWAY_ATTACHMENT_CONFIG: ResourceConfig = ResourceConfig {
    resource_type: "ec2.vpc_gateway_attachment",
    aws_type_name: "AWS::EC2::VPCGatewayAttachment",
    attributes: &[
        ("vpc_id", "VpcId", true),
        ("internet_gateway_id", "InternetGatewayId", true),
    ],
    has_tags: false,
};

pub const LIGHTSAIL_LOAD_BALANCER_CONFIG: ResourceConfig = ResourceConfig {
    resource_type: "lightsail.load_balancer",
    aws_type_name: "AWS::Lightsail::LoadBalancer",
    attributes: &[
        ("load_balancer_name", "LoadBalancerName", true),
        ("load_balancer_arn", "LoadBalancerArn", false),
        ("instance_port", "InstancePort", true),
        ("ip_address_type", "IpAddressType", true),
        ("attached_instances", "AttachedInstances", true),
        ("health_check_path", "HealthCheckPath", true),
        ("session_stickiness_enabled", "SessionStickinessEnabled", true),
        (
            "session_stickiness_lb_cookie_duration_seconds",
            "SessionStickinessLBCookieDurationSeconds",
            true,
        ),
        ("tls_policy_name", "TlsPolicyName", true),
    ],
    has_tags: true,
};

pub const CONFIGS: &[&ResourceConfig] = &[
    &VPC_CONFIG,
    &INTERNET_GATEWAY_CONFIG,
    &VPC_GATEWAY_ATTACHMENT_CONFIG,
    &LIGHTSAIL_LOAD_BALANCER_CONFIG,
];

/// Get resource configuration by manifest type name
pub fn get_resource_config(resource_type: &str) -> Option<&'static ResourceConfig> {
    CONFIGS
        .iter()
        .copied()
        .find(|c| c.resource_type == resource_type)
}
