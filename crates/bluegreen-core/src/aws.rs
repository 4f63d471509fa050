//! AWS-backed implementations of the provider client traits.
//!
//! Thin mappings over the service SDKs: no orchestration logic lives here.
//! The interesting part is the error translation — the SDKs surface
//! idempotency conflicts as coded service errors, and the core needs them
//! as distinct [`ProviderError`] variants.

use crate::provider::{
    AliasTarget, DnsClient, IngressRule, LoadBalancer, LoadBalancerClient, MachineClient,
    Parameter, ProviderError, SecurityGroupClient, Stack, StackClient, StackEvent, StackStatus,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_cloudformation::config::Region;
use aws_sdk_cloudformation::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_cloudformation::primitives::DateTime as AwsDateTime;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Error translation
// ---------------------------------------------------------------------------

fn map_err<E>(err: SdkError<E>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let code = err.code().unwrap_or_default().to_string();
    let message = match err.message() {
        Some(m) => m.to_string(),
        None => err.to_string(),
    };
    match code.as_str() {
        "Throttling" | "ThrottlingException" | "RequestLimitExceeded" => {
            ProviderError::Throttled(message)
        }
        "AlreadyExistsException" | "InvalidPermission.Duplicate" => {
            ProviderError::AlreadyExists(message)
        }
        "InvalidPermission.NotFound" | "InvalidGroup.NotFound" => ProviderError::NotFound(message),
        "ValidationError" if message.contains("does not exist") => ProviderError::NotFound(message),
        "ValidationError" if message.contains("No updates are to be performed") => {
            ProviderError::AlreadyUpToDate(message)
        }
        _ => ProviderError::Api(message),
    }
}

fn to_chrono(dt: Option<&AwsDateTime>) -> DateTime<Utc> {
    dt.and_then(|d| DateTime::from_timestamp(d.secs(), d.subsec_nanos()))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// AwsStackClient (CloudFormation)
// ---------------------------------------------------------------------------

pub struct AwsStackClient {
    client: aws_sdk_cloudformation::Client,
}

fn convert_stack(stack: &aws_sdk_cloudformation::types::Stack) -> Stack {
    let outputs: BTreeMap<String, String> = stack
        .outputs()
        .iter()
        .filter_map(|o| match (o.output_key(), o.output_value()) {
            (Some(k), Some(v)) => Some((k.to_string(), v.to_string())),
            _ => None,
        })
        .collect();
    Stack {
        name: stack.stack_name().unwrap_or_default().to_string(),
        status: stack
            .stack_status()
            .map(|s| StackStatus::from_provider(s.as_str()))
            .unwrap_or_else(|| StackStatus::Other("UNKNOWN".to_string())),
        created_at: to_chrono(stack.creation_time()),
        outputs,
    }
}

fn convert_parameters(parameters: &[Parameter]) -> Vec<aws_sdk_cloudformation::types::Parameter> {
    parameters
        .iter()
        .map(|p| {
            aws_sdk_cloudformation::types::Parameter::builder()
                .parameter_key(&p.key)
                .parameter_value(&p.value)
                .build()
        })
        .collect()
}

#[async_trait]
impl StackClient for AwsStackClient {
    async fn create(
        &self,
        name: &str,
        template_body: &str,
        parameters: &[Parameter],
    ) -> Result<(), ProviderError> {
        self.client
            .create_stack()
            .stack_name(name)
            .template_body(template_body)
            .set_parameters(Some(convert_parameters(parameters)))
            .send()
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn describe(&self, name: &str) -> Result<Stack, ProviderError> {
        let out = self
            .client
            .describe_stacks()
            .stack_name(name)
            .send()
            .await
            .map_err(map_err)?;
        out.stacks()
            .first()
            .map(convert_stack)
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))
    }

    async fn list(&self) -> Result<Vec<Stack>, ProviderError> {
        let mut stacks = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let out = self
                .client
                .describe_stacks()
                .set_next_token(next_token.clone())
                .send()
                .await
                .map_err(map_err)?;
            stacks.extend(out.stacks().iter().map(convert_stack));
            match out.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(stacks)
    }

    async fn update(
        &self,
        name: &str,
        template_body: &str,
        parameters: &[Parameter],
    ) -> Result<(), ProviderError> {
        self.client
            .update_stack()
            .stack_name(name)
            .template_body(template_body)
            .set_parameters(Some(convert_parameters(parameters)))
            .send()
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ProviderError> {
        self.client
            .delete_stack()
            .stack_name(name)
            .send()
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn events(&self, name: &str) -> Result<Vec<StackEvent>, ProviderError> {
        let out = self
            .client
            .describe_stack_events()
            .stack_name(name)
            .send()
            .await
            .map_err(map_err)?;
        // The provider already returns events newest first.
        Ok(out
            .stack_events()
            .iter()
            .map(|e| StackEvent {
                resource_status: e
                    .resource_status()
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default(),
                reason: e.resource_status_reason().map(str::to_string),
                at: to_chrono(e.timestamp()),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// AwsSecurityGroupClient (EC2)
// ---------------------------------------------------------------------------

pub struct AwsSecurityGroupClient {
    client: aws_sdk_ec2::Client,
}

fn ip_permission(rule: &IngressRule) -> aws_sdk_ec2::types::IpPermission {
    aws_sdk_ec2::types::IpPermission::builder()
        .ip_protocol(&rule.protocol)
        .from_port(i32::from(rule.port))
        .to_port(i32::from(rule.port))
        .user_id_group_pairs(
            aws_sdk_ec2::types::UserIdGroupPair::builder()
                .group_id(&rule.source_group_id)
                .build(),
        )
        .build()
}

#[async_trait]
impl SecurityGroupClient for AwsSecurityGroupClient {
    async fn authorize_ingress(&self, rule: &IngressRule) -> Result<(), ProviderError> {
        self.client
            .authorize_security_group_ingress()
            .group_id(&rule.group_id)
            .ip_permissions(ip_permission(rule))
            .send()
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn revoke_ingress(&self, rule: &IngressRule) -> Result<(), ProviderError> {
        self.client
            .revoke_security_group_ingress()
            .group_id(&rule.group_id)
            .ip_permissions(ip_permission(rule))
            .send()
            .await
            .map_err(map_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AwsLoadBalancerClient (ELBv2)
// ---------------------------------------------------------------------------

pub struct AwsLoadBalancerClient {
    client: aws_sdk_elasticloadbalancingv2::Client,
}

#[async_trait]
impl LoadBalancerClient for AwsLoadBalancerClient {
    async fn list(&self) -> Result<Vec<LoadBalancer>, ProviderError> {
        let mut balancers = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let out = self
                .client
                .describe_load_balancers()
                .set_marker(marker.clone())
                .send()
                .await
                .map_err(map_err)?;
            balancers.extend(out.load_balancers().iter().filter_map(|lb| {
                Some(LoadBalancer {
                    name: lb.load_balancer_name()?.to_string(),
                    dns_name: lb.dns_name()?.to_string(),
                    hosted_zone_id: lb.canonical_hosted_zone_id()?.to_string(),
                })
            }));
            match out.next_marker() {
                Some(m) => marker = Some(m.to_string()),
                None => break,
            }
        }
        Ok(balancers)
    }
}

// ---------------------------------------------------------------------------
// AwsDnsClient (Route 53)
// ---------------------------------------------------------------------------

pub struct AwsDnsClient {
    client: aws_sdk_route53::Client,
}

fn normalize_record(name: &str) -> String {
    format!("{}.", name.trim_end_matches('.'))
}

#[async_trait]
impl DnsClient for AwsDnsClient {
    async fn zone_id(&self, zone_name: &str) -> Result<Option<String>, ProviderError> {
        let wanted = normalize_record(zone_name);
        let out = self
            .client
            .list_hosted_zones_by_name()
            .dns_name(&wanted)
            .send()
            .await
            .map_err(map_err)?;
        Ok(out
            .hosted_zones()
            .iter()
            .find(|z| z.name() == wanted)
            .map(|z| z.id().trim_start_matches("/hostedzone/").to_string()))
    }

    async fn upsert_alias(
        &self,
        zone_id: &str,
        record_name: &str,
        target: &AliasTarget,
    ) -> Result<(), ProviderError> {
        use aws_sdk_route53::types::{
            AliasTarget as R53AliasTarget, Change, ChangeAction, ChangeBatch, ResourceRecordSet,
            RrType,
        };

        let build = |err: &dyn std::fmt::Display| ProviderError::Api(err.to_string());

        let alias = R53AliasTarget::builder()
            .hosted_zone_id(&target.hosted_zone_id)
            .dns_name(&target.dns_name)
            .evaluate_target_health(false)
            .build()
            .map_err(|e| build(&e))?;
        let record = ResourceRecordSet::builder()
            .name(normalize_record(record_name))
            .r#type(RrType::A)
            .alias_target(alias)
            .build()
            .map_err(|e| build(&e))?;
        let change = Change::builder()
            .action(ChangeAction::Upsert)
            .resource_record_set(record)
            .build()
            .map_err(|e| build(&e))?;
        let batch = ChangeBatch::builder()
            .changes(change)
            .build()
            .map_err(|e| build(&e))?;

        self.client
            .change_resource_record_sets()
            .hosted_zone_id(zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn resolve_alias(
        &self,
        zone_id: &str,
        record_name: &str,
    ) -> Result<Option<String>, ProviderError> {
        use aws_sdk_route53::types::RrType;

        let wanted = normalize_record(record_name);
        let out = self
            .client
            .list_resource_record_sets()
            .hosted_zone_id(zone_id)
            .start_record_name(&wanted)
            .start_record_type(RrType::A)
            .send()
            .await
            .map_err(map_err)?;
        Ok(out
            .resource_record_sets()
            .iter()
            .find(|r| r.name() == wanted && *r.r#type() == RrType::A)
            .and_then(|r| r.alias_target())
            .map(|a| a.dns_name().to_string()))
    }
}

// ---------------------------------------------------------------------------
// AwsMachineClient (CloudFormation + AutoScaling + EC2)
// ---------------------------------------------------------------------------

pub struct AwsMachineClient {
    cloudformation: aws_sdk_cloudformation::Client,
    autoscaling: aws_sdk_autoscaling::Client,
    ec2: aws_sdk_ec2::Client,
}

#[async_trait]
impl MachineClient for AwsMachineClient {
    async fn stack_resource(
        &self,
        stack_name: &str,
        logical_id: &str,
    ) -> Result<Option<String>, ProviderError> {
        let result = self
            .client_describe_resource(stack_name, logical_id)
            .await;
        match result {
            Ok(id) => Ok(id),
            Err(ProviderError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn group_instance_ids(&self, group_id: &str) -> Result<Vec<String>, ProviderError> {
        let out = self
            .autoscaling
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(group_id)
            .send()
            .await
            .map_err(map_err)?;
        Ok(out
            .auto_scaling_groups()
            .iter()
            .flat_map(|g| g.instances())
            .filter_map(|i| i.instance_id().map(str::to_string))
            .collect())
    }

    async fn instance_public_dns(
        &self,
        instance_ids: &[String],
    ) -> Result<Vec<String>, ProviderError> {
        if instance_ids.is_empty() {
            return Ok(Vec::new());
        }
        let out = self
            .ec2
            .describe_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .map_err(map_err)?;
        Ok(out
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .filter_map(|i| i.public_dns_name())
            .filter(|dns| !dns.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl AwsMachineClient {
    async fn client_describe_resource(
        &self,
        stack_name: &str,
        logical_id: &str,
    ) -> Result<Option<String>, ProviderError> {
        let out = self
            .cloudformation
            .describe_stack_resource()
            .stack_name(stack_name)
            .logical_resource_id(logical_id)
            .send()
            .await
            .map_err(map_err)?;
        Ok(out
            .stack_resource_detail()
            .and_then(|d| d.physical_resource_id())
            .map(str::to_string))
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

pub struct AwsClients {
    pub stacks: AwsStackClient,
    pub security_groups: AwsSecurityGroupClient,
    pub balancers: AwsLoadBalancerClient,
    pub dns: AwsDnsClient,
    pub machines: AwsMachineClient,
}

/// Build service clients from the ambient credential chain for one region.
pub async fn connect(region: &str) -> AwsClients {
    let config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await;
    AwsClients {
        stacks: AwsStackClient {
            client: aws_sdk_cloudformation::Client::new(&config),
        },
        security_groups: AwsSecurityGroupClient {
            client: aws_sdk_ec2::Client::new(&config),
        },
        balancers: AwsLoadBalancerClient {
            client: aws_sdk_elasticloadbalancingv2::Client::new(&config),
        },
        dns: AwsDnsClient {
            client: aws_sdk_route53::Client::new(&config),
        },
        machines: AwsMachineClient {
            cloudformation: aws_sdk_cloudformation::Client::new(&config),
            autoscaling: aws_sdk_autoscaling::Client::new(&config),
            ec2: aws_sdk_ec2::Client::new(&config),
        },
    }
}
