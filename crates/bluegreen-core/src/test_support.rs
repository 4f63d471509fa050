//! In-memory provider fakes shared by the module tests.

use crate::environment::{DownstreamServices, Environment, EnvName, ServiceRule, TemplatePaths};
use crate::provider::{
    AliasTarget, DnsClient, IngressRule, LoadBalancer, LoadBalancerClient, Parameter,
    ProviderError, SecurityGroupClient, Stack, StackClient, StackEvent, StackStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

pub fn test_env() -> Environment {
    Environment {
        name: EnvName::Dev,
        product: "fc".to_string(),
        region: "us-east-1".to_string(),
        zone: "example.org".to_string(),
        dns_name: "test.example.org".to_string(),
        key_name: None,
        templates: TemplatePaths::default(),
        downstream: DownstreamServices {
            database: ServiceRule {
                security_group_id: "sg-database".to_string(),
                protocol: "tcp".to_string(),
                port: 5432,
            },
            log_pipeline: ServiceRule {
                security_group_id: "sg-logs".to_string(),
                protocol: "tcp".to_string(),
                port: 5043,
            },
            cache: ServiceRule {
                security_group_id: "sg-cache".to_string(),
                protocol: "tcp".to_string(),
                port: 11211,
            },
        },
    }
}

pub fn created_at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, day, hour, 0, 0).unwrap()
}

pub fn stack(name: &str, status: StackStatus, day: u32) -> Stack {
    Stack {
        name: name.to_string(),
        status,
        created_at: created_at(day, 12),
        outputs: BTreeMap::new(),
    }
}

// ---------------------------------------------------------------------------
// FakeStacks
// ---------------------------------------------------------------------------

struct StackRecord {
    exists: bool,
    statuses: VecDeque<StackStatus>,
    last: StackStatus,
    created_at: DateTime<Utc>,
    outputs: BTreeMap<String, String>,
}

#[derive(Default)]
pub struct FakeStacks {
    records: Mutex<HashMap<String, StackRecord>>,
    seq: Mutex<u32>,
    update_error: Mutex<Option<ProviderError>>,
    fail_delete: Mutex<HashSet<String>>,
    create_calls: Mutex<Vec<String>>,
    update_calls: Mutex<Vec<(String, Vec<Parameter>)>>,
    delete_calls: Mutex<Vec<String>>,
}

impl FakeStacks {
    /// Register a stack that does not exist yet; `create` brings it to life
    /// and `describe` then walks the scripted statuses (last one sticky).
    pub fn script_new(&self, name: &str, statuses: &[StackStatus], outputs: &[(&str, &str)]) {
        self.insert_record(name, false, statuses, outputs);
    }

    /// Register an existing stack with a fixed status.
    pub fn insert_ready(&self, name: &str, status: StackStatus, outputs: &[(&str, &str)]) {
        self.insert_record(name, true, std::slice::from_ref(&status), outputs);
    }

    fn insert_record(
        &self,
        name: &str,
        exists: bool,
        statuses: &[StackStatus],
        outputs: &[(&str, &str)],
    ) {
        let mut queue: VecDeque<StackStatus> = statuses.iter().cloned().collect();
        let last = queue.pop_back().expect("at least one status");
        // Registration order doubles as creation order.
        let mut seq = self.seq.lock().unwrap();
        *seq += 1;
        self.records.lock().unwrap().insert(
            name.to_string(),
            StackRecord {
                exists,
                statuses: queue,
                last,
                created_at: created_at(*seq, 12),
                outputs: outputs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );
    }

    pub fn fail_update_with(&self, err: ProviderError) {
        *self.update_error.lock().unwrap() = Some(err);
    }

    pub fn fail_delete(&self, name: &str) {
        self.fail_delete.lock().unwrap().insert(name.to_string());
    }

    pub fn create_calls(&self) -> Vec<String> {
        self.create_calls.lock().unwrap().clone()
    }

    pub fn update_calls(&self) -> Vec<(String, Vec<Parameter>)> {
        self.update_calls.lock().unwrap().clone()
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.delete_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StackClient for FakeStacks {
    async fn create(
        &self,
        name: &str,
        _template_body: &str,
        _parameters: &[Parameter],
    ) -> Result<(), ProviderError> {
        self.create_calls.lock().unwrap().push(name.to_string());
        let mut records = self.records.lock().unwrap();
        match records.get_mut(name) {
            Some(record) if record.exists => {
                Err(ProviderError::AlreadyExists(name.to_string()))
            }
            Some(record) => {
                record.exists = true;
                Ok(())
            }
            None => {
                records.insert(
                    name.to_string(),
                    StackRecord {
                        exists: true,
                        statuses: VecDeque::new(),
                        last: StackStatus::CreateComplete,
                        created_at: created_at(1, 12),
                        outputs: BTreeMap::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn describe(&self, name: &str) -> Result<Stack, ProviderError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(name)
            .filter(|r| r.exists)
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))?;
        let status = record.statuses.pop_front().unwrap_or_else(|| record.last.clone());
        Ok(Stack {
            name: name.to_string(),
            status,
            created_at: record.created_at,
            outputs: record.outputs.clone(),
        })
    }

    async fn list(&self) -> Result<Vec<Stack>, ProviderError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|(_, r)| r.exists)
            .map(|(name, r)| Stack {
                name: name.clone(),
                status: r.statuses.front().unwrap_or(&r.last).clone(),
                created_at: r.created_at,
                outputs: r.outputs.clone(),
            })
            .collect())
    }

    async fn update(
        &self,
        name: &str,
        _template_body: &str,
        parameters: &[Parameter],
    ) -> Result<(), ProviderError> {
        self.update_calls
            .lock()
            .unwrap()
            .push((name.to_string(), parameters.to_vec()));
        if let Some(err) = self.update_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ProviderError> {
        self.delete_calls.lock().unwrap().push(name.to_string());
        if self.fail_delete.lock().unwrap().contains(name) {
            return Err(ProviderError::Api(format!("delete failed for {name}")));
        }
        if let Some(record) = self.records.lock().unwrap().get_mut(name) {
            record.exists = false;
        }
        Ok(())
    }

    async fn events(&self, _name: &str) -> Result<Vec<StackEvent>, ProviderError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// FakeSecurityGroups
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeSecurityGroups {
    links: Mutex<HashSet<IngressRule>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeSecurityGroups {
    pub fn fail_group(&self, group_id: &str) {
        self.failing.lock().unwrap().insert(group_id.to_string());
    }

    pub fn links(&self) -> HashSet<IngressRule> {
        self.links.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecurityGroupClient for FakeSecurityGroups {
    async fn authorize_ingress(&self, rule: &IngressRule) -> Result<(), ProviderError> {
        if self.failing.lock().unwrap().contains(&rule.group_id) {
            return Err(ProviderError::Api(format!(
                "authorize failed for {}",
                rule.group_id
            )));
        }
        if !self.links.lock().unwrap().insert(rule.clone()) {
            return Err(ProviderError::AlreadyExists(rule.group_id.clone()));
        }
        Ok(())
    }

    async fn revoke_ingress(&self, rule: &IngressRule) -> Result<(), ProviderError> {
        if self.failing.lock().unwrap().contains(&rule.group_id) {
            return Err(ProviderError::Api(format!(
                "revoke failed for {}",
                rule.group_id
            )));
        }
        if !self.links.lock().unwrap().remove(rule) {
            return Err(ProviderError::NotFound(rule.group_id.clone()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeBalancers
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeBalancers {
    balancers: Vec<LoadBalancer>,
}

impl FakeBalancers {
    pub fn with_names(names: &[&str]) -> Self {
        FakeBalancers {
            balancers: names
                .iter()
                .map(|name| LoadBalancer {
                    name: name.to_string(),
                    dns_name: format!("{name}-1234567890.us-east-1.elb.amazonaws.com"),
                    hosted_zone_id: "Z35SXDOTRQ7X7K".to_string(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl LoadBalancerClient for FakeBalancers {
    async fn list(&self) -> Result<Vec<LoadBalancer>, ProviderError> {
        Ok(self.balancers.clone())
    }
}

// ---------------------------------------------------------------------------
// FakeDns
// ---------------------------------------------------------------------------

/// Change-batch semantics: every upsert lands under one lock, so a reader
/// sees either the old record or the new one, never an in-between state.
#[derive(Default)]
pub struct FakeDns {
    zones: HashMap<String, String>,
    records: Mutex<HashMap<(String, String), AliasTarget>>,
    batches: Mutex<Vec<(String, AliasTarget)>>,
}

impl FakeDns {
    pub fn with_zone(zone_name: &str, zone_id: &str) -> Self {
        let mut zones = HashMap::new();
        zones.insert(zone_name.to_string(), zone_id.to_string());
        FakeDns {
            zones,
            ..Default::default()
        }
    }

    pub fn record(&self, zone_id: &str, record_name: &str) -> Option<AliasTarget> {
        self.records
            .lock()
            .unwrap()
            .get(&(zone_id.to_string(), record_name.to_string()))
            .cloned()
    }

    /// Applied change batches, in order.
    pub fn batches(&self) -> Vec<(String, AliasTarget)> {
        self.batches.lock().unwrap().clone()
    }

    /// Count of records for a name; atomicity means this is always 0 or 1.
    pub fn record_count(&self, zone_id: &str, record_name: &str) -> usize {
        usize::from(self.record(zone_id, record_name).is_some())
    }
}

#[async_trait]
impl DnsClient for FakeDns {
    async fn zone_id(&self, zone_name: &str) -> Result<Option<String>, ProviderError> {
        Ok(self.zones.get(zone_name.trim_end_matches('.')).cloned())
    }

    async fn upsert_alias(
        &self,
        zone_id: &str,
        record_name: &str,
        target: &AliasTarget,
    ) -> Result<(), ProviderError> {
        let mut records = self.records.lock().unwrap();
        records.insert(
            (zone_id.to_string(), record_name.to_string()),
            target.clone(),
        );
        self.batches
            .lock()
            .unwrap()
            .push((record_name.to_string(), target.clone()));
        Ok(())
    }

    async fn resolve_alias(
        &self,
        zone_id: &str,
        record_name: &str,
    ) -> Result<Option<String>, ProviderError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(zone_id.to_string(), record_name.to_string()))
            .map(|t| t.dns_name.clone()))
    }
}

