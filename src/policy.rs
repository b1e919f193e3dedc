//! Policy engine: the named access-control operations.
//!
//! Each operation validates its parameters before anything reaches ipfw and
//! answers with a [`PolicyResponse`], which serializes to the JSON body the
//! API returns:
//!
//! ```text
//! {"result": "success"}
//! {"result": "success", "ip_list": ["10.0.0.1/32"]}
//! {"result": "failed", "failed_steps": ["install_deny_rule"]}
//! {"add_block_src_ip": "malformed request"}
//! ```

use anyhow::Result;
use ipnet::Ipv4Net;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::allocator::{RuleAllocator, SequenceReport, Step, StrictLayout};
use crate::config::{Config, StrictConfig, TablesConfig};
use crate::error::EngineError;
use crate::ipfw::{AddressSetStore, Ipfw, SetName, TableEntry};
use crate::validation::{validate_ipv4, validate_ipv4_or_cidr};

const MALFORMED: &str = "malformed request";
const WRONG_TABLE: &str = "wrong table provided";

/// Every operation the engine exposes, named after its API endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListBlockedSources,
    BlockSource,
    UnblockSource,
    ListBlockedTargets,
    BlockTarget,
    UnblockTarget,
    ForwardList,
    ForwardAdd,
    ForwardRemove,
    ForwardClear,
    LockdownList,
    LockdownAdd,
    LockdownRemove,
    DmzAllowList,
    DmzAllowAdd,
    DmzAllowRemove,
    StrictHostAdd,
    StrictHostRemove,
    StrictHostList,
    StrictHostTargetAdd,
    StrictHostTargetRemove,
    StrictHostTargetList,
    StrictHostTargetClear,
}

impl Operation {
    pub const ALL: [Operation; 23] = [
        Operation::ListBlockedSources,
        Operation::BlockSource,
        Operation::UnblockSource,
        Operation::ListBlockedTargets,
        Operation::BlockTarget,
        Operation::UnblockTarget,
        Operation::ForwardList,
        Operation::ForwardAdd,
        Operation::ForwardRemove,
        Operation::ForwardClear,
        Operation::LockdownList,
        Operation::LockdownAdd,
        Operation::LockdownRemove,
        Operation::DmzAllowList,
        Operation::DmzAllowAdd,
        Operation::DmzAllowRemove,
        Operation::StrictHostAdd,
        Operation::StrictHostRemove,
        Operation::StrictHostList,
        Operation::StrictHostTargetAdd,
        Operation::StrictHostTargetRemove,
        Operation::StrictHostTargetList,
        Operation::StrictHostTargetClear,
    ];

    /// Endpoint name, also the key of a malformed-request response.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ListBlockedSources => "list_block_src_ip",
            Operation::BlockSource => "add_block_src_ip",
            Operation::UnblockSource => "del_block_src_ip",
            Operation::ListBlockedTargets => "list_block_target_ip",
            Operation::BlockTarget => "add_block_target_ip",
            Operation::UnblockTarget => "del_block_target_ip",
            Operation::ForwardList => "list_fwd_target_ip",
            Operation::ForwardAdd => "add_fwd_target_ip",
            Operation::ForwardRemove => "del_fwd_target_ip",
            Operation::ForwardClear => "clr_fwd_target_ip",
            Operation::LockdownList => "list_lockdown_dev_ip",
            Operation::LockdownAdd => "add_lockdown_dev_ip",
            Operation::LockdownRemove => "del_lockdown_dev_ip",
            Operation::DmzAllowList => "list_dmz_target_ip",
            Operation::DmzAllowAdd => "add_dmz_target_ip",
            Operation::DmzAllowRemove => "del_dmz_target_ip",
            Operation::StrictHostAdd => "add_strict_mon_host",
            Operation::StrictHostRemove => "del_strict_mon_host",
            Operation::StrictHostList => "list_strict_mon_host",
            Operation::StrictHostTargetAdd => "add_target_for_strict_host",
            Operation::StrictHostTargetRemove => "del_target_for_strict_host",
            Operation::StrictHostTargetList => "list_target_for_strict_host",
            Operation::StrictHostTargetClear => "clean_target_for_strict_host",
        }
    }

    /// Read-only operations, served on GET with query parameters.
    pub fn is_listing(&self) -> bool {
        matches!(
            self,
            Operation::ListBlockedSources
                | Operation::ListBlockedTargets
                | Operation::ForwardList
                | Operation::LockdownList
                | Operation::DmzAllowList
                | Operation::StrictHostList
                | Operation::StrictHostTargetList
        )
    }

    /// Hint returned on GET for mutating operations.
    pub fn usage(&self) -> &'static str {
        match self {
            Operation::BlockSource => "POST to add blocked IP addr",
            Operation::UnblockSource => "POST to delete blocked IP addr",
            Operation::BlockTarget => "POST to add block target IP addr",
            Operation::UnblockTarget => "POST to del block target IP addr",
            Operation::ForwardAdd => "POST to add forward target IP addr",
            Operation::ForwardRemove => "POST to del forward target IP addr",
            Operation::ForwardClear => "POST to clr forward target IP table fwdlist",
            Operation::LockdownAdd => "POST to add lockdown device IP addr",
            Operation::LockdownRemove => "POST to del lockdown device IP addr",
            Operation::DmzAllowAdd => "POST to add DMZ target IP addr",
            Operation::DmzAllowRemove => "POST to remove DMZ target IP addr",
            Operation::StrictHostAdd => "POST to Add host to strict_hosts_list table",
            Operation::StrictHostRemove => "POST to Del host from strict_hosts_list table",
            Operation::StrictHostTargetAdd => "POST to Add target IP address for mon host",
            Operation::StrictHostTargetRemove => "POST to Del target IP address from mon host",
            Operation::StrictHostTargetClear => "POST to clean all from mon host table",
            _ => "GET to list entries",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| format!("Unknown operation '{}'", s))
    }
}

/// Request parameters, as sent in API forms and query strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Params {
    pub ip_addr: Option<String>,
    pub mon_addr: Option<String>,
    pub table: Option<String>,
}

/// Result of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyResponse {
    Success,
    Failed { failed_steps: Vec<Step> },
    Listing(Vec<String>),
    Malformed(Operation),
    WrongTable(Operation),
}

impl PolicyResponse {
    pub fn failed() -> Self {
        PolicyResponse::Failed {
            failed_steps: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PolicyResponse::Success | PolicyResponse::Listing(_))
    }

    fn from_result(op: Operation, result: Result<(), EngineError>) -> Self {
        match result {
            Ok(()) => PolicyResponse::Success,
            Err(e) => {
                warn!("{} failed: {}", op, e);
                PolicyResponse::failed()
            }
        }
    }

    fn from_listing(op: Operation, result: Result<Vec<TableEntry>, EngineError>) -> Self {
        match result {
            Ok(entries) => {
                PolicyResponse::Listing(entries.iter().map(TableEntry::address).collect())
            }
            Err(e) => {
                warn!("{} failed: {}", op, e);
                PolicyResponse::failed()
            }
        }
    }

    fn from_report(report: SequenceReport) -> Self {
        if report.is_success() {
            PolicyResponse::Success
        } else {
            PolicyResponse::Failed {
                failed_steps: report.failed_steps(),
            }
        }
    }
}

impl Serialize for PolicyResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self {
            PolicyResponse::Success => map.serialize_entry("result", "success")?,
            PolicyResponse::Failed { failed_steps } => {
                map.serialize_entry("result", "failed")?;
                if !failed_steps.is_empty() {
                    map.serialize_entry("failed_steps", failed_steps)?;
                }
            }
            PolicyResponse::Listing(entries) => {
                map.serialize_entry("result", "success")?;
                map.serialize_entry("ip_list", entries)?;
            }
            PolicyResponse::Malformed(op) => map.serialize_entry(op.name(), MALFORMED)?,
            PolicyResponse::WrongTable(op) => map.serialize_entry(op.name(), WRONG_TABLE)?,
        }
        map.end()
    }
}

/// Validated names of the predefined tables.
#[derive(Debug, Clone)]
struct PolicyTables {
    block_source: SetName,
    block_target: SetName,
    lockdown: SetName,
    forward: SetName,
    dmz_allow: SetName,
}

impl PolicyTables {
    fn from_config(config: &TablesConfig) -> Result<Self> {
        Ok(Self {
            block_source: SetName::new(config.block_source.clone())?,
            block_target: SetName::new(config.block_target.clone())?,
            lockdown: SetName::new(config.lockdown.clone())?,
            forward: SetName::new(config.forward.clone())?,
            dmz_allow: SetName::new(config.dmz_allow.clone())?,
        })
    }
}

/// Maps access-control intents onto table and rule operations.
pub struct PolicyEngine {
    sets: AddressSetStore,
    allocator: RuleAllocator,
    tables: PolicyTables,
}

impl PolicyEngine {
    pub fn new(ipfw: Ipfw, tables: &TablesConfig, strict: &StrictConfig) -> Result<Self> {
        Ok(Self {
            sets: AddressSetStore::new(ipfw.clone()),
            allocator: RuleAllocator::new(ipfw, StrictLayout::from_config(strict)?),
            tables: PolicyTables::from_config(tables)?,
        })
    }

    /// Build the engine and its executor from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(Ipfw::from_config(&config.engine), &config.tables, &config.strict)
    }

    /// Run an operation by name with raw request parameters.
    pub fn dispatch(&self, op: Operation, params: &Params) -> PolicyResponse {
        debug!("Dispatching {} with {:?}", op, params);
        let ip_addr = params.ip_addr.as_deref();
        let mon_addr = params.mon_addr.as_deref();

        match op {
            Operation::ListBlockedSources => self.list_blocked_sources(),
            Operation::BlockSource => self.block_source(ip_addr),
            Operation::UnblockSource => self.unblock_source(ip_addr),
            Operation::ListBlockedTargets => self.list_blocked_targets(),
            Operation::BlockTarget => self.block_target(ip_addr),
            Operation::UnblockTarget => self.unblock_target(ip_addr),
            Operation::ForwardList => self.forward_list(),
            Operation::ForwardAdd => self.forward_add(ip_addr),
            Operation::ForwardRemove => self.forward_remove(ip_addr),
            Operation::ForwardClear => self.forward_clear(params.table.as_deref()),
            Operation::LockdownList => self.lockdown_list(),
            Operation::LockdownAdd => self.lockdown_add(ip_addr),
            Operation::LockdownRemove => self.lockdown_remove(ip_addr),
            Operation::DmzAllowList => self.dmz_allow_list(),
            Operation::DmzAllowAdd => self.dmz_allow_add(ip_addr),
            Operation::DmzAllowRemove => self.dmz_allow_remove(ip_addr),
            Operation::StrictHostAdd => self.strict_host_add(ip_addr),
            Operation::StrictHostRemove => self.strict_host_remove(ip_addr),
            Operation::StrictHostList => self.strict_host_list(),
            Operation::StrictHostTargetAdd => self.strict_host_target_add(mon_addr, ip_addr),
            Operation::StrictHostTargetRemove => {
                self.strict_host_target_remove(mon_addr, ip_addr)
            }
            Operation::StrictHostTargetList => self.strict_host_target_list(mon_addr),
            Operation::StrictHostTargetClear => self.strict_host_target_clear(mon_addr),
        }
    }

    pub fn list_blocked_sources(&self) -> PolicyResponse {
        self.list_set(Operation::ListBlockedSources, &self.tables.block_source)
    }

    pub fn block_source(&self, ip_addr: Option<&str>) -> PolicyResponse {
        self.add_entry(Operation::BlockSource, &self.tables.block_source, ip_addr)
    }

    pub fn unblock_source(&self, ip_addr: Option<&str>) -> PolicyResponse {
        self.remove_entry(Operation::UnblockSource, &self.tables.block_source, ip_addr)
    }

    pub fn list_blocked_targets(&self) -> PolicyResponse {
        self.list_set(Operation::ListBlockedTargets, &self.tables.block_target)
    }

    pub fn block_target(&self, ip_addr: Option<&str>) -> PolicyResponse {
        self.add_entry(Operation::BlockTarget, &self.tables.block_target, ip_addr)
    }

    pub fn unblock_target(&self, ip_addr: Option<&str>) -> PolicyResponse {
        self.remove_entry(Operation::UnblockTarget, &self.tables.block_target, ip_addr)
    }

    pub fn forward_list(&self) -> PolicyResponse {
        self.list_set(Operation::ForwardList, &self.tables.forward)
    }

    pub fn forward_add(&self, ip_addr: Option<&str>) -> PolicyResponse {
        self.add_entry(Operation::ForwardAdd, &self.tables.forward, ip_addr)
    }

    pub fn forward_remove(&self, ip_addr: Option<&str>) -> PolicyResponse {
        self.remove_entry(Operation::ForwardRemove, &self.tables.forward, ip_addr)
    }

    /// Flush the forward table. The caller must name it explicitly.
    pub fn forward_clear(&self, table: Option<&str>) -> PolicyResponse {
        let op = Operation::ForwardClear;
        match present(table) {
            None => PolicyResponse::Malformed(op),
            Some(name) if name != self.tables.forward.as_str() => PolicyResponse::WrongTable(op),
            Some(_) => PolicyResponse::from_result(op, self.sets.flush(&self.tables.forward)),
        }
    }

    pub fn lockdown_list(&self) -> PolicyResponse {
        self.list_set(Operation::LockdownList, &self.tables.lockdown)
    }

    pub fn lockdown_add(&self, ip_addr: Option<&str>) -> PolicyResponse {
        self.add_entry(Operation::LockdownAdd, &self.tables.lockdown, ip_addr)
    }

    pub fn lockdown_remove(&self, ip_addr: Option<&str>) -> PolicyResponse {
        self.remove_entry(Operation::LockdownRemove, &self.tables.lockdown, ip_addr)
    }

    pub fn dmz_allow_list(&self) -> PolicyResponse {
        self.list_set(Operation::DmzAllowList, &self.tables.dmz_allow)
    }

    pub fn dmz_allow_add(&self, ip_addr: Option<&str>) -> PolicyResponse {
        self.add_entry(Operation::DmzAllowAdd, &self.tables.dmz_allow, ip_addr)
    }

    pub fn dmz_allow_remove(&self, ip_addr: Option<&str>) -> PolicyResponse {
        self.remove_entry(Operation::DmzAllowRemove, &self.tables.dmz_allow, ip_addr)
    }

    pub fn strict_host_add(&self, ip_addr: Option<&str>) -> PolicyResponse {
        match host_param(Operation::StrictHostAdd, ip_addr) {
            Ok(client) => PolicyResponse::from_report(self.allocator.provision(client)),
            Err(malformed) => malformed,
        }
    }

    pub fn strict_host_remove(&self, ip_addr: Option<&str>) -> PolicyResponse {
        match host_param(Operation::StrictHostRemove, ip_addr) {
            Ok(client) => PolicyResponse::from_report(self.allocator.deprovision(client)),
            Err(malformed) => malformed,
        }
    }

    pub fn strict_host_list(&self) -> PolicyResponse {
        PolicyResponse::from_listing(Operation::StrictHostList, self.allocator.list_clients())
    }

    pub fn strict_host_target_add(
        &self,
        mon_addr: Option<&str>,
        ip_addr: Option<&str>,
    ) -> PolicyResponse {
        let op = Operation::StrictHostTargetAdd;
        match (host_param(op, mon_addr), entry_param(op, ip_addr)) {
            (Ok(client), Ok(target)) => {
                PolicyResponse::from_result(op, self.allocator.add_allowed_target(client, &target))
            }
            _ => PolicyResponse::Malformed(op),
        }
    }

    pub fn strict_host_target_remove(
        &self,
        mon_addr: Option<&str>,
        ip_addr: Option<&str>,
    ) -> PolicyResponse {
        let op = Operation::StrictHostTargetRemove;
        match (host_param(op, mon_addr), entry_param(op, ip_addr)) {
            (Ok(client), Ok(target)) => PolicyResponse::from_result(
                op,
                self.allocator.remove_allowed_target(client, &target),
            ),
            _ => PolicyResponse::Malformed(op),
        }
    }

    pub fn strict_host_target_list(&self, mon_addr: Option<&str>) -> PolicyResponse {
        let op = Operation::StrictHostTargetList;
        match host_param(op, mon_addr) {
            Ok(client) => {
                PolicyResponse::from_listing(op, self.allocator.list_allowed_targets(client))
            }
            Err(malformed) => malformed,
        }
    }

    pub fn strict_host_target_clear(&self, mon_addr: Option<&str>) -> PolicyResponse {
        let op = Operation::StrictHostTargetClear;
        match host_param(op, mon_addr) {
            Ok(client) => {
                PolicyResponse::from_result(op, self.allocator.clear_allowed_targets(client))
            }
            Err(malformed) => malformed,
        }
    }

    fn add_entry(&self, op: Operation, set: &SetName, ip_addr: Option<&str>) -> PolicyResponse {
        match entry_param(op, ip_addr) {
            Ok(entry) => PolicyResponse::from_result(op, self.sets.add(set, &entry)),
            Err(malformed) => malformed,
        }
    }

    fn remove_entry(&self, op: Operation, set: &SetName, ip_addr: Option<&str>) -> PolicyResponse {
        match entry_param(op, ip_addr) {
            Ok(entry) => PolicyResponse::from_result(op, self.sets.remove(set, &entry)),
            Err(malformed) => malformed,
        }
    }

    fn list_set(&self, op: Operation, set: &SetName) -> PolicyResponse {
        PolicyResponse::from_listing(op, self.sets.list(set))
    }
}

/// Absent and empty parameters are treated alike.
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A table entry: dotted quad with optional prefix. Host bits are cleared
/// the way ipfw stores the entry, so listings show what was added.
fn entry_param(op: Operation, value: Option<&str>) -> Result<Ipv4Net, PolicyResponse> {
    let value = present(value).ok_or(PolicyResponse::Malformed(op))?;
    validate_ipv4_or_cidr(value)
        .map(|net| net.trunc())
        .map_err(|e| {
            debug!("{}: {}", op, e);
            PolicyResponse::Malformed(op)
        })
}

/// A monitored host: plain dotted quad.
fn host_param(op: Operation, value: Option<&str>) -> Result<Ipv4Addr, PolicyResponse> {
    let value = present(value).ok_or(PolicyResponse::Malformed(op))?;
    validate_ipv4(value).map_err(|e| {
        debug!("{}: {}", op, e);
        PolicyResponse::Malformed(op)
    })
}
