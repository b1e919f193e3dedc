//! Strict-monitoring rule allocator.
//!
//! A monitored client is bound to a rule number and a private address table
//! derived from the last octet of its address:
//!
//! ```text
//! 192.168.10.55 -> index 55 -> rule 4055, table t055
//! ```
//!
//! Its entry in the strict hosts table carries the rule number as skip-to
//! value. At that rule number two rules are installed: traffic to the private
//! table skips to the allow path, everything else from the client is denied.
//!
//! Addresses sharing a last octet in different subnets map to the same slot.
//! This matches the rule numbering already deployed on gateways and is kept
//! as is.
//!
//! Sequences are not transactional. Each step is recorded in a
//! [`SequenceReport`]; a failed step does not stop later steps and nothing is
//! rolled back.

use anyhow::Result;
use ipnet::Ipv4Net;
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::config::StrictConfig;
use crate::error::{DynfwError, EngineError};
use crate::ipfw::{
    AddressSetStore, Destination, Ipfw, Rule, RuleAction, RuleTable, SetName, TableEntry,
};
use crate::validation::validate_interface;

/// Rule number, private table and index owned by one monitored client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSlot {
    pub client: Ipv4Addr,
    pub index: u8,
    pub rule_number: u32,
    pub private_set: SetName,
}

impl ClientSlot {
    pub fn new(client: Ipv4Addr, rule_base: u32) -> Self {
        let index = client.octets()[3];
        Self {
            client,
            index,
            rule_number: rule_base + u32::from(index),
            private_set: SetName::for_client_index(index),
        }
    }

    /// Whether another client is mapped onto this slot.
    pub fn collides_with(&self, other: &ClientSlot) -> bool {
        self.index == other.index && self.client != other.client
    }
}

/// One step of a provisioning or teardown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    RegisterClient,
    DestroyStaleSet,
    CreatePrivateSet,
    DeleteStaleRule,
    InstallForwardRule,
    InstallDenyRule,
    DeleteRules,
    DestroyPrivateSet,
    UnregisterClient,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::RegisterClient => "register_client",
            Step::DestroyStaleSet => "destroy_stale_set",
            Step::CreatePrivateSet => "create_private_set",
            Step::DeleteStaleRule => "delete_stale_rule",
            Step::InstallForwardRule => "install_forward_rule",
            Step::InstallDenyRule => "install_deny_rule",
            Step::DeleteRules => "delete_rules",
            Step::DestroyPrivateSet => "destroy_private_set",
            Step::UnregisterClient => "unregister_client",
        }
    }

    /// Clean-slate steps: failing only means there was nothing to clean.
    pub fn is_tolerant(&self) -> bool {
        matches!(self, Step::DestroyStaleSet | Step::DeleteStaleRule)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: Step,
    pub result: Result<(), EngineError>,
}

impl StepOutcome {
    /// A required step that did not succeed.
    pub fn is_failure(&self) -> bool {
        self.result.is_err() && !self.step.is_tolerant()
    }
}

/// Outcome of every step of a provision or deprovision sequence.
#[derive(Debug, Clone)]
pub struct SequenceReport {
    pub slot: ClientSlot,
    pub steps: Vec<StepOutcome>,
}

impl SequenceReport {
    fn new(slot: ClientSlot) -> Self {
        Self {
            slot,
            steps: Vec::new(),
        }
    }

    fn record(&mut self, step: Step, result: Result<(), EngineError>) {
        if let Err(ref e) = result {
            if step.is_tolerant() {
                debug!("{} for {}: nothing to clean ({})", step, self.slot.client, e);
            } else {
                warn!("{} failed for {}: {}", step, self.slot.client, e);
            }
        }
        self.steps.push(StepOutcome { step, result });
    }

    pub fn is_success(&self) -> bool {
        !self.steps.iter().any(StepOutcome::is_failure)
    }

    pub fn failed_steps(&self) -> Vec<Step> {
        self.steps
            .iter()
            .filter(|o| o.is_failure())
            .map(|o| o.step)
            .collect()
    }
}

/// Strict-monitoring rule layout, validated from [`StrictConfig`].
#[derive(Debug, Clone)]
pub struct StrictLayout {
    pub hosts_table: SetName,
    pub rule_base: u32,
    pub allow_rule: u32,
    pub interface: String,
}

/// Highest rule number ipfw accepts.
pub const MAX_RULE_NUMBER: u32 = 65535;

impl StrictLayout {
    /// Validate the layout. Every client rule (`rule_base` + 0..=255) and
    /// the allow rule must be valid ipfw rule numbers.
    pub fn from_config(config: &StrictConfig) -> Result<Self> {
        validate_interface(&config.interface)?;

        let last_rule = config.rule_base.checked_add(u32::from(u8::MAX));
        if config.rule_base == 0 || last_rule.map_or(true, |last| last > MAX_RULE_NUMBER) {
            return Err(DynfwError::Config(format!(
                "strict.rule_base {} leaves no room for 256 client rules below {}",
                config.rule_base, MAX_RULE_NUMBER
            ))
            .into());
        }

        if config.allow_rule == 0 || config.allow_rule > MAX_RULE_NUMBER {
            return Err(DynfwError::Config(format!(
                "strict.allow_rule {} must be in 1..={}",
                config.allow_rule, MAX_RULE_NUMBER
            ))
            .into());
        }

        Ok(Self {
            hosts_table: SetName::new(config.hosts_table.clone())?,
            rule_base: config.rule_base,
            allow_rule: config.allow_rule,
            interface: config.interface.clone(),
        })
    }
}

/// One mutex per client index.
struct ClientLocks {
    slots: Vec<Mutex<()>>,
}

impl ClientLocks {
    fn new() -> Self {
        Self {
            slots: (0..=u8::MAX).map(|_| Mutex::new(())).collect(),
        }
    }

    fn lock(&self, index: u8) -> MutexGuard<'_, ()> {
        self.slots[usize::from(index)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Provisions and tears down per-client strict-monitoring state.
///
/// All operations on one client index are serialized; different indexes run
/// in parallel.
pub struct RuleAllocator {
    sets: AddressSetStore,
    rules: RuleTable,
    layout: StrictLayout,
    locks: ClientLocks,
}

impl RuleAllocator {
    pub fn new(ipfw: Ipfw, layout: StrictLayout) -> Self {
        Self {
            sets: AddressSetStore::new(ipfw.clone()),
            rules: RuleTable::new(ipfw),
            layout,
            locks: ClientLocks::new(),
        }
    }

    pub fn slot(&self, client: Ipv4Addr) -> ClientSlot {
        ClientSlot::new(client, self.layout.rule_base)
    }

    /// Put a client under strict monitoring with an empty allow-list.
    pub fn provision(&self, client: Ipv4Addr) -> SequenceReport {
        let slot = self.slot(client);
        let _guard = self.locks.lock(slot.index);
        info!(
            "Provisioning strict monitoring for {} (rule {}, table {})",
            client, slot.rule_number, slot.private_set
        );

        let mut report = SequenceReport::new(slot.clone());
        let hosts = &self.layout.hosts_table;

        report.record(
            Step::RegisterClient,
            self.sets
                .add_with_value(hosts, &Ipv4Net::from(client), slot.rule_number),
        );

        report.record(Step::DestroyStaleSet, self.sets.destroy(&slot.private_set));
        report.record(Step::CreatePrivateSet, self.sets.create(&slot.private_set));

        // ipfw has no atomic replace; clear the number before installing
        report.record(Step::DeleteStaleRule, self.rules.delete(slot.rule_number));

        report.record(
            Step::InstallForwardRule,
            self.rules.install(&self.forward_rule(&slot)),
        );
        report.record(
            Step::InstallDenyRule,
            self.rules.install(&self.deny_rule(&slot)),
        );

        if report.is_success() {
            info!("Strict monitoring active for {}", client);
        }
        report
    }

    /// Remove a client from strict monitoring.
    ///
    /// Rules go first so the private table is never referenced after it is
    /// destroyed.
    pub fn deprovision(&self, client: Ipv4Addr) -> SequenceReport {
        let slot = self.slot(client);
        let _guard = self.locks.lock(slot.index);
        info!(
            "Removing strict monitoring for {} (rule {}, table {})",
            client, slot.rule_number, slot.private_set
        );

        let mut report = SequenceReport::new(slot.clone());

        report.record(Step::DeleteRules, self.rules.delete(slot.rule_number));
        report.record(Step::DestroyPrivateSet, self.sets.destroy(&slot.private_set));
        report.record(
            Step::UnregisterClient,
            self.sets
                .remove(&self.layout.hosts_table, &Ipv4Net::from(client)),
        );

        report
    }

    /// Clients currently registered in the strict hosts table.
    pub fn list_clients(&self) -> Result<Vec<TableEntry>, EngineError> {
        self.sets.list(&self.layout.hosts_table)
    }

    pub fn list_allowed_targets(&self, client: Ipv4Addr) -> Result<Vec<TableEntry>, EngineError> {
        let slot = self.slot(client);
        let _guard = self.locks.lock(slot.index);
        self.sets.list(&slot.private_set)
    }

    /// Allow a destination. The client must already be provisioned.
    pub fn add_allowed_target(&self, client: Ipv4Addr, target: &Ipv4Net) -> Result<(), EngineError> {
        let slot = self.slot(client);
        let _guard = self.locks.lock(slot.index);
        self.sets.add(&slot.private_set, target)
    }

    pub fn remove_allowed_target(
        &self,
        client: Ipv4Addr,
        target: &Ipv4Net,
    ) -> Result<(), EngineError> {
        let slot = self.slot(client);
        let _guard = self.locks.lock(slot.index);
        self.sets.remove(&slot.private_set, target)
    }

    pub fn clear_allowed_targets(&self, client: Ipv4Addr) -> Result<(), EngineError> {
        let slot = self.slot(client);
        let _guard = self.locks.lock(slot.index);
        self.sets.flush(&slot.private_set)
    }

    fn forward_rule(&self, slot: &ClientSlot) -> Rule {
        Rule {
            number: slot.rule_number,
            action: RuleAction::SkipTo(self.layout.allow_rule),
            source: slot.client,
            destination: Destination::InTable(slot.private_set.clone()),
            via: self.layout.interface.clone(),
        }
    }

    fn deny_rule(&self, slot: &ClientSlot) -> Rule {
        Rule {
            number: slot.rule_number,
            action: RuleAction::Deny,
            source: slot.client,
            destination: Destination::NotInTable(slot.private_set.clone()),
            via: self.layout.interface.clone(),
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Rule numbers stay within the client block and names are t + 3 digits
        #[test]
        fn prop_slot_within_block(octets in any::<[u8; 4]>(), base in 1u32..=65280) {
            let slot = ClientSlot::new(Ipv4Addr::from(octets), base);
            prop_assert!(slot.rule_number >= base && slot.rule_number <= base + 255);
            prop_assert_eq!(slot.rule_number - base, u32::from(octets[3]));
            let name = slot.private_set.as_str();
            prop_assert_eq!(name.len(), 4);
            prop_assert!(name.starts_with('t'));
            prop_assert_eq!(name[1..].parse::<u8>().unwrap(), octets[3]);
        }

        /// Distinct last octets never share a slot
        #[test]
        fn prop_distinct_index_distinct_slot(a in any::<[u8; 4]>(), b in any::<[u8; 4]>()) {
            prop_assume!(a[3] != b[3]);
            let sa = ClientSlot::new(Ipv4Addr::from(a), 4000);
            let sb = ClientSlot::new(Ipv4Addr::from(b), 4000);
            prop_assert_ne!(sa.rule_number, sb.rule_number);
            prop_assert_ne!(sa.private_set, sb.private_set);
        }
    }
}
