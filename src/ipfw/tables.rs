//! Address-set store on top of ipfw tables.
//!
//! One ipfw invocation per call, no batching. ipfw keeps all state; every
//! listing reads it live.

use anyhow::Result;
use ipnet::Ipv4Net;
use std::fmt;

use super::parser::{parse_table_listing, TableEntry};
use super::Ipfw;
use crate::cmd_abstraction::args_to_strings;
use crate::error::EngineError;
use crate::validation::validate_table_name;

/// A validated ipfw table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SetName(String);

impl SetName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_table_name(&name)?;
        Ok(Self(name))
    }

    /// Private table of a strict-monitoring client: `t` + zero-padded index.
    pub fn for_client_index(index: u8) -> Self {
        Self(format!("t{:03}", index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generic operations on named address tables.
#[derive(Debug, Clone)]
pub struct AddressSetStore {
    ipfw: Ipfw,
}

impl AddressSetStore {
    pub fn new(ipfw: Ipfw) -> Self {
        Self { ipfw }
    }

    /// Insert an entry. Adding an entry that is already present succeeds.
    pub fn add(&self, set: &SetName, entry: &Ipv4Net) -> Result<(), EngineError> {
        let entry = entry.to_string();
        self.run(&["table", set.as_str(), "add", &entry])
    }

    /// Insert an entry carrying a table value (e.g. a skip-to rule number).
    pub fn add_with_value(
        &self,
        set: &SetName,
        entry: &Ipv4Net,
        value: u32,
    ) -> Result<(), EngineError> {
        let entry = entry.to_string();
        let value = value.to_string();
        self.run(&["table", set.as_str(), "add", &entry, &value])
    }

    /// Delete an entry. Fails when the entry is absent.
    pub fn remove(&self, set: &SetName, entry: &Ipv4Net) -> Result<(), EngineError> {
        let entry = entry.to_string();
        self.run(&["table", set.as_str(), "delete", &entry])
    }

    /// List the current entries of a table.
    pub fn list(&self, set: &SetName) -> Result<Vec<TableEntry>, EngineError> {
        let output = self
            .ipfw
            .run(&args_to_strings(&["table", set.as_str(), "list"]))?;
        Ok(parse_table_listing(output.stdout_lines()))
    }

    /// Remove every entry of a table.
    pub fn flush(&self, set: &SetName) -> Result<(), EngineError> {
        self.run(&["table", set.as_str(), "flush"])
    }

    /// Create an empty address table.
    pub fn create(&self, set: &SetName) -> Result<(), EngineError> {
        self.run(&["table", set.as_str(), "create", "type", "addr"])
    }

    /// Destroy a table and its entries.
    pub fn destroy(&self, set: &SetName) -> Result<(), EngineError> {
        self.run(&["table", set.as_str(), "destroy"])
    }

    fn run(&self, args: &[&str]) -> Result<(), EngineError> {
        self.ipfw.run(&args_to_strings(args)).map(|_| ())
    }
}
