//! Centralized validation functions for dynfw.
//!
//! This module provides unified validation for:
//! - IPv4 addresses and CIDR ranges taken from requests
//! - ipfw table names
//! - Network interface names used in rules

use anyhow::{bail, Result};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

use crate::error::DynfwError;

/// Longest table name ipfw accepts.
pub const MAX_TABLE_NAME_LEN: usize = 63;

/// Validate a dotted-quad IPv4 address and return it.
///
/// # Examples
/// ```
/// use dynfw::validation::validate_ipv4;
/// assert!(validate_ipv4("192.168.10.55").is_ok());
/// assert!(validate_ipv4("192.168.10.0/24").is_err());
/// assert!(validate_ipv4("::1").is_err());
/// ```
pub fn validate_ipv4(ip_str: &str) -> Result<Ipv4Addr> {
    ip_str
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid IPv4 address: {}", ip_str))
}

/// Validate an IPv4 address or CIDR string and return the parsed network.
///
/// A plain address (without /prefix) becomes a /32 network.
///
/// # Examples
/// ```
/// use dynfw::validation::validate_ipv4_or_cidr;
/// assert!(validate_ipv4_or_cidr("10.0.0.1").is_ok());
/// assert!(validate_ipv4_or_cidr("10.0.0.0/8").is_ok());
/// assert!(validate_ipv4_or_cidr("invalid").is_err());
/// ```
pub fn validate_ipv4_or_cidr(ip_str: &str) -> Result<Ipv4Net> {
    if ip_str.contains('/') {
        ip_str
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid CIDR: {}", ip_str))
    } else {
        let ip = validate_ipv4(ip_str)?;
        Ok(Ipv4Net::from(ip))
    }
}

/// Validate an ipfw table name.
///
/// Names are 1 to 63 ASCII alphanumerics, `_` or `-`, which keeps any name
/// from carrying engine syntax into a command line.
///
/// # Examples
/// ```
/// use dynfw::validation::validate_table_name;
/// assert!(validate_table_name("strict_hosts_list").is_ok());
/// assert!(validate_table_name("t055").is_ok());
/// assert!(validate_table_name("blocklist; flush").is_err());
/// ```
pub fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DynfwError::InvalidSetName("name cannot be empty".to_string()).into());
    }
    if name.len() > MAX_TABLE_NAME_LEN {
        return Err(DynfwError::InvalidSetName(format!(
            "'{}' is longer than {} characters",
            name, MAX_TABLE_NAME_LEN
        ))
        .into());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(DynfwError::InvalidSetName(format!(
            "'{}'. Only ASCII letters, digits, '_' and '-' allowed",
            name
        ))
        .into());
    }
    Ok(())
}

/// Validate a network interface name used in `via` clauses.
///
/// # Examples
/// ```
/// use dynfw::validation::validate_interface;
/// assert!(validate_interface("bridge0").is_ok());
/// assert!(validate_interface("vlan.10").is_ok());
/// assert!(validate_interface("em0 or any").is_err());
/// ```
pub fn validate_interface(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 15 {
        bail!("Invalid interface name '{}'. Length must be 1-15", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        bail!("Invalid interface name '{}'", name);
    }
    Ok(())
}
