//! Parsing of `ipfw table <name> list` output into typed records.
//!
//! ipfw prints a header line followed by one entry per line:
//!
//! ```text
//! --- table(strict_hosts_list), set(0) ---
//! 192.168.10.55/32 4055
//! 10.0.0.0/8 0
//! ```
//!
//! Only lines starting with a dotted quad (optionally `/prefix`) are entries;
//! everything else is skipped.

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use tracing::debug;

/// One entry of an ipfw address table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub net: Ipv4Net,
    /// Value column, e.g. the skip-to rule number of a strict host
    pub value: Option<String>,
}

impl TableEntry {
    /// Entry rendered the way the engine prints it (`a.b.c.d/len`).
    pub fn address(&self) -> String {
        self.net.to_string()
    }

    /// Value column as a rule number, if it is numeric.
    pub fn rule_number(&self) -> Option<u32> {
        self.value.as_deref().and_then(|v| v.parse().ok())
    }
}

/// Parse all entry lines of a table listing.
pub fn parse_table_listing<'a, I>(lines: I) -> Vec<TableEntry>
where
    I: IntoIterator<Item = &'a str>,
{
    lines.into_iter().filter_map(parse_table_entry).collect()
}

/// Parse a single listing line, returning `None` for non-entry lines.
pub fn parse_table_entry(line: &str) -> Option<TableEntry> {
    let mut tokens = line.split_whitespace();
    let key = tokens.next()?;
    if !looks_like_dotted_quad(key) {
        return None;
    }

    let net = match parse_key(key) {
        Some(net) => net,
        None => {
            debug!("Skipping out-of-range table entry: {}", key);
            return None;
        }
    };

    Some(TableEntry {
        net,
        value: tokens.next().map(str::to_string),
    })
}

/// `ddd.ddd.ddd.ddd` with an optional `/dd`, checked on shape only.
fn looks_like_dotted_quad(token: &str) -> bool {
    let (addr, prefix) = match token.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (token, None),
    };

    let octets_ok = {
        let parts: Vec<&str> = addr.split('.').collect();
        parts.len() == 4 && parts.iter().all(|p| is_digits(p, 3))
    };

    octets_ok && prefix.map_or(true, |p| is_digits(p, 2))
}

fn is_digits(s: &str, max_len: usize) -> bool {
    !s.is_empty() && s.len() <= max_len && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_key(key: &str) -> Option<Ipv4Net> {
    match key.split_once('/') {
        Some((addr, prefix)) => {
            let addr: Ipv4Addr = addr.parse().ok()?;
            let prefix: u8 = prefix.parse().ok()?;
            Ipv4Net::new(addr, prefix).ok()
        }
        None => key.parse::<Ipv4Addr>().ok().map(Ipv4Net::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "--- table(strict_hosts_list), set(0) ---\n\
                           192.168.10.55/32 4055\n\
                           10.0.0.0/8 0\n";

    #[test]
    fn test_parse_listing_skips_header() {
        let entries = parse_table_listing(LISTING.lines());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].address(), "192.168.10.55/32");
        assert_eq!(entries[0].rule_number(), Some(4055));
        assert_eq!(entries[1].address(), "10.0.0.0/8");
    }

    #[test]
    fn test_parse_entry_without_prefix() {
        let entry = parse_table_entry("172.16.0.9").unwrap();
        assert_eq!(entry.address(), "172.16.0.9/32");
        assert!(entry.value.is_none());
    }

    #[test]
    fn test_parse_entry_trailing_whitespace() {
        let entry = parse_table_entry("8.8.8.8/32 0\r").unwrap();
        assert_eq!(entry.address(), "8.8.8.8/32");
        assert_eq!(entry.value.as_deref(), Some("0"));
    }

    #[test]
    fn test_non_entry_lines_skipped() {
        assert!(parse_table_entry("").is_none());
        assert!(parse_table_entry("ipfw: table not found").is_none());
        assert!(parse_table_entry("--- table(t055), set(0) ---").is_none());
        assert!(parse_table_entry("fe80::1/128 0").is_none());
        assert!(parse_table_entry("1.2.3/24 0").is_none());
    }

    #[test]
    fn test_out_of_range_entries_skipped() {
        assert!(parse_table_entry("300.1.1.1/32 0").is_none());
        assert!(parse_table_entry("10.0.0.1/40 0").is_none());
    }

    #[test]
    fn test_rule_number_non_numeric_value() {
        let entry = parse_table_entry("10.0.0.1/32 skip").unwrap();
        assert_eq!(entry.rule_number(), None);
    }
}
