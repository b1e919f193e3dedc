//! # dynfw - Dynamic ipfw Firewall Control Plane
//!
//! Turns access-control requests (block, lock down, forward, allow, strict
//! monitoring) into ipfw table entries and numbered rules on a gateway.
//!
//! ## Features
//!
//! - **Address tables** - add, remove, list and flush entries of the
//!   predefined ipfw tables
//! - **Strict monitoring** - one skip-to rule and one private table per
//!   client, derived from the client's last octet
//! - **HTTP API** - one endpoint per operation, JSON responses
//! - **Dry-run** - log every ipfw command instead of running it
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         dynfw                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: serve, call, slot, check-config...         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  API (axum)                                                 │
//! │    └── /add_block_src_ip, /list_strict_mon_host, ...        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PolicyEngine                                               │
//! │    ├── parameter validation, response shape                 │
//! │    └── RuleAllocator (per-client rule + private table)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ipfw                                                       │
//! │    ├── AddressSetStore / RuleTable                          │
//! │    └── listing parser                                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CommandExecutor (real, dry-run, mock)                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use dynfw::config::Config;
//! use dynfw::policy::{Operation, Params, PolicyEngine};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/dynfw/config.yaml")?;
//!     let engine = PolicyEngine::from_config(&config)?;
//!
//!     let params = Params {
//!         ip_addr: Some("192.168.10.55".to_string()),
//!         ..Params::default()
//!     };
//!     let response = engine.dispatch(Operation::StrictHostAdd, &params);
//!     println!("{}", serde_json::to_string(&response)?);
//!
//!     Ok(())
//! }
//! ```

pub mod allocator;
pub mod api;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod error;
pub mod ipfw;
pub mod lock;
pub mod policy;
pub mod signal;
pub mod validation;
