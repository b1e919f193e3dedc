//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::DEFAULT_CONFIG_PATH;
use crate::lock::DEFAULT_LOCK_FILE;
use crate::policy::Operation;

#[derive(Parser)]
#[command(name = "dynfw")]
#[command(author, version, about = "Dynamic ipfw firewall control plane")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output, every ipfw command line)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log ipfw commands instead of running them
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API daemon
    Serve {
        /// Listen address (overrides api.listen)
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Lock file held while serving
        #[arg(long, default_value = DEFAULT_LOCK_FILE)]
        lock_file: PathBuf,
    },

    /// Run one policy operation and print its JSON response
    Call {
        /// Operation name, e.g. add_block_src_ip
        #[arg(value_parser = Operation::from_str)]
        operation: Operation,

        /// Address or prefix the operation applies to
        #[arg(long)]
        ip_addr: Option<String>,

        /// Monitored host for strict-monitoring operations
        #[arg(long)]
        mon_addr: Option<String>,

        /// Table name (clr_fwd_target_ip)
        #[arg(long)]
        table: Option<String>,
    },

    /// Show the rule number and private table derived for a client
    Slot {
        /// Client IPv4 address
        address: String,
    },

    /// Load and validate the configuration file
    CheckConfig,

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show version
    Version,
}
