//! dynfw - dynamic ipfw firewall control plane
//!
//! Maps access-control requests onto ipfw tables and numbered rules.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use dynfw::cli::{Cli, Commands};
use dynfw::policy::Params;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve { listen, lock_file } => {
            dynfw::commands::serve::run(&cli.config, cli.dry_run, listen, &lock_file).await
        }
        Commands::Call {
            operation,
            ip_addr,
            mon_addr,
            table,
        } => {
            let params = Params {
                ip_addr,
                mon_addr,
                table,
            };
            dynfw::commands::call::run(operation, params, &cli.config, cli.dry_run).await
        }
        Commands::Slot { address } => dynfw::commands::slot::run(&address, &cli.config),
        Commands::CheckConfig => dynfw::commands::config::check(&cli.config),
        Commands::InitConfig { force } => dynfw::commands::config::init(&cli.config, force),
        Commands::Version => {
            println!("dynfw {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
