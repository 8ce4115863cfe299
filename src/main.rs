use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env, Target};

use council_paxos::config;
use council_paxos::election::ElectionServer;

/// Runs a single-decree Paxos election between the council members
/// described in a JSON config file.
#[derive(Parser)]
struct Args {
    /// Path to the JSON member roster.
    config: PathBuf,
}

fn main() -> Result<()> {
    // The election transcript is part of the tool's output, so logs go
    // to stdout and default to info.
    Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stdout)
        .init();

    let args = Args::parse();
    let members = config::load_members(&args.config)?;

    println!("*** CONFIG LOADED SUCCESSFULLY ***");
    for member in &members {
        println!(
            "  {} {} (port {}, responseDelay {}ms)",
            member.role, member.id, member.port, member.response_delay
        );
    }
    println!();

    ElectionServer::new(&members).start();
    Ok(())
}
