//! Policy gateway.
//!
//! An API gateway built with Tokio and Axum: declared endpoints are matched
//! by host, path and method, and each match runs the ordered policy chain
//! of its pipeline.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────────┐
//!                  │                     POLICY GATEWAY                       │
//!                  │                                                          │
//!  Client Request  │  ┌─────────┐   ┌─────────┐   ┌──────────┐   ┌─────────┐  │
//!  ────────────────┼─▶│   net   │──▶│   tls   │──▶│   http   │──▶│ gateway │  │
//!                  │  │listener │   │  (SNI)  │   │  server  │   │dispatch │  │
//!                  │  └─────────┘   └─────────┘   └──────────┘   └────┬────┘  │
//!                  │                                                  │       │
//!                  │                    ┌──────────┐   ┌──────────┐   │       │
//!                  │                    │ pipeline │◀──│ routing  │◀──┘       │
//!                  │                    │  chain   │   │ (table)  │           │
//!                  │                    └────┬─────┘   └──────────┘           │
//!                  │                         │ context + expression           │
//!                  │                         ▼                                │
//!  Client Response │                    ┌──────────┐                          │
//!  ◀───────────────┼────────────────────│  policy  │──────────────────────────┼──▶ Backend
//!                  │                    │ (proxy…) │                          │
//!                  │                    └──────────┘                          │
//!                  │                                                          │
//!                  │  config (load, validate, watch) · observability ·        │
//!                  │  lifecycle (signals, shutdown)                           │
//!                  └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use policy_gateway::lifecycle::startup;
use policy_gateway::PolicyRegistry;

#[derive(Debug, Parser)]
#[command(name = "policy-gateway", version, about = "Policy-driven API gateway")]
struct Cli {
    /// Configuration file (TOML, or JSON with a .json extension).
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "gateway.toml")]
    config: PathBuf,

    /// Validate and compile the configuration, then exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let registry = PolicyRegistry::with_builtins();

    if cli.check {
        let snapshot = startup::check(&cli.config, &registry)?;
        println!(
            "{}: ok ({} routed endpoints, {} tls hosts)",
            cli.config.display(),
            snapshot.routes().len(),
            snapshot.sni().len()
        );
        return Ok(());
    }

    startup::run(&cli.config, registry).await?;
    Ok(())
}
