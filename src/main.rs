// ===============================
// src/main.rs
// ===============================
/*
 # simulated ledger, fixed jitter
 RUST_LOG=info cargo run -- run --seed 7

 # provisioning progress
 curl -s localhost:9898/metrics | egrep '^(orchestrator_stage|ticks_seeded_total|confirmation_outcomes_total)'
*/
/*
=============================================================================
Project : clmm_seeder : concentrated-liquidity pool provisioning in Rust
Module  : main.rs
Version : 0.1.0
License : MIT (see LICENSE)

Summary : Deploys a hook and a pool program, funds and links them, seeds
          bell-curve liquidity across signed ticks, and runs a demo swap,
          confirming every step against the ledger before the next.
=============================================================================
*/
mod config;
mod confirm;
mod curve;
mod domain;
mod error;
mod group;
mod ledger;
mod ledger_mock;    // in-process simulated ledger
mod ledger_node;    // REST node client
mod metrics;
mod orchestrator;
mod programs;
mod recorder;
mod signer;
mod slot;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::{
    sync::{mpsc, watch},
    time::Duration,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Args, Cli, Command, LedgerMode};
use crate::confirm::CancelFlag;
use crate::domain::Event;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::ledger_mock::{MockConfig, MockLedger};
use crate::ledger_node::NodeLedger;
use crate::orchestrator::Orchestrator;
use crate::programs::Programs;
use crate::signer::{DevSigner, Signer};

// starting balances on the simulated ledger
const MOCK_ADMIN_BALANCE: u64 = 100_000_000;
const MOCK_TRADER_BALANCE: u64 = 10_000_000;

#[tokio::main]
async fn main() {
    // ---- Logging (stderr; stdout carries the JSON result) ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cmd = cli.command();

    // ---- Load config ----
    let mut args = match config::load() {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, "config");
            std::process::exit(2);
        }
    };
    args.apply_command(&cmd);

    // ---- Metrics ----
    metrics::init();
    if let Some(port) = args.metrics_port {
        metrics::serve_metrics(port);
    }
    export_config(&args);

    // ---- Cancellation (Ctrl-C) ----
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            let _ = cancel_tx.send(true);
        }
    });

    // ---- Recorder (optional) ----
    let (rec_tx, rec_task) = match args.record_file.clone() {
        Some(path) => {
            let (tx, rx) = mpsc::channel::<Event>(8192);
            (Some(tx), Some(tokio::spawn(recorder::run(rx, path))))
        }
        None => (None, None),
    };

    let outcome = dispatch(args, cmd, cancel_rx, rec_tx).await;

    if let Some(task) = rec_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "recorder stopped with error"),
            Err(e) => warn!(?e, "recorder task failed"),
        }
    }

    if let Err(e) = outcome {
        error!(error = %e, "run failed");
        std::process::exit(1);
    }
}

fn export_config(args: &Args) {
    info!(
        ledger = args.ledger_mode.as_str(),
        node = %args.node_url,
        center = args.curve.center,
        radius = args.curve.radius,
        stddev = args.curve.stddev,
        peak_a = args.curve.peak_a,
        peak_b = args.curve.peak_b,
        jitter = args.curve.jitter,
        bell = args.bell_enable,
        swap = args.swap_enable,
        seed = ?args.rng_seed,
        "startup config"
    );
    let g = &metrics::CONFIG_CURVE;
    g.with_label_values(&["center"]).set(args.curve.center);
    g.with_label_values(&["radius"]).set(args.curve.radius as i64);
    g.with_label_values(&["peak_a"]).set(args.curve.peak_a as i64);
    g.with_label_values(&["peak_b"]).set(args.curve.peak_b as i64);
}

async fn dispatch(
    args: Args,
    cmd: Command,
    cancel: CancelFlag,
    rec_tx: Option<mpsc::Sender<Event>>,
) -> Result<()> {
    let admin = DevSigner::from_secret("admin", &args.admin_secret);
    let trader = DevSigner::from_secret("trader", &args.trader_secret);
    info!(admin = %admin.address(), trader = %trader.address(), "accounts");

    match args.ledger_mode {
        LedgerMode::Mock => {
            let cfg = MockConfig {
                visibility_lag: args.mock_visibility_lag,
                block_time: Duration::from_millis(args.mock_block_ms),
                ..Default::default()
            };
            let ledger = MockLedger::new(cfg)
                .with_account(&admin, MOCK_ADMIN_BALANCE)
                .with_account(&trader, MOCK_TRADER_BALANCE);
            let res = execute(&ledger, admin, trader, args, Programs::placeholder(), cmd, cancel, rec_tx).await;
            info!(round = ledger.round(), submissions = ledger.submissions(), "simulated ledger");
            res
        }
        LedgerMode::Testnet | LedgerMode::Mainnet => {
            let ledger = NodeLedger::new(&args.node_url, &args.node_token)?;
            let programs = Programs::load(&args.programs_dir).await?;
            execute(&ledger, admin, trader, args, programs, cmd, cancel, rec_tx).await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn execute<L: Ledger>(
    ledger: &L,
    admin: DevSigner,
    trader: DevSigner,
    args: Args,
    programs: Programs,
    cmd: Command,
    cancel: CancelFlag,
    rec_tx: Option<mpsc::Sender<Event>>,
) -> Result<()> {
    let seed = args.rng_seed;
    let mut orch = Orchestrator::new(ledger, admin, trader, args, programs, cancel);
    if let Some(tx) = rec_tx {
        orch = orch.with_recorder(tx);
    }

    match cmd {
        Command::CreateAssets => {
            let ids = orch.provision_assets().await?;
            println!("{}", serde_json::to_string_pretty(&ids)?);
        }
        Command::Run { .. } => {
            let mut rng = match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_entropy(),
            };
            let report = orch.run(&mut rng).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
