// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : clmm_seeder : concentrated-liquidity pool provisioning in Rust
Module  : config.rs
Version : 0.1.0
License : MIT (see LICENSE)

Summary : Deploys a hook and a pool program, funds and links them, seeds
          bell-curve liquidity across signed ticks, and runs a demo swap,
          confirming every step against the ledger before the next.
=============================================================================
*/
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use serde::Serialize;

use crate::curve::CurveParams;
use crate::domain::AssetId;
use crate::error::{Result, SeedError};

/// Which ledger the run talks to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerMode {
    Mock,
    Testnet,
    Mainnet,
}

impl LedgerMode {
    /// Empty means `default_mode`; anything unrecognised is a config error.
    pub fn parse(raw: &str, default_mode: LedgerMode) -> Result<LedgerMode> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" => Ok(default_mode),
            "mock" => Ok(LedgerMode::Mock),
            "testnet" => Ok(LedgerMode::Testnet),
            "mainnet" => Ok(LedgerMode::Mainnet),
            other => Err(SeedError::Config(format!(
                "LEDGER_MODE={other} must be mock, testnet or mainnet"
            ))),
        }
    }

    pub fn from_env(key: &str, default_mode: LedgerMode) -> Result<LedgerMode> {
        LedgerMode::parse(&env::var(key).unwrap_or_default(), default_mode)
    }

    // Node endpoint default per mode
    pub fn default_node_url(&self) -> &'static str {
        match self {
            LedgerMode::Mock => "http://127.0.0.1:4001", // unused in mock
            LedgerMode::Testnet => "https://testnet-api.algonode.cloud",
            LedgerMode::Mainnet => "https://mainnet-api.algonode.cloud",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerMode::Mock => "mock",
            LedgerMode::Testnet => "testnet",
            LedgerMode::Mainnet => "mainnet",
        }
    }
}

/// Which pool leg the demo swap pays in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapLeg {
    A,
    B,
}

impl SwapLeg {
    pub fn parse_one(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" | "asset_a" => Some(SwapLeg::A),
            "b" | "asset_b" => Some(SwapLeg::B),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AssetIds {
    pub a: AssetId,
    pub b: AssetId,
    pub reward: Option<AssetId>,
}

impl AssetIds {
    /// Assets the pool program references: both legs, then the reward asset if any.
    pub fn pool_assets(&self) -> Vec<AssetId> {
        let mut ids = vec![self.a, self.b];
        ids.extend(self.reward);
        ids
    }
}

#[derive(Clone, Debug)]
pub struct Args {
    // ledger
    pub ledger_mode: LedgerMode,
    pub node_url: String,
    pub node_token: String,
    pub confirm_rounds: u64,

    // accounts (dev signing secrets)
    pub admin_secret: String,
    pub trader_secret: String,
    pub min_balance_required: u64,

    // assets: configured ids, or created by the run
    pub assets: Option<AssetIds>,
    pub asset_total: u64,
    pub trader_fund_units: u64,

    // programs
    pub programs_dir: PathBuf,
    pub hook_mask: u64,
    pub protocol_fee_bp: u64,
    pub pool_fund_amount: u64,
    pub pool_min_balance: u64,

    // liquidity
    pub bell_enable: bool,
    pub curve: CurveParams,
    pub rng_seed: Option<u64>,

    // demo swap
    pub swap_enable: bool,
    pub swap_leg: SwapLeg,
    pub swap_in_amount: u64,

    // files/metrics
    pub record_file: Option<String>,
    pub metrics_port: Option<u16>,

    // simulated ledger
    pub mock_block_ms: u64,
    pub mock_visibility_lag: u32,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            ledger_mode: LedgerMode::Mock,
            node_url: LedgerMode::Mock.default_node_url().to_string(),
            node_token: String::new(),
            confirm_rounds: 60,
            admin_secret: "admin-dev-secret".to_string(),
            trader_secret: "trader-dev-secret".to_string(),
            min_balance_required: 2_000_000,
            assets: None,
            asset_total: 10_000_000_000,
            trader_fund_units: 1_000_000,
            programs_dir: PathBuf::from("."),
            hook_mask: 2,
            protocol_fee_bp: 0,
            pool_fund_amount: 3_000_000,
            pool_min_balance: 4_500_000,
            bell_enable: true,
            curve: CurveParams {
                center: 0,
                radius: 3,
                stddev: 1.0,
                peak_a: 1000,
                peak_b: 500,
                jitter: 0.35,
            },
            rng_seed: None,
            swap_enable: true,
            swap_leg: SwapLeg::A,
            swap_in_amount: 50,
            record_file: None,
            metrics_port: None,
            mock_block_ms: 0,
            mock_visibility_lag: 1,
        }
    }
}

/// Command line; flags override the environment.
#[derive(Parser, Debug)]
#[command(version, about = "Deploy a hooked concentrated-liquidity pool and seed it", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Full workflow: deploy, link, seed, swap (default)
    Run {
        /// Seed for the per-tick jitter (overrides RNG_SEED)
        #[arg(long)]
        seed: Option<u64>,
        /// Stop after seeding liquidity
        #[arg(long)]
        no_swap: bool,
    },
    /// Create the test assets, fund the trader, print the ids
    CreateAssets,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.cmd.clone().unwrap_or(Command::Run { seed: None, no_swap: false })
    }
}

impl Args {
    pub fn apply_command(&mut self, cmd: &Command) {
        if let Command::Run { seed, no_swap } = cmd {
            if seed.is_some() {
                self.rng_seed = *seed;
            }
            if *no_swap {
                self.swap_enable = false;
            }
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| SeedError::Config(format!("{key}={v} is not valid"))),
        _ => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key).unwrap_or_default().trim().to_ascii_lowercase().as_str() {
        "" => Ok(default),
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(SeedError::Config(format!("{key}={other} is not a boolean"))),
    }
}

// basis points: 10_000 takes the whole input
const MAX_FEE_BP: u64 = 10_000;

fn fee_bp(raw: u64) -> Result<u64> {
    if raw > MAX_FEE_BP {
        return Err(SeedError::Config(format!("PROTOCOL_FEE_BP={raw} exceeds {MAX_FEE_BP}")));
    }
    Ok(raw)
}

fn assets_from(a: u64, b: u64, reward: u64) -> Result<Option<AssetIds>> {
    let reward = (reward != 0).then_some(reward);
    match (a, b) {
        (0, 0) => Ok(None),
        (0, _) | (_, 0) => Err(SeedError::Config(
            "set both ASSET_A_ID and ASSET_B_ID, or neither to create them".into(),
        )),
        (a, b) if a == b => Err(SeedError::Config(format!("ASSET_A_ID and ASSET_B_ID are both {a}"))),
        (a, b) => Ok(Some(AssetIds { a, b, reward })),
    }
}

pub fn load() -> Result<Args> {
    // Pastikan .env dibaca
    let _ = dotenv();
    let d = Args::default();

    // ===== Ledger =====
    let ledger_mode = LedgerMode::from_env("LEDGER_MODE", LedgerMode::Mock)?;
    let node_url = env::var("NODE_URL").unwrap_or_else(|_| ledger_mode.default_node_url().to_string());
    let node_token = env::var("NODE_TOKEN").unwrap_or_default();

    // ===== Accounts =====
    let secret = |key: &str, fallback: &str| -> Result<String> {
        match env::var(key) {
            Ok(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            _ if ledger_mode == LedgerMode::Mock => Ok(fallback.to_string()),
            _ => Err(SeedError::Config(format!("{key} is required in {} mode", ledger_mode.as_str()))),
        }
    };
    let admin_secret = secret("ADMIN_SECRET", &d.admin_secret)?;
    let trader_secret = secret("TRADER_SECRET", &d.trader_secret)?;
    if admin_secret == trader_secret {
        return Err(SeedError::Config("ADMIN_SECRET and TRADER_SECRET must differ".into()));
    }

    // ===== Assets =====
    let assets = assets_from(
        env_or("ASSET_A_ID", 0u64)?,
        env_or("ASSET_B_ID", 0u64)?,
        env_or("REWARD_ASSET_ID", 0u64)?,
    )?;

    // ===== Bell curve =====
    // Contoh:
    //   BELL_CENTER=0 BELL_RADIUS=3 BELL_STDDEV=1.0 BELL_JITTER=0.35
    let curve = CurveParams {
        center: env_or("BELL_CENTER", d.curve.center)?,
        radius: env_or("BELL_RADIUS", d.curve.radius)?,
        stddev: env_or("BELL_STDDEV", d.curve.stddev)?,
        peak_a: env_or("BELL_PEAK_A", d.curve.peak_a)?,
        peak_b: env_or("BELL_PEAK_B", d.curve.peak_b)?,
        jitter: env_or("BELL_JITTER", d.curve.jitter)?,
    };
    curve.validate()?;

    let swap_leg = match env::var("SWAP_IN_ASSET") {
        Ok(s) => SwapLeg::parse_one(&s)
            .ok_or_else(|| SeedError::Config(format!("SWAP_IN_ASSET={s} must be a or b")))?,
        Err(_) => d.swap_leg,
    };

    let rng_seed = match env::var("RNG_SEED") {
        Ok(s) if !s.trim().is_empty() => Some(
            s.trim()
                .parse()
                .map_err(|_| SeedError::Config(format!("RNG_SEED={s} is not valid")))?,
        ),
        _ => None,
    };

    let metrics_port = match env::var("METRICS_PORT") {
        Ok(s) if !s.trim().is_empty() => Some(
            s.trim()
                .parse()
                .map_err(|_| SeedError::Config(format!("METRICS_PORT={s} is not valid")))?,
        ),
        _ => None,
    };

    Ok(Args {
        ledger_mode,
        node_url,
        node_token,
        confirm_rounds: env_or("CONFIRM_ROUNDS", d.confirm_rounds)?,
        admin_secret,
        trader_secret,
        min_balance_required: env_or("MIN_BALANCE_REQUIRED", d.min_balance_required)?,
        assets,
        asset_total: env_or("ASSET_TOTAL", d.asset_total)?,
        trader_fund_units: env_or("TRADER_FUND_UNITS", d.trader_fund_units)?,
        programs_dir: env::var("PROGRAMS_DIR").map(PathBuf::from).unwrap_or(d.programs_dir),
        hook_mask: env_or("HOOK_MASK", d.hook_mask)?,
        protocol_fee_bp: fee_bp(env_or("PROTOCOL_FEE_BP", d.protocol_fee_bp)?)?,
        pool_fund_amount: env_or("POOL_FUND_AMOUNT", d.pool_fund_amount)?,
        pool_min_balance: env_or("POOL_MIN_BALANCE", d.pool_min_balance)?,
        bell_enable: env_bool("BELL_ENABLE", d.bell_enable)?,
        curve,
        rng_seed,
        swap_enable: env_bool("SWAP_ENABLE", d.swap_enable)?,
        swap_leg,
        swap_in_amount: env_or("SWAP_IN_AMOUNT", d.swap_in_amount)?,
        record_file: env::var("RECORD_FILE").ok(),
        metrics_port,
        mock_block_ms: env_or("MOCK_BLOCK_MS", d.mock_block_ms)?,
        mock_visibility_lag: env_or("MOCK_VISIBILITY_LAG", d.mock_visibility_lag)?,
    })
}
