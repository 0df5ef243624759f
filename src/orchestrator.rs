// ===============================
// src/orchestrator.rs (provisioning workflow)
// ===============================
//
// AccountsReady -> [AssetsCreated] -> HookDeployed -> PoolDeployed -> PoolFunded
//   -> PoolOptedIn -> HookLinked -> TradersProvisioned -> LiquiditySeeded
//   -> DemoSwapExecuted
//
// Every step submits its operations and waits for confirmation before the
// stage is entered; nothing runs concurrently. Any error aborts the run.
//
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{Args, AssetIds, SwapLeg};
use crate::confirm::{confirm, is_cancelled, CancelFlag};
use crate::curve::{self, TickAllocation};
use crate::domain::{application_address, Address, AppId, AssetId, ConfirmedTx, Event, Operation, TxId};
use crate::error::{Result, SeedError};
use crate::group::{sign_single, submit_group, AtomicGroup};
use crate::ledger::Ledger;
use crate::metrics::{DEPOSITED, JOURNAL_DROPPED, STAGE, TICKS_SEEDED, TICKS_SKIPPED};
use crate::programs::{self, PoolRefs, Programs};
use crate::signer::{DevSigner, Signer};
use crate::slot;

// paid on top of the shortfall when topping the pool up
const POOL_TOP_UP_BUFFER: u64 = 300_000;

const CREATED_ASSETS: [(&str, &str); 3] = [("TOKA", "TokenA"), ("TOKB", "TokenB"), ("REWD", "Reward")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Init,
    AccountsReady,
    AssetsCreated,
    HookDeployed,
    PoolDeployed,
    PoolFunded,
    PoolOptedIn,
    HookLinked,
    TradersProvisioned,
    LiquiditySeeded,
    DemoSwapExecuted,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "Init",
            Stage::AccountsReady => "AccountsReady",
            Stage::AssetsCreated => "AssetsCreated",
            Stage::HookDeployed => "HookDeployed",
            Stage::PoolDeployed => "PoolDeployed",
            Stage::PoolFunded => "PoolFunded",
            Stage::PoolOptedIn => "PoolOptedIn",
            Stage::HookLinked => "HookLinked",
            Stage::TradersProvisioned => "TradersProvisioned",
            Stage::LiquiditySeeded => "LiquiditySeeded",
            Stage::DemoSwapExecuted => "DemoSwapExecuted",
        }
    }

    /// Whether `self` may be entered directly from `prev`.
    pub fn can_follow(&self, prev: Stage) -> bool {
        use Stage::*;
        matches!(
            (prev, *self),
            (Init, AccountsReady)
                | (AccountsReady, AssetsCreated)
                | (AccountsReady, HookDeployed)
                | (AssetsCreated, HookDeployed)
                | (HookDeployed, PoolDeployed)
                | (PoolDeployed, PoolFunded)
                | (PoolFunded, PoolOptedIn)
                | (PoolOptedIn, HookLinked)
                | (HookLinked, TradersProvisioned)
                | (TradersProvisioned, LiquiditySeeded)
                | (LiquiditySeeded, DemoSwapExecuted)
        )
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentRecords {
    pub hook_id: AppId,
    pub pool_id: AppId,
    pub pool_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeededTick {
    pub tick: i64,
    pub slot: u64,
    pub amount_a: u64,
    pub amount_b: u64,
    pub txid: TxId,
    pub round: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapRecord {
    pub tick: i64,
    pub asset_in: AssetId,
    pub amount_in: u64,
    pub amount_out: u64,
    pub txid: TxId,
    pub round: u64,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub stage: Stage,
    pub admin: Address,
    pub trader: Address,
    pub assets: Option<AssetIds>,
    pub deployment: Option<DeploymentRecords>,
    pub seeded: Vec<SeededTick>,
    pub skipped: Vec<i64>,
    pub swap: Option<SwapRecord>,
}

pub struct Orchestrator<'a, L: Ledger> {
    ledger: &'a L,
    admin: DevSigner,
    trader: DevSigner,
    args: Args,
    programs: Programs,
    cancel: CancelFlag,
    recorder: Option<mpsc::Sender<Event>>,

    stage: Stage,
    assets: Option<AssetIds>,
    deployment: Option<DeploymentRecords>,
    seeded: Vec<SeededTick>,
    skipped: Vec<i64>,
    swap: Option<SwapRecord>,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl<'a, L: Ledger> Orchestrator<'a, L> {
    pub fn new(
        ledger: &'a L,
        admin: DevSigner,
        trader: DevSigner,
        args: Args,
        programs: Programs,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            ledger,
            admin,
            trader,
            assets: args.assets,
            args,
            programs,
            cancel,
            recorder: None,
            stage: Stage::Init,
            deployment: None,
            seeded: Vec::new(),
            skipped: Vec::new(),
            swap: None,
        }
    }

    pub fn with_recorder(mut self, tx: mpsc::Sender<Event>) -> Self {
        self.recorder = Some(tx);
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Snapshot of everything confirmed so far.
    pub fn report(&self) -> RunReport {
        RunReport {
            stage: self.stage,
            admin: self.admin.address().clone(),
            trader: self.trader.address().clone(),
            assets: self.assets,
            deployment: self.deployment.clone(),
            seeded: self.seeded.clone(),
            skipped: self.skipped.clone(),
            swap: self.swap.clone(),
        }
    }

    fn record(&self, ev: Event) {
        if let Some(tx) = &self.recorder {
            if let Err(e) = tx.try_send(ev) {
                JOURNAL_DROPPED.inc();
                warn!(error = %e, "journal event dropped");
            }
        }
    }

    /// Moves the state machine forward; anything but a legal successor is refused.
    pub fn enter(&mut self, next: Stage) -> Result<()> {
        if !next.can_follow(self.stage) {
            return Err(SeedError::InvalidTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }
        self.stage = next;
        STAGE.set(next as i64);
        info!(stage = %next, "stage entered");
        self.record(Event::Stage { ts_ms: now_ms(), stage: next.to_string() });
        Ok(())
    }

    fn ensure_running(&self, step: &str) -> Result<()> {
        if is_cancelled(&self.cancel) {
            return Err(SeedError::Cancelled { context: format!("{step} (after {})", self.stage) });
        }
        Ok(())
    }

    fn signer_for(&self, sender: &Address) -> Result<&DevSigner> {
        [&self.admin, &self.trader]
            .into_iter()
            .find(|s| s.address() == sender)
            .ok_or_else(|| SeedError::Config(format!("no signing key for sender {sender}")))
    }

    /// One operation goes out alone; several go out as an atomic group.
    async fn send_and_confirm(&self, mut ops: Vec<Operation>, kind: &str) -> Result<ConfirmedTx> {
        let members = ops.len();
        let signed = if members == 1 {
            let op = ops.remove(0);
            let signer = self.signer_for(&op.sender)?;
            vec![sign_single(op, signer)?]
        } else {
            let group = AtomicGroup::new(ops)?;
            debug!(group = %group.id(), members = group.operations().len(), kind, "group built");
            group.sign(&[&self.admin, &self.trader])?
        };
        let txid = submit_group(self.ledger, signed, kind).await?;
        self.record(Event::Submitted {
            ts_ms: now_ms(),
            txid: txid.clone(),
            kind: kind.to_string(),
            members,
        });
        let tx = confirm(self.ledger, &txid, self.args.confirm_rounds, &self.cancel).await?;
        self.record(Event::Confirmed { ts_ms: now_ms(), txid, round: tx.confirmed_round });
        Ok(tx)
    }

    pub async fn run<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<RunReport> {
        match self.run_stages(rng).await {
            Ok(()) => Ok(self.report()),
            Err(e) => {
                warn!(stage = %self.stage, error = %e, "run aborted");
                self.record(Event::Failed { ts_ms: now_ms(), error: e.to_string() });
                Err(e)
            }
        }
    }

    /// Standalone asset provisioning: accounts check, then create and distribute.
    pub async fn provision_assets(&mut self) -> Result<AssetIds> {
        self.check_accounts().await?;
        self.create_assets().await
    }

    async fn run_stages<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        self.check_accounts().await?;
        let assets = match self.assets {
            Some(ids) => {
                info!(asset_a = ids.a, asset_b = ids.b, "using configured assets");
                ids
            }
            None => self.create_assets().await?,
        };
        let hook_id = self.deploy_hook().await?;
        let pool_id = self.deploy_pool(&assets, hook_id).await?;
        let refs = PoolRefs {
            pool_id,
            pool_address: application_address(pool_id),
            hook_id,
            asset_a: assets.a,
            asset_b: assets.b,
        };
        self.fund_pool(&refs).await?;
        self.opt_in_pool(&refs).await?;
        self.link_hook(&refs).await?;
        self.provision_trader(&refs).await?;
        self.seed_liquidity(&refs, rng).await?;
        if self.args.swap_enable {
            self.demo_swap(&refs).await?;
        } else {
            info!("demo swap disabled");
        }
        Ok(())
    }

    // ---- AccountsReady ----
    async fn check_accounts(&mut self) -> Result<()> {
        self.ensure_running("checking accounts")?;
        let required = self.args.min_balance_required;
        for signer in [&self.admin, &self.trader] {
            let info = self.ledger.account_info(signer.address()).await?;
            info!(account = signer.label(), address = %signer.address(), balance = info.amount, "account balance");
            if info.amount < required {
                return Err(SeedError::InsufficientFunds {
                    account: signer.address().clone(),
                    asset: "native".into(),
                    balance: info.amount,
                    required,
                });
            }
        }
        self.enter(Stage::AccountsReady)
    }

    /// Zero-amount self transfer unless the account already holds the asset.
    async fn opt_in(&self, account: &Address, asset_id: AssetId) -> Result<bool> {
        let info = self.ledger.account_info(account).await?;
        if info.holds(asset_id) {
            debug!(%account, asset_id, "already opted in");
            return Ok(false);
        }
        let sp = self.ledger.suggested_params().await?;
        self.send_and_confirm(vec![programs::asset_opt_in(account, &sp, asset_id)], "opt_in")
            .await?;
        info!(%account, asset_id, "opted in");
        Ok(true)
    }

    // ---- AssetsCreated ----
    async fn create_assets(&mut self) -> Result<AssetIds> {
        self.ensure_running("creating assets")?;
        let admin = self.admin.address().clone();
        let trader = self.trader.address().clone();
        let mut ids = Vec::with_capacity(CREATED_ASSETS.len());
        for (unit, name) in CREATED_ASSETS {
            let sp = self.ledger.suggested_params().await?;
            let op = programs::create_asset(&admin, &sp, unit, name, self.args.asset_total, 0);
            let tx = self.send_and_confirm(vec![op], "create_asset").await?;
            let id = tx
                .asset_index
                .ok_or(SeedError::MissingField { txid: tx.txid.clone(), field: "asset-index" })?;
            info!(unit, id, round = tx.confirmed_round, "asset created");
            ids.push(id);
        }

        for &id in &ids {
            self.opt_in(&trader, id).await?;
            let sp = self.ledger.suggested_params().await?;
            let fund = programs::asset_transfer(
                &admin,
                &sp,
                programs::FEE_DEFAULT,
                &trader,
                id,
                self.args.trader_fund_units,
            );
            self.send_and_confirm(vec![fund], "fund_trader").await?;
            info!(asset_id = id, amount = self.args.trader_fund_units, "trader funded");
        }

        let assets = AssetIds { a: ids[0], b: ids[1], reward: Some(ids[2]) };
        self.assets = Some(assets);
        self.enter(Stage::AssetsCreated)?;
        Ok(assets)
    }

    // ---- HookDeployed ----
    async fn deploy_hook(&mut self) -> Result<AppId> {
        self.ensure_running("deploying hook")?;
        let sp = self.ledger.suggested_params().await?;
        let op = programs::create_app(
            self.admin.address(),
            &sp,
            &self.programs.hook_approval,
            &self.programs.hook_clear,
            vec![],
            vec![],
        );
        let tx = self.send_and_confirm(vec![op], "create_hook").await?;
        let hook_id = tx
            .application_index
            .ok_or(SeedError::MissingField { txid: tx.txid.clone(), field: "application-index" })?;
        info!(hook_id, round = tx.confirmed_round, "hook deployed");
        self.enter(Stage::HookDeployed)?;
        Ok(hook_id)
    }

    // ---- PoolDeployed ----
    async fn deploy_pool(&mut self, assets: &AssetIds, hook_id: AppId) -> Result<AppId> {
        self.ensure_running("deploying pool")?;
        let sp = self.ledger.suggested_params().await?;
        let op = programs::create_app(
            self.admin.address(),
            &sp,
            &self.programs.pool_approval,
            &self.programs.pool_clear,
            assets.pool_assets(),
            vec![hook_id],
        );
        let tx = self.send_and_confirm(vec![op], "create_pool").await?;
        let pool_id = tx
            .application_index
            .ok_or(SeedError::MissingField { txid: tx.txid.clone(), field: "application-index" })?;
        let pool_address = application_address(pool_id);
        info!(pool_id, %pool_address, round = tx.confirmed_round, "pool deployed");
        self.deployment = Some(DeploymentRecords { hook_id, pool_id, pool_address });
        self.enter(Stage::PoolDeployed)?;
        Ok(pool_id)
    }

    // ---- PoolFunded ----
    async fn fund_pool(&mut self, refs: &PoolRefs) -> Result<()> {
        self.ensure_running("funding pool")?;
        let sp = self.ledger.suggested_params().await?;
        let amount = self.args.pool_fund_amount;
        let op = programs::payment(self.admin.address(), &sp, &refs.pool_address, amount);
        self.send_and_confirm(vec![op], "fund_pool").await?;
        info!(pool = %refs.pool_address, amount, "pool funded");
        self.enter(Stage::PoolFunded)
    }

    // ---- PoolOptedIn ----
    async fn opt_in_pool(&mut self, refs: &PoolRefs) -> Result<()> {
        self.ensure_running("opting pool in")?;
        let sp = self.ledger.suggested_params().await?;
        let op = programs::opt_in_assets(self.admin.address(), &sp, refs.pool_id, refs.asset_a, refs.asset_b);
        self.send_and_confirm(vec![op], "pool_opt_in").await?;
        self.enter(Stage::PoolOptedIn)
    }

    // ---- HookLinked ----
    async fn link_hook(&mut self, refs: &PoolRefs) -> Result<()> {
        self.ensure_running("linking hook")?;
        let sp = self.ledger.suggested_params().await?;
        let op = programs::set_hooks(
            self.admin.address(),
            &sp,
            refs.pool_id,
            refs.hook_id,
            self.args.hook_mask,
            self.args.protocol_fee_bp,
        );
        self.send_and_confirm(vec![op], "set_hooks").await?;
        info!(
            pool_id = refs.pool_id,
            hook_id = refs.hook_id,
            mask = self.args.hook_mask,
            fee_bp = self.args.protocol_fee_bp,
            "hook linked"
        );
        self.enter(Stage::HookLinked)
    }

    // ---- TradersProvisioned ----
    async fn provision_trader(&mut self, refs: &PoolRefs) -> Result<()> {
        self.ensure_running("provisioning trader")?;
        let trader = self.trader.address().clone();
        for asset in [refs.asset_a, refs.asset_b] {
            self.opt_in(&trader, asset).await?;
        }
        self.enter(Stage::TradersProvisioned)
    }

    fn swap_asset(&self, refs: &PoolRefs) -> AssetId {
        match self.args.swap_leg {
            SwapLeg::A => refs.asset_a,
            SwapLeg::B => refs.asset_b,
        }
    }

    async fn check_trader_holdings(&self, refs: &PoolRefs, plan: &[TickAllocation]) -> Result<()> {
        let (mut need_a, mut need_b) = curve::totals(plan);
        if self.args.swap_enable {
            match self.args.swap_leg {
                SwapLeg::A => need_a = need_a.saturating_add(self.args.swap_in_amount),
                SwapLeg::B => need_b = need_b.saturating_add(self.args.swap_in_amount),
            }
        }
        let info = self.ledger.account_info(self.trader.address()).await?;
        for (asset, required) in [(refs.asset_a, need_a), (refs.asset_b, need_b)] {
            let balance = info.asset_amount(asset).unwrap_or(0);
            if balance < required {
                return Err(SeedError::InsufficientFunds {
                    account: self.trader.address().clone(),
                    asset: format!("asset {asset}"),
                    balance,
                    required,
                });
            }
        }
        Ok(())
    }

    async fn top_up_pool(&self, refs: &PoolRefs) -> Result<()> {
        let info = self.ledger.account_info(&refs.pool_address).await?;
        let floor = self.args.pool_min_balance;
        if info.amount >= floor {
            debug!(balance = info.amount, floor, "pool balance sufficient");
            return Ok(());
        }
        let amount = floor - info.amount + POOL_TOP_UP_BUFFER;
        let sp = self.ledger.suggested_params().await?;
        let op = programs::payment(self.admin.address(), &sp, &refs.pool_address, amount);
        self.send_and_confirm(vec![op], "top_up_pool").await?;
        info!(balance = info.amount, floor, amount, "pool topped up");
        self.record(Event::Note { ts_ms: now_ms(), msg: format!("pool topped up by {amount}") });
        Ok(())
    }

    // ---- LiquiditySeeded ----
    async fn seed_liquidity<R: Rng + ?Sized>(&mut self, refs: &PoolRefs, rng: &mut R) -> Result<()> {
        self.ensure_running("seeding liquidity")?;
        let plan = if self.args.bell_enable {
            curve::plan(&self.args.curve, rng)?
        } else {
            // the demo swap trades in the center tick, so it gets the peak amounts
            info!(tick = self.args.curve.center, "bell curve disabled, seeding center tick only");
            vec![TickAllocation {
                tick: self.args.curve.center,
                amount_a: self.args.curve.peak_a,
                amount_b: self.args.curve.peak_b,
            }]
        };
        self.check_trader_holdings(refs, &plan).await?;
        if !plan.is_empty() {
            self.top_up_pool(refs).await?;
        }

        let trader = self.trader.address().clone();
        for alloc in &plan {
            self.ensure_running("seeding liquidity")?;
            let sp = self.ledger.suggested_params().await?;
            let Some(ops) = programs::mint_group(&trader, &sp, refs, alloc)? else {
                info!(tick = alloc.tick, "both legs round to zero, tick skipped");
                TICKS_SKIPPED.inc();
                self.skipped.push(alloc.tick);
                self.record(Event::SkippedTick { ts_ms: now_ms(), tick: alloc.tick });
                continue;
            };
            let tx = self.send_and_confirm(ops, "mint").await?;
            let slot = slot::encode(alloc.tick)?;
            TICKS_SEEDED.inc();
            DEPOSITED.with_label_values(&["a"]).inc_by(alloc.amount_a);
            DEPOSITED.with_label_values(&["b"]).inc_by(alloc.amount_b);
            info!(
                tick = alloc.tick,
                slot,
                amount_a = alloc.amount_a,
                amount_b = alloc.amount_b,
                round = tx.confirmed_round,
                "tick seeded"
            );
            self.record(Event::Minted {
                ts_ms: now_ms(),
                tick: alloc.tick,
                slot,
                amount_a: alloc.amount_a,
                amount_b: alloc.amount_b,
                round: tx.confirmed_round,
            });
            self.seeded.push(SeededTick {
                tick: alloc.tick,
                slot,
                amount_a: alloc.amount_a,
                amount_b: alloc.amount_b,
                txid: tx.txid,
                round: tx.confirmed_round,
            });
        }
        self.enter(Stage::LiquiditySeeded)
    }

    // ---- DemoSwapExecuted ----
    async fn demo_swap(&mut self, refs: &PoolRefs) -> Result<()> {
        self.ensure_running("swapping")?;
        let tick = self.args.curve.center;
        let asset_in = self.swap_asset(refs);
        let amount_in = self.args.swap_in_amount;
        let trader = self.trader.address().clone();

        let sp = self.ledger.suggested_params().await?;
        let ops = programs::swap_group(&trader, &sp, refs, tick, asset_in, amount_in)?;
        let tx = self.send_and_confirm(ops, "swap").await?;
        let amount_out = tx
            .inner_transfers
            .iter()
            .filter(|t| t.receiver == trader)
            .map(|t| t.amount)
            .sum();
        for line in &tx.logs {
            debug!(log = %line, "swap log");
        }
        info!(tick, asset_in, amount_in, amount_out, round = tx.confirmed_round, "demo swap executed");
        self.swap = Some(SwapRecord {
            tick,
            asset_in,
            amount_in,
            amount_out,
            txid: tx.txid,
            round: tx.confirmed_round,
            logs: tx.logs,
        });
        self.enter(Stage::DemoSwapExecuted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::CurveParams;
    use crate::ledger_mock::{MockConfig, MockLedger};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tokio::sync::watch;
    use tokio::time::{sleep, Duration};

    fn signers() -> (DevSigner, DevSigner) {
        (
            DevSigner::from_secret("admin", "admin-test-secret"),
            DevSigner::from_secret("trader", "trader-test-secret"),
        )
    }

    fn args(curve: CurveParams) -> Args {
        Args { curve, ..Args::default() }
    }

    fn reference_curve() -> CurveParams {
        CurveParams { center: 0, radius: 2, stddev: 1.0, peak_a: 1000, peak_b: 500, jitter: 0.0 }
    }

    fn ledger(admin: &DevSigner, trader: &DevSigner, cfg: MockConfig) -> MockLedger {
        MockLedger::new(cfg)
            .with_account(admin, 100_000_000)
            .with_account(trader, 10_000_000)
    }

    fn live_flag() -> (watch::Sender<bool>, CancelFlag) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn seeds_bell_curve_then_swaps() {
        let (admin, trader) = signers();
        let ledger = ledger(&admin, &trader, MockConfig::default());
        let (_tx, cancel) = live_flag();
        let (rec_tx, mut rec_rx) = mpsc::channel(1024);
        let mut orch = Orchestrator::new(
            &ledger,
            admin,
            trader.clone(),
            args(reference_curve()),
            Programs::placeholder(),
            cancel,
        )
        .with_recorder(rec_tx);

        let report = orch.run(&mut StdRng::seed_from_u64(7)).await.unwrap();
        assert_eq!(report.stage, Stage::DemoSwapExecuted);

        let ticks: Vec<i64> = report.seeded.iter().map(|s| s.tick).collect();
        let a: Vec<u64> = report.seeded.iter().map(|s| s.amount_a).collect();
        let b: Vec<u64> = report.seeded.iter().map(|s| s.amount_b).collect();
        assert_eq!(ticks, vec![-2, -1, 0, 1, 2]);
        assert_eq!(a, vec![135, 606, 1000, 606, 135]);
        assert_eq!(b, vec![67, 303, 500, 303, 67]);
        assert!(report.skipped.is_empty());

        // strictly sequential: each mint final before the next, swap after all
        let rounds: Vec<u64> = report.seeded.iter().map(|s| s.round).collect();
        assert!(rounds.windows(2).all(|w| w[0] < w[1]));
        let swap = report.swap.clone().unwrap();
        assert!(swap.round > *rounds.last().unwrap());
        assert_eq!(swap.tick, 0);
        assert!(swap.amount_out > 0);
        assert!(swap.logs.iter().any(|l| l.contains("post_swap")));

        let dep = report.deployment.clone().unwrap();
        assert_eq!(ledger.hook_of(dep.pool_id), Some(dep.hook_id));
        assert_eq!(ledger.seeded_ticks(dep.pool_id), vec![-2, -1, 0, 1, 2]);
        let assets = report.assets.unwrap();
        assert!(assets.reward.is_some());
        for s in &report.seeded {
            let r = ledger.reserves(dep.pool_id, s.tick).unwrap();
            if s.tick == 0 {
                assert_eq!(r.a, 1000 + swap.amount_in);
                assert_eq!(r.b, 500 - swap.amount_out);
            } else {
                assert_eq!((r.a, r.b), (s.amount_a, s.amount_b));
            }
        }
        assert_eq!(
            ledger.asset_balance(trader.address(), assets.b),
            Some(1_000_000 - 1240 + swap.amount_out)
        );

        drop(orch);
        let mut stages = Vec::new();
        while let Some(ev) = rec_rx.recv().await {
            if let Event::Stage { stage, .. } = ev {
                stages.push(stage);
            }
        }
        assert_eq!(stages.first().map(String::as_str), Some("AccountsReady"));
        assert_eq!(stages.last().map(String::as_str), Some("DemoSwapExecuted"));
        assert_eq!(stages.len(), 10);
    }

    #[tokio::test]
    async fn bell_disabled_seeds_center_tick_so_swap_has_liquidity() {
        let (admin, trader) = signers();
        let ledger = ledger(&admin, &trader, MockConfig::default());
        let (_tx, cancel) = live_flag();
        let cfg = Args { bell_enable: false, ..args(reference_curve()) };
        let mut orch = Orchestrator::new(&ledger, admin, trader, cfg, Programs::placeholder(), cancel);

        let report = orch.run(&mut StdRng::seed_from_u64(3)).await.unwrap();
        assert_eq!(report.stage, Stage::DemoSwapExecuted);
        let seeded: Vec<(i64, u64, u64)> =
            report.seeded.iter().map(|s| (s.tick, s.amount_a, s.amount_b)).collect();
        assert_eq!(seeded, vec![(0, 1000, 500)]);
        let pool = report.deployment.unwrap().pool_id;
        assert_eq!(ledger.seeded_ticks(pool), vec![0]);
        let swap = report.swap.unwrap();
        assert_eq!(swap.tick, 0);
        assert!(swap.amount_out > 0);
    }

    #[tokio::test]
    async fn full_journal_channel_drops_events_without_failing_the_run() {
        let (admin, trader) = signers();
        let ledger = ledger(&admin, &trader, MockConfig::default());
        let (_tx, cancel) = live_flag();
        // never drained: only the first event fits
        let (rec_tx, _rec_rx) = mpsc::channel(1);
        let mut cfg = args(reference_curve());
        cfg.swap_enable = false;
        let mut orch = Orchestrator::new(&ledger, admin, trader, cfg, Programs::placeholder(), cancel)
            .with_recorder(rec_tx);

        let before = JOURNAL_DROPPED.get();
        let report = orch.run(&mut StdRng::seed_from_u64(1)).await.unwrap();
        assert_eq!(report.stage, Stage::LiquiditySeeded);
        // 9 stages plus 5 mints were recorded, one fit
        assert!(JOURNAL_DROPPED.get() - before >= 13);
    }

    #[tokio::test]
    async fn zero_ticks_are_skipped_without_submission() {
        let (admin, trader) = signers();
        let ledger = ledger(&admin, &trader, MockConfig::default());
        let (_tx, cancel) = live_flag();
        let curve = CurveParams { center: 0, radius: 3, stddev: 0.5, peak_a: 10, peak_b: 5, jitter: 0.0 };
        let mut cfg = args(curve);
        cfg.swap_enable = false;
        let mut orch = Orchestrator::new(&ledger, admin, trader, cfg, Programs::placeholder(), cancel);

        let report = orch.run(&mut StdRng::seed_from_u64(1)).await.unwrap();
        assert_eq!(report.stage, Stage::LiquiditySeeded);
        assert_eq!(report.skipped, vec![-3, -2, 2, 3]);
        let seeded: Vec<(i64, u64, u64)> =
            report.seeded.iter().map(|s| (s.tick, s.amount_a, s.amount_b)).collect();
        assert_eq!(seeded, vec![(-1, 1, 0), (0, 10, 5), (1, 1, 0)]);

        let pool = report.deployment.unwrap().pool_id;
        assert!(ledger.reserves(pool, 2).is_none());
        assert!(ledger.reserves(pool, -3).is_none());
        // 3 creates, 3 opt-ins, 3 fundings, 5 deployment steps, 1 top-up, 3 mints
        assert_eq!(ledger.submissions(), 18);
    }

    #[tokio::test]
    async fn underfunded_account_stops_before_any_submission() {
        let (admin, trader) = signers();
        let ledger = MockLedger::new(MockConfig::default())
            .with_account(&admin, 100_000_000)
            .with_account(&trader, 1_500_000);
        let (_tx, cancel) = live_flag();
        let mut orch =
            Orchestrator::new(&ledger, admin, trader.clone(), args(reference_curve()), Programs::placeholder(), cancel);

        let err = orch.run(&mut StdRng::seed_from_u64(1)).await.unwrap_err();
        match err {
            SeedError::InsufficientFunds { account, balance, required, .. } => {
                assert_eq!(account, *trader.address());
                assert_eq!(balance, 1_500_000);
                assert_eq!(required, 2_000_000);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(orch.stage(), Stage::Init);
        assert_eq!(ledger.submissions(), 0);
    }

    #[tokio::test]
    async fn trader_holdings_must_cover_the_plan() {
        let (admin, trader) = signers();
        let ledger = ledger(&admin, &trader, MockConfig::default());
        let (_tx, cancel) = live_flag();
        let mut cfg = args(reference_curve());
        cfg.trader_fund_units = 2_000; // plan needs 2482 of A
        let mut orch = Orchestrator::new(&ledger, admin, trader, cfg, Programs::placeholder(), cancel);

        let err = orch.run(&mut StdRng::seed_from_u64(1)).await.unwrap_err();
        assert!(matches!(err, SeedError::InsufficientFunds { required: 2_532, balance: 2_000, .. }), "{err:?}");
        assert_eq!(orch.stage(), Stage::TradersProvisioned);
        assert!(orch.report().seeded.is_empty());
    }

    #[tokio::test]
    async fn stages_only_advance_along_the_workflow() {
        let (admin, trader) = signers();
        let ledger = ledger(&admin, &trader, MockConfig::default());
        let (_tx, cancel) = live_flag();
        let mut orch =
            Orchestrator::new(&ledger, admin, trader, Args::default(), Programs::placeholder(), cancel);

        let err = orch.enter(Stage::PoolDeployed).unwrap_err();
        assert!(matches!(err, SeedError::InvalidTransition { ref from, ref to } if from == "Init" && to == "PoolDeployed"));
        orch.enter(Stage::AccountsReady).unwrap();
        // asset creation is optional
        orch.enter(Stage::HookDeployed).unwrap();
        assert!(orch.enter(Stage::AssetsCreated).is_err());
        assert!(orch.enter(Stage::HookDeployed).is_err());
        assert_eq!(orch.stage(), Stage::HookDeployed);
        assert!(Stage::DemoSwapExecuted.can_follow(Stage::LiquiditySeeded));
        assert!(!Stage::DemoSwapExecuted.can_follow(Stage::TradersProvisioned));
    }

    #[tokio::test]
    async fn cancelled_before_start_submits_nothing() {
        let (admin, trader) = signers();
        let ledger = ledger(&admin, &trader, MockConfig::default());
        let (tx, cancel) = live_flag();
        tx.send(true).unwrap();
        let mut orch =
            Orchestrator::new(&ledger, admin, trader, Args::default(), Programs::placeholder(), cancel);

        let err = orch.run(&mut StdRng::seed_from_u64(1)).await.unwrap_err();
        assert!(matches!(err, SeedError::Cancelled { .. }), "{err:?}");
        assert_eq!(ledger.submissions(), 0);
    }

    #[tokio::test]
    async fn cancel_during_a_wait_aborts_the_run() {
        let (admin, trader) = signers();
        let cfg = MockConfig { block_time: Duration::from_millis(20), ..Default::default() };
        let ledger = ledger(&admin, &trader, cfg);
        let (tx, cancel) = live_flag();
        let mut orch =
            Orchestrator::new(&ledger, admin, trader, Args::default(), Programs::placeholder(), cancel);

        let mut rng = StdRng::seed_from_u64(1);
        let (res, _) = tokio::join!(orch.run(&mut rng), async {
            sleep(Duration::from_millis(30)).await;
            let _ = tx.send(true);
        });
        let err = res.unwrap_err();
        assert!(matches!(err, SeedError::Cancelled { .. }), "{err:?}");
        assert_ne!(orch.stage(), Stage::DemoSwapExecuted);
    }

    #[tokio::test]
    async fn rejected_mint_aborts_seeding() {
        let (admin, trader) = signers();
        let ledger = ledger(&admin, &trader, MockConfig::default());
        let (_tx, cancel) = live_flag();
        let mut cfg = args(reference_curve());
        // room for three slot boxes, not four
        cfg.pool_fund_amount = 350_000;
        cfg.pool_min_balance = 0;
        let mut orch = Orchestrator::new(&ledger, admin, trader, cfg, Programs::placeholder(), cancel);

        let err = orch.run(&mut StdRng::seed_from_u64(1)).await.unwrap_err();
        assert!(
            matches!(err, SeedError::Rejected { ref reason, .. } if reason.contains("below minimum")),
            "{err:?}"
        );
        let report = orch.report();
        assert_eq!(report.stage, Stage::TradersProvisioned);
        assert_eq!(report.seeded.iter().map(|s| s.tick).collect::<Vec<_>>(), vec![-2, -1, 0]);
        assert!(report.swap.is_none());
        let pool = report.deployment.unwrap().pool_id;
        assert!(ledger.reserves(pool, 0).is_some());
        assert!(ledger.reserves(pool, 1).is_none());
    }
}
