// ===============================
// src/ledger_mock.rs (in-process simulated ledger)
// ===============================
//
// Enough of a ledger to run the whole workflow offline:
// - rounds advance only when someone waits for the next round
// - submitted groups are hidden for `visibility_lag` status queries, then
//   evaluated `confirm_after` rounds later, all-or-nothing
// - failures surface as a pool error on every member of the group
// - apps whose approval program starts with "#pool" / "#hook" get a small
//   model of the pool (per-slot reserves, constant-product swap in the slot)
//
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use ahash::AHashMap as HashMap;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use crate::domain::{
    application_address, AccountInfo, Address, AppCall, AppId, AssetHolding, AssetId,
    InnerTransfer, OperationKind, SignedOperation, SuggestedParams, TxId,
};
use crate::error::{Result, SeedError};
use crate::group::verify_group;
use crate::ledger::{Ledger, PendingStatus, StatusSource};
use crate::programs::{
    HOOK_POST_SWAP, METHOD_MINT, METHOD_OPT_IN_ASSETS, METHOD_SET_HOOKS, METHOD_SWAP,
};
use crate::signer::{DevSigner, Signer};
use crate::slot;

pub const GENESIS_ROUND: u64 = 1_000;
const VALIDITY_WINDOW: u64 = 1_000;
const ACCOUNT_MIN_BALANCE: u64 = 100_000;
const ASSET_MIN_BALANCE: u64 = 100_000;
const BOX_FLAT_MIN_BALANCE: u64 = 2_500;
const BOX_BYTE_MIN_BALANCE: u64 = 400;

#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Status queries that answer "not found" right after submission.
    pub visibility_lag: u32,
    /// Rounds between submission and evaluation.
    pub confirm_after: u64,
    /// Wall-clock pause per produced round.
    pub block_time: Duration,
    pub min_fee: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self { visibility_lag: 1, confirm_after: 1, block_time: Duration::ZERO, min_fee: 1_000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppKind {
    Pool,
    Hook,
    Opaque,
}

#[derive(Debug, Clone)]
struct App {
    kind: AppKind,
    creator: Address,
    address: Address,
    hook: Option<HookLink>,
    assets: Option<(AssetId, AssetId)>,
    boxes: usize,
}

#[derive(Debug, Clone, Copy)]
struct HookLink {
    hook_id: AppId,
    mask: u64,
    fee_bp: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotReserves {
    pub a: u64,
    pub b: u64,
}

#[derive(Debug, Clone, Default)]
struct Chain {
    balances: HashMap<Address, u64>,
    holdings: HashMap<(Address, AssetId), u64>,
    assets: HashMap<AssetId, Address>,
    apps: HashMap<AppId, App>,
    boxes: HashMap<(AppId, Vec<u8>), SlotReserves>,
    next_id: u64,
}

#[derive(Debug, Default)]
struct Effect {
    application_index: Option<AppId>,
    asset_index: Option<AssetId>,
    inner_transfers: Vec<InnerTransfer>,
    logs: Vec<String>,
}

type Applied = std::result::Result<Effect, String>;

struct Entry {
    head: TxId,
    hidden_polls: u32,
    status: PendingStatus,
}

struct State {
    round: u64,
    chain: Chain,
    entries: HashMap<TxId, Entry>,
    queue: VecDeque<(u64, Vec<SignedOperation>)>,
    submissions: usize,
}

pub struct MockLedger {
    cfg: MockConfig,
    signers: HashMap<Address, DevSigner>,
    state: Mutex<State>,
}

impl MockLedger {
    pub fn new(cfg: MockConfig) -> Self {
        Self {
            cfg,
            signers: HashMap::new(),
            state: Mutex::new(State {
                round: GENESIS_ROUND,
                chain: Chain { next_id: 1_000, ..Default::default() },
                entries: HashMap::new(),
                queue: VecDeque::new(),
                submissions: 0,
            }),
        }
    }

    /// Registers a key the ledger will accept signatures from, with a starting balance.
    pub fn with_account(mut self, signer: &DevSigner, balance: u64) -> Self {
        self.signers.insert(signer.address().clone(), signer.clone());
        self.lock().chain.balances.insert(signer.address().clone(), balance);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn round(&self) -> u64 {
        self.lock().round
    }

    pub fn submissions(&self) -> usize {
        self.lock().submissions
    }

    pub fn balance(&self, address: &Address) -> u64 {
        self.lock().chain.balances.get(address).copied().unwrap_or(0)
    }

    pub fn asset_balance(&self, address: &Address, asset_id: AssetId) -> Option<u64> {
        self.lock().chain.holdings.get(&(address.clone(), asset_id)).copied()
    }

    pub fn reserves(&self, app_id: AppId, tick: i64) -> Option<SlotReserves> {
        let key = slot::storage_key(tick).ok()?;
        self.lock().chain.boxes.get(&(app_id, key)).copied()
    }

    /// Ticks with slot storage under `app_id`, ascending.
    pub fn seeded_ticks(&self, app_id: AppId) -> Vec<i64> {
        let st = self.lock();
        let mut ticks: Vec<i64> = st
            .chain
            .boxes
            .keys()
            .filter(|(id, _)| *id == app_id)
            .filter_map(|(_, key)| slot::tick_from_storage_key(key))
            .collect();
        ticks.sort_unstable();
        ticks
    }

    pub fn hook_of(&self, pool_id: AppId) -> Option<AppId> {
        self.lock().chain.apps.get(&pool_id).and_then(|a| a.hook.map(|h| h.hook_id))
    }

    fn produce_block(&self, st: &mut State) {
        st.round += 1;
        let round = st.round;
        while let Some((submitted, _)) = st.queue.front() {
            if submitted + self.cfg.confirm_after > round {
                break;
            }
            let Some((_, group)) = st.queue.pop_front() else { break };
            let mut next = st.chain.clone();
            match apply_group(&mut next, &group) {
                Ok(effects) => {
                    st.chain = next;
                    for (signed, effect) in group.iter().zip(effects) {
                        if let Some(entry) = st.entries.get_mut(&signed.txid()) {
                            entry.status.confirmed_round = Some(round);
                            entry.status.application_index = effect.application_index;
                            entry.status.asset_index = effect.asset_index;
                            entry.status.inner_transfers = effect.inner_transfers;
                            entry.status.logs = effect.logs;
                        }
                    }
                    debug!(round, members = group.len(), "mock: group committed");
                }
                Err(reason) => {
                    for signed in &group {
                        if let Some(entry) = st.entries.get_mut(&signed.txid()) {
                            entry.status.pool_error = Some(reason.clone());
                        }
                    }
                    info!(round, %reason, "mock: group rejected");
                }
            }
        }
    }
}

impl StatusSource for MockLedger {
    async fn last_round(&self) -> Result<u64> {
        Ok(self.round())
    }

    async fn query_status(&self, txid: &TxId) -> Result<PendingStatus> {
        let mut st = self.lock();
        let entry = st
            .entries
            .get_mut(txid)
            .ok_or_else(|| SeedError::Submission(format!("transaction {txid} not found")))?;
        if entry.hidden_polls > 0 {
            entry.hidden_polls -= 1;
            return Err(SeedError::Submission(format!(
                "transaction {txid} not found (group {})",
                entry.head
            )));
        }
        Ok(entry.status.clone())
    }

    async fn wait_for_round_after(&self, round: u64) -> Result<u64> {
        if !self.cfg.block_time.is_zero() {
            sleep(self.cfg.block_time).await;
        }
        let mut st = self.lock();
        while st.round <= round {
            self.produce_block(&mut st);
        }
        Ok(st.round)
    }
}

impl Ledger for MockLedger {
    async fn suggested_params(&self) -> Result<SuggestedParams> {
        let round = self.round();
        Ok(SuggestedParams {
            first_valid: round,
            last_valid: round + VALIDITY_WINDOW,
            min_fee: self.cfg.min_fee,
        })
    }

    async fn submit(&self, group: Vec<SignedOperation>) -> Result<TxId> {
        verify_group(&group)?;
        let mut st = self.lock();
        for signed in &group {
            let op = &signed.operation;
            let signer = self.signers.get(&op.sender).ok_or_else(|| {
                SeedError::Submission(format!("unknown sender {}", op.sender))
            })?;
            if !signer.verify(op, &signed.signature) {
                return Err(SeedError::Submission(format!(
                    "invalid signature on {} from {}",
                    signed.txid(),
                    op.sender
                )));
            }
            let next = st.round + 1;
            if next < op.first_valid || next > op.last_valid {
                return Err(SeedError::Submission(format!(
                    "{} valid for rounds {}..={}, ledger at {}",
                    signed.txid(),
                    op.first_valid,
                    op.last_valid,
                    st.round
                )));
            }
            if op.fee < self.cfg.min_fee {
                return Err(SeedError::Submission(format!(
                    "{} fee {} below minimum {}",
                    signed.txid(),
                    op.fee,
                    self.cfg.min_fee
                )));
            }
            if st.entries.contains_key(&signed.txid()) {
                return Err(SeedError::Submission(format!(
                    "transaction {} already submitted",
                    signed.txid()
                )));
            }
        }

        let head = group[0].txid();
        for signed in &group {
            st.entries.insert(
                signed.txid(),
                Entry {
                    head: head.clone(),
                    hidden_polls: self.cfg.visibility_lag,
                    status: PendingStatus::default(),
                },
            );
        }
        let round = st.round;
        st.queue.push_back((round, group));
        st.submissions += 1;
        Ok(head)
    }

    async fn account_info(&self, address: &Address) -> Result<AccountInfo> {
        let st = self.lock();
        let mut assets: Vec<AssetHolding> = st
            .chain
            .holdings
            .iter()
            .filter(|((holder, _), _)| holder == address)
            .map(|((_, asset_id), amount)| AssetHolding { asset_id: *asset_id, amount: *amount })
            .collect();
        assets.sort_by_key(|h| h.asset_id);
        Ok(AccountInfo {
            address: address.clone(),
            amount: st.chain.balances.get(address).copied().unwrap_or(0),
            assets,
        })
    }
}

// ---------------------------------------------------------------------------
// State transition
// ---------------------------------------------------------------------------

fn app_kind(approval: &[u8]) -> AppKind {
    if approval.starts_with(b"#pool") {
        AppKind::Pool
    } else if approval.starts_with(b"#hook") {
        AppKind::Hook
    } else {
        AppKind::Opaque
    }
}

impl Chain {
    fn debit(&mut self, who: &Address, amount: u64) -> std::result::Result<(), String> {
        let bal = self.balances.entry(who.clone()).or_insert(0);
        if *bal < amount {
            return Err(format!("overspend: {who} holds {bal}, needs {amount}"));
        }
        *bal -= amount;
        Ok(())
    }

    fn credit(&mut self, who: &Address, amount: u64) {
        *self.balances.entry(who.clone()).or_insert(0) += amount;
    }

    fn move_asset(
        &mut self,
        from: &Address,
        to: &Address,
        asset_id: AssetId,
        amount: u64,
    ) -> std::result::Result<(), String> {
        if !self.assets.contains_key(&asset_id) {
            return Err(format!("asset {asset_id} does not exist"));
        }
        if !self.holdings.contains_key(&(to.clone(), asset_id)) {
            return Err(format!("receiver {to} not opted in to asset {asset_id}"));
        }
        let src = self
            .holdings
            .get_mut(&(from.clone(), asset_id))
            .ok_or_else(|| format!("sender {from} not opted in to asset {asset_id}"))?;
        if *src < amount {
            return Err(format!("underflow on asset {asset_id}: {from} holds {src}, needs {amount}"));
        }
        *src -= amount;
        *self.holdings.entry((to.clone(), asset_id)).or_insert(0) += amount;
        Ok(())
    }

    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn app_min_balance(&self, app: &App) -> u64 {
        let assets = if app.assets.is_some() { 2 } else { 0 };
        let per_box = BOX_FLAT_MIN_BALANCE + BOX_BYTE_MIN_BALANCE * (slot::KEY_LEN as u64 + 16);
        ACCOUNT_MIN_BALANCE + ASSET_MIN_BALANCE * assets + per_box * app.boxes as u64
    }
}

fn apply_group(chain: &mut Chain, group: &[SignedOperation]) -> std::result::Result<Vec<Effect>, String> {
    let mut effects = Vec::with_capacity(group.len());
    for (i, signed) in group.iter().enumerate() {
        let effect = apply_member(chain, group, i)
            .map_err(|e| format!("member {i} ({}): {e}", signed.operation.kind_label()))?;
        effects.push(effect);
    }
    Ok(effects)
}

fn apply_member(chain: &mut Chain, group: &[SignedOperation], i: usize) -> Applied {
    let op = &group[i].operation;
    chain.debit(&op.sender, op.fee)?;
    let effect = match &op.kind {
        OperationKind::Payment { receiver, amount } => {
            chain.debit(&op.sender, *amount)?;
            chain.credit(receiver, *amount);
            Effect::default()
        }
        OperationKind::AssetTransfer { receiver, asset_id, amount } => {
            if *receiver == op.sender && *amount == 0 {
                if !chain.assets.contains_key(asset_id) {
                    return Err(format!("asset {asset_id} does not exist"));
                }
                chain.holdings.entry((op.sender.clone(), *asset_id)).or_insert(0);
            } else {
                chain.move_asset(&op.sender, receiver, *asset_id, *amount)?;
            }
            Effect::default()
        }
        OperationKind::AssetCreate(params) => {
            let id = chain.alloc_id();
            chain.assets.insert(id, params.manager.clone());
            chain.holdings.insert((op.sender.clone(), id), params.total);
            Effect { asset_index: Some(id), ..Default::default() }
        }
        OperationKind::AppCreate { approval, .. } => {
            let id = chain.alloc_id();
            let app = App {
                kind: app_kind(approval),
                creator: op.sender.clone(),
                address: application_address(id),
                hook: None,
                assets: None,
                boxes: 0,
            };
            chain.apps.insert(id, app);
            Effect { application_index: Some(id), ..Default::default() }
        }
        OperationKind::AppCall(call) => app_call(chain, &op.sender, call, &group[i + 1..])?,
    };
    Ok(effect)
}

fn app_call(chain: &mut Chain, sender: &Address, call: &AppCall, rest: &[SignedOperation]) -> Applied {
    let app = chain
        .apps
        .get(&call.app_id)
        .cloned()
        .ok_or_else(|| format!("application {} does not exist", call.app_id))?;
    match app.kind {
        AppKind::Pool => pool_call(chain, sender, call, app, rest),
        AppKind::Hook | AppKind::Opaque => Ok(Effect::default()),
    }
}

fn slot_box(call: &AppCall) -> std::result::Result<(i64, Vec<u8>), String> {
    let slot_id = call.u64_arg(1).ok_or("missing slot argument")?;
    let tick = slot::decode(slot_id).map_err(|e| e.to_string())?;
    let key = slot::storage_key(tick).map_err(|e| e.to_string())?;
    if !call.boxes.iter().any(|b| b.app_id == call.app_id && b.name == key) {
        return Err(format!("slot {slot_id} storage not referenced"));
    }
    Ok((tick, key))
}

/// Deposits the following group members make into the pool, per asset.
fn inbound(rest: &[SignedOperation], pool: &Address) -> Vec<(AssetId, u64)> {
    rest.iter()
        .filter_map(|s| match &s.operation.kind {
            OperationKind::AssetTransfer { receiver, asset_id, amount } if receiver == pool => {
                Some((*asset_id, *amount))
            }
            _ => None,
        })
        .collect()
}

// fee_bp at or above 10_000 takes everything
fn net_of_fee(gross: u64, fee_bp: u64) -> u64 {
    let fee = (gross as u128 * fee_bp.min(10_000) as u128 / 10_000) as u64;
    gross - fee
}

fn pool_call(
    chain: &mut Chain,
    sender: &Address,
    call: &AppCall,
    mut app: App,
    rest: &[SignedOperation],
) -> Applied {
    let method = call.method().unwrap_or_default();
    let mut effect = Effect::default();

    if method == METHOD_SET_HOOKS {
        if *sender != app.creator {
            return Err("set_hooks: sender is not the pool creator".into());
        }
        let hook_id = call.u64_arg(1).ok_or("set_hooks: missing hook id")?;
        if !call.foreign_apps.contains(&hook_id) || !chain.apps.contains_key(&hook_id) {
            return Err(format!("set_hooks: hook {hook_id} unavailable"));
        }
        app.hook = Some(HookLink {
            hook_id,
            mask: call.u64_arg(2).ok_or("set_hooks: missing mask")?,
            fee_bp: call.u64_arg(3).ok_or("set_hooks: missing fee")?,
        });
    } else if method == METHOD_OPT_IN_ASSETS {
        if *sender != app.creator {
            return Err("opt_in_assets: sender is not the pool creator".into());
        }
        let a = call.u64_arg(1).ok_or("opt_in_assets: missing asset a")?;
        let b = call.u64_arg(2).ok_or("opt_in_assets: missing asset b")?;
        for asset in [a, b] {
            if !chain.assets.contains_key(&asset) {
                return Err(format!("opt_in_assets: asset {asset} does not exist"));
            }
            chain.holdings.entry((app.address.clone(), asset)).or_insert(0);
        }
        app.assets = Some((a, b));
    } else if method == METHOD_MINT {
        let (a, b) = app.assets.ok_or("mint: pool not opted in")?;
        let (tick, key) = slot_box(call)?;
        let mut deposit = SlotReserves::default();
        for (asset, amount) in inbound(rest, &app.address) {
            if asset == a {
                deposit.a += amount;
            } else if asset == b {
                deposit.b += amount;
            } else {
                return Err(format!("mint: asset {asset} not traded by pool"));
            }
        }
        if deposit == SlotReserves::default() {
            return Err(format!("mint: nothing deposited into tick {tick}"));
        }
        let entry = chain.boxes.entry((call.app_id, key)).or_insert_with(|| {
            app.boxes += 1;
            SlotReserves::default()
        });
        entry.a += deposit.a;
        entry.b += deposit.b;
        let balance = chain.balances.get(&app.address).copied().unwrap_or(0);
        let required = chain.app_min_balance(&app);
        if balance < required {
            return Err(format!(
                "mint: pool balance {balance} below minimum {required} for tick {tick} storage"
            ));
        }
        effect.logs.push(format!("mint tick={tick} a={} b={}", deposit.a, deposit.b));
    } else if method == METHOD_SWAP {
        let (a, b) = app.assets.ok_or("swap: pool not opted in")?;
        let (tick, key) = slot_box(call)?;
        if let Some(h) = app.hook {
            if !call.foreign_apps.contains(&h.hook_id) {
                return Err(format!("swap: hook {} not referenced", h.hook_id));
            }
        }
        let (asset_in, amount_in) = inbound(rest, &app.address)
            .into_iter()
            .next()
            .ok_or("swap: missing inbound transfer")?;
        if amount_in == 0 {
            return Err("swap: zero input".into());
        }
        let reserves = chain
            .boxes
            .get_mut(&(call.app_id, key))
            .ok_or_else(|| format!("swap: tick {tick} has no liquidity"))?;
        let (r_in, r_out, asset_out) = if asset_in == a {
            (&mut reserves.a, &mut reserves.b, b)
        } else if asset_in == b {
            (&mut reserves.b, &mut reserves.a, a)
        } else {
            return Err(format!("swap: asset {asset_in} not traded by pool"));
        };
        let gross = (amount_in as u128 * *r_out as u128 / (*r_in as u128 + amount_in as u128)) as u64;
        let fee_bp = app.hook.map(|h| h.fee_bp).unwrap_or(0);
        let out = net_of_fee(gross, fee_bp);
        if out == 0 {
            return Err(format!("swap: insufficient liquidity in tick {tick}"));
        }
        *r_in += amount_in;
        *r_out -= out;
        chain.move_asset(&app.address, sender, asset_out, out)?;
        effect.inner_transfers.push(InnerTransfer {
            receiver: sender.clone(),
            asset_id: asset_out,
            amount: out,
        });
        effect.logs.push(format!("swap tick={tick} in={amount_in} out={out}"));
        if let Some(h) = app.hook.filter(|h| h.mask & HOOK_POST_SWAP != 0) {
            effect.logs.push(format!("hook {} post_swap", h.hook_id));
        }
    } else {
        return Err(format!("unknown method {:?}", String::from_utf8_lossy(method)));
    }

    chain.apps.insert(call.app_id, app);
    Ok(effect)
}
