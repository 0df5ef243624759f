// ===============================
// src/domain.rs
// ===============================
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub type AssetId = u64;
pub type AppId = u64;

/// Account address: upper-case hex of a 32-byte digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn from_digest(bytes: &[u8]) -> Self {
        Address(hex::encode_upper(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub String);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Domain-separated SHA-256.
pub fn tagged_digest(tag: &[u8], payload: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(tag);
    h.update(payload);
    h.finalize().into()
}

/// Escrow address controlled by an application.
pub fn application_address(app_id: AppId) -> Address {
    Address::from_digest(&tagged_digest(b"appID", &app_id.to_be_bytes()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSchema {
    pub num_uints: u64,
    pub num_byte_slices: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetParams {
    pub total: u64,
    pub decimals: u32,
    pub default_frozen: bool,
    pub unit_name: String,
    pub asset_name: String,
    pub manager: Address,
    pub reserve: Address,
    pub freeze: Address,
    pub clawback: Address,
}

/// Storage reference an application call declares up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxRef {
    pub app_id: AppId,
    pub name: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCall {
    pub app_id: AppId,
    pub args: Vec<Vec<u8>>,
    pub foreign_assets: Vec<AssetId>,
    pub foreign_apps: Vec<AppId>,
    pub boxes: Vec<BoxRef>,
}

impl AppCall {
    pub fn method(&self) -> Option<&[u8]> {
        self.args.first().map(|a| a.as_slice())
    }

    /// Numeric argument at `idx` (8-byte big-endian).
    pub fn u64_arg(&self, idx: usize) -> Option<u64> {
        let raw = self.args.get(idx)?;
        let bytes: [u8; 8] = raw.as_slice().try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    Payment {
        receiver: Address,
        amount: u64,
    },
    AssetTransfer {
        receiver: Address,
        asset_id: AssetId,
        amount: u64,
    },
    AssetCreate(AssetParams),
    AppCreate {
        approval: Vec<u8>,
        clear: Vec<u8>,
        global_schema: StateSchema,
        local_schema: StateSchema,
        foreign_assets: Vec<AssetId>,
        foreign_apps: Vec<AppId>,
    },
    AppCall(AppCall),
}

/// Unsigned intent to mutate ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub sender: Address,
    pub fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupId>,
}

impl Operation {
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // plain data with string keys only, serialization cannot fail
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn txid(&self) -> TxId {
        TxId(hex::encode_upper(tagged_digest(b"TX", &self.canonical_bytes())))
    }

    pub fn kind_label(&self) -> &'static str {
        match &self.kind {
            OperationKind::Payment { .. } => "pay",
            OperationKind::AssetTransfer { .. } => "axfer",
            OperationKind::AssetCreate(_) => "acfg",
            OperationKind::AppCreate { .. } => "appl_create",
            OperationKind::AppCall(_) => "appl",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOperation {
    pub operation: Operation,
    pub signature: String,
}

impl SignedOperation {
    pub fn txid(&self) -> TxId {
        self.operation.txid()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerTransfer {
    pub receiver: Address,
    pub asset_id: AssetId,
    pub amount: u64,
}

/// Terminal success record of a submitted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedTx {
    pub txid: TxId,
    pub confirmed_round: u64,
    pub application_index: Option<AppId>,
    pub asset_index: Option<AssetId>,
    pub inner_transfers: Vec<InnerTransfer>,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedParams {
    pub first_valid: u64,
    pub last_valid: u64,
    pub min_fee: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetHolding {
    pub asset_id: AssetId,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub address: Address,
    pub amount: u64,
    pub assets: Vec<AssetHolding>,
}

impl AccountInfo {
    pub fn asset_amount(&self, asset_id: AssetId) -> Option<u64> {
        self.assets
            .iter()
            .find(|h| h.asset_id == asset_id)
            .map(|h| h.amount)
    }

    pub fn holds(&self, asset_id: AssetId) -> bool {
        self.asset_amount(asset_id).is_some()
    }
}

/// Journal line written by the recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Stage { ts_ms: i64, stage: String },
    Submitted { ts_ms: i64, txid: TxId, kind: String, members: usize },
    Confirmed { ts_ms: i64, txid: TxId, round: u64 },
    Failed { ts_ms: i64, error: String },
    Minted { ts_ms: i64, tick: i64, slot: u64, amount_a: u64, amount_b: u64, round: u64 },
    SkippedTick { ts_ms: i64, tick: i64 },
    Note { ts_ms: i64, msg: String },
}
