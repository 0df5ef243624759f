// ===============================
// src/ledger.rs (ledger collaborator interface)
// ===============================
use serde::{Deserialize, Serialize};

use crate::domain::{
    AccountInfo, Address, AppId, AssetId, InnerTransfer, SignedOperation, SuggestedParams, TxId,
};
use crate::error::Result;

/// What a status query reports for a submitted transaction.
/// Neither `confirmed_round` nor `pool_error` set means "not final yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingStatus {
    #[serde(rename = "confirmed-round", default)]
    pub confirmed_round: Option<u64>,
    #[serde(rename = "pool-error", default)]
    pub pool_error: Option<String>,
    #[serde(rename = "application-index", default)]
    pub application_index: Option<AppId>,
    #[serde(rename = "asset-index", default)]
    pub asset_index: Option<AssetId>,
    #[serde(rename = "inner-transfers", default)]
    pub inner_transfers: Vec<InnerTransfer>,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl PendingStatus {
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_round.unwrap_or(0) > 0
    }

    /// Explicit rejection reason; an empty string is not a rejection.
    pub fn rejection(&self) -> Option<&str> {
        self.pool_error.as_deref().filter(|r| !r.is_empty())
    }
}

/// The part of the ledger the confirmation waiter needs.
#[allow(async_fn_in_trait)]
pub trait StatusSource {
    async fn last_round(&self) -> Result<u64>;

    /// `Err` means the transaction is not visible yet (or the query failed);
    /// callers treat it as transient.
    async fn query_status(&self, txid: &TxId) -> Result<PendingStatus>;

    /// Blocks until the ledger has produced a round after `round`; returns it.
    async fn wait_for_round_after(&self, round: u64) -> Result<u64>;
}

#[allow(async_fn_in_trait)]
pub trait Ledger: StatusSource {
    async fn suggested_params(&self) -> Result<SuggestedParams>;

    /// Submits one transaction or one atomic group; returns the first member's id.
    async fn submit(&self, group: Vec<SignedOperation>) -> Result<TxId>;

    async fn account_info(&self, address: &Address) -> Result<AccountInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_node_pending_payloads() {
        let pending: PendingStatus =
            serde_json::from_str(r#"{"pool-error":"","txn":{}}"#).unwrap();
        assert!(!pending.is_confirmed());
        assert_eq!(pending.rejection(), None);

        let rejected: PendingStatus =
            serde_json::from_str(r#"{"pool-error":"overspend","confirmed-round":0}"#).unwrap();
        assert_eq!(rejected.rejection(), Some("overspend"));
        assert!(!rejected.is_confirmed());

        let done: PendingStatus =
            serde_json::from_str(r#"{"confirmed-round":1234,"application-index":99}"#).unwrap();
        assert!(done.is_confirmed());
        assert_eq!(done.application_index, Some(99));
    }
}
