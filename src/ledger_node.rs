// ===============================
// src/ledger_node.rs
// ===============================
use serde::Deserialize;
use url::Url;

use crate::domain::{AccountInfo, Address, AssetHolding, AssetId, SignedOperation, SuggestedParams, TxId};
use crate::error::{Result, SeedError};
use crate::ledger::{Ledger, PendingStatus, StatusSource};

const TOKEN_HEADER: &str = "X-Algo-API-Token";
// validity window handed out with suggested params
const VALIDITY_ROUNDS: u64 = 1000;

/// REST client for a ledger node.
/// Signed groups are posted as a JSON array; the node answers with the first member's id.
pub struct NodeLedger {
    http: reqwest::Client,
    base: Url,
    token: String,
}

// ---- node response models ----
#[derive(Debug, Deserialize)]
struct NodeStatus {
    #[serde(rename = "last-round")]
    last_round: u64,
}

#[derive(Debug, Deserialize)]
struct NodeParams {
    #[serde(rename = "last-round")]
    last_round: u64,
    #[serde(rename = "min-fee", default)]
    min_fee: u64,
}

#[derive(Debug, Deserialize)]
struct NodeHolding {
    #[serde(rename = "asset-id")]
    asset_id: AssetId,
    #[serde(default)]
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct NodeAccount {
    #[serde(default)]
    amount: u64,
    #[serde(default)]
    assets: Vec<NodeHolding>,
}

#[derive(Debug, Deserialize)]
struct NodeSubmit {
    #[serde(rename = "txId")]
    tx_id: String,
}

impl NodeParams {
    fn into_suggested(self) -> SuggestedParams {
        SuggestedParams {
            first_valid: self.last_round,
            last_valid: self.last_round + VALIDITY_ROUNDS,
            min_fee: self.min_fee.max(1000),
        }
    }
}

impl NodeAccount {
    fn into_info(self, address: &Address) -> AccountInfo {
        AccountInfo {
            address: address.clone(),
            amount: self.amount,
            assets: self
                .assets
                .into_iter()
                .map(|h| AssetHolding { asset_id: h.asset_id, amount: h.amount })
                .collect(),
        }
    }
}

impl NodeLedger {
    pub fn new(base: &str, token: &str) -> Result<Self> {
        let mut base = Url::parse(base).map_err(|e| SeedError::Config(format!("node url {base}: {e}")))?;
        // keep any proxy prefix when joining relative paths
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { http: reqwest::Client::new(), base, token: token.to_string() })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| SeedError::Config(format!("bad endpoint {path}: {e}")))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        let rsp = self.http.get(url).header(TOKEN_HEADER, &self.token).send().await?;
        if !rsp.status().is_success() {
            let code = rsp.status();
            let body = rsp.text().await.unwrap_or_default();
            return Err(SeedError::Submission(format!("GET {path}: {code} {body}")));
        }
        Ok(rsp.json::<T>().await?)
    }
}

impl StatusSource for NodeLedger {
    async fn last_round(&self) -> Result<u64> {
        let st: NodeStatus = self.get_json("/v2/status").await?;
        Ok(st.last_round)
    }

    async fn query_status(&self, txid: &TxId) -> Result<PendingStatus> {
        let path = format!("/v2/transactions/pending/{}", urlencoding::encode(&txid.0));
        self.get_json(&path).await
    }

    async fn wait_for_round_after(&self, round: u64) -> Result<u64> {
        let st: NodeStatus = self
            .get_json(&format!("/v2/status/wait-for-block-after/{round}"))
            .await?;
        Ok(st.last_round)
    }
}

impl Ledger for NodeLedger {
    async fn suggested_params(&self) -> Result<SuggestedParams> {
        let p: NodeParams = self.get_json("/v2/transactions/params").await?;
        Ok(p.into_suggested())
    }

    async fn submit(&self, group: Vec<SignedOperation>) -> Result<TxId> {
        let url = self.endpoint("/v2/transactions")?;
        let rsp = self
            .http
            .post(url)
            .header(TOKEN_HEADER, &self.token)
            .json(&group)
            .send()
            .await?;
        if !rsp.status().is_success() {
            let code = rsp.status();
            let body = rsp.text().await.unwrap_or_default();
            tracing::error!(%code, %body, "submit failed");
            return Err(SeedError::Submission(format!("{code} {body}")));
        }
        let ack: NodeSubmit = rsp.json().await?;
        Ok(TxId(ack.tx_id))
    }

    async fn account_info(&self, address: &Address) -> Result<AccountInfo> {
        let path = format!("/v2/accounts/{}", urlencoding::encode(&address.0));
        let acct: NodeAccount = self.get_json(&path).await?;
        Ok(acct.into_info(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_node_responses() {
        let p: NodeParams = serde_json::from_str(
            r#"{"last-round":500,"min-fee":1000,"genesis-id":"testnet-v1.0","fee":0}"#,
        )
        .unwrap();
        let sp = p.into_suggested();
        assert_eq!((sp.first_valid, sp.last_valid, sp.min_fee), (500, 1500, 1000));

        let acct: NodeAccount = serde_json::from_str(
            r#"{"amount":5000000,"assets":[{"asset-id":7,"amount":12,"is-frozen":false}]}"#,
        )
        .unwrap();
        let info = acct.into_info(&Address("ME".into()));
        assert_eq!(info.amount, 5_000_000);
        assert_eq!(info.asset_amount(7), Some(12));
        assert!(!info.holds(8));

        let st: NodeStatus = serde_json::from_str(r#"{"last-round":42,"catchup-time":0}"#).unwrap();
        assert_eq!(st.last_round, 42);
        let ack: NodeSubmit = serde_json::from_str(r#"{"txId":"ABC"}"#).unwrap();
        assert_eq!(ack.tx_id, "ABC");
    }

    #[test]
    fn endpoints_join_onto_base() {
        let node = NodeLedger::new("https://testnet-api.algonode.cloud", "").unwrap();
        let url = node.endpoint("/v2/status/wait-for-block-after/7").unwrap();
        assert_eq!(url.as_str(), "https://testnet-api.algonode.cloud/v2/status/wait-for-block-after/7");
        assert!(NodeLedger::new("not a url", "").is_err());
    }

    #[test]
    fn endpoints_keep_proxy_prefix() {
        for base in ["https://host.example/algod/", "https://host.example/algod"] {
            let node = NodeLedger::new(base, "").unwrap();
            assert_eq!(node.endpoint("/v2/status").unwrap().as_str(), "https://host.example/algod/v2/status");
            assert_eq!(
                node.endpoint("v2/transactions/pending/T%2B1").unwrap().as_str(),
                "https://host.example/algod/v2/transactions/pending/T%2B1"
            );
        }
    }
}
