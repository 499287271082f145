//! Snapshot acquisition from a Solana RPC node
//!
//! Reads every SPL token account of the tracked mint with
//! `getProgramAccounts` (jsonParsed), keeps positive balances and folds
//! multiple token accounts of one owner into a single balance.
//!
//! Filters match the SPL token account layout:
//! - `dataSize = 165` (token account size)
//! - `memcmp` at offset 0 = mint address

use {
    crate::{
        error::{TrackerError, TrackerResult},
        error_handler::ExponentialBackoff,
        snapshot::{HolderBalance, Snapshot},
    },
    async_trait::async_trait,
    serde::Deserialize,
    serde_json::json,
    std::{collections::HashMap, time::Duration},
};

/// SPL token program id
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Size of an SPL token account in bytes
pub const TOKEN_ACCOUNT_SIZE: u64 = 165;

/// Source of point-in-time holder snapshots
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch every holder of `mint` with a positive balance
    async fn fetch_snapshot(&self, mint: &str) -> TrackerResult<Snapshot>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Vec<ProgramAccount>>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
pub struct ProgramAccount {
    pub pubkey: String,
    pub account: AccountBody,
}

#[derive(Debug, Deserialize)]
pub struct AccountBody {
    pub data: AccountData,
}

#[derive(Debug, Deserialize)]
pub struct AccountData {
    pub parsed: ParsedAccount,
}

#[derive(Debug, Deserialize)]
pub struct ParsedAccount {
    pub info: TokenAccountInfo,
}

#[derive(Debug, Deserialize)]
pub struct TokenAccountInfo {
    pub owner: String,
    #[serde(rename = "tokenAmount")]
    pub token_amount: TokenAmount,
}

#[derive(Debug, Deserialize)]
pub struct TokenAmount {
    /// Raw base-unit amount, as a decimal string
    pub amount: String,
    pub decimals: u8,
}

/// Build a snapshot from decoded token accounts
///
/// Owners appear in the order of their first token account. Unparseable or
/// zero amounts are dropped.
pub fn snapshot_from_accounts(
    mint: &str,
    accounts: Vec<ProgramAccount>,
    taken_at: i64,
) -> Snapshot {
    let mut decimals = 0;
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut holders: Vec<HolderBalance> = Vec::new();

    for acc in accounts {
        let info = acc.account.data.parsed.info;
        decimals = info.token_amount.decimals;

        let amount = match info.token_amount.amount.parse::<u64>() {
            Ok(amount) => amount,
            Err(_) => {
                log::debug!(
                    "Skipping account {} with bad amount '{}'",
                    acc.pubkey,
                    info.token_amount.amount
                );
                continue;
            }
        };
        if amount == 0 {
            continue;
        }

        match position.get(&info.owner) {
            Some(&idx) => holders[idx].amount = holders[idx].amount.saturating_add(amount),
            None => {
                position.insert(info.owner.clone(), holders.len());
                holders.push(HolderBalance::new(info.owner, amount));
            }
        }
    }

    Snapshot::new(mint, decimals, taken_at, holders)
}

/// `getProgramAccounts` client for one RPC endpoint
pub struct RpcSnapshotSource {
    endpoint: String,
    client: reqwest::Client,
    commitment: String,
    max_retries: u32,
}

impl RpcSnapshotSource {
    pub fn new(endpoint: impl Into<String>, max_retries: u32) -> TrackerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
            commitment: "confirmed".to_string(),
            max_retries,
        })
    }

    fn request_body(&self, mint: &str) -> serde_json::Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getProgramAccounts",
            "params": [
                TOKEN_PROGRAM_ID,
                {
                    "encoding": "jsonParsed",
                    "commitment": self.commitment,
                    "filters": [
                        { "dataSize": TOKEN_ACCOUNT_SIZE },
                        { "memcmp": { "offset": 0, "bytes": mint } }
                    ]
                }
            ]
        })
    }

    async fn fetch_once(&self, mint: &str) -> TrackerResult<Snapshot> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&self.request_body(mint))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TrackerError::Upstream(format!("RPC HTTP status {}", response.status())));
        }

        let body: RpcResponse = response.json().await?;
        if let Some(err) = body.error {
            return Err(TrackerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        let accounts = body.result.unwrap_or_default();
        let taken_at = chrono::Utc::now().timestamp_millis();
        Ok(snapshot_from_accounts(mint, accounts, taken_at))
    }
}

#[async_trait]
impl SnapshotSource for RpcSnapshotSource {
    async fn fetch_snapshot(&self, mint: &str) -> TrackerResult<Snapshot> {
        let mut backoff = ExponentialBackoff::new(500, 4_000, self.max_retries);

        loop {
            match self.fetch_once(mint).await {
                Ok(snapshot) => {
                    log::debug!("📥 Fetched {} holders for {}", snapshot.len(), mint);
                    return Ok(snapshot);
                }
                Err(e) => {
                    log::warn!("Error fetching token accounts for {}: {}", mint, e);
                    if backoff.sleep().await.is_err() {
                        return Err(e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts_json() -> &'static str {
        r#"[
            {"pubkey": "acc1", "account": {"data": {"parsed": {"info": {"owner": "A", "tokenAmount": {"amount": "1500000", "decimals": 6}}}}}},
            {"pubkey": "acc2", "account": {"data": {"parsed": {"info": {"owner": "B", "tokenAmount": {"amount": "0", "decimals": 6}}}}}},
            {"pubkey": "acc3", "account": {"data": {"parsed": {"info": {"owner": "C", "tokenAmount": {"amount": "200", "decimals": 6}}}}}},
            {"pubkey": "acc4", "account": {"data": {"parsed": {"info": {"owner": "A", "tokenAmount": {"amount": "500000", "decimals": 6}}}}}},
            {"pubkey": "acc5", "account": {"data": {"parsed": {"info": {"owner": "D", "tokenAmount": {"amount": "oops", "decimals": 6}}}}}}
        ]"#
    }

    #[test]
    fn test_snapshot_from_accounts() {
        let accounts: Vec<ProgramAccount> = serde_json::from_str(accounts_json()).unwrap();
        let snapshot = snapshot_from_accounts("mint", accounts, 42);

        assert_eq!(snapshot.decimals, 6);
        assert_eq!(snapshot.taken_at, 42);
        assert_eq!(
            snapshot.holders,
            vec![HolderBalance::new("A", 2_000_000), HolderBalance::new("C", 200)]
        );
    }

    #[test]
    fn test_request_body_filters() {
        let source = RpcSnapshotSource::new("http://localhost:8899", 0).unwrap();
        let body = source.request_body("MintAddr");
        assert_eq!(body["method"], "getProgramAccounts");
        assert_eq!(body["params"][0], TOKEN_PROGRAM_ID);
        assert_eq!(body["params"][1]["filters"][0]["dataSize"], 165);
        assert_eq!(body["params"][1]["filters"][1]["memcmp"]["bytes"], "MintAddr");
    }

    #[test]
    fn test_rpc_error_body_decodes() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"bad"}}"#;
        let body: RpcResponse = serde_json::from_str(raw).unwrap();
        assert!(body.result.is_none());
        assert_eq!(body.error.unwrap().code, -32600);
    }
}
