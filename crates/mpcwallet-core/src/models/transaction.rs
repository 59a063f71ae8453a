use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Amount;

/// Sepolia, the chain the backend assumes when none is given
pub const DEFAULT_CHAIN_ID: u64 = 11_155_111;

/// Query for `GET /api/v1/transactions`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionFilter {
    pub wallet_address: Option<String>,
    pub chain_id: Option<u64>,
    pub page: u32,
    pub page_size: u32,
}

impl Default for TransactionFilter {
    fn default() -> Self {
        Self {
            wallet_address: None,
            chain_id: None,
            page: 1,
            page_size: 10,
        }
    }
}

impl TransactionFilter {
    /// Query pairs in the order the backend documents them; page and size are at least 1
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(chain_id) = self.chain_id {
            pairs.push(("chain_id", chain_id.to_string()));
        }
        if let Some(address) = self.wallet_address.as_deref().filter(|a| !a.is_empty()) {
            pairs.push(("wallet_address", address.to_string()));
        }
        pairs.push(("page", self.page.max(1).to_string()));
        pairs.push(("page_size", self.page_size.max(1).to_string()));
        pairs
    }
}

/// Body of `POST /api/v1/transactions`.
///
/// `share_data` is the client's key share and `security_code` the user's
/// transaction PIN; neither appears in `Debug` output.
#[derive(Clone, Serialize)]
pub struct SubmitTransactionRequest {
    pub from_address: String,
    pub to_address: String,
    /// Decimal string, sent as typed to avoid float rounding
    pub amount: String,
    pub symbol: String,
    pub share_data: String,
    pub chain_id: u64,
    pub security_code: String,
}

impl fmt::Debug for SubmitTransactionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitTransactionRequest")
            .field("from_address", &self.from_address)
            .field("to_address", &self.to_address)
            .field("amount", &self.amount)
            .field("symbol", &self.symbol)
            .field("share_data", &"<redacted>")
            .field("chain_id", &self.chain_id)
            .field("security_code", &"<redacted>")
            .finish()
    }
}

/// One page of `GET /api/v1/transactions`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionPage {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(default, alias = "hash")]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default)]
    pub to_address: Option<String>,
    #[serde(default)]
    pub amount: Option<Amount>,
    #[serde(default)]
    pub token_symbol: Option<String>,
    #[serde(default)]
    pub chain_id: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Whether funds left the given wallet in this transaction
    pub fn is_outgoing(&self, wallet_address: &str) -> bool {
        self.from_address
            .as_deref()
            .map(|from| from.eq_ignore_ascii_case(wallet_address))
            .unwrap_or(false)
    }
}
