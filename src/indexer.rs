use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use serde::Deserialize;
use serde_json::json;

/// Read side of the hosted indexer. The write side is the wrapper-event
/// calls the assembler appends to every operation; record shapes here
/// mirror the indexer's entities field for field.
#[derive(Debug, Clone)]
pub struct IndexerClient {
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRecord {
    pub id: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub timestamp: String,
    #[serde(rename = "transactionHash")]
    pub transaction_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferExecutedRecord {
    pub id: String,
    pub smart_account: String,
    pub to: String,
    pub value: String,
    pub transfer_type: String,
    pub token_address: String,
    pub timestamp: String,
    pub user_op_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTransferRecord {
    pub id: String,
    pub smart_account: String,
    pub recipient_count: String,
    pub total_value: String,
    pub transfer_type: String,
    pub token_address: String,
    pub timestamp: String,
    pub user_op_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferFailedRecord {
    pub id: String,
    pub smart_account: String,
    pub to: String,
    pub value: String,
    pub transfer_type: String,
    pub token_address: String,
    pub reason: String,
    pub timestamp: String,
    pub user_op_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferHistory {
    #[serde(rename = "Transfer_Sent")]
    pub sent: Vec<TransferRecord>,
    #[serde(rename = "Transfer_Received")]
    pub received: Vec<TransferRecord>,
}

impl TransferHistory {
    pub fn total_sent(&self) -> U256 {
        Self::total(&self.sent)
    }

    pub fn total_received(&self) -> U256 {
        Self::total(&self.received)
    }

    // Values come from the external indexer; an absurd sum saturates
    // instead of aborting the caller.
    fn total(records: &[TransferRecord]) -> U256 {
        records
            .iter()
            .filter_map(|r| U256::from_dec_str(&r.value).ok())
            .fold(U256::zero(), |sum, v| sum.saturating_add(v))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WrapperEventHistory {
    #[serde(rename = "Event_TransferExecuted")]
    pub executed: Vec<TransferExecutedRecord>,
    #[serde(rename = "Event_BatchTransferExecuted")]
    pub batches: Vec<BatchTransferRecord>,
    #[serde(rename = "Event_TransferFailed")]
    pub failed: Vec<TransferFailedRecord>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

const TRANSFER_HISTORY_QUERY: &str = r#"
query UserTransferHistory($user: String!, $userLower: String!) {
  Transfer_Sent: Transfer(
    where: { _or: [{ from: { _eq: $user } }, { from: { _eq: $userLower } }] }
    order_by: { timestamp: desc }
    limit: 50
  ) {
    id
    from
    to
    value
    timestamp
    transactionHash
  }
  Transfer_Received: Transfer(
    where: { _or: [{ to: { _eq: $user } }, { to: { _eq: $userLower } }] }
    order_by: { timestamp: desc }
    limit: 50
  ) {
    id
    from
    to
    value
    timestamp
    transactionHash
  }
}"#;

const WRAPPER_EVENT_QUERY: &str = r#"
query WrapperEvents($account: String!) {
  Event_TransferExecuted(
    where: { smartAccount: { _eq: $account } }
    order_by: { timestamp: desc }
    limit: 50
  ) {
    id
    smartAccount
    to
    value
    transferType
    tokenAddress
    timestamp
    userOpHash
  }
  Event_BatchTransferExecuted(
    where: { smartAccount: { _eq: $account } }
    order_by: { timestamp: desc }
    limit: 50
  ) {
    id
    smartAccount
    recipientCount
    totalValue
    transferType
    tokenAddress
    timestamp
    userOpHash
  }
  Event_TransferFailed(
    where: { smartAccount: { _eq: $account } }
    order_by: { timestamp: desc }
    limit: 50
  ) {
    id
    smartAccount
    to
    value
    transferType
    tokenAddress
    reason
    timestamp
    userOpHash
  }
}"#;

impl IndexerClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> anyhow::Result<T> {
        let client = reqwest::Client::new();
        let response = client
            .post(&self.url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?
            .json::<GraphQlResponse<T>>()
            .await?;

        if let Some(errors) = response.errors {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(anyhow::anyhow!("indexer query failed: {}", messages.join("; ")));
        }
        response
            .data
            .ok_or_else(|| anyhow::anyhow!("indexer returned no data"))
    }

    /// Token transfers seen by the indexer, both directions. Addresses
    /// are matched checksummed and lowercased since the indexer stores
    /// them as emitted.
    pub async fn transfer_history(&self, account: Address) -> anyhow::Result<TransferHistory> {
        let checksummed = to_checksum(&account, None);
        let variables = json!({
            "user": checksummed,
            "userLower": checksummed.to_lowercase(),
        });
        self.query(TRANSFER_HISTORY_QUERY, variables).await
    }

    /// Wrapper events emitted by this smart account: single transfers,
    /// batches and failures.
    pub async fn wrapper_event_history(
        &self,
        smart_account: Address,
    ) -> anyhow::Result<WrapperEventHistory> {
        let variables = json!({ "account": to_checksum(&smart_account, None) });
        self.query(WRAPPER_EVENT_QUERY, variables).await
    }
}
