use crate::primitives::user_operation::UserOperationHash;
use crate::traits::SmartWalletAccount;
use ethers::types::{Address, H256, U256};
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Smart accounts this process can encode calls for, keyed by account
/// address. Read-mostly; the connect path is the only writer.
pub type WalletMap = HashMap<Address, Arc<Mutex<Box<dyn SmartWalletAccount>>>>;

#[derive(Debug, Serialize)]
pub struct Request<T> {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: T,
}

#[derive(Debug, Deserialize)]
pub struct Response<R> {
    pub jsonrpc: String,
    pub id: u64,
    pub result: R,
}

/// Bundler response where `result` may be absent (e.g. a receipt that
/// does not exist yet).
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse<T> {
    pub jsonrpc: String,
    pub id: u64,
    pub result: Option<T>,
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub(crate) jsonrpc: String,
    pub(crate) id: u64,
    pub(crate) error: JsonRpcError,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// Bundlers omit the paymaster limits when no paymaster is involved.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateResult {
    pub pre_verification_gas: U256,
    pub verification_gas_limit: U256,
    pub call_gas_limit: U256,
    pub paymaster_verification_gas_limit: Option<U256>,
    pub paymaster_post_op_gas_limit: Option<U256>,
}

/// ERC-20 metadata plus the holder's balance, fetched fresh per check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub balance: U256,
}

/// Deployment status of the smart account, checked explicitly rather
/// than assumed by the code paths that need it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Undeployed,
    Deployed(Address),
}

impl AccountStatus {
    pub fn is_deployed(&self) -> bool {
        matches!(self, AccountStatus::Deployed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasFees {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Lifecycle of one submission attempt. There is no automatic retry;
/// every terminal state is reported upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Building,
    Submitted(UserOperationHash),
    Confirmed(H256),
    Reverted(H256),
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_parses_without_paymaster_limits() {
        let raw = r#"{
            "preVerificationGas": "0xc350",
            "verificationGasLimit": "0x186a0",
            "callGasLimit": "0x30d40"
        }"#;
        let estimate: EstimateResult = serde_json::from_str(raw).unwrap();
        assert_eq!(estimate.pre_verification_gas, U256::from(0xc350u64));
        assert_eq!(estimate.call_gas_limit, U256::from(0x30d40u64));
        assert!(estimate.paymaster_verification_gas_limit.is_none());
        assert!(estimate.paymaster_post_op_gas_limit.is_none());
    }

    #[test]
    fn estimate_parses_with_paymaster_limits() {
        let raw = r#"{
            "preVerificationGas": "0x1",
            "verificationGasLimit": "0x2",
            "callGasLimit": "0x3",
            "paymasterVerificationGasLimit": "0x4",
            "paymasterPostOpGasLimit": "0x5"
        }"#;
        let estimate: EstimateResult = serde_json::from_str(raw).unwrap();
        assert_eq!(
            estimate.paymaster_verification_gas_limit,
            Some(U256::from(4u64))
        );
        assert_eq!(estimate.paymaster_post_op_gas_limit, Some(U256::from(5u64)));
    }
}
