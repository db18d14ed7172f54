use super::utils::as_checksum;
use ethers::{
    abi::AbiEncode,
    contract::{EthAbiCodec, EthAbiType},
    types::{Address, Bytes, Log, TransactionReceipt, H256, U256},
    utils::keccak256,
};
use rustc_hex::FromHexError;
use serde::{Deserialize, Serialize};
use std::{ops::Deref, str::FromStr};

/// EntryPoint v0.7 user operation as the bundler expects it on the wire.
#[derive(
    Default,
    Clone,
    Debug,
    Ord,
    PartialOrd,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EthAbiCodec,
    EthAbiType,
)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub factory: Address,
    pub factory_data: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster: String,
    pub paymaster_verification_gas_limit: U256,
    pub paymaster_post_op_gas_limit: U256,
    pub paymaster_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    pub fn pack_without_signature(&self) -> Bytes {
        let unsigned = UserOperationUnsigned::from(self.clone());
        unsigned.encode().into()
    }

    /// keccak(keccak(packed op) ++ entry point ++ chain id), the hash
    /// the account owner signs.
    pub fn hash(&self, entry_point: &Address, chain_id: &U256) -> UserOperationHash {
        H256::from_slice(
            keccak256(
                [
                    keccak256(self.pack_without_signature().deref()).to_vec(),
                    entry_point.encode(),
                    chain_id.encode(),
                ]
                .concat(),
            )
            .as_slice(),
        )
        .into()
    }

    pub fn signature(mut self, signature: Bytes) -> Self {
        self.signature = signature;
        self
    }
}

#[derive(
    Eq, Hash, PartialEq, Debug, Serialize, Deserialize, Clone, Copy, Default, PartialOrd, Ord,
)]
pub struct UserOperationHash(pub H256);

impl From<H256> for UserOperationHash {
    fn from(value: H256) -> Self {
        Self(value)
    }
}

impl From<UserOperationHash> for H256 {
    fn from(value: UserOperationHash) -> Self {
        value.0
    }
}

impl FromStr for UserOperationHash {
    type Err = FromHexError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        H256::from_str(s).map(|h| h.into())
    }
}

/// Signing view: identical fields except the calldata is pre-hashed and
/// the signature is absent.
#[derive(EthAbiCodec, EthAbiType)]
pub struct UserOperationUnsigned {
    pub sender: Address,
    pub nonce: U256,
    pub factory: Address,
    pub factory_data: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster: String,
    pub paymaster_verification_gas_limit: U256,
    pub paymaster_post_op_gas_limit: U256,
    pub paymaster_data: Bytes,
}

impl From<UserOperation> for UserOperationUnsigned {
    fn from(value: UserOperation) -> Self {
        Self {
            sender: value.sender,
            nonce: value.nonce,
            factory: value.factory,
            factory_data: value.factory_data,
            call_data: keccak256(value.call_data.deref()).into(),
            call_gas_limit: value.call_gas_limit,
            verification_gas_limit: value.verification_gas_limit,
            pre_verification_gas: value.pre_verification_gas,
            max_fee_per_gas: value.max_fee_per_gas,
            max_priority_fee_per_gas: value.max_priority_fee_per_gas,
            paymaster: value.paymaster,
            paymaster_verification_gas_limit: value.paymaster_verification_gas_limit,
            paymaster_post_op_gas_limit: value.paymaster_post_op_gas_limit,
            paymaster_data: value.paymaster_data,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    #[serde(rename = "userOpHash")]
    pub user_operation_hash: UserOperationHash,
    #[serde(serialize_with = "as_checksum")]
    pub sender: Address,
    pub nonce: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    pub actual_gas_cost: U256,
    pub actual_gas_used: U256,
    pub success: bool,
    pub reason: String,
    pub logs: Vec<Log>,
    #[serde(rename = "receipt")]
    pub tx_receipt: TransactionReceipt,
}

/// Operation under construction; unset fields fall back to zero values
/// when the final operation is assembled.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationPartial {
    pub sender: Option<Address>,
    pub nonce: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    pub call_data: Option<Bytes>,
    pub call_gas_limit: Option<U256>,
    pub verification_gas_limit: Option<U256>,
    pub pre_verification_gas: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    pub signature: Option<Bytes>,
}

impl From<UserOperationPartial> for UserOperation {
    fn from(partial: UserOperationPartial) -> Self {
        Self {
            sender: partial.sender.unwrap_or_else(Address::zero),
            nonce: partial.nonce.unwrap_or_else(U256::zero),
            factory: partial.factory.unwrap_or_else(Address::zero),
            factory_data: partial.factory_data.unwrap_or_default(),
            call_data: partial.call_data.unwrap_or_default(),
            call_gas_limit: partial.call_gas_limit.unwrap_or_else(U256::zero),
            verification_gas_limit: partial.verification_gas_limit.unwrap_or_else(U256::zero),
            pre_verification_gas: partial.pre_verification_gas.unwrap_or_else(U256::zero),
            max_fee_per_gas: partial.max_fee_per_gas.unwrap_or_else(U256::zero),
            max_priority_fee_per_gas: partial
                .max_priority_fee_per_gas
                .unwrap_or_else(U256::zero),
            paymaster: partial.paymaster.unwrap_or_else(|| "0x".to_string()),
            paymaster_verification_gas_limit: partial
                .paymaster_verification_gas_limit
                .unwrap_or_else(U256::zero),
            paymaster_post_op_gas_limit: partial
                .paymaster_post_op_gas_limit
                .unwrap_or_else(U256::zero),
            paymaster_data: partial.paymaster_data.unwrap_or_default(),
            signature: partial.signature.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(call_data: Bytes) -> UserOperationPartial {
        UserOperationPartial {
            sender: Some(Address::repeat_byte(0x11)),
            nonce: Some(U256::from(7u64)),
            factory: None,
            factory_data: None,
            call_data: Some(call_data),
            call_gas_limit: Some(U256::from(100_000u64)),
            verification_gas_limit: Some(U256::from(100_000u64)),
            pre_verification_gas: Some(U256::from(50_000u64)),
            max_fee_per_gas: Some(U256::from(1_000u64)),
            max_priority_fee_per_gas: Some(U256::from(10u64)),
            paymaster: None,
            paymaster_verification_gas_limit: None,
            paymaster_post_op_gas_limit: None,
            paymaster_data: None,
            signature: Some(Bytes::default()),
        }
    }

    #[test]
    fn partial_fills_missing_fields_with_zero_values() {
        let op = UserOperation::from(partial(Bytes::default()));
        assert_eq!(op.factory, Address::zero());
        assert_eq!(op.paymaster, "0x");
        assert!(op.factory_data.is_empty());
        assert_eq!(op.nonce, U256::from(7u64));
    }

    #[test]
    fn hash_depends_on_contents_and_chain() {
        let entry_point = Address::repeat_byte(0x22);
        let op = UserOperation::from(partial(Bytes::from(vec![0xde, 0xad])));

        let base = op.hash(&entry_point, &U256::from(1u64));
        assert_eq!(base, op.hash(&entry_point, &U256::from(1u64)));
        assert_ne!(base, op.hash(&entry_point, &U256::from(2u64)));

        let other = UserOperation::from(partial(Bytes::from(vec![0xbe, 0xef])));
        assert_ne!(base, other.hash(&entry_point, &U256::from(1u64)));
    }

    #[test]
    fn signature_does_not_change_the_hash() {
        let entry_point = Address::repeat_byte(0x22);
        let op = UserOperation::from(partial(Bytes::default()));
        let signed = op.clone().signature(Bytes::from(vec![1, 2, 3]));
        assert_eq!(
            op.hash(&entry_point, &U256::one()),
            signed.hash(&entry_point, &U256::one())
        );
    }
}
