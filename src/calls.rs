use alloy::{
    core::sol_types::SolCall,
    primitives::{Address as a_Address, FixedBytes, U256 as a_U256},
    sol,
};
use ethers::types::{Address, Bytes, U256};

use crate::batch::{AssetKind, BatchRequest};

sol! {
    function transfer(address to, uint256 amount) returns (bool);

    function emitNativeTransferEvent(address to, uint256 value, bytes32 userOpHash);
    function emitERC20TransferEvent(address token, address to, uint256 value, bytes32 userOpHash);
    function emitBatchTransferEvent(
        address[] recipients,
        uint256[] values,
        string transferType,
        address tokenAddress,
        bytes32 userOpHash
    );
}

/// The user-operation hash is not known until after submission, so the
/// wrapper events carry an all-zero correlation hash.
const PLACEHOLDER_USER_OP_HASH: [u8; 32] = [0u8; 32];

/// One call inside an atomic user operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl Call {
    /// Native value transfer, empty calldata.
    pub fn native(to: Address, value: U256) -> Self {
        Self {
            to,
            value,
            data: Bytes::default(),
        }
    }

    /// Contract call carrying no native value.
    pub fn contract(to: Address, data: Vec<u8>) -> Self {
        Self {
            to,
            value: U256::zero(),
            data: data.into(),
        }
    }
}

pub fn erc20_transfer_calldata(to: Address, amount: U256) -> Vec<u8> {
    transferCall {
        to: a_Address::from(to.0),
        amount: a_U256::from_limbs(amount.0),
    }
    .abi_encode()
}

/// Pure assembler from transfer requests to ordered call lists. Value-
/// moving calls always precede the wrapper event call so indexed events
/// reflect already-attempted transfers within the same operation.
#[derive(Debug, Clone, Copy)]
pub struct CallListAssembler {
    wrapper: Address,
}

impl CallListAssembler {
    pub fn new(wrapper: Address) -> Self {
        Self { wrapper }
    }

    pub fn single_native(&self, to: Address, value: U256) -> Vec<Call> {
        let event = emitNativeTransferEventCall {
            to: a_Address::from(to.0),
            value: a_U256::from_limbs(value.0),
            userOpHash: FixedBytes(PLACEHOLDER_USER_OP_HASH),
        };
        vec![
            Call::native(to, value),
            Call::contract(self.wrapper, event.abi_encode()),
        ]
    }

    pub fn single_erc20(&self, token: Address, to: Address, value: U256) -> Vec<Call> {
        let event = emitERC20TransferEventCall {
            token: a_Address::from(token.0),
            to: a_Address::from(to.0),
            value: a_U256::from_limbs(value.0),
            userOpHash: FixedBytes(PLACEHOLDER_USER_OP_HASH),
        };
        vec![
            Call::contract(token, erc20_transfer_calldata(to, value)),
            Call::contract(self.wrapper, event.abi_encode()),
        ]
    }

    /// One value-moving call per recipient in input order, then exactly
    /// one trailing batch event call.
    pub fn batch(&self, request: &BatchRequest) -> Vec<Call> {
        let mut calls: Vec<Call> = request
            .recipients
            .iter()
            .map(|recipient| match request.asset {
                AssetKind::Native => Call::native(recipient.address, recipient.amount),
                AssetKind::Erc20(token) => Call::contract(
                    token,
                    erc20_transfer_calldata(recipient.address, recipient.amount),
                ),
            })
            .collect();

        let event = emitBatchTransferEventCall {
            recipients: request
                .recipients
                .iter()
                .map(|r| a_Address::from(r.address.0))
                .collect(),
            values: request
                .recipients
                .iter()
                .map(|r| a_U256::from_limbs(r.amount.0))
                .collect(),
            transferType: request.asset.tag().to_string(),
            tokenAddress: a_Address::from(request.asset.token_address().0),
            userOpHash: FixedBytes(PLACEHOLDER_USER_OP_HASH),
        };
        calls.push(Call::contract(self.wrapper, event.abi_encode()));
        calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{build_batch_request, AssetKind, RawRecipient};
    use crate::consts::NATIVE_DECIMALS;

    const ADDR_A: &str = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA1111";
    const ADDR_B: &str = "0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB2222";

    fn wrapper() -> Address {
        crate::consts::TRANSFER_EVENT_WRAPPER.parse().unwrap()
    }

    #[test]
    fn single_native_is_transfer_then_event() {
        let assembler = CallListAssembler::new(wrapper());
        let to: Address = ADDR_A.parse().unwrap();
        let calls = assembler.single_native(to, U256::exp10(18));

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], Call::native(to, U256::exp10(18)));
        assert_eq!(calls[1].to, wrapper());
        assert!(calls[1].value.is_zero());
        assert_eq!(calls[1].data[..4], emitNativeTransferEventCall::SELECTOR);
    }

    #[test]
    fn single_erc20_moves_no_native_value() {
        let assembler = CallListAssembler::new(wrapper());
        let token: Address = ADDR_B.parse().unwrap();
        let to: Address = ADDR_A.parse().unwrap();
        let calls = assembler.single_erc20(token, to, U256::from(500u64));

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].to, token);
        assert!(calls[0].value.is_zero());
        assert_eq!(calls[0].data[..4], transferCall::SELECTOR);
        let decoded = transferCall::abi_decode(&calls[0].data, true).unwrap();
        assert_eq!(decoded.amount, a_U256::from(500u64));
        assert_eq!(calls[1].data[..4], emitERC20TransferEventCall::SELECTOR);
    }

    #[test]
    fn native_batch_scenario_two_recipients() {
        let rows = vec![
            RawRecipient::new(ADDR_A, "1.5"),
            RawRecipient::new(ADDR_B, "2.0"),
        ];
        let request = build_batch_request(&rows, AssetKind::Native, NATIVE_DECIMALS).unwrap();
        assert_eq!(
            request.total_amount().unwrap(),
            U256::from_dec_str("3500000000000000000").unwrap()
        );

        let calls = CallListAssembler::new(wrapper()).batch(&request);
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0].value,
            U256::from_dec_str("1500000000000000000").unwrap()
        );
        assert_eq!(
            calls[1].value,
            U256::from_dec_str("2000000000000000000").unwrap()
        );
        assert!(calls[0].data.is_empty());
        assert!(calls[1].data.is_empty());

        let event = emitBatchTransferEventCall::abi_decode(&calls[2].data, true).unwrap();
        assert_eq!(event.transferType, "native");
        assert_eq!(event.tokenAddress, a_Address::ZERO);
        assert_eq!(event.userOpHash, FixedBytes([0u8; 32]));
        assert_eq!(event.recipients.len(), 2);
        assert_eq!(
            event.values[0],
            a_U256::from(1_500_000_000_000_000_000u64)
        );
    }

    #[test]
    fn erc20_batch_targets_the_token_contract() {
        let token: Address = ADDR_B.parse().unwrap();
        let rows = vec![RawRecipient::new(ADDR_A, "2")];
        let request = build_batch_request(&rows, AssetKind::Erc20(token), 6).unwrap();

        let calls = CallListAssembler::new(wrapper()).batch(&request);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].to, token);
        assert!(calls[0].value.is_zero());

        let event = emitBatchTransferEventCall::abi_decode(&calls[1].data, true).unwrap();
        assert_eq!(event.transferType, "erc20");
        assert_eq!(event.tokenAddress, a_Address::from(token.0));
        assert_eq!(event.values[0], a_U256::from(2_000_000u64));
    }

    #[test]
    fn assembly_is_reproducible() {
        let rows = vec![
            RawRecipient::new(ADDR_A, "1.5"),
            RawRecipient::new(ADDR_B, "2.0"),
        ];
        let request = build_batch_request(&rows, AssetKind::Native, NATIVE_DECIMALS).unwrap();
        let assembler = CallListAssembler::new(wrapper());
        assert_eq!(assembler.batch(&request), assembler.batch(&request));
    }
}
