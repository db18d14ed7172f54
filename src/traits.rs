use alloy::{
    core::sol_types::{SolCall, SolValue},
    primitives::{Address as a_Address, FixedBytes, U256 as a_U256},
    sol,
};
use std::fmt::Debug;

use crate::calls::Call;

sol! {
    struct Execution { address target; uint256 value; bytes callData; }
    function execute(bytes32 mode, bytes calldata executionCalldata);
}

/// Encodes calls into the smart account's `execute` calldata. ERC-7579
/// single-call mode packs `target ++ value ++ data`; batch mode carries
/// an ABI-encoded `Execution[]` with the batch flag in the mode word.
pub trait SmartWalletAccount: Debug + Send {
    fn execute_calldata(&self, call: &Call) -> Vec<u8> {
        let mode_code_single = [0u8; 32];

        let mut execution_calldata = Vec::new();
        execution_calldata.extend_from_slice(call.to.as_bytes());

        let mut value_bytes = [0u8; 32];
        call.value.to_big_endian(&mut value_bytes);
        execution_calldata.extend_from_slice(&value_bytes);
        execution_calldata.extend_from_slice(&call.data);

        let call = executeCall {
            mode: FixedBytes(mode_code_single),
            executionCalldata: execution_calldata.into(),
        };
        call.abi_encode()
    }

    fn execute_batch_calldata(&self, calls: &[Call]) -> Vec<u8> {
        let mut mode_code_batch = [0u8; 32];
        mode_code_batch[0] = 0x01;

        let executions: Vec<Execution> = calls
            .iter()
            .map(|call| Execution {
                target: a_Address::from(call.to.0),
                value: a_U256::from_limbs(call.value.0),
                callData: call.data.to_vec().into(),
            })
            .collect();

        let call = executeCall {
            mode: FixedBytes(mode_code_batch),
            executionCalldata: executions.abi_encode().into(),
        };
        call.abi_encode()
    }

    fn clone_box(&self) -> Box<dyn SmartWalletAccount>;
}

#[derive(Debug, Clone, Default)]
pub struct Erc7579Account;

impl SmartWalletAccount for Erc7579Account {
    fn clone_box(&self) -> Box<dyn SmartWalletAccount> {
        Box::new(self.clone())
    }
}
