use crate::{
    batch::{AssetKind, BatchRequest},
    calls::{Call, CallListAssembler},
    consts::{
        BATCH_TRANSFER_RESERVE_WEI, FEE_BUFFER_PERCENT, PRIORITY_FEE_WEI,
        RECEIPT_POLL_INTERVAL_SECS, RECEIPT_WAIT_DEADLINE_SECS, SINGLE_TRANSFER_RESERVE_WEI,
    },
    errors::{BatchInputError, OperationError, OrchestratorError},
    primitives::user_operation::{
        UserOperation, UserOperationHash, UserOperationPartial, UserOperationReceipt,
    },
    traits::{Erc7579Account, SmartWalletAccount},
    types::{
        AccountStatus, ErrorResponse, EstimateResult, GasFees, JsonRpcResponse, OperationState,
        Request, Response, TokenInfo, WalletMap,
    },
};
use alloy::{
    core::sol_types::SolCall,
    primitives::{aliases::U192, Address as a_Address},
    sol,
};
use async_trait::async_trait;
use ethers::{
    providers::{Middleware, MiddlewareError},
    signers::{LocalWallet as Wallet, Signer},
    types::{
        transaction::eip2718::TypedTransaction, Address, Bytes, Eip1559TransactionRequest, H256,
        U256,
    },
};
use hashbrown::HashMap;
use parking_lot::Mutex;
use rand::Rng;
use regex::Regex;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};

sol! {
    function name() returns (string);
    function symbol() returns (string);
    function decimals() returns (uint8);
    function balanceOf(address account) returns (uint256);

    function getNonce(address sender, uint192 key) returns (uint256);
}

/// Orchestrates one transfer or batch end to end: precondition check,
/// call-list assembly, user-operation submission, receipt wait. Wraps a
/// read-only provider the way the usual ethers middlewares do.
#[derive(Clone)]
pub struct TransferOrchestrator<M> {
    pub inner: M,
    pub entry_point_address: Address,
    pub bundler_url: String,
    pub chain_id: u64,
    #[doc(hidden)]
    pub wallet: Wallet,
    pub wallet_map: WalletMap,
    pub sender: Address,
    pub validator: Address,
    pub assembler: CallListAssembler,
}

impl<M: Middleware + 'static + fmt::Debug + Clone> fmt::Debug for TransferOrchestrator<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferOrchestrator")
            .field("inner", &self.inner)
            .field("entry_point_address", &self.entry_point_address)
            .field("bundler_url", &self.bundler_url)
            .field("chain_id", &self.chain_id)
            .field("sender", &self.sender)
            .finish()
    }
}

impl<M: Middleware + 'static + fmt::Debug + Clone> MiddlewareError for OrchestratorError<M> {
    type Inner = M::Error;

    fn from_err(src: M::Error) -> Self {
        OrchestratorError::MiddlewareError(src)
    }

    fn as_inner(&self) -> Option<&Self::Inner> {
        match self {
            OrchestratorError::MiddlewareError(e) => Some(e),
            _ => None,
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static + fmt::Debug + Clone> Middleware for TransferOrchestrator<M> {
    type Error = OrchestratorError<M>;
    type Provider = M::Provider;
    type Inner = M;

    fn inner(&self) -> &M {
        &self.inner
    }
}

/// Native precondition: the balance must cover the transfer plus the
/// gas reserve, checked before any network write.
pub fn require_native_balance(
    balance: U256,
    amount: U256,
    reserve: U256,
) -> Result<(), OperationError> {
    let required = amount
        .checked_add(reserve)
        .ok_or(OperationError::InsufficientBalance {
            balance,
            required: U256::max_value(),
        })?;
    if balance < required {
        return Err(OperationError::InsufficientBalance { balance, required });
    }
    Ok(())
}

/// Token precondition: no gas reserve is deducted from token balances.
pub fn require_token_balance(balance: U256, amount: U256) -> Result<(), OperationError> {
    if balance < amount {
        return Err(OperationError::InsufficientTokenBalance {
            balance,
            required: amount,
        });
    }
    Ok(())
}

/// Current gas price scaled by the 150% buffer, with the fixed minimal
/// priority fee.
pub fn buffered_fees(gas_price: U256) -> GasFees {
    GasFees {
        max_fee_per_gas: gas_price * U256::from(FEE_BUFFER_PERCENT) / U256::from(100u64),
        max_priority_fee_per_gas: U256::from(PRIORITY_FEE_WEI),
    }
}

/// EntryPoint nonce key: the validator module occupies the high 160
/// bits of the 192-bit key.
pub fn nonce_key(validator: Address) -> U192 {
    let mut key = [0u8; 24];
    key[..20].copy_from_slice(validator.as_bytes());
    U192::from_be_bytes(key)
}

fn request_id() -> u64 {
    rand::thread_rng().gen::<u32>() as u64
}

impl<M: Middleware + 'static + fmt::Debug + Clone> TransferOrchestrator<M> {
    pub fn new(
        inner: M,
        entry_point_address: Address,
        bundler_url: impl Into<String>,
        wallet: Wallet,
        sender: Address,
        validator: Address,
        event_wrapper: Address,
    ) -> Self {
        let chain_id = wallet.chain_id();

        let account: Box<dyn SmartWalletAccount> = Box::new(Erc7579Account);
        let mut wallet_map: WalletMap = HashMap::new();
        wallet_map.insert(sender, Arc::new(Mutex::new(account)));

        Self {
            inner,
            entry_point_address,
            bundler_url: bundler_url.into(),
            chain_id,
            wallet,
            wallet_map,
            sender,
            validator,
            assembler: CallListAssembler::new(event_wrapper),
        }
    }

    fn account(&self) -> Box<dyn SmartWalletAccount> {
        match self.wallet_map.get(&self.sender) {
            Some(account) => account.lock().clone_box(),
            None => Box::new(Erc7579Account),
        }
    }

    // ---- chain reads ----

    async fn call_contract(&self, to: Address, data: Vec<u8>) -> anyhow::Result<Bytes> {
        let tx = TypedTransaction::Eip1559(
            Eip1559TransactionRequest::new()
                .to(to)
                .data(Bytes::from(data)),
        );
        let returned = self
            .inner
            .call(&tx, None)
            .await
            .map_err(|e| anyhow::anyhow!(OrchestratorError::<M>::MiddlewareError(e)))?;
        Ok(returned)
    }

    pub async fn get_native_balance(&self, address: Address) -> anyhow::Result<U256> {
        let balance = self
            .inner
            .get_balance(address, None)
            .await
            .map_err(|e| anyhow::anyhow!(OrchestratorError::<M>::MiddlewareError(e)))?;
        Ok(balance)
    }

    /// Metadata plus holder balance, fetched fresh on every call.
    pub async fn get_token_info(&self, token: Address, holder: Address) -> anyhow::Result<TokenInfo> {
        let name = nameCall::abi_decode_returns(
            &self.call_contract(token, nameCall {}.abi_encode()).await?,
            true,
        )?
        ._0;
        let symbol = symbolCall::abi_decode_returns(
            &self.call_contract(token, symbolCall {}.abi_encode()).await?,
            true,
        )?
        ._0;
        let decimals = decimalsCall::abi_decode_returns(
            &self
                .call_contract(token, decimalsCall {}.abi_encode())
                .await?,
            true,
        )?
        ._0;
        let balance = self.get_token_balance(token, holder).await?;

        Ok(TokenInfo {
            address: token,
            name,
            symbol,
            decimals,
            balance,
        })
    }

    pub async fn get_token_balance(&self, token: Address, holder: Address) -> anyhow::Result<U256> {
        let returned = self
            .call_contract(
                token,
                balanceOfCall {
                    account: a_Address::from(holder.0),
                }
                .abi_encode(),
            )
            .await?;
        let balance = balanceOfCall::abi_decode_returns(&returned, true)?._0;
        Ok(U256(balance.into_limbs()))
    }

    pub async fn get_gas_fee(&self) -> anyhow::Result<GasFees> {
        let gas_price = self
            .inner
            .get_gas_price()
            .await
            .map_err(|e| anyhow::anyhow!(OrchestratorError::<M>::MiddlewareError(e)))?;
        Ok(buffered_fees(gas_price))
    }

    pub async fn get_nonce(&self) -> anyhow::Result<U256> {
        let call = getNonceCall {
            sender: a_Address::from(self.sender.0),
            key: nonce_key(self.validator),
        };
        let returned = self
            .call_contract(self.entry_point_address, call.abi_encode())
            .await?;
        let nonce = getNonceCall::abi_decode_returns(&returned, true)?._0;
        Ok(U256(nonce.into_limbs()))
    }

    /// Explicit deployment check: the account either has bytecode or it
    /// does not, and callers branch on the returned variant.
    pub async fn account_status(&self) -> anyhow::Result<AccountStatus> {
        let code = self
            .inner
            .get_code(self.sender, None)
            .await
            .map_err(|e| anyhow::anyhow!(OrchestratorError::<M>::MiddlewareError(e)))?;
        if code.is_empty() {
            Ok(AccountStatus::Undeployed)
        } else {
            Ok(AccountStatus::Deployed(self.sender))
        }
    }

    async fn require_deployed(&self) -> anyhow::Result<()> {
        if !self.account_status().await?.is_deployed() {
            return Err(anyhow::anyhow!(OperationError::AccountNotDeployed(
                self.sender
            )));
        }
        Ok(())
    }

    // ---- bundler RPC ----

    pub async fn estimate_user_operation_gas(
        &self,
        user_operation: &UserOperationPartial,
    ) -> anyhow::Result<Response<EstimateResult>> {
        let req_body = Request {
            jsonrpc: "2.0".to_string(),
            method: "eth_estimateUserOperationGas".to_string(),
            params: vec![json!(user_operation), json!(self.entry_point_address)],
            id: request_id(),
        };

        let client = reqwest::Client::new();
        let response = client
            .post(&self.bundler_url)
            .json(&req_body)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    pub async fn send_user_operation(
        &self,
        user_operation: &UserOperationPartial,
    ) -> anyhow::Result<Response<H256>> {
        let req_body = Request {
            jsonrpc: "2.0".to_string(),
            method: "eth_sendUserOperation".to_string(),
            params: vec![json!(user_operation), json!(self.entry_point_address)],
            id: request_id(),
        };

        let client = reqwest::Client::new();
        let response = client
            .post(&self.bundler_url)
            .json(&req_body)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    pub async fn get_user_operation_receipt(
        &self,
        user_operation_hash: &UserOperationHash,
    ) -> anyhow::Result<Option<UserOperationReceipt>> {
        let client = reqwest::Client::new();
        let response = client
            .post(&self.bundler_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "method": "eth_getUserOperationReceipt",
                "params": vec![json!(user_operation_hash)],
                "id": request_id(),
            }))
            .send()
            .await?
            .json::<JsonRpcResponse<UserOperationReceipt>>()
            .await?;

        if let Some(error) = response.error {
            return Err(anyhow::anyhow!(OperationError::Submission(error.message)));
        }
        Ok(response.result)
    }

    /// Cooperative poll for a terminal receipt. Dropping the future
    /// stops the wait; the operation itself cannot be withdrawn.
    pub async fn wait_for_receipt(
        &self,
        user_operation_hash: &UserOperationHash,
    ) -> anyhow::Result<UserOperationReceipt> {
        let deadline = Instant::now() + Duration::from_secs(RECEIPT_WAIT_DEADLINE_SECS);

        loop {
            if let Some(receipt) = self.get_user_operation_receipt(user_operation_hash).await? {
                return Ok(receipt);
            }
            if Instant::now() >= deadline {
                return Err(anyhow::anyhow!(OperationError::ReceiptTimeout(
                    RECEIPT_WAIT_DEADLINE_SECS
                )));
            }
            sleep(Duration::from_secs(RECEIPT_POLL_INTERVAL_SECS)).await;
        }
    }

    // ---- user operation construction ----

    pub async fn sign_uo(&self, uo: UserOperation) -> anyhow::Result<UserOperation> {
        let h = uo.hash(&self.entry_point_address, &U256::from(self.chain_id));
        let sig = self.wallet.sign_message(h.0.as_bytes()).await?;
        Ok(uo.signature(sig.to_vec().into()))
    }

    async fn prepare_user_operation(
        &self,
        call_data: Bytes,
    ) -> anyhow::Result<UserOperationPartial> {
        let nonce = self.get_nonce().await?;
        let mut user_operation = UserOperationPartial {
            sender: Some(self.sender),
            nonce: Some(nonce),
            factory: None,
            factory_data: None,
            call_data: Some(call_data),
            call_gas_limit: Some(U256::from(1_000_000_000u64)),
            verification_gas_limit: Some(U256::from(1_000_000_000u64)),
            pre_verification_gas: Some(U256::from(1_000_000_000u64)),
            max_fee_per_gas: Some(U256::from(1_000_000_000u64)),
            max_priority_fee_per_gas: Some(U256::from(1_000_000_000u64)),
            paymaster: None,
            paymaster_verification_gas_limit: None,
            paymaster_post_op_gas_limit: None,
            paymaster_data: None,
            signature: Some(Bytes::default()),
        };

        let estimated = self.estimate_user_operation_gas(&user_operation).await?;
        let fees = self.get_gas_fee().await?;

        user_operation.call_gas_limit = Some(estimated.result.call_gas_limit);
        user_operation.verification_gas_limit = Some(estimated.result.verification_gas_limit);
        user_operation.pre_verification_gas = Some(estimated.result.pre_verification_gas);
        user_operation.max_fee_per_gas = Some(fees.max_fee_per_gas);
        user_operation.max_priority_fee_per_gas = Some(fees.max_priority_fee_per_gas);

        let signed = self.sign_uo(UserOperation::from(user_operation.clone())).await?;
        user_operation.signature = Some(signed.signature);

        Ok(user_operation)
    }

    /// Building -> Submitted -> Confirmed | Reverted | Failed. Errors
    /// before acceptance never leave partial on-chain state behind.
    pub async fn submit_and_wait(&self, calls: &[Call]) -> anyhow::Result<H256> {
        log::debug!("state: {:?}", OperationState::Building);

        let account = self.account();
        let call_data: Bytes = match calls {
            [] => return Err(anyhow::anyhow!(BatchInputError::EmptyInput)),
            [single] => account.execute_calldata(single).into(),
            many => account.execute_batch_calldata(many).into(),
        };

        let user_operation = match self.prepare_user_operation(call_data).await {
            Ok(user_operation) => user_operation,
            Err(e) => {
                log::warn!("state: {:?}", OperationState::Failed);
                return Err(e);
            }
        };

        let sent = match self.send_user_operation(&user_operation).await {
            Ok(sent) => sent,
            Err(e) => {
                log::warn!("state: {:?}", OperationState::Failed);
                return Err(e);
            }
        };
        let uo_hash = UserOperationHash::from(sent.result);
        log::info!("state: {:?}", OperationState::Submitted(uo_hash));

        let receipt = match self.wait_for_receipt(&uo_hash).await {
            Ok(receipt) => receipt,
            Err(e) => {
                log::warn!("user operation {:?} state: {:?}", uo_hash, OperationState::Failed);
                return Err(e);
            }
        };

        let tx_hash = receipt.tx_receipt.transaction_hash;
        if !receipt.success {
            log::warn!(
                "user operation {:?} state: {:?}",
                uo_hash,
                OperationState::Reverted(tx_hash)
            );
            return Err(anyhow::anyhow!(OperationError::Reverted(tx_hash)));
        }

        log::info!(
            "user operation {:?} state: {:?}",
            uo_hash,
            OperationState::Confirmed(tx_hash)
        );
        Ok(tx_hash)
    }

    // ---- transfer orchestration ----

    pub async fn transfer_native(&self, to: Address, amount: U256) -> anyhow::Result<H256> {
        self.require_deployed().await?;

        let balance = self.get_native_balance(self.sender).await?;
        require_native_balance(balance, amount, U256::from(SINGLE_TRANSFER_RESERVE_WEI))
            .map_err(|e| anyhow::anyhow!(e))?;

        let calls = self.assembler.single_native(to, amount);
        self.submit_and_wait(&calls).await
    }

    pub async fn transfer_erc20(
        &self,
        token: Address,
        to: Address,
        amount: U256,
    ) -> anyhow::Result<H256> {
        self.require_deployed().await?;

        let balance = self.get_token_balance(token, self.sender).await?;
        require_token_balance(balance, amount).map_err(|e| anyhow::anyhow!(e))?;

        let calls = self.assembler.single_erc20(token, to, amount);
        self.submit_and_wait(&calls).await
    }

    pub async fn batch_transfer(&self, request: &BatchRequest) -> anyhow::Result<H256> {
        if request.is_empty() {
            return Err(anyhow::anyhow!(BatchInputError::EmptyInput));
        }
        let total = request
            .total_amount()
            .ok_or_else(|| anyhow::anyhow!(BatchInputError::TotalOverflow))?;
        self.require_deployed().await?;

        match request.asset {
            AssetKind::Native => {
                let balance = self.get_native_balance(self.sender).await?;
                require_native_balance(balance, total, U256::from(BATCH_TRANSFER_RESERVE_WEI))
                    .map_err(|e| anyhow::anyhow!(e))?;
            }
            AssetKind::Erc20(token) => {
                let balance = self.get_token_balance(token, self.sender).await?;
                require_token_balance(balance, total).map_err(|e| anyhow::anyhow!(e))?;
            }
        }

        log::info!(
            "batch transfer: {} recipients, total {} ({})",
            request.len(),
            total,
            request.asset.tag()
        );
        let calls = self.assembler.batch(request);
        self.submit_and_wait(&calls).await
    }

    async fn handle_response<R>(response: reqwest::Response) -> anyhow::Result<Response<R>>
    where
        R: fmt::Debug + serde::de::DeserializeOwned,
    {
        let str_response = response.text().await?;
        let parsed_response: anyhow::Result<Response<R>> =
            serde_json::from_str(&str_response).map_err(anyhow::Error::from);

        match parsed_response {
            Ok(success_response) => {
                log::info!("bundler accepted: {:?}", success_response);
                Ok(success_response)
            }
            Err(_) => {
                let error_response: ErrorResponse = serde_json::from_str(&str_response)?;
                log::warn!("bundler rejected: {:?}", error_response.error);
                let error_message = &error_response.error.message;

                if let Some(captures) =
                    Regex::new(r"Call gas limit (\d+) is lower than call gas estimation (\d+)")
                        .unwrap()
                        .captures(error_message)
                {
                    let limit: u64 = captures[1].parse().unwrap();
                    let estimation: u64 = captures[2].parse().unwrap();
                    return Err(anyhow::anyhow!(OrchestratorError::<M>::CallGasLimitError(
                        limit, estimation,
                    )));
                }

                if let Some(captures) = Regex::new(
                    r"Pre-verification gas (\d+) is lower than calculated pre-verification gas (\d+)",
                )
                .unwrap()
                .captures(error_message)
                {
                    let provided: u64 = captures[1].parse().unwrap();
                    let calculated: u64 = captures[2].parse().unwrap();
                    return Err(anyhow::anyhow!(
                        OrchestratorError::<M>::PreVerificationGasError(provided, calculated)
                    ));
                }

                if error_message.contains("AA40 over verificationGasLimit") {
                    return Err(anyhow::anyhow!(
                        OrchestratorError::<M>::VerificationGasLimitError
                    ));
                }

                Err(anyhow::anyhow!(OperationError::Submission(
                    error_message.clone()
                )))
            }
        }
    }
}
