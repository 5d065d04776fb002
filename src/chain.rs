//! Chain client seam: simulate, submit, and confirm ERC-20 transfers.
//!
//! The orchestrator only talks to the [`ChainClient`] trait; the ethers-backed
//! implementation here dry-runs `transfer(to, amount)` via `eth_call` before
//! spending anything on submission.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::abi::{Function, Param, ParamType, StateMutability, Token};
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Function selector for transfer(address,uint256)
/// keccak256("transfer(address,uint256)") = 0xa9059cbb...
pub const ERC20_TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// The ERC-20 transfer function signature
#[allow(deprecated)]
fn erc20_transfer_function() -> Function {
    // function transfer(address recipient, uint256 amount) external returns (bool)
    Function {
        name: "transfer".to_string(),
        inputs: vec![
            Param {
                name: "recipient".to_string(),
                kind: ParamType::Address,
                internal_type: None,
            },
            Param {
                name: "amount".to_string(),
                kind: ParamType::Uint(256),
                internal_type: None,
            },
        ],
        outputs: vec![Param {
            name: "".to_string(),
            kind: ParamType::Bool,
            internal_type: None,
        }],
        constant: None,
        state_mutability: StateMutability::NonPayable,
    }
}

/// ABI-encode a `transfer(to, amount)` call.
pub fn transfer_calldata(to: Address, amount: U256) -> Result<Bytes> {
    let func = erc20_transfer_function();
    let calldata = func.encode_input(&[Token::Address(to), Token::Uint(amount)])?;
    Ok(Bytes::from(calldata))
}

/// A transfer that simulated successfully and is ready to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferCall {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub calldata: Bytes,
}

/// Terminal inclusion state of a submitted transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub block_number: Option<u64>,
    /// False when the transaction was included but reverted.
    pub success: bool,
}

/// External wallet/chain collaborator for the sweep.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Dry-run the transfer against current chain state. A revert surfaces as
    /// an error carrying the reason.
    async fn simulate_transfer(
        &self,
        from: Address,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<TransferCall>;

    /// Submit a simulated transfer; returns its transaction hash.
    async fn submit(&self, call: &TransferCall) -> Result<TxHash>;

    /// Await terminal block inclusion of a submitted transaction.
    async fn confirm(&self, tx_hash: TxHash) -> Result<Confirmation>;
}

/// Chain client over an ethers JSON-RPC provider. Submission relies on the
/// node/wallet managing the `from` account; signing is out of scope here.
pub struct EthersChainClient {
    provider: Arc<Provider<Http>>,
    confirmation_timeout_secs: u64,
}

impl EthersChainClient {
    pub fn new(provider: Arc<Provider<Http>>, confirmation_timeout_secs: u64) -> Self {
        Self {
            provider,
            confirmation_timeout_secs,
        }
    }

    fn build_request(call: &TransferCall) -> TransactionRequest {
        TransactionRequest::new()
            .from(call.from)
            .to(call.token)
            .data(call.calldata.clone())
    }
}

#[async_trait]
impl ChainClient for EthersChainClient {
    async fn simulate_transfer(
        &self,
        from: Address,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<TransferCall> {
        let calldata = transfer_calldata(to, amount)?;
        let call = TransferCall {
            token,
            from,
            to,
            amount,
            calldata,
        };

        let request = Self::build_request(&call);
        self.provider
            .call(&request.into(), None)
            .await
            .map_err(|e| anyhow!("simulation reverted: {}", e))?;

        debug!(
            "Simulated transfer of {} units of {:?} to {:?}",
            amount, token, to
        );
        Ok(call)
    }

    async fn submit(&self, call: &TransferCall) -> Result<TxHash> {
        let request = Self::build_request(call);
        let pending = self
            .provider
            .send_transaction(request, None)
            .await
            .map_err(|e| anyhow!("submission failed: {}", e))?;
        Ok(*pending)
    }

    async fn confirm(&self, tx_hash: TxHash) -> Result<Confirmation> {
        let mut attempts = 0;
        let max_attempts = (self.confirmation_timeout_secs * 2) as usize;

        loop {
            if let Ok(Some(receipt)) = self.provider.get_transaction_receipt(tx_hash).await {
                return Ok(Confirmation {
                    block_number: receipt.block_number.map(|n| n.as_u64()),
                    success: receipt.status.map(|s| s.as_u64() == 1).unwrap_or(true),
                });
            }

            attempts += 1;
            if attempts >= max_attempts {
                return Err(anyhow!(
                    "Confirmation timeout after {} seconds",
                    self.confirmation_timeout_secs
                ));
            }

            sleep(Duration::from_millis(500)).await;
        }
    }
}
