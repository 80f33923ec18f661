//! Network boundary.
//!
//! Everything the engine needs from a ledger node goes through [`LedgerRpc`],
//! so tests can drive the submitter and the builders with a scripted ledger.

use std::future::Future;

use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig},
};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{TransactionError, VersionedTransaction},
};
use tracing::debug;

use crate::error::MushiResult;

/// Terminal status of a signature, if the node has seen one.
pub type SignatureStatus = Option<Result<(), TransactionError>>;

/// Outcome of re-simulating a failed transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationReport {
    pub error: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

pub trait LedgerRpc: Send + Sync {
    fn latest_blockhash(&self) -> impl Future<Output = MushiResult<Hash>> + Send;

    /// Broadcast without preflight.
    fn send_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> impl Future<Output = MushiResult<Signature>> + Send;

    fn signature_status(
        &self,
        signature: &Signature,
    ) -> impl Future<Output = MushiResult<SignatureStatus>> + Send;

    fn is_blockhash_valid(&self, blockhash: &Hash) -> impl Future<Output = MushiResult<bool>> + Send;

    /// Simulate with the recent blockhash replaced, for diagnostics only.
    fn simulate(
        &self,
        tx: &VersionedTransaction,
    ) -> impl Future<Output = MushiResult<SimulationReport>> + Send;

    /// Raw account data, `None` when the account does not exist.
    fn account_data(
        &self,
        address: &Pubkey,
    ) -> impl Future<Output = MushiResult<Option<Vec<u8>>>> + Send;
}

/// [`LedgerRpc`] over the Solana JSON-RPC client.
pub struct SolanaRpc {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaRpc {
    pub fn new(rpc_url: impl Into<String>, commitment: CommitmentConfig) -> Self {
        Self {
            client: RpcClient::new_with_commitment(rpc_url.into(), commitment),
            commitment,
        }
    }

    pub fn url(&self) -> String {
        self.client.url()
    }
}

impl LedgerRpc for SolanaRpc {
    async fn latest_blockhash(&self) -> MushiResult<Hash> {
        Ok(self.client.get_latest_blockhash().await?)
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> MushiResult<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            preflight_commitment: Some(self.commitment.commitment),
            ..Default::default()
        };
        Ok(self.client.send_transaction_with_config(tx, config).await?)
    }

    async fn signature_status(&self, signature: &Signature) -> MushiResult<SignatureStatus> {
        Ok(self
            .client
            .get_signature_status_with_commitment(signature, self.commitment)
            .await?)
    }

    async fn is_blockhash_valid(&self, blockhash: &Hash) -> MushiResult<bool> {
        Ok(self.client.is_blockhash_valid(blockhash, self.commitment).await?)
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> MushiResult<SimulationReport> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(self.commitment),
            ..Default::default()
        };
        let result = self.client.simulate_transaction_with_config(tx, config).await?.value;
        Ok(SimulationReport {
            error: result.err.map(|e| format!("{:?}", e)),
            logs: result.logs.unwrap_or_default(),
            units_consumed: result.units_consumed,
        })
    }

    async fn account_data(&self, address: &Pubkey) -> MushiResult<Option<Vec<u8>>> {
        let account = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await?
            .value;
        debug!(%address, found = account.is_some(), "fetched account");
        Ok(account.map(|a| a.data))
    }
}
