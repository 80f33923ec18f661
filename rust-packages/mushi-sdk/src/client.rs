//! Operation facade.

use std::{future::Future, sync::Arc};

use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey, signature::{Signature, Signer}};
use tracing::{debug, info, warn};

use crate::{
    amount::AssetScales,
    calendar,
    error::{MushiError, MushiResult},
    instructions::{ConfigUpdate, InstructionBatch, InstructionBuilder, Operation, TokenPrograms},
    pda::Pdas,
    reader::StateReader,
    rpc::{LedgerRpc, SolanaRpc},
    schema::ProgramInstruction,
    state::{DailyBucket, GlobalCounters, ProgramConfig, UserLoan},
    submitter::{SignedTransaction, Submitter, SubmitterConfig, TxSigner},
};

/// Everything a [`MushiClient`] needs. There is no default program id.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub rpc_url: String,
    pub program_id: Pubkey,
    pub commitment: CommitmentConfig,
    /// Mint decimals; read from the mints when `None`.
    pub scales: Option<AssetScales>,
    pub token_programs: TokenPrograms,
    pub submitter: SubmitterConfig,
    /// Extra send attempts after a network error before broadcast.
    ///
    /// A retry resends the same signed transaction while its blockhash is
    /// valid, so the ledger applies it at most once. Once the blockhash has
    /// expired the operation is rebuilt and signed again; if the node had in
    /// fact accepted the first send despite reporting an error, both can land.
    pub broadcast_retries: u32,
}

impl ClientConfig {
    pub fn new(rpc_url: impl Into<String>, program_id: Pubkey) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            program_id,
            commitment: CommitmentConfig::confirmed(),
            scales: None,
            token_programs: TokenPrograms::default(),
            submitter: SubmitterConfig::default(),
            broadcast_retries: 2,
        }
    }

    pub fn validate(&self) -> MushiResult<()> {
        if self.rpc_url.trim().is_empty() {
            return Err(MushiError::Config("rpc_url is empty".into()));
        }
        if self.program_id == Pubkey::default() {
            return Err(MushiError::Config("program_id is not set".into()));
        }
        if self.submitter.max_polls == 0 || self.submitter.expiry_strikes == 0 {
            return Err(MushiError::Config(
                "max_polls and expiry_strikes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Result of a confirmed operation.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub signature: Signature,
    pub instruction: ProgramInstruction,
    /// Daily buckets the transaction touched.
    pub days: Vec<String>,
    /// The owner's loan as of confirmation, for loan-changing operations.
    pub loan: Option<UserLoan>,
    /// Base mint created by `start`.
    pub created_mint: Option<Pubkey>,
}

pub struct MushiClient<R> {
    builder: InstructionBuilder<R>,
    submitter: Submitter<R>,
    broadcast_retries: u32,
    clock: fn() -> i64,
}

impl MushiClient<SolanaRpc> {
    pub fn new(config: ClientConfig) -> MushiResult<Self> {
        config.validate()?;
        let rpc = Arc::new(SolanaRpc::new(config.rpc_url.clone(), config.commitment));
        Self::with_rpc(rpc, config)
    }
}

impl<R: LedgerRpc> MushiClient<R> {
    /// Client over any [`LedgerRpc`]. `rpc_url` is not used.
    pub fn with_rpc(rpc: Arc<R>, config: ClientConfig) -> MushiResult<Self> {
        let reader = StateReader::new(Arc::clone(&rpc), Pdas::new(config.program_id));
        Ok(Self {
            builder: InstructionBuilder::new(reader, config.token_programs, config.scales),
            submitter: Submitter::new(rpc, config.submitter),
            broadcast_retries: config.broadcast_retries,
            clock: calendar::now_unix,
        })
    }

    /// Replace the wall clock used to pick daily buckets.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn pdas(&self) -> &Pdas {
        self.builder.pdas()
    }

    pub fn reader(&self) -> &StateReader<R> {
        self.builder.reader()
    }

    pub async fn config(&self) -> MushiResult<ProgramConfig> {
        self.reader().config().await
    }

    pub async fn global(&self) -> MushiResult<GlobalCounters> {
        self.reader().global().await
    }

    pub async fn user_loan(&self, owner: &Pubkey) -> MushiResult<Option<UserLoan>> {
        self.reader().user_loan(owner).await
    }

    pub async fn daily_bucket(&self, day: &str) -> MushiResult<Option<DailyBucket>> {
        self.reader().daily_bucket(day).await
    }

    /// Build without submitting.
    pub async fn prepare(&self, op: &Operation, owner: &Pubkey) -> MushiResult<InstructionBatch> {
        self.builder.build(op, owner, (self.clock)()).await
    }

    pub async fn execute(&self, op: &Operation, signer: &TxSigner) -> MushiResult<Receipt> {
        self.execute_until(op, signer, std::future::pending()).await
    }

    /// Build, sign, broadcast and poll `op`. `cancel` resolving while polling
    /// ends in [`MushiError::TransactionExpired`].
    pub async fn execute_until<C>(
        &self,
        op: &Operation,
        signer: &TxSigner,
        cancel: C,
    ) -> MushiResult<Receipt>
    where
        C: Future<Output = ()> + Send,
    {
        let owner = signer
            .try_pubkey()
            .map_err(|e| MushiError::Sign(e.to_string()))?;
        let mut held = None;
        let mut attempt = 0;
        let (batch, signed, signature) = loop {
            match self.broadcast_once(op, &owner, signer, &mut held).await {
                Ok(sent) => break sent,
                Err(MushiError::Rpc(reason)) if attempt < self.broadcast_retries => {
                    attempt += 1;
                    warn!(instruction = op.instruction().name(), attempt, %reason, "retrying after network error");
                }
                Err(e) => return Err(e),
            }
        };

        let outcome = self.submitter.confirm(&signed, signature, cancel).await;
        let signature = outcome.into_result()?;
        let loan = if op.changes_loan() {
            match self.user_loan(&owner).await {
                Ok(loan) => loan,
                Err(e) => {
                    warn!(%signature, error = %e, "confirmed but could not re-read loan");
                    None
                }
            }
        } else {
            None
        };
        info!(instruction = batch.label(), %signature, "operation confirmed");

        Ok(Receipt {
            signature,
            instruction: batch.instruction,
            created_mint: batch.ephemeral_signers.first().map(|kp| kp.pubkey()),
            days: batch.days,
            loan,
        })
    }

    /// Send `op` once. A transaction left in `held` by a failed send is sent
    /// again unchanged while its blockhash is valid; otherwise `op` is rebuilt
    /// and signed afresh.
    async fn broadcast_once(
        &self,
        op: &Operation,
        owner: &Pubkey,
        signer: &TxSigner,
        held: &mut Option<(InstructionBatch, SignedTransaction)>,
    ) -> MushiResult<(InstructionBatch, SignedTransaction, Signature)> {
        if let Some((_, signed)) = held.as_ref() {
            if !self.submitter.blockhash_valid(&signed.blockhash).await? {
                debug!(instruction = signed.label, blockhash = %signed.blockhash, "held transaction expired, re-signing");
                *held = None;
            }
        }
        let (batch, signed) = match held.take() {
            Some(pair) => pair,
            None => {
                let batch = self.prepare(op, owner).await?;
                let signed = self.submitter.sign(&batch, signer).await?;
                (batch, signed)
            }
        };
        match self.submitter.broadcast(&signed).await {
            Ok(signature) => Ok((batch, signed, signature)),
            Err(e) => {
                *held = Some((batch, signed));
                Err(e)
            }
        }
    }

    pub async fn initialize(
        &self,
        signer: &TxSigner,
        fee_receiver: Pubkey,
        quote_mint: Pubkey,
        buy_fee: &str,
        sell_fee: &str,
        leverage_fee: &str,
    ) -> MushiResult<Receipt> {
        let op = Operation::Initialize {
            fee_receiver,
            quote_mint,
            buy_fee: buy_fee.to_string(),
            sell_fee: sell_fee.to_string(),
            leverage_fee: leverage_fee.to_string(),
        };
        self.execute(&op, signer).await
    }

    pub async fn update_config(&self, signer: &TxSigner, update: ConfigUpdate) -> MushiResult<Receipt> {
        self.execute(&Operation::UpdateConfig(update), signer).await
    }

    pub async fn start(
        &self,
        signer: &TxSigner,
        quote_amount: &str,
        token_name: &str,
        token_symbol: &str,
        token_uri: &str,
    ) -> MushiResult<Receipt> {
        let op = Operation::Start {
            quote_amount: quote_amount.to_string(),
            token_name: token_name.to_string(),
            token_symbol: token_symbol.to_string(),
            token_uri: token_uri.to_string(),
        };
        self.execute(&op, signer).await
    }

    pub async fn buy(&self, signer: &TxSigner, quote_amount: &str, referral: Option<Pubkey>) -> MushiResult<Receipt> {
        let op = Operation::Buy {
            quote_amount: quote_amount.to_string(),
            referral,
        };
        self.execute(&op, signer).await
    }

    pub async fn sell(&self, signer: &TxSigner, base_amount: &str) -> MushiResult<Receipt> {
        let op = Operation::Sell {
            base_amount: base_amount.to_string(),
        };
        self.execute(&op, signer).await
    }

    pub async fn borrow(&self, signer: &TxSigner, quote_amount: &str, days: u64) -> MushiResult<Receipt> {
        let op = Operation::Borrow {
            quote_amount: quote_amount.to_string(),
            days,
        };
        self.execute(&op, signer).await
    }

    pub async fn borrow_more(&self, signer: &TxSigner, quote_amount: &str) -> MushiResult<Receipt> {
        let op = Operation::BorrowMore {
            quote_amount: quote_amount.to_string(),
        };
        self.execute(&op, signer).await
    }

    pub async fn leverage(&self, signer: &TxSigner, quote_amount: &str, days: u64) -> MushiResult<Receipt> {
        let op = Operation::Leverage {
            quote_amount: quote_amount.to_string(),
            days,
        };
        self.execute(&op, signer).await
    }

    pub async fn extend_loan(&self, signer: &TxSigner, days: u64) -> MushiResult<Receipt> {
        self.execute(&Operation::ExtendLoan { days }, signer).await
    }

    pub async fn repay(&self, signer: &TxSigner, quote_amount: &str) -> MushiResult<Receipt> {
        let op = Operation::Repay {
            quote_amount: quote_amount.to_string(),
        };
        self.execute(&op, signer).await
    }

    pub async fn remove_collateral(&self, signer: &TxSigner, base_amount: &str) -> MushiResult<Receipt> {
        let op = Operation::RemoveCollateral {
            base_amount: base_amount.to_string(),
        };
        self.execute(&op, signer).await
    }

    pub async fn close_position(&self, signer: &TxSigner, quote_amount: &str) -> MushiResult<Receipt> {
        let op = Operation::ClosePosition {
            quote_amount: quote_amount.to_string(),
        };
        self.execute(&op, signer).await
    }

    pub async fn flash_close_position(&self, signer: &TxSigner) -> MushiResult<Receipt> {
        self.execute(&Operation::FlashClosePosition, signer).await
    }

    pub async fn liquidate(&self, signer: &TxSigner) -> MushiResult<Receipt> {
        self.execute(&Operation::Liquidate, signer).await
    }

    pub async fn stake(&self, signer: &TxSigner, base_amount: &str) -> MushiResult<Receipt> {
        let op = Operation::Stake {
            base_amount: base_amount.to_string(),
        };
        self.execute(&op, signer).await
    }

    pub async fn unstake(&self, signer: &TxSigner, base_amount: &str) -> MushiResult<Receipt> {
        let op = Operation::Unstake {
            base_amount: base_amount.to_string(),
        };
        self.execute(&op, signer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_requires_program_id() {
        let config = ClientConfig::new("http://localhost:8899", Pubkey::default());
        assert!(matches!(config.validate(), Err(MushiError::Config(_))));
    }

    #[test]
    fn test_config_rejects_empty_url() {
        let config = ClientConfig::new(" ", Pubkey::new_unique());
        assert!(matches!(config.validate(), Err(MushiError::Config(_))));
    }

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::new("http://localhost:8899", Pubkey::new_unique());
        assert!(config.validate().is_ok());
        assert_eq!(config.broadcast_retries, 2);
        assert!(config.scales.is_none());
        assert_eq!(config.commitment, CommitmentConfig::confirmed());
    }
}
