//! Transaction submitter.
//!
//! Drives one instruction batch through
//! `Built -> Signed -> Broadcast -> Polling -> {Confirmed, Failed, Expired}`.
//!
//! Broadcast skips preflight, so the only reliable verdict comes from
//! polling the signature status. An error status ends in `Failed` after an
//! advisory re-simulation; two consecutive polls that find no status and an
//! invalid blockhash end in `Expired`, as does running out of polls or the
//! caller cancelling. The wait between polls is the only suspension point.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use solana_sdk::{
    hash::Hash,
    message::{v0, VersionedMessage},
    signature::{Signature, Signer},
    transaction::{TransactionError, VersionedTransaction},
};
use tracing::{debug, info, warn};

use crate::{
    error::{MushiError, MushiResult},
    instructions::InstructionBatch,
    rpc::{LedgerRpc, SimulationReport},
};

/// Signer accepted by the submitter and the facade.
pub type TxSigner = dyn Signer + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitterConfig {
    pub poll_interval: Duration,
    pub max_polls: u32,
    /// Consecutive invalid-blockhash polls before giving up.
    pub expiry_strikes: u32,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_polls: 50,
            expiry_strikes: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    BlockhashExpired,
    PollBudgetExhausted,
    Cancelled,
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockhashExpired => write!(f, "blockhash expired before confirmation"),
            Self::PollBudgetExhausted => write!(f, "no status within the polling budget"),
            Self::Cancelled => write!(f, "cancelled while polling"),
        }
    }
}

/// Why a transaction failed. The simulation is advisory and never changes
/// the verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub error: TransactionError,
    pub simulation: Option<SimulationReport>,
    pub simulation_error: Option<String>,
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(sim) = &self.simulation {
            if let Some(err) = &sim.error {
                write!(f, "; simulation: {}", err)?;
            }
            if let Some(last) = sim.logs.last() {
                write!(f, "; last log: {}", last)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Confirmed {
        signature: Signature,
        polls: u32,
    },
    Failed {
        signature: Signature,
        report: FailureReport,
    },
    Expired {
        signature: Signature,
        reason: ExpiryReason,
    },
}

impl TxOutcome {
    pub fn signature(&self) -> &Signature {
        match self {
            Self::Confirmed { signature, .. }
            | Self::Failed { signature, .. }
            | Self::Expired { signature, .. } => signature,
        }
    }

    pub fn into_result(self) -> MushiResult<Signature> {
        match self {
            Self::Confirmed { signature, .. } => Ok(signature),
            Self::Failed { signature, report } => {
                Err(MushiError::TransactionFailed { signature, report })
            }
            Self::Expired { reason, .. } => Err(MushiError::TransactionExpired(reason)),
        }
    }
}

/// Compile `batch` into a v0 transaction and sign it with the payer and the
/// batch's own ephemeral signers.
pub fn sign_transaction(
    batch: &InstructionBatch,
    payer: &TxSigner,
    blockhash: Hash,
) -> MushiResult<VersionedTransaction> {
    let payer_key = payer
        .try_pubkey()
        .map_err(|e| MushiError::Sign(e.to_string()))?;
    if payer_key != batch.payer {
        return Err(MushiError::Sign(format!(
            "batch was built for {} but signer is {}",
            batch.payer, payer_key
        )));
    }

    let message = v0::Message::try_compile(&batch.payer, &batch.instructions, &[], blockhash)
        .map_err(|e| MushiError::Sign(e.to_string()))?;
    let message = VersionedMessage::V0(message);
    let bytes = message.serialize();

    let required = usize::from(message.header().num_required_signatures);
    let signer_keys = message
        .static_account_keys()
        .get(..required)
        .ok_or_else(|| MushiError::Sign("message header lists more signers than keys".into()))?;

    let mut signatures = Vec::with_capacity(required);
    for key in signer_keys {
        let signature = if *key == payer_key {
            payer.try_sign_message(&bytes)
        } else {
            batch
                .ephemeral_signers
                .iter()
                .find(|kp| kp.pubkey() == *key)
                .ok_or_else(|| MushiError::Sign(format!("no signer for {}", key)))?
                .try_sign_message(&bytes)
        }
        .map_err(|e| MushiError::Sign(e.to_string()))?;
        signatures.push(signature);
    }

    Ok(VersionedTransaction {
        signatures,
        message,
    })
}

/// A signed transaction and the blockhash it was compiled against.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub label: &'static str,
    pub tx: VersionedTransaction,
    pub blockhash: Hash,
}

impl SignedTransaction {
    pub fn signature(&self) -> Option<&Signature> {
        self.tx.signatures.first()
    }
}

enum Poll {
    Pending,
    /// Blockhash validity could not be read; strikes stay as they are.
    Unknown,
    BlockhashInvalid,
    Done(TxOutcome),
}

pub struct Submitter<R> {
    rpc: Arc<R>,
    config: SubmitterConfig,
}

impl<R: LedgerRpc> Submitter<R> {
    pub fn new(rpc: Arc<R>, config: SubmitterConfig) -> Self {
        Self { rpc, config }
    }

    pub fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    /// Submit and wait for a terminal outcome.
    pub async fn submit(&self, batch: &InstructionBatch, payer: &TxSigner) -> MushiResult<TxOutcome> {
        self.submit_until(batch, payer, std::future::pending()).await
    }

    /// Like [`submit`](Self::submit), but `cancel` resolving while polling
    /// ends the run as [`ExpiryReason::Cancelled`].
    ///
    /// Errors are returned only before broadcast (signing or network); once a
    /// signature exists every path ends in a [`TxOutcome`].
    pub async fn submit_until<C>(
        &self,
        batch: &InstructionBatch,
        payer: &TxSigner,
        cancel: C,
    ) -> MushiResult<TxOutcome>
    where
        C: Future<Output = ()> + Send,
    {
        let signed = self.sign(batch, payer).await?;
        let signature = self.broadcast(&signed).await?;
        Ok(self.confirm(&signed, signature, cancel).await)
    }

    /// Sign `batch` against the latest blockhash.
    pub async fn sign(&self, batch: &InstructionBatch, payer: &TxSigner) -> MushiResult<SignedTransaction> {
        let blockhash = self.rpc.latest_blockhash().await?;
        let tx = sign_transaction(batch, payer, blockhash)?;
        debug!(instruction = batch.label(), %blockhash, "signed");
        Ok(SignedTransaction {
            label: batch.label(),
            tx,
            blockhash,
        })
    }

    /// Send an already-signed transaction. Sending the same one again carries
    /// the same signature, so the ledger applies it at most once.
    pub async fn broadcast(&self, signed: &SignedTransaction) -> MushiResult<Signature> {
        let signature = self.rpc.send_transaction(&signed.tx).await?;
        info!(instruction = signed.label, %signature, "broadcast");
        Ok(signature)
    }

    /// Whether a transaction signed against `blockhash` can still land.
    pub async fn blockhash_valid(&self, blockhash: &Hash) -> MushiResult<bool> {
        self.rpc.is_blockhash_valid(blockhash).await
    }

    /// Poll a broadcast transaction until it reaches a terminal outcome.
    pub async fn confirm<C>(&self, signed: &SignedTransaction, signature: Signature, cancel: C) -> TxOutcome
    where
        C: Future<Output = ()> + Send,
    {
        let (tx, blockhash) = (&signed.tx, signed.blockhash);
        tokio::pin!(cancel);
        let mut strikes = 0u32;

        for poll in 1..=self.config.max_polls {
            let step = async {
                tokio::time::sleep(self.config.poll_interval).await;
                self.poll_once(tx, signature, blockhash, poll).await
            };
            let verdict = tokio::select! {
                biased;
                _ = &mut cancel => {
                    warn!(%signature, poll, "polling cancelled");
                    return TxOutcome::Expired { signature, reason: ExpiryReason::Cancelled };
                }
                verdict = step => verdict,
            };

            match verdict {
                Poll::Done(outcome) => return outcome,
                Poll::Pending => strikes = 0,
                Poll::Unknown => {}
                Poll::BlockhashInvalid => {
                    strikes += 1;
                    debug!(%signature, poll, strikes, "blockhash no longer valid");
                    if strikes >= self.config.expiry_strikes {
                        warn!(%signature, poll, "transaction expired");
                        return TxOutcome::Expired {
                            signature,
                            reason: ExpiryReason::BlockhashExpired,
                        };
                    }
                }
            }
        }

        warn!(%signature, polls = self.config.max_polls, "no status within polling budget");
        TxOutcome::Expired {
            signature,
            reason: ExpiryReason::PollBudgetExhausted,
        }
    }

    async fn poll_once(
        &self,
        tx: &VersionedTransaction,
        signature: Signature,
        blockhash: Hash,
        poll: u32,
    ) -> Poll {
        match self.rpc.signature_status(&signature).await {
            Ok(Some(Ok(()))) => {
                info!(%signature, poll, "confirmed");
                return Poll::Done(TxOutcome::Confirmed {
                    signature,
                    polls: poll,
                });
            }
            Ok(Some(Err(error))) => {
                let report = self.diagnose(tx, error).await;
                warn!(%signature, poll, %report, "transaction failed");
                return Poll::Done(TxOutcome::Failed { signature, report });
            }
            Ok(None) => debug!(%signature, poll, "no status yet"),
            // A lost status read is indistinguishable from "not landed yet".
            Err(e) => debug!(%signature, poll, error = %e, "status poll failed"),
        }

        match self.rpc.is_blockhash_valid(&blockhash).await {
            Ok(false) => Poll::BlockhashInvalid,
            Ok(true) => Poll::Pending,
            Err(e) => {
                debug!(%signature, poll, error = %e, "blockhash check failed");
                Poll::Unknown
            }
        }
    }

    async fn diagnose(&self, tx: &VersionedTransaction, error: TransactionError) -> FailureReport {
        match self.rpc.simulate(tx).await {
            Ok(simulation) => {
                for line in &simulation.logs {
                    debug!(target: "mushi_sdk::simulation", "{}", line);
                }
                FailureReport {
                    error,
                    simulation: Some(simulation),
                    simulation_error: None,
                }
            }
            Err(e) => FailureReport {
                error,
                simulation: None,
                simulation_error: Some(e.to_string()),
            },
        }
    }
}
