//! Submitter state machine against a scripted ledger.
//!
//! Run with: `cargo test --package mushi-sdk --test submitter`
//!
//! Time is paused, so the 2 s poll interval costs nothing.

mod common;

use std::{sync::atomic::Ordering, sync::Arc, time::Duration};

use common::{failed_status, FakeLedger};
use mushi_sdk::{
    schema::ProgramInstruction, ExpiryReason, InstructionBatch, MushiError, Submitter,
    SubmitterConfig, TxOutcome,
};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::TransactionError,
};

fn setup() -> (Arc<FakeLedger>, Submitter<FakeLedger>, Keypair) {
    let ledger = Arc::new(FakeLedger::new(Pubkey::new_unique()));
    let submitter = Submitter::new(Arc::clone(&ledger), SubmitterConfig::default());
    (ledger, submitter, Keypair::new())
}

fn batch(ledger: &FakeLedger, payer: &Keypair) -> InstructionBatch {
    let mut batch = InstructionBatch::new(ProgramInstruction::Borrow, payer.pubkey());
    batch.instructions.push(Instruction {
        program_id: ledger.program_id,
        accounts: vec![AccountMeta::new(payer.pubkey(), true)],
        data: ProgramInstruction::Borrow.encode(&(7u64, 1_000_000u64)).unwrap(),
    });
    batch
}

#[tokio::test(start_paused = true)]
async fn test_error_status_fails_with_diagnostic_and_stops_polling() {
    let (ledger, submitter, payer) = setup();
    ledger.script_statuses([Ok(None), Ok(None), failed_status(), Ok(Some(Ok(())))]);

    let outcome = submitter.submit(&batch(&ledger, &payer), &payer).await.unwrap();

    let TxOutcome::Failed { report, .. } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(report.error, TransactionError::AccountNotFound);
    let simulation = report.simulation.expect("diagnostic simulation");
    assert_eq!(simulation.logs.len(), 2);
    assert!(report.simulation_error.is_none());
    assert_eq!(ledger.status_polls.load(Ordering::SeqCst), 3);
    assert_eq!(ledger.simulations.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_two_invalid_blockhash_strikes_expire() {
    let (ledger, submitter, payer) = setup();
    ledger.script_blockhash_validity([false, false]);

    let outcome = submitter.submit(&batch(&ledger, &payer), &payer).await.unwrap();

    assert!(matches!(
        outcome,
        TxOutcome::Expired {
            reason: ExpiryReason::BlockhashExpired,
            ..
        }
    ));
    assert_eq!(ledger.status_polls.load(Ordering::SeqCst), 2);
    assert_eq!(ledger.blockhash_checks.load(Ordering::SeqCst), 2);
    assert_eq!(ledger.simulations.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_valid_blockhash_resets_strikes() {
    let (ledger, submitter, payer) = setup();
    ledger.script_blockhash_validity([false, true, false, true]);
    ledger.script_statuses([Ok(None), Ok(None), Ok(None), Ok(None), Ok(Some(Ok(())))]);

    let outcome = submitter.submit(&batch(&ledger, &payer), &payer).await.unwrap();

    assert!(matches!(outcome, TxOutcome::Confirmed { polls: 5, .. }), "{outcome:?}");
}

#[tokio::test(start_paused = true)]
async fn test_confirms_after_poll_interval() {
    let (ledger, submitter, payer) = setup();
    ledger.script_statuses([Ok(None), Ok(None), Ok(Some(Ok(())))]);

    let started = tokio::time::Instant::now();
    let outcome = submitter.submit(&batch(&ledger, &payer), &payer).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(6));
    let signature = *outcome.signature();
    assert_eq!(outcome.into_result().unwrap(), signature);
    assert_eq!(ledger.sent_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_poll_transport_error_counts_as_no_status() {
    let (ledger, submitter, payer) = setup();
    ledger.script_statuses([Err(MushiError::Rpc("timeout".into())), Ok(Some(Ok(())))]);

    let outcome = submitter.submit(&batch(&ledger, &payer), &payer).await.unwrap();

    assert!(matches!(outcome, TxOutcome::Confirmed { polls: 2, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_poll_budget_exhausted() {
    let (ledger, submitter, payer) = setup();

    let outcome = submitter.submit(&batch(&ledger, &payer), &payer).await.unwrap();

    assert!(matches!(
        outcome,
        TxOutcome::Expired {
            reason: ExpiryReason::PollBudgetExhausted,
            ..
        }
    ));
    assert_eq!(ledger.status_polls.load(Ordering::SeqCst), 50);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_expires_immediately() {
    let (ledger, submitter, payer) = setup();

    let cancel = tokio::time::sleep(Duration::from_secs(5));
    let outcome = submitter
        .submit_until(&batch(&ledger, &payer), &payer, cancel)
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        TxOutcome::Expired {
            reason: ExpiryReason::Cancelled,
            ..
        }
    ));
    assert_eq!(ledger.status_polls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_error_is_returned_before_polling() {
    let (ledger, submitter, payer) = setup();
    ledger.fail_next_sends(1);

    let err = submitter.submit(&batch(&ledger, &payer), &payer).await.unwrap_err();

    assert!(matches!(err, MushiError::Rpc(_)));
    assert!(err.is_retryable());
    assert_eq!(ledger.status_polls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wrong_signer_never_broadcasts() {
    let (ledger, submitter, payer) = setup();
    let stranger = Keypair::new();

    let err = submitter.submit(&batch(&ledger, &payer), &stranger).await.unwrap_err();

    assert!(matches!(err, MushiError::Sign(_)));
    assert_eq!(ledger.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resend_keeps_signature_and_blockhash() {
    let (ledger, submitter, payer) = setup();
    ledger.fail_next_sends(1);
    ledger.script_statuses([Ok(Some(Ok(())))]);

    let signed = submitter.sign(&batch(&ledger, &payer), &payer).await.unwrap();
    assert!(submitter.broadcast(&signed).await.is_err());
    assert!(submitter.blockhash_valid(&signed.blockhash).await.unwrap());
    let signature = submitter.broadcast(&signed).await.unwrap();

    assert_eq!(Some(&signature), signed.signature());
    assert_eq!(*ledger.attempts.lock().unwrap(), vec![signature, signature]);
    let outcome = submitter.confirm(&signed, signature, std::future::pending()).await;
    assert!(matches!(outcome, TxOutcome::Confirmed { polls: 1, .. }));
}
