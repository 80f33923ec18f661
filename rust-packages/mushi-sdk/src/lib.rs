//! # mushi-sdk
//!
//! Rust client engine for the **Mushi** lending program on Solana.
//!
//! Builds, signs, submits and confirms transactions for every program
//! instruction, and reads the program's accounts back.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mushi_sdk::{ClientConfig, MushiClient};
//! use solana_sdk::signature::read_keypair_file;
//!
//! let client = MushiClient::new(ClientConfig::new(rpc_url, program_id))?;
//! let payer = read_keypair_file("id.json")?;
//! let receipt = client.borrow(&payer, "1.5", 7).await?;
//! println!("{} -> {:?}", receipt.signature, receipt.loan);
//! ```

pub mod amount;
pub mod calendar;
pub mod client;
pub mod error;
pub mod instructions;
pub mod pda;
pub mod reader;
pub mod rpc;
pub mod schema;
pub mod state;
pub mod submitter;

pub use amount::{Asset, AssetScales};
pub use client::{ClientConfig, MushiClient, Receipt};
pub use error::{MushiError, MushiResult};
pub use instructions::{ConfigUpdate, InstructionBatch, InstructionBuilder, Operation, TokenPrograms};
pub use pda::Pdas;
pub use reader::StateReader;
pub use rpc::{LedgerRpc, SignatureStatus, SimulationReport, SolanaRpc};
pub use state::{DailyBucket, GlobalCounters, ProgramAccount, ProgramConfig, UserLoan};
pub use submitter::{
    ExpiryReason, FailureReport, SignedTransaction, Submitter, SubmitterConfig, TxOutcome, TxSigner,
};
