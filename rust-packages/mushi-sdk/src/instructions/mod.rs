//! Instruction builders, one per business operation.
//!
//! Every builder validates its inputs before touching the network, resolves
//! the accounts the program expects (including the daily buckets keyed by
//! calendar day), converts decimal amounts with the asset's own scale and
//! returns an ordered [`InstructionBatch`] headed by a compute-unit limit.

use std::fmt;

use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use tracing::debug;

use crate::{
    amount::{self, Asset, AssetScales},
    error::{MushiError, MushiResult},
    pda::Pdas,
    reader::StateReader,
    rpc::LedgerRpc,
    schema::{ProgramInstruction, MAX_LOAN_DAYS, TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID},
};

mod accounts;
mod admin;
mod loan;
mod staking;
mod trade;

pub use accounts::Market;
pub use admin::ConfigUpdate;
pub use loan::maturity_day;

/// Token programs owning the two mints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPrograms {
    pub base: Pubkey,
    pub quote: Pubkey,
}

impl Default for TokenPrograms {
    fn default() -> Self {
        Self {
            base: TOKEN_PROGRAM_ID,
            quote: TOKEN_2022_PROGRAM_ID,
        }
    }
}

/// A business operation with caller-facing inputs. Amounts are decimal
/// strings in whole units of the named asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Initialize {
        fee_receiver: Pubkey,
        quote_mint: Pubkey,
        buy_fee: String,
        sell_fee: String,
        leverage_fee: String,
    },
    UpdateConfig(ConfigUpdate),
    Start {
        quote_amount: String,
        token_name: String,
        token_symbol: String,
        token_uri: String,
    },
    Buy {
        quote_amount: String,
        referral: Option<Pubkey>,
    },
    Sell {
        base_amount: String,
    },
    Borrow {
        quote_amount: String,
        days: u64,
    },
    BorrowMore {
        quote_amount: String,
    },
    Leverage {
        quote_amount: String,
        days: u64,
    },
    ExtendLoan {
        days: u64,
    },
    Repay {
        quote_amount: String,
    },
    RemoveCollateral {
        base_amount: String,
    },
    ClosePosition {
        quote_amount: String,
    },
    FlashClosePosition,
    Liquidate,
    Stake {
        base_amount: String,
    },
    Unstake {
        base_amount: String,
    },
}

impl Operation {
    pub fn instruction(&self) -> ProgramInstruction {
        match self {
            Self::Initialize { .. } => ProgramInstruction::InitMainState,
            Self::UpdateConfig(_) => ProgramInstruction::UpdateMainState,
            Self::Start { .. } => ProgramInstruction::Start,
            Self::Buy { referral: None, .. } => ProgramInstruction::Buy,
            Self::Buy { referral: Some(_), .. } => ProgramInstruction::BuyWithReferral,
            Self::Sell { .. } => ProgramInstruction::Sell,
            Self::Borrow { .. } => ProgramInstruction::Borrow,
            Self::BorrowMore { .. } => ProgramInstruction::BorrowMore,
            Self::Leverage { .. } => ProgramInstruction::Leverage,
            Self::ExtendLoan { .. } => ProgramInstruction::ExtendLoan,
            Self::Repay { .. } => ProgramInstruction::Repay,
            Self::RemoveCollateral { .. } => ProgramInstruction::RemoveCollateral,
            Self::ClosePosition { .. } => ProgramInstruction::ClosePosition,
            Self::FlashClosePosition => ProgramInstruction::FlashClosePosition,
            Self::Liquidate => ProgramInstruction::Liquidate,
            Self::Stake { .. } => ProgramInstruction::Stake,
            Self::Unstake { .. } => ProgramInstruction::Unstake,
        }
    }

    /// True when the operation changes the caller's loan record.
    pub fn changes_loan(&self) -> bool {
        matches!(
            self,
            Self::Borrow { .. }
                | Self::BorrowMore { .. }
                | Self::Leverage { .. }
                | Self::ExtendLoan { .. }
                | Self::Repay { .. }
                | Self::RemoveCollateral { .. }
                | Self::ClosePosition { .. }
                | Self::FlashClosePosition
        )
    }

    /// Input checks that need no chain state.
    pub fn validate(&self) -> MushiResult<()> {
        match self {
            Self::Initialize {
                buy_fee,
                sell_fee,
                leverage_fee,
                ..
            } => {
                admin::parse_fee("buy fee", buy_fee)?;
                admin::parse_fee("sell fee", sell_fee)?;
                admin::parse_fee("leverage fee", leverage_fee)?;
                Ok(())
            }
            Self::UpdateConfig(update) => update.validate(),
            Self::Start {
                quote_amount,
                token_name,
                token_symbol,
                token_uri,
            } => {
                amount::check_positive(quote_amount)?;
                admin::check_metadata(token_name, token_symbol, token_uri)
            }
            Self::Borrow { quote_amount, days } | Self::Leverage { quote_amount, days } => {
                amount::check_positive(quote_amount)?;
                check_term(*days)
            }
            Self::ExtendLoan { days } => check_term(*days),
            Self::Buy { quote_amount, .. }
            | Self::BorrowMore { quote_amount }
            | Self::Repay { quote_amount }
            | Self::ClosePosition { quote_amount } => amount::check_positive(quote_amount),
            Self::Sell { base_amount }
            | Self::RemoveCollateral { base_amount }
            | Self::Stake { base_amount }
            | Self::Unstake { base_amount } => amount::check_positive(base_amount),
            Self::FlashClosePosition | Self::Liquidate => Ok(()),
        }
    }
}

pub(crate) fn check_term(days: u64) -> MushiResult<()> {
    if days == 0 || days > MAX_LOAN_DAYS {
        return Err(MushiError::invalid_input(format!(
            "loan term must be 1..={MAX_LOAN_DAYS} days, got {days}"
        )));
    }
    Ok(())
}

/// Ordered instructions for one transaction plus any extra signers the batch
/// needs besides the payer.
pub struct InstructionBatch {
    pub instruction: ProgramInstruction,
    pub payer: Pubkey,
    pub instructions: Vec<Instruction>,
    pub ephemeral_signers: Vec<Keypair>,
    /// Daily bucket keys the batch references, in account order.
    pub days: Vec<String>,
}

impl InstructionBatch {
    pub fn new(instruction: ProgramInstruction, payer: Pubkey) -> Self {
        Self {
            instruction,
            payer,
            instructions: vec![ComputeBudgetInstruction::set_compute_unit_limit(
                instruction.compute_units(),
            )],
            ephemeral_signers: Vec::new(),
            days: Vec::new(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.instruction.name()
    }

    /// The program instruction, always last in the batch.
    pub fn program_instruction(&self) -> Option<&Instruction> {
        self.instructions.last()
    }
}

impl fmt::Debug for InstructionBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstructionBatch")
            .field("instruction", &self.instruction.name())
            .field("payer", &self.payer)
            .field("instructions", &self.instructions.len())
            .field(
                "ephemeral_signers",
                &self
                    .ephemeral_signers
                    .iter()
                    .map(|k| k.pubkey())
                    .collect::<Vec<_>>(),
            )
            .field("days", &self.days)
            .finish()
    }
}

pub struct InstructionBuilder<R> {
    reader: StateReader<R>,
    programs: TokenPrograms,
    scales: Option<AssetScales>,
}

impl<R: LedgerRpc> InstructionBuilder<R> {
    /// `scales` overrides mint decimals; when `None` they are read from the
    /// mints on every build.
    pub fn new(reader: StateReader<R>, programs: TokenPrograms, scales: Option<AssetScales>) -> Self {
        Self {
            reader,
            programs,
            scales,
        }
    }

    pub fn reader(&self) -> &StateReader<R> {
        &self.reader
    }

    pub fn pdas(&self) -> &Pdas {
        self.reader.pdas()
    }

    /// Build the batch for `op` signed by `owner` at unix time `now`.
    pub async fn build(&self, op: &Operation, owner: &Pubkey, now: i64) -> MushiResult<InstructionBatch> {
        op.validate()?;
        let batch = match op {
            Operation::Initialize {
                fee_receiver,
                quote_mint,
                buy_fee,
                sell_fee,
                leverage_fee,
            } => {
                self.initialize(owner, fee_receiver, quote_mint, buy_fee, sell_fee, leverage_fee)
                    .await?
            }
            Operation::UpdateConfig(update) => self.update_config(owner, update).await?,
            Operation::Start {
                quote_amount,
                token_name,
                token_symbol,
                token_uri,
            } => {
                self.start(owner, now, quote_amount, token_name, token_symbol, token_uri)
                    .await?
            }
            Operation::Buy {
                quote_amount,
                referral,
            } => self.buy(owner, quote_amount, referral.as_ref(), now).await?,
            Operation::Sell { base_amount } => self.sell(owner, base_amount, now).await?,
            Operation::Borrow { quote_amount, days } => {
                self.open_loan(ProgramInstruction::Borrow, owner, quote_amount, *days, now)
                    .await?
            }
            Operation::Leverage { quote_amount, days } => {
                self.open_loan(ProgramInstruction::Leverage, owner, quote_amount, *days, now)
                    .await?
            }
            Operation::BorrowMore { quote_amount } => {
                self.adjust_loan(ProgramInstruction::BorrowMore, owner, Some((quote_amount.as_str(), Asset::Quote)), now)
                    .await?
            }
            Operation::Repay { quote_amount } => {
                self.adjust_loan(ProgramInstruction::Repay, owner, Some((quote_amount.as_str(), Asset::Quote)), now)
                    .await?
            }
            Operation::RemoveCollateral { base_amount } => {
                self.adjust_loan(
                    ProgramInstruction::RemoveCollateral,
                    owner,
                    Some((base_amount.as_str(), Asset::Base)),
                    now,
                )
                .await?
            }
            Operation::ClosePosition { quote_amount } => {
                self.adjust_loan(ProgramInstruction::ClosePosition, owner, Some((quote_amount.as_str(), Asset::Quote)), now)
                    .await?
            }
            Operation::FlashClosePosition => {
                self.adjust_loan(ProgramInstruction::FlashClosePosition, owner, None, now)
                    .await?
            }
            Operation::ExtendLoan { days } => self.extend_loan(owner, *days, now).await?,
            Operation::Liquidate => self.liquidate(owner, now).await?,
            Operation::Stake { base_amount } => self.stake(owner, base_amount, now).await?,
            Operation::Unstake { base_amount } => self.unstake(owner, base_amount, now).await?,
        };
        debug!(
            instruction = batch.label(),
            %owner,
            days = ?batch.days,
            "built instruction batch"
        );
        Ok(batch)
    }

    /// Config and counters the account lists are resolved from.
    pub async fn market(&self, now: i64) -> MushiResult<Market> {
        let (config, global) = tokio::try_join!(self.reader.config(), self.reader.global())?;
        Ok(Market {
            config,
            global,
            pdas: *self.pdas(),
            programs: self.programs,
            now,
        })
    }

    pub(crate) async fn decimals(&self, asset: Asset, market: &Market) -> MushiResult<u8> {
        if let Some(scales) = self.scales {
            return Ok(scales.of(asset));
        }
        let mint = match asset {
            Asset::Base => market.base_mint()?,
            Asset::Quote => market.config.quote_token,
        };
        self.reader.mint_decimals(&mint).await
    }

    pub(crate) async fn units(&self, input: &str, asset: Asset, market: &Market) -> MushiResult<u64> {
        let decimals = self.decimals(asset, market).await?;
        amount::parse_amount(input, decimals)
    }
}
