//! Program schema: seeds, program ids, discriminators, instruction argument
//! layouts and compute budgets. The state reader and the instruction builder
//! both read from this table.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;

use crate::error::{MushiError, MushiResult};

// =============================================================================
// PDA SEEDS
// =============================================================================

/// Seed for ProgramConfig: ["main_state"]
pub const MAIN_STATE_SEED: &[u8] = b"main_state";

/// Seed for GlobalCounters: ["global_stats"]
pub const GLOBAL_STATS_SEED: &[u8] = b"global_stats";

/// Seed for the vault owner PDA that holds the program's token vaults: ["vault"]
pub const VAULT_SEED: &[u8] = b"vault";

/// Seed for UserLoan: ["user-loan", owner]
pub const USER_LOAN_SEED: &[u8] = b"user-loan";

/// Seed for DailyBucket: ["daily-stats", "YYYY-MM-DD"]
pub const DAILY_STATS_SEED: &[u8] = b"daily-stats";

/// Stake vault program state: ["main_state"] under the stake vault program
pub const STAKE_VAULT_STATE_SEED: &[u8] = b"main_state";

/// Stake vault token owner: ["vault_owner"] under the stake vault program
pub const STAKE_VAULT_OWNER_SEED: &[u8] = b"vault_owner";

/// Metaplex metadata: ["metadata", metadata_program, mint]
pub const METADATA_SEED: &[u8] = b"metadata";

// =============================================================================
// PROGRAM IDS
// =============================================================================

/// SPL Token (classic). Owns the base mint.
pub const TOKEN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

/// SPL Token-2022. Owns the quote mint on the reference deployment.
pub const TOKEN_2022_PROGRAM_ID: Pubkey = spl_token_2022::ID;

/// Metaplex token metadata program.
pub const METADATA_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

// =============================================================================
// PROGRAM PARAMETERS
// =============================================================================

/// Fee rates are stored as percent * 100 (9.75 % -> 975).
pub const FEE_SCALE: u64 = 100;
pub const FEE_DECIMALS: u8 = 2;

/// Longest loan term the program accepts, in days.
pub const MAX_LOAN_DAYS: u64 = 365;

// =============================================================================
// DISCRIMINATORS
// =============================================================================

/// Anchor instruction discriminator: sha256("global:{name}")[..8]
pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    discriminator("global", name)
}

/// Anchor account discriminator: sha256("account:{name}")[..8]
pub fn account_discriminator(name: &str) -> [u8; 8] {
    discriminator("account", name)
}

fn discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let preimage = format!("{}:{}", namespace, name);
    let hash = Sha256::digest(preimage.as_bytes());
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&hash[..8]);
    disc
}

// =============================================================================
// INSTRUCTIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramInstruction {
    InitMainState,
    UpdateMainState,
    Start,
    Buy,
    BuyWithReferral,
    Sell,
    Borrow,
    BorrowMore,
    Leverage,
    Repay,
    RemoveCollateral,
    ExtendLoan,
    ClosePosition,
    FlashClosePosition,
    Liquidate,
    Stake,
    Unstake,
}

impl ProgramInstruction {
    pub fn name(self) -> &'static str {
        match self {
            Self::InitMainState => "init_main_state",
            Self::UpdateMainState => "update_main_state",
            Self::Start => "start",
            Self::Buy => "buy",
            Self::BuyWithReferral => "buy_with_referral",
            Self::Sell => "sell",
            Self::Borrow => "borrow",
            Self::BorrowMore => "borrow_more",
            Self::Leverage => "leverage",
            Self::Repay => "repay",
            Self::RemoveCollateral => "remove_collateral",
            Self::ExtendLoan => "extend_loan",
            Self::ClosePosition => "close_position",
            Self::FlashClosePosition => "flash_close_position",
            Self::Liquidate => "liquidate",
            Self::Stake => "stake",
            Self::Unstake => "unstake",
        }
    }

    /// Compute unit limit requested ahead of the instruction.
    pub fn compute_units(self) -> u32 {
        match self {
            Self::InitMainState | Self::Start => 300_000,
            Self::UpdateMainState => 100_000,
            Self::BuyWithReferral | Self::Stake | Self::Unstake => 300_000,
            _ => 150_000,
        }
    }

    pub fn discriminator(self) -> [u8; 8] {
        instruction_discriminator(self.name())
    }

    /// Discriminator followed by the Borsh encoding of `args`.
    pub fn encode<A: BorshSerialize>(self, args: &A) -> MushiResult<Vec<u8>> {
        let body = borsh::to_vec(args)
            .map_err(|e| MushiError::Encode(format!("{} args: {}", self.name(), e)))?;
        let mut data = self.discriminator().to_vec();
        data.extend(body);
        Ok(data)
    }
}

// =============================================================================
// ARGUMENT LAYOUTS
// =============================================================================

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct InitializeArgs {
    pub fee_receiver: Pubkey,
    pub sell_fee: u64,
    pub buy_fee: u64,
    pub buy_fee_leverage: u64,
}

/// Every field is optional; `None` leaves the stored value untouched.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateConfigArgs {
    pub admin: Option<Pubkey>,
    pub fee_receiver: Option<Pubkey>,
    pub sell_fee: Option<u64>,
    pub buy_fee: Option<u64>,
    pub buy_fee_leverage: Option<u64>,
    pub quote_token: Option<Pubkey>,
    pub stake_token: Option<Pubkey>,
    pub stake_vault_program: Option<Pubkey>,
    pub stake_enabled: Option<bool>,
    pub started: Option<bool>,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct StartArgs {
    pub quote_amount: u64,
    pub token_name: String,
    pub token_symbol: String,
    pub token_uri: String,
}
