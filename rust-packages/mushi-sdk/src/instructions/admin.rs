use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    sysvar,
};

use super::{InstructionBatch, InstructionBuilder};
use crate::{
    amount::{self, Asset},
    error::{MushiError, MushiResult},
    pda::{associated_token_address, metadata_address},
    rpc::LedgerRpc,
    schema::{
        InitializeArgs, ProgramInstruction, StartArgs, UpdateConfigArgs, FEE_DECIMALS, FEE_SCALE,
        METADATA_PROGRAM_ID,
    },
    state::ProgramConfig,
};

// Metaplex metadata limits.
const MAX_NAME_LEN: usize = 32;
const MAX_SYMBOL_LEN: usize = 10;
const MAX_URI_LEN: usize = 200;

/// Fee percent string ("9.75") to the stored rate (975).
pub(crate) fn parse_fee(label: &str, input: &str) -> MushiResult<u64> {
    let raw = amount::parse_fixed(input, FEE_DECIMALS)
        .map_err(|e| MushiError::invalid_input(format!("{label}: {e}")))?;
    if raw > 100 * FEE_SCALE {
        return Err(MushiError::invalid_input(format!("{label} above 100%: {input}")));
    }
    Ok(raw)
}

pub(crate) fn check_metadata(name: &str, symbol: &str, uri: &str) -> MushiResult<()> {
    for (field, value, max) in [
        ("token name", name, MAX_NAME_LEN),
        ("token symbol", symbol, MAX_SYMBOL_LEN),
        ("token uri", uri, MAX_URI_LEN),
    ] {
        if value.is_empty() || value.len() > max {
            return Err(MushiError::invalid_input(format!(
                "{field} must be 1..={max} bytes, got {}",
                value.len()
            )));
        }
    }
    Ok(())
}

/// Partial configuration update. Fees are percent strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub admin: Option<Pubkey>,
    pub fee_receiver: Option<Pubkey>,
    pub buy_fee: Option<String>,
    pub sell_fee: Option<String>,
    pub leverage_fee: Option<String>,
    pub quote_token: Option<Pubkey>,
    pub stake_token: Option<Pubkey>,
    pub stake_vault_program: Option<Pubkey>,
    pub stake_enabled: Option<bool>,
    pub started: Option<bool>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn validate(&self) -> MushiResult<()> {
        if self.is_empty() {
            return Err(MushiError::invalid_input("config update changes nothing"));
        }
        self.to_args().map(|_| ())
    }

    pub fn to_args(&self) -> MushiResult<UpdateConfigArgs> {
        let fee = |label: &str, v: &Option<String>| v.as_deref().map(|s| parse_fee(label, s)).transpose();
        Ok(UpdateConfigArgs {
            admin: self.admin,
            fee_receiver: self.fee_receiver,
            sell_fee: fee("sell fee", &self.sell_fee)?,
            buy_fee: fee("buy fee", &self.buy_fee)?,
            buy_fee_leverage: fee("leverage fee", &self.leverage_fee)?,
            quote_token: self.quote_token,
            stake_token: self.stake_token,
            stake_vault_program: self.stake_vault_program,
            stake_enabled: self.stake_enabled,
            started: self.started,
        })
    }
}

impl<R: LedgerRpc> InstructionBuilder<R> {
    pub(crate) async fn initialize(
        &self,
        admin: &Pubkey,
        fee_receiver: &Pubkey,
        quote_mint: &Pubkey,
        buy_fee: &str,
        sell_fee: &str,
        leverage_fee: &str,
    ) -> MushiResult<InstructionBatch> {
        let args = InitializeArgs {
            fee_receiver: *fee_receiver,
            sell_fee: parse_fee("sell fee", sell_fee)?,
            buy_fee: parse_fee("buy fee", buy_fee)?,
            buy_fee_leverage: parse_fee("leverage fee", leverage_fee)?,
        };

        let main_state = self.pdas().main_state().0;
        if self.reader().fetch::<ProgramConfig>(&main_state).await?.is_some() {
            return Err(MushiError::invalid_input("program is already initialised"));
        }

        let ix = ProgramInstruction::InitMainState;
        let mut batch = InstructionBatch::new(ix, *admin);
        batch.instructions.push(Instruction {
            program_id: *self.pdas().program_id(),
            accounts: vec![
                AccountMeta::new(*admin, true),
                AccountMeta::new(self.pdas().global_stats().0, false),
                AccountMeta::new(main_state, false),
                AccountMeta::new_readonly(*quote_mint, false),
                AccountMeta::new_readonly(solana_system_interface::program::ID, false),
            ],
            data: ix.encode(&args)?,
        });
        Ok(batch)
    }

    pub(crate) async fn update_config(
        &self,
        admin: &Pubkey,
        update: &ConfigUpdate,
    ) -> MushiResult<InstructionBatch> {
        let args = update.to_args()?;
        let config = self.reader().config().await?;
        if config.admin != *admin {
            return Err(MushiError::invalid_input(format!(
                "{admin} is not the program admin"
            )));
        }
        let stake_token = args.stake_token.unwrap_or(config.stake_token);
        if stake_token == Pubkey::default() {
            return Err(MushiError::invalid_input(
                "a stake token mint is required to update the config",
            ));
        }

        let ix = ProgramInstruction::UpdateMainState;
        let mut batch = InstructionBatch::new(ix, *admin);
        batch.instructions.push(Instruction {
            program_id: *self.pdas().program_id(),
            accounts: vec![
                AccountMeta::new_readonly(*admin, true),
                AccountMeta::new(self.pdas().main_state().0, false),
                AccountMeta::new_readonly(stake_token, false),
            ],
            data: ix.encode(&args)?,
        });
        Ok(batch)
    }

    /// Creates the base mint with a fresh keypair that co-signs the batch.
    pub(crate) async fn start(
        &self,
        admin: &Pubkey,
        now: i64,
        quote_amount: &str,
        token_name: &str,
        token_symbol: &str,
        token_uri: &str,
    ) -> MushiResult<InstructionBatch> {
        let market = self.market(now).await?;
        if market.global.base_mint().is_some() {
            return Err(MushiError::invalid_input("program has already been started"));
        }
        let args = StartArgs {
            quote_amount: self.units(quote_amount, Asset::Quote, &market).await?,
            token_name: token_name.to_string(),
            token_symbol: token_symbol.to_string(),
            token_uri: token_uri.to_string(),
        };

        let base_mint = Keypair::new();
        let base = base_mint.pubkey();
        let vault_owner = market.vault_owner();
        let programs = market.programs;
        let fee_receiver = market.config.fee_receiver;

        let ix = ProgramInstruction::Start;
        let mut batch = InstructionBatch::new(ix, *admin);
        batch.instructions.push(Instruction {
            program_id: *self.pdas().program_id(),
            accounts: vec![
                AccountMeta::new(*admin, true),
                AccountMeta::new(self.pdas().main_state().0, false),
                AccountMeta::new(self.pdas().global_stats().0, false),
                AccountMeta::new(market.config.quote_token, false),
                AccountMeta::new(market.quote_ata(admin), false),
                AccountMeta::new(base, true),
                AccountMeta::new(metadata_address(&base), false),
                AccountMeta::new(vault_owner, false),
                AccountMeta::new(associated_token_address(&vault_owner, &base, &programs.base), false),
                AccountMeta::new(market.quote_ata(&vault_owner), false),
                AccountMeta::new(fee_receiver, false),
                AccountMeta::new(market.quote_ata(&fee_receiver), false),
                AccountMeta::new_readonly(sysvar::rent::ID, false),
                AccountMeta::new_readonly(METADATA_PROGRAM_ID, false),
                AccountMeta::new_readonly(spl_associated_token_account::ID, false),
                AccountMeta::new_readonly(programs.base, false),
                AccountMeta::new_readonly(programs.quote, false),
                AccountMeta::new_readonly(solana_system_interface::program::ID, false),
            ],
            data: ix.encode(&args)?,
        });
        batch.ephemeral_signers.push(base_mint);
        Ok(batch)
    }
}
