use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    sysvar,
};

use super::{InstructionBatch, InstructionBuilder, Market};
use crate::{
    amount::Asset,
    error::{MushiError, MushiResult},
    pda::{associated_token_address, stake_vault_owner, stake_vault_state},
    rpc::LedgerRpc,
    schema::ProgramInstruction,
};

/// Accounts of the external stake vault program.
struct StakeVault {
    program: Pubkey,
    state: Pubkey,
    owner: Pubkey,
    stake_mint: Pubkey,
}

impl StakeVault {
    fn resolve(market: &Market) -> MushiResult<Self> {
        let (stake_mint, program) = market.config.staking().ok_or_else(|| {
            MushiError::invalid_input("stake token or stake vault program not configured")
        })?;
        Ok(Self {
            program,
            state: stake_vault_state(&program),
            owner: stake_vault_owner(&program),
            stake_mint,
        })
    }
}

impl<R: LedgerRpc> InstructionBuilder<R> {
    pub(crate) async fn stake(
        &self,
        owner: &Pubkey,
        base_amount: &str,
        now: i64,
    ) -> MushiResult<InstructionBatch> {
        let market = self.market(now).await?;
        let vault = StakeVault::resolve(&market)?;
        let amount = self.units(base_amount, Asset::Base, &market).await?;
        let base_mint = market.base_mint()?;
        let quote_mint = market.config.quote_token;
        let programs = market.programs;

        let ix = ProgramInstruction::Stake;
        let mut batch = InstructionBatch::new(ix, *owner);
        batch.instructions.push(Instruction {
            program_id: *self.pdas().program_id(),
            accounts: vec![
                AccountMeta::new(*owner, true),
                AccountMeta::new(vault.state, false),
                AccountMeta::new(self.pdas().global_stats().0, false),
                AccountMeta::new(self.pdas().main_state().0, false),
                AccountMeta::new(market.base_ata(owner)?, false),
                AccountMeta::new(market.quote_ata(owner), false),
                AccountMeta::new(associated_token_address(owner, &vault.stake_mint, &programs.base), false),
                AccountMeta::new(associated_token_address(&vault.owner, &base_mint, &programs.base), false),
                AccountMeta::new(base_mint, false),
                AccountMeta::new(associated_token_address(&vault.owner, &quote_mint, &programs.quote), false),
                AccountMeta::new(quote_mint, false),
                AccountMeta::new(vault.stake_mint, false),
                AccountMeta::new(vault.owner, false),
                AccountMeta::new_readonly(vault.program, false),
                AccountMeta::new_readonly(programs.base, false),
                AccountMeta::new_readonly(programs.quote, false),
                AccountMeta::new_readonly(solana_system_interface::program::ID, false),
                AccountMeta::new_readonly(spl_associated_token_account::ID, false),
            ],
            data: ix.encode(&amount)?,
        });
        Ok(batch)
    }

    pub(crate) async fn unstake(
        &self,
        owner: &Pubkey,
        base_amount: &str,
        now: i64,
    ) -> MushiResult<InstructionBatch> {
        let market = self.market(now).await?;
        let vault = StakeVault::resolve(&market)?;
        let amount = self.units(base_amount, Asset::Base, &market).await?;
        let base_mint = market.base_mint()?;
        let quote_mint = market.config.quote_token;
        let programs = market.programs;
        let program_vault_owner = market.vault_owner();

        let ix = ProgramInstruction::Unstake;
        let mut batch = InstructionBatch::new(ix, *owner);
        batch.instructions.push(Instruction {
            program_id: *self.pdas().program_id(),
            accounts: vec![
                AccountMeta::new(*owner, true),
                AccountMeta::new_readonly(sysvar::instructions::ID, false),
                AccountMeta::new(vault.state, false),
                AccountMeta::new(self.pdas().global_stats().0, false),
                AccountMeta::new(self.pdas().main_state().0, false),
                AccountMeta::new(market.base_ata(owner)?, false),
                AccountMeta::new(associated_token_address(owner, &vault.stake_mint, &programs.base), false),
                AccountMeta::new(associated_token_address(&vault.owner, &base_mint, &programs.base), false),
                AccountMeta::new(base_mint, false),
                AccountMeta::new(associated_token_address(&vault.owner, &quote_mint, &programs.quote), false),
                AccountMeta::new(market.quote_ata(&program_vault_owner), false),
                AccountMeta::new(quote_mint, false),
                AccountMeta::new(vault.stake_mint, false),
                AccountMeta::new(vault.owner, false),
                AccountMeta::new(program_vault_owner, false),
                AccountMeta::new_readonly(vault.program, false),
                AccountMeta::new_readonly(programs.base, false),
                AccountMeta::new_readonly(programs.quote, false),
                AccountMeta::new_readonly(solana_system_interface::program::ID, false),
                AccountMeta::new_readonly(spl_associated_token_account::ID, false),
            ],
            data: ix.encode(&amount)?,
        });
        Ok(batch)
    }
}
