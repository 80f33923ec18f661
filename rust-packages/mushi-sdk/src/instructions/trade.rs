use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;

use super::{InstructionBatch, InstructionBuilder};
use crate::{
    amount::Asset,
    error::{MushiError, MushiResult},
    rpc::LedgerRpc,
    schema::ProgramInstruction,
};

impl<R: LedgerRpc> InstructionBuilder<R> {
    /// Buy base tokens with quote tokens. With a referral the referral's quote
    /// token account is created in the same batch if it does not exist.
    pub(crate) async fn buy(
        &self,
        owner: &Pubkey,
        quote_amount: &str,
        referral: Option<&Pubkey>,
        now: i64,
    ) -> MushiResult<InstructionBatch> {
        if referral == Some(owner) {
            return Err(MushiError::invalid_input("cannot refer yourself"));
        }
        let market = self.market(now).await?;
        let amount = self.units(quote_amount, Asset::Quote, &market).await?;
        let common = market.common(owner)?;

        let ix = match referral {
            Some(_) => ProgramInstruction::BuyWithReferral,
            None => ProgramInstruction::Buy,
        };
        let mut batch = InstructionBatch::new(ix, *owner);
        batch.days = vec![common.today, common.liquidation_day];
        let mut accounts = common.metas;

        let data = match referral {
            Some(referral) => {
                let quote_mint = market.config.quote_token;
                batch.instructions.push(create_associated_token_account_idempotent(
                    owner,
                    referral,
                    &quote_mint,
                    &market.programs.quote,
                ));
                accounts.extend([
                    AccountMeta::new(*referral, false),
                    AccountMeta::new(market.quote_ata(referral), false),
                    AccountMeta::new_readonly(market.programs.quote, false),
                    AccountMeta::new_readonly(spl_associated_token_account::ID, false),
                    AccountMeta::new_readonly(solana_system_interface::program::ID, false),
                ]);
                ix.encode(&(*referral, amount))?
            }
            None => ix.encode(&amount)?,
        };

        batch.instructions.push(Instruction {
            program_id: *self.pdas().program_id(),
            accounts,
            data,
        });
        Ok(batch)
    }

    pub(crate) async fn sell(
        &self,
        owner: &Pubkey,
        base_amount: &str,
        now: i64,
    ) -> MushiResult<InstructionBatch> {
        let market = self.market(now).await?;
        let amount = self.units(base_amount, Asset::Base, &market).await?;
        let common = market.common(owner)?;

        let ix = ProgramInstruction::Sell;
        let mut batch = InstructionBatch::new(ix, *owner);
        batch.days = vec![common.today, common.liquidation_day];
        batch.instructions.push(Instruction {
            program_id: *self.pdas().program_id(),
            accounts: common.metas,
            data: ix.encode(&amount)?,
        });
        Ok(batch)
    }

    /// Settle expired loans up to today. Anyone may call it.
    pub(crate) async fn liquidate(&self, owner: &Pubkey, now: i64) -> MushiResult<InstructionBatch> {
        let market = self.market(now).await?;
        let common = market.common(owner)?;

        let ix = ProgramInstruction::Liquidate;
        let mut batch = InstructionBatch::new(ix, *owner);
        batch.days = vec![common.today, common.liquidation_day];
        batch.instructions.push(Instruction {
            program_id: *self.pdas().program_id(),
            accounts: common.metas,
            data: ix.encode(&())?,
        });
        Ok(batch)
    }
}
