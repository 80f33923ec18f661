use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use super::{InstructionBatch, InstructionBuilder};
use crate::{
    amount::Asset,
    calendar::{self, SECONDS_PER_DAY},
    error::{MushiError, MushiResult},
    rpc::LedgerRpc,
    schema::{ProgramInstruction, MAX_LOAN_DAYS},
    state::{ProgramAccount, UserLoan},
};

/// Bucket a new loan of `days` taken at `now` matures in. The program counts
/// the day of borrowing as day zero, so maturity lands one day after the term.
pub fn maturity_day(now: i64, days: u64) -> MushiResult<String> {
    calendar::day_string_after(now, days.saturating_add(1))
}

impl<R: LedgerRpc> InstructionBuilder<R> {
    /// The owner's open loan. A record left behind with nothing borrowed
    /// counts as no loan.
    async fn existing_loan(&self, owner: &Pubkey) -> MushiResult<UserLoan> {
        let address = self.pdas().user_loan(owner).0;
        let loan: UserLoan = self.reader().require(&address).await?;
        if !loan.is_open() {
            return Err(MushiError::AccountNotFound {
                kind: UserLoan::NAME,
                address,
            });
        }
        Ok(loan)
    }

    /// `borrow` and `leverage`: open a loan maturing `days` after today.
    pub(crate) async fn open_loan(
        &self,
        ix: ProgramInstruction,
        owner: &Pubkey,
        quote_amount: &str,
        days: u64,
        now: i64,
    ) -> MushiResult<InstructionBatch> {
        let market = self.market(now).await?;
        let amount = self.units(quote_amount, Asset::Quote, &market).await?;
        let common = market.common(owner)?;
        let end_day = maturity_day(now, days)?;

        let mut accounts = common.metas;
        accounts.extend([
            AccountMeta::new(*owner, true),
            AccountMeta::new(self.pdas().daily_stats(&end_day).0, false),
            AccountMeta::new_readonly(solana_system_interface::program::ID, false),
        ]);

        let mut batch = InstructionBatch::new(ix, *owner);
        batch.days = vec![common.today, common.liquidation_day, end_day];
        batch.instructions.push(Instruction {
            program_id: *self.pdas().program_id(),
            accounts,
            data: ix.encode(&(days, amount))?,
        });
        Ok(batch)
    }

    /// Instructions that act on the current loan and touch its maturity
    /// bucket: `borrow_more`, `repay`, `remove_collateral`, `close_position`
    /// and `flash_close_position`.
    pub(crate) async fn adjust_loan(
        &self,
        ix: ProgramInstruction,
        owner: &Pubkey,
        amount: Option<(&str, Asset)>,
        now: i64,
    ) -> MushiResult<InstructionBatch> {
        let (market, loan) = tokio::try_join!(self.market(now), self.existing_loan(owner))?;
        let raw = match amount {
            Some((input, asset)) => Some(self.units(input, asset, &market).await?),
            None => None,
        };
        let common = market.common(owner)?;
        let old_end_day = calendar::day_string(loan.end_date)?;

        let mut accounts = common.metas;
        accounts.push(AccountMeta::new(self.pdas().daily_stats(&old_end_day).0, false));

        let mut batch = InstructionBatch::new(ix, *owner);
        batch.days = vec![common.today, common.liquidation_day, old_end_day];
        batch.instructions.push(Instruction {
            program_id: *self.pdas().program_id(),
            accounts,
            data: match raw {
                Some(raw) => ix.encode(&raw)?,
                None => ix.encode(&())?,
            },
        });
        Ok(batch)
    }

    /// Push the loan's maturity `days` further out. The new bucket is derived
    /// from the stored end date, never fetched.
    pub(crate) async fn extend_loan(
        &self,
        owner: &Pubkey,
        days: u64,
        now: i64,
    ) -> MushiResult<InstructionBatch> {
        let (market, loan) = tokio::try_join!(self.market(now), self.existing_loan(owner))?;

        let extra = i64::try_from(days)
            .ok()
            .and_then(|d| d.checked_mul(SECONDS_PER_DAY))
            .ok_or_else(|| MushiError::invalid_input(format!("{days} days is out of range")))?;
        let new_end = loan.end_date.saturating_add(extra);
        let remaining_days = (new_end - now) / SECONDS_PER_DAY;
        if remaining_days > MAX_LOAN_DAYS as i64 {
            return Err(MushiError::invalid_input(format!(
                "extended loan would run {remaining_days} days, limit is {MAX_LOAN_DAYS}"
            )));
        }

        let common = market.common(owner)?;
        let old_end_day = calendar::day_string(loan.end_date)?;
        let new_end_day = calendar::day_string(new_end)?;

        let mut accounts = common.metas;
        accounts.extend([
            AccountMeta::new(*owner, true),
            AccountMeta::new(self.pdas().daily_stats(&old_end_day).0, false),
            AccountMeta::new(self.pdas().daily_stats(&new_end_day).0, false),
            AccountMeta::new_readonly(solana_system_interface::program::ID, false),
        ]);

        let ix = ProgramInstruction::ExtendLoan;
        let mut batch = InstructionBatch::new(ix, *owner);
        batch.days = vec![common.today, common.liquidation_day, old_end_day, new_end_day];
        batch.instructions.push(Instruction {
            program_id: *self.pdas().program_id(),
            accounts,
            data: ix.encode(&days)?,
        });
        Ok(batch)
    }
}
