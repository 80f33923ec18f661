use solana_sdk::{instruction::AccountMeta, pubkey::Pubkey};

use super::TokenPrograms;
use crate::{
    calendar,
    error::{MushiError, MushiResult},
    pda::{associated_token_address, Pdas},
    state::{GlobalCounters, ProgramConfig},
};

/// Chain state the account lists are resolved from.
#[derive(Debug, Clone)]
pub struct Market {
    pub config: ProgramConfig,
    pub global: GlobalCounters,
    pub pdas: Pdas,
    pub programs: TokenPrograms,
    pub now: i64,
}

/// Accounts shared by every trading and loan instruction, in program order.
pub(crate) struct CommonAccounts {
    pub metas: Vec<AccountMeta>,
    pub today: String,
    pub liquidation_day: String,
}

impl Market {
    pub fn base_mint(&self) -> MushiResult<Pubkey> {
        self.global
            .base_mint()
            .ok_or_else(|| MushiError::invalid_input("base mint not created yet, run start first"))
    }

    pub fn vault_owner(&self) -> Pubkey {
        self.pdas.vault_owner().0
    }

    pub fn base_ata(&self, owner: &Pubkey) -> MushiResult<Pubkey> {
        Ok(associated_token_address(owner, &self.base_mint()?, &self.programs.base))
    }

    pub fn quote_ata(&self, owner: &Pubkey) -> Pubkey {
        associated_token_address(owner, &self.config.quote_token, &self.programs.quote)
    }

    pub(crate) fn common(&self, owner: &Pubkey) -> MushiResult<CommonAccounts> {
        let base_mint = self.base_mint()?;
        let vault_owner = self.vault_owner();
        let today = calendar::day_string(self.now)?;
        let liquidation_day = calendar::day_string(self.global.last_liquidation_date)?;

        let metas = vec![
            AccountMeta::new(*owner, true),
            AccountMeta::new(self.pdas.main_state().0, false),
            AccountMeta::new(self.pdas.global_stats().0, false),
            AccountMeta::new(self.pdas.daily_stats(&today).0, false),
            AccountMeta::new(self.pdas.daily_stats(&liquidation_day).0, false),
            AccountMeta::new(self.pdas.user_loan(owner).0, false),
            AccountMeta::new(self.config.fee_receiver, false),
            AccountMeta::new(base_mint, false),
            AccountMeta::new(self.base_ata(owner)?, false),
            AccountMeta::new(vault_owner, false),
            AccountMeta::new(self.base_ata(&vault_owner)?, false),
            AccountMeta::new(self.config.quote_token, false),
            AccountMeta::new(self.quote_ata(&vault_owner), false),
            AccountMeta::new(self.quote_ata(owner), false),
            AccountMeta::new(self.quote_ata(&self.config.fee_receiver), false),
            AccountMeta::new_readonly(spl_associated_token_account::ID, false),
            AccountMeta::new_readonly(self.programs.base, false),
            AccountMeta::new_readonly(self.programs.quote, false),
            AccountMeta::new_readonly(solana_system_interface::program::ID, false),
        ];

        Ok(CommonAccounts {
            metas,
            today,
            liquidation_day,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(now: i64) -> Market {
        Market {
            config: ProgramConfig {
                admin: Pubkey::new_unique(),
                fee_receiver: Pubkey::new_unique(),
                buy_fee: 975,
                sell_fee: 975,
                buy_fee_leverage: 10,
                quote_token: Pubkey::new_unique(),
                stake_token: Pubkey::default(),
                stake_vault_program: Pubkey::default(),
                stake_enabled: false,
                started: true,
            },
            global: GlobalCounters {
                last_liquidation_date: 1_699_920_000,
                total_borrowed: 0,
                total_collateral: 0,
                total_quote_staked: 0,
                token_supply: 0,
                last_price: 0,
                base_token: Pubkey::new_unique(),
                started: true,
            },
            pdas: Pdas::new(Pubkey::new_unique()),
            programs: TokenPrograms::default(),
            now,
        }
    }

    #[test]
    fn test_common_accounts_order() {
        let market = market(1_700_000_000);
        let owner = Pubkey::new_unique();
        let common = market.common(&owner).unwrap();

        assert_eq!(common.metas.len(), 19);
        assert!(common.metas[0].is_signer && common.metas[0].is_writable);
        assert_eq!(common.metas[0].pubkey, owner);
        assert_eq!(common.metas[3].pubkey, market.pdas.daily_stats("2023-11-14").0);
        assert_eq!(common.metas[4].pubkey, market.pdas.daily_stats("2023-11-14").0);
        assert_eq!(common.metas[5].pubkey, market.pdas.user_loan(&owner).0);
        assert_eq!(common.metas[7].pubkey, market.global.base_token);
        assert!(!common.metas[18].is_writable);
        assert_eq!(common.today, "2023-11-14");
        assert_eq!(common.liquidation_day, "2023-11-14");
    }

    #[test]
    fn test_common_requires_base_mint() {
        let mut market = market(1_700_000_000);
        market.global.base_token = Pubkey::default();
        assert!(matches!(
            market.common(&Pubkey::new_unique()),
            Err(MushiError::InvalidInput(_))
        ));
    }
}
