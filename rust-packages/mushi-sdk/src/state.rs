//! Decoded program accounts.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

use crate::{
    error::{MushiError, MushiResult},
    schema::{account_discriminator, FEE_SCALE},
};

/// A program account stored as an 8-byte discriminator followed by Borsh
/// fields. Trailing bytes after the fields are allowed.
pub trait ProgramAccount: BorshSerialize + BorshDeserialize + Sized {
    /// Account type name as declared by the program.
    const NAME: &'static str;

    fn discriminator() -> [u8; 8] {
        account_discriminator(Self::NAME)
    }

    fn decode(address: &Pubkey, data: &[u8]) -> MushiResult<Self> {
        let decode_err = |reason: String| MushiError::Decode {
            kind: Self::NAME,
            address: *address,
            reason,
        };
        if data.len() < 8 {
            return Err(decode_err(format!("{} bytes is shorter than a discriminator", data.len())));
        }
        if data[..8] != Self::discriminator() {
            return Err(decode_err("discriminator mismatch".into()));
        }
        let mut body = &data[8..];
        Self::deserialize(&mut body).map_err(|e| decode_err(e.to_string()))
    }

    /// Account data as the program writes it, without padding.
    fn encode(&self) -> MushiResult<Vec<u8>> {
        let body =
            borsh::to_vec(self).map_err(|e| MushiError::Encode(format!("{}: {}", Self::NAME, e)))?;
        let mut data = Self::discriminator().to_vec();
        data.extend(body);
        Ok(data)
    }
}

/// Program-wide configuration (`MainState`).
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProgramConfig {
    pub admin: Pubkey,
    pub fee_receiver: Pubkey,
    pub buy_fee: u64,
    pub sell_fee: u64,
    pub buy_fee_leverage: u64,
    pub quote_token: Pubkey,
    pub stake_token: Pubkey,
    pub stake_vault_program: Pubkey,
    pub stake_enabled: bool,
    pub started: bool,
}

impl ProgramAccount for ProgramConfig {
    const NAME: &'static str = "MainState";
}

impl ProgramConfig {
    pub fn buy_fee_percent(&self) -> String {
        fee_percent(self.buy_fee)
    }

    pub fn sell_fee_percent(&self) -> String {
        fee_percent(self.sell_fee)
    }

    pub fn leverage_fee_percent(&self) -> String {
        fee_percent(self.buy_fee_leverage)
    }

    /// Stake token and stake vault program, when both are configured.
    pub fn staking(&self) -> Option<(Pubkey, Pubkey)> {
        let unset = Pubkey::default();
        if self.stake_token == unset || self.stake_vault_program == unset {
            return None;
        }
        Some((self.stake_token, self.stake_vault_program))
    }
}

/// Program-wide counters (`GlobalStats`).
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct GlobalCounters {
    pub last_liquidation_date: i64,
    pub total_borrowed: u64,
    pub total_collateral: u64,
    pub total_quote_staked: u64,
    pub token_supply: u64,
    pub last_price: u64,
    pub base_token: Pubkey,
    pub started: bool,
}

impl ProgramAccount for GlobalCounters {
    const NAME: &'static str = "GlobalStats";
}

impl GlobalCounters {
    /// Base mint, once `start` has created it.
    pub fn base_mint(&self) -> Option<Pubkey> {
        (self.base_token != Pubkey::default()).then_some(self.base_token)
    }
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserLoan {
    pub collateral: u64,
    pub borrowed: u64,
    pub end_date: i64,
    pub number_of_days: u64,
}

impl ProgramAccount for UserLoan {
    const NAME: &'static str = "UserLoan";
}

impl UserLoan {
    /// A loan record exists for every user that ever traded; it is only open
    /// while something is borrowed.
    pub fn is_open(&self) -> bool {
        self.borrowed > 0
    }
}

/// Per-day loan maturity aggregate (`DailyStats`).
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct DailyBucket {
    pub date: i64,
    pub borrowed: u64,
    pub collateral: u64,
}

impl ProgramAccount for DailyBucket {
    const NAME: &'static str = "DailyStats";
}

/// Render a stored fee rate (scale 100) as a percent string, e.g. 975 -> "9.75".
pub fn fee_percent(raw: u64) -> String {
    format!("{}.{:02}", raw / FEE_SCALE, raw % FEE_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Anchor-style blob: discriminator, fields, then zero padding.
    fn account_blob<T: ProgramAccount>(fields: &impl BorshSerialize, padding: usize) -> Vec<u8> {
        let mut data = T::discriminator().to_vec();
        fields.serialize(&mut data).unwrap();
        data.extend(std::iter::repeat(0u8).take(padding));
        data
    }

    #[test]
    fn test_decode_user_loan_with_trailing_bytes() {
        let data = account_blob::<UserLoan>(&(500u64, 250u64, 1_700_000_000i64, 7u64), 16);
        let loan = UserLoan::decode(&Pubkey::default(), &data).unwrap();
        assert_eq!(
            loan,
            UserLoan {
                collateral: 500,
                borrowed: 250,
                end_date: 1_700_000_000,
                number_of_days: 7
            }
        );
        assert!(loan.is_open());
    }

    #[test]
    fn test_wrong_discriminator_is_decode_error() {
        let data = account_blob::<DailyBucket>(&(0i64, 0u64, 0u64), 0);
        let err = UserLoan::decode(&Pubkey::default(), &data).unwrap_err();
        assert!(matches!(err, MushiError::Decode { kind: "UserLoan", .. }));
    }

    #[test]
    fn test_short_blob_is_decode_error() {
        let mut data = account_blob::<UserLoan>(&(1u64, 2u64), 0);
        assert!(UserLoan::decode(&Pubkey::default(), &data).is_err());
        data.truncate(4);
        assert!(UserLoan::decode(&Pubkey::default(), &data).is_err());
    }

    #[test]
    fn test_encode_matches_program_layout() {
        let loan = UserLoan {
            collateral: 500,
            borrowed: 250,
            end_date: 1_700_000_000,
            number_of_days: 7,
        };
        let data = loan.encode().unwrap();
        assert_eq!(data, account_blob::<UserLoan>(&(500u64, 250u64, 1_700_000_000i64, 7u64), 0));
        assert_eq!(UserLoan::decode(&Pubkey::default(), &data).unwrap(), loan);
    }

    #[test]
    fn test_fee_percent() {
        assert_eq!(fee_percent(975), "9.75");
        assert_eq!(fee_percent(25), "0.25");
        assert_eq!(fee_percent(1000), "10.00");
    }

    #[test]
    fn test_staking_requires_both_ids() {
        let mut config = ProgramConfig {
            admin: Pubkey::new_unique(),
            fee_receiver: Pubkey::new_unique(),
            buy_fee: 975,
            sell_fee: 975,
            buy_fee_leverage: 10,
            quote_token: Pubkey::new_unique(),
            stake_token: Pubkey::default(),
            stake_vault_program: Pubkey::new_unique(),
            stake_enabled: true,
            started: true,
        };
        assert!(config.staking().is_none());
        config.stake_token = Pubkey::new_unique();
        assert_eq!(config.staking(), Some((config.stake_token, config.stake_vault_program)));
    }
}
