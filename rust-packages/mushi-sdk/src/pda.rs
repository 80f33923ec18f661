//! Program-derived address helpers.
//!
//! Addresses are recomputed on every use from pure inputs. Nothing here
//! touches the network.

use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address_with_program_id;

use crate::{
    calendar,
    error::MushiResult,
    schema::{
        DAILY_STATS_SEED, GLOBAL_STATS_SEED, MAIN_STATE_SEED, METADATA_PROGRAM_ID, METADATA_SEED,
        STAKE_VAULT_OWNER_SEED, STAKE_VAULT_STATE_SEED, USER_LOAN_SEED, VAULT_SEED,
    },
};

/// Derive an address from raw seeds: the bump is searched downward from 255
/// until the candidate falls off the curve.
pub fn derive(program_id: &Pubkey, seeds: &[&[u8]]) -> (Pubkey, u8) {
    Pubkey::find_program_address(seeds, program_id)
}

/// Address deriver bound to one deployment of the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pdas {
    program_id: Pubkey,
}

impl Pdas {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    /// Derive ProgramConfig PDA
    pub fn main_state(&self) -> (Pubkey, u8) {
        derive(&self.program_id, &[MAIN_STATE_SEED])
    }

    /// Derive GlobalCounters PDA
    pub fn global_stats(&self) -> (Pubkey, u8) {
        derive(&self.program_id, &[GLOBAL_STATS_SEED])
    }

    /// Derive vault owner PDA
    pub fn vault_owner(&self) -> (Pubkey, u8) {
        derive(&self.program_id, &[VAULT_SEED])
    }

    /// Derive UserLoan PDA
    pub fn user_loan(&self, owner: &Pubkey) -> (Pubkey, u8) {
        derive(&self.program_id, &[USER_LOAN_SEED, owner.as_ref()])
    }

    /// Derive DailyBucket PDA for a `YYYY-MM-DD` key
    pub fn daily_stats(&self, day: &str) -> (Pubkey, u8) {
        derive(&self.program_id, &[DAILY_STATS_SEED, day.as_bytes()])
    }

    /// Derive the DailyBucket PDA of the day containing `timestamp`
    pub fn daily_stats_at(&self, timestamp: i64) -> MushiResult<(Pubkey, u8)> {
        let day = calendar::day_string(timestamp)?;
        Ok(self.daily_stats(&day))
    }

    /// Program-owned token vault for `mint`
    pub fn vault(&self, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
        associated_token_address(&self.vault_owner().0, mint, token_program)
    }
}

pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    get_associated_token_address_with_program_id(owner, mint, token_program)
}

/// Metaplex metadata account of `mint`
pub fn metadata_address(mint: &Pubkey) -> Pubkey {
    derive(
        &METADATA_PROGRAM_ID,
        &[METADATA_SEED, METADATA_PROGRAM_ID.as_ref(), mint.as_ref()],
    )
    .0
}

pub fn stake_vault_state(stake_vault_program: &Pubkey) -> Pubkey {
    derive(stake_vault_program, &[STAKE_VAULT_STATE_SEED]).0
}

pub fn stake_vault_owner(stake_vault_program: &Pubkey) -> Pubkey {
    derive(stake_vault_program, &[STAKE_VAULT_OWNER_SEED]).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID};

    fn program_id() -> Pubkey {
        Pubkey::new_from_array([7u8; 32])
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let pdas = Pdas::new(program_id());
        let owner = Pubkey::new_unique();
        assert_eq!(pdas.user_loan(&owner), pdas.user_loan(&owner));
        assert_eq!(pdas.daily_stats("2024-03-01"), pdas.daily_stats("2024-03-01"));
        assert_eq!(pdas.main_state(), Pdas::new(program_id()).main_state());
    }

    #[test]
    fn test_bump_matches_create_program_address() {
        let pdas = Pdas::new(program_id());
        let owner = Pubkey::new_unique();
        let (address, bump) = pdas.user_loan(&owner);
        let recreated =
            Pubkey::create_program_address(&[USER_LOAN_SEED, owner.as_ref(), &[bump]], &program_id())
                .unwrap();
        assert_eq!(address, recreated);
        assert!(!address.is_on_curve());
    }

    #[test]
    fn test_single_byte_changes_address() {
        let pdas = Pdas::new(program_id());
        let owner = Pubkey::new_from_array([1u8; 32]);
        let base = pdas.user_loan(&owner).0;
        for i in 0..32 {
            let mut bytes = owner.to_bytes();
            bytes[i] ^= 0x01;
            assert_ne!(base, pdas.user_loan(&Pubkey::new_from_array(bytes)).0, "byte {}", i);
        }
        assert_ne!(pdas.daily_stats("2024-03-01").0, pdas.daily_stats("2024-03-02").0);
    }

    #[test]
    fn test_program_id_is_part_of_the_address() {
        let other = Pdas::new(Pubkey::new_from_array([8u8; 32]));
        assert_ne!(Pdas::new(program_id()).global_stats().0, other.global_stats().0);
    }

    #[test]
    fn test_seed_labels_do_not_collide() {
        let pdas = Pdas::new(program_id());
        let all = [
            pdas.main_state().0,
            pdas.global_stats().0,
            pdas.vault_owner().0,
            pdas.daily_stats("1970-01-01").0,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_daily_stats_at_uses_calendar() {
        let pdas = Pdas::new(program_id());
        assert_eq!(
            pdas.daily_stats_at(951_782_400 + 3_600).unwrap(),
            pdas.daily_stats("2000-02-29")
        );
        assert!(pdas.daily_stats_at(-5).is_err());
    }

    #[test]
    fn test_vaults_depend_on_token_program() {
        let pdas = Pdas::new(program_id());
        let mint = Pubkey::new_unique();
        assert_ne!(
            pdas.vault(&mint, &TOKEN_PROGRAM_ID),
            pdas.vault(&mint, &TOKEN_2022_PROGRAM_ID)
        );
    }
}
