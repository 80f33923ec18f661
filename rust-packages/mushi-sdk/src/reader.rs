use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use spl_token_2022::{extension::StateWithExtensions, state::Mint};
use tracing::debug;

use crate::{
    error::{MushiError, MushiResult},
    pda::Pdas,
    rpc::LedgerRpc,
    state::{DailyBucket, GlobalCounters, ProgramAccount, ProgramConfig, UserLoan},
};

/// Fetches and decodes program accounts.
///
/// A missing account is `Ok(None)` from the `fetch` family; `require` turns it
/// into [`MushiError::AccountNotFound`]. Malformed data is always an error.
pub struct StateReader<R> {
    rpc: Arc<R>,
    pdas: Pdas,
}

impl<R> Clone for StateReader<R> {
    fn clone(&self) -> Self {
        Self {
            rpc: Arc::clone(&self.rpc),
            pdas: self.pdas,
        }
    }
}

impl<R: LedgerRpc> StateReader<R> {
    pub fn new(rpc: Arc<R>, pdas: Pdas) -> Self {
        Self { rpc, pdas }
    }

    pub fn pdas(&self) -> &Pdas {
        &self.pdas
    }

    pub async fn fetch<T: ProgramAccount>(&self, address: &Pubkey) -> MushiResult<Option<T>> {
        let Some(data) = self.rpc.account_data(address).await? else {
            debug!(kind = T::NAME, %address, "account not found");
            return Ok(None);
        };
        T::decode(address, &data).map(Some)
    }

    pub async fn require<T: ProgramAccount>(&self, address: &Pubkey) -> MushiResult<T> {
        self.fetch(address)
            .await?
            .ok_or(MushiError::AccountNotFound {
                kind: T::NAME,
                address: *address,
            })
    }

    pub async fn config(&self) -> MushiResult<ProgramConfig> {
        self.require(&self.pdas.main_state().0).await
    }

    pub async fn global(&self) -> MushiResult<GlobalCounters> {
        self.require(&self.pdas.global_stats().0).await
    }

    pub async fn user_loan(&self, owner: &Pubkey) -> MushiResult<Option<UserLoan>> {
        self.fetch(&self.pdas.user_loan(owner).0).await
    }

    pub async fn daily_bucket(&self, day: &str) -> MushiResult<Option<DailyBucket>> {
        self.fetch(&self.pdas.daily_stats(day).0).await
    }

    /// Decimal places of an SPL Token or Token-2022 mint.
    pub async fn mint_decimals(&self, mint: &Pubkey) -> MushiResult<u8> {
        let data = self
            .rpc
            .account_data(mint)
            .await?
            .ok_or(MushiError::AccountNotFound {
                kind: "Mint",
                address: *mint,
            })?;
        let state = StateWithExtensions::<Mint>::unpack(&data).map_err(|e| MushiError::Decode {
            kind: "Mint",
            address: *mint,
            reason: e.to_string(),
        })?;
        Ok(state.base.decimals)
    }
}
