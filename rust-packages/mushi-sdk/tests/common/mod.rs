//! Scripted in-memory ledger for integration tests.

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    },
};

use borsh::BorshDeserialize;
use mushi_sdk::{
    calendar::{self, SECONDS_PER_DAY},
    schema::{InitializeArgs, ProgramInstruction},
    GlobalCounters, LedgerRpc, MushiError, MushiResult, Pdas, ProgramAccount, ProgramConfig,
    SignatureStatus, SimulationReport, UserLoan,
};
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{TransactionError, VersionedTransaction},
};

pub const NOW: i64 = 1_700_000_000;

pub fn fixed_clock() -> i64 {
    NOW
}

/// Ledger whose answers are queued up front.
///
/// Status and blockhash queues fall back to "no status" and "valid" once
/// drained. Every `latest_blockhash` call hands out a new hash. With
/// `auto_confirm` every broadcast is applied to the account store and
/// confirmed on the next poll.
pub struct FakeLedger {
    pub program_id: Pubkey,
    accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
    statuses: Mutex<VecDeque<MushiResult<SignatureStatus>>>,
    blockhash_validity: Mutex<VecDeque<bool>>,
    send_failures: AtomicU32,
    auto_confirm: bool,
    pub sent: Mutex<Vec<VersionedTransaction>>,
    /// Signature of every send call, failed ones included.
    pub attempts: Mutex<Vec<Signature>>,
    pub status_polls: AtomicU32,
    pub blockhash_checks: AtomicU32,
    pub simulations: AtomicU32,
}

impl FakeLedger {
    pub fn new(program_id: Pubkey) -> Self {
        Self {
            program_id,
            accounts: Mutex::new(HashMap::new()),
            statuses: Mutex::new(VecDeque::new()),
            blockhash_validity: Mutex::new(VecDeque::new()),
            send_failures: AtomicU32::new(0),
            auto_confirm: false,
            sent: Mutex::new(Vec::new()),
            attempts: Mutex::new(Vec::new()),
            status_polls: AtomicU32::new(0),
            blockhash_checks: AtomicU32::new(0),
            simulations: AtomicU32::new(0),
        }
    }

    pub fn auto_confirming(program_id: Pubkey) -> Self {
        Self {
            auto_confirm: true,
            ..Self::new(program_id)
        }
    }

    pub fn pdas(&self) -> Pdas {
        Pdas::new(self.program_id)
    }

    pub fn put_account(&self, address: Pubkey, data: Vec<u8>) {
        self.accounts.lock().unwrap().insert(address, data);
    }

    pub fn put<T: ProgramAccount>(&self, address: Pubkey, account: &T) {
        self.put_account(address, account.encode().unwrap());
    }

    pub fn get<T: ProgramAccount>(&self, address: &Pubkey) -> Option<T> {
        let accounts = self.accounts.lock().unwrap();
        accounts.get(address).map(|data| T::decode(address, data).unwrap())
    }

    pub fn script_statuses(&self, statuses: impl IntoIterator<Item = MushiResult<SignatureStatus>>) {
        self.statuses.lock().unwrap().extend(statuses);
    }

    pub fn script_blockhash_validity(&self, validity: impl IntoIterator<Item = bool>) {
        self.blockhash_validity.lock().unwrap().extend(validity);
    }

    pub fn fail_next_sends(&self, count: u32) {
        self.send_failures.store(count, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Replays the program's effects for the instructions these tests drive.
    fn apply(&self, tx: &VersionedTransaction) {
        let keys = tx.message.static_account_keys();
        let signer = keys[0];
        let pdas = self.pdas();
        for ix in tx.message.instructions() {
            if keys[usize::from(ix.program_id_index)] != self.program_id {
                continue;
            }
            let account = |i: usize| keys[usize::from(ix.accounts[i])];
            let (disc, mut args) = ix.data.split_at(8);

            if disc == ProgramInstruction::InitMainState.discriminator() {
                let init = InitializeArgs::deserialize(&mut args).unwrap();
                self.put(
                    pdas.main_state().0,
                    &ProgramConfig {
                        admin: signer,
                        fee_receiver: init.fee_receiver,
                        buy_fee: init.buy_fee,
                        sell_fee: init.sell_fee,
                        buy_fee_leverage: init.buy_fee_leverage,
                        quote_token: account(3),
                        stake_token: Pubkey::default(),
                        stake_vault_program: Pubkey::default(),
                        stake_enabled: false,
                        started: false,
                    },
                );
                self.put(pdas.global_stats().0, &empty_counters(calendar::midnight(NOW).unwrap()));
            } else if disc == ProgramInstruction::Borrow.discriminator() {
                let (days, amount) = <(u64, u64)>::deserialize(&mut args).unwrap();
                let end = calendar::midnight(NOW + (days as i64 + 1) * SECONDS_PER_DAY).unwrap();
                self.put(
                    pdas.user_loan(&signer).0,
                    &UserLoan {
                        collateral: amount * 2,
                        borrowed: amount,
                        end_date: end,
                        number_of_days: days,
                    },
                );
            } else if disc == ProgramInstruction::ExtendLoan.discriminator() {
                let days = u64::deserialize(&mut args).unwrap();
                let address = pdas.user_loan(&signer).0;
                let mut loan: UserLoan = self.get(&address).unwrap();
                loan.end_date += days as i64 * SECONDS_PER_DAY;
                loan.number_of_days += days;
                self.put(address, &loan);
            }
        }
    }
}

pub fn empty_counters(last_liquidation_date: i64) -> GlobalCounters {
    GlobalCounters {
        last_liquidation_date,
        total_borrowed: 0,
        total_collateral: 0,
        total_quote_staked: 0,
        token_supply: 0,
        last_price: 0,
        base_token: Pubkey::default(),
        started: false,
    }
}

pub fn failed_status() -> MushiResult<SignatureStatus> {
    Ok(Some(Err(TransactionError::AccountNotFound)))
}

impl LedgerRpc for FakeLedger {
    async fn latest_blockhash(&self) -> MushiResult<Hash> {
        Ok(Hash::new_unique())
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> MushiResult<Signature> {
        self.attempts.lock().unwrap().push(tx.signatures[0]);
        let pending = self.send_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.send_failures.store(pending - 1, Ordering::SeqCst);
            return Err(MushiError::Rpc("connection reset".into()));
        }
        if self.auto_confirm {
            self.apply(tx);
            self.statuses.lock().unwrap().push_back(Ok(Some(Ok(()))));
        }
        self.sent.lock().unwrap().push(tx.clone());
        Ok(tx.signatures[0])
    }

    async fn signature_status(&self, _signature: &Signature) -> MushiResult<SignatureStatus> {
        self.status_polls.fetch_add(1, Ordering::SeqCst);
        self.statuses.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn is_blockhash_valid(&self, _blockhash: &Hash) -> MushiResult<bool> {
        self.blockhash_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.blockhash_validity.lock().unwrap().pop_front().unwrap_or(true))
    }

    async fn simulate(&self, _tx: &VersionedTransaction) -> MushiResult<SimulationReport> {
        self.simulations.fetch_add(1, Ordering::SeqCst);
        Ok(SimulationReport {
            error: Some("custom program error: 0x1771".into()),
            logs: vec![
                "Program log: Instruction: Borrow".into(),
                "Program log: Error: insufficient collateral".into(),
            ],
            units_consumed: Some(21_000),
        })
    }

    async fn account_data(&self, address: &Pubkey) -> MushiResult<Option<Vec<u8>>> {
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }
}
