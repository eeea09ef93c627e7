//! An in-memory ledger that checks and applies what it is sent.
//!
//! Submitted wire bytes are decoded, every signature is verified, and the
//! ATA `CreateIdempotent` and SPL `Transfer` instructions are applied to a
//! small token ledger. Fees and rent are charged to whoever the transaction
//! names, so tests can see who paid.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;

use chain_sol::{
    address_to_bytes, bytes_to_address, decode_transaction, derive_associated_token_address,
    DecodedTransaction, ASSOCIATED_TOKEN_PROGRAM_ID, TOKEN_ACCOUNT_LEN, TOKEN_PROGRAM_ID,
};
use custody_core::{CustodyConfig, SponsorIdentity};
use sol_rpc::{AccountInfo, BlockRef, LedgerClient, LedgerError};

pub const MINT: [u8; 32] = [0x3C; 32];
pub const SIGNATURE_FEE: u64 = 5_000;
pub const ATA_RENT: u64 = 2_039_280;
pub const SPONSOR_LAMPORTS: u64 = 1_000_000_000;

const CURRENT_BLOCKHASH: [u8; 32] = [0xB1; 32];
const EXPIRED_BLOCKHASH: [u8; 32] = [0xB0; 32];

#[derive(Debug, Clone, Copy)]
pub struct TokenHolding {
    pub mint: [u8; 32],
    pub owner: [u8; 32],
    pub amount: u64,
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    lamports: HashMap<[u8; 32], u64>,
    tokens: HashMap<[u8; 32], TokenHolding>,
}

/// Per-method call counters.
#[derive(Debug, Default)]
pub struct Calls {
    pub get_balance: AtomicUsize,
    pub get_account_info: AtomicUsize,
    pub get_latest_block_reference: AtomicUsize,
    pub submit_transaction: AtomicUsize,
    pub confirm_transaction: AtomicUsize,
}

impl Calls {
    pub fn total(&self) -> usize {
        self.get_balance.load(Ordering::SeqCst)
            + self.get_account_info.load(Ordering::SeqCst)
            + self.get_latest_block_reference.load(Ordering::SeqCst)
            + self.submit_transaction.load(Ordering::SeqCst)
            + self.confirm_transaction.load(Ordering::SeqCst)
    }

    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MockLedger {
    state: Mutex<LedgerState>,
    landed: Mutex<HashSet<String>>,
    failed: Mutex<HashSet<String>>,
    submitted: Mutex<Vec<DecodedTransaction>>,
    pub calls: Calls,
    /// Hand out a block reference the ledger no longer accepts.
    pub stale_blockhash: AtomicBool,
    /// Accept submissions but never report them confirmed.
    pub never_confirm: AtomicBool,
    /// Number of confirmation polls that fail with a network error first.
    pub flaky_confirms: AtomicUsize,
    /// Drop the connection on `sendTransaction`.
    pub fail_submit_with_network: AtomicBool,
    /// Accept submissions, then report them landed with an instruction error.
    pub land_with_error: AtomicBool,
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_lamports(&self, owner: [u8; 32], lamports: u64) {
        self.state.lock().unwrap().lamports.insert(owner, lamports);
    }

    pub fn lamports(&self, owner: &[u8; 32]) -> u64 {
        self.state.lock().unwrap().lamports.get(owner).copied().unwrap_or(0)
    }

    /// Create `owner`'s token account holding `amount`.
    pub fn fund_tokens(&self, owner: [u8; 32], amount: u64) {
        let ata = derive_associated_token_address(&owner, &MINT).unwrap();
        self.state.lock().unwrap().tokens.insert(
            ata,
            TokenHolding {
                mint: MINT,
                owner,
                amount,
            },
        );
    }

    pub fn token_balance(&self, owner: &[u8; 32]) -> Option<u64> {
        let ata = derive_associated_token_address(owner, &MINT).unwrap();
        self.state.lock().unwrap().tokens.get(&ata).map(|h| h.amount)
    }

    pub fn submitted(&self) -> Vec<DecodedTransaction> {
        self.submitted.lock().unwrap().clone()
    }

    fn apply(&self, tx: &DecodedTransaction) -> Result<(), String> {
        let mut state = self.state.lock().unwrap().clone();
        let is_signer = |index: u8| (index as usize) < tx.num_required_signatures as usize;

        let fee_payer = *tx.fee_payer().ok_or("no fee payer")?;
        let fee = SIGNATURE_FEE * tx.signatures.len() as u64;
        debit(&mut state, &fee_payer, fee)?;

        for ix in &tx.instructions {
            let (program, accounts) = tx.instruction_accounts(ix).map_err(|e| e.to_string())?;

            if program == ASSOCIATED_TOKEN_PROGRAM_ID && ix.data == [1] {
                if !is_signer(ix.account_indices[0]) {
                    return Err("ATA payer did not sign".into());
                }
                let (payer, ata, wallet, mint) = (accounts[0], accounts[1], accounts[2], accounts[3]);
                if derive_associated_token_address(&wallet, &mint).unwrap() != ata {
                    return Err("ATA address mismatch".into());
                }
                if !state.tokens.contains_key(&ata) {
                    debit(&mut state, &payer, ATA_RENT)?;
                    state.tokens.insert(
                        ata,
                        TokenHolding {
                            mint,
                            owner: wallet,
                            amount: 0,
                        },
                    );
                }
            } else if program == TOKEN_PROGRAM_ID && ix.data.first() == Some(&3) {
                let amount = u64::from_le_bytes(ix.data[1..9].try_into().unwrap());
                let (source, destination, authority) = (accounts[0], accounts[1], accounts[2]);
                if !is_signer(ix.account_indices[2]) {
                    return Err("transfer authority did not sign".into());
                }

                let from = *state.tokens.get(&source).ok_or("source account not found")?;
                if from.owner != authority {
                    return Err("owner does not match".into());
                }
                if from.amount < amount {
                    return Err("insufficient funds".into());
                }
                let to = state
                    .tokens
                    .get_mut(&destination)
                    .ok_or("invalid account data for instruction")?;
                if to.mint != from.mint {
                    return Err("mint mismatch".into());
                }
                to.amount += amount;
                state.tokens.get_mut(&source).unwrap().amount -= amount;
            } else {
                return Err(format!("unsupported program {}", bytes_to_address(&program)));
            }
        }

        *self.state.lock().unwrap() = state;
        Ok(())
    }
}

fn debit(state: &mut LedgerState, account: &[u8; 32], amount: u64) -> Result<(), String> {
    let balance = state.lamports.entry(*account).or_insert(0);
    if *balance < amount {
        return Err(format!(
            "insufficient lamports in {}",
            bytes_to_address(account)
        ));
    }
    *balance -= amount;
    Ok(())
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_balance(&self, address: &str) -> Result<u64, LedgerError> {
        self.calls.get_balance.fetch_add(1, Ordering::SeqCst);
        let key = address_to_bytes(address).map_err(|e| LedgerError::AddressFormat(e.to_string()))?;
        Ok(self.lamports(&key))
    }

    async fn get_account_info(&self, address: &str) -> Result<Option<AccountInfo>, LedgerError> {
        self.calls.get_account_info.fetch_add(1, Ordering::SeqCst);
        let key = address_to_bytes(address).map_err(|e| LedgerError::AddressFormat(e.to_string()))?;

        let state = self.state.lock().unwrap();
        Ok(state.tokens.get(&key).map(|holding| {
            let mut data = vec![0u8; TOKEN_ACCOUNT_LEN];
            data[0..32].copy_from_slice(&holding.mint);
            data[32..64].copy_from_slice(&holding.owner);
            data[64..72].copy_from_slice(&holding.amount.to_le_bytes());
            AccountInfo {
                lamports: ATA_RENT,
                owner: TOKEN_PROGRAM_ID,
                data,
                executable: false,
            }
        }))
    }

    async fn get_latest_block_reference(&self) -> Result<BlockRef, LedgerError> {
        self.calls
            .get_latest_block_reference
            .fetch_add(1, Ordering::SeqCst);
        let blockhash = if self.stale_blockhash.load(Ordering::SeqCst) {
            EXPIRED_BLOCKHASH
        } else {
            CURRENT_BLOCKHASH
        };
        Ok(BlockRef {
            blockhash,
            last_valid_block_height: 1_000,
        })
    }

    async fn submit_transaction(&self, wire: &[u8]) -> Result<String, LedgerError> {
        self.calls.submit_transaction.fetch_add(1, Ordering::SeqCst);
        if self.fail_submit_with_network.load(Ordering::SeqCst) {
            return Err(LedgerError::Network("error sending request: connection reset".into()));
        }

        let tx = decode_transaction(wire).map_err(|e| LedgerError::Rejected(e.to_string()))?;
        self.submitted.lock().unwrap().push(tx.clone());

        if !tx.verify_signatures() {
            return Err(LedgerError::Rejected("signature verification failure".into()));
        }
        if tx.recent_blockhash != CURRENT_BLOCKHASH {
            return Err(LedgerError::Rejected(
                "Transaction simulation failed: Blockhash not found".into(),
            ));
        }
        let signature = bs58::encode(tx.signatures[0]).into_string();
        if self.land_with_error.load(Ordering::SeqCst) {
            // Lands, pays its fee, changes nothing else.
            let fee_payer = *tx.fee_payer().unwrap();
            let fee = SIGNATURE_FEE * tx.signatures.len() as u64;
            debit(&mut self.state.lock().unwrap(), &fee_payer, fee).map_err(LedgerError::Rejected)?;
            self.failed.lock().unwrap().insert(signature.clone());
            return Ok(signature);
        }

        self.apply(&tx)
            .map_err(|e| LedgerError::Rejected(format!("Transaction simulation failed: {e}")))?;

        self.landed.lock().unwrap().insert(signature.clone());
        Ok(signature)
    }

    async fn confirm_transaction(&self, transaction_id: &str) -> Result<bool, LedgerError> {
        self.calls.confirm_transaction.fetch_add(1, Ordering::SeqCst);

        let flaky = self.flaky_confirms.load(Ordering::SeqCst);
        if flaky > 0 {
            self.flaky_confirms.store(flaky - 1, Ordering::SeqCst);
            return Err(LedgerError::Network("connection reset".into()));
        }
        if self.failed.lock().unwrap().contains(transaction_id) {
            return Err(LedgerError::Rejected(format!(
                "transaction {transaction_id} failed: InstructionError(0, Custom(1))"
            )));
        }
        if self.never_confirm.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(self.landed.lock().unwrap().contains(transaction_id))
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

pub fn sponsor_key() -> SigningKey {
    SigningKey::from_bytes(&[0x5E; 32])
}

pub fn sponsor_public() -> [u8; 32] {
    sponsor_key().verifying_key().to_bytes()
}

/// Config around the fixed sponsor and [`MINT`], polling every 10ms.
pub fn test_config() -> CustodyConfig {
    let mut config = CustodyConfig::new(SponsorIdentity::from_signing_key(sponsor_key()))
        .with_mint(&bytes_to_address(&MINT))
        .unwrap()
        .with_poll_interval(Duration::from_millis(10));
    config.confirm_timeout = Duration::from_secs(60);
    config
}

/// A ledger where the sponsor can pay fees and rent.
pub fn funded_ledger() -> Arc<MockLedger> {
    let ledger = MockLedger::new();
    ledger.set_lamports(sponsor_public(), SPONSOR_LAMPORTS);
    ledger
}
