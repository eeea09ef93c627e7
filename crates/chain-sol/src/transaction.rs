//! Solana transaction wire format, two-party signing and decoding.
//!
//! ```text
//! Transaction:
//!   num_signatures          compact-u16
//!   signatures              64 bytes * num_signatures
//!   message:
//!     num_required_sigs     u8
//!     num_readonly_signed   u8
//!     num_readonly_unsigned u8
//!     num_accounts          compact-u16
//!     account_keys          32 bytes * num_accounts
//!     recent_blockhash      32 bytes
//!     num_instructions      compact-u16
//!     instructions[]        (see below)
//!
//! Instruction:
//!   program_id_index        u8
//!   num_accounts            compact-u16
//!   account_indices         u8 * num_accounts
//!   data_len                compact-u16
//!   data                    u8 * data_len
//! ```
//!
//! Signature slot `i` belongs to `account_keys[i]`; slot 0 is the fee payer
//! and its signature doubles as the transaction id.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use crate::address::bytes_to_address;
use crate::error::SolError;

/// The System Program public key: 32 zero bytes.
pub const SYSTEM_PROGRAM_ID: [u8; 32] = [0u8; 32];

/// Account indices are a single byte on the wire.
const MAX_ACCOUNTS: usize = 256;

// ---------------------------------------------------------------------------
// Compact-u16 encoding
// ---------------------------------------------------------------------------

/// Encode a `u16` in Solana's compact-u16 (7 bits per byte, LSB first).
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut val = value as u32;
    let mut out = Vec::with_capacity(3);

    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }

    out
}

/// Decode a compact-u16, returning `(value, bytes_consumed)`.
pub fn decode_compact_u16(data: &[u8]) -> Result<(u16, usize), SolError> {
    let mut value: u32 = 0;
    let mut consumed = 0usize;

    loop {
        let byte = *data.get(consumed).ok_or_else(|| {
            SolError::SerializationError("unexpected end of data while decoding compact-u16".into())
        })?;
        value |= ((byte & 0x7f) as u32) << (7 * consumed);
        consumed += 1;

        if byte & 0x80 == 0 {
            break;
        }
        if consumed == 3 {
            return Err(SolError::SerializationError(
                "compact-u16 longer than 3 bytes".into(),
            ));
        }
    }

    if value > u16::MAX as u32 {
        return Err(SolError::SerializationError(
            "compact-u16 value overflow".into(),
        ));
    }

    Ok((value as u16, consumed))
}

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A single account reference in an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolAccountMeta {
    pub pubkey: [u8; 32],
    pub is_signer: bool,
    pub is_writable: bool,
}

impl SolAccountMeta {
    pub fn writable(pubkey: [u8; 32], is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: [u8; 32], is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// An instruction before it is compiled into a transaction.
#[derive(Debug, Clone)]
pub struct SolInstruction {
    pub program_id: [u8; 32],
    pub accounts: Vec<SolAccountMeta>,
    pub data: Vec<u8>,
}

/// A compiled, unsigned transaction message.
#[derive(Debug, Clone)]
pub struct SolTransaction {
    /// Account keys in canonical order:
    ///   1. writable signers (fee payer first)
    ///   2. read-only signers
    ///   3. writable non-signers
    ///   4. read-only non-signers
    pub account_keys: Vec<[u8; 32]>,

    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,

    /// Recent blockhash anchoring the validity window.
    pub recent_blockhash: [u8; 32],

    pub compiled_instructions: Vec<CompiledInstruction>,
}

/// An instruction whose account references are indices into `account_keys`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Compile instructions into a message whose fee payer is `fee_payer`.
///
/// The fee payer is always a writable signer at index 0. Every other account
/// marked `is_signer` in any instruction becomes an additional required
/// signer.
pub fn compile_transaction(
    instructions: &[SolInstruction],
    fee_payer: &[u8; 32],
    recent_blockhash: &[u8; 32],
) -> Result<SolTransaction, SolError> {
    struct AccountEntry {
        pubkey: [u8; 32],
        is_signer: bool,
        is_writable: bool,
    }

    let mut entries: Vec<AccountEntry> = Vec::new();

    let mut upsert = |pubkey: [u8; 32], signer: bool, writable: bool| {
        if let Some(entry) = entries.iter_mut().find(|e| e.pubkey == pubkey) {
            entry.is_signer |= signer;
            entry.is_writable |= writable;
        } else {
            entries.push(AccountEntry {
                pubkey,
                is_signer: signer,
                is_writable: writable,
            });
        }
    };

    upsert(*fee_payer, true, true);

    for ix in instructions {
        for meta in &ix.accounts {
            upsert(meta.pubkey, meta.is_signer, meta.is_writable);
        }
        upsert(ix.program_id, false, false);
    }

    if entries.len() > MAX_ACCOUNTS {
        return Err(SolError::TransactionBuildError(format!(
            "too many accounts: {} (max {MAX_ACCOUNTS})",
            entries.len()
        )));
    }

    // Stable sort: the fee payer was inserted first as a writable signer, so
    // it stays at index 0.
    entries.sort_by_key(|e| match (e.is_signer, e.is_writable) {
        (true, true) => 0u8,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    });

    let num_signers = entries.iter().filter(|e| e.is_signer).count() as u8;
    let num_readonly_signed = entries
        .iter()
        .filter(|e| e.is_signer && !e.is_writable)
        .count() as u8;
    let num_readonly_unsigned = entries
        .iter()
        .filter(|e| !e.is_signer && !e.is_writable)
        .count() as u8;

    let account_keys: Vec<[u8; 32]> = entries.iter().map(|e| e.pubkey).collect();

    let index_of = |key: &[u8; 32]| -> Result<u8, SolError> {
        account_keys
            .iter()
            .position(|k| k == key)
            .map(|i| i as u8)
            .ok_or_else(|| SolError::TransactionBuildError("account not in account keys".into()))
    };

    let mut compiled = Vec::with_capacity(instructions.len());
    for ix in instructions {
        let account_indices = ix
            .accounts
            .iter()
            .map(|meta| index_of(&meta.pubkey))
            .collect::<Result<Vec<u8>, SolError>>()?;

        compiled.push(CompiledInstruction {
            program_id_index: index_of(&ix.program_id)?,
            account_indices,
            data: ix.data.clone(),
        });
    }

    Ok(SolTransaction {
        account_keys,
        num_required_signatures: num_signers,
        num_readonly_signed,
        num_readonly_unsigned,
        recent_blockhash: *recent_blockhash,
        compiled_instructions: compiled,
    })
}

/// Serialize the message (the bytes every signer signs).
pub fn serialize_message(tx: &SolTransaction) -> Result<Vec<u8>, SolError> {
    let mut buf = Vec::with_capacity(512);

    buf.push(tx.num_required_signatures);
    buf.push(tx.num_readonly_signed);
    buf.push(tx.num_readonly_unsigned);

    buf.extend_from_slice(&encode_compact_u16(compact_len(tx.account_keys.len())?));
    for key in &tx.account_keys {
        buf.extend_from_slice(key);
    }

    buf.extend_from_slice(&tx.recent_blockhash);

    buf.extend_from_slice(&encode_compact_u16(compact_len(
        tx.compiled_instructions.len(),
    )?));
    for ix in &tx.compiled_instructions {
        buf.push(ix.program_id_index);

        buf.extend_from_slice(&encode_compact_u16(compact_len(ix.account_indices.len())?));
        buf.extend_from_slice(&ix.account_indices);

        buf.extend_from_slice(&encode_compact_u16(compact_len(ix.data.len())?));
        buf.extend_from_slice(&ix.data);
    }

    Ok(buf)
}

fn compact_len(len: usize) -> Result<u16, SolError> {
    u16::try_from(len)
        .map_err(|_| SolError::SerializationError(format!("length {len} exceeds compact-u16")))
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// A compiled message waiting for signatures from every required signer.
///
/// Can only become a [`SignedTransaction`] through [`PendingTransaction::finalize`],
/// which refuses while any slot is empty.
#[derive(Debug)]
pub struct PendingTransaction {
    tx: SolTransaction,
    message: Vec<u8>,
    signatures: Vec<Option<[u8; 64]>>,
}

impl PendingTransaction {
    pub fn new(tx: SolTransaction) -> Result<Self, SolError> {
        let required = tx.num_required_signatures as usize;
        if required == 0 || required > tx.account_keys.len() {
            return Err(SolError::TransactionBuildError(format!(
                "invalid signer count {required} for {} accounts",
                tx.account_keys.len()
            )));
        }

        let message = serialize_message(&tx)?;
        Ok(Self {
            tx,
            message,
            signatures: vec![None; required],
        })
    }

    /// Public keys that must sign, in slot order (fee payer first).
    pub fn required_signers(&self) -> &[[u8; 32]] {
        &self.tx.account_keys[..self.signatures.len()]
    }

    pub fn message(&self) -> &SolTransaction {
        &self.tx
    }

    /// Sign the message with `signer`, filling its slot.
    ///
    /// Fails if `signer` is not one of the required signers.
    pub fn sign(&mut self, signer: &SigningKey) -> Result<(), SolError> {
        let pubkey = signer.verifying_key().to_bytes();
        let slot = self
            .required_signers()
            .iter()
            .position(|k| *k == pubkey)
            .ok_or_else(|| {
                SolError::SigningError(format!(
                    "{} is not a required signer",
                    bytes_to_address(&pubkey)
                ))
            })?;

        self.signatures[slot] = Some(signer.sign(&self.message).to_bytes());
        Ok(())
    }

    /// Addresses of required signers that have not signed yet.
    pub fn missing_signers(&self) -> Vec<String> {
        self.required_signers()
            .iter()
            .zip(&self.signatures)
            .filter(|(_, sig)| sig.is_none())
            .map(|(key, _)| bytes_to_address(key))
            .collect()
    }

    /// Assemble the wire transaction once every slot is filled.
    pub fn finalize(self) -> Result<SignedTransaction, SolError> {
        let missing = self.missing_signers();
        if !missing.is_empty() {
            return Err(SolError::MissingSignatures(missing));
        }

        let signatures: Vec<[u8; 64]> = self.signatures.into_iter().flatten().collect();

        let mut wire = Vec::with_capacity(3 + signatures.len() * 64 + self.message.len());
        wire.extend_from_slice(&encode_compact_u16(compact_len(signatures.len())?));
        for sig in &signatures {
            wire.extend_from_slice(sig);
        }
        wire.extend_from_slice(&self.message);

        Ok(SignedTransaction { wire, signatures })
    }
}

/// A fully signed transaction, ready for submission.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    wire: Vec<u8>,
    signatures: Vec<[u8; 64]>,
}

impl SignedTransaction {
    pub fn wire_bytes(&self) -> &[u8] {
        &self.wire
    }

    /// Base58 of the fee payer's signature, which the ledger uses as the id.
    pub fn transaction_id(&self) -> String {
        bs58::encode(&self.signatures[0]).into_string()
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// A wire transaction split back into its parts.
#[derive(Debug, Clone)]
pub struct DecodedTransaction {
    pub signatures: Vec<[u8; 64]>,
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
    pub account_keys: Vec<[u8; 32]>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
    /// The raw message bytes the signatures cover.
    pub message: Vec<u8>,
}

impl DecodedTransaction {
    /// Whether each signature slot holds a valid signature by its account key.
    pub fn verify_signatures(&self) -> bool {
        if self.signatures.len() != self.num_required_signatures as usize
            || self.signatures.len() > self.account_keys.len()
        {
            return false;
        }

        self.signatures
            .iter()
            .zip(&self.account_keys)
            .all(|(sig, key)| match VerifyingKey::from_bytes(key) {
                Ok(vk) => vk
                    .verify_strict(&self.message, &Signature::from_bytes(sig))
                    .is_ok(),
                Err(_) => false,
            })
    }

    pub fn fee_payer(&self) -> Option<&[u8; 32]> {
        self.account_keys.first()
    }

    /// Resolve a compiled instruction's program and account keys.
    pub fn instruction_accounts(
        &self,
        ix: &CompiledInstruction,
    ) -> Result<([u8; 32], Vec<[u8; 32]>), SolError> {
        let key = |idx: u8| {
            self.account_keys.get(idx as usize).copied().ok_or_else(|| {
                SolError::SerializationError(format!("account index {idx} out of range"))
            })
        };

        let program = key(ix.program_id_index)?;
        let accounts = ix
            .account_indices
            .iter()
            .map(|&i| key(i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((program, accounts))
    }
}

struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], SolError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| SolError::SerializationError("transaction truncated".into()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, SolError> {
        Ok(self.take(1)?[0])
    }

    fn compact_u16(&mut self) -> Result<usize, SolError> {
        let (value, consumed) = decode_compact_u16(&self.data[self.pos.min(self.data.len())..])?;
        self.pos += consumed;
        Ok(value as usize)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], SolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

/// Parse a wire transaction.
pub fn decode_transaction(wire: &[u8]) -> Result<DecodedTransaction, SolError> {
    let mut reader = WireReader { data: wire, pos: 0 };

    let num_sigs = reader.compact_u16()?;
    let signatures = (0..num_sigs)
        .map(|_| reader.array::<64>())
        .collect::<Result<Vec<_>, _>>()?;

    let message_start = reader.pos;

    let num_required_signatures = reader.u8()?;
    let num_readonly_signed = reader.u8()?;
    let num_readonly_unsigned = reader.u8()?;

    let num_accounts = reader.compact_u16()?;
    let account_keys = (0..num_accounts)
        .map(|_| reader.array::<32>())
        .collect::<Result<Vec<_>, _>>()?;

    let recent_blockhash = reader.array::<32>()?;

    let num_instructions = reader.compact_u16()?;
    let mut instructions = Vec::with_capacity(num_instructions);
    for _ in 0..num_instructions {
        let program_id_index = reader.u8()?;
        let n = reader.compact_u16()?;
        let account_indices = reader.take(n)?.to_vec();
        let len = reader.compact_u16()?;
        let data = reader.take(len)?.to_vec();
        instructions.push(CompiledInstruction {
            program_id_index,
            account_indices,
            data,
        });
    }

    if reader.pos != wire.len() {
        return Err(SolError::SerializationError(format!(
            "{} trailing bytes after message",
            wire.len() - reader.pos
        )));
    }

    Ok(DecodedTransaction {
        signatures,
        num_required_signatures,
        num_readonly_signed,
        num_readonly_unsigned,
        account_keys,
        recent_blockhash,
        instructions,
        message: wire[message_start..].to_vec(),
    })
}
