//! SPL Token instructions, token-account parsing and associated token
//! account (ATA) derivation, without the `spl-token` crates.

use sha2::{Digest, Sha256};

use crate::error::SolError;
use crate::transaction::{SolAccountMeta, SolInstruction, SYSTEM_PROGRAM_ID};

// ---------------------------------------------------------------------------
// Well-known program IDs
// ---------------------------------------------------------------------------

/// SPL Token Program ID: `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: [u8; 32] = [
    0x06, 0xdd, 0xf6, 0xe1, 0xd7, 0x65, 0xa1, 0x93, 0xd9, 0xcb, 0xe1, 0x46, 0xce, 0xeb, 0x79,
    0xac, 0x1c, 0xb4, 0x85, 0xed, 0x5f, 0x5b, 0x37, 0x91, 0x3a, 0x8c, 0xf5, 0x85, 0x7e, 0xff,
    0x00, 0xa9,
];

/// Associated Token Account Program ID: `ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`
pub const ASSOCIATED_TOKEN_PROGRAM_ID: [u8; 32] = [
    0x8c, 0x97, 0x25, 0x8f, 0x4e, 0x24, 0x89, 0xf1, 0xbb, 0x3d, 0x10, 0x29, 0x14, 0x8e, 0x0d,
    0x83, 0x0b, 0x5a, 0x13, 0x99, 0xda, 0xff, 0x10, 0x84, 0x04, 0x8e, 0x7b, 0xd8, 0xdb, 0xe9,
    0xf8, 0x59,
];

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// SPL Token `Transfer` instruction tag.
const TOKEN_TRANSFER_TAG: u8 = 3;

/// Associated Token Account program `CreateIdempotent` instruction tag.
const ATA_CREATE_IDEMPOTENT_TAG: u8 = 1;

/// Size of an SPL token account (`spl_token::state::Account::LEN`).
pub const TOKEN_ACCOUNT_LEN: usize = 165;

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

/// Build an SPL Token `Transfer` moving `amount` base units between two token
/// accounts, authorized by `owner` (the wallet owning the source account).
///
/// Data layout: tag `3` followed by the u64 LE amount (9 bytes).
pub fn build_spl_transfer(
    from_token_account: &[u8; 32],
    to_token_account: &[u8; 32],
    owner: &[u8; 32],
    amount: u64,
) -> Result<SolInstruction, SolError> {
    if amount == 0 {
        return Err(SolError::TransactionBuildError(
            "SPL transfer amount must be > 0".into(),
        ));
    }

    let mut data = Vec::with_capacity(9);
    data.push(TOKEN_TRANSFER_TAG);
    data.extend_from_slice(&amount.to_le_bytes());

    Ok(SolInstruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::writable(*from_token_account, false),
            SolAccountMeta::writable(*to_token_account, false),
            SolAccountMeta::readonly(*owner, true),
        ],
        data,
    })
}

/// Build an ATA program `CreateIdempotent` instruction.
///
/// `payer` funds the rent-exempt balance and must sign. Succeeds on-chain
/// even when the account already exists, so a recipient account created by
/// someone else between our existence check and submission is harmless.
pub fn build_create_associated_token_account_idempotent(
    payer: &[u8; 32],
    wallet: &[u8; 32],
    mint: &[u8; 32],
) -> Result<SolInstruction, SolError> {
    let ata = derive_associated_token_address(wallet, mint)?;

    Ok(SolInstruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::writable(*payer, true),
            SolAccountMeta::writable(ata, false),
            SolAccountMeta::readonly(*wallet, false),
            SolAccountMeta::readonly(*mint, false),
            SolAccountMeta::readonly(SYSTEM_PROGRAM_ID, false),
            SolAccountMeta::readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: vec![ATA_CREATE_IDEMPOTENT_TAG],
    })
}

// ---------------------------------------------------------------------------
// Token account state
// ---------------------------------------------------------------------------

/// The leading fields of an SPL token account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccountData {
    pub mint: [u8; 32],
    pub owner: [u8; 32],
    pub amount: u64,
}

/// Parse raw token-account data: `mint(32) | owner(32) | amount(u64 LE) | ...`.
pub fn parse_token_account(data: &[u8]) -> Result<TokenAccountData, SolError> {
    if data.len() != TOKEN_ACCOUNT_LEN {
        return Err(SolError::SerializationError(format!(
            "token account must be {TOKEN_ACCOUNT_LEN} bytes, got {}",
            data.len()
        )));
    }

    let mut mint = [0u8; 32];
    mint.copy_from_slice(&data[0..32]);
    let mut owner = [0u8; 32];
    owner.copy_from_slice(&data[32..64]);
    let mut amount = [0u8; 8];
    amount.copy_from_slice(&data[64..72]);

    Ok(TokenAccountData {
        mint,
        owner,
        amount: u64::from_le_bytes(amount),
    })
}

// ---------------------------------------------------------------------------
// Associated Token Account (PDA) derivation
// ---------------------------------------------------------------------------

/// Derive the associated token account address for a wallet + mint pair.
///
/// Seeds are `[wallet, token_program_id, mint]` under the ATA program. Pure:
/// no I/O, same output for the same inputs.
pub fn derive_associated_token_address(
    wallet: &[u8; 32],
    mint: &[u8; 32],
) -> Result<[u8; 32], SolError> {
    find_program_address(
        &[wallet.as_ref(), &TOKEN_PROGRAM_ID, mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .map(|(address, _bump)| address)
}

/// Search bump seeds 255..=0 for the first hash that is off the Ed25519 curve.
fn find_program_address(
    seeds: &[&[u8]],
    program_id: &[u8; 32],
) -> Result<([u8; 32], u8), SolError> {
    for bump in (0u8..=255).rev() {
        if let Some(address) = try_create_program_address(seeds, &[bump], program_id) {
            return Ok((address, bump));
        }
    }

    Err(SolError::InvalidAddress(
        "could not find valid PDA bump seed".into(),
    ))
}

/// `SHA-256(seeds.. || bump || program_id || "ProgramDerivedAddress")`, or
/// `None` when the hash lands on the curve.
fn try_create_program_address(
    seeds: &[&[u8]],
    bump_seed: &[u8],
    program_id: &[u8; 32],
) -> Option<[u8; 32]> {
    let mut hasher = Sha256::new();

    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(bump_seed);
    hasher.update(program_id);
    hasher.update(PDA_MARKER);

    let hash: [u8; 32] = hasher.finalize().into();

    if is_on_curve(&hash) {
        return None;
    }

    Some(hash)
}

fn is_on_curve(bytes: &[u8; 32]) -> bool {
    curve25519_dalek::edwards::CompressedEdwardsY(*bytes)
        .decompress()
        .is_some()
}
