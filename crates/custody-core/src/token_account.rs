//! Associated token account derivation and on-chain lookup.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::debug;

use chain_sol::{
    address_to_bytes, bytes_to_address, derive_associated_token_address, parse_token_account,
};
use sol_rpc::{LedgerClient, LedgerError};

use crate::amount::from_minor_units;
use crate::types::TokenAccountRef;

/// Resolves owners to their token account for one mint.
pub struct TokenAccountResolver<L: LedgerClient> {
    ledger: Arc<L>,
    mint: [u8; 32],
}

impl<L: LedgerClient> TokenAccountResolver<L> {
    pub fn new(ledger: Arc<L>, mint: [u8; 32]) -> Self {
        Self { ledger, mint }
    }

    /// Deterministic token account address for `owner`. No I/O.
    pub fn derive_account(&self, owner: &[u8; 32]) -> Result<[u8; 32], LedgerError> {
        derive_associated_token_address(owner, &self.mint)
            .map_err(|e| LedgerError::AddressFormat(e.to_string()))
    }

    /// Point-in-time existence check; never cached.
    pub async fn account_exists(&self, account: &str) -> Result<bool, LedgerError> {
        let exists = self.ledger.get_account_info(account).await?.is_some();
        debug!(account, exists, "token account lookup");
        Ok(exists)
    }

    /// Base58 token account address for a Base58 `owner`.
    pub fn account_address(&self, owner: &str) -> Result<String, LedgerError> {
        let owner_bytes =
            address_to_bytes(owner).map_err(|e| LedgerError::AddressFormat(e.to_string()))?;
        Ok(bytes_to_address(&self.derive_account(&owner_bytes)?))
    }

    /// Derive `owner`'s account and check whether it exists.
    pub async fn resolve(&self, owner: &str) -> Result<TokenAccountRef, LedgerError> {
        let derived = self.account_address(owner)?;
        let exists = self.account_exists(&derived).await?;
        Ok(self.account_ref(owner, derived, exists))
    }

    /// Resolve `owner`'s account and read its balance in minor units with a
    /// single account lookup. A missing account holds zero.
    pub async fn resolve_with_balance(
        &self,
        owner: &str,
    ) -> Result<(TokenAccountRef, u64), LedgerError> {
        let account = self.account_address(owner)?;

        let Some(info) = self.ledger.get_account_info(&account).await? else {
            return Ok((self.account_ref(owner, account, false), 0));
        };

        let state = parse_token_account(&info.data)
            .map_err(|e| LedgerError::InvalidResponse(format!("token account {account}: {e}")))?;
        if state.mint != self.mint {
            return Err(LedgerError::InvalidResponse(format!(
                "token account {account} holds a different mint"
            )));
        }

        Ok((self.account_ref(owner, account, true), state.amount))
    }

    /// Raw balance in minor units. A missing account holds zero.
    pub async fn token_balance_units(&self, owner: &str) -> Result<u64, LedgerError> {
        self.resolve_with_balance(owner)
            .await
            .map(|(_, units)| units)
    }

    /// Balance in human units.
    pub async fn token_balance(&self, owner: &str, decimals: u32) -> Result<Decimal, LedgerError> {
        self.token_balance_units(owner)
            .await
            .map(|units| from_minor_units(units, decimals))
    }

    fn account_ref(&self, owner: &str, derived: String, exists: bool) -> TokenAccountRef {
        TokenAccountRef {
            owner_address: owner.to_string(),
            mint_address: bytes_to_address(&self.mint),
            derived_account_address: derived,
            exists,
        }
    }
}
