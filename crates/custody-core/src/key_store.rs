//! Wallet record storage.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::StoreError;
use crate::types::{HistoryEntry, WalletRecord, WalletSummary};

/// Persistence contract for wallet records.
///
/// Names are matched case-insensitively. Names and addresses are unique.
pub trait KeyStore: Send + Sync {
    fn insert(&self, record: WalletRecord) -> Result<(), StoreError>;

    fn find_by_name(&self, name: &str) -> Result<Option<WalletRecord>, StoreError>;

    /// Wallets whose name contains `fragment`, ignoring case.
    fn search(&self, fragment: &str) -> Result<Vec<WalletSummary>, StoreError>;

    fn append_history(&self, name: &str, entry: HistoryEntry) -> Result<(), StoreError>;

    fn history(&self, name: &str) -> Result<Vec<HistoryEntry>, StoreError>;
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// MemoryKeyStore
// ---------------------------------------------------------------------------

/// In-memory store with optional JSON snapshots on disk.
pub struct MemoryKeyStore {
    /// Lowercased name -> record.
    wallets: RwLock<HashMap<String, WalletRecord>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self {
            wallets: RwLock::new(HashMap::new()),
        }
    }

    /// Load a snapshot written by [`MemoryKeyStore::save`]. A missing file is
    /// an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            debug!(path = %path.display(), "no wallet snapshot, starting empty");
            return Ok(Self::new());
        }

        let raw = fs::read_to_string(path)?;
        let records: Vec<WalletRecord> = serde_json::from_str(&raw)?;

        let store = Self::new();
        for record in records {
            store.insert(record)?;
        }
        debug!(path = %path.display(), wallets = store.len(), "wallet snapshot loaded");
        Ok(store)
    }

    /// Write every record to `path` as a JSON array, replacing it atomically.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let mut records: Vec<WalletRecord> = self.read()?.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));

        let json = serde_json::to_string_pretty(&records)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.wallets.read().map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, WalletRecord>>, StoreError> {
        self.wallets
            .read()
            .map_err(|_| StoreError::Io("wallet store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, WalletRecord>>, StoreError> {
        self.wallets
            .write()
            .map_err(|_| StoreError::Io("wallet store lock poisoned".into()))
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for MemoryKeyStore {
    fn insert(&self, record: WalletRecord) -> Result<(), StoreError> {
        let mut wallets = self.write()?;
        let key = name_key(&record.name);

        if wallets.contains_key(&key) {
            return Err(StoreError::DuplicateName(record.name));
        }
        if wallets.values().any(|w| w.address == record.address) {
            return Err(StoreError::DuplicateAddress(record.address));
        }

        wallets.insert(key, record);
        Ok(())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<WalletRecord>, StoreError> {
        Ok(self.read()?.get(&name_key(name)).cloned())
    }

    fn search(&self, fragment: &str) -> Result<Vec<WalletSummary>, StoreError> {
        let needle = fragment.trim().to_lowercase();
        let mut found: Vec<WalletSummary> = self
            .read()?
            .iter()
            .filter(|(key, _)| key.contains(&needle))
            .map(|(_, record)| record.summary())
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    fn append_history(&self, name: &str, entry: HistoryEntry) -> Result<(), StoreError> {
        let mut wallets = self.write()?;
        let record = wallets
            .get_mut(&name_key(name))
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        record.transactions.push(entry);
        Ok(())
    }

    fn history(&self, name: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        self.read()?
            .get(&name_key(name))
            .map(|record| record.transactions.clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::key_custody::EncryptedKeyRecord;
    use crate::types::HistoryKind;

    fn record(name: &str, address: &str) -> WalletRecord {
        WalletRecord {
            name: name.into(),
            address: address.into(),
            public_key: address.into(),
            key: EncryptedKeyRecord {
                ciphertext: vec![1, 2, 3],
                iv: [4; 16],
                salt: [5; 16],
            },
            created_at: Utc::now(),
            transactions: Vec::new(),
        }
    }

    fn entry(kind: HistoryKind, counterparty: &str) -> HistoryEntry {
        HistoryEntry {
            date: Utc::now(),
            kind,
            amount: Decimal::new(25, 1),
            currency: "USDC".into(),
            counterparty: counterparty.into(),
            status: "completed".into(),
            tx_hash: "sig".into(),
        }
    }

    #[test]
    fn lookup_ignores_case() {
        let store = MemoryKeyStore::new();
        store.insert(record("Alice", "addr-a")).unwrap();

        let found = store.find_by_name("aLiCe").unwrap().unwrap();
        assert_eq!(found.name, "Alice");
        assert!(store.find_by_name("bob").unwrap().is_none());
    }

    #[test]
    fn names_and_addresses_are_unique() {
        let store = MemoryKeyStore::new();
        store.insert(record("alice", "addr-a")).unwrap();

        assert!(matches!(
            store.insert(record("ALICE", "addr-b")),
            Err(StoreError::DuplicateName(_))
        ));
        assert!(matches!(
            store.insert(record("bob", "addr-a")),
            Err(StoreError::DuplicateAddress(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn search_matches_substring() {
        let store = MemoryKeyStore::new();
        store.insert(record("alice", "a")).unwrap();
        store.insert(record("Malik", "b")).unwrap();
        store.insert(record("bob", "c")).unwrap();

        let names: Vec<String> = store.search("LI").unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Malik".to_string(), "alice".to_string()]);
        assert!(store.search("zzz").unwrap().is_empty());
    }

    #[test]
    fn history_appends_in_order() {
        let store = MemoryKeyStore::new();
        store.insert(record("alice", "a")).unwrap();

        store.append_history("alice", entry(HistoryKind::Send, "bob")).unwrap();
        store.append_history("ALICE", entry(HistoryKind::Receive, "carol")).unwrap();

        let history = store.history("alice").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].counterparty, "bob");
        assert_eq!(history[1].kind, HistoryKind::Receive);
    }

    #[test]
    fn history_for_unknown_wallet_is_not_found() {
        let store = MemoryKeyStore::new();
        assert!(matches!(
            store.append_history("ghost", entry(HistoryKind::Send, "x")),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(store.history("ghost"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallets.json");

        let store = MemoryKeyStore::new();
        store.insert(record("alice", "a")).unwrap();
        store.insert(record("bob", "b")).unwrap();
        store.append_history("bob", entry(HistoryKind::Receive, "alice")).unwrap();
        store.save(&path).unwrap();

        let loaded = MemoryKeyStore::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.history("bob").unwrap().len(), 1);
        assert_eq!(
            loaded.find_by_name("alice").unwrap().unwrap().key,
            store.find_by_name("alice").unwrap().unwrap().key
        );
    }

    #[test]
    fn missing_snapshot_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryKeyStore::load(&dir.path().join("absent.json")).unwrap();
        assert!(store.is_empty());
    }
}
