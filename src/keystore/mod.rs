//! A password protected, file backed store of named entries.
//!
//! Each entry is either a private key with its certificate chain or a
//! trusted certificate. The store lives in memory once opened; nothing is
//! written back until [`KeyStore::save`] is called.

pub mod entry;
pub mod format;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use der::Encode;
use secrecy::{ExposeSecret, SecretString};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::cert::Certificate;
use crate::error::{CertVaultError, Result};
use crate::key::PrivateKey;
pub use entry::{EntryKind, KeyStoreEntry, PrivateKeyEntry, ProtectedKey, TrustedCertificateEntry};
pub use format::{KdfParams, Protection};
use format::{StoreContents, StoredBody, StoredEntry};

#[derive(Debug)]
pub struct KeyStore {
    path: PathBuf,
    password: SecretString,
    protection: Protection,
    entries: BTreeMap<String, KeyStoreEntry>,
}

impl KeyStore {
    /// Creates an empty store bound to `path`. Nothing touches the disk
    /// until the first [`save`](Self::save).
    pub fn create(path: impl Into<PathBuf>, password: SecretString) -> Self {
        let path = path.into();
        debug!(path = %path.display(), "created empty keystore");
        Self {
            path,
            password,
            protection: Protection::default(),
            entries: BTreeMap::new(),
        }
    }

    /// Loads and authenticates the store at `path`.
    ///
    /// A missing file yields [`CertVaultError::StoreNotFoundError`], a wrong
    /// password [`CertVaultError::AuthenticationError`] and anything
    /// unreadable after authentication [`CertVaultError::CorruptStoreError`].
    pub fn open(path: impl Into<PathBuf>, password: SecretString) -> Result<Self> {
        let path = path.into();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CertVaultError::StoreNotFoundError(path));
            }
            Err(e) => return Err(e.into()),
        };

        let (contents, protection) =
            match format::unseal(&bytes, password.expose_secret().as_bytes()) {
                Ok(unsealed) => unsealed,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to open keystore");
                    return Err(e);
                }
            };

        let mut entries = BTreeMap::new();
        for stored in contents.entries {
            let (alias, entry) = decode_entry(stored)?;
            if entries.insert(alias.clone(), entry).is_some() {
                return Err(CertVaultError::CorruptStoreError(format!(
                    "alias '{alias}' appears twice"
                )));
            }
        }

        info!(path = %path.display(), entries = entries.len(), "opened keystore");
        Ok(Self {
            path,
            password,
            protection,
            entries,
        })
    }

    /// Replaces the protection settings used by the next save and by keys
    /// added from now on.
    pub fn with_protection(mut self, protection: Protection) -> Self {
        self.protection = protection;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn protection(&self) -> &Protection {
        &self.protection
    }

    /// Stores `key` under `alias` together with its certificate chain, leaf
    /// first. The key is sealed with the store password before it is kept.
    pub fn add_private_key_entry(
        &mut self,
        alias: &str,
        key: &PrivateKey,
        chain: Vec<Certificate>,
    ) -> Result<()> {
        self.check_new_alias(alias)?;

        let leaf = chain.first().ok_or_else(|| {
            CertVaultError::KeyChainMismatchError("certificate chain is empty".to_string())
        })?;
        // Compared as encoded SPKI so no key size limit applies.
        let leaf_spki = leaf.inner().tbs_certificate.subject_public_key_info.to_der()?;
        if leaf_spki != key.public_key().to_spki_der()? {
            return Err(CertVaultError::KeyChainMismatchError(format!(
                "leaf certificate for '{}' does not carry the key's public half",
                leaf.subject()
            )));
        }
        self.check_serial_is_new(leaf)?;

        let protected = ProtectedKey::seal(
            key,
            self.password.expose_secret().as_bytes(),
            self.protection.key_iterations,
        )?;
        self.entries.insert(
            alias.to_string(),
            KeyStoreEntry::PrivateKey(PrivateKeyEntry {
                key: protected,
                chain,
                created_at: now(),
            }),
        );
        debug!(alias, "added private key entry");
        Ok(())
    }

    pub fn add_trusted_certificate(&mut self, alias: &str, certificate: Certificate) -> Result<()> {
        self.check_new_alias(alias)?;
        self.check_serial_is_new(&certificate)?;
        self.entries.insert(
            alias.to_string(),
            KeyStoreEntry::TrustedCertificate(TrustedCertificateEntry {
                certificate,
                created_at: now(),
            }),
        );
        debug!(alias, "added trusted certificate entry");
        Ok(())
    }

    pub fn remove_entry(&mut self, alias: &str) -> Result<KeyStoreEntry> {
        let entry = self
            .entries
            .remove(alias)
            .ok_or_else(|| CertVaultError::AliasNotFoundError(alias.to_string()))?;
        debug!(alias, kind = %entry.kind(), "removed entry");
        Ok(entry)
    }

    pub fn get_entry(&self, alias: &str) -> Result<&KeyStoreEntry> {
        self.entries
            .get(alias)
            .ok_or_else(|| CertVaultError::AliasNotFoundError(alias.to_string()))
    }

    /// Decrypts the private key stored under `alias`.
    pub fn get_private_key(&self, alias: &str) -> Result<PrivateKey> {
        match self.get_entry(alias)? {
            KeyStoreEntry::PrivateKey(entry) => {
                entry.key.open(self.password.expose_secret().as_bytes())
            }
            KeyStoreEntry::TrustedCertificate(_) => Err(CertVaultError::WrongEntryKindError {
                alias: alias.to_string(),
                expected: EntryKind::PrivateKey.as_str(),
            }),
        }
    }

    /// The leaf certificate of a key entry, or the trusted certificate.
    pub fn get_certificate(&self, alias: &str) -> Result<&Certificate> {
        Ok(self.get_entry(alias)?.certificate())
    }

    pub fn get_certificate_chain(&self, alias: &str) -> Result<&[Certificate]> {
        Ok(match self.get_entry(alias)? {
            KeyStoreEntry::PrivateKey(entry) => entry.certificate_chain(),
            KeyStoreEntry::TrustedCertificate(entry) => std::slice::from_ref(&entry.certificate),
        })
    }

    /// Aliases of entries of `kind`, in lexicographic order.
    pub fn list_aliases(&self, kind: EntryKind) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.kind() == kind)
            .map(|(alias, _)| alias.clone())
            .collect()
    }

    /// Every alias, in lexicographic order.
    pub fn aliases(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-seals every private key under `new_password`, which also protects
    /// the store from the next save on. On failure the store is unchanged.
    pub fn change_password(&mut self, new_password: SecretString) -> Result<()> {
        let old = self.password.expose_secret().as_bytes();
        let new = new_password.expose_secret().as_bytes();

        let mut resealed = Vec::new();
        for (alias, entry) in &self.entries {
            if let KeyStoreEntry::PrivateKey(entry) = entry {
                let key = entry.key.open(old)?;
                resealed.push((
                    alias.clone(),
                    ProtectedKey::seal(&key, new, self.protection.key_iterations)?,
                ));
            }
        }

        for (alias, protected) in resealed {
            if let Some(KeyStoreEntry::PrivateKey(entry)) = self.entries.get_mut(&alias) {
                entry.key = protected;
            }
        }
        self.password = new_password;
        info!(path = %self.path.display(), "changed keystore password");
        Ok(())
    }

    /// Writes the store to its path.
    ///
    /// The file is replaced atomically: readers see either the previous or
    /// the new contents. Saves to the same path from one process are
    /// serialized.
    pub fn save(&self) -> Result<()> {
        let contents = StoreContents {
            entries: self
                .entries
                .iter()
                .map(|(alias, entry)| encode_entry(alias, entry))
                .collect(),
        };
        let sealed = format::seal(
            &contents,
            self.password.expose_secret().as_bytes(),
            &self.protection,
        )?;

        let key = lock_key(&self.path);
        let lock = path_lock(&key);
        let written = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            write_atomically(&self.path, &sealed)
        };
        drop(lock);
        release_path_lock(&key);
        written?;

        info!(path = %self.path.display(), entries = self.entries.len(), "saved keystore");
        Ok(())
    }

    fn check_new_alias(&self, alias: &str) -> Result<()> {
        if alias.trim().is_empty() {
            return Err(CertVaultError::InvalidAliasError(
                "alias must not be empty".to_string(),
            ));
        }
        if self.entries.contains_key(alias) {
            return Err(CertVaultError::DuplicateAliasError(alias.to_string()));
        }
        Ok(())
    }

    /// Issuer and serial number together must identify one certificate.
    fn check_serial_is_new(&self, certificate: &Certificate) -> Result<()> {
        let tbs = &certificate.inner().tbs_certificate;
        let clash = self.entries.values().any(|entry| {
            let existing = &entry.certificate().inner().tbs_certificate;
            existing.issuer == tbs.issuer && existing.serial_number == tbs.serial_number
        });
        if clash {
            return Err(CertVaultError::DuplicateSerialNumberError {
                issuer: certificate.issuer().to_string(),
                serial: certificate.serial_number_hex(),
            });
        }
        Ok(())
    }
}

fn now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0).unwrap_or(now)
}

fn encode_entry(alias: &str, entry: &KeyStoreEntry) -> StoredEntry {
    let body = match entry {
        KeyStoreEntry::PrivateKey(entry) => StoredBody::PrivateKey {
            encrypted_key: entry.key.as_bytes().to_vec(),
            chain: entry
                .chain
                .iter()
                .map(|cert| cert.as_der().to_vec())
                .collect(),
        },
        KeyStoreEntry::TrustedCertificate(entry) => StoredBody::TrustedCertificate {
            certificate: entry.certificate.as_der().to_vec(),
        },
    };
    StoredEntry {
        alias: alias.to_string(),
        created_at: entry.created_at().unix_timestamp(),
        body,
    }
}

fn decode_entry(stored: StoredEntry) -> Result<(String, KeyStoreEntry)> {
    let corrupt = |reason: String| CertVaultError::CorruptStoreError(reason);
    let alias = stored.alias;
    let created_at = OffsetDateTime::from_unix_timestamp(stored.created_at)
        .map_err(|e| corrupt(format!("entry '{alias}': {e}")))?;
    let parse = |der: &[u8]| {
        Certificate::from_der(der).map_err(|e| corrupt(format!("entry '{alias}': {e}")))
    };

    let entry = match stored.body {
        StoredBody::PrivateKey {
            encrypted_key,
            chain,
        } => {
            if chain.is_empty() {
                return Err(corrupt(format!("entry '{alias}' has no certificate chain")));
            }
            let chain = chain
                .iter()
                .map(|der| parse(der))
                .collect::<Result<Vec<_>>>()?;
            KeyStoreEntry::PrivateKey(PrivateKeyEntry {
                key: ProtectedKey::from_bytes(encrypted_key),
                chain,
                created_at,
            })
        }
        StoredBody::TrustedCertificate { certificate } => {
            KeyStoreEntry::TrustedCertificate(TrustedCertificateEntry {
                certificate: parse(&certificate)?,
                created_at,
            })
        }
    };
    Ok((alias, entry))
}

/// One mutex per store path with a save in flight, shared by every
/// [`KeyStore`] in the process.
static PATH_LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

fn path_locks() -> MutexGuard<'static, HashMap<PathBuf, Arc<Mutex<()>>>> {
    PATH_LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn path_lock(key: &Path) -> Arc<Mutex<()>> {
    path_locks().entry(key.to_path_buf()).or_default().clone()
}

/// Forgets the lock for `key` once no save holds it any more.
fn release_path_lock(key: &Path) {
    let mut locks = path_locks();
    if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
        locks.remove(key);
    }
}

fn lock_key(path: &Path) -> PathBuf {
    // The file itself may not exist yet, so resolve its directory instead.
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            fs::canonicalize(parent)
                .map(|dir| dir.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
