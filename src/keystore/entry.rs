use std::fmt;

use pkcs8::PrivateKeyInfo;
use pkcs8::pkcs5::pbes2;
use rand_core::{OsRng, RngCore};
use time::OffsetDateTime;

use crate::cert::Certificate;
use crate::error::{CertVaultError, Result};
use crate::key::PrivateKey;

/// The two families of keystore entries. Aliases share one namespace across
/// both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    PrivateKey,
    TrustedCertificate,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::PrivateKey => "private key",
            EntryKind::TrustedCertificate => "trusted certificate",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStoreEntry {
    PrivateKey(PrivateKeyEntry),
    TrustedCertificate(TrustedCertificateEntry),
}

impl KeyStoreEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            KeyStoreEntry::PrivateKey(_) => EntryKind::PrivateKey,
            KeyStoreEntry::TrustedCertificate(_) => EntryKind::TrustedCertificate,
        }
    }

    /// The leaf certificate of a key entry, or the trusted certificate.
    pub fn certificate(&self) -> &Certificate {
        match self {
            KeyStoreEntry::PrivateKey(entry) => entry.certificate(),
            KeyStoreEntry::TrustedCertificate(entry) => entry.certificate(),
        }
    }

    pub fn created_at(&self) -> OffsetDateTime {
        match self {
            KeyStoreEntry::PrivateKey(entry) => entry.created_at,
            KeyStoreEntry::TrustedCertificate(entry) => entry.created_at,
        }
    }
}

/// A private key with its certificate chain, leaf first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateKeyEntry {
    pub(crate) key: ProtectedKey,
    pub(crate) chain: Vec<Certificate>,
    pub(crate) created_at: OffsetDateTime,
}

impl PrivateKeyEntry {
    pub fn protected_key(&self) -> &ProtectedKey {
        &self.key
    }

    pub fn certificate_chain(&self) -> &[Certificate] {
        &self.chain
    }

    pub fn certificate(&self) -> &Certificate {
        // Chains are checked to be non-empty on insertion and on load.
        &self.chain[0]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedCertificateEntry {
    pub(crate) certificate: Certificate,
    pub(crate) created_at: OffsetDateTime,
}

impl TrustedCertificateEntry {
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }
}

/// A private key sealed as a PKCS#8 `EncryptedPrivateKeyInfo`
/// (PBES2: PBKDF2-SHA256 and AES-256-CBC).
#[derive(Clone, PartialEq, Eq)]
pub struct ProtectedKey(Vec<u8>);

impl ProtectedKey {
    pub(crate) fn seal(key: &PrivateKey, password: &[u8], iterations: u32) -> Result<Self> {
        let encryption_error = |e: &dyn fmt::Display| CertVaultError::EncryptionError(e.to_string());

        let der = key.to_pkcs8_der()?;
        let info = PrivateKeyInfo::try_from(der.as_slice()).map_err(|e| encryption_error(&e))?;

        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let mut iv = [0u8; 16];
        OsRng.fill_bytes(&mut iv);

        let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(iterations, &salt, &iv)
            .map_err(|e| encryption_error(&e))?;
        let document = info
            .encrypt_with_params(params, password)
            .map_err(|e| encryption_error(&e))?;

        Ok(Self(document.as_bytes().to_vec()))
    }

    /// Decrypts the key. A wrong password yields
    /// [`CertVaultError::AuthenticationError`].
    pub(crate) fn open(&self, password: &[u8]) -> Result<PrivateKey> {
        PrivateKey::from_encrypted_pkcs8_der(&self.0, password)
    }

    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ProtectedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProtectedKey({} bytes)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyPair;

    #[test]
    fn protected_key_opens_with_the_sealing_password() {
        let key_pair = KeyPair::generate(512).unwrap();
        let sealed = ProtectedKey::seal(key_pair.private_key(), b"keytool", 1_000).unwrap();
        assert_eq!(&sealed.open(b"keytool").unwrap(), key_pair.private_key());
    }

    #[test]
    fn protected_key_rejects_other_passwords() {
        let key_pair = KeyPair::generate(512).unwrap();
        let sealed = ProtectedKey::seal(key_pair.private_key(), b"keytool", 1_000).unwrap();
        assert!(matches!(
            sealed.open(b"not keytool"),
            Err(CertVaultError::AuthenticationError)
        ));
    }

    #[test]
    fn sealing_twice_uses_fresh_salt() {
        let key_pair = KeyPair::generate(512).unwrap();
        let a = ProtectedKey::seal(key_pair.private_key(), b"pw", 1_000).unwrap();
        let b = ProtectedKey::seal(key_pair.private_key(), b"pw", 1_000).unwrap();
        assert_ne!(a, b);
        assert!(format!("{a:?}").starts_with("ProtectedKey("));
    }
}
