//! On-disk container for a keystore.
//!
//! ```text
//! magic "CVKS" | version u8 | argon2 m_cost, t_cost, p_cost, key iterations (u32 LE)
//!             | salt [16] | nonce [12] | password check [16]
//!             | ChaCha20-Poly1305(bincode(StoreContents))
//! ```
//!
//! Argon2id stretches the password into a master key. The cipher key and the
//! password check are separate SHA-256 derivations of it. A password check
//! mismatch is an authentication failure; once it matches, a ciphertext that
//! does not decrypt means the file is damaged. The whole header is bound to
//! the ciphertext as associated data.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{CertVaultError, Result};

pub const MAGIC: &[u8; 4] = b"CVKS";
pub const FORMAT_VERSION: u8 = 1;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const PARAMS_LEN: usize = 16;
const CHECK_LEN: usize = 16;
const HEADER_LEN: usize = MAGIC.len() + 1 + PARAMS_LEN + SALT_LEN + NONCE_LEN + CHECK_LEN;

const CIPHER_KEY_LABEL: &[u8] = b"certvault store key";
const PASSWORD_CHECK_LABEL: &[u8] = b"certvault password check";

// Upper bounds on parameters read back from a file.
const MAX_MEMORY_KIB: u32 = 4 * 1024 * 1024;
const MAX_ITERATIONS: u32 = 64;
const MAX_PARALLELISM: u32 = 64;
const MAX_KEY_ITERATIONS: u32 = 10_000_000;

/// Argon2id cost parameters for the store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    fn argon2(&self) -> std::result::Result<Argon2<'static>, argon2::Error> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_LEN),
        )?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    fn within_limits(&self) -> bool {
        self.memory_kib <= MAX_MEMORY_KIB
            && (1..=MAX_ITERATIONS).contains(&self.iterations)
            && (1..=MAX_PARALLELISM).contains(&self.parallelism)
    }
}

/// Password protection settings: the store-wide KDF and the PBKDF2 iteration
/// count used for each private key entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protection {
    pub kdf: KdfParams,
    pub key_iterations: u32,
}

impl Default for Protection {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            key_iterations: 100_000,
        }
    }
}

impl Protection {
    /// Cheap settings for tests and throwaway stores.
    pub fn fast() -> Self {
        Self {
            kdf: KdfParams {
                memory_kib: 8,
                iterations: 1,
                parallelism: 1,
            },
            key_iterations: 1_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoreContents {
    pub(crate) entries: Vec<StoredEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub(crate) alias: String,
    /// Unix seconds.
    pub(crate) created_at: i64,
    pub(crate) body: StoredBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) enum StoredBody {
    PrivateKey {
        encrypted_key: Vec<u8>,
        chain: Vec<Vec<u8>>,
    },
    TrustedCertificate {
        certificate: Vec<u8>,
    },
}

fn corrupt(reason: impl Into<String>) -> CertVaultError {
    CertVaultError::CorruptStoreError(reason.into())
}

struct StoreKeys {
    cipher_key: Zeroizing<[u8; KEY_LEN]>,
    password_check: [u8; CHECK_LEN],
}

fn derive_keys(
    kdf: &KdfParams,
    password: &[u8],
    salt: &[u8],
) -> std::result::Result<StoreKeys, argon2::Error> {
    let mut master = Zeroizing::new([0u8; KEY_LEN]);
    kdf.argon2()?.hash_password_into(password, salt, &mut master[..])?;

    let mut cipher_key = Zeroizing::new([0u8; KEY_LEN]);
    cipher_key.copy_from_slice(
        &Sha256::new()
            .chain_update(CIPHER_KEY_LABEL)
            .chain_update(&master[..])
            .finalize(),
    );
    let mut password_check = [0u8; CHECK_LEN];
    password_check.copy_from_slice(
        &Sha256::new()
            .chain_update(PASSWORD_CHECK_LABEL)
            .chain_update(&master[..])
            .finalize()[..CHECK_LEN],
    );
    Ok(StoreKeys {
        cipher_key,
        password_check,
    })
}

/// Compares without an early exit on the first differing byte.
fn checks_match(expected: &[u8], actual: &[u8]) -> bool {
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn encode_header(
    protection: &Protection,
    salt: &[u8],
    nonce: &[u8],
    password_check: &[u8],
) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(MAGIC);
    header.push(FORMAT_VERSION);
    header.extend_from_slice(&protection.kdf.memory_kib.to_le_bytes());
    header.extend_from_slice(&protection.kdf.iterations.to_le_bytes());
    header.extend_from_slice(&protection.kdf.parallelism.to_le_bytes());
    header.extend_from_slice(&protection.key_iterations.to_le_bytes());
    header.extend_from_slice(salt);
    header.extend_from_slice(nonce);
    header.extend_from_slice(password_check);
    header
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

/// Serializes and encrypts `contents` under `password`.
pub(crate) fn seal(
    contents: &StoreContents,
    password: &[u8],
    protection: &Protection,
) -> Result<Vec<u8>> {
    let plaintext = Zeroizing::new(
        bincode::serialize(contents).map_err(|e| CertVaultError::EncodingError(e.to_string()))?,
    );

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let keys = derive_keys(&protection.kdf, password, &salt)
        .map_err(|e| CertVaultError::EncryptionError(e.to_string()))?;
    let header = encode_header(protection, &salt, &nonce, &keys.password_check);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&keys.cipher_key[..]));
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &plaintext,
                aad: &header,
            },
        )
        .map_err(|e| CertVaultError::EncryptionError(e.to_string()))?;

    let mut out = header;
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Authenticates and decrypts a sealed store.
///
/// Returns the contents with the protection settings recorded in the header.
/// A wrong password is [`CertVaultError::AuthenticationError`]; a file that
/// passes the password check but does not decrypt is
/// [`CertVaultError::CorruptStoreError`].
pub(crate) fn unseal(bytes: &[u8], password: &[u8]) -> Result<(StoreContents, Protection)> {
    if bytes.len() < HEADER_LEN {
        return Err(corrupt("file is shorter than the store header"));
    }
    let (header, ciphertext) = bytes.split_at(HEADER_LEN);
    if &header[..MAGIC.len()] != MAGIC {
        return Err(corrupt("not a keystore file"));
    }
    let version = header[MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {version}")));
    }

    let params_at = MAGIC.len() + 1;
    let protection = Protection {
        kdf: KdfParams {
            memory_kib: read_u32(header, params_at),
            iterations: read_u32(header, params_at + 4),
            parallelism: read_u32(header, params_at + 8),
        },
        key_iterations: read_u32(header, params_at + 12),
    };
    if !protection.kdf.within_limits()
        || !(1..=MAX_KEY_ITERATIONS).contains(&protection.key_iterations)
    {
        return Err(corrupt("protection parameters out of range"));
    }

    let salt_at = params_at + PARAMS_LEN;
    let salt = &header[salt_at..salt_at + SALT_LEN];
    let nonce_at = salt_at + SALT_LEN;
    let nonce = &header[nonce_at..nonce_at + NONCE_LEN];
    let stored_check = &header[nonce_at + NONCE_LEN..];

    let keys = derive_keys(&protection.kdf, password, salt).map_err(|e| corrupt(e.to_string()))?;
    if !checks_match(&keys.password_check, stored_check) {
        return Err(CertVaultError::AuthenticationError);
    }
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&keys.cipher_key[..]));
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: header,
                },
            )
            .map_err(|_| corrupt("store contents fail integrity check"))?,
    );

    let contents: StoreContents =
        bincode::deserialize(&plaintext).map_err(|e| corrupt(e.to_string()))?;
    Ok((contents, protection))
}
