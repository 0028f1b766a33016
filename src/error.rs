//! use certvault::error::CertVaultError;

use std::path::PathBuf;

use thiserror::Error;

/// Represents errors that can occur in the certvault library.
///
/// Every fallible operation returns one of these variants; nothing in the
/// library prints diagnostics or swallows a failure.
#[derive(Debug, Error)]
pub enum CertVaultError {
    /// The RSA provider could not produce a key with the requested parameters.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// The requested modulus is below the accepted minimum.
    #[error("Key size of {bits} bits is too weak, at least {minimum} bits are required")]
    WeakKeyError { bits: usize, minimum: usize },

    /// Signing the certificate body failed.
    #[error("Signature error: {0}")]
    SignatureError(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Input could not be parsed as an X.509 certificate.
    #[error("Malformed certificate: {0}")]
    MalformedCertificateError(String),

    /// Input could not be parsed as a private or public key.
    #[error("Malformed key: {0}")]
    MalformedKeyError(String),

    /// The input stream or text contained no data at all.
    #[error("No data to decode")]
    EmptyInputError,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The store password is wrong or the store contents were tampered with.
    #[error("Keystore authentication failed")]
    AuthenticationError,

    #[error("Keystore is corrupt: {0}")]
    CorruptStoreError(String),

    #[error("Keystore not found at {}", .0.display())]
    StoreNotFoundError(PathBuf),

    #[error("No entry with alias '{0}'")]
    AliasNotFoundError(String),

    #[error("An entry with alias '{0}' already exists")]
    DuplicateAliasError(String),

    /// The leaf certificate of a chain does not carry the public half of the
    /// supplied private key.
    #[error("Certificate chain does not match private key: {0}")]
    KeyChainMismatchError(String),

    /// A self-signed certificate was requested with a signer key that is not
    /// the subject's own key.
    #[error("Signer key does not belong to the self-signed subject")]
    KeyMismatchError,

    #[error("Invalid validity period: {0}")]
    InvalidValidityError(String),

    #[error("Invalid distinguished name '{name}': {reason}")]
    InvalidDistinguishedNameError { name: String, reason: String },

    #[error("Invalid alias: {0}")]
    InvalidAliasError(String),

    /// A certificate with the same issuer and serial number is already stored.
    #[error("Serial number {serial} from issuer '{issuer}' is already present in the keystore")]
    DuplicateSerialNumberError { issuer: String, serial: String },

    #[error("Entry '{alias}' is not a {expected} entry")]
    WrongEntryKindError { alias: String, expected: &'static str },

    /// Deriving the store key or sealing the store contents failed.
    #[error("Encryption error: {0}")]
    EncryptionError(String),

    /// A configuration value is missing or cannot be parsed.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<der::Error> for CertVaultError {
    /// Converts a `der::Error` into a `CertVaultError`.
    fn from(err: der::Error) -> Self {
        CertVaultError::EncodingError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CertVaultError>;
