//! # CertVault - A Pure Rust Keystore and Certificate Tool
//!
//! CertVault generates RSA key pairs, wraps them into self-signed or
//! CA-issued X.509 certificates and keeps them in a password protected
//! keystore file. It is built entirely with rustcrypto libraries.
//!
//! ## Supported Key Types
//!
//! - **RSA**: 1024 bits by default, any size from 512 to 4096 bits
//!
//! Certificates are signed with SHA-256 with RSA (PKCS#1 v1.5).
//!
//! ## Supported Formats
//!
//! - **DER**: Distinguished Encoding Rules (binary format), accepted on import
//! - **PEM**: Privacy-Enhanced Mail (base64-encoded text format), for import and export
//! - **Keystore**: an Argon2id + ChaCha20-Poly1305 sealed container holding
//!   private key entries (PKCS#8, PBES2 encrypted) and trusted certificates
//!
//! ## Quick Start
//!
//! ### Generating a Self-Signed Certificate
//!
//! ```rust,no_run
//! use certvault::{
//!     cert::params::{DistinguishedName, Validity},
//!     issuer::build_certificate,
//!     key::KeyPair,
//! };
//!
//! # fn main() -> Result<(), certvault::error::CertVaultError> {
//! let key_pair = KeyPair::generate(1024)?;
//! let subject = DistinguishedName::parse("CN=Alice-Subject, O=ENSISA, L=Mulhouse, ST=68, C=FR")?;
//!
//! let certificate = build_certificate(
//!     &subject,
//!     &subject,
//!     &key_pair,
//!     key_pair.private_key(),
//!     Validity::for_days(365)?,
//! )?;
//!
//! println!("{}", certificate.to_pem()?);
//! # Ok(())
//! # }
//! ```
//!
//! ### Keeping Keys in a Store
//!
//! ```rust,no_run
//! use certvault::{config::{StoreConfig, password_from_env}, session::Session};
//!
//! # fn main() -> Result<(), certvault::error::CertVaultError> {
//! let mut session = Session::open_or_create(StoreConfig::from_env()?, password_from_env()?)?;
//!
//! session.generate_and_store_key("alice", "CN=Alice-Subject, O=ENSISA, C=FR")?;
//! println!("{}", session.get_details("alice")?);
//!
//! session.export_entry("alice", "alice.pem")?;
//! session.save_store()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns a [`error::CertVaultError`]:
//!
//! ```rust
//! use certvault::{cert::Certificate, codec::decode_from_text, error::CertVaultError};
//!
//! match decode_from_text::<Certificate>("") {
//!     Ok(_) => println!("Certificate decoded"),
//!     Err(CertVaultError::EmptyInputError) => println!("Nothing to decode"),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`key`]: RSA key generation and key encodings
//! - [`cert`]: Certificate parsing, accessors and extensions
//! - [`issuer`]: Certificate construction and signing
//! - [`codec`]: PEM and DER encoding and file decoding
//! - [`keystore`]: The password protected entry store
//! - [`session`]: Store operations for front ends
//! - [`config`]: Store location and generation settings
//! - [`error`]: Error types
//! - [`tbs_certificate`]: Low-level certificate structure manipulation

pub mod cert;
pub mod codec;
pub mod config;
pub mod error;
pub mod issuer;
pub mod key;
pub mod keystore;
pub mod pki;
pub mod session;
pub mod tbs_certificate;
