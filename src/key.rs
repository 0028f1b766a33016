use std::fmt;

use rand_core::OsRng;
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1::DecodeRsaPrivateKey,
    pkcs8::{
        DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey,
        EncryptedPrivateKeyInfo,
    },
    traits::{PrivateKeyParts, PublicKeyParts},
};
use zeroize::Zeroizing;

use crate::error::{CertVaultError, Result};

/// Modulus length used when the caller does not ask for anything else.
pub const DEFAULT_KEY_BITS: usize = 1024;

/// Smallest modulus accepted by [`KeyPair::generate`].
pub const MIN_KEY_BITS: usize = 512;

/// Largest modulus accepted by [`KeyPair::generate`]. Public keys above this
/// size cannot be decoded back out of a certificate.
pub const MAX_KEY_BITS: usize = 4096;

/// An RSA private key.
///
/// The underlying `rsa` key zeroizes its components when dropped.
#[derive(Clone)]
pub struct PrivateKey(RsaPrivateKey);

/// An RSA public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

/// A freshly generated RSA key pair.
#[derive(Clone, Debug)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate an RSA key pair with the specified number of bits.
    ///
    /// Randomness comes exclusively from the operating system CSPRNG.
    pub fn generate(bits: usize) -> Result<Self> {
        if bits < MIN_KEY_BITS {
            return Err(CertVaultError::WeakKeyError {
                bits,
                minimum: MIN_KEY_BITS,
            });
        }
        if bits > MAX_KEY_BITS {
            return Err(CertVaultError::KeyGenerationError(format!(
                "key size of {bits} bits exceeds the maximum of {MAX_KEY_BITS} bits"
            )));
        }
        let mut rng = OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| CertVaultError::KeyGenerationError(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(KeyPair {
            private: PrivateKey(private),
            public: PublicKey(public),
        })
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Splits the pair, handing ownership of both halves to the caller.
    pub fn into_parts(self) -> (PrivateKey, PublicKey) {
        (self.private, self.public)
    }
}

/// Generate an RSA key pair; see [`KeyPair::generate`].
pub fn generate_key_pair(bits: usize) -> Result<KeyPair> {
    KeyPair::generate(bits)
}

impl PrivateKey {
    /// Recomputes the public half of this key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(RsaPublicKey::from(&self.0))
    }

    /// Modulus length in bits.
    pub fn bits(&self) -> usize {
        self.0.n().bits()
    }

    pub fn as_rsa(&self) -> &RsaPrivateKey {
        &self.0
    }

    /// Encodes the key as an unencrypted PKCS#8 `PrivateKeyInfo`.
    pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let doc = self
            .0
            .to_pkcs8_der()
            .map_err(|e| CertVaultError::EncodingError(e.to_string()))?;
        Ok(Zeroizing::new(doc.as_bytes().to_vec()))
    }

    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        RsaPrivateKey::from_pkcs8_der(der)
            .map(PrivateKey)
            .map_err(|e| CertVaultError::MalformedKeyError(e.to_string()))
    }

    /// Decodes a bare PKCS#1 `RSAPrivateKey`, the layout of legacy
    /// `RSA PRIVATE KEY` PEM blocks.
    pub fn from_pkcs1_der(der: &[u8]) -> Result<Self> {
        RsaPrivateKey::from_pkcs1_der(der)
            .map(PrivateKey)
            .map_err(|e| CertVaultError::MalformedKeyError(e.to_string()))
    }

    /// Decodes a PKCS#8 `EncryptedPrivateKeyInfo` protected by `password`.
    ///
    /// An undecodable envelope is [`CertVaultError::MalformedKeyError`]. A
    /// password that does not yield a key is
    /// [`CertVaultError::AuthenticationError`]; CBC padding can accept a wrong
    /// password, so a key that fails to parse after decryption counts too.
    pub fn from_encrypted_pkcs8_der(der: &[u8], password: &[u8]) -> Result<Self> {
        let info = EncryptedPrivateKeyInfo::try_from(der)
            .map_err(|e| CertVaultError::MalformedKeyError(e.to_string()))?;
        let document = info
            .decrypt(password)
            .map_err(|_| CertVaultError::AuthenticationError)?;
        RsaPrivateKey::from_pkcs8_der(document.as_bytes())
            .map(PrivateKey)
            .map_err(|_| CertVaultError::AuthenticationError)
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.n() == other.0.n()
            && self.0.e() == other.0.e()
            && self.0.d() == other.0.d()
            && self.0.primes() == other.0.primes()
    }
}

impl Eq for PrivateKey {}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

impl PublicKey {
    pub fn bits(&self) -> usize {
        self.0.n().bits()
    }

    pub fn as_rsa(&self) -> &RsaPublicKey {
        &self.0
    }

    /// Encodes the key as a DER `SubjectPublicKeyInfo`.
    pub fn to_spki_der(&self) -> Result<Vec<u8>> {
        self.0
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CertVaultError::EncodingError(e.to_string()))
    }

    pub fn from_spki_der(der: &[u8]) -> Result<Self> {
        RsaPublicKey::from_public_key_der(der)
            .map(PublicKey)
            .map_err(|e| CertVaultError::MalformedKeyError(e.to_string()))
    }
}
