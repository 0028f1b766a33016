//! Armored (PEM) text encoding and file decoding for certificates and keys.
//!
//! Text produced by [`encode_to_text`] is deterministic: LF line endings,
//! 64 column Base64 body, a single block framed by `-----BEGIN <LABEL>-----`
//! and `-----END <LABEL>-----`. [`decode_from_text`] is its exact inverse.
//!
//! Private keys are written as unencrypted PKCS#8. Callers decide where such
//! output may go.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use pem::{EncodeConfig, LineEnding, Pem};

use crate::cert::Certificate;
use crate::error::{CertVaultError, Result};
use crate::key::{PrivateKey, PublicKey};

pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";
pub const RSA_PRIVATE_KEY_LABEL: &str = "RSA PRIVATE KEY";
pub const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

const PEM_PREAMBLE: &[u8] = b"-----BEGIN";

/// An object with a DER form and a PEM label.
pub trait Armored: Sized {
    /// Label written in the header and footer lines.
    const LABEL: &'static str;

    fn to_der_bytes(&self) -> Result<Vec<u8>>;

    /// Decodes the body of a PEM block carrying `label`.
    fn from_pem_block(label: &str, der: &[u8]) -> Result<Self>;

    /// The error reported when input cannot be decoded as `Self`.
    fn malformed(reason: String) -> CertVaultError;
}

impl Armored for Certificate {
    const LABEL: &'static str = CERTIFICATE_LABEL;

    fn to_der_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.as_der().to_vec())
    }

    fn from_pem_block(label: &str, der: &[u8]) -> Result<Self> {
        // Some tools still emit the pre-RFC 7468 label.
        if label != CERTIFICATE_LABEL && label != "X509 CERTIFICATE" {
            return Err(Self::malformed(unexpected_label(CERTIFICATE_LABEL, label)));
        }
        Certificate::from_der(der)
    }

    fn malformed(reason: String) -> CertVaultError {
        CertVaultError::MalformedCertificateError(reason)
    }
}

impl Armored for PrivateKey {
    const LABEL: &'static str = PRIVATE_KEY_LABEL;

    fn to_der_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.to_pkcs8_der()?.to_vec())
    }

    fn from_pem_block(label: &str, der: &[u8]) -> Result<Self> {
        match label {
            PRIVATE_KEY_LABEL => PrivateKey::from_pkcs8_der(der),
            RSA_PRIVATE_KEY_LABEL => PrivateKey::from_pkcs1_der(der),
            other => Err(Self::malformed(unexpected_label(PRIVATE_KEY_LABEL, other))),
        }
    }

    fn malformed(reason: String) -> CertVaultError {
        CertVaultError::MalformedKeyError(reason)
    }
}

impl Armored for PublicKey {
    const LABEL: &'static str = PUBLIC_KEY_LABEL;

    fn to_der_bytes(&self) -> Result<Vec<u8>> {
        self.to_spki_der()
    }

    fn from_pem_block(label: &str, der: &[u8]) -> Result<Self> {
        if label != PUBLIC_KEY_LABEL {
            return Err(Self::malformed(unexpected_label(PUBLIC_KEY_LABEL, label)));
        }
        PublicKey::from_spki_der(der)
    }

    fn malformed(reason: String) -> CertVaultError {
        CertVaultError::MalformedKeyError(reason)
    }
}

fn unexpected_label(expected: &str, found: &str) -> String {
    format!("expected a '{expected}' block, found '{found}'")
}

/// Convert an object into a PEM-encoded string.
pub fn encode_to_text<T: Armored>(item: &T) -> Result<String> {
    let pem = Pem::new(T::LABEL, item.to_der_bytes()?);
    let config = EncodeConfig::new().set_line_ending(LineEnding::LF);
    Ok(pem::encode_config(&pem, config))
}

/// Convert a PEM-encoded string back into an object.
pub fn decode_from_text<T: Armored>(text: &str) -> Result<T> {
    if text.trim().is_empty() {
        return Err(CertVaultError::EmptyInputError);
    }
    let pem = pem::parse(text).map_err(|e| T::malformed(e.to_string()))?;
    T::from_pem_block(pem.tag(), pem.contents())
}

/// Reads a certificate, DER or PEM, from the file at `path`.
pub fn decode_from_file(path: impl AsRef<Path>) -> Result<Certificate> {
    let file = File::open(path.as_ref())?;
    decode_from_reader(file)
}

/// Reads a certificate, DER or PEM, from a stream positioned at its start.
///
/// The stream is read to its end before the encoding is chosen, so short
/// reads cannot hide a PEM preamble.
pub fn decode_from_reader<R: Read>(mut reader: R) -> Result<Certificate> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    if data.is_empty() {
        return Err(CertVaultError::EmptyInputError);
    }

    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    if data[start..].starts_with(PEM_PREAMBLE) {
        let text = std::str::from_utf8(&data)
            .map_err(|e| CertVaultError::MalformedCertificateError(e.to_string()))?;
        decode_from_text::<Certificate>(text)
    } else {
        Certificate::from_der(&data)
    }
}

/// Writes exported text verbatim to `path`, replacing any existing file.
pub fn write_text_file(path: impl AsRef<Path>, text: &str) -> Result<()> {
    std::fs::write(path.as_ref(), text.as_bytes())?;
    Ok(())
}
