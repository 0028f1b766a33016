pub mod extensions;
pub mod params;

use der::{Any, Decode, Encode, Tag};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::{CertVaultError, Result};
use crate::issuer::{Issuer, NamedIssuer};
use crate::key::{KeyPair, PrivateKey, PublicKey};
use extensions::{BasicConstraints, ToAndFromX509Extension};
use params::{CertificateParams, DistinguishedName, Validity, from_x509_time};

/// The signature algorithm used for every certificate this crate issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption (PKCS#1 v1.5).
    Sha256WithRSA,
}

impl SignatureAlgorithm {
    pub fn oid(&self) -> const_oid::ObjectIdentifier {
        match self {
            SignatureAlgorithm::Sha256WithRSA => const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha256WithRSA => "SHA256withRSA",
        }
    }

    /// RSA signature identifiers carry an explicit NULL parameter.
    pub fn algorithm_identifier(&self) -> Result<AlgorithmIdentifierOwned> {
        Ok(AlgorithmIdentifierOwned {
            oid: self.oid(),
            parameters: Some(Any::new(Tag::Null, Vec::<u8>::new())?),
        })
    }
}

const SIGNATURE_ALGORITHM_NAMES: &[(&str, &str)] = &[
    ("1.2.840.113549.1.1.4", "MD5withRSA"),
    ("1.2.840.113549.1.1.5", "SHA1withRSA"),
    ("1.2.840.113549.1.1.11", "SHA256withRSA"),
    ("1.2.840.113549.1.1.12", "SHA384withRSA"),
    ("1.2.840.113549.1.1.13", "SHA512withRSA"),
    ("1.2.840.113549.1.1.10", "RSASSA-PSS"),
    ("1.2.840.10045.4.3.2", "SHA256withECDSA"),
    ("1.2.840.10045.4.3.3", "SHA384withECDSA"),
    ("1.2.840.10045.4.3.4", "SHA512withECDSA"),
    ("1.3.101.112", "Ed25519"),
];

/// An immutable X.509 certificate.
///
/// The DER encoding is kept alongside the parsed structure; two certificates
/// are equal when their encodings are.
#[derive(Debug, Clone)]
pub struct Certificate {
    inner: x509_cert::Certificate,
    der: Vec<u8>,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl Certificate {
    /// Parses a DER encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = x509_cert::Certificate::from_der(der)
            .map_err(|e| CertVaultError::MalformedCertificateError(e.to_string()))?;
        Self::from_parts(inner, der.to_vec())
    }

    pub(crate) fn from_inner(inner: x509_cert::Certificate) -> Result<Self> {
        let der = inner.to_der()?;
        Self::from_parts(inner, der)
    }

    fn from_parts(inner: x509_cert::Certificate, der: Vec<u8>) -> Result<Self> {
        let validity = &inner.tbs_certificate.validity;
        let not_before = from_x509_time(&validity.not_before)?;
        let not_after = from_x509_time(&validity.not_after)?;
        Ok(Self {
            inner,
            der,
            not_before,
            not_after,
        })
    }

    /// Creates a new self-signed certificate for `key_pair`.
    ///
    /// Fails with [`CertVaultError::KeyMismatchError`] when `cert_info` names
    /// a public key other than the pair's own.
    pub fn new_self_signed(
        cert_info: &CertificateParams,
        key_pair: &KeyPair,
        validity: Validity,
    ) -> Result<Self> {
        if cert_info.subject_public_key != *key_pair.public_key() {
            return Err(CertVaultError::KeyMismatchError);
        }

        // For self-signed certificates, the issuer is the same as the subject
        let self_issuer = NamedIssuer {
            name: cert_info.subject.clone(),
            key: key_pair.private_key(),
        };
        self_issuer.issue(cert_info, validity)
    }

    pub fn inner(&self) -> &x509_cert::Certificate {
        &self.inner
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> Result<String> {
        crate::codec::encode_to_text(self)
    }

    /// Big-endian bytes of the serial number.
    pub fn serial_number(&self) -> &[u8] {
        self.inner.tbs_certificate.serial_number.as_bytes()
    }

    /// Serial number as colon separated upper case hex, without the sign
    /// padding byte DER may add.
    pub fn serial_number_hex(&self) -> String {
        let bytes = self.serial_number();
        let trimmed = match bytes {
            [0, rest @ ..] if !rest.is_empty() => rest,
            _ => bytes,
        };
        trimmed
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":")
    }

    pub fn issuer(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(self.inner.tbs_certificate.issuer.clone())
    }

    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(self.inner.tbs_certificate.subject.clone())
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    /// Issuer and subject carry the same name.
    pub fn is_self_issued(&self) -> bool {
        self.inner.tbs_certificate.issuer == self.inner.tbs_certificate.subject
    }

    /// The subject's RSA public key.
    pub fn public_key(&self) -> Result<PublicKey> {
        let spki = self.inner.tbs_certificate.subject_public_key_info.to_der()?;
        PublicKey::from_spki_der(&spki)
    }

    /// Human readable name of the signature algorithm, or the dotted OID when
    /// the algorithm is unknown.
    pub fn signature_algorithm_name(&self) -> String {
        let oid = self.inner.signature_algorithm.oid.to_string();
        SIGNATURE_ALGORITHM_NAMES
            .iter()
            .find(|(dotted, _)| *dotted == oid)
            .map(|(_, name)| name.to_string())
            .unwrap_or(oid)
    }

    pub fn certificate_type(&self) -> &'static str {
        "X.509"
    }

    /// Decoded Basic Constraints extension, if the certificate carries one.
    pub fn basic_constraints(&self) -> Result<Option<BasicConstraints>> {
        let extensions = self.inner.tbs_certificate.extensions.as_deref().unwrap_or_default();
        extensions
            .iter()
            .find(|ext| ext.extn_id == BasicConstraints::OID)
            .map(|ext| BasicConstraints::from_x509_extension_value(ext.extn_value.as_bytes()))
            .transpose()
    }

    /// Checks the signature of this single certificate against `issuer_key`.
    ///
    /// Only SHA-256 with RSA is supported. No path validation is performed.
    pub fn verify_signature(&self, issuer_key: &PublicKey) -> Result<()> {
        if self.inner.signature_algorithm.oid != SignatureAlgorithm::Sha256WithRSA.oid() {
            return Err(CertVaultError::SignatureError(format!(
                "unsupported signature algorithm {}",
                self.signature_algorithm_name()
            )));
        }
        let tbs = self.inner.tbs_certificate.to_der()?;
        let signature = self.inner.signature.as_bytes().ok_or_else(|| {
            CertVaultError::SignatureError("signature has unused bits".to_string())
        })?;
        crate::pki::verify_data(&tbs, signature, issuer_key)
    }

    /// Summary of the certificate fields, one labelled block per field.
    pub fn details(&self) -> String {
        format!(
            "Issuer:\n  {}\nSubject:\n  {}\nNot before:\n  {}\nNot after:\n  {}\nSerial number:\n  {}\nSignature algorithm:\n  {}\nType:\n  {}",
            self.issuer(),
            self.subject(),
            format_time(self.not_before),
            format_time(self.not_after),
            self.serial_number_hex(),
            self.signature_algorithm_name(),
            self.certificate_type(),
        )
    }
}

fn format_time(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

/// A certificate together with the private key able to issue further
/// certificates under its subject name.
#[derive(Debug, Clone)]
pub struct CertificateWithPrivateKey {
    pub cert: Certificate,
    pub key: PrivateKey,
}

impl Issuer for CertificateWithPrivateKey {
    fn issuer_name(&self) -> DistinguishedName {
        // The name of the issuer is the subject of the certificate
        self.cert.subject()
    }

    fn signing_key(&self) -> &PrivateKey {
        &self.key
    }
}
