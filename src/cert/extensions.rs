use const_oid::AssociatedOid;
use der::{Decode, Encode, asn1::OctetString, oid::ObjectIdentifier};
use sha1::{Digest, Sha1};

pub use der::flagset::FlagSet;
use x509_cert::ext::pkix::KeyUsage as X509KeyUsage;
pub use x509_cert::ext::pkix::KeyUsages;

use crate::error::{CertVaultError, Result};
use crate::key::PublicKey;

/// An extension with a fixed OID whose value round-trips through DER.
///
/// # Example
/// ```
/// use certvault::cert::extensions::{BasicConstraints, ToAndFromX509Extension};
/// let bc = BasicConstraints { is_ca: true, max_path_length: Some(0) };
/// let encoded = bc.to_x509_extension_value().unwrap();
/// let decoded = BasicConstraints::from_x509_extension_value(&encoded).unwrap();
/// assert!(decoded.is_ca);
/// ```
pub trait ToAndFromX509Extension {
    const OID: ObjectIdentifier;

    /// DER of the `extnValue` contents.
    fn to_x509_extension_value(&self) -> Result<Vec<u8>>;

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self>
    where
        Self: Sized;

    /// Wraps the encoded value into a certificate extension.
    fn to_x509_extension(&self, critical: bool) -> Result<x509_cert::ext::Extension> {
        Ok(x509_cert::ext::Extension {
            extn_id: Self::OID,
            critical,
            extn_value: OctetString::new(self.to_x509_extension_value()?)?,
        })
    }
}

fn malformed(err: der::Error) -> CertVaultError {
    CertVaultError::MalformedCertificateError(err.to_string())
}

/// Basic Constraints. Always written as critical.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BasicConstraints {
    pub is_ca: bool,
    pub max_path_length: Option<u8>,
}

impl ToAndFromX509Extension for BasicConstraints {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::BasicConstraints::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let bc = x509_cert::ext::pkix::BasicConstraints {
            ca: self.is_ca,
            path_len_constraint: self.max_path_length,
        };
        Ok(bc.to_der()?)
    }

    fn from_x509_extension_value(der_bytes: &[u8]) -> Result<Self> {
        let bc = x509_cert::ext::pkix::BasicConstraints::from_der(der_bytes).map_err(malformed)?;
        Ok(Self {
            is_ca: bc.ca,
            max_path_length: bc.path_len_constraint,
        })
    }
}

/// Key Usage. Always written as critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUsage(pub FlagSet<KeyUsages>);

impl KeyUsage {
    /// Usages for an RSA identity key, plus certificate and CRL signing for
    /// authorities.
    pub fn for_rsa_identity(is_ca: bool) -> Self {
        let mut flags = KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment;
        if is_ca {
            flags |= KeyUsages::KeyCertSign;
            flags |= KeyUsages::CRLSign;
        }
        Self(flags)
    }
}

impl ToAndFromX509Extension for KeyUsage {
    const OID: ObjectIdentifier = <X509KeyUsage as AssociatedOid>::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let ku = X509KeyUsage::from(self.0);
        Ok(ku.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let ku = X509KeyUsage::from_der(extension).map_err(malformed)?;
        Ok(Self(ku.0))
    }
}

/// SHA-1 over the subjectPublicKey bits, method (1) of RFC 5280 4.2.1.2.
pub fn key_identifier(public_key: &PublicKey) -> Result<Vec<u8>> {
    let spki = x509_cert::spki::SubjectPublicKeyInfoOwned::from_der(&public_key.to_spki_der()?)?;
    Ok(Sha1::digest(spki.subject_public_key.raw_bytes()).to_vec())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectKeyIdentifier {
    pub key_identifier: Vec<u8>,
}

impl ToAndFromX509Extension for SubjectKeyIdentifier {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectKeyIdentifier::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let ski =
            x509_cert::ext::pkix::SubjectKeyIdentifier(OctetString::new(self.key_identifier.as_slice())?);
        Ok(ski.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let ski = x509_cert::ext::pkix::SubjectKeyIdentifier::from_der(extension).map_err(malformed)?;
        Ok(Self {
            key_identifier: ski.0.as_bytes().to_vec(),
        })
    }
}

/// Authority Key Identifier, carrying only the issuer's key id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityKeyIdentifier {
    pub key_identifier: Vec<u8>,
}

impl ToAndFromX509Extension for AuthorityKeyIdentifier {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::AuthorityKeyIdentifier::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier {
            key_identifier: Some(OctetString::new(self.key_identifier.as_slice())?),
            authority_cert_issuer: None,
            authority_cert_serial_number: None,
        };
        Ok(aki.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier::from_der(extension).map_err(malformed)?;
        Ok(Self {
            key_identifier: aki
                .key_identifier
                .map(|id| id.as_bytes().to_vec())
                .unwrap_or_default(),
        })
    }
}
