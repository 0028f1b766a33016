use der::{Decode, Encode};
use x509_cert::Version;
use x509_cert::certificate::TbsCertificateInner;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::SignatureAlgorithm;
use crate::cert::params::{DistinguishedName, Validity, to_x509_time};
use crate::error::{CertVaultError, Result};
use crate::key::PublicKey;

/// Everything an issuer signs, before it is lowered to the `x509-cert`
/// structure. `serial_number` holds the big-endian INTEGER bytes.
pub struct TbsCertificate {
    pub serial_number: Vec<u8>,
    pub signature_algorithm: SignatureAlgorithm,
    pub issuer: DistinguishedName,
    pub validity: Validity,
    pub subject: DistinguishedName,
    pub subject_public_key: PublicKey,
    pub extensions: Vec<x509_cert::ext::Extension>,
}

impl TbsCertificate {
    /// Builds the version 3 `TBSCertificate`.
    pub fn to_tbs_certificate_inner(&self) -> Result<TbsCertificateInner> {
        let validity = x509_cert::time::Validity {
            not_before: to_x509_time(self.validity.not_before())?,
            not_after: to_x509_time(self.validity.not_after())?,
        };

        let serial_number = SerialNumber::new(self.serial_number.as_slice())?;

        let subject_public_key_info =
            SubjectPublicKeyInfoOwned::from_der(&self.subject_public_key.to_spki_der()?)?;

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number,
            signature: self.signature_algorithm.algorithm_identifier()?,
            issuer: self.issuer.as_x509_name().clone(),
            validity,
            subject: self.subject.as_x509_name().clone(),
            subject_public_key_info,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: if self.extensions.is_empty() {
                None
            } else {
                Some(self.extensions.clone())
            },
        })
    }

    /// Encodes the TBS structure into the DER bytes that get signed.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.to_tbs_certificate_inner()?
            .to_der()
            .map_err(|e| CertVaultError::EncodingError(e.to_string()))
    }
}
