use der::Encode;
use der::asn1::BitString;

use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, KeyUsage, SubjectKeyIdentifier,
    ToAndFromX509Extension, key_identifier,
};
use crate::cert::params::{CertificateParams, DistinguishedName, Validity, generate_serial_number};
use crate::cert::{Certificate, SignatureAlgorithm};
use crate::error::{CertVaultError, Result};
use crate::key::{KeyPair, PrivateKey};
use crate::tbs_certificate::TbsCertificate;

/// Represents an entity capable of issuing certificates.
pub trait Issuer {
    /// Returns the distinguished name of the issuer.
    fn issuer_name(&self) -> DistinguishedName;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &PrivateKey;

    /// Issues a certificate for `cert_request`, valid over `validity`.
    ///
    /// Every issued certificate gets a fresh random serial number and is
    /// signed with SHA-256/RSA over the DER encoded TBS structure.
    fn issue(&self, cert_request: &CertificateParams, validity: Validity) -> Result<Certificate> {
        let signature_algo = SignatureAlgorithm::Sha256WithRSA;
        let issuer_public_key = self.signing_key().public_key();

        let extensions = vec![
            BasicConstraints {
                is_ca: cert_request.is_ca,
                max_path_length: None,
            }
            .to_x509_extension(true)?,
            KeyUsage::for_rsa_identity(cert_request.is_ca).to_x509_extension(true)?,
            SubjectKeyIdentifier {
                key_identifier: key_identifier(&cert_request.subject_public_key)?,
            }
            .to_x509_extension(false)?,
            AuthorityKeyIdentifier {
                key_identifier: key_identifier(&issuer_public_key)?,
            }
            .to_x509_extension(false)?,
        ];

        let tbs_cert = TbsCertificate {
            serial_number: generate_serial_number(),
            signature_algorithm: signature_algo,
            issuer: self.issuer_name(),
            validity,
            subject: cert_request.subject.clone(),
            subject_public_key: cert_request.subject_public_key.clone(),
            extensions,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;
        let tbs_der = tbs_cert_inner
            .to_der()
            .map_err(|e| CertVaultError::EncodingError(e.to_string()))?;

        let signature = crate::pki::sign_data(&tbs_der, self.signing_key())?;

        let cert_inner = x509_cert::Certificate {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: signature_algo.algorithm_identifier()?,
            signature: BitString::from_bytes(&signature)?,
        };

        Certificate::from_inner(cert_inner)
    }
}

/// An issuer identified only by a name and a signing key.
pub(crate) struct NamedIssuer<'a> {
    pub(crate) name: DistinguishedName,
    pub(crate) key: &'a PrivateKey,
}

impl Issuer for NamedIssuer<'_> {
    fn issuer_name(&self) -> DistinguishedName {
        self.name.clone()
    }

    fn signing_key(&self) -> &PrivateKey {
        self.key
    }
}

/// Wraps `key_pair`'s public key into a certificate for `subject`, signed by
/// `signer_private_key` on behalf of `issuer`.
///
/// When `issuer` equals `subject` the certificate is self-signed and the
/// signer must be the pair's own private key, otherwise the call fails with
/// [`CertVaultError::KeyMismatchError`].
pub fn build_certificate(
    subject: &DistinguishedName,
    issuer: &DistinguishedName,
    key_pair: &KeyPair,
    signer_private_key: &PrivateKey,
    validity: Validity,
) -> Result<Certificate> {
    if subject == issuer && signer_private_key.public_key() != *key_pair.public_key() {
        return Err(CertVaultError::KeyMismatchError);
    }

    let params = CertificateParams::builder()
        .subject(subject.clone())
        .subject_public_key(key_pair.public_key().clone())
        .is_ca(subject == issuer)
        .build();

    NamedIssuer {
        name: issuer.clone(),
        key: signer_private_key,
    }
    .issue(&params, validity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::CertificateWithPrivateKey;
    use time::{Duration, OffsetDateTime};

    fn dn(name: &str) -> DistinguishedName {
        DistinguishedName::parse(name).unwrap()
    }

    #[test]
    fn build_certificate_matches_inputs() {
        let key_pair = KeyPair::generate(1024).unwrap();
        let subject = dn("CN=Alice-Subject, O=ENSISA, L=Mulhouse, ST=68, C=FR");
        let not_before = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let not_after = not_before + Duration::days(365);
        let validity = Validity::new(not_before, not_after).unwrap();

        let cert = build_certificate(&subject, &subject, &key_pair, key_pair.private_key(), validity)
            .unwrap();

        assert_eq!(cert.subject(), subject);
        assert_eq!(cert.issuer(), subject);
        assert_eq!(cert.not_before(), not_before);
        assert_eq!(cert.not_after(), not_after);
        assert_eq!(cert.public_key().unwrap(), *key_pair.public_key());
        cert.verify_signature(key_pair.public_key()).unwrap();
    }

    #[test]
    fn self_signed_with_foreign_key_is_rejected() {
        let key_pair = KeyPair::generate(512).unwrap();
        let other = KeyPair::generate(512).unwrap();
        let subject = dn("CN=Alice");
        let result = build_certificate(
            &subject,
            &subject,
            &key_pair,
            other.private_key(),
            Validity::for_days(1).unwrap(),
        );
        assert!(matches!(result, Err(CertVaultError::KeyMismatchError)));
    }

    #[test]
    fn issuer_signed_certificate_verifies_against_issuer_key() {
        let issuer_key = KeyPair::generate(1024).unwrap();
        let subject_key = KeyPair::generate(512).unwrap();
        let issuer = dn("CN=Bob-Issuer, O=DataPower, L=Cambridge, ST=MA, C=US");
        let subject = dn("CN=Alice-Subject, O=ENSISA");

        let cert = build_certificate(
            &subject,
            &issuer,
            &subject_key,
            issuer_key.private_key(),
            Validity::for_days(30).unwrap(),
        )
        .unwrap();

        assert_eq!(cert.issuer(), issuer);
        assert!(!cert.is_self_issued());
        cert.verify_signature(issuer_key.public_key()).unwrap();
        assert!(cert.verify_signature(subject_key.public_key()).is_err());
    }

    #[test]
    fn ca_issues_for_other_subjects() {
        let ca_key = KeyPair::generate(1024).unwrap();
        let ca_name = dn("CN=myca.local");
        let ca_cert = build_certificate(
            &ca_name,
            &ca_name,
            &ca_key,
            ca_key.private_key(),
            Validity::for_days(3650).unwrap(),
        )
        .unwrap();
        let ca = CertificateWithPrivateKey {
            cert: ca_cert.clone(),
            key: ca_key.private_key().clone(),
        };

        let server_key = KeyPair::generate(512).unwrap();
        let params = CertificateParams::builder()
            .subject(dn("CN=server.myca.local"))
            .subject_public_key(server_key.public_key().clone())
            .build();
        let server_cert = ca.issue(&params, Validity::for_days(365).unwrap()).unwrap();

        assert_eq!(server_cert.issuer(), ca_cert.subject());
        assert_eq!(server_cert.basic_constraints().unwrap().map(|bc| bc.is_ca), Some(false));
        server_cert.verify_signature(ca_key.public_key()).unwrap();
    }

    #[test]
    fn consecutive_certificates_get_distinct_serials() {
        let key_pair = KeyPair::generate(512).unwrap();
        let subject = dn("CN=Rapid");
        let serials: Vec<Vec<u8>> = (0..5)
            .map(|_| {
                build_certificate(
                    &subject,
                    &subject,
                    &key_pair,
                    key_pair.private_key(),
                    Validity::for_days(1).unwrap(),
                )
                .unwrap()
                .serial_number()
                .to_vec()
            })
            .collect();
        for (i, a) in serials.iter().enumerate() {
            for b in &serials[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
