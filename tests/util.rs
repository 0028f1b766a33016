#![allow(dead_code)]

use std::path::Path;

use certvault::cert::params::{DistinguishedName, Validity};
use certvault::cert::{Certificate, CertificateWithPrivateKey};
use certvault::config::StoreConfig;
use certvault::issuer::build_certificate;
use certvault::key::KeyPair;
use certvault::keystore::Protection;
use secrecy::SecretString;

pub const ALICE: &str = "CN=Alice-Subject, O=ENSISA, L=Mulhouse, ST=68, C=FR";
pub const BOB: &str = "CN=Bob-Issuer, O=DataPower, L=Cambridge, ST=MA, C=US";

pub fn generate_ca_cert() -> CertificateWithPrivateKey {
    let ca_key = KeyPair::generate(1024).unwrap();
    let subject_dn = DistinguishedName::parse("CN=myca.local").unwrap();

    let cert = build_certificate(
        &subject_dn,
        &subject_dn,
        &ca_key,
        ca_key.private_key(),
        Validity::for_days(3650).unwrap(),
    )
    .unwrap();

    let (key, _) = ca_key.into_parts();
    CertificateWithPrivateKey { cert, key }
}

pub fn self_signed(subject: &str, days: i64) -> (KeyPair, Certificate) {
    let key_pair = KeyPair::generate(1024).unwrap();
    let subject = DistinguishedName::parse(subject).unwrap();
    let cert = build_certificate(
        &subject,
        &subject,
        &key_pair,
        key_pair.private_key(),
        Validity::for_days(days).unwrap(),
    )
    .unwrap();
    (key_pair, cert)
}

pub fn test_config(dir: &Path) -> StoreConfig {
    StoreConfig::builder()
        .path(dir.join("store.ks"))
        .protection(Protection::fast())
        .build()
}

pub fn password(value: &str) -> SecretString {
    SecretString::new(value.to_string())
}
