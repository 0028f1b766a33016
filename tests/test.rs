mod util;

use std::io::Write;

use certvault::cert::Certificate;
use certvault::cert::params::{CertificateParams, DistinguishedName, Validity};
use certvault::codec::{decode_from_file, decode_from_text, encode_to_text};
use certvault::error::CertVaultError;
use certvault::issuer::{Issuer, build_certificate};
use certvault::key::{KeyPair, PrivateKey};
use certvault::keystore::{EntryKind, KeyStore, KeyStoreEntry};
use certvault::session::Session;
use tempfile::{NamedTempFile, TempDir};
use time::{Duration, OffsetDateTime};

pub type Result<T> = std::result::Result<T, CertVaultError>;

/// Generate, store, save, reopen and describe the Alice certificate.
#[test]
fn alice_survives_a_store_round_trip() -> Result<()> {
    let dir = TempDir::new()?;
    let config = util::test_config(dir.path());

    let key_pair = KeyPair::generate(1024)?;
    let subject = DistinguishedName::parse(util::ALICE)?;
    let cert = build_certificate(
        &subject,
        &subject,
        &key_pair,
        key_pair.private_key(),
        Validity::for_days(365)?,
    )?;

    let mut session = Session::create(config.clone(), util::password("keytool"));
    session
        .store_mut()
        .add_private_key_entry("alice", key_pair.private_key(), vec![cert.clone()])?;
    session.save_store()?;

    let reopened = Session::open(config, util::password("keytool"))?;
    let stored = reopened.store().get_certificate("alice")?;
    assert_eq!(stored, &cert);
    assert_eq!(stored.subject().to_string(), util::ALICE);
    assert_eq!(stored.not_after() - stored.not_before(), Duration::days(365));

    let details = reopened.get_details("alice")?;
    assert!(details.contains(&format!("Subject:\n  {}", util::ALICE)));
    assert!(details.contains(&format!("Serial number:\n  {}", cert.serial_number_hex())));
    assert_eq!(&reopened.store().get_private_key("alice")?, key_pair.private_key());
    Ok(())
}

#[test]
fn generated_public_key_matches_private_key() -> Result<()> {
    let key_pair = KeyPair::generate(1024)?;
    assert_eq!(key_pair.private_key().public_key(), *key_pair.public_key());
    assert_eq!(key_pair.public_key().bits(), 1024);
    Ok(())
}

#[test]
fn certificate_fields_match_inputs() -> Result<()> {
    let subject_key = KeyPair::generate(1024)?;
    let issuer_key = KeyPair::generate(1024)?;
    let subject = DistinguishedName::parse(util::ALICE)?;
    let issuer = DistinguishedName::parse(util::BOB)?;
    let not_before = OffsetDateTime::from_unix_timestamp(1_600_000_000).unwrap();
    let not_after = OffsetDateTime::from_unix_timestamp(2_600_000_000).unwrap();

    let cert = build_certificate(
        &subject,
        &issuer,
        &subject_key,
        issuer_key.private_key(),
        Validity::new(not_before, not_after)?,
    )?;

    assert_eq!(cert.subject(), subject);
    assert_eq!(cert.issuer().to_string(), util::BOB);
    assert_eq!(cert.not_before(), not_before);
    // 2052, past the UTCTime range.
    assert_eq!(cert.not_after(), not_after);
    assert_eq!(cert.public_key()?, *subject_key.public_key());
    cert.verify_signature(issuer_key.public_key())?;
    Ok(())
}

#[test]
fn inverted_validity_is_rejected() {
    let now = OffsetDateTime::now_utc();
    assert!(matches!(
        Validity::new(now, now),
        Err(CertVaultError::InvalidValidityError(_))
    ));
    assert!(matches!(
        Validity::new(now, now - Duration::days(1)),
        Err(CertVaultError::InvalidValidityError(_))
    ));
}

#[test]
fn text_encoding_round_trips() -> Result<()> {
    let (key_pair, cert) = util::self_signed("CN=Round Trip, O=ENSISA", 30);

    let text = encode_to_text(&cert)?;
    assert_eq!(decode_from_text::<Certificate>(&text)?, cert);

    let key_text = encode_to_text(key_pair.private_key())?;
    assert_eq!(&decode_from_text::<PrivateKey>(&key_text)?, key_pair.private_key());
    Ok(())
}

#[test]
fn empty_file_is_empty_input() -> Result<()> {
    let file = NamedTempFile::new()?;
    assert!(matches!(
        decode_from_file(file.path()),
        Err(CertVaultError::EmptyInputError)
    ));
    Ok(())
}

#[test]
fn der_file_decodes_like_an_independent_parse() -> Result<()> {
    let (_, cert) = util::self_signed("CN=Der File", 30);
    let mut file = NamedTempFile::new()?;
    file.write_all(cert.as_der())?;
    file.flush()?;

    let bytes = std::fs::read(file.path())?;
    let independent = Certificate::from_der(&bytes)?;
    let decoded = decode_from_file(file.path())?;
    assert_eq!(decoded, independent);
    assert_eq!(decoded, cert);
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        decode_from_file(dir.path().join("absent.cer")),
        Err(CertVaultError::IoError(_))
    ));
}

#[test]
fn duplicate_alias_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let mut store = KeyStore::create(dir.path().join("store.ks"), util::password("keytool"))
        .with_protection(certvault::keystore::Protection::fast());
    let (_, first) = util::self_signed("CN=First", 30);
    let (_, second) = util::self_signed("CN=Second", 30);

    store.add_trusted_certificate("ca", first)?;
    assert!(matches!(
        store.add_trusted_certificate("ca", second),
        Err(CertVaultError::DuplicateAliasError(_))
    ));
    assert_eq!(store.len(), 1);
    Ok(())
}

#[test]
fn wrong_password_exposes_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let config = util::test_config(dir.path());
    let mut session = Session::create(config.clone(), util::password("keytool"));
    session.generate_and_store_key("alice", util::ALICE)?;
    session.save_store()?;

    assert!(matches!(
        Session::open(config, util::password("wrong")),
        Err(CertVaultError::AuthenticationError)
    ));
    Ok(())
}

#[test]
fn every_entry_survives_save_and_open() -> Result<()> {
    let dir = TempDir::new()?;
    let config = util::test_config(dir.path());
    let mut session = Session::create(config.clone(), util::password("keytool"));
    session.generate_and_store_key("ca", util::BOB)?;
    session.issue_and_store_key("alice", util::ALICE, "ca")?;

    let (_, trusted) = util::self_signed("CN=Partner", 90);
    let trusted_path = dir.path().join("partner.pem");
    std::fs::write(&trusted_path, encode_to_text(&trusted)?)?;
    session.import_certificate(&trusted_path, "partner")?;
    session.save_store()?;

    let reopened = Session::open(config, util::password("keytool"))?;
    assert_eq!(reopened.list_key_aliases(), vec!["alice", "ca"]);
    assert_eq!(reopened.list_certificate_aliases(), vec!["partner"]);
    for alias in ["alice", "ca", "partner"] {
        assert_eq!(
            reopened.store().get_entry(alias)?,
            session.store().get_entry(alias)?
        );
    }
    assert_eq!(reopened.store().get_certificate_chain("alice")?.len(), 2);
    assert!(matches!(
        reopened.store().get_entry("partner")?,
        KeyStoreEntry::TrustedCertificate(_)
    ));
    assert_eq!(reopened.store().get_entry("ca")?.kind(), EntryKind::PrivateKey);
    Ok(())
}

/// A CA identity issues for another subject through the `Issuer` trait.
#[test]
fn ca_issues_server_certificate() -> Result<()> {
    let ca = util::generate_ca_cert();

    let server_key = KeyPair::generate(1024)?;
    let server_cert_info = CertificateParams::builder()
        .subject(DistinguishedName::parse("CN=server.myca.local")?)
        .subject_public_key(server_key.public_key().clone())
        .build();
    let server_cert = ca.issue(&server_cert_info, Validity::for_days(365)?)?;

    assert_eq!(server_cert.issuer(), ca.cert.subject());
    server_cert.verify_signature(&ca.cert.public_key()?)?;
    assert_eq!(
        server_cert.basic_constraints()?.map(|bc| bc.is_ca),
        Some(false)
    );
    Ok(())
}
