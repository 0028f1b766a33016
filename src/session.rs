//! The operations a front end performs on one open keystore.

use std::path::Path;

use secrecy::SecretString;
use tracing::{info, warn};

use crate::cert::params::{CertificateParams, DistinguishedName, Validity};
use crate::cert::{Certificate, CertificateWithPrivateKey};
use crate::codec::{decode_from_file, encode_to_text, write_text_file};
use crate::config::StoreConfig;
use crate::error::{CertVaultError, Result};
use crate::issuer::{Issuer, build_certificate};
use crate::key::KeyPair;
use crate::keystore::{EntryKind, KeyStore};

/// An open keystore together with the settings used to fill it.
///
/// Changes stay in memory until [`Session::save_store`]; dropping a session
/// discards them.
#[derive(Debug)]
pub struct Session {
    config: StoreConfig,
    store: KeyStore,
}

impl Session {
    /// Starts an empty store at `config.path`, replacing any file there on
    /// the first save.
    pub fn create(config: StoreConfig, password: SecretString) -> Self {
        let store = KeyStore::create(&config.path, password).with_protection(config.protection);
        Self { config, store }
    }

    pub fn open(config: StoreConfig, password: SecretString) -> Result<Self> {
        let store = KeyStore::open(&config.path, password)?;
        Ok(Self { config, store })
    }

    pub fn open_or_create(config: StoreConfig, password: SecretString) -> Result<Self> {
        if config.path.try_exists()? {
            Self::open(config, password)
        } else {
            info!(path = %config.path.display(), "no keystore found, starting an empty one");
            Ok(Self::create(config, password))
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut KeyStore {
        &mut self.store
    }

    pub fn list_key_aliases(&self) -> Vec<String> {
        self.store.list_aliases(EntryKind::PrivateKey)
    }

    pub fn list_certificate_aliases(&self) -> Vec<String> {
        self.store.list_aliases(EntryKind::TrustedCertificate)
    }

    /// Human readable summary of the certificate stored under `alias`.
    pub fn get_details(&self, alias: &str) -> Result<String> {
        Ok(self.store.get_certificate(alias)?.details())
    }

    pub fn save_store(&self) -> Result<()> {
        self.store.save()
    }

    /// Reads a DER or PEM certificate from `path` and trusts it under `alias`.
    pub fn import_certificate(&mut self, path: impl AsRef<Path>, alias: &str) -> Result<Certificate> {
        let path = path.as_ref();
        let certificate = decode_from_file(path)?;
        self.store.add_trusted_certificate(alias, certificate.clone())?;
        info!(alias, path = %path.display(), subject = %certificate.subject(), "imported certificate");
        Ok(certificate)
    }

    /// Writes the certificate of `alias` (the leaf for key entries) to `path`
    /// as PEM.
    pub fn export_entry(&self, alias: &str, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = encode_to_text(self.store.get_certificate(alias)?)?;
        write_text_file(path, &text)?;
        info!(alias, path = %path.display(), "exported certificate");
        Ok(())
    }

    /// Writes the private key of `alias` to `path` as unencrypted PKCS#8 PEM.
    pub fn export_private_key(&self, alias: &str, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let key = self.store.get_private_key(alias)?;
        let text = zeroize::Zeroizing::new(encode_to_text(&key)?);
        write_text_file(path, &text)?;
        warn!(alias, path = %path.display(), "exported private key without encryption");
        Ok(())
    }

    /// Generates a key pair and a self-signed certificate for `subject` and
    /// stores both under `alias`.
    pub fn generate_and_store_key(&mut self, alias: &str, subject: &str) -> Result<Certificate> {
        self.ensure_alias_free(alias)?;
        let subject = DistinguishedName::parse(subject)?;
        let validity = Validity::for_days(self.config.validity_days)?;

        let key_pair = KeyPair::generate(self.config.key_bits)?;
        let certificate =
            build_certificate(&subject, &subject, &key_pair, key_pair.private_key(), validity)?;
        self.store
            .add_private_key_entry(alias, key_pair.private_key(), vec![certificate.clone()])?;

        info!(
            alias,
            subject = %subject,
            serial = %certificate.serial_number_hex(),
            bits = self.config.key_bits,
            "generated self-signed key"
        );
        Ok(certificate)
    }

    /// Generates a key pair for `subject` whose certificate is signed by the
    /// key entry `issuer_alias`. The stored chain is the new leaf followed by
    /// the issuer's chain.
    pub fn issue_and_store_key(
        &mut self,
        alias: &str,
        subject: &str,
        issuer_alias: &str,
    ) -> Result<Certificate> {
        self.ensure_alias_free(alias)?;
        let subject = DistinguishedName::parse(subject)?;
        let validity = Validity::for_days(self.config.validity_days)?;

        let issuer_chain = self.store.get_certificate_chain(issuer_alias)?.to_vec();
        let issuer = CertificateWithPrivateKey {
            cert: self.store.get_certificate(issuer_alias)?.clone(),
            key: self.store.get_private_key(issuer_alias)?,
        };

        let key_pair = KeyPair::generate(self.config.key_bits)?;
        let params = CertificateParams::builder()
            .subject(subject)
            .subject_public_key(key_pair.public_key().clone())
            .build();
        let certificate = issuer.issue(&params, validity)?;

        let mut chain = Vec::with_capacity(issuer_chain.len() + 1);
        chain.push(certificate.clone());
        chain.extend(issuer_chain);
        self.store
            .add_private_key_entry(alias, key_pair.private_key(), chain)?;

        info!(
            alias,
            issuer = issuer_alias,
            serial = %certificate.serial_number_hex(),
            "issued key"
        );
        Ok(certificate)
    }

    pub fn remove_entry(&mut self, alias: &str) -> Result<()> {
        self.store.remove_entry(alias)?;
        Ok(())
    }

    fn ensure_alias_free(&self, alias: &str) -> Result<()> {
        if self.store.contains_alias(alias) {
            return Err(CertVaultError::DuplicateAliasError(alias.to_string()));
        }
        Ok(())
    }
}
