use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use sha2::Sha256;

use crate::error::{CertVaultError, Result};
use crate::key::{PrivateKey, PublicKey};

/// Signs `data` with RSASSA-PKCS1-v1_5 over SHA-256.
pub fn sign_data(data: &[u8], key: &PrivateKey) -> Result<Vec<u8>> {
    let signing_key: SigningKey<Sha256> = SigningKey::new(key.as_rsa().clone());
    let signature = signing_key
        .try_sign(data)
        .map_err(|e| CertVaultError::SignatureError(e.to_string()))?;
    Ok(signature.to_vec())
}

/// Checks an RSASSA-PKCS1-v1_5/SHA-256 signature produced by [`sign_data`].
pub fn verify_data(data: &[u8], signature: &[u8], key: &PublicKey) -> Result<()> {
    let verifying_key: VerifyingKey<Sha256> = VerifyingKey::new(key.as_rsa().clone());
    let signature = Signature::try_from(signature)
        .map_err(|e| CertVaultError::SignatureError(e.to_string()))?;
    verifying_key
        .verify(data, &signature)
        .map_err(|e| CertVaultError::SignatureError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyPair;

    #[test]
    fn signature_verifies_only_with_matching_key() {
        let signer = KeyPair::generate(512).unwrap();
        let other = KeyPair::generate(512).unwrap();
        let signature = sign_data(b"to be signed", signer.private_key()).unwrap();

        verify_data(b"to be signed", &signature, signer.public_key()).unwrap();
        assert!(verify_data(b"to be signed", &signature, other.public_key()).is_err());
        assert!(verify_data(b"tampered", &signature, signer.public_key()).is_err());
    }
}
