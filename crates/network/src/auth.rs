//! Login key exchange
//!
//! 1. Server sends its RSA public key (DER) and a random verify token
//! 2. Client encrypts a 16-byte shared secret and the token with that key
//! 3. Server decrypts both, checks the token, and enables AES-128-CFB8
//!
//! Player identity verification against an external session service is not
//! part of the transport.

use bytes::Bytes;
use cobble_core::{ProtocolError, Result};
use cobble_protocol::SHARED_SECRET_LEN;
use rand::Rng;
use rsa::pkcs8::EncodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

/// RSA key size in bits
const RSA_KEY_BITS: usize = 1024;

/// Verify token size in bytes
pub const VERIFY_TOKEN_LEN: usize = 4;

/// Server RSA keypair, generated once per server
pub struct ServerKeyPair {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    public_key_der: Bytes,
}

impl std::fmt::Debug for ServerKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerKeyPair")
            .field("public_key_der_len", &self.public_key_der.len())
            .finish_non_exhaustive()
    }
}

impl ServerKeyPair {
    /// Generate a new keypair
    ///
    /// # Errors
    /// `Crypto` if key generation or DER encoding fails.
    pub fn generate() -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), RSA_KEY_BITS)
            .map_err(|e| ProtocolError::Crypto(format!("RSA key generation failed: {}", e)))?;
        let public_key = RsaPublicKey::from(&private_key);
        let public_key_der = public_key
            .to_public_key_der()
            .map_err(|e| ProtocolError::Crypto(format!("Public key encoding failed: {}", e)))?
            .into_vec();

        Ok(Self {
            private_key,
            public_key,
            public_key_der: Bytes::from(public_key_der),
        })
    }

    /// DER-encoded SubjectPublicKeyInfo sent in the encryption request
    pub fn public_key_der(&self) -> Bytes {
        self.public_key_der.clone()
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Decrypt the client's encryption response
    ///
    /// # Arguments
    /// * `encrypted_secret` - Shared secret encrypted with our public key
    /// * `encrypted_token` - Verify token encrypted with our public key
    /// * `expected_token` - The token issued to this connection
    ///
    /// # Errors
    /// - `Crypto` if either field fails to decrypt or the secret is not 16 bytes
    /// - `VerifyTokenMismatch` if the token differs from the one issued
    pub fn decrypt_response(
        &self,
        encrypted_secret: &[u8],
        encrypted_token: &[u8],
        expected_token: &[u8],
    ) -> Result<[u8; SHARED_SECRET_LEN]> {
        let token = self
            .private_key
            .decrypt(Pkcs1v15Encrypt, encrypted_token)
            .map_err(|e| ProtocolError::Crypto(format!("Verify token decryption failed: {}", e)))?;

        if token != expected_token {
            return Err(ProtocolError::VerifyTokenMismatch);
        }

        let secret = self
            .private_key
            .decrypt(Pkcs1v15Encrypt, encrypted_secret)
            .map_err(|e| ProtocolError::Crypto(format!("Shared secret decryption failed: {}", e)))?;

        secret.as_slice().try_into().map_err(|_| {
            ProtocolError::Crypto(format!(
                "Shared secret must be {} bytes, got {}",
                SHARED_SECRET_LEN,
                secret.len()
            ))
        })
    }
}

/// Random token issued with each encryption request
pub fn generate_verify_token() -> [u8; VERIFY_TOKEN_LEN] {
    let mut token = [0u8; VERIFY_TOKEN_LEN];
    rand::thread_rng().fill(&mut token);
    token
}
