//! Stream cipher applied to the raw byte stream after key exchange
//!
//! AES-128 in CFB8 mode, keyed and seeded with the 16-byte shared secret.
//! CFB8 works one byte at a time and keeps its shift register between calls,
//! so chunks can be split anywhere: encrypting `a` then `b` produces the same
//! bytes as encrypting `a ++ b` in one call.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;

/// Size of the shared secret negotiated during login.
pub const SHARED_SECRET_LEN: usize = 16;

/// One direction of an AES-128-CFB8 stream
pub struct Cfb8 {
    cipher: Aes128,
    iv: [u8; 16],
}

impl Cfb8 {
    pub fn new(key: &[u8; SHARED_SECRET_LEN], iv: &[u8; SHARED_SECRET_LEN]) -> Self {
        Self {
            cipher: Aes128::new(GenericArray::from_slice(key)),
            iv: *iv,
        }
    }

    #[inline]
    fn keystream_byte(&self) -> u8 {
        let mut block = GenericArray::clone_from_slice(&self.iv);
        self.cipher.encrypt_block(&mut block);
        block[0]
    }

    #[inline]
    fn shift_in(&mut self, ciphertext: u8) {
        self.iv.copy_within(1.., 0);
        self.iv[15] = ciphertext;
    }

    /// Encrypt `data` in place.
    pub fn encrypt(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte ^= self.keystream_byte();
            self.shift_in(*byte);
        }
    }

    /// Decrypt `data` in place.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            let ciphertext = *byte;
            *byte ^= self.keystream_byte();
            self.shift_in(ciphertext);
        }
    }
}

/// Bidirectional cipher state for one connection
///
/// Inbound bytes are decrypted in place as they arrive. Outbound bytes are
/// encrypted through a scratch buffer that grows to the largest chunk seen,
/// so the caller's plaintext is left untouched.
pub struct CipherTransform {
    encryptor: Cfb8,
    decryptor: Cfb8,
    scratch: Vec<u8>,
}

impl std::fmt::Debug for CipherTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherTransform")
            .field("scratch_capacity", &self.scratch.capacity())
            .finish_non_exhaustive()
    }
}

impl CipherTransform {
    /// Create both directions from the shared secret (key = IV = secret)
    pub fn new(shared_secret: &[u8; SHARED_SECRET_LEN]) -> Self {
        Self {
            encryptor: Cfb8::new(shared_secret, shared_secret),
            decryptor: Cfb8::new(shared_secret, shared_secret),
            scratch: Vec::new(),
        }
    }

    /// Encrypt a chunk of outbound bytes, returning the ciphertext.
    ///
    /// The returned slice borrows the internal scratch buffer and is valid
    /// until the next call.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> &[u8] {
        if self.scratch.len() < plaintext.len() {
            self.scratch.resize(plaintext.len(), 0);
        }
        let out = &mut self.scratch[..plaintext.len()];
        out.copy_from_slice(plaintext);
        self.encryptor.encrypt(out);
        out
    }

    /// Decrypt a chunk of inbound bytes in place.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        self.decryptor.decrypt(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: [u8; 16] = [
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee,
        0xff,
    ];

    #[test]
    fn test_cfb8_roundtrip() {
        let mut encryptor = Cfb8::new(&[0x01; 16], &[0x02; 16]);
        let mut decryptor = Cfb8::new(&[0x01; 16], &[0x02; 16]);

        let original = b"Hello, world of frames!".to_vec();
        let mut data = original.clone();
        encryptor.encrypt(&mut data);
        assert_ne!(data, original);

        decryptor.decrypt(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn test_chunked_matches_one_shot() {
        let plaintext: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

        let mut one_shot = CipherTransform::new(&SECRET);
        let expected = one_shot.encrypt(&plaintext).to_vec();

        let mut chunked = CipherTransform::new(&SECRET);
        let mut actual = Vec::new();
        for chunk in plaintext.chunks(37) {
            actual.extend_from_slice(chunked.encrypt(chunk));
        }
        assert_eq!(actual, expected);

        // Decrypt in uneven chunks, including single bytes
        let mut receiver = CipherTransform::new(&SECRET);
        let mut data = expected.clone();
        let (head, tail) = data.split_at_mut(1);
        receiver.decrypt(head);
        for chunk in tail.chunks_mut(113) {
            receiver.decrypt(chunk);
        }
        assert_eq!(data, plaintext);
    }

    #[test]
    fn test_scratch_grows_on_demand() {
        let mut transform = CipherTransform::new(&SECRET);
        assert_eq!(transform.encrypt(&[1, 2, 3]).len(), 3);
        assert_eq!(transform.encrypt(&[0u8; 4096]).len(), 4096);
        // A smaller chunk after a large one only returns its own length
        assert_eq!(transform.encrypt(&[9]).len(), 1);
    }

    #[test]
    fn test_directions_are_independent() {
        let mut server = CipherTransform::new(&SECRET);
        let mut client = CipherTransform::new(&SECRET);

        // Server sends while the client also sends; neither stream disturbs the other
        let to_client = server.encrypt(b"from server").to_vec();
        let mut to_server = client.encrypt(b"from client").to_vec();

        let mut received = to_client.clone();
        client.decrypt(&mut received);
        assert_eq!(&received, b"from server");

        server.decrypt(&mut to_server);
        assert_eq!(&to_server, b"from client");
    }
}
