use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut as _, BlockEncryptMut as _, KeyIvInit as _};
use md5::{Digest as _, Md5};
use zeroize::Zeroizing;
use super::EncryptionError;
use super::random::RandomSource;
use super::rc4::Rc4;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Key protecting the strings and streams of a single object.
pub type ObjectKey = Zeroizing<[u8; 16]>;

pub trait CryptFilter: std::fmt::Debug + Send + Sync {
    /// Value of the `/CFM` entry naming this filter.
    fn method(&self) -> &'static [u8];
    fn compute_key(&self, master_key: &[u8; 16], object_number: u32) -> ObjectKey;
    fn encrypt(&self, key: &[u8; 16], plaintext: &[u8], random: &dyn RandomSource) -> Result<Vec<u8>, EncryptionError>;
    fn decrypt(&self, key: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError>;
}

/// Algorithm 1 as described in ISO 32000-2:2020 (PDF 2.0).
fn compute_object_key(master_key: &[u8; 16], object_number: u32, salt: &[u8]) -> ObjectKey {
    let mut hasher = Md5::new();

    hasher.update(master_key);

    // Treating the object number and generation number as binary integers, extend the original
    // 16-byte file encryption key to 21 bytes by appending the low-order 3 bytes of the object
    // number and the low-order 2 bytes of the generation number in that order, low-order byte
    // first. Objects are never updated in place, so the generation number is always zero.
    hasher.update(&object_number.to_le_bytes()[..3]);
    hasher.update([0u8; 2]);

    hasher.update(salt);

    // Use the first (n + 5) bytes, up to a maximum of 16, of the output from the MD5 hash as the
    // key. With a 16-byte file encryption key that is the whole digest.
    let mut key = Zeroizing::new([0u8; 16]);
    key.copy_from_slice(&hasher.finalize());
    key
}

#[derive(Clone, Copy, Debug)]
pub struct Rc4CryptFilter;

impl CryptFilter for Rc4CryptFilter {
    fn method(&self) -> &'static [u8] {
        b"V2"
    }

    fn compute_key(&self, master_key: &[u8; 16], object_number: u32) -> ObjectKey {
        compute_object_key(master_key, object_number, &[])
    }

    fn encrypt(
        &self, key: &[u8; 16], plaintext: &[u8], _random: &dyn RandomSource,
    ) -> Result<Vec<u8>, EncryptionError> {
        Ok(Rc4::new(key)?.encrypt(plaintext))
    }

    fn decrypt(&self, key: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        Ok(Rc4::new(key)?.decrypt(ciphertext))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Aes128CryptFilter;

impl CryptFilter for Aes128CryptFilter {
    fn method(&self) -> &'static [u8] {
        b"AESV2"
    }

    fn compute_key(&self, master_key: &[u8; 16], object_number: u32) -> ObjectKey {
        // If using the AES algorithm, extend the file encryption key an additional 4 bytes by
        // adding the value "sAlT".
        compute_object_key(master_key, object_number, b"sAlT")
    }

    fn encrypt(&self, key: &[u8; 16], plaintext: &[u8], random: &dyn RandomSource) -> Result<Vec<u8>, EncryptionError> {
        // A fresh initialization vector for every string and stream.
        let mut iv = [0u8; 16];
        random.fill_bytes(&mut iv)?;

        // The ciphertext needs to be a multiple of 16 bytes to include the padding.
        let ciphertext_len = (plaintext.len() & !15) + 16;

        let mut ciphertext = Vec::with_capacity(16 + ciphertext_len);

        ciphertext.extend_from_slice(&iv);
        ciphertext.extend_from_slice(plaintext);
        ciphertext.resize(16 + ciphertext_len, 0);

        // For an original message length of M, the pad shall consist of 16 - (M mod 16) bytes
        // whose value shall also be 16 - (M mod 16).
        Aes128CbcEnc::new_from_slices(key, &iv)
            .map_err(|_| EncryptionError::CipherInitialization("AES-128 needs a 16-byte key and IV"))?
            .encrypt_padded_mut::<Pkcs7>(&mut ciphertext[16..], plaintext.len())
            .map_err(|_| EncryptionError::CipherInitialization("no room left for the AES padding"))?;

        Ok(ciphertext)
    }

    fn decrypt(&self, key: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        // The IV followed by at least one padded block.
        if ciphertext.len() < 32 || ciphertext.len() % 16 != 0 {
            return Err(EncryptionError::InvalidCipherTextLength);
        }

        let (iv, data) = ciphertext.split_at(16);
        let mut plaintext = data.to_vec();

        let len = Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|_| EncryptionError::CipherInitialization("AES-128 needs a 16-byte key and IV"))?
            .decrypt_padded_mut::<Pkcs7>(&mut plaintext)
            .map_err(|_| EncryptionError::Padding)?
            .len();

        plaintext.truncate(len);

        Ok(plaintext)
    }
}
