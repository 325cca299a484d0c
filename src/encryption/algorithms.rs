use md5::{Digest as _, Md5};
use zeroize::{Zeroize as _, Zeroizing};
use super::EncryptionError;
use super::random::RandomSource;
use super::rc4::Rc4;

// If the password string is less than 32 bytes long, pad it by appending the required number of
// additional bytes from the beginning of the following padding string.
pub(crate) const PAD_BYTES: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08, 0x2E, 0x2E, 0x00,
    0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// One initial MD5 plus the 50 repetitions required by revision 3 and later.
pub(crate) const MD5_ITERATIONS: usize = 51;

/// One RC4 pass with the unmodified key plus the 19 passes with XOR-ed keys.
const CASCADE_ROUNDS: u8 = 20;

/// A password padded or truncated to exactly 32 bytes.
pub(crate) type PasswordBlock = Zeroizing<[u8; 32]>;

/// Pad or truncate a password to exactly 32 bytes.
///
/// Every character has to fit in a single byte (a code point of at most 255); it is stored as that
/// byte. If the password is more than 32 bytes long, only its first 32 bytes are used; if it is
/// shorter, the first `32 - n` bytes of `PAD_BYTES` are appended. An empty password therefore
/// becomes `PAD_BYTES` itself.
pub(crate) fn normalize_password(password: &str) -> Result<PasswordBlock, EncryptionError> {
    let mut bytes = Zeroizing::new(Vec::with_capacity(password.len()));

    for (position, character) in password.chars().enumerate() {
        let byte = u8::try_from(character)
            .map_err(|_| EncryptionError::InvalidPasswordCharacter { character, position })?;
        bytes.push(byte);
    }

    let len = bytes.len().min(32);

    let mut block = Zeroizing::new([0u8; 32]);
    block[..len].copy_from_slice(&bytes[..len]);
    block[len..].copy_from_slice(&PAD_BYTES[..32 - len]);

    Ok(block)
}

/// Hash `seed` with MD5, then hash the digest again `count - 1` times.
pub(crate) fn iterated_md5(seed: &[u8], count: usize) -> Zeroizing<[u8; 16]> {
    let mut digest = Zeroizing::new([0u8; 16]);
    let mut hash = Md5::digest(seed);

    for _ in 1..count {
        digest.copy_from_slice(&hash);
        hash.as_mut_slice().zeroize();
        hash = Md5::digest(&*digest);
    }

    digest.copy_from_slice(&hash);
    hash.as_mut_slice().zeroize();
    digest
}

fn cascade<const N: usize, R>(hash: &[u8; 16], input: &[u8; N], rounds: R) -> Result<[u8; N], EncryptionError>
where
    R: Iterator<Item = u8>,
{
    let mut key = Zeroizing::new([0u8; 16]);
    let mut current = Zeroizing::new(*input);
    let mut next = Zeroizing::new([0u8; N]);

    for round in rounds {
        for (out_byte, in_byte) in key.iter_mut().zip(hash) {
            *out_byte = in_byte ^ round;
        }

        Rc4::new(&*key)?.apply_keystream(current.iter(), next.iter_mut());
        std::mem::swap(&mut current, &mut next);
    }

    Ok(*current)
}

/// Encrypt `input` with RC4 twenty times, using a key generated by taking each byte of `hash` and
/// performing an XOR with the round counter (from 0 to 19). The input is left untouched.
pub(crate) fn keyed_rc4_cascade<const N: usize>(
    hash: &[u8; 16],
    input: &[u8; N],
) -> Result<[u8; N], EncryptionError> {
    cascade(hash, input, 0..CASCADE_ROUNDS)
}

/// Undo [`keyed_rc4_cascade`] by running the rounds from 19 down to 0.
pub(crate) fn keyed_rc4_cascade_inverse<const N: usize>(
    hash: &[u8; 16],
    input: &[u8; N],
) -> Result<[u8; N], EncryptionError> {
    cascade(hash, input, (0..CASCADE_ROUNDS).rev())
}

/// Make up an owner password for a document that was not given one: a random 64-bit number
/// written in decimal.
pub(crate) fn synthesize_owner_password(random: &dyn RandomSource) -> Result<PasswordBlock, EncryptionError> {
    let mut seed = Zeroizing::new([0u8; 8]);
    random.fill_bytes(&mut *seed)?;

    let password = Zeroizing::new(u64::from_le_bytes(*seed).to_string());

    normalize_password(&password)
}

/// Compute the encryption dictionary's O-entry value (revision 3 and 4).
///
/// This implements Algorithm 3 as described in ISO 32000-2:2020 (PDF 2.0), with the 128-bit key
/// length fixed.
pub(crate) fn compute_owner_value(
    owner_password: &[u8; 32],
    user_password: &[u8; 32],
) -> Result<[u8; 32], EncryptionError> {
    // Initialize the MD5 hash function and pass the padded owner password as input. Do the
    // following 50 times: take the output from the previous MD5 hash and pass it as input into a
    // new MD5 hash.
    let owner_hash = iterated_md5(owner_password, MD5_ITERATIONS);

    // Encrypt the padded user password with the RC4 cascade keyed by the owner hash. The output of
    // the final invocation is the value of the O entry.
    keyed_rc4_cascade(&owner_hash, user_password)
}

/// Compute the file encryption key (revision 3 and 4).
///
/// This implements Algorithm 2 as described in ISO 32000-2:2020 (PDF 2.0). Metadata is always
/// encrypted, so the `0xFFFFFFFF` marker of that algorithm never applies.
pub(crate) fn compute_master_key(
    user_password: &[u8; 32],
    owner_value: &[u8; 32],
    permissions: i32,
    document_id: &[u8],
) -> Zeroizing<[u8; 16]> {
    let mut input = Zeroizing::new(Vec::with_capacity(32 + 32 + 4 + document_id.len()));

    input.extend_from_slice(user_password);
    input.extend_from_slice(owner_value);

    // Convert the integer value of the P entry to a 32-bit unsigned binary number and pass these
    // bytes to the MD5 hash function, low-order byte first.
    input.extend_from_slice(&permissions.to_le_bytes());

    // Pass the first element of the file identifier array.
    input.extend_from_slice(document_id);

    // The whole 16-byte digest is rehashed 50 times since the key length is always 128 bits.
    iterated_md5(&input, MD5_ITERATIONS)
}

/// Compute the encryption dictionary's U-entry value (revision 3 and 4).
///
/// This implements Algorithm 5 as described in ISO 32000-2:2020 (PDF 2.0).
pub(crate) fn compute_user_value(master_key: &[u8; 16], document_id: &[u8]) -> Result<[u8; 32], EncryptionError> {
    // Initialize the MD5 hash function, pass the 32-byte padding string and the first element of
    // the file identifier array, and finish the hash. Unlike the master key this is a single hash.
    let mut hasher = Md5::new();

    hasher.update(PAD_BYTES);
    hasher.update(document_id);

    let mut seed = [0u8; 16];
    seed.copy_from_slice(&hasher.finalize());

    // Run the RC4 cascade keyed by the file encryption key over the hash.
    let encrypted = keyed_rc4_cascade(master_key, &seed)?;

    // Append 16 bytes of padding to store a 32-byte U entry.
    let mut user_value = [0u8; 32];
    user_value[..16].copy_from_slice(&encrypted);

    Ok(user_value)
}

/// Recover the padded user password from the O entry, given the padded owner password.
///
/// This is the decryption half of Algorithm 7 as described in ISO 32000-2:2020 (PDF 2.0).
pub(crate) fn recover_user_password(
    owner_password: &[u8; 32],
    owner_value: &[u8; 32],
) -> Result<PasswordBlock, EncryptionError> {
    let owner_hash = iterated_md5(owner_password, MD5_ITERATIONS);

    Ok(Zeroizing::new(keyed_rc4_cascade_inverse(&owner_hash, owner_value)?))
}
