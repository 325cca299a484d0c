mod algorithms;
pub mod crypt_filters;
mod handler;
mod random;
mod rc4;

use bitflags::bitflags;
use crate::{Object, StringFormat};
use crypt_filters::*;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroize;

pub use handler::SecurityHandler;
pub use random::{OsRandom, RandomSource};

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("password character {character:?} at position {position} does not fit in a single byte")]
    InvalidPasswordCharacter { character: char, position: usize },
    #[error("the secure random source is unavailable: {0}")]
    RandomSourceUnavailable(String),
    #[error("failed to initialize the cipher: {0}")]
    CipherInitialization(&'static str),

    #[error("invalid ciphertext length")]
    InvalidCipherTextLength,
    #[error("invalid padding after decryption")]
    Padding,
}

bitflags! {
    /// Operations a user who opened the document with the user password may perform.
    ///
    /// Bit positions follow the P entry of the encryption dictionary (bit 1 being the low-order
    /// bit).
    #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct Permissions: u32 {
        /// (Bit 3) Print the document, possibly not at the highest quality level, depending on
        /// whether [`Permissions::PRINTABLE_IN_HIGH_QUALITY`] is also set.
        const PRINTABLE = 1 << 2;

        /// (Bit 4) Modify the contents of the document by operations other than those controlled
        /// by [`Permissions::ANNOTABLE`], [`Permissions::FILLABLE`] and
        /// [`Permissions::ASSEMBLABLE`].
        const MODIFIABLE = 1 << 3;

        /// (Bit 5) Copy or otherwise extract text and graphics from the document.
        const COPYABLE = 1 << 4;

        /// (Bit 6) Add or modify text annotations, fill in interactive form fields, and if
        /// [`Permissions::MODIFIABLE`] is also set, create or modify interactive form fields.
        const ANNOTABLE = 1 << 5;

        /// (Bit 9) Fill in existing interactive form fields, even if [`Permissions::ANNOTABLE`]
        /// is clear.
        const FILLABLE = 1 << 8;

        /// (Bit 10) Extract text and graphics in support of accessibility to users with
        /// disabilities.
        const COPYABLE_FOR_ACCESSIBILITY = 1 << 9;

        /// (Bit 11) Assemble the document (insert, rotate, or delete pages and create bookmarks or
        /// thumbnail images), even if [`Permissions::MODIFIABLE`] is clear.
        const ASSEMBLABLE = 1 << 10;

        /// (Bit 12) Print the document to a representation from which a faithful digital copy of
        /// the PDF content could be generated.
        const PRINTABLE_IN_HIGH_QUALITY = 1 << 11;
    }
}

impl Permissions {
    /// The signed value stored in the P entry.
    pub fn p_value(&self) -> i32 {
        let bits = self.bits() & Self::all().bits()
            // 7-8: Reserved. Must be 1.
            | (0b11 << 6)
            // 13-32: Reserved. Must be 1.
            | (0xFFFFF << 12);

        bits as i32
    }
}

/// Algorithm protecting strings and streams. Both use a 128-bit file encryption key.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum CryptAlgorithm {
    /// RC4 (security handler revision 3).
    #[default]
    Rc4,
    /// AES-128 in CBC mode (security handler revision 4).
    Aes128,
}

impl CryptAlgorithm {
    pub fn crypt_filter(self) -> &'static dyn CryptFilter {
        match self {
            CryptAlgorithm::Rc4 => &Rc4CryptFilter,
            CryptAlgorithm::Aes128 => &Aes128CryptFilter,
        }
    }

    /// Value of the V entry.
    pub fn version(self) -> i64 {
        match self {
            CryptAlgorithm::Rc4 => 2,
            CryptAlgorithm::Aes128 => 4,
        }
    }

    /// Value of the R entry.
    pub fn revision(self) -> i64 {
        match self {
            CryptAlgorithm::Rc4 => 3,
            CryptAlgorithm::Aes128 => 4,
        }
    }
}

/// What to protect a document with. Passwords are wiped from memory when the configuration is
/// dropped.
#[derive(Clone)]
pub struct EncryptionConfiguration {
    pub algorithm: CryptAlgorithm,
    pub permissions: Permissions,
    pub user_password: String,
    /// When absent, a random owner password is generated and never revealed.
    pub owner_password: Option<String>,
}

impl EncryptionConfiguration {
    /// A configuration granting every permission, without an owner password.
    pub fn new<U: Into<String>>(algorithm: CryptAlgorithm, user_password: U) -> Self {
        Self {
            algorithm,
            permissions: Permissions::all(),
            user_password: user_password.into(),
            owner_password: None,
        }
    }

    pub fn with_owner_password<O: Into<String>>(mut self, owner_password: O) -> Self {
        self.owner_password = Some(owner_password.into());
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }
}

impl fmt::Debug for EncryptionConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfiguration")
            .field("algorithm", &self.algorithm)
            .field("permissions", &self.permissions)
            .field("owner_password", &self.owner_password.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl Drop for EncryptionConfiguration {
    fn drop(&mut self) {
        self.user_password.zeroize();
        self.owner_password.zeroize();
    }
}

/// The first element of the trailer's ID array, mixed into every key of the document.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DocumentId([u8; 16]);

impl DocumentId {
    pub fn generate(random: &dyn RandomSource) -> Result<Self, EncryptionError> {
        let mut bytes = [0u8; 16];
        random.fill_bytes(&mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// The trailer's ID array: two identical hexadecimal strings for a newly created file.
    pub fn to_trailer_array(&self) -> Object {
        Object::Array(vec![
            Object::String(self.0.to_vec(), StringFormat::Hexadecimal),
            Object::String(self.0.to_vec(), StringFormat::Hexadecimal),
        ])
    }
}

/// Encrypts every string and stream in `obj`, which is (or belongs to) the indirect object
/// numbered `object_number`.
pub fn encrypt_object(handler: &SecurityHandler, object_number: u32, obj: &mut Object) -> Result<(), EncryptionError> {
    match obj {
        // Encryption applies to all strings and streams in the document's PDF file, i.e., we have to
        // recursively process array and dictionary objects to encrypt any string and stream objects
        // stored inside of those.
        Object::Array(objects) => {
            for obj in objects {
                encrypt_object(handler, object_number, obj)?;
            }
        }
        Object::Dictionary(dict) => {
            for (_, obj) in dict.iter_mut() {
                encrypt_object(handler, object_number, obj)?;
            }
        }
        Object::String(content, _) => {
            *content = handler.encrypt(object_number, content)?;
        }
        Object::Stream(stream) => {
            // The cross-reference stream shall not be encrypted and strings appearing in the
            // cross-reference stream dictionary shall not be encrypted.
            if stream.dict.has_type(b"XRef") {
                return Ok(());
            }

            for (_, obj) in stream.dict.iter_mut() {
                encrypt_object(handler, object_number, obj)?;
            }

            let ciphertext = handler.encrypt(object_number, &stream.content)?;
            stream.set_content(ciphertext);
        }
        // Encryption is not applied to other object types such as integers and boolean values.
        _ => (),
    }

    Ok(())
}

/// Decrypts `obj`, undoing [`encrypt_object`].
pub fn decrypt_object(handler: &SecurityHandler, object_number: u32, obj: &mut Object) -> Result<(), EncryptionError> {
    match obj {
        Object::Array(objects) => {
            for obj in objects {
                decrypt_object(handler, object_number, obj)?;
            }
        }
        Object::Dictionary(dict) => {
            for (_, obj) in dict.iter_mut() {
                decrypt_object(handler, object_number, obj)?;
            }
        }
        Object::String(content, _) => {
            *content = handler.decrypt(object_number, content)?;
        }
        Object::Stream(stream) => {
            if stream.dict.has_type(b"XRef") {
                return Ok(());
            }

            for (_, obj) in stream.dict.iter_mut() {
                decrypt_object(handler, object_number, obj)?;
            }

            let plaintext = handler.decrypt(object_number, &stream.content)?;
            stream.set_content(plaintext);
        }
        _ => (),
    }

    Ok(())
}
