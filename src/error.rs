use thiserror::Error;

use crate::encryption;
use crate::ObjectId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// An Object has the wrong type, e.g. the Object is an Array where a Name would be expected.
    #[error("object has wrong type; expected type {expected} but found type {found}")]
    ObjectType {
        expected: &'static str,
        found: &'static str,
    },
    /// Dictionary key was not found.
    #[error("missing required dictionary key \"{0}\"")]
    DictKey(String),
    /// The Object ID was not found.
    #[error("object {0:?} was not found")]
    ObjectNotFound(ObjectId),
    /// Object numbers fill the whole `u32` range, so the xref size cannot be stored.
    #[error("object number {0} is too large to write")]
    ObjectNumberOverflow(u32),
    /// Encrypted documents only hold objects of generation 0.
    #[error("object {0:?} cannot be encrypted, only generation 0 is supported")]
    UnsupportedGeneration(ObjectId),
    /// The document already carries a security handler.
    #[error("the document is already encrypted")]
    AlreadyEncrypted,
    /// Error when encrypting or decrypting the contents of the file.
    #[error("encryption error: {0}")]
    Encryption(#[from] encryption::EncryptionError),
    /// IO error
    #[error("I/O error: {0}")]
    IO(#[from] std::io::Error),
}
