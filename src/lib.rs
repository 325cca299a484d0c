#![doc = include_str!("../README.md")]

mod object;
pub use object::{Dictionary, Object, ObjectId, Stream, StringFormat};

mod document;
pub use document::Document;

pub mod encryption;
pub use encryption::{
    CryptAlgorithm, DocumentId, EncryptionConfiguration, EncryptionError, Permissions, SecurityHandler,
};

mod error;
pub use error::{Error, Result};

mod writer;
pub use writer::Writer;
