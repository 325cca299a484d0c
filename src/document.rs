use crate::encryption::{DocumentId, EncryptionConfiguration, OsRandom, RandomSource, SecurityHandler};
use crate::{CryptAlgorithm, Dictionary, Error, Object, ObjectId, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// PDF document being assembled for writing.
#[derive(Debug, Clone)]
pub struct Document {
    /// The version of the PDF specification to which the file conforms.
    pub version: String,

    /// The trailer gives the location of the cross-reference table and of certain special objects.
    pub trailer: Dictionary,

    /// The objects that make up the document contained in the file.
    pub objects: BTreeMap<ObjectId, Object>,

    /// Current maximum object id within the document.
    pub max_id: u32,

    /// The encryption dictionary's object id and the handler protecting every other object.
    pub(crate) encryption: Option<(ObjectId, Arc<SecurityHandler>)>,
}

impl Document {
    /// Create new PDF document.
    pub fn new() -> Self {
        Self::with_version("1.7")
    }

    pub fn with_version<S: Into<String>>(version: S) -> Self {
        Self {
            version: version.into(),
            trailer: Dictionary::new(),
            objects: BTreeMap::new(),
            max_id: 0,
            encryption: None,
        }
    }

    /// Create an object ID.
    pub fn new_object_id(&mut self) -> ObjectId {
        self.max_id += 1;
        (self.max_id, 0)
    }

    /// Add PDF object into document's object list.
    pub fn add_object<T: Into<Object>>(&mut self, object: T) -> ObjectId {
        let id = self.new_object_id();
        self.objects.insert(id, object.into());
        id
    }

    /// Get object by object id, will iterate through reference chain.
    pub fn get_object(&self, id: ObjectId) -> Result<&Object> {
        let mut id = id;
        // A reference chain can be at most as long as the number of objects.
        for _ in 0..=self.objects.len() {
            match self.objects.get(&id) {
                Some(Object::Reference(next)) => id = *next,
                Some(object) => return Ok(object),
                None => break,
            }
        }
        Err(Error::ObjectNotFound(id))
    }

    pub fn get_object_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.objects.get_mut(&id).ok_or(Error::ObjectNotFound(id))
    }

    /// Protect the document with the standard security handler.
    ///
    /// A random document identifier is generated and stored in the trailer along with a reference
    /// to the encryption dictionary. Strings and streams are encrypted when the document is saved.
    pub fn encrypt(&mut self, config: &EncryptionConfiguration) -> Result<()> {
        if self.is_encrypted() {
            return Err(Error::AlreadyEncrypted);
        }

        let document_id = DocumentId::generate(&OsRandom)?;
        self.encrypt_with(config, document_id, Arc::new(OsRandom))
    }

    /// Like [`Document::encrypt`], with the document identifier and the source of randomness
    /// supplied by the caller.
    pub fn encrypt_with(
        &mut self,
        config: &EncryptionConfiguration,
        document_id: DocumentId,
        random: Arc<dyn RandomSource>,
    ) -> Result<()> {
        if self.is_encrypted() {
            return Err(Error::AlreadyEncrypted);
        }

        let handler = SecurityHandler::with_random_source(config, document_id, random)?;

        // AES crypt filters were introduced with PDF 1.6.
        if handler.algorithm() == CryptAlgorithm::Aes128 && self.version.as_str() < "1.6" {
            log::debug!("raising the document version from {} to 1.6 for AES", self.version);
            self.version = "1.6".to_string();
        }

        let dict_id = self.add_object(handler.encryption_dictionary());
        self.trailer.set("Encrypt", dict_id);
        self.trailer.set("ID", document_id.to_trailer_array());
        self.encryption = Some((dict_id, Arc::new(handler)));

        Ok(())
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    pub fn security_handler(&self) -> Option<&SecurityHandler> {
        self.encryption.as_ref().map(|(_, handler)| handler.as_ref())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::Permissions;
    use crate::{Stream, dictionary};

    #[test]
    fn object_ids_are_sequential() {
        let mut doc = Document::new();

        assert_eq!(doc.add_object(Object::Null), (1, 0));
        assert_eq!(doc.new_object_id(), (2, 0));
        assert_eq!(doc.add_object(true), (3, 0));
        assert_eq!(doc.max_id, 3);
    }

    #[test]
    fn get_object_follows_references() {
        let mut doc = Document::new();
        let target = doc.add_object(42);
        let first = doc.add_object(target);
        let second = doc.add_object(first);

        assert_eq!(doc.get_object(second).unwrap().as_i64().unwrap(), 42);
        assert!(matches!(doc.get_object((9, 0)), Err(Error::ObjectNotFound((9, 0)))));
    }

    #[test]
    fn reference_cycles_are_not_followed_forever() {
        let mut doc = Document::new();
        doc.objects.insert((1, 0), Object::Reference((2, 0)));
        doc.objects.insert((2, 0), Object::Reference((1, 0)));

        assert!(doc.get_object((1, 0)).is_err());
    }

    #[test]
    fn encrypt_registers_the_handler() {
        let mut doc = Document::with_version("1.4");
        let page = doc.add_object(dictionary! { "Title" => Object::string_literal("plain") });
        doc.add_object(Stream::new(dictionary! {}, b"content".to_vec()));

        let config = EncryptionConfiguration::new(CryptAlgorithm::Rc4, "")
            .with_owner_password("secret")
            .with_permissions(Permissions::PRINTABLE);
        let document_id = DocumentId::from_bytes([3; 16]);
        doc.encrypt_with(&config, document_id, Arc::new(OsRandom)).unwrap();

        assert!(doc.is_encrypted());
        assert_eq!(doc.version, "1.4");

        let dict_id = doc.trailer.get(b"Encrypt").unwrap().as_reference().unwrap();
        assert_eq!(dict_id, (3, 0));

        let dict = doc.get_object(dict_id).unwrap().as_dict().unwrap();
        assert_eq!(dict.get(b"P").unwrap().as_i64().unwrap(), -3900);
        assert_eq!(doc.trailer.get(b"ID").unwrap(), &document_id.to_trailer_array());

        // Objects stay in clear until the document is written.
        let title = doc.get_object(page).unwrap().as_dict().unwrap().get(b"Title").unwrap();
        assert_eq!(title.as_str().unwrap(), b"plain");

        assert_eq!(doc.security_handler().unwrap().document_id(), &document_id);
    }

    #[test]
    fn aes_raises_old_versions() {
        let mut doc = Document::with_version("1.3");
        let config = EncryptionConfiguration::new(CryptAlgorithm::Aes128, "user");
        doc.encrypt(&config).unwrap();
        assert_eq!(doc.version, "1.6");

        let mut doc = Document::new();
        doc.encrypt(&config).unwrap();
        assert_eq!(doc.version, "1.7");
    }

    #[test]
    fn encrypting_twice_fails() {
        let mut doc = Document::new();
        let config = EncryptionConfiguration::new(CryptAlgorithm::Rc4, "user");

        doc.encrypt(&config).unwrap();
        let max_id = doc.max_id;

        assert!(matches!(doc.encrypt(&config), Err(Error::AlreadyEncrypted)));
        assert_eq!(doc.max_id, max_id);
    }

    #[test]
    fn failed_encryption_leaves_the_document_untouched() {
        let mut doc = Document::new();
        let config = EncryptionConfiguration::new(CryptAlgorithm::Rc4, "naïve ☃");

        assert!(matches!(
            doc.encrypt(&config),
            Err(Error::Encryption(crate::encryption::EncryptionError::InvalidPasswordCharacter { .. }))
        ));
        assert!(!doc.is_encrypted());
        assert!(doc.objects.is_empty());
        assert!(!doc.trailer.has(b"Encrypt"));
    }
}
