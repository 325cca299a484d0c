use super::algorithms::{self, PasswordBlock};
use super::random::{OsRandom, RandomSource};
use super::{CryptAlgorithm, DocumentId, EncryptionConfiguration, EncryptionError, Permissions};
use crate::{Dictionary, Object, StringFormat, dictionary};
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

/// The standard security handler of a document being written.
///
/// All values derived from the passwords are computed once, when the handler is created, and are
/// read-only afterwards. The handler can therefore be shared between threads encrypting different
/// objects. The file encryption key is wiped when the handler is dropped.
pub struct SecurityHandler {
    algorithm: CryptAlgorithm,
    permissions: Permissions,
    p_value: i32,
    document_id: DocumentId,
    owner_value: [u8; 32],
    user_value: [u8; 32],
    master_key: Zeroizing<[u8; 16]>,
    random: Arc<dyn RandomSource>,
}

impl SecurityHandler {
    /// Derives the O and U entries and the file encryption key, drawing randomness from the
    /// operating system.
    pub fn new(config: &EncryptionConfiguration, document_id: DocumentId) -> Result<Self, EncryptionError> {
        Self::with_random_source(config, document_id, Arc::new(OsRandom))
    }

    /// Like [`SecurityHandler::new`], with the source of initialization vectors and synthesized
    /// owner passwords supplied by the caller.
    pub fn with_random_source(
        config: &EncryptionConfiguration,
        document_id: DocumentId,
        random: Arc<dyn RandomSource>,
    ) -> Result<Self, EncryptionError> {
        let user_password = algorithms::normalize_password(&config.user_password)?;

        let owner_password = match &config.owner_password {
            Some(owner_password) => algorithms::normalize_password(owner_password)?,
            None => {
                log::debug!("no owner password given, synthesizing one");
                algorithms::synthesize_owner_password(random.as_ref())?
            }
        };

        let p_value = config.permissions.p_value();

        let owner_value = algorithms::compute_owner_value(&owner_password, &user_password)?;
        let master_key =
            algorithms::compute_master_key(&user_password, &owner_value, p_value, document_id.as_bytes());
        let user_value = algorithms::compute_user_value(&master_key, document_id.as_bytes())?;

        log::debug!(
            "standard security handler ready: V {} R {} P {}",
            config.algorithm.version(),
            config.algorithm.revision(),
            p_value
        );

        Ok(Self {
            algorithm: config.algorithm,
            permissions: config.permissions & Permissions::all(),
            p_value,
            document_id,
            owner_value,
            user_value,
            master_key,
            random,
        })
    }

    /// Encrypts a string or stream belonging to the indirect object numbered `object_number`.
    pub fn encrypt(&self, object_number: u32, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let filter = self.algorithm.crypt_filter();
        let key = filter.compute_key(&self.master_key, object_number);

        filter.encrypt(&key, plaintext, self.random.as_ref())
    }

    /// Reverses [`SecurityHandler::encrypt`].
    pub fn decrypt(&self, object_number: u32, ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let filter = self.algorithm.crypt_filter();
        let key = filter.compute_key(&self.master_key, object_number);

        filter.decrypt(&key, ciphertext)
    }

    /// The encryption dictionary to store, unencrypted, in the file.
    pub fn encryption_dictionary(&self) -> Dictionary {
        let mut dict = dictionary! {
            "Filter" => "Standard",
            "V" => self.algorithm.version(),
            "R" => self.algorithm.revision(),
            "Length" => 128,
            "O" => Object::String(self.owner_value.to_vec(), StringFormat::Hexadecimal),
            "U" => Object::String(self.user_value.to_vec(), StringFormat::Hexadecimal),
            "P" => self.p_value,
        };

        if self.algorithm == CryptAlgorithm::Aes128 {
            let filter = self.algorithm.crypt_filter();

            dict.set(
                "CF",
                dictionary! {
                    "StdCF" => dictionary! {
                        "Length" => 16,
                        "AuthEvent" => "DocOpen",
                        "CFM" => Object::Name(filter.method().to_vec()),
                    },
                },
            );
            dict.set("StrF", "StdCF");
            dict.set("StmF", "StdCF");
        }

        dict
    }

    /// Whether `password` is the user password the document was protected with.
    pub fn authenticate_user_password(&self, password: &str) -> Result<bool, EncryptionError> {
        let password = algorithms::normalize_password(password)?;
        self.authenticate_padded_user_password(&password)
    }

    /// Whether `password` is the owner password the document was protected with.
    pub fn authenticate_owner_password(&self, password: &str) -> Result<bool, EncryptionError> {
        let password = algorithms::normalize_password(password)?;
        let user_password = algorithms::recover_user_password(&password, &self.owner_value)?;

        self.authenticate_padded_user_password(&user_password)
    }

    fn authenticate_padded_user_password(&self, password: &PasswordBlock) -> Result<bool, EncryptionError> {
        let master_key =
            algorithms::compute_master_key(password, &self.owner_value, self.p_value, self.document_id.as_bytes());
        let user_value = algorithms::compute_user_value(&master_key, self.document_id.as_bytes())?;

        // Only the first 16 bytes of the U entry are significant.
        Ok(user_value[..16] == self.user_value[..16])
    }

    pub fn algorithm(&self) -> CryptAlgorithm {
        self.algorithm
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    /// The signed value of the P entry.
    pub fn p_value(&self) -> i32 {
        self.p_value
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn owner_value(&self) -> &[u8; 32] {
        &self.owner_value
    }

    pub fn user_value(&self) -> &[u8; 32] {
        &self.user_value
    }

    #[cfg(test)]
    pub(crate) fn master_key(&self) -> &[u8; 16] {
        &self.master_key
    }
}

impl fmt::Debug for SecurityHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityHandler")
            .field("algorithm", &self.algorithm)
            .field("permissions", &self.permissions)
            .field("p_value", &self.p_value)
            .field("document_id", &self.document_id)
            .finish_non_exhaustive()
    }
}
