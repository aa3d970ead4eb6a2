use crate::application::errors::StorageError;

/// Store trait - keyed persistence for service state blobs
pub trait StateStore: Send {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}
