//! Conversion between in-memory objects and record bytes.
//!
//! Objects are type-erased (`Arc<dyn Any>`) so that one record manager, and
//! one object cache, can hold values of many types. The serializer handed to
//! each call knows the concrete type.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{type_name, Any};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::storage::error::{StorageError, StorageResult};

/// A type-erased, shareable object.
pub type Object = Arc<dyn Any + Send + Sync>;

pub trait Serializer: Send + Sync {
    /// Stable name, persisted for the store's default serializer.
    fn name(&self) -> &str;

    fn serialize(&self, object: &Object) -> StorageResult<Vec<u8>>;

    fn deserialize(&self, bytes: &[u8]) -> StorageResult<Object>;
}

pub type SerializerRef = Arc<dyn Serializer>;

/// Stores `Vec<u8>` objects as their raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteArraySerializer;

impl ByteArraySerializer {
    pub const NAME: &'static str = "bytes";
}

impl Serializer for ByteArraySerializer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn serialize(&self, object: &Object) -> StorageResult<Vec<u8>> {
        object
            .downcast_ref::<Vec<u8>>()
            .cloned()
            .ok_or(StorageError::TypeMismatch {
                expected: "Vec<u8>",
            })
    }

    fn deserialize(&self, bytes: &[u8]) -> StorageResult<Object> {
        Ok(Arc::new(bytes.to_vec()))
    }
}

/// Stores any serde type with `bincode`.
pub struct BincodeSerializer<T> {
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeSerializer<T> {
    pub fn new() -> Self {
        Self {
            name: format!("bincode:{}", type_name::<T>()),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Serializer for BincodeSerializer<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn serialize(&self, object: &Object) -> StorageResult<Vec<u8>> {
        let value = object
            .downcast_ref::<T>()
            .ok_or(StorageError::TypeMismatch {
                expected: type_name::<T>(),
            })?;
        bincode::serialize(value).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> StorageResult<Object> {
        let value: T =
            bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(Arc::new(value))
    }
}

/// Shared handle to a [`BincodeSerializer`] for `T`.
pub fn bincode_serializer<T>() -> SerializerRef
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    Arc::new(BincodeSerializer::<T>::new())
}

/// Shared handle to the [`ByteArraySerializer`].
pub fn bytes_serializer() -> SerializerRef {
    Arc::new(ByteArraySerializer)
}
