use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::type_name;
use std::sync::Arc;

use crate::record::serializer::{bincode_serializer, bytes_serializer, Object, SerializerRef};
use crate::record::RecordId;
use crate::storage::error::{StorageError, StorageResult};

/// Operations shared by the base record manager and the caches stacked on it.
///
/// Every method that touches the store fails with [`StorageError::Closed`]
/// once the manager has been closed.
pub trait RecordManager: Send {
    /// Stores `object` as a new record and returns its id.
    fn insert(&mut self, object: &Object, serializer: &SerializerRef) -> StorageResult<RecordId>;

    /// Replaces the record `id`. Fails with `RecordNotFound` for deleted ids.
    fn update(
        &mut self,
        id: RecordId,
        object: &Object,
        serializer: &SerializerRef,
    ) -> StorageResult<()>;

    /// The record `id`, or `None` if it does not exist.
    fn fetch(&mut self, id: RecordId, serializer: &SerializerRef)
        -> StorageResult<Option<Object>>;

    fn delete(&mut self, id: RecordId) -> StorageResult<()>;

    /// Succeeds for live and reserved ids. Fails with `InvalidRecordId` for an
    /// id that never named a record and `RecordNotFound` for a deleted one.
    fn check_record(&mut self, id: RecordId) -> StorageResult<()>;

    /// Allocates an id whose contents will be supplied by a later `update`.
    fn reserve(&mut self) -> StorageResult<RecordId>;

    fn commit(&mut self) -> StorageResult<()>;

    fn rollback(&mut self) -> StorageResult<()>;

    /// Commits pending work and releases the store. Later calls fail.
    fn close(&mut self) -> StorageResult<()>;

    /// Number of application root slots.
    fn root_count(&self) -> usize;

    fn get_root(&mut self, index: usize) -> StorageResult<RecordId>;

    fn set_root(&mut self, index: usize, id: RecordId) -> StorageResult<()>;

    fn get_named_object(&mut self, name: &str) -> StorageResult<Option<RecordId>>;

    /// Binds `name` to `id`; binding `RecordId::NONE` removes the name.
    fn set_named_object(&mut self, name: &str, id: RecordId) -> StorageResult<()>;

    /// Serializer the store was created with.
    fn default_serializer(&self) -> SerializerRef;
}

impl<R: RecordManager + ?Sized> RecordManager for Box<R> {
    fn insert(&mut self, object: &Object, serializer: &SerializerRef) -> StorageResult<RecordId> {
        (**self).insert(object, serializer)
    }

    fn update(
        &mut self,
        id: RecordId,
        object: &Object,
        serializer: &SerializerRef,
    ) -> StorageResult<()> {
        (**self).update(id, object, serializer)
    }

    fn fetch(
        &mut self,
        id: RecordId,
        serializer: &SerializerRef,
    ) -> StorageResult<Option<Object>> {
        (**self).fetch(id, serializer)
    }

    fn delete(&mut self, id: RecordId) -> StorageResult<()> {
        (**self).delete(id)
    }

    fn check_record(&mut self, id: RecordId) -> StorageResult<()> {
        (**self).check_record(id)
    }

    fn reserve(&mut self) -> StorageResult<RecordId> {
        (**self).reserve()
    }

    fn commit(&mut self) -> StorageResult<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> StorageResult<()> {
        (**self).rollback()
    }

    fn close(&mut self) -> StorageResult<()> {
        (**self).close()
    }

    fn root_count(&self) -> usize {
        (**self).root_count()
    }

    fn get_root(&mut self, index: usize) -> StorageResult<RecordId> {
        (**self).get_root(index)
    }

    fn set_root(&mut self, index: usize, id: RecordId) -> StorageResult<()> {
        (**self).set_root(index, id)
    }

    fn get_named_object(&mut self, name: &str) -> StorageResult<Option<RecordId>> {
        (**self).get_named_object(name)
    }

    fn set_named_object(&mut self, name: &str, id: RecordId) -> StorageResult<()> {
        (**self).set_named_object(name, id)
    }

    fn default_serializer(&self) -> SerializerRef {
        (**self).default_serializer()
    }
}

/// Byte, default-serializer and typed helpers over any [`RecordManager`].
pub trait RecordManagerExt: RecordManager {
    fn insert_bytes(&mut self, data: &[u8]) -> StorageResult<RecordId> {
        let object: Object = Arc::new(data.to_vec());
        self.insert(&object, &bytes_serializer())
    }

    fn update_bytes(&mut self, id: RecordId, data: &[u8]) -> StorageResult<()> {
        let object: Object = Arc::new(data.to_vec());
        self.update(id, &object, &bytes_serializer())
    }

    fn fetch_bytes(&mut self, id: RecordId) -> StorageResult<Option<Vec<u8>>> {
        self.fetch(id, &bytes_serializer())?
            .map(downcast::<Vec<u8>>)
            .transpose()
    }

    /// Inserts with the store's default serializer.
    fn insert_object(&mut self, object: &Object) -> StorageResult<RecordId> {
        let serializer = self.default_serializer();
        self.insert(object, &serializer)
    }

    fn update_object(&mut self, id: RecordId, object: &Object) -> StorageResult<()> {
        let serializer = self.default_serializer();
        self.update(id, object, &serializer)
    }

    fn fetch_object(&mut self, id: RecordId) -> StorageResult<Option<Object>> {
        let serializer = self.default_serializer();
        self.fetch(id, &serializer)
    }

    /// Inserts a serde value with a [`BincodeSerializer`](crate::record::BincodeSerializer).
    fn insert_value<T>(&mut self, value: T) -> StorageResult<RecordId>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let object: Object = Arc::new(value);
        self.insert(&object, &bincode_serializer::<T>())
    }

    fn update_value<T>(&mut self, id: RecordId, value: T) -> StorageResult<()>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let object: Object = Arc::new(value);
        self.update(id, &object, &bincode_serializer::<T>())
    }

    fn fetch_value<T>(&mut self, id: RecordId) -> StorageResult<Option<T>>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.fetch(id, &bincode_serializer::<T>())?
            .map(downcast::<T>)
            .transpose()
    }
}

impl<R: RecordManager + ?Sized> RecordManagerExt for R {}

/// Clones the concrete value out of a fetched object.
pub fn downcast<T: Clone + 'static>(object: Object) -> StorageResult<T> {
    object
        .downcast_ref::<T>()
        .cloned()
        .ok_or(StorageError::TypeMismatch {
            expected: type_name::<T>(),
        })
}
