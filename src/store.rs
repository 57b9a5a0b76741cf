use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Mutex;
use dashmap::DashMap;
use log::debug;
use uuid::Uuid;
use crate::error::CinelogError;

/// External blob storage. `put` picks a fresh name under `category` and
/// returns the store key; callers build public URLs by prefixing that key.
/// Calls are atomic individually, nothing ties them to a journal commit.
pub trait ObjectStore {
    async fn put(&self, category: &str, filename: &str, content_type: &str, content: &[u8])
        -> Result<String, CinelogError>;
    async fn delete(&self, key: &str) -> Result<(), CinelogError>;
}

impl<T: ObjectStore> ObjectStore for &T {
    async fn put(&self, category: &str, filename: &str, content_type: &str, content: &[u8])
        -> Result<String, CinelogError> {
        (**self).put(category, filename, content_type, content).await
    }

    async fn delete(&self, key: &str) -> Result<(), CinelogError> {
        (**self).delete(key).await
    }
}

/// Blobs as plain files below the upload directory.
pub struct FileObjectStore {
    upload_dir: PathBuf,
}

impl FileObjectStore {
    pub fn new(upload_dir: PathBuf) -> anyhow::Result<Self> {
        Ok(Self { upload_dir })
    }
}

impl ObjectStore for FileObjectStore {
    async fn put(&self, category: &str, filename: &str, content_type: &str, content: &[u8])
        -> Result<String, CinelogError> {
        let guid = Uuid::new_v4();
        let extension = extension_suffix(filename);
        let new_filename = format!("{}{}", guid, extension.unwrap_or_default());
        let key = format!("{}/{}", category, new_filename);
        let abs_path = self.upload_dir.join(&key);
        if let Some(parent) = abs_path.parent() {
            tokio::fs::create_dir_all(parent).await
                .map_err(CinelogError::StoreIOError)?;
        }
        tokio::fs::write(&abs_path, content).await
            .map_err(CinelogError::StoreIOError)?;
        debug!("stored {} ({}, {} bytes)", key, content_type, content.len());
        Ok(key)
    }

    async fn delete(&self, key: &str) -> Result<(), CinelogError> {
        let abs_path = self.upload_dir.join(key);
        tokio::fs::remove_file(&abs_path).await
            .map_err(CinelogError::StoreIOError)?;
        debug!("removed {}", key);
        Ok(())
    }
}

/// Test double: keeps blobs in a map and remembers every delete.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: DashMap<String, (String, Vec<u8>)>,
    deleted: Mutex<Vec<String>>,
}

impl InMemoryObjectStore {
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    pub fn content_type_of(&self, key: &str) -> Option<String> {
        self.objects.get(key).map(|x| x.value().0.clone())
    }

    pub fn deleted_keys(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, category: &str, filename: &str, content_type: &str, content: &[u8])
        -> Result<String, CinelogError> {
        let guid = Uuid::new_v4();
        let extension = extension_suffix(filename);
        let key = format!("{}/{}{}", category, guid, extension.unwrap_or_default());
        self.objects.insert(key.clone(), (content_type.to_string(), content.to_vec()));
        Ok(key)
    }

    async fn delete(&self, key: &str) -> Result<(), CinelogError> {
        self.deleted.lock().unwrap().push(key.to_string());
        self.objects.remove(key)
            .map(|_| ())
            .ok_or_else(|| CinelogError::StoreIOError(std::io::Error::new(
                std::io::ErrorKind::NotFound, format!("no such object: {}", key))))
    }
}

fn extension_suffix(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(OsStr::to_str)
        .map(|x| format!(".{x}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_put_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::new(dir.path().to_path_buf()).unwrap();

        let key = store.put("image/review", "photo.jpg", "image/jpeg", b"jpeg bytes").await.unwrap();
        assert!(key.starts_with("image/review/"));
        assert!(key.ends_with(".jpg"));

        let abs_path = dir.path().join(&key);
        assert_eq!(std::fs::read(&abs_path).unwrap(), b"jpeg bytes");

        store.delete(&key).await.unwrap();
        assert!(!abs_path.exists());
    }

    #[tokio::test]
    async fn file_store_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::new(dir.path().to_path_buf()).unwrap();

        let first = store.put("image/review", "photo.jpg", "image/jpeg", b"a").await.unwrap();
        let second = store.put("image/review", "photo.jpg", "image/jpeg", b"a").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn file_store_handles_missing_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::new(dir.path().to_path_buf()).unwrap();

        let key = store.put("image/review", "photo", "application/octet-stream", b"a").await.unwrap();
        let name = key.rsplit('/').next().unwrap();
        assert!(!name.contains('.'));
    }

    #[tokio::test]
    async fn file_store_delete_missing_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.delete("image/review/nope.jpg").await.is_err());
    }

    #[tokio::test]
    async fn in_memory_store_records_deletes() {
        let store = InMemoryObjectStore::default();
        let key = store.put("image/review", "photo.png", "image/png", b"png").await.unwrap();
        assert!(store.contains(&key));
        assert_eq!(store.content_type_of(&key).unwrap(), "image/png");

        store.delete(&key).await.unwrap();
        assert!(!store.contains(&key));
        assert_eq!(store.deleted_keys(), vec![key]);
    }
}
