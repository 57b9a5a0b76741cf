use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use crate::entities::{Image, ImageId, Place, Review, ReviewId, ReviewImage, ReviewImageId,
                      ReviewPlace, ReviewPlaceId, ReviewTag, ReviewTagId, Tag};
use crate::error::CinelogError;

/// One row-level mutation. A whole aggregate operation commits as a single
/// journal line holding all of its row mutations, so the line either lands
/// completely or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DbOperation {
    CreateReview { review: Review },
    UpdateReview { review: Review },
    DeleteReview { review_id: ReviewId },
    CreateImage { image: Image },
    DeleteImage { image_id: ImageId },
    CreateReviewImage { review_image: ReviewImage },
    DeleteReviewImage { review_image_id: ReviewImageId },
    CreateTag { tag: Tag },
    CreateReviewTag { review_tag: ReviewTag },
    DeleteReviewTag { review_tag_id: ReviewTagId },
    CreatePlace { place: Place },
    CreateReviewPlace { review_place: ReviewPlace },
    DeleteReviewPlace { review_place_id: ReviewPlaceId },
}

pub trait Storage {
    async fn read_all(&self) -> Result<Vec<DbOperation>, CinelogError>;
    async fn write(&mut self, operations: &[DbOperation]) -> Result<(), CinelogError>;
}

impl<T: Storage> Storage for &mut T {
    async fn read_all(&self) -> Result<Vec<DbOperation>, CinelogError> {
        (**self).read_all().await
    }

    async fn write(&mut self, operations: &[DbOperation]) -> Result<(), CinelogError> {
        (**self).write(operations).await
    }
}

pub struct FileStorage {
    db_path: PathBuf,
}

impl FileStorage {
    pub fn new(db_path: PathBuf) -> anyhow::Result<Self> {
        Ok(Self { db_path })
    }
}

impl Storage for FileStorage {
    async fn read_all(&self) -> Result<Vec<DbOperation>, CinelogError> {
        let file_str = tokio::fs::read_to_string(&self.db_path).await
            .map_err(CinelogError::DbIOError)?;
        let batches = file_str.split('\n')
            .filter(|x| !x.is_empty())
            .map(|x| serde_json::from_str(x).map_err(CinelogError::DbSerializationError))
            .collect::<Result<Vec<Vec<DbOperation>>, CinelogError>>()?;
        Ok(batches.into_iter().flatten().collect())
    }

    async fn write(&mut self, operations: &[DbOperation]) -> Result<(), CinelogError> {
        if operations.is_empty() {
            return Ok(());
        }
        let serialized_batch = serde_json::to_string(operations)
            .map_err(CinelogError::DbSerializationError)?;
        let line = format!("{}\n", serialized_batch);
        let mut file = tokio::fs::OpenOptions::new().append(true).open(&self.db_path).await
            .map_err(CinelogError::DbIOError)?;
        tokio::io::AsyncWriteExt::write_all(&mut file, line.as_bytes()).await
            .map_err(CinelogError::DbIOError)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    operations: Vec<DbOperation>,
}

impl Storage for InMemoryStorage {
    async fn read_all(&self) -> Result<Vec<DbOperation>, CinelogError> {
        Ok(self.operations.clone())
    }

    async fn write(&mut self, operations: &[DbOperation]) -> Result<(), CinelogError> {
        self.operations.extend_from_slice(operations);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_op(id: i64, name: &str) -> DbOperation {
        DbOperation::CreateTag { tag: Tag { id, name: name.to_string() } }
    }

    #[tokio::test]
    async fn file_storage_round_trips_batches() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("cinelog.db.json");
        std::fs::write(&db_path, "").unwrap();

        let mut storage = FileStorage::new(db_path.clone()).unwrap();
        storage.write(&[tag_op(1, "a"), tag_op(2, "b")]).await.unwrap();
        storage.write(&[tag_op(3, "c")]).await.unwrap();

        let operations = storage.read_all().await.unwrap();
        assert_eq!(operations, vec![tag_op(1, "a"), tag_op(2, "b"), tag_op(3, "c")]);

        // one line per batch
        let raw = std::fs::read_to_string(&db_path).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[tokio::test]
    async fn file_storage_skips_empty_batches() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("cinelog.db.json");
        std::fs::write(&db_path, "").unwrap();

        let mut storage = FileStorage::new(db_path.clone()).unwrap();
        storage.write(&[]).await.unwrap();

        assert!(storage.read_all().await.unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(&db_path).unwrap(), "");
    }

    #[tokio::test]
    async fn in_memory_storage_round_trips_batches() {
        let mut storage = InMemoryStorage::default();
        storage.write(&[tag_op(1, "a")]).await.unwrap();
        storage.write(&[tag_op(2, "b"), tag_op(3, "c")]).await.unwrap();

        let operations = storage.read_all().await.unwrap();
        assert_eq!(operations.len(), 3);
        assert_eq!(operations[2], tag_op(3, "c"));
    }
}
