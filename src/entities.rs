use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::utils::hash_utils::MurMurHasher;

pub type ReviewId = i64;
pub type UserId = i64;
pub type MovieId = i64;
pub type ImageId = i64;
pub type ReviewImageId = i64;
pub type TagId = i64;
pub type ReviewTagId = i64;
pub type PlaceId = i64;
pub type ReviewPlaceId = i64;

/// One user's review of one movie. At most one review exists per
/// (user_id, movie_id) pair.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct Review {
    pub id: ReviewId,
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub title: String,
    pub content: String,
    pub rating: f32,
    pub with_user: String,
    pub watched_date: NaiveDate,
    pub watched_time: NaiveTime,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A blob in the object store. `image_url` is the store key; the public
/// URL is the configured prefix plus this key.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub id: ImageId,
    pub image_url: String,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReviewImage {
    pub id: ReviewImageId,
    pub review_id: ReviewId,
    pub image_id: ImageId,
}

/// Shared label, deduplicated by name.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

impl Tag {
    /// Stable display color: the same name always hashes to the same
    /// palette entry.
    pub fn color(&self) -> &'static str {
        TAG_COLORS[MurMurHasher::bucket(&self.name, TAG_COLORS.len())]
    }
}

pub const TAG_COLORS: [&str; 4] = ["#ff5a5a", "#ffa94d", "#51cf66", "#339af0"];

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReviewTag {
    pub id: ReviewTagId,
    pub review_id: ReviewId,
    pub tag_id: TagId,
}

/// A location, deduplicated by the (mapx, mapy) coordinate pair.
/// Coordinates are kept in their original string form.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Place {
    pub id: PlaceId,
    pub name: String,
    pub link: String,
    pub mapx: String,
    pub mapy: String,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReviewPlace {
    pub id: ReviewPlaceId,
    pub review_id: ReviewId,
    pub place_id: PlaceId,
}

/// Payload for creating a review. Required fields are optional here so the
/// manager can answer with the name of the first one that is missing.
#[derive(Debug, Default, Clone)]
pub struct NewReview {
    pub movie_id: Option<MovieId>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub rating: Option<String>,
    pub watched_date: Option<String>,
    pub with_user: Option<String>,
    pub place: Option<PlaceInput>,
    pub review_images: Vec<ImageUpload>,
    pub tags: Option<String>,
}

/// Sparse patch: only the fields that are `Some` are applied.
#[derive(Debug, Default, Clone)]
pub struct ReviewPatch {
    pub place: Option<PlaceInput>,
    pub tags: Option<String>,
    pub review_images_url: Option<Vec<String>>,
    pub review_images: Option<Vec<ImageUpload>>,
    pub watched_date: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub with_user: Option<String>,
}

impl ReviewPatch {
    pub fn is_empty(&self) -> bool {
        self.place.is_none()
            && self.tags.is_none()
            && self.review_images_url.is_none()
            && self.review_images.is_none()
            && self.watched_date.is_none()
            && self.title.is_none()
            && self.content.is_none()
            && self.with_user.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceInput {
    pub name: String,
    pub link: String,
    pub mapx: String,
    pub mapy: String,
}

/// An image blob as it arrives from the caller (original filename plus
/// raw bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Fully assembled review for display.
#[derive(serde::Serialize, Clone, Debug, PartialEq)]
pub struct ReviewDetail {
    pub review_id: ReviewId,
    pub movie_id: MovieId,
    pub title: String,
    pub content: String,
    pub rating: f32,
    pub with_user: String,
    pub watched_date: String,
    pub review_images: Vec<String>,
    pub place: Option<PlaceView>,
    pub tags: Vec<TagView>,
}

#[derive(serde::Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PlaceView {
    pub name: String,
    pub mapx: String,
    pub mapy: String,
    pub link: String,
}

#[derive(serde::Serialize, Clone, Debug, PartialEq, Eq)]
pub struct TagView {
    pub tag: String,
    pub color: String,
}

/// One row of a user's review listing, newest update first.
#[derive(serde::Serialize, Clone, Debug, PartialEq)]
pub struct ReviewSummary {
    pub review_id: ReviewId,
    pub movie_id: MovieId,
    pub title: String,
    pub rating: f32,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_color_is_stable() {
        let tag = Tag { id: 1, name: "date-night".to_string() };
        let first = tag.color();
        for _ in 0..10 {
            assert_eq!(tag.color(), first);
        }
        assert!(TAG_COLORS.contains(&first));
    }

    #[test]
    fn tag_color_depends_only_on_name() {
        let a = Tag { id: 1, name: "thriller".to_string() };
        let b = Tag { id: 99, name: "thriller".to_string() };
        assert_eq!(a.color(), b.color());
    }

    #[test]
    fn empty_patch_is_empty() {
        assert!(ReviewPatch::default().is_empty());
        let patch = ReviewPatch { title: Some("x".to_string()), ..Default::default() };
        assert!(!patch.is_empty());
    }
}
