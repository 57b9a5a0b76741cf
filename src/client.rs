use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use chrono::{NaiveDate, NaiveTime, Timelike, Utc};
use dashmap::DashMap;
use itertools::Itertools;
use log::{info, warn};
use crate::entities::*;
use crate::error::CinelogError;
use crate::storage::{DbOperation, Storage};
use crate::store::ObjectStore;
use crate::utils::str_utils::StringExtensions;

/// Store namespace for review photo uploads.
pub const REVIEW_IMAGE_CATEGORY: &str = "image/review";

#[derive(Debug)]
struct IdSequence(AtomicI64);

impl IdSequence {
    fn new() -> Self {
        Self(AtomicI64::new(1))
    }

    fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    fn observe(&self, id: i64) {
        self.0.fetch_max(id + 1, Ordering::SeqCst);
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct IdSequences {
    review: IdSequence,
    image: IdSequence,
    review_image: IdSequence,
    tag: IdSequence,
    review_tag: IdSequence,
    place: IdSequence,
    review_place: IdSequence,
}

/// The review aggregate manager. Holds the current row state in maps
/// replayed from the journal; every mutating operation commits its row
/// changes as one journal batch and only then applies them to the maps,
/// so the maps never show a half-applied operation.
pub struct CinelogClient<S: Storage, O: ObjectStore> {
    storage: S,
    store: O,
    public_url_prefix: String,
    reviews: DashMap<ReviewId, Review>,
    images: DashMap<ImageId, Image>,
    review_images: DashMap<ReviewImageId, ReviewImage>,
    tags: DashMap<TagId, Tag>,
    review_tags: DashMap<ReviewTagId, ReviewTag>,
    places: DashMap<PlaceId, Place>,
    review_places: DashMap<ReviewPlaceId, ReviewPlace>,
    next_ids: IdSequences,
}

impl<S: Storage, O: ObjectStore> CinelogClient<S, O> {
    pub fn new(storage: S, store: O, public_url_prefix: String) -> Self {
        Self {
            storage,
            store,
            public_url_prefix,
            reviews: DashMap::new(),
            images: DashMap::new(),
            review_images: DashMap::new(),
            tags: DashMap::new(),
            review_tags: DashMap::new(),
            places: DashMap::new(),
            review_places: DashMap::new(),
            next_ids: IdSequences::default(),
        }
    }

    pub async fn init(&mut self) -> Result<(), CinelogError> {
        info!("Importing journal...");
        let operations = self.storage.read_all().await?;
        let count = operations.len();
        for operation in operations {
            self.apply(operation);
        }
        info!("Journal imported: {} operations", count);
        Ok(())
    }

    // ---- reads ----------------------------------------------------------

    pub fn get_review(&self, review_id: ReviewId) -> Option<Review> {
        self.reviews.get(&review_id).map(|x| x.value().clone())
    }

    pub fn get_review_count(&self) -> usize {
        self.reviews.len()
    }

    pub fn find_review_by_user_and_movie(&self, user_id: UserId, movie_id: MovieId) -> Option<Review> {
        self.reviews.iter()
            .find(|x| x.value().user_id == user_id && x.value().movie_id == movie_id)
            .map(|x| x.value().clone())
    }

    pub fn find_tag_by_name(&self, name: &str) -> Option<Tag> {
        self.tags.iter()
            .find(|x| x.value().name == name)
            .map(|x| x.value().clone())
    }

    pub fn find_place_by_coordinates(&self, mapx: &str, mapy: &str) -> Option<Place> {
        self.places.iter()
            .find(|x| x.value().mapx == mapx && x.value().mapy == mapy)
            .map(|x| x.value().clone())
    }

    /// Image links of a review in insertion order (link ids are monotonic).
    pub fn review_images_of_review(&self, review_id: ReviewId) -> Vec<ReviewImage> {
        self.review_images.iter()
            .filter(|x| x.value().review_id == review_id)
            .map(|x| x.value().clone())
            .sorted_by_key(|x| x.id)
            .collect()
    }

    pub fn images_of_review(&self, review_id: ReviewId) -> Vec<Image> {
        self.review_images_of_review(review_id).iter()
            .filter_map(|x| self.images.get(&x.image_id).map(|i| i.value().clone()))
            .collect()
    }

    pub fn review_tags_of_review(&self, review_id: ReviewId) -> Vec<ReviewTag> {
        self.review_tags.iter()
            .filter(|x| x.value().review_id == review_id)
            .map(|x| x.value().clone())
            .sorted_by_key(|x| x.id)
            .collect()
    }

    pub fn review_place_of_review(&self, review_id: ReviewId) -> Option<ReviewPlace> {
        self.review_places.iter()
            .find(|x| x.value().review_id == review_id)
            .map(|x| x.value().clone())
    }

    pub fn get_tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn get_place_count(&self) -> usize {
        self.places.len()
    }

    /// Display form of a review: scalars, public image URLs, optional
    /// place, tags with their stable colors.
    pub fn get_review_detail(&self, review_id: ReviewId) -> Result<ReviewDetail, CinelogError> {
        let review = self.get_review(review_id)
            .ok_or(CinelogError::not_found("review", review_id))?;

        let review_images = self.images_of_review(review_id).iter()
            .map(|x| self.public_url(&x.image_url))
            .collect();

        let place = self.review_place_of_review(review_id)
            .and_then(|link| self.places.get(&link.place_id).map(|x| x.value().clone()))
            .map(|place| PlaceView {
                name: place.name,
                mapx: place.mapx,
                mapy: place.mapy,
                link: place.link,
            });

        let tags = self.review_tags_of_review(review_id).iter()
            .filter_map(|link| self.tags.get(&link.tag_id).map(|x| x.value().clone()))
            .map(|tag| TagView { color: tag.color().to_string(), tag: tag.name })
            .collect();

        Ok(ReviewDetail {
            review_id: review.id,
            movie_id: review.movie_id,
            title: review.title,
            content: review.content,
            rating: review.rating,
            with_user: review.with_user,
            watched_date: format_watched_date(review.watched_date, review.watched_time),
            review_images,
            place,
            tags,
        })
    }

    /// All reviews of one user, most recently updated first.
    pub fn list_reviews(&self, user_id: UserId) -> Vec<ReviewSummary> {
        self.reviews.iter()
            .filter(|x| x.value().user_id == user_id)
            .map(|x| x.value().clone())
            .sorted_by_key(|x| x.updated_at)
            .rev()
            .map(|review| ReviewSummary {
                review_id: review.id,
                movie_id: review.movie_id,
                title: review.title,
                rating: review.rating,
                updated_at: review.updated_at,
            })
            .collect()
    }

    pub fn public_url(&self, image_url: &str) -> String {
        format!("{}{}", self.public_url_prefix, image_url)
    }

    // ---- mutations ------------------------------------------------------

    pub async fn create_review(&mut self, user_id: UserId, payload: NewReview) -> Result<Review, CinelogError> {
        let movie_id = payload.movie_id.ok_or_else(|| CinelogError::missing_field("movie_id"))?;
        let title = payload.title.ok_or_else(|| CinelogError::missing_field("title"))?;
        let content = payload.content.ok_or_else(|| CinelogError::missing_field("content"))?;
        let rating_str = payload.rating.ok_or_else(|| CinelogError::missing_field("rating"))?;
        let watched_str = payload.watched_date.ok_or_else(|| CinelogError::missing_field("watched_date"))?;
        let with_user = payload.with_user.ok_or_else(|| CinelogError::missing_field("with_user"))?;

        let rating = parse_rating(&rating_str)?;
        let (watched_date, watched_time) = parse_watched_date(&watched_str)?;

        if self.find_review_by_user_and_movie(user_id, movie_id).is_some() {
            return Err(CinelogError::DuplicateReview { user_id, movie_id });
        }

        // uploads go first so a failed operation never commits rows whose
        // objects are missing from the store
        let uploaded_keys = self.upload_all(&payload.review_images).await?;

        let now = Utc::now();
        let review = Review {
            id: self.next_ids.review.next(),
            user_id,
            movie_id,
            title,
            content,
            rating,
            with_user,
            watched_date,
            watched_time,
            created_at: now,
            updated_at: now,
        };

        let mut operations = vec![DbOperation::CreateReview { review: review.clone() }];
        self.stage_image_links(review.id, &uploaded_keys, &mut operations);
        if let Some(place_input) = payload.place {
            self.stage_place_link(review.id, place_input, &mut operations);
        }
        if let Some(tags_str) = payload.tags {
            self.stage_tag_links(review.id, &tags_str, &mut operations);
        }

        if let Err(err) = self.commit(operations).await {
            self.delete_store_objects(&uploaded_keys).await;
            return Err(err);
        }
        info!("Review {} created for user {} and movie {}", review.id, user_id, movie_id);
        Ok(review)
    }

    pub async fn update_review(&mut self, user_id: UserId, review_id: ReviewId, patch: ReviewPatch) -> Result<Review, CinelogError> {
        let mut review = self.get_review(review_id)
            .ok_or(CinelogError::not_found("review", review_id))?;
        if review.user_id != user_id {
            return Err(CinelogError::not_found("review", review_id));
        }
        if patch.is_empty() {
            return Ok(review);
        }

        // validate scalars before touching the store
        let watched = patch.watched_date.as_deref().map(parse_watched_date).transpose()?;

        let uploaded_keys = match &patch.review_images {
            Some(uploads) => self.upload_all(uploads).await?,
            None => vec![],
        };

        let mut operations = vec![];
        let mut pruned_keys = vec![];

        if let Some(place_input) = patch.place {
            self.stage_place_link(review.id, place_input, &mut operations);
        }
        if let Some(tags_str) = patch.tags {
            self.stage_tag_links(review.id, &tags_str, &mut operations);
        }
        if let Some(retained_urls) = patch.review_images_url {
            pruned_keys = self.stage_image_prune(review.id, &retained_urls, &mut operations);
        }
        self.stage_image_links(review.id, &uploaded_keys, &mut operations);
        if let Some((watched_date, watched_time)) = watched {
            review.watched_date = watched_date;
            review.watched_time = watched_time;
        }
        if let Some(title) = patch.title {
            review.title = title;
        }
        if let Some(content) = patch.content {
            review.content = content;
        }
        if let Some(with_user) = patch.with_user {
            review.with_user = with_user;
        }
        review.updated_at = Utc::now();
        operations.push(DbOperation::UpdateReview { review: review.clone() });

        if let Err(err) = self.commit(operations).await {
            self.delete_store_objects(&uploaded_keys).await;
            return Err(err);
        }
        // pruned rows are gone; their blobs go now, best-effort
        self.delete_store_objects(&pruned_keys).await;
        info!("Review {} updated", review.id);
        Ok(review)
    }

    pub async fn delete_review(&mut self, user_id: UserId, review_id: ReviewId) -> Result<(), CinelogError> {
        let review = self.get_review(review_id)
            .ok_or(CinelogError::not_found("review", review_id))?;
        if review.user_id != user_id {
            return Err(CinelogError::not_found("review", review_id));
        }

        let mut operations = vec![];
        let mut orphaned_keys = vec![];
        for review_image in self.review_images_of_review(review_id) {
            operations.push(DbOperation::DeleteReviewImage { review_image_id: review_image.id });
            if let Some(image) = self.images.get(&review_image.image_id).map(|x| x.value().clone()) {
                operations.push(DbOperation::DeleteImage { image_id: image.id });
                orphaned_keys.push(image.image_url);
            }
        }
        for review_tag in self.review_tags_of_review(review_id) {
            operations.push(DbOperation::DeleteReviewTag { review_tag_id: review_tag.id });
        }
        if let Some(review_place) = self.review_place_of_review(review_id) {
            operations.push(DbOperation::DeleteReviewPlace { review_place_id: review_place.id });
        }
        operations.push(DbOperation::DeleteReview { review_id });

        self.commit(operations).await?;
        self.delete_store_objects(&orphaned_keys).await;
        info!("Review {} deleted", review_id);
        Ok(())
    }

    // ---- staging helpers ------------------------------------------------

    fn stage_image_links(&self, review_id: ReviewId, keys: &[String], operations: &mut Vec<DbOperation>) {
        for key in keys {
            let image = Image { id: self.next_ids.image.next(), image_url: key.clone() };
            operations.push(DbOperation::CreateImage { image: image.clone() });
            operations.push(DbOperation::CreateReviewImage {
                review_image: ReviewImage {
                    id: self.next_ids.review_image.next(),
                    review_id,
                    image_id: image.id,
                },
            });
        }
    }

    /// Get-or-create the place by its coordinate pair, then point the
    /// review's single place link at it.
    fn stage_place_link(&self, review_id: ReviewId, input: PlaceInput, operations: &mut Vec<DbOperation>) {
        let place = match self.find_place_by_coordinates(&input.mapx, &input.mapy) {
            Some(existing) => existing,
            None => {
                let place = Place {
                    id: self.next_ids.place.next(),
                    name: input.name,
                    link: input.link,
                    mapx: input.mapx,
                    mapy: input.mapy,
                };
                operations.push(DbOperation::CreatePlace { place: place.clone() });
                place
            }
        };
        if let Some(existing_link) = self.review_place_of_review(review_id) {
            if existing_link.place_id == place.id {
                return;
            }
            operations.push(DbOperation::DeleteReviewPlace { review_place_id: existing_link.id });
        }
        operations.push(DbOperation::CreateReviewPlace {
            review_place: ReviewPlace {
                id: self.next_ids.review_place.next(),
                review_id,
                place_id: place.id,
            },
        });
    }

    /// Get-or-create each named tag and link it, skipping links the review
    /// already has ("a, b, a" yields two links, not three).
    fn stage_tag_links(&self, review_id: ReviewId, tags_str: &str, operations: &mut Vec<DbOperation>) {
        let mut linked: HashSet<TagId> = self.review_tags_of_review(review_id).iter()
            .map(|x| x.tag_id)
            .collect();
        let mut staged_tags: HashMap<String, TagId> = HashMap::new();
        for name in tags_str.to_string().split_tags() {
            let tag_id = match self.find_tag_by_name(&name) {
                Some(tag) => tag.id,
                None => match staged_tags.get(&name) {
                    Some(id) => *id,
                    None => {
                        let tag = Tag { id: self.next_ids.tag.next(), name: name.clone() };
                        staged_tags.insert(name, tag.id);
                        let tag_id = tag.id;
                        operations.push(DbOperation::CreateTag { tag });
                        tag_id
                    }
                },
            };
            if linked.insert(tag_id) {
                operations.push(DbOperation::CreateReviewTag {
                    review_tag: ReviewTag {
                        id: self.next_ids.review_tag.next(),
                        review_id,
                        tag_id,
                    },
                });
            }
        }
    }

    /// Retained-set pruning: drop every image link whose public URL is not
    /// in `retained_urls`. Returns the store keys of the dropped images;
    /// the caller deletes them after the commit.
    fn stage_image_prune(&self, review_id: ReviewId, retained_urls: &[String], operations: &mut Vec<DbOperation>) -> Vec<String> {
        let mut pruned_keys = vec![];
        for review_image in self.review_images_of_review(review_id) {
            let maybe_image = self.images.get(&review_image.image_id).map(|x| x.value().clone());
            let Some(image) = maybe_image else { continue };
            if retained_urls.contains(&self.public_url(&image.image_url)) {
                continue;
            }
            operations.push(DbOperation::DeleteReviewImage { review_image_id: review_image.id });
            operations.push(DbOperation::DeleteImage { image_id: image.id });
            pruned_keys.push(image.image_url);
        }
        pruned_keys
    }

    // ---- store + journal plumbing ---------------------------------------

    async fn upload_all(&self, uploads: &[ImageUpload]) -> Result<Vec<String>, CinelogError> {
        let mut keys = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let content_type = guess_content_type(&upload.filename);
            match self.store.put(REVIEW_IMAGE_CATEGORY, &upload.filename, &content_type, &upload.content).await {
                Ok(key) => keys.push(key),
                Err(err) => {
                    // take back what this call already uploaded
                    self.delete_store_objects(&keys).await;
                    return Err(err);
                }
            }
        }
        Ok(keys)
    }

    async fn delete_store_objects(&self, keys: &[String]) {
        for key in keys {
            if let Err(err) = self.store.delete(key).await {
                warn!("Failed to delete store object {}: {}", key, err);
            }
        }
    }

    async fn commit(&mut self, operations: Vec<DbOperation>) -> Result<(), CinelogError> {
        if operations.is_empty() {
            return Ok(());
        }
        self.storage.write(&operations).await?;
        for operation in operations {
            self.apply(operation);
        }
        Ok(())
    }

    fn apply(&self, operation: DbOperation) {
        match operation {
            DbOperation::CreateReview { review } => {
                self.next_ids.review.observe(review.id);
                self.reviews.insert(review.id, review);
            }
            DbOperation::UpdateReview { review } => {
                self.reviews.insert(review.id, review);
            }
            DbOperation::DeleteReview { review_id } => {
                self.reviews.remove(&review_id);
            }
            DbOperation::CreateImage { image } => {
                self.next_ids.image.observe(image.id);
                self.images.insert(image.id, image);
            }
            DbOperation::DeleteImage { image_id } => {
                self.images.remove(&image_id);
            }
            DbOperation::CreateReviewImage { review_image } => {
                self.next_ids.review_image.observe(review_image.id);
                self.review_images.insert(review_image.id, review_image);
            }
            DbOperation::DeleteReviewImage { review_image_id } => {
                self.review_images.remove(&review_image_id);
            }
            DbOperation::CreateTag { tag } => {
                self.next_ids.tag.observe(tag.id);
                self.tags.insert(tag.id, tag);
            }
            DbOperation::CreateReviewTag { review_tag } => {
                self.next_ids.review_tag.observe(review_tag.id);
                self.review_tags.insert(review_tag.id, review_tag);
            }
            DbOperation::DeleteReviewTag { review_tag_id } => {
                self.review_tags.remove(&review_tag_id);
            }
            DbOperation::CreatePlace { place } => {
                self.next_ids.place.observe(place.id);
                self.places.insert(place.id, place);
            }
            DbOperation::CreateReviewPlace { review_place } => {
                self.next_ids.review_place.observe(review_place.id);
                self.review_places.insert(review_place.id, review_place);
            }
            DbOperation::DeleteReviewPlace { review_place_id } => {
                self.review_places.remove(&review_place_id);
            }
        }
    }
}

fn parse_rating(rating: &str) -> Result<f32, CinelogError> {
    let value = rating.trim().parse::<f32>()
        .map_err(|_| CinelogError::validation("rating", format!("not a number: {}", rating)))?;
    if !value.is_finite() {
        return Err(CinelogError::validation("rating", format!("not a finite number: {}", rating)));
    }
    Ok(value)
}

/// Split a combined "YYYY-MM-DD HH:MM[:SS]" string into its date and time.
fn parse_watched_date(combined: &str) -> Result<(NaiveDate, NaiveTime), CinelogError> {
    let (date_str, time_str) = combined.trim().split_once(' ')
        .ok_or_else(|| CinelogError::validation("watched_date", "expected 'YYYY-MM-DD HH:MM'"))?;
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|e| CinelogError::validation("watched_date", format!("bad date '{}': {}", date_str, e)))?;
    let time = NaiveTime::parse_from_str(time_str, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time_str, "%H:%M"))
        .map_err(|e| CinelogError::validation("watched_date", format!("bad time '{}': {}", time_str, e)))?;
    Ok((date, time))
}

fn format_watched_date(date: NaiveDate, time: NaiveTime) -> String {
    // seconds are accepted on input, so they must survive to the rendered form
    let time_fmt = if time.second() != 0 { "%H:%M:%S" } else { "%H:%M" };
    format!("{} {}", date.format("%Y-%m-%d"), time.format(time_fmt))
}

fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename).first_raw()
        .unwrap_or(mime::APPLICATION_OCTET_STREAM.essence_str())
        .to_string()
}
