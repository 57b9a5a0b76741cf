use std::path::PathBuf;
use clap::Args;
use colored::Colorize;
use humanize_bytes::humanize_bytes_decimal;
use log::error;
use crate::client::CinelogClient;
use crate::config;
use crate::config::AppConfig;
use crate::entities::{ImageUpload, NewReview, PlaceInput, ReviewId, ReviewPatch, TagView, UserId};
use crate::storage::FileStorage;
use crate::store::FileObjectStore;

#[derive(Args, Debug)]
pub struct PlaceArgs {
    /// Name of the place the movie was watched at
    #[arg(long = "place-name")]
    pub place_name: Option<String>,
    /// Map link for the place
    #[arg(long = "place-link")]
    pub place_link: Option<String>,
    /// Longitude-like map coordinate
    #[arg(long = "place-mapx")]
    pub place_mapx: Option<String>,
    /// Latitude-like map coordinate
    #[arg(long = "place-mapy")]
    pub place_mapy: Option<String>,
}

impl PlaceArgs {
    fn into_input(self) -> Option<PlaceInput> {
        let any_set = self.place_name.is_some() || self.place_link.is_some()
            || self.place_mapx.is_some() || self.place_mapy.is_some();
        if !any_set {
            return None;
        }
        if self.place_name.is_none() || self.place_link.is_none()
            || self.place_mapx.is_none() || self.place_mapy.is_none() {
            eprintln!("Place needs all of --place-name, --place-link, --place-mapx and --place-mapy");
            std::process::exit(1);
        }
        Some(PlaceInput {
            name: self.place_name.unwrap(),
            link: self.place_link.unwrap(),
            mapx: self.place_mapx.unwrap(),
            mapy: self.place_mapy.unwrap(),
        })
    }
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Id of the movie being reviewed
    #[arg(long)]
    pub movie: Option<i64>,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub content: Option<String>,
    /// Rating between 0 and 10, halves allowed
    #[arg(long)]
    pub rating: Option<String>,
    /// Combined date and time, e.g. "2024-01-01 19:00"
    #[arg(long)]
    pub watched: Option<String>,
    /// Who the movie was watched with
    #[arg(long = "with")]
    pub with_user: Option<String>,
    /// Image file to attach; repeatable
    #[arg(long = "image")]
    pub images: Vec<PathBuf>,
    /// Comma-separated tag names
    #[arg(long)]
    pub tags: Option<String>,
    #[command(flatten)]
    pub place: PlaceArgs,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub review_id: ReviewId,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub content: Option<String>,
    /// Combined date and time, e.g. "2024-01-01 19:00"
    #[arg(long)]
    pub watched: Option<String>,
    /// Who the movie was watched with
    #[arg(long = "with")]
    pub with_user: Option<String>,
    /// Comma-separated tag names to add
    #[arg(long)]
    pub tags: Option<String>,
    /// New image file to attach; repeatable
    #[arg(long = "image")]
    pub images: Vec<PathBuf>,
    /// Image URL to keep; repeatable. Any stored image not listed is removed
    #[arg(long = "keep")]
    pub keep: Vec<String>,
    /// Remove every stored image
    #[arg(long = "drop-images", conflicts_with = "keep")]
    pub drop_images: bool,
    #[command(flatten)]
    pub place: PlaceArgs,
}

async fn init_client(config: &AppConfig) -> CinelogClient<FileStorage, FileObjectStore> {
    let storage_result = FileStorage::new(config.db_path.clone());
    if storage_result.is_err() {
        error!("Failed to open journal: {}", storage_result.err().unwrap());
        std::process::exit(1);
    }
    let store_result = FileObjectStore::new(config.upload_dir.clone());
    if store_result.is_err() {
        error!("Failed to open upload dir: {}", store_result.err().unwrap());
        std::process::exit(1);
    }
    let mut client = CinelogClient::new(storage_result.unwrap(), store_result.unwrap(), config.public_url_prefix.clone());
    let init_result = client.init().await;
    if init_result.is_err() {
        error!("Failed to initialize client: {}", init_result.err().unwrap());
        std::process::exit(1);
    }
    client
}

fn read_image_files(paths: &[PathBuf]) -> Vec<ImageUpload> {
    let mut uploads = Vec::new();
    for path in paths {
        let canonical_result = std::fs::canonicalize(path);
        if canonical_result.is_err() {
            let err = canonical_result.err().unwrap();
            if err.kind() == std::io::ErrorKind::NotFound {
                error!("File not found: {}", path.display());
            } else {
                error!("IO Error: {}", err);
            }
            std::process::exit(1);
        }
        let canonical_path = canonical_result.unwrap();
        let bytes_result = std::fs::read(&canonical_path);
        if bytes_result.is_err() {
            error!("IO Error: {}", bytes_result.err().unwrap());
            std::process::exit(1);
        }
        let bytes = bytes_result.unwrap();
        let filename = canonical_path.file_name()
            .map(|x| x.to_string_lossy().to_string())
            .unwrap_or_default();
        println!("Attaching: {} ({})", filename, humanize_bytes_decimal!(bytes.len()));
        uploads.push(ImageUpload { filename, content: bytes });
    }
    uploads
}

pub async fn create_review(config: AppConfig, user_id: UserId, args: CreateArgs) {
    let review_images = read_image_files(&args.images);
    let payload = NewReview {
        movie_id: args.movie,
        title: args.title,
        content: args.content,
        rating: args.rating,
        watched_date: args.watched,
        with_user: args.with_user,
        place: args.place.into_input(),
        review_images,
        tags: args.tags,
    };

    let mut client = init_client(&config).await;
    let create_result = client.create_review(user_id, payload).await;
    if create_result.is_err() {
        error!("Failed to create review: {}", create_result.err().unwrap());
        std::process::exit(1);
    }
    let review = create_result.unwrap();
    println!("Review created: {}", review.id);
    std::process::exit(0);
}

pub async fn show_review(config: AppConfig, review_id: ReviewId) {
    let client = init_client(&config).await;
    let detail_result = client.get_review_detail(review_id);
    if detail_result.is_err() {
        error!("Failed to read review: {}", detail_result.err().unwrap());
        std::process::exit(1);
    }
    let detail = detail_result.unwrap();

    println!("Review #{} (movie {})", detail.review_id, detail.movie_id);
    println!("Title:   {}", detail.title);
    println!("Rating:  {}", detail.rating);
    println!("Watched: {}", detail.watched_date);
    println!("With:    {}", detail.with_user);
    if let Some(place) = &detail.place {
        println!("Place:   {} ({})", place.name, place.link);
    }
    if !detail.tags.is_empty() {
        let rendered: Vec<String> = detail.tags.iter().map(render_tag).collect();
        println!("Tags:    {}", rendered.join(" "));
    }
    for url in &detail.review_images {
        println!("Image:   {}", url);
    }
    println!();
    println!("{}", detail.content);
    std::process::exit(0);
}

pub async fn list_reviews(config: AppConfig, user_id: UserId) {
    let client = init_client(&config).await;
    let reviews = client.list_reviews(user_id);
    if reviews.is_empty() {
        println!("No reviews yet.");
        std::process::exit(0);
    }
    for review in reviews {
        println!("#{:<4} {:>4}  {}  (movie {}, updated {})",
            review.review_id, review.rating, review.title, review.movie_id,
            review.updated_at.format("%Y-%m-%d %H:%M"));
    }
    std::process::exit(0);
}

pub async fn update_review(config: AppConfig, user_id: UserId, args: UpdateArgs) {
    let review_images = if args.images.is_empty() {
        None
    } else {
        Some(read_image_files(&args.images))
    };
    let review_images_url = if args.drop_images {
        Some(Vec::new())
    } else if args.keep.is_empty() {
        None
    } else {
        Some(args.keep)
    };
    let patch = ReviewPatch {
        place: args.place.into_input(),
        tags: args.tags,
        review_images_url,
        review_images,
        watched_date: args.watched,
        title: args.title,
        content: args.content,
        with_user: args.with_user,
    };

    let mut client = init_client(&config).await;
    let update_result = client.update_review(user_id, args.review_id, patch).await;
    if update_result.is_err() {
        error!("Failed to update review: {}", update_result.err().unwrap());
        std::process::exit(1);
    }
    let review = update_result.unwrap();
    println!("Review updated: {}", review.id);
    std::process::exit(0);
}

pub async fn delete_review(config: AppConfig, user_id: UserId, review_id: ReviewId) {
    let mut client = init_client(&config).await;
    let delete_result = client.delete_review(user_id, review_id).await;
    if delete_result.is_err() {
        error!("Failed to delete review: {}", delete_result.err().unwrap());
        std::process::exit(1);
    }
    println!("Review deleted: {}", review_id);
    std::process::exit(0);
}

fn render_tag(tag: &TagView) -> String {
    match parse_hex_color(&tag.color) {
        Some((r, g, b)) => tag.tag.as_str().truecolor(r, g, b).to_string(),
        None => tag.tag.clone(),
    }
}

fn parse_hex_color(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

pub fn get_config_value(config: AppConfig, key: &str) {
    match key {
        "work-dir" => {
            println!("Workdir: {:?}", config.file_config.workdir);
            std::process::exit(0);
        },
        "upload-dir" => {
            println!("Upload dir: {:?}", config.file_config.upload_dir);
            std::process::exit(0);
        },
        "public-url" => {
            println!("Public URL prefix: {:?}", config.file_config.public_url_prefix);
            std::process::exit(0);
        },
        _ => {
            eprintln!("Invalid key: {}", key);
            std::process::exit(1);
        }
    }
}

pub fn set_config_value(mut config: AppConfig, key: &str, value: &str) {
    match key {
        "work-dir" => {
            let path_result = PathBuf::try_from(value);
            if path_result.is_err() {
                eprintln!("Invalid path: {}", value);
                std::process::exit(1);
            }
            let path = path_result.unwrap();
            if !path.exists() {
                eprintln!("Path does not exist: {:?}", path);
                std::process::exit(1);
            }
            let path_str = path.display().to_string();
            config.file_config.workdir = Some(path_str);
            write_config_or_exit(&config);
            println!("Workdir set to: {:?}", value);
            std::process::exit(0);
        },
        "upload-dir" => {
            let path_result = PathBuf::try_from(value);
            if path_result.is_err() {
                eprintln!("Invalid path: {}", value);
                std::process::exit(1);
            }
            let path = path_result.unwrap();
            if !path.exists() {
                eprintln!("Path does not exist: {:?}", path);
                std::process::exit(1);
            }
            let path_str = path.display().to_string();
            config.file_config.upload_dir = Some(path_str);
            write_config_or_exit(&config);
            println!("Upload dir set to: {:?}", value);
            std::process::exit(0);
        },
        "public-url" => {
            config.file_config.public_url_prefix = Some(value.to_string());
            write_config_or_exit(&config);
            println!("Public URL prefix set to: {:?}", value);
            std::process::exit(0);
        },
        _ => {
            eprintln!("Invalid key: {}", key);
            std::process::exit(1);
        }
    }
}

fn write_config_or_exit(config: &AppConfig) {
    let write_result = config::write_file_config(&config.config_path, &config.file_config);
    if write_result.is_err() {
        error!("Failed to write config: {}", write_result.err().unwrap());
        std::process::exit(1);
    }
}

#[test]
fn parse_hex_color_reads_palette_entries() {
    assert_eq!(parse_hex_color("#ff5a5a"), Some((255, 90, 90)));
    assert_eq!(parse_hex_color("#339af0"), Some((51, 154, 240)));
    assert_eq!(parse_hex_color("ff5a5a"), None);
    assert_eq!(parse_hex_color("#ff5a5"), None);
    assert_eq!(parse_hex_color("#gg5a5a"), None);
}

#[test]
fn render_tag_falls_back_on_bad_hex() {
    let tag = TagView { tag: "thriller".to_string(), color: "#51cf66".to_string() };
    assert!(render_tag(&tag).contains("thriller"));
    let bad = TagView { tag: "slow burn".to_string(), color: "teal".to_string() };
    assert_eq!(render_tag(&bad), "slow burn");
}
