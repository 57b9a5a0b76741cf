use clap::{Parser, Subcommand};
use cinelog::cli;
use cinelog::cli::{CreateArgs, UpdateArgs};
use cinelog::config::AppConfig;
use cinelog::entities::{ReviewId, UserId};
use fern::colors::{Color, ColoredLevelConfig};

#[derive(Parser, Debug)]
#[command(name = "cinelog", version, about = "Movie review journal with local image storage")]
struct Cli {
    #[arg(long, env = "CINELOG_WORKDIR", global = true, help = "Working directory (default: ~/.cinelog)")]
    workdir: Option<String>,

    #[arg(long, env = "CINELOG_UPLOAD_DIR", global = true, help = "Image directory (default: <workdir>/uploads)")]
    upload_dir: Option<String>,

    #[arg(long, env = "CINELOG_PUBLIC_URL", global = true, help = "Prefix prepended to image keys in output")]
    public_url: Option<String>,

    #[arg(long, env = "CINELOG_USER", global = true, default_value_t = 1, help = "Acting user id")]
    user: UserId,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a review
    Create(CreateArgs),
    /// Show one review with images, place and tags
    Show { review_id: ReviewId },
    /// List your reviews, most recently updated first
    List,
    /// Change fields of an existing review
    Update(UpdateArgs),
    /// Delete a review and its stored images
    Delete { review_id: ReviewId },
    /// Read or write the persisted configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print a config value (keys: work-dir, upload-dir, public-url)
    Get { key: String },
    /// Persist a config value (keys: work-dir, upload-dir, public-url)
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    setup_logging(args.verbose)?;

    let config = AppConfig::new(args.workdir, args.upload_dir, args.public_url)?;
    match args.command {
        Command::Create(create_args) => cli::create_review(config, args.user, create_args).await,
        Command::Show { review_id } => cli::show_review(config, review_id).await,
        Command::List => cli::list_reviews(config, args.user).await,
        Command::Update(update_args) => cli::update_review(config, args.user, update_args).await,
        Command::Delete { review_id } => cli::delete_review(config, args.user, review_id).await,
        Command::Config { action } => match action {
            ConfigAction::Get { key } => cli::get_config_value(config, &key),
            ConfigAction::Set { key, value } => cli::set_config_value(config, &key, &value),
        },
    }
    Ok(())
}

fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::BrightBlack)
        .trace(Color::BrightBlack);
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} {} [{}] {}",
                humantime::format_rfc3339_seconds(std::time::SystemTime::now()),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}
