use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiasset::model::{FilterBy, MediaLang, MediaMeta, MediaSecondTag, MediaTag, MediaType};
use tiasset::{config, MediaAssets};

#[derive(Parser)]
#[command(name = "tiasset")]
#[command(version, about = "Client for the TI media-asset service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(long, global = true)]
    config: Option<String>,

    /// Profile to use from config
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file as a new media item
    Upload {
        /// Path of the file to upload
        file: PathBuf,

        /// Media name shown in listings
        #[arg(long)]
        name: String,

        /// Media type (one of the service's category values)
        #[arg(long)]
        media_type: String,

        /// Primary tag
        #[arg(long)]
        tag: String,

        /// Secondary tag
        #[arg(long)]
        second_tag: Option<String>,

        /// Spoken language
        #[arg(long, default_value = "普通话")]
        lang: String,

        /// Concurrent block uploads
        #[arg(long, default_value = "4")]
        concurrency: usize,
    },

    /// List media items
    Ls {
        /// Page number (1-based)
        #[arg(long, default_value = "1")]
        page: u32,

        /// Items per page
        #[arg(long, default_value = "20")]
        page_size: u32,

        /// Filter by media name or id
        #[arg(long, default_value = "")]
        name_or_id: String,
    },

    /// Show detailed descriptors for media ids
    Details {
        /// Media ids
        ids: Vec<u64>,
    },

    /// Remove media items
    Rm {
        /// Media ids
        ids: Vec<u64>,
    },

    /// List selectable categories, labels and languages
    Categories,

    /// Download a media item's content
    Download {
        /// Media id
        id: u64,

        /// Output directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Output file name (defaults to the media name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Change a media item's tags
    Modify {
        /// Media id
        id: u64,

        /// New primary tag
        #[arg(long)]
        tag: String,

        /// New secondary tag
        #[arg(long)]
        second_tag: Option<String>,
    },

    /// Extend a media item's expiry by a number of days from now
    Expire {
        /// Media id
        id: u64,

        /// Days to keep the item
        days: u32,
    },
}

fn parse_meta(
    media_type: &str,
    tag: &str,
    second_tag: Option<&str>,
    lang: &str,
) -> Result<MediaMeta> {
    let media_type = MediaType::parse(media_type)
        .with_context(|| format!("unknown media type: {media_type}"))?;
    let tag = MediaTag::parse(tag).with_context(|| format!("unknown media tag: {tag}"))?;
    let second_tag = match second_tag {
        Some(raw) if !raw.is_empty() => Some(
            MediaSecondTag::parse(raw)
                .with_context(|| format!("unknown secondary tag: {raw}"))?,
        ),
        _ => None,
    };
    let lang = MediaLang::parse(lang).with_context(|| format!("unknown language: {lang}"))?;
    Ok(MediaMeta::new(media_type, tag, second_tag, lang))
}

fn parse_second_tag(raw: Option<&str>) -> Result<Option<MediaSecondTag>> {
    match raw {
        Some(raw) if !raw.is_empty() => Ok(Some(
            MediaSecondTag::parse(raw)
                .with_context(|| format!("unknown secondary tag: {raw}"))?,
        )),
        _ => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&cli.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::load_config(cli.config.as_deref(), cli.profile.as_deref())?;
    let profile = config
        .get_profile(cli.profile.as_deref())
        .context("no profile found in configuration")?;
    let assets = MediaAssets::new(profile);

    match cli.command {
        Commands::Upload {
            file,
            name,
            media_type,
            tag,
            second_tag,
            lang,
            concurrency,
        } => {
            let meta = parse_meta(&media_type, &tag, second_tag.as_deref(), &lang)?;
            let mut session = tiasset::upload::UploadSession::new(&assets, &file)
                .with_concurrency(concurrency);
            let info = session.run(&name, &meta).await?;
            println!(
                "uploaded media {} ({}), download url: {}",
                info.media_id, info.status, info.download_url
            );
        }

        Commands::Ls {
            page,
            page_size,
            name_or_id,
        } => {
            let filter = FilterBy {
                media_name_or_id: name_or_id,
                ..FilterBy::default()
            };
            let (medias, total) = assets.describe_medias(page, page_size, &filter).await?;
            for info in &medias {
                println!(
                    "{:>10}  {:<12}  {:>12}  {}",
                    info.media_id, info.status, info.size, info.name
                );
            }
            println!("{} of {} item(s)", medias.len(), total);
        }

        Commands::Details { ids } => {
            if ids.is_empty() {
                bail!("at least one media id is required");
            }
            let details = assets.describe_media_details(&ids).await?;
            println!("{}", serde_json::to_string_pretty(&details)?);
        }

        Commands::Rm { ids } => {
            if ids.is_empty() {
                bail!("at least one media id is required");
            }
            let failed = assets.remove_medias(&ids).await?;
            if failed.is_empty() {
                println!("removed {} item(s)", ids.len());
            } else {
                for item in &failed {
                    eprintln!("failed to remove {}: {}", item.media_id, item.failed_reason);
                }
                bail!("{} item(s) could not be removed", failed.len());
            }
        }

        Commands::Categories => {
            let (categories, labels, langs) = assets.describe_categories().await?;
            for category in &categories {
                println!("{}: {}", category.media_type, category.tag_set.join(", "));
            }
            for label in &labels {
                println!(
                    "{} / {}: {}",
                    label.media_type,
                    label.tag,
                    label.second_tag_set.join(", ")
                );
            }
            println!("languages: {}", langs.join(", "));
        }

        Commands::Download { id, dir, name } => {
            let details = assets.describe_media_details(&[id]).await?;
            let info = details
                .first()
                .with_context(|| format!("media {id} not found"))?;
            if info.download_url.is_empty() {
                bail!("media {} has no download url (status: {})", id, info.status);
            }
            let file_name = name.unwrap_or_else(|| {
                if info.name.is_empty() {
                    format!("media-{id}")
                } else {
                    info.name.clone()
                }
            });
            let path = assets
                .download_to_file(&info.download_url, &dir, &file_name)
                .await?;
            println!("downloaded media {} to {}", id, path.display());
        }

        Commands::Modify {
            id,
            tag,
            second_tag,
        } => {
            let tag = MediaTag::parse(&tag).with_context(|| format!("unknown media tag: {tag}"))?;
            let second_tag = parse_second_tag(second_tag.as_deref())?;
            assets.modify_media(id, tag, second_tag).await?;
            println!("modified media {id}");
        }

        Commands::Expire { id, days } => {
            assets.modify_expire_time(id, days).await?;
            println!("media {id} expires in {days} day(s)");
        }
    }

    Ok(())
}
