//! storage-cli: run one storage operation and print the `{value, error}` result as JSON

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use storage_abstraction::config::{AppConfig, LogFormat};
use storage_abstraction::result::OK;
use storage_abstraction::{AddFileParams, Options, ResultObject, Storage, StorageConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Connection URL; overrides the configured storage.
    #[arg(long, global = true)]
    url: Option<String>,

    /// Bucket to use instead of the one in the configuration.
    #[arg(long, short, global = true)]
    bucket: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    ListBuckets,
    CreateBucket {
        #[arg(long)]
        public: bool,
    },
    ClearBucket,
    DeleteBucket,
    BucketExists,
    BucketIsPublic,
    ListFiles {
        #[arg(long)]
        max_files: Option<usize>,
    },
    /// Upload a local file.
    Upload {
        source: PathBuf,
        target: String,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Download a file (or an inclusive byte range of it) to a local path.
    Download {
        file: String,
        dest: PathBuf,
        #[arg(long)]
        start: Option<u64>,
        #[arg(long)]
        end: Option<u64>,
    },
    Remove {
        file: String,
    },
    PublicUrl {
        file: String,
        #[arg(long)]
        no_check: bool,
        #[arg(long)]
        make_public: bool,
    },
    SignedUrl {
        file: String,
        #[arg(long)]
        expires_in: Option<u64>,
    },
    PresignedUploadUrl {
        file: String,
        #[arg(long)]
        expires_in: Option<u64>,
    },
    Size {
        file: String,
    },
    Exists {
        file: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("failed to load configuration")?;

    init_tracing(&config)?;

    let storage_config = match &cli.url {
        Some(url) => StorageConfig::Url(url.clone()),
        None => config
            .storage_config()
            .context("invalid storage configuration")?,
    };

    let storage = Storage::new(storage_config)
        .await
        .context("failed to build storage adapter")?;
    tracing::debug!(provider = %storage.provider(), "Storage ready");

    let outcome = run(&storage, cli.bucket.as_deref(), cli.command).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(storage: &Storage, bucket: Option<&str>, command: Command) -> ResultObject<Value> {
    match command {
        Command::ListBuckets => report(storage.list_buckets().await),
        Command::CreateBucket { public } => {
            let options = options([("public", json!(public))]);
            acknowledge(storage.create_bucket(bucket, &options).await)
        }
        Command::ClearBucket => acknowledge(storage.clear_bucket(bucket).await),
        Command::DeleteBucket => acknowledge(storage.delete_bucket(bucket).await),
        Command::BucketExists => report(storage.bucket_exists(bucket).await),
        Command::BucketIsPublic => report(storage.bucket_is_public(bucket).await),
        Command::ListFiles { max_files } => report(storage.list_files(bucket, max_files).await),
        Command::Upload {
            source,
            target,
            content_type,
        } => {
            let mut params = AddFileParams::from_path(source, target);
            if let Some(bucket) = bucket {
                params = params.bucket(bucket);
            }
            if let Some(content_type) = content_type {
                params = params.options(options([("contentType", json!(content_type))]));
            }
            acknowledge(storage.add_file_from_path(params).await)
        }
        Command::Download {
            file,
            dest,
            start,
            end,
        } => {
            let mut range = Options::new();
            if let Some(start) = start {
                range.insert("start".to_string(), json!(start));
            }
            if let Some(end) = end {
                range.insert("end".to_string(), json!(end));
            }
            report(download(storage, bucket, &file, &dest, &range).await)
        }
        Command::Remove { file } => acknowledge(storage.remove_file(bucket, &file).await),
        Command::PublicUrl {
            file,
            no_check,
            make_public,
        } => {
            let options = options([
                ("noCheck", json!(no_check)),
                ("makePublic", json!(make_public)),
            ]);
            report(storage.get_public_url(bucket, &file, &options).await)
        }
        Command::SignedUrl { file, expires_in } => {
            let options = expiry(expires_in);
            report(storage.get_signed_url(bucket, &file, &options).await)
        }
        Command::PresignedUploadUrl { file, expires_in } => {
            let options = expiry(expires_in);
            report(storage.get_presigned_upload_url(bucket, &file, &options).await)
        }
        Command::Size { file } => report(storage.size_of(bucket, &file).await),
        Command::Exists { file } => report(storage.file_exists(bucket, &file).await),
    }
}

async fn download(
    storage: &Storage,
    bucket: Option<&str>,
    file: &str,
    dest: &Path,
    options: &Options,
) -> storage_abstraction::Result<u64> {
    let mut stream = storage.get_file_as_stream(bucket, file, options).await?;
    let mut out = tokio::fs::File::create(dest).await?;
    let copied = tokio::io::copy(&mut stream, &mut out).await?;
    Ok(copied)
}

fn options<const N: usize>(entries: [(&str, Value); N]) -> Options {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn expiry(expires_in: Option<u64>) -> Options {
    match expires_in {
        Some(secs) => options([("expiresIn", json!(secs))]),
        None => Options::new(),
    }
}

fn report<T: Serialize>(result: storage_abstraction::Result<T>) -> ResultObject<Value> {
    result
        .and_then(|value| Ok(serde_json::to_value(value)?))
        .into()
}

fn acknowledge(result: storage_abstraction::Result<()>) -> ResultObject<Value> {
    report(result.map(|()| OK))
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.logging.level.clone()))
        .unwrap_or_else(|_| EnvFilter::new("storage_abstraction=info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // stdout carries the result document.
    match config.logging.format {
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
