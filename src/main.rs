use blob_squeeze::config::{self, OptimizerConfig};
use blob_squeeze::imaging::{
    CancelToken, CodecTable, CompressionParams, Decoder, FormatGate, ResampleFilter,
    mime_for_extension,
};
use blob_squeeze::pipeline::Optimizer;
use blob_squeeze::store::{BlobRef, FsBlobStore};
use blob_squeeze::{batch, output};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Error, Debug)]
enum CliError {
    #[error("cannot infer mime type for {}; pass --mime", .0.display())]
    UnknownMimeType(PathBuf),
}

#[derive(Parser)]
#[command(name = "blob-squeeze")]
#[command(about = "Recompress uploaded images into bounded-size JPEGs")]
#[command(long_about = "\
Recompress uploaded images into bounded-size JPEGs

JPEG, PNG and GIF uploads are decoded, downscaled so the longer side fits
--max-dimension, and re-encoded as JPEG at --quality. Anything else is
rejected (or, for `replace`, left untouched).

Modes:

  compress   file → file, no store involved
  put        file → content-addressed blob store
  replace    stored blob → recompressed blob, old one deleted afterwards
  batch      directory tree → mirrored tree of .jpg files

Settings are read from blob-squeeze.toml in the working directory (or
--config). Command-line flags override the file for a single run.

Run 'blob-squeeze gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./blob-squeeze.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Per-run overrides of the `[compression]` config section.
#[derive(clap::Args, Clone)]
struct CompressionArgs {
    /// JPEG quality, 1-100
    #[arg(long)]
    quality: Option<i32>,

    /// Bound on the longer output side in pixels; 0 disables resizing
    #[arg(long)]
    max_dimension: Option<u32>,

    /// Resampling filter for downscaled images
    #[arg(long, value_enum)]
    filter: Option<FilterArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FilterArg {
    Nearest,
    Bilinear,
    Lanczos3,
}

impl From<FilterArg> for ResampleFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::Nearest => ResampleFilter::Nearest,
            FilterArg::Bilinear => ResampleFilter::Bilinear,
            FilterArg::Lanczos3 => ResampleFilter::Lanczos3,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Recompress one image file to a JPEG file
    Compress {
        input: PathBuf,
        /// Output path (default: input with a .jpg extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Declared mime type (default: inferred from the file extension)
        #[arg(long)]
        mime: Option<String>,
        #[command(flatten)]
        compression: CompressionArgs,
    },
    /// Recompress one image file into the blob store
    Put {
        input: PathBuf,
        /// Declared mime type (default: inferred from the file extension)
        #[arg(long)]
        mime: Option<String>,
        /// Blob store directory (overrides [store] root)
        #[arg(long)]
        store: Option<PathBuf>,
        #[command(flatten)]
        compression: CompressionArgs,
    },
    /// Replace a stored blob with its recompressed version
    Replace {
        /// Reference of the blob to replace
        blob: String,
        /// Mime type the blob was uploaded with
        #[arg(long)]
        mime: String,
        /// Blob store directory (overrides [store] root)
        #[arg(long)]
        store: Option<PathBuf>,
        #[command(flatten)]
        compression: CompressionArgs,
    },
    /// Recompress every supported image under a directory
    Batch {
        source: PathBuf,
        /// Output directory for the .jpg mirror tree
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        compression: CompressionArgs,
    },
    /// Print a stock blob-squeeze.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let load = || config::load_config(cli.config.as_deref());

    match cli.command {
        Command::Compress {
            input,
            output: out,
            mime,
            compression,
        } => {
            let mut config = load()?;
            apply_overrides(&mut config, &compression)?;
            let params = params_for(&config, resolve_mime(mime, &input)?);
            let out = out.unwrap_or_else(|| default_output(&input));

            let file = File::open(&input)?;
            let source_size = file.metadata()?.len();
            let result = optimizer_for(&config).compress(
                BufReader::new(file),
                &params,
                &cancel_token(&config),
            )?;
            fs::write(&out, &result.bytes)?;
            output::print_compress_output(&input, &out, source_size, &result);
        }
        Command::Put {
            input,
            mime,
            store,
            compression,
        } => {
            let mut config = load()?;
            apply_overrides(&mut config, &compression)?;
            let params = params_for(&config, resolve_mime(mime, &input)?);
            let store = FsBlobStore::open(store.unwrap_or(config.store.root.clone()))?;

            let file = BufReader::new(File::open(&input)?);
            let stored = optimizer_for(&config).compress_and_commit(
                file,
                &params,
                &store,
                &cancel_token(&config),
            )?;
            output::print_stored_output(&stored);
        }
        Command::Replace {
            blob,
            mime,
            store,
            compression,
        } => {
            let mut config = load()?;
            apply_overrides(&mut config, &compression)?;
            let params = params_for(&config, mime);
            let store = FsBlobStore::open(store.unwrap_or(config.store.root.clone()))?;

            let outcome = optimizer_for(&config).replace_blob(
                &store,
                &BlobRef::new(blob),
                &params,
                &cancel_token(&config),
            )?;
            output::print_replace_output(&outcome);
        }
        Command::Batch {
            source,
            output: out,
            compression,
        } => {
            let mut config = load()?;
            apply_overrides(&mut config, &compression)?;
            // Each file's mime type comes from its extension.
            let params = params_for(&config, String::new());
            let report = batch::compress_tree(
                &optimizer_for(&config),
                &source,
                &out,
                &params,
                config::effective_threads(&config.processing),
                config.processing.timeout(),
            )?;
            output::print_batch_output(&report, &out);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("blob_squeeze={default_level}")));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Fold CLI flags into the loaded config and re-validate.
fn apply_overrides(
    config: &mut OptimizerConfig,
    args: &CompressionArgs,
) -> Result<(), config::ConfigError> {
    if let Some(quality) = args.quality {
        config.compression.quality = quality;
    }
    if let Some(max_dimension) = args.max_dimension {
        config.compression.max_dimension = max_dimension;
    }
    if let Some(filter) = args.filter {
        config.compression.filter = filter.into();
    }
    config.validate()
}

fn params_for(config: &OptimizerConfig, mime_type: String) -> CompressionParams {
    CompressionParams::new(
        mime_type,
        config.compression.quality,
        config.compression.max_dimension,
    )
}

fn optimizer_for(config: &OptimizerConfig) -> Optimizer {
    let decoder = Decoder::new(CodecTable::standard(), config.decode.max_source_bytes)
        .with_max_side(config.decode.max_side);
    Optimizer::new(FormatGate::new(), decoder, config.compression.filter)
}

fn cancel_token(config: &OptimizerConfig) -> CancelToken {
    match config.processing.timeout() {
        Some(limit) => CancelToken::with_timeout(limit),
        None => CancelToken::new(),
    }
}

/// Explicit `--mime` wins; otherwise infer from the file extension.
fn resolve_mime(explicit: Option<String>, input: &Path) -> Result<String, CliError> {
    if let Some(mime) = explicit {
        return Ok(mime);
    }
    input
        .extension()
        .and_then(|e| e.to_str())
        .and_then(mime_for_extension)
        .map(str::to_string)
        .ok_or_else(|| CliError::UnknownMimeType(input.to_path_buf()))
}

/// `photo.png` → `photo.jpg`; any JPEG source (`photo.JPG`, `photo.jpeg`)
/// → `photo.min.jpg`, so the source is never the output on a
/// case-insensitive filesystem.
fn default_output(input: &Path) -> PathBuf {
    let is_jpeg = input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
    if is_jpeg {
        input.with_extension("min.jpg")
    } else {
        input.with_extension("jpg")
    }
}
