use clap::{Parser, Subcommand};
use image_derivatives::config::{self, EngineConfig};
use image_derivatives::convert::{ConversionRequest, Converter, ConverterOptions};
use image_derivatives::naming::normalize_subdir;
use image_derivatives::output;
use image_derivatives::types::{SourceFormat, TargetFormat};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Shared flags for commands that describe a set of derivatives.
#[derive(clap::Args, Clone)]
struct DerivativeArgs {
    /// Extra width to generate (repeatable). Overrides `derivatives.widths`
    #[arg(long = "width", value_name = "PX", value_parser = clap::value_parser!(u32).range(1..))]
    widths: Vec<u32>,

    /// Target format (repeatable). Overrides `derivatives.formats`
    #[arg(long = "format", value_name = "webp|avif", value_parser = parse_format)]
    formats: Vec<TargetFormat>,

    /// Re-encode even when existing derivatives are fresh
    #[arg(long)]
    force: bool,

    /// Report derivative paths relative to this directory
    #[arg(long)]
    root: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
#[command(name = "image-derivatives")]
#[command(about = "Generate WebP/AVIF derivatives that are never larger and never stale")]
#[command(long_about = "\
Generate WebP/AVIF derivatives that are never larger and never stale

Derivatives are written next to each source, one subdirectory per format:

  images/
  ├── extra.png
  ├── webp/
  │   ├── extra.webp               # full size
  │   └── extra@576x413.webp       # --width 576 (height rounded up)
  └── avif/
      └── extra.avif

A derivative is reused while its modification time equals the source's and it
is smaller than the source. Otherwise it is re-encoded, stepping quality down
from 100 until the output is smaller than the source.

Run 'image-derivatives gen-config' to generate a documented derivatives.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./derivatives.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or refresh derivatives for images and directories
    Convert {
        /// Source images, or directories to walk for PNG/JPEG files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[command(flatten)]
        args: DerivativeArgs,
    },
    /// Show what convert would do for one image, without writing anything
    Plan {
        path: PathBuf,
        #[command(flatten)]
        args: DerivativeArgs,
    },
    /// Show which encoders work in this build and runtime
    Capabilities,
    /// Print a stock derivatives.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Convert { paths, args } => {
            let config = load_engine_config(cli.config.as_deref())?;
            init_thread_pool(&config.processing);
            let converter = Converter::new(ConverterOptions::from_config(&config));

            let sources = collect_sources(&paths, &config)?;
            let requests: Vec<ConversionRequest> = sources
                .into_iter()
                .map(|source| build_request(source, &args, &config))
                .collect();
            tracing::debug!(sources = requests.len(), "starting conversion");

            if args.json {
                let batch = converter.convert_batch(&requests, None)?;
                println!("{}", serde_json::to_string_pretty(&batch.results)?);
                return Ok(());
            }

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_conversion_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let batch = converter.convert_batch(&requests, Some(tx));
            printer.join().map_err(|_| "output thread panicked")?;
            println!("Cache: {}", batch?.cache_stats);
        }
        Command::Plan { path, args } => {
            let config = load_engine_config(cli.config.as_deref())?;
            let converter = Converter::new(ConverterOptions::from_config(&config));
            let request = build_request(std::path::absolute(&path)?, &args, &config);
            let plan = converter.plan(&request)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                output::print_plan(&plan);
            }
        }
        Command::Capabilities => {
            let converter = Converter::new(ConverterOptions::default());
            output::print_capabilities(converter.encoders());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn parse_format(value: &str) -> Result<TargetFormat, String> {
    TargetFormat::parse(value).ok_or_else(|| format!("unknown format '{value}' (expected webp or avif)"))
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// An explicit `--config` must exist; the implicit `./derivatives.toml` may not.
fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(file) if !file.is_file() => {
            Err(format!("config file not found: {}", file.display()).into())
        }
        Some(file) => Ok(config::load_config_file(file)?),
        None => Ok(config::load_config(Path::new("."))?),
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn build_request(source: PathBuf, args: &DerivativeArgs, config: &EngineConfig) -> ConversionRequest {
    let widths = if args.widths.is_empty() {
        config.derivatives.widths.clone()
    } else {
        args.widths.clone()
    };
    let formats = if args.formats.is_empty() {
        config.derivatives.formats.clone()
    } else {
        args.formats.clone()
    };
    let mut request = ConversionRequest::new(source)
        .with_widths(widths)
        .with_formats(formats)
        .with_force_recreate(args.force);
    if let Some(root) = &args.root {
        // Sources are absolute, so the root must be too for prefix stripping.
        request = request.with_root(std::path::absolute(root).unwrap_or_else(|_| root.clone()));
    }
    request
}

/// Expand directories into the PNG/JPEG files beneath them, skipping the
/// derivative subdirectories. Explicit file arguments are kept as given so
/// the converter can report why they were skipped.
fn collect_sources(paths: &[PathBuf], config: &EngineConfig) -> std::io::Result<Vec<PathBuf>> {
    let derivative_dirs: Vec<&str> = TargetFormat::ALL
        .iter()
        .filter_map(|&format| {
            Path::new(normalize_subdir(config.output.subdir(format)))
                .file_name()
                .and_then(|name| name.to_str())
        })
        .collect();

    let mut sources = Vec::new();
    for path in paths {
        let path = std::path::absolute(path)?;
        if !path.is_dir() {
            sources.push(path);
            continue;
        }
        let walker = WalkDir::new(&path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| derivative_dirs.contains(&name))
            });
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if entry.file_type().is_file() && SourceFormat::from_path(entry.path()).is_some() {
                sources.push(entry.into_path());
            }
        }
    }
    Ok(sources)
}
