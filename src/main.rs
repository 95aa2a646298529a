use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use webp_gallery::config::{self, ConfigError, JobConfig, ResizeConfig};
use webp_gallery::process::{self, BatchControl, ProcessError};
use webp_gallery::types::SourceFormat;
use webp_gallery::{inspect, output, validation};

/// Job settings shared by `convert` and `check`. Flags override the config file.
#[derive(clap::Args, Clone)]
struct JobArgs {
    /// Photos or directories of photos (directories are not searched recursively)
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// TOML config file (see `gen-config`)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory; files are written to <OUTPUT>/exported/
    #[arg(long)]
    output: Option<PathBuf>,

    /// WebP quality, 1-100
    #[arg(long)]
    quality: Option<u32>,

    /// Name outputs <PREFIX>-1.webp, <PREFIX>-2.webp, ... instead of keeping source names
    #[arg(long)]
    prefix: Option<String>,

    /// Target width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Target height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Keep the source aspect ratio (give only --width or --height)
    #[arg(long)]
    lock_aspect: Option<bool>,

    /// Base URL recorded as each image's link in gallery-data.json
    #[arg(long)]
    api_base_url: Option<String>,

    /// Maximum parallel workers (capped at CPU cores)
    #[arg(long)]
    jobs: Option<usize>,
}

impl JobArgs {
    fn resolve_config(&self) -> Result<JobConfig, ConfigError> {
        let mut config = config::load_config(self.config.as_deref())?;
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(quality) = self.quality {
            config.quality = quality;
        }
        if let Some(prefix) = &self.prefix {
            config.naming.prefix = Some(prefix.clone());
        }
        if let Some(url) = &self.api_base_url {
            config.api_base_url = Some(url.clone());
        }
        if let Some(jobs) = self.jobs {
            config.processing.max_processes = Some(jobs);
        }

        let lock_aspect = self
            .lock_aspect
            .or(config.resize.map(|r| r.lock_aspect))
            .unwrap_or(true);
        if self.width.is_some() || self.height.is_some() {
            // Axes given on the command line replace both axes from the file
            config.resize = Some(ResizeConfig {
                width: self.width,
                height: self.height,
                lock_aspect,
            });
        } else if let Some(resize) = config.resize.as_mut() {
            resize.lock_aspect = lock_aspect;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Parser)]
#[command(name = "webp-gallery")]
#[command(about = "Batch-convert photos to WebP and write a gallery manifest")]
#[command(long_about = "\
Batch-convert photos to WebP and write a gallery manifest

Every source (JPEG, PNG, TIFF, BMP or WebP) is converted to lossy WebP in
<output>/exported/, next to gallery-data.json listing each image's EXIF
exposure data, output size and optional link.

  output/
  └── exported/
      ├── gallery-data.json
      ├── shot-1.webp
      └── shot-2.webp

A batch refuses to start if it would overwrite earlier output or give two
sources the same name; pass --overwrite to replace a previous run.

Run 'webp-gallery gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Show debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert photos to WebP and write gallery-data.json
    Convert {
        #[command(flatten)]
        job: JobArgs,

        /// Replace output from a previous run
        #[arg(long)]
        overwrite: bool,
    },
    /// Validate config and report conflicts without converting anything
    Check(JobArgs),
    /// Show what an earlier run exported
    Inspect {
        /// Output directory of the earlier run
        #[arg(long, default_value = "output")]
        output: PathBuf,
    },
    /// Print a stock config file with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    match cli.command {
        Command::Convert { job, overwrite } => {
            let config = job.resolve_config()?;
            let sources = collect_sources(&job.paths)?;

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_process_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let control = BatchControl {
                overwrite,
                events: Some(tx),
                ..Default::default()
            };
            let outcome = process::run_batch(&sources, &config, control);
            printer
                .join()
                .map_err(|_| "progress printer panicked")?;

            let result = match outcome {
                Ok(result) => result,
                Err(ProcessError::Conflict(report)) => {
                    output::print_validation_report(&report);
                    return Err("refusing to overwrite existing output (use --overwrite)".into());
                }
                Err(e) => return Err(e.into()),
            };
            output::print_batch_result(&result, sources.len());
            if !result.is_completed() {
                return Err("batch aborted".into());
            }
        }
        Command::Check(job) => {
            let config = job.resolve_config()?;
            let sources = collect_sources(&job.paths)?;
            println!("==> Checking {} sources", sources.len());
            let planned = validation::preflight(&config, &sources)?;
            output::print_plan(&planned);
            if let validation::Preflight::Conflict(report) = &planned.preflight {
                output::print_validation_report(report);
                return Err("pre-flight found conflicts".into());
            }
            println!("==> Ready to convert");
        }
        Command::Inspect { output: dir } => {
            let inventory = inspect::inspect_export(&dir)?;
            output::print_inventory(&inventory);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Expand the command-line paths into a source list.
///
/// Files are kept as given (unsupported ones are rejected by pre-flight).
/// Directories contribute their supported images, sorted by name.
fn collect_sources(paths: &[PathBuf]) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut sources = Vec::new();
    for path in paths {
        if path.is_dir() {
            sources.extend(images_in(path)?);
        } else {
            sources.push(path.clone());
        }
    }
    Ok(sources)
}

fn images_in(dir: &Path) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if entry.file_type().is_file() && SourceFormat::from_path(entry.path()).is_some() {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}
