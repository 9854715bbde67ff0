use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use heic2jpg::{config, convert, decoder};

#[derive(Parser, Debug)]
#[command(
    name = "heic2jpg",
    version,
    about = "Convert HEIC images to JPEG while preserving the original EXIF metadata"
)]
struct Cli {
    /// HEIC files or directories to convert
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// JPEG quality 1-100 (overrides config)
    #[arg(short, long, value_name = "N")]
    quality: Option<u8>,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    // Load config
    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(quality) = cli.quality {
        if !(1..=100).contains(&quality) {
            anyhow::bail!("Quality must be between 1 and 100.");
        }
        config.quality = quality;
    }

    // Validate inputs
    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    // Collect sources
    let files = convert::collect_heic_files(&cli.paths);
    if files.is_empty() {
        anyhow::bail!("No HEIC files found in the specified paths.");
    }

    log::info!("Found {} HEIC file(s) to convert", files.len());

    let decoder = decoder::default_decoder()?;

    // Convert each file; one failure never stops the batch.
    let mut results = Vec::new();
    let total = files.len();

    for (i, source) in files.iter().enumerate() {
        log::info!("[{}/{}] Converting: {}", i + 1, total, source.display());

        let outcome = convert::convert_file(decoder.as_ref(), source, &config);
        if let Err(ref err) = outcome {
            log::error!("  {err}");
        }
        results.push((source, outcome));
    }

    // JSON output
    if cli.json {
        let json_results: Vec<serde_json::Value> = results
            .iter()
            .map(|(source, outcome)| {
                serde_json::json!({
                    "source": source.display().to_string(),
                    "destination": outcome
                        .as_ref()
                        .ok()
                        .map(|d| d.display().to_string()),
                    "error": outcome.as_ref().err().map(|e| e.to_string()),
                })
            })
            .collect();

        println!("{}", serde_json::to_string_pretty(&json_results)?);
    }

    // Summary
    let success = results.iter().filter(|(_, r)| r.is_ok()).count();
    let failed = total - success;
    log::info!("Done: {success} succeeded, {failed} failed out of {total} file(s)");

    Ok(())
}
