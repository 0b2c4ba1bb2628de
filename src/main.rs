use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use webpify::config::{self, WebpifyConfig};
use webpify::imaging::{
    Codec, CodecBackend, CodecKind, Converter, Quality, ScalePercent, WEBP_MAX_DIMENSION,
};
use webpify::process::{BatchOptions, convert_batch};
use webpify::server::ConvertServer;
use webpify::{output, scan};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "webpify")]
#[command(about = "Convert images to WebP")]
#[command(long_about = "\
Convert images to WebP

Reads JPEG, PNG, GIF, BMP, TIFF, AVIF and WebP. Output can be resized by
percentage; neither edge ever exceeds the configured maximum (8000 by default).

Inputs may be files, directories (searched recursively) or glob patterns:

  webpify convert photo.jpg
  webpify convert shots/ -o web/ -q 70
  webpify convert 'raw/**/*.{png,tif}' -s 50 --dry-run

The same conversion is available over HTTP with 'webpify serve'
(POST /api/convert, multipart field 'image').

Run 'webpify gen-config' to generate a documented webpify.toml.")]
#[command(version)]
struct Cli {
    /// Config file [default: ./webpify.toml when present]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct ConvertArgs {
    /// Input files, glob patterns, or directories
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Quality (1-100)
    #[arg(short, long, allow_negative_numbers = true)]
    quality: Option<i64>,

    /// Scale percentage (1-200)
    #[arg(short, long, allow_negative_numbers = true)]
    scale: Option<i64>,

    /// Output directory or file path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Use lossless compression
    #[arg(long)]
    lossless: bool,

    /// Preview conversion results without writing files
    #[arg(long)]
    dry_run: bool,

    /// Cap on either output edge (1-16383)
    #[arg(long)]
    max_dimension: Option<u32>,

    /// Codec backend: libwebp or image-rs
    #[arg(long)]
    codec: Option<CodecKind>,

    /// Exit with status 2 if any file failed
    #[arg(long)]
    strict: bool,
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Command {
    /// Convert files to WebP
    Convert(ConvertArgs),
    /// Run the HTTP conversion service
    Serve(ServeArgs),
    /// Print a stock webpify.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Command::Convert(args) => {
            let config = load_config(cli.config.as_deref())?;
            convert(args, config)
        }
        Command::Serve(args) => {
            let config = load_config(cli.config.as_deref())?;
            serve(args, config)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(explicit: Option<&std::path::Path>) -> CliResult<WebpifyConfig> {
    let cwd = std::env::current_dir()?;
    Ok(config::load_config(explicit, &cwd)?)
}

/// Apply a range-checked CLI override, falling back to the config value.
fn checked(value: Option<i64>, fallback: u32, min: u32, max: u32, name: &str) -> CliResult<u32> {
    match value {
        None => Ok(fallback),
        Some(v) if (i64::from(min)..=i64::from(max)).contains(&v) => Ok(v as u32),
        Some(_) => Err(format!("{name} must be between {min} and {max}").into()),
    }
}

fn convert(args: ConvertArgs, config: WebpifyConfig) -> CliResult<ExitCode> {
    let mut conversion = config.conversion;
    conversion.quality = checked(
        args.quality,
        conversion.quality,
        Quality::MIN,
        Quality::MAX,
        "quality",
    )?;
    conversion.scale = checked(
        args.scale,
        conversion.scale,
        ScalePercent::MIN,
        ScalePercent::MAX,
        "scale",
    )?;
    if let Some(max) = args.max_dimension {
        if !(1..=WEBP_MAX_DIMENSION).contains(&max) {
            return Err(format!("max-dimension must be between 1 and {WEBP_MAX_DIMENSION}").into());
        }
        conversion.max_dimension = max;
    }
    conversion.lossless |= args.lossless;
    if let Some(kind) = args.codec {
        conversion.codec = kind;
    }

    let inputs = scan::resolve_input_paths(&args.inputs)?;
    if inputs.is_empty() {
        return Err(format!(
            "No supported image files found matching \"{}\"",
            args.inputs.join(", ")
        )
        .into());
    }

    let codec = CodecBackend::from_kind(conversion.codec);
    codec.init()?;
    log::debug!("using {} codec for {} input(s)", codec.name(), inputs.len());

    let options = BatchOptions {
        convert: conversion.convert_options(),
        output: args.output,
        dry_run: args.dry_run,
    };

    let dry_run = options.dry_run;
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            output::print_batch_event(&event, dry_run);
        }
    });
    let result = convert_batch(&codec, &inputs, &options, Some(tx));
    if printer.join().is_err() {
        log::warn!("progress printer thread panicked");
    }
    let summary = result?;

    if inputs.len() > 1 {
        output::print_batch_summary(&summary, dry_run);
    }

    if args.strict && summary.failure_count > 0 {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

fn serve(args: ServeArgs, mut config: WebpifyConfig) -> CliResult<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let converter = Arc::new(Converter::new(CodecBackend::from_kind(
        config.conversion.codec,
    )));
    let server = ConvertServer::bind(converter, &config)?;
    println!("Server running at http://{}", server.local_addr());
    server.run(runtime.handle().clone());
    Ok(())
}
