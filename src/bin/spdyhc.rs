use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use spdy_header_codec::prelude::*;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "spdyhc")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Protocol version, e.g. spdy/3.1 (overrides the config file)
    #[arg(short = 'V', long)]
    spdy_version: Option<SpdyVersion>,

    /// Compression level 0-9 (overrides the config file)
    #[arg(short = 'L', long)]
    level: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress "name: value" lines into hex header blocks.
    /// Blank lines separate blocks sent on the same stream.
    Encode {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Decompress hex header blocks, one per line, in stream order
    Decode {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    let mut config = CodecConfig::load(cli.config.as_deref())?;
    if let Some(version) = cli.spdy_version {
        config.version = version;
    }
    if let Some(level) = cli.level {
        config.compression_level = level;
    }
    config.validate()?;
    info!("spdyhc v{} using {} level {}", env!("CARGO_PKG_VERSION"), config.version, config.compression_level);

    let mut registry = ContextRegistry::new();
    let mut codec = GzipHeaderCodec::from_config(&mut registry, &config)?;
    let mut scratch = ScratchBuffer::new();

    match cli.command {
        Commands::Encode { input } => run_encode(&mut codec, &mut scratch, &read_input(input)?),
        Commands::Decode { input } => run_decode(&mut codec, &mut scratch, &read_input(input)?),
    }
}

fn read_input(path: Option<PathBuf>) -> Result<String> {
    let mut text = String::new();
    match path {
        Some(path) => {
            BufReader::new(std::fs::File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?)
                .read_to_string(&mut text)?;
        }
        None => {
            io::stdin().lock().read_to_string(&mut text)?;
        }
    }
    Ok(text)
}

fn parse_header_line(line: &str) -> Result<Header<'_>> {
    // Pseudo-headers such as ":method: GET" keep their leading colon.
    let split_at = match line.strip_prefix(':') {
        Some(rest) => rest.find(':').map(|i| i + 1),
        None => line.find(':'),
    };
    let Some(idx) = split_at else {
        bail!("expected \"name: value\", got {:?}", line);
    };
    let name = line[..idx].trim();
    if name.is_empty() {
        bail!("empty header name in {:?}", line);
    }
    Ok(Header::new(name, line[idx + 1..].trim_start()))
}

fn run_encode(codec: &mut GzipHeaderCodec, scratch: &mut ScratchBuffer, text: &str) -> Result<()> {
    let mut block: Vec<Header<'_>> = Vec::new();
    for line in text.lines().chain(std::iter::once("")) {
        if !line.trim().is_empty() {
            block.push(parse_header_line(line)?);
            continue;
        }
        if block.is_empty() {
            continue;
        }
        let encoded = codec.encode(scratch, &mut block);
        let size = codec.encoded_size();
        debug!("Encoded {} headers", block.len());
        println!("{}", hex::encode(&encoded[codec.encode_headroom()..]));
        eprintln!(
            "# {} headers, {} bytes uncompressed, {} bytes compressed",
            block.len(),
            size.uncompressed,
            size.compressed
        );
        block.clear();
    }
    Ok(())
}

fn run_decode(codec: &mut GzipHeaderCodec, scratch: &mut ScratchBuffer, text: &str) -> Result<()> {
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let block = hex::decode(line).with_context(|| format!("line {}: invalid hex", lineno + 1))?;
        let decoded = codec
            .decode(scratch, &mut &block[..], block.len() as u32)
            .with_context(|| format!("line {}: failed to decode header block", lineno + 1))?;
        for header in decoded.iter() {
            println!("{}: {}", header.name, header.value);
        }
        println!();
    }
    Ok(())
}
