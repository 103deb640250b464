#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use coldstream::{
    pack_into, read_block, CachedBlockReader, Method, StagingBuffer, UncompressedCache,
};

#[derive(Debug, Parser)]
#[command(name = "coldstream")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Split a file into independently compressed blocks.
    Pack {
        input: PathBuf,
        output: PathBuf,
        /// Decompressed bytes per block.
        #[arg(long, default_value_t = 64 * 1024)]
        block_size: usize,
        #[arg(long, value_enum, default_value = "zstd")]
        method: MethodArg,
    },
    /// Decompress a block stream to stdout.
    Cat {
        stream: PathBuf,
        /// Start position as `physical:logical` byte offsets.
        #[arg(long)]
        offset: Option<String>,
        /// Uncompressed cache budget in bytes.
        #[arg(long, default_value_t = 128 * 1024 * 1024)]
        cache_bytes: u64,
    },
    /// Describe each block without decompressing payloads.
    Inspect {
        stream: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MethodArg {
    Raw,
    Zstd,
}

impl From<MethodArg> for Method {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Raw => Method::Raw,
            MethodArg::Zstd => Method::Zstd,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,coldstream=info".to_string()),
        )
        .init();

    match Args::parse().command {
        Command::Pack {
            input,
            output,
            block_size,
            method,
        } => pack(&input, &output, block_size, method.into()),
        Command::Cat {
            stream,
            offset,
            cache_bytes,
        } => cat(&stream, offset.as_deref(), cache_bytes),
        Command::Inspect { stream, json } => inspect(&stream, json),
    }
}

fn pack(input: &Path, output: &Path, block_size: usize, method: Method) -> anyhow::Result<()> {
    let mut src = File::open(input).with_context(|| format!("open {}", input.display()))?;
    let dst = File::create(output).with_context(|| format!("create {}", output.display()))?;
    let mut dst = BufWriter::new(dst);

    let summary = pack_into(&mut src, &mut dst, block_size, method)?;
    dst.flush()?;

    tracing::info!(
        blocks = summary.blocks,
        input_bytes = summary.input_bytes,
        stored_bytes = summary.stored_bytes,
        "packed"
    );
    Ok(())
}

fn cat(stream: &Path, offset: Option<&str>, cache_bytes: u64) -> anyhow::Result<()> {
    let estimated_size = std::fs::metadata(stream)
        .with_context(|| format!("stat {}", stream.display()))?
        .len();

    let cache = Arc::new(UncompressedCache::new(cache_bytes));
    let mut reader = CachedBlockReader::new(stream, Arc::clone(&cache), estimated_size, 0);
    if let Some(raw) = offset {
        let (physical, logical) = parse_offset(raw)?;
        reader.seek(physical, logical)?;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    io::copy(&mut reader, &mut out)?;

    tracing::debug!(stats = %serde_json::to_string(&cache.stats())?, "cache after cat");
    Ok(())
}

/// `physical` or `physical:logical`.
fn parse_offset(raw: &str) -> anyhow::Result<(u64, usize)> {
    let (physical, logical) = raw.split_once(':').unwrap_or((raw, "0"));
    let physical = physical
        .parse()
        .with_context(|| format!("invalid physical offset {physical:?}"))?;
    let logical = logical
        .parse()
        .with_context(|| format!("invalid logical offset {logical:?}"))?;
    Ok((physical, logical))
}

fn inspect(stream: &Path, json: bool) -> anyhow::Result<()> {
    let mut input = File::open(stream).with_context(|| format!("open {}", stream.display()))?;
    let mut staging = StagingBuffer::Owned(Vec::new());

    let mut records = Vec::new();
    let mut offset = 0_u64;
    let mut index = 0_u64;
    while let Some((header, _)) = read_block(&mut input, &mut staging)? {
        if json {
            records.push(serde_json::json!({
                "index": index,
                "physical_offset": offset,
                "method": header.method.name(),
                "stored_size": header.stored_size(),
                "decompressed_size": header.decompressed_size,
                "checksum": format!("{:08x}", header.checksum),
            }));
        } else {
            println!(
                "#{index} offset={offset} method={} stored={} decompressed={} checksum={:08x}",
                header.method.name(),
                header.stored_size(),
                header.decompressed_size,
                header.checksum
            );
        }
        offset += header.stored_size();
        index += 1;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_offset_accepts_both_forms() {
        assert_eq!(parse_offset("40").unwrap(), (40, 0));
        assert_eq!(parse_offset("40:7").unwrap(), (40, 7));
        assert!(parse_offset("forty").is_err());
        assert!(parse_offset("40:x").is_err());
    }
}
