use anyhow::{Context, Result};
use clap::Parser;
use irix::builder::{extract_url_norms, IndexBuilder};
use irix::persist;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "irix-indexer")]
#[command(about = "Build an IRIX binary inverted index from a token file", long_about = None)]
struct Args {
    /// Token file, one "docId\tterm" record per line
    tokens: PathBuf,
    /// Output index file
    index: PathBuf,
    /// Source JSON to recover url_norm values per document (positional match)
    documents: Option<PathBuf>,
}

fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Help and version print to stdout and exit 0; real argument
            // errors exit 1.
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    if let Err(err) = run(args) {
        eprintln!("ERROR: {err:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let started = Instant::now();

    let reader = BufReader::new(
        File::open(&args.tokens)
            .with_context(|| format!("cannot open tokens file {}", args.tokens.display()))?,
    );
    let mut builder = IndexBuilder::new();
    for line in reader.lines() {
        builder.add_line(&line?);
    }

    let urls = match &args.documents {
        Some(path) => {
            let bytes = fs::read(path)
                .with_context(|| format!("cannot read JSON {}", path.display()))?;
            let urls = extract_url_norms(&bytes);
            if urls.is_empty() {
                tracing::warn!(path = %path.display(), "no url_norm found in JSON, using placeholders");
            }
            urls
        }
        None => Vec::new(),
    };

    let mut index = builder
        .build(urls)
        .with_context(|| format!("building index from {}", args.tokens.display()))?;
    index.meta.build_ms = started.elapsed().as_secs_f64() * 1e3;
    persist::write_index(&args.index, &index)
        .with_context(|| format!("writing index to {}", args.index.display()))?;

    let meta = &index.meta;
    let tokens_per_ms = if meta.build_ms > 0.0 {
        meta.total_tokens as f64 / meta.build_ms
    } else {
        0.0
    };
    tracing::info!(
        path = %args.index.display(),
        docs = meta.docs_count,
        total_tokens = meta.total_tokens,
        unique_terms = meta.unique_terms,
        avg_term_len = meta.avg_term_len,
        build_ms = meta.build_ms,
        tokens_per_ms,
        "index written"
    );
    Ok(())
}
