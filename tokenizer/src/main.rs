use anyhow::{Context, Result};
use clap::Parser;
use irix::tokenizer::Tokenizer;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "irix-tokenizer")]
#[command(about = "Tokenize a JSON corpus field into a line-delimited token stream", long_about = None)]
struct Args {
    /// Input JSON file
    #[arg(long)]
    json: String,
    /// Name of the string field to tokenize
    #[arg(long, default_value = "parsed_text")]
    field: String,
    /// Log progress every N matched documents (0 disables)
    #[arg(long = "log_every", default_value_t = 0)]
    log_every: u64,
    /// Write tokens to this file
    #[arg(long = "emit_tokens")]
    emit_tokens: Option<String>,
    /// Prefix each token with "docId\t" (0|1)
    #[arg(long = "with_docid", default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
    with_docid: u8,
    /// Write the run summary as JSON to this file
    #[arg(long)]
    stats: Option<String>,
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
    let json = fs::read(&args.json).with_context(|| format!("cannot read JSON file {}", args.json))?;

    let mut out = match &args.emit_tokens {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("cannot open token output {path}"))?,
        )),
        None => None,
    };

    let started = Instant::now();
    let tokenizer = Tokenizer::new(&args.field)
        .with_docid(args.with_docid != 0)
        .log_every(args.log_every);
    let stats = match out.as_mut() {
        Some(w) => tokenizer.run(&json, Some(w))?,
        None => tokenizer.run(&json, None)?,
    };
    if let Some(w) = out.as_mut() {
        w.flush()?;
    }
    let elapsed_ms = started.elapsed().as_secs_f64() * 1e3;

    let input_kb = stats.text_bytes as f64 / 1024.0;
    let kb_per_s = if elapsed_ms > 0.0 {
        input_kb / (elapsed_ms / 1e3)
    } else {
        0.0
    };
    let avg_token_len = if stats.tokens > 0 {
        stats.token_chars as f64 / stats.tokens as f64
    } else {
        0.0
    };
    tracing::info!(
        field = %args.field,
        docs_with_field = stats.docs_with_field,
        input_kb,
        tokens = stats.tokens,
        avg_token_len,
        time_ms = elapsed_ms,
        kb_per_s,
        "tokenization finished"
    );
    if let Some(path) = &args.emit_tokens {
        tracing::info!(path = %path, with_docid = args.with_docid != 0, "tokens saved");
    }

    if let Some(path) = &args.stats {
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let report = serde_json::json!({
            "field": args.field,
            "stats": stats,
            "elapsed_ms": elapsed_ms,
            "created_at": created_at,
        });
        fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("cannot write stats file {path}"))?;
    }

    Ok(())
}
