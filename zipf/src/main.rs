use anyhow::{Context, Result};
use clap::Parser;
use irix::zipf;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "irix-zipf")]
#[command(about = "Fit a Zipf rank-frequency law over a token file", long_about = None)]
struct Args {
    /// Token file (with or without the docId column)
    #[arg(default_value = "tokens.txt")]
    tokens: PathBuf,
    /// Rank/frequency/fit table output
    #[arg(long, default_value = "zipf.tsv")]
    out: PathBuf,
    /// Text summary output
    #[arg(long, default_value = "zipf_summary.txt")]
    summary: PathBuf,
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
    let reader = BufReader::new(
        File::open(&args.tokens)
            .with_context(|| format!("cannot open tokens file {}", args.tokens.display()))?,
    );
    let ranked = zipf::count_tokens(reader)?;
    let fit = zipf::fit(&ranked.freqs)?;

    let mut out = BufWriter::new(
        File::create(&args.out)
            .with_context(|| format!("cannot create {}", args.out.display()))?,
    );
    writeln!(out, "# rank\tfreq\tzipf_fit")?;
    for (i, &freq) in ranked.freqs.iter().enumerate() {
        let rank = i + 1;
        writeln!(out, "{rank}\t{freq}\t{:.6}", zipf::expected(&fit, rank))?;
    }
    out.flush()?;

    let mut summary = BufWriter::new(
        File::create(&args.summary)
            .with_context(|| format!("cannot create {}", args.summary.display()))?,
    );
    writeln!(summary, "input: {}", args.tokens.display())?;
    writeln!(summary, "total tokens N = {}", ranked.total_tokens)?;
    writeln!(summary, "vocabulary V = {}", ranked.freqs.len())?;
    writeln!(summary, "top-1 frequency f(1) = {}", ranked.freqs[0])?;
    writeln!(summary, "Zipf estimate: f(r) ~= C / r^s")?;
    writeln!(summary, "s = {:.6}", fit.exponent)?;
    writeln!(summary, "C = {:.6}", fit.constant)?;
    writeln!(summary, "fit window (r1..r2): {}..{}", fit.fit_lo, fit.fit_hi)?;
    summary.flush()?;

    tracing::info!(
        out = %args.out.display(),
        summary = %args.summary.display(),
        tokens = ranked.total_tokens,
        vocab = ranked.freqs.len(),
        s = fit.exponent,
        "zipf fit written"
    );
    Ok(())
}
