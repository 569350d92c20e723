use anyhow::{Context, Result};
use clap::Parser;
use irix::persist;
use irix::query;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "irix-searcher")]
#[command(about = "Evaluate boolean queries from stdin against an IRIX index", long_about = None)]
struct Args {
    /// Index file
    index: PathBuf,
    /// Cap on emitted records per query (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    k: usize,
    /// How many slowest queries to report at the end
    #[arg(long, default_value_t = 10)]
    top: usize,
    /// Emit bare docIds instead of docId/title/url records
    #[arg(long)]
    only_docid: bool,
    /// Suppress per-document result records
    #[arg(long)]
    no_results: bool,
    /// Write a grouped per-query report to this file
    #[arg(long)]
    report: Option<PathBuf>,
    /// Result lines per query in the report
    #[arg(long, default_value_t = 50)]
    topres: usize,
}

/// One timed query for the end-of-run slow ranking.
struct SlowItem {
    ms: f64,
    line_no: usize,
    query: String,
    hits: usize,
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
    let index = persist::load_index(&args.index)
        .with_context(|| format!("loading index {}", args.index.display()))?;
    let universe = index.universe();
    tracing::info!(
        path = %args.index.display(),
        docs = index.meta.docs_count,
        terms = index.dict.len(),
        "index loaded"
    );

    let mut report = match &args.report {
        Some(path) => Some(BufWriter::new(File::create(path).with_context(|| {
            format!("cannot open report file {}", path.display())
        })?)),
        None => None,
    };

    let stdin = io::stdin();
    let mut out = BufWriter::new(io::stdout().lock());
    let mut slows: Vec<SlowItem> = Vec::new();
    let mut line_no = 0usize;

    for line in stdin.lock().lines() {
        let line = line?;
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let t0 = Instant::now();
        let outcome = query::run_query(&index, &universe, &line);
        let ms = t0.elapsed().as_secs_f64() * 1e3;

        match outcome {
            Err(err) => {
                eprintln!("WARN: line {line_no}: parse/eval error: {err} | query: {line}");
                slows.push(SlowItem {
                    ms,
                    line_no,
                    query: line.clone(),
                    hits: 0,
                });
                if let Some(rep) = report.as_mut() {
                    writeln!(rep, "QUERY\t{line}")?;
                    writeln!(rep, "HITS\t0")?;
                    writeln!(rep, "ERROR\t{err}")?;
                    writeln!(rep)?;
                }
            }
            Ok(result) => {
                slows.push(SlowItem {
                    ms,
                    line_no,
                    query: line.clone(),
                    hits: result.len(),
                });
                if let Some(rep) = report.as_mut() {
                    writeln!(rep, "QUERY\t{line}")?;
                    writeln!(rep, "HITS\t{}", result.len())?;
                    for &doc in result
                        .iter()
                        .filter(|&&d| (d as usize) < index.docs.len())
                        .take(args.topres)
                    {
                        let info = &index.docs[doc as usize];
                        writeln!(rep, "{}\t{}", info.title, info.url)?;
                    }
                    writeln!(rep)?;
                }
                if !args.no_results {
                    let mut printed = 0usize;
                    for &doc in &result {
                        if args.k != 0 && printed >= args.k {
                            break;
                        }
                        if doc as usize >= index.docs.len() {
                            continue;
                        }
                        if args.only_docid {
                            writeln!(out, "{doc}")?;
                        } else {
                            let info = &index.docs[doc as usize];
                            writeln!(out, "{doc}\t{}\t{}", info.title, info.url)?;
                        }
                        printed += 1;
                    }
                }
            }
        }
    }

    out.flush()?;
    if let Some(rep) = report.as_mut() {
        rep.flush()?;
    }

    if !slows.is_empty() {
        // Stable sort keeps line order among equal timings.
        slows.sort_by(|a, b| b.ms.partial_cmp(&a.ms).unwrap_or(std::cmp::Ordering::Equal));
        let n = args.top.min(slows.len());
        eprintln!("---- TOP {n} slowest queries ----");
        eprintln!("rank\tms\tline\thits\tquery");
        for (rank, item) in slows.iter().take(n).enumerate() {
            eprintln!(
                "{}\t{:.3}\t{}\t{}\t{}",
                rank + 1,
                item.ms,
                item.line_no,
                item.hits,
                item.query
            );
        }
        eprintln!("--------------------------------");
    }

    Ok(())
}
