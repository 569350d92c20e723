use anyhow::{Context, Result};
use clap::Parser;
use irix::stem::{Hit, SearchOptions, StemIndex};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "irix-stemsearch")]
#[command(about = "Stemmed TF-IDF search over a token file, with an exact-match bonus", long_about = None)]
struct Args {
    /// Token file, one "docId\tterm" record per line
    #[arg(long, default_value = "tokens.txt")]
    tokens: PathBuf,
    /// Number of hits to return
    #[arg(long, default_value_t = 10)]
    topk: usize,
    /// Score bonus for exact (unstemmed) term matches
    #[arg(long, default_value_t = 0.5)]
    bonus: f64,
    /// Disable query-side stemming
    #[arg(long)]
    no_stem: bool,
    /// Run every query from this file in both modes and write a comparison table
    #[arg(long)]
    compare: Option<PathBuf>,
    /// Comparison table output path
    #[arg(long, default_value = "compare.tsv")]
    out: PathBuf,
    /// One-shot query (joined from the remaining arguments)
    #[arg(trailing_var_arg = true)]
    query: Vec<String>,
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

fn print_hits(hits: &[Hit]) {
    if hits.is_empty() {
        println!("(no results)");
        return;
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("{}. doc={}\tscore={:.4}", i + 1, hit.doc, hit.score);
    }
}

fn run(args: Args) -> Result<()> {
    let file = File::open(&args.tokens)
        .with_context(|| format!("tokens file not found: {}", args.tokens.display()))?;
    let index = StemIndex::from_reader(BufReader::new(file))?;
    tracing::info!(
        docs = index.doc_count(),
        lines = index.lines(),
        kept = index.kept(),
        stem_terms = index.stem_terms(),
        exact_terms = index.exact_terms(),
        "stem index built"
    );

    let opts = SearchOptions {
        topk: args.topk.max(1),
        exact_bonus: args.bonus,
        stem: !args.no_stem,
    };

    if let Some(queries_path) = &args.compare {
        let queries = BufReader::new(
            File::open(queries_path)
                .with_context(|| format!("cannot open queries file {}", queries_path.display()))?,
        );
        let mut out = BufWriter::new(
            File::create(&args.out)
                .with_context(|| format!("cannot create {}", args.out.display()))?,
        );
        writeln!(out, "query\tmode\trank\tdoc\tscore")?;
        for line in queries.lines() {
            let line = line?;
            let query = line.trim();
            if query.is_empty() {
                continue;
            }
            for (mode, stem) in [("no_stem", false), ("stem", true)] {
                let hits = index.search(query, &SearchOptions { stem, ..opts.clone() });
                for (rank, hit) in hits.iter().enumerate() {
                    writeln!(out, "{query}\t{mode}\t{}\t{}\t{:.6}", rank + 1, hit.doc, hit.score)?;
                }
            }
        }
        out.flush()?;
        tracing::info!(out = %args.out.display(), "comparison written");
        return Ok(());
    }

    if !args.query.is_empty() {
        print_hits(&index.search(&args.query.join(" "), &opts));
        return Ok(());
    }

    eprintln!(
        "Interactive search. Stem: {}, exact_bonus={}, topk={}.",
        if opts.stem { "ON" } else { "OFF" },
        opts.exact_bonus,
        opts.topk
    );
    eprintln!("Type a query and press Enter. Empty line or :q quits.");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut buf = String::new();
        if stdin.lock().read_line(&mut buf)? == 0 {
            break;
        }
        let query = buf.trim();
        if query.is_empty() || query == ":q" || query == "quit" || query == "exit" {
            break;
        }
        print_hits(&index.search(query, &opts));
    }
    Ok(())
}
