use clap::Parser;
use qc_feature_table::runner::{BuildArgs, DEFAULT_WORKER_COUNT, run_build};
use std::path::PathBuf;

/// Assemble the per-sample machine learning feature table from QC outputs
#[derive(Parser, Clone)]
#[command(version, about)]
struct Args {
    /// Run manifest: a run column, or sample and run columns (tab-separated, with header)
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory containing Features/
    #[arg(short, long)]
    outdir: PathBuf,

    /// Number of concurrent source readers
    #[arg(short, long, default_value_t = DEFAULT_WORKER_COUNT)]
    workers: usize,

    /// Quiet mode - minimal output, only show summary
    #[arg(short, long)]
    quiet: bool,

    /// Build the table and print the summary without writing it
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing based on quiet mode
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if args.quiet {
        EnvFilter::new("qc_feature_table=warn")
    } else {
        EnvFilter::new("qc_feature_table=info")
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    if !args.quiet {
        println!("QC Feature Table Builder");
        println!("========================");
        println!("Manifest: {}", args.input.display());
        println!("Output directory: {}", args.outdir.display());
        println!("Workers: {}", args.workers);
        println!();
    }

    if args.dry_run {
        println!("DRY RUN MODE - the feature table will not be written");
        println!();
    }

    let result = run_build(BuildArgs {
        manifest_path: args.input,
        output_dir: args.outdir,
        worker_count: args.workers,
        quiet: args.quiet,
        dry_run: args.dry_run,
    })
    .await?;

    println!();
    println!("Build Summary");
    println!("=============");
    println!("Mode: {}", result.mode);
    println!("Runs requested: {}", result.runs_requested);
    println!("Rows: {}", result.rows);
    println!("Features: {}", result.features.len());
    println!("Duration: {:.2}s", result.duration.as_secs_f64());
    match result.output_path {
        Some(path) => println!("Output: {}", path.display()),
        None => println!("Output: not written (dry run)"),
    }

    Ok(())
}
