use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stock_shorts::config::Config;
use stock_shorts::generator::run_generation;
use stock_shorts::init;
use stock_shorts::schedule::{generate_schedule, local_now, parse_slots};
use stock_shorts::script::{load_script, split_master_file};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stock-shorts")]
#[command(about = "Narrated vertical shorts from stock footage", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the environment, split master scripts and produce every script
    Run,
    /// Split a master script into one file per theme
    Split {
        file: PathBuf,
        /// Output directory (defaults to the configured scripts folder)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Run the environment check only
    Check,
    /// Print the next publish slots
    Schedule { count: usize },
    /// Parse a script and print its fragments and metadata
    Plan { script: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config).await?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let report = run_generation(cfg).await?;
            println!(
                "processed: {}  failed: {}  uploaded: {}",
                report.processed, report.failed, report.uploaded
            );
            if report.processed == 0 && report.failed > 0 {
                std::process::exit(1);
            }
        }
        Command::Split { file, out } => {
            let out = out.unwrap_or_else(|| cfg.paths.scripts.clone());
            for path in split_master_file(&file, &out).await? {
                println!("{}", path.display());
            }
        }
        Command::Check => match init::environment_check(&cfg).await {
            Ok(()) => println!("environment OK"),
            Err(err) => {
                eprintln!("{}", err);
                std::process::exit(1);
            }
        },
        Command::Schedule { count } => {
            let slots = parse_slots(&cfg.schedule.slots)?;
            for at in generate_schedule(count, local_now(), &slots) {
                println!("{}", at.to_rfc3339());
            }
        }
        Command::Plan { script } => {
            let parsed = load_script(&script).await?;
            println!("theme:    {}", parsed.theme);
            println!("title:    {}", parsed.title.as_deref().unwrap_or("-"));
            println!("queries:  {}", parsed.search.join(" | "));
            println!("hashtags: {}", parsed.hashtags.as_deref().unwrap_or("-"));
            for fragment in parsed.fragments() {
                println!(
                    "{:>3}.{:<2} {}",
                    fragment.sequence_id, fragment.sub_index, fragment.text
                );
            }
        }
    }
    Ok(())
}
