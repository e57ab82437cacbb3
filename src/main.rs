use anyhow::Result;
use clap::Parser;
use tracing::{error, warn};

use llm_localizer_rust::{Config, DocumentMode, Outcome};

#[derive(Parser, Debug)]
#[command(
    name = "llm-localizer",
    version,
    about = "Localize string values in a JavaScript data file with an LLM"
)]
struct Cli {
    /// Source data file
    #[arg(long = "input")]
    input: Option<String>,

    /// Localized output file
    #[arg(long = "output")]
    output: Option<String>,

    /// Persistent translation cache (JSON)
    #[arg(long = "cache")]
    cache: Option<String>,

    /// Review file listing every source/translation pair
    #[arg(long = "review")]
    review: Option<String>,

    /// Document layout: sections (array sections with named fields) or flat (key: "value" lines)
    #[arg(long = "mode", value_enum)]
    mode: Option<DocumentMode>,

    /// Model name sent to the chat completions endpoint
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides OPENAI_API_KEY)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// OpenAI-compatible base URL
    #[arg(long = "base-url")]
    base_url: Option<String>,

    /// Strings per request
    #[arg(long = "batch-size")]
    batch_size: Option<usize>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "settings")]
    settings: Option<String>,

    /// Extract and list the strings, then exit without calling the service
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Skip the connectivity check sent before translating
    #[arg(long = "no-connectivity-check")]
    no_connectivity_check: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    let config = Config {
        input: cli.input,
        output: cli.output,
        cache: cli.cache,
        review: cli.review,
        mode: cli.mode,
        model: cli.model,
        key: cli.key,
        base_url: cli.base_url,
        batch_size: cli.batch_size,
        settings_path: cli.settings,
        dry_run: cli.dry_run,
        skip_connectivity_check: cli.no_connectivity_check,
    };
    let settings = llm_localizer_rust::load_settings(&config)?;
    llm_localizer_rust::logging::init(verbose, settings.paths.log.as_deref())?;

    let outcome = tokio::select! {
        result = llm_localizer_rust::run(config, settings) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; the next run resumes from the cache");
            std::process::exit(130);
        }
    };

    match outcome {
        Ok(Outcome::DryRun(count)) => {
            println!("{} unique values (dry run)", count);
            Ok(())
        }
        Ok(Outcome::Completed(summary)) => {
            println!("{}", summary.written_to.display());
            if !summary.committed {
                error!(
                    "{} integrity findings; input backup: {}",
                    summary.report.findings.len(),
                    summary.backup.display()
                );
                std::process::exit(2);
            }
            Ok(())
        }
        Err(err) => {
            error!("{:#}", err);
            Err(err)
        }
    }
}
