use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{ArgAction, Parser, Subcommand};
use fetcher_core::{DocumentPart, MediaType, OutputFormat, PeriodSelector, RawDocument, Statement};
use fetcher_ingest::parse_and_normalize;
use fetcher_sources::extract::{to_text, PdfToText};
use fetcher_sources::{Institution, Orchestrator, Outcome, RunReport, Settings};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod credentials;
mod state;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("FETCHER_BUILD_SHA"), ")");

#[derive(Parser, Debug)]
#[command(name = "fetcher", version = VERSION, about = "Fetch and normalize financial statements")]
struct Cli {
    /// More logging on stderr (-v info, -vv debug); RUST_LOG wins when set
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (default: ~/.fetcher/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the known sources
    Sources,

    /// Fetch statements from one or more sources
    Fetch {
        /// Source ids, e.g. degiro-account amex
        sources: Vec<String>,

        /// Fetch every known source
        #[arg(long, conflicts_with = "sources")]
        all: bool,

        /// `latest` or YYYY-MM-DD..YYYY-MM-DD
        #[arg(long, default_value = "latest")]
        period: PeriodSelector,

        /// jsonl or csv
        #[arg(long, default_value = "jsonl")]
        format: OutputFormat,

        /// Write one file per source into this directory instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Parse and normalize a saved document, without any session
    Parse {
        #[arg(long)]
        source: Institution,

        #[arg(long)]
        file: PathBuf,

        /// Account identity the source would have reported (Splitwise user id)
        #[arg(long)]
        account: Option<String>,

        /// Statement period, when the document does not state one
        #[arg(long)]
        period: Option<PeriodSelector>,

        #[arg(long, default_value = "jsonl")]
        format: OutputFormat,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a config file with every default spelled out
    Init,
    /// Print the effective configuration
    Show,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = match &cli.config {
        Some(p) => p.clone(),
        None => config::default_config_path()?,
    };

    match cli.command {
        Command::Sources => {
            for i in Institution::ALL {
                println!(
                    "{:<22} {:<8} {:<20} {}",
                    i.id(),
                    i.session_kind(),
                    i.credential_key().unwrap_or("-"),
                    i.description()
                );
            }
        }

        Command::Fetch { sources, all, period, format, out } => {
            let settings = config::load_config(&config_path)?;
            let selected = select(&sources, all)?;
            fetch(&settings, &selected, period, format, out.as_deref()).await?;
        }

        Command::Parse { source, file, account, period, format } => {
            let settings = config::load_config(&config_path)?;
            let statement = parse_file(&settings, source, &file, account, period).await?;
            let stdout = std::io::stdout();
            emit(format, std::slice::from_ref(&statement), stdout.lock())?;
        }

        Command::Config { command } => match command {
            ConfigCommand::Init => {
                if config::init_config(&config_path)? {
                    println!("Wrote {}", config_path.display());
                } else {
                    println!("Config already exists: {}", config_path.display());
                }
            }
            ConfigCommand::Show => {
                let settings = config::load_config(&config_path)?;
                println!("# {}", config_path.display());
                print!("{}", toml::to_string_pretty(&settings).context("serialize config")?);
            }
        },
    }

    Ok(())
}

/// Sources in the order given, each once.
fn select(sources: &[String], all: bool) -> Result<Vec<Institution>> {
    if all {
        return Ok(Institution::ALL.to_vec());
    }
    if sources.is_empty() {
        bail!("name at least one source or pass --all (see `fetcher sources`)");
    }
    let mut selected = Vec::new();
    for s in sources {
        let i: Institution = s.parse()?;
        if !selected.contains(&i) {
            selected.push(i);
        }
    }
    Ok(selected)
}

async fn fetch(
    settings: &Settings,
    selected: &[Institution],
    period: PeriodSelector,
    format: OutputFormat,
    out: Option<&Path>,
) -> Result<()> {
    let store = credentials::from_env(selected.iter().filter_map(Institution::credential_key));
    let adapters: Vec<_> = selected.iter().map(|i| i.adapter(settings)).collect();
    let orchestrator = Orchestrator::new(settings.pipeline.retry(), settings.pipeline.parallelism);

    let report = orchestrator.run(&adapters, &store, period).await;
    let statements: Vec<Statement> = report.statements().cloned().collect();

    match out {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
            for st in &statements {
                let path = dir.join(format!("{}.{}", st.source, format.extension()));
                let file = fs::File::create(&path).with_context(|| format!("create {}", path.display()))?;
                emit(format, std::slice::from_ref(st), std::io::BufWriter::new(file))?;
                eprintln!("wrote {}", path.display());
            }
        }
        None => {
            let stdout = std::io::stdout();
            emit(format, &statements, stdout.lock())?;
        }
    }

    summarize(&report);
    let failed = report.failures().count();
    if failed > 0 {
        bail!("{failed} of {} source(s) failed", report.outcomes.len());
    }
    Ok(())
}

fn emit(format: OutputFormat, statements: &[Statement], out: impl Write) -> Result<()> {
    let mut emitter = format.emitter(out);
    for st in statements {
        emitter.emit(st).with_context(|| format!("emit {}", st.source))?;
    }
    emitter.finish().context("flush output")?;
    Ok(())
}

fn summarize(report: &RunReport) {
    for o in &report.outcomes {
        match &o.outcome {
            Outcome::Fetched(st) => eprintln!(
                "ok    {:<22} {} transaction(s), {} balance(s)",
                o.source,
                st.transactions.len(),
                st.balances.len()
            ),
            Outcome::NothingToFetch(reason) => eprintln!("empty {:<22} {reason}", o.source),
            Outcome::Failed(f) => eprintln!("FAIL  {:<22} {f} (attempts: {})", o.source, o.attempts),
        }
    }
}

async fn parse_file(
    settings: &Settings,
    source: Institution,
    file: &Path,
    account: Option<String>,
    period: Option<PeriodSelector>,
) -> Result<Statement> {
    let bytes = fs::read(file).with_context(|| format!("read {}", file.display()))?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.id().to_string());
    let media = MediaType::guess(&name).unwrap_or(MediaType::Text);

    let mut part = DocumentPart::new(name, media, bytes);
    if media == MediaType::Pdf {
        let extractor = PdfToText::new(settings.extract.pdftotext.clone());
        part = to_text(&extractor, part).await?;
    }

    let mut doc = RawDocument::new(source.id(), Local::now().date_naive(), vec![part]);
    doc.locator = file.display().to_string();
    doc.account = account;
    if let Some(PeriodSelector::Range(p)) = period {
        doc.period = Some(p);
    }

    let parser = source.parser();
    parse_and_normalize(parser.as_ref(), &doc).with_context(|| format!("{} ({})", file.display(), parser.format()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_keeps_order_and_drops_repeats() {
        let sources = vec!["amex".to_string(), "viseca".to_string(), "AMEX".to_string()];
        assert_eq!(select(&sources, false).unwrap(), vec![Institution::Amex, Institution::Viseca]);
        assert_eq!(select(&[], true).unwrap().len(), Institution::ALL.len());
        assert!(select(&[], false).is_err());
        assert!(select(&["bcge".to_string()], false).is_err());
    }

    #[test]
    fn test_cli_parses_fetch() {
        let cli = Cli::try_parse_from(["fetcher", "-vv", "fetch", "amex", "--period", "2024-01-01..2024-01-31", "--format", "csv"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Fetch { sources, period, format, .. } => {
                assert_eq!(sources, vec!["amex"]);
                assert!(matches!(period, PeriodSelector::Range(_)));
                assert_eq!(format, OutputFormat::Csv);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_parse_saved_amex_export() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("activity.csv");
        fs::write(&file, "Date,Description,Amount\n01/05/2024,Groceries,50.00\n").unwrap();

        let st = parse_file(&Settings::default(), Institution::Amex, &file, None, None).await.unwrap();
        assert_eq!(st.source, "amex");
        assert_eq!(st.transactions[0].amount.to_string(), "-50.00");

        let mut out = Vec::new();
        emit(OutputFormat::JsonLines, std::slice::from_ref(&st), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);
    }
}
