//! `dats` - submit and follow DATS background jobs from the terminal.

mod commands;
mod progress;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use dats_types::{ExportFormat, JobKind};
use tracing_subscriber::EnvFilter;

/// DATS background-job client.
#[derive(Parser, Debug)]
#[command(name = "dats", version, about = "Submit and follow DATS background jobs")]
struct Cli {
    /// Path to config file (default: $CONFIG_DIR/dats/jobs.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overwrite existing downloads without asking.
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// More logging (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export project data and download the result.
    Export {
        #[arg(value_enum)]
        target: ExportArg,
        #[arg(long)]
        project: i64,
        /// Required by the user-scoped exports.
        #[arg(long)]
        user: Option<i64>,
        /// Required by the document-scoped exports.
        #[arg(long)]
        sdoc: Option<i64>,
        /// Selected ids (documents or annotations), comma separated.
        #[arg(long, value_delimiter = ',')]
        ids: Vec<i64>,
        #[arg(long, value_enum, default_value_t = FormatArg::Csv)]
        format: FormatArg,
    },

    /// Run an LLM assistant job on documents.
    Llm {
        #[arg(value_enum)]
        task: LlmArg,
        #[arg(long)]
        project: i64,
        /// Source documents, comma separated.
        #[arg(long, value_delimiter = ',', required = true)]
        sdocs: Vec<i64>,
        /// Tag, metadata or code ids depending on the task, comma separated.
        #[arg(long, value_delimiter = ',')]
        ids: Vec<i64>,
        /// JSON file with prompt templates.
        #[arg(long)]
        prompts: Option<PathBuf>,
    },

    /// Refine a concept-over-time analysis.
    CotaRefine {
        cota_id: i64,
        #[arg(long)]
        epochs: Option<u32>,
        #[arg(long)]
        min_annotations: Option<u32>,
        #[arg(long)]
        topk: Option<u32>,
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Crawl URLs into a project.
    Crawl {
        #[arg(long)]
        project: i64,
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Follow a job that already exists.
    Watch {
        /// export, llm, cota or crawler.
        kind: JobKind,
        id: String,
    },

    /// List the LLM jobs of a project, newest first.
    LlmJobs { project: i64 },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ExportArg {
    AllData,
    AllUsers,
    AllTags,
    AllCodes,
    Sdocs,
    SpanAnnotations,
    SentenceAnnotations,
    UserData,
    UserMemos,
    UserLogbook,
    DocAnnotations,
    DocUserAnnotations,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Json => ExportFormat::Json,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LlmArg {
    Tagging,
    Metadata,
    Annotation,
    SentenceAnnotation,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn,dats_jobs=info",
        1 => "info,dats_jobs=debug",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = dats_jobs::ClientConfig::load(cli.config.as_deref())?;
    let opts = commands::Options {
        yes: cli.yes,
        json: cli.json,
    };
    commands::run(cli.command, &config, opts).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_export() {
        let cli = Cli::try_parse_from([
            "dats",
            "export",
            "span-annotations",
            "--project",
            "1",
            "--ids",
            "5,6",
            "--format",
            "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Export {
                target,
                project,
                ids,
                format,
                ..
            } => {
                assert_eq!(target, ExportArg::SpanAnnotations);
                assert_eq!(project, 1);
                assert_eq!(ids, vec![5, 6]);
                assert_eq!(format, FormatArg::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_watch_kind() {
        let cli = Cli::try_parse_from(["dats", "-y", "watch", "cota", "job-1"]).unwrap();
        assert!(cli.yes);
        assert!(matches!(
            cli.command,
            Commands::Watch { kind: JobKind::CotaRefinement, .. }
        ));
    }
}
