use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use dats_jobs::{
    AlwaysConfirm, ClientConfig, Confirm, HttpJobApi, JobTracker, JobWatch, TerminalOutcome,
    WatchEnd,
};
use dats_types::{
    CotaRefinementHyperparameters, CotaRefinementRequest, CrawlerJobParameters,
    ExportJobParameters, ExportTarget, JobParameters, JobSnapshot, LlmJobParameters,
    LlmPromptTemplate, LlmTask,
};
use indicatif::ProgressBar;

use crate::progress::{self, StderrNotifier, StdinConfirm};
use crate::{Commands, ExportArg, LlmArg};

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub yes: bool,
    pub json: bool,
}

pub async fn run(command: Commands, config: &ClientConfig, opts: Options) -> anyhow::Result<ExitCode> {
    let (action, params): (&str, JobParameters) = match command {
        Commands::LlmJobs { project } => return list_llm_jobs(config, project, opts).await,
        Commands::Watch { kind, id } => {
            let bar = (!opts.json).then(progress::spinner);
            let tracker = tracker(config, opts, bar.clone())?;
            let watch = tracker.watch("cli:watch", kind, id)?;
            return follow(watch, opts, bar).await;
        }
        Commands::Export {
            target,
            project,
            user,
            sdoc,
            ids,
            format,
        } => {
            let target = export_target(target, project, user, sdoc, ids)?;
            (
                "cli:export",
                ExportJobParameters::new(target).with_format(format.into()).into(),
            )
        }
        Commands::Llm {
            task,
            project,
            sdocs,
            ids,
            prompts,
        } => {
            let prompts = match prompts {
                Some(path) => read_prompts(&path)?,
                None => Vec::new(),
            };
            let params = LlmJobParameters {
                project_id: project,
                prompts,
                task: llm_task(task, sdocs, ids),
            };
            ("cli:llm", params.into())
        }
        Commands::CotaRefine {
            cota_id,
            epochs,
            min_annotations,
            topk,
            threshold,
        } => {
            let hyperparameters = CotaRefinementHyperparameters {
                min_required_annotations_per_concept: min_annotations,
                train_epochs: epochs,
                search_space_topk: topk,
                search_space_threshold: threshold,
            };
            let request = CotaRefinementRequest {
                cota_id,
                hyperparameters: (hyperparameters != CotaRefinementHyperparameters::default())
                    .then_some(hyperparameters),
            };
            ("cli:cota-refine", request.into())
        }
        Commands::Crawl { project, urls } => (
            "cli:crawl",
            CrawlerJobParameters {
                project_id: project,
                urls,
            }
            .into(),
        ),
    };

    let bar = (!opts.json).then(progress::spinner);
    let tracker = tracker(config, opts, bar.clone())?;
    let watch = tracker.submit(action, params).await?;
    if !opts.json {
        eprintln!("  \u{2192} {} job {} submitted", watch.kind().label(), watch.job_id());
    }
    follow(watch, opts, bar).await
}

fn tracker(config: &ClientConfig, opts: Options, bar: Option<ProgressBar>) -> anyhow::Result<JobTracker> {
    let confirm: Box<dyn Confirm> = if opts.yes {
        Box::new(AlwaysConfirm)
    } else {
        Box::new(StdinConfirm { bar })
    };
    let notifier = Arc::new(StderrNotifier { quiet: opts.json });
    Ok(JobTracker::from_config(config, notifier, confirm)?)
}

async fn follow(mut watch: JobWatch, opts: Options, bar: Option<ProgressBar>) -> anyhow::Result<ExitCode> {
    let end = progress::follow(&mut watch, bar.as_ref()).await;
    match end {
        WatchEnd::Terminal(outcome) => {
            if opts.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }
            Ok(if succeeded(&outcome) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        WatchEnd::PollAborted { failures } => {
            bail!("gave up on job {} after {failures} failed polls", watch.job_id())
        }
        WatchEnd::Cancelled => bail!("tracking of job {} was cancelled", watch.job_id()),
    }
}

/// Only a finished job that delivered its result counts as success.
fn succeeded(outcome: &TerminalOutcome) -> bool {
    matches!(outcome, TerminalOutcome::Finished { result: Some(_), .. })
}

async fn list_llm_jobs(config: &ClientConfig, project: i64, opts: Options) -> anyhow::Result<ExitCode> {
    let api = HttpJobApi::new(config)?;
    let jobs = api.list_llm_jobs(project).await?;
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
    } else if jobs.is_empty() {
        println!("No LLM jobs in project {project}");
    } else {
        for job in &jobs {
            println!("{}", job_line(job));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn job_line(job: &JobSnapshot) -> String {
    let steps = job
        .progress()
        .and_then(|p| p.steps)
        .map(|(current, total)| format!(" {current}/{total}"))
        .unwrap_or_default();
    format!(
        "{:<38} {:<10}{steps}  {}",
        job.id(),
        job.status().as_str(),
        job.created().format("%Y-%m-%d %H:%M")
    )
}

fn read_prompts(path: &Path) -> anyhow::Result<Vec<LlmPromptTemplate>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading prompt templates from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing prompt templates in {}", path.display()))
}

fn llm_task(task: LlmArg, sdoc_ids: Vec<i64>, ids: Vec<i64>) -> LlmTask {
    match task {
        LlmArg::Tagging => LlmTask::DocumentTagging {
            sdoc_ids,
            tag_ids: ids,
        },
        LlmArg::Metadata => LlmTask::MetadataExtraction {
            sdoc_ids,
            project_metadata_ids: ids,
        },
        LlmArg::Annotation => LlmTask::Annotation {
            sdoc_ids,
            code_ids: ids,
        },
        LlmArg::SentenceAnnotation => LlmTask::SentenceAnnotation {
            sdoc_ids,
            code_ids: ids,
        },
    }
}

fn export_target(
    arg: ExportArg,
    project_id: i64,
    user: Option<i64>,
    sdoc: Option<i64>,
    ids: Vec<i64>,
) -> anyhow::Result<ExportTarget> {
    let user = || user.context("this export needs --user");
    let sdoc = || sdoc.context("this export needs --sdoc");
    Ok(match arg {
        ExportArg::AllData => ExportTarget::SingleProjectAllData { project_id },
        ExportArg::AllUsers => ExportTarget::SingleProjectAllUser { project_id },
        ExportArg::AllTags => ExportTarget::SingleProjectAllTags { project_id },
        ExportArg::AllCodes => ExportTarget::SingleProjectAllCodes { project_id },
        ExportArg::Sdocs => ExportTarget::SingleProjectSelectedSdocs {
            project_id,
            sdoc_ids: ids,
        },
        ExportArg::SpanAnnotations => ExportTarget::SingleProjectSelectedSpanAnnotations {
            project_id,
            span_annotation_ids: ids,
        },
        ExportArg::SentenceAnnotations => ExportTarget::SingleProjectSelectedSentenceAnnotations {
            project_id,
            sentence_annotation_ids: ids,
        },
        ExportArg::UserData => ExportTarget::SingleUserAllData {
            project_id,
            user_id: user()?,
        },
        ExportArg::UserMemos => ExportTarget::SingleUserAllMemos {
            project_id,
            user_id: user()?,
        },
        ExportArg::UserLogbook => ExportTarget::SingleUserLogbook {
            project_id,
            user_id: user()?,
        },
        ExportArg::DocAnnotations => ExportTarget::SingleDocAllUserAnnotations {
            project_id,
            sdoc_id: sdoc()?,
        },
        ExportArg::DocUserAnnotations => ExportTarget::SingleDocSingleUserAnnotations {
            project_id,
            sdoc_id: sdoc()?,
            user_id: user()?,
        },
    })
}
