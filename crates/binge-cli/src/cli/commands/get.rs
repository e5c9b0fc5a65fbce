//! `binge get` – submit URLs to a scheduler as one group and drive it until
//! the group is finished or Ctrl-C.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use binge_core::config::BingeConfig;
use binge_core::job::{format_size, GroupId, JobHandle, JobId, JobRequest, JobState, Priority};
use binge_core::naming;
use binge_core::scheduler::{DownloadScheduler, GroupSummary, RequeueReason, SchedulerEvent};
use binge_core::transfer::CurlTransfer;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct GetArgs {
    pub urls: Vec<String>,
    pub priority: Priority,
    pub dir: Option<PathBuf>,
    pub name: Option<String>,
    pub episode: u32,
    pub max_concurrent: Option<u32>,
    pub json: bool,
}

/// One request per URL, all in `group`; with a series name, episodes are
/// numbered from `args.episode`.
pub(crate) fn plan_requests(args: &GetArgs, dir: &Path, group: GroupId) -> Vec<JobRequest> {
    args.urls
        .iter()
        .enumerate()
        .map(|(i, url)| {
            let request = JobRequest::new(url.clone(), dir).with_group(group);
            match &args.name {
                Some(name) => {
                    let episode = args.episode.saturating_add(i as u32);
                    request.with_base_name(naming::episode_base_name(name, &episode.to_string()))
                }
                None => request,
            }
        })
        .collect()
}

pub(crate) fn progress_line(job: &JobHandle) -> String {
    let progress = job.progress();
    if progress.total_size() > 0 {
        format!(
            "[job {}] {:>5.1}%  {}",
            job.id(),
            progress.percent(),
            progress.size_display()
        )
    } else {
        format!("[job {}] {}", job.id(), format_size(progress.downloaded_bytes()))
    }
}

/// Nothing more will happen to the batch: every job left the scheduler, or
/// the rest are parked at `Paused`.
fn batch_settled(summary: Option<&GroupSummary>, jobs: &[JobHandle]) -> bool {
    if summary.map_or(true, GroupSummary::is_finished) {
        return true;
    }
    jobs.iter()
        .filter(|j| !j.state().is_terminal())
        .all(|j| j.priority().is_paused())
}

fn describe(event: &SchedulerEvent, jobs: &[JobHandle], max_attempts: u32) -> String {
    let error_of = |id: JobId| {
        jobs.iter()
            .find(|j| j.id() == id)
            .and_then(|j| j.last_error())
            .unwrap_or_else(|| "unknown error".to_string())
    };
    match event {
        SchedulerEvent::Started { job, attempt } if *attempt > 1 => {
            format!("[job {}] started (attempt {})", job, attempt)
        }
        SchedulerEvent::Started { job, .. } => format!("[job {}] started", job),
        SchedulerEvent::Completed { job } => format!("[job {}] completed", job),
        SchedulerEvent::Requeued {
            job,
            reason: RequeueReason::Failed { failures },
        } => format!(
            "[job {}] failed ({}/{}): {}; will retry",
            job,
            failures,
            max_attempts,
            error_of(*job)
        ),
        SchedulerEvent::Requeued {
            job,
            reason: RequeueReason::Interrupted,
        } => format!("[job {}] interrupted", job),
        SchedulerEvent::RetryExhausted { job, attempts } => format!(
            "[job {}] giving up after {} attempts: {}",
            job,
            attempts,
            error_of(*job)
        ),
        SchedulerEvent::Removed { job } => format!("[job {}] removed", job),
    }
}

/// Returns `Ok(true)` when every job completed.
pub async fn run_get(cfg: &BingeConfig, args: GetArgs) -> Result<bool> {
    let mut cfg = cfg.clone();
    if let Some(n) = args.max_concurrent {
        cfg.max_concurrent_downloads = n;
    }
    let cfg = cfg.normalized();
    let dir = match args.dir.clone().or_else(|| cfg.download_dir.clone()) {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolving current directory")?,
    };

    let transfer = Arc::new(CurlTransfer::new(cfg.transfer_options()));
    let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
    let sched = DownloadScheduler::with_events(cfg.scheduler_config(), transfer, events_tx)?;

    let group = GroupId::new();
    let mut jobs = Vec::with_capacity(args.urls.len());
    for request in plan_requests(&args, &dir, group) {
        let job = sched.submit(request, args.priority)?;
        if !args.json {
            println!("[job {}] queued {}", job.id(), job.source_url());
        }
        jobs.push(job);
    }
    tracing::info!(
        %group,
        jobs = jobs.len(),
        dir = %dir.display(),
        max_concurrent = cfg.max_concurrent_downloads,
        "get: jobs submitted"
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    let mut interrupted = false;

    while !batch_settled(sched.group_summary(group).as_ref(), &jobs) {
        tokio::select! {
            _ = &mut ctrl_c => {
                interrupted = true;
                break;
            }
            Some(event) = events.recv() => {
                if !args.json {
                    println!("{}", describe(&event, &jobs, cfg.max_retry_attempts));
                }
            }
            _ = ticker.tick() => {
                if !args.json {
                    for job in jobs.iter().filter(|j| j.state() == JobState::Downloading) {
                        println!("{}", progress_line(job));
                    }
                }
            }
        }
    }

    if interrupted {
        eprintln!("interrupted; stopping downloads (partial files are kept)");
    }
    let summary = sched.shutdown(cfg.shutdown_timeout()).await;
    if !summary.clean {
        tracing::warn!("some transfers did not stop within the shutdown timeout");
    }

    let snapshots: Vec<_> = jobs.iter().map(|j| j.snapshot()).collect();
    let batch = sched.group_summary(group);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
    } else {
        for s in &snapshots {
            println!(
                "[job {}] {}  {}",
                s.id,
                s.state,
                format_size(s.downloaded_bytes)
            );
        }
        if let Some(batch) = &batch {
            println!("{}", batch_line(batch));
        }
    }

    let all_done = batch.map_or(false, |b| b.completed == b.submitted);
    Ok(all_done && !interrupted)
}

pub(crate) fn batch_line(batch: &GroupSummary) -> String {
    let mut line = format!("{}/{} completed", batch.completed, batch.submitted);
    if !batch.exhausted.is_empty() {
        let failed: Vec<String> = batch.exhausted.iter().map(|id| id.to_string()).collect();
        line.push_str(&format!(", failed: job {}", failed.join(", job ")));
    }
    if batch.pending() > 0 {
        line.push_str(&format!(", {} left", batch.pending()));
    }
    line
}
