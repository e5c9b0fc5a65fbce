use super::*;
use crate::job::{GroupId, JobState};
use crate::transfer::Outcome;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type Script = dyn Fn(&Job, &CancellationToken, u32) -> Outcome + Send + Sync;

/// In-process transfer driven by a closure of (job, token, attempt number).
struct ScriptedTransfer {
    script: Box<Script>,
    attempts: Mutex<HashMap<JobId, u32>>,
    started: Mutex<Vec<(JobId, Instant)>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedTransfer {
    fn new(script: impl Fn(&Job, &CancellationToken, u32) -> Outcome + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            attempts: Mutex::new(HashMap::new()),
            started: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    fn attempts_of(&self, id: JobId) -> u32 {
        self.attempts.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    fn start_order(&self) -> Vec<JobId> {
        self.started.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }

    fn start_times(&self, id: JobId) -> Vec<Instant> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .filter(|(j, _)| *j == id)
            .map(|(_, t)| *t)
            .collect()
    }
}

impl Transfer for ScriptedTransfer {
    fn execute(&self, job: &Job, cancel: &CancellationToken) -> Outcome {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(job.id()).or_insert(0);
            *n += 1;
            *n
        };
        self.started.lock().unwrap().push((job.id(), Instant::now()));
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let outcome = (self.script)(job, cancel, attempt);
        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

fn config(max: usize, attempts: u32) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrency: max,
        retry: RetryPolicy {
            max_attempts: attempts,
            cooldown: Duration::ZERO,
        },
        idle_backoff: Duration::from_millis(10),
    }
}

fn request(name: &str) -> JobRequest {
    JobRequest::new(format!("http://test.invalid/{}.mp4", name), "/tmp/binge-test")
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Blocks the calling transfer thread until `gate` opens or the attempt is cancelled.
fn hold(gate: &AtomicBool, cancel: &CancellationToken) -> Outcome {
    while !gate.load(Ordering::SeqCst) {
        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    Outcome::Completed
}

fn wait_for_cancel(cancel: &CancellationToken) -> Outcome {
    while !cancel.is_cancelled() {
        std::thread::sleep(Duration::from_millis(2));
    }
    Outcome::Cancelled
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn all_jobs_complete() {
    let transfer = ScriptedTransfer::new(|_, _, _| {
        std::thread::sleep(Duration::from_millis(5));
        Outcome::Completed
    });
    let sched = DownloadScheduler::new(config(3, 5), transfer.clone()).unwrap();
    let jobs: Vec<_> = (0..8)
        .map(|i| sched.submit(request(&format!("ep{}", i)), Priority::Medium).unwrap())
        .collect();
    wait_until("all completed", || sched.completed_count() == 8).await;
    for job in &jobs {
        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(transfer.attempts_of(job.id()), 1);
    }
    assert!(sched.snapshot().is_empty());
    assert_eq!(sched.queued_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_job_is_abandoned_after_max_attempts() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let transfer = ScriptedTransfer::new(|job, _, _| {
        job.record_error("HTTP 503");
        Outcome::Error
    });
    let sched = DownloadScheduler::with_events(config(2, 3), transfer.clone(), tx).unwrap();
    let job = sched.submit(request("broken"), Priority::High).unwrap();
    wait_until("exhausted", || job.state() == JobState::Exhausted).await;

    assert_eq!(transfer.attempts_of(job.id()), 3);
    assert_eq!(job.retry_count(), 3);
    assert_eq!(job.last_error().as_deref(), Some("HTTP 503"));
    assert!(sched.job(job.id()).is_none());
    assert_eq!(sched.completed_count(), 0);

    let mut events = Vec::new();
    while let Ok(Some(ev)) = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
        let last = matches!(ev, SchedulerEvent::RetryExhausted { .. });
        events.push(ev);
        if last {
            break;
        }
    }
    let requeued = events
        .iter()
        .filter(|e| matches!(e, SchedulerEvent::Requeued { reason: RequeueReason::Failed { .. }, .. }))
        .count();
    assert_eq!(requeued, 2);
    assert_eq!(
        events.last(),
        Some(&SchedulerEvent::RetryExhausted {
            job: job.id(),
            attempts: 3
        })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_never_exceeds_ceiling() {
    let transfer = ScriptedTransfer::new(|_, _, _| {
        std::thread::sleep(Duration::from_millis(40));
        Outcome::Completed
    });
    let sched = DownloadScheduler::new(config(2, 5), transfer.clone()).unwrap();
    for i in 0..6 {
        sched.submit(request(&format!("c{}", i)), Priority::Medium).unwrap();
    }
    wait_until("all completed", || sched.completed_count() == 6).await;
    assert_eq!(transfer.peak.load(Ordering::SeqCst), 2);
    assert_eq!(sched.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ready_jobs_run_in_priority_order() {
    let gate = Arc::new(AtomicBool::new(false));
    let gate_in = Arc::clone(&gate);
    let transfer = ScriptedTransfer::new(move |job, cancel, _| {
        if job.source_url().ends_with("gate.mp4") {
            hold(&gate_in, cancel)
        } else {
            Outcome::Completed
        }
    });
    let sched = DownloadScheduler::new(config(1, 5), transfer.clone()).unwrap();
    let gate_job = sched.submit(request("gate"), Priority::High).unwrap();
    wait_until("gate running", || gate_job.state() == JobState::Downloading).await;

    let low = sched.submit(request("low"), Priority::Low).unwrap();
    let medium = sched.submit(request("medium"), Priority::Medium).unwrap();
    let high = sched.submit(request("high"), Priority::High).unwrap();
    gate.store(true, Ordering::SeqCst);

    wait_until("all completed", || sched.completed_count() == 4).await;
    assert_eq!(
        transfer.start_order(),
        vec![gate_job.id(), high.id(), medium.id(), low.id()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn priority_update_reorders_queued_jobs() {
    let gate = Arc::new(AtomicBool::new(false));
    let gate_in = Arc::clone(&gate);
    let transfer = ScriptedTransfer::new(move |job, cancel, _| {
        if job.source_url().ends_with("gate.mp4") {
            hold(&gate_in, cancel)
        } else {
            Outcome::Completed
        }
    });
    let sched = DownloadScheduler::new(config(1, 5), transfer.clone()).unwrap();
    let gate_job = sched.submit(request("gate"), Priority::High).unwrap();
    wait_until("gate running", || gate_job.state() == JobState::Downloading).await;

    let a = sched.submit(request("a"), Priority::Medium).unwrap();
    let b = sched.submit(request("b"), Priority::Low).unwrap();
    sched.update_priority(b.id(), Priority::High).unwrap();
    assert_eq!(b.priority(), Priority::High);
    gate.store(true, Ordering::SeqCst);

    wait_until("all completed", || sched.completed_count() == 3).await;
    assert_eq!(transfer.start_order(), vec![gate_job.id(), b.id(), a.id()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn retry_waits_for_cooldown() {
    let transfer = ScriptedTransfer::new(|_, _, attempt| {
        if attempt == 1 {
            Outcome::Error
        } else {
            Outcome::Completed
        }
    });
    let mut cfg = config(1, 3);
    cfg.retry.cooldown = Duration::from_millis(300);
    let sched = DownloadScheduler::new(cfg, transfer.clone()).unwrap();
    let job = sched.submit(request("flaky"), Priority::Medium).unwrap();
    wait_until("completed", || job.state() == JobState::Completed).await;

    let times = transfer.start_times(job.id());
    assert_eq!(times.len(), 2);
    assert!(times[1].duration_since(times[0]) >= Duration::from_millis(300));
    assert_eq!(job.retry_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_attempts_do_not_consume_retries() {
    let transfer = ScriptedTransfer::new(|_, _, attempt| {
        if attempt <= 3 {
            Outcome::Cancelled
        } else {
            Outcome::Completed
        }
    });
    let sched = DownloadScheduler::new(config(1, 1), transfer.clone()).unwrap();
    let job = sched.submit(request("interrupted"), Priority::Medium).unwrap();
    wait_until("completed", || job.state() == JobState::Completed).await;
    assert_eq!(transfer.attempts_of(job.id()), 4);
    assert_eq!(job.retry_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pause_in_flight_then_resume() {
    let transfer = ScriptedTransfer::new(|_, cancel, attempt| {
        if attempt == 1 {
            wait_for_cancel(cancel)
        } else {
            Outcome::Completed
        }
    });
    let sched = DownloadScheduler::new(config(2, 5), transfer.clone()).unwrap();
    let job = sched.submit(request("long"), Priority::Medium).unwrap();
    wait_until("downloading", || job.state() == JobState::Downloading).await;

    sched.pause(job.id()).unwrap();
    wait_until("interrupted", || job.state() == JobState::Interrupted).await;
    assert_eq!(job.priority(), Priority::Paused);
    assert_eq!(sched.queued_len(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transfer.attempts_of(job.id()), 1, "paused job must not be dispatched");

    sched.resume(job.id(), Priority::High).unwrap();
    wait_until("completed", || job.state() == JobState::Completed).await;
    assert_eq!(job.retry_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn paused_job_does_not_block_others() {
    let transfer = ScriptedTransfer::new(|_, _, _| Outcome::Completed);
    let sched = DownloadScheduler::new(config(1, 5), transfer.clone()).unwrap();
    let parked = sched.submit(request("parked"), Priority::Paused).unwrap();
    let other = sched.submit(request("other"), Priority::Low).unwrap();
    wait_until("other completed", || other.state() == JobState::Completed).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(parked.state(), JobState::Queued);
    assert_eq!(transfer.attempts_of(parked.id()), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_removes_queued_job() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let gate = Arc::new(AtomicBool::new(false));
    let gate_in = Arc::clone(&gate);
    let transfer = ScriptedTransfer::new(move |_, cancel, _| hold(&gate_in, cancel));
    let sched = DownloadScheduler::with_events(config(1, 5), transfer.clone(), tx).unwrap();
    let first = sched.submit(request("first"), Priority::High).unwrap();
    wait_until("first running", || first.state() == JobState::Downloading).await;

    let doomed = sched.submit(request("doomed"), Priority::Low).unwrap();
    sched.cancel(doomed.id()).unwrap();
    assert_eq!(doomed.state(), JobState::Removed);
    assert_eq!(sched.queued_len(), 0);
    assert!(sched.job(doomed.id()).is_none());

    gate.store(true, Ordering::SeqCst);
    wait_until("first completed", || first.state() == JobState::Completed).await;
    assert_eq!(transfer.attempts_of(doomed.id()), 0);

    let mut removed = false;
    while let Ok(ev) = rx.try_recv() {
        removed |= ev == SchedulerEvent::Removed { job: doomed.id() };
    }
    assert!(removed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_in_flight_drops_job() {
    let transfer = ScriptedTransfer::new(|_, cancel, _| wait_for_cancel(cancel));
    let sched = DownloadScheduler::new(config(1, 5), transfer.clone()).unwrap();
    let job = sched.submit(request("busy"), Priority::Medium).unwrap();
    wait_until("downloading", || job.state() == JobState::Downloading).await;
    sched.cancel(job.id()).unwrap();
    wait_until("removed", || job.state() == JobState::Removed).await;
    assert_eq!(sched.queued_len(), 0);
    assert!(sched.snapshot().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn growing_pool_starts_more_transfers() {
    let gate = Arc::new(AtomicBool::new(false));
    let gate_in = Arc::clone(&gate);
    let transfer = ScriptedTransfer::new(move |_, cancel, _| hold(&gate_in, cancel));
    let sched = DownloadScheduler::new(config(1, 5), transfer.clone()).unwrap();
    for i in 0..4 {
        sched.submit(request(&format!("g{}", i)), Priority::Medium).unwrap();
    }
    wait_until("one in flight", || sched.in_flight() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sched.in_flight(), 1);

    assert_eq!(sched.set_max_concurrency(3), 3);
    wait_until("three in flight", || sched.in_flight() == 3).await;

    gate.store(true, Ordering::SeqCst);
    wait_until("all completed", || sched.completed_count() == 4).await;
    assert_eq!(transfer.peak.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shrinking_pool_lets_running_transfers_finish() {
    let gate = Arc::new(AtomicBool::new(false));
    let shrunk = Arc::new(AtomicBool::new(false));
    let peak_after = Arc::new(AtomicUsize::new(0));
    let active = Arc::new(AtomicUsize::new(0));
    let (gate_in, shrunk_in, peak_in, active_in) = (
        Arc::clone(&gate),
        Arc::clone(&shrunk),
        Arc::clone(&peak_after),
        Arc::clone(&active),
    );
    let transfer = ScriptedTransfer::new(move |_, cancel, _| {
        let now = active_in.fetch_add(1, Ordering::SeqCst) + 1;
        if shrunk_in.load(Ordering::SeqCst) {
            peak_in.fetch_max(now, Ordering::SeqCst);
        }
        let outcome = hold(&gate_in, cancel);
        std::thread::sleep(Duration::from_millis(10));
        active_in.fetch_sub(1, Ordering::SeqCst);
        outcome
    });
    let sched = DownloadScheduler::new(config(3, 5), transfer.clone()).unwrap();
    let jobs: Vec<_> = (0..6)
        .map(|i| sched.submit(request(&format!("s{}", i)), Priority::Medium).unwrap())
        .collect();
    wait_until("three in flight", || sched.in_flight() == 3).await;

    shrunk.store(true, Ordering::SeqCst);
    sched.set_max_concurrency(1);
    assert_eq!(sched.max_concurrency(), 1);
    assert_eq!(sched.in_flight(), 3, "running transfers are not interrupted");

    gate.store(true, Ordering::SeqCst);
    wait_until("all completed", || sched.completed_count() == 6).await;
    assert_eq!(peak_after.load(Ordering::SeqCst), 1);
    assert!(jobs.iter().all(|j| j.retry_count() == 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_interrupts_and_reports_pending() {
    let transfer = ScriptedTransfer::new(|_, cancel, _| wait_for_cancel(cancel));
    let sched = DownloadScheduler::new(config(2, 5), transfer.clone()).unwrap();
    let running = sched.submit(request("running"), Priority::High).unwrap();
    let queued = sched.submit(request("queued"), Priority::Paused).unwrap();
    wait_until("downloading", || running.state() == JobState::Downloading).await;

    let summary = sched.shutdown(Duration::from_secs(2)).await;
    assert!(summary.clean);
    assert!(sched.is_shut_down());
    assert_eq!(running.state(), JobState::Interrupted);
    assert_eq!(running.retry_count(), 0);
    let pending: Vec<_> = summary.pending.iter().map(|s| s.id).collect();
    assert_eq!(pending, vec![running.id(), queued.id()]);

    assert!(matches!(
        sched.submit(request("late"), Priority::High),
        Err(SchedulerError::ShutDown)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_reaches_cooling_down_worker() {
    let transfer = ScriptedTransfer::new(|_, _, _| Outcome::Error);
    let mut cfg = config(1, 5);
    cfg.retry.cooldown = Duration::from_secs(30);
    let sched = DownloadScheduler::new(cfg, transfer.clone()).unwrap();
    let job = sched.submit(request("cooling"), Priority::Medium).unwrap();
    wait_until("first failure", || job.retry_count() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let summary = sched.shutdown(Duration::from_secs(2)).await;
    assert!(summary.clean);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(transfer.attempts_of(job.id()), 1);
    assert_eq!(summary.pending.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_transfer_does_not_stop_the_pool() {
    let transfer = ScriptedTransfer::new(|job, _, attempt| {
        if job.source_url().ends_with("boom.mp4") && attempt == 1 {
            panic!("transfer blew up");
        }
        Outcome::Completed
    });
    let sched = DownloadScheduler::new(config(1, 5), transfer.clone()).unwrap();
    let boom = sched.submit(request("boom"), Priority::High).unwrap();
    let fine = sched.submit(request("fine"), Priority::Low).unwrap();
    wait_until("both completed", || sched.completed_count() == 2).await;
    assert_eq!(boom.retry_count(), 1);
    assert!(boom.last_error().unwrap().contains("unexpectedly"));
    assert_eq!(fine.state(), JobState::Completed);
    assert_eq!(sched.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_job_is_rejected() {
    let transfer = ScriptedTransfer::new(|_, cancel, _| wait_for_cancel(cancel));
    let a = DownloadScheduler::new(config(1, 5), transfer.clone()).unwrap();
    let b = DownloadScheduler::new(config(1, 5), transfer.clone()).unwrap();
    let job = a.submit(request("mine"), Priority::Paused).unwrap();
    assert!(matches!(
        b.update_priority(job.id(), Priority::High),
        Err(SchedulerError::UnknownJob(id)) if id == job.id()
    ));
    assert!(matches!(b.pause(job.id()), Err(SchedulerError::UnknownJob(_))));
    assert!(matches!(b.cancel(job.id()), Err(SchedulerError::UnknownJob(_))));
    a.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submitters_each_job_runs_once() {
    let transfer = ScriptedTransfer::new(|_, _, _| Outcome::Completed);
    let sched = DownloadScheduler::new(config(4, 5), transfer.clone()).unwrap();
    let producers: Vec<_> = (0..8)
        .map(|p| {
            let sched = sched.clone();
            std::thread::spawn(move || {
                (0..25)
                    .map(|i| {
                        sched
                            .submit(request(&format!("p{}-{}", p, i)), Priority::Medium)
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let jobs: Vec<JobHandle> = producers
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let mut ids: Vec<JobId> = jobs.iter().map(|j| j.id()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 200);

    wait_until("all completed", || sched.completed_count() == 200).await;
    for job in &jobs {
        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(transfer.attempts_of(job.id()), 1);
    }
    assert_eq!(sched.queued_len(), 0);
    assert!(sched.snapshot().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn group_priority_update_moves_every_member() {
    let gate = Arc::new(AtomicBool::new(false));
    let gate_in = Arc::clone(&gate);
    let transfer = ScriptedTransfer::new(move |job, cancel, _| {
        if job.source_url().ends_with("gate.mp4") {
            hold(&gate_in, cancel)
        } else {
            Outcome::Completed
        }
    });
    let sched = DownloadScheduler::new(config(1, 5), transfer.clone()).unwrap();
    let gate_job = sched.submit(request("gate"), Priority::High).unwrap();
    wait_until("gate running", || gate_job.state() == JobState::Downloading).await;

    let season = GroupId::new();
    let other = sched.submit(request("other"), Priority::Medium).unwrap();
    let e1 = sched.submit(request("e1").with_group(season), Priority::Low).unwrap();
    let e2 = sched.submit(request("e2").with_group(season), Priority::Low).unwrap();
    assert_eq!(sched.update_group_priority(season, Priority::High).unwrap(), 2);
    assert_eq!(e1.priority(), Priority::High);
    assert_eq!(e2.priority(), Priority::High);
    gate.store(true, Ordering::SeqCst);

    wait_until("all completed", || sched.completed_count() == 4).await;
    let order = transfer.start_order();
    assert_eq!(order[0], gate_job.id());
    let mut middle = vec![order[1], order[2]];
    middle.sort();
    assert_eq!(middle, vec![e1.id(), e2.id()]);
    assert_eq!(order[3], other.id());

    let summary = sched.group_summary(season).unwrap();
    assert_eq!(summary.submitted, 2);
    assert_eq!(summary.completed, 2);
    assert!(summary.is_finished());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_group_removes_queued_and_running_members() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let transfer = ScriptedTransfer::new(|job, cancel, _| {
        if job.request().group.is_some() {
            wait_for_cancel(cancel)
        } else {
            Outcome::Completed
        }
    });
    let sched = DownloadScheduler::with_events(config(1, 5), transfer.clone(), tx).unwrap();
    let season = GroupId::new();
    let running = sched.submit(request("e1").with_group(season), Priority::High).unwrap();
    wait_until("e1 running", || running.state() == JobState::Downloading).await;
    let queued = sched.submit(request("e2").with_group(season), Priority::High).unwrap();
    let bystander = sched.submit(request("solo"), Priority::Low).unwrap();

    assert_eq!(sched.cancel_group(season).unwrap(), 2);
    assert_eq!(queued.state(), JobState::Removed);
    wait_until("e1 removed", || running.state() == JobState::Removed).await;
    wait_until("solo completed", || bystander.state() == JobState::Completed).await;
    assert_eq!(transfer.attempts_of(queued.id()), 0);

    let summary = sched.group_summary(season).unwrap();
    assert_eq!(summary.removed, 2);
    assert_eq!(summary.pending(), 0);

    let mut removed = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        if let SchedulerEvent::Removed { job } = ev {
            removed.push(job);
        }
    }
    removed.sort();
    assert_eq!(removed, vec![running.id(), queued.id()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pause_group_parks_members_until_reprioritized() {
    let transfer = ScriptedTransfer::new(|job, cancel, attempt| {
        if job.source_url().ends_with("e1.mp4") && attempt == 1 {
            wait_for_cancel(cancel)
        } else {
            Outcome::Completed
        }
    });
    let sched = DownloadScheduler::new(config(1, 5), transfer.clone()).unwrap();
    let season = GroupId::new();
    let e1 = sched.submit(request("e1").with_group(season), Priority::Medium).unwrap();
    wait_until("e1 running", || e1.state() == JobState::Downloading).await;
    let e2 = sched.submit(request("e2").with_group(season), Priority::Medium).unwrap();

    assert_eq!(sched.pause_group(season).unwrap(), 2);
    wait_until("e1 interrupted", || e1.state() == JobState::Interrupted).await;
    assert_eq!(sched.queued_len(), 2);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transfer.attempts_of(e2.id()), 0);

    sched.update_group_priority(season, Priority::Medium).unwrap();
    wait_until("group finished", || {
        sched.group_summary(season).is_some_and(|s| s.is_finished())
    })
    .await;
    assert_eq!(e1.retry_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn group_summary_lists_exhausted_members() {
    let transfer = ScriptedTransfer::new(|job, _, _| {
        if job.source_url().ends_with("bad.mp4") {
            Outcome::Error
        } else {
            Outcome::Completed
        }
    });
    let sched = DownloadScheduler::new(config(2, 2), transfer.clone()).unwrap();
    let season = GroupId::new();
    let good = sched.submit(request("good").with_group(season), Priority::Medium).unwrap();
    let bad = sched.submit(request("bad").with_group(season), Priority::Medium).unwrap();
    wait_until("group finished", || {
        sched.group_summary(season).is_some_and(|s| s.is_finished())
    })
    .await;

    let summary = sched.group_summary(season).unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.exhausted, vec![bad.id()]);
    assert_eq!(good.state(), JobState::Completed);
    assert_eq!(transfer.attempts_of(bad.id()), 2);

    let stranger = GroupId::new();
    assert!(sched.group_summary(stranger).is_none());
    assert!(matches!(
        sched.update_group_priority(stranger, Priority::High),
        Err(SchedulerError::UnknownGroup(g)) if g == stranger
    ));
    assert!(matches!(sched.cancel_group(stranger), Err(SchedulerError::UnknownGroup(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unwinding_worker_is_replaced() {
    let transfer = ScriptedTransfer::new(|_, _, _| Outcome::Completed);
    let sched = DownloadScheduler::new(config(1, 5), transfer.clone()).unwrap();
    let lease = {
        let mut pool = sched.shared.pool();
        pool.started = true;
        super::worker::WorkerLease::acquire(&sched.shared, &mut pool)
    };
    let crashed = tokio::spawn(async move {
        let _lease = lease;
        panic!("worker blew up");
    })
    .await;
    assert!(crashed.unwrap_err().is_panic());
    {
        let pool = sched.shared.pool();
        assert_eq!(pool.live_workers, 1);
        assert_eq!(pool.next_worker, 1);
    }

    let job = sched.submit(request("after"), Priority::Medium).unwrap();
    wait_until("completed", || job.state() == JobState::Completed).await;
}

#[test]
fn requires_a_runtime() {
    let transfer = ScriptedTransfer::new(|_, _, _| Outcome::Completed);
    assert!(matches!(
        DownloadScheduler::new(config(1, 1), transfer),
        Err(SchedulerError::NoRuntime(_))
    ));
}
