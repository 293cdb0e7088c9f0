//! Bounded-concurrency fan-out of verdict requests.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use lstn_core::{DependencyKind, Response};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::CliError;
use crate::status::Status;

/// One verdict request to issue.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Job {
    pub name: String,
    pub version: Option<String>,
}

impl Job {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    fn label(&self) -> String {
        match &self.version {
            Some(version) => format!("{} {version}", self.name),
            None => self.name.clone(),
        }
    }
}

pub type Jobs = BTreeMap<DependencyKind, Vec<Job>>;

/// A boxed retrieval, for callers building their retrieval function at runtime.
pub type Retrieval = Pin<Box<dyn Future<Output = Result<Response, CliError>> + Send>>;

enum Outcome {
    Done(Response),
    Failed(Job, CliError),
    Cancelled,
}

/// Counts finished and failed jobs of one dependency kind.
struct Tracker {
    label: String,
    total: usize,
    done: usize,
    errors: usize,
}

impl Tracker {
    fn new(kind: DependencyKind, total: usize) -> Self {
        Self {
            label: kind.manifest_key().to_string(),
            total,
            done: 0,
            errors: 0,
        }
    }

    fn progress_line(&self) -> String {
        format!(
            "Retrieving verdicts for {}: {}/{}",
            self.label,
            self.done + self.errors,
            self.total
        )
    }

    fn tick(&self, status: &Status) {
        status.counter(&self.progress_line());
    }

    fn finish(&self, status: &Status) {
        status.clear_counter();
        let message = format!(
            "Got verdicts for {}/{} {}",
            self.done, self.total, self.label
        );
        if self.errors == 0 {
            status.success(&message);
        } else {
            status.warning(&format!("{message} ({} failed)", self.errors));
        }
    }
}

fn worker_count(jobs: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus.min(jobs).max(1)
}

/// Runs `retrieve` for every job, kind by kind, and concatenates the responses.
///
/// Failed jobs are logged and dropped. Cancelling `token` stops the workers at their
/// next job and makes the whole run fail with [`CliError::Cancelled`].
pub async fn fan_out<F, Fut>(
    token: &CancellationToken,
    jobs: Jobs,
    status: Status,
    retrieve: F,
) -> Result<Response, CliError>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, CliError>> + Send + 'static,
{
    let retrieve = Arc::new(retrieve);
    let mut combined = Response::default();

    for (kind, items) in jobs {
        if items.is_empty() {
            continue;
        }
        let response = fan_out_kind(token, kind, items, status, Arc::clone(&retrieve)).await?;
        combined.extend(response);
    }

    Ok(combined)
}

async fn fan_out_kind<F, Fut>(
    token: &CancellationToken,
    kind: DependencyKind,
    items: Vec<Job>,
    status: Status,
    retrieve: Arc<F>,
) -> Result<Response, CliError>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, CliError>> + Send + 'static,
{
    let mut tracker = Tracker::new(kind, items.len());
    status.progress(&format!(
        "Retrieving verdicts for {} {}...",
        tracker.total, tracker.label
    ));

    let (job_tx, job_rx) = mpsc::channel(items.len());
    for item in items {
        // The channel has room for every job, so this never waits.
        if job_tx.send(item).await.is_err() {
            break;
        }
    }
    drop(job_tx);

    let job_rx = Arc::new(Mutex::new(job_rx));
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let mut workers = JoinSet::new();

    for _ in 0..worker_count(tracker.total) {
        let job_rx = Arc::clone(&job_rx);
        let outcome_tx = outcome_tx.clone();
        let retrieve = Arc::clone(&retrieve);
        let token = token.clone();

        workers.spawn(async move {
            loop {
                if token.is_cancelled() {
                    let _ = outcome_tx.send(Outcome::Cancelled);
                    return;
                }
                let next = job_rx.lock().await.recv().await;
                let Some(job) = next else {
                    return;
                };

                let outcome = tokio::select! {
                    biased;
                    _ = token.cancelled() => Outcome::Cancelled,
                    result = retrieve(job.clone()) => match result {
                        Ok(response) => Outcome::Done(response),
                        Err(CliError::Cancelled) => Outcome::Cancelled,
                        Err(error) => Outcome::Failed(job, error),
                    },
                };
                let stop = matches!(outcome, Outcome::Cancelled);
                let _ = outcome_tx.send(outcome);
                if stop {
                    return;
                }
            }
        });
    }
    drop(outcome_tx);

    let mut response = Response::default();
    let mut cancelled = false;
    while let Some(outcome) = outcome_rx.recv().await {
        match outcome {
            Outcome::Done(_) | Outcome::Failed(..) if cancelled => {}
            Outcome::Done(partial) => {
                response.extend(partial);
                tracker.done += 1;
                tracker.tick(&status);
            }
            Outcome::Failed(job, error) => {
                tracing::error!("error processing {}: {error}", job.label());
                tracker.errors += 1;
                tracker.tick(&status);
            }
            Outcome::Cancelled => cancelled = true,
        }
    }
    while workers.join_next().await.is_some() {}

    if cancelled {
        status.clear_counter();
        return Err(CliError::Cancelled);
    }
    tracker.finish(&status);
    Ok(response)
}
