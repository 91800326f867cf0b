//! Bounded tokio worker pool for folders of images.
//!
//! Every image runs on the blocking pool under a per-image timeout. Failures
//! and timeouts become [`Outcome::Error`] entries; the batch itself never fails.

use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::{
    error::{AnalysisError, Result},
    pipeline::{Analyzer, ImageAnalysis},
    types::{FeatureVector, Label},
};

/// File extensions picked up by [`collect_images`], compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "tiff"];

/// Emit a progress line every this many images.
const PROGRESS_EVERY: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct BatchConfig {
    /// Concurrent images; defaults to the number of CPUs
    pub workers: usize,
    /// Per-image time limit in seconds
    pub timeout_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            timeout_secs: 60,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(AnalysisError::invalid("batch workers must be at least 1"));
        }
        if self.timeout_secs == 0 {
            return Err(AnalysisError::invalid("batch timeout must be at least 1 second"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Outcome<T> {
    Success(T),
    Error(String),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Error(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageOutcome<T> {
    pub path: PathBuf,
    pub result: Outcome<T>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<T> {
    /// One entry per input path, in input order
    pub outcomes: Vec<ImageOutcome<T>>,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl<T> BatchReport<T> {
    /// Fraction of processed images that succeeded, 0 for an empty batch.
    pub fn completion_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.processed as f64
        }
    }

    pub fn successes(&self) -> impl Iterator<Item = (&Path, &T)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.success().map(|value| (o.path.as_path(), value)))
    }

    pub fn errors(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Outcome::Error(message) => Some((o.path.as_path(), message.as_str())),
            Outcome::Success(_) => None,
        })
    }
}

impl BatchReport<ImageAnalysis> {
    /// `(pleine, vide)` counts over the rule labels of successful images.
    pub fn label_counts(&self) -> (usize, usize) {
        self.successes().fold((0, 0), |(full, empty), (_, analysis)| match analysis.label() {
            Label::Pleine => (full + 1, empty),
            Label::Vide => (full, empty + 1),
        })
    }
}

pub struct BatchRunner {
    workers: usize,
    timeout: Duration,
}

impl BatchRunner {
    pub fn new(config: &BatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            workers: config.workers,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Override the per-image limit with sub-second precision.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `job` over every path with at most `workers` images in flight.
    ///
    /// A timed-out image is reported as an error right away, but its blocking
    /// thread keeps the worker slot until it returns; the result is discarded.
    pub async fn run<T, F>(&self, paths: Vec<PathBuf>, job: F) -> BatchReport<T>
    where
        T: Send + 'static,
        F: Fn(&Path) -> Result<T> + Send + Sync + 'static,
    {
        let total = paths.len();
        let job = Arc::new(job);
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let processed = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        info!(total, workers = self.workers, "starting batch");

        let mut handles = Vec::with_capacity(total);
        for path in paths {
            let job = Arc::clone(&job);
            let semaphore = Arc::clone(&semaphore);
            let processed = Arc::clone(&processed);
            let failed = Arc::clone(&failed);
            let timeout = self.timeout;

            handles.push(tokio::spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(permit) => run_one(&path, job, permit, timeout).await,
                    Err(err) => Outcome::Error(AnalysisError::Task(err.to_string()).to_string()),
                };

                if let Outcome::Error(message) = &result {
                    failed.fetch_add(1, Ordering::Relaxed);
                    warn!(path = %path.display(), "{message}");
                }
                let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                if done % PROGRESS_EVERY == 0 || done == total {
                    info!(done, total, "batch progress");
                }
                ImageOutcome { path, result }
            }));
        }

        let mut outcomes = Vec::with_capacity(total);
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                // The outer task only panics if a log sink does; the path is lost with it.
                Err(err) => warn!("batch task aborted: {err}"),
            }
        }

        let processed = processed.load(Ordering::Relaxed);
        let failed = failed.load(Ordering::Relaxed);
        info!(processed, failed, "batch finished");
        BatchReport {
            outcomes,
            processed,
            succeeded: processed - failed,
            failed,
        }
    }

    pub async fn analyze(&self, analyzer: Arc<Analyzer>, paths: Vec<PathBuf>) -> BatchReport<ImageAnalysis> {
        self.run(paths, move |path| analyzer.analyze_path(path)).await
    }

    pub async fn fusion(&self, analyzer: Arc<Analyzer>, paths: Vec<PathBuf>) -> BatchReport<FeatureVector> {
        self.run(paths, move |path| analyzer.fusion_path(path)).await
    }
}

async fn run_one<T, F>(path: &Path, job: Arc<F>, permit: OwnedSemaphorePermit, timeout: Duration) -> Outcome<T>
where
    T: Send + 'static,
    F: Fn(&Path) -> Result<T> + Send + Sync + 'static,
{
    let worker_path = path.to_path_buf();
    let task = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        job(&worker_path)
    });
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(value))) => {
            debug!(path = %path.display(), "image done");
            Outcome::Success(value)
        }
        Ok(Ok(Err(err))) => Outcome::Error(err.to_string()),
        Ok(Err(join)) => Outcome::Error(AnalysisError::Task(join.to_string()).to_string()),
        Err(_) => Outcome::Error(format!("timed out after {:.1}s", timeout.as_secs_f64())),
    }
}

/// Image files directly inside `dir`, sorted by path.
pub fn collect_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)));
        if path.is_file() && is_image {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
