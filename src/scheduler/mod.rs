//! Cron-driven periodic jobs.
//!
//! A [`PeriodicRunner`] owns a list of [`ScheduledJob`]s and spawns one tokio
//! task per job. Each task sleeps until the next occurrence of its schedule
//! in local time, runs the job, and repeats until the shutdown signal flips.
//! Jobs do not coordinate with each other.

pub mod nudge;

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use cron::Schedule;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[async_trait]
pub trait PeriodicTask: Send + Sync {
    async fn run(&self);
}

#[derive(Clone)]
pub struct ScheduledJob {
    pub name: String,
    pub schedule: Schedule,
    pub task: Arc<dyn PeriodicTask>,
}

impl std::fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("name", &self.name)
            .field("schedule", &self.schedule.to_string())
            .finish()
    }
}

impl ScheduledJob {
    /// `cron_expr` uses the six-field form with seconds, e.g. `0 0 9 * * *`.
    pub fn new(name: &str, cron_expr: &str, task: Arc<dyn PeriodicTask>) -> Result<Self> {
        let schedule = Schedule::from_str(cron_expr)
            .with_context(|| format!("invalid cron expression '{cron_expr}'"))?;
        Ok(Self {
            name: name.to_string(),
            schedule,
            task,
        })
    }
}

/// First occurrence strictly after `after`.
pub fn next_fire(schedule: &Schedule, after: DateTime<Local>) -> Option<DateTime<Local>> {
    schedule.after(&after).next()
}

#[derive(Debug, Default)]
pub struct PeriodicRunner {
    jobs: Vec<ScheduledJob>,
}

impl PeriodicRunner {
    pub fn new(jobs: Vec<ScheduledJob>) -> Self {
        Self { jobs }
    }

    pub fn jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    /// Spawn every job. The tasks exit once `shutdown` carries `true` or its
    /// sender is dropped.
    pub fn run(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        tracing::info!(jobs = self.jobs.len(), "periodic runner started");
        self.jobs
            .into_iter()
            .map(|job| tokio::spawn(run_job(job, shutdown.clone())))
            .collect()
    }
}

async fn run_job(job: ScheduledJob, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let now = Local::now();
        let Some(next) = next_fire(&job.schedule, now) else {
            tracing::warn!(job = %job.name, "schedule has no future occurrence");
            break;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::debug!(job = %job.name, next = %next, "job scheduled");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                tracing::debug!(job = %job.name, "running job");
                job.task.run().await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!(job = %job.name, "job stopped");
}
