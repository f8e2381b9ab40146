//! Recurring job triggers: cron expressions and fixed intervals.
//!
//! Each scheduled job owns one tokio task that sleeps until the next
//! fire time and then asks the [`JobRunner`] to execute. Cron wins over
//! interval when both are configured. A disabled or malformed schedule
//! is inert: scheduling it is a no-op, never an error.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::task::JoinHandle;

use tapline_types::job::{EtlJob, Schedule};

/// Executes one fire of a scheduled job.
#[async_trait::async_trait]
pub trait JobRunner: Send + Sync {
    /// Returns false when the job id is unknown; the scheduler logs and
    /// keeps the trigger alive.
    async fn run_job(&self, job_id: &str) -> bool;
}

enum Trigger {
    Cron(Box<cron::Schedule>, Tz),
    Interval(Duration),
}

impl Trigger {
    /// None for inert schedules (disabled, empty, or unparseable).
    fn from_schedule(job_id: &str, schedule: &Schedule) -> Option<Self> {
        if !schedule.is_runnable() {
            return None;
        }

        if let Some(expr) = schedule.cron.as_deref().filter(|c| !c.trim().is_empty()) {
            let parsed = match cron::Schedule::from_str(expr.trim()) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(job_id, cron = expr, error = %e, "Unparseable cron, schedule inert");
                    return None;
                }
            };
            let tz = match schedule.timezone.as_deref() {
                None => Tz::UTC,
                Some(name) => match name.parse::<Tz>() {
                    Ok(tz) => tz,
                    Err(_) => {
                        tracing::warn!(job_id, timezone = name, "Unknown timezone, schedule inert");
                        return None;
                    }
                },
            };
            return Some(Self::Cron(Box::new(parsed), tz));
        }

        schedule
            .interval_seconds
            .filter(|s| *s > 0)
            .map(|s| Self::Interval(Duration::from_secs(s)))
    }
}

struct ScheduledJob {
    paused: Arc<AtomicBool>,
    next_fire: Arc<Mutex<Option<DateTime<Utc>>>>,
    handle: JoinHandle<()>,
}

pub struct JobScheduler {
    runner: Arc<dyn JobRunner>,
    jobs: Mutex<HashMap<String, ScheduledJob>>,
}

impl JobScheduler {
    #[must_use]
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self { runner, jobs: Mutex::new(HashMap::new()) }
    }

    /// Install (or replace) the trigger for a job. Returns whether a
    /// trigger is now active; inert schedules return false.
    pub fn schedule_job(&self, job_id: &str, schedule: &Schedule) -> bool {
        let Some(trigger) = Trigger::from_schedule(job_id, schedule) else {
            tracing::debug!(job_id, "Schedule inert, nothing installed");
            self.unschedule_job(job_id);
            return false;
        };

        let paused = Arc::new(AtomicBool::new(false));
        let next_fire = Arc::new(Mutex::new(None));
        let handle = tokio::spawn(trigger_loop(
            job_id.to_string(),
            trigger,
            Arc::clone(&self.runner),
            Arc::clone(&paused),
            Arc::clone(&next_fire),
        ));

        let replaced = self
            .lock()
            .insert(job_id.to_string(), ScheduledJob { paused, next_fire, handle });
        if let Some(old) = replaced {
            old.handle.abort();
            tracing::info!(job_id, "Trigger replaced");
        } else {
            tracing::info!(job_id, "Trigger installed");
        }
        true
    }

    /// Install triggers for every job with a runnable schedule. Returns
    /// how many were installed.
    pub fn schedule_all(&self, jobs: &[EtlJob]) -> usize {
        jobs.iter()
            .filter(|job| job.enabled)
            .filter(|job| {
                job.schedule
                    .as_ref()
                    .is_some_and(|s| self.schedule_job(&job.id, s))
            })
            .count()
    }

    /// Remove a job's trigger. False when none was installed.
    pub fn unschedule_job(&self, job_id: &str) -> bool {
        match self.lock().remove(job_id) {
            Some(job) => {
                job.handle.abort();
                tracing::info!(job_id, "Trigger removed");
                true
            }
            None => false,
        }
    }

    /// Keep the trigger but skip fires until resumed. False when the job
    /// has no trigger.
    pub fn pause_job(&self, job_id: &str) -> bool {
        match self.lock().get(job_id) {
            Some(job) => {
                job.paused.store(true, Ordering::Relaxed);
                tracing::info!(job_id, "Trigger paused");
                true
            }
            None => false,
        }
    }

    /// Undo [`JobScheduler::pause_job`].
    pub fn resume_job(&self, job_id: &str) -> bool {
        match self.lock().get(job_id) {
            Some(job) => {
                job.paused.store(false, Ordering::Relaxed);
                tracing::info!(job_id, "Trigger resumed");
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_scheduled(&self, job_id: &str) -> bool {
        self.lock().contains_key(job_id)
    }

    #[must_use]
    pub fn scheduled_jobs(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Next planned fire, when the trigger has computed one.
    #[must_use]
    pub fn next_fire_time(&self, job_id: &str) -> Option<DateTime<Utc>> {
        let jobs = self.lock();
        let job = jobs.get(job_id)?;
        let next = job
            .next_fire
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *next
    }

    /// Abort every trigger task.
    pub fn shutdown(&self) {
        let mut jobs = self.lock();
        for (job_id, job) in jobs.drain() {
            job.handle.abort();
            tracing::debug!(job_id, "Trigger aborted");
        }
        tracing::info!("Scheduler shut down");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ScheduledJob>> {
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn trigger_loop(
    job_id: String,
    trigger: Trigger,
    runner: Arc<dyn JobRunner>,
    paused: Arc<AtomicBool>,
    next_fire: Arc<Mutex<Option<DateTime<Utc>>>>,
) {
    match trigger {
        Trigger::Cron(schedule, tz) => {
            cron_loop(&job_id, &schedule, tz, &runner, &paused, &next_fire).await;
        }
        Trigger::Interval(period) => {
            interval_loop(&job_id, period, &runner, &paused, &next_fire).await;
        }
    }
}

async fn cron_loop(
    job_id: &str,
    schedule: &cron::Schedule,
    tz: Tz,
    runner: &Arc<dyn JobRunner>,
    paused: &AtomicBool,
    next_fire: &Mutex<Option<DateTime<Utc>>>,
) {
    loop {
        let Some(next) = schedule.upcoming(tz).next() else {
            tracing::warn!(job_id, "Cron schedule has no future fires, trigger ends");
            return;
        };
        let next_utc = next.with_timezone(&Utc);
        let wait = (next_utc - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        set_next_fire(next_fire, next_utc);
        tokio::time::sleep(wait).await;

        fire(job_id, runner, paused).await;
    }
}

/// Interval triggers fire on a fixed grid: immediately, then every
/// period from the start. A run longer than the period does not shift
/// the grid; overrun ticks are skipped, not bursted.
async fn interval_loop(
    job_id: &str,
    period: Duration,
    runner: &Arc<dyn JobRunner>,
    paused: &AtomicBool,
    next_fire: &Mutex<Option<DateTime<Utc>>>,
) {
    let mut ticks = tokio::time::interval(period);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticks.tick().await;
        set_next_fire(
            next_fire,
            Utc::now() + chrono::Duration::from_std(period).unwrap_or_default(),
        );

        fire(job_id, runner, paused).await;
    }
}

async fn fire(job_id: &str, runner: &Arc<dyn JobRunner>, paused: &AtomicBool) {
    if paused.load(Ordering::Relaxed) {
        tracing::debug!(job_id, "Trigger paused, fire skipped");
        return;
    }
    tracing::info!(job_id, "Trigger fired");
    if !runner.run_job(job_id).await {
        tracing::warn!(job_id, "Job unknown to runner, fire skipped");
    }
}

fn set_next_fire(next_fire: &Mutex<Option<DateTime<Utc>>>, at: DateTime<Utc>) {
    *next_fire
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(at);
}
