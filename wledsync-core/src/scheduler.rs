//! Timed actions
//!
//! Runs the `[[schedule]]` jobs of the configuration against a cast: each
//! job waits its delay, then sends its action at a fixed interval until its
//! run count is reached or the cast goes away.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::action::{ActionSender, CastAction};
use crate::config::ScheduleEntry;
use crate::error::{Result, WledSyncError};

/// Running schedule jobs of one cast
#[derive(Debug)]
pub struct Scheduler {
    jobs: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Parse every job and start one task per job
    ///
    /// Fails without starting anything when a job names an invalid action.
    pub fn spawn(entries: &[ScheduleEntry], actions: ActionSender) -> Result<Self> {
        let parsed = entries
            .iter()
            .map(|entry| {
                CastAction::parse(&entry.action, &entry.params)
                    .map(|action| (entry.clone(), action))
                    .map_err(|e| e.with_context(format!("schedule job '{}'", entry.action)))
            })
            .collect::<Result<Vec<_>>>()?;

        let jobs = parsed
            .into_iter()
            .map(|(entry, action)| tokio::spawn(run_job(entry, action, actions.clone())))
            .collect::<Vec<_>>();

        if !jobs.is_empty() {
            info!("Scheduled {} job(s)", jobs.len());
        }

        Ok(Self { jobs })
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Whether every job ran to completion
    pub fn is_finished(&self) -> bool {
        self.jobs.iter().all(JoinHandle::is_finished)
    }

    /// Abort all jobs
    pub fn stop(&mut self) {
        for job in self.jobs.drain(..) {
            job.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_job(entry: ScheduleEntry, action: CastAction, actions: ActionSender) {
    if entry.delay_secs > 0 {
        tokio::time::sleep(Duration::from_secs(entry.delay_secs)).await;
    }

    let mut interval = (entry.every_secs > 0)
        .then(|| tokio::time::interval(Duration::from_secs(entry.every_secs)));
    let mut runs: u32 = 0;

    loop {
        if let Some(interval) = interval.as_mut() {
            // The first tick completes at once
            interval.tick().await;
        }

        debug!("Running scheduled action '{}'", entry.action);
        match actions.send(action.clone()).await {
            Ok(()) => {}
            Err(WledSyncError::NoActiveCast) => {
                debug!("Cast ended, dropping job '{}'", entry.action);
                return;
            }
            Err(e) => {
                warn!("Scheduled action '{}' failed: {}", entry.action, e);
            }
        }

        runs = runs.saturating_add(1);
        if interval.is_none() || (entry.count > 0 && runs >= entry.count) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{CastRequest, Envelope};

    fn entry(action: &str, every_secs: u64, delay_secs: u64, count: u32) -> ScheduleEntry {
        ScheduleEntry {
            action: action.to_string(),
            params: String::new(),
            every_secs,
            delay_secs,
            count,
        }
    }

    fn action_of(envelope: Envelope) -> CastAction {
        match envelope.request {
            CastRequest::Action(action) => action,
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_invalid_job_rejected() {
        let (sender, _rx) = ActionSender::channel();
        let err = Scheduler::spawn(&[entry("explode", 0, 0, 0)], sender).unwrap_err();
        assert!(err.to_string().contains("explode"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_job() {
        let (sender, mut rx) = ActionSender::channel();
        let scheduler = Scheduler::spawn(&[entry("shot_1", 0, 2, 0)], sender).unwrap();
        assert_eq!(scheduler.len(), 1);

        let envelope = rx.recv().await.unwrap();
        assert_eq!(action_of(envelope), CastAction::Shot);

        // Sent once, then the task ends and drops its sender
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(scheduler.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_job_honors_count() {
        let (sender, mut rx) = ActionSender::channel();
        let scheduler = Scheduler::spawn(&[entry("reset", 5, 0, 3)], sender).unwrap();

        for _ in 0..3 {
            let envelope = rx.recv().await.unwrap();
            assert_eq!(action_of(envelope), CastAction::Reset);
        }

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(scheduler.is_finished());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_ends_with_cast() {
        let (sender, rx) = ActionSender::channel();
        let scheduler = Scheduler::spawn(&[entry("shot", 1, 0, 0)], sender).unwrap();
        drop(rx);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(scheduler.is_finished());
    }

    #[tokio::test]
    async fn test_stop_aborts() {
        let (sender, _rx) = ActionSender::channel();
        let mut scheduler = Scheduler::spawn(&[entry("shot", 1, 3600, 0)], sender).unwrap();
        scheduler.stop();
        assert!(scheduler.is_empty());
    }
}
