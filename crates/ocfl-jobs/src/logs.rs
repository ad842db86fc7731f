use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::clock::Clock;
use crate::error::{JobError, JobResult};
use crate::job::JobId;

/// Severity of a job log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One progress message from an indexing job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the hub's emission order, starting at 1. Zero for
    /// entries synthesized by a subscription.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    pub job_id: Option<JobId>,
}

/// Configuration for the [`LogHub`].
#[derive(Debug, Clone)]
pub struct LogHubConfig {
    /// Recent entries replayed to a new follower.
    pub backlog: usize,
    /// Entries buffered per follower before it starts losing them.
    pub channel_capacity: usize,
    /// Maximum concurrent followers.
    pub max_followers: usize,
}

impl Default for LogHubConfig {
    fn default() -> Self {
        Self {
            backlog: 64,
            channel_capacity: 1024,
            max_followers: 64,
        }
    }
}

struct HubState {
    next_seq: u64,
    backlog: VecDeque<LogEntry>,
}

struct HubInner {
    config: LogHubConfig,
    clock: Arc<dyn Clock>,
    sender: broadcast::Sender<LogEntry>,
    state: Mutex<HubState>,
    followers: Arc<AtomicUsize>,
}

/// Fan-out point for job log entries.
///
/// Publishing never waits on followers: each follower reads from its own
/// broadcast receiver and a follower that falls behind loses entries.
#[derive(Clone)]
pub struct LogHub {
    inner: Arc<HubInner>,
}

impl LogHub {
    pub fn new(config: LogHubConfig, clock: Arc<dyn Clock>) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            inner: Arc::new(HubInner {
                clock,
                sender,
                state: Mutex::new(HubState {
                    next_seq: 1,
                    backlog: VecDeque::with_capacity(config.backlog),
                }),
                followers: Arc::new(AtomicUsize::new(0)),
                config,
            }),
        }
    }

    /// Append an entry to the backlog and deliver it to every follower.
    pub fn publish(
        &self,
        severity: Severity,
        message: impl Into<String>,
        job_id: Option<JobId>,
    ) -> LogEntry {
        let mut state = self.lock_state();
        let entry = LogEntry {
            seq: state.next_seq,
            timestamp: self.inner.clock.now(),
            severity,
            message: message.into(),
            job_id,
        };
        state.next_seq += 1;
        if self.inner.config.backlog > 0 {
            if state.backlog.len() == self.inner.config.backlog {
                state.backlog.pop_front();
            }
            state.backlog.push_back(entry.clone());
        }
        // No receivers is fine.
        let _ = self.inner.sender.send(entry.clone());
        entry
    }

    /// Start following: the current backlog, then live entries.
    pub fn subscribe(&self) -> JobResult<LogSubscription> {
        let max = self.inner.config.max_followers;
        let claimed = self
            .inner
            .followers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            });
        if claimed.is_err() {
            return Err(JobError::TooManyFollowers(max));
        }
        let slot = FollowerSlot {
            followers: Arc::clone(&self.inner.followers),
        };

        // Snapshot and receiver are taken under the same lock as publish, so
        // no entry is both replayed and received, and none falls in between.
        let state = self.lock_state();
        let backlog = state.backlog.clone();
        let receiver = self.inner.sender.subscribe();
        drop(state);

        debug!(followers = self.follower_count(), "log follower subscribed");
        Ok(LogSubscription {
            backlog,
            receiver,
            clock: Arc::clone(&self.inner.clock),
            _slot: slot,
        })
    }

    /// Entries currently held in the backlog, oldest first.
    pub fn recent(&self) -> Vec<LogEntry> {
        self.lock_state().backlog.iter().cloned().collect()
    }

    pub fn follower_count(&self) -> usize {
        self.inner.followers.load(Ordering::Acquire)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, HubState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for LogHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHub")
            .field("config", &self.inner.config)
            .field("followers", &self.follower_count())
            .finish()
    }
}

/// Releases a follower slot when the subscription is dropped. Holds only
/// the counter so a subscription does not keep the channel open.
struct FollowerSlot {
    followers: Arc<AtomicUsize>,
}

impl Drop for FollowerSlot {
    fn drop(&mut self) {
        self.followers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A follower's view of the log: backlog first, then live entries.
pub struct LogSubscription {
    backlog: VecDeque<LogEntry>,
    receiver: broadcast::Receiver<LogEntry>,
    clock: Arc<dyn Clock>,
    _slot: FollowerSlot,
}

impl LogSubscription {
    /// The next entry, or `None` once the hub is gone.
    ///
    /// A follower that fell behind gets a warning entry saying how many
    /// entries it lost, then continues with the oldest one still buffered.
    pub async fn next(&mut self) -> Option<LogEntry> {
        if let Some(entry) = self.backlog.pop_front() {
            return Some(entry);
        }
        match self.receiver.recv().await {
            Ok(entry) => Some(entry),
            Err(RecvError::Lagged(skipped)) => Some(LogEntry {
                seq: 0,
                timestamp: self.clock.now(),
                severity: Severity::Warn,
                message: format!("{skipped} log entries dropped"),
                job_id: None,
            }),
            Err(RecvError::Closed) => None,
        }
    }
}

impl fmt::Debug for LogSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSubscription")
            .field("pending_backlog", &self.backlog.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn hub(config: LogHubConfig) -> LogHub {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        LogHub::new(config, Arc::new(clock))
    }

    #[tokio::test]
    async fn late_subscriber_gets_bounded_backlog_then_live() {
        let hub = hub(LogHubConfig {
            backlog: 2,
            ..LogHubConfig::default()
        });
        hub.publish(Severity::Info, "one", None);
        hub.publish(Severity::Info, "two", None);
        hub.publish(Severity::Info, "three", None);

        let mut sub = hub.subscribe().unwrap();
        hub.publish(Severity::Error, "four", None);

        let seen: Vec<String> = [
            sub.next().await.unwrap(),
            sub.next().await.unwrap(),
            sub.next().await.unwrap(),
        ]
        .into_iter()
        .map(|e| e.message)
        .collect();
        assert_eq!(seen, ["two", "three", "four"]);
    }

    #[tokio::test]
    async fn sequence_numbers_increase() {
        let hub = hub(LogHubConfig::default());
        let a = hub.publish(Severity::Info, "a", None);
        let b = hub.publish(Severity::Info, "b", Some(JobId::new()));
        assert_eq!(a.seq, 1);
        assert_eq!(b.seq, 2);
        assert_eq!(hub.recent().len(), 2);
    }

    #[tokio::test]
    async fn follower_limit_is_enforced_and_released() {
        let hub = hub(LogHubConfig {
            max_followers: 1,
            ..LogHubConfig::default()
        });
        let first = hub.subscribe().unwrap();
        assert!(matches!(
            hub.subscribe(),
            Err(JobError::TooManyFollowers(1))
        ));
        drop(first);
        assert_eq!(hub.follower_count(), 0);
        assert!(hub.subscribe().is_ok());
    }

    #[tokio::test]
    async fn slow_follower_is_told_what_it_lost() {
        let hub = hub(LogHubConfig {
            backlog: 0,
            channel_capacity: 2,
            max_followers: 4,
        });
        let mut sub = hub.subscribe().unwrap();
        for i in 0..5 {
            hub.publish(Severity::Info, format!("entry {i}"), None);
        }
        let notice = sub.next().await.unwrap();
        assert_eq!(notice.severity, Severity::Warn);
        assert_eq!(notice.message, "3 log entries dropped");
        assert_eq!(sub.next().await.unwrap().message, "entry 3");
        assert_eq!(sub.next().await.unwrap().message, "entry 4");
    }

    #[tokio::test]
    async fn subscription_ends_when_hub_is_dropped() {
        let hub = hub(LogHubConfig::default());
        let mut sub = hub.subscribe().unwrap();
        drop(hub);
        assert!(sub.next().await.is_none());
    }
}
