//! Background persistence of wizard sections.
//!
//! Saves are sent to a single task that coalesces requests per (user, section) during a
//! debounce window and writes them with a bounded retry policy. Each key's window starts at
//! its first pending request; later requests replace the data without extending it.
//! Navigation never waits on the task.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::domain::{Section, UserId};
use super::repository::{RegistrationRepository, RepositoryError};
use crate::config::SavePolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub user: UserId,
    pub section: Section,
    pub data: Value,
}

/// Outcome of writing every pending section.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FlushReport {
    pub saved: usize,
    pub failed: Vec<FailedSave>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedSave {
    pub user: UserId,
    pub section: Section,
    pub attempts: u32,
    pub error: RepositoryError,
}

enum Command {
    Save(SaveRequest),
    Flush(oneshot::Sender<FlushReport>),
}

/// Cheap, cloneable sender side of the save task.
#[derive(Clone)]
pub struct SaveHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SaveHandle {
    /// Handle whose requests are only collected, for callers that persist by other means.
    pub fn detached() -> (Self, DetachedSaves) {
        let (commands, receiver) = mpsc::unbounded_channel();
        (Self { commands }, DetachedSaves { receiver })
    }

    /// Queues a save. Returns `false` when the save task is gone.
    pub fn enqueue(&self, request: SaveRequest) -> bool {
        let user = request.user.clone();
        let section = request.section;
        match self.commands.send(Command::Save(request)) {
            Ok(()) => true,
            Err(_) => {
                warn!(%user, section = section.key(), "save task stopped; section not queued");
                false
            }
        }
    }

    /// Writes every pending section now and waits for the result.
    pub async fn flush(&self) -> Option<FlushReport> {
        let (ack, report) = oneshot::channel();
        self.commands.send(Command::Flush(ack)).ok()?;
        report.await.ok()
    }
}

/// Receiving side of a detached handle.
pub struct DetachedSaves {
    receiver: mpsc::UnboundedReceiver<Command>,
}

impl DetachedSaves {
    pub fn drain(&mut self) -> Vec<SaveRequest> {
        let mut requests = Vec::new();
        while let Ok(command) = self.receiver.try_recv() {
            match command {
                Command::Save(request) => requests.push(request),
                Command::Flush(ack) => {
                    let _ = ack.send(FlushReport::default());
                }
            }
        }
        requests
    }
}

pub struct SaveScheduler;

impl SaveScheduler {
    /// Spawns the save task on the current tokio runtime.
    pub fn spawn<R>(repository: Arc<R>, policy: SavePolicy) -> (SaveHandle, JoinHandle<()>)
    where
        R: RegistrationRepository + 'static,
    {
        let (commands, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(repository, policy, receiver));
        (SaveHandle { commands }, task)
    }
}

type SaveKey = (UserId, Section);

struct PendingSave {
    due: Instant,
    data: Value,
}

type Pending = BTreeMap<SaveKey, PendingSave>;

async fn run<R>(
    repository: Arc<R>,
    policy: SavePolicy,
    mut receiver: mpsc::UnboundedReceiver<Command>,
) where
    R: RegistrationRepository + 'static,
{
    let mut pending = Pending::new();

    loop {
        let next_due = pending.values().map(|save| save.due).min();
        let command = match next_due {
            None => receiver.recv().await,
            Some(due) => tokio::select! {
                command = receiver.recv() => command,
                () = tokio::time::sleep_until(due) => {
                    let batch = take_due(&mut pending, Instant::now());
                    write_batch(repository.as_ref(), &policy, batch).await;
                    continue;
                }
            },
        };

        match command {
            Some(Command::Save(request)) => {
                match pending.entry((request.user, request.section)) {
                    Entry::Occupied(mut queued) => queued.get_mut().data = request.data,
                    Entry::Vacant(slot) => {
                        slot.insert(PendingSave {
                            due: Instant::now() + policy.debounce,
                            data: request.data,
                        });
                    }
                }
            }
            Some(Command::Flush(ack)) => {
                let report = write_batch(repository.as_ref(), &policy, take_all(&mut pending)).await;
                let _ = ack.send(report);
            }
            None => {
                write_batch(repository.as_ref(), &policy, take_all(&mut pending)).await;
                break;
            }
        }
    }
}

fn take_due(pending: &mut Pending, now: Instant) -> Vec<(SaveKey, Value)> {
    let (due, waiting): (Pending, Pending) = std::mem::take(pending)
        .into_iter()
        .partition(|(_, save)| save.due <= now);
    *pending = waiting;
    due.into_iter().map(|(key, save)| (key, save.data)).collect()
}

fn take_all(pending: &mut Pending) -> Vec<(SaveKey, Value)> {
    std::mem::take(pending)
        .into_iter()
        .map(|(key, save)| (key, save.data))
        .collect()
}

async fn write_batch<R>(
    repository: &R,
    policy: &SavePolicy,
    batch: Vec<(SaveKey, Value)>,
) -> FlushReport
where
    R: RegistrationRepository + ?Sized,
{
    let mut report = FlushReport::default();
    let max_attempts = policy.max_attempts.max(1);

    for ((user, section), data) in batch {
        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            match repository.save_section(section, &user, data.clone()) {
                Ok(()) => break Ok(()),
                Err(RepositoryError::Unavailable(reason)) if attempts < max_attempts => {
                    debug!(%user, section = section.key(), attempts, %reason, "retrying section save");
                    tokio::time::sleep(policy.backoff * attempts).await;
                }
                Err(err) => break Err(err),
            }
        };

        match outcome {
            Ok(()) => {
                debug!(%user, section = section.key(), attempts, "section saved");
                report.saved += 1;
            }
            Err(error) => {
                warn!(%user, section = section.key(), attempts, %error, "section save failed");
                report.failed.push(FailedSave {
                    user,
                    section,
                    attempts,
                    error,
                });
            }
        }
    }

    report
}
