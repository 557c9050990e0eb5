//! Question countdown and session expiry timers.
//!
//! Timers never mutate session state themselves. Each one is a spawned task
//! that sleeps and then sends an ordinary [`ServerMessage`] back into the main
//! event loop, so a fire is processed like any other inbound event and can be
//! checked against the session's current state before it takes effect.

use crate::network::ServerMessage;
use log::debug;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Where a session stands in its question cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionPhase {
    /// No question in flight (pre-start, between finalize and expiry).
    Idle,
    /// A question has been broadcast and its countdown is running.
    Open,
    /// The countdown elapsed and the correct option was revealed.
    Closed,
}

/// Owned handle to a pending question deadline.
///
/// At most one of these may exist per session. Dropping the handle aborts the
/// underlying task, so replacing a session's handle is sufficient to guarantee
/// two deadlines for the same session never coexist.
#[derive(Debug)]
pub struct DeadlineHandle {
    handle: JoinHandle<()>,
}

impl DeadlineHandle {
    /// Stops the pending fire. Dropping the handle has the same effect.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for DeadlineHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Arms the one-shot countdown for an open question. The fire carries the
/// question index so a stale deadline can be recognized and ignored.
pub fn arm_question_deadline(
    tx: UnboundedSender<ServerMessage>,
    code: String,
    index: usize,
    secs: u64,
) -> DeadlineHandle {
    debug!("Arming {}s deadline for question {} of {}", secs, index, code);
    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        let _ = tx.send(ServerMessage::QuestionDeadline { code, index });
    });
    DeadlineHandle { handle }
}

/// Schedules removal of a finished session after the grace window. This timer
/// is deliberately not cancellable; the fire handler no-ops if the session is
/// already gone.
pub fn schedule_expiry(tx: UnboundedSender<ServerMessage>, code: String, secs: u64) {
    debug!("Session {} will be removed in {}s", code, secs);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        let _ = tx.send(ServerMessage::SessionExpired { code });
    });
}
