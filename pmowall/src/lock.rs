//! Advisory lock guarding one optimistic field against stale poll results.
//!
//! A poll takes a [`LockTicket`] *before* its request is dispatched and hands
//! it back to [`OptimisticLock::admit`] once the response arrives. The ticket
//! records the acquisition epoch, so a poll that was already in flight when a
//! new command acquired the lock can neither overwrite the field nor release
//! the lock.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    /// A command owns the field; polls must not touch it.
    Locked,
    /// The command finished; the next admitted poll wins and releases.
    ReleasablePendingOneCycle { marked_at: Instant },
}

/// Snapshot taken before a poll dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockTicket {
    epoch: u64,
    admits: bool,
    releases: bool,
}

#[derive(Clone, Debug)]
pub struct OptimisticLock {
    state: LockState,
    epoch: u64,
    fallback: Option<Duration>,
}

impl Default for OptimisticLock {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimisticLock {
    pub fn new() -> Self {
        Self {
            state: LockState::Unlocked,
            epoch: 0,
            fallback: None,
        }
    }

    /// Lock that force-unlocks once it has stayed releasable for `fallback`
    /// without a poll consuming it.
    pub fn with_fallback(fallback: Duration) -> Self {
        Self {
            fallback: Some(fallback),
            ..Self::new()
        }
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.state == LockState::Locked
    }

    /// Unlocked/Releasable -> Locked. Re-acquiring while locked is accepted.
    pub fn acquire(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.state = LockState::Locked;
    }

    /// Locked -> Releasable. No effect in any other state.
    pub fn mark_releasable(&mut self, now: Instant) {
        if self.state == LockState::Locked {
            self.state = LockState::ReleasablePendingOneCycle { marked_at: now };
        }
    }

    pub fn force_unlock(&mut self) {
        self.state = LockState::Unlocked;
    }

    /// Applies the time-based fallback release, if any.
    pub fn expire(&mut self, now: Instant) {
        if let (Some(fallback), LockState::ReleasablePendingOneCycle { marked_at }) =
            (self.fallback, self.state)
        {
            if now.saturating_duration_since(marked_at) >= fallback {
                self.state = LockState::Unlocked;
            }
        }
    }

    pub fn ticket(&mut self, now: Instant) -> LockTicket {
        self.expire(now);
        LockTicket {
            epoch: self.epoch,
            admits: self.state != LockState::Locked,
            releases: matches!(self.state, LockState::ReleasablePendingOneCycle { .. }),
        }
    }

    /// Decides whether the poll that took `ticket` may overwrite the guarded
    /// field, releasing the lock when the ticket was taken while releasable.
    pub fn admit(&mut self, ticket: LockTicket) -> bool {
        if ticket.epoch != self.epoch || !ticket.admits {
            return false;
        }
        if ticket.releases {
            self.state = LockState::Unlocked;
        }
        true
    }
}
