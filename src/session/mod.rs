//! Local login session.
//!
//! [`Session`] is the one owner of "who is signed in" for the process, handed
//! to whatever needs the role. It is persisted in a small JSON file so the
//! CLI keeps its login between invocations. The role is not verified against
//! anything: whoever can edit the file can claim admin.
//!
//! Activity in other processes reaches a long-running session through the
//! file: [`Session::record_activity`] rewrites it and [`Session::sync_at`]
//! notices the new modification time, reloading the user and restarting the
//! idle timer.

pub mod login;
pub mod store;

pub use login::{LoginFlow, LoginRecord, LoginStep};
pub use store::SessionStore;

use crate::error::Result;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    #[default]
    Guest,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub name: String,
    #[serde(default)]
    pub role: Role,
}

pub struct Session {
    store: SessionStore,
    user: RwLock<Option<SessionUser>>,
    last_activity: Mutex<Instant>,
    /// Modification time of the session file as last seen by this process
    seen_mark: Mutex<Option<SystemTime>>,
    idle_timeout: Duration,
}

impl Session {
    /// Restore the session persisted in `store`, if any.
    pub fn open(store: SessionStore, idle_timeout: Duration) -> Self {
        let user = store.load();
        let mark = store.modified();
        Self {
            store,
            user: RwLock::new(user),
            last_activity: Mutex::new(Instant::now()),
            seen_mark: Mutex::new(mark),
            idle_timeout,
        }
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.user.read().clone()
    }

    /// Role of the signed-in user; guest when nobody is.
    pub fn role(&self) -> Role {
        self.user.read().as_ref().map(|u| u.role).unwrap_or_default()
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Role::Admin
    }

    pub fn sign_in(&self, user: SessionUser) -> Result<()> {
        self.store.save(&user)?;
        *self.seen_mark.lock() = self.store.modified();
        info!("[Session] Signed in {} as {}", user.name, user.role);
        *self.user.write() = Some(user);
        self.touch();
        Ok(())
    }

    pub fn sign_out(&self) -> Result<()> {
        self.store.clear()?;
        *self.seen_mark.lock() = None;
        if let Some(user) = self.user.write().take() {
            info!("[Session] Signed out {}", user.name);
        }
        Ok(())
    }

    /// Record user activity, restarting the idle timer.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Record activity and leave the mark in the session file so other
    /// processes see it. Without a signed-in user only the timer restarts.
    pub fn record_activity(&self) -> Result<()> {
        self.touch();
        let user = self.user.read().clone();
        if let Some(user) = user {
            self.store.save(&user)?;
            *self.seen_mark.lock() = self.store.modified();
        }
        Ok(())
    }

    /// Pick up changes another process made to the session file. A newer
    /// file reloads the user and counts as activity at `now`; a removed file
    /// signs this process out. Returns whether anything changed.
    pub fn sync_at(&self, now: Instant) -> bool {
        let mark = self.store.modified();
        {
            let mut seen = self.seen_mark.lock();
            if *seen == mark {
                return false;
            }
            *seen = mark;
        }
        let user = self.store.load();
        debug!(
            "[Session] Session file changed, now {}",
            user.as_ref().map(|u| u.name.as_str()).unwrap_or("signed out")
        );
        *self.user.write() = user;
        if mark.is_some() {
            *self.last_activity.lock() = now;
        }
        true
    }

    /// Time left before an idle logout, as of `now`.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        let idle = now.saturating_duration_since(*self.last_activity.lock());
        self.idle_timeout.saturating_sub(idle)
    }

    /// Sign out if the session has been idle for the whole timeout.
    /// Returns whether a user was signed out.
    pub fn expire_if_idle_at(&self, now: Instant) -> Result<bool> {
        if self.user.read().is_none() || !self.remaining_at(now).is_zero() {
            return Ok(false);
        }
        info!(
            "[Session] Idle for {} minutes, logging out",
            self.idle_timeout.as_secs() / 60
        );
        self.sign_out()?;
        Ok(true)
    }
}

/// Check for outside activity and idleness once per second until `cancel`
/// fires.
pub async fn run_idle_logout(session: Arc<Session>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let now = Instant::now();
                session.sync_at(now);
                if let Err(e) = session.expire_if_idle_at(now) {
                    log::error!("[Session] Idle logout failed: {}", e);
                }
            }
        }
    }
}
