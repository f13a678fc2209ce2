//! Small named values that must survive a restart: who the player is, and how far they got.
//!
//! Values are kept the way the web client kept cookies: each one independent, each with its own
//! expiry. [`Session`] is built once at startup and shared with both controllers.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::COOKIE_MAX_AGE;
use crate::error::StoreError;
use crate::model::types::Identity;

pub const MEMBER_KEY: &str = "member";
pub const TEAM_KEY: &str = "team";
pub const TEAMMATE_KEY: &str = "teammate";
pub const LAST_ANSWERED_KEY: &str = "lastAnsweredQuestionNumber";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValue {
    pub value: String,
    pub expires: DateTime<Utc>,
}

impl StoredValue {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires > now
    }
}

/// Named string values with an expiry. Writes are durable once `set` returns.
pub trait CookieStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str, max_age: Duration) -> Result<(), StoreError>;
    fn remove(&self, name: &str) -> Result<(), StoreError>;
}

fn expiry_from_now(max_age: Duration) -> DateTime<Utc> {
    let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
    Utc::now()
        .checked_add_signed(max_age)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps values in a JSON file, rewritten on every change.
pub struct FileCookieStore {
    path: PathBuf,
    values: Mutex<HashMap<String, StoredValue>>,
}

impl FileCookieStore {
    /// Open the cookie file, or start empty if it does not exist yet.
    /// Expired values are dropped on load.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut values: HashMap<String, StoredValue> = match std::fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => HashMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No session file at {}, starting fresh", path.display());
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };
        let now = Utc::now();
        values.retain(|name, stored| {
            let live = stored.is_live(now);
            if !live {
                debug!("Dropping expired value {name}");
            }
            live
        });
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &HashMap<String, StoredValue>) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CookieStore for FileCookieStore {
    fn get(&self, name: &str) -> Option<String> {
        let values = lock(&self.values);
        values
            .get(name)
            .filter(|stored| stored.is_live(Utc::now()))
            .map(|stored| stored.value.clone())
    }

    // Both writers flush a copy first, so a failed write leaves memory matching the disk.
    fn set(&self, name: &str, value: &str, max_age: Duration) -> Result<(), StoreError> {
        let mut values = lock(&self.values);
        let now = Utc::now();
        let mut updated: HashMap<_, _> = values
            .iter()
            .filter(|(_, stored)| stored.is_live(now))
            .map(|(name, stored)| (name.clone(), stored.clone()))
            .collect();
        updated.insert(
            name.to_string(),
            StoredValue {
                value: value.to_string(),
                expires: expiry_from_now(max_age),
            },
        );
        self.flush(&updated)?;
        *values = updated;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        let mut values = lock(&self.values);
        if !values.contains_key(name) {
            return Ok(());
        }
        let mut updated = values.clone();
        updated.remove(name);
        self.flush(&updated)?;
        *values = updated;
        Ok(())
    }
}

/// In-process store, for tests and for running without a session file.
#[derive(Default)]
pub struct MemoryCookieStore {
    values: Mutex<HashMap<String, StoredValue>>,
}

impl MemoryCookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value that already expired, as if it was written long ago.
    pub fn insert_expired(&self, name: &str, value: &str) {
        lock(&self.values).insert(
            name.to_string(),
            StoredValue {
                value: value.to_string(),
                expires: Utc::now() - chrono::Duration::seconds(1),
            },
        );
    }
}

impl CookieStore for MemoryCookieStore {
    fn get(&self, name: &str) -> Option<String> {
        lock(&self.values)
            .get(name)
            .filter(|stored| stored.is_live(Utc::now()))
            .map(|stored| stored.value.clone())
    }

    fn set(&self, name: &str, value: &str, max_age: Duration) -> Result<(), StoreError> {
        lock(&self.values).insert(
            name.to_string(),
            StoredValue {
                value: value.to_string(),
                expires: expiry_from_now(max_age),
            },
        );
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        lock(&self.values).remove(name);
        Ok(())
    }
}

/// The one place both controllers go through to read or move the persisted state.
pub struct Session {
    store: Arc<dyn CookieStore>,
    identity: Option<Identity>,
    // Serialises read-compare-write of the progress marker.
    progress: Mutex<()>,
}

impl Session {
    /// Read the identity once; it does not change for the life of the session.
    pub fn load(store: Arc<dyn CookieStore>) -> Self {
        let identity = match (
            store.get(MEMBER_KEY),
            store.get(TEAM_KEY),
            store.get(TEAMMATE_KEY),
        ) {
            (Some(member), Some(team), Some(teammate))
                if !member.is_empty() && !team.is_empty() && !teammate.is_empty() =>
            {
                Some(Identity {
                    member,
                    team,
                    teammate,
                })
            }
            _ => None,
        };
        match &identity {
            Some(identity) => info!(
                "Session for {} (team {}, teammate {})",
                identity.member, identity.team, identity.teammate
            ),
            None => info!("No stored identity"),
        }
        Self {
            store,
            identity,
            progress: Mutex::new(()),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Persist a freshly redeemed identity. Takes effect for sessions loaded afterwards.
    pub fn save_identity(store: &dyn CookieStore, identity: &Identity) -> Result<(), StoreError> {
        store.set(MEMBER_KEY, &identity.member, COOKIE_MAX_AGE)?;
        store.set(TEAMMATE_KEY, &identity.teammate, COOKIE_MAX_AGE)?;
        store.set(TEAM_KEY, &identity.team, COOKIE_MAX_AGE)?;
        info!("Stored identity for {}", identity.member);
        Ok(())
    }

    /// Forget identity and progress.
    pub fn clear(store: &dyn CookieStore) -> Result<(), StoreError> {
        for key in [MEMBER_KEY, TEAM_KEY, TEAMMATE_KEY, LAST_ANSWERED_KEY] {
            store.remove(key)?;
        }
        Ok(())
    }

    /// Highest question number answered so far; 0 when nothing is stored or it is unreadable.
    pub fn last_answered(&self) -> u32 {
        match self.store.get(LAST_ANSWERED_KEY) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring unreadable {LAST_ANSWERED_KEY} value {raw:?}");
                0
            }),
            None => 0,
        }
    }

    /// Move the progress marker up to `question_number`, never down.
    ///
    /// Compares against the stored value at the moment of writing, so racing callers cannot
    /// lower it. Returns whether the marker moved.
    pub fn raise_last_answered(&self, question_number: u32) -> Result<bool, StoreError> {
        let _guard = lock(&self.progress);
        let current = self.last_answered();
        if question_number <= current {
            debug!("Progress stays at {current}, not lowering to {question_number}");
            return Ok(false);
        }
        self.store.set(
            LAST_ANSWERED_KEY,
            &question_number.to_string(),
            COOKIE_MAX_AGE,
        )?;
        info!("Progress raised from {current} to {question_number}");
        Ok(true)
    }
}
