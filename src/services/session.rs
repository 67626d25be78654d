//! Single-flight session establishment.
//!
//! The first caller of [`SessionManager::ensure_session`] starts authentication,
//! callers arriving while it is in flight await the same attempt, and later
//! callers get the cached session. A failed or timed-out attempt leaves the
//! manager empty so the next call tries again.
//!
//! The session is established once per process. Its bearer token is renewed
//! through [`Authenticator::refresh`] when it gets close to expiry or after
//! the remote side rejects it; renewal goes through the same single-flight path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::services::fetcher::FetchError;

/// Tokens this close to expiry are renewed before use.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Authenticated connection state to Earth Engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub project: String,
    pub established_at: DateTime<Utc>,
}

impl Session {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(REFRESH_MARGIN_SECS) >= self.expires_at
    }
}

/// Capability that talks to the identity provider.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Establishes a new session.
    async fn authenticate(&self) -> Result<Session, FetchError>;

    /// Issues a fresh bearer token for an established session.
    async fn refresh(&self, current: &Session) -> Result<Session, FetchError> {
        let _ = current;
        self.authenticate().await
    }
}

type SessionAttempt = Shared<BoxFuture<'static, Result<Arc<Session>, FetchError>>>;

enum Slot {
    Empty,
    Pending {
        attempt_id: u64,
        attempt: SessionAttempt,
        /// Session being renewed; restored if the renewal fails.
        previous: Option<Arc<Session>>,
    },
    Ready(Arc<Session>),
}

enum Step {
    Join(u64, SessionAttempt),
    Start(Option<Arc<Session>>),
}

pub struct SessionManager {
    authenticator: Arc<dyn Authenticator>,
    timeout: Duration,
    slot: Mutex<Slot>,
    next_attempt_id: AtomicU64,
    established: AtomicBool,
}

impl SessionManager {
    pub fn new(authenticator: Arc<dyn Authenticator>, timeout: Duration) -> Self {
        Self {
            authenticator,
            timeout,
            slot: Mutex::new(Slot::Empty),
            next_attempt_id: AtomicU64::new(0),
            established: AtomicBool::new(false),
        }
    }

    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }

    pub async fn ensure_session(&self) -> Result<Arc<Session>, FetchError> {
        let (attempt_id, attempt) = {
            let mut slot = self.slot.lock().await;
            let step = match &*slot {
                Slot::Ready(session) if !session.needs_refresh(Utc::now()) => {
                    return Ok(session.clone())
                }
                Slot::Ready(session) => Step::Start(Some(session.clone())),
                Slot::Pending {
                    attempt_id,
                    attempt,
                    ..
                } => Step::Join(*attempt_id, attempt.clone()),
                Slot::Empty => Step::Start(None),
            };
            match step {
                Step::Join(attempt_id, attempt) => (attempt_id, attempt),
                Step::Start(previous) => {
                    let attempt_id = self.next_attempt_id.fetch_add(1, Ordering::Relaxed);
                    let attempt = self.start_attempt(previous.clone());
                    *slot = Slot::Pending {
                        attempt_id,
                        attempt: attempt.clone(),
                        previous,
                    };
                    (attempt_id, attempt)
                }
            }
        };

        let outcome = attempt.await;

        let mut slot = self.slot.lock().await;
        let settled = match &*slot {
            Slot::Pending {
                attempt_id: current,
                previous,
                ..
            } if *current == attempt_id => Some(previous.clone()),
            _ => None,
        };
        if let Some(previous) = settled {
            *slot = match (&outcome, previous) {
                (Ok(session), None) => {
                    self.established.store(true, Ordering::Release);
                    tracing::info!(project = %session.project, "Earth Engine session established");
                    Slot::Ready(session.clone())
                }
                (Ok(session), Some(_)) => {
                    tracing::info!(
                        expires_at = %session.expires_at,
                        "Earth Engine access token renewed"
                    );
                    Slot::Ready(session.clone())
                }
                (Err(e), None) => {
                    tracing::warn!(error = %e, "Earth Engine session attempt failed");
                    Slot::Empty
                }
                (Err(e), Some(previous)) => {
                    tracing::warn!(error = %e, "Earth Engine token renewal failed");
                    Slot::Ready(previous)
                }
            };
        }

        outcome
    }

    /// Marks the token of `session` as expired so the next call renews it.
    ///
    /// No-op if the slot already holds a different session.
    pub async fn invalidate_token(&self, session: &Arc<Session>) {
        let mut slot = self.slot.lock().await;
        if matches!(&*slot, Slot::Ready(current) if Arc::ptr_eq(current, session)) {
            tracing::debug!("Earth Engine rejected the access token, scheduling renewal");
            *slot = Slot::Ready(Arc::new(Session {
                expires_at: Utc::now(),
                ..Session::clone(session)
            }));
        }
    }

    fn start_attempt(&self, previous: Option<Arc<Session>>) -> SessionAttempt {
        let authenticator = self.authenticator.clone();
        let timeout = self.timeout;
        async move {
            let attempt = async {
                match &previous {
                    Some(current) => authenticator.refresh(current).await,
                    None => authenticator.authenticate().await,
                }
            };
            match tokio::time::timeout(timeout, attempt).await {
                Ok(result) => result.map(Arc::new),
                Err(_) => Err(FetchError::Timeout(timeout)),
            }
        }
        .boxed()
        .shared()
    }
}
