//! Observable authentication state.
//!
//! [`AuthSessionState`] is an explicitly constructed container shared by
//! handle. Observers are plain callbacks run outside the state lock, so an
//! observer may read the state, subscribe, unsubscribe (itself included) or
//! even set the state while being notified.
//!
//! Snapshots are queued in transition order while the state lock is held and
//! delivered by one drainer at a time. Observers therefore see transitions in
//! the order they happened, and the last snapshot delivered is always the
//! current state. A `set` that races a drainer on another thread returns
//! once its snapshot is queued; the drainer delivers it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::debug;

use crate::types::UserProfile;

/// Where the client stands with respect to the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Anonymous,
    Loading,
    Authenticated(UserProfile),
    Guest(UserProfile),
    Error(String),
}

impl AuthState {
    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            AuthState::Authenticated(user) | AuthState::Guest(user) => Some(user),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        let user = self.user().cloned();
        AuthSnapshot {
            is_authenticated: user.is_some(),
            user,
            is_loading: matches!(self, AuthState::Loading),
            error: match self {
                AuthState::Error(message) => Some(message.clone()),
                _ => None,
            },
        }
    }
}

/// Flat view of [`AuthState`] for presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AuthSnapshot {
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl AuthSnapshot {
    pub fn is_guest(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.is_guest)
    }
}

/// Handle returned by [`AuthSessionState::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(&AuthSnapshot) + Send + Sync>;

/// Snapshots waiting for delivery.
#[derive(Default)]
struct Outbox {
    pending: VecDeque<AuthSnapshot>,
    draining: bool,
}

// Lock order: `state` before `outbox`.
#[derive(Default)]
struct Inner {
    state: Mutex<AuthState>,
    outbox: Mutex<Outbox>,
    observers: Mutex<Vec<(SubscriptionId, Observer)>>,
    next_id: AtomicU64,
}

/// Current [`AuthState`] plus its observers.
#[derive(Clone, Default)]
pub struct AuthSessionState {
    inner: Arc<Inner>,
}

impl AuthSessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> AuthState {
        lock(&self.inner.state).clone()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        lock(&self.inner.state).snapshot()
    }

    /// Replaces the state and notifies every observer.
    pub fn set(&self, next: AuthState) {
        {
            let mut state = lock(&self.inner.state);
            debug!(from = discriminant_name(&*state), to = discriminant_name(&next), "Auth state transition");
            *state = next;
            lock(&self.inner.outbox).pending.push_back(state.snapshot());
        }
        self.drain();
    }

    pub fn subscribe(&self, observer: impl Fn(&AuthSnapshot) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.observers).push((id, Arc::new(observer)));
        id
    }

    /// Removes an observer. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = lock(&self.inner.observers);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.inner.observers).len()
    }

    /// Delivers queued snapshots unless another call is already doing so.
    fn drain(&self) {
        {
            let mut outbox = lock(&self.inner.outbox);
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }

        loop {
            let next = {
                let mut outbox = lock(&self.inner.outbox);
                let next = outbox.pending.pop_front();
                if next.is_none() {
                    outbox.draining = false;
                }
                next
            };
            match next {
                Some(snapshot) => self.notify(&snapshot),
                None => break,
            }
        }
    }

    fn notify(&self, snapshot: &AuthSnapshot) {
        let observers: Vec<Observer> = lock(&self.inner.observers)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer(snapshot);
        }
    }
}

impl std::fmt::Debug for AuthSessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSessionState")
            .field("state", &self.current())
            .field("observers", &self.observer_count())
            .finish()
    }
}

fn discriminant_name(state: &AuthState) -> &'static str {
    match state {
        AuthState::Anonymous => "anonymous",
        AuthState::Loading => "loading",
        AuthState::Authenticated(_) => "authenticated",
        AuthState::Guest(_) => "guest",
        AuthState::Error(_) => "error",
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
