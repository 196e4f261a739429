//! Turn Context
//!
//! Everything the hooks share for the lifetime of one agent turn: who the turn
//! belongs to, the cumulative usage snapshot, the report ledger and a small
//! keyed state map the host can read after the turn.
//!
//! A context is created by the host at turn start and shared by `Arc` with
//! every call site that runs inside the turn.

use crate::ledger::TurnLedger;
use crate::usage::UsageSnapshotStore;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// State key under which the rendered performance report is stored
pub const LAST_PERFORMANCE_REPORT: &str = "last_performance_report";

/// Identity stamped on every report of a turn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnIdentity {
    /// End user
    pub user_id: Option<String>,
    /// Conversation session
    pub session_id: Option<String>,
    /// Agent invocation
    pub invocation_id: Option<String>,
}

impl TurnIdentity {
    /// Identity with all three ids set
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        invocation_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: Some(user_id.into()),
            session_id: Some(session_id.into()),
            invocation_id: Some(invocation_id.into()),
        }
    }
}

/// Turn-scoped shared state
#[derive(Debug, Default)]
pub struct TurnContext {
    identity: TurnIdentity,
    snapshot: UsageSnapshotStore,
    ledger: TurnLedger,
    state: Mutex<HashMap<String, Value>>,
}

impl TurnContext {
    /// Create a context for a new turn
    #[must_use]
    pub fn new(identity: TurnIdentity) -> Self {
        Self {
            identity,
            ..Self::default()
        }
    }

    /// Turn identity
    #[must_use]
    pub fn identity(&self) -> &TurnIdentity {
        &self.identity
    }

    /// End user id
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.identity.user_id.as_deref()
    }

    /// Session id
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.identity.session_id.as_deref()
    }

    /// Invocation id
    #[must_use]
    pub fn invocation_id(&self) -> Option<&str> {
        self.identity.invocation_id.as_deref()
    }

    /// Cumulative usage counters of this turn
    #[must_use]
    pub fn snapshot(&self) -> &UsageSnapshotStore {
        &self.snapshot
    }

    /// Report buffer of this turn
    #[must_use]
    pub fn ledger(&self) -> &TurnLedger {
        &self.ledger
    }

    /// Store a transient value
    pub async fn set_state(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.state.lock().await.insert(key.into(), value.into());
    }

    /// Read a transient value
    pub async fn state(&self, key: &str) -> Option<Value> {
        self.state.lock().await.get(key).cloned()
    }
}
