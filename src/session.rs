// In-memory session store: one session per run, holding the key/value state the
// instruction is rendered from and the final outcome of the run.
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use strum_macros::Display;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::SessionError;
use crate::market::MarketProposal;

pub type State = Map<String, Value>;

pub const TODAY_KEY: &str = "today";
pub const CATEGORY_KEY: &str = "category";
pub const CATEGORIES_KEY: &str = "categories";
pub const USER_NAME_KEY: &str = "user_name";
// The accepted proposal is mirrored into state under this key.
pub const PROPOSAL_KEY: &str = "proposal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum SessionStatus {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SessionEventKind {
    Created,
    StateUpdated { key: String },
    ResultRecorded { status: SessionStatus },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEvent {
    pub at: DateTime<Utc>,
    pub kind: SessionEventKind,
}

impl SessionEvent {
    fn now(kind: SessionEventKind) -> Self {
        Self { at: Utc::now(), kind }
    }
}

// What a run ended with.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Accepted(MarketProposal),
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub app_name: String,
    pub user_id: String,
    pub state: State,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub result: Option<MarketProposal>,
    pub failure: Option<String>,
    pub events: Vec<SessionEvent>,
}

impl Session {
    pub fn today(&self) -> Result<NaiveDate, SessionError> {
        reference_date(&self.state)
    }
}

/// Reads the `today` reference date from a state mapping.
pub fn reference_date(state: &State) -> Result<NaiveDate, SessionError> {
    let today = state
        .get(TODAY_KEY)
        .ok_or_else(|| SessionError::MissingKey(TODAY_KEY.to_string()))?;
    let text = today
        .as_str()
        .ok_or_else(|| SessionError::InvalidToday(today.to_string()))?;
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|_| SessionError::InvalidToday(text.to_string()))
}

fn check_required_keys(state: &State) -> Result<(), SessionError> {
    reference_date(state)?;
    if !state.contains_key(CATEGORY_KEY) && !state.contains_key(CATEGORIES_KEY) {
        return Err(SessionError::MissingKey(format!(
            "{} or {}",
            CATEGORY_KEY, CATEGORIES_KEY
        )));
    }
    Ok(())
}

/// Cheaply cloneable handle to the sessions of this process.
///
/// Each session is written by one run at a time; concurrent writers to the
/// same session get last-write-wins semantics.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(
        &self,
        app_name: &str,
        user_id: &str,
        initial_state: State,
    ) -> Result<Session, SessionError> {
        check_required_keys(&initial_state)?;

        let session = Session {
            id: Uuid::new_v4(),
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            state: initial_state,
            created_at: Utc::now(),
            status: SessionStatus::Pending,
            result: None,
            failure: None,
            events: vec![SessionEvent::now(SessionEventKind::Created)],
        };

        log::info!("Created session {} for {}", session.id, session.user_id);
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Result<Session, SessionError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    pub async fn sessions(&self) -> Vec<Uuid> {
        self.sessions.read().await.keys().copied().collect()
    }

    pub async fn set_state(&self, id: Uuid, key: &str, value: Value) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        if session.status.is_terminal() {
            return Err(SessionError::AlreadyFinished(id));
        }
        session.state.insert(key.to_string(), value);
        session.events.push(SessionEvent::now(SessionEventKind::StateUpdated {
            key: key.to_string(),
        }));
        Ok(())
    }

    pub async fn record_result(
        &self,
        id: Uuid,
        outcome: SessionOutcome,
    ) -> Result<Session, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        if session.status.is_terminal() {
            return Err(SessionError::AlreadyFinished(id));
        }

        match outcome {
            SessionOutcome::Accepted(proposal) => {
                session
                    .state
                    .insert(PROPOSAL_KEY.to_string(), serde_json::to_value(&proposal)?);
                session.result = Some(proposal);
                session.status = SessionStatus::Succeeded;
            }
            SessionOutcome::Failed(reason) => {
                session.failure = Some(reason);
                session.status = SessionStatus::Failed;
            }
            SessionOutcome::Cancelled => {
                session.failure = Some("cancelled".to_string());
                session.status = SessionStatus::Cancelled;
            }
        }

        session.events.push(SessionEvent::now(SessionEventKind::ResultRecorded {
            status: session.status,
        }));
        log::info!("Session {} finished: {}", id, session.status);
        Ok(session.clone())
    }
}
