// Orchestration of a single bet-generation run: choose a category, create the
// session, drive the retry controller and record the outcome.
use chrono::NaiveDate;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::GenerationClient;
use crate::category::is_valid_address;
use crate::error::{AppError, ProposeError};
use crate::prompts::BET_INSTRUCTION;
use crate::retry::{Proposal, RetryController};
use crate::session::{
    CATEGORIES_KEY, CATEGORY_KEY, SessionOutcome, SessionStore, State, TODAY_KEY, USER_NAME_KEY,
};
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub struct BetRequest {
    pub category: Option<String>, // Skips the weighted draw when set.
    pub user_id: Option<String>,
    pub today: NaiveDate,
}

impl BetRequest {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            category: None,
            user_id: None,
            today,
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

#[derive(Debug)]
pub struct BetRun {
    pub session_id: Uuid,
    pub outcome: Result<Proposal, ProposeError>,
}

pub struct BetGenerator<B> {
    settings: Settings,
    backend: B,
    store: SessionStore,
    template: String,
    cancellation: CancellationToken,
}

impl<B: GenerationClient> BetGenerator<B> {
    pub fn new(settings: Settings, backend: B) -> Self {
        Self {
            settings,
            backend,
            store: SessionStore::new(),
            template: BET_INSTRUCTION.to_string(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn initial_state(&self, user_id: &str, category: &str, today: NaiveDate) -> State {
        let weights = self.settings.categories.for_user(user_id);
        let mut state = State::new();
        state.insert(USER_NAME_KEY.to_string(), Value::String(user_id.to_string()));
        state.insert(CATEGORY_KEY.to_string(), Value::String(category.to_string()));
        state.insert(
            TODAY_KEY.to_string(),
            Value::String(today.format("%Y-%m-%d").to_string()),
        );
        state.insert(CATEGORIES_KEY.to_string(), weights.to_state_value());
        state
    }

    /// Runs one proposal request end to end.
    ///
    /// Configuration problems (bad address, incomplete state) are returned as
    /// `Err`. Generation failures land in [`BetRun::outcome`] and are also
    /// recorded on the session.
    pub async fn run(&self, request: BetRequest) -> Result<BetRun, AppError> {
        let user_id = request
            .user_id
            .unwrap_or_else(|| self.settings.user_id.clone());
        if !is_valid_address(&user_id) {
            return Err(AppError::InvalidAddress(user_id));
        }

        let category = match request.category {
            Some(category) => category,
            None => {
                let mut rng = rand::rng();
                self.settings
                    .categories
                    .pick(&user_id, &mut rng)
                    .unwrap_or_else(|| "ELECTION".to_string())
            }
        };
        log::info!("Generating {} bet for {}", category, user_id);

        let state = self.initial_state(&user_id, &category, request.today);
        let session = self
            .store
            .create(&self.settings.app_name, &user_id, state)
            .await?;

        let controller = RetryController::new(self.settings.retry_policy())
            .with_cancellation(self.cancellation.clone());
        let outcome = controller
            .propose(&self.template, &session.state, &self.backend)
            .await;

        let recorded = match &outcome {
            Ok(accepted) => SessionOutcome::Accepted(accepted.proposal.clone()),
            Err(ProposeError::Cancelled { .. }) => SessionOutcome::Cancelled,
            Err(e) => SessionOutcome::Failed(e.to_string()),
        };
        self.store.record_result(session.id, recorded).await?;

        Ok(BetRun {
            session_id: session.id,
            outcome,
        })
    }
}
