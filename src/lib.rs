pub mod app;
pub mod backend;
pub mod category;
pub mod error;
pub mod logging;
pub mod market;
pub mod prompts;
pub mod retry;
pub mod session;
pub mod settings;
pub mod template;
pub mod validator;

// Re-export commonly used items for easier access
pub use app::{BetGenerator, BetRequest, BetRun};
pub use backend::{CommandBackend, GenerationClient, ScriptedBackend};
pub use error::{
    AppError, AttemptError, BackendError, ProposeError, SessionError, TemplateError,
    ValidationError, ValidationErrorKind,
};
pub use market::{MarketProposal, MarketType};
pub use retry::{AttemptResult, GenerationAttempt, Proposal, RetryController, RetryPolicy};
pub use session::{Session, SessionOutcome, SessionStatus, SessionStore, State};
pub use settings::Settings;
pub use template::render;
pub use validator::validate;
