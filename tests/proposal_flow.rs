// ../tests/proposal_flow.rs
use bet_generator::category::CategoryWeights;
use bet_generator::session::PROPOSAL_KEY;
use bet_generator::*;
use chrono::NaiveDate;
use serde_json::{Value, json};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const USER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).expect("Expected a valid date")
}

fn state() -> State {
    json!({
        "today": "2025-01-01",
        "category": "SPORTS",
        "categories": ["ELECTION", "SPORTS", "CRYPTO", "TV"]
    })
    .as_object()
    .expect("Expected a JSON object")
    .clone()
}

fn valid_reply() -> String {
    std::fs::read_to_string("tests/dummy_binary_market.json")
        .expect("Failed to read dummy binary market JSON file")
}

fn past_deadline_reply() -> String {
    valid_reply().replace("2025-06-01", "2024-12-01")
}

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        attempt_timeout: Duration::from_secs(60),
        backoff_base: Duration::from_millis(500),
        backoff_cap: Duration::from_secs(8),
    }
}

fn kinds(attempts: &[GenerationAttempt]) -> Vec<AttemptResult> {
    attempts.iter().map(|attempt| attempt.parse_result).collect()
}

#[tokio::test]
async fn test_malformed_replies_are_retried_until_valid() {
    let backend = ScriptedBackend::new(vec![
        Ok("Final Response: here is your market!".to_string()),
        Ok("{\"question\": \"Will it".to_string()),
        Ok(valid_reply()),
    ]);
    let controller = RetryController::new(policy(3));

    let accepted = controller
        .propose("Category: {category}", &state(), &backend)
        .await
        .expect("Expected the third attempt to be accepted");

    assert_eq!(accepted.proposal.question, "Will Team X win the Cup?");
    assert_eq!(
        kinds(&accepted.attempts),
        vec![
            AttemptResult::Malformed,
            AttemptResult::Malformed,
            AttemptResult::Valid
        ]
    );
    let numbers: Vec<u32> = accepted.attempts.iter().map(|a| a.attempt_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(backend.calls(), 3);
    assert_eq!(backend.prompts().await[0], "Category: SPORTS");
}

#[tokio::test]
async fn test_first_valid_reply_stops_generation() {
    let backend = ScriptedBackend::new(vec![Ok(valid_reply()), Ok("never used".to_string())]);
    let accepted = RetryController::new(policy(5))
        .propose("{category}", &state(), &backend)
        .await
        .unwrap();

    assert_eq!(accepted.attempts.len(), 1);
    assert_eq!(accepted.attempts[0].raw_response, valid_reply());
    assert_eq!(accepted.attempts[0].error_detail, None);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_past_deadline_exhausts_retries() {
    let backend = ScriptedBackend::always(past_deadline_reply());
    let err = RetryController::new(policy(3))
        .propose("{category}", &state(), &backend)
        .await
        .expect_err("Expected every attempt to be rejected");

    match &err {
        ProposeError::ExhaustedRetries {
            last_error,
            attempts,
        } => {
            assert_eq!(attempts.len(), 3);
            assert_eq!(kinds(attempts), vec![AttemptResult::SchemaViolation; 3]);
            assert!(
                attempts
                    .iter()
                    .all(|attempt| attempt.raw_response == past_deadline_reply())
            );
            match last_error {
                AttemptError::Validation(error) => {
                    assert_eq!(error.kind, ValidationErrorKind::DeadlineNotFuture)
                }
                other => panic!("Unexpected last error: {:?}", other),
            }
        }
        other => panic!("Unexpected error: {:?}", other),
    }
    assert_eq!(err.attempts().len(), 3);
    assert!(err.to_string().starts_with("Exhausted 3 attempts"));
    assert_eq!(backend.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_backend_failure_backs_off_then_recovers() {
    let backend = ScriptedBackend::new(vec![
        Err(BackendError::Unavailable("connection refused".to_string())),
        Err(BackendError::Unavailable("connection refused".to_string())),
        Ok(valid_reply()),
    ]);
    let started = tokio::time::Instant::now();

    let accepted = RetryController::new(policy(3))
        .propose("{category}", &state(), &backend)
        .await
        .unwrap();

    assert_eq!(
        kinds(&accepted.attempts),
        vec![
            AttemptResult::BackendFailure,
            AttemptResult::BackendFailure,
            AttemptResult::Valid
        ]
    );
    assert!(accepted.attempts[0].raw_response.is_empty());
    assert!(
        accepted.attempts[0]
            .error_detail
            .as_deref()
            .is_some_and(|detail| detail.contains("connection refused"))
    );
    // 500ms after the first failure, 1s after the second.
    assert!(started.elapsed() >= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn test_slow_backend_times_out_each_attempt() {
    let backend = ScriptedBackend::always(valid_reply()).with_delay(Duration::from_secs(120));
    let err = RetryController::new(policy(2))
        .propose("{category}", &state(), &backend)
        .await
        .unwrap_err();

    match err {
        ProposeError::ExhaustedRetries {
            last_error,
            attempts,
        } => {
            assert_eq!(last_error, AttemptError::Backend(BackendError::Timeout));
            assert_eq!(kinds(&attempts), vec![AttemptResult::BackendFailure; 2]);
            assert!(
                attempts
                    .iter()
                    .all(|attempt| attempt.elapsed >= Duration::from_secs(60))
            );
        }
        other => panic!("Unexpected error: {:?}", other),
    }
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_calls() {
    let token = CancellationToken::new();
    token.cancel();
    let backend = ScriptedBackend::always(valid_reply());

    let err = RetryController::new(policy(3))
        .with_cancellation(token)
        .propose("{category}", &state(), &backend)
        .await
        .unwrap_err();

    assert!(matches!(&err, ProposeError::Cancelled { attempts } if attempts.is_empty()));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_running_attempt() {
    let backend = ScriptedBackend::new(vec![
        Ok("not json at all".to_string()),
        Ok(valid_reply()),
    ])
    .with_delay(Duration::from_secs(30));
    let controller = RetryController::new(policy(3));
    let token = controller.cancellation_token();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(45)).await;
        token.cancel();
    });

    let err = controller
        .propose("{category}", &state(), &backend)
        .await
        .unwrap_err();

    match err {
        ProposeError::Cancelled { attempts } => {
            assert_eq!(kinds(&attempts), vec![AttemptResult::Malformed]);
        }
        other => panic!("Unexpected error: {:?}", other),
    }
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_backoff() {
    let backend = ScriptedBackend::new(vec![
        Err(BackendError::Unavailable("connection refused".to_string())),
        Ok(valid_reply()),
    ]);
    let controller = RetryController::new(RetryPolicy {
        backoff_base: Duration::from_secs(600),
        backoff_cap: Duration::from_secs(600),
        ..policy(3)
    });
    let token = controller.cancellation_token();
    let started = tokio::time::Instant::now();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();
    });

    let err = controller
        .propose("{category}", &state(), &backend)
        .await
        .unwrap_err();

    match err {
        ProposeError::Cancelled { attempts } => {
            assert_eq!(kinds(&attempts), vec![AttemptResult::BackendFailure]);
        }
        other => panic!("Unexpected error: {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(600));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_missing_variable_fails_before_generation() {
    let backend = ScriptedBackend::always(valid_reply());
    let err = RetryController::new(policy(3))
        .propose("Pick {category} for {user_name}", &state(), &backend)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProposeError::Template(TemplateError::MissingVariable(ref name)) if name == "user_name"
    ));
    assert!(err.attempts().is_empty());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_state_without_today_is_rejected() {
    let backend = ScriptedBackend::always(valid_reply());
    let mut state = state();
    state.remove("today");

    let err = RetryController::new(policy(3))
        .propose("{category}", &state, &backend)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProposeError::State(SessionError::MissingKey(ref key)) if key == "today"
    ));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_session_store_lifecycle() {
    let store = SessionStore::new();
    let session = store.create("Make Bet", USER, state()).await.unwrap();

    assert_eq!(session.status, SessionStatus::Pending);
    assert_eq!(session.today().unwrap(), today());
    assert_eq!(store.sessions().await, vec![session.id]);

    store
        .set_state(session.id, "user_name", Value::String(USER.to_string()))
        .await
        .unwrap();
    assert_eq!(store.get(session.id).await.unwrap().state["user_name"], USER);

    let proposal = validate(&valid_reply(), today()).unwrap();
    let finished = store
        .record_result(session.id, SessionOutcome::Accepted(proposal.clone()))
        .await
        .unwrap();
    assert_eq!(finished.status, SessionStatus::Succeeded);
    assert_eq!(finished.result, Some(proposal));
    assert_eq!(finished.state[PROPOSAL_KEY]["type"], "binary");
    assert_eq!(finished.events.len(), 3);

    let again = store
        .record_result(session.id, SessionOutcome::Failed("late".to_string()))
        .await;
    assert!(matches!(again, Err(SessionError::AlreadyFinished(id)) if id == session.id));

    let late_write = store
        .set_state(session.id, "category", json!("TV"))
        .await;
    assert!(matches!(late_write, Err(SessionError::AlreadyFinished(id)) if id == session.id));
    let unchanged = store.get(session.id).await.unwrap();
    assert_eq!(unchanged.state["category"], "SPORTS");
    assert_eq!(unchanged.events.len(), 3);
    assert_eq!(
        store.get(session.id).await.unwrap().status,
        SessionStatus::Succeeded
    );
}

#[tokio::test]
async fn test_session_store_rejects_incomplete_state() {
    let store = SessionStore::new();

    let mut no_category = state();
    no_category.remove("category");
    no_category.remove("categories");
    assert!(matches!(
        store.create("Make Bet", USER, no_category).await,
        Err(SessionError::MissingKey(_))
    ));

    let mut bad_today = state();
    bad_today.insert("today".to_string(), json!("January 1st"));
    assert!(matches!(
        store.create("Make Bet", USER, bad_today).await,
        Err(SessionError::InvalidToday(_))
    ));

    let mut categories_only = state();
    categories_only.remove("category");
    assert!(store.create("Make Bet", USER, categories_only).await.is_ok());

    let unknown = uuid::Uuid::new_v4();
    assert!(matches!(
        store.get(unknown).await,
        Err(SessionError::NotFound(id)) if id == unknown
    ));
}

#[tokio::test]
async fn test_bet_generator_records_accepted_proposal() {
    let generator = BetGenerator::new(Settings::default(), ScriptedBackend::always(valid_reply()));
    let run = generator
        .run(BetRequest::new(today()).category("SPORTS"))
        .await
        .unwrap();

    let accepted = run.outcome.as_ref().expect("Expected an accepted proposal");
    assert_eq!(accepted.attempts.len(), 1);

    let session = generator.store().get(run.session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Succeeded);
    assert_eq!(session.app_name, "Make Bet");
    assert_eq!(session.state["category"], "SPORTS");
    assert_eq!(session.state["user_name"], USER);
    assert_eq!(session.state["today"], "2025-01-01");
    assert_eq!(session.state[PROPOSAL_KEY]["question"], "Will Team X win the Cup?");

    let prompt = &generator.backend().prompts().await[0];
    assert!(prompt.contains("Use the category \"SPORTS\""));
    assert!(prompt.contains("Today is 2025-01-01."));
}

#[tokio::test]
async fn test_bet_generator_draws_category_from_user_preferences() {
    let mut settings = Settings::default();
    settings.categories.by_user.insert(
        USER.to_string(),
        CategoryWeights::from_pairs([("CRYPTO", 1.0), ("TV", 0.0)]),
    );
    let generator = BetGenerator::new(settings, ScriptedBackend::always(valid_reply()));

    let run = generator.run(BetRequest::new(today())).await.unwrap();

    let session = generator.store().get(run.session_id).await.unwrap();
    assert_eq!(session.state["category"], "CRYPTO");
    assert_eq!(session.state["categories"], json!(["CRYPTO", "TV"]));
}

#[tokio::test]
async fn test_bet_generator_records_failure() {
    let mut settings = Settings::default();
    settings.max_attempts = 2;
    let generator = BetGenerator::new(settings, ScriptedBackend::always(past_deadline_reply()));

    let run = generator.run(BetRequest::new(today())).await.unwrap();
    assert!(matches!(
        run.outcome,
        Err(ProposeError::ExhaustedRetries { ref attempts, .. }) if attempts.len() == 2
    ));

    let session = generator.store().get(run.session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert!(session.result.is_none());
    assert!(
        session
            .failure
            .as_deref()
            .is_some_and(|reason| reason.starts_with("Exhausted 2 attempts"))
    );
}

#[tokio::test]
async fn test_bet_generator_records_cancellation() {
    let token = CancellationToken::new();
    token.cancel();
    let generator = BetGenerator::new(Settings::default(), ScriptedBackend::always(valid_reply()))
        .with_cancellation(token);

    let run = generator.run(BetRequest::new(today())).await.unwrap();
    assert!(matches!(run.outcome, Err(ProposeError::Cancelled { .. })));

    let session = generator.store().get(run.session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert_eq!(generator.backend().calls(), 0);
}

#[tokio::test]
async fn test_bet_generator_rejects_invalid_address() {
    let generator = BetGenerator::new(Settings::default(), ScriptedBackend::always(valid_reply()));
    let result = generator
        .run(BetRequest::new(today()).user_id("not-an-address"))
        .await;

    assert!(matches!(result, Err(AppError::InvalidAddress(ref address)) if address == "not-an-address"));
    assert!(generator.store().sessions().await.is_empty());
}

#[cfg(unix)]
mod command_backend {
    use super::*;

    #[tokio::test]
    async fn test_prompt_is_passed_as_last_argument() {
        let backend = CommandBackend::new("echo").args(["agent:"]);
        let output = backend.generate("hello world").await.unwrap();
        assert_eq!(output, "agent: hello world\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_unavailable() {
        let backend = CommandBackend::new("sh").args(["-c", "echo quota exceeded >&2; exit 3"]);
        match backend.generate("prompt").await {
            Err(BackendError::Unavailable(detail)) => assert!(detail.contains("quota exceeded")),
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let backend = CommandBackend::new("bet-generator-missing-agent");
        match backend.generate("prompt").await {
            Err(BackendError::Unavailable(detail)) => {
                assert!(detail.contains("command not found"))
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_command_backend_drives_a_full_proposal() {
        // `sh -c script arg` binds the prompt to $0, so this agent replies with the prompt.
        let backend = CommandBackend::new("sh")
            .args(["-c", "printf '%s' \"$0\""])
            .env("LC_ALL", "C");
        let template = r#"{"question": "Will {category} be decided?", "type": "binary", "outcomes": ["Yes", "No"], "tags": ["{category}"], "resolution_source": "https://espn.com", "deadline": "2025-06-01", "creator": "auto-gen"}"#;

        let accepted = RetryController::new(policy(1))
            .propose(template, &state(), &backend)
            .await
            .unwrap();

        assert_eq!(accepted.proposal.question, "Will SPORTS be decided?");
        assert_eq!(accepted.proposal.tags, vec!["SPORTS"]);
    }
}
