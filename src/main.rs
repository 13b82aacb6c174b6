use std::path::PathBuf;
use std::process::ExitCode;

use bet_generator::{
    BetGenerator, BetRequest, CommandBackend, GenerationClient, ScriptedBackend, Settings,
    logging, template,
};
use chrono::{Local, NaiveDate};
use clap::Parser;
use color_eyre::eyre::Result;
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Generates one validated prediction-market bet proposal.
#[derive(Debug, Parser)]
#[command(name = "bet_generator", version, about)]
struct CliArgs {
    /// Category to generate for; drawn from the user's weights when omitted.
    #[arg(long)]
    category: Option<String>,

    /// User address (`0x` + 40 hex digits); defaults to the configured user.
    #[arg(long)]
    user: Option<String>,

    /// Settings file to load instead of ./data/settings.json.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Answer with a canned proposal instead of running the agent binary.
    #[arg(long)]
    dry_run: bool,
}

// Canned fenced reply used by --dry-run in place of the agent binary.
fn dry_run_response(today: NaiveDate) -> String {
    let proposal = json!({
        "question": "Will the dry-run event happen on or before its deadline?",
        "type": "binary",
        "outcomes": ["Yes", "No"],
        "tags": ["dry-run"],
        "resolution_source": "https://example.com/dry-run",
        "deadline": (today + chrono::Duration::days(30)).format("%Y-%m-%d").to_string(),
        "creator": "auto-gen"
    });
    format!("```json\n{:#}\n```", proposal)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let args = CliArgs::parse();

    let settings = match &args.config {
        Some(path) => Settings::load_settings_from_file(path)?,
        None => Settings::load_or_default(bet_generator::settings::SETTINGS_PATH)?,
    }
    .apply_env_overrides();

    if let Some(log_dir) = logging::default_log_dir() {
        if let Err(e) = logging::init(&log_dir, settings.debug_mode) {
            eprintln!("Logging disabled: {}", e);
        }
    }

    let cancellation = CancellationToken::new();
    let ctrl_c = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let today = Local::now().date_naive();
    let mut request = BetRequest::new(today);
    request.category = args.category;
    request.user_id = args.user;

    let succeeded = if args.dry_run {
        let backend = ScriptedBackend::always(dry_run_response(today));
        execute(BetGenerator::new(settings, backend), request, cancellation).await?
    } else {
        let backend = CommandBackend::from_settings(&settings.agent);
        execute(BetGenerator::new(settings, backend), request, cancellation).await?
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn execute<B: GenerationClient>(
    generator: BetGenerator<B>,
    request: BetRequest,
    cancellation: CancellationToken,
) -> Result<bool> {
    let generator = generator.with_cancellation(cancellation);
    let run = generator.run(request).await?;
    println!("CREATED NEW SESSION:");
    println!("\tSession ID: {}", run.session_id);

    let succeeded = match &run.outcome {
        Ok(accepted) => {
            println!("Final Response: {}", accepted.proposal.to_json_pretty()?);
            println!("Accepted after {} attempt(s)", accepted.attempts.len());
            true
        }
        Err(e) => {
            eprintln!("Error running agent: {}", e);
            for attempt in e.attempts() {
                eprintln!(
                    "  attempt {}: {:?} {}",
                    attempt.attempt_number,
                    attempt.parse_result,
                    attempt.error_detail.as_deref().unwrap_or("")
                );
            }
            false
        }
    };

    let session = generator.store().get(run.session_id).await?;
    println!("=== Final Session State ({}) ===", session.status);
    for (key, value) in &session.state {
        println!("{}: {}", key, template::value_to_text(value));
    }

    Ok(succeeded)
}
