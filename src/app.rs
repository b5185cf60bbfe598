use tracing::{error, warn};

use crate::application::use_cases::lexicon_manager::DEFAULT_TERM_SEARCH_LIMIT;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::bootstrap::{init_tracing, setup, Text2SqlApp};
use crate::infrastructure::config::AppConfig;

const DEFAULT_HISTORY_LIMIT: usize = 20;

enum Command {
    Ask(String),
    History(usize),
    Backfill,
    Terms(String),
    TermCategories,
}

fn parse_args(args: &[String]) -> Result<Command> {
    match args.first().map(String::as_str) {
        Some("--history") => {
            let limit = match args.get(1) {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| AppError::ValidationError(format!("Invalid history limit: {}", raw)))?,
                None => DEFAULT_HISTORY_LIMIT,
            };
            Ok(Command::History(limit))
        }
        Some("--backfill-embeddings") => Ok(Command::Backfill),
        Some("--terms") => Ok(Command::Terms(args[1..].join(" "))),
        Some("--term-categories") => Ok(Command::TermCategories),
        Some(_) => {
            let question = args.join(" ");
            if question.trim().is_empty() {
                return Err(AppError::ValidationError("Question must not be empty".to_string()));
            }
            Ok(Command::Ask(question))
        }
        None => Err(AppError::ValidationError(
            "Usage: text2sql <question> | --history [N] | --backfill-embeddings | --terms [KEYWORD] | --term-categories".to_string(),
        )),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Internal(format!("Failed to serialize output: {}", e)))?;
    println!("{}", json);
    Ok(())
}

async fn execute(app: &Text2SqlApp, command: Command) -> Result<()> {
    match command {
        Command::Ask(question) => {
            let mut response = app.pipeline.run(&question).await;
            if let Some(feedback) = response.feedback.take() {
                if let Err(e) = feedback.await {
                    warn!(request_id = %response.request_id, "Feedback task did not complete: {}", e);
                }
            }
            print_json(&response)
        }
        Command::History(limit) => print_json(&app.pipeline.recent_history(limit).await?),
        Command::Backfill => {
            let filled = app.examples.backfill_embeddings().await?;
            println!("Backfilled {} example embeddings", filled);
            Ok(())
        }
        Command::Terms(keyword) => print_json(
            &app.lexicon
                .search(&keyword, None, DEFAULT_TERM_SEARCH_LIMIT)
                .await?,
        ),
        Command::TermCategories => print_json(&app.lexicon.categories().await?),
    }
}

pub fn run() {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            init_tracing("info");
            error!(error = %err, "Failed to load configuration");
            std::process::exit(2);
        }
    };
    init_tracing(&config.pipeline.log_filter);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "Failed to start async runtime");
            std::process::exit(1);
        }
    };

    let outcome = runtime.block_on(async move {
        let app = setup(config).await?;
        execute(&app, command).await
    });
    if let Err(err) = outcome {
        error!(error = %err, "text2sql failed");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_question_words_are_joined() {
        match parse_args(&args(&["부서별", "평균", "급여"])).unwrap() {
            Command::Ask(question) => assert_eq!(question, "부서별 평균 급여"),
            _ => panic!("expected a question"),
        }
    }

    #[test]
    fn test_history_limit_defaults_and_parses() {
        assert!(matches!(
            parse_args(&args(&["--history"])).unwrap(),
            Command::History(DEFAULT_HISTORY_LIMIT)
        ));
        assert!(matches!(
            parse_args(&args(&["--history", "5"])).unwrap(),
            Command::History(5)
        ));
        assert!(parse_args(&args(&["--history", "many"])).is_err());
    }

    #[test]
    fn test_lexicon_commands() {
        match parse_args(&args(&["--terms", "급여", "총액"])).unwrap() {
            Command::Terms(keyword) => assert_eq!(keyword, "급여 총액"),
            _ => panic!("expected a term search"),
        }
        assert!(matches!(
            parse_args(&args(&["--terms"])).unwrap(),
            Command::Terms(keyword) if keyword.is_empty()
        ));
        assert!(matches!(
            parse_args(&args(&["--term-categories"])).unwrap(),
            Command::TermCategories
        ));
    }

    #[test]
    fn test_missing_arguments_are_rejected() {
        assert!(parse_args(&[]).is_err());
        assert!(parse_args(&args(&["  "])).is_err());
    }
}
