mod debug_report;

use chatactions::{ActionSuggestionOptions, ActionsEngine, AnnotationOptions, Conversation, ConversationMessage};
use chrono::NaiveDateTime;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

const DEFAULT_LOCALES: &str = "en";
const LOG_ENV: &str = "CHATACTIONS_LOG";

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let engine = match ActionsEngine::from_path(&config.model) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("error: could not load {}: {err}", config.model.display());
            std::process::exit(1);
        }
    };

    let conversation = build_conversation(&config);
    let options = ActionSuggestionOptions {
        annotation_options: AnnotationOptions {
            reference_time_ms_utc: config.reference_time.map(|t| t.and_utc().timestamp_millis()),
            reference_timezone: "UTC".to_string(),
            locales: config.locales.clone(),
        },
        ignore_min_replies_triggering_threshold: config.ignore_threshold,
    };

    let result = match engine.suggest_actions_with_metrics(&conversation, None, &options) {
        Ok(result) => result,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    if config.json {
        match serde_json::to_string_pretty(&result.response) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("error: could not encode response: {err}");
                std::process::exit(1);
            }
        }
    } else {
        debug_report::print_run(&conversation, &result, config.color);
    }
}

struct CliConfig {
    model: PathBuf,
    messages: Vec<String>,
    locales: String,
    reference_time: Option<NaiveDateTime>,
    ignore_threshold: bool,
    json: bool,
    color: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut model: Option<PathBuf> = None;
    let mut messages: Vec<String> = Vec::new();
    let mut locales = DEFAULT_LOCALES.to_string();
    let mut reference_time = None;
    let mut ignore_threshold = false;
    let mut json = false;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("chatactions {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--json" => json = true,
            "--ignore-threshold" => ignore_threshold = true,
            "--model" | "-m" | "--config" => {
                let value = args.next().ok_or_else(|| "error: --model expects a value".to_string())?;
                model = Some(PathBuf::from(value));
            }
            "--locales" => {
                locales = args.next().ok_or_else(|| "error: --locales expects a value".to_string())?;
            }
            "--reference" => {
                let value = args.next().ok_or_else(|| "error: --reference expects a value".to_string())?;
                reference_time = Some(parse_reference(&value)?);
            }
            "--" => {
                messages.extend(args.by_ref());
                break;
            }
            _ if arg.starts_with("--model=") => {
                model = Some(PathBuf::from(arg.trim_start_matches("--model=")));
            }
            _ if arg.starts_with("--locales=") => {
                locales = arg.trim_start_matches("--locales=").to_string();
            }
            _ if arg.starts_with("--reference=") => {
                reference_time = Some(parse_reference(arg.trim_start_matches("--reference="))?);
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => messages.push(arg),
        }
    }

    let model = model.ok_or_else(|| format!("error: no model configuration given\n\n{}", help_text()))?;

    if messages.is_empty() {
        messages = read_stdin_messages()?;
    }
    messages.retain(|m| !m.trim().is_empty());
    if messages.is_empty() {
        return Err(format!("error: no messages provided\n\n{}", help_text()));
    }

    Ok(CliConfig { model, messages, locales, reference_time, ignore_threshold, json, color })
}

/// Messages alternate between two participants, ending with user 1.
fn build_conversation(config: &CliConfig) -> Conversation {
    let count = config.messages.len();
    let reference = config.reference_time.map(|t| t.and_utc().timestamp_millis());
    let messages = config
        .messages
        .iter()
        .enumerate()
        .map(|(idx, text)| {
            let user_id = if (count - idx) % 2 == 1 { 1 } else { 2 };
            let message = ConversationMessage::new(user_id, text.clone()).with_locales(config.locales.clone());
            match reference {
                Some(ms) => message.with_reference_time(ms),
                None => message,
            }
        })
        .collect();
    Conversation::new(messages)
}

fn read_stdin_messages() -> Result<Vec<String>, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer.lines().map(str::to_string).collect())
}

fn parse_reference(value: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .map_err(|_| format!("error: invalid --reference '{value}' (expected YYYY-MM-DDTHH:MM:SS)"))
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "chatactions {version}

Suggest actions for a conversation.

Usage:
  chatactions --model <config.json> [OPTIONS] [--] <message>...
  chatactions --model <config.json> [OPTIONS] < conversation.txt

Messages are given oldest first, one per argument or one per stdin line.

Options:
  -m, --model <path>         JSON model configuration (alias: --config).
  --locales <tags>           Comma-separated locales of the messages.
                             Default: {default_locales}
  --reference <timestamp>    Message time in YYYY-MM-DDTHH:MM:SS (UTC).
  --ignore-threshold         Ignore the smart reply triggering threshold.
  --json                     Print the response as JSON.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Environment:
  {log_env}                  Log filter (tracing), default: warn.

Exit codes:
  0  Success.
  1  Configuration or suggestion error.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
        default_locales = DEFAULT_LOCALES,
        log_env = LOG_ENV,
    )
}
