//! `csg` - command suggestion over a JSON line protocol
//!
//! # Input (via stdin)
//! One JSON object per line with fields: userId, channelId (optional), content
//!
//! # Output (via stdout)
//! One JSON object per line with fields: userId, channelId, replies.
//! Messages that produce no reply produce no output line.
//!
//! # Registry file
//! JSON with a `commands` array; each command has a name, optional aliases,
//! options and a reply template using `{name}`, `{args}`, `{arg0}`.. and
//! `{opt:<name>}` placeholders.

use clap::Parser;
use colored::Colorize;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use command_suggester::config::load_or_default;
use command_suggester::registry::OptionSpec;
use command_suggester::{
    Command, CommandRegistry, Dispatcher, Invocation, SessionKey, SuggestError,
};

lazy_static! {
    static ref RE_PLACEHOLDER: Regex = Regex::new(r"\{(name|args|arg(\d+)|opt:(\w+))\}").unwrap();
}

#[derive(Debug, Parser)]
#[command(name = "csg", version, about = "Suggest chat-bot commands for mistyped input")]
struct Cli {
    /// Command registry (JSON)
    #[arg(short, long)]
    registry: PathBuf,

    /// Config file; defaults to the platform config directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the minimum similarity
    #[arg(long)]
    min_similarity: Option<f64>,
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageInput {
    user_id: String,

    #[serde(default)]
    channel_id: Option<String>,

    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageOutput {
    user_id: String,
    channel_id: Option<String>,
    replies: Vec<String>,
}

impl MessageOutput {
    fn new(key: SessionKey, replies: Vec<String>) -> Self {
        Self {
            user_id: key.user_id,
            channel_id: key.channel_id,
            replies,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    commands: Vec<CommandEntry>,
}

#[derive(Debug, Deserialize)]
struct CommandEntry {
    name: String,

    #[serde(default)]
    aliases: Vec<String>,

    #[serde(default)]
    description: String,

    #[serde(default)]
    options: Vec<OptionSpec>,

    /// Reply template
    reply: String,
}

// ============================================================================
// Registry Loading
// ============================================================================

fn render(template: &str, invocation: &Invocation) -> String {
    RE_PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            if let Some(index) = caps.get(2) {
                let index: usize = index.as_str().parse().unwrap_or(usize::MAX);
                return invocation.arg(index).unwrap_or_default().to_string();
            }
            if let Some(option) = caps.get(3) {
                return invocation.option(option.as_str()).unwrap_or_default().to_string();
            }
            match &caps[1] {
                "name" => invocation.name.clone(),
                _ => invocation.args.join(" "),
            }
        })
        .into_owned()
}

fn build_command(entry: CommandEntry) -> Command {
    let template = entry.reply;
    let mut command = Command::new(entry.name, move |_, inv| Ok(Some(render(&template, inv))))
        .description(entry.description);
    for alias in entry.aliases {
        command = command.alias(alias);
    }
    for option in entry.options {
        command = command.option(option.name, option.flag);
    }
    command
}

fn load_registry(path: &Path) -> Result<CommandRegistry, SuggestError> {
    let content = fs::read_to_string(path).map_err(|e| SuggestError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let file: RegistryFile =
        serde_json::from_str(&content).map_err(|e| SuggestError::FileParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let mut registry = CommandRegistry::new();
    for entry in file.commands {
        let command = build_command(entry);
        debug!("Registering {} - {}", command.name(), command.help());
        registry.register(command)?;
    }
    Ok(registry)
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    // Initialize tracing if RUST_LOG is set
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("Error: {}", e);
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), SuggestError> {
    let mut config = load_or_default(cli.config.as_deref())?;
    if let Some(min_similarity) = cli.min_similarity {
        config.min_similarity = min_similarity;
    }

    let registry = load_registry(&cli.registry)?;
    info!("Loaded {} commands from {:?}", registry.len(), cli.registry);

    let mut dispatcher = Dispatcher::new(registry, config)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        for output in handle_line(&mut dispatcher, &line) {
            emit(&mut stdout, output)?;
        }
    }

    Ok(())
}

/// Process one input line. Malformed lines and failing commands are logged
/// and skipped so the session keeps running.
fn handle_line(dispatcher: &mut Dispatcher, line: &str) -> Vec<MessageOutput> {
    let mut outputs = Vec::new();
    if line.trim().is_empty() {
        return outputs;
    }

    for (key, result) in dispatcher.sweep_expired() {
        match result {
            Ok(replies) => outputs.push(MessageOutput::new(key, replies)),
            Err(e) => error!("Expired suggestion for {} failed: {}", key, e),
        }
    }

    let input: MessageInput = match serde_json::from_str(line) {
        Ok(input) => input,
        Err(e) => {
            warn!("Skipping malformed line: {}", e);
            return outputs;
        }
    };
    let key = SessionKey {
        user_id: input.user_id,
        channel_id: input.channel_id,
    };
    debug!("{} {}", key.to_string().cyan(), input.content);

    match dispatcher.handle(&key, &input.content) {
        Ok(replies) => {
            for reply in &replies {
                info!("{} {} {}", key.to_string().cyan(), "<-".dimmed(), reply.green());
            }
            if !replies.is_empty() {
                outputs.push(MessageOutput::new(key, replies));
            }
        }
        Err(e) => error!("{} {} {}", key.to_string().cyan(), "failed:".red(), e),
    }
    outputs
}

fn emit(out: &mut impl Write, output: MessageOutput) -> Result<(), SuggestError> {
    writeln!(out, "{}", serde_json::to_string(&output)?)?;
    out.flush()?;
    Ok(())
}
