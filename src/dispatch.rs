//! Message dispatch.
//!
//! [`Dispatcher::handle`] routes one incoming message: it first resolves any
//! pending suggestion for the session key, then executes the command or runs
//! the suggestion flow on the unknown leading token.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SuggestConfig;
use crate::engine::{self, Suggestions};
use crate::error::{Result, SuggestError};
use crate::registry::{replace_leading_token, tokenize, CommandNames, CommandRegistry, Invocation};
use crate::session::{
    Clock, ConfirmationStore, MonotonicClock, PendingSuggestion, Resolution, SessionKey,
    SessionState,
};

/// Runs once when a suggestion resolves: with the chosen canonical name
/// after confirmation, or `None` when nothing was chosen.
pub type Continuation =
    Box<dyn FnOnce(&mut Context<'_>, Option<String>) -> Result<Option<String>> + Send>;

/// Box a closure as a [`Continuation`].
pub fn continuation<F>(f: F) -> Continuation
where
    F: FnOnce(&mut Context<'_>, Option<String>) -> Result<Option<String>> + Send + 'static,
{
    Box::new(f)
}

// ============================================================================
// Suggest Requests
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct SuggestRequest {
    /// The text that failed to match
    pub actual: String,

    /// Names to match against
    pub expect: Vec<CommandNames>,

    /// Prepended to the prompt; sent alone when nothing matches
    pub prefix: String,

    /// Appended to a single-candidate prompt; defaults to the confirm hint
    pub suffix: Option<String>,

    /// Full input `actual` was taken from, if different
    pub original_input: Option<String>,
}

impl SuggestRequest {
    pub fn new<I, S>(actual: impl Into<String>, expect: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::commands(
            actual,
            expect.into_iter().map(CommandNames::new).collect(),
        )
    }

    pub fn commands(actual: impl Into<String>, expect: Vec<CommandNames>) -> Self {
        Self {
            actual: actual.into(),
            expect,
            ..Default::default()
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn original_input(mut self, input: impl Into<String>) -> Self {
        self.original_input = Some(input.into());
        self
    }
}

/// Capability handed to command actions that need inline disambiguation.
pub trait Suggester {
    /// Prompt with the candidates for `request.actual`.
    ///
    /// With exactly one candidate the session is armed and `then` runs when
    /// the user confirms, cancels or lets it expire. Otherwise `then(None)`
    /// runs immediately and its output is returned.
    fn suggest(&mut self, request: SuggestRequest, then: Continuation) -> Result<Option<String>>;
}

// ============================================================================
// Execution Context
// ============================================================================

/// State available while handling one message for one session key
pub struct Context<'a> {
    registry: &'a CommandRegistry,
    sessions: &'a mut ConfirmationStore,
    config: &'a SuggestConfig,
    key: &'a SessionKey,
    replies: Vec<String>,
}

impl<'a> Context<'a> {
    fn new(
        registry: &'a CommandRegistry,
        sessions: &'a mut ConfirmationStore,
        config: &'a SuggestConfig,
        key: &'a SessionKey,
    ) -> Self {
        Self {
            registry,
            sessions,
            config,
            key,
            replies: Vec::new(),
        }
    }

    pub fn session_key(&self) -> &SessionKey {
        self.key
    }

    pub fn registry(&self) -> &CommandRegistry {
        self.registry
    }

    pub fn config(&self) -> &SuggestConfig {
        self.config
    }

    /// Queue a reply to the current session.
    pub fn reply(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !text.is_empty() {
            self.replies.push(text);
        }
    }

    fn push(&mut self, output: Option<String>) {
        if let Some(text) = output {
            self.reply(text);
        }
    }

    fn finish(self) -> Vec<String> {
        self.replies
    }

    /// Run a command by name or alias. Unknown names take the normal
    /// command-not-found path.
    pub fn execute(&mut self, name: &str, args: &[String]) -> Result<Option<String>> {
        let registry = self.registry;
        match registry.resolve(name) {
            Some(command) => {
                let invocation = Invocation::parse(command, args);
                debug!("Executing {} for {}", command.name(), self.key);
                command.run(self, &invocation)
            }
            None => {
                let line = std::iter::once(name.to_string())
                    .chain(args.iter().map(|a| quote(a)))
                    .collect::<Vec<_>>()
                    .join(" ");
                self.command_not_found(name, &line)
            }
        }
    }

    /// Parse and run a prefix-stripped command line.
    pub fn execute_line(&mut self, line: &str) -> Result<Option<String>> {
        let tokens = tokenize(line);
        let Some((head, rest)) = tokens.split_first() else {
            return Ok(None);
        };

        let registry = self.registry;
        match registry.resolve(head) {
            Some(command) => {
                let invocation = Invocation::parse(command, rest);
                debug!("Executing {} for {}", command.name(), self.key);
                command.run(self, &invocation)
            }
            None => self.command_not_found(head, line),
        }
    }

    fn command_not_found(&mut self, token: &str, line: &str) -> Result<Option<String>> {
        debug!("Unknown command {:?} from {}", token, self.key);
        let line = line.trim().to_string();
        let request = SuggestRequest::commands(token, self.registry.list_commands())
            .original_input(line.clone());

        self.suggest(
            request,
            continuation(move |ctx, chosen| match chosen {
                Some(name) => ctx.execute_line(&replace_leading_token(&line, &name)),
                None => Ok(None),
            }),
        )
    }
}

impl Suggester for Context<'_> {
    fn suggest(&mut self, request: SuggestRequest, then: Continuation) -> Result<Option<String>> {
        let config = self.config;
        let candidates = engine::suggest(
            &request.actual,
            &request.expect,
            config.min_similarity,
            config.metric,
        );

        match Suggestions::classify(candidates) {
            Suggestions::None => {
                self.reply(request.prefix);
                then(self, None)
            }
            Suggestions::Multiple(candidates) => {
                let spellings: Vec<&str> = candidates
                    .iter()
                    .flat_map(|c| c.spellings.iter().map(String::as_str))
                    .collect();
                self.reply(format!(
                    "{}{}",
                    request.prefix,
                    config.prompt.question(&spellings)
                ));
                then(self, None)
            }
            Suggestions::Single(candidate) => {
                let shown = candidate.best_spelling(request.actual.trim(), config.metric);
                let suffix = request
                    .suffix
                    .unwrap_or_else(|| config.prompt.confirm_hint.clone());
                self.reply(format!(
                    "{}{}{}",
                    request.prefix,
                    config.prompt.question(&[shown]),
                    suffix
                ));

                let pending = PendingSuggestion::new(
                    self.key.clone(),
                    candidate.name,
                    request.original_input.unwrap_or(request.actual),
                    self.sessions.start_timer(),
                    then,
                );
                match self.sessions.arm(pending) {
                    Some(replaced) => (replaced.into_continuation())(self, None),
                    None => Ok(None),
                }
            }
        }
    }
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.chars().any(char::is_whitespace) {
        format!("\"{}\"", arg)
    } else {
        arg.to_string()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

#[derive(Debug)]
pub struct Dispatcher {
    registry: CommandRegistry,
    config: SuggestConfig,
    sessions: ConfirmationStore,
}

impl Dispatcher {
    pub fn new(registry: CommandRegistry, config: SuggestConfig) -> Result<Self> {
        Self::with_clock(registry, config, Arc::new(MonotonicClock))
    }

    pub fn with_clock(
        registry: CommandRegistry,
        config: SuggestConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        if registry.is_empty() {
            return Err(SuggestError::EmptyRegistry);
        }
        let sessions = ConfirmationStore::new(clock, config.confirm_timeout());
        Ok(Self {
            registry,
            config,
            sessions,
        })
    }

    /// Handle one message and return the replies for its session. An empty
    /// list means nothing should be sent.
    pub fn handle(&mut self, key: &SessionKey, message: &str) -> Result<Vec<String>> {
        let mut ctx = Context::new(&self.registry, &mut self.sessions, &self.config, key);

        match ctx.sessions.resolve(key, message, ctx.config) {
            Resolution::Applied(pending) => {
                let candidate = pending.candidate.clone();
                let output = (pending.into_continuation())(&mut ctx, Some(candidate))?;
                ctx.push(output);
                return Ok(ctx.finish());
            }
            Resolution::Cancelled(pending) | Resolution::Expired(pending) => {
                let output = (pending.into_continuation())(&mut ctx, None)?;
                ctx.push(output);
            }
            Resolution::Idle => {}
        }

        if let Some(body) = ctx.config.strip_prefix(message, key.is_private()) {
            let output = ctx.execute_line(body)?;
            ctx.push(output);
        }

        let replies = ctx.finish();
        if !replies.is_empty() {
            info!("{} repl(ies) to {}", replies.len(), key);
        }
        Ok(replies)
    }

    /// Resolve every expired suggestion.
    ///
    /// Each expired continuation runs once with `None`, even when an earlier
    /// one fails. Keys whose continuation produced no reply are left out.
    pub fn sweep_expired(&mut self) -> Vec<(SessionKey, Result<Vec<String>>)> {
        let mut out = Vec::new();
        for pending in self.sessions.sweep_expired() {
            let key = pending.key.clone();
            debug!("Expired suggestion \"{}\" for {}", pending.candidate, key);
            let mut ctx = Context::new(&self.registry, &mut self.sessions, &self.config, &key);
            match (pending.into_continuation())(&mut ctx, None) {
                Ok(output) => {
                    ctx.push(output);
                    let replies = ctx.finish();
                    if !replies.is_empty() {
                        out.push((key, Ok(replies)));
                    }
                }
                Err(e) => {
                    warn!("Expired suggestion for {} failed: {}", key, e);
                    out.push((key, Err(e)));
                }
            }
        }
        out
    }

    pub fn state(&self, key: &SessionKey) -> SessionState {
        self.sessions.state(key)
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }
}
