//! Command registry and argument parsing.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::dispatch::Context;
use crate::error::{Result, SuggestError};

lazy_static! {
    /// A double-quoted argument or a run of non-whitespace
    static ref RE_TOKEN: Regex = Regex::new(r#""([^"]*)"|(\S+)"#).unwrap();
}

/// Command action. Returns the reply to send, if any.
pub type Action =
    Box<dyn Fn(&mut Context<'_>, &Invocation) -> Result<Option<String>> + Send + Sync>;

/// A command name with its aliases, as listed by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandNames {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl CommandNames {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// The canonical name followed by the aliases.
    pub fn spellings(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// A declared `-t <value>` style option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
    /// Key under which the value is stored
    pub name: String,
    /// Flag as typed, e.g. `-t`
    pub flag: String,
}

pub struct Command {
    names: CommandNames,
    description: String,
    options: Vec<OptionSpec>,
    action: Action,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("names", &self.names)
            .field("description", &self.description)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Command {
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&mut Context<'_>, &Invocation) -> Result<Option<String>> + Send + Sync + 'static,
    {
        Self {
            names: CommandNames::new(name),
            description: String::new(),
            options: Vec::new(),
            action: Box::new(action),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.names.aliases.push(alias.into());
        self
    }

    /// Declare an option; `--<name>` is accepted as well as `flag`.
    pub fn option(mut self, name: impl Into<String>, flag: impl Into<String>) -> Self {
        self.options.push(OptionSpec {
            name: name.into(),
            flag: flag.into(),
        });
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.names.name
    }

    pub fn help(&self) -> &str {
        &self.description
    }

    pub(crate) fn run(&self, ctx: &mut Context<'_>, invocation: &Invocation) -> Result<Option<String>> {
        (self.action)(ctx, invocation)
    }

    fn option_for(&self, token: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|o| {
            o.flag == token || token.strip_prefix("--").is_some_and(|long| long == o.name)
        })
    }
}

/// A parsed command call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Canonical name of the invoked command
    pub name: String,
    pub args: Vec<String>,
    pub options: HashMap<String, String>,
}

impl Invocation {
    /// Parse the tokens following the command name.
    pub fn parse(command: &Command, tokens: &[String]) -> Self {
        let mut invocation = Invocation {
            name: command.name().to_string(),
            ..Default::default()
        };

        let mut iter = tokens.iter();
        while let Some(token) = iter.next() {
            match command.option_for(token) {
                Some(spec) => {
                    let value = iter.next().cloned().unwrap_or_default();
                    invocation.options.insert(spec.name.clone(), value);
                }
                None => invocation.args.push(token.clone()),
            }
        }
        invocation
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }
}

/// Split a message into tokens; double quotes group words.
pub fn tokenize(line: &str) -> Vec<String> {
    RE_TOKEN
        .captures_iter(line)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Replace the leading token of `line` with `name`, keeping the rest verbatim.
pub fn replace_leading_token(line: &str, name: &str) -> String {
    let line = line.trim_start();
    match RE_TOKEN.find(line) {
        Some(m) => format!("{}{}", name, &line[m.end()..]),
        None => name.to_string(),
    }
}

#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
    /// Name or alias to position in `commands`
    index: HashMap<String, usize>,
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.commands.iter().map(|c| c.name())).finish()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command. Names and aliases are unique across the registry.
    pub fn register(&mut self, command: Command) -> Result<()> {
        let mut seen = Vec::new();
        for spelling in command.names.spellings() {
            if spelling.trim().is_empty() || spelling.chars().any(char::is_whitespace) {
                return Err(SuggestError::EmptyName);
            }
            if self.index.contains_key(spelling) || seen.contains(&spelling) {
                return Err(SuggestError::DuplicateName(spelling.to_string()));
            }
            seen.push(spelling);
        }

        let position = self.commands.len();
        for spelling in command.names.spellings() {
            self.index.insert(spelling.to_string(), position);
        }
        debug!("Registered command {}", command.name());
        self.commands.push(command);
        Ok(())
    }

    pub fn with(mut self, command: Command) -> Result<Self> {
        self.register(command)?;
        Ok(self)
    }

    /// Look up a command by name or alias.
    pub fn resolve(&self, name: &str) -> Option<&Command> {
        self.index.get(name).map(|&i| &self.commands[i])
    }

    /// Remove a command by name or alias.
    pub fn remove(&mut self, name: &str) -> Option<Command> {
        let position = *self.index.get(name)?;
        let command = self.commands.remove(position);
        self.index = self
            .commands
            .iter()
            .enumerate()
            .flat_map(|(i, c)| c.names.spellings().map(move |s| (s.to_string(), i)))
            .collect();
        Some(command)
    }

    /// Names and aliases in registration order.
    pub fn list_commands(&self) -> Vec<CommandNames> {
        self.commands.iter().map(|c| c.names.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut Context<'_>, _: &Invocation) -> Result<Option<String>> {
        Ok(None)
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = CommandRegistry::new()
            .with(Command::new("foo", noop))
            .unwrap()
            .with(Command::new("fooo", noop).alias("bool"))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("bool").map(Command::name), Some("fooo"));
        assert_eq!(registry.resolve("foo").map(Command::name), Some("foo"));
        assert!(registry.resolve("fo").is_none());
        assert_eq!(
            registry.list_commands(),
            vec![
                CommandNames::new("foo"),
                CommandNames::new("fooo").with_alias("bool")
            ]
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = CommandRegistry::new();
        registry.register(Command::new("foo", noop)).unwrap();

        let err = registry.register(Command::new("bar", noop).alias("foo"));
        assert!(matches!(err, Err(SuggestError::DuplicateName(n)) if n == "foo"));

        let err = registry.register(Command::new("baz", noop).alias("baz"));
        assert!(matches!(err, Err(SuggestError::DuplicateName(n)) if n == "baz"));

        // failed registrations leave nothing behind
        assert!(registry.resolve("bar").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut registry = CommandRegistry::new();
        assert!(matches!(
            registry.register(Command::new("", noop)),
            Err(SuggestError::EmptyName)
        ));
        assert!(matches!(
            registry.register(Command::new("a b", noop)),
            Err(SuggestError::EmptyName)
        ));
    }

    #[test]
    fn test_remove_reindexes() {
        let mut registry = CommandRegistry::new()
            .with(Command::new("foo", noop))
            .unwrap()
            .with(Command::new("fooo", noop).alias("bool"))
            .unwrap();

        assert!(registry.remove("foo").is_some());
        assert!(registry.resolve("foo").is_none());
        assert_eq!(registry.resolve("bool").map(Command::name), Some("fooo"));
        assert!(registry.remove("foo").is_none());
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("  foo  bar "), vec!["foo", "bar"]);
        assert_eq!(tokenize(r#"say "hello world" !"#), vec!["say", "hello world", "!"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_replace_leading_token() {
        assert_eq!(replace_leading_token("fo bar", "foo"), "foo bar");
        assert_eq!(replace_leading_token("  foooo -t bar", "fooo"), "fooo -t bar");
        assert_eq!(replace_leading_token("", "foo"), "foo");
    }

    #[test]
    fn test_invocation_options() {
        let command = Command::new("fooo", noop).option("text", "-t");
        let inv = Invocation::parse(&command, &tokenize("-t bar extra"));
        assert_eq!(inv.name, "fooo");
        assert_eq!(inv.option("text"), Some("bar"));
        assert_eq!(inv.args, vec!["extra"]);

        let inv = Invocation::parse(&command, &tokenize("--text baz"));
        assert_eq!(inv.option("text"), Some("baz"));

        let inv = Invocation::parse(&command, &tokenize("-x 1"));
        assert_eq!(inv.args, vec!["-x", "1"]);
        assert!(inv.options.is_empty());
    }
}
