//! Command Suggester - "did you mean" resolution for chat-bot commands
//!
//! When a message names an unknown command, its leading token is scored
//! against every registered command and alias:
//! - one candidate: the user is asked to confirm, and replying with a lone
//!   period re-runs the message with the suggested command
//! - several candidates: the user is shown all of them and must retype
//! - none: nothing is sent
//!
//! Command actions can run the same flow for their own arguments through the
//! [`Suggester`] capability on [`Context`].
//!
//! # Example
//!
//! ```
//! use command_suggester::{Command, CommandRegistry, Dispatcher, SessionKey, SuggestConfig};
//!
//! let mut registry = CommandRegistry::new();
//! registry
//!     .register(Command::new("foo", |_, inv| {
//!         Ok(Some(format!("foo{}", inv.arg(0).unwrap_or_default())))
//!     }))
//!     .unwrap();
//!
//! let mut dispatcher = Dispatcher::new(registry, SuggestConfig::default()).unwrap();
//! let user = SessionKey::private("456");
//!
//! assert_eq!(
//!     dispatcher.handle(&user, "fo bar").unwrap(),
//!     vec!["您要找的是不是“foo”？回复句号以使用推测的指令。"]
//! );
//! assert_eq!(dispatcher.handle(&user, ".").unwrap(), vec!["foobar"]);
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod registry;
pub mod session;
pub mod similarity;

pub use config::{ConfirmMatch, PromptText, SuggestConfig};
pub use dispatch::{continuation, Context, Continuation, Dispatcher, SuggestRequest, Suggester};
pub use engine::{suggest, SuggestionCandidate, Suggestions};
pub use error::{Result, SuggestError};
pub use registry::{Command, CommandNames, CommandRegistry, Invocation};
pub use session::{Clock, ManualClock, MonotonicClock, SessionKey, SessionState};
pub use similarity::{score, score_with, Metric};
