use std::sync::Mutex;

use crate::error::CommandGrammarError;
use crate::types::Command;

pub const COMMAND_USAGE: &str = "Invalid command! Please enter 'start <duration>', 'get_one'.";

/// Operator text as the dispatcher stores it: trimmed and lowercased.
pub fn normalize_command_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Parse operator text of the form `start <duration>` or `get_one`.
///
/// The duration is read as a decimal number and truncated toward zero, so
/// `start 2.9` asks for two samples. Values past `u32::MAX` saturate.
pub fn parse_operator_command(text: &str) -> Result<Command, CommandGrammarError> {
    let text = normalize_command_text(text);
    let mut words = text.split_whitespace();

    match words.next() {
        None => Err(CommandGrammarError::Empty),
        Some("get_one") if words.next().is_none() => Ok(Command::get_one()),
        Some("start") => {
            let (Some(arg), None) = (words.next(), words.next()) else {
                return Err(CommandGrammarError::MissingDuration(text.clone()));
            };
            let duration: f64 = arg
                .parse()
                .map_err(|_| CommandGrammarError::InvalidDuration(arg.to_string()))?;
            if !duration.is_finite() || duration < 0.0 {
                return Err(CommandGrammarError::InvalidDuration(arg.to_string()));
            }
            // float-to-int `as` truncates and saturates
            Ok(Command::start(duration as u32))
        }
        Some(_) => Err(CommandGrammarError::Unknown(text.clone())),
    }
}

/// Holds at most one pending operator command for the server.
///
/// This is a slot, not a queue: setting a new command replaces any
/// unconsumed one. Shared by every call handled by one server.
#[derive(Debug, Default)]
pub struct CommandDispatcher {
    pending: Mutex<Option<String>>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_pending(&self, command_text: &str) {
        let text = normalize_command_text(command_text);
        if let Some(replaced) = self.slot().replace(text) {
            log::warn!("Pending command \"{}\" replaced before dispatch", replaced);
        }
    }

    /// Read and clear the pending command text in one step.
    pub fn take_pending(&self) -> Option<String> {
        self.slot().take()
    }

    pub fn has_pending(&self) -> bool {
        self.slot().is_some()
    }

    /// Turn the pending text into a [`Command`], clearing the slot.
    /// Returns `None` when nothing is pending.
    pub fn dispatch(&self) -> Option<Command> {
        let text = self.take_pending()?;
        match parse_operator_command(&text) {
            Ok(command) => {
                log::info!("Dispatching command: {}", command);
                Some(command)
            }
            Err(e) => {
                // the command source validates first, so this is a bypassed slot
                log::error!("Discarding malformed pending command \"{}\": {}", text, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_start() {
        let dispatcher = CommandDispatcher::new();
        dispatcher.set_pending("start 5");
        assert_eq!(dispatcher.dispatch(), Some(Command::start(5)));
        assert!(!dispatcher.has_pending());
    }

    #[test]
    fn test_dispatch_get_one() {
        let dispatcher = CommandDispatcher::new();
        dispatcher.set_pending("get_one");
        assert_eq!(dispatcher.dispatch(), Some(Command::get_one()));
    }

    #[test]
    fn test_dispatch_nothing_pending() {
        let dispatcher = CommandDispatcher::new();
        assert_eq!(dispatcher.dispatch(), None);
    }

    #[test]
    fn test_slot_consumed_once() {
        let dispatcher = CommandDispatcher::new();
        dispatcher.set_pending("get_one");
        assert_eq!(dispatcher.take_pending().as_deref(), Some("get_one"));
        assert_eq!(dispatcher.take_pending(), None);
        assert_eq!(dispatcher.dispatch(), None);
    }

    #[test]
    fn test_slot_is_not_a_queue() {
        let dispatcher = CommandDispatcher::new();
        dispatcher.set_pending("start 3");
        dispatcher.set_pending("get_one");
        assert_eq!(dispatcher.dispatch(), Some(Command::get_one()));
        assert_eq!(dispatcher.dispatch(), None);
    }

    #[test]
    fn test_malformed_pending_is_dropped() {
        let dispatcher = CommandDispatcher::new();
        dispatcher.set_pending("start");
        assert_eq!(dispatcher.dispatch(), None);
        assert!(!dispatcher.has_pending());
    }

    #[test]
    fn test_grammar_normalizes_case_and_whitespace() {
        assert_eq!(parse_operator_command("  START 3 \n"), Ok(Command::start(3)));
        assert_eq!(parse_operator_command("Get_One"), Ok(Command::get_one()));
    }

    #[test]
    fn test_grammar_truncates_fractional_duration() {
        assert_eq!(parse_operator_command("start 2.9"), Ok(Command::start(2)));
        assert_eq!(parse_operator_command("start 0"), Ok(Command::start(0)));
        assert_eq!(parse_operator_command("start 1e12"), Ok(Command::start(u32::MAX)));
    }

    #[test]
    fn test_grammar_rejections() {
        assert_eq!(parse_operator_command(""), Err(CommandGrammarError::Empty));
        assert!(matches!(
            parse_operator_command("stop"),
            Err(CommandGrammarError::Unknown(_))
        ));
        assert!(matches!(
            parse_operator_command("start"),
            Err(CommandGrammarError::MissingDuration(_))
        ));
        assert!(matches!(
            parse_operator_command("start 1 2"),
            Err(CommandGrammarError::MissingDuration(_))
        ));
        assert!(matches!(
            parse_operator_command("start -1"),
            Err(CommandGrammarError::InvalidDuration(_))
        ));
        assert!(matches!(
            parse_operator_command("start abc"),
            Err(CommandGrammarError::InvalidDuration(_))
        ));
        assert!(matches!(
            parse_operator_command("start inf"),
            Err(CommandGrammarError::InvalidDuration(_))
        ));
        assert!(matches!(
            parse_operator_command("get_one now"),
            Err(CommandGrammarError::Unknown(_))
        ));
    }
}
