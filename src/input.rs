//! Operator input: blocking line sources and the prompt loops built on them.
//!
//! A source is drained by a dedicated pump thread into a rendezvous channel.
//! Prompt loops select between that channel and the stop flag, so a stop is
//! seen promptly even while the pump itself is still blocked on a read.

use crossbeam::channel::{self, Receiver};
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::thread;

use crate::dispatcher::{parse_operator_command, CommandDispatcher, COMMAND_USAGE};
use crate::integrator::SharedIntegrator;
use crate::stop::StopFlag;
use crate::types::Command;

pub const EQUATION_PROMPT: &str = "Enter position equation: ";
pub const COMMAND_PROMPT: &str = "Enter command (start <duration>, get_one): ";

/// Blocking provider of operator text.
pub trait LineSource: Send {
    /// Block until a line is available. `None` means end of input.
    fn read_line(&mut self) -> Option<String>;
}

/// Lines typed on the process's standard input.
#[derive(Debug, Default)]
pub struct StdinLines;

impl LineSource for StdinLines {
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
            Err(e) => {
                log::error!("Failed to read from stdin: {}", e);
                None
            }
        }
    }
}

/// Fixed list of lines, then end of input.
#[derive(Debug, Default, Clone)]
pub struct ScriptedLines {
    lines: VecDeque<String>,
}

impl ScriptedLines {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl LineSource for ScriptedLines {
    fn read_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }
}

/// Outcome of waiting for a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    EndOfInput,
    Stopped,
}

/// Cancellable view of a [`LineSource`] running on its own thread.
#[derive(Debug, Clone)]
pub struct LinePump {
    lines: Receiver<String>,
    echo_prompts: bool,
}

impl LinePump {
    /// Start a pump thread for `source`. The thread ends at end of input or
    /// once every `LinePump` clone has been dropped and a line is pending.
    pub fn spawn<S>(mut source: S, name: &str) -> io::Result<Self>
    where
        S: LineSource + 'static,
    {
        let (tx, rx) = channel::bounded(0);
        thread::Builder::new().name(name.to_string()).spawn(move || {
            while let Some(line) = source.read_line() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
        Ok(Self {
            lines: rx,
            echo_prompts: false,
        })
    }

    /// Print prompts to stdout before each wait.
    pub fn interactive(mut self) -> Self {
        self.echo_prompts = true;
        self
    }

    /// Wait for the next line, end of input, or the stop flag.
    pub fn next(&self, prompt: &str, stop: &StopFlag) -> Input {
        if stop.is_set() {
            return Input::Stopped;
        }
        if self.echo_prompts {
            print!("{}", prompt);
            let _ = io::stdout().flush();
        }
        crossbeam::select! {
            recv(self.lines) -> line => match line {
                Ok(line) => Input::Line(line),
                Err(_) => Input::EndOfInput,
            },
            recv(stop.gate()) -> _ => Input::Stopped,
        }
    }
}

/// Prompt for equations until one parses.
///
/// With `keep_alive` the loop keeps accepting replacement equations until the
/// stop flag is set. End of input sets the stop flag.
pub fn read_equations(lines: &LinePump, integrator: &SharedIntegrator, stop: &StopFlag, keep_alive: bool) {
    while !stop.is_set() {
        match lines.next(EQUATION_PROMPT, stop) {
            Input::Line(text) => {
                let text = text.trim();
                match integrator.set_equation(text) {
                    Ok(()) => {
                        log::info!("Position equation set to \"{}\"", text);
                        if !keep_alive {
                            break;
                        }
                    }
                    Err(e) => log::error!("Invalid format of equation: \"{}\", try again.", e),
                }
            }
            Input::EndOfInput => {
                log::info!("Equation input closed, stopping client");
                stop.set();
                break;
            }
            Input::Stopped => break,
        }
    }
}

/// Operator command source for the server.
#[derive(Debug, Clone)]
pub struct CommandPrompt {
    lines: LinePump,
}

impl CommandPrompt {
    pub fn new(lines: LinePump) -> Self {
        Self { lines }
    }

    /// Block until a well-formed command is available and take it from
    /// `dispatcher`.
    ///
    /// A command already pending is taken without prompting. Malformed text
    /// is reported and re-prompted. Returns `None` only when the stop flag
    /// was set instead, including by end of input here.
    pub fn wait_for_command(&self, dispatcher: &CommandDispatcher, stop: &StopFlag) -> Option<Command> {
        loop {
            if let Some(command) = dispatcher.dispatch() {
                return Some(command);
            }
            match self.lines.next(COMMAND_PROMPT, stop) {
                Input::Line(text) => match parse_operator_command(&text) {
                    Ok(_) => dispatcher.set_pending(&text),
                    Err(e) => {
                        log::warn!("Rejected operator command \"{}\": {}", text.trim(), e);
                        println!("{}", COMMAND_USAGE);
                    }
                },
                Input::EndOfInput => {
                    log::info!("Stopping server");
                    stop.set();
                    return None;
                }
                Input::Stopped => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Source that never produces a line, like an idle terminal.
    struct SilentLines;

    impl LineSource for SilentLines {
        fn read_line(&mut self) -> Option<String> {
            loop {
                thread::park();
            }
        }
    }

    #[test]
    fn test_scripted_lines_then_end_of_input() {
        let pump = LinePump::spawn(ScriptedLines::new(["a", "b"]), "test-pump").unwrap();
        let stop = StopFlag::new();
        assert_eq!(pump.next("", &stop), Input::Line("a".into()));
        assert_eq!(pump.next("", &stop), Input::Line("b".into()));
        assert_eq!(pump.next("", &stop), Input::EndOfInput);
    }

    #[test]
    fn test_stop_unblocks_waiting_reader() {
        let pump = LinePump::spawn(SilentLines, "silent-pump").unwrap();
        let stop = StopFlag::new();

        let remote = stop.clone();
        let setter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.set();
        });

        assert_eq!(pump.next("", &stop), Input::Stopped);
        setter.join().unwrap();
    }

    #[test]
    fn test_read_equations_retries_until_valid() {
        let pump = LinePump::spawn(ScriptedLines::new(["x +", "2 * x"]), "eq-pump").unwrap();
        let integrator = SharedIntegrator::default();
        let stop = StopFlag::new();

        read_equations(&pump, &integrator, &stop, false);

        assert!(!stop.is_set());
        assert_eq!(integrator.lock().equation().unwrap().source(), "2 * x");
    }

    #[test]
    fn test_read_equations_keep_alive_replaces_until_end_of_input() {
        let pump = LinePump::spawn(ScriptedLines::new(["1", "bad(", "3"]), "eq-pump").unwrap();
        let integrator = SharedIntegrator::default();
        let stop = StopFlag::new();

        read_equations(&pump, &integrator, &stop, true);

        assert!(stop.is_set());
        assert_eq!(integrator.lock().equation().unwrap().source(), "3");
    }

    #[test]
    fn test_read_equations_end_of_input_stops() {
        let pump = LinePump::spawn(ScriptedLines::default(), "eq-pump").unwrap();
        let integrator = SharedIntegrator::default();
        let stop = StopFlag::new();

        read_equations(&pump, &integrator, &stop, false);

        assert!(stop.is_set());
        assert!(!integrator.has_equation());
    }

    #[test]
    fn test_command_prompt_skips_malformed_text() {
        let pump = LinePump::spawn(ScriptedLines::new(["jump", "start", "Start 4"]), "cmd-pump").unwrap();
        let prompt = CommandPrompt::new(pump);
        let dispatcher = CommandDispatcher::new();
        let stop = StopFlag::new();

        assert_eq!(prompt.wait_for_command(&dispatcher, &stop), Some(Command::start(4)));
        assert!(!dispatcher.has_pending());
    }

    #[test]
    fn test_command_prompt_uses_already_pending_command() {
        let prompt = CommandPrompt::new(LinePump::spawn(SilentLines, "silent-pump").unwrap());
        let dispatcher = CommandDispatcher::new();
        dispatcher.set_pending("get_one");

        assert_eq!(
            prompt.wait_for_command(&dispatcher, &StopFlag::new()),
            Some(Command::get_one())
        );
        assert!(!dispatcher.has_pending());
    }

    #[test]
    fn test_command_prompt_end_of_input_stops() {
        let prompt = CommandPrompt::new(LinePump::spawn(ScriptedLines::default(), "cmd-pump").unwrap());
        let dispatcher = CommandDispatcher::new();
        let stop = StopFlag::new();

        assert_eq!(prompt.wait_for_command(&dispatcher, &stop), None);
        assert!(stop.is_set());
        assert!(!dispatcher.has_pending());
    }
}
