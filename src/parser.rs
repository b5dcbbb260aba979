//! Turns a raw input line into a [`ParsedCommand`].
//!
//! Grammar, applied to whitespace-delimited words (see the lexer for quoting):
//!
//! * the first word is the main command and is required;
//! * `key=value` (split on the first unquoted `=`, non-empty key) becomes a
//!   subcommand pair; the value may itself contain `=`;
//! * a word starting with an unquoted `-` that is not `key=value` becomes a
//!   flag, named after the word with its leading dashes stripped;
//! * anything else is a positional argument, stored as a subcommand keyed
//!   `arg0`, `arg1`, ... in order of appearance among positional words.
//!
//! Duplicate keys are kept in order and looked up first-wins. Repeated flags
//! are recorded once. The parser performs no I/O and no command lookups.

use crate::command::{positional_key, Flag, Param, ParsedCommand};
use crate::lexer::{self, LexingError, Word};

pub use crate::lexer::quote;

/// Errors that can occur while parsing a command line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The line is empty or contains only whitespace.
    #[error("empty command line")]
    Empty,
    /// The first word is an empty quoted string.
    #[error("missing command name")]
    MissingCommand,
    /// A quote was opened but never closed.
    #[error("unterminated {0} quote")]
    UnfinishedQuote(char),
    /// The line ends with a lone backslash.
    #[error("line ends with an unescaped backslash")]
    DanglingEscape,
}

impl From<LexingError> for ParseError {
    fn from(err: LexingError) -> Self {
        match err {
            LexingError::UnfinishedQuote(q) => ParseError::UnfinishedQuote(q),
            LexingError::DanglingEscape => ParseError::DanglingEscape,
        }
    }
}

#[derive(Default)]
struct CommandBuilder {
    subcommands: Vec<Param>,
    flags: Vec<Flag>,
    positionals: usize,
}

impl CommandBuilder {
    fn push(&mut self, word: Word) {
        if let Some(eq) = word.assignment.filter(|&eq| eq > 0) {
            let (key, value) = word.text.split_at(eq);
            self.subcommands.push(Param {
                key: key.to_string(),
                value: value[1..].to_string(),
            });
            return;
        }

        if word.dashed {
            let name = word.text.trim_start_matches('-');
            if !name.is_empty() {
                if !self.flags.iter().any(|f| f.name == name) {
                    self.flags.push(Flag {
                        name: name.to_string(),
                        present: true,
                    });
                }
                return;
            }
        }

        self.subcommands.push(Param {
            key: positional_key(self.positionals),
            value: word.text,
        });
        self.positionals += 1;
    }

    fn build(self, main_command: String) -> ParsedCommand {
        ParsedCommand {
            main_command,
            subcommands: self.subcommands,
            flags: self.flags,
        }
    }
}

/// Parse one command line.
pub fn parse(line: &str) -> Result<ParsedCommand, ParseError> {
    let mut words = lexer::split_into_words(line)?.into_iter();
    let main = words.next().ok_or(ParseError::Empty)?;
    if main.text.is_empty() {
        return Err(ParseError::MissingCommand);
    }

    let mut builder = CommandBuilder::default();
    for word in words {
        builder.push(word);
    }
    Ok(builder.build(main.text))
}
