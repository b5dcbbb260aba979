//! Lexical analysis (tokenization) of a single command line.
//!
//! Tokens are separated by unquoted whitespace. Single quotes preserve their
//! content literally, double quotes honour `\"` and `\\`, and outside quotes a
//! backslash escapes the next character. Quoted or escaped characters never
//! act as separators, flag markers or `key=value` separators.
//!
//! [`quote`] is the inverse for a single value: lexing its output yields the
//! value back as one plain word.

use std::borrow::Cow;

/// One whitespace-delimited token, with quoting already removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Word {
    /// Unquoted text of the token.
    pub text: String,
    /// Byte offset in `text` of the first `=` that appeared outside quotes.
    pub assignment: Option<usize>,
    /// Whether the token began with an unquoted `-`.
    pub dashed: bool,
}

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LexingError {
    /// A closing quote (single or double) was not found.
    UnfinishedQuote(char),
    /// The line ended right after a backslash.
    DanglingEscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    current_word: Word,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            current_word: Word::default(),
        }
    }

    fn make_words(&mut self) -> Result<Vec<Word>, LexingError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start => self.handle_start(ch, &mut out)?,
                LexingState::ReadingWord => self.handle_word(ch, &mut out)?,
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch)?,
            }
        }

        match self.state {
            LexingState::ReadingSingleQuote => return Err(LexingError::UnfinishedQuote('\'')),
            LexingState::ReadingDoubleQuote => return Err(LexingError::UnfinishedQuote('"')),
            LexingState::ReadingWord => self.finish_word(&mut out),
            LexingState::Start => {}
        }

        Ok(out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn handle_start(&mut self, ch: char, out: &mut Vec<Word>) -> Result<(), LexingError> {
        if ch.is_whitespace() {
            return Ok(());
        }
        self.state = LexingState::ReadingWord;
        self.handle_word(ch, out)
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<Word>) -> Result<(), LexingError> {
        match ch {
            c if c.is_whitespace() => {
                self.finish_word(out);
                self.state = LexingState::Start;
            }
            '\'' => self.state = LexingState::ReadingSingleQuote,
            '"' => self.state = LexingState::ReadingDoubleQuote,
            '\\' => match self.read_char() {
                Some(escaped) => self.current_word.text.push(escaped),
                None => return Err(LexingError::DanglingEscape),
            },
            c => self.push_bare(c),
        }
        Ok(())
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::ReadingWord,
            c => self.current_word.text.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) -> Result<(), LexingError> {
        match ch {
            '"' => self.state = LexingState::ReadingWord,
            '\\' => match self.read_char() {
                Some(c @ ('"' | '\\')) => self.current_word.text.push(c),
                Some(c) => {
                    self.current_word.text.push('\\');
                    self.current_word.text.push(c);
                }
                None => return Err(LexingError::UnfinishedQuote('"')),
            },
            c => self.current_word.text.push(c),
        }
        Ok(())
    }

    /// Push a character that appeared outside quotes, recording its syntactic role.
    fn push_bare(&mut self, ch: char) {
        let word = &mut self.current_word;
        if ch == '-' && word.text.is_empty() {
            word.dashed = true;
        }
        if ch == '=' && word.assignment.is_none() {
            word.assignment = Some(word.text.len());
        }
        word.text.push(ch);
    }

    fn finish_word(&mut self, out: &mut Vec<Word>) {
        out.push(std::mem::take(&mut self.current_word));
    }
}

/// Quote `value` so it lexes back as exactly one word with no syntactic role.
///
/// Values that need no quoting are returned unchanged. Everything else is
/// wrapped in double quotes with `"` and `\` escaped.
pub fn quote(value: &str) -> Cow<'_, str> {
    let plain = !value.is_empty()
        && !value.starts_with('-')
        && !value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '\\' | '='));
    if plain {
        return Cow::Borrowed(value);
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

/// Split a line into words.
pub(crate) fn split_into_words(line: &str) -> Result<Vec<Word>, LexingError> {
    let mut lexer = LexingFSM::new(line);
    lexer.make_words()
}
