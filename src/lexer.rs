//! Byte-oriented lexer: reads from the [`InputStack`](crate::input::InputStack)
//! and produces one [`Token`] at a time.
//!
//! There is no separate raw-character classification pass — quoting,
//! comments, leading I/O-unit digits, and reserved-word recognition are all
//! handled inline as the byte stream is consumed, matching the single-pass
//! style of the original scanner this module descends from.

use std::fmt;

use crate::ast::{Quote, Word};
use crate::input::InputStack;

/// Longest word the lexer will accept before giving up and dropping bytes
/// until the next delimiter (`LINELIM` in the original).
const LINELIM: usize = 4000;

/// A reserved word, recognized only when a bare (unquoted, unsubstituted)
/// word appears at the start of a command position — the parser decides
/// when that position applies by calling [`Word::is_bare_word`] on an
/// ordinary [`Token::Word`]; the lexer itself never special-cases these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResWord {
    If,
    Then,
    Else,
    Elif,
    Fi,
    For,
    While,
    Until,
    Do,
    Done,
    Case,
    Esac,
    In,
    LBrace,
    RBrace,
}

impl ResWord {
    /// Match a plain string against the reserved-word table.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "if" => ResWord::If,
            "then" => ResWord::Then,
            "else" => ResWord::Else,
            "elif" => ResWord::Elif,
            "fi" => ResWord::Fi,
            "for" => ResWord::For,
            "while" => ResWord::While,
            "until" => ResWord::Until,
            "do" => ResWord::Do,
            "done" => ResWord::Done,
            "case" => ResWord::Case,
            "esac" => ResWord::Esac,
            "in" => ResWord::In,
            "{" => ResWord::LBrace,
            "}" => ResWord::RBrace,
            _ => return None,
        })
    }
}

/// A multi-character shell operator. `^` is folded into [`OpKind::Pipe`] at
/// scan time (the original's `|`/`^` alias).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Pipe,
    AndAnd,
    OrOr,
    Amp,
    Semi,
    SemiSemi,
    LParen,
    RParen,
    Less,
    Great,
    DGreat,
    DLess,
    DLessDash,
    GreatAmp,
    LessAmp,
}

/// One lexical token.
#[derive(Debug, Clone)]
pub enum Token {
    /// A shell word.
    Word(Word),
    Res(ResWord),
    Op(OpKind),
    /// A leading digit string immediately before a redirection operator
    /// (`2>`, `0<&3`).
    IoUnit(i16),
    Newline,
    Eof,
}

/// Error produced by the lexer: unterminated quote or word too long.
#[derive(Debug, Clone)]
pub struct LexError {
    msg: String,
}

impl LexError {
    fn new(msg: impl Into<String>) -> Self {
        LexError { msg: msg.into() }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for LexError {}

/// Bytes that terminate an unquoted word.
fn is_word_break(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'\t' | b'\n' | b'|' | b'^' | b'&' | b';' | b'<' | b'>' | b'(' | b')'
    )
}

/// Reads tokens from an [`InputStack`]. Holds a single pushed-back token for
/// the parser's one token of lookahead (`peeksym`); nested `push`/`pop` of
/// input frames (for `.`, backticks, `eval`) works transparently in between
/// calls to [`Lexer::next`].
pub struct Lexer {
    pending: Option<Token>,
}

impl Lexer {
    /// A fresh lexer with no pending lookahead.
    #[must_use]
    pub fn new() -> Self {
        Lexer { pending: None }
    }

    /// Push a token back so the next `next()` call returns it again.
    pub fn unget(&mut self, tok: Token) {
        self.pending = Some(tok);
    }

    /// Read the next token from `input`.
    ///
    /// `continuation_ok`: when true, a bare newline is swallowed and
    /// scanning continues (used inside `${...}` and immediately after an
    /// operator that cannot end a command); when false, newline itself is
    /// returned as [`Token::Newline`].
    ///
    /// # Errors
    ///
    /// Returns [`LexError`] on an unterminated quote, unterminated
    /// backtick/`${...}`, or a word exceeding [`LINELIM`].
    pub fn next(
        &mut self,
        input: &mut InputStack,
        continuation_ok: bool,
    ) -> Result<Token, LexError> {
        if let Some(tok) = self.pending.take() {
            return Ok(tok);
        }
        self.scan(input, continuation_ok)
    }

    fn scan(&mut self, input: &mut InputStack, continuation_ok: bool) -> Result<Token, LexError> {
        loop {
            match input.readc() {
                None => return Ok(Token::Eof),
                Some(b' ') | Some(b'\t') => continue,
                Some(b'#') => {
                    while let Some(b) = input.readc() {
                        if b == b'\n' {
                            input.unget(b'\n');
                            break;
                        }
                    }
                    continue;
                }
                Some(b'\n') => {
                    if continuation_ok {
                        continue;
                    }
                    return Ok(Token::Newline);
                }
                Some(b'\\') => match input.readc() {
                    Some(b'\n') => continue, // line continuation, invisible
                    Some(c) => {
                        input.unget(c);
                        return self.scan_word(input, b'\\');
                    }
                    None => return self.scan_word(input, b'\\'),
                },
                Some(b) if b.is_ascii_digit() => return self.scan_leading_digits(input, b),
                Some(b'|') | Some(b'^') => {
                    return Ok(match input.readc() {
                        Some(b'|') => Token::Op(OpKind::OrOr),
                        other => {
                            if let Some(c) = other {
                                input.unget(c);
                            }
                            Token::Op(OpKind::Pipe)
                        }
                    });
                }
                Some(b'&') => {
                    return Ok(match input.readc() {
                        Some(b'&') => Token::Op(OpKind::AndAnd),
                        other => {
                            if let Some(c) = other {
                                input.unget(c);
                            }
                            Token::Op(OpKind::Amp)
                        }
                    });
                }
                Some(b';') => {
                    return Ok(match input.readc() {
                        Some(b';') => Token::Op(OpKind::SemiSemi),
                        other => {
                            if let Some(c) = other {
                                input.unget(c);
                            }
                            Token::Op(OpKind::Semi)
                        }
                    });
                }
                Some(b'(') => return Ok(Token::Op(OpKind::LParen)),
                Some(b')') => return Ok(Token::Op(OpKind::RParen)),
                Some(b'<') => return self.scan_less(input),
                Some(b'>') => return self.scan_great(input),
                Some(other) => return self.scan_word(input, other),
            }
        }
    }

    fn scan_less(&mut self, input: &mut InputStack) -> Result<Token, LexError> {
        Ok(match input.readc() {
            Some(b'<') => match input.readc() {
                Some(b'-') => Token::Op(OpKind::DLessDash),
                other => {
                    if let Some(c) = other {
                        input.unget(c);
                    }
                    Token::Op(OpKind::DLess)
                }
            },
            Some(b'&') => Token::Op(OpKind::LessAmp),
            other => {
                if let Some(c) = other {
                    input.unget(c);
                }
                Token::Op(OpKind::Less)
            }
        })
    }

    fn scan_great(&mut self, input: &mut InputStack) -> Result<Token, LexError> {
        Ok(match input.readc() {
            Some(b'>') => Token::Op(OpKind::DGreat),
            Some(b'&') => Token::Op(OpKind::GreatAmp),
            other => {
                if let Some(c) = other {
                    input.unget(c);
                }
                Token::Op(OpKind::Great)
            }
        })
    }

    /// A digit string is an I/O unit only when immediately followed by `<`
    /// or `>`; otherwise it's an ordinary word starting with digits (e.g.
    /// `123abc`, or a bare numeral argument).
    fn scan_leading_digits(&mut self, input: &mut InputStack, first: u8) -> Result<Token, LexError> {
        let mut digits = vec![first];
        loop {
            match input.readc() {
                Some(b) if b.is_ascii_digit() => digits.push(b),
                Some(b @ (b'<' | b'>')) => {
                    input.unget(b);
                    let unit: i16 = std::str::from_utf8(&digits)
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(-1);
                    return Ok(Token::IoUnit(unit));
                }
                other => {
                    if let Some(c) = other {
                        input.unget(c);
                    }
                    for &d in digits[1..].iter().rev() {
                        input.unget(d);
                    }
                    return self.scan_word(input, digits[0]);
                }
            }
        }
    }

    fn scan_word(&mut self, input: &mut InputStack, first: u8) -> Result<Token, LexError> {
        let mut word = Word::new();
        let mut b = first;
        let mut in_dquote = false;
        loop {
            let q = if in_dquote { Quote::DQuoted } else { Quote::Bare };
            match b {
                b'\'' if !in_dquote => loop {
                    match input.readc() {
                        Some(b'\'') => break,
                        Some(c) => word.push(c, Quote::Literal),
                        None => return Err(LexError::new("unterminated quote")),
                    }
                },
                b'"' => in_dquote = !in_dquote,
                b'`' => {
                    word.push(b'`', q);
                    loop {
                        match input.readc() {
                            Some(b'`') => {
                                word.push(b'`', q);
                                break;
                            }
                            Some(b'\\') => {
                                word.push(b'\\', q);
                                if let Some(c) = input.readc() {
                                    word.push(c, q);
                                }
                            }
                            Some(c) => word.push(c, q),
                            None => return Err(LexError::new("unterminated backtick")),
                        }
                    }
                }
                b'\\' => match input.readc() {
                    Some(b'\n') => {}
                    Some(c) => word.push(c, Quote::Literal),
                    None => return Err(LexError::new("unterminated quote")),
                },
                b'$' => {
                    word.push(b'$', q);
                    self.scan_dollar(input, &mut word, q)?;
                }
                _ if !in_dquote && is_word_break(b) => {
                    input.unget(b);
                    break;
                }
                other => word.push(other, q),
            }

            if word.len() > LINELIM {
                while let Some(c) = input.readc() {
                    if !in_dquote && is_word_break(c) {
                        input.unget(c);
                        break;
                    }
                }
                return Err(LexError::new("word too long"));
            }

            match input.readc() {
                Some(next) => b = next,
                None => break,
            }
        }
        Ok(Token::Word(word))
    }

    /// Scan the parameter name (or `{...}` brace form) following a `$`
    /// already pushed onto `word`.
    fn scan_dollar(
        &mut self,
        input: &mut InputStack,
        word: &mut Word,
        q: Quote,
    ) -> Result<(), LexError> {
        match input.readc() {
            Some(b'{') => {
                word.push(b'{', q);
                let mut depth = 1usize;
                loop {
                    match input.readc() {
                        Some(b'{') => {
                            depth += 1;
                            word.push(b'{', q);
                        }
                        Some(b'}') => {
                            depth -= 1;
                            word.push(b'}', q);
                            if depth == 0 {
                                break;
                            }
                        }
                        Some(c) => word.push(c, q),
                        None => return Err(LexError::new("unterminated ${...}")),
                    }
                }
                Ok(())
            }
            Some(c) if c == b'_' || c.is_ascii_alphabetic() => {
                word.push(c, q);
                loop {
                    match input.readc() {
                        Some(d) if d == b'_' || d.is_ascii_alphanumeric() => word.push(d, q),
                        Some(d) => {
                            input.unget(d);
                            break;
                        }
                        None => break,
                    }
                }
                Ok(())
            }
            Some(c) if c.is_ascii_digit() || matches!(c, b'?' | b'$' | b'!' | b'#' | b'-' | b'*' | b'@') => {
                word.push(c, q);
                Ok(())
            }
            Some(c) => {
                input.unget(c);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Generator, Task};

    fn lex_all(src: &str) -> Vec<Token> {
        let mut stack = InputStack::new();
        stack.push(Generator::from_str(src), Task::Other).unwrap();
        let mut lexer = Lexer::new();
        let mut out = Vec::new();
        loop {
            match lexer.next(&mut stack, false).unwrap() {
                Token::Eof => break,
                t => out.push(t),
            }
        }
        out
    }

    #[test]
    fn reserved_word_recognized_via_is_bare_word() {
        let toks = lex_all("if");
        match &toks[0] {
            Token::Word(w) => assert!(w.is_bare_word("if")),
            _ => panic!("expected word"),
        }
    }

    #[test]
    fn single_quotes_mark_literal() {
        let toks = lex_all("'a$b'");
        match &toks[0] {
            Token::Word(w) => {
                assert_eq!(w.to_string_lossy(), "a$b");
                assert!(w.iter().all(|(_, q)| q.suppresses_split()));
            }
            _ => panic!("expected word"),
        }
    }

    #[test]
    fn double_ampersand_recognized() {
        let toks = lex_all("a && b");
        assert!(matches!(toks[1], Token::Op(OpKind::AndAnd)));
    }

    #[test]
    fn double_quoted_dollar_detected_but_marked_dquoted() {
        let toks = lex_all("\"$x\"");
        match &toks[0] {
            Token::Word(w) => {
                assert_eq!(w.to_string_lossy(), "$x");
                assert!(w.iter().all(|(_, q)| q.suppresses_split() && q.substitutes()));
            }
            _ => panic!("expected word"),
        }
    }

    #[test]
    fn io_unit_peeled_off_before_redirect() {
        let toks = lex_all("2>file");
        assert!(matches!(toks[0], Token::IoUnit(2)));
        assert!(matches!(toks[1], Token::Op(OpKind::Great)));
    }

    #[test]
    fn bare_digits_not_followed_by_redirect_stay_a_word() {
        let toks = lex_all("123 abc");
        match &toks[0] {
            Token::Word(w) => assert_eq!(w.to_string_lossy(), "123"),
            _ => panic!("expected word"),
        }
    }

    #[test]
    fn pipe_and_caret_alias() {
        let toks = lex_all("a ^ b");
        assert!(matches!(toks[1], Token::Op(OpKind::Pipe)));
    }

    #[test]
    fn comment_consumed_to_newline() {
        let toks = lex_all("a #comment\nb");
        assert_eq!(toks.len(), 3);
        assert!(matches!(toks[1], Token::Newline));
    }
}
