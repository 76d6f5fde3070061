//! Recursive-descent parser over the token stream produced by [`lexer`](crate::lexer).
//!
//! One token of lookahead (`peeksym` in the original) and a `multiline`
//! counter that tells the driver whether to prompt with `PS1` or `PS2`.
//! Here-documents are the one place the grammar isn't a clean top-down
//! recursion: a `<<tag` is queued when seen and its body is only readable
//! once the rest of the logical line has been scanned (the body's first
//! line is whatever comes after that line's closing newline). This parser
//! resolves the queue once per top-level command, then walks the freshly
//! built tree filling in each `Redir`'s `here_doc` — mirroring the
//! original's two-pass `gether()` coupling without needing a global queue.

use std::collections::HashMap;
use std::fmt;

use crate::ast::{CaseArm, Cmd, HereDoc, Redir, RedirOp, SimpleCmd, Word};
use crate::input::InputStack;
use crate::lexer::{Lexer, OpKind, Token};

/// A syntax error. Parsing resumes at the next newline after one of these;
/// the driver bumps its error counter and does not execute the offending
/// command.
#[derive(Debug, Clone)]
pub struct ParseError {
    msg: String,
}

impl ParseError {
    fn new(msg: impl Into<String>) -> Self {
        ParseError { msg: msg.into() }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "syntax error: {}", self.msg)
    }
}

impl std::error::Error for ParseError {}

impl From<crate::lexer::LexError> for ParseError {
    fn from(e: crate::lexer::LexError) -> Self {
        ParseError::new(e.to_string())
    }
}

/// A `<<`/`<<-` redirection whose body hasn't been read yet.
struct PendingHere {
    ticket: u32,
    tag: String,
    strip_tabs: bool,
    quoted_tag: bool,
}

/// Parser state. Every method takes the input stack explicitly — the same
/// convention the lexer uses — since command substitution and `.` swap the
/// stack's frames out from under an in-progress parse.
pub struct Parser {
    lexer: Lexer,
    multiline: u32,
    pending_heredocs: Vec<PendingHere>,
    next_ticket: u32,
}

impl Parser {
    /// A fresh parser.
    #[must_use]
    pub fn new() -> Self {
        Parser {
            lexer: Lexer::new(),
            multiline: 0,
            pending_heredocs: Vec::new(),
            next_ticket: 0,
        }
    }

    /// `true` while an unclosed compound construct means continuation
    /// lines should be prompted with `PS2` rather than `PS1`.
    #[must_use]
    pub fn in_continuation(&self) -> bool {
        self.multiline > 0
    }

    fn peek(&mut self, input: &mut InputStack, cont: bool) -> Result<Token, ParseError> {
        let tok = self.lexer.next(input, cont)?;
        self.lexer.unget(tok.clone());
        Ok(tok)
    }

    fn bump(&mut self, input: &mut InputStack, cont: bool) -> Result<Token, ParseError> {
        Ok(self.lexer.next(input, cont)?)
    }

    fn expect_op(&mut self, input: &mut InputStack, op: OpKind, what: &str) -> Result<(), ParseError> {
        match self.bump(input, true)? {
            Token::Op(o) if o == op => Ok(()),
            other => Err(ParseError::new(format!("expected {what}, got {other:?}"))),
        }
    }

    fn skip_newlines(&mut self, input: &mut InputStack) -> Result<(), ParseError> {
        while matches!(self.peek(input, false)?, Token::Newline) {
            self.bump(input, false)?;
        }
        Ok(())
    }

    /// Parse one top-level command: an `andor` chain joined by `;`/`&`
    /// until a bare (non-continuation) newline or EOF. Returns `None` at
    /// EOF with nothing parsed.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] on malformed input.
    pub fn next_command(&mut self, input: &mut InputStack) -> Result<Option<Cmd>, ParseError> {
        self.skip_newlines(input)?;
        if matches!(self.peek(input, false)?, Token::Eof) {
            return Ok(None);
        }

        let mut result: Option<Cmd> = None;
        loop {
            let node = self.andor(input)?;
            match self.bump(input, false)? {
                Token::Op(OpKind::Semi) => {
                    result = Some(chain_list(result, node));
                }
                Token::Op(OpKind::Amp) => {
                    result = Some(chain_list(result, Cmd::Async(Box::new(node))));
                }
                Token::Newline | Token::Eof => {
                    result = Some(chain_list(result, node));
                    break;
                }
                other => return Err(ParseError::new(format!("unexpected token {other:?}"))),
            }
            if matches!(self.peek(input, false)?, Token::Eof | Token::Newline) {
                self.bump(input, false)?;
                break;
            }
        }

        let heredocs = self.gather_heredocs(input)?;
        let mut cmd = result.expect("loop always produces a command");
        fill_heredocs(&mut cmd, &heredocs);
        Ok(Some(cmd))
    }

    fn andor(&mut self, input: &mut InputStack) -> Result<Cmd, ParseError> {
        let mut left = self.pipeline(input)?;
        loop {
            match self.peek(input, false)? {
                Token::Op(OpKind::AndAnd) => {
                    self.bump(input, false)?;
                    self.skip_newlines(input)?;
                    let right = self.pipeline(input)?;
                    left = Cmd::And(Box::new(left), Box::new(right));
                }
                Token::Op(OpKind::OrOr) => {
                    self.bump(input, false)?;
                    self.skip_newlines(input)?;
                    let right = self.pipeline(input)?;
                    left = Cmd::Or(Box::new(left), Box::new(right));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn pipeline(&mut self, input: &mut InputStack) -> Result<Cmd, ParseError> {
        let mut left = self.command(input)?;
        while matches!(self.peek(input, false)?, Token::Op(OpKind::Pipe)) {
            self.bump(input, false)?;
            self.skip_newlines(input)?;
            let right = self.command(input)?;
            left = Cmd::Pipe(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn command(&mut self, input: &mut InputStack) -> Result<Cmd, ParseError> {
        match self.peek(input, false)? {
            Token::Op(OpKind::LParen) => {
                self.bump(input, false)?;
                self.multiline += 1;
                let inner = self.c_list_until_rparen(input)?;
                self.expect_op(input, OpKind::RParen, "')'")?;
                self.multiline -= 1;
                let redirs = self.trailing_redirs(input)?;
                Ok(Cmd::Paren(Box::new(inner), redirs))
            }
            Token::Word(w) if w.is_bare_word("{") => {
                self.bump(input, false)?;
                self.multiline += 1;
                let inner = self.c_list_until_word(input, "}")?;
                self.expect_bare_word(input, "}")?;
                self.multiline -= 1;
                let redirs = self.trailing_redirs(input)?;
                Ok(Cmd::Brace(Box::new(inner), redirs))
            }
            Token::Word(w) if w.is_bare_word("for") => self.parse_for(input),
            Token::Word(w) if w.is_bare_word("while") => self.parse_while_until(input, true),
            Token::Word(w) if w.is_bare_word("until") => self.parse_while_until(input, false),
            Token::Word(w) if w.is_bare_word("case") => self.parse_case(input),
            Token::Word(w) if w.is_bare_word("if") => self.parse_if(input),
            Token::Word(w) if w.is_bare_word(".") => {
                self.bump(input, false)?;
                let file = self.expect_word(input)?;
                Ok(Cmd::Dot { file })
            }
            _ => self.simple(input),
        }
    }

    fn c_list_until_rparen(&mut self, input: &mut InputStack) -> Result<Cmd, ParseError> {
        self.c_list_while(input, |p, inp| {
            Ok(!matches!(p.peek(inp, false)?, Token::Op(OpKind::RParen)))
        })
    }

    fn c_list_until_word(&mut self, input: &mut InputStack, stop: &'static str) -> Result<Cmd, ParseError> {
        self.c_list_while(input, move |p, inp| {
            Ok(!matches!(p.peek(inp, false)?, Token::Word(ref w) if w.is_bare_word(stop)))
        })
    }

    /// Shared body for parenthesized / brace / keyword-delimited lists:
    /// `andor` nodes separated by `;`/`&`/newline until `stop` says to quit.
    fn c_list_while(
        &mut self,
        input: &mut InputStack,
        stop: impl Fn(&mut Self, &mut InputStack) -> Result<bool, ParseError>,
    ) -> Result<Cmd, ParseError> {
        self.skip_newlines(input)?;
        let mut result = Cmd::Empty;
        let mut have_any = false;
        while stop(self, input)? {
            let node = self.andor(input)?;
            have_any = true;
            result = if matches!(result, Cmd::Empty) {
                node
            } else {
                Cmd::List(Box::new(result), Box::new(node))
            };
            match self.peek(input, false)? {
                Token::Op(OpKind::Semi) => {
                    self.bump(input, false)?;
                }
                Token::Op(OpKind::Amp) => {
                    self.bump(input, false)?;
                    result = set_last_async(result);
                }
                Token::Newline => {
                    self.bump(input, false)?;
                }
                _ => break,
            }
            self.skip_newlines(input)?;
        }
        if !have_any {
            return Err(ParseError::new("expected a command list"));
        }
        Ok(result)
    }

    fn do_group(&mut self, input: &mut InputStack) -> Result<Cmd, ParseError> {
        self.expect_bare_word(input, "do")?;
        self.multiline += 1;
        let body = self.c_list_until_word(input, "done")?;
        self.expect_bare_word(input, "done")?;
        self.multiline -= 1;
        Ok(body)
    }

    fn parse_for(&mut self, input: &mut InputStack) -> Result<Cmd, ParseError> {
        self.bump(input, false)?;
        let var_word = self.expect_word(input)?;
        let var = var_word.to_string_lossy();
        self.multiline += 1;
        self.skip_newlines(input)?;
        if matches!(self.peek(input, false)?, Token::Op(OpKind::Semi)) {
            self.bump(input, false)?;
            self.skip_newlines(input)?;
        }

        let words = if matches!(self.peek(input, false)?, Token::Word(ref w) if w.is_bare_word("in")) {
            self.bump(input, false)?;
            let mut ws = Vec::new();
            loop {
                match self.peek(input, false)? {
                    Token::Word(_) => {
                        if let Token::Word(w) = self.bump(input, false)? {
                            ws.push(w);
                        }
                    }
                    _ => break,
                }
            }
            match self.peek(input, false)? {
                Token::Newline | Token::Op(OpKind::Semi) => {
                    self.bump(input, false)?;
                }
                _ => {}
            }
            self.skip_newlines(input)?;
            Some(ws)
        } else {
            None
        };

        let body = self.do_group(input)?;
        self.multiline -= 1;
        let redirs = self.trailing_redirs(input)?;
        Ok(Cmd::For {
            var,
            words,
            body: Box::new(body),
            redirs,
        })
    }

    fn parse_while_until(&mut self, input: &mut InputStack, is_while: bool) -> Result<Cmd, ParseError> {
        self.bump(input, false)?;
        self.multiline += 1;
        let cond = self.c_list_until_word(input, "do")?;
        let body = self.do_group(input)?;
        self.multiline -= 1;
        let redirs = self.trailing_redirs(input)?;
        Ok(if is_while {
            Cmd::While {
                cond: Box::new(cond),
                body: Box::new(body),
                redirs,
            }
        } else {
            Cmd::Until {
                cond: Box::new(cond),
                body: Box::new(body),
                redirs,
            }
        })
    }

    fn parse_if(&mut self, input: &mut InputStack) -> Result<Cmd, ParseError> {
        self.bump(input, false)?;
        self.multiline += 1;
        let cond = self.c_list_until_word(input, "then")?;
        self.expect_bare_word(input, "then")?;
        let then_ = self.then_body(input)?;
        let else_ = self.else_part(input)?;
        self.expect_bare_word(input, "fi")?;
        self.multiline -= 1;
        let redirs = self.trailing_redirs(input)?;
        Ok(Cmd::If {
            cond: Box::new(cond),
            then_: Box::new(then_),
            else_,
            redirs,
        })
    }

    fn parse_elif(&mut self, input: &mut InputStack) -> Result<Cmd, ParseError> {
        self.bump(input, false)?;
        let cond = self.c_list_until_word(input, "then")?;
        self.expect_bare_word(input, "then")?;
        let then_ = self.then_body(input)?;
        let else_ = self.else_part(input)?;
        Ok(Cmd::Elif {
            cond: Box::new(cond),
            then_: Box::new(then_),
            else_,
            redirs: Vec::new(),
        })
    }

    fn then_body(&mut self, input: &mut InputStack) -> Result<Cmd, ParseError> {
        self.c_list_while(input, |p, inp| {
            Ok(!matches!(p.peek(inp, false)?, Token::Word(ref w)
                if w.is_bare_word("else") || w.is_bare_word("elif") || w.is_bare_word("fi")))
        })
    }

    fn else_part(&mut self, input: &mut InputStack) -> Result<Option<Box<Cmd>>, ParseError> {
        Ok(match self.peek(input, false)? {
            Token::Word(w) if w.is_bare_word("elif") => Some(Box::new(self.parse_elif(input)?)),
            Token::Word(w) if w.is_bare_word("else") => {
                self.bump(input, false)?;
                Some(Box::new(self.c_list_until_word(input, "fi")?))
            }
            _ => None,
        })
    }

    fn parse_case(&mut self, input: &mut InputStack) -> Result<Cmd, ParseError> {
        self.bump(input, false)?;
        let word = self.expect_word(input)?;
        self.multiline += 1;
        self.skip_newlines(input)?;
        self.expect_bare_word(input, "in")?;
        self.skip_newlines(input)?;

        let mut arms = Vec::new();
        while !matches!(self.peek(input, false)?, Token::Word(ref w) if w.is_bare_word("esac")) {
            // an optional leading '(' before the first pattern is legal
            if matches!(self.peek(input, false)?, Token::Op(OpKind::LParen)) {
                self.bump(input, false)?;
            }
            let mut patterns = vec![self.expect_word(input)?];
            while matches!(self.peek(input, false)?, Token::Op(OpKind::Pipe)) {
                self.bump(input, false)?;
                patterns.push(self.expect_word(input)?);
            }
            self.expect_op(input, OpKind::RParen, "')'")?;
            self.skip_newlines(input)?;

            let is_last_arm_empty = matches!(self.peek(input, false)?, Token::Op(OpKind::SemiSemi))
                || matches!(self.peek(input, false)?, Token::Word(ref w) if w.is_bare_word("esac"));
            let body = if is_last_arm_empty {
                None
            } else {
                Some(Box::new(self.c_list_while(input, |p, inp| {
                    Ok(!matches!(p.peek(inp, false)?, Token::Op(OpKind::SemiSemi))
                        && !matches!(p.peek(inp, false)?, Token::Word(ref w) if w.is_bare_word("esac")))
                })?))
            };
            if matches!(self.peek(input, false)?, Token::Op(OpKind::SemiSemi)) {
                self.bump(input, false)?;
            }
            self.skip_newlines(input)?;
            arms.push(CaseArm { patterns, body });
        }
        self.expect_bare_word(input, "esac")?;
        self.multiline -= 1;
        let redirs = self.trailing_redirs(input)?;
        Ok(Cmd::Case { word, arms, redirs })
    }

    fn simple(&mut self, input: &mut InputStack) -> Result<Cmd, ParseError> {
        let mut cmd = SimpleCmd::default();
        let mut seen_word = false;
        loop {
            match self.peek(input, false)? {
                Token::IoUnit(_)
                | Token::Op(
                    OpKind::Less
                    | OpKind::Great
                    | OpKind::DGreat
                    | OpKind::DLess
                    | OpKind::DLessDash
                    | OpKind::GreatAmp
                    | OpKind::LessAmp,
                ) => {
                    let redir = self.parse_redir(input)?;
                    cmd.redirs.push(redir);
                }
                Token::Word(w) => {
                    let text = w.to_string_lossy();
                    if !seen_word {
                        if let Some((name, value)) = crate::vars::split_assign(&text) {
                            self.bump(input, false)?;
                            cmd.assigns.push((name.to_string(), Word::unquoted(value)));
                            continue;
                        }
                    }
                    self.bump(input, false)?;
                    cmd.words.push(w);
                    seen_word = true;
                }
                _ => break,
            }
        }
        if cmd.words.is_empty() && cmd.assigns.is_empty() && cmd.redirs.is_empty() {
            return Err(ParseError::new("unexpected token"));
        }
        Ok(Cmd::Simple(cmd))
    }

    fn parse_redir(&mut self, input: &mut InputStack) -> Result<Redir, ParseError> {
        let unit = if let Token::IoUnit(n) = self.peek(input, false)? {
            self.bump(input, false)?;
            n
        } else {
            -1
        };
        let op_tok = self.bump(input, false)?;
        let (op, strip_tabs) = match op_tok {
            Token::Op(OpKind::Less) => (RedirOp::Read, false),
            Token::Op(OpKind::Great) => (RedirOp::Write, false),
            Token::Op(OpKind::DGreat) => (RedirOp::Append, false),
            Token::Op(OpKind::LessAmp | OpKind::GreatAmp) => (RedirOp::DupFrom, false),
            Token::Op(OpKind::DLess) => (RedirOp::Here { expand: true }, false),
            Token::Op(OpKind::DLessDash) => (RedirOp::Here { expand: true }, true),
            other => return Err(ParseError::new(format!("expected redirection operator, got {other:?}"))),
        };

        if let RedirOp::Here { .. } = op {
            let tag_word = self.expect_word(input)?;
            let quoted_tag = tag_word.iter().any(|(_, q)| q.suppresses_split());
            let tag = tag_word.to_string_lossy();
            let ticket = self.next_ticket;
            self.next_ticket += 1;
            self.pending_heredocs.push(PendingHere {
                ticket,
                tag,
                strip_tabs,
                quoted_tag,
            });
            return Ok(Redir {
                unit,
                op: RedirOp::Here { expand: !quoted_tag },
                target: Word::unquoted(&ticket.to_string()),
                here_doc: None,
            });
        }

        if matches!(op, RedirOp::DupFrom) {
            if let Token::Word(w) = self.peek(input, false)? {
                if w.to_string_lossy() == "-" {
                    self.bump(input, false)?;
                    return Ok(Redir {
                        unit,
                        op: RedirOp::Close,
                        target: Word::new(),
                        here_doc: None,
                    });
                }
            }
        }

        let target = self.expect_word(input)?;
        Ok(Redir { unit, op, target, here_doc: None })
    }

    fn trailing_redirs(&mut self, input: &mut InputStack) -> Result<Vec<Redir>, ParseError> {
        let mut redirs = Vec::new();
        loop {
            match self.peek(input, false)? {
                Token::IoUnit(_)
                | Token::Op(
                    OpKind::Less
                    | OpKind::Great
                    | OpKind::DGreat
                    | OpKind::DLess
                    | OpKind::DLessDash
                    | OpKind::GreatAmp
                    | OpKind::LessAmp,
                ) => redirs.push(self.parse_redir(input)?),
                _ => break,
            }
        }
        Ok(redirs)
    }

    /// Resolve every here-document queued while parsing the command that
    /// just ended at a bare newline: diverts subsequent lines from the
    /// input stack into each body, up to its tag, in the order queued.
    fn gather_heredocs(&mut self, input: &mut InputStack) -> Result<HashMap<u32, HereDoc>, ParseError> {
        let mut out = HashMap::new();
        for pending in self.pending_heredocs.drain(..) {
            let mut body = String::new();
            loop {
                let mut line = Vec::new();
                let mut saw_any = false;
                loop {
                    match input.readc() {
                        Some(b'\n') => {
                            saw_any = true;
                            break;
                        }
                        Some(b) => {
                            saw_any = true;
                            line.push(b);
                        }
                        None => break,
                    }
                }
                if !saw_any && line.is_empty() {
                    return Err(ParseError::new(format!(
                        "here-document for `{}` never terminated",
                        pending.tag
                    )));
                }
                let mut text = String::from_utf8_lossy(&line).into_owned();
                if pending.strip_tabs {
                    text = text.trim_start_matches('\t').to_string();
                }
                if text == pending.tag {
                    break;
                }
                body.push_str(&text);
                body.push('\n');
            }
            out.insert(
                pending.ticket,
                HereDoc {
                    tag: pending.tag,
                    body,
                },
            );
        }
        Ok(out)
    }

    fn expect_word(&mut self, input: &mut InputStack) -> Result<Word, ParseError> {
        match self.bump(input, false)? {
            Token::Word(w) => Ok(w),
            other => Err(ParseError::new(format!("expected a word, got {other:?}"))),
        }
    }

    fn expect_bare_word(&mut self, input: &mut InputStack, s: &str) -> Result<(), ParseError> {
        match self.bump(input, false)? {
            Token::Word(w) if w.is_bare_word(s) => Ok(()),
            other => Err(ParseError::new(format!("expected `{s}`, got {other:?}"))),
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn chain_list(acc: Option<Cmd>, next: Cmd) -> Cmd {
    match acc {
        None => next,
        Some(prev) => Cmd::List(Box::new(prev), Box::new(next)),
    }
}

fn set_last_async(cmd: Cmd) -> Cmd {
    match cmd {
        Cmd::List(l, r) => Cmd::List(l, Box::new(set_last_async(*r))),
        other => Cmd::Async(Box::new(other)),
    }
}

/// Walk a freshly parsed tree filling in each here-document `Redir`'s body
/// from the tickets resolved by [`Parser::gather_heredocs`].
fn fill_heredocs(cmd: &mut Cmd, map: &HashMap<u32, HereDoc>) {
    match cmd {
        Cmd::Simple(s) => fill_redirs(&mut s.redirs, map),
        Cmd::Paren(c, redirs) | Cmd::Brace(c, redirs) => {
            fill_heredocs(c, map);
            fill_redirs(redirs, map);
        }
        Cmd::Pipe(a, b) | Cmd::List(a, b) | Cmd::And(a, b) | Cmd::Or(a, b) => {
            fill_heredocs(a, map);
            fill_heredocs(b, map);
        }
        Cmd::Async(c) => fill_heredocs(c, map),
        Cmd::For { body, redirs, .. } => {
            fill_heredocs(body, map);
            fill_redirs(redirs, map);
        }
        Cmd::While { cond, body, redirs } | Cmd::Until { cond, body, redirs } => {
            fill_heredocs(cond, map);
            fill_heredocs(body, map);
            fill_redirs(redirs, map);
        }
        Cmd::If { cond, then_, else_, redirs } | Cmd::Elif { cond, then_, else_, redirs } => {
            fill_heredocs(cond, map);
            fill_heredocs(then_, map);
            if let Some(e) = else_ {
                fill_heredocs(e, map);
            }
            fill_redirs(redirs, map);
        }
        Cmd::Case { arms, redirs, .. } => {
            for arm in arms {
                if let Some(b) = &mut arm.body {
                    fill_heredocs(b, map);
                }
            }
            fill_redirs(redirs, map);
        }
        Cmd::Dot { .. } | Cmd::Empty => {}
    }
}

fn fill_redirs(redirs: &mut [Redir], map: &HashMap<u32, HereDoc>) {
    for r in redirs {
        if matches!(r.op, RedirOp::Here { .. }) {
            if let Ok(ticket) = r.target.to_string_lossy().parse::<u32>() {
                if let Some(hd) = map.get(&ticket) {
                    r.here_doc = Some(hd.clone());
                }
            }
            r.target = Word::new();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Generator, Task};

    fn parse_one(src: &str) -> Cmd {
        let mut stack = InputStack::new();
        stack.push(Generator::from_str(src), Task::Other).unwrap();
        let mut parser = Parser::new();
        parser.next_command(&mut stack).unwrap().unwrap()
    }

    #[test]
    fn parses_simple_command() {
        let cmd = parse_one("echo hi\n");
        match cmd {
            Cmd::Simple(s) => assert_eq!(s.words.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_pipeline() {
        let cmd = parse_one("a | b\n");
        assert!(matches!(cmd, Cmd::Pipe(_, _)));
    }

    #[test]
    fn parses_and_or_left_assoc() {
        let cmd = parse_one("a && b || c\n");
        match cmd {
            Cmd::Or(l, _) => assert!(matches!(*l, Cmd::And(_, _))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_if_else() {
        let cmd = parse_one("if a; then b; else c; fi\n");
        match cmd {
            Cmd::If { else_, .. } => assert!(else_.is_some()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_for_loop() {
        let cmd = parse_one("for x in a b c; do echo $x; done\n");
        match cmd {
            Cmd::For { var, words, .. } => {
                assert_eq!(var, "x");
                assert_eq!(words.unwrap().len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_assignment_prefix() {
        let cmd = parse_one("X=1 echo hi\n");
        match cmd {
            Cmd::Simple(s) => {
                assert_eq!(s.assigns.len(), 1);
                assert_eq!(s.words.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_redirection() {
        let cmd = parse_one("echo hi > out.txt\n");
        match cmd {
            Cmd::Simple(s) => assert_eq!(s.redirs.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_here_doc_body() {
        let cmd = parse_one("cat <<EOF\nhello\nEOF\n");
        match cmd {
            Cmd::Simple(s) => {
                let redir = &s.redirs[0];
                let hd = redir.here_doc.as_ref().expect("here-doc body filled in");
                assert_eq!(hd.body, "hello\n");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_case_statement() {
        let cmd = parse_one("case $x in a) echo a ;; *) echo other ;; esac\n");
        match cmd {
            Cmd::Case { arms, .. } => assert_eq!(arms.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }
}
