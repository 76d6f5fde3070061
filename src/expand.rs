//! Word expansion: parameter substitution, command substitution, field
//! splitting, and globbing.
//!
//! Grounded on the original `blank()`/`subgetc()`/`onechar()` pipeline: each
//! word is pushed onto a private [`InputStack`] as a `Str` generator and
//! re-scanned a byte at a time, exactly like any other input source — `$`
//! and `` ` `` are detected by [`subgetc`]-equivalent logic inline rather
//! than by a separate substitution pass over the already-built string.

use std::fmt;
use std::path::Path;

use bitflags::bitflags;

use crate::ast::{Quote, Word};
use crate::glob;
use crate::input::{Generator, InputStack, Task};
use crate::vars::VarTable;

bitflags! {
    /// Which expansion stages [`eval_words`] should apply. Mirrors the
    /// original's per-call flag word (`DOSUB`, `DOBLANK`, `DOGLOB`, `DOKEY`,
    /// `DOTRIM`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExpandFlags: u8 {
        /// `$`/`` ` `` substitution.
        const SUB   = 0b0000_0001;
        /// IFS field splitting of unquoted results.
        const BLANK = 0b0000_0010;
        /// Pathname globbing of unquoted results.
        const GLOB  = 0b0000_0100;
        /// Recognize `NAME=VALUE` assignment words (used for simple-command
        /// prefix assignments).
        const KEY   = 0b0000_1000;
        /// Strip a single layer of quote marks from the final text.
        const TRIM  = 0b0001_0000;
    }
}

impl ExpandFlags {
    /// The flag set used for ordinary command-word expansion: everything.
    #[must_use]
    pub fn all_stages() -> Self {
        ExpandFlags::SUB | ExpandFlags::BLANK | ExpandFlags::GLOB | ExpandFlags::TRIM
    }

    /// The flag set used for a redirection target or here-doc tag:
    /// substitution and quote trimming, but neither splitting nor globbing.
    #[must_use]
    pub fn redir_target() -> Self {
        ExpandFlags::SUB | ExpandFlags::TRIM
    }
}

/// Error raised while expanding a word.
#[derive(Debug)]
pub enum ExpandError {
    /// `${name?word}` fired with no default message.
    ParamNull(String),
    /// `${name?word}` fired with an explicit message.
    ParamMessage(String, String),
    /// Assignment to a readonly variable inside `${name=word}`.
    ReadOnly(String),
    /// Command substitution failed to run.
    Substitution(String),
    /// Malformed `${...}` expression.
    BadSubstitution(String),
}

impl fmt::Display for ExpandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpandError::ParamNull(name) => write!(f, "{name}: parameter null or not set"),
            ExpandError::ParamMessage(name, msg) => write!(f, "{name}: {msg}"),
            ExpandError::ReadOnly(name) => write!(f, "{name}: is read only"),
            ExpandError::Substitution(msg) => write!(f, "{msg}"),
            ExpandError::BadSubstitution(word) => write!(f, "{word}: bad substitution"),
        }
    }
}

impl std::error::Error for ExpandError {}

/// Runs the command text captured between a pair of backticks (or
/// `$(...)`) and returns its standard output. Implemented by the evaluator
/// (`exec.rs`/`shell.rs`); kept as a trait here so `expand.rs` doesn't need
/// to depend on the parser/evaluator to be compiled and tested in
/// isolation.
pub trait CommandRunner {
    /// Run `src` as a shell command list and return its captured stdout,
    /// with a single trailing newline run stripped (POSIX command
    /// substitution semantics).
    fn run_capture(&mut self, src: &str) -> Result<Vec<u8>, ExpandError>;
}

/// A `CommandRunner` that always fails; useful for expanding words that are
/// statically known not to contain command substitution (e.g. a `for`
/// loop's already-literal word list) without wiring up a real evaluator.
pub struct NoCommands;

impl CommandRunner for NoCommands {
    fn run_capture(&mut self, src: &str) -> Result<Vec<u8>, ExpandError> {
        Err(ExpandError::Substitution(format!(
            "command substitution not available here: `{src}`"
        )))
    }
}

/// Expand every word in `words`, producing the final field list (after
/// parameter/command substitution, IFS splitting, and globbing).
///
/// # Errors
///
/// Returns [`ExpandError`] on a bad `${...}` form, a fired `${name?msg}`,
/// a rejected readonly assignment, or a failed command substitution.
pub fn eval_words(
    words: &[Word],
    vars: &mut VarTable,
    runner: &mut dyn CommandRunner,
    flags: ExpandFlags,
) -> Result<Vec<String>, ExpandError> {
    let mut out = Vec::new();
    for w in words {
        out.extend(eval_word(w, vars, runner, flags)?);
    }
    Ok(out)
}

/// Expand a single word into zero or more fields.
///
/// # Errors
///
/// See [`eval_words`].
pub fn eval_word(
    word: &Word,
    vars: &mut VarTable,
    runner: &mut dyn CommandRunner,
    flags: ExpandFlags,
) -> Result<Vec<String>, ExpandError> {
    let expanded = substitute(word, vars, runner, flags)?;

    let fields: Vec<(String, bool)> = if flags.contains(ExpandFlags::BLANK) {
        split_fields(&expanded, vars)
    } else {
        vec![(
            expanded.iter().map(|(b, _)| *b as char).collect(),
            expanded.iter().all(|(_, q)| q.suppresses_split()),
        )]
    };

    let mut out = Vec::new();
    for (text, quoted) in fields {
        if text.is_empty() && !quoted {
            continue;
        }
        if flags.contains(ExpandFlags::GLOB) && !quoted && glob::has_glob_chars(&text) {
            match glob::expand_pattern(&text, Path::new(".")) {
                Some(matches) => out.extend(matches),
                None => out.push(text),
            }
        } else {
            out.push(text);
        }
    }
    Ok(out)
}

/// Run `$`/`` ` `` substitution over `word`, returning `(byte, quote)`
/// pairs for the expanded text — substitution results inherit the
/// triggering byte's quote state so later stages still know whether to
/// split/glob them.
fn substitute(
    word: &Word,
    vars: &mut VarTable,
    runner: &mut dyn CommandRunner,
    flags: ExpandFlags,
) -> Result<Vec<(u8, Quote)>, ExpandError> {
    let mut out = Vec::new();
    let bytes: Vec<(u8, Quote)> = word.iter().collect();
    let mut i = 0;
    while i < bytes.len() {
        let (b, q) = bytes[i];
        if b == b'$' && flags.contains(ExpandFlags::SUB) && q.substitutes() {
            let (text, consumed) = expand_dollar(&bytes[i + 1..], vars, runner, flags)?;
            for c in text.bytes() {
                out.push((c, q));
            }
            i += 1 + consumed;
        } else if b == b'`' && flags.contains(ExpandFlags::SUB) && q.substitutes() {
            let (body, consumed) = collect_backtick_body(&bytes[i + 1..]);
            let captured = runner.run_capture(&body)?;
            for c in captured {
                out.push((c, q));
            }
            i += 1 + consumed + 1; // opening + body + closing backtick
        } else {
            out.push((b, q));
            i += 1;
        }
    }
    Ok(out)
}

/// Find the matching closing backtick, honoring `\` `` \` `` escapes, and
/// return the unescaped body plus how many bytes (of the body, not
/// counting the closing backtick) were consumed.
fn collect_backtick_body(rest: &[(u8, Quote)]) -> (String, usize) {
    let mut body = String::new();
    let mut i = 0;
    while i < rest.len() {
        let (b, _) = rest[i];
        if b == b'`' {
            return (body, i);
        }
        if b == b'\\' && i + 1 < rest.len() {
            body.push(rest[i + 1].0 as char);
            i += 2;
        } else {
            body.push(b as char);
            i += 1;
        }
    }
    (body, i)
}

/// Expand the parameter/substitution form starting right after a `$`.
/// Returns the replacement text and how many bytes of `rest` were
/// consumed.
fn expand_dollar(
    rest: &[(u8, Quote)],
    vars: &mut VarTable,
    runner: &mut dyn CommandRunner,
    flags: ExpandFlags,
) -> Result<(String, usize), ExpandError> {
    match rest.first() {
        Some((b'{', _)) => expand_braced(&rest[1..], vars, runner, flags),
        Some((b, _)) if b.is_ascii_digit() || matches!(b, b'?' | b'$' | b'!' | b'#' | b'-' | b'*' | b'@') => {
            let name = (*b as char).to_string();
            Ok((vars.get(&name).unwrap_or_default(), 1))
        }
        Some((b, _)) if b.is_ascii_alphabetic() || *b == b'_' => {
            let mut n = 0;
            let mut name = String::new();
            while let Some((c, _)) = rest.get(n) {
                if c.is_ascii_alphanumeric() || *c == b'_' {
                    name.push(*c as char);
                    n += 1;
                } else {
                    break;
                }
            }
            Ok((vars.get(&name).unwrap_or_default(), n))
        }
        _ => Ok((String::new(), 0)),
    }
}

/// Expand a `${...}` form, given the bytes right after the opening `{`.
/// Handles bare `${name}` and the four POSIX default-value operators.
fn expand_braced(
    rest: &[(u8, Quote)],
    vars: &mut VarTable,
    runner: &mut dyn CommandRunner,
    flags: ExpandFlags,
) -> Result<(String, usize), ExpandError> {
    let close = rest
        .iter()
        .position(|(b, _)| *b == b'}')
        .ok_or_else(|| ExpandError::BadSubstitution("${".to_string()))?;
    let inner: String = rest[..close].iter().map(|(b, _)| *b as char).collect();

    let (name, op, word) = split_param_op(&inner);
    let value = vars.get(name);

    // Bare (non-colon) operators: only an *unset* variable triggers the
    // right-hand side. An explicitly-assigned empty value (`X=`) counts as
    // set, matching msh.c's `dollar()`, which tests the value pointer
    // against its unset sentinel rather than checking string length.
    let text = match op {
        None => value.unwrap_or_default(),
        Some('-') => value.unwrap_or_else(|| word.to_string()),
        Some('=') => match value {
            Some(v) => v,
            None => {
                if crate::vars::is_valid_name(name) {
                    match vars.set(name, word) {
                        crate::vars::AssignResult::Ok => {}
                        crate::vars::AssignResult::ReadOnly => {
                            return Err(ExpandError::ReadOnly(name.to_string()));
                        }
                    }
                }
                word.to_string()
            }
        },
        Some('+') => value.map_or_else(String::new, |_| word.to_string()),
        Some('?') => match value {
            Some(v) => v,
            None if word.is_empty() => return Err(ExpandError::ParamNull(name.to_string())),
            None => return Err(ExpandError::ParamMessage(name.to_string(), word.to_string())),
        },
        Some(_) => return Err(ExpandError::BadSubstitution(inner)),
    };

    // The default-value word itself may contain further substitutions
    // (e.g. `${x-$y}`); re-run the substitution pass over it when it was
    // actually used (i.e. when `text` was built from `word`, not `value`).
    let needs_rescan = matches!(op, Some('-' | '=' | '+' | '?')) && text == word;
    let text = if needs_rescan && flags.contains(ExpandFlags::SUB) {
        let w = Word::unquoted(&text);
        let pairs = substitute(&w, vars, runner, flags)?;
        pairs.iter().map(|(b, _)| *b as char).collect()
    } else {
        text
    };

    Ok((text, close + 1))
}

/// Split `${name OP word}` into `(name, Some(op_char), word)`, or
/// `(name, None, "")` for a bare `${name}`.
fn split_param_op(inner: &str) -> (&str, Option<char>, &str) {
    for (i, c) in inner.char_indices() {
        if matches!(c, '-' | '=' | '+' | '?') {
            return (&inner[..i], Some(c), &inner[i + c.len_utf8()..]);
        }
    }
    (inner, None, "")
}

/// Split expanded text into IFS-delimited fields, following the original's
/// `blank()`: runs of IFS whitespace collapse, a quoted empty field is
/// preserved, an all-quoted run never splits regardless of IFS content.
fn split_fields(expanded: &[(u8, Quote)], vars: &VarTable) -> Vec<(String, bool)> {
    let ifs = vars.get("IFS").unwrap_or_else(|| " \t\n".to_string());
    if expanded.is_empty() {
        return vec![(String::new(), true)];
    }

    let mut fields = Vec::new();
    let mut current = String::new();
    let mut current_quoted = true;
    let mut started = false;

    for &(b, q) in expanded {
        let suppress = q.suppresses_split();
        if !suppress && ifs.contains(b as char) {
            if started {
                fields.push((std::mem::take(&mut current), current_quoted));
                started = false;
                current_quoted = true;
            }
            continue;
        }
        current.push(b as char);
        current_quoted &= suppress;
        started = true;
    }
    if started || !fields.is_empty() {
        fields.push((current, current_quoted));
    } else {
        fields.push((current, true));
    }
    fields
}

/// Build a command-substitution input source (used when a backtick body
/// needs to be re-parsed rather than captured as plain text — kept
/// available for callers that want to feed a substitution body straight
/// back through the lexer, e.g. nested `eval`).
#[must_use]
pub fn push_expansion_source(stack: &mut InputStack, text: String, task: Task) -> bool {
    stack.push(Generator::from_str(text), task).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vt() -> VarTable {
        VarTable::from_environment("sh", 100, 1000)
    }

    #[test]
    fn bare_variable_expands() {
        let mut vars = vt();
        vars.set("FOO", "bar");
        let w = {
            let mut w = Word::new();
            w.push(b'$', Quote::Bare);
            w.push_str("FOO", Quote::Bare);
            w
        };
        let out = eval_word(&w, &mut vars, &mut NoCommands, ExpandFlags::all_stages()).unwrap();
        assert_eq!(out, vec!["bar".to_string()]);
    }

    #[test]
    fn default_value_used_when_unset() {
        let mut vars = vt();
        let inner = "X-fallback".to_string();
        let (text, _) = expand_braced(
            &inner.bytes().map(|b| (b, Quote::Bare)).chain(std::iter::once((b'}', Quote::Bare))).collect::<Vec<_>>(),
            &mut vars,
            &mut NoCommands,
            ExpandFlags::all_stages(),
        )
        .unwrap();
        assert_eq!(text, "fallback");
    }

    #[test]
    fn field_splitting_on_default_ifs() {
        let vars = vt();
        let expanded: Vec<(u8, Quote)> = "a  b".bytes().map(|b| (b, Quote::Bare)).collect();
        let fields = split_fields(&expanded, &vars);
        let texts: Vec<String> = fields.into_iter().map(|(t, _)| t).collect();
        assert_eq!(texts, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn double_quoted_text_never_splits() {
        let vars = vt();
        let expanded: Vec<(u8, Quote)> = "a b".bytes().map(|b| (b, Quote::DQuoted)).collect();
        let fields = split_fields(&expanded, &vars);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].0, "a b");
    }

    #[test]
    fn unset_param_question_mark_errors() {
        let mut vars = vt();
        let inner = "Y?custom message".to_string();
        let err = expand_braced(
            &inner.bytes().map(|b| (b, Quote::Bare)).chain(std::iter::once((b'}', Quote::Bare))).collect::<Vec<_>>(),
            &mut vars,
            &mut NoCommands,
            ExpandFlags::all_stages(),
        )
        .unwrap_err();
        assert!(matches!(err, ExpandError::ParamMessage(_, _)));
    }
}
