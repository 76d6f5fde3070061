//! The input stack: a bounded LIFO of byte generators feeding the lexer.
//!
//! Expansion, `.`, `eval`, backticks, and here-documents all work by
//! pushing a new generator on top of the stack and letting the lexer keep
//! calling [`InputStack::readc`] — it neither knows nor cares whether the
//! bytes are coming from the original script, a command-substitution
//! pipe, or a synthesized word list.

use std::io::Write;
use std::os::fd::RawFd;

use nix::unistd;

/// Why a frame's generator exists, used to decide EOF and echo behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// A real file (script, `.`-sourced file, here-document temp file).
    File,
    /// The stdout pipe of a backticked/`` $(...) ``-substituted command.
    Grave,
    /// A synthesized replacement string for a `$name`/`${...}` expansion.
    Dollar,
    /// Anything else (trap bodies, `eval` arguments, word lists).
    Other,
}

const FILE_BUF_CAP: usize = 512;

/// One input source. Every variant yields raw bytes one at a time through
/// [`Generator::read_one`]; framing (line buffering, prompts) lives here
/// rather than in the lexer.
pub enum Generator {
    /// A file descriptor read in `FILE_BUF_CAP`-byte chunks.
    File {
        fd: RawFd,
        buf: Vec<u8>,
        pos: usize,
        len: usize,
        close_on_drop: bool,
    },
    /// Interactive input: one byte at a time from a fd, printing `prompt`
    /// to stderr at the start of every logical line. This is the fallback
    /// path the engine uses when no fancier line-editing front end (see
    /// the `LineSource` hook in `driver.rs`) is wired in.
    Line {
        fd: RawFd,
        prompt: String,
        at_line_start: bool,
    },
    /// An in-memory byte string (a word being expanded, a trap body, an
    /// `eval` argument, a `-c` command string).
    Str { bytes: Vec<u8>, pos: usize },
    /// A list of already-expanded words, re-fed as a single space-joined
    /// byte stream (used by `eval` and by re-scanning `$@`).
    WordList {
        words: Vec<String>,
        word_idx: usize,
        byte_idx: usize,
    },
    /// A here-document temp file, already materialized and opened.
    HereTemp {
        fd: RawFd,
        buf: Vec<u8>,
        pos: usize,
        len: usize,
    },
}

impl Generator {
    /// Build a generator over an in-memory string.
    #[must_use]
    pub fn from_str(s: impl Into<String>) -> Self {
        Generator::Str {
            bytes: s.into().into_bytes(),
            pos: 0,
        }
    }

    /// Build a generator over an already-open file descriptor, read in
    /// chunks. `close_on_drop` should be true for descriptors the input
    /// stack itself opened (scripts, `.`-sourced files) and false for ones
    /// owned elsewhere (inherited stdin).
    #[must_use]
    pub fn from_fd(fd: RawFd, close_on_drop: bool) -> Self {
        Generator::File {
            fd,
            buf: vec![0u8; FILE_BUF_CAP],
            pos: 0,
            len: 0,
            close_on_drop,
        }
    }

    /// Build an interactive line generator over `fd`, printing `prompt`
    /// before each logical line.
    #[must_use]
    pub fn interactive(fd: RawFd, prompt: impl Into<String>) -> Self {
        Generator::Line {
            fd,
            prompt: prompt.into(),
            at_line_start: true,
        }
    }

    /// Build a word-list generator (used by `eval`).
    #[must_use]
    pub fn word_list(words: Vec<String>) -> Self {
        Generator::WordList {
            words,
            word_idx: 0,
            byte_idx: 0,
        }
    }

    /// Build a here-document generator over an already-opened temp file.
    #[must_use]
    pub fn here_temp(fd: RawFd) -> Self {
        Generator::HereTemp {
            fd,
            buf: vec![0u8; FILE_BUF_CAP],
            pos: 0,
            len: 0,
        }
    }

    fn read_one(&mut self) -> Option<u8> {
        match self {
            Generator::File {
                fd,
                buf,
                pos,
                len,
                ..
            }
            | Generator::HereTemp { fd, buf, pos, len } => {
                if *pos >= *len {
                    let n = unistd::read(*fd, buf).unwrap_or(0);
                    if n == 0 {
                        return None;
                    }
                    *len = n;
                    *pos = 0;
                }
                let b = buf[*pos];
                *pos += 1;
                Some(b)
            }
            Generator::Line {
                fd,
                prompt,
                at_line_start,
            } => {
                if *at_line_start {
                    let _ = std::io::stderr().write_all(prompt.as_bytes());
                    let _ = std::io::stderr().flush();
                    *at_line_start = false;
                }
                let mut one = [0u8; 1];
                let n = unistd::read(*fd, &mut one).unwrap_or(0);
                if n == 0 {
                    return None;
                }
                if one[0] == b'\n' {
                    *at_line_start = true;
                }
                Some(one[0])
            }
            Generator::Str { bytes, pos } => {
                if *pos >= bytes.len() {
                    return None;
                }
                let b = bytes[*pos];
                *pos += 1;
                Some(b)
            }
            Generator::WordList {
                words,
                word_idx,
                byte_idx,
            } => loop {
                if *word_idx >= words.len() {
                    return None;
                }
                let w = words[*word_idx].as_bytes();
                if *byte_idx < w.len() {
                    let b = w[*byte_idx];
                    *byte_idx += 1;
                    return Some(b);
                }
                *word_idx += 1;
                *byte_idx = 0;
                if *word_idx < words.len() {
                    return Some(b' ');
                }
                return None;
            },
        }
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        match self {
            Generator::File {
                fd, close_on_drop, ..
            } if *close_on_drop => {
                let _ = unistd::close(*fd);
            }
            Generator::HereTemp { fd, .. } => {
                let _ = unistd::close(*fd);
            }
            _ => {}
        }
    }
}

struct InputFrame {
    gen: Generator,
    task: Task,
    pushback: Option<u8>,
    prev_byte: u8,
    eof_newline_pending: bool,
    exhausted: bool,
}

/// Hard error: the stack would exceed its fixed capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputTooDeep;

impl std::fmt::Display for InputTooDeep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "shell input nested too deeply")
    }
}
impl std::error::Error for InputTooDeep {}

/// Default capacity (`NPUSH` in the original), chosen to comfortably cover
/// realistic nesting of `.`/backticks/here-docs/traps.
pub const NPUSH: usize = 16;

/// A bounded stack of input generators. The top of the stack is always the
/// currently-consuming frame.
pub struct InputStack {
    frames: Vec<InputFrame>,
    cap: usize,
    /// `-v`: echo every byte read from the bottom frame to stderr.
    pub verbose: bool,
}

impl InputStack {
    /// An empty stack with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        InputStack {
            frames: Vec::new(),
            cap: NPUSH,
            verbose: false,
        }
    }

    /// Current nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// `true` once every frame has been exhausted and popped.
    #[must_use]
    pub fn at_eof(&self) -> bool {
        self.frames.is_empty()
    }

    /// Push a new generator on top of the stack.
    ///
    /// # Errors
    ///
    /// Returns [`InputTooDeep`] if the stack is already at capacity.
    pub fn push(&mut self, gen: Generator, task: Task) -> Result<(), InputTooDeep> {
        if self.frames.len() >= self.cap {
            return Err(InputTooDeep);
        }
        self.frames.push(InputFrame {
            gen,
            task,
            pushback: None,
            prev_byte: 0,
            eof_newline_pending: false,
            exhausted: false,
        });
        Ok(())
    }

    /// Pop the top frame, discarding it.
    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// The `Task` tag of the current top frame, if any.
    #[must_use]
    pub fn top_task(&self) -> Option<Task> {
        self.frames.last().map(|f| f.task)
    }

    /// Read one byte, transparently popping exhausted frames. Returns
    /// `None` only when the whole stack is empty.
    pub fn readc(&mut self) -> Option<u8> {
        loop {
            let depth = self.frames.len();
            let frame = self.frames.last_mut()?;

            if let Some(b) = frame.pushback.take() {
                frame.prev_byte = b;
                self.echo_if_bottom(depth, b);
                return Some(b);
            }

            if frame.exhausted {
                self.frames.pop();
                continue;
            }

            if frame.eof_newline_pending {
                frame.eof_newline_pending = false;
                frame.exhausted = true;
                frame.prev_byte = b'\n';
                self.echo_if_bottom(depth, b'\n');
                return Some(b'\n');
            }

            match frame.gen.read_one() {
                Some(b) => {
                    frame.prev_byte = b;
                    self.echo_if_bottom(depth, b);
                    return Some(b);
                }
                None => {
                    if frame.task == Task::File && frame.prev_byte != b'\n' && frame.prev_byte != 0
                    {
                        frame.eof_newline_pending = true;
                        continue;
                    }
                    frame.exhausted = true;
                    continue;
                }
            }
        }
    }

    fn echo_if_bottom(&self, depth: usize, b: u8) {
        if self.verbose && depth == 1 {
            let _ = std::io::stderr().write_all(&[b]);
        }
    }

    /// Update the prompt string of the current top frame, if it's a
    /// [`Generator::Line`] — used to switch between `PS1` and `PS2` as the
    /// parser enters and leaves a continued construct. A no-op for every
    /// other generator kind.
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        if let Some(frame) = self.frames.last_mut() {
            if let Generator::Line { prompt: p, .. } = &mut frame.gen {
                *p = prompt.into();
            }
        }
    }

    /// Push back a single byte onto the current top frame. Silently does
    /// nothing if the stack is empty — callers only ever unget a byte they
    /// just read, so an empty stack here means the frame that produced it
    /// has already been popped and the pushback is moot.
    pub fn unget(&mut self, b: u8) {
        if let Some(frame) = self.frames.last_mut() {
            frame.pushback = Some(b);
        }
    }
}

impl Default for InputStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_string_generator_in_order() {
        let mut stack = InputStack::new();
        stack.push(Generator::from_str("ab"), Task::Other).unwrap();
        assert_eq!(stack.readc(), Some(b'a'));
        assert_eq!(stack.readc(), Some(b'b'));
        assert_eq!(stack.readc(), None);
        assert!(stack.at_eof());
    }

    #[test]
    fn unget_replays_one_byte() {
        let mut stack = InputStack::new();
        stack.push(Generator::from_str("xy"), Task::Other).unwrap();
        let b = stack.readc().unwrap();
        stack.unget(b);
        assert_eq!(stack.readc(), Some(b));
        assert_eq!(stack.readc(), Some(b'y'));
    }

    #[test]
    fn nested_frames_pop_in_lifo_order() {
        let mut stack = InputStack::new();
        stack.push(Generator::from_str("outer"), Task::Other).unwrap();
        stack.push(Generator::from_str("in"), Task::Dollar).unwrap();
        assert_eq!(stack.readc(), Some(b'i'));
        assert_eq!(stack.readc(), Some(b'n'));
        // inner exhausted, falls through to outer
        assert_eq!(stack.readc(), Some(b'o'));
    }

    #[test]
    fn word_list_joins_with_spaces() {
        let mut stack = InputStack::new();
        stack
            .push(
                Generator::word_list(vec!["a".into(), "bc".into()]),
                Task::Other,
            )
            .unwrap();
        let mut out = Vec::new();
        while let Some(b) = stack.readc() {
            out.push(b);
        }
        assert_eq!(out, b"a bc");
    }

    #[test]
    fn depth_limit_rejects_overflow() {
        let mut stack = InputStack::new();
        for _ in 0..NPUSH {
            stack.push(Generator::from_str(""), Task::Other).unwrap();
        }
        assert!(stack.push(Generator::from_str(""), Task::Other).is_err());
    }
}
