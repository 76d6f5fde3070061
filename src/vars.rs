//! The shell variable table.
//!
//! Maps a name to a `(value, flags)` pair, tracks positional parameters
//! (`$0…$N`), and resolves the special one-character names (`$?`, `$$`,
//! `$!`, `$#`, `$-`, `$*`, `$@`) without allocating a `Var` for them.

use std::collections::HashMap;
use std::collections::hash_map::Iter as HashMapIter;

/// Per-variable attribute bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VarFlags {
    /// Set by `readonly NAME`; rejects further assignment or `unset`.
    pub readonly: bool,
    /// Set by `export NAME`; included in the child process environment.
    pub exported: bool,
    /// Set when the value came from the process environment at startup,
    /// as opposed to an in-script assignment.
    pub owned: bool,
}

/// A single shell variable.
#[derive(Debug, Clone)]
pub struct Var {
    /// Variable name (without the leading `$`).
    pub name: String,
    /// Current value. Unset variables are simply absent from the table,
    /// not represented by an empty-valued `Var`.
    pub value: String,
    /// Attribute bits.
    pub flags: VarFlags,
}

/// Outcome of an assignment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignResult {
    /// The value was set (or a new variable created).
    Ok,
    /// The name names a `readonly` variable; the assignment was rejected
    /// and the value left unchanged.
    ReadOnly,
}

/// `true` if `s` has the shape `NAME=anything`, where `NAME` is a legal
/// shell identifier (`[_A-Za-z][_A-Za-z0-9]*`).
#[must_use]
pub fn is_assign(s: &str) -> bool {
    split_assign(s).is_some()
}

/// Split `NAME=VALUE` into its two halves if `s` has that shape.
#[must_use]
pub fn split_assign(s: &str) -> Option<(&str, &str)> {
    let eq = s.find('=')?;
    let name = &s[..eq];
    if is_valid_name(name) {
        Some((name, &s[eq + 1..]))
    } else {
        None
    }
}

/// `true` if `name` is a legal shell identifier.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b) if b == b'_' || b.is_ascii_alphabetic() => {}
        _ => return false,
    }
    bytes.all(|b| b == b'_' || b.is_ascii_alphanumeric())
}

/// The variable table: named variables plus positional parameters and the
/// handful of special one-character names.
#[derive(Clone)]
pub struct VarTable {
    vars: HashMap<String, Var>,
    /// `$1..$N`; `$0` is stored separately since `set --` never touches it.
    positional: Vec<String>,
    arg0: String,
    /// `$?` — exit status of the last command.
    pub status: i32,
    /// `$$` — this process's PID.
    pub pid: i32,
    /// `$!` — PID of the most recent background job, if any has run.
    pub last_bg_pid: Option<i32>,
    /// `$-` — the current option-letter string (e.g. `"ev"` for `-e -v`).
    pub option_flags: String,
}

impl VarTable {
    /// Build a table pre-populated from the process environment: every
    /// `NAME=VAL` pair that is a legal identifier becomes an exported,
    /// `owned` shell variable. `SHELL`, `HOME`, `PATH`, `IFS`, `PS1`, `PS2`
    /// get defaults if absent from the environment.
    #[must_use]
    pub fn from_environment(arg0: &str, pid: i32, euid: u32) -> Self {
        let mut table = VarTable {
            vars: HashMap::new(),
            positional: Vec::new(),
            arg0: arg0.to_string(),
            status: 0,
            pid,
            last_bg_pid: None,
            option_flags: String::new(),
        };

        for (key, value) in std::env::vars() {
            if is_valid_name(&key) {
                table.vars.insert(
                    key.clone(),
                    Var {
                        name: key,
                        value,
                        flags: VarFlags {
                            readonly: false,
                            exported: true,
                            owned: true,
                        },
                    },
                );
            }
        }

        table.default_if_unset("IFS", " \t\n");
        table.default_if_unset("PS1", if euid == 0 { "# " } else { "$ " });
        table.default_if_unset("PS2", "> ");
        table.default_if_unset(
            "PATH",
            if euid == 0 {
                "/usr/sbin:/usr/bin:/sbin:/bin"
            } else {
                "/usr/bin:/bin"
            },
        );
        table.default_if_unset("HOME", "/");
        table.default_if_unset("SHELL", "/bin/sh");
        table
    }

    fn default_if_unset(&mut self, name: &str, value: &str) {
        if !self.vars.contains_key(name) {
            self.vars.insert(
                name.to_string(),
                Var {
                    name: name.to_string(),
                    value: value.to_string(),
                    flags: VarFlags::default(),
                },
            );
        }
    }

    /// Look up a variable's current value, resolving positional parameters
    /// and special names. Returns `None` for an unset ordinary variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        if let Ok(n) = name.parse::<usize>() {
            return self.positional(n);
        }
        match name {
            "0" => return Some(self.arg0.clone()),
            "#" => return Some(self.positional.len().to_string()),
            "?" => return Some(self.status.to_string()),
            "$" => return Some(self.pid.to_string()),
            "!" => return Some(self.last_bg_pid.map_or_else(String::new, |p| p.to_string())),
            "-" => return Some(self.option_flags.clone()),
            "*" | "@" => return Some(self.positional.join(" ")),
            _ => {}
        }
        self.vars.get(name).map(|v| v.value.clone())
    }

    /// The positional parameters as a slice, for `$@`/`$*` field splitting.
    #[must_use]
    pub fn positional_params(&self) -> &[String] {
        &self.positional
    }

    fn positional(&self, n: usize) -> Option<String> {
        if n == 0 {
            return Some(self.arg0.clone());
        }
        self.positional.get(n - 1).cloned()
    }

    /// Replace the positional parameter list (`set -- ...`).
    pub fn set_positional(&mut self, args: Vec<String>) {
        self.positional = args;
    }

    /// Shift the positional parameters left by `n` (the `shift` builtin).
    /// Returns `false` if `n` exceeds `$#`.
    pub fn shift(&mut self, n: usize) -> bool {
        if n > self.positional.len() {
            return false;
        }
        self.positional.drain(0..n);
        true
    }

    /// Set `argv[0]` (used by `exec` with a leading `-name` and by script
    /// invocation).
    pub fn set_arg0(&mut self, arg0: impl Into<String>) {
        self.arg0 = arg0.into();
    }

    /// Assign `value` to `name`. Rejects the write if `name` is
    /// `readonly`, leaving the stored value untouched. `name` must already
    /// have passed [`is_valid_name`]; numeric names are rejected by the
    /// caller (assigning to a positional parameter this way is illegal).
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> AssignResult {
        if let Some(existing) = self.vars.get(name) {
            if existing.flags.readonly {
                return AssignResult::ReadOnly;
            }
        }
        let entry = self.vars.entry(name.to_string()).or_insert_with(|| Var {
            name: name.to_string(),
            value: String::new(),
            flags: VarFlags::default(),
        });
        entry.value = value.into();
        AssignResult::Ok
    }

    /// Mark `name` as exported, creating it (empty) if unset.
    pub fn export(&mut self, name: &str) {
        self.vars
            .entry(name.to_string())
            .or_insert_with(|| Var {
                name: name.to_string(),
                value: String::new(),
                flags: VarFlags::default(),
            })
            .flags
            .exported = true;
    }

    /// Mark `name` as readonly, creating it (empty) if unset.
    pub fn ronly(&mut self, name: &str) {
        self.vars
            .entry(name.to_string())
            .or_insert_with(|| Var {
                name: name.to_string(),
                value: String::new(),
                flags: VarFlags::default(),
            })
            .flags
            .readonly = true;
    }

    /// `true` if `name` is currently marked readonly.
    #[must_use]
    pub fn is_readonly(&self, name: &str) -> bool {
        self.vars.get(name).is_some_and(|v| v.flags.readonly)
    }

    /// Remove `name` from the table. Returns `false` (without unsetting)
    /// if the variable is readonly.
    pub fn unset(&mut self, name: &str) -> bool {
        if self.is_readonly(name) {
            return false;
        }
        self.vars.remove(name);
        true
    }

    /// Iterate over every variable marked exported, for building a child
    /// process's environment block.
    pub fn iter_exported(&self) -> impl Iterator<Item = &Var> {
        self.vars.values().filter(|v| v.flags.exported)
    }

    /// Iterate over every variable in the table (for `set`/`export -p`
    /// dumps), in arbitrary order.
    #[must_use]
    pub fn iter(&self) -> HashMapIter<'_, String, Var> {
        self.vars.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_assign_recognizes_shape() {
        assert!(is_assign("FOO=bar"));
        assert!(is_assign("FOO="));
        assert!(!is_assign("FOO"));
        assert!(!is_assign("2FOO=bar"));
        assert!(!is_assign("FOO-BAR=baz"));
    }

    #[test]
    fn readonly_rejects_reassignment() {
        let mut t = VarTable::from_environment("sh", 1, 1000);
        t.set("X", "1");
        t.ronly("X");
        assert_eq!(t.set("X", "2"), AssignResult::ReadOnly);
        assert_eq!(t.get("X").as_deref(), Some("1"));
    }

    #[test]
    fn positional_params_and_shift() {
        let mut t = VarTable::from_environment("sh", 1, 1000);
        t.set_positional(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(t.get("#").as_deref(), Some("3"));
        assert_eq!(t.get("2").as_deref(), Some("b"));
        assert!(t.shift(1));
        assert_eq!(t.get("1").as_deref(), Some("b"));
        assert!(!t.shift(5));
    }

    #[test]
    fn special_names_resolve() {
        let mut t = VarTable::from_environment("sh", 42, 1000);
        t.status = 7;
        assert_eq!(t.get("?").as_deref(), Some("7"));
        assert_eq!(t.get("$").as_deref(), Some("42"));
        assert_eq!(t.get("!").as_deref(), Some(""));
        t.last_bg_pid = Some(99);
        assert_eq!(t.get("!").as_deref(), Some("99"));
    }

    #[test]
    fn unset_rejected_for_readonly() {
        let mut t = VarTable::from_environment("sh", 1, 1000);
        t.set("X", "1");
        t.ronly("X");
        assert!(!t.unset("X"));
        assert_eq!(t.get("X").as_deref(), Some("1"));
    }
}
