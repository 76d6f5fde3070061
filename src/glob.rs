//! Filename pattern matching (`gmatch`) and directory-descent globbing.
//!
//! Grounded on the original `gmatch()`/`expand()` directory walk: match
//! segment by segment, skip dotfiles unless the pattern segment itself
//! starts with `.`, sort each directory's matches, and return the pattern
//! unchanged (not an error) when nothing matches.

use std::path::{Path, PathBuf};

/// `true` if `pattern` contains any of the recognized glob metacharacters.
#[must_use]
pub fn has_glob_chars(pattern: &str) -> bool {
    pattern.bytes().any(|b| matches!(b, b'*' | b'?' | b'['))
}

/// Match `name` against a single glob `pattern` segment (no `/`).
///
/// Supports `*` (any run of bytes), `?` (any one byte), `[set]`/`[!set]`
/// with `a-z`-style ranges, and literal bytes elsewhere.
#[must_use]
pub fn gmatch(name: &str, pattern: &str) -> bool {
    gmatch_bytes(name.as_bytes(), pattern.as_bytes())
}

fn gmatch_bytes(name: &[u8], pat: &[u8]) -> bool {
    match pat.first() {
        None => name.is_empty(),
        Some(b'*') => {
            // try matching the rest of the pattern at every suffix of name
            (0..=name.len()).any(|i| gmatch_bytes(&name[i..], &pat[1..]))
        }
        Some(b'?') => !name.is_empty() && gmatch_bytes(&name[1..], &pat[1..]),
        Some(b'[') => match_bracket(name, pat),
        Some(&c) => !name.is_empty() && name[0] == c && gmatch_bytes(&name[1..], &pat[1..]),
    }
}

/// Parse and try to match a `[...]` bracket expression at the start of
/// `pat` against the first byte of `name`; recurses into the remainder of
/// the pattern on success.
fn match_bracket(name: &[u8], pat: &[u8]) -> bool {
    if name.is_empty() {
        return false;
    }
    let mut i = 1; // skip '['
    let negate = pat.get(i) == Some(&b'!');
    if negate {
        i += 1;
    }
    let start = i;
    // find the matching ']' — a ']' immediately after '[' or '[!' is literal
    let mut j = i;
    if pat.get(j) == Some(&b']') {
        j += 1;
    }
    while pat.get(j).is_some() && pat[j] != b']' {
        j += 1;
    }
    if j >= pat.len() {
        // unterminated bracket: treat '[' as a literal byte
        return name[0] == b'[' && gmatch_bytes(&name[1..], &pat[1..]);
    }
    let set = &pat[start..j];
    let mut matched = false;
    let mut k = 0;
    while k < set.len() {
        if k + 2 < set.len() && set[k + 1] == b'-' {
            let (lo, hi) = (set[k], set[k + 2]);
            if name[0] >= lo && name[0] <= hi {
                matched = true;
            }
            k += 3;
        } else {
            if set[k] == name[0] {
                matched = true;
            }
            k += 1;
        }
    }
    if matched != negate {
        gmatch_bytes(&name[1..], &pat[j + 1..])
    } else {
        false
    }
}

/// Expand a single pathname pattern by directory descent. `cwd_relative`
/// patterns walk from `base` (normally the process's current directory);
/// absolute patterns walk from `/`.
///
/// Returns the sorted list of matches, or `None` if nothing matched — the
/// caller (the expander) is responsible for falling back to the pattern
/// word unchanged, matching historical Bourne/msh behavior.
#[must_use]
pub fn expand_pattern(pattern: &str, base: &Path) -> Option<Vec<String>> {
    if !has_glob_chars(pattern) {
        return None;
    }
    let absolute = pattern.starts_with('/');
    let segments: Vec<&str> = pattern.trim_start_matches('/').split('/').collect();
    let root = if absolute { PathBuf::from("/") } else { base.to_path_buf() };

    let mut current: Vec<PathBuf> = vec![PathBuf::new()];
    for seg in &segments {
        if !has_glob_chars(seg) {
            for p in &mut current {
                p.push(seg);
            }
            continue;
        }
        let mut next = Vec::new();
        for p in &current {
            let dir = root.join(p);
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            let mut names: Vec<String> = entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|n| seg.starts_with('.') || !n.starts_with('.'))
                .filter(|n| gmatch(n, seg))
                .collect();
            names.sort();
            for n in names {
                let mut child = p.clone();
                child.push(n);
                next.push(child);
            }
        }
        current = next;
        if current.is_empty() {
            return None;
        }
    }

    let mut out: Vec<String> = current
        .into_iter()
        .map(|p| {
            let s = p.to_string_lossy().into_owned();
            if absolute { format!("/{s}") } else { s }
        })
        .collect();
    out.sort();
    if out.is_empty() { None } else { Some(out) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_run() {
        assert!(gmatch("hello.txt", "*.txt"));
        assert!(!gmatch("hello.rs", "*.txt"));
    }

    #[test]
    fn question_matches_one_byte() {
        assert!(gmatch("cat", "c?t"));
        assert!(!gmatch("ct", "c?t"));
    }

    #[test]
    fn bracket_range_matches() {
        assert!(gmatch("b", "[a-c]"));
        assert!(!gmatch("d", "[a-c]"));
    }

    #[test]
    fn negated_bracket() {
        assert!(gmatch("d", "[!a-c]"));
        assert!(!gmatch("b", "[!a-c]"));
    }

    #[test]
    fn hidden_files_require_explicit_dot() {
        assert!(!gmatch(".hidden", "*"));
        assert!(gmatch(".hidden", ".*"));
    }

    #[test]
    fn expand_pattern_in_tempdir() {
        let dir = std::env::temp_dir().join(format!("msh-glob-test-{}", std::process::id()));
        let _ = std::fs::create_dir(&dir);
        std::fs::write(dir.join("a.txt"), b"").unwrap();
        std::fs::write(dir.join("b.txt"), b"").unwrap();
        std::fs::write(dir.join("c.log"), b"").unwrap();
        let mut matches = expand_pattern("*.txt", &dir).unwrap();
        matches.sort();
        assert_eq!(matches, vec!["a.txt".to_string(), "b.txt".to_string()]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn no_match_returns_none() {
        assert!(expand_pattern("*.zzz_no_such_ext", Path::new("/")).is_none());
    }
}
