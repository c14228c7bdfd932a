//! Linewise diff via longest-common-subsequence dynamic programming, plus a
//! byte-equality predicate used to filter spurious change notifications.

use std::fs;
use std::io;
use std::path::Path;

/// Determines whether two files hold identical bytes.
///
/// Returns `true` only if both paths exist and their contents are equal.
/// Referring to the same path short-circuits to `true`; a missing file on
/// either side yields `false` rather than an error.
pub fn identical(a: &Path, b: &Path) -> io::Result<bool> {
    if !a.exists() || !b.exists() {
        return Ok(false);
    }
    if a == b {
        return Ok(true);
    }
    Ok(fs::read(a)? == fs::read(b)?)
}

/// Linewise diff between an older and a newer version of a file.
///
/// If only one side exists, every line of the existing side is reported as
/// removed (`"< "`, old side) or added (`"> "`, new side). If neither side
/// exists the diff is empty.
pub fn diff_files(old: &Path, new: &Path) -> io::Result<Vec<String>> {
    match (old.exists(), new.exists()) {
        (false, true) => Ok(prefix_lines("> ", &read_lines(new)?)),
        (true, false) => Ok(prefix_lines("< ", &read_lines(old)?)),
        (false, false) => Ok(Vec::new()),
        (true, true) => Ok(diff_lines(&read_lines(old)?, &read_lines(new)?)),
    }
}

/// Diff between two line sequences.
///
/// Builds the `(|x|+1) x (|y|+1)` LCS length table and backtracks from the
/// far corner. Unchanged lines are prefixed `"= "`, lines only in `y` with
/// `"> "`, lines only in `x` with `"< "`. On ties the insertion branch is
/// taken before the deletion branch, so the output is deterministic.
pub fn diff_lines(x: &[String], y: &[String]) -> Vec<String> {
    let m = x.len();
    let n = y.len();
    let mut lookup = vec![vec![0usize; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            lookup[i][j] = if x[i - 1] == y[j - 1] {
                lookup[i - 1][j - 1] + 1
            } else {
                lookup[i - 1][j].max(lookup[i][j - 1])
            };
        }
    }

    // Walk back from (m, n), emitting in reverse order.
    let mut result = Vec::with_capacity(m.max(n));
    let mut i = m;
    let mut j = n;
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && x[i - 1] == y[j - 1] {
            result.push(format!("= {}", x[i - 1]));
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || lookup[i][j - 1] >= lookup[i - 1][j]) {
            result.push(format!("> {}", y[j - 1]));
            j -= 1;
        } else {
            result.push(format!("< {}", x[i - 1]));
            i -= 1;
        }
    }
    result.reverse();
    result
}

/// Read a file as text lines, replacing invalid UTF-8 sequences.
pub fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::to_owned)
        .collect())
}

fn prefix_lines(prefix: &str, lines: &[String]) -> Vec<String> {
    lines.iter().map(|line| format!("{prefix}{line}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_equal_sequences_are_all_retained() {
        let x = lines(&["one", "two"]);
        assert_eq!(diff_lines(&x, &x), lines(&["= one", "= two"]));
    }

    #[test]
    fn test_single_replacement_prefers_insertion_first() {
        let x = lines(&["a"]);
        let y = lines(&["b"]);
        assert_eq!(diff_lines(&x, &y), lines(&["< a", "> b"]));
    }

    #[test]
    fn test_empty_sides() {
        let y = lines(&["p", "q"]);
        assert_eq!(diff_lines(&[], &y), lines(&["> p", "> q"]));
        assert_eq!(diff_lines(&y, &[]), lines(&["< p", "< q"]));
        assert_eq!(diff_lines(&[], &[]), Vec::<String>::new());
    }

    #[test]
    fn test_interleaved_changes() {
        let x = lines(&["aaaa", "bbbb", "cccc"]);
        let y = lines(&["aaaa", "dddd", "eeee", "cccc"]);
        assert_eq!(
            diff_lines(&x, &y),
            lines(&["= aaaa", "< bbbb", "> dddd", "> eeee", "= cccc"])
        );
    }
}
