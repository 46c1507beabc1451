//! Batch separator handling for raw scripts.
//!
//! Management tools accept scripts split into batches by a separator line
//! (`GO`, optionally followed by a repeat count). The standard command path
//! rejects these lines, so callers either route such scripts through a
//! batch-capable channel or strip the separators first.

/// Returns true if `line` is a batch separator line.
#[must_use]
pub fn is_separator_line(line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some(word) if word.eq_ignore_ascii_case("GO") => match parts.next() {
            None => true,
            Some(count) => parts.next().is_none() && count.chars().all(|c| c.is_ascii_digit()),
        },
        _ => false,
    }
}

/// Returns true if the script contains at least one separator line.
#[must_use]
pub fn contains_separator(script: &str) -> bool {
    script.lines().any(is_separator_line)
}

/// Removes every separator line, keeping all statements in order.
#[must_use]
pub fn strip_separators(script: &str) -> String {
    script
        .lines()
        .filter(|line| !is_separator_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separator_lines() {
        assert!(is_separator_line("GO"));
        assert!(is_separator_line("  go  "));
        assert!(is_separator_line("GO 3"));
        assert!(!is_separator_line("GO x"));
        assert!(!is_separator_line("GOTO label"));
        assert!(!is_separator_line("SELECT 1 -- GO"));
        assert!(!is_separator_line(""));
    }

    #[test]
    fn strip_keeps_statements() {
        let script = "CREATE TABLE t (id INT)\nGO\nINSERT INTO t VALUES (1)\ngo\n";
        assert!(contains_separator(script));
        let stripped = strip_separators(script);
        assert_eq!(stripped, "CREATE TABLE t (id INT)\nINSERT INTO t VALUES (1)");
        assert!(!contains_separator(&stripped));
    }
}
