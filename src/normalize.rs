//! Normalizers for search text and cross-source join keys.
//!
//! Two distinct normalizers are needed: `fold` preserves word shape for
//! substring search, while `join_key` strips everything but ASCII letters
//! and digits so that punctuation and spacing differences between two
//! independently maintained sources still match.

use deunicode::deunicode;

/// Normalize a string for search matching.
/// Applies transliteration (e.g., "José" -> "Jose"), lowercase, and
/// whitespace collapse.
pub fn fold(s: &str) -> String {
    deunicode(s)
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn fold_query(query: &str) -> Option<String> {
    let folded = fold(query);
    if folded.is_empty() {
        None
    } else {
        Some(folded)
    }
}

/// Normalize a display name or title into a join key: lowercase ASCII
/// letters and digits only.
pub fn join_key(s: &str) -> String {
    fold(s)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Join key for a file name: the final extension (last `.` and everything
/// after it) is stripped before the character-class filter.
pub fn file_key(s: &str) -> String {
    let stem = match s.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => s,
    };
    join_key(stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_lowercases_and_collapses_whitespace() {
        assert_eq!(fold("  Ann   Lee "), "ann lee");
        assert_eq!(fold("José García"), "jose garcia");
    }

    #[test]
    fn fold_is_total_and_idempotent() {
        assert_eq!(fold(""), "");
        for input in ["Ann Lee", "  spaced  out  ", "Иван Петров", "x"] {
            let once = fold(input);
            assert_eq!(fold(&once), once);
        }
    }

    #[test]
    fn join_key_strips_punctuation_and_spacing() {
        assert_eq!(join_key("Ann Lee"), "annlee");
        assert_eq!(join_key("ann-lee"), "annlee");
        assert_eq!(join_key("O'Brien, Pat"), "obrienpat");
        assert_eq!(join_key(""), "");
    }

    #[test]
    fn join_key_is_idempotent() {
        for input in ["Ann Lee", "ann-lee", "Bo.Kim (Design)"] {
            let once = join_key(input);
            assert_eq!(join_key(&once), once);
        }
    }

    #[test]
    fn file_key_strips_extension() {
        assert_eq!(file_key("ann-lee.jpg"), "annlee");
        assert_eq!(file_key("Bo Kim.PNG"), "bokim");
        assert_eq!(file_key("no-extension"), "noextension");
    }

    #[test]
    fn file_key_matches_name_key_across_sources() {
        // The point of the aggressive filter: a display name and a file name
        // maintained by different people still land on the same key.
        assert_eq!(join_key("Ann Lee"), file_key("ann-lee.jpg"));
        assert_eq!(join_key("Bo Kim"), file_key("Bo_Kim.jpeg"));
    }
}
