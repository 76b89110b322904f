//! Natural ordering for frame filenames.
//!
//! A filename is split around the digit run nearest to its extension, which
//! is treated as the frame number. Everything before it (including any other
//! digit runs) is compared as text, the frame number is compared by value,
//! and the remainder is compared as text again. `frame_2.png` therefore sorts
//! before `frame_10.png`, and `frame_002.png` sits between them.

use std::cmp::Ordering;

/// How text portions of a filename are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOptions {
    /// Compare non-digit text case-sensitively.
    pub case_sensitive: bool,
}

impl SortOptions {
    /// Follow the platform's usual filesystem behaviour.
    pub fn platform() -> Self {
        Self {
            case_sensitive: !(cfg!(windows) || cfg!(target_os = "macos")),
        }
    }

    pub fn case_sensitive(case_sensitive: bool) -> Self {
        Self { case_sensitive }
    }

    /// Normalize a text portion for comparison or grouping.
    pub fn fold(&self, text: &str) -> String {
        if self.case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        }
    }
}

impl Default for SortOptions {
    fn default() -> Self {
        Self::platform()
    }
}

/// Split a filename into `(stem, extension)` at the last dot.
///
/// A leading dot does not start an extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx + 1..]),
        _ => (name, ""),
    }
}

/// Byte range of the rightmost run of ASCII digits in `text`.
pub fn rightmost_digit_run(text: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let end = bytes.iter().rposition(|b| b.is_ascii_digit())? + 1;
    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    Some((start, end))
}

/// A digit run compared by numeric value without overflowing.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Digits(String);

impl Digits {
    fn new(run: &str) -> Self {
        let trimmed = run.trim_start_matches('0');
        Digits(trimmed.to_string())
    }
}

impl Ord for Digits {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Digits {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Comparable key for a filename. Field order is comparison order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct NaturalKey {
    head: String,
    number: Option<Digits>,
    tail: String,
    raw: String,
}

impl NaturalKey {
    pub fn new(name: &str, options: SortOptions) -> Self {
        let (stem, _) = split_extension(name);
        match rightmost_digit_run(stem) {
            Some((start, end)) => NaturalKey {
                head: options.fold(&name[..start]),
                number: Some(Digits::new(&name[start..end])),
                tail: options.fold(&name[end..]),
                raw: name.to_string(),
            },
            None => NaturalKey {
                head: options.fold(name),
                number: None,
                tail: String::new(),
                raw: name.to_string(),
            },
        }
    }
}

/// Compare two filenames in natural order.
pub fn natural_cmp(a: &str, b: &str, options: SortOptions) -> Ordering {
    NaturalKey::new(a, options).cmp(&NaturalKey::new(b, options))
}

/// Sort filenames in place in natural order.
pub fn sort_natural<S: AsRef<str>>(names: &mut [S], options: SortOptions) {
    names.sort_by_cached_key(|n| NaturalKey::new(n.as_ref(), options));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(names: &[&str], options: SortOptions) -> Vec<String> {
        let mut v: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        sort_natural(&mut v, options);
        v
    }

    fn insensitive() -> SortOptions {
        SortOptions::case_sensitive(false)
    }

    #[test]
    fn test_numeric_order() {
        assert_eq!(
            sorted(&["f_2.png", "f_10.png", "f_1.png"], insensitive()),
            vec!["f_1.png", "f_2.png", "f_10.png"]
        );
        assert_eq!(
            sorted(
                &["frame_1000.png", "frame_100.png", "frame_10.png", "frame_1.png"],
                insensitive()
            ),
            vec!["frame_1.png", "frame_10.png", "frame_100.png", "frame_1000.png"]
        );
    }

    #[test]
    fn test_mixed_padding() {
        assert_eq!(
            sorted(&["frame_10.png", "frame_002.png", "frame_1.png"], insensitive()),
            vec!["frame_1.png", "frame_002.png", "frame_10.png"]
        );
    }

    #[test]
    fn test_prefix_then_number() {
        assert_eq!(
            sorted(&["b_10.png", "a_2.png", "a_10.png", "a_1.png"], insensitive()),
            vec!["a_1.png", "a_2.png", "a_10.png", "b_10.png"]
        );
    }

    #[test]
    fn test_multiple_digit_runs() {
        assert_eq!(
            sorted(
                &["shot01_frame10.png", "shot01_frame2.png", "shot02_frame1.png"],
                insensitive()
            ),
            vec!["shot01_frame2.png", "shot01_frame10.png", "shot02_frame1.png"]
        );
    }

    #[test]
    fn test_dot_notation_and_bare_numbers() {
        assert_eq!(
            sorted(&["render.0010.png", "render.0002.png", "render.0001.png"], insensitive()),
            vec!["render.0001.png", "render.0002.png", "render.0010.png"]
        );
        assert_eq!(
            sorted(&["10.png", "2.png", "1.png", "100.png"], insensitive()),
            vec!["1.png", "2.png", "10.png", "100.png"]
        );
    }

    #[test]
    fn test_no_digits_is_lexical() {
        assert_eq!(
            sorted(&["charlie.png", "alpha.png", "bravo.png"], insensitive()),
            vec!["alpha.png", "bravo.png", "charlie.png"]
        );
        assert!(sorted(&[], insensitive()).is_empty());
    }

    #[test]
    fn test_case_option() {
        let names = ["Frame_2.png", "frame_1.png", "FRAME_3.png"];
        assert_eq!(
            sorted(&names, insensitive()),
            vec!["frame_1.png", "Frame_2.png", "FRAME_3.png"]
        );
        assert_eq!(
            sorted(&names, SortOptions::case_sensitive(true)),
            vec!["FRAME_3.png", "Frame_2.png", "frame_1.png"]
        );
    }

    #[test]
    fn test_huge_digit_runs_do_not_overflow() {
        let a = "f_99999999999999999999999999.png";
        let b = "f_100000000000000000000000000.png";
        assert_eq!(natural_cmp(a, b, insensitive()), Ordering::Less);
    }

    #[test]
    fn test_split_helpers() {
        assert_eq!(split_extension("render.0001.png"), ("render.0001", "png"));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
        assert_eq!(rightmost_digit_run("shot01_frame0042"), Some((12, 16)));
        assert_eq!(rightmost_digit_run("nodigits"), None);
    }
}
