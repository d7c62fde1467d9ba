//! UTF-8 safe string helpers used by display summaries.

/// Return a preview of `s` up to `n` characters, appending `...` when the
/// string was cut. Slices by chars, never by byte index.
pub fn preview(s: &str, n: usize) -> String {
    let mut out: String = s.chars().take(n).collect();
    if s.chars().nth(n).is_some() {
        out.push_str("...");
    }
    out
}

/// Number of lines as seen by a `split('\n')`: an empty string is one line and
/// a trailing newline adds an empty last line.
pub fn line_count(s: &str) -> usize {
    s.split('\n').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_ascii() {
        assert_eq!(preview("hello world", 5), "hello...");
        assert_eq!(preview("hello world", 20), "hello world");
        assert_eq!(preview("hello", 5), "hello");
    }

    #[test]
    fn test_preview_multibyte() {
        let s = "Grüße aus München";
        assert_eq!(preview(s, 5), "Grüße...");
    }

    #[test]
    fn test_line_count() {
        assert_eq!(line_count(""), 1);
        assert_eq!(line_count("a\nb"), 2);
        assert_eq!(line_count("a\nb\n"), 3);
    }
}
