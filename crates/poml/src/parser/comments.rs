//! Comment stripping.

const OPEN: &str = "<!--";
const CLOSE: &str = "-->";

/// Removes `<!-- ... -->` spans.
///
/// The whitespace around a removed comment collapses to a single space when
/// either side had any, and to nothing otherwise, so `a <!-- x --> b` becomes
/// `a b` and `a<!-- x -->b` becomes `ab`. An unterminated comment is kept.
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        let Some(end_rel) = rest[start + OPEN.len()..].find(CLOSE) else {
            break;
        };
        let end = start + OPEN.len() + end_rel + CLOSE.len();

        out.push_str(&rest[..start]);
        let kept = out.trim_end().len();
        let space_before = kept < out.len();
        out.truncate(kept);

        let after = &rest[end..];
        let trimmed_after = after.trim_start();
        let space_after = trimmed_after.len() < after.len();

        if space_before || space_after {
            out.push(' ');
        }
        rest = trimmed_after;
    }

    out.push_str(rest);
    out
}
