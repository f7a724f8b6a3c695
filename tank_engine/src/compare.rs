use serde::{Deserialize, Serialize};

use crate::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Same,
    Different,
    /// Same tokens, different layout.
    PatternDifferent,
}

impl From<Comparison> for Verdict {
    fn from(v: Comparison) -> Self {
        match v {
            Comparison::Same => Verdict::Accepted,
            Comparison::Different | Comparison::PatternDifferent => Verdict::WrongAnswer,
        }
    }
}

/// How a produced output is matched against the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareMode {
    /// Byte-for-byte.
    Full,
    /// Line by line, ignoring trailing spaces and surrounding blank lines.
    Line,
    /// Whitespace-separated tokens only.
    Value,
}

impl Default for CompareMode {
    fn default() -> Self {
        CompareMode::Line
    }
}

impl CompareMode {
    pub fn compare(self, expected: &[u8], produced: &[u8]) -> Comparison {
        let same = match self {
            CompareMode::Full => expected == produced,
            CompareMode::Line => lines(expected).eq(lines(produced)),
            CompareMode::Value => return value_compare(expected, produced),
        };
        if same {
            return Comparison::Same;
        }
        match value_compare(expected, produced) {
            Comparison::Same => Comparison::PatternDifferent,
            other => other,
        }
    }
}

fn trim_end(mut s: &[u8]) -> &[u8] {
    while let [rest @ .., last] = s {
        if !last.is_ascii_whitespace() {
            break;
        }
        s = rest;
    }
    s
}

fn trim(mut s: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = s {
        if !first.is_ascii_whitespace() {
            break;
        }
        s = rest;
    }
    trim_end(s)
}

fn lines(s: &[u8]) -> impl Iterator<Item = &[u8]> {
    trim(s).split(|b| *b == b'\n').map(trim_end)
}

fn tokens(s: &[u8]) -> impl Iterator<Item = &[u8]> {
    s.split(u8::is_ascii_whitespace).filter(|t| !t.is_empty())
}

fn value_compare(expected: &[u8], produced: &[u8]) -> Comparison {
    if tokens(expected).eq(tokens(produced)) {
        Comparison::Same
    } else {
        Comparison::Different
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_is_exact() {
        assert_eq!(CompareMode::Full.compare(b"3\n", b"3\n"), Comparison::Same);
        assert_eq!(
            CompareMode::Full.compare(b"3\n", b"3"),
            Comparison::PatternDifferent
        );
        assert_eq!(CompareMode::Full.compare(b"3\n", b"4\n"), Comparison::Different);
    }

    #[test]
    fn line_ignores_trailing_whitespace() {
        let expected = b"1 2\n3 4\n";
        assert_eq!(
            CompareMode::Line.compare(expected, b"1 2  \r\n3 4\n\n"),
            Comparison::Same
        );
        assert_eq!(
            CompareMode::Line.compare(expected, b"1 2 3 4\n"),
            Comparison::PatternDifferent
        );
        assert_eq!(CompareMode::Line.compare(expected, b"1 2\n3 5\n"), Comparison::Different);
    }

    #[test]
    fn value_ignores_layout() {
        assert_eq!(CompareMode::Value.compare(b"1 2\n3", b"1\n2 3"), Comparison::Same);
        assert_eq!(CompareMode::Value.compare(b"1 2", b"1 2 3"), Comparison::Different);
    }

    #[test]
    fn invalid_utf8_is_compared_raw() {
        assert_eq!(CompareMode::Full.compare(b"\xff\n", b"\xfe\n"), Comparison::Different);
        assert_eq!(
            CompareMode::Line.compare(b"\xc3\x28\n", b"\xe2\x28\n"),
            Comparison::Different
        );
        assert_eq!(
            CompareMode::Value.compare(b"\xff 1", b"\xfe 1"),
            Comparison::Different
        );
        assert_eq!(CompareMode::Line.compare(b"\xff\n", b"\xff  \n\n"), Comparison::Same);
    }

    #[test]
    fn blank_outputs_match() {
        assert_eq!(CompareMode::Line.compare(b"\n\n", b""), Comparison::Same);
        assert_eq!(CompareMode::Line.compare(b"", b"0"), Comparison::Different);
    }

    #[test]
    fn verdict_mapping() {
        assert_eq!(Verdict::from(Comparison::Same), Verdict::Accepted);
        assert_eq!(Verdict::from(Comparison::PatternDifferent), Verdict::WrongAnswer);
        assert_eq!(CompareMode::default(), CompareMode::Line);
    }
}
