// strata-common/src/version/range.rs

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::error::{Result, StrataError};
use crate::version::Version;

/// A predicate over version numbers, parsed from the range grammar.
///
/// The grammar:
/// - `1.0` — base range, includes `1.0` and anything extending it
///   (`1.0.1`, but not `1.1`)
/// - `[1.0]` — exactly `1.0`
/// - `[1.0)` — minimum, at least `1.0`
/// - `(1.0]` — maximum, at most `1.0` (`(1.0)` is illegal)
/// - `[1.0, 2.0)` — bounded, bracket kind selects inclusivity; the
///   right bound must be strictly greater than the left
/// - `{a | b}` — union; `{}` includes nothing
/// - `a & b` — intersection, right-associative
///
/// Whitespace is ignored everywhere. `Display` emits the inverse
/// grammar, so parsing the displayed form yields an equal range.
///
/// The variant set is closed; consumers dispatch with an exhaustive
/// `match` rather than a visitor object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VersionRange {
    /// Exactly the given version.
    Exact(Version),
    /// The given version or any greater one.
    Minimum(Version),
    /// The given version or any smaller one.
    Maximum(Version),
    /// Versions between the two bounds.
    Bounded {
        left: Version,
        right: Version,
        left_inclusive: bool,
        right_inclusive: bool,
    },
    /// The given version and anything that extends it with more
    /// components.
    Base(Version),
    /// Satisfied if any member is satisfied.
    Union(BTreeSet<VersionRange>),
    /// Satisfied only if all members are satisfied.
    Intersection(BTreeSet<VersionRange>),
    /// Satisfied by no version.
    Unsatisfiable,
}

impl VersionRange {
    /// Parses a version range string.
    pub fn parse(range: &str) -> Result<VersionRange> {
        if range.is_empty() {
            return Err(format_error(range, 0, "empty range"));
        }
        let mut cur = Cursor::new(range);
        let result = parse_range(&mut cur)?;
        if cur.peek().is_some() {
            return Err(format_error(range, cur.index(), "extra characters"));
        }
        Ok(result)
    }

    /// Builds the union of the given ranges.
    ///
    /// Nested unions are flattened; an empty union collapses to
    /// `Unsatisfiable` and a singleton to its only member.
    pub fn union(ranges: impl IntoIterator<Item = VersionRange>) -> VersionRange {
        let mut members = BTreeSet::new();
        for r in ranges {
            match r {
                VersionRange::Union(inner) => members.extend(inner),
                other => {
                    members.insert(other);
                }
            }
        }
        match members.len() {
            0 => VersionRange::Unsatisfiable,
            1 => members.pop_first().unwrap_or(VersionRange::Unsatisfiable),
            _ => VersionRange::Union(members),
        }
    }

    /// Builds the intersection of the given ranges, with the same
    /// normalization rules as [`VersionRange::union`].
    pub fn intersection(ranges: impl IntoIterator<Item = VersionRange>) -> VersionRange {
        let mut members = BTreeSet::new();
        for r in ranges {
            match r {
                VersionRange::Intersection(inner) => members.extend(inner),
                other => {
                    members.insert(other);
                }
            }
        }
        match members.len() {
            0 => VersionRange::Unsatisfiable,
            1 => members.pop_first().unwrap_or(VersionRange::Unsatisfiable),
            _ => VersionRange::Intersection(members),
        }
    }

    /// Checks if this range accepts the argument version number.
    ///
    /// An invalid version number is not an error; it is simply never
    /// included.
    pub fn includes(&self, version: &str) -> bool {
        match Version::parse(version) {
            Ok(v) => self.includes_version(&v),
            Err(_) => false,
        }
    }

    pub fn includes_version(&self, version: &Version) -> bool {
        match self {
            VersionRange::Exact(v) => version == v,
            VersionRange::Minimum(v) => version >= v,
            VersionRange::Maximum(v) => version <= v,
            VersionRange::Bounded {
                left,
                right,
                left_inclusive,
                right_inclusive,
            } => {
                let left_ok = if *left_inclusive {
                    version >= left
                } else {
                    version > left
                };
                let right_ok = if *right_inclusive {
                    version <= right
                } else {
                    version < right
                };
                left_ok && right_ok
            }
            VersionRange::Base(v) => v.is_base_of(version),
            VersionRange::Union(members) => members.iter().any(|r| r.includes_version(version)),
            VersionRange::Intersection(members) => {
                members.iter().all(|r| r.includes_version(version))
            }
            VersionRange::Unsatisfiable => false,
        }
    }
}

impl FromStr for VersionRange {
    type Err = StrataError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        VersionRange::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRange::Exact(v) => write!(f, "[{v}]"),
            VersionRange::Minimum(v) => write!(f, "[{v})"),
            VersionRange::Maximum(v) => write!(f, "({v}]"),
            VersionRange::Bounded {
                left,
                right,
                left_inclusive,
                right_inclusive,
            } => {
                let open = if *left_inclusive { '[' } else { '(' };
                let close = if *right_inclusive { ']' } else { ')' };
                write!(f, "{open}{left}, {right}{close}")
            }
            VersionRange::Base(v) => write!(f, "{v}"),
            VersionRange::Union(members) => {
                write!(f, "{{")?;
                for (i, r) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{r}")?;
                }
                write!(f, "}}")
            }
            VersionRange::Intersection(members) => {
                for (i, r) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, " & ")?;
                    }
                    write!(f, "{r}")?;
                }
                Ok(())
            }
            VersionRange::Unsatisfiable => write!(f, "{{}}"),
        }
    }
}

impl Serialize for VersionRange {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        VersionRange::from_str(&s).map_err(serde::de::Error::custom)
    }
}

fn format_error(src: &str, index: usize, message: &str) -> StrataError {
    let detail = format!("{message} at index {index} in {src}");
    debug!("malformed version range: {detail}");
    StrataError::Format("version range", detail)
}

/// Character cursor that makes whitespace invisible to the parser.
struct Cursor<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Cursor {
            src,
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_whitespace())
        {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn index(&self) -> usize {
        self.pos
    }

    fn error(&self, message: &str) -> StrataError {
        format_error(self.src, self.pos, message)
    }
}

fn parse_version(text: &str, cur: &Cursor<'_>) -> Result<Version> {
    Version::parse(text).map_err(|_| {
        StrataError::Format(
            "version range",
            format!("invalid version number: {text} in {}", cur.src),
        )
    })
}

fn parse_range(cur: &mut Cursor<'_>) -> Result<VersionRange> {
    let Some(c) = cur.advance() else {
        return Err(cur.error("invalid range"));
    };
    if c.is_ascii_digit() {
        let mut version = String::new();
        version.push(c);
        while let Some(nc) = cur.peek() {
            if nc.is_ascii_digit() || nc == '.' {
                version.push(nc);
                cur.advance();
            } else if nc == '&' {
                cur.advance();
                let right = parse_range(cur)?;
                let base = parse_version(&version, cur)?;
                return Ok(VersionRange::intersection([
                    VersionRange::Base(base),
                    right,
                ]));
            } else {
                break;
            }
        }
        let base = parse_version(&version, cur)?;
        Ok(VersionRange::Base(base))
    } else if c == '(' || c == '[' {
        let mut left = String::new();
        loop {
            let Some(nc) = cur.peek() else {
                return Err(cur.error("missing range closing brace"));
            };
            if nc.is_ascii_digit() || nc == '.' {
                left.push(nc);
                cur.advance();
            } else if nc == ',' {
                // bounded range
                if left.is_empty() {
                    return Err(cur.error("empty left range bound"));
                }
                cur.advance();
                let mut right = String::new();
                while let Some(rc) = cur.peek() {
                    if rc.is_ascii_digit() || rc == '.' {
                        right.push(rc);
                        cur.advance();
                    } else {
                        break;
                    }
                }
                if right.is_empty() {
                    return Err(cur.error("empty right range bound"));
                }
                return match cur.peek() {
                    Some(close @ (')' | ']')) => {
                        cur.advance();
                        create_bounded(c, &left, &right, close, cur)
                    }
                    _ => Err(cur.error("invalid range ending character")),
                };
            } else if nc == ')' || nc == ']' {
                cur.advance();
                let created = create_single_bound(c, &left, nc, cur)?;
                if cur.peek() == Some('&') {
                    cur.advance();
                    let next = parse_range(cur)?;
                    return Ok(VersionRange::intersection([created, next]));
                }
                return Ok(created);
            } else {
                return Err(cur.error("invalid range character"));
            }
        }
    } else if c == '{' {
        match cur.peek() {
            None => return Err(cur.error("unclosed {")),
            Some('}') => {
                // empty {}, not satisfiable
                cur.advance();
                return Ok(VersionRange::Unsatisfiable);
            }
            Some(_) => {}
        }
        let mut members = Vec::new();
        loop {
            if cur.peek() == Some('}') {
                return Err(cur.error("unexpected character"));
            }
            members.push(parse_range(cur)?);
            match cur.peek() {
                None => return Err(cur.error("unclosed {")),
                Some('|') => {
                    cur.advance();
                }
                Some('}') => break,
                Some(_) => return Err(cur.error("unexpected character")),
            }
        }
        cur.advance();
        Ok(VersionRange::union(members))
    } else {
        Err(cur.error("invalid range character"))
    }
}

fn create_bounded(
    open: char,
    left: &str,
    right: &str,
    close: char,
    cur: &Cursor<'_>,
) -> Result<VersionRange> {
    let left = parse_version(left, cur)?;
    let right = parse_version(right, cur)?;
    if left >= right {
        return Err(StrataError::Format(
            "version range",
            format!("invalid range bounds: {open}{left}, {right}{close}"),
        ));
    }
    Ok(VersionRange::Bounded {
        left,
        right,
        left_inclusive: open == '[',
        right_inclusive: close == ']',
    })
}

fn create_single_bound(
    open: char,
    version: &str,
    close: char,
    cur: &Cursor<'_>,
) -> Result<VersionRange> {
    let version = parse_version(version, cur)?;
    match (open, close) {
        ('[', ']') => Ok(VersionRange::Exact(version)),
        ('[', ')') => Ok(VersionRange::Minimum(version)),
        ('(', ']') => Ok(VersionRange::Maximum(version)),
        _ => Err(StrataError::Format(
            "version range",
            format!("illegal range definition: ({version}) in {}", cur.src),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(range: &str) -> VersionRange {
        let parsed = VersionRange::parse(range).unwrap();
        // the displayed form must parse back to an equal range
        assert_eq!(
            VersionRange::parse(&parsed.to_string()).unwrap(),
            parsed,
            "round trip of {range} via {parsed}"
        );
        parsed
    }

    fn assert_includes(range: &str, versions: &[&str]) {
        let r = parse(range);
        let wrapped = parse(&format!("{{{range}}}"));
        for v in versions {
            assert!(r.includes(v), "not includes: {range} - {v}");
            assert!(wrapped.includes(v), "not includes: {{{range}}} - {v}");
        }
    }

    fn assert_not_includes(range: &str, versions: &[&str]) {
        let r = parse(range);
        let wrapped = parse(&format!("{{{range}}}"));
        for v in versions {
            assert!(!r.includes(v), "includes: {range} - {v}");
            assert!(!wrapped.includes(v), "includes: {{{range}}} - {v}");
        }
    }

    fn assert_non_parseable(range: &str) {
        assert!(
            VersionRange::parse(range).is_err(),
            "parsed: {range}"
        );
    }

    #[test]
    fn base_range() {
        assert_includes("1.0", &["1.0", "1.0.1"]);
        assert_not_includes("1.0", &["1", "1.1", "1.1.1"]);
    }

    #[test]
    fn exact_range() {
        assert_includes("[1.1]", &["1.1"]);
        assert_not_includes("[1.1]", &["1", "1.0", "1.1.0", "1.1.1", "1.2"]);
    }

    #[test]
    fn minimum_range() {
        assert_includes("[1.1)", &["1.1.1", "1.1", "1.2", "1.2.1"]);
        assert_not_includes("[1.1)", &["1.0", "1.0.9"]);
    }

    #[test]
    fn maximum_range() {
        assert_includes("(1.1]", &["1.1"]);
        assert_not_includes("(1.1]", &["1.1.1"]);
        assert_includes("(1.1.2]", &["1.1.1", "1.1.2"]);
        assert_not_includes("(1.1.2]", &["1.1.2.1", "1.1.3"]);
    }

    #[test]
    fn bounded_ranges() {
        assert_includes("[1, 2]", &["1", "1.0", "1.1", "2"]);
        assert_not_includes("[1, 2]", &["2.0", "2.1"]);

        assert_includes("(1.1, 1.4)", &["1.1.0", "1.1.1", "1.2", "1.3.9", "1.3.9.0"]);
        assert_not_includes("(1.1, 1.4)", &["1.0", "1.1", "1.4", "1.4.0", "1.4.1"]);

        assert_includes("(1.1, 1.4]", &["1.1.0", "1.1.1", "1.2", "1.3.9", "1.4"]);
        assert_not_includes("(1.1, 1.4]", &["1.0", "1.1", "1.4.0", "1.4.1"]);

        assert_includes("[1.1, 1.4)", &["1.1", "1.1.0", "1.1.1", "1.2", "1.3.9"]);
        assert_not_includes("[1.1, 1.4)", &["1.0", "1.4", "1.4.0", "1.4.1"]);

        assert_includes("[1.1, 1.4]", &["1.1", "1.1.0", "1.1.1", "1.2", "1.3.9", "1.4"]);
        assert_not_includes("[1.1, 1.4]", &["1.0", "1.4.0", "1.4.1"]);
    }

    #[test]
    fn intersections() {
        assert_includes("1.0 & 1.0.1", &["1.0.1"]);
        assert_not_includes("1.0 & 1.0.1", &["1.0", "1.0.0"]);

        assert_includes("(1.1]&[1.1)", &["1.1"]);
        assert_not_includes("(1.1]&[1.1)", &["1.1.1", "1.2", "1.2.1", "1.0", "1.0.9"]);

        assert_includes("(1.1] & 1.1", &["1.1"]);
    }

    #[test]
    fn unions() {
        assert_includes("{1.1}", &["1.1"]);
        assert_not_includes("{1.1}", &["1.2"]);
        assert_includes("{1.1|1.2}", &["1.2", "1.2.1"]);
        assert_not_includes("{1.1|1.2&1.3}", &["1.2"]);
        assert_not_includes("{}", &["1.1"]);
        assert_includes("{[1.0] | [2.0]}", &["1.0", "2.0"]);
        assert_not_includes("{[1.0] | [2.0]}", &["1.1", "1.0.0", "2.1", "1", "2"]);
        assert_includes("{1 | 3}", &["1", "1.0", "1.1", "3", "3.2"]);
        assert_not_includes("{1 | 3}", &["2", "2.0", "4.0"]);
    }

    #[test]
    fn whitespace_ignored() {
        assert_includes(" [ 1.1 , 1.4 ) ", &["1.1", "1.2"]);
        assert_includes("1 . 0", &["1.0.1"]);
    }

    #[test]
    fn invalid_bounds() {
        assert_non_parseable("(1.0, 1.0)");
        assert_non_parseable("(1.0, 1.0]");
        assert_non_parseable("[1.0, 1.0)");
        assert_non_parseable("[1.0, 1.0]");
        assert_non_parseable("(1.0, 0.0)");
    }

    #[test]
    fn malformed_input() {
        assert_non_parseable("");
        assert_non_parseable("(1.0)");
        assert_non_parseable("(1.0");
        assert_non_parseable("[1.0");
        assert_non_parseable("{1.0");
        assert_non_parseable("{1.0|");
        assert_non_parseable("{|1.0}");
        assert_non_parseable("1.0}");
        assert_non_parseable("1.0 extra");
        assert_non_parseable("[01]");
        assert_non_parseable("a");
        assert_non_parseable("[1..0]");
    }

    #[test]
    fn normalizing_constructors() {
        assert_eq!(VersionRange::union([]), VersionRange::Unsatisfiable);
        assert_eq!(VersionRange::intersection([]), VersionRange::Unsatisfiable);
        let base = VersionRange::parse("1.0").unwrap();
        assert_eq!(VersionRange::union([base.clone()]), base);
        assert_eq!(VersionRange::parse("{1.0}").unwrap(), base);
    }

    #[test]
    fn unsatisfiable_display() {
        assert_eq!(VersionRange::Unsatisfiable.to_string(), "{}");
        assert_eq!(
            VersionRange::parse("{}").unwrap(),
            VersionRange::Unsatisfiable
        );
    }
}
