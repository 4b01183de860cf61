//! Loose version strings and version requirements.
//!
//! Installed tools report versions in every imaginable shape (`1.2.3`,
//! `v2.1`, `3.0rc1`, `1.9.3p125`), so [`Version`] parses leniently into
//! alternating numeric and word pieces. A word piece marks a pre-release
//! (`3.0rc1 < 3.0`) unless it is a patch-level marker (`p`, `pl`, `patch`,
//! `post`), which sorts after the release (`1.9.3p125 > 1.9.3`).
//!
//! [`VersionSpec`] pairs an operator with a version:
//!
//! - `==`, `!=`, `>`, `<`, `>=`, `<=`: plain comparisons (`=` and a bare
//!   version both mean `==`)
//! - `~>`: pessimistic: `~> 1.2` means `>= 1.2, < 2`, `~> 1.2.3` means
//!   `>= 1.2.3, < 1.3`
//!
//! [`VersionOf`] names the thing being versioned (`ruby >= 1.9`).

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// First version-looking token in free text (`ripgrep 14.1.0 (rev ...)`)
static VERSION_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+(?:\.\d+)+(?:[-_.]?[A-Za-z]+\d*)?|\d+").expect("version pattern is valid")
});

/// Errors from parsing versions and version specs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionError {
    /// Input was empty (or only an operator)
    #[error("empty version string")]
    Empty,

    /// Input contained something that isn't a version
    #[error("invalid version '{input}': {reason}")]
    Invalid {
        /// The rejected input
        input: String,
        /// What was wrong with it
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Num(u64),
    Word(String),
}

impl Piece {
    fn is_post_release(&self) -> bool {
        matches!(self, Self::Word(w) if matches!(w.as_str(), "p" | "pl" | "patch" | "post"))
    }
}

/// A comparable, loosely-parsed version.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    pieces: Vec<Piece>,
}

impl Version {
    /// Parse a version string such as `1.2.3`, `v2.1` or `3.0rc1`.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        if body.is_empty() {
            return Err(VersionError::Empty);
        }
        if !body.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(VersionError::Invalid {
                input: input.to_string(),
                reason: "must start with a digit".to_string(),
            });
        }

        let mut pieces = Vec::new();
        let mut chars = body.chars().peekable();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() {
                let mut digits = String::new();
                while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(d);
                    chars.next();
                }
                let n = digits.parse::<u64>().map_err(|e| VersionError::Invalid {
                    input: input.to_string(),
                    reason: e.to_string(),
                })?;
                pieces.push(Piece::Num(n));
            } else if c.is_ascii_alphabetic() {
                let mut word = String::new();
                while let Some(&l) = chars.peek().filter(|l| l.is_ascii_alphabetic()) {
                    word.push(l.to_ascii_lowercase());
                    chars.next();
                }
                pieces.push(Piece::Word(word));
            } else if matches!(c, '.' | '-' | '_' | '+') {
                chars.next();
            } else {
                return Err(VersionError::Invalid {
                    input: input.to_string(),
                    reason: format!("unexpected character '{c}'"),
                });
            }
        }

        Ok(Self {
            raw: trimmed.to_string(),
            pieces,
        })
    }

    /// Find and parse the first version in a block of text.
    ///
    /// Useful for `--version` output: `"git version 2.43.0"` yields `2.43.0`.
    pub fn extract(text: &str) -> Option<Self> {
        VERSION_IN_TEXT
            .find(text)
            .and_then(|m| Self::parse(m.as_str()).ok())
    }

    /// The version as it was written (trimmed).
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Leading numeric components (`1.2.3rc1` gives `[1, 2, 3]`).
    pub fn numeric_prefix(&self) -> Vec<u64> {
        self.pieces
            .iter()
            .map_while(|p| match p {
                Piece::Num(n) => Some(*n),
                Piece::Word(_) => None,
            })
            .collect()
    }

    /// Whether the version carries a pre-release word (`rc`, `beta`, ...).
    pub fn is_prerelease(&self) -> bool {
        self.pieces
            .iter()
            .any(|p| matches!(p, Piece::Word(_)) && !p.is_post_release())
    }

    fn from_numbers(numbers: &[u64]) -> Self {
        Self {
            raw: numbers
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join("."),
            pieces: numbers.iter().copied().map(Piece::Num).collect(),
        }
    }
}

fn compare_pieces(a: &[Piece], b: &[Piece]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let ord = match (a.get(i), b.get(i)) {
            (Some(Piece::Num(x)), Some(Piece::Num(y))) => x.cmp(y),
            (Some(Piece::Word(x)), Some(Piece::Word(y))) => x.cmp(y),
            (Some(Piece::Num(_)), Some(Piece::Word(_))) => Ordering::Greater,
            (Some(Piece::Word(_)), Some(Piece::Num(_))) => Ordering::Less,
            // Missing numeric pieces count as zero: 1.0 == 1.0.0
            (Some(Piece::Num(x)), None) => x.cmp(&0),
            (None, Some(Piece::Num(y))) => 0.cmp(y),
            (Some(w @ Piece::Word(_)), None) => {
                if w.is_post_release() {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (None, Some(w @ Piece::Word(_))) => {
                if w.is_post_release() {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_pieces(&self.pieces, &other.pieces)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Comparison operator of a [`VersionSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    /// `~>`, the pessimistic operator
    Compatible,
}

impl VersionOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Compatible => "~>",
        }
    }
}

// Longest operators first so ">=" isn't read as ">"
const OPERATORS: &[(&str, VersionOp)] = &[
    ("==", VersionOp::Eq),
    ("!=", VersionOp::Ne),
    (">=", VersionOp::Ge),
    ("<=", VersionOp::Le),
    ("~>", VersionOp::Compatible),
    (">", VersionOp::Gt),
    ("<", VersionOp::Lt),
    ("=", VersionOp::Eq),
];

/// An operator and a version, e.g. `>= 1.2` or `~> 3.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpec {
    pub op: VersionOp,
    pub version: Version,
}

impl VersionSpec {
    /// Create a spec from parts
    pub fn new(op: VersionOp, version: Version) -> Self {
        Self { op, version }
    }

    /// Parse `">= 1.2"`, `"~>1.2.3"` or a bare `"1.2"` (meaning `==`).
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        let (op, rest) = OPERATORS
            .iter()
            .find_map(|(sym, op)| trimmed.strip_prefix(sym).map(|rest| (*op, rest)))
            .unwrap_or((VersionOp::Eq, trimmed));

        Ok(Self {
            op,
            version: Version::parse(rest)?,
        })
    }

    /// Check whether `candidate` satisfies this spec.
    pub fn matches(&self, candidate: &Version) -> bool {
        match self.op {
            VersionOp::Eq => candidate == &self.version,
            VersionOp::Ne => candidate != &self.version,
            VersionOp::Gt => candidate > &self.version,
            VersionOp::Lt => candidate < &self.version,
            VersionOp::Ge => candidate >= &self.version,
            VersionOp::Le => candidate <= &self.version,
            VersionOp::Compatible => {
                candidate >= &self.version
                    && self
                        .compatible_ceiling()
                        .is_none_or(|ceiling| candidate < &ceiling)
            }
        }
    }

    /// Exclusive upper bound of a `~>` spec; `None` when the bumped
    /// component would not fit, which leaves the range open above.
    fn compatible_ceiling(&self) -> Option<Version> {
        let mut numbers = self.version.numeric_prefix();
        if numbers.len() > 1 {
            numbers.pop();
        }
        let last = numbers.last_mut()?;
        *last = last.checked_add(1)?;
        Some(Version::from_numbers(&numbers))
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op.symbol(), self.version)
    }
}

impl FromStr for VersionSpec {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A named thing with an optional version requirement, e.g. `ruby >= 1.9`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionOf {
    pub name: String,
    pub spec: Option<VersionSpec>,
}

impl VersionOf {
    /// Parse `"name"`, `"name 1.2"` or `"name >= 1.2"`.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        let (name, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (trimmed, ""),
        };

        if name.is_empty() {
            return Err(VersionError::Empty);
        }

        let spec = if rest.is_empty() {
            None
        } else {
            Some(VersionSpec::parse(rest)?)
        };

        Ok(Self {
            name: name.to_string(),
            spec,
        })
    }

    /// Whether `installed` satisfies the requirement (always true without a spec).
    pub fn matches(&self, installed: &Version) -> bool {
        self.spec.as_ref().is_none_or(|spec| spec.matches(installed))
    }
}

impl fmt::Display for VersionOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.spec {
            Some(spec) => write!(f, "{} {}", self.name, spec),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(v("1.10") > v("1.9"));
        assert!(v("2.0.0") > v("1.99.99"));
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("v2.1"), v("2.1"));
    }

    #[test]
    fn test_prerelease_sorts_before_release() {
        assert!(v("3.0rc1") < v("3.0"));
        assert!(v("3.0beta") < v("3.0"));
        assert!(v("3.0.beta2") > v("3.0.alpha9"));
        assert!(v("3.0rc1").is_prerelease());
        assert!(!v("3.0").is_prerelease());
    }

    #[test]
    fn test_patchlevel_sorts_after_release() {
        assert!(v("1.9.3p125") > v("1.9.3"));
        assert!(v("1.9.3p125") < v("1.9.4"));
        assert!(!v("1.9.3p125").is_prerelease());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Version::parse(""), Err(VersionError::Empty));
        assert!(Version::parse("latest").is_err());
        assert!(Version::parse("1.2/3").is_err());
    }

    #[test]
    fn test_extract_from_command_output() {
        assert_eq!(Version::extract("git version 2.43.0").unwrap(), v("2.43.0"));
        assert_eq!(
            Version::extract("ripgrep 14.1.0 (rev e50df40a19)").unwrap(),
            v("14.1.0")
        );
        assert_eq!(Version::extract("ruby 1.9.3p125 (2012-02-16)").unwrap(), v("1.9.3p125"));
        assert!(Version::extract("no digits here").is_none());
    }

    #[test]
    fn test_spec_operators() {
        let installed = v("1.4.2");
        assert!(VersionSpec::parse(">= 1.4").unwrap().matches(&installed));
        assert!(VersionSpec::parse("<2").unwrap().matches(&installed));
        assert!(!VersionSpec::parse("> 1.4.2").unwrap().matches(&installed));
        assert!(VersionSpec::parse("<= 1.4.2").unwrap().matches(&installed));
        assert!(VersionSpec::parse("!= 1.4.1").unwrap().matches(&installed));
        assert!(VersionSpec::parse("1.4.2").unwrap().matches(&installed));
        assert!(VersionSpec::parse("= 1.4.2").unwrap().matches(&installed));
        assert!(VersionSpec::parse("== 1.4.2.0").unwrap().matches(&installed));
    }

    #[test]
    fn test_pessimistic_operator() {
        let two_part = VersionSpec::parse("~> 1.2").unwrap();
        assert!(two_part.matches(&v("1.2")));
        assert!(two_part.matches(&v("1.9.9")));
        assert!(!two_part.matches(&v("2.0")));
        assert!(!two_part.matches(&v("1.1")));

        let three_part = VersionSpec::parse("~>1.2.3").unwrap();
        assert!(three_part.matches(&v("1.2.9")));
        assert!(!three_part.matches(&v("1.3.0")));
        assert!(!three_part.matches(&v("1.2.2")));

        let one_part = VersionSpec::parse("~> 1").unwrap();
        assert!(one_part.matches(&v("1.7")));
        assert!(!one_part.matches(&v("2")));
    }

    #[test]
    fn test_pessimistic_operator_at_numeric_limit() {
        let max = u64::MAX;
        let spec = VersionSpec::parse(&format!("~> {max}.2")).unwrap();
        assert!(spec.matches(&v(&format!("{max}.2"))));
        assert!(spec.matches(&v(&format!("{max}.40.1"))));
        assert!(!spec.matches(&v(&format!("{max}.1"))));
        assert!(!spec.matches(&v("1.0")));

        let single = VersionSpec::parse(&format!("~> {max}")).unwrap();
        assert!(single.matches(&v(&format!("{max}.3"))));
    }

    #[test]
    fn test_spec_display() {
        assert_eq!(VersionSpec::parse("~>1.2").unwrap().to_string(), "~> 1.2");
        assert_eq!(VersionSpec::parse("3.0").unwrap().to_string(), "== 3.0");
    }

    #[test]
    fn test_version_of() {
        let ruby = VersionOf::parse("ruby >= 1.9").unwrap();
        assert_eq!(ruby.name, "ruby");
        assert!(ruby.matches(&v("2.0")));
        assert!(!ruby.matches(&v("1.8.7")));
        assert_eq!(ruby.to_string(), "ruby >= 1.9");

        let bare = VersionOf::parse("git").unwrap();
        assert!(bare.spec.is_none());
        assert!(bare.matches(&v("0.1")));

        let exact = VersionOf::parse("node 20.1").unwrap();
        assert_eq!(exact.spec.unwrap().op, VersionOp::Eq);

        assert!(VersionOf::parse("  ").is_err());
    }
}
