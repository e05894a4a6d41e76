//! JSON Pointer (RFC 6901) paths into a [`Dom`](crate::Dom).
//!
//! A [`DomPath`] stores unescaped reference tokens. The empty pointer `""`
//! addresses the whole document; `"/a/b"` addresses member `b` of member
//! `a`. Within a token `~1` encodes `/` and `~0` encodes `~`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PatchError;

/// A parsed JSON Pointer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomPath {
    tokens: Vec<String>,
}

impl DomPath {
    /// The root pointer (`""`).
    pub fn root() -> Self {
        Self { tokens: Vec::new() }
    }

    /// Builds a path from already-unescaped tokens.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a pointer string.
    ///
    /// Returns [`PatchError::InvalidPointer`] if the string is non-empty and
    /// does not start with `/`, or contains a `~` not followed by `0` or `1`.
    pub fn parse(pointer: &str) -> Result<Self, PatchError> {
        if pointer.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = pointer.strip_prefix('/') else {
            return Err(PatchError::InvalidPointer(pointer.to_owned()));
        };
        let tokens = rest
            .split('/')
            .map(|raw| unescape(raw).ok_or_else(|| PatchError::InvalidPointer(pointer.to_owned())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tokens })
    }

    /// Unescaped reference tokens, root first.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Returns a new path with `token` appended.
    pub fn join(&self, token: impl Into<String>) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.push(token.into());
        Self { tokens }
    }

    /// Appends a token in place.
    pub fn push(&mut self, token: impl Into<String>) {
        self.tokens.push(token.into());
    }

    /// Returns a new path with all tokens of `other` appended.
    pub fn concat(&self, other: &DomPath) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.extend(other.tokens.iter().cloned());
        Self { tokens }
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self) -> Option<DomPath> {
        if self.tokens.is_empty() {
            return None;
        }
        Some(Self {
            tokens: self.tokens[..self.tokens.len() - 1].to_vec(),
        })
    }

    /// The last token, or `None` for the root.
    pub fn last(&self) -> Option<&str> {
        self.tokens.last().map(String::as_str)
    }

    /// Whether `prefix` is an ancestor of (or equal to) this path.
    pub fn starts_with(&self, prefix: &DomPath) -> bool {
        self.tokens.starts_with(&prefix.tokens)
    }

    /// Removes `prefix` from the front of this path.
    pub fn strip_prefix(&self, prefix: &DomPath) -> Option<DomPath> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(Self {
            tokens: self.tokens[prefix.tokens.len()..].to_vec(),
        })
    }
}

fn unescape(raw: &str) -> Option<String> {
    if !raw.contains('~') {
        return Some(raw.to_owned());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

impl fmt::Display for DomPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "/{}", escape(token))?;
        }
        Ok(())
    }
}

impl FromStr for DomPath {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DomPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DomPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DomPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_pointer() {
        let p = DomPath::parse("").unwrap();
        assert!(p.is_root());
        assert_eq!(p.to_string(), "");
        assert!(p.parent().is_none());
    }

    #[test]
    fn escaped_tokens() {
        let p = DomPath::parse("/a~1b/c~0d").unwrap();
        assert_eq!(p.tokens(), &["a/b".to_string(), "c~d".to_string()]);
        assert_eq!(p.to_string(), "/a~1b/c~0d");
    }

    #[test]
    fn empty_token_is_valid() {
        let p = DomPath::parse("/").unwrap();
        assert_eq!(p.tokens(), &[String::new()]);
    }

    #[test]
    fn reject_missing_leading_slash() {
        assert!(matches!(
            DomPath::parse("a/b"),
            Err(PatchError::InvalidPointer(_))
        ));
    }

    #[test]
    fn reject_bad_escape() {
        assert!(DomPath::parse("/a~2").is_err());
        assert!(DomPath::parse("/a~").is_err());
    }

    #[test]
    fn prefix_operations() {
        let full = DomPath::parse("/Instances/Instance_[1]/Entities/E").unwrap();
        let prefix = DomPath::from_tokens(["Instances", "Instance_[1]"]);
        assert!(full.starts_with(&prefix));
        assert_eq!(full.strip_prefix(&prefix).unwrap().to_string(), "/Entities/E");
        assert_eq!(prefix.concat(&DomPath::parse("/x").unwrap()).len(), 3);
        assert!(DomPath::parse("/Other").unwrap().strip_prefix(&prefix).is_none());
    }

    #[test]
    fn serde_uses_pointer_string() {
        let p = DomPath::from_tokens(["Entities", "a/b"]);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#""/Entities/a~1b""#);
        let back: DomPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
