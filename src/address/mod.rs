//! Mustache path templates.
//!
//! A [`Template`] describes the shape of every collection path of a model
//! family, like `users/{userId}/posts`. Together with a
//! [`Location`](crate::location::Location) it resolves to a concrete path,
//! and a concrete path can be checked against it with [`is_compatible`].

use std::fmt::Display;

use thiserror::Error;

pub mod compat;
pub mod template;

pub use compat::*;
pub use template::*;

pub const SEPARATOR: char = '/';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path segments missing: {}", .0.join(", "))]
    MissingPathSegment(Vec<String>),

    #[error("`{value}` for {name} is not a single path segment")]
    InvalidValue { name: String, value: String },

    #[error("invalid template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Segment {
    Literal(String),
    Placeholder(String),
}

impl Segment {
    pub fn parse(part: &str) -> Self {
        match part
            .strip_prefix('{')
            .and_then(|inner| inner.strip_suffix('}'))
        {
            Some(name) => Segment::Placeholder(name.trim().to_owned()),
            None => Segment::Literal(part.to_owned()),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Segment::Placeholder(_))
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Literal(s) => f.write_str(s),
            Segment::Placeholder(name) => write!(f, "{{{name}}}"),
        }
    }
}

/// Splits a path on `/`, dropping one leading and one trailing empty segment.
pub fn split_path(path: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = path.split(SEPARATOR).collect();

    if parts.first() == Some(&"") {
        parts.remove(0);
    }
    if parts.last() == Some(&"") {
        parts.pop();
    }

    parts
}
