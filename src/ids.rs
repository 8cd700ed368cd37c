//! Fully-qualified name (FQN) format and short-name utilities.
//!
//! FQNs follow the literal `"{graph}$${variant}$${short}$$"` delimiter
//! convention: downstream callers key `saved_results` by short name
//! derived from this format, so the delimiter is preserved exactly
//! rather than replaced with structured metadata.

use std::collections::HashMap;
use std::fmt;

use derive_more::{AsRef, Display, From};
use serde::{Deserialize, Serialize};

/// Delimiter separating the three segments of an FQN.
const SEP: &str = "$$";

/// Sentinel returned by [`parse_short`] when the input is not
/// well-formed. Callers must treat this as a programming error rather
/// than a recoverable value.
pub const UNSUPPORTED_NAME_FORMAT: &str = "UNSUPPORTED_NAME_FORMAT";

/// A fully-qualified job identifier, `"{graph}$${variant}$${short}$$"`.
#[derive(Clone, PartialEq, Eq, Hash, Display, From, AsRef, Serialize, Deserialize)]
#[serde(transparent)]
#[as_ref(str)]
pub struct Fqn(String);

impl Fqn {
    /// Builds an FQN from its three segments.
    pub fn make(graph: &str, variant: &str, short: &str) -> Self {
        Self(make_fqn(graph, variant, short))
    }

    /// Returns the short-name segment, or the
    /// [`UNSUPPORTED_NAME_FORMAT`] sentinel if malformed.
    pub fn short_name(&self) -> &str {
        parse_short(&self.0)
    }

    /// Returns the raw FQN string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A job's local identifier within its graph.
///
/// Newtype over `String` so short names and FQNs can't be confused at
/// call sites that take both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortName(String);

impl ShortName {
    /// Wraps a short name, validating it contains no `$$` delimiter
    /// (which would make FQN parsing ambiguous).
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the short name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Fqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fqn({})", self.0)
    }
}

impl From<&str> for ShortName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::borrow::Borrow<str> for ShortName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Builds an FQN string: `"{graph}$${variant}$${short}$$"`.
///
/// An empty `variant` is allowed and yields a double `$$` in the middle,
/// in that position.
pub fn make_fqn(graph: &str, variant: &str, short: &str) -> String {
    format!("{graph}{SEP}{variant}{SEP}{short}{SEP}")
}

/// Extracts the short-name segment from a literal FQN string.
///
/// The short name is the segment between the second and third `$$`
/// delimiter pair. Ill-formed input (wrong segment count) yields
/// [`UNSUPPORTED_NAME_FORMAT`].
pub fn parse_short(fqn: &str) -> &str {
    let mut parts = fqn.splitn(4, SEP);
    let _graph = parts.next();
    let _variant = parts.next();
    let short = parts.next();
    let trailer = parts.next();

    match (short, trailer) {
        (Some(short), Some("")) => short,
        _ => UNSUPPORTED_NAME_FORMAT,
    }
}

/// Finds the lowest integer suffix `_N` (starting at 1) that makes
/// `"{graph}$${variant}$$"` a prefix not already used by any key in
/// `job_map`.
///
/// Pure function over the existing key set; does not mutate `job_map`.
pub fn unique_variant<V>(job_map: &HashMap<String, V>, graph: &str, variant: &str) -> String {
    let collides = |candidate_variant: &str| {
        let prefix = format!("{graph}{SEP}{candidate_variant}{SEP}");
        job_map.keys().any(|k| k.starts_with(&prefix))
    };

    if !collides(variant) {
        return variant.to_string();
    }

    let mut n = 1u64;
    loop {
        let candidate = format!("{variant}_{n}");
        if !collides(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
