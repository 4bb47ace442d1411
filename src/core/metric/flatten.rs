//! Flattening of nested status documents into dotted metric names.
//!
//! Service status commands return arbitrarily nested mappings whose leaves
//! are a mix of numbers, strings, booleans and nulls. [`flatten`] walks such
//! a tree depth-first and lazily yields one `(name, value)` pair per numeric
//! leaf. Non-numeric leaves and sequences are dropped.

use std::{borrow::Cow, collections::HashSet, fmt};

use serde::Serialize;
use serde_json::{map, Value};

use super::{
    error::{MetricError, MetricResult},
    path::DELIMITER,
};

/// Nesting bound applied when none is configured.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// A numeric value extracted from a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(self) -> f64 {
        match self {
            MetricValue::Integer(value) => value as f64,
            MetricValue::Float(value) => value,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Integer(value) => write!(f, "{}", value),
            MetricValue::Float(value) => write!(f, "{}", value),
        }
    }
}

/// Classification of a leaf before the emit/coerce rule is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Leaf {
    Integer(i64),
    Floating(f64),
    /// Integer that does not fit the signed 64-bit range.
    WideInteger(u64),
    Other,
}

impl Leaf {
    pub fn classify(value: &Value) -> Self {
        match value {
            Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Leaf::Integer(int)
                } else if let Some(wide) = number.as_u64() {
                    Leaf::WideInteger(wide)
                } else {
                    number.as_f64().map_or(Leaf::Other, Leaf::Floating)
                }
            }
            _ => Leaf::Other,
        }
    }

    /// Wide integers are widened to floating point; everything that is not
    /// a number yields `None`.
    pub fn into_value(self) -> Option<MetricValue> {
        match self {
            Leaf::Integer(value) => Some(MetricValue::Integer(value)),
            Leaf::Floating(value) => Some(MetricValue::Float(value)),
            Leaf::WideInteger(value) => Some(MetricValue::Float(value as f64)),
            Leaf::Other => None,
        }
    }
}

/// Literal substring replacement applied to each key segment on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRename {
    from: String,
    to: String,
}

impl KeyRename {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        KeyRename {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn apply<'k>(&self, key: &'k str) -> Cow<'k, str> {
        if !self.from.is_empty() && key.contains(self.from.as_str()) {
            Cow::Owned(key.replace(self.from.as_str(), &self.to))
        } else {
            Cow::Borrowed(key)
        }
    }
}

/// Options controlling a flattening pass.
#[derive(Debug, Clone)]
pub struct FlattenOptions {
    /// Leading segments prepended to every emitted name.
    pub prefix: Vec<String>,
    /// Keys skipped wherever they appear; their subtrees are never visited.
    pub ignore: HashSet<String>,
    pub rename: Option<KeyRename>,
    pub max_depth: usize,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        FlattenOptions {
            prefix: Vec::new(),
            ignore: HashSet::new(),
            rename: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl FlattenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix = segments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ignore<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rename(mut self, rename: KeyRename) -> Self {
        self.rename = Some(rename);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Lazily flattens `tree` according to `options`.
///
/// The walk borrows the tree and keeps no state outside the returned
/// iterator, so calling `flatten` again re-walks the same input.
///
/// ```
/// use nectar::core::metric::{flatten, FlattenOptions, MetricValue};
/// use serde_json::json;
///
/// let tree = json!({"connections": {"current": 12, "note": "ok"}});
/// let pairs: Vec<_> = flatten(&tree, &FlattenOptions::new())
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(pairs, vec![("connections.current".to_string(), MetricValue::Integer(12))]);
/// ```
pub fn flatten<'a>(tree: &'a Value, options: &'a FlattenOptions) -> Flatten<'a> {
    let mut stack = Vec::new();
    if let Value::Object(entries) = tree {
        stack.push(Frame {
            name: options.prefix.join(&DELIMITER.to_string()),
            depth: 1,
            entries: entries.iter(),
        });
    }
    Flatten {
        options,
        stack,
        failed: false,
    }
}

struct Frame<'a> {
    name: String,
    depth: usize,
    entries: map::Iter<'a>,
}

/// Iterator returned by [`flatten`].
///
/// Yields `Err(MetricError::Traversal)` once and then ends if the tree nests
/// deeper than `max_depth` mappings.
pub struct Flatten<'a> {
    options: &'a FlattenOptions,
    stack: Vec<Frame<'a>>,
    failed: bool,
}

impl<'a> Iterator for Flatten<'a> {
    type Item = MetricResult<(String, MetricValue)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let frame = self.stack.last_mut()?;
            let Some((key, value)) = frame.entries.next() else {
                self.stack.pop();
                continue;
            };

            if self.options.ignore.contains(key.as_str()) {
                continue;
            }

            let segment = match &self.options.rename {
                Some(rename) => rename.apply(key),
                None => Cow::Borrowed(key.as_str()),
            };
            let name = if frame.name.is_empty() {
                segment.into_owned()
            } else {
                format!("{}{}{}", frame.name, DELIMITER, segment)
            };
            let depth = frame.depth + 1;

            match value {
                Value::Object(children) => {
                    if depth > self.options.max_depth {
                        self.failed = true;
                        return Some(Err(MetricError::Traversal {
                            path: name,
                            max_depth: self.options.max_depth,
                        }));
                    }
                    self.stack.push(Frame {
                        name,
                        depth,
                        entries: children.iter(),
                    });
                }
                leaf => {
                    if let Some(value) = Leaf::classify(leaf).into_value() {
                        return Some(Ok((name, value)));
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Flatten<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flatten")
            .field("pending_frames", &self.stack.len())
            .field("failed", &self.failed)
            .finish()
    }
}
