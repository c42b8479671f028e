//! Dot paths into JSON objects.
//!
//! A dot path picks a value out of a document:
//!
//! | Path              | Selects                                  |
//! |-------------------|------------------------------------------|
//! | `.`               | the whole document                       |
//! | `.title`          | field `title`                            |
//! | `.creator.name`   | nested field                             |
//! | `.authors[0]`     | first array element                      |
//! | `.authors[:].name`| `name` of every element, as an array     |

use crate::error::{CoreError, CoreResult};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(usize),
    All,
}

/// A parsed dot path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotPath {
    raw: String,
    segments: Vec<Segment>,
}

impl DotPath {
    /// Parses a dot path.
    ///
    /// # Errors
    ///
    /// Returns an invalid input error if the path does not start with `.`,
    /// has an empty field name or an unterminated or non-numeric index.
    pub fn parse(path: &str) -> CoreResult<Self> {
        let bad = |why: &str| CoreError::invalid_input(format!("dot path {path:?}: {why}"));
        if !path.starts_with('.') {
            return Err(bad("must start with '.'"));
        }

        let mut segments = Vec::new();
        let chars: Vec<char> = path.chars().collect();
        let mut i = 0;
        if chars.len() == 1 {
            i = 1;
        }
        while i < chars.len() {
            match chars[i] {
                '.' => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && !matches!(chars[end], '.' | '[' | ']') {
                        end += 1;
                    }
                    if end == start {
                        return Err(bad("empty field name"));
                    }
                    segments.push(Segment::Field(chars[start..end].iter().collect()));
                    i = end;
                }
                '[' => {
                    let close = chars[i..]
                        .iter()
                        .position(|c| *c == ']')
                        .map(|offset| i + offset)
                        .ok_or_else(|| bad("unterminated '['"))?;
                    let inner: String = chars[i + 1..close].iter().collect();
                    if inner == ":" {
                        segments.push(Segment::All);
                    } else {
                        let index = inner
                            .trim()
                            .parse::<usize>()
                            .map_err(|_| bad("index must be a number or ':'"))?;
                        segments.push(Segment::Index(index));
                    }
                    i = close + 1;
                }
                _ => return Err(bad("expected '.' or '['")),
            }
        }

        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    /// Returns the path as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Evaluates the path, returning `None` when it does not resolve.
    #[must_use]
    pub fn eval(&self, document: &Value) -> Option<Value> {
        walk(&self.segments, document)
    }

    /// Derives a column label from the path.
    ///
    /// `.` becomes `root object`, dots become spaces and `[:]` becomes
    /// ` range`, so `.authors[:].name` labels as `authors range name`.
    #[must_use]
    pub fn label(&self) -> String {
        if self.raw == "." {
            return "root object".to_string();
        }
        self.raw
            .replace('.', " ")
            .replace("[:]", " range")
            .trim()
            .to_string()
    }
}

fn walk(segments: &[Segment], value: &Value) -> Option<Value> {
    match segments.split_first() {
        None => Some(value.clone()),
        Some((Segment::Field(name), rest)) => walk(rest, value.as_object()?.get(name)?),
        Some((Segment::Index(index), rest)) => walk(rest, value.as_array()?.get(*index)?),
        Some((Segment::All, rest)) => {
            let items = value.as_array()?;
            Some(Value::Array(
                items.iter().filter_map(|item| walk(rest, item)).collect(),
            ))
        }
    }
}

impl fmt::Display for DotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DotPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Evaluates a dot path string against a document.
///
/// # Errors
///
/// Returns an invalid input error if the path does not parse.
pub fn eval(path: &str, document: &Value) -> CoreResult<Option<Value>> {
    Ok(DotPath::parse(path)?.eval(document))
}
