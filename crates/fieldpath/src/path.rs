use crate::Element;
use peg::str::LineCol;
use serde_json::Value;
use std::{
    fmt::{self, Display},
    ops::Deref,
    str::FromStr,
};

#[derive(Debug, PartialEq, Clone)]
pub struct PathBuf(pub Vec<Element>);
pub type Path = [Element];

impl From<&Path> for PathBuf {
    fn from(p: &Path) -> Self {
        PathBuf(p.into())
    }
}

impl PathBuf {
    /// Convert json pointer (as found in json-patch operations) to path
    ///
    /// Pointer segments are ambiguous, `/0` may be either index or object key,
    /// so they are resolved against `document`: segment is an index only where
    /// `document` has an array. Past the end of `document`, segments are fields.
    pub fn from_rfc6901(pointer: &str, document: &Value) -> Self {
        let mut out = Vec::new();
        let mut current = Some(document);
        for part in pointer.split('/').skip(1) {
            let part = part.replace("~1", "/").replace("~0", "~");
            match (current, part.parse::<usize>()) {
                (Some(Value::Array(items)), Ok(idx)) => {
                    current = items.get(idx);
                    out.push(Element::Index(idx));
                }
                _ => {
                    current = current.and_then(|v| v.get(part.as_str()));
                    out.push(Element::Field(part));
                }
            }
        }
        Self(out)
    }
}

impl Display for PathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in self.0.iter() {
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}
impl Deref for PathBuf {
    type Target = [Element];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for PathBuf {
    type Err = peg::error::ParseError<LineCol>;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        crate::parse(s)
    }
}
