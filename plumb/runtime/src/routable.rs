//! One message flowing through the router.
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use std::path::PathBuf;

/// A tagged scalar: the payload of a routable and the result of expression
/// evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Bytes(Vec<u8>),
    Path(PathBuf),
    Nil,
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Coerce to a string: paths render OS-natively, bytes lossily, nil is
    /// `None`.
    pub fn to_str(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Value::Path(p) => Some(p.display().to_string()),
            Value::Nil => None,
        }
    }

    pub fn to_path(&self) -> Option<PathBuf> {
        match self {
            Value::Path(p) => Some(p.clone()),
            other => other.to_str().map(PathBuf::from),
        }
    }

    /// Wrap an optional string, mapping `None` to nil.
    pub fn from_opt(value: Option<String>) -> Value {
        value.map_or(Value::Nil, Value::Str)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<PathBuf> for Value {
    fn from(p: PathBuf) -> Self {
        Value::Path(p)
    }
}

/// An item to be routed: created per input, mutated only through the
/// environment's reserved names, and discarded after its routing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routable {
    /// Identifier for the source of the message.
    pub src: String,
    /// Who the source thinks they are talking to, i.e. where the message
    /// should be routed.
    pub dst: String,
    /// The thing being routed.
    pub data: Value,
    /// Snapshot of `data` at ingestion.
    pub original_data: Value,
    /// `text`, `file`, `dir`, or caller-supplied.
    pub kind: String,
    /// Working directory, if `data` is a file path.
    pub wdir: Option<PathBuf>,
    pub attr: LinkedHashMap<String, String>,
}

impl Routable {
    pub fn new(
        data: Value,
        kind: impl Into<String>,
        wdir: Option<PathBuf>,
    ) -> Self {
        Self {
            src: String::new(),
            dst: String::new(),
            original_data: data.clone(),
            data,
            kind: kind.into(),
            wdir,
            attr: LinkedHashMap::new(),
        }
    }

    /// A plain text routable with no working directory.
    pub fn text(data: impl Into<String>) -> Self {
        Self::new(Value::Str(data.into()), "text", None)
    }

    /// Render the attribute map as `k1=v1,k2=v2` in insertion order.
    pub fn attr_string(&self) -> String {
        self.attr
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .join(",")
    }

    /// Replace the attribute map from its serialized form.
    pub fn set_attr_string(&mut self, serialized: &str) {
        self.attr.clear();
        for piece in serialized.split(',').filter(|p| !p.is_empty()) {
            let (key, value) = piece.split_once('=').unwrap_or((piece, ""));
            self.attr.insert(key.to_string(), value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_coercions() {
        assert_eq!(Value::Str("a".into()).to_str().as_deref(), Some("a"));
        assert_eq!(
            Value::Path(PathBuf::from("/tmp/x")).to_str().as_deref(),
            Some("/tmp/x")
        );
        assert_eq!(Value::Nil.to_str(), None);
        assert_eq!(Value::Nil.to_path(), None);
        assert_eq!(
            Value::Str("a/b".into()).to_path(),
            Some(PathBuf::from("a/b"))
        );
    }

    #[test]
    fn attr_round_trip() {
        let mut r = Routable::text("x");
        r.set_attr_string("a=1,b=2,flag");
        assert_eq!(r.attr.get("a").map(String::as_str), Some("1"));
        assert_eq!(r.attr.get("flag").map(String::as_str), Some(""));
        assert_eq!(r.attr_string(), "a=1,b=2,flag=");
    }

    #[test]
    fn original_data_snapshot_survives_mutation() {
        let mut r = Routable::text("before");
        r.data = Value::Str("after".into());
        assert_eq!(r.original_data, Value::Str("before".into()));
    }
}
