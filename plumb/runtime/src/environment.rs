//! Session variable store with reserved names projected onto the active
//! routable.
use crate::routable::{Routable, Value};
use std::collections::HashMap;

/// The reserved names. Reads and writes of these go straight to the
/// routable's fields; everything else lives in the generic map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reserved {
    Src,
    Dst,
    Data,
    Type,
    Wdir,
    Attr,
}

impl Reserved {
    fn from_name(name: &str) -> Option<Reserved> {
        Some(match name {
            "src" => Reserved::Src,
            "dst" => Reserved::Dst,
            "data" => Reserved::Data,
            "type" => Reserved::Type,
            "wdir" => Reserved::Wdir,
            "attr" => Reserved::Attr,
            _ => return None,
        })
    }
}

/// Session-scoped variables. Variables persist across routables; the
/// reserved names follow whichever routable is active.
#[derive(Debug)]
pub struct Environment {
    routable: Routable,
    vars: HashMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            routable: Routable::new(Value::Nil, "text", None),
            vars: HashMap::new(),
        }
    }

    /// Make `routable` the projection target of the reserved names.
    pub fn set_routable(&mut self, routable: Routable) {
        self.routable = routable;
        self.refresh_derived();
    }

    pub fn routable(&self) -> &Routable {
        &self.routable
    }

    pub fn vars(&self) -> &HashMap<String, Value> {
        &self.vars
    }

    /// Read a variable; undefined non-reserved names are nil.
    pub fn get(&self, name: &str) -> Value {
        self.get_or(name, Value::Nil)
    }

    pub fn get_or(&self, name: &str, default: Value) -> Value {
        match Reserved::from_name(name) {
            Some(Reserved::Src) => Value::Str(self.routable.src.clone()),
            Some(Reserved::Dst) => Value::Str(self.routable.dst.clone()),
            Some(Reserved::Data) => self.routable.data.clone(),
            Some(Reserved::Type) => Value::Str(self.routable.kind.clone()),
            Some(Reserved::Wdir) => self
                .routable
                .wdir
                .clone()
                .map_or(Value::Nil, Value::Path),
            Some(Reserved::Attr) => Value::Str(self.routable.attr_string()),
            None => self.vars.get(name).cloned().unwrap_or(default),
        }
    }

    pub fn set(&mut self, name: &str, value: Value) {
        match Reserved::from_name(name) {
            Some(Reserved::Src) => {
                self.routable.src = value.to_str().unwrap_or_default();
            }
            Some(Reserved::Dst) => {
                self.routable.dst = value.to_str().unwrap_or_default();
            }
            Some(Reserved::Data) => {
                self.routable.data = value;
                self.refresh_derived();
            }
            Some(Reserved::Type) => {
                self.routable.kind = value.to_str().unwrap_or_default();
            }
            Some(Reserved::Wdir) => {
                // an empty write clears the working directory
                self.routable.wdir = value
                    .to_str()
                    .filter(|s| !s.is_empty())
                    .map(std::path::PathBuf::from);
                self.refresh_derived();
            }
            Some(Reserved::Attr) => {
                self.routable
                    .set_attr_string(&value.to_str().unwrap_or_default());
            }
            None => {
                self.vars.insert(name.to_string(), value);
            }
        }
    }

    /// Recompute the derived `file` and `dir` variables from `wdir` and
    /// `data`.
    fn refresh_derived(&mut self) {
        let candidate = self
            .routable
            .wdir
            .as_ref()
            .zip(self.routable.data.to_path())
            .map(|(wdir, data)| wdir.join(data));
        match candidate {
            Some(file) => {
                let dir = file
                    .parent()
                    .map_or(Value::Nil, |p| Value::Path(p.to_path_buf()));
                self.vars.insert("dir".to_string(), dir);
                self.vars.insert("file".to_string(), Value::Path(file));
            }
            None => {
                self.vars.remove("file");
                self.vars.remove("dir");
            }
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn env_with(data: &str, wdir: Option<&str>) -> Environment {
        let mut env = Environment::new();
        env.set_routable(Routable::new(
            Value::Str(data.to_string()),
            "text",
            wdir.map(PathBuf::from),
        ));
        env
    }

    #[test]
    fn reserved_names_project_onto_routable() {
        let mut env = env_with("payload", None);
        for name in ["src", "dst", "data", "type", "wdir", "attr"] {
            env.set(name, Value::Str(format!("v-{name}")));
        }
        assert_eq!(env.routable().src, "v-src");
        assert_eq!(env.routable().dst, "v-dst");
        assert_eq!(env.routable().data, Value::Str("v-data".into()));
        assert_eq!(env.routable().kind, "v-type");
        assert_eq!(env.routable().wdir, Some(PathBuf::from("v-wdir")));
        assert_eq!(env.get("attr"), Value::Str("v-attr=".into()));
        // and reads go through the same projection
        for name in ["src", "dst", "type"] {
            assert_eq!(env.get(name), Value::Str(format!("v-{name}")));
        }
    }

    #[test]
    fn derived_file_and_dir_follow_wdir_and_data() {
        let env = env_with("notes/todo.txt", Some("/home/me"));
        assert_eq!(
            env.get("file"),
            Value::Path(PathBuf::from("/home/me/notes/todo.txt"))
        );
        assert_eq!(
            env.get("dir"),
            Value::Path(PathBuf::from("/home/me/notes"))
        );
    }

    #[test]
    fn derived_vars_recompute_on_data_write() {
        let mut env = env_with("a.txt", Some("/w"));
        env.set("data", Value::Str("b.txt".into()));
        assert_eq!(env.get("file"), Value::Path(PathBuf::from("/w/b.txt")));
        env.set("wdir", Value::Nil);
        assert_eq!(env.get("file"), Value::Nil);
    }

    #[test]
    fn undefined_names_yield_the_default() {
        let env = env_with("x", None);
        assert_eq!(env.get("nope"), Value::Nil);
        assert_eq!(
            env.get_or("nope", Value::Str("fallback".into())),
            Value::Str("fallback".into())
        );
    }

    #[test]
    fn attr_write_parses_serialized_form() {
        let mut env = env_with("x", None);
        env.set("attr", Value::Str("a=1,b=2".into()));
        assert_eq!(env.routable().attr.get("b").map(String::as_str), Some("2"));
        assert_eq!(env.get("attr"), Value::Str("a=1,b=2".into()));
    }
}
