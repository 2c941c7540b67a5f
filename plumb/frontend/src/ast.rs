//! Abstract syntax tree for rule programs.
use std::str::FromStr;

/// A string-producing expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A fixed string.
    Literal(String),
    /// `$name`: the current value of a session variable.
    VarRef(String),
    /// Concatenation of the stringified parts, in order. Nil parts
    /// contribute nothing.
    Concat(Vec<Expr>),
    /// `env expr`: a process environment variable, nil when unset.
    EnvLookup(Box<Expr>),
}

impl Expr {
    /// The literal value, if this expression needs no evaluation.
    pub fn as_constant(&self) -> Option<&str> {
        match self {
            Expr::Literal(v) => Some(v),
            _ => None,
        }
    }
}

/// Byte window for a content scan, from the `<N`/`>M` modifiers.
/// `low` is the first searchable offset, `high` the first offset past the
/// window. Absent bounds leave that side open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteRange {
    pub low: Option<u64>,
    pub high: Option<u64>,
}

/// File types recognized by `is`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Dir,
    File,
    CharDev,
    BlockDev,
    Fifo,
    Sock,
    Door,
    Port,
    Whiteout,
}

impl FromStr for FileType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "dir" => FileType::Dir,
            "file" => FileType::File,
            "chardev" => FileType::CharDev,
            "blockdev" => FileType::BlockDev,
            "fifo" | "pipe" => FileType::Fifo,
            "sock" => FileType::Sock,
            "door" => FileType::Door,
            "port" => FileType::Port,
            "wht" | "whiteout" => FileType::Whiteout,
            _ => return Err(()),
        })
    }
}

/// A predicate over the current routable. Leaves carry an optional
/// `datasource` expression whose value replaces the routable's data as the
/// subject of the test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Shell-style wildcard match over the whole subject.
    Glob {
        datasource: Option<Expr>,
        pattern: Expr,
    },
    /// Regex match anchored at the start of the subject; capture groups
    /// become session variables.
    Regex {
        datasource: Option<Expr>,
        pattern: Expr,
    },
    /// Content scan of the subject path. `site` identifies this node in the
    /// program's grep-site registry.
    Grep {
        datasource: Option<Expr>,
        pattern: Expr,
        site: usize,
        range: ByteRange,
    },
    /// File-type test of the candidate path.
    Stat {
        datasource: Option<Expr>,
        filetype: FileType,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// Conjunction of `lhs` and `rhs`, splicing children when either side is
    /// already a conjunction so operator chains stay flat.
    pub fn and(lhs: Condition, rhs: Condition) -> Condition {
        match (lhs, rhs) {
            (Condition::And(mut l), Condition::And(r)) => {
                l.extend(r);
                Condition::And(l)
            }
            (Condition::And(mut l), r) => {
                l.push(r);
                Condition::And(l)
            }
            (l, Condition::And(mut r)) => {
                r.insert(0, l);
                Condition::And(r)
            }
            (l, r) => Condition::And(vec![l, r]),
        }
    }

    /// Disjunction of `lhs` and `rhs`, flattened like [`Condition::and`].
    pub fn or(lhs: Condition, rhs: Condition) -> Condition {
        match (lhs, rhs) {
            (Condition::Or(mut l), Condition::Or(r)) => {
                l.extend(r);
                Condition::Or(l)
            }
            (Condition::Or(mut l), r) => {
                l.push(r);
                Condition::Or(l)
            }
            (l, Condition::Or(mut r)) => {
                r.insert(0, l);
                Condition::Or(r)
            }
            (l, r) => Condition::Or(vec![l, r]),
        }
    }

    /// Attach a datasource to every leaf under this node. Only leaves and
    /// the `Or` fan-out of a multi-pattern `glob` ever receive one.
    pub(crate) fn set_datasource(&mut self, ds: Expr) {
        match self {
            Condition::Glob { datasource, .. }
            | Condition::Regex { datasource, .. }
            | Condition::Grep { datasource, .. }
            | Condition::Stat { datasource, .. } => *datasource = Some(ds),
            Condition::Or(children) => {
                for child in children {
                    child.set_datasource(ds.clone());
                }
            }
            Condition::And(_) | Condition::Not(_) => {}
        }
    }
}

/// Argument to `inspect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InspectArg {
    /// `inspect all`: dump the whole variable store.
    All,
    /// `inspect expr`: dump the expression and its value.
    Expr(Expr),
}

/// One statement of a rule program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A stanza boundary. The only target of next-rule control transfer.
    Rule(String),
    /// A condition; failure skips to the next stanza.
    Condition(Condition),
    /// `name = expr`.
    SetVar { name: String, value: Expr },
    /// Schedule a copy of the routable's data to the destination.
    CopyTo(Expr),
    /// Schedule a move of the routable's data to the destination.
    MoveTo(Expr),
    /// End routing for the current routable.
    Stop,
    /// Diagnostic dump; no effect on control flow.
    Inspect(Option<InspectArg>),
}

/// Registry entry for one `grep` node: its pattern when constant (constant
/// patterns ride the coalesced scan) and its byte window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSpec {
    pub constant: Option<String>,
    pub range: ByteRange,
}

/// A compiled rule program: the command sequence plus the grep-site
/// registry. The registry is owned here so replacing the program (e.g. when
/// the rule file changes) retires every site with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub commands: Vec<Command>,
    pub sites: Vec<SiteSpec>,
}

impl Program {
    pub fn parse(text: &str) -> plumb_utils::PlumbResult<Self> {
        crate::parser::PlumbParser::parse_program(text)
    }
}
