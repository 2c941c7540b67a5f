//! Rule-language parsing and AST representation.
//!
//! Defines the rule AST and the parser. A parsed [`Program`] is interpreted
//! by the `runtime` crate against one routable at a time.

pub mod ast;
pub mod parser;
pub mod printer;

pub use ast::{
    ByteRange, Command, Condition, Expr, FileType, InspectArg, Program,
    SiteSpec,
};
pub use parser::PlumbParser;
pub use printer::Printer;
