//! Formatter that writes a parsed program back out as rule text.
//!
//! Printing never mutates the program; the output reparses to the same
//! command sequence.
use crate::ast::{Command, Condition, Expr, FileType, InspectArg, Program};
use std::io;

/// Printer for rule programs.
pub struct Printer;

impl Printer {
    /// Render an expression in expression position: plain values print as
    /// barewords when the lexer would read them back, everything else is
    /// quoted.
    pub fn format_expr(expr: &Expr) -> String {
        match expr {
            Expr::Literal(value) => {
                if is_bareword(value) {
                    value.clone()
                } else {
                    format!("\"{}\"", escape(value))
                }
            }
            Expr::VarRef(name) => format!("${name}"),
            Expr::Concat(_) => Self::format_quoted(expr),
            Expr::EnvLookup(name) => {
                format!("env {}", Self::format_expr(name))
            }
        }
    }

    /// Render an expression as a quoted string with `{expr}` interpolation.
    pub fn format_quoted(expr: &Expr) -> String {
        let mut out = String::from("\"");
        push_quoted(&mut out, expr);
        out.push('"');
        out
    }

    pub fn format_condition(cond: &Condition) -> String {
        match cond {
            Condition::And(children) => junction(children, " and "),
            Condition::Or(children) => junction(children, " or "),
            Condition::Not(child) => {
                format!("not {}", atom(child))
            }
            Condition::Glob {
                datasource,
                pattern,
            } => format!(
                "{}glob {}",
                prefix(datasource),
                Self::format_expr(pattern)
            ),
            Condition::Regex {
                datasource,
                pattern,
            } => format!(
                "{}match {}",
                prefix(datasource),
                Self::format_quoted(pattern)
            ),
            Condition::Grep {
                datasource,
                pattern,
                range,
                ..
            } => {
                let mut out = format!(
                    "{}grep {}",
                    prefix(datasource),
                    Self::format_quoted(pattern)
                );
                if let Some(high) = range.high {
                    out.push_str(&format!(" <{high}"));
                }
                if let Some(low) = range.low {
                    out.push_str(&format!(" >{low}"));
                }
                out
            }
            Condition::Stat {
                datasource,
                filetype,
            } => format!(
                "{}is {}",
                prefix(datasource),
                filetype_name(*filetype)
            ),
        }
    }

    pub fn format_command(command: &Command) -> String {
        match command {
            Command::Rule(label) => format!("rule {label}"),
            Command::Condition(cond) => Self::format_condition(cond),
            Command::SetVar { name, value } => {
                format!("{name} = {}", Self::format_expr(value))
            }
            Command::CopyTo(dest) => {
                format!("copyto {}", Self::format_expr(dest))
            }
            Command::MoveTo(dest) => {
                format!("moveto {}", Self::format_expr(dest))
            }
            Command::Stop => "stop".to_string(),
            Command::Inspect(None) => "inspect".to_string(),
            Command::Inspect(Some(InspectArg::All)) => {
                "inspect all".to_string()
            }
            Command::Inspect(Some(InspectArg::Expr(expr))) => {
                format!("inspect {}", Self::format_expr(expr))
            }
        }
    }

    /// Write the whole program, one command per line.
    pub fn write_program<W: io::Write>(
        program: &Program,
        f: &mut W,
    ) -> io::Result<()> {
        for command in &program.commands {
            writeln!(f, "{}", Self::format_command(command))?;
        }
        Ok(())
    }
}

/// Junction children print in order; nested junctions keep their grouping
/// with parentheses.
fn junction(children: &[Condition], sep: &str) -> String {
    children
        .iter()
        .map(atom)
        .collect::<Vec<_>>()
        .join(sep)
}

fn atom(cond: &Condition) -> String {
    match cond {
        Condition::And(_) | Condition::Or(_) => {
            format!("({})", Printer::format_condition(cond))
        }
        _ => Printer::format_condition(cond),
    }
}

fn prefix(datasource: &Option<Expr>) -> String {
    match datasource {
        Some(expr) => format!("{} ", Printer::format_expr(expr)),
        None => String::new(),
    }
}

fn filetype_name(filetype: FileType) -> &'static str {
    match filetype {
        FileType::Dir => "dir",
        FileType::File => "file",
        FileType::CharDev => "chardev",
        FileType::BlockDev => "blockdev",
        FileType::Fifo => "fifo",
        FileType::Sock => "sock",
        FileType::Door => "door",
        FileType::Port => "port",
        FileType::Whiteout => "whiteout",
    }
}

fn push_quoted(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Literal(value) => out.push_str(&escape(value)),
        Expr::Concat(parts) => {
            for part in parts {
                match part {
                    Expr::Literal(value) => out.push_str(&escape(value)),
                    other => {
                        out.push('{');
                        out.push_str(&Printer::format_expr(other));
                        out.push('}');
                    }
                }
            }
        }
        other => {
            out.push('{');
            out.push_str(&Printer::format_expr(other));
            out.push('}');
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '"' | '{' | '}') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Would the lexer read this back as a single bareword?
fn is_bareword(text: &str) -> bool {
    const GUARDED: [&str; 14] = [
        "and", "or", "not", "glob", "is", "rule", "match", "grep", "stop",
        "copyto", "moveto", "inspect", "env", "all",
    ];
    !text.is_empty()
        && !text.chars().any(|c| {
            c.is_whitespace()
                || matches!(
                    c,
                    '#' | '$' | '"' | '\'' | '\\' | '(' | ')' | '=' | '{' | '}'
                )
        })
        && !GUARDED.iter().any(|kw| text.eq_ignore_ascii_case(kw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::PlumbParser;

    fn reprint(text: &str) -> String {
        let program = PlumbParser::parse_program(text).unwrap();
        let mut out = Vec::new();
        Printer::write_program(&program, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn prints_commands_one_per_line() {
        assert_eq!(
            reprint("rule py\nglob *.py\ncopyto \"/tmp/\"\nstop"),
            "rule py\nglob *.py\ncopyto /tmp/\nstop\n"
        );
    }

    #[test]
    fn quotes_what_the_lexer_cannot_read_back() {
        assert_eq!(reprint("x = \"a b\""), "x = \"a b\"\n");
        assert_eq!(reprint("x = \"\""), "x = \"\"\n");
        assert_eq!(reprint("x = \"a\\\"b\""), "x = \"a\\\"b\"\n");
    }

    #[test]
    fn interpolations_survive() {
        assert_eq!(
            reprint("x = \"b{$foo}a\""),
            "x = \"b{$foo}a\"\n"
        );
        assert_eq!(reprint("copyto env DEST"), "copyto env DEST\n");
    }

    #[test]
    fn nested_junctions_keep_their_grouping() {
        assert_eq!(
            reprint("glob x z and glob y q"),
            "(glob x or glob z) and (glob y or glob q)\n"
        );
        assert_eq!(
            reprint("not (is file or is dir)"),
            "not (is file or is dir)\n"
        );
    }

    #[test]
    fn grep_ranges_and_datasources_print() {
        assert_eq!(
            reprint("$p grep \"alpha\" <100 >7"),
            "$p grep \"alpha\" <100 >7\n"
        );
        assert_eq!(reprint("is pipe"), "is fifo\n");
    }

    #[test]
    fn printed_programs_reparse_to_the_same_commands() {
        let corpus = [
            "rule t\nstop",
            "glob *.py *.pyc and not is dir\ncopyto \"/tmp/\"",
            "a = $b\nmatch \"(?P<x>.*)\"\nmoveto \"{$x}/done\"",
            "grep \"alpha\" <10 >3 or grep \"beta\"",
            "inspect all\ninspect $x\ninspect",
        ];
        for text in corpus {
            let first = PlumbParser::parse_program(text).unwrap();
            let printed = reprint(text);
            let second = PlumbParser::parse_program(&printed).unwrap();
            assert_eq!(first.commands, second.commands, "for input {text:?}");
        }
    }
}
