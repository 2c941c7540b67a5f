#![allow(clippy::upper_case_acronyms)]

//! Parser for rule programs.
use super::ast::{
    ByteRange, Command, Condition, Expr, FileType, InspectArg, Program,
    SiteSpec,
};
use pest::error::LineColLocation;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_consume::{match_nodes, Error, Parser};
use plumb_utils::{self, PlumbResult};
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::str::FromStr;

type ParseResult<T> = Result<T, Error<Rule>>;

/// Data threaded through lowering: the grep-site registry under
/// construction.
#[derive(Clone)]
struct UserData {
    sites: Rc<RefCell<Vec<SiteSpec>>>,
}

type Node<'i> = pest_consume::Node<'i, Rule, UserData>;

// include the grammar file so that Cargo knows to rebuild this file on grammar changes
const _GRAMMAR: &str = include_str!("syntax.pest");

// Define the precedence of the boolean connectives. `and` and `or` bind
// equally and associate left. We use `lazy_static` so that this is only ever
// constructed once.
lazy_static::lazy_static! {
    static ref PRATT: PrattParser<Rule> =
    PrattParser::new()
        .op(Op::infix(Rule::kw_and, Assoc::Left)
            | Op::infix(Rule::kw_or, Assoc::Left));
}

#[derive(Parser)]
#[grammar = "syntax.pest"]
pub struct PlumbParser;

impl PlumbParser {
    /// Parse a rule file into a program.
    pub fn parse_file(path: &Path) -> PlumbResult<Program> {
        let content = fs::read_to_string(path).map_err(|err| {
            plumb_utils::Error::invalid_file(format!(
                "Failed to read {}: {err}",
                path.display(),
            ))
        })?;
        Self::parse_program(&content)
    }

    /// Parse rule text into a program.
    ///
    /// Failures from the pest parse are parse errors; failures from
    /// lowering (an unknown file type, say) are semantic errors. Both carry
    /// the offending line and column.
    pub fn parse_program(text: &str) -> PlumbResult<Program> {
        let time = std::time::Instant::now();
        let sites = Rc::new(RefCell::new(Vec::new()));
        let user_data = UserData {
            sites: Rc::clone(&sites),
        };
        let inputs =
            PlumbParser::parse_with_userdata(Rule::file, text, user_data)
                .map_err(|e| parse_error(&e))?;
        let input = inputs.single().map_err(|e| parse_error(&e))?;
        let commands = PlumbParser::file(input).map_err(|e| semantic_error(&e))?;
        log::info!(
            "Parsed rule program in {}ms",
            time.elapsed().as_millis()
        );
        let sites = Rc::try_unwrap(sites)
            .map(RefCell::into_inner)
            .unwrap_or_else(|shared| shared.borrow().clone());
        Ok(Program { commands, sites })
    }

    #[allow(clippy::result_large_err)]
    fn junction_helper(
        ud: UserData,
        pairs: pest::iterators::Pairs<Rule>,
    ) -> ParseResult<Condition> {
        PRATT
            .map_primary(|primary| match primary.as_rule() {
                Rule::cond_term => Self::cond_term(
                    Node::new_with_user_data(primary, ud.clone()),
                ),
                Rule::ml_cond_term => Self::ml_cond_term(
                    Node::new_with_user_data(primary, ud.clone()),
                ),
                x => unreachable!("Unexpected rule {:?} for cond_expr", x),
            })
            .map_infix(|lhs, op, rhs| {
                let (lhs, rhs) = (lhs?, rhs?);
                Ok(match op.as_rule() {
                    Rule::kw_and => Condition::and(lhs, rhs),
                    Rule::kw_or => Condition::or(lhs, rhs),
                    _ => unreachable!(),
                })
            })
            .parse(pairs)
    }
}

fn line_col<R: pest::RuleType>(err: &Error<R>) -> (usize, usize) {
    match err.line_col {
        LineColLocation::Pos((line, col)) => (line, col),
        LineColLocation::Span((line, col), _) => (line, col),
    }
}

/// The pest parse rejected the input: ill-formed rule text.
fn parse_error(err: &Error<Rule>) -> plumb_utils::Error {
    let (line, col) = line_col(err);
    plumb_utils::Error::parse_error(err).with_pos(line, col)
}

/// The input parsed, but lowering rejected a reference inside it.
fn semantic_error(err: &Error<Rule>) -> plumb_utils::Error {
    let (line, col) = line_col(err);
    plumb_utils::Error::semantic(err.variant.message()).with_pos(line, col)
}

#[pest_consume::parser]
impl PlumbParser {
    fn EOI(_input: Node) -> ParseResult<()> {
        Ok(())
    }

    // ================ Keywords =====================
    fn kw_rule(_input: Node) -> ParseResult<()> {
        Ok(())
    }

    fn kw_stop(_input: Node) -> ParseResult<()> {
        Ok(())
    }

    fn kw_copyto(_input: Node) -> ParseResult<()> {
        Ok(())
    }

    fn kw_moveto(_input: Node) -> ParseResult<()> {
        Ok(())
    }

    fn kw_inspect(_input: Node) -> ParseResult<()> {
        Ok(())
    }

    fn kw_all(_input: Node) -> ParseResult<()> {
        Ok(())
    }

    fn kw_glob(_input: Node) -> ParseResult<()> {
        Ok(())
    }

    fn kw_match(_input: Node) -> ParseResult<()> {
        Ok(())
    }

    fn kw_grep(_input: Node) -> ParseResult<()> {
        Ok(())
    }

    fn kw_is(_input: Node) -> ParseResult<()> {
        Ok(())
    }

    fn kw_env(_input: Node) -> ParseResult<()> {
        Ok(())
    }

    fn kw_not(_input: Node) -> ParseResult<()> {
        Ok(())
    }

    // ================ Literals =====================
    fn bareword(input: Node) -> ParseResult<String> {
        Ok(input.as_str().to_string())
    }

    fn number(input: Node) -> ParseResult<u64> {
        input
            .as_str()
            .parse::<u64>()
            .map_err(|_| input.error("Expected valid byte offset"))
    }

    // ================ Expressions =====================
    fn expr(input: Node) -> ParseResult<Expr> {
        Ok(match_nodes!(input.into_children();
            [env_lookup(e)] => e,
            [fstr(e)] => e,
            [varref(e)] => e,
            [literal(e)] => e,
        ))
    }

    fn env_lookup(input: Node) -> ParseResult<Expr> {
        Ok(match_nodes!(input.into_children();
            [kw_env(_), expr(name)] => Expr::EnvLookup(Box::new(name)),
        ))
    }

    fn varref(input: Node) -> ParseResult<Expr> {
        Ok(match_nodes!(input.into_children();
            [bareword(name)] => Expr::VarRef(name),
        ))
    }

    fn literal(input: Node) -> ParseResult<Expr> {
        Ok(match_nodes!(input.into_children();
            [bareword(value)] => Expr::Literal(value),
        ))
    }

    /// Lower a quoted string, fusing adjacent constant pieces so that a
    /// fully constant string becomes a single literal.
    fn fstr(input: Node) -> ParseResult<Expr> {
        fn push_text(fused: &mut Vec<Expr>, text: &str) {
            if let Some(Expr::Literal(last)) = fused.last_mut() {
                last.push_str(text);
            } else {
                fused.push(Expr::Literal(text.to_string()));
            }
        }

        let mut fused: Vec<Expr> = Vec::new();
        for node in input.into_children() {
            match node.as_rule() {
                Rule::fstr_chars => push_text(&mut fused, node.as_str()),
                Rule::escaped_char => {
                    push_text(&mut fused, &node.as_str()[1..]);
                }
                Rule::fstr_expr => match Self::fstr_expr(node)? {
                    Expr::Literal(text) => push_text(&mut fused, &text),
                    part => fused.push(part),
                },
                x => unreachable!("Unexpected rule {:?} in string literal", x),
            }
        }
        Ok(match fused.len() {
            0 => Expr::Literal(String::new()),
            1 => fused.pop().unwrap(),
            _ => Expr::Concat(fused),
        })
    }

    fn fstr_expr(input: Node) -> ParseResult<Expr> {
        Ok(match_nodes!(input.into_children();
            [expr(e)] => e,
        ))
    }

    // ================ Conditions =====================
    fn cond_expr(input: Node) -> ParseResult<Condition> {
        let ud = input.user_data().clone();
        Self::junction_helper(ud, input.into_pair().into_inner())
    }

    fn ml_cond_expr(input: Node) -> ParseResult<Condition> {
        let ud = input.user_data().clone();
        Self::junction_helper(ud, input.into_pair().into_inner())
    }

    fn cond_term(input: Node) -> ParseResult<Condition> {
        Ok(match_nodes!(input.into_children();
            [kw_not(_), group(c)] => Condition::Not(Box::new(c)),
            [kw_not(_), condition(c)] => Condition::Not(Box::new(c)),
            [group(c)] => c,
            [condition(c)] => c,
        ))
    }

    fn ml_cond_term(input: Node) -> ParseResult<Condition> {
        Ok(match_nodes!(input.into_children();
            [kw_not(_), group(c)] => Condition::Not(Box::new(c)),
            [kw_not(_), condition(c)] => Condition::Not(Box::new(c)),
            [group(c)] => c,
            [condition(c)] => c,
        ))
    }

    fn group(input: Node) -> ParseResult<Condition> {
        Ok(match_nodes!(input.into_children();
            [ml_cond_expr(c)] => c,
        ))
    }

    fn condition(input: Node) -> ParseResult<Condition> {
        let mut datasource = None;
        let mut cond = None;
        for node in input.into_children() {
            match node.as_rule() {
                Rule::datasource => {
                    datasource = Some(Self::datasource(node)?);
                }
                Rule::glob_cond => cond = Some(Self::glob_cond(node)?),
                Rule::match_cond => cond = Some(Self::match_cond(node)?),
                Rule::grep_cond => cond = Some(Self::grep_cond(node)?),
                Rule::is_cond => cond = Some(Self::is_cond(node)?),
                x => unreachable!("Unexpected rule {:?} for condition", x),
            }
        }
        let mut cond = cond.expect("grammar guarantees a predicate");
        if let Some(ds) = datasource {
            cond.set_datasource(ds);
        }
        Ok(cond)
    }

    fn datasource(input: Node) -> ParseResult<Expr> {
        Ok(match_nodes!(input.into_children();
            [expr(e)] => e,
        ))
    }

    /// `glob` with several patterns is any-of.
    fn glob_cond(input: Node) -> ParseResult<Condition> {
        Ok(match_nodes!(input.into_children();
            [kw_glob(_), expr(pats)..] => {
                let mut globs: Vec<Condition> = pats
                    .map(|pattern| Condition::Glob {
                        datasource: None,
                        pattern,
                    })
                    .collect();
                if globs.len() == 1 {
                    globs.pop().unwrap()
                } else {
                    Condition::Or(globs)
                }
            },
        ))
    }

    fn match_cond(input: Node) -> ParseResult<Condition> {
        Ok(match_nodes!(input.into_children();
            [kw_match(_), fstr(pattern)] => Condition::Regex {
                datasource: None,
                pattern,
            },
        ))
    }

    /// Allocate a grep site for this node. Repeated `<`/`>` modifiers keep
    /// the widest window.
    fn grep_cond(input: Node) -> ParseResult<Condition> {
        let ud = input.user_data().clone();
        let mut pattern = None;
        let mut range = ByteRange::default();
        for node in input.into_children() {
            match node.as_rule() {
                Rule::kw_grep => {}
                Rule::fstr => pattern = Some(Self::fstr(node)?),
                Rule::grep_high => {
                    let n = Self::grep_high(node)?;
                    range.high = Some(range.high.map_or(n, |h| h.max(n)));
                }
                Rule::grep_low => {
                    let n = Self::grep_low(node)?;
                    range.low = Some(range.low.map_or(n, |l| l.min(n)));
                }
                x => unreachable!("Unexpected rule {:?} for grep", x),
            }
        }
        let pattern = pattern.expect("grammar guarantees a pattern");
        let mut sites = ud.sites.borrow_mut();
        let site = sites.len();
        sites.push(SiteSpec {
            constant: pattern.as_constant().map(str::to_owned),
            range,
        });
        Ok(Condition::Grep {
            datasource: None,
            pattern,
            site,
            range,
        })
    }

    fn grep_high(input: Node) -> ParseResult<u64> {
        Ok(match_nodes!(input.into_children();
            [number(n)] => n,
        ))
    }

    fn grep_low(input: Node) -> ParseResult<u64> {
        Ok(match_nodes!(input.into_children();
            [number(n)] => n,
        ))
    }

    fn is_cond(input: Node) -> ParseResult<Condition> {
        Ok(match_nodes!(input.clone().into_children();
            [kw_is(_), bareword(word)] => {
                let filetype = FileType::from_str(&word).map_err(|()| {
                    input.error(format!("unknown file type `{word}`"))
                })?;
                Condition::Stat { datasource: None, filetype }
            },
        ))
    }

    // ================ Commands =====================
    fn command(input: Node) -> ParseResult<Command> {
        Ok(match_nodes!(input.into_children();
            [rule_cmd(c)] => c,
            [stop_cmd(c)] => c,
            [copyto_cmd(c)] => c,
            [moveto_cmd(c)] => c,
            [inspect_cmd(c)] => c,
            [setvar_cmd(c)] => c,
            [cond_cmd(c)] => c,
        ))
    }

    fn rule_cmd(input: Node) -> ParseResult<Command> {
        Ok(match_nodes!(input.into_children();
            [kw_rule(_), bareword(label)] => Command::Rule(label),
        ))
    }

    fn stop_cmd(input: Node) -> ParseResult<Command> {
        Ok(match_nodes!(input.into_children();
            [kw_stop(_)] => Command::Stop,
        ))
    }

    fn copyto_cmd(input: Node) -> ParseResult<Command> {
        Ok(match_nodes!(input.into_children();
            [kw_copyto(_), expr(dest)] => Command::CopyTo(dest),
        ))
    }

    fn moveto_cmd(input: Node) -> ParseResult<Command> {
        Ok(match_nodes!(input.into_children();
            [kw_moveto(_), expr(dest)] => Command::MoveTo(dest),
        ))
    }

    fn inspect_cmd(input: Node) -> ParseResult<Command> {
        Ok(match_nodes!(input.into_children();
            [kw_inspect(_)] => Command::Inspect(None),
            [kw_inspect(_), kw_all(_)] => Command::Inspect(Some(InspectArg::All)),
            [kw_inspect(_), expr(e)] => Command::Inspect(Some(InspectArg::Expr(e))),
        ))
    }

    fn setvar_cmd(input: Node) -> ParseResult<Command> {
        Ok(match_nodes!(input.into_children();
            [bareword(name), expr(value)] => Command::SetVar { name, value },
        ))
    }

    fn cond_cmd(input: Node) -> ParseResult<Command> {
        Ok(match_nodes!(input.into_children();
            [cond_expr(c)] => Command::Condition(c),
        ))
    }

    fn file(input: Node) -> ParseResult<Vec<Command>> {
        Ok(match_nodes!(input.into_children();
            [EOI(_)] => Vec::new(),
            [command(cmds).., EOI(_)] => cmds.collect(),
        ))
    }
}
