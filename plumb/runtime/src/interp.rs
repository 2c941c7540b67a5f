//! Interpretation of commands, conditions, and expressions against the
//! active routable.
use crate::matcher;
use crate::routable::Value;
use crate::session::Session;
use plumb_frontend::ast::{Command, Condition, Expr, InspectArg};
use plumb_utils::PlumbResult;
use std::io::Write;
use std::path::PathBuf;

/// What the interpreter does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// Continue with the next command.
    NextCommand,
    /// Skip forward to the next `rule` boundary.
    NextRule,
    /// End routing for this routable.
    Stop,
}

impl Session<'_> {
    /// Run the whole program against the active routable, honoring the
    /// control mode: a failed condition skips to the next `rule`, `stop`
    /// ends the pass.
    pub(crate) fn run_program(&mut self) -> PlumbResult<()> {
        let program = self.program;
        let mut mode = ControlMode::NextCommand;
        for command in &program.commands {
            match mode {
                ControlMode::NextCommand => {
                    mode = self.run_command(command)?;
                }
                ControlMode::NextRule => {
                    if let Command::Rule(_) = command {
                        mode = self.run_command(command)?;
                    }
                }
                ControlMode::Stop => break,
            }
        }
        Ok(())
    }

    pub fn run_command(&mut self, command: &Command) -> PlumbResult<ControlMode> {
        match command {
            Command::Rule(label) => {
                log::trace!("rule {label}");
                Ok(ControlMode::NextCommand)
            }
            Command::Condition(cond) => Ok(if self.check_condition(cond)? {
                ControlMode::NextCommand
            } else {
                ControlMode::NextRule
            }),
            Command::SetVar { name, value } => {
                let value = self.eval_expr(value)?;
                self.env.set(name, Value::from_opt(value.to_str()));
                Ok(ControlMode::NextCommand)
            }
            Command::CopyTo(dest) => {
                let src = self.env.routable().data.to_str();
                let dst = self.eval_expr(dest)?.to_str();
                if let (Some(src), Some(dst)) = (src, dst) {
                    self.scheduler.push_copy(src, dst);
                }
                Ok(ControlMode::NextCommand)
            }
            Command::MoveTo(dest) => {
                let src = self.env.routable().data.to_str();
                let dst = self.eval_expr(dest)?.to_str();
                if let (Some(src), Some(dst)) = (src, dst) {
                    self.scheduler.push_move(src, dst);
                }
                Ok(ControlMode::NextCommand)
            }
            Command::Stop => Ok(ControlMode::Stop),
            Command::Inspect(arg) => {
                self.inspect(arg)?;
                Ok(ControlMode::NextCommand)
            }
        }
    }

    pub fn check_condition(&mut self, cond: &Condition) -> PlumbResult<bool> {
        match cond {
            Condition::And(children) => {
                for child in children {
                    if !self.check_condition(child)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Or(children) => {
                for child in children {
                    if self.check_condition(child)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not(child) => Ok(!self.check_condition(child)?),
            Condition::Glob {
                datasource,
                pattern,
            } => {
                let Some(subject) = self.leaf_str(datasource)? else {
                    return Ok(false);
                };
                let Some(pattern) = self.eval_expr(pattern)?.to_str() else {
                    return Ok(false);
                };
                matcher::glob_match(&pattern, &subject)
            }
            Condition::Regex {
                datasource,
                pattern,
            } => {
                let Some(subject) = self.leaf_str(datasource)? else {
                    return Ok(false);
                };
                let Some(pattern) = self.eval_expr(pattern)?.to_str() else {
                    return Ok(false);
                };
                match matcher::regex_captures(&pattern, &subject)? {
                    Some(bindings) => {
                        for (name, value) in bindings {
                            self.env.set(&name, value);
                        }
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            Condition::Stat {
                datasource,
                filetype,
            } => {
                let subject = self.leaf_path(datasource)?;
                let candidate = match self.env.get("file") {
                    Value::Nil => subject,
                    found => found.to_path(),
                };
                let Some(path) = candidate else {
                    return Ok(false);
                };
                Ok(self.stats.file_type_matches(&path, *filetype))
            }
            Condition::Grep {
                datasource,
                pattern,
                site,
                range,
            } => {
                let Some(pattern) = self.eval_expr(pattern)?.to_str() else {
                    return Ok(false);
                };
                let Some(path) = self.leaf_path(datasource)? else {
                    return Ok(false);
                };
                self.greps
                    .check(*site, &path, &pattern, *range, &self.program.sites)
            }
        }
    }

    pub fn eval_expr(&self, expr: &Expr) -> PlumbResult<Value> {
        Ok(match expr {
            Expr::Literal(value) => Value::Str(value.clone()),
            Expr::VarRef(name) => self.env.get(name),
            Expr::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    if let Some(s) = self.eval_expr(part)?.to_str() {
                        out.push_str(&s);
                    }
                }
                Value::Str(out)
            }
            Expr::EnvLookup(name) => match self.eval_expr(name)?.to_str() {
                Some(name) => {
                    std::env::var(&name).ok().map_or(Value::Nil, Value::Str)
                }
                None => Value::Nil,
            },
        })
    }

    /// Subject of a leaf condition as a string: the datasource value if one
    /// is attached, the routable's data otherwise.
    fn leaf_str(
        &self,
        datasource: &Option<Expr>,
    ) -> PlumbResult<Option<String>> {
        match datasource {
            Some(expr) => Ok(self.eval_expr(expr)?.to_str()),
            None => Ok(self.env.routable().data.to_str()),
        }
    }

    fn leaf_path(
        &self,
        datasource: &Option<Expr>,
    ) -> PlumbResult<Option<PathBuf>> {
        match datasource {
            Some(expr) => Ok(self.eval_expr(expr)?.to_path()),
            None => Ok(self.env.routable().data.to_path()),
        }
    }

    fn inspect(&mut self, arg: &Option<InspectArg>) -> PlumbResult<()> {
        let report = match arg {
            None => return Ok(()),
            Some(InspectArg::All) => format!("{:#?}", self.env.vars()),
            Some(InspectArg::Expr(expr)) => {
                let value = self.eval_expr(expr)?;
                format!("{expr:#?}\n==>\n{value:#?}")
            }
        };
        let mut w = self.diag.writer()?;
        writeln!(w, "{report}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routable::Routable;
    use crate::schedule::DryRun;
    use crate::session::Session;
    use plumb_frontend::Program;

    fn program(text: &str) -> Program {
        Program::parse(text).unwrap()
    }

    fn flush(session: Session) -> String {
        let mut out = Vec::new();
        session.finish(&mut DryRun(&mut out)).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn empty_program_has_no_effects() {
        let p = program("");
        let mut s = Session::new(&p);
        s.route(Routable::text("x"));
        assert_eq!(flush(s), "");
    }

    #[test]
    fn stop_ends_the_routable() {
        let p = program("rule t\nstop\ncopyto \"/tmp/\"");
        let mut s = Session::new(&p);
        s.route(Routable::text("x"));
        assert_eq!(flush(s), "");
    }

    #[test]
    fn failed_condition_skips_to_next_rule() {
        let p = program(
            "rule a\nglob *.py\ncopyto \"/py/\"\nrule b\nx = reached",
        );
        let mut s = Session::new(&p);
        s.route(Routable::text("doc.txt"));
        assert_eq!(s.env.get("x"), Value::Str("reached".into()));
        assert_eq!(flush(s), "");
    }

    #[test]
    fn stop_in_skipped_region_is_ignored() {
        let p = program("rule a\nglob nope\nstop\nrule b\nx = alive");
        let mut s = Session::new(&p);
        s.route(Routable::text("data"));
        assert_eq!(s.env.get("x"), Value::Str("alive".into()));
    }

    #[test]
    fn setvar_interpolates_variables() {
        let p = program("foo = QUX\nx = \"b{$foo}a\"");
        let mut s = Session::new(&p);
        s.route(Routable::text("ignored"));
        assert_eq!(s.env.get("x"), Value::Str("bQUXa".into()));
    }

    #[test]
    fn regex_captures_become_variables() {
        let p = program("match \"(?P<stem>[a-z]+)\\\\.py\"\nx = $stem");
        let mut s = Session::new(&p);
        s.route(Routable::text("main.py"));
        assert_eq!(s.env.get("0"), Value::Str("main.py".into()));
        assert_eq!(s.env.get("1"), Value::Str("main".into()));
        assert_eq!(s.env.get("stem"), Value::Str("main".into()));
        assert_eq!(s.env.get("x"), Value::Str("main".into()));
    }

    #[test]
    fn double_negation_matches_identity() {
        let p = program("glob *.py");
        let Command::Condition(cond) = &p.commands[0] else {
            panic!("expected a condition");
        };
        let doubled =
            Condition::Not(Box::new(Condition::Not(Box::new(cond.clone()))));
        for data in ["a.py", "b.txt"] {
            let mut s = Session::new(&p);
            s.route(Routable::text(data));
            assert_eq!(
                s.check_condition(cond).unwrap(),
                s.check_condition(&doubled).unwrap(),
            );
        }
    }

    #[test]
    fn nil_subjects_answer_false() {
        let p = program("glob *\nx = globbed");
        let mut s = Session::new(&p);
        s.route(Routable::new(Value::Nil, "text", None));
        assert_eq!(s.env.get("x"), Value::Nil);
    }

    #[test]
    fn copy_uses_current_data() {
        let p = program("copyto \"/tmp/\"");
        let mut s = Session::new(&p);
        s.route(Routable::text("a.py"));
        assert_eq!(flush(s), "rsync -vaP a.py /tmp/\n");
    }

    #[test]
    fn runtime_error_abandons_only_the_current_routable() {
        let p = program(
            "rule bad\nglob trigger\nmatch \"(\"\nrule ok\nx = done",
        );
        let mut s = Session::new(&p);
        // invalid regex: this routable is abandoned mid-program
        s.route(Routable::text("trigger"));
        assert_eq!(s.env.get("x"), Value::Nil);
        // the session keeps going with the next routable
        s.route(Routable::text("other"));
        assert_eq!(s.env.get("x"), Value::Str("done".into()));
    }

    #[test]
    fn short_circuit_preserves_capture_side_effects() {
        // the or stops at the first true arm, so only its captures land
        let p = program("match \"(?P<a>x.*)\" or match \"(?P<b>.*)\"");
        let mut s = Session::new(&p);
        s.route(Routable::text("xyz"));
        assert_eq!(s.env.get("a"), Value::Str("xyz".into()));
        assert_eq!(s.env.get("b"), Value::Nil);
    }
}
