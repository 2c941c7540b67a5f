//! Dependency-aware scheduling of file-transfer operations.
//!
//! Copy and move actions accumulate as pending operations. Each operation
//! names the paths it requires and the paths it produces; a consumer
//! enqueued after its producer gains an edge and is only emitted once the
//! producer ran. At flush time, ready same-destination transfers fuse into
//! a single shell command.
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use plumb_utils::{Error, PlumbResult};
use std::collections::HashMap;
use std::io;
use std::path::Path;

/// Where flushed commands go.
pub trait CommandSink {
    fn dispatch(&mut self, argv: &[String]) -> PlumbResult<()>;
}

/// Default sink: print each command shell-quoted, one per line.
pub struct DryRun<W: io::Write>(pub W);

impl<W: io::Write> CommandSink for DryRun<W> {
    fn dispatch(&mut self, argv: &[String]) -> PlumbResult<()> {
        let line = shlex::try_join(argv.iter().map(String::as_str))
            .map_err(|e| {
                Error::write_error(format!("cannot quote command: {e}"))
            })?;
        writeln!(self.0, "{line}")?;
        Ok(())
    }
}

/// Live sink: run each command and require success.
pub struct LiveRun;

impl CommandSink for LiveRun {
    fn dispatch(&mut self, argv: &[String]) -> PlumbResult<()> {
        let (cmd, rest) = argv
            .split_first()
            .ok_or_else(|| Error::scheduler("empty command"))?;
        log::info!("exec {argv:?}");
        let status = std::process::Command::new(cmd)
            .args(rest)
            .status()
            .map_err(|e| {
                Error::runtime(format!("failed to spawn {cmd}: {e}"))
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::runtime(format!("{cmd} exited with {status}")))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Copy,
    Move,
    Shell,
}

/// A unit of scheduled side effect.
#[derive(Debug, Clone)]
pub struct Op {
    pub kind: OpKind,
    /// Sources for a transfer; the full argv for an emitted shell command.
    pub args: Vec<String>,
    /// Destination as written in the rule.
    pub dst: String,
    /// Paths that must exist before this op runs.
    pub requires: Vec<String>,
    /// Paths this op produces.
    pub provides: Vec<String>,
    pub executed: bool,
}

/// The pending-operation store. Nodes are operations, edges run from
/// producer to consumer.
#[derive(Default)]
pub struct Scheduler {
    graph: DiGraph<Op, ()>,
    /// Index from produced name to the ops producing it, so linking a new
    /// op costs one lookup per required name.
    provided_by: HashMap<String, Vec<NodeIndex>>,
    /// Shell commands emitted so far, in emission order.
    emitted: Vec<Op>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_copy(&mut self, src: String, dst: String) {
        self.enqueue(OpKind::Copy, src, dst);
    }

    pub fn push_move(&mut self, src: String, dst: String) {
        self.enqueue(OpKind::Move, src, dst);
    }

    pub fn pending(&self) -> usize {
        self.graph
            .node_indices()
            .filter(|&n| !self.graph[n].executed)
            .count()
    }

    pub fn emitted(&self) -> &[Op] {
        &self.emitted
    }

    fn enqueue(&mut self, kind: OpKind, src: String, dst: String) {
        let provides = vec![provided_name(&src, &dst)];
        let requires = vec![src.clone()];
        log::debug!("queue {kind:?} {src} -> {dst}");
        let idx = self.graph.add_node(Op {
            kind,
            args: vec![src],
            dst,
            requires: requires.clone(),
            provides: provides.clone(),
            executed: false,
        });
        // Link the new op after every already-enqueued producer of a path
        // it requires.
        for name in &requires {
            if let Some(producers) = self.provided_by.get(name) {
                for &producer in producers {
                    self.graph.add_edge(producer, idx, ());
                }
            }
        }
        for name in provides {
            self.provided_by.entry(name).or_default().push(idx);
        }
    }

    /// Emit every pending operation in dependency order, fusing ready
    /// same-destination transfers into one command. A cycle in the graph is
    /// a scheduler error.
    pub fn flush(&mut self, sink: &mut dyn CommandSink) -> PlumbResult<()> {
        loop {
            let ready: Vec<NodeIndex> = self
                .graph
                .node_indices()
                .filter(|&n| !self.graph[n].executed)
                .filter(|&n| {
                    self.graph
                        .neighbors_directed(n, Direction::Incoming)
                        .all(|p| self.graph[p].executed)
                })
                .collect();
            if ready.is_empty() {
                if self.pending() == 0 {
                    return Ok(());
                }
                return Err(self.cycle_error());
            }
            let mut groups: LinkedHashMap<(OpKind, String), Vec<String>> =
                LinkedHashMap::new();
            for &n in &ready {
                let op = &self.graph[n];
                groups
                    .entry((op.kind, op.dst.clone()))
                    .or_insert_with(Vec::new)
                    .extend(op.args.iter().cloned());
            }
            for ((kind, dst), srcs) in groups {
                let mut argv: Vec<String> = match kind {
                    OpKind::Copy => vec!["rsync".to_string(), "-vaP".to_string()],
                    OpKind::Move => vec!["mv".to_string()],
                    OpKind::Shell => Vec::new(),
                };
                argv.extend(srcs);
                argv.push(dst);
                sink.dispatch(&argv)?;
                self.emitted.push(Op {
                    kind: OpKind::Shell,
                    args: argv,
                    dst: String::new(),
                    requires: Vec::new(),
                    provides: Vec::new(),
                    executed: true,
                });
            }
            for n in ready {
                self.graph[n].executed = true;
            }
        }
    }

    fn cycle_error(&self) -> Error {
        // Report the strongly connected component holding things up.
        let sccs = algo::kosaraju_scc(&self.graph);
        match sccs.iter().find(|cc| cc.len() > 1) {
            Some(cc) => Error::scheduler(format!(
                "dependency cycle between operations:\n{}",
                cc.iter()
                    .map(|&n| {
                        let op = &self.graph[n];
                        format!("{:?} {} -> {}", op.kind, op.args.join(" "), op.dst)
                    })
                    .join("\n")
            )),
            None => Error::scheduler("pending operations can never become ready"),
        }
    }
}

/// The name an op makes available: a destination ending in the path
/// separator produces `dst/basename(src)`, anything else produces the
/// destination itself.
fn provided_name(src: &str, dst: &str) -> String {
    if dst.ends_with('/') || dst.ends_with(std::path::MAIN_SEPARATOR) {
        let base = Path::new(src)
            .file_name()
            .map(|b| b.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{dst}{base}")
    } else {
        dst.to_string()
    }
}
