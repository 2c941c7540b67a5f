//! The driver: binds a program to the engines and routes items through it.
use crate::environment::Environment;
use crate::matcher::{GrepEngine, StatCache};
use crate::routable::Routable;
use crate::schedule::{CommandSink, Scheduler};
use plumb_frontend::Program;
use plumb_utils::{OutputFile, PlumbResult};
use std::path::Path;

/// One routing session: a compiled program, the variable environment, the
/// match engine state, and the operation queue. Routables go in one at a
/// time; [`Session::finish`] flushes everything that was scheduled.
pub struct Session<'p> {
    pub(crate) program: &'p Program,
    pub env: Environment,
    pub(crate) greps: GrepEngine,
    pub(crate) stats: StatCache,
    pub scheduler: Scheduler,
    pub(crate) diag: OutputFile,
}

impl<'p> Session<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self::with_diagnostics(program, OutputFile::Stderr)
    }

    /// A session whose `inspect` output goes to `diag`.
    pub fn with_diagnostics(program: &'p Program, diag: OutputFile) -> Self {
        Self {
            program,
            env: Environment::new(),
            greps: GrepEngine::new(),
            stats: StatCache::new(),
            scheduler: Scheduler::new(),
            diag,
        }
    }

    /// Route one item through the program. A runtime error abandons this
    /// routable and leaves the session usable for the next one.
    pub fn route(&mut self, routable: Routable) {
        log::debug!("routing {:?}", routable.data);
        self.env.set_routable(routable);
        if let Err(e) = self.run_program() {
            log::error!("routable abandoned: {e:?}");
        }
    }

    /// Finish the session: tear down the content scanner, then emit the
    /// scheduled operations in dependency order.
    pub fn finish(mut self, sink: &mut dyn CommandSink) -> PlumbResult<()> {
        self.greps.finish();
        self.scheduler.flush(sink)
    }

    /// How many times the content scanner opened `path` this session.
    pub fn grep_open_count(&self, path: &Path) -> usize {
        self.greps.open_count(path)
    }
}
