//! Routing runtime: routables, the variable environment, the interpreter,
//! the match engine, and the operation scheduler.

pub mod environment;
pub mod interp;
pub mod matcher;
pub mod routable;
pub mod schedule;
pub mod session;

pub use environment::Environment;
pub use interp::ControlMode;
pub use routable::{Routable, Value};
pub use schedule::{CommandSink, DryRun, LiveRun, Scheduler};
pub use session::Session;
