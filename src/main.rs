//! plumb: a rule-driven file and message router.
use argh::FromArgs;

use plumb_frontend::{parser::PlumbParser, Program};
use plumb_runtime::{CommandSink, DryRun, LiveRun, Routable, Session, Value};
use plumb_utils::{Error, OutputFile, PlumbResult};

use std::path::{Path, PathBuf};

#[derive(FromArgs)]
/// Route files and text through the rules in your plumb_rules file.
pub struct Opts {
    /// paths or text snippets to route
    #[argh(positional)]
    pub inputs: Vec<String>,

    /// rule file to load instead of the default location
    #[argh(option, long = "rules")]
    pub rules: Option<PathBuf>,

    /// working directory for resolving routed paths
    #[argh(option, long = "wdir")]
    pub wdir: Option<PathBuf>,

    /// run the scheduled commands instead of printing them
    #[argh(switch, long = "execute")]
    pub execute: bool,

    /// output stream for the command list, default is stdout
    #[argh(option, short = 'o', default = "OutputFile::Stdout")]
    pub output: OutputFile,

    #[argh(subcommand)]
    mode: Option<Command>,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Check(CommandCheck),
    Watch(CommandWatch),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "check")]
/// Parse the rule file and report errors
struct CommandCheck {
    /// dump the parsed program
    #[argh(switch)]
    verbose: bool,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "watch")]
/// Route files created or moved under a directory as they appear
struct CommandWatch {
    /// directory to watch
    #[argh(positional)]
    target: PathBuf,
}

fn main() -> PlumbResult<()> {
    env_logger::init();
    let opts: Opts = argh::from_env();
    match opts.mode {
        Some(Command::Check(ref check)) => run_check(&opts, check),
        Some(Command::Watch(ref watch)) => run_watch(&opts, watch),
        None => run_files(&opts),
    }
}

/// The rule file location: `--rules`, or `plumb_rules` in the user's
/// configuration directory.
fn rules_path(overridden: &Option<PathBuf>) -> PlumbResult<PathBuf> {
    if let Some(path) = overridden {
        return Ok(path.clone());
    }
    let config = dirs::config_dir().ok_or_else(|| {
        Error::invalid_file("no configuration directory on this platform")
    })?;
    Ok(config.join("plumb_rules"))
}

fn load_rules(opts: &Opts) -> PlumbResult<Program> {
    PlumbParser::parse_file(&rules_path(&opts.rules)?)
}

fn make_sink(opts: &Opts) -> PlumbResult<Box<dyn CommandSink>> {
    if opts.execute {
        Ok(Box::new(LiveRun))
    } else {
        let mut output = opts.output.clone();
        Ok(Box::new(DryRun(output.writer()?)))
    }
}

/// Build a routable for one argument, probing the filesystem for its type:
/// a name naming a regular file routes as `file`, a directory as `dir`,
/// anything else as plain text.
fn make_routable(arg: &str, wdir: &Path) -> Routable {
    let candidate = wdir.join(arg);
    let kind = if candidate.is_file() {
        "file"
    } else if candidate.is_dir() {
        "dir"
    } else {
        "text"
    };
    log::debug!("{arg} routes as {kind}");
    Routable::new(
        Value::Str(arg.to_string()),
        kind,
        Some(wdir.to_path_buf()),
    )
}

/// Default mode: route each argument, then flush the schedule.
fn run_files(opts: &Opts) -> PlumbResult<()> {
    let program = load_rules(opts)?;
    let wdir = match &opts.wdir {
        Some(wdir) => wdir.clone(),
        None => std::env::current_dir()?,
    };
    let mut session = Session::new(&program);
    for input in &opts.inputs {
        session.route(make_routable(input, &wdir));
    }
    let mut sink = make_sink(opts)?;
    session.finish(sink.as_mut())
}

fn run_check(opts: &Opts, check: &CommandCheck) -> PlumbResult<()> {
    let program = load_rules(opts)?;
    if check.verbose {
        let mut output = opts.output.clone();
        plumb_frontend::Printer::write_program(
            &program,
            &mut output.writer()?,
        )?;
    }
    Ok(())
}

/// Watch mode: route paths as they are created or moved into the target,
/// and re-parse the rule file whenever it changes. A rule file that stops
/// parsing keeps the previous program.
fn run_watch(opts: &Opts, watch: &CommandWatch) -> PlumbResult<()> {
    use notify::event::{ModifyKind, RenameMode};
    use notify::{EventKind, RecursiveMode, Watcher};

    let rules_file = rules_path(&opts.rules)?;
    let mut program = PlumbParser::parse_file(&rules_file)?;

    let (tx, rx) = std::sync::mpsc::channel::<notify::Result<notify::Event>>();
    let mut watcher = notify::recommended_watcher(tx)
        .map_err(|e| Error::misc(format!("cannot create watcher: {e}")))?;
    watcher
        .watch(&watch.target, RecursiveMode::Recursive)
        .map_err(|e| {
            Error::invalid_file(format!(
                "cannot watch {}: {e}",
                watch.target.display()
            ))
        })?;
    watcher
        .watch(&rules_file, RecursiveMode::NonRecursive)
        .map_err(|e| {
            Error::invalid_file(format!(
                "cannot watch {}: {e}",
                rules_file.display()
            ))
        })?;
    log::info!("watching {}", watch.target.display());

    for event in rx {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                log::warn!("watch error: {e}");
                continue;
            }
        };
        if event.paths.iter().any(|p| p == &rules_file) {
            match PlumbParser::parse_file(&rules_file) {
                Ok(next) => {
                    log::info!("rule file reloaded");
                    program = next;
                }
                Err(e) => log::error!("rule file not reloaded: {e:?}"),
            }
            continue;
        }
        let arrived: Vec<&PathBuf> = match event.kind {
            EventKind::Create(_) => event.paths.iter().collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                event.paths.iter().collect()
            }
            // a full rename carries [from, to]
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                event.paths.iter().skip(1).collect()
            }
            _ => continue,
        };
        for path in arrived {
            let mut session = Session::new(&program);
            session
                .route(make_routable(&path.to_string_lossy(), &watch.target));
            let flushed = make_sink(opts)
                .and_then(|mut sink| session.finish(sink.as_mut()));
            if let Err(e) = flushed {
                log::error!("flush failed: {e:?}");
            }
        }
    }
    Ok(())
}
