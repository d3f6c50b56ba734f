//! mover CLI — a client for experimenting with move tracking.
//!
//! Commit a batch of actions to a repository as a single new revision.
//! With no actions specified, read actions interactively from standard
//! input until EOF, then commit the result.
//!
//! Action arguments are of the form `[^B<branch-id>/]<path>[@<revnum>]`,
//! where the branch id defaults to the working branch (or, when a
//! revision is given, to the base branch).

use std::fs;
use std::io::IsTerminal;
use std::process;

use clap::Parser;

use mover_core::actions::{self, ParsedAction};
use mover_core::branch::normalize_bid;
use mover_core::element::Props;
use mover_core::error::{MoverError, MoverResult};
use mover_core::remote::LocalRemote;
use mover_core::ui::{ConsoleIo, Notify, UiMode, UserIo};
use mover_core::WorkingCopy;

#[derive(Parser)]
#[command(
    name = "mover",
    about = "mover — a client for experimenting with move tracking",
    version
)]
struct Cli {
    /// Repository URL: file://PATH stores branching info in per-revision
    /// files, a bare path stores it in revision properties.
    #[arg(short = 'U', long = "root-url")]
    root_url: String,

    /// Create the repository before opening it.
    #[arg(long)]
    init: bool,

    /// Base revision for changes (default: HEAD).
    #[arg(short = 'r', long = "revision")]
    revision: Option<i64>,

    /// Work on the branch identified by this id.
    #[arg(short = 'B', long = "branch-id", default_value = "B0")]
    branch_id: String,

    /// Use this log message for commits.
    #[arg(short = 'm', long = "message")]
    message: Option<String>,

    /// Read the log message from this file.
    #[arg(short = 'F', long = "file")]
    message_file: Option<String>,

    /// Commit the changes as this username.
    #[arg(short = 'u', long = "username")]
    username: Option<String>,

    /// Suppress notifications.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Display information as elements or as paths: eids|e|paths|p.
    #[arg(long = "ui", default_value = "eids")]
    ui: String,

    /// Do no interactive prompting (default is to prompt only if
    /// standard input is a terminal).
    #[arg(long = "non-interactive")]
    non_interactive: bool,

    /// Set a revision property, NAME[=VALUE]. Repeatable.
    #[arg(long = "with-revprop")]
    with_revprop: Vec<String>,

    /// Actions to perform (see `help` in interactive mode).
    #[arg(trailing_var_arg = true)]
    actions: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("mover: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> MoverResult<()> {
    let ui_mode = UiMode::from_option(&cli.ui)?;
    let message = resolve_message(&cli)?;
    let revprops = parse_revprops(&cli.with_revprop)?;

    if cli.init {
        LocalRemote::init(&cli.root_url)?;
    }
    let remote = LocalRemote::open(&cli.root_url)?;

    let author = cli
        .username
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "anonymous".to_string());
    let base_bid = normalize_bid(&cli.branch_id)?;

    let mut wc = WorkingCopy::create(
        Box::new(remote),
        cli.revision,
        &base_bid,
        author,
        Notify::new(cli.quiet),
        ui_mode,
    )?;

    let interactive = !cli.non_interactive && std::io::stdin().is_terminal();
    let mut io = ConsoleIo::new(interactive);

    if cli.actions.is_empty() {
        interactive_loop(&mut wc, &mut io, message.as_deref(), &revprops)?;
    } else {
        let parsed = actions::parse_actions(&cli.actions)?;
        actions::execute(&mut wc, &mut io, &parsed, message.as_deref(), &revprops)?;
    }

    // Commit whatever the batch left uncommitted.
    wc.commit(message, revprops)?;
    Ok(())
}

/// Read actions from standard input until EOF, executing each line as it
/// arrives. Action failures are printed and the next line is read.
fn interactive_loop(
    wc: &mut WorkingCopy,
    io: &mut ConsoleIo,
    message: Option<&str>,
    revprops: &Props,
) -> MoverResult<()> {
    loop {
        let line = match io.prompt("mover> ")? {
            Some(line) => line,
            None => return Ok(()),
        };
        let words: Vec<String> = line.split_whitespace().map(String::from).collect();
        if words.is_empty() {
            continue;
        }
        if words[0] == "help" || words[0] == "?" {
            for usage_line in actions::usage_lines() {
                println!("{usage_line}");
            }
            continue;
        }
        let result = actions::parse_actions(&words).and_then(|parsed: Vec<ParsedAction>| {
            actions::execute(wc, io, &parsed, message, revprops)
        });
        if let Err(e) = result {
            eprintln!("mover: {e}");
        }
    }
}

fn resolve_message(cli: &Cli) -> MoverResult<Option<String>> {
    match (&cli.message, &cli.message_file) {
        (Some(_), Some(_)) => Err(MoverError::ArgParse(
            "--message and --file are mutually exclusive".to_string(),
        )),
        (Some(m), None) => Ok(Some(m.clone())),
        (None, Some(path)) => Ok(Some(fs::read_to_string(path)?)),
        (None, None) => Ok(None),
    }
}

fn parse_revprops(specs: &[String]) -> MoverResult<Props> {
    let mut props = Props::new();
    for spec in specs {
        match spec.split_once('=') {
            Some((name, value)) => {
                props.insert(name.to_string(), value.as_bytes().to_vec());
            }
            None => {
                props.insert(spec.clone(), Vec::new());
            }
        }
    }
    Ok(props)
}
