//! `locate` — line-oriented file-name search over one or more root directories.
//!
//! Each root is enumerated once at startup and kept in sync afterward by a
//! filesystem watcher. Query lines are read from stdin; matches are written
//! to stdout as `name\tabsolute-path`, one per line, followed by a blank
//! line once a query completes.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;

use clap::Parser;

use locate_lib::{AddRootError, Orchestrator, QueryMode};
use locate_scanner::ScanConfig;
use locate_watcher::WatchConfig;

/// Interactive file-name locator.
#[derive(Parser, Debug)]
#[command(name = "locate", about = "Index one or more directories and answer substring/regex name queries from stdin")]
struct Args {
    /// Root directories to index and watch.
    #[arg(required = true)]
    roots: Vec<PathBuf>,

    /// Interpret every query line as a regular expression instead of a
    /// plain substring.
    #[arg(long)]
    regex: bool,
}

fn main() -> ExitCode {
    pretty_env_logger::init();
    let args = Args::parse();

    let orchestrator = Orchestrator::new(ScanConfig::default(), WatchConfig::default());
    for root in &args.roots {
        if let Err(e) = orchestrator.add_root(root) {
            eprintln!("locate: {}: {e}", root.display());
            return usage_error_code(&e);
        }
    }

    if let Err(e) = orchestrator.start() {
        eprintln!("locate: failed to start watcher: {e}");
        return ExitCode::from(1);
    }

    let mode = if args.regex { QueryMode::Regex } else { QueryMode::Substring };
    run_query_loop(&orchestrator, mode);

    orchestrator.stop();
    ExitCode::from(0)
}

fn usage_error_code(e: &AddRootError) -> ExitCode {
    match e {
        AddRootError::Scanner(_) => ExitCode::from(2),
        AddRootError::Watcher(_) => ExitCode::from(1),
    }
}

fn run_query_loop(orchestrator: &Orchestrator, mode: QueryMode) {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    for line in stdin.lock().lines() {
        let Ok(pattern) = line else { break };

        let (tx, rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        orchestrator.query(
            &pattern,
            mode,
            false,
            move |_seq, entry| {
                let _ = tx.send(format!("{}\t{}", entry.name, entry.full_path().display()));
            },
            move || {
                let _ = done_tx.send(());
            },
        );

        let mut out = stdout.lock();
        for line in rx.iter() {
            let _ = writeln!(out, "{line}");
        }
        done_rx.recv().ok();
    }
}
