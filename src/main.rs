//! Binary entry point: parses the CLI, wires the journal/trash/executor
//! together, and dispatches to a subcommand handler. Errors surface as
//! `anyhow::Result` at this boundary; everything underneath uses the
//! crate's own typed `Result`.

mod cli;

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use file_organizer_core::{
    CancelToken, CliProgress, Config, Executor, HashAlgorithm, Journal, OperationStatus,
    ProgressTracker, QueryFilter, SilentProgress, TrashStore, UndoManager,
};

use cli::{Cli, Command};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e:?}");
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let mut config = Config::default_paths().context("resolving default paths")?;
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }
    if let Some(trash_root) = cli.trash_root {
        config.trash_root = trash_root;
    }

    let journal = Journal::open(&config.db_path).context("opening journal")?;
    let trash = TrashStore::new(&config.trash_root);

    match cli.command {
        Command::Dedupe {
            root,
            algorithm,
            dry_run,
            strategy,
            no_recursive,
            min_size,
            max_size,
            include,
            exclude,
        } => run_dedupe(&journal, &trash, root, algorithm, dry_run, strategy.into(), !no_recursive, min_size, max_size, include, exclude, cli.verbose),
        Command::Undo { operation_id, transaction_id, dry_run } => {
            run_undo(&journal, &trash, operation_id, transaction_id, dry_run)
        }
        Command::Redo { operation_id, dry_run } => run_redo(&journal, &trash, operation_id, dry_run),
        Command::History { kind, status, since, until, search, limit, stats } => {
            run_history(&journal, kind, status, since, until, search, limit, stats)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_dedupe(
    journal: &Journal,
    trash: &TrashStore,
    root: std::path::PathBuf,
    algorithm: HashAlgorithm,
    dry_run: bool,
    strategy: file_organizer_core::KeepPolicy,
    recursive: bool,
    min_size: Option<u64>,
    max_size: Option<u64>,
    include: Vec<String>,
    exclude: Vec<String>,
    verbose: bool,
) -> Result<i32> {
    use file_organizer_core::{dedup, ScanOptions};

    let options = ScanOptions {
        recursive,
        min_size,
        max_size,
        include,
        exclude,
        algorithm,
    };
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel()).context("installing SIGINT handler")?;
    }

    let progress: Box<dyn ProgressTracker> = if verbose {
        Box::new(CliProgress::new("scanning", 0))
    } else {
        Box::new(SilentProgress::new())
    };

    let groups = match dedup::scan(&root, &options, &cancel, progress.as_ref()) {
        Ok(groups) => groups,
        Err(file_organizer_core::Error::Cancelled(_)) => return Ok(130),
        Err(e) => return Err(e.into()),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for group in &groups {
        writeln!(out, "{} duplicate(s) of digest {} ({} bytes):", group.paths.len(), group.digest, group.size)?;
        for path in &group.paths {
            writeln!(out, "  {}", path.display())?;
        }
    }

    if dry_run || matches!(strategy, file_organizer_core::KeepPolicy::Manual) {
        return Ok(0);
    }

    let executor = Executor::new(journal, trash, algorithm);
    let mut removed = 0;
    for group in &groups {
        cancel.check("dedupe removal")?;
        let keep = group.keep(strategy)?.to_path_buf();
        let ops = dedup::remove_group(&executor, group, &keep)?;
        removed += ops.len();
    }
    writeln!(out, "removed {removed} duplicate file(s)")?;
    Ok(0)
}

fn run_undo(
    journal: &Journal,
    trash: &TrashStore,
    operation_id: Option<i64>,
    transaction_id: Option<String>,
    dry_run: bool,
) -> Result<i32> {
    let manager = UndoManager::new(journal, trash, HashAlgorithm::default());

    if let Some(txn_id) = transaction_id {
        if dry_run {
            println!("dry run: would reverse transaction {txn_id}");
            return Ok(0);
        }
        let outcomes = manager.undo_transaction(&txn_id)?;
        let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
        println!("reversed {} operation(s), {} failed", outcomes.len(), failed);
        return Ok(if failed > 0 { 1 } else { 0 });
    }

    let result = if dry_run {
        if let Some(id) = operation_id {
            println!("can_undo({id}) dry-run unsupported without mutating state; use --transaction-id for group preview");
            return Ok(0);
        }
        let can = manager.can_undo()?;
        println!("can undo last operation: {can}");
        return Ok(0);
    } else if let Some(id) = operation_id {
        manager.undo_operation(id)?
    } else {
        match manager.undo_last()? {
            Some(v) => v,
            None => {
                println!("nothing to undo");
                return Ok(0);
            }
        }
    };

    if result.can_proceed {
        println!("undone");
        Ok(0)
    } else {
        for conflict in &result.conflicts {
            println!("conflict: {:?} at {}: {}", conflict.conflict_type, conflict.path.display(), conflict.description);
        }
        Ok(1)
    }
}

fn run_redo(journal: &Journal, trash: &TrashStore, operation_id: Option<i64>, dry_run: bool) -> Result<i32> {
    let manager = UndoManager::new(journal, trash, HashAlgorithm::default());

    if dry_run {
        let can = manager.can_redo()?;
        println!("can redo last operation: {can}");
        return Ok(0);
    }

    let result = if let Some(id) = operation_id {
        manager.redo_operation(id)?
    } else {
        match manager.redo_last()? {
            Some(v) => v,
            None => {
                println!("nothing to redo");
                return Ok(0);
            }
        }
    };

    if result.can_proceed {
        println!("redone");
        Ok(0)
    } else {
        for conflict in &result.conflicts {
            println!("conflict: {:?} at {}: {}", conflict.conflict_type, conflict.path.display(), conflict.description);
        }
        Ok(1)
    }
}

#[allow(clippy::too_many_arguments)]
fn run_history(
    journal: &Journal,
    kind: Option<cli::OperationKindArg>,
    status: Option<String>,
    since: Option<String>,
    until: Option<String>,
    search: Option<String>,
    limit: Option<u32>,
    stats: bool,
) -> Result<i32> {
    if stats {
        let s = journal.statistics()?;
        println!("total: {}", s.total_operations);
        println!("pending: {}", s.pending);
        println!("completed: {}", s.completed);
        println!("failed: {}", s.failed);
        println!("rolled_back: {}", s.rolled_back);
        println!("db_size_bytes: {}", s.db_size_bytes);
        return Ok(0);
    }

    let filter = QueryFilter {
        kind: kind.map(Into::into),
        status: status.map(|s| s.parse()).transpose().context("parsing --status")?,
        transaction_id: None,
        since: since.map(|s| s.parse()).transpose().context("parsing --since")?,
        until: until.map(|s| s.parse()).transpose().context("parsing --until")?,
        path_substring: search,
        limit,
        ascending: false,
    };

    for op in journal.query(&filter)? {
        println!(
            "{:>6}  {:<8} {:<12} {}",
            op.id,
            op.kind.as_str(),
            status_label(op.status),
            op.source.display()
        );
    }
    Ok(0)
}

fn status_label(status: OperationStatus) -> &'static str {
    status.as_str()
}
