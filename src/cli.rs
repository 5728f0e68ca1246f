//! Command-line surface (§6): `dedupe`, `undo`, `redo`, `history`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use file_organizer_core::{HashAlgorithm, KeepPolicy, OperationKind};

#[derive(Parser, Debug)]
#[command(name = "file-organizer", version, about = "Durable journal, transactional executor, and duplicate detector for directory trees")]
pub struct Cli {
    /// Path to the journal database. Defaults to ~/.file_organizer/history.db.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Path to the trash root. Defaults to ~/.file_organizer/trash.
    #[arg(long, global = true)]
    pub trash_root: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan a directory tree for duplicate content and optionally remove it.
    Dedupe {
        root: PathBuf,

        #[arg(long, value_enum, default_value = "sha256")]
        algorithm: HashAlgorithm,

        #[arg(long)]
        dry_run: bool,

        #[arg(long, value_enum, default_value = "manual")]
        strategy: KeepPolicyArg,

        #[arg(long)]
        no_recursive: bool,

        #[arg(long)]
        min_size: Option<u64>,

        #[arg(long)]
        max_size: Option<u64>,

        #[arg(long)]
        include: Vec<String>,

        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Undo the last operation, or a specific operation/transaction.
    Undo {
        #[arg(long, conflicts_with = "transaction_id")]
        operation_id: Option<i64>,

        #[arg(long, conflicts_with = "operation_id")]
        transaction_id: Option<String>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Redo the last undone operation, or a specific operation.
    Redo {
        #[arg(long)]
        operation_id: Option<i64>,

        #[arg(long)]
        dry_run: bool,
    },

    /// List recorded operations, or summarize them.
    History {
        #[arg(long, value_enum)]
        kind: Option<OperationKindArg>,

        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        since: Option<String>,

        #[arg(long)]
        until: Option<String>,

        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        stats: bool,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum KeepPolicyArg {
    Manual,
    Oldest,
    Newest,
    Largest,
    Smallest,
}

impl From<KeepPolicyArg> for KeepPolicy {
    fn from(arg: KeepPolicyArg) -> Self {
        match arg {
            KeepPolicyArg::Manual => KeepPolicy::Manual,
            KeepPolicyArg::Oldest => KeepPolicy::Oldest,
            KeepPolicyArg::Newest => KeepPolicy::Newest,
            KeepPolicyArg::Largest => KeepPolicy::Largest,
            KeepPolicyArg::Smallest => KeepPolicy::Smallest,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OperationKindArg {
    Move,
    Rename,
    Delete,
    Copy,
    Create,
}

impl From<OperationKindArg> for OperationKind {
    fn from(arg: OperationKindArg) -> Self {
        match arg {
            OperationKindArg::Move => OperationKind::Move,
            OperationKindArg::Rename => OperationKind::Rename,
            OperationKindArg::Delete => OperationKind::Delete,
            OperationKindArg::Copy => OperationKind::Copy,
            OperationKindArg::Create => OperationKind::Create,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_parses_required_root_and_defaults() {
        let cli = Cli::parse_from(["file-organizer", "dedupe", "/tmp/stuff"]);
        match cli.command {
            Command::Dedupe { root, dry_run, no_recursive, .. } => {
                assert_eq!(root, PathBuf::from("/tmp/stuff"));
                assert!(!dry_run);
                assert!(!no_recursive);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn undo_rejects_both_operation_and_transaction_id() {
        let result = Cli::try_parse_from([
            "file-organizer",
            "undo",
            "--operation-id",
            "1",
            "--transaction-id",
            "abc",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn history_parses_stats_flag() {
        let cli = Cli::parse_from(["file-organizer", "history", "--stats"]);
        match cli.command {
            Command::History { stats, .. } => assert!(stats),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
