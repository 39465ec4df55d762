//! # btec CLI Module
//!
//! This module implements the CLI interface for btec.
//!
//! ## Available Commands
//!
//! - `init` - Initialize a grading database with a blank Draft definition
//! - `check` - Dry-run a form submission and report its change severity
//! - `define` - Commit a form submission to the definition
//! - `validate` - Report readiness violations of a form submission
//! - `status` - Show the definition and instance overview
//! - `grade` - Score an item for a rater and compute the grade
//! - `show` - Display a rater's instance and grade
//! - `copy` - Export the definition as a re-keyed clone payload
//! - `prefs` - Read or set a marker's display preferences

mod commands;

use btec::config::AppConfig;
use btec_core::{BtecError, UserId};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// btec - BTEC grading scheme
///
/// Criterion-referenced marking: Pass/Merit/Distinction criteria scored
/// met or not met, reduced to one overall grade.
#[derive(Parser, Debug)]
#[command(name = "btec")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the grading database (default: btec.toml setting or btec.redb)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Acting user id for definition edits (default: btec.toml setting or 1)
    #[arg(short = 'u', long, global = true)]
    pub user: Option<u64>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new grading database with a blank Draft definition
    Init {
        /// Recreate the database even if it exists
        #[arg(short, long)]
        force: bool,
    },

    /// Dry-run a form submission and report its change severity
    Check {
        /// Path to the form payload (JSON)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Commit a form submission to the definition
    Define {
        /// Path to the form payload (JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Mark the definition Ready (runs the readiness rules)
        #[arg(short, long)]
        ready: bool,

        /// Confirm a regrade of already-graded instances
        #[arg(long)]
        force_regrade: bool,
    },

    /// Report readiness violations of a form submission
    Validate {
        /// Path to the form payload (JSON)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show the definition and instance overview
    Status,

    /// Score an item for a rater and compute the grade
    Grade {
        /// Rater user id
        #[arg(short, long)]
        rater: u64,

        /// Gradable item id
        #[arg(short, long)]
        item: u64,

        /// Path to the scores payload (JSON)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display a rater's instance and grade
    Show {
        /// Rater user id
        #[arg(short, long)]
        rater: u64,

        /// Gradable item id
        #[arg(short, long)]
        item: u64,
    },

    /// Export the definition as a re-keyed clone payload
    Copy {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Read or set a marker's display preferences
    Prefs {
        /// Show marker-only descriptions while grading
        #[arg(long)]
        marker_desc: Option<bool>,

        /// Show student-facing descriptions while grading
        #[arg(long)]
        student_desc: Option<bool>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), BtecError> {
    let config = AppConfig::discover()?;
    let database = cli
        .database
        .or(config.database)
        .unwrap_or_else(|| PathBuf::from("btec.redb"));
    let user = UserId(cli.user.or(config.author).unwrap_or(1));
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&database, json_mode, force, user),
        Some(Commands::Check { file }) => cmd_check(&database, json_mode, &file, user),
        Some(Commands::Define {
            file,
            ready,
            force_regrade,
        }) => cmd_define(&database, json_mode, &file, ready, force_regrade, user),
        Some(Commands::Validate { file }) => cmd_validate(json_mode, &file),
        Some(Commands::Status) => cmd_status(&database, json_mode),
        Some(Commands::Grade { rater, item, file }) => {
            cmd_grade(&database, json_mode, UserId(rater), item, &file)
        }
        Some(Commands::Show { rater, item }) => {
            cmd_show(&database, json_mode, UserId(rater), item)
        }
        Some(Commands::Copy { output }) => cmd_copy(&database, json_mode, &output),
        Some(Commands::Prefs {
            marker_desc,
            student_desc,
        }) => cmd_prefs(&database, json_mode, user, marker_desc, student_desc),
        None => {
            println!("No command provided. Run `btec --help` for usage.");
            Ok(())
        }
    }
}
