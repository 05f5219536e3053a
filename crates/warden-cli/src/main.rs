//! `warden` - repository-local workflow engine for multi-agent task
//! hand-offs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use warden_cli::commands::{context, evidence, exceptions, qa, quarantine, tasks, worktree};
use warden_cli::output::{OutputChannel, OutputFormat};
use warden_core::error::EXIT_INTERRUPTED;
use warden_core::types::TaskId;
use warden_core::{RepoLayout, WorkflowError};
use warden_store::context::models::AgentRole;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Task workflow engine for multi-agent development")]
#[command(version)]
struct Cli {
    /// Output format for every command.
    #[arg(long, short = 'f', global = true, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tasks (optional filter: a status, or "unblocker")
    List { filter: Option<String> },
    /// Pick the next task to work on (optional status filter)
    Pick { filter: Option<String> },
    /// Validate the dependency graph (cycles, missing references)
    Validate,
    /// Check for workflow halt conditions (blocked unblockers)
    CheckHalt,
    /// Export the dependency graph in Graphviz DOT format
    Graph,
    /// Explain the dependency chain and readiness of one task
    Explain { task_id: String },
    /// Force a rebuild of the task cache
    RefreshCache,
    /// Show task cache metadata
    CacheInfo,
    /// Claim a task (transition to in_progress)
    Claim { task_path: PathBuf },
    /// Complete a task and archive it
    Complete { task_path: PathBuf },
    /// Archive an already-completed task
    Archive { task_path: PathBuf },

    /// Initialize a task context with an immutable snapshot
    InitContext {
        task_id: String,
        /// Git commit to record as base (defaults to HEAD)
        #[arg(long)]
        base_commit: Option<String>,
        #[arg(long, default_value = "task-runner")]
        actor: String,
        /// Bypass the secret scan and source-change refusals
        #[arg(long)]
        force_secrets: bool,
    },
    /// Read a task context (immutable + coordination)
    GetContext { task_id: String },
    /// Delete a task's context directory (idempotent)
    PurgeContext { task_id: String },
    /// Rebuild a context from its provenance manifest
    RebuildContext {
        task_id: String,
        #[arg(long, default_value = "task-runner")]
        actor: String,
        #[arg(long)]
        force_secrets: bool,
    },
    /// Update one agent's coordination record
    UpdateAgent {
        task_id: String,
        /// Agent role: implementer, reviewer, or validator
        #[arg(long)]
        agent: String,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        qa_log: Option<String>,
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long, default_value = "task-runner")]
        actor: String,
        #[arg(long)]
        force_secrets: bool,
    },
    /// Snapshot the working tree for an agent hand-off
    SnapshotWorktree {
        task_id: String,
        #[arg(long)]
        agent: String,
        #[arg(long)]
        base_commit: Option<String>,
        /// Previous agent role, for the reviewer's incremental diff
        #[arg(long)]
        previous_agent: Option<String>,
        #[arg(long, default_value = "task-runner")]
        actor: String,
    },
    /// Verify the working tree against a recorded snapshot
    VerifyWorktree {
        task_id: String,
        #[arg(long)]
        expected_agent: String,
    },

    /// Attach an evidence artifact to a task
    AttachEvidence {
        task_id: String,
        #[arg(long = "type")]
        artifact_type: String,
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        description: Option<String>,
        /// Extra metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Extract and attach a standards excerpt
    AttachStandard {
        task_id: String,
        #[arg(long)]
        file: String,
        #[arg(long)]
        section: String,
    },
    /// List evidence attachments for a task
    ListEvidence { task_id: String },

    /// Record a QA command outcome into the context baseline
    RecordQa {
        task_id: String,
        #[arg(long)]
        command: String,
        #[arg(long)]
        exit_code: i32,
        #[arg(long)]
        log_path: Option<PathBuf>,
        #[arg(long)]
        duration_ms: Option<u64>,
        #[arg(long, default_value = "qa-recorder")]
        actor: String,
    },
    /// Compare recorded QA results against their baseline
    QaDrift { task_id: String },

    /// Context bundle inspection and migration
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },

    /// Record an exception ledger entry for a task
    AddException {
        task_id: String,
        #[arg(long)]
        exception_type: String,
        #[arg(long)]
        parse_error: Option<String>,
    },
    /// Mark an exception ledger entry resolved
    ResolveException {
        task_id: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Remove exception entries for a task and trigger
    CleanupException {
        task_id: String,
        #[arg(long, default_value = "manual")]
        trigger: String,
    },
    /// List exception ledger entries
    ListExceptions {
        #[arg(long)]
        status: Option<String>,
    },

    /// Quarantine a task with a critical failure
    QuarantineTask {
        task_id: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        error_details: Option<String>,
    },
    /// Release a task from quarantine
    ReleaseQuarantine { task_id: String },
    /// List quarantined tasks
    ListQuarantined {
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Subcommand)]
enum ContextAction {
    /// List initialized contexts with versions and audit counters
    Info,
    /// Validate context bundles against their manifests
    Validate { task_id: Option<String> },
    /// Migrate context bundles to the current schema version
    Migrate {
        task_id: Option<String>,
        #[arg(long)]
        auto: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // SIGINT aborts with the conventional 130.
    let interrupted = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
    let _ = signal_hook::flag::register_conditional_shutdown(
        signal_hook::consts::SIGINT,
        EXIT_INTERRUPTED,
        interrupted,
    );

    let cli = Cli::parse();
    let mut output = OutputChannel::new(cli.format);

    if let Err(err) = run(cli.command, &mut output) {
        if output.json_mode() {
            output.emit_json(&err.to_envelope());
        } else {
            eprintln!("Error: {err}");
            eprintln!("Recovery: {}", err.recovery_action());
        }
        std::process::exit(err.exit_code());
    }
}

fn run(command: Commands, output: &mut OutputChannel) -> Result<(), WorkflowError> {
    let cwd = std::env::current_dir()
        .map_err(|err| WorkflowError::io(format!("cannot determine working directory: {err}")))?;
    let layout = RepoLayout::discover(&cwd)?;

    match command {
        Commands::List { filter } => tasks::cmd_list(&layout, output, filter.as_deref()),
        Commands::Pick { filter } => tasks::cmd_pick(&layout, output, filter.as_deref()),
        Commands::Validate => tasks::cmd_validate(&layout, output),
        Commands::CheckHalt => tasks::cmd_check_halt(&layout, output),
        Commands::Graph => tasks::cmd_graph(&layout, output),
        Commands::Explain { task_id } => {
            tasks::cmd_explain(&layout, output, &TaskId(task_id))
        }
        Commands::RefreshCache => tasks::cmd_refresh_cache(&layout, output),
        Commands::CacheInfo => tasks::cmd_cache_info(&layout, output),
        Commands::Claim { task_path } => tasks::cmd_claim(&layout, output, &task_path),
        Commands::Complete { task_path } => tasks::cmd_complete(&layout, output, &task_path),
        Commands::Archive { task_path } => tasks::cmd_archive(&layout, output, &task_path),

        Commands::InitContext {
            task_id,
            base_commit,
            actor,
            force_secrets,
        } => context::cmd_init_context(
            &layout,
            output,
            &TaskId(task_id),
            base_commit,
            &actor,
            force_secrets,
        ),
        Commands::GetContext { task_id } => {
            context::cmd_get_context(&layout, output, &TaskId(task_id))
        }
        Commands::PurgeContext { task_id } => {
            context::cmd_purge_context(&layout, output, &TaskId(task_id))
        }
        Commands::RebuildContext {
            task_id,
            actor,
            force_secrets,
        } => context::cmd_rebuild_context(&layout, output, &TaskId(task_id), &actor, force_secrets),
        Commands::UpdateAgent {
            task_id,
            agent,
            status,
            qa_log,
            session_id,
            actor,
            force_secrets,
        } => context::cmd_update_agent(
            &layout,
            output,
            context::UpdateAgentArgs {
                task_id: TaskId(task_id),
                agent: agent.parse::<AgentRole>()?,
                status,
                qa_log,
                session_id,
                actor,
                force_secrets,
            },
        ),
        Commands::SnapshotWorktree {
            task_id,
            agent,
            base_commit,
            previous_agent,
            actor,
        } => worktree::cmd_snapshot_worktree(
            &layout,
            output,
            &TaskId(task_id),
            agent.parse::<AgentRole>()?,
            &actor,
            base_commit,
            previous_agent
                .map(|role| role.parse::<AgentRole>())
                .transpose()?,
        ),
        Commands::VerifyWorktree {
            task_id,
            expected_agent,
        } => worktree::cmd_verify_worktree(
            &layout,
            output,
            &TaskId(task_id),
            expected_agent.parse::<AgentRole>()?,
        ),

        Commands::AttachEvidence {
            task_id,
            artifact_type,
            path,
            description,
            metadata,
        } => evidence::cmd_attach_evidence(
            &layout,
            output,
            &TaskId(task_id),
            &artifact_type,
            &path,
            description,
            metadata,
        ),
        Commands::AttachStandard {
            task_id,
            file,
            section,
        } => evidence::cmd_attach_standard(&layout, output, &TaskId(task_id), &file, &section),
        Commands::ListEvidence { task_id } => {
            evidence::cmd_list_evidence(&layout, output, &TaskId(task_id))
        }

        Commands::RecordQa {
            task_id,
            command,
            exit_code,
            log_path,
            duration_ms,
            actor,
        } => qa::cmd_record_qa(
            &layout,
            output,
            qa::RecordQaArgs {
                task_id: TaskId(task_id),
                command,
                exit_code,
                log_path: log_path.as_deref(),
                actor,
                duration_ms,
            },
        ),
        Commands::QaDrift { task_id } => qa::cmd_qa_drift(&layout, output, &TaskId(task_id)),

        Commands::Context { action } => match action {
            ContextAction::Info => context::cmd_context_info(&layout, output),
            ContextAction::Validate { task_id } => context::cmd_context_validate(
                &layout,
                output,
                task_id.map(TaskId).as_ref(),
            ),
            ContextAction::Migrate {
                task_id,
                auto,
                dry_run,
                force,
            } => context::cmd_context_migrate(
                &layout,
                output,
                task_id.map(TaskId).as_ref(),
                auto,
                dry_run,
                force,
            ),
        },

        Commands::AddException {
            task_id,
            exception_type,
            parse_error,
        } => exceptions::cmd_add_exception(
            &layout,
            output,
            &TaskId(task_id),
            &exception_type,
            parse_error,
        ),
        Commands::ResolveException { task_id, notes } => {
            exceptions::cmd_resolve_exception(&layout, output, &TaskId(task_id), notes)
        }
        Commands::CleanupException { task_id, trigger } => {
            exceptions::cmd_cleanup_exception(&layout, output, &TaskId(task_id), &trigger)
        }
        Commands::ListExceptions { status } => {
            exceptions::cmd_list_exceptions(&layout, output, status.as_deref())
        }

        Commands::QuarantineTask {
            task_id,
            reason,
            error_details,
        } => quarantine::cmd_quarantine_task(
            &layout,
            output,
            &TaskId(task_id),
            &reason,
            error_details,
        ),
        Commands::ReleaseQuarantine { task_id } => {
            quarantine::cmd_release_quarantine(&layout, output, &TaskId(task_id))
        }
        Commands::ListQuarantined { status } => {
            quarantine::cmd_list_quarantined(&layout, output, status.as_deref())
        }
    }
}
