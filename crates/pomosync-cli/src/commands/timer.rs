use std::io::{BufRead, Write};

use clap::Subcommand;
use pomosync_core::timer::format_clock;
use pomosync_core::{SessionType, StartOptions, TaskSelection, TimerPhase, TimerRuntime, TimerState};
use serde::Serialize;

use crate::context::{open_runtime, CliResult};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a session
    Start {
        /// Task to bind (required for work unless --standalone)
        #[arg(long)]
        task: Option<String>,
        /// Project the task belongs to
        #[arg(long)]
        project: Option<String>,
        /// Work without a project
        #[arg(long)]
        standalone: bool,
        /// Session type: work, short, long (default: the current session)
        #[arg(long)]
        session: Option<String>,
        /// Override the session length, in minutes
        #[arg(long)]
        minutes: Option<u64>,
    },
    /// Pause the running session
    Pause,
    /// Resume a paused session
    Resume,
    /// End the current session without counting it
    Skip,
    /// Restore the full duration of the current session
    Reset,
    /// Stop and return to an idle, unbound work session
    Stop,
    /// Bind a task to the timer
    Task {
        /// Task ID
        id: String,
        #[arg(long)]
        project: Option<String>,
        /// Display name, passed along in activeTaskChanged
        #[arg(long)]
        name: Option<String>,
    },
    /// Zero the pomodoro count
    ResetCount,
    /// Print current timer state as JSON
    Status,
    /// Keep a foreground surface open and tick until the timer goes idle
    Run,
    /// Check whether the timer conflicts with a surface bound to a project
    Conflict {
        /// Project the surface shows (omit for an unbound surface)
        #[arg(long)]
        project: Option<String>,
        /// Stop the conflicting timer
        #[arg(long)]
        stop: bool,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView<'a> {
    phase: TimerPhase,
    session: SessionType,
    remaining: String,
    #[serde(flatten)]
    state: &'a TimerState,
}

fn print_state(state: &TimerState) -> CliResult {
    let view = StatusView {
        phase: state.phase(),
        session: state.current_session,
        remaining: format_clock(state.time_remaining_sec),
        state,
    };
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

fn parse_session(raw: &str) -> CliResult<SessionType> {
    SessionType::parse(raw).ok_or_else(|| format!("unknown session type: {raw} (work, short, long)").into())
}

pub async fn run(action: TimerAction) -> CliResult {
    let runtime = open_runtime().await?;
    let result = apply(&runtime, action).await;
    runtime.shutdown().await;
    result
}

async fn apply(runtime: &TimerRuntime, action: TimerAction) -> CliResult {
    // A session that ran out since the last invocation completes before the
    // requested action is applied.
    let caught_up = runtime.lock().catch_up();
    if let Some(outcome) = &caught_up {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    }

    match action {
        TimerAction::Start {
            task,
            project,
            standalone,
            session,
            minutes,
        } => {
            let opts = StartOptions {
                duration_sec: minutes.map(|m| m * 60),
                session: session.as_deref().map(parse_session).transpose()?,
                project_id: project,
                task_id: task,
                standalone,
            };
            if !runtime.lock().start(opts) {
                return Err("a work session needs --task or --standalone".into());
            }
        }
        TimerAction::Pause => {
            if !runtime.lock().pause() {
                return Err("timer is not running".into());
            }
        }
        TimerAction::Resume => {
            if !runtime.lock().resume() {
                return Err("timer is not paused".into());
            }
        }
        TimerAction::Skip => {
            if caught_up.is_none() {
                let outcome = runtime.lock().skip();
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }
        }
        TimerAction::Reset => runtime.lock().reset(),
        TimerAction::Stop => runtime.lock().stop_to_idle(),
        TimerAction::Task { id, project, name } => {
            let selection = TaskSelection {
                task_id: id,
                project_id: project,
                task_name: name,
                project_name: None,
            };
            if !runtime.lock().set_active_task(selection) {
                return Err("tasks cannot be bound during a break".into());
            }
        }
        TimerAction::ResetCount => runtime.lock().reset_count(),
        TimerAction::Status => {
            let completed = runtime.lock().tick();
            if let Some(outcome) = completed {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }
        }
        TimerAction::Run => return run_foreground(runtime).await,
        TimerAction::Conflict { project, stop, yes } => {
            return resolve_conflict(runtime, project, stop, yes);
        }
    }
    print_state(&runtime.shared().get())
}

async fn run_foreground(runtime: &TimerRuntime) -> CliResult {
    let _driver = runtime.spawn_driver();
    let mut snapshot = runtime.shared().subscribe();
    let mut completed = runtime.bus().pomodoro_completed.subscribe();

    loop {
        snapshot.borrow_and_update();
        // Read under the engine lock so a completion that auto-starts the
        // next session is never observed half-way.
        let state = runtime.lock().state().clone();
        if !state.is_running {
            eprintln!();
            return print_state(&state);
        }
        eprint!(
            "\r{} {}  ",
            state.current_session.label(),
            format_clock(state.time_remaining_sec)
        );
        let _ = std::io::stderr().flush();

        tokio::select! {
            changed = snapshot.changed() => changed?,
            Ok(ev) = completed.recv() => {
                eprintln!("\npomodoro complete (#{})", runtime.shared().get().pomodoro_count);
                if ev.saved_locally == Some(true) {
                    eprintln!("saved locally; run `pomosync-cli pending sync` after signing in");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\ndetached; the timer keeps running");
                return Ok(());
            }
        }
    }
}

fn resolve_conflict(runtime: &TimerRuntime, project: Option<String>, stop: bool, yes: bool) -> CliResult {
    let detector = runtime.conflict_detector(project);
    let Some(conflict) = detector.check() else {
        println!("no conflict");
        return Ok(());
    };
    println!("{}", serde_json::to_string_pretty(&conflict)?);

    if !stop {
        if let Some(target) = detector.view() {
            println!("{}", serde_json::to_string_pretty(&target)?);
        }
        return Ok(());
    }

    let Some(request) = detector.request_stop() else {
        return Ok(());
    };
    if !yes {
        eprint!("{} [y/N] ", request.prompt());
        std::io::stderr().flush()?;
        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("cancelled");
            return Ok(());
        }
    }
    request.confirm(&mut runtime.lock());
    print_state(&runtime.shared().get())
}
