pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod render;

use application::bootstrap::{bootstrap_workspace, default_workspace_root};
use application::commands::{
    AppState, PhaseResponse, TrackerStateResponse, get_tracker_state_impl, list_phases_impl,
    reset_day_impl, toggle_phase_impl,
};
use application::refresh::run_refresh_loop;
use chrono::Utc;
use chrono_tz::Tz;
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Serialize)]
struct ConfigPathResponse {
    workspace_root: String,
    config_path: String,
    database_path: String,
}

fn config_path(root: PathBuf) -> Result<ConfigPathResponse, String> {
    let result = bootstrap_workspace(&root).map_err(|error| error.to_string())?;
    Ok(ConfigPathResponse {
        workspace_root: result.workspace_root.display().to_string(),
        config_path: result.config_path.display().to_string(),
        database_path: result.database_path.display().to_string(),
    })
}

fn toggle_phase(state: &AppState) -> Result<TrackerStateResponse, String> {
    toggle_phase_impl(state, Utc::now())
        .map_err(|error| state.command_error("toggle_phase", &error))
}

fn get_tracker_state(state: &AppState) -> Result<TrackerStateResponse, String> {
    get_tracker_state_impl(state, Utc::now())
        .map_err(|error| state.command_error("get_tracker_state", &error))
}

fn list_phases(state: &AppState) -> Result<Vec<PhaseResponse>, String> {
    list_phases_impl(state, Utc::now()).map_err(|error| state.command_error("list_phases", &error))
}

fn reset_day(state: &AppState) -> Result<TrackerStateResponse, String> {
    reset_day_impl(state, Utc::now()).map_err(|error| state.command_error("reset_day", &error))
}

fn display_timezone(state: &AppState) -> Result<Option<Tz>, String> {
    state
        .config()
        .timezone()
        .map_err(|error| state.command_error("display_timezone", &error))
}

async fn watch(state: &AppState, ticks: Option<u64>, json: bool) -> Result<(), String> {
    let timezone = display_timezone(state)?;
    let interval = state.config().refresh_interval();

    let refresh = run_refresh_loop(state, interval, ticks, |snapshot| {
        let mut stdout = std::io::stdout().lock();
        if json {
            writeln!(stdout, "{}", serde_json::to_string(snapshot)?)?;
        } else {
            write!(stdout, "\r{}", render::render_watch_line(snapshot, timezone))?;
        }
        stdout.flush()?;
        Ok(())
    });

    tokio::select! {
        result = refresh => {
            let ticks = result.map_err(|error| state.command_error("watch", &error))?;
            state.log_info("watch", &format!("stopped after ticks={ticks}"));
        }
        _ = tokio::signal::ctrl_c() => {
            state.log_info("watch", "interrupted");
        }
    }

    if !json {
        println!();
    }
    Ok(())
}

fn emit<T: Serialize>(
    json: bool,
    value: &T,
    text: impl FnOnce(&T) -> String,
) -> Result<(), String> {
    if json {
        let formatted = serde_json::to_string_pretty(value).map_err(|error| error.to_string())?;
        println!("{formatted}");
    } else {
        println!("{}", text(value));
    }
    Ok(())
}

async fn dispatch(cli: Cli) -> Result<(), String> {
    let workspace_root = cli.workspace.unwrap_or_else(default_workspace_root);
    let json = cli.json;

    if let Commands::ConfigPath = cli.command {
        let response = config_path(workspace_root)?;
        return emit(json, &response, |response| response.config_path.clone());
    }

    let state = AppState::new(workspace_root, Utc::now()).map_err(|error| error.to_string())?;
    match cli.command {
        Commands::Toggle => {
            let response = toggle_phase(&state)?;
            let timezone = display_timezone(&state)?;
            emit(json, &response, |response| render::render_status(response, timezone))
        }
        Commands::Status => {
            let response = get_tracker_state(&state)?;
            let timezone = display_timezone(&state)?;
            emit(json, &response, |response| render::render_status(response, timezone))
        }
        Commands::Phases => {
            let phases = list_phases(&state)?;
            let timezone = display_timezone(&state)?;
            emit(json, &phases, |phases| render::render_phases(phases, timezone))
        }
        Commands::Reset => {
            let response = reset_day(&state)?;
            let timezone = display_timezone(&state)?;
            emit(json, &response, |response| render::render_status(response, timezone))
        }
        Commands::Watch { ticks } => watch(&state, ticks, json).await,
        Commands::ConfigPath => Ok(()),
    }
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}
