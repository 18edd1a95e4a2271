mod backend;
mod render;
mod store;

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use ticketing::workflow::{self, IssueError};
use ticketing::{
    ApiError, Backend, FetchOutcome, KvStore, POLL_INTERVAL, PollHandle, Selection, SelectionError, SelectionStore,
    Ticket, TicketAction, TicketBoard, TransitionError,
};
use tracing_subscriber::EnvFilter;

use crate::backend::RestBackend;
use crate::store::{FileStore, TOKEN_KEY};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("not signed in; run `queuedesk-cli login` or pass --token / QUEUEDESK_TOKEN")]
    MissingToken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("no location selected; run `queuedesk-cli select location <id>`")]
    NoLocationSelected,
    #[error("ticket {0} is not among the waiting tickets of the selected location")]
    TicketNotFound(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid token: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("state file: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<IssueError> for CliError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::Rejected(e) => Self::Rejected(e),
            IssueError::Api(e) => Self::Api(e),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "queuedesk-cli", about = "QueueDesk terminal operator console")]
struct Cli {
    /// REST backend root, or the host's `/api` prefix.
    #[arg(long, env = "QUEUEDESK_BASE_URL", default_value = "http://127.0.0.1:3000/api")]
    base_url: String,

    /// Bearer token; overrides the one saved by `login`.
    #[arg(long, env = "QUEUEDESK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Where the selected location/desk and the session token are kept.
    #[arg(long, env = "QUEUEDESK_STATE_FILE", default_value = ".queuedesk-cli.json")]
    state_file: PathBuf,

    #[arg(long, env = "QUEUEDESK_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// Print lists as JSON instead of tables.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and save the session token.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "QUEUEDESK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the saved session token.
    Logout,
    /// List active locations.
    Locations,
    /// List active desks of a location (default: the selected one).
    Desks {
        #[arg(long)]
        location: Option<String>,
    },
    Select(SelectCommand),
    /// Show the current location and desk.
    Show,
    /// List pending and called tickets of the selected location.
    Tickets,
    /// Call a ticket to the selected desk.
    Call { ticket: String },
    /// Complete the ticket in call.
    Complete { ticket: String },
    /// Cancel the ticket in call.
    Cancel { ticket: String },
    /// Refresh the ticket list until Ctrl-C.
    Watch {
        #[arg(long, default_value_t = POLL_INTERVAL.as_secs())]
        interval_secs: u64,
    },
}

#[derive(Args, Debug)]
struct SelectCommand {
    #[command(subcommand)]
    target: SelectTarget,
}

#[derive(Subcommand, Debug)]
enum SelectTarget {
    Location { id: String },
    Desk { id: String },
    /// Forget both location and desk.
    Clear,
}

#[derive(Debug, Clone)]
struct CliContext {
    base_url: String,
    token: Option<String>,
    store: FileStore,
    timeout: Duration,
    json: bool,
}

impl CliContext {
    fn selection(&self) -> SelectionStore<FileStore> {
        SelectionStore::new(self.store.clone())
    }

    fn token(&self) -> Option<String> {
        self.token.clone().or_else(|| self.store.get(TOKEN_KEY))
    }

    fn backend(&self) -> Result<RestBackend, CliError> {
        let token = self.token().ok_or(CliError::MissingToken)?;
        RestBackend::new(&self.base_url, Some(&token), self.timeout)
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = CliContext {
        base_url: cli.base_url,
        token: cli.token,
        store: FileStore::new(cli.state_file),
        timeout: Duration::from_secs(cli.timeout_secs.max(1)),
        json: cli.json,
    };

    let result = run(&ctx, cli.command).await;
    if matches!(result, Err(CliError::Api(ApiError::Unauthorized))) {
        // Same as the browser: a rejected token is dropped.
        ctx.store.remove(TOKEN_KEY);
        tracing::warn!("session rejected; saved token removed");
    }
    result
}

async fn run(ctx: &CliContext, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login { email, password } => run_login(ctx, &email, &password).await,
        Command::Logout => {
            ctx.store.remove(TOKEN_KEY);
            println!("signed out");
            Ok(())
        }
        Command::Locations => run_locations(ctx).await,
        Command::Desks { location } => run_desks(ctx, location).await,
        Command::Select(select) => run_select(ctx, select.target).await,
        Command::Show => run_show(ctx).await,
        Command::Tickets => run_tickets(ctx).await,
        Command::Call { ticket } => run_action(ctx, TicketAction::Call, &ticket).await,
        Command::Complete { ticket } => run_action(ctx, TicketAction::Complete, &ticket).await,
        Command::Cancel { ticket } => run_action(ctx, TicketAction::Cancel, &ticket).await,
        Command::Watch { interval_secs } => run_watch(ctx, Duration::from_secs(interval_secs.max(1))).await,
    }
}

async fn run_login(ctx: &CliContext, email: &str, password: &str) -> Result<(), CliError> {
    let backend = RestBackend::new(&ctx.base_url, None, ctx.timeout)?;
    let session = backend.login(email, password).await.map_err(|e| match e {
        ApiError::Unauthorized => CliError::InvalidCredentials,
        other => CliError::Api(other),
    })?;
    ctx.store.set(TOKEN_KEY, &session.token);
    println!("signed in as {} <{}>", session.user.name, session.user.email);
    Ok(())
}

async fn run_locations(ctx: &CliContext) -> Result<(), CliError> {
    let backend = ctx.backend()?;
    let page = backend.list_locations().await?;
    if ctx.json {
        return print_json(&page.data);
    }
    let (selected, _) = ctx.selection().stored_ids();
    for location in &page.data {
        let marker = marker(selected.as_deref() == Some(location.id.as_str()));
        println!("{marker} {}", render::location_line(location));
    }
    Ok(())
}

async fn run_desks(ctx: &CliContext, location: Option<String>) -> Result<(), CliError> {
    let backend = ctx.backend()?;
    let (stored_location, stored_desk) = ctx.selection().stored_ids();
    let location_id = location.or(stored_location).ok_or(CliError::NoLocationSelected)?;
    let page = backend.list_desks(&location_id).await?;
    if ctx.json {
        return print_json(&page.data);
    }
    if page.data.is_empty() {
        println!("No active desks at {location_id}.");
    }
    for desk in &page.data {
        let marker = marker(stored_desk.as_deref() == Some(desk.id.as_str()));
        println!("{marker} {}", render::desk_line(desk));
    }
    Ok(())
}

async fn run_select(ctx: &CliContext, target: SelectTarget) -> Result<(), CliError> {
    let store = ctx.selection();
    if matches!(target, SelectTarget::Clear) {
        store.clear(&mut Selection::default());
        println!("{}", render::selection_summary(&Selection::default()));
        return Ok(());
    }

    let backend = ctx.backend()?;
    let mut current = store.restore(&backend).await;
    match target {
        SelectTarget::Location { id } => {
            let location = backend.get_location(&id).await?;
            store.pick_location(&mut current, location);
        }
        SelectTarget::Desk { id } => {
            if current.location.is_none() {
                return Err(CliError::NoLocationSelected);
            }
            let desk = backend.get_desk(&id).await?;
            store.pick_desk(&mut current, desk)?;
        }
        SelectTarget::Clear => {}
    }
    println!("{}", render::selection_summary(&current));
    Ok(())
}

async fn run_show(ctx: &CliContext) -> Result<(), CliError> {
    let backend = ctx.backend()?;
    let current = ctx.selection().restore(&backend).await;
    if ctx.json {
        return print_json(&serde_json::json!({
            "location": current.location,
            "desk": current.desk,
        }));
    }
    println!("{}", render::selection_summary(&current));
    Ok(())
}

/// Restored selection; fails when no location survives the restore.
async fn selected(ctx: &CliContext, backend: &RestBackend) -> Result<(Selection, String), CliError> {
    let current = ctx.selection().restore(backend).await;
    let location_id = current
        .location_id()
        .map(str::to_owned)
        .ok_or(CliError::NoLocationSelected)?;
    Ok((current, location_id))
}

async fn load_board(backend: &RestBackend, location_id: &str) -> Result<TicketBoard, CliError> {
    let mut board = TicketBoard::new();
    board.set_location(Some(location_id.to_owned()));
    match workflow::refresh(backend, &mut board, now_ms()).await {
        Some(FetchOutcome::Failed(err)) => Err(err.into()),
        _ => Ok(board),
    }
}

async fn run_tickets(ctx: &CliContext) -> Result<(), CliError> {
    let backend = ctx.backend()?;
    let (_, location_id) = selected(ctx, &backend).await?;
    let board = load_board(&backend, &location_id).await?;
    print_tickets(ctx, board.items())
}

async fn run_action(ctx: &CliContext, action: TicketAction, key: &str) -> Result<(), CliError> {
    let backend = ctx.backend()?;
    let (current, location_id) = selected(ctx, &backend).await?;
    let mut board = load_board(&backend, &location_id).await?;
    let ticket = find_ticket(board.items(), key)
        .cloned()
        .ok_or_else(|| CliError::TicketNotFound(key.to_owned()))?;

    let desk = current.desk.as_ref();
    let acted = workflow::issue_and_refresh(&backend, &mut board, action, &ticket, desk, now_ms()).await;
    let updated = acted.result?;
    tracing::info!(ticket = %updated.id, status = %updated.status, "action accepted");
    println!("{}", action.success_message(&updated, desk));

    match acted.reloaded {
        Some(FetchOutcome::Failed(err)) => {
            tracing::warn!(error = %err, "action accepted but the ticket list could not be reloaded");
            Ok(())
        }
        _ => print_tickets(ctx, board.items()),
    }
}

async fn run_watch(ctx: &CliContext, interval: Duration) -> Result<(), CliError> {
    let backend = ctx.backend()?;
    let (_, location_id) = selected(ctx, &backend).await?;

    let board = RefCell::new(TicketBoard::new());
    board.borrow_mut().set_location(Some(location_id.clone()));
    let session_lost = Cell::new(false);
    let handle = PollHandle::new();

    let tick = {
        let (backend, board, session_lost, handle) = (&backend, &board, &session_lost, handle.clone());
        move || {
            let handle = handle.clone();
            async move {
                let Some(token) = board.borrow_mut().begin_fetch() else {
                    return;
                };
                let result = workflow::fetch(backend, &token).await;
                let outcome = board.borrow_mut().finish_fetch(token, result, now_ms());
                match outcome {
                    FetchOutcome::Applied => {
                        println!("-- {} --", clock_label(now_ms()));
                        if let Err(e) = print_tickets(ctx, board.borrow().items()) {
                            tracing::warn!(error = %e, "could not render tickets");
                        }
                    }
                    FetchOutcome::Stale => {}
                    FetchOutcome::Failed(ApiError::Unauthorized) => {
                        session_lost.set(true);
                        handle.cancel();
                    }
                    FetchOutcome::Failed(err) => {
                        tracing::warn!(error = %err, "refresh failed; keeping previous list");
                    }
                }
            }
        }
    };

    tracing::info!(location = %location_id, interval_secs = interval.as_secs(), "watching tickets");
    let poll = ticketing::poll::run(handle.clone(), interval, tokio::time::sleep, tick);
    tokio::select! {
        ticks = poll => tracing::debug!(ticks, "poll loop ended"),
        signal = tokio::signal::ctrl_c() => {
            handle.cancel();
            signal?;
        }
    }

    if session_lost.get() {
        return Err(ApiError::Unauthorized.into());
    }
    Ok(())
}

/// Ticket addressed by id, display code (`012`) or plain number (`12`).
fn find_ticket<'a>(tickets: &'a [Ticket], key: &str) -> Option<&'a Ticket> {
    let key = key.trim();
    tickets
        .iter()
        .find(|t| t.id == key)
        .or_else(|| {
            let number = key.parse::<u32>().ok()?;
            tickets.iter().find(|t| t.number == number)
        })
}

fn print_tickets(ctx: &CliContext, tickets: &[Ticket]) -> Result<(), CliError> {
    if ctx.json {
        return print_json(&tickets);
    }
    print!("{}", render::ticket_table(tickets));
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

fn marker(selected: bool) -> char {
    if selected { '*' } else { ' ' }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// `HH:MM:SS UTC` for a millisecond timestamp.
fn clock_label(ms: i64) -> String {
    let secs = ms.div_euclid(1000).rem_euclid(86_400);
    format!("{:02}:{:02}:{:02} UTC", secs / 3600, secs % 3600 / 60, secs % 60)
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
