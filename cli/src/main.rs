//! `compass` command-line client.
//!
//! Drives the same session store, interceptor chain and navigation guard the
//! browser uses, with the credential persisted in a state directory instead
//! of `localStorage`. Each invocation is one "page load": the token is
//! restored from disk, the command runs, and queued forced redirects are
//! settled before exit.

use std::path::PathBuf;
use std::rc::Rc;

use clap::{Args, Parser, Subcommand};
use compass::net::TransportError;
use compass::net::types::RegisterParams;
use compass::notify::NoticeLog;
use compass::router::NavigationOutcome;
use compass::state::FileStore;
use compass::{App, AuthError, AuthState, ClientConfig, LoginCredentials};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("no state directory available; pass --state-dir or set COMPASS_STATE_DIR")]
    NoStateDir,
    #[error("http client setup failed: {0}")]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("login needs --password, or --code together with --phone")]
    InvalidLogin,
    #[error("navigation to {0} kept redirecting")]
    RedirectLoop(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "compass", about = "Compass session and navigation CLI")]
struct Cli {
    /// Overrides `COMPASS_API_BASE_URL`.
    #[arg(long)]
    base_url: Option<String>,

    /// Directory holding the persisted credential.
    #[arg(long, env = "COMPASS_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the session classification without contacting the server.
    Status,
    Login(LoginArgs),
    Register(RegisterArgs),
    /// Request an SMS verification code.
    SendCode {
        #[arg(long)]
        phone: String,
    },
    /// Fetch and print the signed-in user's profile.
    Whoami,
    Logout,
    /// Run the navigation guard for a path and print where it lands.
    Navigate {
        path: String,
        /// Location to navigate from (defaults to none, like a fresh tab).
        #[arg(long)]
        from: Option<String>,
    },
}

#[derive(Args, Debug)]
struct LoginArgs {
    #[arg(long, conflicts_with = "email", required_unless_present = "email")]
    phone: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long, env = "COMPASS_PASSWORD", hide_env_values = true, conflicts_with = "code")]
    password: Option<String>,
    /// SMS verification code (phone login only).
    #[arg(long, requires = "phone")]
    code: Option<String>,
}

impl LoginArgs {
    fn into_credentials(self) -> Result<LoginCredentials, CliError> {
        match (self.phone, self.email, self.password, self.code) {
            (Some(phone), _, Some(password), _) => Ok(LoginCredentials::PhonePassword { phone, password }),
            (None, Some(email), Some(password), _) => Ok(LoginCredentials::EmailPassword { email, password }),
            (Some(phone), _, None, Some(code)) => Ok(LoginCredentials::PhoneCode { phone, code }),
            _ => Err(CliError::InvalidLogin),
        }
    }
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long, conflicts_with = "email", required_unless_present = "email")]
    phone: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    nickname: String,
    #[arg(long, env = "COMPASS_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long, default_value = "")]
    avatar_url: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn state_dir(explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    directories::ProjectDirs::from("dev", "compass", "compass")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(CliError::NoStateDir)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = ClientConfig::from_env();
    if let Some(base_url) = cli.base_url {
        config.api_base_url = base_url.trim_end_matches('/').to_owned();
    }
    let storage = Rc::new(FileStore::new(state_dir(cli.state_dir)?));
    let notices = NoticeLog::new();
    let app = App::native(config, storage, Rc::new(notices.clone()))?;
    tracing::debug!(base_url = %app.config().api_base_url, "client ready");

    let result = dispatch(&app, cli.command).await;

    if let Some(outcome) = app.settle().await {
        report_outcome(&outcome);
    }
    for notice in notices.drain() {
        eprintln!("notice: {}", notice.message);
    }
    result
}

async fn dispatch(app: &App, command: Command) -> Result<(), CliError> {
    match command {
        Command::Status => {
            println!("{}", state_label(app.auth_state()));
            Ok(())
        }
        Command::Login(args) => {
            let credentials = args.into_credentials()?;
            app.store().login(&credentials).await?;
            let profile = app.store().fetch_profile().await?;
            println!("signed in as {}", profile.nickname);
            Ok(())
        }
        Command::Register(args) => {
            let params = RegisterParams {
                phone: args.phone,
                email: args.email,
                nickname: args.nickname,
                password: args.password,
                avatar_url: args.avatar_url,
            };
            let registered = app.store().register(&params).await?;
            println!("registered user {}", registered.user_id);
            Ok(())
        }
        Command::SendCode { phone } => {
            app.store().send_verification_code(&phone).await?;
            println!("verification code sent");
            Ok(())
        }
        Command::Whoami => {
            let profile = app.store().fetch_profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
            Ok(())
        }
        Command::Logout => {
            app.store().logout();
            println!("signed out");
            Ok(())
        }
        Command::Navigate { path, from } => {
            if let Some(from) = from {
                app.history().replace(from);
            }
            let outcome = app.navigate(&path).await;
            report_outcome(&outcome);
            match outcome {
                NavigationOutcome::RedirectLoop(_) => Err(CliError::RedirectLoop(path)),
                _ => Ok(()),
            }
        }
    }
}

fn state_label(state: AuthState) -> &'static str {
    match state {
        AuthState::Unauthenticated => "signed out",
        AuthState::PendingProfile => "signed in (profile not loaded)",
        AuthState::Authenticated => "signed in",
    }
}

fn report_outcome(outcome: &NavigationOutcome) {
    match outcome {
        NavigationOutcome::Committed(location) => println!("{location}"),
        NavigationOutcome::Superseded => println!("(superseded)"),
        NavigationOutcome::RedirectLoop(last) => eprintln!("redirect loop, last target {last}"),
    }
}
