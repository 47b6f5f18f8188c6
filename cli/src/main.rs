//! Parley CLI - binary entry point.
//!
//! Wires the pieces together: settings from [`parley_config`], a
//! [`FirebaseAuth`] provider when an API key is configured, the request
//! gateway and typed API surface from [`parley_client`], and a
//! [`SessionStore`] for the sign-in commands. Each invocation builds the
//! stack fresh; session continuity comes from the provider's durable
//! refresh-token record, restored on startup.
//!
//! Logs go to a file, never stdout, so they cannot interleave with command
//! output or the chat prompt.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use parley_auth::{FirebaseAuth, IdentityProvider, SessionStore};
use parley_client::{ApiClient, Gateway};
use parley_config::Settings;
use parley_types::{AuthUser, ChatRole, NonEmptyString, ProjectId};

#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Command-line client for the Parley chatbot platform")]
struct Cli {
    /// Read settings from this file instead of the default config path.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with email and password.
    Login {
        email: String,
        /// Password; prompted for when neither the flag nor the
        /// environment variable is set. The prompt echoes, so prefer
        /// PARLEY_PASSWORD on a shared screen.
        #[arg(long, env = "PARLEY_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account, then sign in.
    Register {
        email: String,
        /// Password; prompted for when neither the flag nor the
        /// environment variable is set. The prompt echoes, so prefer
        /// PARLEY_PASSWORD on a shared screen.
        #[arg(long, env = "PARLEY_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Display name shown alongside the account.
        #[arg(long)]
        display_name: Option<String>,
    },
    /// Sign out and forget the stored session.
    Logout,
    /// Show the signed-in user's profile.
    Whoami,
    /// Manage chat projects.
    Project(ProjectCommand),
    /// Chat with a project's assistant interactively.
    Chat {
        /// Project id.
        project: String,
    },
    /// Print a project's chat history, oldest first.
    History {
        /// Project id.
        project: String,
    },
    /// Manage a project's uploaded files.
    File(FileCommand),
    /// Query backend health.
    Health,
}

#[derive(Args, Debug)]
struct ProjectCommand {
    #[command(subcommand)]
    command: ProjectSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProjectSubcommand {
    /// List your projects, newest first.
    List,
    /// Create a project.
    Create {
        name: String,
        /// System prompt handed to the assistant for this project.
        #[arg(long, default_value = "You are a helpful assistant.")]
        system_prompt: String,
    },
    /// Show one project.
    Show { project: String },
    /// Delete a project and its chat history.
    Delete { project: String },
}

#[derive(Args, Debug)]
struct FileCommand {
    #[command(subcommand)]
    command: FileSubcommand,
}

#[derive(Subcommand, Debug)]
enum FileSubcommand {
    /// Upload a file to a project.
    Upload {
        project: String,
        path: PathBuf,
        /// Override the MIME type guessed from the file extension.
        #[arg(long)]
        content_type: Option<String>,
    },
    /// List a project's files.
    List { project: String },
    /// Delete an uploaded file.
    Delete { project: String, file_id: String },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::debug!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No usable log file: prefer "no logs" over writing to stdout and
    // interleaving with command output.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(state_dir) = dirs::state_dir().or_else(dirs::data_dir) {
        candidates.push(state_dir.join("parley").join("logs").join("parley.log"));
    }

    // Fallback for constrained environments without a home directory.
    candidates.push(PathBuf::from(".parley").join("logs").join("parley.log"));

    candidates
}

/// Everything a command handler needs, wired once per invocation.
struct AppContext {
    store: SessionStore,
    api: ApiClient,
}

fn build_context(settings: &Settings) -> Result<AppContext> {
    let provider: Option<Arc<dyn IdentityProvider>> = settings.firebase.as_ref().map(|fb| {
        let mut builder = FirebaseAuth::builder(fb.api_key.clone());
        if let Some(path) = settings.session_file.clone() {
            builder = builder.session_file(Some(path));
        }
        builder.build() as Arc<dyn IdentityProvider>
    });

    let mut gateway = Gateway::builder(settings.api_base_url.as_str())
        .request_timeout(settings.request_timeout)
        .ready_timeout(settings.ready_timeout)
        .on_auth_lost(|| {
            eprintln!("Session expired. Run `parley login` to sign in again.");
        });
    if let Some(provider) = &provider {
        gateway = gateway.provider(Arc::clone(provider));
    }

    let api = ApiClient::new(gateway.build()?);
    let store = SessionStore::from_optional(provider).with_registrar(Arc::new(api.clone()));

    Ok(AppContext { store, api })
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => parley_config::load_from(path),
        None => parley_config::load(),
    };

    let result = run(cli.command, &settings).await;
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, settings: &Settings) -> Result<()> {
    let ctx = build_context(settings)?;

    match command {
        Command::Login { email, password } => {
            let password = resolve_password(password)?;
            ctx.store.login(&email, &password).await?;
            println!("Signed in as {email}");
            Ok(())
        }
        Command::Register {
            email,
            password,
            display_name,
        } => {
            let password = resolve_password(password)?;
            ctx.store
                .register(&email, &password, display_name.as_deref())
                .await?;
            println!("Registered and signed in as {email}");
            Ok(())
        }
        Command::Logout => {
            ctx.store.logout().await?;
            println!("Signed out");
            Ok(())
        }
        Command::Whoami => run_whoami(&ctx).await,
        Command::Project(project) => run_project(&ctx, project.command).await,
        Command::Chat { project } => run_chat(&ctx, &ProjectId::new(project)).await,
        Command::History { project } => run_history(&ctx, &ProjectId::new(project)).await,
        Command::File(file) => run_file(&ctx, file.command).await,
        Command::Health => run_health(&ctx).await,
    }
}

fn resolve_password(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    eprint!("Password (input is echoed): ");
    std::io::stderr().flush()?;
    let mut buf = String::new();
    std::io::stdin()
        .read_line(&mut buf)
        .context("failed to read password from stdin")?;
    let password = buf.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("password must not be empty");
    }
    Ok(password)
}

/// Wait for the provider's first settled state. `None` when anonymous or
/// unconfigured.
async fn settled_user(store: &SessionStore) -> Option<AuthUser> {
    let mut rx = store.subscribe();
    loop {
        {
            let state = rx.borrow_and_update();
            if !state.is_restoring() {
                return state.user().cloned();
            }
        }
        if rx.changed().await.is_err() {
            return None;
        }
    }
}

async fn run_whoami(ctx: &AppContext) -> Result<()> {
    let Some(user) = settled_user(&ctx.store).await else {
        println!("Not signed in");
        return Ok(());
    };

    let profile = ctx.api.me().await?;
    println!("uid:          {}", profile.uid);
    println!("email:        {}", profile.email);
    if let Some(name) = &profile.display_name {
        println!("display name: {name}");
    }
    if let Some(created) = &profile.created_at {
        println!("created:      {created}");
    }
    tracing::debug!(uid = %user.uid, "whoami resolved");
    Ok(())
}

async fn run_project(ctx: &AppContext, command: ProjectSubcommand) -> Result<()> {
    match command {
        ProjectSubcommand::List => {
            let projects = ctx.api.list_projects().await?;
            if projects.is_empty() {
                println!("No projects");
                return Ok(());
            }
            for project in projects {
                println!("{}  {}", project.id, project.name);
            }
            Ok(())
        }
        ProjectSubcommand::Create {
            name,
            system_prompt,
        } => {
            let name = NonEmptyString::new(name).context("project name must not be empty")?;
            let id = ctx.api.create_project(name.as_str(), &system_prompt).await?;
            println!("Created project {id}");
            Ok(())
        }
        ProjectSubcommand::Show { project } => {
            let project = ctx.api.get_project(&ProjectId::new(project)).await?;
            println!("id:            {}", project.id);
            println!("name:          {}", project.name);
            println!("system prompt: {}", project.system_prompt);
            if let Some(created) = &project.created_at {
                println!("created:       {created}");
            }
            Ok(())
        }
        ProjectSubcommand::Delete { project } => {
            let id = ProjectId::new(project);
            ctx.api.delete_project(&id).await?;
            println!("Deleted project {id}");
            Ok(())
        }
    }
}

async fn run_chat(ctx: &AppContext, project: &ProjectId) -> Result<()> {
    // Confirm the project exists before dropping into the prompt.
    let meta = ctx.api.get_project(project).await?;
    println!("Chatting with \"{}\". Empty line or Ctrl-D to quit.", meta.name);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = tokio::io::stdout();
    loop {
        out.write_all(b"you> ").await?;
        out.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            break;
        }

        match ctx.api.send_message(project, message).await {
            Ok(reply) => println!("\n{reply}\n"),
            Err(err) => eprintln!("Error: {err}"),
        }
    }
    Ok(())
}

async fn run_history(ctx: &AppContext, project: &ProjectId) -> Result<()> {
    let history = ctx.api.chat_history(project).await?;
    if history.is_empty() {
        println!("No messages yet");
        return Ok(());
    }
    for entry in history {
        let speaker = match entry.role {
            ChatRole::User => "you",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        };
        println!("[{speaker}] {}", entry.content);
    }
    Ok(())
}

async fn run_file(ctx: &AppContext, command: FileSubcommand) -> Result<()> {
    match command {
        FileSubcommand::Upload {
            project,
            path,
            content_type,
        } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .and_then(std::ffi::OsStr::to_str)
                .context("file name is not valid UTF-8")?;
            let content_type = content_type
                .as_deref()
                .unwrap_or_else(|| guess_content_type(filename));

            let receipt = ctx
                .api
                .upload_file(&ProjectId::new(project), filename, content_type, bytes)
                .await?;
            println!(
                "Uploaded {} ({} bytes) as {}",
                receipt.filename, receipt.size, receipt.file_id
            );
            Ok(())
        }
        FileSubcommand::List { project } => {
            let files = ctx.api.list_files(&ProjectId::new(project)).await?;
            if files.is_empty() {
                println!("No files");
                return Ok(());
            }
            for file in files {
                println!("{}  {}  {} bytes", file.file_id, file.filename, file.size);
            }
            Ok(())
        }
        FileSubcommand::Delete { project, file_id } => {
            ctx.api
                .delete_file(&ProjectId::new(project), &parley_types::FileId::new(file_id))
                .await?;
            println!("Deleted file");
            Ok(())
        }
    }
}

async fn run_health(ctx: &AppContext) -> Result<()> {
    let report = ctx.api.health().await?;
    println!("status: {}", report.status);
    for (service, state) in &report.services {
        println!("  {service}: {state}");
    }
    if let Some(error) = &report.error {
        println!("error: {error}");
    }
    Ok(())
}

fn guess_content_type(filename: &str) -> &'static str {
    let extension = filename.rsplit_once('.').map(|(_, ext)| ext);
    match extension {
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
