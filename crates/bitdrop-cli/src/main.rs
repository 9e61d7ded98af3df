//! bitdrop: BitDrop command-line client
//!
//! Commands:
//!   send <file> --to <email>       - encrypt locally, upload, notify the recipient
//!   fetch <id> [--output <path>]   - download and decrypt locally
//!   count <id>                     - number of stored chunks
//!   delete <id> <hash>             - delete a stored file

mod client;
mod seal;

use anyhow::{Context, Result};
use bitdrop_core::config::DEFAULT_PBKDF2_ITERATIONS;
use bitdrop_core::UploadId;
use bitdrop_crypto::{KdfParams, CHUNK_SIZE};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::{BitdropClient, CompleteRequest};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "bitdrop", version, about = "BitDrop encrypted file-drop client")]
struct Cli {
    /// Base URL of the bitdropd API
    #[arg(
        long,
        short = 's',
        env = "BITDROP_SERVER",
        default_value = "http://localhost:8000"
    )]
    server: String,

    /// PBKDF2 iterations; must match the server and other clients
    #[arg(long, env = "BITDROP_PBKDF2_ITERATIONS", default_value_t = DEFAULT_PBKDF2_ITERATIONS)]
    iterations: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BITDROP_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file locally and share it with a recipient
    Send {
        /// File to send
        file: PathBuf,
        /// Recipient email address
        #[arg(long)]
        to: String,
        /// Message included in the notification
        #[arg(long, short = 'm')]
        message: Option<String>,
        /// Password for the file (prompted when omitted)
        #[arg(long, env = "BITDROP_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Generate a random password instead of prompting
        #[arg(long, conflicts_with = "password")]
        generate_password: bool,
        /// Shared secret the server requires to finalize uploads
        #[arg(long, env = "BITDROP_AUTH_TOKEN", hide_env_values = true)]
        auth_token: Option<String>,
    },

    /// Download a shared file and decrypt it locally
    Fetch {
        /// Upload id from the retrieval link
        id: UploadId,
        /// Password for the file (prompted when omitted)
        #[arg(long, env = "BITDROP_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Output path (default: the original filename in the current directory)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Show how many chunks a stored file has
    Count {
        id: UploadId,
    },

    /// Delete a stored file
    Delete {
        id: UploadId,
        /// Content hash the file was uploaded with
        hash: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    let client = BitdropClient::new(&cli.server);
    let params = KdfParams {
        iterations: cli.iterations,
    };

    match cli.command {
        Commands::Send {
            file,
            to,
            message,
            password,
            generate_password,
            auth_token,
        } => {
            let password = match (password, generate_password) {
                (Some(p), _) => p,
                (None, true) => seal::generate_password(),
                (None, false) => prompt_password("Password for the file: ")?,
            };
            cmd_send(
                &client,
                &params,
                &file,
                &to,
                message.as_deref(),
                password,
                auth_token.as_deref(),
            )
            .await
        }
        Commands::Fetch {
            id,
            password,
            output,
        } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("Password: ")?,
            };
            cmd_fetch(&client, &params, &id, password, output.as_deref()).await
        }
        Commands::Count { id } => {
            println!("{}", client.count_chunks(&id).await?);
            Ok(())
        }
        Commands::Delete { id, hash } => {
            println!("{}", client.delete(&id, &hash).await?);
            Ok(())
        }
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn prompt_password(prompt: &str) -> Result<String> {
    let password = rpassword::prompt_password(prompt).context("reading password")?;
    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    Ok(password)
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `bitdrop send` ────────────────────────────────────────────────────────────

async fn cmd_send(
    client: &BitdropClient,
    params: &KdfParams,
    file: &Path,
    to: &str,
    message: Option<&str>,
    password: String,
    auth_token: Option<&str>,
) -> Result<()> {
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("not a file: {}", file.display()))?;
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let spinner = make_spinner("send");
    spinner.set_message("deriving key and encrypting...");
    let secret = SecretString::from(password.clone());
    let kdf = params.clone();
    let sealed =
        tokio::task::spawn_blocking(move || seal::seal_file(&data, &secret, &kdf, CHUNK_SIZE))
            .await
            .context("encryption task failed")??;
    spinner.finish_and_clear();

    let upload_id = UploadId::new_v4();
    let total = sealed.chunks.len() as u64;
    tracing::debug!(upload_id = %upload_id, chunks = total, "uploading");

    let pb = make_progress_bar(total, "send");
    pb.set_message(filename.clone());
    for (i, chunk) in sealed.chunks.iter().enumerate() {
        client
            .upload_chunk(&upload_id, i as u64 + 1, total, chunk)
            .await?;
        pb.inc(1);
    }
    pb.finish_with_message("uploaded".to_string());

    let receipt = client
        .complete(&CompleteRequest {
            file_id: &upload_id,
            file_hash: &sealed.content_hash,
            email: to,
            filename: &filename,
            email_auth_token: auth_token,
            message,
        })
        .await?;

    println!();
    println!("Shared {} ({} bytes) with {to}", receipt.filename, sealed.plaintext_len);
    println!("  id:        {}", receipt.file_id);
    println!("  hash:      {}", sealed.content_hash);
    println!("  stored:    {}", receipt.timestamp);
    println!("  link:      {}", receipt.link);
    println!("  password:  {password}");
    match (&receipt.message_id, &receipt.message) {
        (_, Some(failure)) => {
            println!("  warning:   {failure}; send the link to the recipient yourself")
        }
        (Some(id), None) => println!("  notified:  {id}"),
        (None, None) => {}
    }
    Ok(())
}

// ── `bitdrop fetch` ───────────────────────────────────────────────────────────

async fn cmd_fetch(
    client: &BitdropClient,
    params: &KdfParams,
    id: &UploadId,
    password: String,
    output: Option<&Path>,
) -> Result<()> {
    let spinner = make_spinner("fetch");
    spinner.set_message("downloading chunks...");
    let set = client.download_chunks(id).await?;

    spinner.set_message(format!("decrypting {} chunks...", set.total_chunks));
    let secret = SecretString::from(password);
    let kdf = params.clone();
    let hash = set.file_hash.clone();
    let chunks = set.chunks;
    let assembly =
        tokio::task::spawn_blocking(move || seal::open_file(&chunks, &hash, &secret, &kdf))
            .await
            .context("decryption task failed")??;
    spinner.finish_and_clear();

    if !assembly.matches(&set.file_hash) {
        anyhow::bail!(
            "CORRUPT: decryption failed for {} chunk(s) (probably the wrong password); nothing written",
            assembly.rejected.len()
        );
    }

    // the stored name is a single segment, but never trust it as a path
    let default_name = Path::new(&set.filename)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(id.to_string()));
    let out = output.map(Path::to_path_buf).unwrap_or(default_name);

    tokio::fs::write(&out, &assembly.plaintext)
        .await
        .with_context(|| format!("writing {}", out.display()))?;
    println!(
        "Decrypted {} ({} bytes) -> {}",
        set.filename,
        assembly.plaintext.len(),
        out.display()
    );
    Ok(())
}
