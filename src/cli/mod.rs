use clap::{ Parser, Subcommand, Args as ClapArgs };
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP bridge in front of the external program.
    Serve(ServeArgs),
    /// Chat with a running bridge from the terminal.
    Chat(ChatArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    // --- Server Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    /// Maximum accepted request body size in bytes.
    #[arg(long, env = "MAX_MESSAGE_BYTES", default_value = "1048576")]
    pub max_message_bytes: usize,

    /// Global limit on chat requests per second. 0 disables the limit.
    #[arg(long, env = "RATE_LIMIT_PER_SECOND", default_value = "0")]
    pub rate_limit_per_second: u32,

    // --- External Program Args ---
    /// Executable that produces the assistant reply on stdout.
    #[arg(long, env = "CHAT_PROGRAM", default_value = "python")]
    pub program: String,

    /// Fixed arguments placed before the user's message (e.g., a script path).
    #[arg(
        long = "program-arg",
        env = "CHAT_PROGRAM_ARGS",
        value_delimiter = ',',
        allow_hyphen_values = true,
        default_value = "app.py"
    )]
    pub program_args: Vec<String>,

    /// Seconds a single program run may take before it is killed. 0 means no limit.
    #[arg(long, env = "CHAT_PROGRAM_TIMEOUT_SECS", default_value = "60")]
    pub program_timeout_secs: u64,

    // --- TLS Args ---
    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ChatArgs {
    /// Base URL of the bridge (e.g., http://127.0.0.1:3000)
    #[arg(long, env = "CHAT_SERVER_URL", default_value = "http://127.0.0.1:3000")]
    pub server_url: String,

    /// How long to wait for a reply before giving up, in milliseconds.
    #[arg(long, env = "CHAT_TIMEOUT_MS", default_value = "60000")]
    pub timeout_ms: u64,

    /// Delay before the typing indicator shows, in milliseconds.
    #[arg(long, env = "CHAT_TYPING_DELAY_MS", default_value = "500")]
    pub typing_delay_ms: u64,

    /// Directory holding the saved conversation. Defaults to the platform data directory.
    #[arg(long, env = "CHAT_STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Keep the conversation in memory only.
    #[arg(long, env = "CHAT_NO_PERSIST", default_value = "false")]
    pub no_persist: bool,
}
