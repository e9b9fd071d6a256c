pub mod cli;
pub mod models;
pub mod repl;
pub mod runner;
pub mod server;
pub mod session;

use cli::{ Args, Command, ServeArgs };
use log::info;
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    match args.command {
        Command::Serve(serve_args) => serve(serve_args).await,
        Command::Chat(chat_args) => repl::run(chat_args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Bridge Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Program: {}", args.program);
    info!("Program Args: {:?}", args.program_args);
    info!("Program Timeout (s): {}", args.program_timeout_secs);
    info!("Max Message Bytes: {}", args.max_message_bytes);
    info!("Rate Limit (req/s): {}", args.rate_limit_per_second);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("----------------------------");

    let generator = runner::new_generator(&args);
    let server = Server::new(args.server_addr.clone(), generator, args);
    server.run().await
}
