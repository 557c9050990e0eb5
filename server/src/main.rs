use clap::Parser;
use server::network::Server;
use server::store::FileQuizStore;
use std::sync::Arc;
use std::time::Duration;

/// Parses command-line arguments, builds the quiz store, and runs the
/// session server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "5000")]
        port: u16,
        /// Path to the quiz catalog (JSON object mapping codes to quizzes)
        #[clap(short, long, default_value = "quizzes.json")]
        quizzes: String,
        /// Seconds of silence before a connection is treated as gone
        #[clap(short = 't', long, default_value = "30")]
        connection_timeout: u64,
    }

    let args = Args::parse();

    let store = Arc::new(FileQuizStore::new(&args.quizzes));
    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(
        &address,
        store,
        Duration::from_secs(args.connection_timeout),
    )
    .await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
            Ok(())
        }
    }
}
