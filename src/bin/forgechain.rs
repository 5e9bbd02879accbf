#![forbid(unsafe_code)]

use tracing::error;

fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = forgechain::cli::run() {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
