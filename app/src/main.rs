//! hexmemo - memorize a color, then rebuild it from memory.
//!
//! Terminal front end over `hexmemo-engine`. Progress is kept as JSON files
//! in `HEXMEMO_DATA_DIR`.

mod config;
mod error;
mod file_storage;
mod game;
mod scheduler;

use crate::config::Config;
use crate::error::AppError;
use crate::file_storage::FileStorage;
use crate::game::{Command, Game, Reply, HELP};
use crate::scheduler::TokioScheduler;
use hexmemo_engine::SystemClock;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hexmemo=debug,hexmemo_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let storage = FileStorage::open(&config.data_dir)?;
    tracing::info!(dir = %storage.dir().display(), "starting hexmemo");

    let (scheduler, mut timers) = TokioScheduler::new();
    let mut game = Game::new(
        config.engine_config(),
        storage,
        SystemClock,
        scheduler,
        StdRng::from_os_rng(),
    );

    println!("hexmemo - type 'help' for commands, 'new' to start.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            Some(token) = timers.recv() => {
                game.scheduler_mut().fired(token);
                if let Some(message) = game.on_timer(token) {
                    println!("{message}");
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>().and_then(|command| game.handle(command)) {
                    Ok(Reply::Say(text)) => println!("{text}"),
                    Ok(Reply::Quit) => break,
                    Err(e @ (AppError::UnknownCommand(_) | AppError::Usage(_))) => {
                        println!("{e}\n{HELP}");
                    }
                    Err(e) if e.is_recoverable() => println!("{e}"),
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    tracing::info!(
        rounds = game.session().round(),
        score = game.session().score(),
        history = game.state().history_len(),
        "goodbye"
    );
    Ok(())
}
