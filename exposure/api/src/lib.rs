use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use crate::db::Db;

pub mod db;
pub mod error;
pub mod filters;
mod server;

#[derive(clap::Args, Debug)]
#[command(about = "Run the api server", args_conflicts_with_subcommands = true)]
pub struct Run {
    #[arg(short, long, default_value = "0.0.0.0")]
    pub bind: String,

    #[arg(short = 'p', long = "port", default_value_t = 8080)]
    pub port: u16,

    /// Directory holding the sqlite database file
    #[arg(long = "storage-base", default_value = ".")]
    pub storage_base: PathBuf,

    /// Seed a small demonstration dataset at startup
    #[arg(long = "devmode", default_value_t = false)]
    pub devmode: bool,
}

impl Run {
    pub async fn run(self) -> anyhow::Result<ExitCode> {
        let state = self.configure().await?;
        let addr = SocketAddr::from_str(&format!("{}:{}", self.bind, self.port))?;
        server::run(state, addr).await?;
        Ok(ExitCode::SUCCESS)
    }

    async fn configure(&self) -> anyhow::Result<SharedState> {
        let db = Db::new(&self.storage_base).await?;
        if self.devmode {
            db.seed_demo().await?;
        }
        Ok(Arc::new(AppState { db }))
    }
}

pub struct AppState {
    pub(crate) db: Db,
}

pub(crate) type SharedState = Arc<AppState>;
