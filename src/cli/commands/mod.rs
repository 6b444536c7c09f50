//! CLI command implementations.

mod ask;
mod config;
mod index;
mod init;
mod search;
mod session;
mod status;

pub use ask::run_ask;
pub use config::run_config;
pub use index::{run_delete, run_index, run_list, run_reindex};
pub use init::run_init;
pub use search::run_search;
pub use session::{run_feedback, run_session};
pub use status::run_status;

use crate::config::Settings;
use crate::engine::QaEngine;
use anyhow::Result;

/// Build an engine and warm its lexical index.
pub(crate) async fn build_engine(settings: Settings) -> Result<QaEngine> {
    let engine = QaEngine::new(settings)?;
    engine.bootstrap().await?;
    Ok(engine)
}

/// Parse a UUID argument with a friendly error.
pub(crate) fn parse_uuid(value: &str, what: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(value).map_err(|_| anyhow::anyhow!("Invalid {} ID: {}", what, value))
}
