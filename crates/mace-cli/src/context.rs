//! Process-wide handles assembled once in `main` and threaded explicitly
//! into every command (spec §9's singleton-elimination note).

use mace_connectors::{ProcessInputGenerator, SlurmClient};
use mace_core::config::AppConfig;
use mace_core::error::MaceResult;
use mace_core::store::Store;
use std::path::PathBuf;

pub struct Context {
    pub config: AppConfig,
    pub store: Store,
    pub scheduler: SlurmClient,
    pub generator: ProcessInputGenerator,
    pub base_dir: PathBuf,
}

impl Context {
    pub async fn build(config: AppConfig) -> MaceResult<Self> {
        let store = Store::connect(&config.database_url()).await?;
        let user = std::env::var("USER").unwrap_or_else(|_| "mace".to_string());
        let scheduler = SlurmClient::new(user);
        let generator = ProcessInputGenerator::new("mace-input-generator", "generated.d12");
        let base_dir = config
            .mace_home
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self { config, store, scheduler, generator, base_dir })
    }
}
