use std::sync::Arc;

use gogrepo_jobs::JobRegistry;
use gogrepo_login::LoginBridge;
use gogrepo_manifest::ManifestReader;
use gogrepo_metadata::MetadataCache;
use gogrepo_tool::Tool;

use crate::config::HubConfig;

/// Shared application state used by every command.
pub struct HubState {
    pub config: HubConfig,
    pub tool: Tool,
    pub registry: Arc<JobRegistry>,
    pub metadata: Arc<MetadataCache>,
    pub login: Arc<LoginBridge>,
}

impl HubState {
    pub fn new(config: HubConfig) -> anyhow::Result<Self> {
        let tool = config.tool();
        let manifest = Arc::new(ManifestReader::new(config.manifest_path()));
        let metadata = MetadataCache::new(&config.metadata_config(), manifest)?;
        Ok(Self {
            registry: Arc::new(JobRegistry::new(config.registry_config())),
            metadata: Arc::new(metadata),
            login: Arc::new(LoginBridge::new(&tool)),
            tool,
            config,
        })
    }
}
