use crate::collaborators::{BlobStore, Connectivity, MemoryBlobStore, S3BlobStore};
use crate::config::AppConfig;
use crate::store::{DocumentStore, DynamoStore, MemoryStore};
use aws_config::{BehaviorVersion, Region};
use std::sync::Arc;
use tracing::info;

/// Clients shared by every manager in a process.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub connectivity: Connectivity,
}

impl AppState {
    /// Load AWS configuration and build the DynamoDB store and S3 uploader.
    pub async fn from_config(config: AppConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let aws = loader.load().await;

        let connectivity = if config.start_offline {
            Connectivity::offline()
        } else {
            Connectivity::online()
        };

        let dynamo = aws_sdk_dynamodb::Client::new(&aws);
        let s3 = aws_sdk_s3::Client::new(&aws);

        info!(
            table = %config.table_name,
            bucket = %config.bucket_name,
            offline = config.start_offline,
            "app state ready"
        );

        Self {
            store: Arc::new(DynamoStore::new(dynamo, &config.table_name, connectivity.clone())),
            blobs: Arc::new(S3BlobStore::new(s3, &config.bucket_name)),
            connectivity,
            config,
        }
    }

    /// Everything in process; nothing leaves the machine.
    pub fn in_memory(config: AppConfig) -> Self {
        let connectivity = if config.start_offline {
            Connectivity::offline()
        } else {
            Connectivity::online()
        };
        Self {
            store: Arc::new(MemoryStore::with_connectivity(connectivity.clone())),
            blobs: Arc::new(MemoryBlobStore::new()),
            connectivity,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_state_honours_offline_start() {
        let state = AppState::in_memory(AppConfig {
            start_offline: true,
            ..AppConfig::default()
        });
        let projects = shigodeki_atoms::paths::projects();
        assert!(state.store.list(&projects).await.is_err());

        state.connectivity.set_offline(false);
        assert!(state.store.list(&projects).await.unwrap().is_empty());
    }
}
