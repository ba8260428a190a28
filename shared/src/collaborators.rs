//! Narrow interfaces to services the hierarchy layer consumes but does not own:
//! who is signed in, where uploaded files go, and whether the client is online.

use crate::error::StoreError;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

// ========== AUTH ==========

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub display_name: Option<String>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The signed-in user, if any.
    async fn current_user(&self) -> Option<AuthUser>;
}

/// Fixed identity. Used by the migration lambda, which acts on behalf of the
/// owner named in its event, and by tests.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    user: Option<AuthUser>,
}

impl StaticAuth {
    pub fn signed_in(user_id: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            user: Some(AuthUser {
                user_id: user_id.into(),
                display_name,
            }),
        }
    }

    pub fn signed_out() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn current_user(&self) -> Option<AuthUser> {
        self.user.clone()
    }
}

// ========== BLOB UPLOAD ==========

/// Where an uploaded file belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobScope {
    pub project_id: String,
    pub task_id: String,
}

impl BlobScope {
    pub fn object_key(&self, file_id: &str) -> String {
        format!("projects/{}/tasks/{}/{}", self.project_id, self.task_id, file_id)
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` and return a URL that refers to them.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        scope: &BlobScope,
    ) -> Result<String, StoreError>;
}

pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("https://{}.s3.amazonaws.com/{}", self.bucket, key)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        scope: &BlobScope,
    ) -> Result<String, StoreError> {
        let key = scope.object_key(&uuid::Uuid::new_v4().to_string());
        let size = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| {
                error!("S3 put_object failed for {}: {}", key, e);
                StoreError::unavailable(format!("upload failed: {e}"))
            })?;

        info!(bucket = %self.bucket, key = %key, size, "uploaded attachment");
        Ok(self.url_for(&key))
    }
}

/// Keeps uploads in memory and hands out `memory://` URLs.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        let key = url.strip_prefix("memory://")?;
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        _content_type: &str,
        scope: &BlobScope,
    ) -> Result<String, StoreError> {
        let key = scope.object_key(&uuid::Uuid::new_v4().to_string());
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.clone(), bytes);
        Ok(format!("memory://{key}"))
    }
}

// ========== CONNECTIVITY ==========

/// Online/offline switch shared between the app and its document store.
/// While offline, stores refuse I/O with `StoreErrorKind::Unavailable`.
#[derive(Debug, Clone, Default)]
pub struct Connectivity {
    offline: Arc<AtomicBool>,
}

impl Connectivity {
    pub fn online() -> Self {
        Self::default()
    }

    pub fn offline() -> Self {
        let c = Self::default();
        c.set_offline(true);
        c
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    pub fn is_online(&self) -> bool {
        !self.is_offline()
    }

    pub fn set_offline(&self, offline: bool) {
        let was = self.offline.swap(offline, Ordering::SeqCst);
        if was != offline {
            info!(offline, "connectivity changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_auth_reports_user() {
        let auth = StaticAuth::signed_in("u1", Some("Aiko".into()));
        assert_eq!(auth.current_user().await.unwrap().user_id, "u1");
        assert!(StaticAuth::signed_out().current_user().await.is_none());
    }

    #[tokio::test]
    async fn memory_blobs_are_scoped() {
        let blobs = MemoryBlobStore::new();
        let scope = BlobScope {
            project_id: "p1".into(),
            task_id: "t1".into(),
        };
        let url = blobs.upload(b"hello".to_vec(), "text/plain", &scope).await.unwrap();
        assert!(url.starts_with("memory://projects/p1/tasks/t1/"));
        assert_eq!(blobs.get(&url), Some(b"hello".to_vec()));
    }

    #[test]
    fn connectivity_clones_share_state() {
        let a = Connectivity::online();
        let b = a.clone();
        b.set_offline(true);
        assert!(a.is_offline());
        assert!(Connectivity::offline().is_offline());
    }
}
