use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
};

use application::{ApplicationError, AttachmentStore, AttachmentUpload};
use async_trait::async_trait;
use config::AttachmentConfig;
use domain::AttachmentRef;
use tokio::sync::RwLock;
use uuid::Uuid;

fn stored_name(upload: &AttachmentUpload) -> String {
    match upload.extension() {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext.to_ascii_lowercase()),
        None => Uuid::new_v4().to_string(),
    }
}

fn public_ref(prefix: &str, name: &str) -> Result<AttachmentRef, ApplicationError> {
    let reference = format!("{}/{}", prefix.trim_end_matches('/'), name);
    Ok(AttachmentRef::parse(reference)?)
}

/// 保存到本地目录的附件存储
#[derive(Debug, Clone)]
pub struct LocalAttachmentStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalAttachmentStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.into(),
        }
    }

    pub fn from_config(config: &AttachmentConfig) -> Self {
        Self::new(&config.directory, &config.public_prefix)
    }
}

#[async_trait]
impl AttachmentStore for LocalAttachmentStore {
    async fn store(&self, upload: AttachmentUpload) -> Result<AttachmentRef, ApplicationError> {
        let name = stored_name(&upload);
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| ApplicationError::infrastructure(format!("attachment dir: {err}")))?;

        let path = self.root.join(&name);
        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(|err| ApplicationError::infrastructure(format!("attachment write: {err}")))?;

        tracing::debug!(
            owner_id = %upload.owner_id,
            path = %path.display(),
            bytes = upload.bytes.len(),
            "附件已保存"
        );
        public_ref(&self.public_prefix, &name)
    }
}

/// 内存附件存储，测试和无磁盘部署使用
#[derive(Debug, Clone, Default)]
pub struct InMemoryAttachmentStore {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, reference: &str) -> Option<Vec<u8>> {
        self.files.read().await.get(reference).cloned()
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn store(&self, upload: AttachmentUpload) -> Result<AttachmentRef, ApplicationError> {
        let reference = public_ref("/attachments", &stored_name(&upload))?;
        self.files
            .write()
            .await
            .insert(reference.as_str().to_string(), upload.bytes);
        Ok(reference)
    }
}
