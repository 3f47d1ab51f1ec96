use async_trait::async_trait;
use domain::{AttachmentRef, DomainError, UserId};

use crate::error::ApplicationError;

/// 图片上传的最大字节数
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub owner_id: UserId,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl AttachmentUpload {
    /// 只接受非空且不超限的图片
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.bytes.is_empty() {
            return Err(DomainError::invalid_argument("image", "image file is empty"));
        }
        if self.bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(DomainError::invalid_argument(
                "image",
                format!("image exceeds {MAX_ATTACHMENT_BYTES} bytes"),
            ));
        }
        match self.content_type.as_deref() {
            Some(content_type) if !content_type.starts_with("image/") => Err(
                DomainError::invalid_argument("image", "only image uploads are accepted"),
            ),
            _ => Ok(()),
        }
    }

    /// 根据文件名推断扩展名
    pub fn extension(&self) -> Option<&str> {
        self.file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
    }
}

/// 外部附件存储
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn store(&self, upload: AttachmentUpload) -> Result<AttachmentRef, ApplicationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(content_type: Option<&str>, bytes: usize) -> AttachmentUpload {
        AttachmentUpload {
            owner_id: UserId::generate(),
            file_name: Some("photo.png".into()),
            content_type: content_type.map(str::to_string),
            bytes: vec![0; bytes],
        }
    }

    #[test]
    fn rejects_empty_and_non_image_uploads() {
        assert!(upload(Some("image/png"), 16).validate().is_ok());
        assert!(upload(Some("image/png"), 0).validate().is_err());
        assert!(upload(Some("text/plain"), 16).validate().is_err());
    }

    #[test]
    fn extension_is_sanitized() {
        assert_eq!(upload(None, 1).extension(), Some("png"));
        let mut odd = upload(None, 1);
        odd.file_name = Some("../../etc/passwd".into());
        assert_eq!(odd.extension(), None);
    }
}
