use std::time::Duration;

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};

/// Source of the customer photos referenced by print jobs.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetch the raw encoded image stored under `key`.
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, AcquisitionError>;
}

/// Client for the S3-compatible bucket the sticker booth uploads selfies to.
pub struct ObjectStorage {
    bucket: Box<Bucket>,
}

impl ObjectStorage {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, AcquisitionError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| AcquisitionError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| AcquisitionError::Config(e.to_string()))?
            .with_path_style();

        Ok(Self { bucket })
    }

    /// Upload image bytes (used by tooling and live tests to seed photos).
    pub async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), AcquisitionError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(|e| classify(key, e))?;
        check_status(key, response.status_code())
    }

    /// Download image bytes.
    pub async fn download(&self, key: &str) -> Result<Vec<u8>, AcquisitionError> {
        let response = self.bucket.get_object(key).await.map_err(|e| classify(key, e))?;
        check_status(key, response.status_code())?;
        Ok(response.to_vec())
    }

    /// Delete an object.
    pub async fn delete(&self, key: &str) -> Result<(), AcquisitionError> {
        let response = self.bucket.delete_object(key).await.map_err(|e| classify(key, e))?;
        check_status(key, response.status_code())
    }
}

#[async_trait]
impl ImageSource for ObjectStorage {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, AcquisitionError> {
        self.download(key).await
    }
}

/// Fetch with an upper bound on how long the storage call may take.
pub async fn fetch_with_timeout(
    source: &dyn ImageSource,
    key: &str,
    timeout: Duration,
) -> Result<Vec<u8>, AcquisitionError> {
    if key.trim().is_empty() {
        return Err(AcquisitionError::NotFound(key.to_string()));
    }
    match tokio::time::timeout(timeout, source.fetch(key)).await {
        Ok(result) => result,
        Err(_) => Err(AcquisitionError::Timeout {
            key: key.to_string(),
            seconds: timeout.as_secs(),
        }),
    }
}

fn check_status(key: &str, status: u16) -> Result<(), AcquisitionError> {
    match status {
        200..=299 => Ok(()),
        other => Err(status_error(key, other)),
    }
}

fn status_error(key: &str, status: u16) -> AcquisitionError {
    match status {
        404 => AcquisitionError::NotFound(key.to_string()),
        401 | 403 => AcquisitionError::PermissionDenied(key.to_string()),
        other => AcquisitionError::Status {
            key: key.to_string(),
            status: other,
        },
    }
}

fn classify(key: &str, error: S3Error) -> AcquisitionError {
    match error {
        S3Error::HttpFailWithBody(status, _) => status_error(key, status),
        other => AcquisitionError::Network(other),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Permission denied for object: {0}")]
    PermissionDenied(String),

    #[error("Storage returned status {status} for {key}")]
    Status { key: String, status: u16 },

    #[error("S3 operation failed: {0}")]
    Network(#[from] S3Error),

    #[error("Timed out fetching {key} after {seconds}s")]
    Timeout { key: String, seconds: u64 },

    #[error("Storage configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowSource;

    #[async_trait]
    impl ImageSource for SlowSource {
        async fn fetch(&self, _key: &str) -> Result<Vec<u8>, AcquisitionError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![1, 2, 3])
        }
    }

    #[test]
    fn test_status_mapping() {
        assert!(check_status("a", 200).is_ok());
        assert!(matches!(check_status("a", 404), Err(AcquisitionError::NotFound(_))));
        assert!(matches!(
            check_status("a", 403),
            Err(AcquisitionError::PermissionDenied(_))
        ));
        assert!(matches!(
            check_status("a", 503),
            Err(AcquisitionError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let result = fetch_with_timeout(&SlowSource, "selfies/a.jpg", Duration::from_millis(20)).await;
        assert!(matches!(result, Err(AcquisitionError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_blank_key_is_not_found() {
        let result = fetch_with_timeout(&SlowSource, "  ", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(AcquisitionError::NotFound(_))));
    }

    #[test]
    fn test_client_builds_from_config() {
        let storage = ObjectStorage::new(
            "stickers",
            "https://project.supabase.co/storage/v1/s3",
            "auto",
            "access",
            "secret",
        );
        assert!(storage.is_ok());
    }
}
