//! S3 object access shared by the remote backends.
//!
//! Baselines and secrets can both live in S3 (or a compatible service) so
//! that concurrent runs on different machines see the same values.

use aws_sdk_s3::Client;
use aws_sdk_s3::types::ServerSideEncryption;
use tracing::debug;

use crate::error::{RelayError, Result, StateError};

/// Thin wrapper over one bucket and key prefix.
#[derive(Debug, Clone)]
pub struct S3Objects {
    /// S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Normalized key prefix (empty or ending in `/`).
    prefix: String,
    /// Whether objects are written with server-side encryption.
    encrypt: bool,
}

impl S3Objects {
    /// Creates a helper using credentials from the environment.
    pub async fn new(bucket: &str, prefix: Option<&str>, region: Option<&str>) -> Self {
        let config = if let Some(region_str) = region {
            aws_config::from_env()
                .region(aws_config::Region::new(region_str.to_string()))
                .load()
                .await
        } else {
            aws_config::load_from_env().await
        };

        Self::with_client(Client::new(&config), bucket, prefix)
    }

    /// Creates a helper with an existing client.
    #[must_use]
    pub fn with_client(client: Client, bucket: &str, prefix: Option<&str>) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: normalize_prefix(prefix),
            encrypt: false,
        }
    }

    /// Enables server-side encryption on writes.
    #[must_use]
    pub const fn encrypted(mut self) -> Self {
        self.encrypt = true;
        self
    }

    /// Gets the full key for a file name.
    #[must_use]
    pub fn key(&self, file: &str) -> String {
        format!("{}{file}", self.prefix)
    }

    /// Gets the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Reads an object as UTF-8, returning `None` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error on any S3 failure other than a missing key.
    pub async fn get_string(&self, key: &str) -> Result<Option<String>> {
        debug!("Reading s3://{}/{key}", self.bucket);
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(response) => {
                let bytes = response.body.collect().await.map_err(|e| {
                    RelayError::State(StateError::s3(format!("Failed to read S3 object: {e}")))
                })?;

                let content = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    RelayError::State(StateError::Corrupted {
                        message: format!("Invalid UTF-8 in S3 object: {e}"),
                    })
                })?;

                Ok(Some(content))
            }
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(RelayError::State(StateError::s3(format!(
                        "S3 get error: {service_err}"
                    ))))
                }
            }
        }
    }

    /// Writes an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the put fails.
    pub async fn put_string(&self, key: &str, content: &str, content_type: &str) -> Result<()> {
        debug!("Writing s3://{}/{key}", self.bucket);
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(content.as_bytes().to_vec().into())
            .content_type(content_type);

        if self.encrypt {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }

        request
            .send()
            .await
            .map_err(|e| RelayError::State(StateError::s3(format!("S3 put error: {e}"))))?;

        Ok(())
    }
}

/// Trims slashes and appends a single trailing `/` to a non-empty prefix.
fn normalize_prefix(prefix: Option<&str>) -> String {
    prefix
        .map(|p| {
            let p = p.trim_matches('/');
            if p.is_empty() {
                String::new()
            } else {
                format!("{p}/")
            }
        })
        .unwrap_or_default()
}
