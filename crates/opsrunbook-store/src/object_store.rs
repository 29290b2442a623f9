// crates/opsrunbook-store/src/object_store.rs
// ============================================================================
// Module: S3 Object Store Gateway
// Description: S3-backed implementation of the core object store interface.
// Purpose: Persist content-addressed evidence blobs in durable storage.
// Dependencies: aws-config, aws-sdk-s3, opsrunbook-core, tokio
// ============================================================================

//! ## Overview
//! The pipeline steps are synchronous; the S3 SDK is async. This gateway
//! owns a dedicated runtime and bridges each call onto it, re-entering the
//! ambient multi-thread runtime via `block_in_place` when one is active.
//! Reads enforce a hard byte limit while streaming.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use opsrunbook_core::ObjectStore;
use opsrunbook_core::ObjectStoreError;
use tokio::io::AsyncReadExt;
use tokio::runtime::Handle;
use tokio::runtime::Runtime;
use tokio::runtime::RuntimeFlavor;

// ============================================================================
// SECTION: Runtime Bridge
// ============================================================================

/// Blocks on an object-store future using a compatible runtime.
fn block_on_with_runtime<F, T>(runtime: &Runtime, future: F) -> Result<T, ObjectStoreError>
where
    F: Future<Output = Result<T, ObjectStoreError>> + Send + 'static,
    T: Send + 'static,
{
    if let Ok(handle) = Handle::try_current() {
        if matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) {
            return tokio::task::block_in_place(|| handle.block_on(future));
        }
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        std::thread::spawn(move || {
            let result = Runtime::new()
                .map_err(|err| ObjectStoreError::Io(err.to_string()))
                .and_then(|runtime| runtime.block_on(future));
            let _ = tx.send(result);
        });
        return rx
            .recv()
            .unwrap_or_else(|_| Err(ObjectStoreError::Io("object store thread join failed".to_string())));
    }

    runtime.block_on(future)
}

// ============================================================================
// SECTION: S3 Object Store
// ============================================================================

/// S3-backed [`ObjectStore`] implementation.
///
/// # Invariants
/// - Writes are content-addressed by callers and never mutated in place.
/// - Reads never buffer more than the supplied byte limit.
pub struct S3ObjectStore {
    /// Underlying S3 client.
    client: Client,
    /// Tokio runtime for blocking S3 operations.
    runtime: Option<Arc<Runtime>>,
}

impl Drop for S3ObjectStore {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            let _ = std::thread::spawn(move || drop(runtime));
        }
    }
}

impl S3ObjectStore {
    /// Builds a new S3-backed object store.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the runtime or client cannot be
    /// constructed.
    pub fn new(region: Option<String>) -> Result<Self, ObjectStoreError> {
        let runtime = Runtime::new().map_err(|err| ObjectStoreError::Io(err.to_string()))?;
        let shared_config = block_on_with_runtime(&runtime, async move {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = region {
                loader = loader.region(Region::new(region));
            }
            Ok(loader.load().await)
        })?;
        let client = Client::new(&shared_config);
        Ok(Self {
            client,
            runtime: Some(Arc::new(runtime)),
        })
    }

    /// Returns the runtime or an error if shutdown.
    fn runtime(&self) -> Result<&Runtime, ObjectStoreError> {
        self.runtime
            .as_ref()
            .map(AsRef::as_ref)
            .ok_or_else(|| ObjectStoreError::Io("object store runtime closed".to_string()))
    }
}

impl ObjectStore for S3ObjectStore {
    fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
        if bucket.is_empty() || key.is_empty() {
            return Err(ObjectStoreError::Invalid("bucket and key are required".to_string()));
        }
        let bucket = bucket.to_string();
        let key = key.to_string();
        let client = self.client.clone();
        block_on_with_runtime(self.runtime()?, async move {
            client
                .put_object()
                .bucket(bucket)
                .key(key)
                .content_type("application/json")
                .body(ByteStream::from(bytes))
                .send()
                .await
                .map_err(|err| ObjectStoreError::Io(err.to_string()))?;
            Ok(())
        })
    }

    fn get(&self, bucket: &str, key: &str, max_bytes: usize) -> Result<Vec<u8>, ObjectStoreError> {
        if bucket.is_empty() || key.is_empty() {
            return Err(ObjectStoreError::Invalid("bucket and key are required".to_string()));
        }
        let bucket = bucket.to_string();
        let key = key.to_string();
        let client = self.client.clone();
        block_on_with_runtime(self.runtime()?, async move {
            let output = client
                .get_object()
                .bucket(bucket)
                .key(key.clone())
                .send()
                .await
                .map_err(|err| ObjectStoreError::NotFound(format!("{key}: {err}")))?;
            if let Some(length) = output.content_length() {
                let actual_bytes = usize::try_from(length).unwrap_or(usize::MAX);
                if actual_bytes > max_bytes {
                    return Err(ObjectStoreError::TooLarge {
                        key: key.clone(),
                        max_bytes,
                        actual_bytes,
                    });
                }
            }
            let mut reader = output.body.into_async_read();
            let mut buffer = Vec::new();
            let mut total_bytes = 0usize;
            let mut chunk = [0u8; 8192];
            loop {
                let read = reader
                    .read(&mut chunk)
                    .await
                    .map_err(|err| ObjectStoreError::Io(err.to_string()))?;
                if read == 0 {
                    break;
                }
                total_bytes = total_bytes
                    .checked_add(read)
                    .ok_or_else(|| ObjectStoreError::Io("object size overflow".to_string()))?;
                if total_bytes > max_bytes {
                    return Err(ObjectStoreError::TooLarge {
                        key: key.clone(),
                        max_bytes,
                        actual_bytes: total_bytes,
                    });
                }
                buffer.extend_from_slice(&chunk[..read]);
            }
            Ok(buffer)
        })
    }
}
