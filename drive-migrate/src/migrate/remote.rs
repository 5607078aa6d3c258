//! Capability surface of the remote object store.
//!
//! The migration phases only see [`RemoteStore`]. [`DriveStore`] binds it to
//! the Drive REST client and [`Retrying`] adds backoff on throttling.

use std::future::Future;

use async_trait::async_trait;
use drive_core::{DriveClient, DriveFile, PermissionRequest};

use super::backoff::RetryPolicy;

pub use drive_core::{DriveError as RemoteError, PermissionRole};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
    pub parent_ids: Vec<String>,
    pub can_share: bool,
    pub can_copy: bool,
}

impl From<DriveFile> for RemoteObject {
    fn from(file: DriveFile) -> Self {
        Self {
            is_folder: file.is_folder(),
            can_share: file.can_share(),
            can_copy: file.can_copy(),
            id: file.id,
            name: file.name,
            parent_ids: file.parents,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<RemoteObject>,
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_objects(&self, page_token: Option<&str>) -> Result<ObjectPage, RemoteError>;

    async fn get_object(&self, id: &str) -> Result<RemoteObject, RemoteError>;

    /// Returns the id of the new folder.
    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, RemoteError>;

    /// Returns the id of the copy.
    async fn copy_object(
        &self,
        id: &str,
        new_name: &str,
        new_parent_id: &str,
    ) -> Result<String, RemoteError>;

    /// Returns the permission id needed to revoke the grant.
    async fn grant_permission(
        &self,
        object_id: &str,
        identity: &str,
        role: PermissionRole,
    ) -> Result<String, RemoteError>;

    async fn revoke_permission(
        &self,
        object_id: &str,
        permission_id: &str,
    ) -> Result<(), RemoteError>;
}

pub struct DriveStore {
    client: DriveClient,
    page_size: u32,
}

impl DriveStore {
    pub fn new(client: DriveClient, page_size: u32) -> Self {
        Self { client, page_size }
    }
}

#[async_trait]
impl RemoteStore for DriveStore {
    async fn list_objects(&self, page_token: Option<&str>) -> Result<ObjectPage, RemoteError> {
        let page = self.client.list_files(self.page_size, page_token).await?;
        Ok(ObjectPage {
            objects: page.files.into_iter().map(RemoteObject::from).collect(),
            next_page_token: page.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn get_object(&self, id: &str) -> Result<RemoteObject, RemoteError> {
        Ok(self.client.get_file(id).await?.into())
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, RemoteError> {
        Ok(self.client.create_folder(parent_id, name).await?.id)
    }

    async fn copy_object(
        &self,
        id: &str,
        new_name: &str,
        new_parent_id: &str,
    ) -> Result<String, RemoteError> {
        Ok(self.client.copy_file(id, new_name, new_parent_id).await?.id)
    }

    async fn grant_permission(
        &self,
        object_id: &str,
        identity: &str,
        role: PermissionRole,
    ) -> Result<String, RemoteError> {
        let request = PermissionRequest::user(identity, role);
        Ok(self.client.create_permission(object_id, &request).await?.id)
    }

    async fn revoke_permission(
        &self,
        object_id: &str,
        permission_id: &str,
    ) -> Result<(), RemoteError> {
        self.client.delete_permission(object_id, permission_id).await
    }
}

/// Which failures a call may be repeated after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryOn {
    /// Rate limiting only. Used for calls that create something remotely.
    Throttling,
    /// Rate limiting and transient server errors.
    Transient,
}

impl RetryOn {
    fn allows(self, err: &RemoteError) -> bool {
        match self {
            RetryOn::Throttling => err.is_rate_limited(),
            RetryOn::Transient => err.is_retryable(),
        }
    }
}

/// Retries failed calls per [`RetryPolicy`]. Reads and revokes are repeated
/// after any retryable error. Folder creation, copies and grants are only
/// repeated when throttled, since a 5xx answer does not prove nothing was
/// created.
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: RemoteStore> Retrying<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    async fn run<'a, T, F, Fut>(
        &'a self,
        operation: &'static str,
        retry_on: RetryOn,
        mut call: F,
    ) -> Result<T, RemoteError>
    where
        F: FnMut(&'a S) -> Fut + Send,
        Fut: Future<Output = Result<T, RemoteError>> + Send,
        T: Send,
    {
        let mut attempt = 0u32;
        loop {
            match call(&self.inner).await {
                Ok(value) => return Ok(value),
                Err(err) if retry_on.allows(&err) && attempt + 1 < self.policy.max_attempts() => {
                    let delay = self.policy.delay(attempt, err.retry_after_secs());
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "remote call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for Retrying<S> {
    async fn list_objects(&self, page_token: Option<&str>) -> Result<ObjectPage, RemoteError> {
        self.run("list_objects", RetryOn::Transient, move |store| {
            store.list_objects(page_token)
        })
        .await
    }

    async fn get_object(&self, id: &str) -> Result<RemoteObject, RemoteError> {
        self.run("get_object", RetryOn::Transient, move |store| store.get_object(id))
            .await
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, RemoteError> {
        self.run("create_folder", RetryOn::Throttling, move |store| {
            store.create_folder(parent_id, name)
        })
        .await
    }

    async fn copy_object(
        &self,
        id: &str,
        new_name: &str,
        new_parent_id: &str,
    ) -> Result<String, RemoteError> {
        self.run("copy_object", RetryOn::Throttling, move |store| {
            store.copy_object(id, new_name, new_parent_id)
        })
        .await
    }

    async fn grant_permission(
        &self,
        object_id: &str,
        identity: &str,
        role: PermissionRole,
    ) -> Result<String, RemoteError> {
        self.run("grant_permission", RetryOn::Throttling, move |store| {
            store.grant_permission(object_id, identity, role)
        })
        .await
    }

    async fn revoke_permission(
        &self,
        object_id: &str,
        permission_id: &str,
    ) -> Result<(), RemoteError> {
        self.run("revoke_permission", RetryOn::Transient, move |store| {
            store.revoke_permission(object_id, permission_id)
        })
        .await
    }
}
