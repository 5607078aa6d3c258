use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use drive_core::StatusCode;

use super::remote::{ObjectPage, PermissionRole, RemoteError, RemoteObject, RemoteStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List {
        page_token: Option<String>,
    },
    Get {
        id: String,
    },
    CreateFolder {
        parent_id: String,
        name: String,
        result: Option<String>,
    },
    Copy {
        id: String,
        name: String,
        parent_id: String,
        result: Option<String>,
    },
    Grant {
        object_id: String,
        identity: String,
        role: PermissionRole,
        result: Option<String>,
    },
    Revoke {
        object_id: String,
        permission_id: String,
        ok: bool,
    },
}

#[derive(Default)]
struct State {
    next_id: u32,
    attempts: u32,
    throttled: u32,
    calls: Vec<Call>,
    pages: Vec<Vec<RemoteObject>>,
    objects: HashMap<String, RemoteObject>,
    fail_list: bool,
    fail_create: HashSet<String>,
    fail_copy: HashSet<String>,
    fail_grant: HashSet<String>,
    fail_revoke: HashSet<String>,
}

/// In-memory store that records every call and fails on request.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

fn api_error(status: StatusCode, body: &str) -> RemoteError {
    RemoteError::Api {
        status,
        body: body.to_string(),
        retry_after: None,
    }
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn throttle_next(&self, count: u32) {
        self.with_state(|s| s.throttled = count);
    }

    pub fn fail_list(&self) {
        self.with_state(|s| s.fail_list = true);
    }

    /// Folder creation fails for this folder name.
    pub fn fail_create(&self, name: &str) {
        self.with_state(|s| s.fail_create.insert(name.to_string()));
    }

    pub fn fail_copy(&self, id: &str) {
        self.with_state(|s| s.fail_copy.insert(id.to_string()));
    }

    pub fn fail_grant(&self, id: &str) {
        self.with_state(|s| s.fail_grant.insert(id.to_string()));
    }

    pub fn fail_revoke(&self, id: &str) {
        self.with_state(|s| s.fail_revoke.insert(id.to_string()));
    }

    pub fn push_page(&self, objects: Vec<RemoteObject>) {
        self.with_state(|s| s.pages.push(objects));
    }

    pub fn insert_object(&self, object: RemoteObject) {
        self.with_state(|s| s.objects.insert(object.id.clone(), object));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn attempts(&self) -> u32 {
        self.with_state(|s| s.attempts)
    }

    /// Successful folder creations as `(parent, name, new id)`.
    pub fn created_folders(&self) -> Vec<(String, String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::CreateFolder {
                    parent_id,
                    name,
                    result: Some(id),
                } => Some((parent_id, name, id)),
                _ => None,
            })
            .collect()
    }

    pub fn revokes_for(&self, object_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Revoke { object_id: id, .. } if id == object_id))
            .count()
    }

    // Every call passes through here first; throttled attempts are counted
    // but not recorded.
    fn begin(&self) -> Result<(), RemoteError> {
        self.with_state(|s| {
            s.attempts += 1;
            if s.throttled > 0 {
                s.throttled -= 1;
                return Err(api_error(StatusCode::TOO_MANY_REQUESTS, "rate limited"));
            }
            Ok(())
        })
    }

    fn next_id(&self, prefix: &str) -> String {
        self.with_state(|s| {
            s.next_id += 1;
            format!("{prefix}-{}", s.next_id)
        })
    }

    fn record(&self, call: Call) {
        self.with_state(|s| s.calls.push(call));
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    async fn list_objects(&self, page_token: Option<&str>) -> Result<ObjectPage, RemoteError> {
        self.begin()?;
        self.record(Call::List {
            page_token: page_token.map(str::to_string),
        });
        self.with_state(|s| {
            if s.fail_list {
                return Err(api_error(StatusCode::UNAUTHORIZED, "invalid credentials"));
            }
            let index = page_token
                .and_then(|t| t.strip_prefix("page-"))
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(0);
            let objects = s.pages.get(index).cloned().unwrap_or_default();
            let next_page_token = (index + 1 < s.pages.len()).then(|| format!("page-{}", index + 1));
            Ok(ObjectPage {
                objects,
                next_page_token,
            })
        })
    }

    async fn get_object(&self, id: &str) -> Result<RemoteObject, RemoteError> {
        self.begin()?;
        self.record(Call::Get { id: id.to_string() });
        self.with_state(|s| s.objects.get(id).cloned())
            .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "File not found"))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, RemoteError> {
        self.begin()?;
        let fails = self.with_state(|s| s.fail_create.contains(name));
        let result = (!fails).then(|| self.next_id("dst"));
        self.record(Call::CreateFolder {
            parent_id: parent_id.to_string(),
            name: name.to_string(),
            result: result.clone(),
        });
        result.ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "invalid parent"))
    }

    async fn copy_object(
        &self,
        id: &str,
        new_name: &str,
        new_parent_id: &str,
    ) -> Result<String, RemoteError> {
        self.begin()?;
        let fails = self.with_state(|s| s.fail_copy.contains(id));
        let result = (!fails).then(|| self.next_id("copy"));
        self.record(Call::Copy {
            id: id.to_string(),
            name: new_name.to_string(),
            parent_id: new_parent_id.to_string(),
            result: result.clone(),
        });
        result.ok_or_else(|| api_error(StatusCode::NOT_FOUND, "File not found"))
    }

    async fn grant_permission(
        &self,
        object_id: &str,
        identity: &str,
        role: PermissionRole,
    ) -> Result<String, RemoteError> {
        self.begin()?;
        let fails = self.with_state(|s| s.fail_grant.contains(object_id));
        let result = (!fails).then(|| self.next_id("perm"));
        self.record(Call::Grant {
            object_id: object_id.to_string(),
            identity: identity.to_string(),
            role,
            result: result.clone(),
        });
        result.ok_or_else(|| api_error(StatusCode::FORBIDDEN, "insufficientFilePermissions"))
    }

    async fn revoke_permission(
        &self,
        object_id: &str,
        permission_id: &str,
    ) -> Result<(), RemoteError> {
        self.begin()?;
        let fails = self.with_state(|s| s.fail_revoke.contains(object_id));
        self.record(Call::Revoke {
            object_id: object_id.to_string(),
            permission_id: permission_id.to_string(),
            ok: !fails,
        });
        if fails {
            return Err(api_error(StatusCode::BAD_REQUEST, "cannot delete permission"));
        }
        Ok(())
    }
}
