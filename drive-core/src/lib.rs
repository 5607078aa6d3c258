mod client;

pub use client::{
    ApiErrorClass, Capabilities, DriveClient, DriveError, DriveFile, FOLDER_MIME_TYPE, FileList,
    Permission, PermissionRequest, PermissionRole,
};
pub use reqwest::StatusCode;
