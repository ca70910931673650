//! Gitea API data types.

use serde::{Deserialize, Serialize};

/// Entry returned by `GET /repos/{owner}/{repo}/contents/{filepath}`.
///
/// We define only the fields we need, which keeps deserialization resilient
/// to API changes.
///
/// API docs: https://docs.gitea.com/api/1.20/#tag/repository/operation/repoGetContents
#[derive(Debug, Clone, Deserialize)]
pub struct GiteaContent {
    pub name: String,
    pub path: String,
    pub sha: String,
    /// `file`, `dir`, `symlink` or `submodule`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: u64,
    pub encoding: Option<String>,
    pub content: Option<String>,
}

/// A file path answers with an object, a directory with an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GiteaContentsResponse {
    Directory(Vec<GiteaContent>),
    File(GiteaContent),
}

/// Body of `POST` (create) and `PUT` (update) on the contents endpoint.
#[derive(Debug, Serialize)]
pub struct GiteaFileOptions<'a> {
    pub content: String,
    pub message: &'a str,
    pub branch: &'a str,
    /// Required by `PUT`; absent on `POST`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<&'a str>,
}

/// Response to a create/update: the written file's metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct GiteaFileResponse {
    pub content: GiteaContent,
}
