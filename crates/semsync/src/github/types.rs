//! GitHub contents API data types.

use serde::{Deserialize, Serialize};

/// An entry returned by `GET /repos/{owner}/{repo}/contents/{path}`.
///
/// API docs: https://docs.github.com/en/rest/repos/contents#get-repository-content
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubContent {
    pub name: String,
    pub path: String,
    /// Blob sha, used as the version token.
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    /// `file`, `dir`, `symlink` or `submodule`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Base64 content, only present for single-file responses.
    pub content: Option<String>,
    pub encoding: Option<String>,
}

/// The contents endpoint returns an object for a file and an array for a directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ContentsResponse {
    Directory(Vec<GitHubContent>),
    File(GitHubContent),
}

/// Body of `PUT /repos/{owner}/{repo}/contents/{path}`.
#[derive(Debug, Serialize)]
pub struct PutContentsRequest<'a> {
    pub message: &'a str,
    pub content: String,
    /// Required when updating; omitted to create.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<&'a str>,
    pub branch: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PutContentsResponse {
    pub content: CommittedContent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommittedContent {
    pub path: String,
    pub sha: String,
}
