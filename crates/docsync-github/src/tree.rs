use serde::{Deserialize, Serialize};

/// Response from GitHub's Git Trees API.
/// `GET /repos/{owner}/{repo}/git/trees/{branch}?recursive=1`
#[derive(Debug, Deserialize)]
pub struct TreeResponse {
    pub sha: String,
    pub tree: Vec<TreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

/// A single entry in the tree.
#[derive(Debug, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub sha: String,
}

/// One entry of a `POST /git/trees` request. Carries either inline
/// `content` or the `sha` of an uploaded blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTreeEntry {
    pub path: String,
    pub mode: &'static str,
    #[serde(rename = "type")]
    pub entry_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

impl NewTreeEntry {
    pub fn inline(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: "100644",
            entry_type: "blob",
            content: Some(content.into()),
            sha: None,
        }
    }

    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: "100644",
            entry_type: "blob",
            content: None,
            sha: Some(sha.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateTree<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_tree: Option<&'a str>,
    pub tree: &'a [NewTreeEntry],
}
