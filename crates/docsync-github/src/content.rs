use base64::Engine;
use serde::Deserialize;

/// Response from GitHub's Git Blobs API.
/// `GET /repos/{owner}/{repo}/git/blobs/{sha}`
#[derive(Debug, Deserialize)]
pub struct BlobResponse {
    pub sha: String,
    pub content: String,
    pub encoding: String,
}

impl BlobResponse {
    /// Raw blob bytes.
    pub fn decode(&self) -> Result<Vec<u8>, String> {
        match self.encoding.as_str() {
            "base64" => {
                // GitHub returns base64 with newlines embedded
                let cleaned: String = self
                    .content
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                base64::engine::general_purpose::STANDARD
                    .decode(&cleaned)
                    .map_err(|e| format!("base64 decode failed: {e}"))
            }
            "utf-8" | "utf8" => Ok(self.content.clone().into_bytes()),
            other => Err(format!("unsupported blob encoding: {other}")),
        }
    }
}
