/// Connection settings shared by every GitHub client in this crate.
#[derive(Debug, Clone)]
pub struct GitHubApi {
    client: reqwest::Client,
    token: Option<String>,
    api_base_url: Option<String>,
}

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const USER_AGENT: &str = "docsync";

impl GitHubApi {
    pub fn new(token: Option<String>, api_base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            api_base_url,
        }
    }

    pub fn api_base(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// `{api_base}/repos/{repo}/{path}`
    pub fn repo_url(&self, repo: &str, path: &str) -> String {
        format!("{}/repos/{repo}/{path}", self.api_base())
    }

    /// A request with the versioned REST headers and bearer auth when configured.
    pub fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");

        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        req
    }
}
