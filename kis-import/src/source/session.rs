//! Authenticated HTTP session against the KIS2 Django site

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, REFERER};

use super::SourceError;

/// CSRF token embedded in the Django login form
static CSRF_INPUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"name="csrfmiddlewaretoken" value="(.+?)""#).expect("static regex")
});

/// Connection settings for the legacy site
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub base_url: String,
    pub login_path: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl SessionConfig {
    /// Settings with default paths and timeouts
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        SessionConfig {
            base_url: base_url.into(),
            login_path: "/accounts/login/".to_string(),
            username: username.into(),
            password: password.into(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Extract the CSRF token from login page markup
pub fn extract_csrf_token(html: &str) -> Option<String> {
    CSRF_INPUT.captures(html).map(|caps| caps[1].to_string())
}

/// A logged-in session; cookies persist across requests
#[derive(Debug, Clone)]
pub struct Kis2Session {
    client: Client,
    base_url: String,
}

impl Kis2Session {
    /// Log in with the Django form flow
    ///
    /// Fetches the login page for its CSRF token (falling back to the
    /// `csrftoken` cookie), then posts the credentials. Landing back on the
    /// login page means the credentials were rejected.
    pub async fn login(config: &SessionConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| SourceError::Authentication(format!("failed to build HTTP client: {}", e)))?;

        let session = Kis2Session {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        };
        let login_url = session.url(&config.login_path);

        log::debug!("Fetching login page {}", login_url);
        let page = session
            .client
            .get(&login_url)
            .send()
            .await
            .map_err(|e| auth_error(&login_url, e))?;
        if !page.status().is_success() {
            return Err(SourceError::Authentication(format!(
                "login page answered with status {}",
                page.status()
            )));
        }

        let cookie_token = page
            .cookies()
            .find(|c| c.name() == "csrftoken")
            .map(|c| c.value().to_string());
        let markup = page.text().await.map_err(|e| auth_error(&login_url, e))?;
        let token = extract_csrf_token(&markup)
            .or(cookie_token)
            .ok_or_else(|| SourceError::Authentication("no CSRF token on the login page".to_string()))?;

        let response = session
            .client
            .post(&login_url)
            .header(REFERER, login_url.as_str())
            .form(&[
                ("username", config.username.as_str()),
                ("password", config.password.as_str()),
                ("csrfmiddlewaretoken", token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| auth_error(&login_url, e))?;

        if !response.status().is_success() {
            return Err(SourceError::Authentication(format!(
                "login answered with status {}",
                response.status()
            )));
        }
        if response.url().path().contains("/login/") {
            return Err(SourceError::Authentication(format!(
                "credentials for '{}' were rejected",
                config.username
            )));
        }

        log::info!("Logged in to {} as {}", session.base_url, config.username);
        Ok(session)
    }

    /// Absolute URL for a site path
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET a JSON document
    ///
    /// An HTML answer means the session was bounced to a login or error page.
    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value, SourceError> {
        let url = self.url(path);
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status { url, status: status.as_u16() });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        if content_type.contains("text/html") {
            return Err(SourceError::NotJson { url });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::from_reqwest(&url, e))?;
        serde_json::from_str(&body).map_err(|e| SourceError::Decode { url, message: e.to_string() })
    }
}

fn auth_error(url: &str, err: reqwest::Error) -> SourceError {
    SourceError::Authentication(SourceError::from_reqwest(url, err).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_csrf_token() {
        let html = r#"<form method="post"><input type="hidden" name="csrfmiddlewaretoken" value="abc123XYZ"><input name="username"></form>"#;
        assert_eq!(extract_csrf_token(html).as_deref(), Some("abc123XYZ"));
        assert_eq!(extract_csrf_token("<html></html>"), None);
    }

    #[test]
    fn test_url_joining() {
        let session = Kis2Session {
            client: Client::new(),
            base_url: "https://kis2.example.org".to_string(),
        };
        assert_eq!(session.url("/api/Countries/"), "https://kis2.example.org/api/Countries/");
        assert_eq!(session.url("api/Countries/"), "https://kis2.example.org/api/Countries/");
        assert_eq!(session.url("http://other/api/"), "http://other/api/");
    }
}
