use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::config::ProviderConfig;

/// Federated identity providers. All of them resolve to the same normalized
/// profile shape; the per-provider differences live in [`Descriptor`] data
/// and [`extract_profile`], not in separate control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Google,
    Twitter,
    Github,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Twitter => "twitter",
            Self::Github => "github",
        }
    }

    fn descriptor(self) -> &'static Descriptor {
        match self {
            Self::Google => &GOOGLE,
            Self::Twitter => &TWITTER,
            Self::Github => &GITHUB,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Self::Google),
            "twitter" => Ok(Self::Twitter),
            "github" => Ok(Self::Github),
            _ => Err(()),
        }
    }
}

struct Descriptor {
    authorize_url: &'static str,
    token_url: &'static str,
    profile_url: &'static str,
    scopes: &'static str,
    /// Providers that require PKCE on the authorization-code exchange.
    pkce: bool,
}

static GOOGLE: Descriptor = Descriptor {
    authorize_url: "https://accounts.google.com/o/oauth2/v2/auth",
    token_url: "https://oauth2.googleapis.com/token",
    profile_url: "https://www.googleapis.com/oauth2/v2/userinfo",
    scopes: "openid email profile",
    pkce: false,
};

static TWITTER: Descriptor = Descriptor {
    authorize_url: "https://twitter.com/i/oauth2/authorize",
    token_url: "https://api.twitter.com/2/oauth2/token",
    profile_url: "https://api.twitter.com/2/users/me?user.fields=profile_image_url",
    scopes: "users.read tweet.read",
    pkce: true,
};

static GITHUB: Descriptor = Descriptor {
    authorize_url: "https://github.com/login/oauth/authorize",
    token_url: "https://github.com/login/oauth/access_token",
    profile_url: "https://api.github.com/user",
    scopes: "user:email",
    pkce: false,
};

/// Provider-asserted identity, reduced to the one shape the reconciliation
/// engine understands.
#[derive(Debug, Clone)]
pub struct NormalizedProfile {
    pub external_id: String,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

/// Build the provider's authorize redirect. `state` doubles as the PKCE
/// plain-text challenge for providers that demand one.
pub fn authorize_url(
    provider: Provider,
    config: &ProviderConfig,
    redirect_uri: &str,
    state: &str,
) -> String {
    let desc = provider.descriptor();
    let mut url = Url::parse(desc.authorize_url).expect("static authorize url");
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", desc.scopes)
        .append_pair("state", state);
    if desc.pkce {
        url.query_pairs_mut()
            .append_pair("code_challenge", state)
            .append_pair("code_challenge_method", "plain");
    }
    url.to_string()
}

/// Normalize a provider's raw profile JSON.
pub fn extract_profile(provider: Provider, raw: &Value) -> anyhow::Result<NormalizedProfile> {
    let profile = match provider {
        Provider::Google => NormalizedProfile {
            external_id: raw["id"]
                .as_str()
                .map(str::to_string)
                .context("google profile missing id")?,
            display_name: raw["name"].as_str().map(str::to_string),
            username: None,
            email: raw["email"].as_str().map(str::to_string),
            avatar_url: raw["picture"].as_str().map(str::to_string),
        },
        Provider::Twitter => {
            let data = &raw["data"];
            NormalizedProfile {
                external_id: data["id"]
                    .as_str()
                    .map(str::to_string)
                    .context("twitter profile missing id")?,
                display_name: data["name"].as_str().map(str::to_string),
                username: data["username"].as_str().map(str::to_string),
                email: None,
                avatar_url: data["profile_image_url"].as_str().map(str::to_string),
            }
        }
        Provider::Github => NormalizedProfile {
            external_id: raw["id"]
                .as_u64()
                .map(|id| id.to_string())
                .context("github profile missing id")?,
            display_name: raw["name"].as_str().map(str::to_string),
            username: raw["login"].as_str().map(str::to_string),
            email: raw["email"].as_str().map(str::to_string),
            avatar_url: raw["avatar_url"].as_str().map(str::to_string),
        },
    };
    Ok(profile)
}

/// Runs the authorization-code exchange against the real provider endpoints.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn fetch_profile(
        &self,
        provider: Provider,
        config: &ProviderConfig,
        code: &str,
        redirect_uri: &str,
        verifier: &str,
    ) -> anyhow::Result<NormalizedProfile>;
}

pub struct OAuthClient {
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for OAuthClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for OAuthClient {
    async fn fetch_profile(
        &self,
        provider: Provider,
        config: &ProviderConfig,
        code: &str,
        redirect_uri: &str,
        verifier: &str,
    ) -> anyhow::Result<NormalizedProfile> {
        let desc = provider.descriptor();

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ];
        if desc.pkce {
            form.push(("code_verifier", verifier));
        }

        let token: Value = self
            .http
            .post(desc.token_url)
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .context("token exchange request")?
            .error_for_status()
            .context("token exchange status")?
            .json()
            .await
            .context("token exchange body")?;
        let access_token = token["access_token"]
            .as_str()
            .context("token response missing access_token")?;

        let raw: Value = self
            .http
            .get(desc.profile_url)
            .bearer_auth(access_token)
            .header(USER_AGENT, "inkpress")
            .header(ACCEPT, "application/json")
            .send()
            .await
            .context("profile request")?
            .error_for_status()
            .context("profile status")?
            .json()
            .await
            .context("profile body")?;

        extract_profile(provider, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ProviderConfig {
        ProviderConfig {
            client_id: "client-123".into(),
            client_secret: "hush".into(),
        }
    }

    #[test]
    fn provider_round_trips_through_str() {
        for provider in [Provider::Google, Provider::Twitter, Provider::Github] {
            assert_eq!(provider.as_str().parse::<Provider>(), Ok(provider));
        }
        assert!("facebook".parse::<Provider>().is_err());
    }

    #[test]
    fn authorize_url_carries_client_state_and_scopes() {
        let url = authorize_url(
            Provider::Google,
            &config(),
            "http://localhost:8080/auth/google/callback",
            "state-xyz",
        );
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("state=state-xyz"));
        assert!(url.contains("scope=openid+email+profile"));
        assert!(!url.contains("code_challenge"));
    }

    #[test]
    fn twitter_authorize_url_includes_pkce_challenge() {
        let url = authorize_url(
            Provider::Twitter,
            &config(),
            "http://localhost:8080/auth/twitter/callback",
            "state-xyz",
        );
        assert!(url.contains("code_challenge=state-xyz"));
        assert!(url.contains("code_challenge_method=plain"));
    }

    #[test]
    fn extracts_google_profile() {
        let raw = json!({
            "id": "109",
            "name": "Ada Lovelace",
            "email": "Ada@Example.com",
            "picture": "https://lh3.example/ada.png",
        });
        let profile = extract_profile(Provider::Google, &raw).unwrap();
        assert_eq!(profile.external_id, "109");
        assert_eq!(profile.display_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(profile.email.as_deref(), Some("Ada@Example.com"));
        assert_eq!(profile.username, None);
    }

    #[test]
    fn extracts_github_profile_with_null_name_and_email() {
        let raw = json!({
            "id": 99,
            "login": "octocat",
            "name": null,
            "email": null,
            "avatar_url": "https://avatars.example/99",
        });
        let profile = extract_profile(Provider::Github, &raw).unwrap();
        assert_eq!(profile.external_id, "99");
        assert_eq!(profile.display_name, None);
        assert_eq!(profile.username.as_deref(), Some("octocat"));
        assert_eq!(profile.email, None);
        assert_eq!(profile.avatar_url.as_deref(), Some("https://avatars.example/99"));
    }

    #[test]
    fn extracts_twitter_profile_from_data_envelope() {
        let raw = json!({
            "data": {
                "id": "2244994945",
                "name": "Tess",
                "username": "tess_dev",
                "profile_image_url": "https://pbs.example/tess.jpg",
            }
        });
        let profile = extract_profile(Provider::Twitter, &raw).unwrap();
        assert_eq!(profile.external_id, "2244994945");
        assert_eq!(profile.username.as_deref(), Some("tess_dev"));
        assert_eq!(profile.email, None);
    }

    #[test]
    fn missing_external_id_is_an_error() {
        assert!(extract_profile(Provider::Google, &json!({"name": "x"})).is_err());
        assert!(extract_profile(Provider::Github, &json!({"login": "x"})).is_err());
    }
}
