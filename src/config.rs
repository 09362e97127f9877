use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub ttl_minutes: i64,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// HTTP relay endpoint; when absent, mail is logged instead of delivered.
    pub endpoint: Option<String>,
    pub from: String,
}

/// OAuth client credentials for one federated provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Public origin used to build OAuth callback URLs.
    pub base_url: String,
    pub session: SessionConfig,
    pub mail: MailConfig,
    pub google: Option<ProviderConfig>,
    pub twitter: Option<ProviderConfig>,
    pub github: Option<ProviderConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let base_url = std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into());
        let session = SessionConfig {
            ttl_minutes: std::env::var("SESSION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 7),
            cookie_secure: std::env::var("SESSION_COOKIE_SECURE")
                .map(|v| v == "true")
                .unwrap_or(false),
        };
        let mail = MailConfig {
            endpoint: std::env::var("MAIL_ENDPOINT").ok(),
            from: std::env::var("MAIL_FROM")
                .unwrap_or_else(|_| "Inkpress <no-reply@inkpress.dev>".into()),
        };
        Ok(Self {
            database_url,
            base_url,
            session,
            mail,
            google: provider_from_env("GOOGLE"),
            twitter: provider_from_env("TWITTER"),
            github: provider_from_env("GITHUB"),
        })
    }
}

fn provider_from_env(prefix: &str) -> Option<ProviderConfig> {
    let client_id = std::env::var(format!("{prefix}_CLIENT_ID")).ok()?;
    let client_secret = std::env::var(format!("{prefix}_CLIENT_SECRET")).ok()?;
    Some(ProviderConfig {
        client_id,
        client_secret,
    })
}
