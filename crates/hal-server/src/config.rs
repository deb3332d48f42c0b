use std::path::PathBuf;

use anyhow::{Context, Result};

use hal_api::mailer::SmtpConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your_jwt_secret_here",
];

/// Server settings, read from `HAL_*` environment variables.
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub public_url: String,
    pub frontend_url: String,
    pub upload_dir: PathBuf,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
    pub smtp: Option<SmtpConfig>,
    pub admin: Option<(String, String)>,
    pub report_sweep_secs: u64,
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = var_or("HAL_JWT_SECRET", "");
        let port = var_or("HAL_PORT", "5001");
        let port: u16 = port.parse().with_context(|| format!("HAL_PORT is not a port: {port}"))?;
        let public_url = var_or("HAL_PUBLIC_URL", &format!("http://localhost:{port}"));

        let smtp = match (var("HAL_SMTP_HOST"), var("HAL_SMTP_USERNAME"), var("HAL_SMTP_PASSWORD")) {
            (Some(host), Some(username), Some(password)) => {
                let smtp_port = var_or("HAL_SMTP_PORT", "587");
                Some(SmtpConfig {
                    port: smtp_port
                        .parse()
                        .with_context(|| format!("HAL_SMTP_PORT is not a port: {smtp_port}"))?,
                    from: var("HAL_SMTP_FROM").unwrap_or_else(|| format!("Hal Kompleksi <{username}>")),
                    host,
                    username,
                    password,
                })
            }
            _ => None,
        };

        let report_sweep_secs = parse_sweep_secs(&var_or("HAL_REPORT_SWEEP_SECS", "3600"))?;

        Ok(Self {
            host: var_or("HAL_HOST", "0.0.0.0"),
            port,
            db_path: var_or("HAL_DB_PATH", "hal.db").into(),
            jwt_secret,
            frontend_url: var_or("HAL_FRONTEND_URL", &public_url),
            public_url,
            upload_dir: var_or("HAL_UPLOAD_DIR", "./uploads").into(),
            cors_origins: var("HAL_CORS_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or_default(),
            smtp,
            admin: var("HAL_ADMIN_EMAIL").zip(var("HAL_ADMIN_PASSWORD")),
            report_sweep_secs,
        })
    }

    pub fn has_usable_secret(&self) -> bool {
        !self.jwt_secret.is_empty() && !PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str())
    }
}

/// The sweep interval feeds `tokio::time::interval`, which panics on zero.
fn parse_sweep_secs(raw: &str) -> Result<u64> {
    let secs: u64 = raw
        .parse()
        .with_context(|| format!("HAL_REPORT_SWEEP_SECS is not a number: {raw}"))?;
    anyhow::ensure!(secs > 0, "HAL_REPORT_SWEEP_SECS must be at least 1");
    Ok(secs)
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_trimmed() {
        assert_eq!(
            parse_origins(" http://localhost:3000/, ,https://hal.example.com "),
            vec!["http://localhost:3000", "https://hal.example.com"]
        );
        assert!(parse_origins(",").is_empty());
    }

    #[test]
    fn sweep_interval_must_be_positive() {
        assert_eq!(parse_sweep_secs("3600").unwrap(), 3600);
        assert!(parse_sweep_secs("0").is_err());
        assert!(parse_sweep_secs("hourly").is_err());
    }
}
