use std::path::PathBuf;

use anyhow::Context;

/// Server settings, read from the environment (after `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub media_dir: PathBuf,
    pub public_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let host = var("CHORUS_HOST", "0.0.0.0");
        let port: u16 = var("CHORUS_PORT", "3000")
            .parse()
            .context("CHORUS_PORT must be a port number")?;
        let public_url = get("CHORUS_PUBLIC_URL").unwrap_or_else(|| format!("http://localhost:{}", port));

        Ok(Self {
            jwt_secret: var("CHORUS_JWT_SECRET", "dev-secret-change-me"),
            db_path: PathBuf::from(var("CHORUS_DB_PATH", "chorus.db")),
            host,
            port,
            media_dir: PathBuf::from(var("CHORUS_MEDIA_DIR", "./media")),
            public_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("chorus.db"));
        assert_eq!(config.public_url, "http://localhost:3000");
    }

    #[test]
    fn public_url_follows_port_unless_set() {
        let config = Config::from_lookup(lookup(&[("CHORUS_PORT", "8080")])).unwrap();
        assert_eq!(config.public_url, "http://localhost:8080");

        let config = Config::from_lookup(lookup(&[
            ("CHORUS_PORT", "8080"),
            ("CHORUS_PUBLIC_URL", "https://chat.example.org"),
        ]))
        .unwrap();
        assert_eq!(config.public_url, "https://chat.example.org");
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(Config::from_lookup(lookup(&[("CHORUS_PORT", "not-a-port")])).is_err());
    }
}
