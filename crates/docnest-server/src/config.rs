use std::env;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string, or `memory` for the in-process store.
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expires_in: i64,
    pub port: u16,
    pub base_url: String,
    pub root_title: String,
    pub search: SearchConfig,
    pub admin: Option<AdminBootstrap>,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub enabled: bool,
    pub url: String,
    pub api_key: String,
    pub index_name: String,
}

#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let admin = match (env::var("ADMIN_USERNAME"), env::var("ADMIN_PASSWORD")) {
            (Ok(username), Ok(password)) => Some(AdminBootstrap { username, password }),
            _ => None,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            jwt_expires_in: env::var("JWT_EXPIRES_IN")
                .unwrap_or_else(|_| "900".to_string()) // 15 minutes
                .parse()
                .context("JWT_EXPIRES_IN must be a number of seconds")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("PORT must be a valid port number")?,
            base_url: env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost".to_string())
                .trim_end_matches('/')
                .to_string(),
            root_title: env::var("ROOT_TITLE").unwrap_or_else(|_| "Home".to_string()),
            search: SearchConfig {
                enabled: parse_flag(env::var("SEARCH_ENABLED").ok().as_deref(), true)?,
                url: env::var("MEILISEARCH_URL")
                    .unwrap_or_else(|_| "http://localhost:7700".to_string()),
                api_key: env::var("MEILISEARCH_API_KEY").unwrap_or_default(),
                index_name: env::var("MEILISEARCH_INDEX").unwrap_or_else(|_| "docs".to_string()),
            },
            admin,
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == "memory"
    }
}

fn parse_flag(value: Option<&str>, default: bool) -> anyhow::Result<bool> {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => anyhow::bail!("invalid boolean flag: {other}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_spellings() {
        assert!(parse_flag(Some("TRUE"), false).unwrap());
        assert!(!parse_flag(Some("off"), true).unwrap());
        assert!(parse_flag(None, true).unwrap());
        assert!(parse_flag(Some("maybe"), true).is_err());
    }
}
