use anyhow::Context;
use std::env;

/// Runtime configuration, all supplied through the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub session_secret: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        let port = match env::var("PORT") {
            Ok(raw) => raw.parse::<u16>().context("PORT is not a valid port number")?,
            Err(_) => 3000,
        };
        Ok(Config {
            port,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL is not set")?,
            session_secret: env::var("SESSION_SECRET").context("SESSION_SECRET is not set")?,
        })
    }
}
