use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_PLACES_API_BASE: &str = "https://places.googleapis.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_REVIEWS_PER_ANALYSIS: usize = 20;
const DEFAULT_SCORE_SCALE: u8 = 5;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub openai_api_key: Option<SecretString>,
    pub openai_api_base: String,
    pub openai_model: String,
    pub google_places_api_key: Option<SecretString>,
    pub places_api_base: String,
    pub request_timeout_secs: u64,
    pub max_reviews_per_analysis: usize,
    pub score_scale: u8,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub openai_api_base: String,
    pub openai_model: String,
    pub places_api_base: String,
    pub request_timeout_secs: u64,
    pub max_reviews_per_analysis: usize,
    pub score_scale: u8,
    pub has_openai_key: bool,
    pub has_google_places_key: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            openai_api_key: secret_from_env("OPENAI_API_KEY"),
            openai_api_base: base_from_env("OPENAI_API_BASE", DEFAULT_OPENAI_API_BASE),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            google_places_api_key: secret_from_env("GOOGLE_PLACES_API_KEY"),
            places_api_base: base_from_env("PLACES_API_BASE", DEFAULT_PLACES_API_BASE),
            request_timeout_secs: parse_u64("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)
                .max(1),
            max_reviews_per_analysis: parse_usize(
                "MAX_REVIEWS_PER_ANALYSIS",
                DEFAULT_MAX_REVIEWS_PER_ANALYSIS,
            )
            .max(1),
            score_scale: parse_u8("SCORE_SCALE", DEFAULT_SCORE_SCALE).max(2),
        }
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            openai_api_base: self.openai_api_base.clone(),
            openai_model: self.openai_model.clone(),
            places_api_base: self.places_api_base.clone(),
            request_timeout_secs: self.request_timeout_secs,
            max_reviews_per_analysis: self.max_reviews_per_analysis,
            score_scale: self.score_scale,
            has_openai_key: self.openai_api_key.is_some(),
            has_google_places_key: self.google_places_api_key.is_some(),
        }
    }
}

fn secret_from_env(key: &str) -> Option<SecretString> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
}

fn base_from_env(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_u8(key: &str, default: u8) -> u8 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_public_profile_without_secrets() {
        env::set_var("OPENAI_API_KEY", "secret");
        env::set_var("GOOGLE_PLACES_API_KEY", "secret");
        env::set_var("OPENAI_MODEL", "custom-model");
        env::set_var("MAX_REVIEWS_PER_ANALYSIS", "7");

        let config = AppConfig::from_env();
        let public = config.public_profile();

        assert!(public.has_openai_key);
        assert!(public.has_google_places_key);
        assert_eq!(public.openai_model, "custom-model");
        assert_eq!(public.max_reviews_per_analysis, 7);
        assert_eq!(public.score_scale, DEFAULT_SCORE_SCALE);
        assert!(config.openai_api_key.is_some());

        env::remove_var("OPENAI_MODEL");
        env::remove_var("MAX_REVIEWS_PER_ANALYSIS");
    }

    #[test]
    fn trims_trailing_slash_from_endpoint_bases() {
        env::set_var("PLACES_API_BASE", "http://127.0.0.1:9999/v1/");
        let config = AppConfig::from_env();
        assert_eq!(config.places_api_base, "http://127.0.0.1:9999/v1");
        env::remove_var("PLACES_API_BASE");
    }
}
