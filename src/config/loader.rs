//! Configuration loading from the process environment.

use std::path::PathBuf;
use std::str::FromStr;

use crate::config::schema::Configuration;
use crate::config::validation::normalize;

pub const STORAGE_DATABASE: &str = "BOB_STORAGE_DATABASE";
pub const STORAGE_HOST: &str = "BOB_STORAGE_HOST";
pub const STORAGE_PORT: &str = "BOB_STORAGE_PORT";
pub const STORAGE_USER: &str = "BOB_STORAGE_USER";
pub const STORAGE_PASSWORD: &str = "BOB_STORAGE_PASSWORD";
pub const QUEUE_HOST: &str = "BOB_QUEUE_HOST";
pub const QUEUE_PORT: &str = "BOB_QUEUE_PORT";
pub const QUEUE_USER: &str = "BOB_QUEUE_USER";
pub const QUEUE_PASSWORD: &str = "BOB_QUEUE_PASSWORD";
pub const API_HOST: &str = "BOB_API_HOST";
pub const API_PORT: &str = "BOB_API_PORT";
pub const API_SPEC: &str = "BOB_API_SPEC";
pub const HEALTH_CHECK_FREQ: &str = "BOB_HEALTH_CHECK_FREQ";
pub const CONNECTION_RETRY_ATTEMPTS: &str = "BOB_CONNECTION_RETRY_ATTEMPTS";
pub const CONNECTION_RETRY_DELAY: &str = "BOB_CONNECTION_RETRY_DELAY";

impl Configuration {
    /// Load configuration from the process environment.
    ///
    /// Never fails: absent variables take their defaults.
    pub fn load() -> Self {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn load_from<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let defaults = Configuration::default();

        let mut config = defaults.clone();

        config.storage.database = env.string(STORAGE_DATABASE, defaults.storage.database);
        config.storage.host = env.string(STORAGE_HOST, defaults.storage.host);
        config.storage.port = env.number(STORAGE_PORT, defaults.storage.port);
        config.storage.user = env.string(STORAGE_USER, defaults.storage.user);
        config.storage.password = env.string(STORAGE_PASSWORD, defaults.storage.password);

        config.queue.host = env.string(QUEUE_HOST, defaults.queue.host);
        config.queue.port = env.number(QUEUE_PORT, defaults.queue.port);
        config.queue.user = env.string(QUEUE_USER, defaults.queue.user);
        config.queue.password = env.string(QUEUE_PASSWORD, defaults.queue.password);

        config.api.host = env.string(API_HOST, defaults.api.host);
        config.api.port = env.number(API_PORT, defaults.api.port);
        config.api.spec_path = env
            .lookup(API_SPEC)
            .map(PathBuf::from)
            .unwrap_or(defaults.api.spec_path);

        config.health_check.interval_ms =
            env.number(HEALTH_CHECK_FREQ, defaults.health_check.interval_ms);

        config.connection.retry_attempts =
            env.number(CONNECTION_RETRY_ATTEMPTS, defaults.connection.retry_attempts);
        config.connection.retry_delay_ms =
            env.number(CONNECTION_RETRY_DELAY, defaults.connection.retry_delay_ms);

        normalize(&mut config);
        config
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn lookup(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn string(&self, key: &str, default: String) -> String {
        self.lookup(key).unwrap_or(default)
    }

    /// Integer settings fall back to their default when malformed.
    fn number<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + std::fmt::Display + Copy,
    {
        let Some(raw) = self.lookup(key) else {
            return default;
        };

        match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(
                    variable = key,
                    value = %raw,
                    default = %default,
                    "Ignoring malformed integer setting"
                );
                default
            }
        }
    }
}
