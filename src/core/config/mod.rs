mod parsing;
mod secret;
mod settings;
mod types;

pub(crate) use types::{
    AdminSettings, AiProvider, AiSettings, ApiSettings, ConfigError, CorsSettings,
    DatabaseSettings, Environment, ExamSettings, RedisSettings, RuntimeSettings, SecuritySettings,
    Settings, TelemetrySettings,
};
