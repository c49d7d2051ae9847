use super::parsing::{
    env_optional, env_or_default, parse_ai_provider, parse_bool, parse_cors_origins,
    parse_environment, parse_f64, parse_key_list, parse_u16, parse_u32, parse_u64,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    AdminSettings, AiProvider, AiSettings, ApiSettings, ConfigError, CorsSettings,
    DatabaseSettings, ExamSettings, RedisSettings, RuntimeSettings, SecuritySettings, ServerHost,
    ServerPort, ServerSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAMON_HOST", "0.0.0.0");
        let port = env_or_default("EXAMON_PORT", "8000");

        let environment =
            parse_environment(env_optional("EXAMON_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("EXAMON_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Examon API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };

        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "10080"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "examon");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "examon_db");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let ai_provider = parse_ai_provider(env_optional("AI_PROVIDER"))?;
        let openai_api_keys = parse_key_list(env_optional("OPENAI_API_KEYS"));
        let openai_base_url = env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1");
        let openai_model = env_or_default("OPENAI_MODEL", "gpt-4o-mini");
        let gemini_api_keys = parse_key_list(env_optional("GEMINI_API_KEYS"));
        let gemini_base_url =
            env_or_default("GEMINI_BASE_URL", "https://generativelanguage.googleapis.com/v1beta");
        let gemini_model = env_or_default("GEMINI_MODEL", "gemini-2.0-flash");
        let ai_max_tokens = parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "2048"))?;
        let ai_temperature =
            parse_f64("AI_TEMPERATURE", env_or_default("AI_TEMPERATURE", "0.0"))?;
        let ai_request_timeout =
            parse_u64("AI_REQUEST_TIMEOUT", env_or_default("AI_REQUEST_TIMEOUT", "120"))?;

        let save_min_interval_seconds = parse_u64(
            "SAVE_MIN_INTERVAL_SECONDS",
            env_or_default("SAVE_MIN_INTERVAL_SECONDS", "2"),
        )?;

        let first_superuser_email = env_or_default("FIRST_SUPERUSER_EMAIL", "admin@examon.local");
        let first_superuser_password = env_or_default("FIRST_SUPERUSER_PASSWORD", "");

        let log_level = env_or_default("EXAMON_LOG_LEVEL", "info");
        let json = env_optional("EXAMON_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            ai: AiSettings {
                provider: ai_provider,
                openai_api_keys,
                openai_base_url,
                openai_model,
                gemini_api_keys,
                gemini_base_url,
                gemini_model,
                ai_max_tokens,
                ai_temperature,
                ai_request_timeout,
            },
            exam: ExamSettings { save_min_interval_seconds },
            admin: AdminSettings { first_superuser_email, first_superuser_password },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn admin(&self) -> &AdminSettings {
        &self.admin
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ai.ai_temperature < 0.0 || self.ai.ai_temperature > 2.0 {
            return Err(ConfigError::InvalidValue {
                field: "AI_TEMPERATURE",
                value: self.ai.ai_temperature.to_string(),
            });
        }

        if self.ai.ai_request_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "AI_REQUEST_TIMEOUT",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        match self.ai.provider {
            AiProvider::OpenAi if self.ai.openai_api_keys.is_empty() => {
                return Err(ConfigError::MissingSecret("OPENAI_API_KEYS"));
            }
            AiProvider::Gemini if self.ai.gemini_api_keys.is_empty() => {
                return Err(ConfigError::MissingSecret("GEMINI_API_KEYS"));
            }
            _ => {}
        }
        if self.admin.first_superuser_password.is_empty() {
            return Err(ConfigError::MissingSecret("FIRST_SUPERUSER_PASSWORD"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn load_applies_defaults() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.server_port(), 8000);
        assert_eq!(settings.api().api_v1_str, "/api/v1");
        assert_eq!(settings.ai().provider, AiProvider::OpenAi);
        assert_eq!(settings.ai().openai_api_keys.len(), 2);
        assert!(!settings.telemetry().prometheus_enabled);
    }

    #[test]
    fn strict_config_requires_provider_keys() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::set_var("EXAMON_STRICT_CONFIG", "1");
        std::env::set_var("POSTGRES_PASSWORD", "pw");
        std::env::set_var("FIRST_SUPERUSER_PASSWORD", "pw");
        std::env::remove_var("OPENAI_API_KEYS");

        let result = Settings::load();
        assert!(matches!(result, Err(ConfigError::MissingSecret("OPENAI_API_KEYS"))));

        std::env::remove_var("EXAMON_STRICT_CONFIG");
        std::env::remove_var("POSTGRES_PASSWORD");
        std::env::remove_var("FIRST_SUPERUSER_PASSWORD");
    }
}
