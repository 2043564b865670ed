use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub database_path: String,
    pub app_origins: String,
    pub import_: ImportConfig,
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// 进程级并发导入上限（跨词库）
    pub concurrency: usize,
    /// 每批写入 Store 的记录数
    pub batch_size: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 8000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            database_path: env_or("DATABASE_URL", "./wordflow.db"),
            app_origins: env_or("APP_ORIGINS", "http://localhost:5173"),
            import_: ImportConfig {
                concurrency: env_or_parse("IMPORT_CONCURRENCY", 2_usize).max(1),
                batch_size: env_or_parse(
                    "IMPORT_BATCH_SIZE",
                    crate::constants::IMPORT_BATCH_SIZE,
                )
                .max(1),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use super::*;

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn managed_keys() -> &'static [&'static str] {
        &[
            "HOST",
            "PORT",
            "RUST_LOG",
            "DATABASE_URL",
            "APP_ORIGINS",
            "IMPORT_CONCURRENCY",
            "IMPORT_BATCH_SIZE",
        ]
    }

    fn clear_keys(keys: &[&str]) {
        for key in keys {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_when_missing() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.database_path, "./wordflow.db");
        assert_eq!(cfg.import_.concurrency, 2);
    }

    #[test]
    fn parses_numeric_values() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "4000");
        env::set_var("IMPORT_CONCURRENCY", "4");
        env::set_var("IMPORT_BATCH_SIZE", "100");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.import_.concurrency, 4);
        assert_eq!(cfg.import_.batch_size, 100);
    }

    #[test]
    fn invalid_values_fall_back() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "bad");
        env::set_var("IMPORT_CONCURRENCY", "x");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.import_.concurrency, 2);
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("IMPORT_CONCURRENCY", "0");
        let cfg = Config::from_env();
        assert_eq!(cfg.import_.concurrency, 1);
    }
}
