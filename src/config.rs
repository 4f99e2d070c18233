use crate::errors::AppError;

/// Immutable process configuration, assembled once at startup and carried in
/// `AppState`. The authorization engine and token service never read the
/// environment themselves.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Default page size for bitacora queries.
    pub page_size: i64,
    /// Hard ceiling for consumer-supplied page sizes.
    pub max_page_size: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            page_size: 30,
            max_page_size: 100,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let port = match std::env::var("APP_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .map_err(|_| AppError::configuration("APP_PORT must be a valid port number"))?,
            Err(_) => defaults.port,
        };

        let page_size = match std::env::var("PAGE_SIZE") {
            Ok(value) => value
                .parse::<i64>()
                .map_err(|_| AppError::configuration("PAGE_SIZE must be a valid integer"))?,
            Err(_) => defaults.page_size,
        };

        Ok(Self {
            port,
            page_size,
            max_page_size: defaults.max_page_size,
        })
    }

    /// Clamp a consumer-supplied page size into [1, max_page_size], falling
    /// back to the default when absent.
    pub fn clamp_page_size(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.page_size)
            .clamp(1, self.max_page_size)
    }
}
