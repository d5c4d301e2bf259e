use crate::config::types::{Config, ImagesConfig, OutputConfig, PipelineConfig, SiteConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_pipeline_config(&config.pipeline)?;
    validate_site_config(&config.site)?;
    validate_images_config(&config.images)?;
    validate_output_config(&config.output)?;
    validate_categories(&config.categories)?;
    Ok(())
}

/// Validates worker pool and retry settings
fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.image_concurrency < 1 || config.image_concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "image_concurrency must be between 1 and 64, got {}",
            config.image_concurrency
        )));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1 when set".to_string(),
        ));
    }

    if config.max_consecutive_failures < 1 {
        return Err(ConfigError::Validation(
            "max_consecutive_failures must be >= 1".to_string(),
        ));
    }

    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.backoff_max_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_max_ms ({}) must be >= backoff_base_ms ({})",
            config.backoff_max_ms, config.backoff_base_ms
        )));
    }

    if config.request_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_ms must be >= 100ms, got {}ms",
            config.request_timeout_ms
        )));
    }

    Ok(())
}

/// Validates the target site description
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.category_param.is_empty() || config.page_param.is_empty() {
        return Err(ConfigError::Validation(
            "category_param and page_param cannot be empty".to_string(),
        ));
    }

    if config.category_param == config.page_param {
        return Err(ConfigError::Validation(format!(
            "category_param and page_param must differ, both are '{}'",
            config.page_param
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates image settings
fn validate_images_config(config: &ImagesConfig) -> Result<(), ConfigError> {
    if config.jpeg_quality < 1 || config.jpeg_quality > 100 {
        return Err(ConfigError::Validation(format!(
            "jpeg_quality must be between 1 and 100, got {}",
            config.jpeg_quality
        )));
    }

    if config.enabled && config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "images directory cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.csv_path.is_empty() {
        return Err(ConfigError::Validation("csv_path cannot be empty".to_string()));
    }

    if config.summary_path.is_empty() {
        return Err(ConfigError::Validation(
            "summary_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates category keys
fn validate_categories(categories: &[String]) -> Result<(), ConfigError> {
    if categories.is_empty() {
        return Err(ConfigError::Validation(
            "at least one category is required".to_string(),
        ));
    }

    for (i, category) in categories.iter().enumerate() {
        validate_category_key(category)?;

        if categories[..i].contains(category) {
            return Err(ConfigError::Validation(format!(
                "category '{}' is listed more than once",
                category
            )));
        }
    }

    Ok(())
}

/// Category keys end up in query strings and directory names
fn validate_category_key(category: &str) -> Result<(), ConfigError> {
    if category.is_empty() {
        return Err(ConfigError::Validation(
            "category key cannot be empty".to_string(),
        ));
    }

    if !category
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "category '{}' must contain only ASCII letters, digits, '-' or '_'",
            category
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_category_key() {
        assert!(validate_category_key("ps5").is_ok());
        assert!(validate_category_key("xbox-series-x").is_ok());
        assert!(validate_category_key("wii_u").is_ok());

        assert!(validate_category_key("").is_err());
        assert!(validate_category_key("../etc").is_err());
        assert!(validate_category_key("ps 5").is_err());
    }

    #[test]
    fn test_rejects_duplicate_and_empty_categories() {
        assert!(validate_categories(&[]).is_err());
        assert!(validate_categories(&["pc".to_string(), "pc".to_string()]).is_err());
        assert!(validate_categories(&["pc".to_string(), "ps5".to_string()]).is_ok());
    }

    #[test]
    fn test_rejects_bad_pipeline_settings() {
        let mut config = Config::default();
        config.pipeline.max_attempts = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.pipeline.max_pages = Some(0);
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.pipeline.backoff_max_ms = 10;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_bad_site_and_images() {
        let mut config = Config::default();
        config.site.base_url = "ftp://example.com/".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));

        let mut config = Config::default();
        config.site.page_param = "platform".to_string();
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.images.jpeg_quality = 0;
        assert!(validate(&config).is_err());
    }
}
