//! Tests for error types

#[cfg(test)]
mod tests {
    use super::super::error::ScopeError;

    #[test]
    fn test_api_error() {
        let err = ScopeError::Api("request-manager unavailable".to_string());
        assert!(err.to_string().contains("API error"));
        assert!(err.to_string().contains("request-manager unavailable"));
    }

    #[test]
    fn test_auth_error() {
        let err = ScopeError::Auth("Not logged in".to_string());
        assert!(err.to_string().contains("Authentication error"));
    }

    #[test]
    fn test_config_error() {
        let err = ScopeError::Config("Missing password".to_string());
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_scrape_error() {
        let err = ScopeError::Scrape("no ticket in form".to_string());
        assert!(err.to_string().contains("Page scraping error"));
        assert!(err.to_string().contains("ticket"));
    }

    #[test]
    fn test_timeout() {
        let err = ScopeError::Timeout {
            what: "image engine".to_string(),
            secs: 60,
        };
        let msg = err.to_string();
        assert!(msg.contains("image engine"));
        assert!(msg.contains("60"));
    }

    #[test]
    fn test_not_found() {
        let err = ScopeError::NotFound("job 123456".to_string());
        assert!(err.to_string().contains("Not found"));
        assert!(err.to_string().contains("123456"));
    }

    #[test]
    fn test_solver_error() {
        let err = ScopeError::Solver("solve-field missing".to_string());
        assert!(err.to_string().contains("Solver error"));
    }

    #[test]
    fn test_coordinate_error() {
        let err = ScopeError::Coordinate("25:00:00".to_string());
        assert!(err.to_string().contains("Invalid coordinate"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ScopeError = io.into();
        assert!(matches!(err, ScopeError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_json_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ScopeError = parse.into();
        assert!(err.to_string().contains("JSON parsing error"));
    }

    #[test]
    fn test_error_is_debug() {
        let err = ScopeError::Catalog("test".to_string());
        let debug = format!("{:?}", err);
        assert!(debug.contains("Catalog"));
    }

    #[test]
    fn test_error_variants_distinct() {
        let api = ScopeError::Api("test".to_string());
        let auth = ScopeError::Auth("test".to_string());

        assert_ne!(api.to_string(), auth.to_string());
    }
}
