#[cfg(test)]
mod tests {
    use crate::{load_agent_config, Args};
    use std::env;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Environment variables are process-wide
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env_vars() {
        for name in [
            "INTERCEPT_LISTEN_ADDR",
            "INTERCEPT_LISTEN_PORT",
            "INTERCEPT_BROWSER_WS",
            "INTERCEPT_MAX_SESSIONS",
            "INTERCEPT_MAX_INTERCEPTIONS",
            "INTERCEPT_MAX_BODY_SIZE",
            "INTERCEPT_RECOMPRESS_BODIES",
            "INTERCEPT_CAPTURE_ENABLED",
            "INTERCEPT_LOG_LEVEL",
            "INTERCEPT_LOG_JSON",
            "INTERCEPT_LOG_FILE",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_load_agent_config_defaults() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env_vars();

        let config = load_agent_config(&Args::default()).unwrap();

        assert_eq!(config.intercept.max_sessions, 3);
        assert_eq!(config.intercept.max_interceptions, 50);
        assert_eq!(config.intercept.max_body_size, 10 * 1024 * 1024);
        assert!(config.capture.enabled);
        assert_eq!(config.server.listen_addr, "127.0.0.1");
        assert_eq!(config.server.listen_port, 9230);
        assert!(config.server.headless);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_agent_config_from_cli() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env_vars();

        let args = Args {
            listen_port: Some(9300),
            browser_ws: Some("ws://127.0.0.1:9222/devtools/browser/abc".to_string()),
            headed: Some(true),
            max_interceptions: Some(5),
            recompress_bodies: Some(true),
            capture: Some(false),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        let config = load_agent_config(&args).unwrap();

        assert_eq!(config.server.listen_port, 9300);
        assert_eq!(
            config.server.browser_ws_url.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/browser/abc")
        );
        assert!(!config.server.headless);
        assert_eq!(config.intercept.max_interceptions, 5);
        assert!(config.intercept.recompress_bodies);
        assert!(!config.capture.enabled);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_agent_config_from_env() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env_vars();

        env::set_var("INTERCEPT_MAX_SESSIONS", "2");
        env::set_var("INTERCEPT_MAX_BODY_SIZE", "2097152");
        env::set_var("INTERCEPT_CAPTURE_ENABLED", "false");
        env::set_var("INTERCEPT_LOG_JSON", "true");

        let config = load_agent_config(&Args::default()).unwrap();

        assert_eq!(config.intercept.max_sessions, 2);
        assert_eq!(config.intercept.max_body_size, 2097152);
        assert!(!config.capture.enabled);
        assert!(config.logging.json_format);

        clear_env_vars();
    }

    #[test]
    fn test_load_agent_config_from_file() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env_vars();

        let mut temp_file = NamedTempFile::new().unwrap();
        let config_content = r#"{
            "intercept": {
                "max_patterns": 4,
                "max_interceptions": 20,
                "default_content_type": "text/plain"
            },
            "capture": {
                "max_requests_in_memory": 10,
                "request_ttl_secs": 60
            },
            "server": {
                "listen_port": 9400,
                "max_open_editors": 5
            }
        }"#;
        temp_file.write_all(config_content.as_bytes()).unwrap();

        let args = Args {
            config: Some(temp_file.path().to_path_buf()),
            ..Default::default()
        };

        let config = load_agent_config(&args).unwrap();

        assert_eq!(config.intercept.max_patterns, 4);
        assert_eq!(config.intercept.max_interceptions, 20);
        assert_eq!(config.intercept.default_content_type, "text/plain");
        // Unspecified fields keep their defaults
        assert_eq!(config.intercept.max_sessions, 3);
        assert_eq!(config.capture.max_requests_in_memory, 10);
        assert_eq!(config.capture.request_ttl_secs, 60);
        assert_eq!(config.server.listen_port, 9400);
        assert_eq!(config.server.max_open_editors, 5);
        assert_eq!(config.server.listen_addr, "127.0.0.1");
    }

    #[test]
    fn test_load_agent_config_precedence() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env_vars();

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(br#"{"intercept": {"max_interceptions": 10, "max_sessions": 1}}"#)
            .unwrap();
        env::set_var("INTERCEPT_MAX_INTERCEPTIONS", "15");
        env::set_var("INTERCEPT_MAX_SESSIONS", "2");

        let args = Args {
            config: Some(temp_file.path().to_path_buf()),
            max_interceptions: Some(25),
            ..Default::default()
        };

        let config = load_agent_config(&args).unwrap();

        // CLI beats environment, environment beats file
        assert_eq!(config.intercept.max_interceptions, 25);
        assert_eq!(config.intercept.max_sessions, 2);

        clear_env_vars();
    }

    #[test]
    fn test_load_agent_config_invalid_env_values() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env_vars();

        env::set_var("INTERCEPT_RECOMPRESS_BODIES", "sometimes");

        let result = load_agent_config(&Args::default());
        assert!(result.is_err());
        if let Err(e) = result {
            assert!(e.to_string().contains("Invalid INTERCEPT_RECOMPRESS_BODIES"));
        }

        clear_env_vars();
    }

    #[test]
    fn test_load_agent_config_validation_failure() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env_vars();

        let args = Args {
            max_interceptions: Some(0),
            ..Default::default()
        };
        let result = load_agent_config(&args);
        assert!(result.unwrap_err().to_string().contains("validation failed"));

        let args = Args {
            log_level: Some("loud".to_string()),
            ..Default::default()
        };
        assert!(load_agent_config(&args).is_err());
    }

    #[test]
    fn test_load_agent_config_missing_file() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env_vars();

        let args = Args {
            config: Some("/nonexistent/intercept-agent.json".into()),
            ..Default::default()
        };
        let err = load_agent_config(&args).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_listen_socket() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env_vars();

        let config = load_agent_config(&Args {
            listen_addr: Some("0.0.0.0".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(config.listen_socket().unwrap().to_string(), "0.0.0.0:9230");
    }
}
