#[cfg(test)]
mod tests {
    use super::super::*;
    use std::fs;
    use tempfile::tempdir;

    /// Keychain with one fixed entry
    struct StaticKeychain(&'static str, AuthConfig);

    impl Keychain for StaticKeychain {
        fn resolve(&self, host: &str) -> Result<AuthConfig> {
            if host == self.0 {
                Ok(self.1.clone())
            } else {
                Ok(AuthConfig::anonymous())
            }
        }
    }

    fn no_credentials() -> StaticKeychain {
        StaticKeychain("", AuthConfig::anonymous())
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.sources.is_empty());
        assert!(config.sources_file.is_none());
        assert_eq!(config.fetch, FetchConfig::default());
        assert_eq!(config.fetch.batch_size, 10);
        assert_eq!(config.fetch.sample_size, 2);
        assert_eq!(
            config.fetch.client_settings().timeout,
            Duration::from_millis(3000)
        );
        assert_eq!(config.status_codes().unwrap()["408"], "Request timed out");
    }

    #[test]
    fn test_parse_sources_and_fetch() {
        let config = Config::from_toml(
            r#"
            [sources.local]
            path = "http://localhost:5000"
            host = "localhost:5000"

            [sources.ghcr]
            path = "https://proxy.example.com/ghcr.io"
            username = "octocat"
            token = "ghp_x"

            [fetch]
            sample_size = 5
            digest_fallback = "tag-name"
            "#,
        )
        .unwrap();

        assert_eq!(config.fetch.sample_size, 5);
        assert_eq!(config.fetch.batch_size, 10);
        assert_eq!(config.fetch.digest_fallback, DigestFallback::TagName);
        assert_eq!(config.fetch.fetch_settings().sample_size, 5);

        let sources = config.sources(&no_credentials()).unwrap();
        assert_eq!(sources.len(), 2);
        let ghcr = &sources[0];
        assert_eq!(ghcr.name, "ghcr");
        assert_eq!(ghcr.kind, RegistryKind::GitHub);
        assert_eq!(ghcr.username.as_deref(), Some("octocat"));
        assert_eq!(ghcr.credentials, Some(AuthConfig::bearer("ghp_x".to_string())));

        let local = &sources[1];
        assert_eq!(local.kind, RegistryKind::Standard);
        assert!(local.credentials.is_none());
    }

    #[test]
    fn test_keychain_fallback_uses_host() {
        let config = Config::from_toml(
            r#"
            [sources.private]
            path = "https://registry.example.com:8443/"

            [sources.inline]
            path = "https://registry.example.com:8443"
            username = "me"
            password = "secret"
            "#,
        )
        .unwrap();
        let stored = AuthConfig::basic("stored".to_string(), "pw".to_string());
        let keychain = StaticKeychain("registry.example.com:8443", stored.clone());

        let sources = config.sources(&keychain).unwrap();
        assert_eq!(sources[0].name, "inline");
        assert_eq!(
            sources[0].credentials,
            Some(AuthConfig::basic("me".to_string(), "secret".to_string()))
        );
        assert_eq!(sources[1].credentials, Some(stored));
    }

    #[test]
    fn test_sources_file_merges_under_inline() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("sources.json"),
            r#"{
                "default": { "path": "http://localhost:5000", "host": "localhost:5000" },
                "mirror": { "path": "http://mirror:5000", "host": "mirror:5000" }
            }"#,
        )
        .unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
            sources_file = "sources.json"

            [sources.mirror]
            path = "https://mirror.example.com"
            host = "mirror.example.com"
            "#,
        )
        .unwrap();

        let config = Config::load(Some(&config_path)).unwrap();
        assert_eq!(config.sources_file, Some(dir.path().join("sources.json")));

        let sources = config.sources(&no_credentials()).unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["default", "mirror"]);
        assert_eq!(sources[1].path, "https://mirror.example.com");
    }

    #[test]
    fn test_status_codes_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("status.json");
        fs::write(&file, r#"{ "404": "No such registry", "418": "Teapot" }"#).unwrap();

        let config = Config {
            status_codes_file: Some(file),
            ..Default::default()
        };
        let codes = config.status_codes().unwrap();
        assert_eq!(codes.len(), 2);
        assert_eq!(codes["418"], "Teapot");
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let dir = tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_invalid_toml_fails() {
        assert!(Config::from_toml("sources = 3").is_err());
    }

    #[test]
    fn test_cache_path_overrides_default() {
        let config = Config {
            cache_path: Some(PathBuf::from("/tmp/containerhub-test/store.json")),
            ..Default::default()
        };
        let file = config.snapshot_file().unwrap();
        assert_eq!(file.path(), Path::new("/tmp/containerhub-test/store.json"));
    }

    #[test]
    fn test_refresh_intervals() {
        let intervals = FetchConfig::default().refresh_intervals();
        assert_eq!(intervals.light, Duration::from_secs(30));
        assert_eq!(intervals.full, Duration::from_secs(120));
    }
}
