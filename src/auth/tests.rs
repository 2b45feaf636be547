//! Tests for the auth module

use super::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_anonymous_has_no_header() {
    let auth = AuthConfig::anonymous();
    assert!(auth.is_anonymous());
    assert_eq!(auth.to_authorization_header().unwrap(), None);
}

#[test]
fn test_basic_header() {
    let auth = AuthConfig::basic("user".to_string(), "pass".to_string());
    assert!(!auth.is_anonymous());

    let expected = base64::engine::general_purpose::STANDARD.encode("user:pass");
    assert_eq!(
        auth.to_authorization_header().unwrap(),
        Some(format!("Basic {}", expected))
    );
}

#[test]
fn test_bearer_header_wins() {
    let auth = AuthConfig {
        username: Some("user".to_string()),
        password: Some("pass".to_string()),
        registry_token: Some("token123".to_string()),
        ..Default::default()
    };
    assert_eq!(
        auth.to_authorization_header().unwrap(),
        Some("Bearer token123".to_string())
    );
}

#[test]
fn test_username_without_password_is_rejected() {
    let auth = AuthConfig {
        username: Some("user".to_string()),
        ..Default::default()
    };
    assert!(auth.to_authorization_header().is_err());
}

#[test]
fn test_keychain_finds_host_entry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{
            "auths": {
                "registry.example.com:5000": {"auth": "dXNlcjpwYXNz"},
                "https://index.docker.io/v1/": {"username": "hub", "password": "secret"}
            },
            "credsStore": "desktop"
        }"#,
    )
    .unwrap();

    let keychain = DockerConfigKeychain::with_paths(vec![path]);

    let auth = keychain.resolve("registry.example.com:5000").unwrap();
    assert_eq!(auth.auth, Some("dXNlcjpwYXNz".to_string()));

    let hub = keychain.resolve("docker.io").unwrap();
    assert_eq!(hub.username, Some("hub".to_string()));

    let unknown = keychain.resolve("other.example.com").unwrap();
    assert!(unknown.is_anonymous());
}

#[test]
fn test_keychain_ignores_broken_file() {
    let dir = tempdir().unwrap();
    let broken = dir.path().join("broken.json");
    fs::write(&broken, "{not json").unwrap();

    let keychain = DockerConfigKeychain::with_paths(vec![broken]);
    assert!(keychain.resolve("ghcr.io").unwrap().is_anonymous());
}

#[test]
fn test_host_variants_strip_scheme() {
    let variants = DockerConfigKeychain::host_variants("https://ghcr.io/");
    assert!(variants.contains(&"ghcr.io".to_string()));
    assert!(variants.contains(&"https://ghcr.io".to_string()));
}
