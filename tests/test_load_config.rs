use serial_test::serial;
use std::env;
use std::fs::write;
use tempfile::NamedTempFile;
use upload_sync::load_config::load_config;
use upload_sync_core::{AcceptFormat, UploadMode};

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

/// A full field section maps onto the core config, and the token comes from the environment.
#[test]
#[serial]
fn test_load_config_maps_field_and_injects_env() {
    let file = config_file(
        r#"
field:
  max_count: 5
  max_size_mb: 10
  remove_confirm: true
  keep_missing_id: true
  accept: ".png,.jpg"
  accept_format: "PNG or JPG"
  extra_data:
    bucket: avatars
    public: true
api:
  base_url: "http://files.local/api"
"#,
    );
    env::remove_var("UPLOAD_API_URL");
    env::set_var("UPLOAD_API_TOKEN", "top-secret-test-token");

    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(config.field.mode(), UploadMode::Multiple);
    assert_eq!(config.field.max_count, Some(5));
    assert_eq!(config.field.max_size_mb, 10.0);
    assert!(config.field.remove_confirm);
    assert!(config.field.keep_missing_id);
    assert!(config.field.remove_on_error, "defaults apply to omitted keys");
    assert!(matches!(
        config.field.accept_format,
        Some(AcceptFormat::Literal(ref s)) if s == "PNG or JPG"
    ));
    assert_eq!(config.field.extra_data["bucket"], "avatars");
    assert_eq!(config.api.base_url.as_deref(), Some("http://files.local/api"));
    assert_eq!(config.api.token.as_deref(), Some("top-secret-test-token"));

    env::remove_var("UPLOAD_API_TOKEN");
}

#[test]
#[serial]
fn test_env_url_overrides_file() {
    let file = config_file("api:\n  base_url: \"http://from-file\"\n");
    env::set_var("UPLOAD_API_URL", "http://from-env");

    let config = load_config(file.path()).expect("Config should load");
    assert_eq!(config.api.base_url.as_deref(), Some("http://from-env"));

    env::remove_var("UPLOAD_API_URL");
}

#[test]
#[serial]
fn test_missing_field_section_uses_defaults() {
    let file = config_file("api: {}\n");
    env::remove_var("UPLOAD_API_URL");

    let config = load_config(file.path()).expect("Config should load");
    assert_eq!(config.field.mode(), UploadMode::Single);
    assert_eq!(config.field.max_size_mb, 5.0);
    assert_eq!(config.api.base_url, None);
}

#[test]
#[serial]
fn test_null_max_count_is_unbounded() {
    let file = config_file("field:\n  max_count: ~\n");
    let config = load_config(file.path()).expect("Config should load");
    assert_eq!(config.field.max_count, None);
    assert_eq!(config.field.mode(), UploadMode::Multiple);
}

#[test]
#[serial]
fn test_load_config_errors_for_invalid_file() {
    let file = config_file("not-yaml: [:::");
    let err = load_config(file.path()).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[test]
#[serial]
fn test_load_config_rejects_unknown_field_keys() {
    let file = config_file("field:\n  max_sise_mb: 3\n");
    assert!(load_config(file.path()).is_err());
}

#[test]
#[serial]
fn test_load_config_rejects_non_positive_size_limit() {
    let file = config_file("field:\n  max_size_mb: 0\n");
    let msg = load_config(file.path()).unwrap_err().to_string();
    assert!(msg.contains("max_size_mb"), "got: {msg}");
}

#[test]
#[serial]
fn test_load_config_errors_for_missing_file() {
    let err = load_config("/definitely/not/here.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
