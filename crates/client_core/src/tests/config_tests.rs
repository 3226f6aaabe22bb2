use super::*;

use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

#[test]
fn defaults_cap_avatars_at_two_mebibytes() {
    let settings = ClientSettings::default();
    assert_eq!(settings.max_avatar_bytes, 2 * 1024 * 1024);
    assert_eq!(
        settings.upload_url(),
        "https://api.cloudinary.com/v1_1/demo/image/upload"
    );
    settings.validate().expect("defaults are valid");
}

#[test]
fn file_values_override_defaults() {
    let settings = parse_settings(
        r#"
        api_base_url = "https://homes.example.com"
        cloud_name = "homes"
        max_avatar_bytes = 1024
        "#,
    )
    .expect("parse");
    assert_eq!(settings.api_base_url, "https://homes.example.com");
    assert_eq!(
        settings.upload_url(),
        "https://api.cloudinary.com/v1_1/homes/image/upload"
    );
    assert_eq!(settings.max_avatar_bytes, 1024);
    assert_eq!(settings.upload_preset, "unsigned_avatars");
}

#[test]
fn app_prefixed_env_wins_over_short_form() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("HOMES_API_URL", "http://short.example"),
        ("APP__API_BASE_URL", "http://long.example"),
        ("HOMES_UPLOAD_URL", "http://127.0.0.1:9000/upload"),
        ("HOMES_MAX_AVATAR_BYTES", "not-a-number"),
    ]);
    let mut settings = ClientSettings::default();
    settings.apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()));

    assert_eq!(settings.api_base_url, "http://long.example");
    assert_eq!(settings.upload_url(), "http://127.0.0.1:9000/upload");
    assert_eq!(settings.max_avatar_bytes, DEFAULT_MAX_AVATAR_BYTES);
}

#[test]
fn validate_rejects_malformed_base_url() {
    let settings = ClientSettings {
        api_base_url: "not a url".into(),
        ..ClientSettings::default()
    };
    let err = settings.validate().expect_err("should fail");
    assert!(err.to_string().contains("api_base_url"), "unexpected: {err}");
}

#[test]
fn missing_settings_file_falls_back_to_defaults() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("homes_client_missing_{suffix}.toml"));

    let settings = load_settings(&path).expect("load");
    assert!(!settings.upload_preset.is_empty());
}

#[test]
fn unparsable_settings_file_is_an_error() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("homes_client_bad_{suffix}.toml"));
    fs::write(&path, "max_avatar_bytes = \"lots\"").expect("write");

    let err = load_settings(&path).expect_err("should fail");
    assert!(err.to_string().contains("invalid settings file"), "unexpected: {err}");

    fs::remove_file(path).expect("cleanup");
}
