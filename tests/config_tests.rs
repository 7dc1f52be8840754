// Integration tests for configuration loading
//
// Files are layered under environment overrides and every field has a default, so a
// partial file is valid.

use anyhow::Result;
use lex_live::config::LiveConfig;
use lex_live::{Config, SessionConfig};
use std::io::Write;

fn write_config(contents: &str) -> Result<(tempfile::TempDir, String)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("lex-live.toml");
    let mut file = std::fs::File::create(&path)?;
    file.write_all(contents.as_bytes())?;
    Ok((dir, path.display().to_string()))
}

#[test]
fn test_missing_file_uses_defaults() -> Result<()> {
    let config = Config::load("/nonexistent/lex-live")?;

    assert_eq!(config.service.http.port, 8787);
    assert_eq!(config.audio.input_sample_rate, 16000);
    assert_eq!(config.audio.output_sample_rate, 24000);
    assert_eq!(config.audio.chunk_size, 4096);
    assert_eq!(config.audio.fft_size, 256);
    assert_eq!(config.audio.volume_scale, 2.5);
    assert!(config.live.endpoint.starts_with("wss://"));
    Ok(())
}

#[test]
fn test_partial_file_keeps_other_defaults() -> Result<()> {
    let (_dir, path) = write_config(
        r#"
[service.http]
port = 9000

[audio]
chunk_size = 2048
"#,
    )?;

    let config = Config::load(&path)?;

    assert_eq!(config.service.http.port, 9000);
    assert_eq!(config.service.http.bind, "127.0.0.1");
    assert_eq!(config.audio.chunk_size, 2048);
    assert_eq!(config.audio.output_sample_rate, 24000);
    Ok(())
}

#[test]
fn test_invalid_file_is_an_error() -> Result<()> {
    let (_dir, path) = write_config("[audio]\nchunk_size = \"lots\"\n")?;
    assert!(Config::load(&path).is_err());
    Ok(())
}

#[test]
fn test_environment_overrides_file() -> Result<()> {
    let (_dir, path) = write_config("[live]\nmodel = \"models/from-file\"\n")?;

    std::env::set_var("LEX_LIVE__LIVE__MODEL", "models/from-env");
    let config = Config::load(&path);
    std::env::remove_var("LEX_LIVE__LIVE__MODEL");

    assert_eq!(config?.live.model, "models/from-env");
    Ok(())
}

#[test]
fn test_inline_key_wins_over_environment() {
    std::env::set_var("LEX_LIVE_TEST_INLINE_KEY", "from-env");
    let live = LiveConfig {
        api_key: Some("inline".to_string()),
        api_key_env: "LEX_LIVE_TEST_INLINE_KEY".to_string(),
        ..LiveConfig::default()
    };

    assert_eq!(live.resolve_api_key().as_deref(), Some("inline"));
}

#[test]
fn test_key_from_environment_and_blank_is_missing() {
    std::env::set_var("LEX_LIVE_TEST_ENV_KEY", "from-env");
    std::env::set_var("LEX_LIVE_TEST_BLANK_KEY", "  ");

    let from_env = LiveConfig {
        api_key_env: "LEX_LIVE_TEST_ENV_KEY".to_string(),
        ..LiveConfig::default()
    };
    let blank = LiveConfig {
        api_key_env: "LEX_LIVE_TEST_BLANK_KEY".to_string(),
        ..LiveConfig::default()
    };
    let unset = LiveConfig {
        api_key_env: "LEX_LIVE_TEST_UNSET_KEY".to_string(),
        ..LiveConfig::default()
    };

    assert_eq!(from_env.resolve_api_key().as_deref(), Some("from-env"));
    assert_eq!(blank.resolve_api_key(), None);
    assert_eq!(unset.resolve_api_key(), None);
}

#[test]
fn test_session_config_from_config() {
    let mut config = Config::default();
    config.live.api_key = Some("k".to_string());
    config.audio.chunk_size = 1024;

    let session = SessionConfig::from_config(&config);

    assert!(session.session_id.starts_with("voice-"));
    assert_eq!(session.api_key.as_deref(), Some("k"));
    assert_eq!(session.capture_config().chunk_size, 1024);
    assert_eq!(session.capture_config().sample_rate, 16000);

    let setup = session.live_setup().expect("credential present");
    assert_eq!(setup.model, config.live.model);
}

#[test]
fn test_session_config_without_key_has_no_setup() {
    let session = SessionConfig::default();
    assert!(session.live_setup().is_none());

    // The credential never leaves in serialized form
    let json = serde_json::to_string(&SessionConfig {
        api_key: Some("hidden".to_string()),
        ..SessionConfig::default()
    })
    .unwrap();
    assert!(!json.contains("hidden"));
}
