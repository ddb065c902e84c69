//! Config loader integration tests: layered .env files, prefix filtering,
//! and typed parsing of engine caps and phrase lists.

use std::fs;

use base64::{Engine as _, engine::general_purpose};
use tempfile::TempDir;

use leadflow::config::ConfigLoader;

fn crypto_key_b64() -> String {
    general_purpose::STANDARD.encode([7u8; 32])
}

fn write_env(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).expect("write env file");
}

fn base_env() -> String {
    format!(
        "LEADFLOW_PROFILE=test\n\
         LEADFLOW_OPERATOR_TOKEN=op-token\n\
         LEADFLOW_CRYPTO_KEY={}\n",
        crypto_key_b64()
    )
}

#[test]
fn loads_required_settings_from_env_file() {
    let dir = TempDir::new().unwrap();
    write_env(&dir, ".env", &base_env());

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect("config loads");

    assert_eq!(config.profile, "test");
    assert_eq!(config.operator_tokens, vec!["op-token".to_string()]);
    assert_eq!(config.crypto_key.as_ref().map(Vec::len), Some(32));
    // Defaults fill everything else
    assert_eq!(config.engine.max_bot_turns, 40);
    assert_eq!(config.reminders.batch_size, 50);
}

#[test]
fn profile_specific_file_overrides_base() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        &format!("{}LEADFLOW_RATE_LIMIT_MAX_MESSAGES=10\n", base_env()),
    );
    write_env(&dir, ".env.test", "LEADFLOW_RATE_LIMIT_MAX_MESSAGES=3\n");

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect("config loads");

    assert_eq!(config.engine.rate_limit_max_messages, 3);
}

#[test]
fn unprefixed_variables_are_ignored() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        &format!("{}RATE_LIMIT_MAX_MESSAGES=3\nSOMETHING_ELSE=1\n", base_env()),
    );

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect("config loads");

    // The unprefixed value did not leak into the engine config
    assert_eq!(config.engine.rate_limit_max_messages, 10);
}

#[test]
fn phrase_lists_parse_from_comma_separated_values() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        &format!(
            "{}LEADFLOW_OPTIONS_LIST_PHRASES=opciones, Mostrar Opciones ,ayuda\n",
            base_env()
        ),
    );

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect("config loads");

    assert_eq!(
        config.engine.options_list_phrases,
        vec!["opciones", "mostrar opciones", "ayuda"]
    );
}

#[test]
fn operator_token_list_form_is_supported() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        &format!(
            "LEADFLOW_PROFILE=test\n\
             LEADFLOW_OPERATOR_TOKENS=one, two,three\n\
             LEADFLOW_CRYPTO_KEY={}\n",
            crypto_key_b64()
        ),
    );

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect("config loads");

    assert_eq!(config.operator_tokens, vec!["one", "two", "three"]);
}

#[test]
fn missing_crypto_key_fails_the_load() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        "LEADFLOW_PROFILE=test\nLEADFLOW_OPERATOR_TOKEN=op-token\n",
    );

    let result = ConfigLoader::with_base_dir(dir.path().to_path_buf()).load();
    assert!(result.is_err());
}

#[test]
fn invalid_base64_crypto_key_fails_the_load() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        "LEADFLOW_PROFILE=test\n\
         LEADFLOW_OPERATOR_TOKEN=op-token\n\
         LEADFLOW_CRYPTO_KEY=!!!not-base64!!!\n",
    );

    let result = ConfigLoader::with_base_dir(dir.path().to_path_buf()).load();
    assert!(result.is_err());
}
