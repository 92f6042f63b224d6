use anyhow::Result;

use super::*;

#[test]
fn config_deserializes_from_full_env() -> Result<()> {
    let config: Config = envy::from_iter(vec![
        ("RUST_LOG".into(), "error".into()),
        ("CLIENT_PORT".into(), "7000".into()),
        ("HTTP_PORT".into(), "7002".into()),
        ("SUBJECT_PREFIX".into(), "UPDATES".into()),
        ("STORAGE_DATA_PATH".into(), "/usr/local/datacat-eventing/data".into()),
        ("URL_SIGNING_KEY".into(), base64::encode("a test signing key")),
        ("API_TOKEN".into(), "sekret".into()),
        ("CHUNK_MAX_SIZE".into(), "250".into()),
        ("CHUNK_TIMEOUT_MILLIS".into(), "50".into()),
        ("ACK_TIMEOUT_SECONDS".into(), "10".into()),
        ("SESSION_BUFFER_SIZE".into(), "500".into()),
    ])?;

    assert!(config.rust_log == "error", "unexpected value parsed for RUST_LOG, got {}, expected {}", config.rust_log, "error");
    assert!(config.client_port == 7000, "unexpected value parsed for CLIENT_PORT, got {}, expected {}", config.client_port, "7000");
    assert!(config.http_port == 7002, "unexpected value parsed for HTTP_PORT, got {}, expected {}", config.http_port, "7002");
    assert!(
        config.subject_prefix == "UPDATES",
        "unexpected value parsed for SUBJECT_PREFIX, got {}, expected {}",
        config.subject_prefix,
        "UPDATES"
    );
    assert!(
        config.storage_data_path == "/usr/local/datacat-eventing/data",
        "unexpected value parsed for STORAGE_DATA_PATH, got {}, expected {}",
        config.storage_data_path,
        "/usr/local/datacat-eventing/data"
    );
    assert!(
        config.url_signing_key == b"a test signing key",
        "unexpected value parsed for URL_SIGNING_KEY, got {:?}",
        config.url_signing_key
    );
    assert!(
        config.api_token.as_deref() == Some("sekret"),
        "unexpected value parsed for API_TOKEN, got {:?}, expected {:?}",
        config.api_token,
        Some("sekret")
    );
    assert!(config.chunk_max_size == 250, "unexpected value parsed for CHUNK_MAX_SIZE, got {}, expected {}", config.chunk_max_size, 250);
    assert!(
        config.chunk_timeout_millis == 50,
        "unexpected value parsed for CHUNK_TIMEOUT_MILLIS, got {}, expected {}",
        config.chunk_timeout_millis,
        50
    );
    assert!(
        config.ack_timeout_seconds == 10,
        "unexpected value parsed for ACK_TIMEOUT_SECONDS, got {}, expected {}",
        config.ack_timeout_seconds,
        10
    );
    assert!(
        config.session_buffer_size == 500,
        "unexpected value parsed for SESSION_BUFFER_SIZE, got {}, expected {}",
        config.session_buffer_size,
        500
    );

    Ok(())
}

#[test]
fn config_deserializes_from_sparse_env() -> Result<()> {
    let config: Config = envy::from_iter(vec![
        ("RUST_LOG".into(), "error".into()),
        ("CLIENT_PORT".into(), "7000".into()),
        ("HTTP_PORT".into(), "7002".into()),
        ("URL_SIGNING_KEY".into(), base64::encode("a test signing key")),
    ])?;

    assert!(
        config.subject_prefix == "UPDATES",
        "unexpected default for SUBJECT_PREFIX, got {}, expected {}",
        config.subject_prefix,
        "UPDATES"
    );
    assert!(
        config.storage_data_path == crate::database::DEFAULT_DATA_PATH,
        "unexpected default for STORAGE_DATA_PATH, got {}, expected {}",
        config.storage_data_path,
        crate::database::DEFAULT_DATA_PATH
    );
    assert!(config.api_token.is_none(), "unexpected default for API_TOKEN, got {:?}, expected None", config.api_token);
    assert!(config.chunk_max_size == 100, "unexpected default for CHUNK_MAX_SIZE, got {}, expected {}", config.chunk_max_size, 100);
    assert!(
        config.chunk_timeout_millis == 100,
        "unexpected default for CHUNK_TIMEOUT_MILLIS, got {}, expected {}",
        config.chunk_timeout_millis,
        100
    );
    assert!(
        config.ack_timeout_seconds == 30,
        "unexpected default for ACK_TIMEOUT_SECONDS, got {}, expected {}",
        config.ack_timeout_seconds,
        30
    );
    assert!(
        config.session_buffer_size == 1000,
        "unexpected default for SESSION_BUFFER_SIZE, got {}, expected {}",
        config.session_buffer_size,
        1000
    );

    Ok(())
}

#[test]
fn config_rejects_invalid_signing_key() -> Result<()> {
    let res: Result<Config, _> = envy::from_iter(vec![
        ("RUST_LOG".into(), "error".into()),
        ("CLIENT_PORT".into(), "7000".into()),
        ("HTTP_PORT".into(), "7002".into()),
        ("URL_SIGNING_KEY".into(), "!!! not base64 !!!".into()),
    ]);
    assert!(res.is_err(), "expected config build to fail on malformed signing key");
    Ok(())
}
