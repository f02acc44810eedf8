//! Tests for loading decoder configuration from files and options

use std::io::Write;

use relfeed::load_decoder_config;
use relfeed::json::{JsonDecoder, MemorySink};
use relfeed::replay::Replayer;

fn config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_file_then_command_line_options() {
    let file = config_file(
        r#"
        include-xids = true
        include-types = false

        [[rule]]
        include = { table = "orders", skip_columns = ["note"] }
        "#,
    );

    let config = load_decoder_config(
        Some(file.path()),
        &["include-xids=off".to_string(), "include-lsn".to_string()],
    )
    .unwrap();

    assert!(!config.options.include_xids);
    assert!(config.options.include_lsn);
    assert!(!config.options.include_types);
    assert_eq!(config.rules.len(), 1);
    assert!(config.rules.evaluate("orders").0);
    assert!(!config.rules.evaluate("other").0);
}

#[test]
fn test_invalid_rule_in_file_is_reported() {
    let file = config_file(
        r#"
        [[rule]]
        include = { table = "orders", tables = "^o" }
        "#,
    );
    let err = load_decoder_config(Some(file.path()), &[]).unwrap_err();
    assert!(format!("{err:#}").contains("Invalid decoder configuration"));
}

#[test]
fn test_missing_file() {
    let err = load_decoder_config(Some(std::path::Path::new("/nonexistent/relfeed.toml")), &[])
        .unwrap_err();
    assert!(format!("{err:#}").contains("Failed to read config file"));
}

#[test]
fn test_unknown_command_line_option() {
    let err = load_decoder_config(None, &["include-everything".to_string()]).unwrap_err();
    assert!(format!("{err:#}").contains("option \"include-everything\" = \"(null)\" is unknown"));
}

#[test]
fn test_configured_replay() {
    let file = config_file(
        r#"
        include-schemas = false
        include-types = false

        [[rule]]
        exclude = { table = "audit" }
        "#,
    );
    let config = load_decoder_config(Some(file.path()), &[]).unwrap();

    let log = [
        r#"{"action": "R", "relid": 1, "schema": "public", "table": "audit", "columns": [{"name": "id", "type": "int4", "typeoid": 23}]}"#,
        r#"{"action": "R", "relid": 2, "schema": "public", "table": "items", "columns": [{"name": "sku", "type": "text", "typeoid": 25}]}"#,
        r#"{"action": "B", "xid": 10, "timestamp": "2024-01-01T00:00:00Z"}"#,
        r#"{"action": "I", "relid": 1, "new": [1]}"#,
        r#"{"action": "I", "relid": 2, "new": ["A-1"]}"#,
        r#"{"action": "C"}"#,
    ]
    .join("\n");

    let mut replayer = Replayer::new(JsonDecoder::new(config, MemorySink::new()));
    replayer.replay(log.as_bytes(), "inline").unwrap();

    assert_eq!(
        replayer.decoder().sink().messages(),
        [r#"{"change":[{"op":"I","table":"items","colnames":["sku"],"values":["A-1"]}]}"#]
    );
}
