//! Tests replaying event logs from files

use std::fs::File;
use std::io::{BufReader, Write};

use anyhow::Result;
use relfeed_json::{DecoderConfig, JsonDecoder, MemorySink, WriterSink};
use relfeed_replay_source::Replayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging for tests
fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

const LOG: &str = r#"
{"action": "R", "relid": 16384, "schema": "public", "table": "orders", "columns": [{"name": "id", "type": "int4", "typeoid": 23}, {"name": "name", "type": "text", "typeoid": 25}], "identity": ["id"]}
{"action": "R", "relid": 16390, "schema": "public", "table": "other", "columns": [{"name": "id", "type": "int4", "typeoid": 23}], "identity": ["id"]}
{"action": "B", "xid": 700, "lsn": "0/1000", "timestamp": "2024-01-01T10:00:00Z"}
{"action": "I", "relid": 16384, "new": [1, "a"]}
{"action": "I", "relid": 16390, "new": [2]}
{"action": "C"}
{"action": "B", "xid": 701, "lsn": "0/2000", "timestamp": "2024-01-01T10:00:01Z"}
{"action": "I", "relid": 16390, "new": [3]}
{"action": "C"}
{"action": "X", "relid": 16384}
{"action": "R", "relid": 16384, "schema": "public", "table": "orders", "columns": [{"name": "id", "type": "int4", "typeoid": 23}, {"name": "name", "type": "text", "typeoid": 25}, {"name": "paid", "type": "bool", "typeoid": 16}], "identity": ["id"]}
{"action": "B", "xid": 702, "lsn": "0/3000", "timestamp": "2024-01-01T10:00:02Z"}
{"action": "X", "relid": 16384}
{"action": "U", "relid": 16384, "new": [1, "b", true]}
{"action": "D", "relid": 16384, "old": [1, null, null]}
{"action": "C"}
"#;

fn write_log() -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(LOG.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[test]
fn test_replay_orders_log() -> Result<()> {
    init_logging();
    let log = write_log()?;

    let config = DecoderConfig::from_pairs([
        ("include", Some(r#"{"table": "orders"}"#)),
        ("include-xids", Some("true")),
        ("include-types", Some("false")),
        ("include-schemas", Some("false")),
    ])?;
    let mut replayer = Replayer::new(JsonDecoder::new(config, MemorySink::new()));
    let summary = replayer.replay(BufReader::new(File::open(log.path())?), "orders.jsonl")?;

    assert_eq!(summary.transactions, 3);
    assert_eq!(summary.written, 2);
    assert_eq!(summary.emitted, 3);
    assert_eq!(summary.excluded, 2);
    assert_eq!(summary.invalidations, 1);

    assert_eq!(
        replayer.decoder().sink().messages(),
        [
            r#"{"xid":700,"change":[{"op":"I","table":"orders","colnames":["id","name"],"values":[1,"a"]}]}"#,
            concat!(
                r#"{"xid":702,"change":["#,
                r#"{"op":"U","table":"orders","colnames":["id","name","paid"],"values":[1,"b",true],"keynames":["id"],"oldkey":[1]},"#,
                r#"{"op":"D","table":"orders","oldkey":[1]}]}"#
            ),
        ]
    );
    Ok(())
}

#[test]
fn test_replay_to_writer() -> Result<()> {
    init_logging();
    let log = write_log()?;

    let config = DecoderConfig::from_pairs([
        ("include-lsn", Some("1")),
        ("include-types", Some("0")),
        ("include-schemas", Some("0")),
        ("exclude", Some(r#"{"tables": "^ord"}"#)),
    ])?;
    let mut replayer = Replayer::new(JsonDecoder::new(config, WriterSink::new(Vec::new())));
    replayer.replay(BufReader::new(File::open(log.path())?), "orders.jsonl")?;

    let output = String::from_utf8(replayer.into_decoder().into_sink().into_inner())?;
    assert_eq!(
        output,
        concat!(
            r#"{"nextlsn":"0/1000","change":[{"op":"I","table":"other","colnames":["id"],"values":[2]}]}"#,
            "\n",
            r#"{"nextlsn":"0/2000","change":[{"op":"I","table":"other","values":[3]}]}"#,
            "\n",
        )
    );
    Ok(())
}
