//! Unit tests for the envelope, stdio stand-ins, requests and configuration.

use std::io::BufRead;
use std::io::Read;
use std::path::PathBuf;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::capture::OutputSlot;
use crate::capture::Sink;
use crate::config::BridgeConfig;
use crate::config::Mount;
use crate::envelope::Envelope;
use crate::input::InputChannel;
use crate::loader;
use crate::loader::Identity;
use crate::loader::Loader;
use crate::query::QueryPayload;
use crate::query::QueryResponse;
use crate::request::CallRequest;
use crate::request::InvocationRequest;

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

// --- Envelope ---

#[test]
fn test_envelope_omits_empty_sections() {
    let text = Envelope::new().serialize();
    let value: Value = serde_json::from_str(&text).unwrap();

    assert_eq!(value, json!({"retcode": 0, "message": ""}));
}

#[test]
fn test_envelope_includes_populated_sections() {
    let env = Envelope::new()
        .add_warning("low memory")
        .merge_data(object(json!({"x": 1})));
    let value: Value = serde_json::from_str(&env.serialize()).unwrap();

    assert_eq!(
        value,
        json!({"retcode": 0, "message": "", "warning": ["low memory"], "data": {"x": 1}})
    );
}

#[test]
fn test_envelope_merge_is_shallow() {
    let env = Envelope::new()
        .merge_data(object(json!({"a": {"inner": 1}, "b": 2})))
        .merge_data(object(json!({"a": {"other": 3}, "c": 4})));

    assert_eq!(Value::Object(env.data().clone()), json!({"a": {"other": 3}, "b": 2, "c": 4}));
}

#[test]
fn test_envelope_warnings_keep_order() {
    let env = Envelope::new().add_warning("first").add_warning("second").add_warning("first");
    assert_eq!(env.warnings(), &["first", "second", "first"]);
}

#[test]
fn test_envelope_accepts_values_as_is() {
    let env = Envelope::new().set_retcode(-7).set_message("");
    assert_eq!(env.retcode(), -7);
    assert!(!env.is_success());
}

#[test]
fn test_envelope_failure() {
    let env = Envelope::failure("nope");
    assert_eq!(env.retcode(), 1);
    assert_eq!(env.message(), "nope");
    assert!(env.data().is_empty());
}

#[test]
fn test_envelope_parse_defaults_missing_keys() {
    let env = Envelope::parse(r#"{"retcode": 2}"#).unwrap();
    assert_eq!(env.retcode(), 2);
    assert_eq!(env.message(), "");
    assert!(env.warnings().is_empty());

    let env = Envelope::parse(r#"{"retcode": 0, "message": "ok", "warning": ["w"], "data": {"k": [1]}}"#).unwrap();
    assert_eq!(env.warnings(), &["w"]);
    assert_eq!(env.data().get("k"), Some(&json!([1])));
}

#[test]
fn test_envelope_structured_form_matches_text() {
    let empty = Envelope::new();
    assert_eq!(empty.to_value().unwrap(), json!({"retcode": 0, "message": ""}));

    let env = Envelope::failure("bad")
        .add_warning("w")
        .merge_data(object(json!({"k": null})));
    let value = env.to_value().unwrap();

    assert_eq!(value, json!({"retcode": 1, "message": "bad", "warning": ["w"], "data": {"k": null}}));
    assert_eq!(serde_json::from_str::<Value>(&env.serialize()).unwrap(), value);
    assert_eq!(Envelope::parse(&env.serialize()).unwrap(), env);
}

#[test]
fn test_envelope_display_matches_serialize() {
    let env = Envelope::failure("bad").add_warning("w");
    assert_eq!(env.to_string(), env.serialize());
}

// --- Input channel ---

#[test]
fn test_input_sequential_reads() {
    let mut input = InputChannel::new(&b"abcdef"[..]);
    let mut buf = [0u8; 4];

    assert_eq!(input.read(&mut buf).unwrap(), 4);
    assert_eq!(&buf, b"abcd");
    assert_eq!(input.read(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"ef");
    assert_eq!(input.read(&mut buf).unwrap(), 0);
    assert!(input.is_exhausted());
}

#[test]
fn test_input_read_line() {
    let mut input = InputChannel::new(&b"one\ntwo\n"[..]);
    let mut line = String::new();

    input.read_line(&mut line).unwrap();
    assert_eq!(line, "one\n");
    line.clear();
    input.read_line(&mut line).unwrap();
    assert_eq!(line, "two\n");
    line.clear();
    assert_eq!(input.read_line(&mut line).unwrap(), 0);
}

#[test]
fn test_input_iterates_lines() {
    let mut input = InputChannel::new(&b"a\nbb\nccc"[..]);
    let lines: Vec<_> = input.iter_lines().collect();

    assert_eq!(lines, vec![&b"a\n"[..], &b"bb\n"[..], &b"ccc"[..]]);
    assert_eq!(input.iter_lines().next(), None);
}

#[test]
fn test_input_buffer_view_is_stable() {
    let mut input = InputChannel::new(&b"payload"[..]);
    let mut sink = Vec::new();
    input.read_to_end(&mut sink).unwrap();

    assert_eq!(&input.buffer()[..], b"payload");
    assert!(input.remaining().is_empty());
}

#[test]
fn test_input_from_request_wraps_arguments() {
    let rq = InvocationRequest::new("ping", object(json!({"data": "hello"})));
    let input = InputChannel::from_request(&rq, "ANSIBLE_MODULE_ARGS").unwrap();
    let value: Value = serde_json::from_slice(input.buffer()).unwrap();

    assert_eq!(value, json!({"ANSIBLE_MODULE_ARGS": {"data": "hello"}}));
}

// --- Output slot ---

#[tokio::test]
async fn test_scope_redirects_and_restores() {
    let slot = OutputSlot::new();
    assert!(matches!(slot.destination().await, Sink::Null));
    let scope = slot.open(1024).await;

    assert!(scope.destination().is_buffer());
    assert!(slot.is_held());

    let captured = scope.close();
    assert!(captured.is_empty());
    assert!(!slot.is_held());
    assert!(matches!(slot.destination().await, Sink::Null));
}

#[tokio::test]
async fn test_scope_restores_on_drop() {
    let slot = OutputSlot::default();
    {
        let _scope = slot.open(16).await;
        assert!(slot.is_held());
    }
    assert!(!slot.is_held());
    assert!(matches!(slot.destination().await, Sink::Null));
}

#[tokio::test]
async fn test_scope_is_exclusive() {
    let slot = OutputSlot::default();
    let scope = slot.try_open(16).expect("first holder should succeed");

    assert!(slot.try_open(16).is_err(), "second holder must be refused");

    drop(scope);
    assert!(slot.try_open(16).is_ok());
}

#[tokio::test]
async fn test_scope_restores_when_holder_panics() {
    let slot = OutputSlot::default();
    let inner = slot.clone();

    let joined = tokio::spawn(async move {
        let _scope = inner.open(16).await;
        panic!("holder blew up");
    })
    .await;

    assert!(joined.is_err());
    assert!(!slot.is_held());
    assert!(matches!(slot.destination().await, Sink::Null));
}

// --- Requests ---

#[test]
fn test_request_from_options() {
    let opts = vec![vec![json!("sys/ping"), json!("extra")]];
    let rq = InvocationRequest::from_options(&opts, object(json!({"k": "v"}))).unwrap();

    assert_eq!(rq.module(), "sys/ping");
    assert_eq!(rq.args().get("k"), Some(&json!("v")));
}

#[test]
fn test_request_requires_target() {
    assert!(InvocationRequest::from_options(&[], Map::new()).is_none());
    assert!(InvocationRequest::from_options(&[vec![]], Map::new()).is_none());
    assert!(InvocationRequest::from_options(&[vec![json!(5)]], Map::new()).is_none());
    assert!(InvocationRequest::from_options(&[vec![json!("  ")]], Map::new()).is_none());
}

#[test]
fn test_call_request_aliases() {
    let call = CallRequest::parse(r#"{"opts": ["ping"], "args": {"n": 1}}"#).unwrap();
    let (groups, args) = call.into_parts();

    assert_eq!(groups, vec![vec![json!("ping")]]);
    assert_eq!(args.get("n"), Some(&json!(1)));
}

#[test]
fn test_call_request_without_options() {
    let (groups, args) = CallRequest::parse("{}").unwrap().into_parts();
    assert!(groups.is_empty());
    assert!(args.is_empty());
}

// --- Configuration ---

#[test]
fn test_config_defaults() {
    let cfg = BridgeConfig::parse("").unwrap();

    assert_eq!(cfg, BridgeConfig::default());
    assert_eq!(cfg.namespace, "ansible");
    assert_eq!(cfg.args_key, "ANSIBLE_MODULE_ARGS");
    assert_eq!(cfg.fuel, None);
    assert_eq!(cfg.modules_dir(), PathBuf::from("/usr/share/modbridge/modules"));
}

#[test]
fn test_config_parse() {
    let cfg = BridgeConfig::parse(
        r#"
        sharelib = "/opt/mods"
        namespace = "wasm"
        fuel = 1_000

        [env]
        LANG = "C"

        [[mounts]]
        host = "/var/tmp"
        guest = "/tmp"
        writable = true
        "#,
    )
    .unwrap();

    assert_eq!(cfg.modules_dir(), PathBuf::from("/opt/mods/modules"));
    assert_eq!(cfg.namespace, "wasm");
    assert_eq!(cfg.args_key, "ANSIBLE_MODULE_ARGS");
    assert_eq!(cfg.fuel, Some(1_000));
    assert_eq!(cfg.env.get("LANG").map(String::as_str), Some("C"));
    assert_eq!(
        cfg.mounts,
        vec![Mount {
            host: PathBuf::from("/var/tmp"),
            guest: "/tmp".to_string(),
            writable: true,
        }]
    );
}

#[test]
fn test_config_rejects_bad_types() {
    assert!(BridgeConfig::parse("fuel = \"lots\"").is_err());
}

#[test]
fn test_config_load_missing_file() {
    let err = BridgeConfig::load("/nonexistent/modbridge.toml").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/modbridge.toml"));
}

// --- Loader ---

#[test]
fn test_resolve_under_modules_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("sys")).unwrap();
    std::fs::write(dir.path().join("sys/ping.wat"), "(module)").unwrap();
    std::fs::write(dir.path().join("top.wasm"), "").unwrap();
    std::fs::write(dir.path().join("top.wat"), "").unwrap();

    let loader = Loader::new(dir.path());

    assert_eq!(loader.resolve("sys/ping").unwrap(), dir.path().join("sys/ping.wat"));
    assert_eq!(loader.resolve("top").unwrap(), dir.path().join("top.wasm"), ".wasm wins over .wat");
}

#[test]
fn test_resolve_explicit_extension_under_modules_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("net")).unwrap();
    std::fs::write(dir.path().join("net/ping.wasm"), "").unwrap();
    std::fs::write(dir.path().join("net/ping.wat"), "").unwrap();

    let loader = Loader::new(dir.path());

    assert_eq!(loader.resolve("net/ping.wat").unwrap(), dir.path().join("net/ping.wat"));
    assert_eq!(loader.resolve("net/ping.wasm").unwrap(), dir.path().join("net/ping.wasm"));
    assert!(matches!(loader.resolve("net/pong.wasm"), Err(loader::Error::NotFound(_))));
}

#[test]
fn test_resolve_direct_path() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("direct.wat");
    std::fs::write(&file, "(module)").unwrap();

    let loader = Loader::new("/nonexistent");
    let id = file.to_string_lossy().into_owned();

    assert_eq!(loader.resolve(&id).unwrap(), file);
}

#[test]
fn test_resolve_failures() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("present.wat"), "(module)").unwrap();
    let loader = Loader::new(dir.path().join("nested"));

    for id in ["", "missing/module", "../present", "/nonexistent/thing.wasm"] {
        match loader.resolve(id) {
            Err(loader::Error::NotFound(got)) => assert_eq!(got, id),
            other => panic!("{:?} should not resolve, got {:?}", id, other),
        }
    }
}

#[test]
fn test_available_lists_identifiers() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("net/tools")).unwrap();
    std::fs::write(dir.path().join("ping.wat"), "").unwrap();
    std::fs::write(dir.path().join("ping.wasm"), "").unwrap();
    std::fs::write(dir.path().join("net/tools/dig.wasm"), "").unwrap();
    std::fs::write(dir.path().join("README.md"), "").unwrap();

    let loader = Loader::new(dir.path());
    assert_eq!(loader.available().unwrap(), vec!["net/tools/dig", "ping"]);
}

#[test]
fn test_available_missing_dir() {
    let loader = Loader::new("/nonexistent/modules");
    assert!(matches!(loader.available(), Err(loader::Error::List(_, _))));
}

#[test]
fn test_identity_uses_file_stem() {
    let id = Identity::for_path(std::path::Path::new("/usr/share/modbridge/modules/sys/ping.wasm"));
    assert_eq!(id.program(), "ping");
    assert_eq!(id.path(), std::path::Path::new("/usr/share/modbridge/modules/sys/ping.wasm"));
}

// --- Query shapes ---

#[test]
fn test_query_payload_shape() {
    let payload = QueryPayload::new("router", "*")
        .traits("system.os.name:linux")
        .mid("minion-1")
        .context("region", "eu");

    assert_eq!(
        serde_json::to_value(&payload).unwrap(),
        json!({
            "model": "router",
            "query": "*",
            "traits": "system.os.name:linux",
            "mid": "minion-1",
            "context": {"region": "eu"}
        })
    );
}

#[test]
fn test_query_response_nests_envelope() {
    let env = Envelope::new().merge_data(object(json!({"ansible": {"x": 1}})));
    let value = serde_json::to_value(QueryResponse::with_envelope(env)).unwrap();

    assert_eq!(value["status"], json!("success"));
    assert_eq!(value["data"]["data"]["ansible"]["x"], json!(1));
    assert!(value["data"].get("warning").is_none());
}
