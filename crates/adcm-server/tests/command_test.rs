//! Command handlers over the in-memory workbench

use std::path::{Path, PathBuf};

use adcm_common::{AdcmError, SecretVault};
use adcm_config::EngineSettings;
use adcm_server::{Command, Output, Settings, ViewFormat, run};
use serde_json::{Value, json};
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    settings: Settings,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let engine = EngineSettings::default()
            .with_file_dir(dir.path().join("file"))
            .with_bundle_dir(dir.path().join("bundle"))
            .with_vault_key(SecretVault::generate_base64_key());
        let settings = Settings {
            engine,
            ..Settings::default()
        };
        Self { dir, settings }
    }

    fn write(&self, name: &str, value: Value) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    async fn run(&self, command: Command) -> anyhow::Result<Output> {
        run(command, &self.settings).await
    }
}

fn json_output(output: Output) -> Value {
    match output {
        Output::Json(value) => value,
        Output::Text(text) => panic!("expected JSON output, got {}", text),
    }
}

fn text_output(output: Output) -> String {
    match output {
        Output::Text(text) => text,
        Output::Json(value) => panic!("expected text output, got {}", value),
    }
}

fn schema() -> Value {
    json!([
        {"name": "host", "type": "string", "default": "localhost"},
        {"name": "port", "type": "integer", "default": "8080", "limits": {"min": 1, "max": 65535}},
        {"name": "password", "type": "password"},
        {"name": "cert", "type": "file"}
    ])
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

#[tokio::test]
async fn test_defaults() {
    let fx = Fixture::new();
    let schema = fx.write("schema.json", schema());

    let output = json_output(
        fx.run(Command::Defaults {
            schema,
            bundle: String::new(),
        })
        .await
        .unwrap(),
    );
    assert_eq!(
        output,
        json!({
            "config": {"host": "localhost", "port": 8080, "password": null, "cert": null},
            "attr": {}
        })
    );
}

#[tokio::test]
async fn test_defaults_without_keys() {
    let fx = Fixture::new();
    let schema = fx.write("empty.json", json!([]));
    let output = json_output(
        fx.run(Command::Defaults {
            schema,
            bundle: String::new(),
        })
        .await
        .unwrap(),
    );
    assert_eq!(output, json!({"config": null, "attr": null}));
}

#[tokio::test]
async fn test_validate_normalizes_and_cleans_up() {
    let fx = Fixture::new();
    let schema = fx.write("schema.json", schema());
    let config = fx.write(
        "config.json",
        json!({"host": "db", "port": 5432, "password": "pw", "cert": "PEM"}),
    );

    let output = json_output(
        fx.run(Command::Validate {
            schema,
            config,
            attr: None,
            state: None,
            bundle: String::new(),
        })
        .await
        .unwrap(),
    );
    assert_eq!(
        output["config"],
        json!({"host": "db", "port": 5432, "password": "pw", "cert": "PEM"})
    );
    assert!(is_empty_dir(&fx.settings.engine.file_dir));
}

#[tokio::test]
async fn test_validate_reports_engine_error() {
    let fx = Fixture::new();
    let schema = fx.write("schema.json", schema());
    let config = fx.write("config.json", json!({"port": 70000}));

    let err = fx
        .run(Command::Validate {
            schema,
            config,
            attr: None,
            state: None,
            bundle: String::new(),
        })
        .await
        .unwrap_err();
    let err = err.downcast_ref::<AdcmError>().unwrap();
    assert_eq!(err.name(), "CONFIG_VALUE_ERROR");
}

#[tokio::test]
async fn test_failed_validate_cleans_up() {
    let fx = Fixture::new();
    let bundle_dir = fx.settings.engine.bundle_dir.join("b1");
    std::fs::create_dir_all(&bundle_dir).unwrap();
    std::fs::write(bundle_dir.join("cert.pem"), "PEM").unwrap();
    let schema = fx.write(
        "schema.json",
        json!([
            {"name": "port", "type": "integer", "default": "8080", "limits": {"min": 1}},
            {"name": "cert", "type": "file", "default": "cert.pem"}
        ]),
    );
    let config = fx.write("config.json", json!({"port": 0, "cert": "PEM"}));

    let err = fx
        .run(Command::Validate {
            schema,
            config,
            attr: None,
            state: None,
            bundle: "b1".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<AdcmError>().unwrap().name(),
        "CONFIG_VALUE_ERROR"
    );
    assert!(is_empty_dir(&fx.settings.engine.file_dir));
}

#[tokio::test]
async fn test_failed_upgrade_cleans_up() {
    let fx = Fixture::new();
    let old = fx.write(
        "old.json",
        json!([
            {"name": "cert", "type": "file"},
            {"name": "port", "type": "integer", "default": "80"}
        ]),
    );
    let new = fx.write(
        "new.json",
        json!([
            {"name": "cert", "type": "file"},
            {"name": "key", "type": "file", "default": "absent.pem"}
        ]),
    );
    let config = fx.write("config.json", json!({"cert": "PEM", "port": 81}));

    assert!(
        fx.run(Command::Upgrade {
            old_schema: old,
            new_schema: new,
            config,
            attr: None,
            bundle: "b1".to_string(),
        })
        .await
        .is_err()
    );
    assert!(is_empty_dir(&fx.settings.engine.file_dir));
}

#[tokio::test]
async fn test_view_executor_wraps_secrets() {
    let fx = Fixture::new();
    let schema = fx.write("schema.json", schema());
    let config = fx.write("config.json", json!({"password": "pw"}));

    let output = json_output(
        fx.run(Command::View {
            schema,
            config,
            attr: None,
            format: ViewFormat::Executor,
            bundle: String::new(),
        })
        .await
        .unwrap(),
    );
    let wrapped = output["config"]["password"]["__ansible_vault"].as_str().unwrap();
    assert!(SecretVault::is_encrypted(wrapped));
    assert_eq!(output["config"]["cert"], Value::Null);
}

#[tokio::test]
async fn test_view_ui_lists_fields() {
    let fx = Fixture::new();
    let schema = fx.write("schema.json", schema());
    let config = fx.write("config.json", json!({}));

    let output = json_output(
        fx.run(Command::View {
            schema,
            config,
            attr: None,
            format: ViewFormat::Ui,
            bundle: String::new(),
        })
        .await
        .unwrap(),
    );
    let names: Vec<&str> = output
        .as_array()
        .unwrap()
        .iter()
        .map(|field| field["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["host", "port", "password", "cert"]);
    assert_eq!(output[1]["type"], json!("integer"));
}

#[tokio::test]
async fn test_upgrade_carries_changed_values() {
    let fx = Fixture::new();
    let old = fx.write(
        "old.json",
        json!([{"name": "host", "type": "string", "default": "a.com"}]),
    );
    let new = fx.write(
        "new.json",
        json!([
            {"name": "host", "type": "string", "default": "a.com"},
            {"name": "port", "type": "integer", "default": "42"}
        ]),
    );
    let config = fx.write("config.json", json!({"host": "b.com"}));

    let output = json_output(
        fx.run(Command::Upgrade {
            old_schema: old,
            new_schema: new,
            config,
            attr: None,
            bundle: String::new(),
        })
        .await
        .unwrap(),
    );
    assert_eq!(output["config"], json!({"host": "b.com", "port": 42}));
}

#[tokio::test]
async fn test_encrypt_decrypt() {
    let fx = Fixture::new();
    let blob = text_output(
        fx.run(Command::Encrypt {
            text: "s3cret".to_string(),
        })
        .await
        .unwrap(),
    );
    assert!(SecretVault::is_encrypted(&blob));

    let plain = text_output(fx.run(Command::Decrypt { blob }).await.unwrap());
    assert_eq!(plain, "s3cret");
}

#[tokio::test]
async fn test_encrypt_requires_key() {
    let settings = Settings::default();
    let err = run(
        Command::Encrypt {
            text: "x".to_string(),
        },
        &settings,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("vault key is not configured"));
}

#[tokio::test]
async fn test_generate_key_is_usable() {
    let fx = Fixture::new();
    let key = text_output(fx.run(Command::GenerateKey).await.unwrap());
    assert!(SecretVault::from_base64_key(&key).is_ok());
}

#[tokio::test]
async fn test_migrate_requires_url() {
    let fx = Fixture::new();
    let err = fx.run(Command::Migrate).await.unwrap_err();
    assert!(err.to_string().contains("database url is not configured"));
}

#[tokio::test]
async fn test_missing_schema_file() {
    let fx = Fixture::new();
    let err = fx
        .run(Command::Defaults {
            schema: fx.dir.path().join("absent.json"),
            bundle: String::new(),
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed to read"));
}
