use std::path::Path;

use serde::Deserialize;
use synaptic_config::{parse_config, ConfigFormat};

#[derive(Debug, Deserialize)]
struct Settings {
    mongodb: MongoSection,
}

#[derive(Debug, Deserialize)]
struct MongoSection {
    connection_string: String,
    database: String,
    #[serde(default)]
    batch_size: Option<usize>,
}

// -- ConfigFormat::from_extension --

#[test]
fn format_from_extension() {
    assert_eq!(
        ConfigFormat::from_extension("TOML"),
        Some(ConfigFormat::Toml)
    );
    assert_eq!(
        ConfigFormat::from_extension("json"),
        Some(ConfigFormat::Json)
    );
    assert_eq!(
        ConfigFormat::from_extension("yml"),
        Some(ConfigFormat::Yaml)
    );
    assert_eq!(ConfigFormat::from_extension("xml"), None);
    assert_eq!(ConfigFormat::from_extension(""), None);
}

#[test]
fn format_from_path() {
    assert_eq!(
        ConfigFormat::from_path(Path::new("/etc/app/synaptic.yaml")),
        Some(ConfigFormat::Yaml)
    );
    assert_eq!(ConfigFormat::from_path(Path::new("Makefile")), None);
}

// -- parse_config --

#[test]
fn parse_config_toml() {
    let content = r#"
[mongodb]
connection_string = "mongodb://localhost:27017"
database = "rag"
batch_size = 500
"#;
    let settings: Settings = parse_config(content, ConfigFormat::Toml).unwrap();
    assert_eq!(settings.mongodb.connection_string, "mongodb://localhost:27017");
    assert_eq!(settings.mongodb.database, "rag");
    assert_eq!(settings.mongodb.batch_size, Some(500));
}

#[test]
fn parse_config_json() {
    let content = r#"{"mongodb": {"connection_string": "mongodb://h", "database": "db"}}"#;
    let settings: Settings = parse_config(content, ConfigFormat::Json).unwrap();
    assert_eq!(settings.mongodb.database, "db");
    assert_eq!(settings.mongodb.batch_size, None);
}

#[test]
fn parse_config_yaml() {
    let content = "mongodb:\n  connection_string: mongodb://h\n  database: docs\n";
    let settings: Settings = parse_config(content, ConfigFormat::Yaml).unwrap();
    assert_eq!(settings.mongodb.database, "docs");
}

#[test]
fn parse_config_expands_defaults() {
    let content = r#"
[mongodb]
connection_string = "${SYNAPTIC_TEST_UNSET_URI:-mongodb://fallback:27017}"
database = "rag"
"#;
    let settings: Settings = parse_config(content, ConfigFormat::Toml).unwrap();
    assert_eq!(
        settings.mongodb.connection_string,
        "mongodb://fallback:27017"
    );
}

#[test]
fn parse_config_unset_variable_fails() {
    let content = r#"
[mongodb]
connection_string = "${SYNAPTIC_TEST_DEFINITELY_UNSET}"
database = "rag"
"#;
    let result: Result<Settings, _> = parse_config(content, ConfigFormat::Toml);
    assert!(result.is_err());
}

#[test]
fn parse_config_invalid() {
    let result: Result<Settings, _> = parse_config("not valid {{{", ConfigFormat::Toml);
    assert!(result.is_err());

    let result: Result<Settings, _> = parse_config("not valid json", ConfigFormat::Json);
    assert!(result.is_err());

    let result: Result<Settings, _> = parse_config(":\n  bad:\nyaml: [", ConfigFormat::Yaml);
    assert!(result.is_err());
}
