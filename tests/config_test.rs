use std::io::Write;

use kafka_tail::AgentConfig;

const VALID: &str = r#"
scrape_configs:
  - job_name: kafka
    kafka:
      brokers: [localhost:9092]
      topics: ["^app-.*", audit]
      topic_poll_interval: 10s
      labels:
        job: kafka
    relabel_configs:
      - source_labels: [__meta_kafka_topic]
        target_label: topic
    pipeline_stages:
      - regex:
          expression: "level=(?P<level>\\w+)"
      - labels:
          level:
  - job_name: files
"#;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_and_check_config_file() {
    let file = write_config(VALID);
    let config = AgentConfig::from_file(file.path()).unwrap();
    assert_eq!(config.scrape_configs.len(), 2);

    let checked = config.check().unwrap();
    assert_eq!(checked.len(), 1);
    let kafka = checked[0].kafka.as_ref().unwrap();
    assert_eq!(kafka.group_id, "promtail");
    assert_eq!(kafka.version, "2.1.1");
    assert_eq!(kafka.topic_poll_interval, std::time::Duration::from_secs(10));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.yaml");
    let err = AgentConfig::from_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to read config file"));
}

#[test]
fn test_unknown_field_is_rejected() {
    let file = write_config("scrape_configs: []\nserver: {}\n");
    assert!(AgentConfig::from_file(file.path()).is_err());
}

#[test]
fn test_check_requires_a_kafka_scrape_config() {
    let config = AgentConfig::from_yaml("scrape_configs:\n  - job_name: files\n").unwrap();
    let err = config.check().unwrap_err();
    assert!(err.to_string().contains("No scrape config with a kafka section"));
}

#[test]
fn test_check_reports_the_failing_job() {
    let config = AgentConfig::from_yaml(
        r#"
scrape_configs:
  - job_name: broken
    kafka:
      brokers: [localhost:9092]
      topics: []
"#,
    )
    .unwrap();
    let err = config.check().unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Invalid scrape config 'broken'"));
    assert!(message.contains("topics"));
}

#[test]
fn test_check_validates_pipeline_stages() {
    let config = AgentConfig::from_yaml(
        r#"
scrape_configs:
  - job_name: staged
    kafka:
      brokers: [localhost:9092]
      topics: [app]
    pipeline_stages:
      - regex:
          expression: "(unclosed"
"#,
    )
    .unwrap();
    let err = config.check().unwrap_err();
    assert!(format!("{err:#}").contains("Invalid pipeline stages in 'staged'"));
}
