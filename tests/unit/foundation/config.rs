use super::*;

#[test]
fn defaults_are_valid() {
    let cfg = PipelineConfig::default();
    cfg.validate().unwrap();
    assert_eq!(cfg.render_timeout(), Duration::from_secs(300));
    assert_eq!(cfg.artifact_ttl(), Duration::from_secs(3600));
    assert_eq!(cfg.output_fps().unwrap(), Fps { num: 30, den: 1 });
}

#[test]
fn partial_json_fills_defaults() {
    let cfg: PipelineConfig = serde_json::from_str(
        r#"{ "fps": 24, "renderer": { "program": "node", "args": ["render.js"] } }"#,
    )
    .unwrap();
    assert_eq!(cfg.fps, 24);
    assert_eq!(cfg.renderer.to_string(), "node render.js");
    assert_eq!(cfg.encoder, ToolCommand::new("ffmpeg"));
    assert_eq!(cfg.max_concurrent_jobs, 2);
}

#[test]
fn unknown_fields_are_rejected() {
    assert!(serde_json::from_str::<PipelineConfig>(r#"{ "fsp": 24 }"#).is_err());
}

#[test]
fn validation_catches_bad_values() {
    let bad = [
        PipelineConfig {
            render_timeout_secs: 0,
            ..Default::default()
        },
        PipelineConfig {
            poll_interval_ms: 1,
            ..Default::default()
        },
        PipelineConfig {
            fps: 0,
            ..Default::default()
        },
        PipelineConfig {
            max_concurrent_jobs: 0,
            ..Default::default()
        },
        PipelineConfig {
            base_url: "  ".to_string(),
            ..Default::default()
        },
        PipelineConfig {
            encoder: ToolCommand::new(""),
            ..Default::default()
        },
    ];
    for cfg in bad {
        assert!(matches!(cfg.validate(), Err(ReelError::Validation(_))));
    }
}

#[test]
fn tool_command_parse_splits_on_whitespace() {
    let cmd = ToolCommand::parse("  nice -n 10   ffmpeg ").unwrap();
    assert_eq!(cmd.program, "nice");
    assert_eq!(cmd.args, vec!["-n", "10", "ffmpeg"]);
    assert!(ToolCommand::parse("   ").is_err());
}

#[test]
fn from_json_file_reports_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cfg.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        PipelineConfig::from_json_file(&path),
        Err(ReelError::Validation(_))
    ));

    std::fs::write(&path, r#"{ "artifact_ttl_secs": 60 }"#).unwrap();
    let cfg = PipelineConfig::from_json_file(&path).unwrap();
    assert_eq!(cfg.artifact_ttl(), Duration::from_secs(60));
}
