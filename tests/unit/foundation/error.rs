use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        ReelError::environment_unavailable("x")
            .to_string()
            .contains("environment unavailable:")
    );
    assert!(
        ReelError::malformed_frame("x")
            .to_string()
            .contains("malformed frame:")
    );
    assert!(
        ReelError::encoding_failed("x")
            .to_string()
            .contains("encoding failed:")
    );
    assert!(
        ReelError::sandbox_fault("x")
            .to_string()
            .contains("sandbox fault:")
    );
    assert_eq!(
        ReelError::RenderTimeout(Duration::from_millis(1500)).to_string(),
        "render timed out after 1.5s"
    );
}

#[test]
fn kinds_map_one_to_one() {
    assert_eq!(
        ReelError::encoder_unavailable("x").kind(),
        ErrorKind::EncoderUnavailable
    );
    assert_eq!(
        ReelError::RenderTimeout(Duration::from_secs(1)).kind(),
        ErrorKind::RenderTimeout
    );
    assert_eq!(ReelError::Cancelled.kind(), ErrorKind::Cancelled);
    assert_eq!(ReelError::validation("x").kind().as_str(), "Validation");
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = ReelError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
    assert_eq!(err.kind(), ErrorKind::Internal);
}
