use super::*;

#[test]
fn parses_json_array_in_order() {
    let seq = FrameSequence::parse(r#" ["data:image/png;base64,AA==", "BB==", "CC=="] "#).unwrap();
    let frames: Vec<String> = seq.into_iter().collect();
    assert_eq!(frames, vec!["data:image/png;base64,AA==", "BB==", "CC=="]);
}

#[test]
fn parses_whitespace_separated_tokens() {
    let seq = FrameSequence::parse("data:image/png;base64,AA==\ndata:image/png;base64,BB==\n\n")
        .unwrap();
    assert_eq!(seq.len(), 2);
    assert_eq!(seq.iter().nth(1).unwrap(), "data:image/png;base64,BB==");
}

#[test]
fn empty_or_malformed_output_is_a_sandbox_fault() {
    for bad in ["", "   \n", "[]", "[1, 2]", "[\"unterminated"] {
        let err = FrameSequence::parse(bad).unwrap_err();
        assert!(
            matches!(err, ReelError::SandboxFault(_)),
            "expected SandboxFault for {bad:?}, got {err}"
        );
    }
}
