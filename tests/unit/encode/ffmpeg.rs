use super::*;

fn cfg(width: u32, height: u32, fps: Fps, out_path: PathBuf, encoder: ToolCommand) -> EncodeConfig {
    EncodeConfig {
        width,
        height,
        fps,
        out_path,
        encoder,
        bg_rgba: [0, 0, 0, 255],
    }
}

fn solid(width: u32, height: u32, px: [u8; 4]) -> FrameRGBA {
    FrameRGBA {
        width,
        height,
        data: px.repeat((width * height) as usize),
    }
}

#[test]
fn config_validation_catches_bad_values() {
    let fps = Fps { num: 30, den: 1 };
    let out = PathBuf::from("artifacts/out.mp4");
    let ffmpeg = ToolCommand::new("ffmpeg");

    assert!(cfg(0, 10, fps, out.clone(), ffmpeg.clone()).validate().is_err());
    assert!(
        cfg(10, 10, Fps { num: 0, den: 1 }, out.clone(), ffmpeg.clone())
            .validate()
            .is_err()
    );
    // Odd sizes are padded by the encoder, not rejected.
    assert!(cfg(11, 7, fps, out, ffmpeg).validate().is_ok());
}

#[test]
fn flatten_straight_over_black_produces_expected_rgb() {
    // Straight red @ 50% alpha => rgb becomes 128,0,0 over black.
    let src = vec![255u8, 0u8, 0u8, 128u8];
    let mut dst = vec![0u8; 4];
    flatten_to_opaque_rgba8(&mut dst, &src, [0, 0, 0, 255]).unwrap();
    assert_eq!(dst, vec![128u8, 0u8, 0u8, 255u8]);
}

#[test]
fn flatten_alpha_0_returns_bg_and_opaque_is_identity() {
    let mut dst = vec![0u8; 8];
    flatten_to_opaque_rgba8(&mut dst, &[9, 9, 9, 0, 1, 2, 3, 255], [10, 20, 30, 255]).unwrap();
    assert_eq!(dst, vec![10, 20, 30, 255, 1, 2, 3, 255]);
}

#[tokio::test]
async fn missing_encoder_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let err = FfmpegEncoder::spawn(cfg(
        2,
        2,
        Fps { num: 30, den: 1 },
        dir.path().join("out.mp4"),
        ToolCommand::new("ffmpeg-that-does-not-exist-9f2e"),
    ))
    .err()
    .unwrap();
    assert!(matches!(err, ReelError::EncoderUnavailable(_)));
}

#[cfg(unix)]
mod scripted {
    use super::*;

    fn script(dir: &Path, body: &str) -> ToolCommand {
        let path = dir.join("encoder.sh");
        std::fs::write(&path, body).unwrap();
        ToolCommand::new("sh").with_args([path.to_string_lossy().into_owned()])
    }

    #[tokio::test]
    async fn frames_reach_the_encoder_in_order_and_flattened() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = script(dir.path(), "for a in \"$@\"; do out=\"$a\"; done\nexec cat > \"$out\"\n");
        let out = dir.path().join("nested").join("out.bin");
        let mut enc =
            FfmpegEncoder::spawn(cfg(2, 2, Fps { num: 30, den: 1 }, out.clone(), encoder))
                .unwrap();

        enc.encode_frame(&solid(2, 2, [1, 2, 3, 255])).await.unwrap();
        enc.encode_frame(&solid(2, 2, [255, 0, 0, 128])).await.unwrap();
        assert_eq!(enc.frames_written(), 2);
        assert_eq!(enc.finish().await.unwrap(), 2);

        let bytes = std::fs::read(&out).unwrap();
        assert_eq!(bytes.len(), 2 * 16);
        assert_eq!(&bytes[..4], &[1, 2, 3, 255]);
        assert_eq!(&bytes[16..20], &[128, 0, 0, 255]);
    }

    #[tokio::test]
    async fn size_mismatch_is_a_malformed_frame() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = script(dir.path(), "cat > /dev/null\n");
        let mut enc = FfmpegEncoder::spawn(cfg(
            2,
            2,
            Fps { num: 30, den: 1 },
            dir.path().join("out.mp4"),
            encoder,
        ))
        .unwrap();
        let err = enc.encode_frame(&solid(4, 2, [0, 0, 0, 255])).await.unwrap_err();
        assert!(matches!(err, ReelError::MalformedFrame(_)));
        enc.abort().await;
    }

    #[tokio::test]
    async fn encoder_dying_mid_stream_is_encoding_failed() {
        let dir = tempfile::tempdir().unwrap();
        // Accept three 2x2 frames, then fail.
        let encoder = script(
            dir.path(),
            "head -c 48 > /dev/null\necho 'boom after 3 frames' >&2\nexit 1\n",
        );
        let mut enc = FfmpegEncoder::spawn(cfg(
            2,
            2,
            Fps { num: 30, den: 1 },
            dir.path().join("out.mp4"),
            encoder,
        ))
        .unwrap();

        let mut result = Ok(());
        for _ in 0..5 {
            result = enc.encode_frame(&solid(2, 2, [7, 7, 7, 255])).await;
            if result.is_err() {
                break;
            }
        }
        let err = match result {
            Err(e) => e,
            Ok(()) => enc.finish().await.unwrap_err(),
        };
        match err {
            ReelError::EncodingFailed(msg) => assert!(msg.contains("boom after 3 frames"), "{msg}"),
            other => panic!("expected EncodingFailed, got {other}"),
        }
    }
}
