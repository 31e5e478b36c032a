use digit_pin::api::{DigitPinSession, InputEvent, SessionOutcome};
use digit_pin::core::config::PipelineConfig;
use digit_pin::core::pin::PinValidationResult;
use digit_pin::core::vision::{
    CroppedFrame, Frame, FrameCropper, LatestFrameSource, RowOrder, StaticBackend,
    StillImageSource, TensorPreprocessor,
};

const SEVEN: [f32; 10] = [0.005, 0.005, 0.005, 0.005, 0.01, 0.01, 0.01, 0.94, 0.005, 0.005];

fn camera_frame(frame_number: u64) -> Frame {
    Frame::new(640, 480, vec![180u8; 640 * 480 * 4], frame_number).with_row_order(RowOrder::BottomUp)
}

#[test]
fn test_camera_frame_to_pin_slot() {
    digit_pin::init_logging();

    let config = PipelineConfig::default();
    let frame = camera_frame(1);

    let mut cropper = FrameCropper::new();
    let cropped: CroppedFrame = cropper.crop(&frame, config.crop_percent).unwrap().clone();
    assert_eq!((cropped.width(), cropped.height()), (320, 320));

    let tensor = TensorPreprocessor::new(config.tensor.clone())
        .unwrap()
        .to_tensor(&cropped)
        .unwrap();
    assert_eq!(tensor.shape(), &[1, 28, 28, 1]);

    let mut session =
        DigitPinSession::new(config, Box::new(StaticBackend::from_probabilities(&SEVEN))).unwrap();
    let mut camera = LatestFrameSource::new();
    camera.push(frame);

    let result = session.tick(&camera).unwrap();
    assert_eq!(result.predicted_digit(), 7);
    assert!((result.confidence - 0.94).abs() < 1e-4);
    assert_eq!(session.prediction_text(), "prediction: 7");

    assert_eq!(
        session.handle(InputEvent::Commit).unwrap(),
        SessionOutcome::Written { slot: 0, digit: 7 }
    );
    assert_eq!(session.slot_texts()[0], "7");
}

#[test]
fn test_wrong_pin_then_retry() {
    let mut session = DigitPinSession::new(
        PipelineConfig::default(),
        Box::new(StaticBackend::from_probabilities(&SEVEN)),
    )
    .unwrap();
    let mut camera = LatestFrameSource::new();

    // camera not ready: nothing to commit
    session.tick(&camera).unwrap();
    assert_eq!(session.handle(InputEvent::Commit).unwrap(), SessionOutcome::NoConfidentDigit);

    camera.push(camera_frame(1));
    session.tick(&camera).unwrap();
    for _ in 0..4 {
        session.handle(InputEvent::Commit).unwrap();
    }
    assert_eq!(session.handle(InputEvent::Commit).unwrap(), SessionOutcome::BufferFull);
    assert_eq!(session.pin().entered_code(), "7777");

    assert_eq!(
        session.handle(InputEvent::Validate).unwrap(),
        SessionOutcome::Validated(PinValidationResult::Incorrect)
    );
    assert_eq!(session.slot_texts(), vec!["-", "-", "-", "-"]);
    assert_eq!(session.pin().cursor(), 0);

    // camera drops out: last prediction is kept
    camera.clear();
    assert_eq!(session.tick(&camera).unwrap().predicted_digit(), 7);
}

#[test]
fn test_still_image_config_file_session() {
    let dir = tempfile::tempdir().unwrap();

    let config_path = dir.path().join("pin.json5");
    std::fs::write(
        &config_path,
        r#"{
            // code printed on the bird house
            crop_percent: 0.8,
            threshold: 0.9,
            pin: { reference_code: "7777", mask_char: "*" },
        }"#,
    )
    .unwrap();
    let config = PipelineConfig::from_file(&config_path).unwrap();

    let image_path = dir.path().join("seven.png");
    image::RgbaImage::from_pixel(120, 90, image::Rgba([0, 0, 0, 255]))
        .save(&image_path)
        .unwrap();
    let picture = StillImageSource::open(&image_path).unwrap();

    let mut session =
        DigitPinSession::new(config, Box::new(StaticBackend::from_probabilities(&SEVEN))).unwrap();
    for _ in 0..4 {
        session.tick(&picture).unwrap();
        session.handle(InputEvent::Commit).unwrap();
    }

    assert_eq!(session.slot_texts(), vec!["*", "*", "*", "*"]);
    assert_eq!(
        session.handle(InputEvent::Validate).unwrap(),
        SessionOutcome::Validated(PinValidationResult::Correct)
    );
    assert_eq!(session.verdict_text().as_deref(), Some("correct"));

    session.shutdown();
    assert!(session.tick(&picture).is_err());
}
