use std::path::{Path, PathBuf};

use kinmatch_vision::{Encoder, ExtractError};

fn model_path() -> PathBuf {
    std::env::var("KINMATCH_TEST_MODEL")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("models/face_recognition_sface_2021dec.onnx"))
}

#[test]
fn test_missing_model_is_model_load_error() {
    let missing = Path::new("does/not/exist.onnx");
    match Encoder::from_file(missing) {
        Err(ExtractError::ModelLoad { path, .. }) => assert_eq!(path, missing),
        Err(other) => panic!("expected ModelLoad, got {other}"),
        Ok(_) => panic!("loading a missing model must fail"),
    }
}

#[test]
fn test_embedding_is_unit_length() {
    env_logger::try_init().ok();
    let model = model_path();
    if !model.exists() {
        eprintln!("Skipping: model {} not found", model.display());
        return;
    }

    let encoder = Encoder::from_file(&model).expect("model loads");
    let face = image::DynamicImage::new_rgb8(112, 112);
    match encoder.embed_image(&face, Path::new("blank.png")) {
        Ok(embedding) => {
            let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            println!("embedding dim {} norm {:.6}", embedding.len(), norm);
            assert!((norm - 1.0).abs() < 1e-4);
        }
        // a blank frame may legitimately collapse to a zero vector
        Err(ExtractError::NoFaceDetected { .. }) => {}
        Err(e) => panic!("unexpected error: {e}"),
    }
}

#[test]
fn test_small_image_has_no_face() {
    let model = model_path();
    if !model.exists() {
        eprintln!("Skipping: model {} not found", model.display());
        return;
    }

    let encoder = Encoder::from_file(&model)
        .expect("model loads")
        .with_min_face_size(64);
    let tiny = image::DynamicImage::new_rgb8(16, 16);
    let err = encoder
        .embed_image(&tiny, Path::new("tiny.png"))
        .unwrap_err();
    assert!(matches!(err, ExtractError::NoFaceDetected { .. }));
}

#[test]
fn test_unreadable_image() {
    let model = model_path();
    if !model.exists() {
        eprintln!("Skipping: model {} not found", model.display());
        return;
    }

    let encoder = Encoder::from_file(&model).expect("model loads");
    let err = encoder
        .embed_file(Path::new("no/such/face.png"))
        .unwrap_err();
    assert!(matches!(err, ExtractError::UnreadableImage { .. }));
}
