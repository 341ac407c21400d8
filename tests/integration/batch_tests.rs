//! Directory-level batch runs.

use wsi_tissue_mask::batch::{run_batch, BatchConfig};
use wsi_tissue_mask::error::{BatchError, MaskError};
use wsi_tissue_mask::ProcessingParams;

use super::test_utils::{disc_pyramid, file_names, SlideBuilder};

fn config(input_dir: &std::path::Path, output_dir: &std::path::Path) -> BatchConfig {
    BatchConfig {
        input_dir: input_dir.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        output_format: "png".to_string(),
        params: ProcessingParams {
            max_level: Some(1),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn test_failing_slide_does_not_stop_batch() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("slides");
    std::fs::create_dir(&input_dir).unwrap();

    SlideBuilder::new(disc_pyramid(128, 96, 3)).write_to(&input_dir, "a_good.tif");
    std::fs::write(input_dir.join("b_broken.svs"), b"definitely not a tiff").unwrap();
    SlideBuilder::new(disc_pyramid(64, 64, 2)).write_to(&input_dir, "c_good.svs");
    std::fs::write(input_dir.join("readme.txt"), b"ignored").unwrap();

    let output_dir = dir.path().join("masked");
    let summary = run_batch(&config(&input_dir, &output_dir)).await.unwrap();

    assert_eq!(summary.total(), 3);
    assert_eq!(summary.processed.len(), 2);
    assert_eq!(summary.failed.len(), 1);
    assert!(!summary.is_success());
    assert!(summary.failed[0].path.ends_with("b_broken.svs"));
    assert!(matches!(
        summary.failed[0].source,
        MaskError::UnreadableSlide { .. }
    ));

    assert_eq!(
        file_names(&output_dir),
        vec![
            "a_good.png",
            "a_good_level1.png",
            "a_good_metadata.json",
            "c_good.png",
            "c_good_level1.png",
            "c_good_metadata.json",
        ]
    );
}

#[tokio::test]
async fn test_pyramid_batch_ignores_output_format() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("slides");
    std::fs::create_dir(&input_dir).unwrap();
    SlideBuilder::new(disc_pyramid(128, 128, 2)).write_to(&input_dir, "s.tiff");

    let output_dir = dir.path().join("out");
    let mut config = config(&input_dir, &output_dir);
    config.params.pyramid = true;

    let summary = run_batch(&config).await.unwrap();
    assert!(summary.is_success());
    assert_eq!(file_names(&output_dir), vec!["s.tiff", "s_metadata.json"]);
}

#[tokio::test]
async fn test_empty_input_directory() {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("out");

    let summary = run_batch(&config(dir.path(), &output_dir)).await.unwrap();
    assert_eq!(summary.total(), 0);
    assert!(!output_dir.exists());
}

#[tokio::test]
async fn test_invalid_config_rejected_before_processing() {
    let dir = tempfile::tempdir().unwrap();
    SlideBuilder::new(disc_pyramid(64, 64, 1)).write_to(dir.path(), "s.tif");
    let output_dir = dir.path().join("out");

    let mut config = config(dir.path(), &output_dir);
    config.params.threshold = Some(-1);
    assert!(matches!(
        run_batch(&config).await,
        Err(BatchError::Invalid(_))
    ));
    assert!(!output_dir.exists());

    let missing = config_for_missing(dir.path());
    assert!(matches!(
        run_batch(&missing).await,
        Err(BatchError::Directory { .. })
    ));
}

fn config_for_missing(root: &std::path::Path) -> BatchConfig {
    config(&root.join("does-not-exist"), &root.join("out2"))
}

#[tokio::test]
async fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "input_dir": "slides",
            "output_dir": "masked",
            "output_format": "tiff",
            "clean_mask": true,
            "min_area": 50,
            "levels": [0, 2],
            "pyramid": false,
            "compression": "zlib"
        }"#,
    )
    .unwrap();

    let config = BatchConfig::load(&path).unwrap();
    assert_eq!(config.output_format, "tiff");
    assert_eq!(config.params.levels, Some(vec![0, 2]));
    assert!(config.params.clean_mask);
    assert!(config.validate().is_ok());

    assert!(matches!(
        BatchConfig::load(&dir.path().join("missing.json")),
        Err(BatchError::ConfigRead { .. })
    ));
}
