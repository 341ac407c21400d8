//! End-to-end processing of synthetic slides.

use std::path::Path;

use image::Rgb;

use wsi_tissue_mask::error::MaskError;
use wsi_tissue_mask::output::OutputCompression;
use wsi_tissue_mask::pipeline::{process_slide, ProcessingParams};
use wsi_tissue_mask::ProcessingMetadata;

use super::test_utils::{
    disc_pyramid, file_names, read_tiff_rgb, tiff_page_dimensions, SlideBuilder, TileEncoding,
    TISSUE, WHITE,
};

/// A 4-level slide with downsamples 1, 4, 16 and 64.
fn four_level_slide(dir: &Path) -> std::path::PathBuf {
    SlideBuilder::new(disc_pyramid(256, 192, 4)).write_to(dir, "slide.tif")
}

fn read_metadata(path: &Path) -> ProcessingMetadata {
    let text = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&text).unwrap()
}

// =============================================================================
// Level Selection
// =============================================================================

#[tokio::test]
async fn test_selected_levels_with_clean_mask() {
    let dir = tempfile::tempdir().unwrap();
    let input = four_level_slide(dir.path());
    let out_dir = dir.path().join("out");

    let params = ProcessingParams {
        levels: Some(vec![0, 2]),
        clean_mask: true,
        min_area: 50,
        ..Default::default()
    };
    let metadata = process_slide(&input, &out_dir.join("slide.tiff"), &params)
        .await
        .unwrap();

    assert_eq!(metadata.levels_processed, vec![0, 2]);
    assert!(metadata.clean_mask);
    assert_eq!(metadata.min_area, 50);
    assert_eq!(metadata.detection_level, 0);
    assert!(!metadata.pyramid);
    assert_eq!(
        file_names(&out_dir),
        vec!["slide.tiff", "slide_level2.tiff", "slide_metadata.json"]
    );

    // Sidecar on disk is exactly what was returned
    assert_eq!(read_metadata(&out_dir.join("slide_metadata.json")), metadata);

    let level0 = read_tiff_rgb(&out_dir.join("slide.tiff"));
    assert_eq!(level0.dimensions(), (256, 192));
    assert_eq!(level0.get_pixel(128, 96), &TISSUE);
    assert_eq!(level0.get_pixel(1, 1), &WHITE);

    let level2 = read_tiff_rgb(&out_dir.join("slide_level2.tiff"));
    assert_eq!(level2.dimensions(), (16, 12));
    assert_eq!(level2.get_pixel(8, 6), &TISSUE);
}

#[tokio::test]
async fn test_max_level_limits_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let input = four_level_slide(dir.path());
    let out_dir = dir.path().join("out");

    let params = ProcessingParams {
        max_level: Some(1),
        ..Default::default()
    };
    let metadata = process_slide(&input, &out_dir.join("slide.tif"), &params)
        .await
        .unwrap();

    assert_eq!(metadata.levels_processed, vec![0, 1]);
    assert_eq!(metadata.levels.len(), 2);
    assert_eq!(metadata.levels[1].downsample, 4.0);
    assert_eq!(
        file_names(&out_dir),
        vec!["slide.tif", "slide_level1.tif", "slide_metadata.json"]
    );
}

// =============================================================================
// Fail-Fast Errors
// =============================================================================

#[tokio::test]
async fn test_invalid_threshold_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = four_level_slide(dir.path());
    let out_dir = dir.path().join("out");

    let params = ProcessingParams {
        threshold: Some(300),
        ..Default::default()
    };
    let err = process_slide(&input, &out_dir.join("slide.tiff"), &params)
        .await
        .unwrap_err();

    assert!(matches!(err.source, MaskError::InvalidThreshold(300)));
    assert!(!out_dir.exists());
}

#[tokio::test]
async fn test_out_of_range_level_fails_before_decoding() {
    let dir = tempfile::tempdir().unwrap();
    let input = four_level_slide(dir.path());
    let out_dir = dir.path().join("out");

    let params = ProcessingParams {
        levels: Some(vec![0, 7]),
        ..Default::default()
    };
    let err = process_slide(&input, &out_dir.join("slide.tiff"), &params)
        .await
        .unwrap_err();

    assert!(matches!(
        err.source,
        MaskError::LevelOutOfRange {
            level: 7,
            level_count: 4
        }
    ));
    assert!(!out_dir.exists());
}

#[tokio::test]
async fn test_corrupt_slide_is_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.svs");
    // Valid header, first IFD pointing far past the end of the file
    let mut bytes = b"II*\0".to_vec();
    bytes.extend_from_slice(&0x00FF_FFFFu32.to_le_bytes());
    std::fs::write(&input, bytes).unwrap();

    let out_dir = dir.path().join("out");
    let err = process_slide(&input, &out_dir.join("broken.png"), &ProcessingParams::default())
        .await
        .unwrap_err();

    assert!(matches!(err.source, MaskError::UnreadableSlide { .. }));
    assert!(err.path.ends_with("broken.svs"));
    assert!(!out_dir.exists());
}

// =============================================================================
// Output Modes
// =============================================================================

#[tokio::test]
async fn test_pyramid_output_holds_every_level() {
    let dir = tempfile::tempdir().unwrap();
    let input = four_level_slide(dir.path());
    let out_dir = dir.path().join("out");

    let params = ProcessingParams {
        pyramid: true,
        compression: OutputCompression::Zlib,
        ..Default::default()
    };
    // The extension is forced to .tiff in pyramid mode
    let metadata = process_slide(&input, &out_dir.join("slide.png"), &params)
        .await
        .unwrap();

    let pyramid = out_dir.join("slide.tiff");
    assert_eq!(metadata.levels_processed, vec![0, 1, 2, 3]);
    assert_eq!(metadata.output_paths, vec![pyramid.display().to_string()]);
    assert_eq!(metadata.compression, OutputCompression::Zlib);
    assert!(metadata
        .levels
        .iter()
        .all(|l| l.output_path == pyramid.display().to_string()));

    assert_eq!(
        tiff_page_dimensions(&pyramid),
        vec![(256, 192), (64, 48), (16, 12), (4, 3)]
    );
    assert_eq!(
        file_names(&out_dir),
        vec!["slide.tiff", "slide_metadata.json"]
    );
}

#[tokio::test]
async fn test_compressions_decode_identically() {
    let dir = tempfile::tempdir().unwrap();
    let input = four_level_slide(dir.path());

    let mut decoded = Vec::new();
    for compression in [
        OutputCompression::Lzw,
        OutputCompression::Zlib,
        OutputCompression::None,
    ] {
        let output = dir
            .path()
            .join(compression.as_str())
            .join("slide.tiff");
        let params = ProcessingParams {
            levels: Some(vec![1]),
            compression,
            ..Default::default()
        };
        let metadata = process_slide(&input, &output, &params).await.unwrap();
        assert_eq!(metadata.output_paths.len(), 1);
        decoded.push(read_tiff_rgb(Path::new(&metadata.output_paths[0])));
    }

    assert_eq!(decoded[0], decoded[1]);
    assert_eq!(decoded[0], decoded[2]);
}

#[tokio::test]
async fn test_png_output_with_saved_mask() {
    let dir = tempfile::tempdir().unwrap();
    let input = four_level_slide(dir.path());
    let out_dir = dir.path().join("out");

    let params = ProcessingParams {
        levels: Some(vec![1]),
        save_mask: true,
        ..Default::default()
    };
    let metadata = process_slide(&input, &out_dir.join("slide.png"), &params)
        .await
        .unwrap();

    let mask_path = out_dir.join("slide_mask.png");
    assert_eq!(metadata.mask_path, Some(mask_path.display().to_string()));
    assert_eq!(
        file_names(&out_dir),
        vec!["slide_level1.png", "slide_mask.png", "slide_metadata.json"]
    );

    // Tissue is black in the mask snapshot
    let mask = image::open(&mask_path).unwrap().to_luma8();
    assert_eq!(mask.dimensions(), (256, 192));
    assert_eq!(mask.get_pixel(128, 96).0, [0]);
    assert_eq!(mask.get_pixel(0, 0).0, [255]);

    let level1 = image::open(out_dir.join("slide_level1.png"))
        .unwrap()
        .to_rgb8();
    assert_eq!(level1.dimensions(), (64, 48));
    assert_eq!(level1.get_pixel(32, 24), &TISSUE);
    assert_eq!(level1.get_pixel(0, 0), &WHITE);
}

// =============================================================================
// Thresholds and Metadata
// =============================================================================

#[tokio::test]
async fn test_zero_threshold_whitens_everything() {
    let dir = tempfile::tempdir().unwrap();
    let input = four_level_slide(dir.path());
    let out_dir = dir.path().join("out");

    let params = ProcessingParams {
        threshold: Some(0),
        levels: Some(vec![2]),
        ..Default::default()
    };
    let metadata = process_slide(&input, &out_dir.join("slide.tiff"), &params)
        .await
        .unwrap();

    assert_eq!(metadata.threshold_used, 0);
    assert_eq!(metadata.threshold_requested, Some(0));
    assert_eq!(metadata.levels[0].tissue_fraction, 0.0);

    let level2 = read_tiff_rgb(&out_dir.join("slide_level2.tiff"));
    assert!(level2.pixels().all(|p| *p == WHITE));
}

#[tokio::test]
async fn test_otsu_threshold_separates_tissue() {
    let dir = tempfile::tempdir().unwrap();
    let input = four_level_slide(dir.path());

    let params = ProcessingParams {
        levels: Some(vec![3]),
        ..Default::default()
    };
    let metadata = process_slide(&input, &dir.path().join("o/slide.tiff"), &params)
        .await
        .unwrap();

    // Luma of the tissue colour is 87, background is 255
    assert!(metadata.threshold_requested.is_none());
    assert!(metadata.threshold_used >= 87 && metadata.threshold_used < 255);
    assert!(metadata.detection_tissue_fraction > 0.2);
    assert!(metadata.detection_tissue_fraction < 0.5);
}

#[tokio::test]
async fn test_aperio_properties_reach_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let input = SlideBuilder::new(disc_pyramid(256, 256, 2))
        .tile_size(64)
        .encoding(TileEncoding::Jpeg)
        .aperio(0.25, 40)
        .write_to(dir.path(), "aperio.svs");

    let params = ProcessingParams {
        levels: Some(vec![1]),
        detection_level: Some(1),
        ..Default::default()
    };
    let metadata = process_slide(&input, &dir.path().join("out/aperio.png"), &params)
        .await
        .unwrap();

    assert_eq!(metadata.detection_level, 1);
    assert_eq!(metadata.detection_dimensions, [64, 64]);
    assert_eq!(metadata.slide.format, "Aperio SVS");
    assert_eq!(metadata.slide.mpp, Some(0.25));
    assert_eq!(metadata.slide.magnification, Some(40.0));
    assert_eq!(metadata.slide.level_count, 2);
    assert!(metadata.source_path.ends_with("aperio.svs"));

    let level1 = image::open(dir.path().join("out/aperio_level1.png"))
        .unwrap()
        .to_rgb8();
    assert_eq!(level1.get_pixel(0, 0), &Rgb([255, 255, 255]));
}
