//! Slide opening and level decoding against synthetic TIFF files.

use image::{GenericImageView, Rgb, RgbImage};

use wsi_tissue_mask::error::{FormatError, IoError, MaskError, SlideError};
use wsi_tissue_mask::format::SlideFormat;
use wsi_tissue_mask::slide::{open_slide, Region, SlideReader};

use super::test_utils::{disc_pyramid, SlideBuilder, TileEncoding, TISSUE, WHITE};

fn assert_close(actual: &Rgb<u8>, expected: &Rgb<u8>, tolerance: u8) {
    for c in 0..3 {
        assert!(
            actual[c].abs_diff(expected[c]) <= tolerance,
            "pixel {actual:?} differs from {expected:?}"
        );
    }
}

// =============================================================================
// Level Geometry
// =============================================================================

#[tokio::test]
async fn test_open_four_level_pyramid() {
    let dir = tempfile::tempdir().unwrap();
    let path = SlideBuilder::new(disc_pyramid(256, 192, 4)).write_to(dir.path(), "slide.tif");

    let slide = open_slide(&path).await.unwrap();
    assert_eq!(slide.level_count(), 4);
    assert_eq!(slide.dimensions(), Some((256, 192)));
    assert_eq!(slide.format(), SlideFormat::GenericTiff);
    assert_eq!(slide.format_name(), "Generic Pyramidal TIFF");
    assert!(slide.metadata().is_none());
    assert_eq!(slide.mpp(), None);
    assert_eq!(slide.tile_size(0), Some((16, 16)));
    assert_eq!(slide.tile_size(4), None);

    let dims: Vec<_> = slide.levels().iter().map(|l| l.dimensions()).collect();
    assert_eq!(dims, vec![(256, 192), (64, 48), (16, 12), (4, 3)]);

    let downsamples: Vec<_> = slide.levels().iter().map(|l| l.downsample).collect();
    assert_eq!(downsamples, vec![1.0, 4.0, 16.0, 64.0]);
    assert!(slide.source().contains("slide.tif"));
}

#[tokio::test]
async fn test_level_out_of_range() {
    let dir = tempfile::tempdir().unwrap();
    let path = SlideBuilder::new(disc_pyramid(64, 64, 2)).write_to(dir.path(), "slide.tif");
    let slide = open_slide(&path).await.unwrap();

    let err = slide.read_level(5, None).await.unwrap_err();
    assert!(matches!(
        err,
        SlideError::LevelOutOfRange {
            level: 5,
            level_count: 2
        }
    ));
    assert!(matches!(
        MaskError::from(err),
        MaskError::LevelOutOfRange { level: 5, .. }
    ));
}

// =============================================================================
// Decoding
// =============================================================================

#[tokio::test]
async fn test_read_level_stitches_partial_edge_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let levels = disc_pyramid(250, 190, 3);
    let path = SlideBuilder::new(levels.clone())
        .tile_size(32)
        .write_to(dir.path(), "edges.tif");
    let slide = open_slide(&path).await.unwrap();

    for (index, expected) in levels.iter().enumerate() {
        let raster = slide.read_level(index, None).await.unwrap();
        assert_eq!(raster.dimensions(), expected.dimensions());
        assert_eq!(&raster, expected, "level {index} differs");
    }
}

#[tokio::test]
async fn test_read_region_across_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let levels = disc_pyramid(128, 128, 2);
    let path = SlideBuilder::new(levels.clone()).write_to(dir.path(), "slide.tif");
    let slide = open_slide(&path).await.unwrap();

    let region = Region::new(10, 20, 40, 30);
    let raster = slide.read_level(0, Some(region)).await.unwrap();
    let expected = levels[0].view(10, 20, 40, 30).to_image();
    assert_eq!(raster, expected);

    let err = slide
        .read_level(0, Some(Region::new(100, 100, 64, 64)))
        .await
        .unwrap_err();
    assert!(matches!(err, SlideError::RegionOutOfBounds { level: 0, .. }));
}

#[tokio::test]
async fn test_big_endian_and_bigtiff_variants() {
    let dir = tempfile::tempdir().unwrap();
    let levels = disc_pyramid(96, 64, 2);

    let variants = [
        ("be.tif", SlideBuilder::new(levels.clone()).big_endian()),
        ("big.tif", SlideBuilder::new(levels.clone()).bigtiff()),
        ("bigbe.tif", SlideBuilder::new(levels.clone()).bigtiff().big_endian()),
    ];
    for (name, builder) in variants {
        let path = builder.write_to(dir.path(), name);
        let slide = open_slide(&path).await.unwrap();
        assert_eq!(slide.level_count(), 2, "{name}");
        let raster = slide.read_level(1, None).await.unwrap();
        assert_eq!(raster, levels[1], "{name}");
    }
}

#[tokio::test]
async fn test_jpeg_tiles_with_aperio_description() {
    let dir = tempfile::tempdir().unwrap();
    let levels = disc_pyramid(256, 256, 2);
    let path = SlideBuilder::new(levels)
        .tile_size(64)
        .encoding(TileEncoding::Jpeg)
        .aperio(0.499, 20)
        .write_to(dir.path(), "slide.svs");

    let slide = open_slide(&path).await.unwrap();
    assert_eq!(slide.format(), SlideFormat::AperioSvs);
    assert_eq!(slide.tile_size(1), Some((64, 64)));
    let metadata = slide.metadata().unwrap();
    assert_eq!(
        metadata.software.as_deref(),
        Some("Aperio Image Library v12.0.5")
    );
    assert_eq!(metadata.properties.get("AppMag").map(String::as_str), Some("20"));
    assert_eq!(slide.mpp(), Some(0.499));
    assert_eq!(slide.magnification(), Some(20.0));

    let raster = slide.read_level(0, None).await.unwrap();
    assert_eq!(raster.dimensions(), (256, 256));
    assert_close(raster.get_pixel(128, 128), &TISSUE, 12);
    assert_close(raster.get_pixel(2, 2), &WHITE, 12);
}

#[tokio::test]
async fn test_sparse_tile_reads_as_white() {
    let dir = tempfile::tempdir().unwrap();
    let base = RgbImage::from_pixel(32, 32, TISSUE);
    // Tile 3 is the bottom-right one of the 2x2 grid
    let path = SlideBuilder::new(vec![base])
        .tile_size(16)
        .sparse_tile(0, 3)
        .write_to(dir.path(), "sparse.tif");

    let slide = open_slide(&path).await.unwrap();
    let raster = slide.read_level(0, None).await.unwrap();
    assert_eq!(raster.get_pixel(0, 0), &TISSUE);
    assert_eq!(raster.get_pixel(20, 20), &WHITE);
    assert_eq!(raster.get_pixel(31, 31), &WHITE);
}

// =============================================================================
// Unreadable Inputs
// =============================================================================

#[tokio::test]
async fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = open_slide(dir.path().join("absent.svs")).await.unwrap_err();
    assert!(matches!(
        err,
        SlideError::Format(FormatError::Io(IoError::NotFound(_)))
    ));
    assert!(matches!(
        MaskError::from(err),
        MaskError::UnreadableSlide { .. }
    ));
}

#[tokio::test]
async fn test_non_tiff_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.svs");
    std::fs::write(&path, b"this is not a slide, just some text").unwrap();

    let err = open_slide(&path).await.unwrap_err();
    assert!(matches!(
        err,
        SlideError::Format(FormatError::UnsupportedFormat { .. })
    ));
}

#[tokio::test]
async fn test_stripped_tiff_rejected() {
    use tiff::encoder::{colortype, TiffEncoder};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strips.tif");
    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = TiffEncoder::new(file).unwrap();
    let raw = vec![200u8; 8 * 8 * 3];
    encoder
        .write_image::<colortype::RGB8>(8, 8, &raw)
        .unwrap();

    let err = open_slide(&path).await.unwrap_err();
    match MaskError::from(err) {
        MaskError::UnreadableSlide { reason } => assert!(reason.contains("strips")),
        other => panic!("unexpected error: {other:?}"),
    }
}
