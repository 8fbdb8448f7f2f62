//! Region compositing over finalized containers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use proptest::prelude::*;

use zisraw::{
    CompositeError, Container, Coordinate, GradationCurve, IntRect, OpenOptions, PixelBuffer,
    PixelType, RegionRequest, Rgb, SubBlockSpec, WriterOptions,
};

use super::test_utils::{build_container, gray8, open_bytes, TrackingReader};

fn tile(coordinate: &str, level: u8, rect: IntRect) -> SubBlockSpec {
    SubBlockSpec::new(coordinate.parse().unwrap(), rect).level(level)
}

#[test]
fn test_two_tiles_stitch_into_one_region() {
    let bytes = build_container(WriterOptions::default(), |writer| {
        writer
            .add_subblock(tile("C0M0", 0, IntRect::new(0, 0, 100, 100)), &gray8(100, 100, 40))
            .unwrap();
        writer
            .add_subblock(tile("C0M1", 0, IntRect::new(100, 0, 100, 100)), &gray8(100, 100, 160))
            .unwrap();
    });
    let container = open_bytes(bytes);

    let raw = container
        .read_region(&Coordinate::new(), 0, 0, IntRect::new(0, 0, 200, 100))
        .unwrap();
    assert_eq!((raw.width(), raw.height()), (200, 100));
    assert_eq!(raw.sample(99, 50, 0), 40.0);
    assert_eq!(raw.sample(100, 50, 0), 160.0);

    let raster = container
        .composite(&RegionRequest::new(IntRect::new(0, 0, 200, 100)))
        .unwrap();
    assert_eq!((raster.width(), raster.height()), (200, 100));
    assert_eq!(raster.pixel_type(), PixelType::Bgr24);
    // No stored setting: white tint, identity curve
    assert_eq!(raster.pixels().sample(10, 10, 0), 40.0);
    assert_eq!(raster.pixels().sample(150, 10, 2), 160.0);
}

#[test]
fn test_background_and_empty_region() {
    let bytes = build_container(WriterOptions::default(), |writer| {
        writer
            .add_subblock(tile("C0T0", 0, IntRect::new(0, 0, 10, 10)), &gray8(10, 10, 255))
            .unwrap();
    });
    let container = open_bytes(bytes);

    let raster = container
        .composite(&RegionRequest::new(IntRect::new(5, 5, 10, 10)).plane("T0".parse().unwrap()))
        .unwrap();
    assert_eq!(raster.pixels().sample(0, 0, 1), 255.0);
    assert_eq!(raster.pixels().sample(9, 9, 1), 0.0);

    let raster = container
        .composite(&RegionRequest::new(IntRect::new(1000, 1000, 8, 8)))
        .unwrap();
    assert!(raster.pixels().data().iter().all(|&v| v == 0));

    assert!(matches!(
        container.composite(
            &RegionRequest::new(IntRect::new(0, 0, 10, 10)).plane("T1".parse().unwrap())
        ),
        Err(CompositeError::EmptyRegion { .. })
    ));
    assert!(matches!(
        container.read_region(&Coordinate::new(), 2, 0, IntRect::new(0, 0, 10, 10)),
        Err(CompositeError::EmptyRegion { level: 0 })
    ));
    assert!(matches!(
        container.composite(&RegionRequest::new(IntRect::new(0, 0, 0, 10))),
        Err(CompositeError::InvalidRegion(_))
    ));
}

#[test]
fn test_stored_curve_and_tint_are_applied() {
    let bytes = build_container(WriterOptions::default(), |writer| {
        writer
            .add_subblock(tile("C0", 0, IntRect::new(0, 0, 4, 4)), &gray8(4, 4, 64))
            .unwrap();
        writer
            .add_subblock(tile("C1", 0, IntRect::new(0, 0, 4, 4)), &gray8(4, 4, 255))
            .unwrap();
        let curve = GradationCurve::new(vec![(0.0, 0.0), (128.0, 200.0), (255.0, 255.0)]).unwrap();
        writer.set_display_settings(0, Rgb::new(255, 0, 0), &curve).unwrap();
        writer
            .set_display_settings(1, Rgb::new(0, 0, 255), &GradationCurve::linear(255.0))
            .unwrap();
    });
    let container = open_bytes(bytes);

    let raster = container
        .composite(&RegionRequest::new(IntRect::new(0, 0, 4, 4)))
        .unwrap();
    // Red from channel 0 (64 -> 100), blue from channel 1
    assert_eq!(raster.pixels().data()[..3], [255, 0, 100]);

    let only_red = container
        .composite(&RegionRequest::new(IntRect::new(0, 0, 4, 4)).channels(vec![0]))
        .unwrap();
    assert_eq!(only_red.pixels().data()[..3], [0, 0, 100]);
}

#[test]
fn test_zoom_reads_coarser_level() {
    let bytes = build_container(WriterOptions::default(), |writer| {
        writer
            .add_subblock(tile("C0", 0, IntRect::new(0, 0, 256, 256)), &gray8(256, 256, 10))
            .unwrap();
        writer
            .add_subblock(tile("C0", 1, IntRect::new(0, 0, 128, 128)), &gray8(128, 128, 20))
            .unwrap();
        writer
            .add_subblock(tile("C0", 2, IntRect::new(0, 0, 64, 64)), &gray8(64, 64, 30))
            .unwrap();
    });
    let container = open_bytes(bytes);
    let region = IntRect::new(0, 0, 256, 256);

    let full = container.composite(&RegionRequest::new(region).zoom(1.0)).unwrap();
    assert_eq!((full.level(), full.width()), (0, 256));
    assert_eq!(full.pixels().data()[0], 10);

    let half = container.composite(&RegionRequest::new(region).zoom(0.5)).unwrap();
    assert_eq!((half.level(), half.width(), half.height()), (1, 128, 128));
    assert_eq!(half.source_region(), IntRect::new(0, 0, 128, 128));
    assert_eq!(half.pixels().data()[0], 20);

    let small = container.composite(&RegionRequest::new(region).zoom(0.1)).unwrap();
    assert_eq!(small.level(), 2);
    assert_eq!((small.width(), small.height()), (26, 26));
    assert_eq!(small.pixels().data()[0], 30);

    assert!(matches!(
        container.composite(&RegionRequest::new(region).zoom(2.0)),
        Err(CompositeError::InvalidZoom(_))
    ));
    assert!(matches!(
        container.composite(&RegionRequest::new(region).level(3)),
        Err(CompositeError::InvalidLevel { level: 3, .. })
    ));
}

#[test]
fn test_cancelled_before_decode() {
    let bytes = build_container(WriterOptions::default(), |writer| {
        writer
            .add_subblock(tile("C0", 0, IntRect::new(0, 0, 16, 16)), &gray8(16, 16, 1))
            .unwrap();
    });
    let container = open_bytes(bytes);

    let flag = Arc::new(AtomicBool::new(false));
    let request = RegionRequest::new(IntRect::new(0, 0, 16, 16)).cancel_flag(flag.clone());
    assert!(container.composite(&request).is_ok());

    flag.store(true, Ordering::SeqCst);
    container.tile_cache().clear();
    assert!(matches!(
        container.composite(&request),
        Err(CompositeError::Cancelled)
    ));
    assert!(container.tile_cache().is_empty());
}

#[test]
fn test_repeated_composite_hits_tile_cache() {
    let bytes = build_container(WriterOptions::default(), |writer| {
        for m in 0..4 {
            let rect = IntRect::new((m % 2) * 64, (m / 2) * 64, 64, 64);
            writer
                .add_subblock(tile(&format!("C0M{}", m), 0, rect), &gray8(64, 64, m as u8 * 50))
                .unwrap();
        }
    });

    let reader = TrackingReader::new(bytes);
    let container = Container::from_reader(
        reader.clone(),
        OpenOptions::new().block_cache(1024, 1),
    )
    .unwrap();
    let after_open = reader.request_count();

    let request = RegionRequest::new(IntRect::new(0, 0, 128, 128));
    let first = container.composite(&request).unwrap();
    let after_first = reader.request_count();
    assert!(after_first > after_open);
    assert_eq!(container.tile_cache().len(), 4);

    let second = container.composite(&request).unwrap();
    assert_eq!(reader.request_count(), after_first);
    assert_eq!(first, second);
}

#[test]
fn test_composite_from_several_threads() {
    let bytes = build_container(WriterOptions::default(), |writer| {
        for m in 0..8 {
            let rect = IntRect::new(m * 16, 0, 16, 16);
            writer
                .add_subblock(tile(&format!("C0M{}", m), 0, rect), &gray8(16, 16, m as u8 * 30))
                .unwrap();
        }
    });
    let container = Arc::new(open_bytes(bytes));
    let request = RegionRequest::new(IntRect::new(0, 0, 128, 16));
    let expected = container.composite(&request).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let container = Arc::clone(&container);
            let request = request.clone();
            std::thread::spawn(move || container.composite(&request).unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn test_oversized_region_is_rejected() {
    let bytes = build_container(WriterOptions::default(), |writer| {
        writer
            .add_subblock(tile("C0", 0, IntRect::new(0, 0, 16, 16)), &gray8(16, 16, 1))
            .unwrap();
    });
    let container = open_bytes(bytes);
    let huge = IntRect::new(0, 0, 1 << 20, 1 << 20);

    assert!(matches!(
        container.read_region(&Coordinate::new(), 0, 0, huge),
        Err(CompositeError::InvalidRegion(_))
    ));
    assert!(matches!(
        container.composite(&RegionRequest::new(huge)),
        Err(CompositeError::InvalidRegion(_))
    ));
    assert!(container.tile_cache().is_empty());
}

/// Tiles as (x, y, w, h, value) within a 48x48 area.
fn tiles_strategy() -> impl Strategy<Value = Vec<(i32, i32, u32, u32, u8)>> {
    prop::collection::vec((0i32..40, 0i32..40, 1u32..24, 1u32..24, any::<u8>()), 1..8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_composite_matches_ordered_stitch(tiles in tiles_strategy()) {
        let bytes = build_container(WriterOptions::default(), |writer| {
            for (m, &(x, y, w, h, value)) in tiles.iter().enumerate() {
                writer
                    .add_subblock(
                        tile(&format!("C0M{}", m), 0, IntRect::new(x, y, w, h)),
                        &gray8(w, h, value),
                    )
                    .unwrap();
            }
        });
        let container = open_bytes(bytes);

        let mut expected = PixelBuffer::new(PixelType::Gray8, 48, 48);
        for &(x, y, w, h, value) in &tiles {
            expected.blit(&gray8(w, h, value), x as i64, y as i64);
        }

        let raw = container
            .read_region(&Coordinate::new(), 0, 0, IntRect::new(0, 0, 48, 48))
            .unwrap();
        prop_assert_eq!(&raw, &expected);

        let raster = container
            .composite(&RegionRequest::new(IntRect::new(0, 0, 48, 48)))
            .unwrap();
        for (i, &v) in expected.data().iter().enumerate() {
            prop_assert_eq!(&raster.pixels().data()[i * 3..i * 3 + 3], &[v, v, v][..]);
        }
    }
}
