//! Write-then-read tests through real files.

use tempfile::TempDir;

use zisraw::codec::{
    COMPRESSION_JPEG, COMPRESSION_LZW, COMPRESSION_NONE, COMPRESSION_ZSTD0, COMPRESSION_ZSTD1,
};
use zisraw::{
    CodecError, Container, ContainerError, Coordinate, Dimension, GradationCurve, IntRect,
    PixelType, Rgb, Scaling, SubBlockSpec, WriterOptions,
};

use super::test_utils::{gray16_ramp, gray8, open_bytes, build_container, pattern, write_file};

const ALL_PIXEL_TYPES: [PixelType; 6] = [
    PixelType::Gray8,
    PixelType::Gray16,
    PixelType::Gray32Float,
    PixelType::Bgr24,
    PixelType::Bgr48,
    PixelType::Bgra32,
];

#[test]
fn test_uncompressed_round_trip_is_bit_identical() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("raw.czi");

    let buffers: Vec<_> = ALL_PIXEL_TYPES
        .iter()
        .enumerate()
        .map(|(i, &pt)| pattern(pt, 37, 19, i as u32))
        .collect();

    write_file(&path, WriterOptions::default(), |writer| {
        for (i, buffer) in buffers.iter().enumerate() {
            let spec = SubBlockSpec::new(
                Coordinate::new().with(Dimension::C, i as i32),
                IntRect::new(0, 0, 37, 19),
            )
            .compression(COMPRESSION_NONE);
            writer.add_subblock(spec, buffer).unwrap();
        }
    });

    let container = Container::open(&path).unwrap();
    for (i, buffer) in buffers.iter().enumerate() {
        let entry = container
            .find(&Coordinate::new().with(Dimension::C, i as i32), 0)
            .unwrap()
            .clone();
        assert_eq!(entry.pixel_type, buffer.pixel_type());
        let decoded = container.decode_subblock(&entry).unwrap();
        assert_eq!(decoded.data(), buffer.data(), "pixel type {}", buffer.pixel_type());
    }
}

#[test]
fn test_zstd_round_trip_is_lossless() {
    let ramp = gray16_ramp(64, 16);
    let color = pattern(PixelType::Bgr48, 20, 20, 7);

    let bytes = build_container(WriterOptions::default(), |writer| {
        writer
            .add_subblock(
                SubBlockSpec::new("C0".parse().unwrap(), IntRect::new(0, 0, 64, 16))
                    .compression(COMPRESSION_ZSTD0),
                &ramp,
            )
            .unwrap();
        writer
            .add_subblock(
                SubBlockSpec::new("C1".parse().unwrap(), IntRect::new(0, 0, 64, 16))
                    .compression(COMPRESSION_ZSTD1),
                &ramp,
            )
            .unwrap();
        writer
            .add_subblock(
                SubBlockSpec::new("C2".parse().unwrap(), IntRect::new(0, 0, 20, 20))
                    .compression(COMPRESSION_ZSTD1),
                &color,
            )
            .unwrap();
    });

    let container = open_bytes(bytes);
    for (key, expected) in [("C0", &ramp), ("C1", &ramp), ("C2", &color)] {
        let entry = container.find(&key.parse().unwrap(), 0).unwrap().clone();
        assert_eq!(&container.decode_subblock(&entry).unwrap(), expected);
    }
}

#[test]
fn test_default_compression_from_options() {
    let bytes = build_container(WriterOptions::new().compression(COMPRESSION_ZSTD1), |writer| {
        writer
            .add_subblock(
                SubBlockSpec::new(Coordinate::new(), IntRect::new(0, 0, 8, 8)),
                &gray8(8, 8, 3),
            )
            .unwrap();
    });
    let container = open_bytes(bytes);
    let entry = container.find(&Coordinate::new(), 0).unwrap();
    assert_eq!(entry.compression, COMPRESSION_ZSTD1);
}

#[test]
fn test_jpeg_round_trip_is_close() {
    let tile = gray8(32, 32, 128);
    let bytes = build_container(WriterOptions::default(), |writer| {
        writer
            .add_subblock(
                SubBlockSpec::new(Coordinate::new(), IntRect::new(0, 0, 32, 32))
                    .compression(COMPRESSION_JPEG),
                &tile,
            )
            .unwrap();
    });

    let container = open_bytes(bytes);
    let entry = container.find(&Coordinate::new(), 0).unwrap().clone();
    let decoded = container.decode_subblock(&entry).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (32, 32));
    assert!(decoded.data().iter().all(|&v| (v as i32 - 128).abs() <= 2));
}

#[test]
fn test_unregistered_compression_fails_to_decode() {
    let bytes = build_container(WriterOptions::default(), |writer| {
        writer
            .add_compressed_subblock(
                SubBlockSpec::new(Coordinate::new(), IntRect::new(0, 0, 4, 4))
                    .compression(COMPRESSION_LZW),
                PixelType::Gray8,
                &[0u8; 16],
            )
            .unwrap();
    });

    let container = open_bytes(bytes);
    let entry = container.find(&Coordinate::new(), 0).unwrap().clone();
    assert!(matches!(
        container.decode_subblock(&entry),
        Err(ContainerError::Codec(CodecError::UnsupportedCompression(2)))
    ));
    // The raw payload is still readable
    assert_eq!(container.read_subblock(&entry).unwrap().data.len(), 16);
}

#[test]
fn test_display_settings_round_trip_exactly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("display.czi");
    let curve = GradationCurve::new(vec![
        (0.0, 0.0),
        (1000.5, 12.25),
        (30000.0, 40000.0),
        (65535.0, 65535.0),
    ])
    .unwrap();
    let tint = Rgb::new(12, 200, 77);

    write_file(&path, WriterOptions::default(), |writer| {
        writer
            .add_subblock(
                SubBlockSpec::new("C3".parse().unwrap(), IntRect::new(0, 0, 16, 1)),
                &gray16_ramp(16, 1),
            )
            .unwrap();
        writer.set_display_settings(3, tint, &curve).unwrap();
    });

    let container = Container::open(&path).unwrap();
    let setting = container.metadata().display_setting(3).unwrap().unwrap();
    assert_eq!(setting.tint, tint);
    assert_eq!(setting.curve.points(), curve.points());
    assert!(container.metadata().display_setting(0).unwrap().is_none());
}

#[test]
fn test_metadata_document_is_preserved() {
    let bytes = build_container(WriterOptions::default(), |writer| {
        let metadata = writer.metadata_mut().unwrap();
        metadata
            .document_mut()
            .set_text("Metadata/Experiment/Name", "Mitosis <live> & fixed")
            .unwrap();
        metadata
            .document_mut()
            .set_attribute("Metadata/Experiment", "Version", "1.2")
            .unwrap();
        metadata
            .set_scaling(&Scaling {
                x: Some(1.25e-7),
                y: Some(1.25e-7),
                z: Some(5e-7),
            })
            .unwrap();
    });

    let container = open_bytes(bytes);
    let doc = container.metadata().document();
    assert_eq!(
        doc.get_text("Metadata/Experiment/Name"),
        Some("Mitosis <live> & fixed")
    );
    assert_eq!(doc.get_attribute("Metadata/Experiment", "Version"), Some("1.2"));
    assert_eq!(
        container.metadata().scaling().unwrap(),
        Scaling {
            x: Some(1.25e-7),
            y: Some(1.25e-7),
            z: Some(5e-7),
        }
    );
}

#[test]
fn test_directory_finds_every_key() {
    let mut keys = Vec::new();
    let bytes = build_container(WriterOptions::default(), |writer| {
        for c in 0..3 {
            for t in 0..4 {
                for z in 0..3 {
                    for level in 0..2u8 {
                        let coordinate: Coordinate =
                            format!("C{}T{}Z{}", c, t, z).parse().unwrap();
                        let size = 8 >> level;
                        let rect = IntRect::new(0, 0, size, size);
                        writer
                            .add_subblock(
                                SubBlockSpec::new(coordinate, rect).level(level),
                                &gray8(size, size, (c * 16 + t * 4 + z) as u8),
                            )
                            .unwrap();
                        keys.push((coordinate, level));
                    }
                }
            }
        }
    });

    let container = open_bytes(bytes);
    assert_eq!(container.directory().len(), keys.len());
    for (coordinate, level) in &keys {
        let entry = container.find(coordinate, *level).unwrap();
        assert_eq!(entry.coordinate, *coordinate);
        assert_eq!(entry.level, *level);
    }
    assert!(container.find(&"C3T0Z0".parse().unwrap(), 0).is_none());
    assert!(container.find(&"C0T0Z0".parse().unwrap(), 2).is_none());

    let stats = container.statistics();
    assert_eq!(stats.size_of(Dimension::C), 3);
    assert_eq!(stats.size_of(Dimension::T), 4);
    assert_eq!(stats.size_of(Dimension::Z), 3);
    assert_eq!(stats.levels.len(), 2);
}

#[test]
fn test_pyramid_factor_is_stored() {
    let bytes = build_container(WriterOptions::new().pyramid_factor(3), |writer| {
        writer
            .add_subblock(
                SubBlockSpec::new(Coordinate::new(), IntRect::new(0, 0, 9, 9)),
                &gray8(9, 9, 1),
            )
            .unwrap();
    });
    assert_eq!(open_bytes(bytes).pyramid_factor(), 3);
}
