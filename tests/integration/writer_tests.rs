//! Writer lifecycle: finalize, path locks, display settings and attachments.

use std::io::Cursor;

use tempfile::TempDir;

use zisraw::{
    Container, ContainerError, ContainerWriter, GradationCurve, IntRect, MetadataError, Rgb,
    SubBlockSpec, WriteError, WriterOptions, WriterState,
};

use super::test_utils::{build_container, file_header, gray16_ramp, gray8, open_bytes};

fn memory_writer() -> ContainerWriter<Cursor<Vec<u8>>> {
    ContainerWriter::new(Cursor::new(Vec::new()), WriterOptions::default()).unwrap()
}

fn spec(coordinate: &str, w: u32, h: u32) -> SubBlockSpec {
    SubBlockSpec::new(coordinate.parse().unwrap(), IntRect::new(0, 0, w, h))
}

#[test]
fn test_finalize_twice_is_closed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("twice.czi");

    let mut writer = ContainerWriter::create(&path).unwrap();
    writer.add_subblock(spec("C0", 8, 8), &gray8(8, 8, 9)).unwrap();
    writer.finalize().unwrap();
    assert_eq!(writer.state(), WriterState::Finalized);
    let before = std::fs::read(&path).unwrap();

    assert!(matches!(writer.finalize(), Err(WriteError::ContainerClosed)));
    assert!(matches!(
        writer.add_subblock(spec("C1", 8, 8), &gray8(8, 8, 1)),
        Err(WriteError::ContainerClosed)
    ));
    assert!(matches!(
        writer.add_attachment("Label", "JPG", b"x"),
        Err(WriteError::ContainerClosed)
    ));
    assert!(matches!(writer.metadata_mut(), Err(WriteError::ContainerClosed)));
    drop(writer);

    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert_eq!(Container::open(&path).unwrap().directory().len(), 1);
}

#[test]
fn test_second_writer_on_same_path_conflicts() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("locked.czi");

    let mut first = ContainerWriter::create(&path).unwrap();
    first.add_subblock(spec("C0", 4, 4), &gray8(4, 4, 7)).unwrap();

    // A different spelling of the same file
    let alias = dir.path().join(".").join("locked.czi");
    assert!(matches!(
        ContainerWriter::create(&alias),
        Err(WriteError::WriteConflict(_))
    ));

    first.finalize().unwrap();
    // Released by finalize
    let second = ContainerWriter::create(dir.path().join("other.czi")).unwrap();
    drop(second);
    let mut again = ContainerWriter::create(&path).unwrap();
    again.add_subblock(spec("C0", 2, 2), &gray8(2, 2, 1)).unwrap();
    again.finalize().unwrap();

    let container = Container::open(&path).unwrap();
    assert_eq!(container.statistics().full_resolution_box(), Some(IntRect::new(0, 0, 2, 2)));
}

#[test]
fn test_lock_released_on_drop() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dropped.czi");

    let writer = ContainerWriter::create(&path).unwrap();
    drop(writer);
    assert!(ContainerWriter::create(&path).is_ok());
}

#[test]
fn test_unfinalized_file_is_not_readable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("abandoned.czi");

    {
        let mut writer = ContainerWriter::create(&path).unwrap();
        writer.add_subblock(spec("C0", 16, 16), &gray8(16, 16, 3)).unwrap();
    }

    let bytes = std::fs::read(&path).unwrap();
    assert!(file_header(&bytes).update_pending);
    assert!(matches!(
        Container::open(&path),
        Err(ContainerError::CorruptContainer { .. })
    ));
}

#[test]
fn test_invalid_curve_keeps_prior_settings() {
    let bytes = build_container(WriterOptions::default(), |writer| {
        writer.add_subblock(spec("C0", 4, 4), &gray8(4, 4, 1)).unwrap();
        let curve = GradationCurve::new(vec![(0.0, 0.0), (255.0, 128.0)]).unwrap();
        writer.set_display_settings(0, Rgb::new(0, 255, 0), &curve).unwrap();

        let out_of_range = GradationCurve::new(vec![(0.0, 0.0), (4095.0, 255.0)]).unwrap();
        assert!(matches!(
            writer.set_display_settings(0, Rgb::new(255, 0, 0), &out_of_range),
            Err(WriteError::Metadata(MetadataError::InvalidCurve(_)))
        ));
    });

    let container = open_bytes(bytes);
    let setting = container.metadata().display_setting(0).unwrap().unwrap();
    assert_eq!(setting.tint, Rgb::new(0, 255, 0));
    assert_eq!(setting.curve.points(), &[(0.0, 0.0), (255.0, 128.0)]);
}

#[test]
fn test_attachments_round_trip() {
    let bytes = build_container(WriterOptions::default(), |writer| {
        writer.add_subblock(spec("C0", 4, 4), &gray8(4, 4, 1)).unwrap();
        writer.add_attachment("Thumbnail", "JPG", b"first").unwrap();
        writer.add_attachment("Label", "CZI", &[1, 2, 3, 4]).unwrap();
        writer.add_attachment("Thumbnail", "JPG", b"second").unwrap();

        assert!(matches!(
            writer.add_attachment("", "JPG", b""),
            Err(WriteError::InvalidAttachment(_))
        ));
        assert!(matches!(
            writer.add_attachment("Preview", "TOOLONGTYPE", b""),
            Err(WriteError::InvalidAttachment(_))
        ));
    });

    let container = open_bytes(bytes);
    let names: Vec<&str> = container.attachments().iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["Label", "Thumbnail"]);
    assert_eq!(&container.read_attachment("Thumbnail").unwrap()[..], b"second");
    assert_eq!(&container.read_attachment("Label").unwrap()[..], &[1, 2, 3, 4]);
    assert!(matches!(
        container.read_attachment("Missing"),
        Err(ContainerError::AttachmentNotFound(_))
    ));
}

#[test]
fn test_container_without_attachments() {
    let bytes = build_container(WriterOptions::default(), |writer| {
        writer.add_subblock(spec("C0", 4, 4), &gray8(4, 4, 1)).unwrap();
    });
    assert_eq!(file_header(&bytes).attachment_directory_position, 0);
    assert!(open_bytes(bytes).attachments().is_empty());
}

#[test]
fn test_superseded_subblock_is_replaced() {
    let bytes = build_container(WriterOptions::default(), |writer| {
        writer.add_subblock(spec("C0T0", 4, 4), &gray8(4, 4, 10)).unwrap();
        writer.add_subblock(spec("C0T1", 4, 4), &gray8(4, 4, 20)).unwrap();
        writer.add_subblock(spec("C0T0", 4, 4), &gray8(4, 4, 30)).unwrap();
        assert_eq!(writer.directory().len(), 2);
    });

    let container = open_bytes(bytes);
    let entry = container.find(&"C0T0".parse().unwrap(), 0).unwrap().clone();
    assert_eq!(container.decode_subblock(&entry).unwrap().data()[0], 30);
}

#[test]
fn test_invalid_placement_is_rejected() {
    let mut writer = memory_writer();
    assert!(matches!(
        writer.add_subblock(spec("C0", 0, 4), &gray8(0, 4, 0)),
        Err(WriteError::InvalidCoordinate(_))
    ));
    assert!(matches!(
        writer.add_subblock(spec("C0", 4, 4), &gray8(5, 4, 0)),
        Err(WriteError::InvalidBuffer(_))
    ));
    assert!(writer.directory().is_empty());
    writer.finalize().unwrap();
}

#[test]
fn test_display_settings_before_first_subblock() {
    let curve =
        GradationCurve::new(vec![(0.0, 0.0), (1000.0, 30000.0), (65535.0, 65535.0)]).unwrap();
    let bytes = build_container(WriterOptions::default(), |writer| {
        writer.set_display_settings(0, Rgb::new(0, 0, 255), &curve).unwrap();
        writer.add_subblock(spec("C0", 16, 1), &gray16_ramp(16, 1)).unwrap();
    });

    let container = open_bytes(bytes);
    let setting = container.metadata().display_setting(0).unwrap().unwrap();
    assert_eq!(setting.curve.points(), curve.points());
}

#[test]
fn test_early_curve_outside_final_range_fails_finalize() {
    let mut writer = memory_writer();
    let curve = GradationCurve::new(vec![(0.0, 0.0), (4095.0, 4095.0)]).unwrap();
    writer.set_display_settings(0, Rgb::WHITE, &curve).unwrap();
    writer.add_subblock(spec("C0", 4, 4), &gray8(4, 4, 1)).unwrap();

    assert!(matches!(
        writer.finalize(),
        Err(WriteError::Metadata(MetadataError::InvalidCurve(_)))
    ));
    assert_eq!(writer.state(), WriterState::Writing);

    writer
        .set_display_settings(0, Rgb::WHITE, &GradationCurve::linear(255.0))
        .unwrap();
    writer.finalize().unwrap();
}
