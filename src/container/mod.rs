//! Reading and writing whole containers.
//!
//! [`Container`] opens a finalized file and answers directory lookups,
//! subblock reads, region composites and attachment reads.
//! [`ContainerWriter`] builds a new file from pixel buffers.
//!
//! ```text
//!  ContainerWriter                              Container
//!  ───────────────                              ─────────
//!  add_subblock ──encode──► ZISRAWSUBBLOCK ...  open ──► header ──► directory
//!  add_attachment ────────► ZISRAWATTACH   ...       ──► metadata ─► attachments
//!  finalize ──► ZISRAWDIRECTORY                 composite / read_region
//!           ──► ZISRAWMETADATA                  read_subblock / decode_subblock
//!           ──► ZISRAWATTDIR                    read_attachment
//!           ──► header commit
//! ```

mod reader;
mod writer;

pub use reader::{Container, DirectorySource, OpenOptions};
pub use writer::{ContainerWriter, SubBlockSpec, WriterOptions, WriterState};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::Coordinate;
    use crate::error::{CompositeError, ContainerError, WriteError};
    use crate::geometry::IntRect;
    use crate::io::MemoryRangeReader;
    use crate::metadata::{GradationCurve, Rgb};
    use crate::pixel::{PixelBuffer, PixelType};
    use crate::render::RegionRequest;
    use std::io::Cursor;

    fn gray(w: u32, h: u32, value: u8) -> PixelBuffer {
        PixelBuffer::from_vec(PixelType::Gray8, w, h, vec![value; (w * h) as usize]).unwrap()
    }

    fn coord(s: &str) -> Coordinate {
        s.parse().unwrap()
    }

    fn memory_writer() -> ContainerWriter<Cursor<Vec<u8>>> {
        ContainerWriter::new(Cursor::new(Vec::new()), WriterOptions::default()).unwrap()
    }

    fn finish(mut writer: ContainerWriter<Cursor<Vec<u8>>>) -> Vec<u8> {
        writer.finalize().unwrap();
        writer.get_ref().get_ref().clone()
    }

    fn open(bytes: Vec<u8>) -> Container<MemoryRangeReader> {
        Container::from_reader(MemoryRangeReader::new(bytes), OpenOptions::default()).unwrap()
    }

    #[test]
    fn test_write_then_read() {
        let mut writer = memory_writer();
        let tile = gray(8, 4, 42);
        let index = writer
            .add_subblock(SubBlockSpec::new(coord("C0T0"), IntRect::new(0, 0, 8, 4)), &tile)
            .unwrap();
        assert_eq!(index, 0);

        let container = open(finish(writer));
        let entry = container.find(&coord("C0T0"), 0).unwrap().clone();
        assert_eq!(entry.rect, IntRect::new(0, 0, 8, 4));
        assert_eq!(container.decode_subblock(&entry).unwrap(), tile);
        assert_eq!(container.pyramid_factor(), 2);
    }

    #[test]
    fn test_unfinalized_is_corrupt() {
        let mut writer = memory_writer();
        writer
            .add_subblock(SubBlockSpec::new(coord("C0"), IntRect::new(0, 0, 2, 2)), &gray(2, 2, 1))
            .unwrap();
        let bytes = writer.get_ref().get_ref().clone();

        let result = Container::from_reader(MemoryRangeReader::new(bytes), OpenOptions::default());
        assert!(matches!(result, Err(ContainerError::CorruptContainer { .. })));
    }

    #[test]
    fn test_closed_after_finalize() {
        let mut writer = memory_writer();
        writer.finalize().unwrap();
        assert_eq!(writer.state(), WriterState::Finalized);
        let before = writer.get_ref().get_ref().clone();

        assert!(matches!(writer.finalize(), Err(WriteError::ContainerClosed)));
        assert!(matches!(
            writer.add_subblock(
                SubBlockSpec::new(coord("C0"), IntRect::new(0, 0, 1, 1)),
                &gray(1, 1, 0)
            ),
            Err(WriteError::ContainerClosed)
        ));
        assert!(matches!(
            writer.add_attachment("x", "BIN", b"x"),
            Err(WriteError::ContainerClosed)
        ));
        assert!(writer.metadata_mut().is_err());
        assert_eq!(writer.get_ref().get_ref(), &before);
    }

    #[test]
    fn test_buffer_must_match_rect() {
        let mut writer = memory_writer();
        assert!(matches!(
            writer.add_subblock(
                SubBlockSpec::new(coord("C0"), IntRect::new(0, 0, 4, 4)),
                &gray(2, 2, 0)
            ),
            Err(WriteError::InvalidBuffer(_))
        ));
        assert!(matches!(
            writer.add_subblock(
                SubBlockSpec::new(coord("C-2"), IntRect::new(0, 0, 2, 2)),
                &gray(2, 2, 0)
            ),
            Err(WriteError::InvalidCoordinate(_))
        ));
        assert!(writer.directory().is_empty());
    }

    #[test]
    fn test_scan_matches_directory_segment() {
        let mut writer = memory_writer();
        for c in 0..3 {
            writer
                .add_subblock(
                    SubBlockSpec::new(coord(&format!("C{}", c)), IntRect::new(0, 0, 4, 4)),
                    &gray(4, 4, c as u8),
                )
                .unwrap();
        }
        // Rewritten tile: both copies are on disk, the later one wins
        writer
            .add_subblock(SubBlockSpec::new(coord("C1"), IntRect::new(0, 0, 4, 4)), &gray(4, 4, 99))
            .unwrap();
        let bytes = finish(writer);

        let from_segment = open(bytes.clone());
        let scanned = Container::from_reader(
            MemoryRangeReader::new(bytes),
            OpenOptions::default().directory_source(DirectorySource::Scan),
        )
        .unwrap();

        assert_eq!(scanned.directory().len(), 3);
        for c in 0..3 {
            let key = coord(&format!("C{}", c));
            let a = from_segment.find(&key, 0).unwrap();
            let b = scanned.find(&key, 0).unwrap();
            assert_eq!(a, b);
        }
        let c1 = scanned.find(&coord("C1"), 0).unwrap().clone();
        assert_eq!(scanned.decode_subblock(&c1).unwrap().data()[0], 99);
    }

    #[test]
    fn test_composite_uses_stored_settings() {
        let mut writer = memory_writer();
        writer
            .add_subblock(
                SubBlockSpec::new(coord("C0"), IntRect::new(0, 0, 2, 2)),
                &gray(2, 2, 255),
            )
            .unwrap();
        writer
            .set_display_settings(0, Rgb::new(0, 0, 255), &GradationCurve::linear(255.0))
            .unwrap();
        let container = open(finish(writer));

        let raster = container
            .composite(&RegionRequest::new(IntRect::new(0, 0, 2, 2)))
            .unwrap();
        // Blue tint: only the B component (index 0) is lit
        assert_eq!(&raster.pixels().data()[..3], &[255, 0, 0]);

        // Second read is served from the tile cache
        assert_eq!(container.tile_cache().len(), 1);
        container
            .composite(&RegionRequest::new(IntRect::new(0, 0, 2, 2)))
            .unwrap();
        assert_eq!(container.tile_cache().len(), 1);

        assert!(matches!(
            container.composite(&RegionRequest::new(IntRect::new(0, 0, 2, 2)).level(3)),
            Err(CompositeError::InvalidLevel { .. })
        ));
    }

    #[test]
    fn test_attachments() {
        let mut writer = memory_writer();
        writer.add_attachment("Label", "JPG", b"first").unwrap();
        writer.add_attachment("Label", "JPG", b"second").unwrap();
        writer.add_attachment("Notes", "TXT", b"hello").unwrap();
        assert!(matches!(
            writer.add_attachment("Bad", "MUCHTOOLONG", b""),
            Err(WriteError::InvalidAttachment(_))
        ));
        let container = open(finish(writer));

        assert_eq!(container.attachments().len(), 2);
        assert_eq!(&container.read_attachment("Label").unwrap()[..], b"second");
        assert_eq!(&container.read_attachment("Notes").unwrap()[..], b"hello");
        assert!(matches!(
            container.read_attachment("Missing"),
            Err(ContainerError::AttachmentNotFound(_))
        ));
    }

    #[test]
    fn test_image_information_filled() {
        let mut writer = memory_writer();
        for c in 0..2 {
            for (m, x) in [(0, 0), (1, 10)] {
                writer
                    .add_subblock(
                        SubBlockSpec::new(
                            coord(&format!("C{}M{}", c, m)),
                            IntRect::new(x, 0, 10, 5),
                        ),
                        &gray(10, 5, 0),
                    )
                    .unwrap();
            }
        }
        writer
            .metadata_mut()
            .unwrap()
            .document_mut()
            .set_text("Metadata/Information/Image/SizeC", "7")
            .unwrap();
        let container = open(finish(writer));

        let doc = container.metadata().document();
        assert_eq!(doc.get_text("Metadata/Information/Image/SizeX"), Some("20"));
        assert_eq!(doc.get_text("Metadata/Information/Image/SizeY"), Some("5"));
        assert_eq!(doc.get_text("Metadata/Information/Image/SizeM"), Some("2"));
        assert_eq!(doc.get_text("Metadata/Information/Image/PixelType"), Some("Gray8"));
        // Caller-provided values are kept
        assert_eq!(doc.get_text("Metadata/Information/Image/SizeC"), Some("7"));
    }
}
