use std::fs;

use crate::common::{TestWorkspace, random_vectors, sq8_model};
use knn_codec::codec::FOOTER_LEN;
use knn_codec::{CodecError, ModelStore, SegmentReader, SegmentWriter, SpaceType};

fn sealed_segment() -> Vec<u8> {
    let store = std::sync::Arc::new(ModelStore::in_memory());
    store.put(&sq8_model("sq8", 4, SpaceType::L2)).unwrap();

    let mut writer = SegmentWriter::new("_0").with_models(store);
    {
        let field = writer.begin_field("raw", 3, SpaceType::Cosine, None).unwrap();
        for (doc, vector) in random_vectors(3, 4, 3).iter().enumerate() {
            field.add_vector(doc as u32 * 2, vector).unwrap();
        }
    }
    {
        let field = writer
            .begin_field("coded", 4, SpaceType::L2, Some("sq8"))
            .unwrap();
        for (doc, vector) in random_vectors(4, 3, 4).iter().enumerate() {
            field.add_vector(doc as u32, vector).unwrap();
        }
    }
    let mut bytes = Vec::new();
    writer.flush(&mut bytes).unwrap();
    bytes
}

#[test]
fn test_any_single_byte_flip_is_rejected() {
    let bytes = sealed_segment();
    assert!(SegmentReader::from_bytes(bytes.clone()).is_ok());

    for position in 0..bytes.len() {
        let mut corrupted = bytes.clone();
        corrupted[position] ^= 0x01;
        match SegmentReader::from_bytes(corrupted) {
            Err(e) => assert!(e.is_corruption(), "flip at {position} gave {e:?}"),
            Ok(_) => panic!("flip at byte {position} was not detected"),
        }
    }
}

#[test]
fn test_truncated_files_are_rejected() {
    let bytes = sealed_segment();
    for len in [0, 1, FOOTER_LEN - 1, FOOTER_LEN, bytes.len() / 2, bytes.len() - 1] {
        let err = SegmentReader::from_bytes(bytes[..len].to_vec()).unwrap_err();
        assert!(err.is_corruption(), "truncation to {len} gave {err:?}");
    }
}

#[test]
fn test_file_without_footer_is_rejected() {
    let bytes = sealed_segment();
    let body = bytes[..bytes.len() - FOOTER_LEN].to_vec();
    assert!(SegmentReader::from_bytes(body).unwrap_err().is_corruption());
}

#[test]
fn test_trailing_garbage_is_rejected() {
    let mut bytes = sealed_segment();
    bytes.extend_from_slice(b"junk");
    assert!(SegmentReader::from_bytes(bytes).unwrap_err().is_corruption());
}

#[test]
fn test_corrupt_file_on_disk_is_rejected() {
    let workspace = TestWorkspace::new();
    let path = workspace.segment_path("_0");
    let mut bytes = sealed_segment();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0x80;
    fs::write(&path, &bytes).unwrap();

    let err = SegmentReader::open(&path).unwrap_err();
    assert!(matches!(err, CodecError::Corruption { .. }));
}

#[test]
fn test_empty_file_on_disk_is_rejected() {
    let workspace = TestWorkspace::new();
    let path = workspace.segment_path("empty");
    fs::write(&path, b"").unwrap();
    assert!(SegmentReader::open(&path).unwrap_err().is_corruption());
}

#[test]
fn test_missing_file_is_io_error() {
    let workspace = TestWorkspace::new();
    let err = SegmentReader::open(workspace.segment_path("missing")).unwrap_err();
    assert!(matches!(err, CodecError::Io { .. }));
}

#[test]
fn test_failed_flush_publishes_nothing() {
    let workspace = TestWorkspace::new();
    let path = workspace.segment_path("_9");

    let mut writer = SegmentWriter::new("_9");
    {
        let field = writer.begin_field("vec", 2, SpaceType::L2, None).unwrap();
        field.add_vector(0, &[1.0, 2.0]).unwrap();
        assert!(field.add_vector(1, &[f32::INFINITY, 0.0]).is_err());
    }

    let err = writer.flush_to_path(&path).unwrap_err();
    assert!(matches!(err, CodecError::FieldAborted { .. }));
    assert!(!path.exists());

    let leftovers: Vec<_> = fs::read_dir(workspace.dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .collect();
    assert!(leftovers.is_empty(), "temporary files left behind");
}
