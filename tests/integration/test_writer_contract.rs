use std::sync::Arc;

use crate::common::{TestWorkspace, metadata, random_vectors};
use knn_codec::model::ModelState;
use knn_codec::{
    AlgorithmFamily, CodecError, ModelStore, SegmentWriter, SpaceType, WriterState,
};

#[test]
fn test_second_begin_field_with_same_name_fails() {
    let mut writer = SegmentWriter::new("_0");
    writer.begin_field("vec", 3, SpaceType::Cosine, None).unwrap();

    let err = writer
        .begin_field("vec", 3, SpaceType::Cosine, None)
        .unwrap_err();
    match err {
        CodecError::DuplicateField { field } => assert_eq!(field, "vec"),
        other => panic!("expected DuplicateField, got {other:?}"),
    }
}

#[test]
fn test_untrained_model_seals_no_file() {
    let workspace = TestWorkspace::new();
    let store = workspace.model_store();
    store
        .register(
            metadata("pending", 3, SpaceType::Cosine, AlgorithmFamily::Ivf)
                .with_state(ModelState::Training),
        )
        .unwrap();

    let path = workspace.segment_path("_0");
    let mut writer = SegmentWriter::new("_0").with_models(store);
    let err = writer
        .begin_field("vec", 3, SpaceType::Cosine, Some("pending"))
        .unwrap_err();
    assert!(matches!(err, CodecError::ModelNotTrained { .. }));
    assert_eq!(writer.state(), WriterState::Failed);

    let err = writer.flush_to_path(&path).unwrap_err();
    assert!(matches!(err, CodecError::WriterClosed { .. }));
    assert!(!path.exists());
}

#[test]
fn test_unknown_model_id() {
    let store = Arc::new(ModelStore::in_memory());
    let mut writer = SegmentWriter::new("_0").with_models(store);
    let err = writer
        .begin_field("vec", 3, SpaceType::L2, Some("nope"))
        .unwrap_err();
    assert!(matches!(err, CodecError::ModelNotFound { model_id } if model_id == "nope"));
}

#[test]
fn test_lower_ordinal_fails_deterministically() {
    for _ in 0..3 {
        let mut writer = SegmentWriter::new("_0");
        let field = writer.begin_field("vec", 2, SpaceType::L2, None).unwrap();
        field.add_vector(4, &[0.0, 1.0]).unwrap();
        field.add_vector(7, &[1.0, 0.0]).unwrap();

        let err = field.add_vector(5, &[1.0, 1.0]).unwrap_err();
        match err {
            CodecError::OrderingViolation { field, doc, .. } => {
                assert_eq!(field, "vec");
                assert_eq!(doc, 5);
            }
            other => panic!("expected OrderingViolation, got {other:?}"),
        }
        assert_eq!(field.vector_count(), 2);
    }
}

#[test]
fn test_rejected_vector_aborts_the_segment() {
    let mut writer = SegmentWriter::new("_0");
    {
        let field = writer.begin_field("vec", 2, SpaceType::L2, None).unwrap();
        field.add_vector(0, &[0.0, 1.0]).unwrap();
        let err = field.add_vector(1, &[0.0, 1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::DimensionMismatch {
                expected: 2,
                actual: 3,
                ..
            }
        ));
        assert!(matches!(
            field.add_vector(2, &[0.0, 1.0]),
            Err(CodecError::FieldAborted { .. })
        ));
    }

    let mut sink = Vec::new();
    assert!(writer.flush(&mut sink).is_err());
    assert!(sink.is_empty());
}

#[test]
fn test_writer_is_terminal_after_flush() {
    let mut writer = SegmentWriter::new("_0");
    writer
        .begin_field("vec", 2, SpaceType::L2, None)
        .unwrap()
        .add_vector(0, &[0.0, 1.0])
        .unwrap();
    writer.flush(Vec::new()).unwrap();
    assert_eq!(writer.state(), WriterState::Sealed);

    assert!(matches!(
        writer.begin_field("other", 2, SpaceType::L2, None),
        Err(CodecError::WriterClosed { .. })
    ));
    let field = writer.field_mut("vec").unwrap();
    assert!(matches!(
        field.add_vector(1, &[1.0, 0.0]),
        Err(CodecError::FieldSealed { .. })
    ));
}

#[test]
fn test_unpublished_segment_is_not_sealed() {
    let workspace = TestWorkspace::new();
    let target = workspace.segment_path("_0");
    std::fs::create_dir(&target).unwrap();
    std::fs::write(target.join("occupant"), b"x").unwrap();

    let mut writer = SegmentWriter::new("_0");
    writer
        .begin_field("vec", 2, SpaceType::L2, None)
        .unwrap()
        .add_vector(0, &[0.5, 0.5])
        .unwrap();

    let err = writer.flush_to_path(&target).unwrap_err();
    assert!(matches!(err, CodecError::Io { .. }));
    assert_eq!(writer.state(), WriterState::Failed);
    assert!(target.is_dir());

    // No stray temp file is left next to the target.
    let leftovers: Vec<_> = std::fs::read_dir(workspace.dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path != &target)
        .collect();
    assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
}

#[test]
fn test_field_finished_early_is_still_flushed() {
    let mut writer = SegmentWriter::new("_0");
    let vectors = random_vectors(11, 5, 3);
    {
        let field = writer.begin_field("vec", 3, SpaceType::L2, None).unwrap();
        for (doc, vector) in vectors.iter().enumerate() {
            field.add_vector(doc as u32, vector).unwrap();
        }
        let (length, _) = field.finish().unwrap();
        assert_eq!(length, 5 * (4 + 12));
    }

    let summary = writer.flush(Vec::new()).unwrap();
    assert_eq!(summary.fields[0].vector_count, 5);
}

#[test]
fn test_independent_writers_on_threads() {
    let workspace = TestWorkspace::new();
    let paths: Vec<_> = (0..4).map(|i| workspace.segment_path(&format!("_{i}"))).collect();

    std::thread::scope(|scope| {
        for (i, path) in paths.iter().enumerate() {
            scope.spawn(move || {
                let mut writer = SegmentWriter::new(format!("_{i}"));
                let field = writer.begin_field("vec", 8, SpaceType::L2, None).unwrap();
                for (doc, vector) in random_vectors(i as u64, 100, 8).iter().enumerate() {
                    field.add_vector(doc as u32, vector).unwrap();
                }
                writer.flush_to_path(path).unwrap();
            });
        }
    });

    for path in &paths {
        let reader = knn_codec::SegmentReader::open(path).unwrap();
        assert_eq!(reader.get_field("vec").unwrap().len(), 100);
    }
}
