use std::sync::Arc;

use crate::common::{TestWorkspace, ivf_model, pq_model, random_vectors, sq8_model};
use knn_codec::{CodecError, ModelStore, SegmentReader, SegmentWriter, SpaceType};

#[test]
fn test_applying_a_model_twice_is_byte_identical() {
    let vector = random_vectors(5, 1, 16).remove(0);
    for template in [
        ivf_model("ivf", 16, SpaceType::L2, 8),
        pq_model("pq", 16, SpaceType::L2, 4),
        sq8_model("sq8", 16, SpaceType::L2),
    ] {
        let first = template.apply(&vector).unwrap();
        let second = template.apply(&vector).unwrap();
        assert_eq!(first, second, "{} is not deterministic", template.model_id());
        assert_eq!(first.len(), template.code_size());
    }
}

#[test]
fn test_model_codes_round_trip_through_disk() {
    let workspace = TestWorkspace::new();
    let store = workspace.model_store();
    let templates = [
        ivf_model("ivf", 8, SpaceType::L2, 4),
        pq_model("pq", 8, SpaceType::InnerProduct, 2),
        sq8_model("sq8", 8, SpaceType::Cosine),
    ];
    for template in &templates {
        store.put(template).unwrap();
    }

    let vectors = random_vectors(21, 30, 8);
    let path = workspace.segment_path("_0");
    let mut writer = SegmentWriter::new("_0").with_models(Arc::clone(&store));
    for template in &templates {
        let field = writer
            .begin_field(
                template.model_id(),
                8,
                template.space_type(),
                Some(template.model_id()),
            )
            .unwrap();
        for (doc, vector) in vectors.iter().enumerate() {
            field.add_vector(doc as u32, vector).unwrap();
        }
    }
    writer.flush_to_path(&path).unwrap();

    // Fresh store: nothing cached, everything comes from the model directory.
    let store = ModelStore::open(workspace.model_dir());
    let reader = SegmentReader::open(&path).unwrap();
    for template in &templates {
        let field = reader.get_field(template.model_id()).unwrap();
        assert_eq!(field.stride(), template.code_size());
        assert_eq!(field.model_reference(), Some(&template.reference()));

        let resolved = field.resolve_model(&store).unwrap().unwrap();
        for (doc, vector) in vectors.iter().enumerate() {
            let stored = field.vector_at(doc as u32).unwrap();
            assert_eq!(stored, template.apply(vector).unwrap().as_slice());
            assert_eq!(resolved.reconstruct(stored).unwrap().len(), 8);
        }
    }
}

#[test]
fn test_ivf_residual_reconstructs_exactly() {
    let template = ivf_model("ivf", 4, SpaceType::L2, 3);
    for vector in random_vectors(8, 10, 4) {
        let code = template.apply(&vector).unwrap();
        let restored = template.reconstruct(&code).unwrap();
        for (a, b) in vector.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}

#[test]
fn test_sq8_reconstruction_is_close() {
    let template = sq8_model("sq8", 6, SpaceType::L2);
    for vector in random_vectors(12, 10, 6) {
        let restored = template.reconstruct(&template.apply(&vector).unwrap()).unwrap();
        for (a, b) in vector.iter().zip(restored.iter()) {
            // One quantization step over [-1, 1] is 2/255.
            assert!((a - b).abs() <= 1.0 / 255.0 + 1e-6);
        }
    }
}

#[test]
fn test_model_dimension_or_metric_mismatch_blocks_the_field() {
    let store = Arc::new(ModelStore::in_memory());
    store.put(&sq8_model("sq8", 8, SpaceType::L2)).unwrap();

    let mut writer = SegmentWriter::new("_0").with_models(Arc::clone(&store));
    let err = writer
        .begin_field("vec", 4, SpaceType::L2, Some("sq8"))
        .unwrap_err();
    assert!(matches!(err, CodecError::ModelMismatch { .. }));

    let mut writer = SegmentWriter::new("_1").with_models(store);
    let err = writer
        .begin_field("vec", 8, SpaceType::Cosine, Some("sq8"))
        .unwrap_err();
    match err {
        CodecError::ModelMismatch { field, detail, .. } => {
            assert_eq!(field, "vec");
            assert!(detail.contains("space type"));
        }
        other => panic!("expected ModelMismatch, got {other:?}"),
    }
}

#[test]
fn test_replaced_model_is_detected_at_read_time() {
    let workspace = TestWorkspace::new();
    let store = workspace.model_store();
    store.put(&sq8_model("sq8", 4, SpaceType::L2)).unwrap();

    let path = workspace.segment_path("_0");
    let mut writer = SegmentWriter::new("_0").with_models(Arc::clone(&store));
    writer
        .begin_field("vec", 4, SpaceType::L2, Some("sq8"))
        .unwrap()
        .add_vector(0, &[0.1, 0.2, 0.3, 0.4])
        .unwrap();
    writer.flush_to_path(&path).unwrap();

    // Retrain under the same id with different parameters.
    store.put(&pq_model("sq8", 4, SpaceType::L2, 2)).unwrap();

    let reader = SegmentReader::open(&path).unwrap();
    let field = reader.get_field("vec").unwrap();
    assert!(matches!(
        field.resolve_model(&store),
        Err(CodecError::ModelMismatch { .. })
    ));

    store.delete("sq8").unwrap();
    assert!(matches!(
        field.resolve_model(&store),
        Err(CodecError::ModelNotFound { .. })
    ));
}

#[test]
fn test_raw_decode_refused_for_model_fields() {
    let store = Arc::new(ModelStore::in_memory());
    store.put(&sq8_model("sq8", 2, SpaceType::L2)).unwrap();

    let mut writer = SegmentWriter::new("_0").with_models(store);
    writer
        .begin_field("vec", 2, SpaceType::L2, Some("sq8"))
        .unwrap()
        .add_vector(0, &[0.5, -0.5])
        .unwrap();
    let mut bytes = Vec::new();
    writer.flush(&mut bytes).unwrap();

    let reader = SegmentReader::from_bytes(bytes).unwrap();
    let field = reader.get_field("vec").unwrap();
    assert_eq!(field.vector_at(0).unwrap().len(), 2);
    assert!(matches!(
        field.vector_f32_at(0),
        Err(CodecError::ModelMismatch { .. })
    ));
}

#[test]
fn test_shared_template_across_threads() {
    let store = Arc::new(ModelStore::in_memory());
    store.put(&ivf_model("ivf", 8, SpaceType::L2, 4)).unwrap();

    let outputs: Vec<Vec<u8>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    let mut writer = SegmentWriter::new(format!("_{i}")).with_models(store);
                    let field = writer
                        .begin_field("vec", 8, SpaceType::L2, Some("ivf"))
                        .unwrap();
                    for (doc, vector) in random_vectors(99, 25, 8).iter().enumerate() {
                        field.add_vector(doc as u32, vector).unwrap();
                    }
                    let mut bytes = Vec::new();
                    writer.flush(&mut bytes).unwrap();
                    bytes
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Same input and model: every thread must produce the same payload.
    let payloads: Vec<Vec<u8>> = outputs
        .into_iter()
        .map(|bytes| {
            let reader = SegmentReader::from_bytes(bytes).unwrap();
            let field = reader.get_field("vec").unwrap();
            field.iter().flat_map(|(_, v)| v.to_vec()).collect()
        })
        .collect();
    assert!(payloads.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.cached_count(), 1);
}
