use crate::common::{TestWorkspace, f32_bytes, random_vectors};
use knn_codec::{CodecError, FormatVersion, SegmentReader, SegmentWriter, SpaceType};

#[test]
fn test_single_cosine_field_round_trip() {
    let workspace = TestWorkspace::new();
    let path = workspace.segment_path("_0");

    let mut writer = SegmentWriter::new("_0");
    let field = writer
        .begin_field("vec", 3, SpaceType::Cosine, None)
        .unwrap();
    field.add_vector(0, &[1.0, 0.0, 0.0]).unwrap();
    field.add_vector(1, &[0.0, 1.0, 0.0]).unwrap();
    writer.flush_to_path(&path).unwrap();

    let reader = SegmentReader::open(&path).unwrap();
    let field = reader.get_field("vec").unwrap();
    assert_eq!(field.vector_f32_at(0).unwrap(), vec![1.0, 0.0, 0.0]);
    assert_eq!(field.vector_f32_at(1).unwrap(), vec![0.0, 1.0, 0.0]);
    assert_eq!(field.space_type(), SpaceType::Cosine);
}

#[test]
fn test_two_fields_do_not_share_bytes() {
    let workspace = TestWorkspace::new();
    let path = workspace.segment_path("_1");
    let a = random_vectors(1, 10, 4);
    let b = random_vectors(2, 10, 8);

    let mut writer = SegmentWriter::new("_1");
    {
        let field = writer.begin_field("vecA", 4, SpaceType::L2, None).unwrap();
        for (doc, vector) in a.iter().enumerate() {
            field.add_vector(doc as u32, vector).unwrap();
        }
    }
    {
        let field = writer
            .begin_field("vecB", 8, SpaceType::InnerProduct, None)
            .unwrap();
        for (doc, vector) in b.iter().enumerate() {
            field.add_vector(doc as u32, vector).unwrap();
        }
    }
    let summary = writer.flush_to_path(&path).unwrap();
    assert_eq!(summary.fields.len(), 2);
    assert!(summary.fields[0].end() <= summary.fields[1].offset);

    let reader = SegmentReader::open(&path).unwrap();
    let field_a = reader.get_field("vecA").unwrap();
    let field_b = reader.get_field("vecB").unwrap();
    assert_eq!(field_a.stride(), 16);
    assert_eq!(field_b.stride(), 32);
    assert_eq!(field_a.space_type(), SpaceType::L2);
    assert_eq!(field_b.space_type(), SpaceType::InnerProduct);

    for doc in 0..10u32 {
        let bytes_a = field_a.vector_at(doc).unwrap();
        let bytes_b = field_b.vector_at(doc).unwrap();
        assert_eq!(bytes_a.len(), 16);
        assert_eq!(bytes_b.len(), 32);
        assert_eq!(bytes_a, f32_bytes(&a[doc as usize]).as_slice());
        assert_eq!(bytes_b, f32_bytes(&b[doc as usize]).as_slice());
    }
}

#[test]
fn test_every_written_vector_reads_back_identically() {
    let dims = [1usize, 3, 17, 128];
    let mut writer = SegmentWriter::new("_2");
    let mut expected = Vec::new();

    for (i, dim) in dims.iter().enumerate() {
        let name = format!("field_{i}");
        let vectors = random_vectors(i as u64, 50, *dim);
        // Every third document has no vector in odd fields.
        let docs: Vec<u32> = (0..50u32).filter(|d| i % 2 == 0 || d % 3 != 0).collect();

        let field = writer
            .begin_field(&name, *dim, SpaceType::ALL[i % 5], None)
            .unwrap();
        for &doc in &docs {
            field.add_vector(doc, &vectors[doc as usize]).unwrap();
        }
        expected.push((name, docs, vectors));
    }

    let mut bytes = Vec::new();
    writer.flush(&mut bytes).unwrap();
    let reader = SegmentReader::from_bytes(bytes).unwrap();
    reader.verify_fields().unwrap();

    for (name, docs, vectors) in &expected {
        let field = reader.get_field(name).unwrap();
        assert_eq!(field.len(), docs.len());
        for doc in 0..50u32 {
            if docs.contains(&doc) {
                let stored = field.vector_at(doc).unwrap();
                assert_eq!(stored, f32_bytes(&vectors[doc as usize]).as_slice());
            } else {
                assert!(matches!(
                    field.vector_at(doc),
                    Err(CodecError::NoVector { .. })
                ));
            }
        }

        let iterated: Vec<u32> = field.iter().map(|(doc, _)| doc.get()).collect();
        assert_eq!(&iterated, docs);
    }
}

#[test]
fn test_identical_input_produces_identical_files() {
    let build = || {
        let mut writer = SegmentWriter::new("_3");
        for (name, dim) in [("b", 2usize), ("a", 5)] {
            let field = writer.begin_field(name, dim, SpaceType::L1, None).unwrap();
            for (doc, vector) in random_vectors(9, 20, dim).iter().enumerate() {
                field.add_vector(doc as u32, vector).unwrap();
            }
        }
        let mut bytes = Vec::new();
        writer.flush(&mut bytes).unwrap();
        bytes
    };

    assert_eq!(build(), build());
}

#[test]
fn test_directory_order_follows_registration() {
    let mut writer = SegmentWriter::new("_4");
    for name in ["zeta", "alpha", "mid"] {
        writer
            .begin_field(name, 2, SpaceType::LInf, None)
            .unwrap()
            .add_vector(0, &[0.5, -0.5])
            .unwrap();
    }
    let mut bytes = Vec::new();
    writer.flush(&mut bytes).unwrap();

    let reader = SegmentReader::from_bytes(bytes).unwrap();
    let names: Vec<&str> = reader.field_names().collect();
    assert_eq!(names, ["zeta", "alpha", "mid"]);
    assert_eq!(reader.version(), FormatVersion::CURRENT);
}

#[test]
fn test_empty_segment_round_trip() {
    let workspace = TestWorkspace::new();
    let path = workspace.segment_path("_5");
    let mut writer = SegmentWriter::new("_5");
    writer.flush_to_path(&path).unwrap();

    let reader = SegmentReader::open(&path).unwrap();
    assert_eq!(reader.entries().len(), 0);
    assert!(matches!(
        reader.get_field("vec"),
        Err(CodecError::FieldNotFound { .. })
    ));
}
