use std::sync::Arc;

use rayon::prelude::*;

use crate::common::{TestWorkspace, f32_bytes, random_vectors};
use knn_codec::{SegmentReader, SegmentWriter, SpaceType};

#[test]
fn test_parallel_random_access() {
    let workspace = TestWorkspace::new();
    let path = workspace.segment_path("_0");
    let vectors = random_vectors(42, 2_000, 32);

    let mut writer = SegmentWriter::new("_0");
    let field = writer.begin_field("vec", 32, SpaceType::L2, None).unwrap();
    for (doc, vector) in vectors.iter().enumerate() {
        field.add_vector(doc as u32, vector).unwrap();
    }
    writer.flush_to_path(&path).unwrap();

    let reader = SegmentReader::open(&path).unwrap();
    let mismatches = (0..vectors.len() as u32)
        .into_par_iter()
        .filter(|&doc| {
            let field = reader.get_field("vec").unwrap();
            field.vector_at(doc).unwrap() != f32_bytes(&vectors[doc as usize]).as_slice()
        })
        .count();
    assert_eq!(mismatches, 0);
}

#[test]
fn test_reader_shared_across_threads() {
    let vectors = random_vectors(43, 500, 8);
    let mut writer = SegmentWriter::new("_1");
    let field = writer.begin_field("vec", 8, SpaceType::Cosine, None).unwrap();
    for (doc, vector) in vectors.iter().enumerate() {
        // Only even documents have vectors.
        if doc % 2 == 0 {
            field.add_vector(doc as u32, vector).unwrap();
        }
    }
    let mut bytes = Vec::new();
    writer.flush(&mut bytes).unwrap();

    let reader = Arc::new(SegmentReader::from_bytes(bytes).unwrap());
    let vectors = Arc::new(vectors);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let reader = Arc::clone(&reader);
            let vectors = Arc::clone(&vectors);
            std::thread::spawn(move || {
                let field = reader.get_field("vec").unwrap();
                for doc in (t..500).step_by(8) {
                    let result = field.vector_f32_at(doc as u32);
                    if doc % 2 == 0 {
                        assert_eq!(result.unwrap(), vectors[doc]);
                    } else {
                        assert!(result.is_err());
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_parallel_verification() {
    let mut writer = SegmentWriter::new("_2");
    for i in 0..16 {
        let dim = 4 + i;
        let field = writer
            .begin_field(&format!("f{i}"), dim, SpaceType::L2, None)
            .unwrap();
        for (doc, vector) in random_vectors(i as u64, 64, dim).iter().enumerate() {
            field.add_vector(doc as u32, vector).unwrap();
        }
    }
    let mut bytes = Vec::new();
    writer.flush(&mut bytes).unwrap();

    let reader = SegmentReader::from_bytes(bytes).unwrap();
    reader.verify_fields().unwrap();
    reader
        .field_names()
        .collect::<Vec<_>>()
        .par_iter()
        .for_each(|name| reader.get_field(name).unwrap().verify().unwrap());
}
