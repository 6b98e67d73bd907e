//! Concurrency behavior of the sync surface: independent keys make
//! progress in parallel, and conflicting uploads never corrupt the log.

use super::test_utils::{changeset, changeset_archive, harness};
use driftline::changeset::ChangeSetCategory;
use driftline::sync::IngestOutcome;
use std::sync::Arc;
use std::thread;

#[test]
fn independent_definitions_ingest_in_parallel() {
    let h = Arc::new(harness());
    let mut handles = Vec::new();

    for definition_id in 1u32..=8 {
        let h = Arc::clone(&h);
        handles.push(thread::spawn(move || {
            let resource_id = definition_id * 10;
            let v1 = changeset_archive(&changeset(
                resource_id,
                definition_id,
                ChangeSetCategory::Coverage,
                1,
                vec![],
            ));
            h.service
                .ingest_changeset(resource_id, v1.len() as u64, v1.as_slice())
                .unwrap();
            for version in 2u32..=6 {
                let buf = changeset_archive(&changeset(
                    resource_id,
                    definition_id,
                    ChangeSetCategory::Drift,
                    version,
                    vec![],
                ));
                let outcome = h
                    .service
                    .ingest_changeset(resource_id, buf.len() as u64, buf.as_slice())
                    .unwrap();
                assert_eq!(outcome, IngestOutcome::Accepted { version });
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for definition_id in 1u32..=8 {
        assert_eq!(
            h.log.head_version(definition_id * 10, definition_id).unwrap(),
            6
        );
    }
}

#[test]
fn racing_duplicate_uploads_accept_exactly_one() {
    let h = Arc::new(harness());
    let v1 = changeset_archive(&changeset(1, 2, ChangeSetCategory::Coverage, 1, vec![]));
    h.service.ingest_changeset(1, v1.len() as u64, v1.as_slice()).unwrap();

    // Two agents (or one confused agent twice) upload version 2 at once.
    let mut handles = Vec::new();
    for _ in 0..2 {
        let h = Arc::clone(&h);
        handles.push(thread::spawn(move || {
            let buf = changeset_archive(&changeset(1, 2, ChangeSetCategory::Drift, 2, vec![]));
            h.service
                .ingest_changeset(1, buf.len() as u64, buf.as_slice())
                .unwrap()
        }));
    }
    let outcomes: Vec<IngestOutcome> = handles.into_iter().map(|j| j.join().unwrap()).collect();

    let accepted = outcomes
        .iter()
        .filter(|o| matches!(o, IngestOutcome::Accepted { .. }))
        .count();
    let repeats = outcomes
        .iter()
        .filter(|o| matches!(o, IngestOutcome::RepeatRequested { .. }))
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(repeats, 1);
    assert_eq!(h.log.head_version(1, 2).unwrap(), 2);
}

#[test]
fn readers_never_observe_gaps() {
    let h = Arc::new(harness());
    let v1 = changeset_archive(&changeset(1, 2, ChangeSetCategory::Coverage, 1, vec![]));
    h.service.ingest_changeset(1, v1.len() as u64, v1.as_slice()).unwrap();

    let writer = {
        let h = Arc::clone(&h);
        thread::spawn(move || {
            for version in 2u32..=20 {
                let buf = changeset_archive(&changeset(
                    1,
                    2,
                    ChangeSetCategory::Drift,
                    version,
                    vec![],
                ));
                h.service
                    .ingest_changeset(1, buf.len() as u64, buf.as_slice())
                    .unwrap();
            }
        })
    };

    // While the writer runs, every observed head must be fully readable
    // from version 1 up, with no holes.
    for _ in 0..50 {
        let head = h.log.head_version(1, 2).unwrap();
        let run = h.log.read_range(1, 2, 1, head).unwrap();
        assert_eq!(run.len() as u32, head);
        for (i, cs) in run.iter().enumerate() {
            assert_eq!(cs.header.version, i as u32 + 1);
        }
    }
    writer.join().unwrap();
    assert_eq!(h.log.head_version(1, 2).unwrap(), 20);
}
