//! Orphan purge through the sync surface: referenced blobs survive at any
//! age, unreferenced blobs go only once old enough.

use super::test_utils::{changeset, changeset_archive, content_archive, harness};
use chrono::{Duration, Utc};
use driftline::changeset::{ChangeSetCategory, FileEntry};
use driftline::types::ContentHash;

#[test]
fn referenced_blobs_survive_purge_regardless_of_age() {
    let h = harness();
    let bytes: &[u8] = b"referenced forever";
    let digest = ContentHash::of(bytes);

    let (content, _) = content_archive(&[bytes]);
    h.service
        .ingest_content(1, "core-config", "tok", content.len() as u64, content.as_slice())
        .unwrap();
    let v1 = changeset_archive(&changeset(
        1,
        2,
        ChangeSetCategory::Coverage,
        1,
        vec![FileEntry::added("conf/app.conf", digest.clone())],
    ));
    h.service.ingest_changeset(1, v1.len() as u64, v1.as_slice()).unwrap();

    // Watermark far in the future: age can never save the blob, only the
    // reference can.
    let removed = h.service.purge_orphans(Utc::now() + Duration::days(365)).unwrap();
    assert_eq!(removed, 0);
    assert!(h.content.exists(&digest).unwrap());
}

#[test]
fn old_hashes_still_count_as_references() {
    let h = harness();
    let old_bytes: &[u8] = b"superseded content";
    let new_bytes: &[u8] = b"current content";
    let old_digest = ContentHash::of(old_bytes);
    let new_digest = ContentHash::of(new_bytes);

    let (content, _) = content_archive(&[old_bytes, new_bytes]);
    h.service
        .ingest_content(1, "core-config", "tok", content.len() as u64, content.as_slice())
        .unwrap();

    let v1 = changeset_archive(&changeset(
        1,
        2,
        ChangeSetCategory::Coverage,
        1,
        vec![FileEntry::added("conf/app.conf", old_digest.clone())],
    ));
    h.service.ingest_changeset(1, v1.len() as u64, v1.as_slice()).unwrap();
    let v2 = changeset_archive(&changeset(
        1,
        2,
        ChangeSetCategory::Drift,
        2,
        vec![FileEntry::changed("conf/app.conf", new_digest.clone(), old_digest.clone()).unwrap()],
    ));
    h.service.ingest_changeset(1, v2.len() as u64, v2.as_slice()).unwrap();

    // The old hash is no longer the live state but history still references
    // it; both blobs stay.
    let removed = h.service.purge_orphans(Utc::now() + Duration::days(365)).unwrap();
    assert_eq!(removed, 0);
    assert!(h.content.exists(&old_digest).unwrap());
    assert!(h.content.exists(&new_digest).unwrap());
}

#[test]
fn unreferenced_old_blob_is_purged() {
    let h = harness();
    let orphan_bytes: &[u8] = b"never referenced by any change set";
    let orphan = ContentHash::of(orphan_bytes);
    let (content, _) = content_archive(&[orphan_bytes]);
    h.service
        .ingest_content(1, "core-config", "tok", content.len() as u64, content.as_slice())
        .unwrap();

    // Too young under a past watermark: kept.
    assert_eq!(h.service.purge_orphans(Utc::now() - Duration::hours(1)).unwrap(), 0);
    assert!(h.content.exists(&orphan).unwrap());

    // Old enough under a future watermark: removed.
    assert_eq!(h.service.purge_orphans(Utc::now() + Duration::hours(1)).unwrap(), 1);
    assert!(!h.content.exists(&orphan).unwrap());
}
