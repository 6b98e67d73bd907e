//! Template pinning against a live, still-drifting source definition.

use super::test_utils::{changeset, changeset_archive, harness, hash};
use driftline::changeset::{ChangeSetCategory, FileEntry};
use driftline::template::{DriftDefinitionConfig, TemplateManager};
use std::sync::Arc;

fn template_config() -> DriftDefinitionConfig {
    DriftDefinitionConfig {
        name: "baseline-config".to_string(),
        base_directory: "/opt/app/conf".to_string(),
        interval_secs: 1800,
        enabled: true,
        pinned: false,
        attached: true,
    }
}

#[test]
fn pin_captures_state_at_the_requested_version() {
    let h = harness();
    let uploads = [
        changeset(
            1,
            2,
            ChangeSetCategory::Coverage,
            1,
            vec![
                FileEntry::added("conf/app.conf", hash("aaa111")),
                FileEntry::added("conf/db.conf", hash("bbb222")),
            ],
        ),
        changeset(
            1,
            2,
            ChangeSetCategory::Drift,
            2,
            vec![FileEntry::removed("conf/db.conf", hash("bbb222"))],
        ),
    ];
    for cs in &uploads {
        let buf = changeset_archive(cs);
        h.service.ingest_changeset(1, buf.len() as u64, buf.as_slice()).unwrap();
    }

    let manager = TemplateManager::new(Arc::clone(&h.log));
    let id = manager.create_template(10, true, template_config());

    // Pin at version 2: db.conf is already gone from the realized view.
    manager.pin_template(id, 2, 2).unwrap();
    let baseline = manager.template(id).unwrap().baseline.unwrap();
    let paths: Vec<&str> = baseline.entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["conf/app.conf"]);
    assert_eq!(baseline.entries[0].new_hash, Some(hash("aaa111")));
}

#[test]
fn source_drift_after_pin_leaves_template_and_snapshots_alone() {
    let h = harness();
    let v1 = changeset_archive(&changeset(
        1,
        2,
        ChangeSetCategory::Coverage,
        1,
        vec![FileEntry::added("conf/app.conf", hash("aaa111"))],
    ));
    h.service.ingest_changeset(1, v1.len() as u64, v1.as_slice()).unwrap();

    let manager = TemplateManager::new(Arc::clone(&h.log));
    let id = manager.create_template(10, true, template_config());
    manager.pin_template(id, 2, 1).unwrap();

    let snapshot_before = h.service.snapshot_at(2, 1).unwrap();

    // The source keeps drifting after the pin.
    let v2 = changeset_archive(&changeset(
        1,
        2,
        ChangeSetCategory::Drift,
        2,
        vec![FileEntry::changed("conf/app.conf", hash("bbb222"), hash("aaa111")).unwrap()],
    ));
    h.service.ingest_changeset(1, v2.len() as u64, v2.as_slice()).unwrap();

    // Neither the previously built snapshot nor the template baseline moved.
    assert_eq!(h.service.snapshot_at(2, 1).unwrap(), snapshot_before);
    let baseline = manager.template(id).unwrap().baseline.unwrap();
    assert_eq!(baseline.entries[0].new_hash, Some(hash("aaa111")));

    // The live head did move, proving the isolation is real.
    let head = h.service.current_snapshot(2).unwrap();
    assert_eq!(head.files.get("conf/app.conf"), Some(&hash("bbb222")));
}

#[test]
fn template_deletion_does_not_disturb_the_source_log() {
    let h = harness();
    let v1 = changeset_archive(&changeset(
        1,
        2,
        ChangeSetCategory::Coverage,
        1,
        vec![FileEntry::added("conf/app.conf", hash("aaa111"))],
    ));
    h.service.ingest_changeset(1, v1.len() as u64, v1.as_slice()).unwrap();

    let manager = TemplateManager::new(Arc::clone(&h.log));
    let id = manager.create_template(10, true, template_config());
    manager.pin_template(id, 2, 1).unwrap();
    manager.delete_template(id).unwrap();

    assert_eq!(h.log.head_version(1, 2).unwrap(), 1);
    assert_eq!(
        h.service.current_snapshot(2).unwrap().files.get("conf/app.conf"),
        Some(&hash("aaa111"))
    );
}
