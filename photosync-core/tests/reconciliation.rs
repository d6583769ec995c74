mod support;

use std::fs;

use photosync_core::catalog::CatalogRepository;
use photosync_core::model::{ChangeEvent, PhotoStatus};
use support::SyncHarness;

#[tokio::test]
async fn second_sweep_without_changes_writes_nothing() {
    let h = SyncHarness::new();
    h.write_png("Travel/beach.png", [10, 20, 30], 16, 12);
    h.write_png("Travel/2023/hill.png", [40, 50, 60], 8, 8);
    h.write_png("Family/dog.png", [70, 80, 90], 12, 16);

    let first = h.sweep().await;
    assert_eq!(first.added, 3);
    let writes = h.catalog.writes();

    let second = h.sweep().await;
    assert_eq!(second.files_scanned, 3);
    assert_eq!(second.unchanged, 3);
    assert_eq!(second.changes(), 0);
    assert_eq!(h.catalog.writes(), writes);
}

#[tokio::test]
async fn restarted_engine_reuses_catalog_state() {
    let mut h = SyncHarness::new();
    h.write_png("Travel/beach.png", [10, 20, 30], 16, 12);
    h.sweep().await;
    let writes = h.catalog.writes();

    h.restart();
    assert_eq!(h.engine.seed().await.unwrap(), 1);
    let stats = h.sweep().await;

    assert_eq!(stats.unchanged, 1);
    assert_eq!(h.catalog.writes(), writes);
}

#[tokio::test]
async fn admitted_records_carry_path_derived_fields_and_thumbnails() {
    let h = SyncHarness::new();
    h.write_png("Travel/IMG_20230615_sunset_beach.png", [200, 100, 0], 40, 20);
    h.sweep().await;

    let record = h
        .catalog
        .active_at("Travel/IMG_20230615_sunset_beach.png")
        .expect("record");
    assert_eq!(record.category, "Travel");
    assert_eq!(record.filename, "IMG_20230615_sunset_beach.png");
    assert_eq!(record.title, "Sunset Beach");
    assert_eq!((record.width, record.height), (40, 20));
    assert_eq!(record.revision, 1);
    assert_eq!(h.assets.count_for(&record.identity), 1);
}

#[tokio::test]
async fn rename_moves_the_existing_record() {
    let h = SyncHarness::new();
    h.write_png("A/x.png", [1, 2, 3], 10, 10);
    h.sweep().await;
    let identity = h.identity_at("A/x.png");

    fs::create_dir_all(h.path("B")).unwrap();
    fs::rename(h.path("A/x.png"), h.path("B/x.png")).unwrap();
    let stats = h.sweep().await;

    assert_eq!(stats.moved, 1);
    assert_eq!(stats.removed, 0);
    assert_eq!(stats.added, 0);
    let records = h.catalog.all_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].identity, identity);
    assert_eq!(records[0].relative_path, "B/x.png");
    assert_eq!(records[0].category, "B");
    assert_eq!(records[0].status, PhotoStatus::Active);
    assert!(h.engine.state().get("A/x.png").is_none());
}

#[tokio::test]
async fn renamed_photo_keeps_a_manually_set_title() {
    let h = SyncHarness::new();
    h.write_png("A/x.png", [1, 2, 3], 10, 10);
    h.sweep().await;

    let mut record = h.catalog.active_at("A/x.png").unwrap();
    record.title = "Harbour at dusk".to_string();
    h.catalog.upsert(&record).await.unwrap();

    fs::create_dir_all(h.path("B")).unwrap();
    fs::rename(h.path("A/x.png"), h.path("B/y.png")).unwrap();
    let stats = h.sweep().await;

    assert_eq!(stats.moved, 1);
    let moved = h.catalog.active_at("B/y.png").unwrap();
    assert_eq!(moved.filename, "y.png");
    assert_eq!(moved.title, "Harbour at dusk");
}

#[tokio::test]
async fn swapped_files_trade_records_without_losing_thumbnails() {
    let h = SyncHarness::new();
    h.write_png("A/x.png", [200, 0, 0], 10, 10);
    h.write_png("A/y.png", [0, 0, 200], 20, 10);
    h.sweep().await;
    let red = h.identity_at("A/x.png");
    let blue = h.identity_at("A/y.png");

    fs::rename(h.path("A/x.png"), h.path("A/swap.tmp")).unwrap();
    fs::rename(h.path("A/y.png"), h.path("A/x.png")).unwrap();
    fs::rename(h.path("A/swap.tmp"), h.path("A/y.png")).unwrap();
    let stats = h.sweep().await;
    h.engine.wait_for_cleanup().await;

    assert_eq!(stats.moved, 2);
    assert_eq!(stats.removed, 0);
    assert_eq!(stats.added, 0);
    assert_eq!(h.identity_at("A/x.png"), blue);
    assert_eq!(h.identity_at("A/y.png"), red);
    assert_eq!(h.catalog.all_records().len(), 2);
    assert_eq!(h.assets.count_for(&red), 1);
    assert_eq!(h.assets.count_for(&blue), 1);

    assert_eq!(h.sweep().await.changes(), 0);
}

#[tokio::test]
async fn content_change_retires_old_identity_and_admits_new_one() {
    let h = SyncHarness::new();
    h.write_png("A/x.png", [1, 2, 3], 10, 10);
    h.sweep().await;
    let old = h.identity_at("A/x.png");

    h.write_png("A/x.png", [9, 9, 9], 20, 10);
    let stats = h.sweep().await;
    h.engine.wait_for_cleanup().await;

    assert_eq!(stats.added, 1);
    assert_eq!(stats.removed, 1);
    let new = h.identity_at("A/x.png");
    assert_ne!(new, old);

    let old_record = h.catalog.find_by_identity(&old).await.unwrap().unwrap();
    assert_eq!(old_record.status, PhotoStatus::Removed);
    assert_eq!(h.assets.count_for(&old), 0);
    assert_eq!(h.assets.count_for(&new), 1);
}

#[tokio::test]
async fn undecodable_file_leaves_existing_record_untouched() {
    let h = SyncHarness::new();
    h.write_png("A/x.png", [1, 2, 3], 10, 10);
    h.sweep().await;
    let before = h.catalog.active_at("A/x.png").unwrap();
    let writes = h.catalog.writes();

    h.write_bytes("A/x.png", b"\x89PNG\r\n\x1a\n truncated mid-upload");
    let stats = h.sweep().await;
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.changes(), 0);

    let again = h.sweep().await;
    assert_eq!(again.skipped, 1);
    assert_eq!(h.catalog.writes(), writes);
    assert_eq!(h.catalog.active_at("A/x.png"), Some(before));
}

#[tokio::test]
async fn repaired_file_is_picked_up_after_rejection() {
    let h = SyncHarness::new();
    h.write_bytes("A/x.png", b"not an image at all");
    assert_eq!(h.sweep().await.skipped, 1);
    assert!(h.catalog.all_records().is_empty());

    h.write_png("A/x.png", [5, 5, 5], 6, 6);
    let stats = h.sweep().await;
    assert_eq!(stats.added, 1);
}

#[tokio::test]
async fn rejection_is_forgotten_once_the_file_is_gone() {
    let h = SyncHarness::new();
    h.write_bytes("A/bad.jpg", b"definitely not a jpeg");
    h.sweep().await;
    assert_eq!(h.engine.rejected_count(), 1);

    fs::remove_file(h.path("A/bad.jpg")).unwrap();
    h.sweep().await;
    assert_eq!(h.engine.rejected_count(), 0);

    h.write_bytes("A/worse.jpg", b"still not a jpeg");
    h.sweep().await;
    assert_eq!(h.engine.rejected_count(), 1);

    fs::remove_dir_all(h.path("A")).unwrap();
    h.engine
        .apply_events(vec![ChangeEvent::Removed(h.path("A"))])
        .await;
    assert_eq!(h.engine.rejected_count(), 0);
}

#[tokio::test]
async fn deleted_file_is_marked_removed_by_the_next_sweep() {
    let h = SyncHarness::new();
    h.write_png("A/x.png", [1, 2, 3], 10, 10);
    h.sweep().await;
    let identity = h.identity_at("A/x.png");

    fs::remove_file(h.path("A/x.png")).unwrap();
    let stats = h.sweep().await;
    h.engine.wait_for_cleanup().await;

    assert_eq!(stats.removed, 1);
    let record = h.catalog.find_by_identity(&identity).await.unwrap().unwrap();
    assert_eq!(record.status, PhotoStatus::Removed);
    assert!(h.engine.state().is_empty());
    assert_eq!(h.assets.count_for(&identity), 0);

    let idle = h.sweep().await;
    assert_eq!(idle.changes(), 0);
}

#[tokio::test]
async fn restored_bytes_reactivate_the_same_row() {
    let h = SyncHarness::new();
    h.write_png("A/x.png", [1, 2, 3], 10, 10);
    h.sweep().await;
    let identity = h.identity_at("A/x.png");
    let bytes = fs::read(h.path("A/x.png")).unwrap();

    fs::remove_file(h.path("A/x.png")).unwrap();
    h.sweep().await;

    h.write_bytes("C/restored.png", &bytes);
    let stats = h.sweep().await;

    assert_eq!(stats.added, 1);
    let records = h.catalog.all_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].identity, identity);
    assert_eq!(records[0].relative_path, "C/restored.png");
    assert!(records[0].is_active());
}

#[tokio::test]
async fn root_level_files_are_never_admitted() {
    let h = SyncHarness::new();
    h.write_png("loose.png", [1, 1, 1], 4, 4);

    let first = h.sweep().await;
    let second = h.sweep().await;

    assert_eq!(first.skipped, 1);
    assert_eq!(second.skipped, 1);
    assert!(h.catalog.all_records().is_empty());
}

#[tokio::test]
async fn duplicate_copies_share_one_record() {
    let h = SyncHarness::new();
    h.write_png("A/x.png", [3, 3, 3], 10, 10);
    fs::create_dir_all(h.path("B")).unwrap();
    fs::copy(h.path("A/x.png"), h.path("B/copy.png")).unwrap();

    h.sweep().await;
    let records = h.catalog.all_records();
    assert_eq!(records.len(), 1);
    let canonical = records[0].relative_path.clone();
    let other = if canonical == "A/x.png" { "B/copy.png" } else { "A/x.png" };

    let writes = h.catalog.writes();
    assert_eq!(h.sweep().await.changes(), 0);
    assert_eq!(h.catalog.writes(), writes);

    fs::remove_file(h.path(&canonical)).unwrap();
    let stats = h.sweep().await;

    assert_eq!(stats.moved, 1);
    assert_eq!(stats.removed, 0);
    let record = h.catalog.active_at(other).expect("record follows the surviving copy");
    assert_eq!(record.identity, records[0].identity);
}

#[tokio::test]
async fn rename_event_is_applied_without_a_sweep() {
    let h = SyncHarness::new();
    h.write_png("A/x.png", [1, 2, 3], 10, 10);
    h.sweep().await;
    let identity = h.identity_at("A/x.png");

    fs::create_dir_all(h.path("B")).unwrap();
    fs::rename(h.path("A/x.png"), h.path("B/y.png")).unwrap();
    let stats = h
        .engine
        .apply_events(vec![ChangeEvent::Renamed {
            from: h.path("A/x.png"),
            to: h.path("B/y.png"),
        }])
        .await;

    assert_eq!(stats.moved, 1);
    assert_eq!(stats.removed, 0);
    let record = h.catalog.active_at("B/y.png").unwrap();
    assert_eq!(record.identity, identity);
    assert_eq!(record.title, "Y");
}

#[tokio::test]
async fn removed_directory_event_retires_everything_beneath_it() {
    let h = SyncHarness::new();
    h.write_png("Trip/a.png", [1, 0, 0], 4, 4);
    h.write_png("Trip/day2/b.png", [0, 1, 0], 4, 4);
    h.write_png("Home/c.png", [0, 0, 1], 4, 4);
    h.sweep().await;

    fs::remove_dir_all(h.path("Trip")).unwrap();
    let stats = h
        .engine
        .apply_events(vec![ChangeEvent::Removed(h.path("Trip"))])
        .await;

    assert_eq!(stats.removed, 2);
    assert!(h.catalog.active_at("Home/c.png").is_some());
    assert_eq!(h.engine.state().len(), 1);
}

#[tokio::test]
async fn created_directory_event_admits_its_contents() {
    let h = SyncHarness::new();
    fs::create_dir_all(h.root.join("Inbox")).unwrap();
    h.sweep().await;

    h.write_png("Inbox/batch/one.png", [8, 8, 8], 4, 4);
    h.write_png("Inbox/batch/two.png", [9, 9, 9], 4, 4);
    let stats = h
        .engine
        .apply_events(vec![ChangeEvent::Created(h.path("Inbox/batch"))])
        .await;

    assert_eq!(stats.added, 2);
    assert!(h.catalog.active_at("Inbox/batch/one.png").is_some());
}

#[tokio::test]
async fn watch_event_and_sweep_agree_on_the_same_path() {
    let h = SyncHarness::new();
    h.write_png("A/x.png", [1, 2, 3], 10, 10);

    let event = h
        .engine
        .apply_events(vec![ChangeEvent::Created(h.path("A/x.png"))])
        .await;
    let sweep = h.sweep().await;

    assert_eq!(event.added, 1);
    assert_eq!(sweep.unchanged, 1);
    assert_eq!(h.catalog.all_records().len(), 1);
}
