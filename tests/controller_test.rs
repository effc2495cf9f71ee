/// Scanner, fetch loop and change watcher wired through the controller.
mod support;

use reach_scout::{AdPage, BadgeKind, Controller, LoopReport, SnapshotPage};
use std::sync::Arc;
use std::time::Duration;
use support::*;

fn controller_for(page: Arc<SnapshotPage>, endpoint: &str) -> Arc<Controller> {
    let settings = fast_settings(endpoint);
    Controller::new(page, fetcher(&settings), settings)
}

#[tokio::test]
async fn rescans_never_duplicate_library_ids() {
    init_logger();
    let (_mock, endpoint) = spawn_mock(Mode::Reach, Duration::ZERO).await;
    let page = Arc::new(SnapshotPage::new(page_html(
        &[ad_card("1"), ad_card("2"), ad_card("1")],
        true,
    )));
    let controller = controller_for(page.clone(), &endpoint);

    let first = controller.scan().await.unwrap();
    assert_eq!(first.candidates, 3);
    assert_eq!(first.added, 2);

    let again = controller.scan().await.unwrap();
    assert_eq!(again.added, 0);
    assert!(!again.found_new());

    page.replace_html(page_html(
        &[ad_card("1"), ad_card("2"), ad_card("1"), ad_card("3")],
        true,
    ));
    assert_eq!(controller.scan().await.unwrap().added, 1);

    let ids: Vec<String> = controller
        .tracked()
        .await
        .iter()
        .map(|e| e.library_id.to_string())
        .collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn containers_without_label_or_with_extra_classes_are_ignored() {
    init_logger();
    let (_mock, endpoint) = spawn_mock(Mode::Reach, Duration::ZERO).await;
    let html = page_html(
        &[
            r#"<div class="xh8yej3"><span>Sponsored</span></div>"#.to_string(),
            r#"<div class="xh8yej3 x2"><span>Library ID: 500</span></div>"#.to_string(),
            ad_card("501"),
        ],
        true,
    );
    let page = Arc::new(SnapshotPage::new(html));
    let controller = controller_for(page, &endpoint);

    let report = controller.scan().await.unwrap();
    assert_eq!(report.candidates, 2);
    assert_eq!(report.added, 1);
    assert_eq!(controller.tracked().await[0].library_id.as_str(), "501");
}

#[tokio::test]
async fn fetch_loop_skips_already_badged_entries() {
    init_logger();
    let (mock, endpoint) = spawn_mock(Mode::Reach, Duration::ZERO).await;
    let page = Arc::new(SnapshotPage::new(page_html(
        &[ad_card_with_badge("201"), ad_card("202")],
        true,
    )));
    let controller = controller_for(page.clone(), &endpoint);
    controller.scan().await.unwrap();

    let report = controller.run_fetch_loop().await;
    assert_eq!(
        report,
        LoopReport::Finished {
            fetched: 1,
            skipped: 1,
            rescheduled: false
        }
    );
    assert_eq!(mock.calls(), 1);
    assert_eq!(mock.requests()[0].variables()["adArchiveID"], "202");

    let tracked = controller.tracked().await;
    assert!(page.badges_for(&tracked[0].element).is_empty());
    assert_eq!(page.badges_for(&tracked[1].element)[0].text, "EU Reach: 2020");

    // A second pass has nothing left to submit.
    let again = controller.run_fetch_loop().await;
    assert_eq!(
        again,
        LoopReport::Finished {
            fetched: 0,
            skipped: 2,
            rescheduled: false
        }
    );
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn loop_keeps_one_request_in_flight() {
    init_logger();
    let (mock, endpoint) = spawn_mock(Mode::Reach, Duration::from_millis(30)).await;
    let cards: Vec<String> = (1..=4).map(|i| ad_card(&i.to_string())).collect();
    let page = Arc::new(SnapshotPage::new(page_html(&cards, true)));
    let controller = controller_for(page.clone(), &endpoint);
    controller.scan().await.unwrap();

    let (a, b) = tokio::join!(controller.run_fetch_loop(), controller.run_fetch_loop());

    let dropped = [a, b]
        .iter()
        .filter(|r| **r == LoopReport::AlreadyRunning)
        .count();
    assert_eq!(dropped, 1, "second trigger must be dropped: {:?} {:?}", a, b);
    assert_eq!(mock.calls(), 4);
    assert_eq!(mock.max_in_flight(), 1);
    assert_eq!(page.badge_count(), 4);
    assert!(!controller.is_processing());
}

#[tokio::test]
async fn entries_added_mid_run_are_picked_up_by_recheck() {
    init_logger();
    let (mock, endpoint) = spawn_mock(Mode::Reach, Duration::from_millis(40)).await;
    let page = Arc::new(SnapshotPage::new(page_html(
        &[ad_card("1"), ad_card("2")],
        true,
    )));
    let controller = controller_for(page.clone(), &endpoint);
    controller.scan().await.unwrap();

    let running = {
        let c = controller.clone();
        tokio::spawn(async move { c.run_fetch_loop().await })
    };
    assert!(eventually(|| controller.is_processing()).await);

    page.replace_html(page_html(&[ad_card("1"), ad_card("2"), ad_card("3")], true));
    assert_eq!(controller.scan().await.unwrap().added, 1);

    let report = running.await.unwrap();
    assert!(matches!(
        report,
        LoopReport::Finished {
            rescheduled: true,
            ..
        }
    ));
    assert!(eventually(|| page.badge_count() == 3).await);
    assert_eq!(mock.calls(), 3);
}

#[tokio::test]
async fn watcher_fetches_new_ads_after_mutation() {
    init_logger();
    let (mock, endpoint) = spawn_mock(Mode::Reach, Duration::ZERO).await;
    let page = Arc::new(SnapshotPage::new(page_html(&[], true)));
    let controller = controller_for(page.clone(), &endpoint);
    let watcher = tokio::spawn(controller.clone().watch());
    assert!(eventually(|| page.subscriber_count() == 1).await);

    page.replace_html(page_html(&[ad_card("31"), ad_card("32")], true));

    assert!(eventually(|| page.badge_count() == 2).await);
    assert_eq!(mock.calls(), 2);
    let tracked = controller.tracked().await;
    assert_eq!(tracked.len(), 2);
    assert_eq!(page.badges_for(&tracked[0].element)[0].kind, BadgeKind::Success);

    page.close();
    watcher.await.unwrap().unwrap();
}

#[tokio::test]
async fn trigger_button_runs_loop_on_demand() {
    init_logger();
    let (mock, endpoint) = spawn_mock(Mode::Status(500), Duration::ZERO).await;
    let page = Arc::new(SnapshotPage::new(page_html(&[ad_card("41")], true)));
    let controller = controller_for(page.clone(), &endpoint);
    page.install_trigger("Fetch All Ad Details").await.unwrap();
    controller.scan().await.unwrap();
    let watcher = tokio::spawn(controller.clone().watch());
    assert!(eventually(|| page.subscriber_count() == 1).await);

    page.press_trigger();

    assert!(eventually(|| page.badge_count() == 1).await);
    assert_eq!(mock.calls(), 3);
    let tracked = controller.tracked().await;
    assert_eq!(page.badges_for(&tracked[0].element)[0].kind, BadgeKind::Fallback);
    assert_eq!(page.trigger_label().as_deref(), Some("Fetch All Ad Details"));

    page.close();
    watcher.await.unwrap().unwrap();
}

#[tokio::test]
async fn tokenless_page_is_not_retried_in_a_loop() {
    init_logger();
    let (mock, endpoint) = spawn_mock(Mode::Reach, Duration::ZERO).await;
    let page = Arc::new(SnapshotPage::new(page_html(&[ad_card("51")], false)));
    let controller = controller_for(page.clone(), &endpoint);
    controller.scan().await.unwrap();

    let report = controller.run_fetch_loop().await;
    assert_eq!(
        report,
        LoopReport::Finished {
            fetched: 1,
            skipped: 0,
            rescheduled: false
        }
    );
    assert_eq!(mock.calls(), 0);
    assert_eq!(page.badge_count(), 0);
    assert_eq!(controller.pending_count().await, 0);

    // After the token shows up, the trigger path retries it.
    page.replace_html(page_html(&[ad_card("51")], true));
    controller.forget_tokenless().await;
    controller.run_fetch_loop().await;
    assert_eq!(mock.calls(), 1);
    assert_eq!(page.badge_count(), 1);
}

#[tokio::test]
async fn run_once_reports_every_outcome() {
    init_logger();
    let (_mock, endpoint) = spawn_mock(Mode::Reach, Duration::ZERO).await;
    let page = Arc::new(
        SnapshotPage::new(page_html(&[ad_card("61"), ad_card("62")], true))
            .with_url("https://www.facebook.com/ads/library/"),
    );
    let controller = controller_for(page.clone(), &endpoint);

    let report = controller.run_once().await.unwrap();

    assert_eq!(report.tracked, 2);
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.url.as_deref(), Some("https://www.facebook.com/ads/library/"));
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["records"][0]["library_id"], "61");
    assert_eq!(json["records"][0]["outcome"]["status"], "reach");
    assert_eq!(json["records"][1]["outcome"]["value"], 620);
}

#[tokio::test]
async fn startup_scan_fetches_without_a_trigger() {
    init_logger();
    let (mock, endpoint) = spawn_mock(Mode::Reach, Duration::ZERO).await;
    let cards = [ad_card("71"), ad_card("72")];
    let page = Arc::new(SnapshotPage::new(page_html(&cards, true)));
    let controller = controller_for(page.clone(), &endpoint);
    let watcher = tokio::spawn(controller.clone().watch());
    assert!(eventually(|| page.subscriber_count() == 1).await);

    let first = controller.scan_and_schedule().await.unwrap();
    assert_eq!(first.added, 2);
    // Later mutations carry nothing new; the startup scan alone must schedule.
    page.replace_html(page_html(&cards, true));

    assert!(eventually(|| page.badge_count() == 2).await);
    assert!(eventually(|| !controller.is_processing()).await);
    assert_eq!(mock.calls(), 2);

    page.close();
    watcher.await.unwrap().unwrap();
}

#[tokio::test]
async fn mutation_during_a_run_is_left_to_the_recheck() {
    init_logger();
    let (mock, endpoint) = spawn_mock(Mode::Reach, Duration::from_millis(40)).await;
    let initial: Vec<String> = (81..=84).map(|i| ad_card(&i.to_string())).collect();
    let page = Arc::new(SnapshotPage::new(page_html(&initial, true)));
    let controller = controller_for(page.clone(), &endpoint);
    controller.scan().await.unwrap();
    let watcher = tokio::spawn(controller.clone().watch());
    assert!(eventually(|| page.subscriber_count() == 1).await);

    let running = {
        let c = controller.clone();
        tokio::spawn(async move { c.run_fetch_loop().await })
    };
    assert!(eventually(|| controller.is_processing()).await);

    let mut grown = initial.clone();
    grown.push(ad_card("85"));
    page.replace_html(page_html(&grown, true));

    let report = running.await.unwrap();
    assert!(matches!(
        report,
        LoopReport::Finished {
            rescheduled: true,
            ..
        }
    ));
    assert!(eventually(|| page.badge_count() == 5).await);
    assert!(eventually(|| !controller.is_processing()).await);

    let mut ids: Vec<String> = mock
        .requests()
        .iter()
        .map(|r| r.variables()["adArchiveID"].as_str().unwrap_or_default().to_string())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["81", "82", "83", "84", "85"]);
    assert_eq!(mock.max_in_flight(), 1);
    assert_eq!(controller.tracked().await.len(), 5);

    page.close();
    watcher.await.unwrap().unwrap();
}
