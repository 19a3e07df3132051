
use prompt_queue::*;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::*;
use tokio::time::{sleep, Instant};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn detector() -> CompletionDetector {
    CompletionDetector::new(DetectorConfig::default(), Arc::new(SiteProfile::chatgpt()))
}

fn driver(page: &FakePage) -> PageDriver<FakePage> {
    PageDriver::new(page.clone(), SiteProfile::chatgpt())
}

// ── Completion detector ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_quiet_page_resolves_after_stable_floor() {
    let page = FakePage::chat();
    let mut detector = detector();

    let started = Instant::now();
    detector.await_completion(&page, false).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= ms(2000), "resolved too early: {:?}", elapsed);
    assert!(elapsed < ms(2400), "resolved too late: {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_new_assistant_message_counts_as_change() {
    let profile = SiteProfile::chatgpt();
    let page = FakePage::chat();
    page.dom().set_count(&profile.assistant_messages, 1);
    let mut detector = detector();

    let started = Instant::now();
    detector.await_completion(&page, false).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= ms(2000));
    assert!(elapsed < ms(2400));
}

#[tokio::test(start_paused = true)]
async fn test_waits_while_streaming() {
    let profile = SiteProfile::chatgpt();
    let page = FakePage::chat();
    page.dom().set_count(&profile.streaming[2], 1);

    let remote = page.clone();
    let stop = profile.streaming[2].clone();
    tokio::spawn(async move {
        sleep(ms(5200)).await;
        remote.dom().set_count(&stop, 0);
    });

    let mut detector = detector();
    let started = Instant::now();
    detector.await_completion(&page, false).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= ms(5200), "resolved while streaming: {:?}", elapsed);
    assert!(elapsed < ms(6000));
}

#[tokio::test(start_paused = true)]
async fn test_endless_streaming_times_out() {
    let profile = SiteProfile::chatgpt();
    let page = FakePage::chat();
    page.dom().set_count(&profile.streaming[0], 1);
    let mut detector = detector();

    let started = Instant::now();
    let err = detector.await_completion(&page, false).await.unwrap_err();

    assert_eq!(err, DriverError::Timeout);
    assert_eq!(err.reason(), "Response timeout");
    assert!(started.elapsed() >= Duration::from_secs(120));
    assert!(started.elapsed() < Duration::from_secs(121));
}

#[tokio::test(start_paused = true)]
async fn test_custom_ceiling() {
    let profile = SiteProfile::chatgpt();
    let page = FakePage::chat();
    page.dom().set_count(&profile.streaming[0], 1);
    let config = DetectorConfig::builder()
        .with_ceiling(Duration::from_secs(10))
        .build();
    let mut detector = CompletionDetector::new(config, Arc::new(profile));

    let started = Instant::now();
    assert_eq!(
        detector.await_completion(&page, false).await,
        Err(DriverError::Timeout)
    );
    assert!(started.elapsed() < Duration::from_secs(11));
}

#[tokio::test(start_paused = true)]
async fn test_image_mode_waits_for_new_image() {
    let profile = SiteProfile::chatgpt();
    let page = FakePage::chat();
    {
        let mut dom = page.dom();
        dom.add_image(&profile.images.selectors[0], "https://files.oaiusercontent.com/1.png");
        dom.add_image(&profile.images.selectors[0], "https://files.oaiusercontent.com/2.png");
        // Same image matched by a second selector is still one image.
        dom.add_image(&profile.images.selectors[5], "https://files.oaiusercontent.com/2.png");
    }
    let mut detector = detector();
    assert_eq!(detector.snapshot_images(&page).await.unwrap(), 2);

    let remote = page.clone();
    let selector = profile.images.selectors[0].clone();
    tokio::spawn(async move {
        sleep(Duration::from_secs(15)).await;
        remote
            .dom()
            .add_image(&selector, "https://files.oaiusercontent.com/3.png");
    });

    let started = Instant::now();
    detector.await_completion(&page, true).await.unwrap();
    let elapsed = started.elapsed();

    // Stable at ~2.1s, then image checks every 6s; the third one sees it.
    assert!(elapsed >= Duration::from_secs(20), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(21), "{:?}", elapsed);
    assert_eq!(detector.seen_images().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_missing_image_is_not_fatal() {
    let page = FakePage::chat();
    let mut detector = detector();
    detector.snapshot_images(&page).await.unwrap();

    let started = Instant::now();
    detector.await_completion(&page, true).await.unwrap();

    // Ten checks, six seconds apart, after the response stabilized.
    assert!(started.elapsed() >= Duration::from_secs(62));
    assert!(started.elapsed() < Duration::from_secs(63));
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_image_reports_timeout() {
    let page = FakePage::chat();
    let config = DetectorConfig::builder()
        .with_image_polling(Duration::from_secs(1), 3)
        .build();
    let mut detector = CompletionDetector::new(config, Arc::new(SiteProfile::chatgpt()));

    let started = Instant::now();
    assert_eq!(
        detector.wait_for_image(&page).await,
        Err(DriverError::ImageTimeout)
    );
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_avatar_images_are_ignored() {
    let profile = SiteProfile::chatgpt();
    let page = FakePage::chat();
    let mut detector = detector();
    detector.snapshot_images(&page).await.unwrap();

    let remote = page.clone();
    let selector = profile.images.selectors[2].clone();
    tokio::spawn(async move {
        sleep(Duration::from_secs(5)).await;
        remote
            .dom()
            .add_image(&selector, "https://cdn.example.com/avatar/me.png");
    });

    let started = Instant::now();
    detector.await_completion(&page, true).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(62));
    assert!(detector.seen_images().is_empty());
}

// ── Page driver ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_submit_injects_then_clicks() {
    let profile = SiteProfile::chatgpt();
    let page = FakePage::chat();
    let mut driver = driver(&page);

    driver.submit("Hello there", false).await.unwrap();

    let dom = page.dom();
    assert_eq!(dom.injected.len(), 1);
    let (input, text, injected_at) = &dom.injected[0];
    assert_eq!(input, profile.input[0].expr());
    assert_eq!(text, "Hello there");

    assert_eq!(dom.clicks.len(), 1);
    let (button, clicked_at) = &dom.clicks[0];
    assert_eq!(button, profile.submit[0].expr());
    assert!(*clicked_at - *injected_at >= ms(1100));
}

#[tokio::test(start_paused = true)]
async fn test_submit_rejects_empty_prompt() {
    let page = FakePage::chat();
    let mut driver = driver(&page);

    let err = driver.submit("   ", false).await.unwrap_err();
    assert!(matches!(err, DriverError::InvalidInput(_)));
    assert!(page.dom().injected.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_submit_checks_site() {
    let page = FakePage::chat();
    page.dom().url = "https://example.com/chat".into();
    let mut driver = driver(&page);

    let err = driver.submit("hi", false).await.unwrap_err();
    assert!(matches!(err, DriverError::InvalidInput(_)));
    assert!(page.dom().injected.is_empty());

    page.dom().url = "https://www.chatgpt.com/".into();
    assert!(driver.submit("hi", false).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_submit_tries_input_selectors_in_order() {
    let profile = SiteProfile::chatgpt();
    let page = FakePage::chat();
    {
        let mut dom = page.dom();
        dom.set_count(&profile.input[0], 0);
        dom.set_count(&profile.input[2], 1);
    }
    let mut driver = driver(&page);

    driver.submit("hi", false).await.unwrap();
    assert_eq!(page.dom().injected[0].0, profile.input[2].expr());
}

#[tokio::test(start_paused = true)]
async fn test_missing_input_is_reported() {
    let profile = SiteProfile::chatgpt();
    let page = FakePage::chat();
    page.dom().set_count(&profile.input[0], 0);
    let mut driver = driver(&page);

    let err = driver.submit("hi", false).await.unwrap_err();
    assert_eq!(err, DriverError::ElementNotFound("Input control".into()));
    assert_eq!(
        err.reason(),
        "Input control not found. The page layout may have changed."
    );
}

#[tokio::test(start_paused = true)]
async fn test_disabled_send_button_is_skipped() {
    let profile = SiteProfile::chatgpt();
    let page = FakePage::chat();
    {
        let mut dom = page.dom();
        dom.disabled.insert(profile.submit[0].expr().to_string());
        dom.set_count(&profile.submit[4], 1);
    }
    let mut driver = driver(&page);

    driver.submit("hi", false).await.unwrap();
    assert_eq!(page.dom().clicks[0].0, profile.submit[4].expr());
}

#[tokio::test(start_paused = true)]
async fn test_no_enabled_send_button() {
    let profile = SiteProfile::chatgpt();
    let page = FakePage::chat();
    page.dom()
        .disabled
        .insert(profile.submit[0].expr().to_string());
    let mut driver = driver(&page);

    let err = driver.submit("hi", false).await.unwrap_err();
    assert_eq!(err, DriverError::ElementNotFound("Send button".into()));
    assert!(page.dom().clicks.is_empty());
    // The text was already injected before the button lookup.
    assert_eq!(page.dom().injected.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_image_baseline_is_taken_before_submit() {
    let profile = SiteProfile::chatgpt();
    let page = FakePage::chat();
    page.dom()
        .add_image(&profile.images.selectors[0], "https://files.oaiusercontent.com/old.png");

    // The new image shows up as soon as the prompt is sent.
    let selector = profile.images.selectors[0].clone();
    page.dom().on_click = Some(Box::new(move |dom: &mut Dom| {
        dom.add_image(&selector, "https://files.oaiusercontent.com/new.png");
    }));
    let mut driver = driver(&page);

    let started = Instant::now();
    driver.submit("generate image of a cat", true).await.unwrap();

    // First image check after stabilization already sees it.
    assert!(started.elapsed() < Duration::from_secs(10), "{:?}", started.elapsed());
    assert_eq!(driver.detector().seen_images().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_handle_maps_errors_to_response() {
    let page = FakePage::chat();
    let mut driver = driver(&page);

    let response = driver.handle(ProcessRequest::new("", false)).await;
    assert!(!response.success);
    assert_eq!(
        response.error.as_deref(),
        Some("Invalid input: Invalid message: cannot be empty")
    );

    let response = driver.handle(ProcessRequest::new("ok", false)).await;
    assert_eq!(response, ProcessResponse::success());
}

// ── Bridge ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_bridge_round_trip() {
    let page = FakePage::chat();
    let (bridge, host) = bridge::connect(driver(&page));
    let host_task = tokio::spawn(host.run());

    let response = bridge
        .dispatch(ProcessRequest::new("hello", false))
        .await
        .unwrap();
    assert!(response.success);

    let response = bridge
        .dispatch(ProcessRequest::new(" ", false))
        .await
        .unwrap();
    assert!(!response.success);

    drop(bridge);
    let driver = host_task.await.unwrap();
    assert_eq!(driver.page().dom().clicks.len(), 1);
}

#[tokio::test]
async fn test_bridge_without_host_is_unreachable() {
    let page = FakePage::chat();
    let (bridge, host) = bridge::connect(driver(&page));
    drop(host);

    let err = bridge
        .dispatch(ProcessRequest::new("hello", false))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Unreachable));
}

#[tokio::test]
async fn test_detached_transport_is_unreachable() {
    let err = Detached
        .dispatch(ProcessRequest::new("hello", false))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Unreachable));
}

#[tokio::test(start_paused = true)]
async fn test_processor_drives_page_through_bridge() {
    let page = FakePage::chat();
    let (bridge, host) = bridge::connect(driver(&page));
    let host_task = tokio::spawn(host.run());

    let processor = Arc::new(
        QueueProcessor::new(
            store_with(&["first", "second"]),
            bridge,
            ProcessorConfig::default(),
        )
        .unwrap(),
    );
    processor.start();
    processor.wait_until_idle().await;
    assert!(processor.is_empty());
    drop(processor);

    host_task.await.unwrap();
    let texts: Vec<String> = page
        .dom()
        .injected
        .iter()
        .map(|(_, text, _)| text.clone())
        .collect();
    assert_eq!(texts, vec!["first", "second"]);
    assert_eq!(page.dom().clicks.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_page_failure_goes_through_retry_policy() {
    let profile = SiteProfile::chatgpt();
    let page = FakePage::chat();
    page.dom().set_count(&profile.input[0], 0);
    let (bridge, host) = bridge::connect(driver(&page));
    let host_task = tokio::spawn(host.run());

    let processor = Arc::new(
        QueueProcessor::new(store_with(&["lost"]), bridge, ProcessorConfig::default()).unwrap(),
    );
    let mut rx = processor.subscribe();
    processor.start();
    processor.wait_until_idle().await;

    let dropped = drain_events(&mut rx).into_iter().find_map(|e| match e {
        QueueEvent::Dropped { reason, .. } => Some(reason),
        _ => None,
    });
    assert_eq!(
        dropped.as_deref(),
        Some("Input control not found. The page layout may have changed.")
    );
    drop(processor);
    host_task.await.unwrap();
}
