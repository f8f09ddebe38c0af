use std::sync::Arc;

use batch_mailer::{
    dispatch::{DispatchError, DispatchEvent, QuotaDecision, RunControl},
    store::{AuditLog, DeliveryStatus, StoreError},
};
use claims::assert_matches;
use tokio::sync::mpsc;
use wiremock::{Mock, ResponseTemplate, matchers::any};

use crate::helpers::{
    FakeTransport, InMemoryCounter, InMemoryLog, fake_dispatcher, fake_request, message,
    recipients, run_config, spawn_app,
};

#[tokio::test]
async fn a_counter_write_failure_aborts_after_logging_the_send() {
    // Arrange
    let transport = Arc::new(FakeTransport::default());
    let log = Arc::new(InMemoryLog::default());
    let dispatcher = fake_dispatcher(
        transport.clone(),
        Arc::new(InMemoryCounter::failing()),
        log.clone(),
    );
    let (progress, mut events) = mpsc::unbounded_channel();
    let control = RunControl::new().with_progress(progress);

    // Act
    let result = dispatcher
        .run(
            fake_request(recipients(3), run_config(3, 0, 500)),
            &QuotaDecision::Abort,
            &control,
        )
        .await;
    drop(control);

    // Assert
    let error = result.expect_err("the run should abort");
    assert_matches!(&error, DispatchError::Persistence { .. });
    let summary = error.summary().unwrap();
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.sent, 1);
    assert_eq!(transport.sent().len(), 1);

    let entries = log.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, DeliveryStatus::Sent);

    let mut warned = false;
    while let Some(event) = events.recv().await {
        if let DispatchEvent::CounterNotUpdated { email, .. } = event {
            assert_eq!(email, "recipient1@example.com");
            warned = true;
        }
    }
    assert!(warned);
}

#[tokio::test]
async fn an_audit_log_failure_aborts_the_run() {
    // Arrange
    let transport = Arc::new(FakeTransport::default());
    let dispatcher = fake_dispatcher(
        transport.clone(),
        Arc::new(InMemoryCounter::default()),
        Arc::new(InMemoryLog::failing()),
    );

    // Act
    let result = dispatcher
        .run(
            fake_request(recipients(3), run_config(3, 0, 500)),
            &QuotaDecision::Abort,
            &RunControl::new(),
        )
        .await;

    // Assert
    assert_matches!(result, Err(DispatchError::Persistence { .. }));
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn a_corrupt_counter_file_stops_the_run_before_anything_is_sent() {
    // Arrange
    let app = spawn_app().await;
    let counter_path = app.app.settings().storage.counter_path.clone();
    std::fs::write(&counter_path, "{ this is not json").unwrap();
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.email_server)
        .await;
    let request = app.request(recipients(3), message());

    // Act
    let result = app.dispatch(request, QuotaDecision::Abort).await;

    // Assert
    assert_matches!(
        result,
        Err(DispatchError::Persistence {
            source: StoreError::Corrupt { .. },
            ..
        })
    );
    assert_eq!(
        std::fs::read_to_string(&counter_path).unwrap(),
        "{ this is not json"
    );
    assert!(app.log().await.is_empty());
}

#[tokio::test]
async fn a_corrupt_audit_log_stops_the_run_before_anything_is_sent() {
    // Arrange
    let app = spawn_app().await;
    let log_path = app.app.settings().storage.log_path.clone();
    std::fs::write(&log_path, "{ not json").unwrap();
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.email_server)
        .await;
    let request = app.request(recipients(3), message());

    // Act
    let result = app.dispatch(request, QuotaDecision::Proceed).await;

    // Assert
    let error = result.expect_err("the run should not start");
    assert_matches!(
        &error,
        DispatchError::Persistence {
            source: StoreError::Corrupt { .. },
            ..
        }
    );
    assert_eq!(error.summary().map(|s| s.attempted), Some(0));
    assert_eq!(app.sent_today().await, 0);
    assert_eq!(std::fs::read_to_string(&log_path).unwrap(), "{ not json");
}

#[tokio::test]
async fn a_log_written_by_the_older_tool_is_extended() {
    // Arrange
    let app = spawn_app().await;
    let log_path = app.app.settings().storage.log_path.clone();
    std::fs::write(
        &log_path,
        r#"[{"email": "old@example.com", "subject": "Earlier",
             "timestamp": "2024-05-01 09:15:00", "status": "Poslano"}]"#,
    )
    .unwrap();
    app.accept_all_email().await;
    let request = app.request(recipients(2), message());

    // Act
    let report = app.dispatch(request, QuotaDecision::Abort).await.unwrap();

    // Assert
    assert_eq!(report.summary.sent, 2);
    let log = app.log().await;
    let emails: Vec<_> = log.iter().map(|e| e.email.as_str()).collect();
    assert_eq!(
        emails,
        ["old@example.com", "recipient1@example.com", "recipient2@example.com"]
    );
    assert!(log.iter().all(|e| e.status == DeliveryStatus::Sent));
}
