use std::sync::Arc;

use batch_mailer::{
    dispatch::{DispatchEvent, QuotaDecision, RunStatus},
    domain::Recipient,
    store::DeliveryStatus,
};
use wiremock::{
    Mock, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

use crate::helpers::{message, recipients, spawn_app};

#[tokio::test]
async fn seven_recipients_are_sent_in_batches_of_three_one() {
    // Arrange
    let app = spawn_app().await;
    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(7)
        .mount(&app.email_server)
        .await;
    let request = app.request(recipients(7), message());

    // Act
    let mut handle = app
        .app
        .dispatcher()
        .spawn(request, Arc::new(QuotaDecision::Abort));
    let mut batch_sizes = Vec::new();
    let mut counter_after_batch = Vec::new();
    while let Some(event) = handle.next_event().await {
        match event {
            DispatchEvent::BatchStarted { size, .. } => batch_sizes.push(size),
            DispatchEvent::BatchFinished { sent_today, .. } => counter_after_batch.push(sent_today),
            _ => {}
        }
    }
    let report = handle.join().await.unwrap();

    // Assert
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(batch_sizes, vec![3, 3, 1]);
    assert_eq!(counter_after_batch, vec![3, 6, 7]);
    assert_eq!(report.summary.attempted, 7);
    assert_eq!(report.summary.sent, 7);
    assert_eq!(report.summary.failed, 0);
    assert_eq!(report.summary.final_counter_value, 7);
    assert_eq!(app.sent_today().await, 7);

    let log = app.log().await;
    assert_eq!(log.len(), 7);
    assert!(log.iter().all(|e| e.status == DeliveryStatus::Sent));
    let logged: Vec<_> = log.iter().map(|e| e.email.clone()).collect();
    let expected: Vec<_> = recipients(7).into_iter().map(|r| r.email).collect();
    assert_eq!(logged, expected);
}

#[tokio::test]
async fn a_failed_send_is_logged_and_the_run_carries_on() {
    // Arrange
    let app = spawn_app().await;
    Mock::given(path("/email"))
        .and(body_partial_json(
            serde_json::json!({ "To": "recipient3@example.com" }),
        ))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&app.email_server)
        .await;
    Mock::given(path("/email"))
        .respond_with(ResponseTemplate::new(200))
        .expect(6)
        .mount(&app.email_server)
        .await;
    let request = app.request(recipients(7), message());

    // Act
    let report = app.dispatch(request, QuotaDecision::Abort).await.unwrap();

    // Assert
    assert_eq!(report.status, RunStatus::Completed);
    let summary = report.summary;
    assert_eq!(summary.attempted, summary.sent + summary.failed);
    assert_eq!(summary.sent, 6);
    assert_eq!(summary.failed, 1);
    assert_eq!(
        summary.sent as u64,
        summary.final_counter_value - summary.initial_counter_value
    );
    assert_eq!(app.sent_today().await, 6);

    let log = app.log().await;
    assert_eq!(log.len(), 7);
    assert_eq!(log[2].email, "recipient3@example.com");
    assert!(matches!(log[2].status, DeliveryStatus::Failed { .. }));
    assert_eq!(
        log.iter().filter(|e| e.status == DeliveryStatus::Sent).count(),
        6
    );
}

#[tokio::test]
async fn each_recipient_gets_their_own_name_in_the_body() {
    // Arrange
    let app = spawn_app().await;
    app.accept_all_email().await;
    let recipients = vec![
        Recipient::new("amira@example.com", "Amira"),
        Recipient::new("anon@example.com", ""),
    ];
    let request = app.request(recipients, message());

    // Act
    app.dispatch(request, QuotaDecision::Abort).await.unwrap();

    // Assert
    let emails = app.sent_emails().await;
    assert_eq!(emails[0]["To"], "amira@example.com");
    assert_eq!(emails[0]["TextBody"], "Hi Amira!");
    assert_eq!(emails[1]["TextBody"], "Hi !");
    assert!(emails.iter().all(|e| e["Subject"] == "Meetup"));
}

#[tokio::test]
async fn unusual_names_are_still_sent() {
    // Arrange
    let app = spawn_app().await;
    app.accept_all_email().await;
    let long_name = "a".repeat(300);
    let recipients = vec![
        Recipient::new("amira@example.com", "Amira\tHadzic"),
        Recipient::new("b@example.com", long_name.clone()),
    ];
    let request = app.request(recipients, message());

    // Act
    let report = app.dispatch(request, QuotaDecision::Abort).await.unwrap();

    // Assert
    assert_eq!(report.summary.sent, 2);
    assert_eq!(report.summary.failed, 0);
    let emails = app.sent_emails().await;
    assert_eq!(emails[0]["TextBody"], "Hi Amira Hadzic!");
    assert_eq!(emails[1]["TextBody"], format!("Hi {}!", long_name));
}

#[tokio::test]
async fn the_configured_credentials_reach_the_mail_api() {
    // Arrange
    let app = spawn_app().await;
    Mock::given(path("/email"))
        .and(header("X-Postmark-Server-Token", "my-secret-token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;
    let request = app.request(recipients(1), message());

    // Act
    let report = app.dispatch(request, QuotaDecision::Abort).await.unwrap();

    // Assert
    assert_eq!(report.summary.sent, 1);
    let log = serde_json::to_string(&app.log().await).unwrap();
    assert!(!log.contains("my-secret-token"));
}

#[tokio::test]
async fn duplicate_recipients_are_each_sent() {
    // Arrange
    let app = spawn_app().await;
    Mock::given(path("/email"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&app.email_server)
        .await;
    let twice = vec![
        Recipient::new("amira@example.com", "Amira"),
        Recipient::new("amira@example.com", "Amira"),
    ];
    let request = app.request(twice, message());

    // Act
    let report = app.dispatch(request, QuotaDecision::Abort).await.unwrap();

    // Assert
    assert_eq!(report.summary.sent, 2);
    assert_eq!(app.sent_today().await, 2);
}

#[tokio::test]
async fn an_invalid_recipient_is_logged_without_calling_the_mail_api() {
    // Arrange
    let app = spawn_app().await;
    Mock::given(path("/email"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&app.email_server)
        .await;
    let recipients = vec![
        Recipient::new("haso@example.com", "Haso"),
        Recipient::new("", "Nobody"),
        Recipient::new("mujo@example.com", "Mujo"),
    ];
    let request = app.request(recipients, message());

    // Act
    let report = app.dispatch(request, QuotaDecision::Abort).await.unwrap();

    // Assert
    assert_eq!(report.summary.attempted, 3);
    assert_eq!(report.summary.sent, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(app.sent_today().await, 2);

    let log = app.log().await;
    assert_eq!(log.len(), 3);
    match &log[1].status {
        DeliveryStatus::Failed { reason } => assert!(reason.starts_with("invalid recipient")),
        other => panic!("expected a failure, got {:?}", other),
    }
}

#[tokio::test]
async fn counts_accumulate_across_runs() {
    // Arrange
    let app = spawn_app().await;
    app.accept_all_email().await;

    // Act
    let first = app
        .dispatch(app.request(recipients(2), message()), QuotaDecision::Abort)
        .await
        .unwrap();
    let second = app
        .dispatch(app.request(recipients(3), message()), QuotaDecision::Abort)
        .await
        .unwrap();

    // Assert
    assert_eq!(first.summary.final_counter_value, 2);
    assert_eq!(second.summary.initial_counter_value, 2);
    assert_eq!(second.summary.final_counter_value, 5);
    assert_eq!(app.log().await.len(), 5);
}
