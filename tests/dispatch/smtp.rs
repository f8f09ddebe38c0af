use batch_mailer::{
    dispatch::{QuotaDecision, RunConfig, RunStatus},
    domain::Recipient,
    store::DeliveryStatus,
};
use secrecy::SecretString;

use crate::helpers::{SENDER, SmtpStub, message, recipients, spawn_smtp_app};

#[tokio::test]
async fn each_send_logs_in_as_the_sender_with_the_run_password() {
    // Arrange
    let relay = SmtpStub::start().await;
    let app = spawn_smtp_app(&relay).await;
    let request = app.app.request(
        None,
        Some(SecretString::from("app-password")),
        message(),
        recipients(2),
        RunConfig::from(&app.app.settings().dispatch),
    );

    // Act
    let report = app.dispatch(request, QuotaDecision::Abort).await.unwrap();

    // Assert
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.summary.sent, 2);
    assert_eq!(app.sent_today().await, 2);

    let session = relay.session();
    assert_eq!(session.logins.len(), 2);
    assert!(
        session
            .logins
            .iter()
            .all(|(user, password)| user == SENDER && password == "app-password")
    );
    assert_eq!(
        session.recipients,
        ["recipient1@example.com", "recipient2@example.com"]
    );
    assert!(session.messages[0].contains("Subject: Meetup"));
    assert!(session.messages[0].contains("Hi Recipient 1!"));
}

#[tokio::test]
async fn an_overridden_sender_logs_in_with_its_own_credentials() {
    // Arrange
    let relay = SmtpStub::start().await;
    let app = spawn_smtp_app(&relay).await;
    let request = app.app.request(
        Some("other@example.com".into()),
        Some(SecretString::from("other-password")),
        message(),
        recipients(1),
        RunConfig::from(&app.app.settings().dispatch),
    );

    // Act
    app.dispatch(request, QuotaDecision::Abort).await.unwrap();

    // Assert
    let session = relay.session();
    assert_eq!(
        session.logins,
        [("other@example.com".to_string(), "other-password".to_string())]
    );
    assert!(session.messages[0].contains("From: other@example.com"));
}

#[tokio::test]
async fn a_recipient_refused_by_the_relay_is_logged_and_the_run_carries_on() {
    // Arrange
    let relay = SmtpStub::start().await;
    let app = spawn_smtp_app(&relay).await;
    let recipients = vec![
        Recipient::new("amira@example.com", "Amira"),
        Recipient::new("bounce@example.com", "Nobody"),
        Recipient::new("haso@example.com", "Haso"),
    ];
    let request = app.app.request(
        None,
        Some(SecretString::from("app-password")),
        message(),
        recipients,
        RunConfig::from(&app.app.settings().dispatch),
    );

    // Act
    let report = app.dispatch(request, QuotaDecision::Abort).await.unwrap();

    // Assert
    assert_eq!(report.summary.sent, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(app.sent_today().await, 2);

    let log = app.log().await;
    assert_eq!(log[0].status, DeliveryStatus::Sent);
    assert!(matches!(&log[1].status, DeliveryStatus::Failed { reason } if reason.starts_with("transport failure")));
    assert_eq!(log[2].status, DeliveryStatus::Sent);

    let stored = serde_json::to_string(&log).unwrap();
    assert!(!stored.contains("app-password"));
}
