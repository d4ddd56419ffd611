mod common;

use booking_service::models::{
    NotificationAudience, NotificationKind, PaymentStatus, ReservationStatus,
};
use common::{intent_event, refund_event, TestApp};
use serde_json::{json, Value};

async fn ack(response: reqwest::Response) -> Value {
    assert_eq!(response.status().as_u16(), 200);
    response.json().await.expect("Failed to parse JSON")
}

#[tokio::test]
async fn succeeded_event_completes_payment_and_confirms_reservation() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment = app.pending_payment(&seeded, "pi_success").await;

    let body = ack(
        app.post_webhook(&intent_event("evt_success", "payment_intent.succeeded", "pi_success"))
            .await,
    )
    .await;

    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["eventType"], "payment_intent.succeeded");
    assert_eq!(body["data"]["outcome"], "APPLIED");

    let stored = app.store.payment(payment.id);
    assert_eq!(stored.status, PaymentStatus::Completed);
    assert_eq!(stored.metadata["gatewayStatus"], "succeeded");
    assert!(stored.metadata.get("processedAt").is_some());

    let reservation = app.store.reservation(payment.reservation_id.unwrap());
    assert_eq!(reservation.status, ReservationStatus::Confirmed);

    let sent = app.email.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|m| m.to == "guest@example.com"));
    assert!(sent.iter().any(|m| m.subject == "Payment confirmed"));
    assert!(sent
        .iter()
        .any(|m| m.subject == "Reservation confirmed at Lakeside Lodge"));

    let notifications = app.store.notifications();
    assert_eq!(notifications.len(), 2);
    assert!(notifications.iter().any(|n| {
        n.audience == NotificationAudience::User
            && n.kind == NotificationKind::PaymentConfirmed
            && n.email_sent
    }));
    assert!(notifications.iter().any(|n| {
        n.audience == NotificationAudience::Admin
            && n.kind == NotificationKind::ReservationConfirmed
            && n.venue_id == Some(seeded.venue.id)
    }));
}

#[tokio::test]
async fn failed_event_fails_payment_and_cancels_reservation() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment = app.pending_payment(&seeded, "pi_declined").await;

    let body = ack(
        app.post_webhook(&intent_event(
            "evt_declined",
            "payment_intent.payment_failed",
            "pi_declined",
        ))
        .await,
    )
    .await;
    assert_eq!(body["data"]["outcome"], "APPLIED");

    let stored = app.store.payment(payment.id);
    assert_eq!(stored.status, PaymentStatus::Failed);
    assert_eq!(stored.metadata["failureMessage"], "Your card was declined.");
    assert_eq!(stored.metadata["failureCode"], "card_declined");

    let reservation = app.store.reservation(payment.reservation_id.unwrap());
    assert_eq!(reservation.status, ReservationStatus::Cancelled);

    let sent = app.email.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Payment failed");
}

#[tokio::test]
async fn canceled_intent_is_recorded_as_failed() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment = app.pending_payment(&seeded, "pi_abandoned").await;

    let event = json!({
        "id": "evt_abandoned",
        "type": "payment_intent.canceled",
        "data": { "object": { "id": "pi_abandoned", "cancellation_reason": "abandoned" } }
    });
    let body = ack(app.post_webhook(&event).await).await;
    assert_eq!(body["data"]["outcome"], "APPLIED");

    let stored = app.store.payment(payment.id);
    assert_eq!(stored.status, PaymentStatus::Failed);
    assert_eq!(
        stored.metadata["failureMessage"],
        "Payment was cancelled (abandoned)"
    );
}

#[tokio::test]
async fn full_refund_event_refunds_payment() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment = app.pending_payment(&seeded, "pi_full_refund").await;
    app.set_payment_status(&payment, PaymentStatus::Completed).await;

    let body = ack(
        app.post_webhook(&refund_event("evt_refund", "pi_full_refund", 50000, 50000))
            .await,
    )
    .await;
    assert_eq!(body["data"]["outcome"], "APPLIED");

    let stored = app.store.payment(payment.id);
    assert_eq!(stored.status, PaymentStatus::Refunded);
    assert_eq!(stored.metadata["refundedAmount"], 50000);

    let reservation = app.store.reservation(payment.reservation_id.unwrap());
    assert_eq!(reservation.status, ReservationStatus::Cancelled);
    assert_eq!(app.email.sent()[0].subject, "Payment refunded");
}

#[tokio::test]
async fn full_refund_cancels_a_completed_stay() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment = app.pending_payment(&seeded, "pi_after_stay").await;
    ack(
        app.post_webhook(&intent_event(
            "evt_paid",
            "payment_intent.succeeded",
            "pi_after_stay",
        ))
        .await,
    )
    .await;

    let reservation_id = payment.reservation_id.unwrap();
    let checked_out = app
        .patch(
            &format!("/api/reservations/{}", reservation_id),
            &seeded.admin_token,
            &json!({ "status": "COMPLETED" }),
        )
        .await;
    assert_eq!(checked_out.status().as_u16(), 200);
    assert_eq!(
        app.store.reservation(reservation_id).status,
        ReservationStatus::Completed
    );

    let body = ack(
        app.post_webhook(&refund_event("evt_goodwill", "pi_after_stay", 50000, 50000))
            .await,
    )
    .await;
    assert_eq!(body["data"]["outcome"], "APPLIED");

    assert_eq!(app.store.payment(payment.id).status, PaymentStatus::Refunded);
    assert_eq!(
        app.store.reservation(reservation_id).status,
        ReservationStatus::Cancelled
    );
}

#[tokio::test]
async fn partial_refund_event_only_annotates_payment() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment = app.pending_payment(&seeded, "pi_some_back").await;
    app.set_payment_status(&payment, PaymentStatus::Completed).await;

    let body = ack(
        app.post_webhook(&refund_event("evt_partial", "pi_some_back", 50000, 15000))
            .await,
    )
    .await;
    assert_eq!(body["data"]["outcome"], "PARTIAL_REFUND_RECORDED");

    let stored = app.store.payment(payment.id);
    assert_eq!(stored.status, PaymentStatus::Completed);
    assert_eq!(stored.metadata["partialRefundAmount"], 15000);

    let reservation = app.store.reservation(payment.reservation_id.unwrap());
    assert_eq!(reservation.status, ReservationStatus::Confirmed);
    assert_eq!(app.email.send_count(), 0);
}

#[tokio::test]
async fn replayed_event_id_is_acknowledged_without_changes() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment = app.pending_payment(&seeded, "pi_replay").await;
    app.set_payment_status(&payment, PaymentStatus::Completed).await;

    let event = refund_event("evt_replay", "pi_replay", 50000, 15000);
    let first = ack(app.post_webhook(&event).await).await;
    assert_eq!(first["data"]["outcome"], "PARTIAL_REFUND_RECORDED");
    let recorded_at = app.store.payment(payment.id).metadata["partialRefundAt"].clone();

    let second = ack(app.post_webhook(&event).await).await;
    assert_eq!(second["success"], true);
    assert_eq!(second["data"]["outcome"], "ALREADY_PROCESSED");

    assert_eq!(
        app.store.payment(payment.id).metadata["partialRefundAt"],
        recorded_at
    );
    assert_eq!(app.store.processed_event_count(), 1);
}

#[tokio::test]
async fn repeated_success_does_not_notify_twice() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    app.pending_payment(&seeded, "pi_twice").await;

    let event = intent_event("evt_twice", "payment_intent.succeeded", "pi_twice");
    ack(app.post_webhook(&event).await).await;
    let second = ack(app.post_webhook(&event).await).await;

    assert_eq!(second["data"]["outcome"], "ALREADY_IN_STATE");
    assert_eq!(app.email.send_count(), 2);
    assert_eq!(app.store.notifications().len(), 2);
}

#[tokio::test]
async fn lifecycle_violations_are_acknowledged_but_not_applied() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment = app.pending_payment(&seeded, "pi_late_failure").await;
    app.set_payment_status(&payment, PaymentStatus::Refunded).await;

    let body = ack(
        app.post_webhook(&intent_event(
            "evt_late",
            "payment_intent.succeeded",
            "pi_late_failure",
        ))
        .await,
    )
    .await;
    assert_eq!(body["data"]["outcome"], "INVALID_TRANSITION");
    assert_eq!(app.store.payment(payment.id).status, PaymentStatus::Refunded);
    assert_eq!(app.store.processed_event_count(), 0);
}

#[tokio::test]
async fn unknown_payment_and_unhandled_events_are_acknowledged() {
    let app = TestApp::spawn().await;

    let body = ack(
        app.post_webhook(&intent_event("evt_orphan", "payment_intent.succeeded", "pi_nobody"))
            .await,
    )
    .await;
    assert_eq!(body["data"]["outcome"], "PAYMENT_NOT_FOUND");

    let event = json!({
        "id": "evt_customer",
        "type": "customer.created",
        "data": { "object": { "id": "cus_1" } }
    });
    let body = ack(app.post_webhook(&event).await).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["outcome"], "IGNORED");
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment = app.pending_payment(&seeded, "pi_unsigned").await;

    let response = app
        .client
        .post(format!("{}/api/payments/webhook", app.address))
        .json(&intent_event("evt_unsigned", "payment_intent.succeeded", "pi_unsigned"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Webhook signature is required");
    assert_eq!(app.store.payment(payment.id).status, PaymentStatus::Pending);
}

#[tokio::test]
async fn tampered_body_is_rejected() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment = app.pending_payment(&seeded, "pi_tampered").await;

    let signed = serde_json::to_vec(&intent_event(
        "evt_tampered",
        "payment_intent.payment_failed",
        "pi_tampered",
    ))
    .unwrap();
    let header = booking_service::services::stripe::sign_payload(
        common::WEBHOOK_SECRET,
        chrono::Utc::now().timestamp(),
        &signed,
    )
    .unwrap();
    let sent = serde_json::to_vec(&intent_event(
        "evt_tampered",
        "payment_intent.succeeded",
        "pi_tampered",
    ))
    .unwrap();

    let response = app
        .client
        .post(format!("{}/api/payments/webhook", app.address))
        .header("stripe-signature", header)
        .header("content-type", "application/json")
        .body(sent)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid webhook signature");
    assert_eq!(app.store.payment(payment.id).status, PaymentStatus::Pending);
    assert_eq!(app.store.processed_event_count(), 0);
}

#[tokio::test]
async fn email_failure_does_not_block_reconciliation() {
    let app = TestApp::spawn_with_email(false).await;
    let seeded = app.seed().await;
    let payment = app.pending_payment(&seeded, "pi_no_mail").await;

    let body = ack(
        app.post_webhook(&intent_event("evt_no_mail", "payment_intent.succeeded", "pi_no_mail"))
            .await,
    )
    .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["outcome"], "APPLIED");

    assert_eq!(app.store.payment(payment.id).status, PaymentStatus::Completed);
    assert_eq!(app.email.send_count(), 0);

    let notifications = app.store.notifications();
    assert!(notifications
        .iter()
        .any(|n| n.kind == NotificationKind::PaymentConfirmed && !n.email_sent));
}

#[tokio::test]
async fn malformed_verified_payload_is_acknowledged_as_failed() {
    let app = TestApp::spawn().await;

    let body = ack(app.post_webhook(&json!({ "unexpected": true })).await).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["outcome"], "FAILED");
}
