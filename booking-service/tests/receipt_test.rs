mod common;

use booking_service::models::{PaymentStatus, ReceiptStatus};
use common::{Seeded, TestApp};
use serde_json::{json, Value};

async fn completed_payment(app: &TestApp, seeded: &Seeded, intent: &str) -> uuid::Uuid {
    let payment = app.pending_payment(seeded, intent).await;
    app.set_payment_status(&payment, PaymentStatus::Completed)
        .await
        .id
}

async fn issue(app: &TestApp, token: &str, payment_id: uuid::Uuid) -> Value {
    let response = app
        .post("/api/receipts", token, &json!({ "paymentId": payment_id }))
        .await;
    assert_eq!(response.status().as_u16(), 201);
    response.json().await.unwrap()
}

#[tokio::test]
async fn receipt_splits_tax_out_of_the_total() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment_id = completed_payment(&app, &seeded, "pi_receipt").await;

    let body = issue(&app, &seeded.guest_token, payment_id).await;
    let receipt = &body["data"];

    assert!(receipt["receiptNumber"].as_str().unwrap().starts_with("RCP-"));
    assert_eq!(receipt["status"], "PENDING");
    assert_eq!(receipt["total"], "500.00");
    assert_eq!(receipt["subtotal"], "431.03");
    assert_eq!(receipt["taxAmount"], "68.97");
    assert_eq!(receipt["paymentId"], payment_id.to_string());
}

#[tokio::test]
async fn one_receipt_per_payment() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment_id = completed_payment(&app, &seeded, "pi_once").await;

    issue(&app, &seeded.guest_token, payment_id).await;

    let again = app
        .post(
            "/api/receipts",
            &seeded.admin_token,
            &json!({ "paymentId": payment_id }),
        )
        .await;
    assert_eq!(again.status().as_u16(), 409);
    let body: Value = again.json().await.unwrap();
    assert_eq!(body["error"], "Receipt already exists for this payment");
}

#[tokio::test]
async fn receipts_require_a_completed_payment() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment = app.pending_payment(&seeded, "pi_unpaid").await;

    let response = app
        .post(
            "/api/receipts",
            &seeded.guest_token,
            &json!({ "paymentId": payment.id }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn download_returns_an_html_attachment() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment_id = completed_payment(&app, &seeded, "pi_download").await;
    let body = issue(&app, &seeded.guest_token, payment_id).await;
    let receipt_id = body["data"]["id"].as_str().unwrap().to_string();
    let number = body["data"]["receiptNumber"].as_str().unwrap().to_string();

    let response = app
        .get(
            &format!("/api/receipts/{}/download", receipt_id),
            &seeded.guest_token,
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let headers = response.headers().clone();
    assert!(headers["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert_eq!(
        headers["content-disposition"].to_str().unwrap(),
        format!("attachment; filename=\"{}.html\"", number)
    );

    let html = response.text().await.unwrap();
    assert!(html.contains(&number));
    assert!(html.contains("Lakeside Lodge"));
    assert!(html.contains("Double Room"));
    assert!(html.contains("500.00 USD"));
    assert!(html.contains("pi_download"));
}

#[tokio::test]
async fn regenerate_marks_the_receipt_and_returns_the_document() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment_id = completed_payment(&app, &seeded, "pi_regen").await;
    let body = issue(&app, &seeded.guest_token, payment_id).await;
    let receipt_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .client
        .post(format!("{}/api/receipts/{}/download", app.address, receipt_id))
        .bearer_auth(&seeded.guest_token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    assert!(response.text().await.unwrap().contains("REGENERATED"));

    let fetched: Value = app
        .get(&format!("/api/receipts/{}", receipt_id), &seeded.guest_token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["data"]["status"], ReceiptStatus::Regenerated.as_str());
}

#[tokio::test]
async fn only_admins_verify_receipts() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment_id = completed_payment(&app, &seeded, "pi_verify").await;
    let body = issue(&app, &seeded.guest_token, payment_id).await;
    let path = format!("/api/receipts/{}", body["data"]["id"].as_str().unwrap());

    let guest = app
        .patch(&path, &seeded.guest_token, &json!({ "status": "VERIFIED" }))
        .await;
    assert_eq!(guest.status().as_u16(), 403);

    let invalid = app
        .patch(&path, &seeded.admin_token, &json!({ "status": "PENDING" }))
        .await;
    assert_eq!(invalid.status().as_u16(), 400);

    let verified = app
        .patch(
            &path,
            &seeded.admin_token,
            &json!({ "status": "VERIFIED", "notes": "Checked against bank statement" }),
        )
        .await;
    assert_eq!(verified.status().as_u16(), 200);
    let body: Value = verified.json().await.unwrap();
    assert_eq!(body["data"]["status"], "VERIFIED");
    assert_eq!(body["data"]["notes"], "Checked against bank statement");
}

#[tokio::test]
async fn receipts_are_private_to_payer_and_venue() {
    let app = TestApp::spawn().await;
    let seeded = app.seed().await;
    let payment_id = completed_payment(&app, &seeded, "pi_private_receipt").await;
    let body = issue(&app, &seeded.guest_token, payment_id).await;
    let path = format!("/api/receipts/{}", body["data"]["id"].as_str().unwrap());

    let (_, stranger) = app
        .create_user("stranger@example.com", booking_service::models::Role::User)
        .await;
    assert_eq!(app.get(&path, &stranger).await.status().as_u16(), 404);
    assert_eq!(app.get(&path, &seeded.admin_token).await.status().as_u16(), 200);

    let listed: Value = app
        .get("/api/receipts", &seeded.admin_token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}
