//! services/api/src/web/payments.rs
//!
//! The PayHere integration: the checkout request a student's browser submits to the
//! gateway, and the server-to-server notification the gateway posts back.

use crate::error::{ApiError, ApiResult};
use crate::web::actor::{ensure_owner, Actor};
use crate::web::rest::required;
use crate::web::state::AppState;
use axum::{
    extract::{FromRequest, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use tuteskillz_core::domain::{Id, PaymentNotice, PaymentStatus, Role};
use tuteskillz_core::lifecycle::PaymentEffect;
use utoipa::ToSchema;

const CHECKOUT_ITEM: &str = "TuteSkillz Session Fee";

//=========================================================================================
// API Payload Structs
//=========================================================================================

/// The notification PayHere posts once a payment attempt finishes.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PayHereNotification {
    pub merchant_id: Option<String>,
    /// The session id the checkout was opened for.
    pub order_id: Option<String>,
    /// `2` means success. Every other code is a failure.
    pub status_code: Option<String>,
    pub payhere_amount: Option<String>,
    #[serde(alias = "payhere_currency")]
    pub currency: Option<String>,
    pub method: Option<String>,
    #[serde(alias = "payment_id")]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    pub session_id: Option<Id>,
}

/// Fields the browser forwards to the PayHere checkout form. Named as the gateway expects.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentData {
    pub merchant_id: String,
    pub return_url: String,
    pub cancel_url: String,
    pub order_id: String,
    pub items: String,
    pub amount: String,
    pub currency: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    pub session_status: String,
    pub payment_data: PaymentData,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Trimmed value, or `None` when the gateway left the field out or blank.
fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Reads the notification as a form post or, failing that content type, as JSON.
async fn read_notification(
    state: &Arc<AppState>,
    request: Request,
) -> ApiResult<PayHereNotification> {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    if is_json {
        let Json(notification) = Json::<PayHereNotification>::from_request(request, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        Ok(notification)
    } else {
        let Form(notification) = Form::<PayHereNotification>::from_request(request, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        Ok(notification)
    }
}

/// Receive a PayHere payment notification.
///
/// Every notification is stored as a payment row. A successful payment moves an accepted
/// or submitted session to `Paid` and assigns its meeting link.
#[utoipa::path(
    post,
    path = "/api/payment/payhere/webhook",
    request_body(content = PayHereNotification, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Notification recorded", body = String),
        (status = 400, description = "Invalid merchant id or malformed notification"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn payhere_webhook_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> ApiResult<&'static str> {
    let notification = read_notification(&state, request).await?;

    if notification.merchant_id.as_deref() != Some(state.config.payhere_merchant_id.as_str()) {
        warn!(merchant_id = ?notification.merchant_id, "Rejected notification for another merchant");
        return Err(ApiError::bad_request("Invalid Merchant ID"));
    }

    let session_id = notification
        .order_id
        .as_deref()
        .and_then(|raw| raw.trim().parse::<Id>().ok())
        .ok_or_else(|| ApiError::bad_request("Invalid order_id"))?;
    let status = PaymentStatus::from_gateway_code(notification.status_code.as_deref().unwrap_or(""));

    let notice = PaymentNotice {
        session_id,
        amount: present(notification.payhere_amount),
        currency: present(notification.currency),
        status,
        method: notification.method,
        transaction_id: notification.transaction_id,
    };

    let recorded = state
        .store
        .record_payment(notice, &state.config.meeting_base_url)
        .await?;

    match recorded.effect {
        PaymentEffect::MarkPaid => info!(
            session_id,
            payment_id = recorded.payment_id,
            meeting_url = recorded.session.meeting_url.as_deref().unwrap_or_default(),
            "Payment successful, meeting link generated"
        ),
        PaymentEffect::AlreadyPaid | PaymentEffect::Unchanged => info!(
            session_id,
            payment_id = recorded.payment_id,
            payment_status = status.as_str(),
            "Payment recorded"
        ),
    }
    Ok("OK")
}

/// Open a PayHere checkout for an accepted session.
///
/// Moves the session to `Submitted` and returns the fields the checkout form needs.
/// Signing the request is left to the gateway client.
#[utoipa::path(
    post,
    path = "/api/payment/payhere/create",
    request_body = CheckoutBody,
    responses(
        (status = 200, description = "Checkout opened", body = CheckoutResponse),
        (status = 400, description = "Session has not been accepted"),
        (status = 403, description = "Session belongs to another student"),
        (status = 404, description = "Session not found")
    )
)]
pub async fn payhere_checkout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CheckoutBody>,
) -> ApiResult<Json<CheckoutResponse>> {
    let session_id = required(body.session_id, "sessionId is required")?;
    let current = state.store.get_session(session_id).await?;
    ensure_owner(Actor::from_headers(&headers)?, Role::Student, current.student_id)?;

    let session = state.store.open_checkout(session_id).await?;
    let student = state.store.user_contact(session.student_id).await?;
    let (first_name, last_name) = match student.full_name.split_once(' ') {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (student.full_name.clone(), String::new()),
    };
    let session_url = format!("{}session/{}", state.config.frontend_url, session_id);

    info!(session_id, "Checkout opened");
    Ok(Json(CheckoutResponse {
        success: true,
        session_status: session.status.to_string(),
        payment_data: PaymentData {
            merchant_id: state.config.payhere_merchant_id.clone(),
            return_url: session_url.clone(),
            cancel_url: session_url,
            order_id: session_id.to_string(),
            items: CHECKOUT_ITEM.to_string(),
            amount: state.config.session_fee.clone(),
            currency: state.config.session_currency.clone(),
            first_name,
            last_name,
            email: student.email,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::tests::{new_session, seeded, at};
    use crate::web::actor::{USER_ID_HEADER, USER_ROLE_HEADER};
    use axum::{body::Body, http::{HeaderValue, StatusCode}};
    use pretty_assertions::assert_eq;
    use tuteskillz_core::domain::{SessionStatus, TutorDecision};
    use tuteskillz_core::ports::{DecisionOutcome, RequestOutcome, TutoringStore};

    fn webhook(content_type: &str, body: String) -> Request {
        Request::builder()
            .method("POST")
            .uri("/api/payment/payhere/webhook")
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap()
    }

    fn form_notice(merchant: &str, order: Id, status_code: &str) -> Request {
        webhook(
            "application/x-www-form-urlencoded",
            format!(
                "merchant_id={merchant}&order_id={order}&payhere_amount=1000.00\
                 &payhere_currency=LKR&status_code={status_code}&method=VISA&payment_id=320025"
            ),
        )
    }

    async fn accepted_session(store: &dyn TutoringStore, request: tuteskillz_core::domain::NewSession) -> Id {
        let RequestOutcome::Created(id) = store.request_session(request).await.unwrap() else {
            panic!("slot should be free");
        };
        let outcome = store.decide_session(id, TutorDecision::Accept, None).await.unwrap();
        assert!(matches!(outcome, DecisionOutcome::Updated(_)));
        id
    }

    #[tokio::test]
    async fn checkout_then_successful_webhook_marks_paid() {
        let (store, fx) = seeded().await;
        let state = AppState::for_tests(Arc::new(store));
        let student = fx.students[0];
        let id = accepted_session(state.store.as_ref(), new_session(&fx, student, at(10, 0))).await;

        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_str(&student.to_string()).unwrap());
        headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("student"));
        let Json(checkout) = payhere_checkout_handler(
            State(state.clone()),
            headers,
            Json(CheckoutBody { session_id: Some(id) }),
        )
        .await
        .unwrap();
        assert_eq!(checkout.session_status, "Submitted");
        assert_eq!(checkout.payment_data.order_id, id.to_string());
        assert_eq!(checkout.payment_data.first_name, "Amaya");
        assert_eq!(checkout.payment_data.return_url, format!("http://localhost:5173/session/{id}"));

        let ack = payhere_webhook_handler(State(state.clone()), form_notice("1221149", id, "2"))
            .await
            .unwrap();
        assert_eq!(ack, "OK");

        let session = state.store.get_session(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Paid);
        let url = session.meeting_url.unwrap();
        assert!(url.starts_with(&format!("https://meet.jit.si/session_{id}_")));

        let payments = state.store.payments_for_session(id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].transaction_id.as_deref(), Some("320025"));
    }

    #[tokio::test]
    async fn foreign_merchant_is_rejected_and_nothing_stored() {
        let (store, fx) = seeded().await;
        let state = AppState::for_tests(Arc::new(store));
        let id = accepted_session(state.store.as_ref(), new_session(&fx, fx.students[0], at(10, 0))).await;

        let err = payhere_webhook_handler(State(state.clone()), form_notice("999", id, "2"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg == "Invalid Merchant ID"));
        assert!(state.store.payments_for_session(id).await.unwrap().is_empty());
        assert_eq!(state.store.get_session(id).await.unwrap().status, SessionStatus::Accepted);
    }

    #[tokio::test]
    async fn failed_json_notice_is_logged_without_state_change() {
        let (store, fx) = seeded().await;
        let state = AppState::for_tests(Arc::new(store));
        let id = accepted_session(state.store.as_ref(), new_session(&fx, fx.students[0], at(10, 0))).await;

        let body = serde_json::json!({
            "merchant_id": "1221149",
            "order_id": id.to_string(),
            "payhere_amount": "1000.00",
            "payhere_currency": "LKR",
            "status_code": "-2",
        });
        payhere_webhook_handler(State(state.clone()), webhook("application/json", body.to_string()))
            .await
            .unwrap();

        let payments = state.store.payments_for_session(id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Failed);
        assert_eq!(state.store.get_session(id).await.unwrap().status, SessionStatus::Accepted);
    }

    #[tokio::test]
    async fn checkout_requires_an_accepted_session() {
        let (store, fx) = seeded().await;
        let state = AppState::for_tests(Arc::new(store));
        let RequestOutcome::Created(id) = state
            .store
            .request_session(new_session(&fx, fx.students[0], at(10, 0)))
            .await
            .unwrap()
        else {
            panic!("slot should be free");
        };

        let err = payhere_checkout_handler(
            State(state.clone()),
            HeaderMap::new(),
            Json(CheckoutBody { session_id: Some(id) }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let unknown = payhere_webhook_handler(State(state), form_notice("1221149", 424_242, "2"))
            .await
            .unwrap_err();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn notice_without_amount_is_still_recorded() {
        let (store, fx) = seeded().await;
        let state = AppState::for_tests(Arc::new(store));
        let id = accepted_session(state.store.as_ref(), new_session(&fx, fx.students[0], at(10, 0))).await;

        let body = format!("merchant_id=1221149&order_id={id}&status_code=2&payhere_currency=%20");
        let ack = payhere_webhook_handler(
            State(state.clone()),
            webhook("application/x-www-form-urlencoded", body),
        )
        .await
        .unwrap();
        assert_eq!(ack, "OK");

        let payments = state.store.payments_for_session(id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount, None);
        assert_eq!(payments[0].currency, None);
        assert_eq!(payments[0].status, PaymentStatus::Paid);
        assert_eq!(state.store.get_session(id).await.unwrap().status, SessionStatus::Paid);
    }
}
