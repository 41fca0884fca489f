//! Scripted in-memory backend
//!
//! [`MockBackend`] implements every collaborator trait of the checkout core.
//! Responses are scripted up front and every call is recorded, so tests can
//! assert both on results and on the exact sequence of requests:
//! - [`MockBackend::calls`]: every request, in order
//! - [`MockBackend::script_check`]: queued order-code check answers per host
//! - [`MockBackend::status_writes`]: booking status writes

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only

use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use voyage_checkout_core::api::{
    ApiFuture, BookingApi, CatalogService, CouponApi, CouponValidation, OrderCheck, PaymentApi,
    PaymentHost, PaymentStatus, ServiceCatalog, UserApi,
};
use voyage_checkout_core::booking::{Booking, BookingId, BookingStatus, ComboId, UserId};
use voyage_checkout_core::error::ApiError;
use voyage_checkout_core::intent::IntentRequest;
use voyage_checkout_core::notes::strip_coupon_marker;

/// One request received by [`MockBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `GET /Booking/{id}`
    GetBooking(BookingId),
    /// `PUT /Booking/{id}/status`
    UpdateStatus(BookingId, BookingStatus),
    /// `POST /Coupon/validate`
    ValidateCoupon(String),
    /// `POST /Coupon/calculate-discount`
    CalculateDiscount(String, Decimal),
    /// `POST /Coupon/apply`
    ApplyCoupon(BookingId, String),
    /// `POST /Coupon/remove`
    RemoveCoupon(BookingId, String),
    /// `GET /ServiceComboDetail/combo/{id}`
    ComboServices(ComboId),
    /// `POST /Payment/create-intent`
    CreateIntent(IntentRequest),
    /// `GET /Payment/status/{bookingId}`
    PaymentStatus(BookingId),
    /// `GET /Payment/check-payment-by-ordercode`
    CheckByOrderCode(PaymentHost, String),
    /// `PUT /User/update-spent/{userId}`
    UpdateSpent(UserId, Decimal),
}

#[derive(Debug)]
struct Script {
    bookings: HashMap<BookingId, Booking>,
    update_status: Result<(), ApiError>,
    validation: Result<CouponValidation, ApiError>,
    discount: Result<Decimal, ApiError>,
    apply: Result<(), ApiError>,
    remove: Result<(), ApiError>,
    keeps_coupon_marker: bool,
    catalogs: HashMap<ComboId, Result<Vec<CatalogService>, ApiError>>,
    intent: Result<Value, ApiError>,
    payment_status: Result<PaymentStatus, ApiError>,
    checks: HashMap<PaymentHost, VecDeque<Result<OrderCheck, ApiError>>>,
    update_spent: Result<(), ApiError>,
    calls: Vec<MockCall>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            bookings: HashMap::new(),
            update_status: Ok(()),
            validation: Ok(CouponValidation {
                valid: true,
                message: None,
            }),
            discount: Ok(Decimal::ZERO),
            apply: Ok(()),
            remove: Ok(()),
            keeps_coupon_marker: false,
            catalogs: HashMap::new(),
            intent: Ok(json!({ "checkoutUrl": "https://pay.example/checkout/1" })),
            payment_status: Ok(PaymentStatus {
                status: "paid".to_string(),
                amount: Decimal::ZERO,
                method: None,
                created_at: None,
                paid_at: None,
            }),
            checks: HashMap::new(),
            update_spent: Ok(()),
            calls: Vec::new(),
        }
    }
}

/// Scripted backend implementing every collaborator trait
///
/// Cloning shares the script and the call log.
///
/// Unscripted order-code checks answer "not paid"; unknown bookings and
/// catalogs answer 404.
///
/// # Example
///
/// ```
/// use voyage_checkout_testing::{MockBackend, MockCall, BookingBuilder};
/// use voyage_checkout_core::api::BookingApi;
/// use voyage_checkout_core::booking::BookingId;
///
/// # tokio_test::block_on(async {
/// let backend = MockBackend::new().with_booking(BookingBuilder::new(7).build());
/// let booking = backend.get_booking(BookingId(7)).await.unwrap();
/// assert_eq!(booking.id, BookingId(7));
/// assert_eq!(backend.calls(), vec![MockCall::GetBooking(BookingId(7))]);
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    script: Arc<Mutex<Script>>,
}

impl MockBackend {
    /// Create a backend with default answers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `booking` from `GET /Booking/{id}`
    #[must_use]
    pub fn with_booking(self, booking: Booking) -> Self {
        self.script.lock().unwrap().bookings.insert(booking.id, booking);
        self
    }

    /// Answer coupon validation with `result`
    #[must_use]
    pub fn with_validation(self, result: Result<CouponValidation, ApiError>) -> Self {
        self.script.lock().unwrap().validation = result;
        self
    }

    /// Answer discount calculation with `result`
    #[must_use]
    pub fn with_discount(self, result: Result<Decimal, ApiError>) -> Self {
        self.script.lock().unwrap().discount = result;
        self
    }

    /// Answer coupon apply with `result`
    #[must_use]
    pub fn with_apply(self, result: Result<(), ApiError>) -> Self {
        self.script.lock().unwrap().apply = result;
        self
    }

    /// Leave the notes coupon marker in place when a coupon is removed
    #[must_use]
    pub fn keeping_coupon_marker_on_remove(self) -> Self {
        self.script.lock().unwrap().keeps_coupon_marker = true;
        self
    }

    /// Serve `result` as the add-on catalog of `combo_id`
    #[must_use]
    pub fn with_catalog(
        self,
        combo_id: ComboId,
        result: Result<Vec<CatalogService>, ApiError>,
    ) -> Self {
        self.script.lock().unwrap().catalogs.insert(combo_id, result);
        self
    }

    /// Answer create-intent with `result`
    #[must_use]
    pub fn with_intent(self, result: Result<Value, ApiError>) -> Self {
        self.script.lock().unwrap().intent = result;
        self
    }

    /// Answer payment status reloads with `result`
    #[must_use]
    pub fn with_payment_status(self, result: Result<PaymentStatus, ApiError>) -> Self {
        self.script.lock().unwrap().payment_status = result;
        self
    }

    /// Answer booking status writes with `result`
    #[must_use]
    pub fn with_update_status(self, result: Result<(), ApiError>) -> Self {
        self.script.lock().unwrap().update_status = result;
        self
    }

    /// Answer loyalty spend updates with `result`
    #[must_use]
    pub fn with_update_spent(self, result: Result<(), ApiError>) -> Self {
        self.script.lock().unwrap().update_spent = result;
        self
    }

    /// Queue the answer to the next unanswered order-code check on `host`
    #[must_use]
    pub fn script_check(self, host: PaymentHost, result: Result<OrderCheck, ApiError>) -> Self {
        self.script
            .lock()
            .unwrap()
            .checks
            .entry(host)
            .or_default()
            .push_back(result);
        self
    }

    /// Every request received, in order
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.script.lock().unwrap().calls.clone()
    }

    /// Order-code checks received against `host`
    #[must_use]
    pub fn checks_on(&self, host: PaymentHost) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, MockCall::CheckByOrderCode(h, _) if *h == host))
            .count()
    }

    /// Booking status writes received
    #[must_use]
    pub fn status_writes(&self) -> Vec<(BookingId, BookingStatus)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::UpdateStatus(id, status) => Some((id, status)),
                _ => None,
            })
            .collect()
    }

    /// Loyalty spend updates received
    #[must_use]
    pub fn spend_updates(&self) -> Vec<(UserId, Decimal)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::UpdateSpent(id, amount) => Some((id, amount)),
                _ => None,
            })
            .collect()
    }

    /// Intent requests received
    #[must_use]
    pub fn intent_requests(&self) -> Vec<IntentRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::CreateIntent(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// Stored copy of a booking, reflecting status and coupon writes
    #[must_use]
    pub fn booking(&self, id: BookingId) -> Option<Booking> {
        self.script.lock().unwrap().bookings.get(&id).cloned()
    }

    /// Forget recorded calls, keeping the script
    pub fn clear_calls(&self) {
        self.script.lock().unwrap().calls.clear();
    }

    fn record<T>(&self, call: MockCall, answer: impl FnOnce(&mut Script) -> T) -> T {
        let mut script = self.script.lock().unwrap();
        script.calls.push(call);
        answer(&mut script)
    }
}

fn not_found(what: impl std::fmt::Display) -> ApiError {
    ApiError::Status {
        status: 404,
        body: format!("{what} not found"),
    }
}

impl BookingApi for MockBackend {
    fn get_booking(&self, id: BookingId) -> ApiFuture<'_, Booking> {
        let result = self.record(MockCall::GetBooking(id), |script| {
            script
                .bookings
                .get(&id)
                .cloned()
                .ok_or_else(|| not_found(format!("Booking {id}")))
        });
        Box::pin(async move { result })
    }

    fn update_status(&self, id: BookingId, status: BookingStatus) -> ApiFuture<'_, ()> {
        let result = self.record(MockCall::UpdateStatus(id, status.clone()), |script| {
            let result = script.update_status.clone();
            if result.is_ok() {
                if let Some(booking) = script.bookings.get_mut(&id) {
                    booking.status = status;
                }
            }
            result
        });
        Box::pin(async move { result })
    }
}

impl CouponApi for MockBackend {
    fn validate(&self, code: String, _combo_id: Option<ComboId>) -> ApiFuture<'_, CouponValidation> {
        let result = self.record(MockCall::ValidateCoupon(code), |script| {
            script.validation.clone()
        });
        Box::pin(async move { result })
    }

    fn calculate_discount(&self, code: String, original_amount: Decimal) -> ApiFuture<'_, Decimal> {
        let result = self.record(MockCall::CalculateDiscount(code, original_amount), |script| {
            script.discount.clone()
        });
        Box::pin(async move { result })
    }

    fn apply(&self, booking_id: BookingId, code: String) -> ApiFuture<'_, ()> {
        let result = self.record(MockCall::ApplyCoupon(booking_id, code.clone()), |script| {
            let result = script.apply.clone();
            if result.is_ok() {
                if let Some(booking) = script.bookings.get_mut(&booking_id) {
                    booking.applied_coupon_code = Some(code);
                }
            }
            result
        });
        Box::pin(async move { result })
    }

    fn remove(&self, booking_id: BookingId, code: String) -> ApiFuture<'_, ()> {
        let result = self.record(MockCall::RemoveCoupon(booking_id, code), |script| {
            let result = script.remove.clone();
            let keeps_marker = script.keeps_coupon_marker;
            if result.is_ok() {
                if let Some(booking) = script.bookings.get_mut(&booking_id) {
                    booking.attached_coupons.clear();
                    if !keeps_marker {
                        booking.notes = strip_coupon_marker(&booking.notes);
                        booking.applied_coupon_code = None;
                    }
                }
            }
            result
        });
        Box::pin(async move { result })
    }
}

impl ServiceCatalog for MockBackend {
    fn combo_services(&self, combo_id: ComboId) -> ApiFuture<'_, Vec<CatalogService>> {
        let result = self.record(MockCall::ComboServices(combo_id), |script| {
            script
                .catalogs
                .get(&combo_id)
                .cloned()
                .unwrap_or_else(|| Err(not_found(format!("Combo {combo_id}"))))
        });
        Box::pin(async move { result })
    }
}

impl PaymentApi for MockBackend {
    fn create_intent(&self, request: IntentRequest) -> ApiFuture<'_, Value> {
        let result = self.record(MockCall::CreateIntent(request), |script| script.intent.clone());
        Box::pin(async move { result })
    }

    fn payment_status(&self, booking_id: BookingId) -> ApiFuture<'_, PaymentStatus> {
        let result = self.record(MockCall::PaymentStatus(booking_id), |script| {
            script.payment_status.clone()
        });
        Box::pin(async move { result })
    }

    fn check_by_order_code(&self, host: PaymentHost, order_code: String) -> ApiFuture<'_, OrderCheck> {
        let result = self.record(MockCall::CheckByOrderCode(host, order_code), |script| {
            script
                .checks
                .get_mut(&host)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Ok(OrderCheck {
                    was_updated: false,
                    is_paid: false,
                    status: Some("pending".to_string()),
                }))
        });
        Box::pin(async move { result })
    }
}

impl UserApi for MockBackend {
    fn update_spent(&self, user_id: UserId, amount_spent: Decimal) -> ApiFuture<'_, ()> {
        let result = self.record(MockCall::UpdateSpent(user_id, amount_spent), |script| {
            script.update_spent.clone()
        });
        Box::pin(async move { result })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::BookingBuilder;

    #[tokio::test]
    async fn unscripted_checks_are_not_paid() {
        let backend = MockBackend::new();
        let check = backend
            .check_by_order_code(PaymentHost::Primary, "A1".into())
            .await
            .unwrap();
        assert!(!check.is_paid);
        assert_eq!(backend.checks_on(PaymentHost::Primary), 1);
    }

    #[tokio::test]
    async fn scripted_checks_are_consumed_in_order() {
        let backend = MockBackend::new()
            .script_check(PaymentHost::Fallback, Err(ApiError::Network("down".into())))
            .script_check(
                PaymentHost::Fallback,
                Ok(OrderCheck {
                    was_updated: true,
                    is_paid: true,
                    status: None,
                }),
            );
        assert!(backend.check_by_order_code(PaymentHost::Fallback, "A".into()).await.is_err());
        assert!(
            backend
                .check_by_order_code(PaymentHost::Fallback, "A".into())
                .await
                .unwrap()
                .was_updated
        );
    }

    #[tokio::test]
    async fn status_write_updates_stored_booking() {
        let backend = MockBackend::new().with_booking(BookingBuilder::new(3).build());
        backend.update_status(BookingId(3), BookingStatus::Paid).await.unwrap();
        assert_eq!(backend.booking(BookingId(3)).unwrap().status, BookingStatus::Paid);
        assert_eq!(backend.status_writes(), vec![(BookingId(3), BookingStatus::Paid)]);
    }

    #[tokio::test]
    async fn unknown_booking_is_not_found() {
        let err = MockBackend::new().get_booking(BookingId(9)).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }
}
