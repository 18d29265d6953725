//! Shared fakes and fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use coursepay_backend::api::{build_router, AppState};
use coursepay_backend::config::UploadConfig;
use coursepay_backend::database::in_memory::{
    InMemoryEnrollmentRepository, InMemoryOrderRepository, InMemoryPaymentRepository,
};
use coursepay_backend::health::HealthChecker;
use coursepay_backend::models::{Order, OrderItem, OrderStatus};
use coursepay_backend::payments::error::{GatewayError, GatewayResult};
use coursepay_backend::payments::provider::CardGateway;
use coursepay_backend::payments::types::{CardDetails, CardToken, ChargeRequest, GatewayCharge};
use coursepay_backend::services::notification::{
    NotificationError, NotificationType, PaymentNotification, PaymentNotifier,
};
use coursepay_backend::services::{
    BankTransferProcessor, CardChargeProcessor, EnrollmentReconciler, PaymentOrchestrator,
    PaymentValidationService,
};
use coursepay_backend::uploads::image_validator::ImageValidator;
use coursepay_backend::uploads::storage::InMemorySlipStorage;
use coursepay_backend::uploads::UploadedFile;
use image::{ImageBuffer, ImageFormat, Rgb};
use std::collections::HashMap;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const APPROVAL_SECRET: &str = "approval-secret-for-tests";

/// What the fake gateway answers to `create_charge`
#[derive(Debug, Clone)]
pub enum ChargeOutcome {
    Paid,
    Failed { code: String, message: String },
    Pending,
    Error(GatewayError),
}

pub struct FakeGateway {
    token_error: Mutex<Option<GatewayError>>,
    outcome: Mutex<ChargeOutcome>,
    charges: Mutex<HashMap<String, GatewayCharge>>,
    delay: Mutex<Option<Duration>>,
    last_card: Mutex<Option<CardDetails>>,
    token_calls: AtomicUsize,
    charge_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new(outcome: ChargeOutcome) -> Self {
        Self {
            token_error: Mutex::new(None),
            outcome: Mutex::new(outcome),
            charges: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            last_card: Mutex::new(None),
            token_calls: AtomicUsize::new(0),
            charge_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_tokens_with(&self, error: GatewayError) {
        *self.token_error.lock().unwrap() = Some(error);
    }

    pub fn set_outcome(&self, outcome: ChargeOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    /// Slow down charges so concurrent attempts overlap.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Settle a previously pending charge on the gateway side.
    pub fn settle(&self, charge_id: &str, paid: bool) {
        let mut charges = self.charges.lock().unwrap();
        if let Some(charge) = charges.get_mut(charge_id) {
            charge.paid = paid;
            if !paid {
                charge.failure_code = Some("payment_rejected".to_string());
                charge.failure_message = Some("payment was rejected by the issuer".to_string());
            }
        }
    }

    /// Card details from the most recent token request
    pub fn last_card(&self) -> Option<CardDetails> {
        self.last_card.lock().unwrap().clone()
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn charge_calls(&self) -> usize {
        self.charge_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CardGateway for FakeGateway {
    async fn create_token(&self, card: &CardDetails) -> GatewayResult<CardToken> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_card.lock().unwrap() = Some(card.clone());
        if let Some(error) = self.token_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(CardToken {
            id: format!("tokn_{}", Uuid::new_v4().simple()),
            last_digits: card
                .number
                .get(card.number.len().saturating_sub(4)..)
                .map(str::to_string),
            brand: Some("Visa".to_string()),
        })
    }

    async fn create_charge(&self, request: ChargeRequest) -> GatewayResult<GatewayCharge> {
        self.charge_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.outcome.lock().unwrap().clone();
        let (paid, failure_code, failure_message) = match outcome {
            ChargeOutcome::Paid => (true, None, None),
            ChargeOutcome::Failed { code, message } => (false, Some(code), Some(message)),
            ChargeOutcome::Pending => (false, None, None),
            ChargeOutcome::Error(error) => return Err(error),
        };

        let charge = GatewayCharge {
            id: format!("chrg_{}", Uuid::new_v4().simple()),
            paid,
            amount: request.amount_minor,
            currency: request.currency,
            failure_code,
            failure_message,
        };
        self.charges
            .lock()
            .unwrap()
            .insert(charge.id.clone(), charge.clone());
        Ok(charge)
    }

    async fn retrieve_charge(&self, charge_id: &str) -> GatewayResult<GatewayCharge> {
        self.charges
            .lock()
            .unwrap()
            .get(charge_id)
            .cloned()
            .ok_or_else(|| GatewayError::Provider {
                message: format!("charge {} was not found", charge_id),
                code: Some("not_found".to_string()),
                retryable: false,
            })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Records every delivered notification; can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<PaymentNotification>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn events(&self) -> Vec<NotificationType> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.event)
            .collect()
    }

    /// Notifications are spawned; give them a moment to land.
    pub async fn wait_for(&self, count: usize) -> Vec<NotificationType> {
        for _ in 0..50 {
            if self.delivered.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.events()
    }
}

#[async_trait]
impl PaymentNotifier for RecordingNotifier {
    async fn notify(&self, notification: &PaymentNotification) -> Result<(), NotificationError> {
        if self.failing {
            return Err(NotificationError::Delivery {
                message: "sink unavailable".to_string(),
            });
        }
        self.delivered.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub orders: InMemoryOrderRepository,
    pub payments: InMemoryPaymentRepository,
    pub enrollments: InMemoryEnrollmentRepository,
    pub storage: InMemorySlipStorage,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    pub fn new(outcome: ChargeOutcome) -> Self {
        Self::with_notifier(outcome, RecordingNotifier::default())
    }

    pub fn with_notifier(outcome: ChargeOutcome, notifier: RecordingNotifier) -> Self {
        let orders = InMemoryOrderRepository::new();
        let payments = InMemoryPaymentRepository::new();
        let enrollments = InMemoryEnrollmentRepository::new();
        let storage = InMemorySlipStorage::new();
        let gateway = Arc::new(FakeGateway::new(outcome));
        let notifier = Arc::new(notifier);

        let orchestrator = PaymentOrchestrator::new(
            PaymentValidationService::new(Arc::new(orders.clone()), BigDecimal::from(20)),
            CardChargeProcessor::new(gateway.clone(), Arc::new(payments.clone()), "thb"),
            BankTransferProcessor::new(
                ImageValidator::new(UploadConfig::default()),
                Arc::new(storage.clone()),
                Arc::new(payments.clone()),
                notifier.clone(),
                "payment-slips",
                "thb",
            ),
            EnrollmentReconciler::new(Arc::new(enrollments.clone())),
            Arc::new(orders.clone()),
            Arc::new(payments.clone()),
            notifier.clone(),
        );

        Self {
            orchestrator: Arc::new(orchestrator),
            orders,
            payments,
            enrollments,
            storage,
            gateway,
            notifier,
        }
    }

    pub fn router(&self) -> axum::Router {
        build_router(AppState {
            orchestrator: self.orchestrator.clone(),
            approval_secret: Arc::from(APPROVAL_SECRET),
            health_checker: HealthChecker::new(),
            max_upload_bytes: UploadConfig::default().max_file_bytes,
        })
    }

    /// Seed a pending order for `user_id` with one course per price.
    pub async fn seed_order(&self, user_id: Uuid, prices: &[&str]) -> Order {
        let order = order_fixture(user_id, prices);
        self.orders.insert(order.clone()).await;
        order
    }

    pub async fn order_status(&self, order_id: Uuid) -> OrderStatus {
        use coursepay_backend::database::repository::OrderRepository;
        self.orders
            .find_by_id(order_id)
            .await
            .unwrap()
            .unwrap()
            .status
    }
}

pub fn order_fixture(user_id: Uuid, prices: &[&str]) -> Order {
    let order_id = Uuid::new_v4();
    let items: Vec<OrderItem> = prices
        .iter()
        .map(|price| OrderItem {
            id: Uuid::new_v4(),
            order_id,
            course_id: Uuid::new_v4(),
            price: BigDecimal::from_str(price).unwrap(),
        })
        .collect();
    let total_amount = items
        .iter()
        .fold(BigDecimal::from(0), |acc, item| acc + &item.price);

    Order {
        id: order_id,
        user_id,
        items,
        total_amount,
        status: OrderStatus::Pending,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn test_card() -> CardDetails {
    CardDetails {
        name: "Test Buyer".to_string(),
        number: "4242424242424242".to_string(),
        expiration_month: 12,
        expiration_year: 2030,
        security_code: "123".to_string(),
        city: None,
        postal_code: None,
    }
}

pub fn encode_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 251) as u8, (y % 241) as u8, 128]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn png_slip(width: u32, height: u32) -> UploadedFile {
    UploadedFile {
        file_name: "slip.png".to_string(),
        content_type: "image/png".to_string(),
        bytes: encode_image(width, height, ImageFormat::Png),
    }
}

/// JPEG content presented as a PNG upload
pub fn spoofed_png_slip() -> UploadedFile {
    UploadedFile {
        file_name: "slip.png".to_string(),
        content_type: "image/png".to_string(),
        bytes: encode_image(300, 300, ImageFormat::Jpeg),
    }
}
