//! Shared fixtures for integration tests: an in-memory database with
//! migrations applied, seeded tenants/flows, recording capability stubs, and
//! signed webhook payload builders.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use serde_json::json;
use uuid::Uuid;

use leadflow::classify::{Classification, ClassificationRequest, OptionClassifier};
use leadflow::config::AppConfig;
use leadflow::crypto::{CryptoKey, encrypt_channel_secrets};
use leadflow::engine::ConversationEngine;
use leadflow::mailer::LeadNotifier;
use leadflow::migration::{Migrator, MigratorTrait};
use leadflow::models;
use leadflow::scheduler::ReminderScheduler;
use leadflow::server::AppState;
use leadflow::wa::{SendCredentials, SendError, SendReceipt, WhatsAppSender};
use leadflow::webhook_verification::sign_payload;

pub const SIGNING_SECRET: &str = "test-signing-secret";
pub const ACCESS_TOKEN: &str = "test-access-token";
pub const PHONE_NUMBER_ID: &str = "15551230001";
pub const WA_USER_ID: &str = "56911112222";

/// One message captured by the recording sender
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub phone_number_id: String,
    pub to: String,
    pub text: String,
}

/// WhatsApp sender stub that records every send and can be told to fail
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<SentMessage>>,
    pub fail: AtomicBool,
    counter: AtomicUsize,
}

impl RecordingSender {
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.text.clone()).collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl WhatsAppSender for RecordingSender {
    async fn send_text(
        &self,
        credentials: &SendCredentials,
        to: &str,
        text: &str,
    ) -> Result<SendReceipt, SendError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SendError::Upstream {
                status: 500,
                body: "simulated outage".to_string(),
            });
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(SentMessage {
            phone_number_id: credentials.phone_number_id.clone(),
            to: to.to_string(),
            text: text.to_string(),
        });

        Ok(SendReceipt {
            wa_message_id: Some(format!("wamid.out.{}", n)),
            raw_response: json!({ "messages": [{ "id": format!("wamid.out.{}", n) }] }),
        })
    }
}

/// Classifier stub returning a fixed response (no-match by default)
#[derive(Default)]
pub struct StubClassifier {
    pub response: Mutex<Classification>,
    pub calls: AtomicUsize,
}

impl StubClassifier {
    pub fn set_response(&self, classification: Classification) {
        *self.response.lock().unwrap() = classification;
    }
}

#[async_trait]
impl OptionClassifier for StubClassifier {
    async fn classify(&self, _request: &ClassificationRequest<'_>) -> Classification {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.lock().unwrap().clone()
    }
}

/// Notifier stub recording every email
#[derive(Default)]
pub struct RecordingNotifier {
    pub notifications: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }
}

#[async_trait]
impl LeadNotifier for RecordingNotifier {
    async fn notify(&self, to: &str, subject: &str, _body_html: &str) -> bool {
        self.notifications
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        true
    }
}

/// Everything an engine test needs in one place
pub struct TestHarness {
    pub db: DatabaseConnection,
    pub state: AppState,
    pub sender: Arc<RecordingSender>,
    pub classifier: Arc<StubClassifier>,
    pub notifier: Arc<RecordingNotifier>,
    pub crypto_key: CryptoKey,
    pub client_id: Uuid,
    pub channel_id: Uuid,
}

impl TestHarness {
    pub fn engine(&self) -> ConversationEngine {
        ConversationEngine::from_state(&self.state)
    }

    pub fn scheduler(&self) -> ReminderScheduler {
        ReminderScheduler::from_state(&self.state)
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        operator_tokens: vec!["test-operator-token".to_string()],
        crypto_key: Some(vec![7u8; 32]),
        ..Default::default()
    }
}

pub async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("create in-memory db");
    Migrator::up(&db, None).await.expect("apply migrations");
    db
}

/// Build a harness with a seeded client and active channel.
pub async fn setup_harness(config: AppConfig) -> TestHarness {
    let db = setup_db().await;
    let crypto_key = CryptoKey::new(config.crypto_key.clone().expect("test key"))
        .expect("valid test key");

    let client_id = seed_client(&db, 100).await;
    let channel_id = seed_channel(&db, &crypto_key, client_id, PHONE_NUMBER_ID, true).await;

    let sender = Arc::new(RecordingSender::default());
    let classifier = Arc::new(StubClassifier::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let state = AppState {
        config: Arc::new(config),
        db: db.clone(),
        crypto_key: crypto_key.clone(),
        sender: sender.clone(),
        classifier: classifier.clone(),
        notifier: notifier.clone(),
    };

    TestHarness {
        db,
        state,
        sender,
        classifier,
        notifier,
        crypto_key,
        client_id,
        channel_id,
    }
}

pub async fn seed_client(db: &DatabaseConnection, score_threshold: i32) -> Uuid {
    let id = Uuid::new_v4();
    let client = models::client::ActiveModel {
        id: Set(id),
        name: Set("Acme".to_string()),
        score_threshold: Set(score_threshold),
        notification_email: Set("owner@acme.test".to_string()),
        human_forward_number: Set(Some("+56 9 1234 5678".to_string())),
        created_at: Set(Utc::now().into()),
    };
    client.insert(db).await.expect("insert client");
    id
}

pub async fn seed_channel(
    db: &DatabaseConnection,
    key: &CryptoKey,
    client_id: Uuid,
    phone_number_id: &str,
    is_active: bool,
) -> Uuid {
    let (access_token_ciphertext, signing_secret_ciphertext) =
        encrypt_channel_secrets(key, client_id, phone_number_id, ACCESS_TOKEN, SIGNING_SECRET)
            .expect("encrypt channel secrets");

    let id = Uuid::new_v4();
    let channel = models::channel::ActiveModel {
        id: Set(id),
        client_id: Set(client_id),
        phone_number_id: Set(phone_number_id.to_string()),
        access_token_ciphertext: Set(access_token_ciphertext),
        signing_secret_ciphertext: Set(signing_secret_ciphertext),
        is_active: Set(is_active),
        created_at: Set(Utc::now().into()),
        updated_at: Set(Utc::now().into()),
    };
    channel.insert(db).await.expect("insert channel");
    id
}

/// Per-flow knobs with sensible test defaults
pub struct FlowSeed {
    pub max_reminders: i32,
    pub reminder_delay_minutes: i32,
    pub max_irrelevant_streak: i32,
}

impl Default for FlowSeed {
    fn default() -> Self {
        Self {
            max_reminders: 2,
            reminder_delay_minutes: 60,
            max_irrelevant_streak: 2,
        }
    }
}

pub async fn seed_flow(db: &DatabaseConnection, client_id: Uuid, seed: FlowSeed) -> Uuid {
    let id = Uuid::new_v4();
    let flow = models::flow::ActiveModel {
        id: Set(id),
        client_id: Set(client_id),
        name: Set("v1".to_string()),
        is_active: Set(true),
        welcome_message: Set("¡Hola! Soy el asistente de Acme.".to_string()),
        max_reminders: Set(seed.max_reminders),
        reminder_delay_minutes: Set(seed.reminder_delay_minutes),
        max_irrelevant_streak: Set(seed.max_irrelevant_streak),
        created_at: Set(Utc::now().into()),
    };
    flow.insert(db).await.expect("insert flow");
    id
}

pub async fn seed_step(
    db: &DatabaseConnection,
    flow_id: Uuid,
    step_order: i32,
    prompt_text: &str,
) -> Uuid {
    let id = Uuid::new_v4();
    let step = models::flow_step::ActiveModel {
        id: Set(id),
        flow_id: Set(flow_id),
        step_order: Set(step_order),
        prompt_text: Set(prompt_text.to_string()),
        allow_free_text: Set(false),
        created_at: Set(Utc::now().into()),
    };
    step.insert(db).await.expect("insert step");
    id
}

/// Option seeding knobs
#[derive(Default)]
pub struct OptionSeed {
    pub score_delta: i32,
    pub is_contact_human: bool,
    pub is_terminal: bool,
    pub next_step_id: Option<Uuid>,
}

pub async fn seed_option(
    db: &DatabaseConnection,
    step_id: Uuid,
    option_order: i32,
    option_code: &str,
    label_text: &str,
    seed: OptionSeed,
) -> Uuid {
    let id = Uuid::new_v4();
    let option = models::flow_step_option::ActiveModel {
        id: Set(id),
        step_id: Set(step_id),
        option_order: Set(option_order),
        option_code: Set(option_code.to_string()),
        label_text: Set(label_text.to_string()),
        score_delta: Set(seed.score_delta),
        is_contact_human: Set(seed.is_contact_human),
        is_terminal: Set(seed.is_terminal),
        next_step_id: Set(seed.next_step_id),
        created_at: Set(Utc::now().into()),
    };
    option.insert(db).await.expect("insert option");
    id
}

/// A two-step linear flow: step 1 (Servicios/Ecommerce) then step 2
/// (Sí/No), with no explicit edges. Returns (flow, step1, step2).
pub async fn seed_linear_flow(
    db: &DatabaseConnection,
    client_id: Uuid,
    seed: FlowSeed,
) -> (Uuid, Uuid, Uuid) {
    let flow_id = seed_flow(db, client_id, seed).await;

    let step1 = seed_step(db, flow_id, 1, "¿Qué servicio te interesa?").await;
    seed_option(db, step1, 1, "SERVICES", "Servicios", OptionSeed::default()).await;
    seed_option(
        db,
        step1,
        2,
        "ECOMMERCE",
        "Ecommerce",
        OptionSeed {
            score_delta: 20,
            ..Default::default()
        },
    )
    .await;

    let step2 = seed_step(db, flow_id, 2, "¿Ya inviertes en publicidad?").await;
    seed_option(db, step2, 1, "YES", "Claro que invierto", OptionSeed::default()).await;
    seed_option(db, step2, 2, "NO", "Todavia no invierto", OptionSeed::default()).await;

    (flow_id, step1, step2)
}

/// Build a raw webhook body plus its valid signature header.
pub fn signed_payload(wa_message_id: &str, text: &str) -> (Vec<u8>, String) {
    signed_payload_from(PHONE_NUMBER_ID, WA_USER_ID, wa_message_id, text)
}

pub fn signed_payload_from(
    phone_number_id: &str,
    wa_user_id: &str,
    wa_message_id: &str,
    text: &str,
) -> (Vec<u8>, String) {
    let payload = json!({
        "entry": [{
            "changes": [{
                "value": {
                    "metadata": { "phone_number_id": phone_number_id },
                    "contacts": [{ "profile": { "name": "Ana" } }],
                    "messages": [{
                        "from": wa_user_id,
                        "id": wa_message_id,
                        "text": { "body": text }
                    }]
                }
            }]
        }]
    });

    let body = serde_json::to_vec(&payload).expect("serialize payload");
    let signature = sign_payload(&body, SIGNING_SECRET);
    (body, signature)
}
