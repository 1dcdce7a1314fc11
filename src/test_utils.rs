//! Shared test utilities for `rimfit`.
//!
//! This module provides the in-memory database setup, settings with short timeouts, and
//! scriptable stand-ins for every external collaborator (generators, processor, media).
#![allow(clippy::unwrap_used)]

use crate::{
    config::{Packages, Settings, YooKassaSettings},
    context::AppContext,
    core::{ChatUser, ledger, payments::PaymentFields, session::SessionStore},
    entities::{PaymentProvider, PaymentStatus, UserModel},
    errors::{Error, Result},
    media::{MediaKind, MediaRef, MediaStore},
    processor::{
        self, Confirmation, CreatePayment, CreatedPayment, PaymentProcessor, ProcessorAmount,
        ProcessorPayment,
    },
    providers::{ImageGenerator, ImageProviderKind, VideoGenerator},
};
use async_trait::async_trait;
use dashmap::DashMap;
use sea_orm::DatabaseConnection;
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

/// The one configured admin account.
pub const TEST_ADMIN_ID: &str = "42";
pub const TEST_SHOP_ID: &str = "shop";
pub const TEST_WEBHOOK_SECRET: &str = "hook";

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Settings with one admin, one free credit and timeouts short enough for tests.
pub fn test_settings() -> Settings {
    Settings {
        database_url: "sqlite::memory:".to_string(),
        admin_ids: vec![TEST_ADMIN_ID.to_string()],
        free_credits: 1,
        support_contact: "@rimfit_support".to_string(),
        currency: "RUB".to_string(),
        image_provider: ImageProviderKind::Gemini,
        ai_api_key: None,
        generation_timeout: Duration::from_millis(200),
        video_timeout: Duration::from_millis(200),
        processor_timeout: Duration::from_millis(500),
        session_ttl: Duration::from_secs(60),
        media_dir: PathBuf::from("unused"),
        webhook_host: "127.0.0.1".to_string(),
        webhook_port: 0,
        yookassa: Some(YooKassaSettings {
            shop_id: TEST_SHOP_ID.to_string(),
            secret_key: "secret".to_string(),
            webhook_secret: Some(TEST_WEBHOOK_SECRET.to_string()),
            return_url: Some("https://bot.example/return".to_string()),
            api_url: "http://processor.invalid".to_string(),
            receipt: None,
        }),
    }
}

/// Creates (or fetches) a user and pins its balance.
pub async fn create_test_user(
    db: &DatabaseConnection,
    external_id: &str,
    balance: i64,
) -> Result<UserModel> {
    ledger::get_or_create_user(db, &test_settings(), external_id, None).await?;
    ledger::set_balance(db, external_id, balance).await
}

/// Notification fields for the "five" package.
pub fn test_payment_fields(payment_id: &str, status: PaymentStatus, credits: i64) -> PaymentFields {
    PaymentFields {
        payment_id: payment_id.to_string(),
        provider: PaymentProvider::YooKassa,
        status,
        amount: 39_900,
        credits,
        package: "five".to_string(),
        payment_link: None,
        idempotence_key: None,
        metadata: None,
        paid_at: None,
    }
}

pub fn chat_user(external_id: &str) -> ChatUser {
    ChatUser::new(external_id, None)
}

/// What a mock generator does on its next calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorBehavior {
    Succeed,
    Fail,
    /// Never answers; only a caller-side timeout ends the call
    Hang,
}

#[derive(Debug)]
struct Script {
    behavior: Mutex<GeneratorBehavior>,
    calls: AtomicUsize,
}

impl Script {
    fn new() -> Self {
        Self {
            behavior: Mutex::new(GeneratorBehavior::Succeed),
            calls: AtomicUsize::new(0),
        }
    }

    async fn run(&self, service: &str, output: &[u8]) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            GeneratorBehavior::Succeed => Ok(output.to_vec()),
            GeneratorBehavior::Fail => Err(Error::upstream(service, "scripted failure")),
            GeneratorBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(output.to_vec())
            }
        }
    }
}

#[derive(Debug)]
pub struct MockImageGenerator(Script);

impl MockImageGenerator {
    pub fn new() -> Self {
        Self(Script::new())
    }

    pub fn set_behavior(&self, behavior: GeneratorBehavior) {
        *self.0.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.0.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for MockImageGenerator {
    async fn generate(&self, _car: &[u8], _wheel: &[u8]) -> Result<Vec<u8>> {
        self.0.run("Image provider", b"fitted").await
    }
}

#[derive(Debug)]
pub struct MockVideoGenerator(Script);

impl MockVideoGenerator {
    pub fn new() -> Self {
        Self(Script::new())
    }

    pub fn set_behavior(&self, behavior: GeneratorBehavior) {
        *self.0.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.0.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoGenerator for MockVideoGenerator {
    async fn generate(&self, _image: &[u8]) -> Result<Vec<u8>> {
        self.0.run("Video provider", b"video").await
    }
}

/// Processor that keeps its payments in memory and hands out ids `pay-1`, `pay-2`, ...
#[derive(Debug, Default)]
pub struct MockProcessor {
    payments: Mutex<HashMap<String, ProcessorPayment>>,
    created: Mutex<Vec<CreatePayment>>,
    next_id: AtomicUsize,
    fail_next: AtomicBool,
    hang_next: AtomicBool,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests accepted so far.
    pub fn created(&self) -> Vec<CreatePayment> {
        self.created.lock().unwrap().clone()
    }

    /// Changes the status the processor reports for a payment.
    pub fn set_status(&self, payment_id: &str, status: &str) {
        if let Some(payment) = self.payments.lock().unwrap().get_mut(payment_id) {
            payment.status = Some(status.to_string());
            if status == "succeeded" {
                payment.captured_at = Some("2024-03-01T10:15:30.000Z".to_string());
            }
        }
    }

    /// The next call fails as if the processor were down.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// The next call never answers; only a caller-side timeout ends it.
    pub fn hang_next(&self) {
        self.hang_next.store(true, Ordering::SeqCst);
    }

    async fn outage(&self) -> Result<()> {
        if self.hang_next.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::upstream("YooKassa", "scripted outage"));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn create_payment(&self, request: CreatePayment) -> Result<CreatedPayment> {
        self.outage().await?;
        let payment_id = format!("pay-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let confirmation_url = format!("https://pay.example/{payment_id}");

        let remote = ProcessorPayment {
            id: payment_id.clone(),
            status: Some("pending".to_string()),
            amount: Some(ProcessorAmount {
                value: processor::format_amount(request.amount),
                currency: "RUB".to_string(),
            }),
            metadata: request.metadata.to_json().as_object().cloned(),
            confirmation: Some(Confirmation {
                confirmation_url: Some(confirmation_url.clone()),
            }),
            paid_at: None,
            captured_at: None,
        };
        self.payments
            .lock()
            .unwrap()
            .insert(payment_id.clone(), remote);
        self.created.lock().unwrap().push(request);

        Ok(CreatedPayment {
            payment_id: payment_id.clone(),
            confirmation_url,
            status: PaymentStatus::Pending,
            idempotence_key: format!("key-{payment_id}"),
        })
    }

    async fn get_payment(&self, payment_id: &str) -> Result<ProcessorPayment> {
        self.outage().await?;
        self.payments
            .lock()
            .unwrap()
            .get(payment_id)
            .cloned()
            .ok_or_else(|| Error::upstream("YooKassa", format!("404 for {payment_id}")))
    }
}

/// Media store backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryMediaStore {
    blobs: DashMap<MediaRef, Vec<u8>>,
}

impl InMemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_of(&self, kind: MediaKind) -> usize {
        self.blobs.iter().filter(|entry| entry.key().kind == kind).count()
    }
}

#[async_trait]
impl MediaStore for InMemoryMediaStore {
    async fn put(&self, owner: &str, kind: MediaKind, bytes: &[u8]) -> Result<MediaRef> {
        let media = MediaRef {
            owner: owner.to_string(),
            kind,
        };
        self.blobs.insert(media.clone(), bytes.to_vec());
        Ok(media)
    }

    async fn get(&self, media: &MediaRef) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(media).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, media: &MediaRef) -> Result<()> {
        self.blobs.remove(media);
        Ok(())
    }
}

/// A full application context wired to mocks, with handles to script them.
pub struct TestHarness {
    pub ctx: Arc<AppContext>,
    pub media: Arc<InMemoryMediaStore>,
    pub image: Arc<MockImageGenerator>,
    pub video: Arc<MockVideoGenerator>,
    pub processor: Arc<MockProcessor>,
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let media = Arc::new(InMemoryMediaStore::new());
        let image = Arc::new(MockImageGenerator::new());
        let video = Arc::new(MockVideoGenerator::new());
        let processor = Arc::new(MockProcessor::new());

        let ctx = AppContext {
            db: setup_test_db().await?,
            settings: Arc::new(test_settings()),
            packages: Arc::new(Packages::default()),
            processor: Some(Arc::clone(&processor) as Arc<dyn PaymentProcessor>),
            image: Arc::clone(&image) as Arc<dyn ImageGenerator>,
            video: Arc::clone(&video) as Arc<dyn VideoGenerator>,
            media: Arc::clone(&media) as Arc<dyn MediaStore>,
            sessions: Arc::new(SessionStore::new()),
        };

        Ok(Self {
            ctx: Arc::new(ctx),
            media,
            image,
            video,
            processor,
        })
    }
}
