//! Hand-written collaborator doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use mm_domain::chat::{ChatType, UserProfile};
use mm_domain::error::{Error, Result};
use mm_domain::history::{Generation, Message, Part, UserMessage};
use mm_gateway::runtime::{Collaborators, NameResolver, Pipeline, PipelineSettings, TurnContext};
use mm_platform::{GroupSummary, MediaContent, PlatformClient};
use mm_providers::{GenerateRequest, GenerateResponse, TextGenerator, Usage};
use mm_store::{HistoryStore, JsonProfileStore, MediaStore, MemoryHistoryStore, ProfileStore};
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Platform
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct TypingCall {
    pub conversation_id: String,
    pub timeout: Duration,
}

#[derive(Default)]
pub struct FakePlatform {
    media: Mutex<Option<MediaContent>>,
    typing_latency: Mutex<Duration>,
    typing_panics: Mutex<bool>,
    typing_calls: Mutex<Vec<TypingCall>>,
    replies: Mutex<Vec<(String, String)>>,
    groups: Mutex<HashMap<String, (GroupSummary, Option<u32>)>>,
    profiles: Mutex<HashMap<String, UserProfile>>,
}

impl FakePlatform {
    pub fn set_media(&self, bytes: Vec<u8>, mime_type: &str) {
        *self.media.lock() = Some(MediaContent {
            bytes,
            mime_type: mime_type.into(),
        });
    }

    pub fn set_typing_latency(&self, latency: Duration) {
        *self.typing_latency.lock() = latency;
    }

    pub fn panic_on_typing(&self) {
        *self.typing_panics.lock() = true;
    }

    /// `member_count: None` makes the count endpoint fail.
    pub fn add_group(&self, group_id: &str, name: &str, member_count: Option<u32>) {
        self.groups.lock().insert(
            group_id.into(),
            (
                GroupSummary {
                    group_id: group_id.into(),
                    name: Some(name.into()),
                    picture_url: None,
                },
                member_count,
            ),
        );
    }

    pub fn add_profile(&self, profile: UserProfile) {
        self.profiles.lock().insert(profile.user_id.clone(), profile);
    }

    pub fn typing_calls(&self) -> Vec<TypingCall> {
        self.typing_calls.lock().clone()
    }

    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().clone()
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn download_media(&self, message_id: &str) -> Result<MediaContent> {
        self.media
            .lock()
            .clone()
            .ok_or_else(|| Error::dependency("platform", format!("no content for {message_id}")))
    }

    async fn show_typing(&self, conversation_id: &str, timeout: Duration) -> Result<()> {
        if *self.typing_panics.lock() {
            panic!("show_typing exploded");
        }
        self.typing_calls.lock().push(TypingCall {
            conversation_id: conversation_id.into(),
            timeout,
        });
        let latency = *self.typing_latency.lock();
        tokio::time::sleep(latency).await;
        Ok(())
    }

    async fn reply(&self, reply_token: &str, text: &str) -> Result<()> {
        self.replies.lock().push((reply_token.into(), text.into()));
        Ok(())
    }

    async fn group_summary(&self, group_id: &str) -> Result<GroupSummary> {
        self.groups
            .lock()
            .get(group_id)
            .map(|(s, _)| s.clone())
            .ok_or_else(|| Error::dependency("platform", "unknown group"))
    }

    async fn group_member_count(&self, group_id: &str) -> Result<u32> {
        self.groups
            .lock()
            .get(group_id)
            .and_then(|(_, c)| *c)
            .ok_or_else(|| Error::dependency("platform", "member count unavailable"))
    }

    async fn user_profile(&self, user_id: &str) -> Result<UserProfile> {
        self.profiles
            .lock()
            .get(user_id)
            .cloned()
            .ok_or_else(|| Error::dependency("platform", "unknown user"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Media store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct FakeMedia {
    objects: Mutex<HashMap<String, String>>,
    fail_store: Mutex<bool>,
    broken_keys: Mutex<HashSet<String>>,
    url_calls: Mutex<Vec<String>>,
}

impl FakeMedia {
    pub fn insert(&self, key: &str, mime_type: &str) {
        self.objects.lock().insert(key.into(), mime_type.into());
    }

    pub fn fail_store(&self) {
        *self.fail_store.lock() = true;
    }

    /// Signed-URL lookups for `key` fail from now on.
    pub fn break_key(&self, key: &str) {
        self.broken_keys.lock().insert(key.into());
    }

    pub fn stored_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn url_calls(&self) -> Vec<String> {
        self.url_calls.lock().clone()
    }
}

#[async_trait]
impl MediaStore for FakeMedia {
    async fn store(
        &self,
        conversation_id: &str,
        message_id: &str,
        _bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<String> {
        if *self.fail_store.lock() {
            return Err(Error::dependency("media", "disk full"));
        }
        let key = format!("{conversation_id}/{message_id}");
        self.insert(&key, mime_type);
        Ok(key)
    }

    async fn signed_url(&self, storage_key: &str, _ttl: Duration) -> Result<String> {
        self.url_calls.lock().push(storage_key.into());
        tokio::task::yield_now().await;
        if self.broken_keys.lock().contains(storage_key) {
            return Err(Error::dependency("media", format!("cannot sign {storage_key}")));
        }
        if !self.objects.lock().contains_key(storage_key) {
            return Err(Error::NotFound(format!("media {storage_key}")));
        }
        Ok(format!("https://media.test/{storage_key}?sig=ok"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Generator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FakeGenerator {
    latency: Mutex<Duration>,
    reply: Mutex<String>,
    fail: Mutex<bool>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl Default for FakeGenerator {
    fn default() -> Self {
        Self {
            latency: Mutex::new(Duration::ZERO),
            reply: Mutex::new("Sure thing.".into()),
            fail: Mutex::new(false),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeGenerator {
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn set_reply(&self, reply: &str) {
        *self.reply.lock() = reply.into();
    }

    pub fn fail(&self) {
        *self.fail.lock() = true;
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse> {
        self.requests.lock().push(req);
        let latency = *self.latency.lock();
        tokio::time::sleep(latency).await;
        if *self.fail.lock() {
            return Err(Error::dependency("llm", "HTTP 503"));
        }
        Ok(GenerateResponse {
            text: self.reply.lock().clone(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 3,
                total_tokens: 13,
            }),
            model: "fake-1".into(),
            finish_reason: Some("stop".into()),
        })
    }

    fn provider_id(&self) -> &str {
        "fake"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// History store that loses every race
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lets a competing writer save between this caller's load and save.
#[derive(Default)]
pub struct RacedHistory {
    pub inner: MemoryHistoryStore,
}

#[async_trait]
impl HistoryStore for RacedHistory {
    async fn load(&self, conversation_id: &str) -> Result<(Vec<Message>, Generation)> {
        let (log, generation) = self.inner.load(conversation_id).await?;
        let mut theirs = log.clone();
        theirs.push(user_text("intruder", "U9", "me first"));
        self.inner.save(conversation_id, &theirs, generation).await?;
        Ok((log, generation))
    }

    async fn save(
        &self,
        conversation_id: &str,
        messages: &[Message],
        expected: Generation,
    ) -> Result<Generation> {
        self.inner.save(conversation_id, messages, expected).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Name resolver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct CountingNames {
    calls: Mutex<Vec<String>>,
}

impl CountingNames {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl NameResolver for CountingNames {
    async fn display_name(&self, user_id: &str) -> String {
        self.calls.lock().push(user_id.into());
        tokio::task::yield_now().await;
        format!("name-of-{user_id}")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Harness {
    pub platform: Arc<FakePlatform>,
    pub generator: Arc<FakeGenerator>,
    pub history: Arc<dyn HistoryStore>,
    pub media: Arc<FakeMedia>,
    pub profiles: Arc<JsonProfileStore>,
    pub pipeline: Pipeline,
}

impl Harness {
    pub fn new(settings: PipelineSettings) -> Self {
        Self::with_history(settings, Arc::new(MemoryHistoryStore::new()))
    }

    pub fn with_history(settings: PipelineSettings, history: Arc<dyn HistoryStore>) -> Self {
        let platform = Arc::new(FakePlatform::default());
        let generator = Arc::new(FakeGenerator::default());
        let media = Arc::new(FakeMedia::default());
        let profiles = Arc::new(JsonProfileStore::in_memory());
        let pipeline = Pipeline::new(
            Collaborators {
                platform: platform.clone(),
                generator: generator.clone(),
                history: history.clone(),
                media: media.clone(),
                profiles: profiles.clone(),
            },
            settings,
        );
        Self {
            platform,
            generator,
            history,
            media,
            profiles,
            pipeline,
        }
    }
}

/// Settings with short, test-friendly timings.
pub fn settings(indicator_delay: Duration) -> PipelineSettings {
    PipelineSettings {
        indicator_delay,
        indicator_timeout: Duration::from_secs(20),
        turn_timeout: None,
        ..PipelineSettings::default()
    }
}

pub fn one_to_one_ctx(cancel: CancellationToken) -> TurnContext {
    TurnContext::new(cancel)
        .with_conversation("U1", ChatType::OneToOne)
        .with_user_id("U1")
        .with_message_id("m1")
        .with_reply_token(Some("rt-1".into()))
}

pub fn group_ctx(chat_type: ChatType) -> TurnContext {
    TurnContext::new(CancellationToken::new())
        .with_conversation("C1", chat_type)
        .with_user_id("U1")
        .with_message_id("m1")
}

pub fn alice() -> UserProfile {
    UserProfile {
        user_id: "U1".into(),
        display_name: "Alice".into(),
        picture_url: Some("https://cdn.test/alice.jpg".into()),
        status_message: Some("reading".into()),
        language: Some("en".into()),
    }
}

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
}

pub fn user_text(message_id: &str, user_id: &str, text: &str) -> Message {
    Message::User(UserMessage {
        message_id: message_id.into(),
        user_id: user_id.into(),
        timestamp: at(10, 0),
        parts: vec![Part::text(text)],
    })
}

pub async fn seed_profile(profiles: &JsonProfileStore, profile: UserProfile) {
    profiles.put_user_profile(profile).await.unwrap();
}
