//! End-to-end dispatch tests with a scripted provider and a recording
//! gateway against an in-memory database.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use charla::agents::{AgentRuntime, Router};
use charla::config::CoreConfig;
use charla::dispatch::{Dispatcher, InboundContent};
use charla::error::{GatewayError, ProviderError};
use charla::gateway::{MessagingGateway, OutboundMessage};
use charla::model::{CefrLevel, Platform, User};
use charla::onboarding::OnboardingManager;
use charla::prompts::{default_templates, PromptRegistry};
use charla::providers::{AiProvider, CompletionRequest, CompletionResponse};
use charla::session::SessionPipeline;
use charla::storage::FsBlobStorage;
use charla::store::{Database, LibSqlBackend, MemoryCache, StateStore};

/// Provider that replays a scripted queue of completion results.
struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, String>>>,
}

impl ScriptedProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
        })
    }

    fn push_ok(&self, reply: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(reply.to_string()));
    }

    fn push_err(&self, reason: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(reason.to_string()));
    }
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(content)) => Ok(CompletionResponse { content }),
            Some(Err(reason)) => Err(ProviderError::RequestFailed {
                provider: "scripted".to_string(),
                reason,
            }),
            None => Err(ProviderError::RequestFailed {
                provider: "scripted".to_string(),
                reason: "script exhausted".to_string(),
            }),
        }
    }

    async fn transcribe(&self, _audio: &[u8], _filename: &str) -> Result<String, ProviderError> {
        Ok("I went to the market yesterday and I bought some fresh vegetables for dinner"
            .to_string())
    }

    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, ProviderError> {
        Ok(vec![0u8; 16])
    }
}

/// Gateway that records every outbound message.
#[derive(Default)]
struct RecordingGateway {
    sent: Mutex<Vec<(String, OutboundMessage)>>,
}

impl RecordingGateway {
    fn last_text(&self) -> String {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|(_, m)| m.text.clone())
            .unwrap_or_default()
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// All delivered texts. After-commit hooks deliver in the background,
    /// so ordering against the main reply is not guaranteed.
    fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.text.clone())
            .collect()
    }

    fn sent_containing(&self, needle: &str) -> bool {
        self.texts().iter().any(|t| t.contains(needle))
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(
        &self,
        _platform: Platform,
        chat_id: &str,
        message: OutboundMessage,
    ) -> Result<(), GatewayError> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), message));
        Ok(())
    }
}

struct Harness {
    db: Arc<dyn Database>,
    provider: Arc<ScriptedProvider>,
    gateway: Arc<RecordingGateway>,
    dispatcher: Dispatcher,
    _media_dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let config = CoreConfig::default();
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    for template in default_templates(&config.persona) {
        db.insert_template(&template).await.unwrap();
    }
    let registry = Arc::new(PromptRegistry::new(db.load_active_templates().await.unwrap()));

    let provider = ScriptedProvider::new();
    let provider_dyn: Arc<dyn AiProvider> = provider.clone();
    let gateway = Arc::new(RecordingGateway::default());
    let gateway_dyn: Arc<dyn MessagingGateway> = gateway.clone();

    let media_dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FsBlobStorage::new(
        media_dir.path(),
        "http://localhost/media",
    ));

    let cache = Arc::new(MemoryCache::new());
    let state_store = Arc::new(StateStore::new(
        cache,
        Arc::clone(&db),
        config.onboarding_ttl,
    ));

    let dispatcher = Dispatcher::new(
        Arc::clone(&db),
        provider_dyn.clone(),
        Router::new(provider_dyn.clone(), Arc::clone(&registry), config.clone()),
        AgentRuntime::new(provider_dyn.clone(), Arc::clone(&registry), config.clone()),
        SessionPipeline::new(
            Arc::clone(&db),
            provider_dyn.clone(),
            Arc::clone(&registry),
            storage,
            gateway_dyn.clone(),
            config.clone(),
        ),
        OnboardingManager::new(
            Arc::clone(&db),
            state_store,
            provider_dyn,
            registry,
            config.clone(),
        ),
        gateway_dyn,
        config,
    );

    Harness {
        db,
        provider,
        gateway,
        dispatcher,
        _media_dir: media_dir,
    }
}

async fn active_user(db: &Arc<dyn Database>, level: CefrLevel) -> User {
    let user = User::new(Platform::Telegram, "tg-1", "Ana");
    db.create_user(&user).await.unwrap();
    db.set_onboarding(user.id, false, "complete").await.unwrap();
    db.update_user_level(user.id, level).await.unwrap();
    db.get_user(user.id).await.unwrap().unwrap()
}

const EVALUATION_78: &str = r#"{
    "pronunciation": 80, "fluency": 76, "grammar": 75, "vocabulary": 81, "overall": 78,
    "feedback": {"pronunciation": "clear", "fluency": "steady", "grammar": "minor slips", "vocabulary": "good range"}
}"#;

#[tokio::test]
async fn new_user_gets_welcomed_into_the_placement_test() {
    let h = harness().await;
    let user = User::new(Platform::Telegram, "tg-9", "Luis");
    h.db.create_user(&user).await.unwrap();

    h.dispatcher
        .handle(user.id, Platform::Telegram, "chat-9", InboundContent::Text("hola".into()))
        .await;

    let reply = h.gateway.last_text();
    assert!(reply.contains("Luis"));
    assert!(reply.contains("placement test"));

    let updated = h.db.get_user(user.id).await.unwrap().unwrap();
    assert!(updated.is_onboarding);
    assert_eq!(updated.onboarding_step, "level_test");
}

#[tokio::test]
async fn practice_session_awards_level_scaled_xp() {
    let h = harness().await;
    let user = active_user(&h.db, CefrLevel::B1).await;

    // Router picks the practice agent, then the pipeline evaluates and
    // generates the two feedback texts.
    h.provider.push_ok(
        r#"{"agent_to_invoke": "practice-session", "reasoning": "substantial practice message"}"#,
    );
    h.provider.push_ok(EVALUATION_78);
    h.provider.push_ok("Great job with your description!");
    h.provider.push_ok("¡Muy bien! Sigue así.");

    let message = "Yesterday I went to the market near my house and I bought many fresh \
                   vegetables because I wanted to cook a big dinner for my whole family";
    h.dispatcher
        .handle(
            user.id,
            Platform::Telegram,
            "chat-1",
            InboundContent::Text(message.into()),
        )
        .await;

    // round(10 * (78/50) * 1.3) = 20 for a B1 user.
    let updated = h.db.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(updated.xp, 20);
    // Same-day activity leaves the streak where it was, including at zero.
    assert_eq!(updated.streak, 0);

    let scores = h
        .db
        .recent_session_scores(user.id, CefrLevel::B1, 5)
        .await
        .unwrap();
    assert_eq!(scores, vec![78]);

    assert!(h.gateway.sent_containing("Overall: *78*"));
    assert!(h.gateway.sent_containing("+20 XP"));
    assert!(h.gateway.sent_containing("Great job"));
    assert!(h.gateway.sent_containing("¡Muy bien!"));
}

#[tokio::test]
async fn failed_evaluation_still_persists_a_fallback_session() {
    let h = harness().await;
    let user = active_user(&h.db, CefrLevel::A2).await;

    h.provider
        .push_ok(r#"{"agent_to_invoke": "practice-session", "reasoning": "practice"}"#);
    h.provider.push_err("timeout");
    // Feedback calls fail too; inline fallbacks take over.
    h.provider.push_err("down");
    h.provider.push_err("down");

    h.dispatcher
        .handle(
            user.id,
            Platform::Telegram,
            "chat-2",
            InboundContent::Text("I am practicing my English every single day now".into()),
        )
        .await;

    let scores = h
        .db
        .recent_session_scores(user.id, CefrLevel::A2, 5)
        .await
        .unwrap();
    assert_eq!(scores, vec![70]);

    let updated = h.db.get_user(user.id).await.unwrap().unwrap();
    assert!(updated.xp > 0);

    assert!(h.gateway.sent_containing("Overall: *70*"));
    assert!(h.gateway.sent_containing("Keep practicing"));
}

#[tokio::test]
async fn unknown_router_pick_falls_back_to_short_response() {
    let h = harness().await;
    let user = active_user(&h.db, CefrLevel::B1).await;

    h.provider
        .push_ok(r#"{"agent_to_invoke": "world-domination", "reasoning": "hmm"}"#);
    // Reply from the default short-response agent.
    h.provider.push_ok("Nice to hear from you! Tell me more.");

    h.dispatcher
        .handle(
            user.id,
            Platform::Telegram,
            "chat-3",
            InboundContent::Text("could you maybe help me with something".into()),
        )
        .await;

    assert_eq!(h.gateway.last_text(), "Nice to hear from you! Tell me more.");
    // No practice session was created.
    let scores = h
        .db
        .recent_session_scores(user.id, CefrLevel::B1, 5)
        .await
        .unwrap();
    assert!(scores.is_empty());
}

#[tokio::test]
async fn short_messages_skip_the_router() {
    let h = harness().await;
    let user = active_user(&h.db, CefrLevel::A1).await;

    // Only the short-response completion is scripted: if the dispatcher
    // consulted the Router this reply would be consumed as a route pick.
    h.provider.push_ok("Hello Ana! How are you today?");

    h.dispatcher
        .handle(
            user.id,
            Platform::Telegram,
            "chat-4",
            InboundContent::Text("hola profe".into()),
        )
        .await;

    assert_eq!(h.gateway.last_text(), "Hello Ana! How are you today?");
}

#[tokio::test]
async fn voice_notes_go_straight_to_the_practice_pipeline() {
    let h = harness().await;
    let user = active_user(&h.db, CefrLevel::B1).await;

    // No router reply scripted: audio bypasses routing entirely.
    h.provider.push_ok(EVALUATION_78);
    h.provider.push_ok("Lovely pronunciation!");
    h.provider.push_ok("¡Excelente!");

    h.dispatcher
        .handle(
            user.id,
            Platform::Telegram,
            "chat-5",
            InboundContent::Audio {
                data: vec![1, 2, 3],
                input_ref: Some("file-123".to_string()),
            },
        )
        .await;

    assert!(h.gateway.sent_containing("Overall: *78*"));

    let scores = h
        .db
        .recent_session_scores(user.id, CefrLevel::B1, 5)
        .await
        .unwrap();
    assert_eq!(scores, vec![78]);

    // The transcription, not a placeholder, is what lands in the log as
    // the user's turn, so later routing context reflects what was said.
    let turns = h.db.recent_turns(user.id, 10).await.unwrap();
    assert!(turns
        .iter()
        .any(|t| t.content.contains("fresh vegetables for dinner")));
}

#[tokio::test]
async fn lost_onboarding_state_restarts_at_welcome() {
    let h = harness().await;
    let user = User::new(Platform::Telegram, "tg-8", "Rosa");
    h.db.create_user(&user).await.unwrap();
    // Mid-onboarding per the user record, but both the cache and the
    // durable backup are empty (crash plus eviction).
    h.db.set_onboarding(user.id, true, "level_test")
        .await
        .unwrap();

    h.dispatcher
        .handle(
            user.id,
            Platform::Telegram,
            "chat-8",
            InboundContent::Text("ready".into()),
        )
        .await;

    // Onboarding restarts from the welcome message instead of erroring.
    let reply = h.gateway.last_text();
    assert!(reply.contains("placement test"));
    assert!(!reply.contains("Lo siento"));

    let updated = h.db.get_user(user.id).await.unwrap().unwrap();
    assert!(updated.is_onboarding);
    assert_eq!(updated.onboarding_step, "level_test");
}

#[tokio::test]
async fn full_onboarding_flow_assigns_level_and_never_regresses() {
    let h = harness().await;
    let user = User::new(Platform::Telegram, "tg-7", "Eva");
    h.db.create_user(&user).await.unwrap();

    // Welcome.
    h.dispatcher
        .handle(user.id, Platform::Telegram, "c", InboundContent::Text("hi".into()))
        .await;
    assert!(h.gateway.last_text().contains("placement test"));

    // Five placement answers, each grammar-scored by the LLM.
    let answers = [
        "My name is Eva and I am from Bogota in Colombia",
        "Every day I wake up early, I have breakfast and then I work at my office until six",
        "Last year I traveled to the coast with my family and we visited many beautiful beaches together because we love the sea",
        "If I could change one thing about my city I would improve the public transport because the buses are always full and people lose a lot of time",
        "Although technology helps us stay connected with people far away, I believe we sometimes forget to talk with the people who are right next to us",
    ];
    for answer in answers {
        h.provider.push_ok(r#"{"score": 85, "notes": "solid"}"#);
        h.dispatcher
            .handle(
                user.id,
                Platform::Telegram,
                "c",
                InboundContent::Text(answer.into()),
            )
            .await;
    }
    let after_test = h.db.get_user(user.id).await.unwrap().unwrap();
    assert!(after_test.level > CefrLevel::A0);
    assert!(after_test.is_onboarding);
    assert_eq!(after_test.onboarding_step, "interests");
    assert!(h.gateway.last_text().contains("what do you like"));

    // Interests.
    h.dispatcher
        .handle(
            user.id,
            Platform::Telegram,
            "c",
            InboundContent::Text("me gusta la música y viajar".into()),
        )
        .await;
    let after_interests = h.db.get_user(user.id).await.unwrap().unwrap();
    assert!(after_interests.interests.contains(&"music".to_string()));
    assert_eq!(after_interests.onboarding_step, "goal");

    // Goal completes onboarding.
    h.dispatcher
        .handle(
            user.id,
            Platform::Telegram,
            "c",
            InboundContent::Text("para mi trabajo".into()),
        )
        .await;
    let done = h.db.get_user(user.id).await.unwrap().unwrap();
    assert!(!done.is_onboarding);
    assert_eq!(done.onboarding_step, "complete");
    assert_eq!(done.goal.as_deref(), Some("business"));

    // The next message is normal traffic: a short greeting goes to the
    // short-response agent, not back into onboarding.
    h.provider.push_ok("Welcome back, Eva!");
    h.dispatcher
        .handle(user.id, Platform::Telegram, "c", InboundContent::Text("hello".into()))
        .await;
    assert_eq!(h.gateway.last_text(), "Welcome back, Eva!");
    let still_done = h.db.get_user(user.id).await.unwrap().unwrap();
    assert!(!still_done.is_onboarding);
}

#[tokio::test]
async fn total_failure_answers_with_the_apology() {
    let h = harness().await;
    // Unknown user id: the inner flow fails, the catch-all apologizes.
    h.dispatcher
        .handle(
            uuid::Uuid::new_v4(),
            Platform::Telegram,
            "chat-x",
            InboundContent::Text("hola".into()),
        )
        .await;

    assert_eq!(h.gateway.sent_count(), 1);
    assert!(h.gateway.last_text().contains("Lo siento"));
}
