//! [`Society`]: the runtime composition root.
//!
//! Builds every subsystem from a [`RuntimeConfig`], wires the tool
//! catalogue, and runs the scheduler. All collaborators are injected
//! through constructors; [`SocietyOptions`] lets embedders (and tests)
//! swap providers, add modules, or plug a JavaScript sandbox.
//!
//! # Shutdown
//!
//! [`Society::shutdown`] stops accepting scheduler work, waits for
//! in-flight agents up to the configured grace period, then snapshots
//! conversations (the org store is write-through and needs no flush).
//! A second call skips the grace wait and returns immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use agora_core::agents::AgentManager;
use agora_core::artifact::ArtifactStore;
use agora_core::bus::{MessageBus, SendMessage};
use agora_core::context::ContextBuilder;
use agora_core::conversation::ConversationManager;
use agora_core::events::{EventBus, RuntimeEvent};
use agora_core::handler::LlmHandler;
use agora_core::module::{register_module, Module};
use agora_core::org::OrgStore;
use agora_core::router::ContentRouter;
use agora_core::scheduler::MessageProcessor;
use agora_core::tools::registry::ToolRegistry;
use agora_core::workspace::WorkspaceManager;
use agora_llm::client::LlmClient;
use agora_llm::provider::Provider;
use agora_llm::retry::{LlmEvent, RetryConfig};
use agora_tools::{register_catalogue, CatalogueDeps, JsSandbox};
use agora_types::message::{Envelope, Payload};
use agora_types::{AgoraError, Result, RuntimeConfig, ROOT_AGENT_ID, USER_AGENT_ID};

/// Injection points for embedders and tests.
#[derive(Default)]
pub struct SocietyOptions {
    /// Replacement providers per service id (fakes in tests,
    /// pre-authenticated clients in apps).
    pub providers: Vec<(String, Arc<dyn Provider>)>,
    /// JavaScript sandbox implementation, if any.
    pub sandbox: Option<Arc<dyn JsSandbox>>,
    /// Local inference provider for `localllm_chat`.
    pub local_llm: Option<Arc<dyn Provider>>,
    /// Extension modules contributing namespaced tools.
    pub modules: Vec<Arc<dyn Module>>,
}

/// The assembled runtime.
pub struct Society {
    config: RuntimeConfig,
    org: Arc<OrgStore>,
    bus: Arc<MessageBus>,
    agents: Arc<AgentManager>,
    conversations: Arc<ConversationManager>,
    workspaces: Arc<WorkspaceManager>,
    artifacts: Arc<ArtifactStore>,
    registry: Arc<ToolRegistry>,
    events: EventBus,
    processor: Arc<MessageProcessor>,
    cancel: CancellationToken,
    llm_events: Mutex<Option<mpsc::UnboundedReceiver<LlmEvent>>>,
    started: AtomicBool,
    shutting_down: AtomicBool,
}

impl Society {
    /// Build a society from configuration with default options.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        Self::with_options(config, SocietyOptions::default())
    }

    /// Build a society from configuration and injection options.
    pub fn with_options(config: RuntimeConfig, options: SocietyOptions) -> Result<Self> {
        let artifacts = Arc::new(ArtifactStore::new(config.artifacts_dir())?);
        let workspaces = Arc::new(WorkspaceManager::new(config.workspaces_dir())?);
        let org = Arc::new(OrgStore::open(config.org_dir())?);
        let conversations = Arc::new(ConversationManager::open(
            config.conversations_dir(),
            config
                .services
                .first()
                .map(|s| s.context_window)
                .unwrap_or(128_000),
            config.compression_threshold,
            config.retained_turns,
        )?);

        let events = EventBus::new();
        let bus = Arc::new(MessageBus::new());
        let agents = Arc::new(AgentManager::new(org.clone(), bus.clone(), events.clone()));
        agents.register_sentinels(config.services.first().map(|s| s.id.clone()));

        let (llm_tx, llm_rx) = mpsc::unbounded_channel();
        let retry = RetryConfig {
            max_retries: config.llm_max_retries,
            base_delay: Duration::from_millis(config.llm_base_delay_ms),
            max_delay: Duration::from_millis(config.llm_max_delay_ms),
            attempt_timeout: Duration::from_secs(config.llm_request_timeout_secs),
            ..RetryConfig::default()
        };
        let mut llm = LlmClient::new(config.services.clone(), config.llm_concurrency, retry)
            .with_events(llm_tx);
        for (service_id, provider) in options.providers {
            llm = llm.with_provider(service_id, provider);
        }
        let llm = Arc::new(llm);

        let router = Arc::new(ContentRouter::new(artifacts.clone()));

        let mut registry = ToolRegistry::new();
        register_catalogue(
            &mut registry,
            &CatalogueDeps {
                org: org.clone(),
                agents: agents.clone(),
                bus: bus.clone(),
                workspaces: workspaces.clone(),
                artifacts: artifacts.clone(),
                router: router.clone(),
                conversations: conversations.clone(),
                llm: llm.clone(),
                sandbox: options.sandbox,
                local_llm: if config.localllm_enabled {
                    options.local_llm
                } else {
                    None
                },
            },
        );
        for module in options.modules {
            register_module(&mut registry, module);
        }
        let registry = Arc::new(registry);

        let handler = Arc::new(LlmHandler::new(
            org.clone(),
            agents.clone(),
            bus.clone(),
            conversations.clone(),
            ContextBuilder::new(config.context_hint_threshold),
            router,
            llm,
            registry.clone(),
            events.clone(),
            config.max_tool_rounds,
        ));

        let cancel = CancellationToken::new();
        let processor = Arc::new(MessageProcessor::new(
            bus.clone(),
            agents.clone(),
            handler,
            events.clone(),
            config.max_concurrent_agents,
            cancel.clone(),
        ));

        Ok(Self {
            config,
            org,
            bus,
            agents,
            conversations,
            workspaces,
            artifacts,
            registry,
            events,
            processor,
            cancel,
            llm_events: Mutex::new(Some(llm_rx)),
            started: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Start the scheduler, the snapshot tick, and the LLM event
    /// forwarder. Idempotent.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("society starting");

        let processor = self.processor.clone();
        tokio::spawn(async move { processor.run().await });

        // Periodic conversation snapshots.
        let conversations = self.conversations.clone();
        let cancel = self.cancel.clone();
        let interval = Duration::from_secs(self.config.snapshot_interval_secs.max(1));
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = conversations.snapshot_all() {
                            warn!(error = %e, "periodic conversation snapshot failed");
                        }
                    }
                }
            }
        });

        // Surface LLM retry/failure events on the runtime stream.
        if let Some(mut rx) = self.llm_events.lock().expect("llm events lock").take() {
            let events = self.events.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        event = rx.recv() => match event {
                            Some(LlmEvent::RetryScheduled { service, attempt, delay_ms, error }) => {
                                events.publish(RuntimeEvent::LlmRetry {
                                    agent_id: None,
                                    service,
                                    attempt,
                                    delay_ms,
                                    error,
                                });
                            }
                            Some(LlmEvent::CallFailed { service, code, error }) => {
                                events.publish(RuntimeEvent::LlmFailure {
                                    agent_id: None,
                                    service,
                                    code: code.to_string(),
                                    error,
                                });
                            }
                            Some(LlmEvent::CallAborted { .. }) => {}
                            None => break,
                        }
                    }
                }
            });
        }
    }

    /// Send a plain-text user message to root. Allocates a fresh task
    /// id and returns it.
    pub fn send_user_message(&self, text: impl Into<String>) -> Result<String> {
        self.send_user_payload(Payload::text(text))
    }

    /// Send a structured user payload to root under a fresh task id.
    pub fn send_user_payload(&self, payload: Payload) -> Result<String> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(AgoraError::Bus("runtime is shutting down".into()));
        }
        let task_id = format!("task-{}", &Uuid::new_v4().simple().to_string()[..8]);
        self.bus
            .send(SendMessage {
                from: USER_AGENT_ID.to_string(),
                to: ROOT_AGENT_ID.to_string(),
                payload,
                task_id: Some(task_id.clone()),
                deliver_at: None,
                message_type: None,
            })
            .map_err(|e| AgoraError::Bus(e.to_string()))?;
        Ok(task_id)
    }

    /// Next message addressed to the user, if any.
    pub fn next_user_message(&self) -> Option<Envelope> {
        self.bus.receive_next(USER_AGENT_ID)
    }

    /// Subscribe to the runtime event stream.
    pub fn events(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }

    /// Graceful shutdown: stop intake, let in-flight agents finish up
    /// to the grace deadline, snapshot state. A repeated call forces
    /// an immediate return.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            warn!("second shutdown request, forcing immediate exit");
            self.cancel.cancel();
            return;
        }

        info!("society shutting down");
        self.cancel.cancel();

        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.shutdown_grace_secs);
        loop {
            let busy = self.agents.live_agent_ids().into_iter().any(|id| {
                matches!(
                    self.agents.status(&id),
                    Some(
                        agora_types::org::ComputeStatus::Processing
                            | agora_types::org::ComputeStatus::WaitingLlm
                    )
                )
            });
            if !busy || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if let Err(e) = self.conversations.snapshot_all() {
            warn!(error = %e, "final conversation snapshot failed");
        }
        info!("society stopped");
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// The runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The persistent org store.
    pub fn org(&self) -> &Arc<OrgStore> {
        &self.org
    }

    /// The message bus.
    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// The live agent manager.
    pub fn agents(&self) -> &Arc<AgentManager> {
        &self.agents
    }

    /// The conversation store.
    pub fn conversations(&self) -> &Arc<ConversationManager> {
        &self.conversations
    }

    /// The artifact store.
    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    /// The workspace manager.
    pub fn workspaces(&self) -> &Arc<WorkspaceManager> {
        &self.workspaces
    }

    /// The tool registry (catalogue plus module tools).
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }
}
