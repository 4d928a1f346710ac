//! The durable conversation loop.
//!
//! One orchestrator owns one conversation. It is the sole writer of the
//! conversation's state: inbound signals are funneled through a
//! single-consumer channel and applied only at checkpoints, so the loop never
//! observes a torn update and never needs locks around `pending` or the exit
//! flags.
//!
//! Checkpoints, in loop order:
//!   1. loop top — the only blocking wait, and the only place exit is honored
//!   2. before each thought
//!   3. after an answer
//!   4. after an observation
//!
//! When the context outgrows its token budget (or the host hints that a
//! restart is due), the loop ends the current generation: it compacts the
//! context, serializes a continuation payload, and seeds a fresh generation
//! from it. The conversation survives the restart; the bloated context does
//! not.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use loomline_config::AppConfig;
use loomline_core::{
    ContextEntry, ContextLog, Error, MessageStore, PendingMessage, ReasoningBackend, RetryPolicy,
    Signal, StepError, ThoughtOutcome, ToolDispatcher, WorkflowId,
};
use loomline_routing::ResponseRouter;

use crate::budget::TokenBudgetMonitor;
use crate::compact::Compactor;
use crate::step::ReasoningStep;

/// Everything a successor generation needs to pick up the conversation.
///
/// Serialized across the generation boundary, so it must stay a plain data
/// value: the compacted context, messages not yet drained into it, and
/// whether an exit was already requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuationPayload {
    pub context: Vec<ContextEntry>,
    pub pending: Vec<PendingMessage>,
    pub exit_requested: bool,
}

/// How a single generation ended.
#[derive(Debug)]
enum GenerationOutcome {
    /// Restart with this payload.
    Continuation(ContinuationPayload),

    /// The conversation is over.
    Exit,
}

/// The state machine for one conversation.
pub struct ConversationOrchestrator {
    workflow: WorkflowId,
    config: AppConfig,

    rx: mpsc::Receiver<Signal>,
    context: Arc<ContextLog>,
    pending: Vec<PendingMessage>,
    exit_requested: bool,
    continuation_requested: bool,
    generation: u64,

    step: ReasoningStep,
    compactor: Compactor,
    budget: TokenBudgetMonitor,
    fast_policy: RetryPolicy,
    store: Arc<dyn MessageStore>,
    router: Arc<ResponseRouter>,
}

impl ConversationOrchestrator {
    /// Spawn the orchestrator task for a conversation and return its handle.
    pub fn spawn(
        workflow: WorkflowId,
        config: AppConfig,
        backend: Arc<dyn ReasoningBackend>,
        dispatcher: Arc<dyn ToolDispatcher>,
        store: Arc<dyn MessageStore>,
        router: Arc<ResponseRouter>,
    ) -> OrchestratorHandle {
        let (tx, rx) = mpsc::channel(config.signal_buffer);
        let context = Arc::new(ContextLog::new());
        let budget = TokenBudgetMonitor::new(config.token_limit);
        let continuation_hint = budget.hint_handle();

        let step = ReasoningStep::new(
            backend.clone(),
            dispatcher,
            config.retry.reasoning.to_policy(),
            config.retry.observation.to_policy(),
        );
        let compactor = Compactor::new(
            backend,
            config.retry.observation.to_policy(),
            config.keep_recent,
        );
        let fast_policy = config.retry.fast.to_policy();

        let orchestrator = Self {
            workflow,
            config,
            rx,
            context: context.clone(),
            pending: Vec::new(),
            exit_requested: false,
            continuation_requested: false,
            generation: 0,
            step,
            compactor,
            budget,
            fast_policy,
            store,
            router,
        };

        let join = tokio::spawn(orchestrator.run());
        OrchestratorHandle {
            tx,
            context,
            continuation_hint,
            join,
        }
    }

    /// Run generations until the conversation exits.
    ///
    /// The continuation payload crosses the generation boundary in serialized
    /// form; a payload that cannot round-trip would strand the conversation,
    /// so it is exercised on every restart rather than trusted.
    async fn run(mut self) -> Result<(), Error> {
        info!(workflow = %self.workflow.encode(), "Conversation started");
        loop {
            match self.run_generation().await? {
                GenerationOutcome::Exit => {
                    info!(
                        workflow = %self.workflow.encode(),
                        generation = self.generation,
                        "Conversation exited"
                    );
                    return Ok(());
                }
                GenerationOutcome::Continuation(payload) => {
                    let raw = serde_json::to_string(&payload)?;
                    let payload: ContinuationPayload = serde_json::from_str(&raw)?;
                    self.seed(payload).await;
                }
            }
        }
    }

    /// Seed a fresh generation from a continuation payload.
    async fn seed(&mut self, payload: ContinuationPayload) {
        self.context.replace(payload.context).await;
        self.pending = payload.pending;
        self.exit_requested = payload.exit_requested;
        self.continuation_requested = false;
        self.budget.hint_handle().store(false, Ordering::Relaxed);
        self.generation += 1;
        let context_len = self.context.len().await;
        info!(
            workflow = %self.workflow.encode(),
            generation = self.generation,
            context_len,
            "Generation restarted from continuation"
        );
    }

    /// One generation of the conversation loop.
    async fn run_generation(&mut self) -> Result<GenerationOutcome, Error> {
        loop {
            // ── loop-top checkpoint ──
            self.drain_ready_signals().await;

            if self.exit_requested {
                return Ok(GenerationOutcome::Exit);
            }
            if self.continuation_requested {
                let payload = self.continuation_payload().await?;
                return Ok(GenerationOutcome::Continuation(payload));
            }

            if self.pending.is_empty() {
                // The only blocking wait. A closed channel means the handle
                // is gone and nothing can ever wake us again.
                match self.rx.recv().await {
                    Some(signal) => {
                        self.apply_signal(signal).await;
                        continue;
                    }
                    None => {
                        debug!("Signal channel closed, exiting");
                        return Ok(GenerationOutcome::Exit);
                    }
                }
            }

            self.drain_pending().await?;
            self.reason_until_answer().await?;
        }
    }

    /// Think (and act) until the backend produces a final answer, the chain
    /// cap is hit, or a checkpoint asks the generation to wind down.
    async fn reason_until_answer(&mut self) -> Result<(), Error> {
        for _ in 0..self.config.max_chain_steps {
            // ── pre-thought checkpoint ──
            self.drain_ready_signals().await;
            self.drain_pending().await?;

            let snapshot = self.context.snapshot().await;
            let result = self.step.thought(&snapshot).await.map_err(Error::Step)?;
            self.context
                .append(ContextEntry::thought(result.reasoning))
                .await;

            match result.outcome {
                ThoughtOutcome::Answer { text } => {
                    self.deliver_answer(&text).await?;
                    // ── post-answer checkpoint ──
                    self.checkpoint().await;
                    return Ok(());
                }
                ThoughtOutcome::Action {
                    tool,
                    reason,
                    input,
                } => {
                    self.context
                        .append(ContextEntry::action(&tool, &reason, &input))
                        .await;

                    let raw = self.step.action(&tool, &input).await;
                    let snapshot = self.context.snapshot().await;
                    let observed = self
                        .step
                        .observation(&snapshot, &raw)
                        .await
                        .map_err(Error::Step)?;
                    self.context
                        .append(ContextEntry::observation(observed))
                        .await;

                    // ── post-observation checkpoint ──
                    self.checkpoint().await;
                    if self.continuation_requested || self.exit_requested {
                        return Ok(());
                    }
                }
            }
        }

        warn!(
            max_chain_steps = self.config.max_chain_steps,
            "Reasoning chain cap reached without an answer"
        );
        self.deliver_answer(
            "I wasn't able to finish that within my step limit. \
             Please rephrase or break the request into smaller parts.",
        )
        .await?;
        self.checkpoint().await;
        Ok(())
    }

    /// Persist an answer, record it in the context, then broadcast it.
    ///
    /// Persistence comes first: an answer that reached the user but not the
    /// audit log would vanish from history.
    async fn deliver_answer(&mut self, text: &str) -> Result<(), Error> {
        self.persist("assistant", text).await?;
        self.context.append(ContextEntry::answer(text)).await;
        self.router.handle(&self.workflow.encode(), text).await?;
        Ok(())
    }

    /// Drain queued messages into the context in arrival order.
    async fn drain_pending(&mut self) -> Result<(), Error> {
        for message in std::mem::take(&mut self.pending) {
            self.persist(&message.author, &message.text).await?;
            self.context
                .append(ContextEntry::user_message(
                    message.author,
                    message.text,
                    message.received_at,
                ))
                .await;
        }
        Ok(())
    }

    /// Persist one message under the fast retry policy.
    async fn persist(&self, author: &str, text: &str) -> Result<(), Error> {
        let store = self.store.clone();
        let workflow = self.workflow.clone();
        let author = author.to_string();
        let text = text.to_string();
        let timestamp = chrono::Utc::now();

        self.fast_policy
            .run("persist", move || {
                let store = store.clone();
                let workflow = workflow.clone();
                let author = author.clone();
                let text = text.clone();
                async move {
                    store
                        .persist(&workflow, &author, &text, timestamp)
                        .await
                        .map_err(|e| StepError::Backend(e.to_string()))
                }
            })
            .await
            .map_err(Error::Step)
    }

    /// Apply every signal that is already waiting, without blocking.
    async fn drain_ready_signals(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(signal) => self.apply_signal(signal).await,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.exit_requested = true;
                    break;
                }
            }
        }
    }

    /// Apply one signal to the conversation state.
    async fn apply_signal(&mut self, signal: Signal) {
        match signal {
            Signal::NewMessage {
                author,
                text,
                timestamp,
            } => {
                debug!(author = %author, "Queued message");
                self.pending.push(PendingMessage {
                    author,
                    text,
                    received_at: timestamp,
                });
            }
            Signal::ExternalContext {
                author,
                content,
                timestamp,
            } => {
                self.context
                    .append(ContextEntry::external_context(author, content, timestamp))
                    .await;
            }
            Signal::ExternalArtifact {
                reference,
                description,
                mimetype,
                timestamp,
            } => {
                self.context
                    .append(ContextEntry::external_artifact(
                        &reference,
                        &description,
                        &mimetype,
                        timestamp,
                    ))
                    .await;
            }
            Signal::RequestExit => {
                info!("Exit requested");
                self.exit_requested = true;
            }
            Signal::RequestContinuation => {
                info!("Continuation requested");
                self.continuation_requested = true;
            }
            Signal::ClearContext => {
                info!("Context cleared");
                self.context.replace(Vec::new()).await;
            }
        }
    }

    /// Non-blocking checkpoint after an answer or observation: pick up any
    /// waiting signals and decide whether this generation should wind down.
    async fn checkpoint(&mut self) {
        self.drain_ready_signals().await;

        if self.continuation_requested {
            return;
        }
        let entries = self.context.snapshot().await;
        // A context at or below the recency window has nothing to compact,
        // whatever the budget says.
        if entries.len() > self.compactor.keep_recent() && self.budget.compaction_required(&entries)
        {
            info!(
                context_len = entries.len(),
                limit = self.budget.limit(),
                hinted = self.budget.continuation_suggested(),
                "Context over budget, scheduling continuation"
            );
            self.continuation_requested = true;
        }
    }

    /// Compact the context and package the generation's remaining state.
    async fn continuation_payload(&mut self) -> Result<ContinuationPayload, Error> {
        let entries = self.context.snapshot().await;
        let compacted = self.compactor.compact(&entries).await.map_err(Error::Step)?;
        Ok(ContinuationPayload {
            context: compacted.entries,
            pending: std::mem::take(&mut self.pending),
            exit_requested: self.exit_requested,
        })
    }
}

/// Caller-side handle to a running conversation.
///
/// Cloning the sender is cheap; the context reference allows lock-free-ish
/// queries (a read lock) without going through the signal channel.
pub struct OrchestratorHandle {
    tx: mpsc::Sender<Signal>,
    context: Arc<ContextLog>,
    continuation_hint: Arc<AtomicBool>,
    join: JoinHandle<Result<(), Error>>,
}

impl OrchestratorHandle {
    /// A cloneable sender for enqueueing signals from other tasks.
    pub fn sender(&self) -> mpsc::Sender<Signal> {
        self.tx.clone()
    }

    /// Enqueue a raw signal.
    pub async fn signal(&self, signal: Signal) -> Result<(), Error> {
        self.tx
            .send(signal)
            .await
            .map_err(|_| Error::Internal("conversation has exited".into()))
    }

    /// Enqueue a user message.
    pub async fn new_message(&self, author: &str, text: &str) -> Result<(), Error> {
        self.signal(Signal::NewMessage {
            author: author.to_string(),
            text: text.to_string(),
            timestamp: chrono::Utc::now(),
        })
        .await
    }

    /// Inject out-of-band context.
    pub async fn external_context(&self, author: &str, content: &str) -> Result<(), Error> {
        self.signal(Signal::ExternalContext {
            author: author.to_string(),
            content: content.to_string(),
            timestamp: chrono::Utc::now(),
        })
        .await
    }

    /// Inject an external artifact reference.
    pub async fn external_artifact(
        &self,
        reference: &str,
        description: &str,
        mimetype: &str,
    ) -> Result<(), Error> {
        self.signal(Signal::ExternalArtifact {
            reference: reference.to_string(),
            description: description.to_string(),
            mimetype: mimetype.to_string(),
            timestamp: chrono::Utc::now(),
        })
        .await
    }

    /// Request a cooperative exit.
    pub async fn request_exit(&self) -> Result<(), Error> {
        self.signal(Signal::RequestExit).await
    }

    /// Request a compaction and generation restart.
    pub async fn request_continuation(&self) -> Result<(), Error> {
        self.signal(Signal::RequestContinuation).await
    }

    /// Wipe the conversation context.
    pub async fn clear_context(&self) -> Result<(), Error> {
        self.signal(Signal::ClearContext).await
    }

    /// Snapshot of the current context entries.
    ///
    /// Reads the shared log directly; safe while the loop is mid-step.
    pub async fn entries(&self) -> Vec<ContextEntry> {
        self.context.snapshot().await
    }

    /// Rendered context, one tagged block per entry.
    pub async fn rendered(&self) -> Vec<String> {
        self.context.rendered().await
    }

    /// Flag the host sets to suggest a continuation at the next checkpoint.
    pub fn continuation_hint(&self) -> Arc<AtomicBool> {
        self.continuation_hint.clone()
    }

    /// Wait for the conversation to finish.
    pub async fn join(self) -> Result<(), Error> {
        drop(self.tx);
        self.join
            .await
            .map_err(|e| Error::Internal(format!("orchestrator task panicked: {e}")))?
    }
}
