use std::sync::Arc;
use std::time::Duration;

use conversa_channels::{ChannelManager, InboundMessage, OutboundDispatcher, OutboundMessage};
use conversa_core::config::OrchestratorConfig;
use conversa_flow::{resume_on_timeout, step, ExecutorRegistry, FlowContext, RunStatus};
use conversa_persistence::{ConversationLog, FlowDefinitionStore, FlowRunStore, NewMessage, TrainingSampleStore};
use conversa_preferences::{parse_confirmation_reply, PreferenceEnricher};
use conversa_router::{IntentRouter, RouteDecision};
use conversa_sessions::{Session, SessionStore};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, instrument, warn};

use crate::error::{Result, ServiceError};

/// Per-recipient back-pressure: `queue` bounds how many inbound messages for
/// one recipient may be outstanding at once (§5), `lock` serializes their
/// processing so a recipient's turns are never interleaved (§8 invariant 1).
struct RecipientGate {
    lock: Mutex<()>,
    queue: Arc<Semaphore>,
}

/// Implements the 7-step pipeline from §4.7: normalize+touch session,
/// append the user turn, route (resume or start a flow), drive the flow
/// engine to its next suspend/terminal point, commit outbound in order,
/// append assistant turns, then fire-and-forget preference enrichment.
///
/// Grounded on the teacher's `pipeline::process_message_non_streaming` — one
/// shared function behind every channel, generalized here from a single LLM
/// turn to a full flow-engine drive loop.
pub struct ConversationService {
    sessions: Arc<dyn SessionStore>,
    channels: Arc<ChannelManager>,
    flows: Arc<FlowDefinitionStore>,
    runs: Arc<FlowRunStore>,
    conversation_log: Arc<ConversationLog>,
    training: Arc<TrainingSampleStore>,
    registry: Arc<ExecutorRegistry>,
    router: Arc<IntentRouter>,
    enricher: Arc<PreferenceEnricher>,
    soft_fail_text: String,
    rate_limited_text: String,
    step_deadline: Duration,
    queue_depth: usize,
    gates: DashMap<String, Arc<RecipientGate>>,
}

/// A pending-intent resumption replays the stashed text through the router
/// again; bound the number of hops so a misconfigured routing table (an
/// auth flow whose success state loops back into another auth detour) can
/// never spin forever.
const MAX_ROUTING_HOPS: u32 = 4;

impl ConversationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        channels: Arc<ChannelManager>,
        flows: Arc<FlowDefinitionStore>,
        runs: Arc<FlowRunStore>,
        conversation_log: Arc<ConversationLog>,
        training: Arc<TrainingSampleStore>,
        registry: Arc<ExecutorRegistry>,
        router: Arc<IntentRouter>,
        enricher: Arc<PreferenceEnricher>,
        config: &OrchestratorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            channels,
            flows,
            runs,
            conversation_log,
            training,
            registry,
            router,
            enricher,
            soft_fail_text: config.locale.soft_fail_text.clone(),
            rate_limited_text: config.locale.rate_limited_text.clone(),
            step_deadline: Duration::from_millis(config.session.step_deadline_ms),
            queue_depth: config.session.queue_depth,
            gates: DashMap::new(),
        })
    }

    fn gate_for(&self, recipient: &str) -> Arc<RecipientGate> {
        self.gates
            .entry(recipient.to_string())
            .or_insert_with(|| {
                Arc::new(RecipientGate {
                    lock: Mutex::new(()),
                    queue: Arc::new(Semaphore::new(self.queue_depth)),
                })
            })
            .clone()
    }

    /// Entry point every channel adapter calls with its normalized message.
    /// Enforces the per-recipient queue depth and the wall-clock deadline;
    /// both failure modes degrade to a soft-fail reply rather than an error
    /// surfaced to the caller, since the caller has already accepted the
    /// webhook/socket frame and has nothing useful to do with an `Err` here.
    #[instrument(skip(self, msg), fields(recipient = %msg.recipient_id, platform = %msg.platform))]
    pub async fn handle_inbound(&self, msg: InboundMessage) -> Result<()> {
        let recipient = msg.recipient_id.clone();
        let platform = msg.platform;
        let gate = self.gate_for(&recipient);

        let permit = match gate.queue.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(recipient = %recipient, "recipient queue full, soft-rejecting");
                self.reply_text(platform, &recipient, &self.rate_limited_text).await;
                return Ok(());
            }
        };

        let _serialize = gate.lock.lock().await;
        let outcome = tokio::time::timeout(self.step_deadline, self.process(msg)).await;
        drop(permit);

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                error!(recipient = %recipient, error = %err, "conversation pipeline failed");
                self.reply_text(platform, &recipient, &self.soft_fail_text).await;
                Ok(())
            }
            Err(_elapsed) => {
                error!(
                    recipient = %recipient,
                    ms = self.step_deadline.as_millis() as u64,
                    "inbound handling exceeded its deadline"
                );
                self.reply_text(platform, &recipient, &self.soft_fail_text).await;
                Ok(())
            }
        }
    }

    async fn reply_text(&self, platform: conversa_core::Platform, recipient: &str, text: &str) {
        let dispatcher = OutboundDispatcher::new(&self.channels);
        if let Err(err) = dispatcher.send_text(platform, recipient, text).await {
            warn!(recipient = %recipient, error = %err, "failed to deliver soft-fail reply");
        }
    }

    async fn process(&self, msg: InboundMessage) -> Result<()> {
        let recipient = msg.recipient_id.clone();
        let platform = msg.platform;
        let text = msg.effective_text().to_string();

        let mut session = self.sessions.get_or_create(&recipient, platform).await;
        session.set_platform(platform);
        self.sessions.touch(&recipient).await;

        self.conversation_log.append(NewMessage {
            session_id: &recipient,
            recipient_id: &recipient,
            role: "user",
            content: &text,
            ..Default::default()
        })?;

        if let Some(full_key) = session.pending_preference_confirmation() {
            if let Some(accepted) = parse_confirmation_reply(&text) {
                return self.settle_preference_confirmation(session, platform, &recipient, full_key, accepted).await;
            }
        }

        let in_flight = self.runs.in_flight_for_session(&recipient)?;
        let mut active_ctx = self.reconcile_active_run(&mut session, in_flight)?;

        let outbound = self.route_and_drive(&mut session, &mut active_ctx, &msg, &text).await?;

        let dispatcher = OutboundDispatcher::new(&self.channels);
        for out in &outbound {
            dispatcher.dispatch(platform, &recipient, out.clone()).await?;
            self.log_assistant_turn(&recipient, out)?;
        }

        let classification = session.data.get("last_classification").cloned();
        self.sessions.put(session.clone()).await;

        if let Some(classification) = classification {
            self.record_training_sample(&text, &classification);
        }

        if session.authenticated() {
            if let Some(user_id) = session.user_id().map(str::to_string) {
                let enricher = self.enricher.clone();
                let history = session.conversation_history();
                let enrich_text = text.clone();
                let sessions = self.sessions.clone();
                let channels = self.channels.clone();
                let recipient = recipient.clone();
                tokio::spawn(async move {
                    let outcome = match enricher.enrich(&user_id, &enrich_text, &history).await {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            warn!(user_id = %user_id, error = %err, "preference enrichment failed");
                            return;
                        }
                    };

                    // Only one confirmation can be outstanding per session
                    // (§3.1 tracks a single `pending_preference_confirmation`
                    // key); any further questions from this pass wait for
                    // the next enrichment pass once this one is settled.
                    let Some(question) = outcome.pending_questions.into_iter().next() else { return };
                    let Some(mut session) = sessions.get(&recipient).await else { return };
                    session.set_pending_preference_confirmation(question.full_key);
                    sessions.put(session).await;

                    let dispatcher = OutboundDispatcher::new(&channels);
                    if let Err(err) = dispatcher.send_text(platform, &recipient, &question.question).await {
                        warn!(recipient = %recipient, error = %err, "failed to deliver preference confirmation question");
                    }
                });
            }
        }

        Ok(())
    }

    /// Resolve a reply to a pending preference confirmation question (§4.8
    /// step 3) outside normal routing entirely — it's a yes/no answer to
    /// the enricher, not an intent for the router or an in-flight flow.
    async fn settle_preference_confirmation(
        &self,
        mut session: Session,
        platform: conversa_core::Platform,
        recipient: &str,
        full_key: String,
        accepted: bool,
    ) -> Result<()> {
        session.clear_pending_preference_confirmation();
        if let Some(user_id) = session.user_id().map(str::to_string) {
            if let Err(err) = self.enricher.confirm(&user_id, &full_key, accepted).await {
                warn!(user_id = %user_id, key = %full_key, error = %err, "failed to settle preference confirmation");
            }
        }

        let ack = if accepted { "Got it, saved." } else { "No problem, I won't save that." };
        let dispatcher = OutboundDispatcher::new(&self.channels);
        dispatcher.send_text(platform, recipient, ack).await?;
        self.log_assistant_turn(recipient, &OutboundMessage::Text { text: ack.to_string() })?;

        self.sessions.put(session).await;
        Ok(())
    }

    /// Reconcile the session's idea of its active run with what persistence
    /// actually has in flight. A mismatch means the in-memory session was
    /// recreated (TTL sweep or node restart) while a run was still
    /// suspended — mark it `abandoned` (§8 boundary behavior 11) rather than
    /// silently resuming a run the session no longer remembers starting.
    fn reconcile_active_run(&self, session: &mut Session, in_flight: Option<FlowContext>) -> Result<Option<FlowContext>> {
        match (in_flight, session.active_run_id()) {
            (Some(run), Some(active_id)) if run.run_id.as_str() == active_id => Ok(Some(run)),
            (Some(run), _) => {
                self.runs.mark_abandoned(run.run_id.as_str())?;
                session.clear_active_run_id();
                Ok(None)
            }
            (None, Some(_)) => {
                session.clear_active_run_id();
                Ok(None)
            }
            (None, None) => Ok(None),
        }
    }

    /// Route `text`, then drive whatever the router decided: resume the
    /// in-flight run, start a new one (following a pending-intent
    /// resumption through to its own decision if the started flow
    /// completes), or simply hand back a clarification/no-op prompt.
    async fn route_and_drive(
        &self,
        session: &mut Session,
        active_ctx: &mut Option<FlowContext>,
        msg: &InboundMessage,
        text: &str,
    ) -> Result<Vec<OutboundMessage>> {
        let mut outbound = Vec::new();
        let mut decision = self.router.route(text, session, active_ctx.as_mut()).await?;

        // An escape word cancels `active_ctx` in place (§4.6 step 1); persist
        // that cancellation now rather than leaving it implicit.
        if let Some(cancelled) = active_ctx.as_ref() {
            if cancelled.is_terminal() {
                self.runs.save(cancelled)?;
                session.clear_active_run_id();
            }
        }
        let mut resumed_ctx = active_ctx.take();

        for _hop in 0..MAX_ROUTING_HOPS {
            match decision {
                RouteDecision::ResumeFlow { run_id, .. } => {
                    let mut run_ctx = resumed_ctx
                        .take()
                        .ok_or_else(|| ServiceError::MissingRunContext(run_id.clone()))?;
                    let flow = self
                        .flows
                        .get(&run_ctx.flow_id)?
                        .ok_or_else(|| ServiceError::UnknownFlow(run_ctx.flow_id.clone()))?;
                    let step_outbound = step(&flow, &self.registry, &mut run_ctx, None, Some(msg.clone())).await?;
                    outbound.extend(step_outbound);
                    self.after_step(session, &mut run_ctx)?;
                    return Ok(outbound);
                }
                RouteDecision::StartFlow { flow_id, initial_context } => {
                    let flow = self
                        .flows
                        .get(&flow_id)?
                        .ok_or_else(|| ServiceError::UnknownFlow(flow_id.clone()))?;
                    let mut run_ctx = FlowContext::new(
                        flow.id.clone(),
                        flow.version,
                        session.recipient_id.clone(),
                        flow.initial_state.clone(),
                    );
                    if let Some(obj) = initial_context.as_object() {
                        for (key, value) in obj {
                            run_ctx.set_path(key, value.clone());
                        }
                    }
                    if let Some(user_id) = session.user_id() {
                        run_ctx.user_id = Some(user_id.to_string());
                    }

                    let step_outbound = step(&flow, &self.registry, &mut run_ctx, None, None).await?;
                    outbound.extend(step_outbound);
                    let completed = run_ctx.status == RunStatus::Completed;
                    self.after_step(session, &mut run_ctx)?;

                    if completed {
                        if let Some(resume_result) = self.router.resume_pending_intent(session).await {
                            decision = resume_result?;
                            resumed_ctx = None;
                            continue;
                        }
                    }
                    return Ok(outbound);
                }
                RouteDecision::AskClarification { prompt } | RouteDecision::NoOp { prompt } => {
                    outbound.push(OutboundMessage::Text { text: prompt });
                    return Ok(outbound);
                }
            }
        }

        warn!(recipient = %session.recipient_id, "pending-intent resumption exceeded its hop budget");
        Ok(outbound)
    }

    /// Persist the run and reflect its terminal/non-terminal status back
    /// onto the session's `active_run_id` (§4.7 step 3/4), then project any
    /// `session` executor output the step produced onto the real `Session`
    /// (§4.1) — the only path by which a flow can authenticate a session or
    /// bind its `user_id`/`module`/`location`.
    fn after_step(&self, session: &mut Session, ctx: &mut FlowContext) -> Result<()> {
        self.runs.save(ctx)?;
        apply_session_projection(session, ctx);
        if ctx.is_terminal() {
            session.clear_active_run_id();
        } else {
            session.set_active_run_id(ctx.run_id.as_str());
        }
        Ok(())
    }

    fn log_assistant_turn(&self, recipient: &str, msg: &OutboundMessage) -> Result<()> {
        let content = render_for_log(msg);
        self.conversation_log.append(NewMessage {
            session_id: recipient,
            recipient_id: recipient,
            role: "assistant",
            content: &content,
            ..Default::default()
        })?;
        Ok(())
    }

    fn record_training_sample(&self, text: &str, classification: &Value) {
        let intent = classification.get("intent").and_then(Value::as_str).unwrap_or("unknown");
        let confidence = classification.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);
        let language = classification.get("language").and_then(Value::as_str);
        let entities = classification.get("entities").cloned().unwrap_or_else(|| Value::Array(Vec::new()));
        if let Err(err) = self.training.append(text, intent, entities, language, confidence, "conversation") {
            warn!(error = %err, "failed to record training sample");
        }
    }

    /// Timeout tick (§4.5): re-enter every suspended run whose current
    /// `input` state's `timeout_seconds` has elapsed, synthesizing a
    /// `timeout` event. Intended to be polled roughly once a second by the
    /// gateway's tick loop.
    #[instrument(skip(self))]
    pub async fn resume_timed_out_runs(&self) -> Result<()> {
        let now = conversa_core::now_rfc3339();
        let candidates = self.runs.suspended_before(&now)?;

        for mut ctx in candidates {
            let Some(flow) = self.flows.get(&ctx.flow_id)? else { continue };
            let Some(state) = flow.state(&ctx.current_state) else { continue };
            let Some(timeout_secs) = state.timeout_seconds else { continue };
            if !past_deadline(&ctx.updated_at, timeout_secs) {
                continue;
            }

            let recipient = ctx.session_id.clone();
            let outbound = match resume_on_timeout(&flow, &self.registry, &mut ctx).await {
                Ok(outbound) => outbound,
                Err(err) => {
                    warn!(run_id = %ctx.run_id, error = %err, "timeout resume failed");
                    ctx.fail("timeout_resume_error", err.to_string());
                    self.runs.save(&ctx)?;
                    continue;
                }
            };
            self.runs.save(&ctx)?;

            if let Some(mut session) = self.sessions.get(&recipient).await {
                if ctx.is_terminal() {
                    session.clear_active_run_id();
                }
                let platform = session.platform();
                self.sessions.put(session).await;

                if let Some(platform) = platform {
                    let dispatcher = OutboundDispatcher::new(&self.channels);
                    for out in &outbound {
                        if let Err(err) = dispatcher.dispatch(platform, &recipient, out.clone()).await {
                            warn!(recipient = %recipient, error = %err, "failed delivering timeout reply");
                        }
                        if let Err(err) = self.log_assistant_turn(&recipient, out) {
                            warn!(recipient = %recipient, error = %err, "failed logging timeout reply");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Reads the reserved `session` variables namespace the `session` executor
/// writes (`FlowContext::merge_session`) and projects each recognized key
/// onto the session's typed setters. Unrecognized keys are ignored rather
/// than dumped into `session.data` verbatim — this bridge is deliberately
/// narrow to the keys §3.1 names as session-resident.
fn apply_session_projection(session: &mut Session, ctx: &FlowContext) {
    let Some(patch) = ctx.variables.get("session").and_then(Value::as_object) else { return };

    if let Some(v) = patch.get("authenticated").and_then(Value::as_bool) {
        session.set_authenticated(v);
    }
    if let Some(v) = patch.get("user_id").and_then(Value::as_str) {
        session.set_user_id(v.to_string());
    }
    if let Some(v) = patch.get("auth_token").and_then(Value::as_str) {
        session.set_auth_token(v.to_string());
    }
    if let Some(v) = patch.get("phone").and_then(Value::as_str) {
        session.set_phone(v.to_string());
    }
    if let Some(v) = patch.get("module").and_then(Value::as_str) {
        session.set_module(v.to_string());
    }
    if let Some(location) = patch.get("location").and_then(|v| serde_json::from_value::<conversa_sessions::Location>(v.clone()).ok()) {
        session.set_location(location);
    }
}

fn render_for_log(msg: &OutboundMessage) -> String {
    match msg {
        OutboundMessage::Text { text } => text.clone(),
        OutboundMessage::Image { url, caption } => caption.clone().unwrap_or_else(|| url.clone()),
        OutboundMessage::Buttons { text, .. } => text.clone(),
        OutboundMessage::List { text, .. } => text.clone(),
        OutboundMessage::LocationRequest { text } => text.clone(),
    }
}

fn past_deadline(updated_at: &str, timeout_secs: u64) -> bool {
    let Ok(updated) = chrono::DateTime::parse_from_rfc3339(updated_at) else {
        return false;
    };
    let age = chrono::Utc::now().signed_duration_since(updated.with_timezone(&chrono::Utc));
    age >= chrono::Duration::seconds(timeout_secs as i64)
}
