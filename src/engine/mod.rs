//! # Conversation Engine
//!
//! The inbound pipeline and conversation state machine. One webhook delivery
//! runs through, strictly in order: payload parse, channel resolution,
//! signature verification, client resolution, lead resolve/create (reopen
//! cooldown), rate limit, idempotent message ingestion, suppression,
//! step binding, safety guard, option resolution, state transition, and
//! exactly one outbound reply.
//!
//! Soft outcomes come back as [`TurnOutcome`]; only authentication and
//! downstream-dependency failures surface as [`EngineError`].

pub mod outcome;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::{ClassificationRequest, ClassifierOption, OptionClassifier};
use crate::config::AppConfig;
use crate::crypto::{CryptoError, CryptoKey, decrypt_channel_secrets};
use crate::error::{ApiError, provider_error, unauthorized};
use crate::flow::{
    self, RenderConfig, clamp_score, extract_direct_option, format_handoff_message,
    format_out_of_scope_message, matches_phrase_set, normalize_input, render_options_list,
    render_step_prompt,
};
use crate::mailer::LeadNotifier;
use crate::models::client::Model as ClientModel;
use crate::models::flow::Model as FlowModel;
use crate::models::flow_step::Model as StepModel;
use crate::models::flow_step_option::Model as OptionModel;
use crate::models::lead::{self, Model as LeadModel};
use crate::models::{
    ConversationStatus, EscalationReason, MappingSource, MessageDirection, RoutingState,
    to_db_time,
};
use crate::repositories::{
    ChannelRepository, ClientRepository, EventRepository, FlowRepository, InsertOutcome,
    LeadRepository, MessageRepository, NewLead, NewMessage, ReminderJobRepository,
};
use crate::repositories::events::NewEvent;
use crate::server::AppState;
use crate::wa::{SendCredentials, SendError, WhatsAppSender};
use crate::webhook_verification::{VerificationError, verify_meta_signature};

pub use outcome::{IgnoreReason, TurnOutcome};

/// Errors that abort a turn.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("webhook signature rejected: {0}")]
    Unauthorized(#[from] VerificationError),
    #[error("channel secret unusable: {0}")]
    ChannelSecret(#[from] CryptoError),
    #[error("storage operation failed: {0}")]
    Database(#[from] DbErr),
    #[error("outbound send failed: {0}")]
    Send(#[from] SendError),
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Unauthorized(err) => unauthorized(Some(&err.to_string())),
            EngineError::ChannelSecret(err) => {
                tracing::error!(error = %err, "Channel secret could not be decrypted");
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Channel secret unusable",
                )
            }
            EngineError::Database(err) => err.into(),
            EngineError::Send(err) => {
                let status = err.upstream_status().unwrap_or(0);
                provider_error("whatsapp".to_string(), status, Some(err.to_string()))
            }
        }
    }
}

/// One parsed inbound delivery
#[derive(Debug, Clone)]
pub struct InboundDelivery {
    pub phone_number_id: String,
    pub wa_user_id: String,
    pub text: String,
    pub wa_message_id: Option<String>,
    pub wa_profile_name: Option<String>,
    pub raw_payload: JsonValue,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(default)]
    entry: Vec<WebhookEntry>,
}

#[derive(Debug, Deserialize)]
struct WebhookEntry {
    #[serde(default)]
    changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
struct WebhookChange {
    value: Option<WebhookValue>,
}

#[derive(Debug, Deserialize)]
struct WebhookValue {
    metadata: Option<WebhookMetadata>,
    #[serde(default)]
    contacts: Vec<WebhookContact>,
    #[serde(default)]
    messages: Vec<WebhookMessage>,
}

#[derive(Debug, Deserialize)]
struct WebhookMetadata {
    phone_number_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookContact {
    profile: Option<WebhookProfile>,
}

#[derive(Debug, Deserialize)]
struct WebhookProfile {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookMessage {
    from: Option<String>,
    id: Option<String>,
    text: Option<WebhookText>,
}

#[derive(Debug, Deserialize)]
struct WebhookText {
    body: Option<String>,
}

/// Parse a raw webhook body into an inbound delivery.
///
/// Anything that does not carry a destination phone number id and a sender id
/// is unusable; the caller treats `None` as accept-and-ignore.
pub fn parse_inbound(raw_body: &[u8]) -> Option<InboundDelivery> {
    let raw_payload: JsonValue = serde_json::from_slice(raw_body).ok()?;
    let envelope: WebhookEnvelope = serde_json::from_value(raw_payload.clone()).ok()?;

    let value = envelope
        .entry
        .into_iter()
        .next()?
        .changes
        .into_iter()
        .next()?
        .value?;

    let phone_number_id = value.metadata.and_then(|m| m.phone_number_id)?;
    let message = value.messages.into_iter().next()?;
    let wa_user_id = message.from?;
    let text = message.text.and_then(|t| t.body).unwrap_or_default();
    let wa_profile_name = value
        .contacts
        .into_iter()
        .next()
        .and_then(|c| c.profile)
        .and_then(|p| p.name);

    Some(InboundDelivery {
        phone_number_id,
        wa_user_id,
        text,
        wa_message_id: message.id,
        wa_profile_name,
        raw_payload,
    })
}

struct TurnContext {
    client: ClientModel,
    credentials: SendCredentials,
    inbound: InboundDelivery,
}

/// The conversation processing engine.
pub struct ConversationEngine {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
    crypto_key: CryptoKey,
    sender: Arc<dyn WhatsAppSender>,
    classifier: Arc<dyn OptionClassifier>,
    notifier: Arc<dyn LeadNotifier>,
}

impl ConversationEngine {
    /// Build an engine from the shared application state.
    pub fn from_state(state: &AppState) -> Self {
        Self {
            db: state.db.clone(),
            config: Arc::clone(&state.config),
            crypto_key: state.crypto_key.clone(),
            sender: Arc::clone(&state.sender),
            classifier: Arc::clone(&state.classifier),
            notifier: Arc::clone(&state.notifier),
        }
    }

    /// Process one webhook delivery end to end.
    pub async fn process_delivery(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<TurnOutcome, EngineError> {
        let outcome = self.run_turn(raw_body, signature_header).await?;
        counter!("leadflow_turns_total", "outcome" => outcome.code()).increment(1);
        Ok(outcome)
    }

    async fn run_turn(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<TurnOutcome, EngineError> {
        let now = Utc::now();

        // 1. Parse payload
        let Some(inbound) = parse_inbound(raw_body) else {
            debug!("Webhook payload unusable; accepting and ignoring");
            return Ok(TurnOutcome::Ignored(IgnoreReason::InvalidPayload));
        };

        // 2. Resolve channel
        let channels = ChannelRepository::new(&self.db);
        let Some(channel) = channels
            .find_active_by_phone_number(&inbound.phone_number_id)
            .await?
        else {
            debug!(phone_number_id = %inbound.phone_number_id, "No active channel for delivery");
            return Ok(TurnOutcome::Ignored(IgnoreReason::UnknownChannel));
        };

        // 3. Verify signature with the channel's decrypted signing secret
        let (access_token, signing_secret) =
            decrypt_channel_secrets(&self.crypto_key, &channel)?;
        verify_meta_signature(raw_body, signature_header.unwrap_or(""), &signing_secret)?;

        // 4. Resolve client
        let clients = ClientRepository::new(&self.db);
        let Some(client) = clients.find_by_id(channel.client_id).await? else {
            warn!(client_id = %channel.client_id, "Channel points at a missing client");
            return Ok(TurnOutcome::Ignored(IgnoreReason::UnknownClient));
        };

        let credentials = SendCredentials {
            phone_number_id: channel.phone_number_id.clone(),
            access_token,
        };

        // 5. Resolve or create the lead
        let leads = LeadRepository::new(&self.db);
        let flows = FlowRepository::new(&self.db);
        let mut lead_just_created = false;

        let mut lead = match leads.find_open(client.id, &inbound.wa_user_id).await? {
            Some(existing) => existing,
            None => {
                let cooldown_cutoff =
                    now - Duration::seconds(self.config.engine.reopen_cooldown_seconds as i64);
                if leads
                    .closed_within(client.id, &inbound.wa_user_id, cooldown_cutoff)
                    .await?
                {
                    debug!(wa_user_id = %inbound.wa_user_id, "Reopen attempt within cooldown");
                    return Ok(TurnOutcome::Ignored(IgnoreReason::ReopenCooldown));
                }

                let Some((bundle_flow, first_step)) =
                    flows.active_flow_bundle(client.id).await?
                else {
                    return Ok(TurnOutcome::Ignored(IgnoreReason::NoActiveFlow));
                };

                let created = leads
                    .create(
                        NewLead {
                            client_id: client.id,
                            wa_user_id: inbound.wa_user_id.clone(),
                            wa_profile_name: inbound.wa_profile_name.clone(),
                            flow_id: bundle_flow.id,
                            current_step_id: first_step.id,
                        },
                        now,
                    )
                    .await?;

                self.schedule_reminder(&created, &bundle_flow, now).await?;
                lead_just_created = true;
                created
            }
        };

        // 6. Inbound rate limit over the rolling window
        let messages = MessageRepository::new(&self.db);
        let window_cutoff =
            now - Duration::seconds(self.config.engine.rate_limit_window_seconds as i64);
        let recent_inbound = messages.count_inbound_since(lead.id, window_cutoff).await?;
        if recent_inbound >= self.config.engine.rate_limit_max_messages {
            info!(lead_id = %lead.id, recent_inbound, "Lead rate-limited; ignoring delivery");
            return Ok(TurnOutcome::RateLimited);
        }

        // 7. Idempotent message ingestion
        let inserted = messages
            .insert_inbound(
                NewMessage {
                    client_id: client.id,
                    lead_id: lead.id,
                    direction: MessageDirection::Inbound,
                    phone_number_id: inbound.phone_number_id.clone(),
                    wa_message_id: inbound.wa_message_id.clone(),
                    text_content: inbound.text.clone(),
                    raw_payload: Some(inbound.raw_payload.clone()),
                },
                now,
            )
            .await?;
        if inserted == InsertOutcome::Duplicate {
            info!(lead_id = %lead.id, "Duplicate delivery short-circuited");
            return Ok(TurnOutcome::Deduplicated);
        }

        // 8. Non-ACTIVE leads suppress automated routing
        if lead.status() != ConversationStatus::Active {
            debug!(lead_id = %lead.id, status = %lead.conversation_status, "Routing suppressed");
            return Ok(TurnOutcome::Suppressed);
        }

        // 9. (Re)bind the lead to the active flow's first step if unbound
        if lead.flow_id.is_none() || lead.current_step_id.is_none() {
            let Some((bundle_flow, first_step)) = flows.active_flow_bundle(client.id).await?
            else {
                return Ok(TurnOutcome::Ignored(IgnoreReason::NoActiveFlow));
            };

            let update = lead::ActiveModel {
                id: Set(lead.id),
                flow_id: Set(Some(bundle_flow.id)),
                current_step_id: Set(Some(first_step.id)),
                updated_at: Set(to_db_time(now)),
                ..Default::default()
            };
            lead = update.update(&self.db).await?;
            self.schedule_reminder(&lead, &bundle_flow, now).await?;
        }

        let Some((active_flow, first_step)) = flows.active_flow_bundle(client.id).await? else {
            return Ok(TurnOutcome::Ignored(IgnoreReason::NoActiveFlow));
        };

        let Some(current_step_id) = lead.current_step_id else {
            return Ok(TurnOutcome::Ignored(IgnoreReason::InvalidStep));
        };
        let Some((step, options)) = flows.step_with_options(current_step_id).await? else {
            return Ok(TurnOutcome::Ignored(IgnoreReason::InvalidStep));
        };
        if options.is_empty() {
            warn!(step_id = %step.id, "Step has no options; ignoring delivery");
            return Ok(TurnOutcome::Ignored(IgnoreReason::InvalidStep));
        }

        let ctx = TurnContext {
            client,
            credentials,
            inbound,
        };

        // Fresh lead: welcome plus first prompt, nothing to resolve yet
        if lead_just_created {
            self.send_bot_message(&ctx, lead.id, &active_flow.welcome_message)
                .await?;
            let is_submenu = step.id != first_step.id;
            let prompt = render_step_prompt(
                &step.prompt_text,
                &options,
                RenderConfig {
                    include_back_to_main_menu: is_submenu,
                },
            );
            self.send_bot_message(&ctx, lead.id, &prompt).await?;
            return Ok(TurnOutcome::Started);
        }

        self.route_active_turn(ctx, lead, active_flow, first_step, step, options, now)
            .await
    }

    /// Steps 10-11 of the pipeline: safety guard, option resolution, state
    /// transition, and the single outbound reply for an established lead.
    #[allow(clippy::too_many_arguments)]
    async fn route_active_turn(
        &self,
        ctx: TurnContext,
        lead: LeadModel,
        active_flow: FlowModel,
        first_step: StepModel,
        step: StepModel,
        options: Vec<OptionModel>,
        now: DateTime<Utc>,
    ) -> Result<TurnOutcome, EngineError> {
        let messages = MessageRepository::new(&self.db);
        let events = EventRepository::new(&self.db);
        let flows = FlowRepository::new(&self.db);
        let is_submenu = step.id != first_step.id;

        // Safety pre-checks: total turns, then same-step loop
        let outbound_turns = messages.count_outbound(lead.id).await?;
        let same_step_events = events.count_for_step(lead.id, step.id).await?;
        if outbound_turns >= self.config.engine.max_bot_turns {
            let update = lead::ActiveModel {
                id: Set(lead.id),
                ..Default::default()
            };
            return self
                .escalate(&ctx, &lead, EscalationReason::SafetyMaxBotTurns, update, now)
                .await;
        }
        if same_step_events >= self.config.engine.max_same_step_events {
            let update = lead::ActiveModel {
                id: Set(lead.id),
                ..Default::default()
            };
            return self
                .escalate(&ctx, &lead, EscalationReason::SafetySameStepLoop, update, now)
                .await;
        }

        // Reentry sub-state: the message is a 0/1 choice, not a routing input
        if lead.routing() == RoutingState::AwaitingReentryChoice {
            return self
                .handle_reentry_choice(&ctx, &lead, &active_flow, now)
                .await;
        }

        // Explicit back-to-main-menu command on submenu steps
        if is_submenu && matches_phrase_set(&ctx.inbound.text, &self.config.engine.main_menu_phrases)
        {
            let first_options = flows.options_for_step(first_step.id).await?;
            self.reset_to_step(&lead, &active_flow, &first_step, now).await?;
            let reply = format!(
                "{}\n{}",
                flow::MAIN_MENU_PREFIX,
                render_options_list(&first_options, RenderConfig::default())
            );
            self.send_bot_message(&ctx, lead.id, &reply).await?;
            return Ok(TurnOutcome::BackToMainMenu);
        }

        // Resolution tier 1: deterministic direct match
        let mut selected = extract_direct_option(&ctx.inbound.text, &options).cloned();
        let mut mapping_source = MappingSource::DirectOption;
        let mut ai_summary: Option<String> = None;

        // Resolution tier 2: list-recovery shortcut; does not consume a
        // routing decision, so no step event is recorded
        if selected.is_none()
            && lead.irrelevant_streak > 0
            && matches_phrase_set(&ctx.inbound.text, &self.config.engine.options_list_phrases)
        {
            self.recover_streak(&lead, &active_flow, now).await?;
            let reply = format!(
                "{}\n{}",
                flow::RECOVERY_PREFIX,
                render_options_list(
                    &options,
                    RenderConfig {
                        include_back_to_main_menu: is_submenu,
                    }
                )
            );
            self.send_bot_message(&ctx, lead.id, &reply).await?;
            return Ok(TurnOutcome::RecoveredToOptions);
        }

        // Resolution tier 3: AI-assisted match, fail-closed
        if selected.is_none() {
            let classification = self
                .classifier
                .classify(&ClassificationRequest {
                    message_text: &ctx.inbound.text,
                    business_name: &ctx.client.name,
                    step_prompt: &step.prompt_text,
                    options: options
                        .iter()
                        .map(|o| ClassifierOption {
                            option_code: o.option_code.clone(),
                            label_text: o.label_text.clone(),
                        })
                        .collect(),
                })
                .await;

            ai_summary = classification.summary;

            if let Some(code) = classification.matched_code
                && let Some(by_code) = options.iter().find(|o| o.option_code == code)
            {
                selected = Some(by_code.clone());
                mapping_source = MappingSource::AiMapped;
            }
        }

        // Resolution tier 4: out of scope
        let Some(option) = selected else {
            return self
                .handle_out_of_scope(&ctx, &lead, &active_flow, &step, &options, is_submenu,
                    ai_summary, now)
                .await;
        };

        // A matched option is a routing decision; record it first
        events
            .record(
                NewEvent {
                    client_id: ctx.client.id,
                    lead_id: lead.id,
                    flow_id: step.flow_id,
                    step_id: step.id,
                    raw_user_text: ctx.inbound.text.clone(),
                    selected_option_id: Some(option.id),
                    mapping_source,
                    ai_summary: ai_summary.clone(),
                    ai_out_of_scope: false,
                },
                now,
            )
            .await?;

        let next_score = clamp_score(lead.score as i64 + option.score_delta as i64);
        let base_update = |lead_id: Uuid| lead::ActiveModel {
            id: Set(lead_id),
            score: Set(next_score),
            irrelevant_streak: Set(0),
            free_text_summary: Set(ai_summary.clone()),
            wa_profile_name: Set(lead
                .wa_profile_name
                .clone()
                .or_else(|| ctx.inbound.wa_profile_name.clone())),
            routing_state: Set(RoutingState::Routing.as_str().to_string()),
            last_user_message_at: Set(Some(to_db_time(now))),
            updated_at: Set(to_db_time(now)),
            ..Default::default()
        };

        // Post-resolution escalation triggers, in precedence order
        if option.is_contact_human {
            return self
                .escalate(&ctx, &lead, EscalationReason::UserRequest, base_update(lead.id), now)
                .await;
        }
        if next_score >= ctx.client.score_threshold {
            return self
                .escalate(&ctx, &lead, EscalationReason::ScoreThreshold, base_update(lead.id), now)
                .await;
        }

        // Terminal option: park the lead instead of closing
        if option.is_terminal {
            let mut update = base_update(lead.id);
            update.routing_state =
                Set(RoutingState::AwaitingReentryChoice.as_str().to_string());
            update.update(&self.db).await?;

            ReminderJobRepository::new(&self.db)
                .cancel_pending(lead.id, "lead parked on terminal option", now)
                .await?;

            self.send_bot_message(&ctx, lead.id, flow::TERMINAL_CHOICE_PROMPT)
                .await?;
            return Ok(TurnOutcome::TerminalChoiceRequested);
        }

        // Next step: explicit edge target, else linear next-by-order fallback
        let next_step = match option.next_step_id {
            Some(next_step_id) => flows.step_by_id(next_step_id).await?,
            None => flows.next_step_by_order(step.flow_id, step.step_order).await?,
        };

        let Some(next_step) = next_step else {
            return self
                .escalate(&ctx, &lead, EscalationReason::FlowCompleted, base_update(lead.id), now)
                .await;
        };

        let mut update = base_update(lead.id);
        update.current_step_id = Set(Some(next_step.id));
        let updated = update.update(&self.db).await?;
        self.schedule_reminder(&updated, &active_flow, now).await?;

        let next_options = flows.options_for_step(next_step.id).await?;
        let next_is_submenu = next_step.id != first_step.id;
        let prompt = render_step_prompt(
            &next_step.prompt_text,
            &next_options,
            RenderConfig {
                include_back_to_main_menu: next_is_submenu,
            },
        );
        self.send_bot_message(&ctx, lead.id, &prompt).await?;

        Ok(TurnOutcome::Advanced)
    }

    /// The parked 0/1 menu: "1" escalates, "0" resumes at the first step,
    /// anything else repeats the hint.
    async fn handle_reentry_choice(
        &self,
        ctx: &TurnContext,
        lead: &LeadModel,
        active_flow: &FlowModel,
        now: DateTime<Utc>,
    ) -> Result<TurnOutcome, EngineError> {
        let flows = FlowRepository::new(&self.db);
        let normalized = normalize_input(&ctx.inbound.text);

        if normalized == "1" {
            let update = lead::ActiveModel {
                id: Set(lead.id),
                last_user_message_at: Set(Some(to_db_time(now))),
                ..Default::default()
            };
            return self
                .escalate(ctx, lead, EscalationReason::ReentryEscalation, update, now)
                .await;
        }

        if normalized == "0" {
            let Some(flow_id) = lead.flow_id else {
                return Ok(TurnOutcome::Ignored(IgnoreReason::MissingFirstStep));
            };
            let Some(first_step) = flows.first_step(flow_id).await? else {
                return Ok(TurnOutcome::Ignored(IgnoreReason::MissingFirstStep));
            };
            let first_options = flows.options_for_step(first_step.id).await?;

            self.reset_to_step(lead, active_flow, &first_step, now).await?;

            let reply = format!(
                "{}\n{}",
                flow::REENTRY_RESET_PREFIX,
                render_options_list(&first_options, RenderConfig::default())
            );
            self.send_bot_message(ctx, lead.id, &reply).await?;
            return Ok(TurnOutcome::ReentryReset);
        }

        self.send_bot_message(ctx, lead.id, flow::REENTRY_HINT).await?;
        Ok(TurnOutcome::ReentryHint)
    }

    /// Out-of-scope input: audit it, then either close the lead at the streak
    /// limit or reprompt with guidance.
    #[allow(clippy::too_many_arguments)]
    async fn handle_out_of_scope(
        &self,
        ctx: &TurnContext,
        lead: &LeadModel,
        active_flow: &FlowModel,
        step: &StepModel,
        options: &[OptionModel],
        is_submenu: bool,
        ai_summary: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TurnOutcome, EngineError> {
        EventRepository::new(&self.db)
            .record(
                NewEvent {
                    client_id: ctx.client.id,
                    lead_id: lead.id,
                    flow_id: step.flow_id,
                    step_id: step.id,
                    raw_user_text: ctx.inbound.text.clone(),
                    selected_option_id: None,
                    mapping_source: MappingSource::OutOfScope,
                    ai_summary: ai_summary.clone(),
                    ai_out_of_scope: true,
                },
                now,
            )
            .await?;

        let next_streak = lead.irrelevant_streak + 1;

        if next_streak >= active_flow.max_irrelevant_streak {
            let update = lead::ActiveModel {
                id: Set(lead.id),
                conversation_status: Set(ConversationStatus::Closed.as_str().to_string()),
                closed_at: Set(Some(to_db_time(now))),
                irrelevant_streak: Set(next_streak),
                free_text_summary: Set(ai_summary),
                routing_state: Set(RoutingState::Routing.as_str().to_string()),
                last_user_message_at: Set(Some(to_db_time(now))),
                updated_at: Set(to_db_time(now)),
                ..Default::default()
            };
            update.update(&self.db).await?;

            ReminderJobRepository::new(&self.db)
                .cancel_pending(lead.id, "lead closed out of scope", now)
                .await?;

            info!(lead_id = %lead.id, streak = next_streak, "Lead closed after irrelevant streak");
            self.send_bot_message(ctx, lead.id, flow::CLOSING_MESSAGE).await?;
            return Ok(TurnOutcome::ClosedOutOfScope);
        }

        let update = lead::ActiveModel {
            id: Set(lead.id),
            irrelevant_streak: Set(next_streak),
            free_text_summary: Set(ai_summary),
            last_user_message_at: Set(Some(to_db_time(now))),
            updated_at: Set(to_db_time(now)),
            ..Default::default()
        };
        let updated = update.update(&self.db).await?;
        self.schedule_reminder(&updated, active_flow, now).await?;

        let mut reply = format_out_of_scope_message(options);
        if is_submenu {
            reply.push_str("\n\n");
            reply.push_str(flow::SUBMENU_BACK_HINT);
        }
        self.send_bot_message(ctx, lead.id, &reply).await?;

        Ok(TurnOutcome::OutOfScope)
    }

    /// Force the lead to HUMAN_REQUIRED with exactly one reason, cancel any
    /// pending reminder, send one handoff message, and notify the tenant by
    /// email at most once per lead.
    async fn escalate(
        &self,
        ctx: &TurnContext,
        lead: &LeadModel,
        reason: EscalationReason,
        mut update: lead::ActiveModel,
        now: DateTime<Utc>,
    ) -> Result<TurnOutcome, EngineError> {
        let should_notify = lead.notified_at.is_none();

        update.conversation_status =
            Set(ConversationStatus::HumanRequired.as_str().to_string());
        update.human_required_reason = Set(Some(reason.as_str().to_string()));
        update.routing_state = Set(RoutingState::Routing.as_str().to_string());
        if should_notify {
            update.notified_at = Set(Some(to_db_time(now)));
        }
        update.updated_at = Set(to_db_time(now));
        update.update(&self.db).await?;

        ReminderJobRepository::new(&self.db)
            .cancel_pending(lead.id, "lead escalated", now)
            .await?;

        info!(lead_id = %lead.id, reason = reason.as_str(), "Lead escalated to human");
        counter!("leadflow_escalations_total", "reason" => reason.as_str()).increment(1);

        let handoff =
            format_handoff_message(ctx.client.human_forward_number.as_deref());
        self.send_bot_message(ctx, lead.id, &handoff).await?;

        if should_notify {
            let display_name = lead
                .wa_profile_name
                .clone()
                .or_else(|| ctx.inbound.wa_profile_name.clone())
                .unwrap_or_else(|| lead.wa_user_id.clone());
            let body = format!(
                "<p>Lead: {}</p><p>Score: {}</p><p>Razón: {}</p>",
                display_name,
                lead.score,
                reason.as_str()
            );
            let sent = self
                .notifier
                .notify(
                    &ctx.client.notification_email,
                    "Leadflow: lead requiere intervención humana",
                    &body,
                )
                .await;
            if !sent {
                warn!(lead_id = %lead.id, client_id = %ctx.client.id, "Lead notification email failed");
            }
        }

        Ok(TurnOutcome::Escalated(reason))
    }

    /// Return the lead to a given step with a cleared streak and a fresh
    /// reminder (reentry reset and back-to-main-menu).
    async fn reset_to_step(
        &self,
        lead: &LeadModel,
        active_flow: &FlowModel,
        step: &StepModel,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let update = lead::ActiveModel {
            id: Set(lead.id),
            current_step_id: Set(Some(step.id)),
            irrelevant_streak: Set(0),
            routing_state: Set(RoutingState::Routing.as_str().to_string()),
            last_user_message_at: Set(Some(to_db_time(now))),
            updated_at: Set(to_db_time(now)),
            ..Default::default()
        };
        let updated = update.update(&self.db).await?;
        self.schedule_reminder(&updated, active_flow, now).await?;
        Ok(())
    }

    /// Clear the irrelevant streak without moving the lead (list recovery).
    async fn recover_streak(
        &self,
        lead: &LeadModel,
        active_flow: &FlowModel,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let update = lead::ActiveModel {
            id: Set(lead.id),
            irrelevant_streak: Set(0),
            last_user_message_at: Set(Some(to_db_time(now))),
            updated_at: Set(to_db_time(now)),
            ..Default::default()
        };
        let updated = update.update(&self.db).await?;
        self.schedule_reminder(&updated, active_flow, now).await?;
        Ok(())
    }

    /// Schedule the lead's next reminder nudge unless the cap is reached.
    async fn schedule_reminder(
        &self,
        lead: &LeadModel,
        active_flow: &FlowModel,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if lead.reminders_sent >= active_flow.max_reminders {
            return Ok(());
        }

        let scheduled_for =
            now + Duration::minutes(active_flow.reminder_delay_minutes as i64);
        ReminderJobRepository::new(&self.db)
            .schedule(
                lead.client_id,
                lead.id,
                lead.reminders_sent + 1,
                scheduled_for,
                now,
            )
            .await?;
        Ok(())
    }

    /// Send one outbound text, persist it, and touch the lead's last-bot
    /// timestamp. A send failure aborts the turn; the inbound message is
    /// already durably stored, so a gateway retry deduplicates.
    async fn send_bot_message(
        &self,
        ctx: &TurnContext,
        lead_id: Uuid,
        text: &str,
    ) -> Result<(), EngineError> {
        let receipt = self
            .sender
            .send_text(&ctx.credentials, &ctx.inbound.wa_user_id, text)
            .await?;

        let now = Utc::now();
        MessageRepository::new(&self.db)
            .insert_outbound(
                NewMessage {
                    client_id: ctx.client.id,
                    lead_id,
                    direction: MessageDirection::Outbound,
                    phone_number_id: ctx.credentials.phone_number_id.clone(),
                    wa_message_id: receipt.wa_message_id,
                    text_content: text.to_string(),
                    raw_payload: Some(receipt.raw_response),
                },
                now,
            )
            .await?;

        let touch = lead::ActiveModel {
            id: Set(lead_id),
            last_bot_message_at: Set(Some(to_db_time(now))),
            updated_at: Set(to_db_time(now)),
            ..Default::default()
        };
        touch.update(&self.db).await?;

        Ok(())
    }
}
