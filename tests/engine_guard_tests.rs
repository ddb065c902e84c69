//! Escalation and safety-guard integration tests: reason precedence, the
//! one-shot notification email gate, the reentry sub-state, loop caps, score
//! clamping, and flow completion.

mod test_utils;

use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

use leadflow::engine::TurnOutcome;
use leadflow::models::lead::Column as LeadColumn;
use leadflow::models::reminder_job::Column as JobColumn;
use leadflow::models::{EscalationReason, Lead, ReminderJob};

use test_utils::*;

async fn deliver(harness: &TestHarness, wa_message_id: &str, text: &str) -> TurnOutcome {
    let (body, signature) = signed_payload(wa_message_id, text);
    harness
        .engine()
        .process_delivery(&body, Some(&signature))
        .await
        .expect("turn succeeds")
}

async fn current_lead(harness: &TestHarness) -> leadflow::models::lead::Model {
    Lead::find()
        .filter(LeadColumn::ClientId.eq(harness.client_id))
        .one(&harness.db)
        .await
        .expect("query leads")
        .expect("lead exists")
}

/// One step whose single option requests a human.
async fn seed_contact_human_flow(harness: &TestHarness) {
    let flow_id = seed_flow(&harness.db, harness.client_id, FlowSeed::default()).await;
    let step1 = seed_step(&harness.db, flow_id, 1, "¿En qué te ayudo?").await;
    seed_option(
        &harness.db,
        step1,
        1,
        "HUMAN",
        "Hablar con una persona",
        OptionSeed {
            is_contact_human: true,
            score_delta: 100,
            ..Default::default()
        },
    )
    .await;
}

#[tokio::test]
async fn contact_human_option_escalates_with_user_request_reason() {
    let harness = setup_harness(test_config()).await;
    seed_contact_human_flow(&harness).await;

    deliver(&harness, "wamid.1", "Hola").await;
    let outcome = deliver(&harness, "wamid.2", "1").await;

    // The option also crosses the score threshold; USER_REQUEST must win
    assert_eq!(
        outcome,
        TurnOutcome::Escalated(EscalationReason::UserRequest)
    );

    let lead = current_lead(&harness).await;
    assert_eq!(lead.conversation_status, "HUMAN_REQUIRED");
    assert_eq!(lead.human_required_reason.as_deref(), Some("USER_REQUEST"));
    assert!(lead.notified_at.is_some());

    // One handoff message, carrying the forward number
    let texts = harness.sender.sent_texts();
    assert!(texts.last().unwrap().contains("+56 9 1234 5678"));

    // One notification email
    assert_eq!(harness.notifier.count(), 1);
    let notifications = harness.notifier.notifications.lock().unwrap().clone();
    assert_eq!(notifications[0].0, "owner@acme.test");

    // Pending reminders are cleared by the escalation
    let pending_jobs = ReminderJob::find()
        .filter(JobColumn::LeadId.eq(lead.id))
        .filter(JobColumn::Status.eq("PENDING"))
        .count(&harness.db)
        .await
        .unwrap();
    assert_eq!(pending_jobs, 0);
}

#[tokio::test]
async fn score_threshold_escalates_without_user_request() {
    let harness = setup_harness(test_config()).await;
    let flow_id = seed_flow(&harness.db, harness.client_id, FlowSeed::default()).await;
    let step1 = seed_step(&harness.db, flow_id, 1, "¿Qué tan pronto quieres partir?").await;
    seed_option(
        &harness.db,
        step1,
        1,
        "NOW",
        "De inmediato",
        OptionSeed {
            score_delta: 100,
            ..Default::default()
        },
    )
    .await;

    deliver(&harness, "wamid.1", "Hola").await;
    let outcome = deliver(&harness, "wamid.2", "1").await;

    assert_eq!(
        outcome,
        TurnOutcome::Escalated(EscalationReason::ScoreThreshold)
    );

    let lead = current_lead(&harness).await;
    assert_eq!(lead.score, 100);
    assert_eq!(
        lead.human_required_reason.as_deref(),
        Some("SCORE_THRESHOLD")
    );
}

#[tokio::test]
async fn score_stays_clamped_to_bounds_across_turns() {
    let harness = setup_harness(test_config()).await;

    // Threshold far above the clamp ceiling so no escalation interferes
    let client_update = leadflow::models::client::ActiveModel {
        id: sea_orm::Set(harness.client_id),
        score_threshold: sea_orm::Set(1000),
        ..Default::default()
    };
    use sea_orm::ActiveModelTrait;
    client_update.update(&harness.db).await.unwrap();

    let flow_id = seed_flow(&harness.db, harness.client_id, FlowSeed::default()).await;
    let step1 = seed_step(&harness.db, flow_id, 1, "Paso uno").await;
    seed_option(
        &harness.db,
        step1,
        1,
        "DOWN",
        "Bajar",
        OptionSeed {
            score_delta: -50,
            ..Default::default()
        },
    )
    .await;
    let step2 = seed_step(&harness.db, flow_id, 2, "Paso dos").await;
    seed_option(
        &harness.db,
        step2,
        1,
        "UP",
        "Subir",
        OptionSeed {
            score_delta: 80,
            ..Default::default()
        },
    )
    .await;
    let step3 = seed_step(&harness.db, flow_id, 3, "Paso tres").await;
    seed_option(
        &harness.db,
        step3,
        1,
        "MORE",
        "Subir mas",
        OptionSeed {
            score_delta: 80,
            ..Default::default()
        },
    )
    .await;

    deliver(&harness, "wamid.1", "Hola").await;

    deliver(&harness, "wamid.2", "1").await;
    assert_eq!(current_lead(&harness).await.score, 0); // clamped below

    deliver(&harness, "wamid.3", "1").await;
    assert_eq!(current_lead(&harness).await.score, 80);

    // Final selection exhausts the graph: clamped above, then FLOW_COMPLETED
    let outcome = deliver(&harness, "wamid.4", "1").await;
    assert_eq!(
        outcome,
        TurnOutcome::Escalated(EscalationReason::FlowCompleted)
    );

    let lead = current_lead(&harness).await;
    assert_eq!(lead.score, 100);
    assert_eq!(lead.human_required_reason.as_deref(), Some("FLOW_COMPLETED"));

    // Flow completion still sends exactly one handoff message
    let texts = harness.sender.sent_texts();
    assert!(texts.last().unwrap().contains("Te derivaré"));
}

#[tokio::test]
async fn notification_email_is_sent_at_most_once_per_lead() {
    let harness = setup_harness(test_config()).await;
    let flow_id = seed_flow(&harness.db, harness.client_id, FlowSeed::default()).await;
    let step1 = seed_step(&harness.db, flow_id, 1, "¿En qué te ayudo?").await;
    seed_option(
        &harness.db,
        step1,
        1,
        "TERM",
        "Solo informacion",
        OptionSeed {
            is_terminal: true,
            ..Default::default()
        },
    )
    .await;

    deliver(&harness, "wamid.1", "Hola").await;
    deliver(&harness, "wamid.2", "1").await; // parks the lead

    // First escalation notifies
    let outcome = deliver(&harness, "wamid.3", "1").await;
    assert_eq!(
        outcome,
        TurnOutcome::Escalated(EscalationReason::ReentryEscalation)
    );
    assert_eq!(harness.notifier.count(), 1);

    // Operator sends the lead back to ACTIVE routing by hand, then a second
    // escalation must not notify again
    use sea_orm::ActiveModelTrait;
    let lead = current_lead(&harness).await;
    let reset = leadflow::models::lead::ActiveModel {
        id: sea_orm::Set(lead.id),
        conversation_status: sea_orm::Set("ACTIVE".to_string()),
        routing_state: sea_orm::Set("AWAITING_REENTRY_CHOICE".to_string()),
        ..Default::default()
    };
    reset.update(&harness.db).await.unwrap();

    let outcome = deliver(&harness, "wamid.4", "1").await;
    assert_eq!(
        outcome,
        TurnOutcome::Escalated(EscalationReason::ReentryEscalation)
    );
    assert_eq!(harness.notifier.count(), 1);
}

#[tokio::test]
async fn terminal_option_parks_lead_awaiting_reentry_choice() {
    let harness = setup_harness(test_config()).await;
    let flow_id = seed_flow(&harness.db, harness.client_id, FlowSeed::default()).await;
    let step1 = seed_step(&harness.db, flow_id, 1, "¿En qué te ayudo?").await;
    seed_option(
        &harness.db,
        step1,
        1,
        "TERM",
        "Solo informacion",
        OptionSeed {
            is_terminal: true,
            ..Default::default()
        },
    )
    .await;

    deliver(&harness, "wamid.1", "Hola").await;
    let outcome = deliver(&harness, "wamid.2", "1").await;
    assert_eq!(outcome, TurnOutcome::TerminalChoiceRequested);

    let lead = current_lead(&harness).await;
    assert_eq!(lead.conversation_status, "ACTIVE");
    assert_eq!(lead.routing_state, "AWAITING_REENTRY_CHOICE");

    // Parked leads have no pending reminder
    let pending_jobs = ReminderJob::find()
        .filter(JobColumn::LeadId.eq(lead.id))
        .filter(JobColumn::Status.eq("PENDING"))
        .count(&harness.db)
        .await
        .unwrap();
    assert_eq!(pending_jobs, 0);

    let texts = harness.sender.sent_texts();
    assert!(texts.last().unwrap().contains("responder 0"));
}

#[tokio::test]
async fn reentry_zero_resets_to_first_step() {
    let harness = setup_harness(test_config()).await;
    let flow_id = seed_flow(&harness.db, harness.client_id, FlowSeed::default()).await;
    let step1 = seed_step(&harness.db, flow_id, 1, "¿Qué servicio te interesa?").await;
    seed_option(&harness.db, step1, 1, "SERVICES", "Servicios", OptionSeed::default()).await;
    let step2 = seed_step(&harness.db, flow_id, 2, "Segundo paso").await;
    seed_option(
        &harness.db,
        step2,
        1,
        "TERM",
        "Cerrar tema",
        OptionSeed {
            is_terminal: true,
            ..Default::default()
        },
    )
    .await;

    deliver(&harness, "wamid.1", "Hola").await;
    deliver(&harness, "wamid.2", "1").await; // advance to step 2
    deliver(&harness, "wamid.3", "1").await; // terminal: parked

    let outcome = deliver(&harness, "wamid.4", "0").await;
    assert_eq!(outcome, TurnOutcome::ReentryReset);

    let lead = current_lead(&harness).await;
    assert_eq!(lead.current_step_id, Some(step1));
    assert_eq!(lead.routing_state, "ROUTING");
    assert_eq!(lead.irrelevant_streak, 0);

    let texts = harness.sender.sent_texts();
    assert!(texts.last().unwrap().contains("1) Servicios"));
}

#[tokio::test]
async fn reentry_other_input_repeats_hint() {
    let harness = setup_harness(test_config()).await;
    let flow_id = seed_flow(&harness.db, harness.client_id, FlowSeed::default()).await;
    let step1 = seed_step(&harness.db, flow_id, 1, "¿En qué te ayudo?").await;
    seed_option(
        &harness.db,
        step1,
        1,
        "TERM",
        "Solo informacion",
        OptionSeed {
            is_terminal: true,
            ..Default::default()
        },
    )
    .await;

    deliver(&harness, "wamid.1", "Hola").await;
    deliver(&harness, "wamid.2", "1").await; // parked

    let outcome = deliver(&harness, "wamid.3", "gracias").await;
    assert_eq!(outcome, TurnOutcome::ReentryHint);

    // Still parked
    let lead = current_lead(&harness).await;
    assert_eq!(lead.routing_state, "AWAITING_REENTRY_CHOICE");

    let texts = harness.sender.sent_texts();
    assert!(texts.last().unwrap().contains("Responde 0"));
}

#[tokio::test]
async fn same_step_loop_cap_forces_escalation() {
    let mut config = test_config();
    config.engine.max_same_step_events = 2;
    let harness = setup_harness(config).await;
    seed_linear_flow(
        &harness.db,
        harness.client_id,
        FlowSeed {
            max_irrelevant_streak: 10,
            ..Default::default()
        },
    )
    .await;

    deliver(&harness, "wamid.1", "Hola").await;
    deliver(&harness, "wamid.2", "xyzzy").await;
    deliver(&harness, "wamid.3", "lorem ipsum").await;

    // Two routing events on the same step; the next turn trips the guard
    // before any resolution happens
    let outcome = deliver(&harness, "wamid.4", "foo bar").await;
    assert_eq!(
        outcome,
        TurnOutcome::Escalated(EscalationReason::SafetySameStepLoop)
    );

    let lead = current_lead(&harness).await;
    assert_eq!(
        lead.human_required_reason.as_deref(),
        Some("SAFETY_SAME_STEP_LOOP")
    );
}

#[tokio::test]
async fn total_turn_cap_forces_escalation() {
    let mut config = test_config();
    config.engine.max_bot_turns = 3;
    let harness = setup_harness(config).await;
    seed_linear_flow(
        &harness.db,
        harness.client_id,
        FlowSeed {
            max_irrelevant_streak: 10,
            ..Default::default()
        },
    )
    .await;

    deliver(&harness, "wamid.1", "Hola").await; // welcome + prompt = 2 turns
    deliver(&harness, "wamid.2", "xyzzy").await; // guidance = 3 turns

    let outcome = deliver(&harness, "wamid.3", "sigo sin entender").await;
    assert_eq!(
        outcome,
        TurnOutcome::Escalated(EscalationReason::SafetyMaxBotTurns)
    );
}

#[tokio::test]
async fn turn_cap_takes_precedence_over_same_step_loop() {
    let mut config = test_config();
    config.engine.max_bot_turns = 4;
    config.engine.max_same_step_events = 2;
    let harness = setup_harness(config).await;
    seed_linear_flow(
        &harness.db,
        harness.client_id,
        FlowSeed {
            max_irrelevant_streak: 10,
            ..Default::default()
        },
    )
    .await;

    deliver(&harness, "wamid.1", "Hola").await;
    deliver(&harness, "wamid.2", "xyzzy").await;
    deliver(&harness, "wamid.3", "lorem").await;

    // Both caps are breached; the fixed precedence picks MAX_BOT_TURNS
    let outcome = deliver(&harness, "wamid.4", "foo").await;
    assert_eq!(
        outcome,
        TurnOutcome::Escalated(EscalationReason::SafetyMaxBotTurns)
    );
}
