//! Inbound pipeline integration tests: lead creation, direct and AI-assisted
//! option resolution, idempotency, rate limiting, suppression, and the
//! accept-and-ignore paths. Everything runs against an in-memory database
//! with recording capability stubs.

mod test_utils;

use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

use leadflow::classify::Classification;
use leadflow::engine::{IgnoreReason, TurnOutcome};
use leadflow::models::lead::Column as LeadColumn;
use leadflow::models::lead_step_event::Column as EventColumn;
use leadflow::models::message::Column as MessageColumn;
use leadflow::models::reminder_job::Column as JobColumn;
use leadflow::models::{Lead, LeadStepEvent, Message, ReminderJob};

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

#[tokio::test]
async fn first_message_creates_lead_and_sends_welcome_then_prompt() {
    let harness = setup_harness(test_config()).await;
    let (flow_id, step1, _step2) =
        seed_linear_flow(&harness.db, harness.client_id, FlowSeed::default()).await;

    let outcome = deliver(&harness, "wamid.1", "Hola").await;
    assert_eq!(outcome, TurnOutcome::Started);

    let lead = current_lead(&harness).await;
    assert_eq!(lead.conversation_status, "ACTIVE");
    assert_eq!(lead.flow_id, Some(flow_id));
    assert_eq!(lead.current_step_id, Some(step1));
    assert_eq!(lead.score, 0);
    assert_eq!(lead.wa_profile_name.as_deref(), Some("Ana"));

    // Exactly two outbound messages: welcome, then the first prompt with its
    // numbered option list
    let texts = harness.sender.sent_texts();
    assert_eq!(texts.len(), 2);
    assert_eq!(texts[0], "¡Hola! Soy el asistente de Acme.");
    assert!(texts[1].contains("¿Qué servicio te interesa?"));
    assert!(texts[1].contains("1) Servicios"));
    assert!(texts[1].contains("2) Ecommerce"));

    // A reminder is scheduled for the fresh lead
    let pending_jobs = ReminderJob::find()
        .filter(JobColumn::LeadId.eq(lead.id))
        .filter(JobColumn::Status.eq("PENDING"))
        .count(&harness.db)
        .await
        .unwrap();
    assert_eq!(pending_jobs, 1);
}

#[tokio::test]
async fn numeric_reply_advances_via_direct_option() {
    let harness = setup_harness(test_config()).await;
    let (_flow, _step1, step2) =
        seed_linear_flow(&harness.db, harness.client_id, FlowSeed::default()).await;

    deliver(&harness, "wamid.1", "Hola").await;
    let outcome = deliver(&harness, "wamid.2", "2").await;
    assert_eq!(outcome, TurnOutcome::Advanced);

    let lead = current_lead(&harness).await;
    assert_eq!(lead.current_step_id, Some(step2));
    assert_eq!(lead.score, 20);

    let event = LeadStepEvent::find()
        .filter(EventColumn::LeadId.eq(lead.id))
        .one(&harness.db)
        .await
        .unwrap()
        .expect("event recorded");
    assert_eq!(event.mapping_source, "DIRECT_OPTION");
    assert!(event.selected_option_id.is_some());
    assert_eq!(event.raw_user_text, "2");

    // The reply is the next step's prompt with a back-to-menu line (submenu)
    let texts = harness.sender.sent_texts();
    assert!(texts.last().unwrap().contains("¿Ya inviertes en publicidad?"));
    assert!(texts.last().unwrap().contains("0) Volver al menú principal"));
}

#[tokio::test]
async fn explicit_edge_target_beats_linear_fallback() {
    let harness = setup_harness(test_config()).await;
    let flow_id = seed_flow(&harness.db, harness.client_id, FlowSeed::default()).await;

    let step1 = seed_step(&harness.db, flow_id, 1, "¿Qué necesitas?").await;
    let step2 = seed_step(&harness.db, flow_id, 2, "Paso intermedio").await;
    let step3 = seed_step(&harness.db, flow_id, 3, "Paso final").await;
    seed_option(&harness.db, step2, 1, "X", "Equis", OptionSeed::default()).await;
    seed_option(&harness.db, step3, 1, "Y", "Ye", OptionSeed::default()).await;

    // Option jumps straight to step 3, skipping step 2
    seed_option(
        &harness.db,
        step1,
        1,
        "JUMP",
        "Directo",
        OptionSeed {
            next_step_id: Some(step3),
            ..Default::default()
        },
    )
    .await;

    deliver(&harness, "wamid.1", "Hola").await;
    let outcome = deliver(&harness, "wamid.2", "1").await;
    assert_eq!(outcome, TurnOutcome::Advanced);

    let lead = current_lead(&harness).await;
    assert_eq!(lead.current_step_id, Some(step3));
}

#[tokio::test]
async fn label_and_code_replies_match_directly() {
    let harness = setup_harness(test_config()).await;
    seed_linear_flow(&harness.db, harness.client_id, FlowSeed::default()).await;

    deliver(&harness, "wamid.1", "Hola").await;
    // Accented, differently-cased label still matches after normalization
    let outcome = deliver(&harness, "wamid.2", "quiero ECOMMERCE por favor").await;
    assert_eq!(outcome, TurnOutcome::Advanced);
}

#[tokio::test]
async fn ai_mapped_reply_advances_and_records_source() {
    let harness = setup_harness(test_config()).await;
    let (_flow, _step1, step2) =
        seed_linear_flow(&harness.db, harness.client_id, FlowSeed::default()).await;

    deliver(&harness, "wamid.1", "Hola").await;

    harness.classifier.set_response(Classification {
        matched_code: Some("ECOMMERCE".to_string()),
        out_of_scope: false,
        summary: Some("quiere vender online".to_string()),
    });

    let outcome = deliver(&harness, "wamid.2", "me gustaria vender por internet").await;
    assert_eq!(outcome, TurnOutcome::Advanced);

    let lead = current_lead(&harness).await;
    assert_eq!(lead.current_step_id, Some(step2));
    assert_eq!(lead.free_text_summary.as_deref(), Some("quiere vender online"));

    let event = LeadStepEvent::find()
        .filter(EventColumn::LeadId.eq(lead.id))
        .one(&harness.db)
        .await
        .unwrap()
        .expect("event recorded");
    assert_eq!(event.mapping_source, "AI_MAPPED");
}

#[tokio::test]
async fn classifier_code_must_match_a_real_option() {
    let harness = setup_harness(test_config()).await;
    seed_linear_flow(
        &harness.db,
        harness.client_id,
        FlowSeed {
            max_irrelevant_streak: 5,
            ..Default::default()
        },
    )
    .await;

    deliver(&harness, "wamid.1", "Hola").await;

    harness.classifier.set_response(Classification {
        matched_code: Some("NOT_A_REAL_CODE".to_string()),
        out_of_scope: false,
        summary: None,
    });

    let outcome = deliver(&harness, "wamid.2", "texto libre cualquiera").await;
    assert_eq!(outcome, TurnOutcome::OutOfScope);
}

#[tokio::test]
async fn duplicate_delivery_is_a_no_op() {
    let harness = setup_harness(test_config()).await;
    seed_linear_flow(&harness.db, harness.client_id, FlowSeed::default()).await;

    deliver(&harness, "wamid.1", "Hola").await;
    let sends_after_first = harness.sender.sent_count();

    let outcome = deliver(&harness, "wamid.1", "Hola").await;
    assert_eq!(outcome, TurnOutcome::Deduplicated);

    // Exactly one stored inbound message and no extra reply
    let lead = current_lead(&harness).await;
    let inbound_count = Message::find()
        .filter(MessageColumn::LeadId.eq(lead.id))
        .filter(MessageColumn::Direction.eq("INBOUND"))
        .count(&harness.db)
        .await
        .unwrap();
    assert_eq!(inbound_count, 1);
    assert_eq!(harness.sender.sent_count(), sends_after_first);
}

#[tokio::test]
async fn rate_limit_window_caps_inbound_processing() {
    let mut config = test_config();
    config.engine.rate_limit_max_messages = 2;
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
    let outcome = deliver(&harness, "wamid.3", "xyzzy otra vez").await;
    assert_eq!(outcome, TurnOutcome::RateLimited);

    // The rate-limited message is not stored
    let lead = current_lead(&harness).await;
    let inbound_count = Message::find()
        .filter(MessageColumn::LeadId.eq(lead.id))
        .filter(MessageColumn::Direction.eq("INBOUND"))
        .count(&harness.db)
        .await
        .unwrap();
    assert_eq!(inbound_count, 2);
}

#[tokio::test]
async fn unknown_channel_is_accepted_and_ignored() {
    let harness = setup_harness(test_config()).await;
    seed_linear_flow(&harness.db, harness.client_id, FlowSeed::default()).await;

    let (body, signature) = signed_payload_from("19990000000", WA_USER_ID, "wamid.1", "Hola");
    let outcome = harness
        .engine()
        .process_delivery(&body, Some(&signature))
        .await
        .expect("turn succeeds");

    assert_eq!(outcome, TurnOutcome::Ignored(IgnoreReason::UnknownChannel));
    assert_eq!(harness.sender.sent_count(), 0);
}

#[tokio::test]
async fn invalid_signature_is_rejected() {
    let harness = setup_harness(test_config()).await;
    seed_linear_flow(&harness.db, harness.client_id, FlowSeed::default()).await;

    let (body, _) = signed_payload("wamid.1", "Hola");
    let result = harness
        .engine()
        .process_delivery(&body, Some("sha256=0000deadbeef"))
        .await;

    assert!(result.is_err());
    assert_eq!(harness.sender.sent_count(), 0);

    // Nothing was created for the unauthenticated delivery
    let leads = Lead::find().count(&harness.db).await.unwrap();
    assert_eq!(leads, 0);
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let harness = setup_harness(test_config()).await;
    seed_linear_flow(&harness.db, harness.client_id, FlowSeed::default()).await;

    let (body, _) = signed_payload("wamid.1", "Hola");
    let result = harness.engine().process_delivery(&body, None).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn malformed_payload_is_accepted_and_ignored() {
    let harness = setup_harness(test_config()).await;

    let outcome = harness
        .engine()
        .process_delivery(b"this is not json", None)
        .await
        .expect("turn succeeds");

    assert_eq!(outcome, TurnOutcome::Ignored(IgnoreReason::InvalidPayload));
}

#[tokio::test]
async fn no_active_flow_is_accepted_and_ignored() {
    let harness = setup_harness(test_config()).await;

    let (body, signature) = signed_payload("wamid.1", "Hola");
    let outcome = harness
        .engine()
        .process_delivery(&body, Some(&signature))
        .await
        .expect("turn succeeds");

    assert_eq!(outcome, TurnOutcome::Ignored(IgnoreReason::NoActiveFlow));
    assert_eq!(Lead::find().count(&harness.db).await.unwrap(), 0);
}

#[tokio::test]
async fn out_of_scope_increments_streak_and_reprompts() {
    let harness = setup_harness(test_config()).await;
    seed_linear_flow(
        &harness.db,
        harness.client_id,
        FlowSeed {
            max_irrelevant_streak: 3,
            ..Default::default()
        },
    )
    .await;

    deliver(&harness, "wamid.1", "Hola").await;
    let outcome = deliver(&harness, "wamid.2", "xyzzy lorem").await;
    assert_eq!(outcome, TurnOutcome::OutOfScope);

    let lead = current_lead(&harness).await;
    assert_eq!(lead.irrelevant_streak, 1);
    assert_eq!(lead.conversation_status, "ACTIVE");

    let event = LeadStepEvent::find()
        .filter(EventColumn::LeadId.eq(lead.id))
        .one(&harness.db)
        .await
        .unwrap()
        .expect("event recorded");
    assert_eq!(event.mapping_source, "OUT_OF_SCOPE");
    assert!(event.selected_option_id.is_none());
    assert!(event.ai_out_of_scope);

    let texts = harness.sender.sent_texts();
    assert!(texts.last().unwrap().contains("OPCIONES"));
}

#[tokio::test]
async fn streak_limit_closes_lead_and_stops_replies() {
    let harness = setup_harness(test_config()).await;
    seed_linear_flow(
        &harness.db,
        harness.client_id,
        FlowSeed {
            max_irrelevant_streak: 2,
            ..Default::default()
        },
    )
    .await;

    deliver(&harness, "wamid.1", "Hola").await;
    deliver(&harness, "wamid.2", "xyzzy").await;
    let outcome = deliver(&harness, "wamid.3", "lorem ipsum").await;
    assert_eq!(outcome, TurnOutcome::ClosedOutOfScope);

    let lead = current_lead(&harness).await;
    assert_eq!(lead.conversation_status, "CLOSED");
    assert_eq!(lead.irrelevant_streak, 2);
    assert!(lead.closed_at.is_some());

    let texts = harness.sender.sent_texts();
    assert!(texts.last().unwrap().contains("vuelve a escribirnos"));

    // No reminder survives the close
    let pending_jobs = ReminderJob::find()
        .filter(JobColumn::LeadId.eq(lead.id))
        .filter(JobColumn::Status.eq("PENDING"))
        .count(&harness.db)
        .await
        .unwrap();
    assert_eq!(pending_jobs, 0);
}

#[tokio::test]
async fn reopen_within_cooldown_is_silently_ignored() {
    let harness = setup_harness(test_config()).await;
    seed_linear_flow(
        &harness.db,
        harness.client_id,
        FlowSeed {
            max_irrelevant_streak: 2,
            ..Default::default()
        },
    )
    .await;

    deliver(&harness, "wamid.1", "Hola").await;
    deliver(&harness, "wamid.2", "xyzzy").await;
    deliver(&harness, "wamid.3", "lorem ipsum").await;
    let sends_after_close = harness.sender.sent_count();

    let outcome = deliver(&harness, "wamid.4", "Hola de nuevo").await;
    assert_eq!(outcome, TurnOutcome::Ignored(IgnoreReason::ReopenCooldown));

    // No new lead and no reply
    assert_eq!(Lead::find().count(&harness.db).await.unwrap(), 1);
    assert_eq!(harness.sender.sent_count(), sends_after_close);
}

#[tokio::test]
async fn list_recovery_resets_streak_without_consuming_a_decision() {
    let harness = setup_harness(test_config()).await;
    seed_linear_flow(
        &harness.db,
        harness.client_id,
        FlowSeed {
            max_irrelevant_streak: 3,
            ..Default::default()
        },
    )
    .await;

    deliver(&harness, "wamid.1", "Hola").await;
    deliver(&harness, "wamid.2", "xyzzy").await;

    let events_before = LeadStepEvent::find().count(&harness.db).await.unwrap();

    let outcome = deliver(&harness, "wamid.3", "opciones").await;
    assert_eq!(outcome, TurnOutcome::RecoveredToOptions);

    let lead = current_lead(&harness).await;
    assert_eq!(lead.irrelevant_streak, 0);

    // Recovery records no routing decision
    let events_after = LeadStepEvent::find().count(&harness.db).await.unwrap();
    assert_eq!(events_before, events_after);

    let texts = harness.sender.sent_texts();
    assert!(texts.last().unwrap().contains("1) Servicios"));
}

#[tokio::test]
async fn back_to_main_menu_resets_submenu_lead() {
    let harness = setup_harness(test_config()).await;
    let (_flow, step1, _step2) =
        seed_linear_flow(&harness.db, harness.client_id, FlowSeed::default()).await;

    deliver(&harness, "wamid.1", "Hola").await;
    deliver(&harness, "wamid.2", "1").await;

    let outcome = deliver(&harness, "wamid.3", "menú").await;
    assert_eq!(outcome, TurnOutcome::BackToMainMenu);

    let lead = current_lead(&harness).await;
    assert_eq!(lead.current_step_id, Some(step1));

    let texts = harness.sender.sent_texts();
    assert!(texts.last().unwrap().contains("menú principal"));
}

#[tokio::test]
async fn non_active_lead_suppresses_routing_but_stores_message() {
    let harness = setup_harness(test_config()).await;
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
            ..Default::default()
        },
    )
    .await;

    deliver(&harness, "wamid.1", "Hola").await;
    deliver(&harness, "wamid.2", "1").await; // escalates

    let sends_before = harness.sender.sent_count();
    let outcome = deliver(&harness, "wamid.3", "sigo aquí").await;
    assert_eq!(outcome, TurnOutcome::Suppressed);

    let lead = current_lead(&harness).await;
    assert_eq!(lead.conversation_status, "HUMAN_REQUIRED");

    // Message stored, no reply sent
    let inbound_count = Message::find()
        .filter(MessageColumn::LeadId.eq(lead.id))
        .filter(MessageColumn::Direction.eq("INBOUND"))
        .count(&harness.db)
        .await
        .unwrap();
    assert_eq!(inbound_count, 3);
    assert_eq!(harness.sender.sent_count(), sends_before);
}
