//! Turn outcome vocabulary.
//!
//! Every webhook delivery resolves to exactly one of these. Soft outcomes
//! (ignored, rate-limited, suppressed, deduplicated, out-of-scope...) are
//! successes with a reason code, never errors: the gateway retries on
//! non-2xx, so "nothing happened" must still answer 200.

use crate::models::EscalationReason;

/// Why a delivery was accepted but not processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Payload did not parse into a usable inbound message
    InvalidPayload,
    /// No active channel for the destination phone number id
    UnknownChannel,
    /// Channel points at a client that does not exist
    UnknownClient,
    /// The user's previous lead closed within the reopen cooldown
    ReopenCooldown,
    /// The client has no active flow (or an active flow with no steps)
    NoActiveFlow,
    /// The lead's current step is missing or has no options
    InvalidStep,
    /// Reentry reset found no first step to return to
    MissingFirstStep,
}

impl IgnoreReason {
    /// Reason code reported in the webhook acknowledgement
    pub fn code(&self) -> &'static str {
        match self {
            IgnoreReason::InvalidPayload => "invalid_payload",
            IgnoreReason::UnknownChannel => "unknown_channel",
            IgnoreReason::UnknownClient => "unknown_client",
            IgnoreReason::ReopenCooldown => "reopen_cooldown",
            IgnoreReason::NoActiveFlow => "no_active_flow",
            IgnoreReason::InvalidStep => "invalid_step",
            IgnoreReason::MissingFirstStep => "missing_first_step",
        }
    }
}

/// The single outcome of one processed delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Accepted and intentionally not processed
    Ignored(IgnoreReason),
    /// Lead exceeded the inbound rate limit window
    RateLimited,
    /// Duplicate delivery of an already-stored message
    Deduplicated,
    /// Lead is not ACTIVE; message stored, no reply
    Suppressed,
    /// Fresh lead created; welcome and first prompt sent
    Started,
    /// Option selected and lead advanced to the next step
    Advanced,
    /// List-recovery shortcut resent the option list
    RecoveredToOptions,
    /// Explicit command reset the lead to the main menu
    BackToMainMenu,
    /// Unmatched message; guidance sent, lead still ACTIVE
    OutOfScope,
    /// Irrelevant streak limit reached; lead CLOSED
    ClosedOutOfScope,
    /// Terminal option reached; lead parked awaiting the 0/1 choice
    TerminalChoiceRequested,
    /// Parked lead answered neither 0 nor 1; hint repeated
    ReentryHint,
    /// Parked lead answered 0; reset to the first step
    ReentryReset,
    /// Lead escalated to HUMAN_REQUIRED
    Escalated(EscalationReason),
}

impl TurnOutcome {
    /// Outcome code reported in the webhook acknowledgement
    pub fn code(&self) -> &'static str {
        match self {
            TurnOutcome::Ignored(reason) => reason.code(),
            TurnOutcome::RateLimited => "rate_limited",
            TurnOutcome::Deduplicated => "deduplicated",
            TurnOutcome::Suppressed => "suppressed",
            TurnOutcome::Started => "started",
            TurnOutcome::Advanced => "advanced",
            TurnOutcome::RecoveredToOptions => "recovered_to_options",
            TurnOutcome::BackToMainMenu => "back_to_main_menu",
            TurnOutcome::OutOfScope => "out_of_scope",
            TurnOutcome::ClosedOutOfScope => "closed_out_of_scope",
            TurnOutcome::TerminalChoiceRequested => "terminal_choice_requested",
            TurnOutcome::ReentryHint => "reentry_hint",
            TurnOutcome::ReentryReset => "reentry_reset",
            TurnOutcome::Escalated(_) => "escalated",
        }
    }

    /// Escalation reason, when the turn escalated
    pub fn escalation(&self) -> Option<EscalationReason> {
        match self {
            TurnOutcome::Escalated(reason) => Some(*reason),
            _ => None,
        }
    }
}
