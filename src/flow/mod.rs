//! # Flow Rendering and Direct Option Resolution
//!
//! Pure helpers shared by the inbound pipeline and the reminder scheduler:
//! text normalization, prompt/option-list rendering, score clamping, and the
//! deterministic (non-AI) tier of option matching.

use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::models::flow_step_option::Model as FlowOption;

/// Line appended to submenu option lists offering a way back to the top.
pub const BACK_TO_MENU_LINE: &str = "0) Volver al menú principal";

/// Banner prepended to reminder nudges.
pub const REMINDER_BANNER: &str = "Recordatorio 👋";

/// Closing message sent when the irrelevant streak limit is reached.
pub const CLOSING_MESSAGE: &str =
    "Por ahora solo puedo ayudarte con los servicios configurados. Si quieres, vuelve a escribirnos para retomar.";

/// Prompt sent when a terminal option parks the lead in the reentry sub-state.
pub const TERMINAL_CHOICE_PROMPT: &str =
    "Perfecto, gracias por tu respuesta. Puedes responder 0 para ver todas las opciones o 1 para hablar de inmediato con una ejecutiva.";

/// Hint repeated while the lead is parked and answers neither 0 nor 1.
pub const REENTRY_HINT: &str =
    "Responde 0 para ver todas las opciones o 1 para hablar con una ejecutiva.";

/// Prefix for the option list sent when a parked lead answers 0.
pub const REENTRY_RESET_PREFIX: &str = "Perfecto. Estas son todas las opciones:";

/// Prefix for the option list sent on an explicit back-to-main-menu command.
pub const MAIN_MENU_PREFIX: &str = "Perfecto. Volvemos al menú principal:";

/// Prefix for the option list sent by the list-recovery shortcut.
pub const RECOVERY_PREFIX: &str = "Perfecto, estas son las opciones disponibles:";

/// Hint appended to out-of-scope replies on submenu steps.
pub const SUBMENU_BACK_HINT: &str = "También puedes responder 0 para volver al menú principal.";

/// Rendering configuration for prompts and option lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderConfig {
    /// Append the back-to-main-menu line (submenu steps only)
    pub include_back_to_main_menu: bool,
}

/// Normalize user input for matching: lowercase, diacritics stripped, trimmed.
pub fn normalize_input(input: &str) -> String {
    input
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036f}').contains(&c)
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b(\d{1,2})\b").expect("valid number pattern"))
}

fn leading_option_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?m)^\s*1\)").expect("valid option pattern"))
}

fn prompt_already_contains_options(prompt_text: &str, options: &[FlowOption]) -> bool {
    if leading_option_pattern().is_match(prompt_text) {
        return true;
    }

    let normalized_prompt = normalize_input(prompt_text);
    options
        .iter()
        .any(|option| normalized_prompt.contains(&normalize_input(&option.label_text)))
}

/// Render the numbered `N) label` option list for a step.
pub fn render_options_list(options: &[FlowOption], config: RenderConfig) -> String {
    let mut lines: Vec<String> = options
        .iter()
        .map(|option| format!("{}) {}", option.option_order, option.label_text))
        .collect();
    if config.include_back_to_main_menu {
        lines.push(BACK_TO_MENU_LINE.to_string());
    }
    lines.join("\n")
}

/// Render a step prompt followed by its option list.
///
/// Flow authors sometimes bake the list into the prompt text; when the prompt
/// already enumerates its options the list is not appended again.
pub fn render_step_prompt(prompt_text: &str, options: &[FlowOption], config: RenderConfig) -> String {
    if prompt_already_contains_options(prompt_text, options) {
        return prompt_text.to_string();
    }

    format!("{}\n{}", prompt_text, render_options_list(options, config))
}

/// Guidance reply for an out-of-scope message that did not close the lead.
pub fn format_out_of_scope_message(options: &[FlowOption]) -> String {
    if options.is_empty() {
        return "Puedo ayudarte solo con los servicios disponibles.".to_string();
    }

    [
        "Puedo ayudarte solo con los servicios disponibles.",
        "Si quieres ver las opciones válidas, responde: OPCIONES.",
    ]
    .join("\n")
}

/// Handoff message sent on every escalation.
pub fn format_handoff_message(human_forward_number: Option<&str>) -> String {
    match human_forward_number {
        Some(number) => format!(
            "Gracias. Te derivaré con un ejecutivo. También puedes escribir a {}.",
            number
        ),
        None => "Gracias. Te derivaré con un ejecutivo del equipo.".to_string(),
    }
}

/// Clamp a lead score into the 0..=100 contract.
pub fn clamp_score(score: i64) -> i32 {
    score.clamp(0, 100) as i32
}

/// Direct (deterministic) option match: bare number vs option order, exact
/// code, then exact or substring label match. First match wins.
pub fn extract_direct_option<'a>(input: &str, options: &'a [FlowOption]) -> Option<&'a FlowOption> {
    let text = normalize_input(input);
    if text.is_empty() {
        return None;
    }

    if let Some(captures) = number_pattern().captures(&text)
        && let Ok(order) = captures[1].parse::<i32>()
        && let Some(by_order) = options.iter().find(|o| o.option_order == order)
    {
        return Some(by_order);
    }

    for option in options {
        let code = normalize_input(&option.option_code);
        if !code.is_empty() && text == code {
            return Some(option);
        }
    }

    for option in options {
        let label = normalize_input(&option.label_text);
        if !label.is_empty() && (text == label || text.contains(&label)) {
            return Some(option);
        }
    }

    None
}

/// Whether normalized input matches one of the configured trigger phrases.
///
/// Short phrases (up to two words) must match exactly; longer ones also match
/// as substrings, so "quiero ver opciones" triggers on "ver opciones".
pub fn matches_phrase_set(input: &str, phrases: &[String]) -> bool {
    let text = normalize_input(input);
    if text.is_empty() {
        return false;
    }

    phrases.iter().any(|phrase| {
        let phrase = normalize_input(phrase);
        if phrase.is_empty() {
            return false;
        }
        if phrase.split_whitespace().count() >= 2 {
            text == phrase || text.contains(&phrase)
        } else {
            text == phrase
        }
    })
}
