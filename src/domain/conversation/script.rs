//! The default conversation script.
//!
//! Main menu, Tech Ops qualification and pre-analysis, domain and contact
//! collection up to payment, the client area and support. Every state of
//! [`ConversationState`] has a handler here.

use super::{
    keys, ConversationState, Effect, RegistryError, Scratchpad, ScratchpadPatch, StateRegistry,
    Transition,
};
use crate::domain::foundation::UserId;
use crate::domain::provisioning::{normalize_domain, validate_email};

use ConversationState as S;

pub const MAIN_MENU: &str = "Hello! Welcome to Dresbach Hosting do Brasil.\n\n\
How can we help you?\n\
1 - Tech Ops: specialised consulting\n\
2 - Client area: hosting\n\
3 - Talk to support\n\n\
Type the number of the option you want.";

const BUSINESS_TYPE_PROMPT: &str = "To get started, what type of business do you run?";
const HAS_SYSTEM_PROMPT: &str = "Do you already have a website or system running? (yes / no)";
const CONCERN_PROMPT: &str = "What is your main concern today?\n\
1 - Security / intrusion\n\
2 - LGPD / legal\n\
3 - Technical structure / performance\n\
4 - I don't know where to start";
const HISTORY_PROMPT: &str =
    "Have you ever had a problem such as an intrusion, a data leak or an outage? (yes / no)";
const REPO_PROMPT: &str =
    "Let's run a quick pre-analysis. Do you have a code repository we can review? (yes / no)";
const REPO_LINK_PROMPT: &str = "Please send the repository link.";
const SITE_PROMPT: &str = "Is the system already online? (yes / no)";
const SITE_LINK_PROMPT: &str = "Please send the address where the system is running.";
const PROBLEM_PROMPT: &str = "Briefly describe the main problem you are facing.";
const DOMAIN_PROMPT: &str = "Which domain will your hosting use? (for example: mycompany.com.br)";
const EMAIL_PROMPT: &str = "Which e-mail address should receive the account details?";
const CPF_PROMPT: &str = "To access the client area, please enter your CPF (11 digits).";
const CLIENT_MENU: &str = "Client area. What do you need?\n\
1 - My services\n\
2 - My domains\n\
3 - Invoices\n\
4 - Open a ticket\n\
0 - Back to the main menu";
const SUPPORT_PROMPT: &str = "Tell us briefly what you need help with and a specialist will get back to you.";
const YES_NO_HINT: &str = "Please answer yes or no.";

/// Builds the registry with the full default script.
pub fn default_script() -> Result<StateRegistry, RegistryError> {
    let mut registry = StateRegistry::new();
    registry.register(S::Initial, main_menu)?;
    registry.register(S::TechOpsStart, tech_ops_start)?;
    registry.register(S::TechOpsHasSystem, tech_ops_has_system)?;
    registry.register(S::TechOpsPainPoint, tech_ops_pain_point)?;
    registry.register(S::TechOpsHistory, tech_ops_history)?;
    registry.register(S::TechOpsPreAnalysisRepo, pre_analysis_repo)?;
    registry.register(S::TechOpsPreAnalysisRepoLink, pre_analysis_repo_link)?;
    registry.register(S::TechOpsPreAnalysisSite, pre_analysis_site)?;
    registry.register(S::TechOpsPreAnalysisSiteLink, pre_analysis_site_link)?;
    registry.register(S::TechOpsPreAnalysisProblem, pre_analysis_problem)?;
    registry.register(S::TechOpsAskDomain, ask_domain)?;
    registry.register(S::TechOpsCheckDomainOwner, check_domain_owner)?;
    registry.register(S::TechOpsHandleTransfer, handle_transfer)?;
    registry.register(S::TechOpsHandleRegister, handle_register)?;
    registry.register(S::TechOpsContactEmail, contact_email)?;
    registry.register(S::AwaitingPayment, awaiting_payment)?;
    registry.register(S::AwaitingCredentials, awaiting_credentials)?;
    registry.register(S::ClientLogin, client_login)?;
    registry.register(S::ClientMainMenu, client_main_menu)?;
    registry.register(S::Support, support)?;
    Ok(registry)
}

// ════════════════════════════════════════════════════════════════════════════
// Input helpers
// ════════════════════════════════════════════════════════════════════════════

fn normalized(input: &str) -> String {
    input.trim().to_lowercase()
}

fn yes_no(input: &str) -> Option<bool> {
    match normalized(input).as_str() {
        "yes" | "y" | "sim" | "s" => Some(true),
        "no" | "n" | "não" | "nao" => Some(false),
        _ => None,
    }
}

fn looks_like_link(input: &str) -> bool {
    let link = input.trim();
    !link.is_empty() && !link.contains(char::is_whitespace) && link.contains('.')
}

fn cpf_digits(input: &str) -> Option<String> {
    let digits: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | ' '))
        .collect();
    (digits.len() == 11 && digits.chars().all(|c| c.is_ascii_digit())).then_some(digits)
}

fn yes_no_label(answer: bool) -> &'static str {
    if answer {
        "yes"
    } else {
        "no"
    }
}

fn domain_of(pad: &Scratchpad) -> &str {
    pad.get(keys::DOMAIN).unwrap_or("your domain")
}

// ════════════════════════════════════════════════════════════════════════════
// Main menu
// ════════════════════════════════════════════════════════════════════════════

fn main_menu(_: &UserId, _: &Scratchpad, input: &str) -> Transition {
    match normalized(input).as_str() {
        "1" => Transition::to(S::TechOpsStart, BUSINESS_TYPE_PROMPT)
            .with_patch(ScratchpadPatch::none().clear()),
        "2" => Transition::to(S::ClientLogin, CPF_PROMPT),
        "3" => Transition::to(S::Support, SUPPORT_PROMPT),
        _ => Transition::stay(S::Initial, MAIN_MENU),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tech Ops qualification
// ════════════════════════════════════════════════════════════════════════════

fn tech_ops_start(_: &UserId, _: &Scratchpad, input: &str) -> Transition {
    let business = input.trim();
    if business.is_empty() {
        return Transition::stay(S::TechOpsStart, BUSINESS_TYPE_PROMPT);
    }
    Transition::to(S::TechOpsHasSystem, HAS_SYSTEM_PROMPT)
        .with_patch(ScratchpadPatch::none().set(keys::BUSINESS_TYPE, business))
}

fn tech_ops_has_system(_: &UserId, _: &Scratchpad, input: &str) -> Transition {
    match yes_no(input) {
        Some(answer) => Transition::to(S::TechOpsPainPoint, CONCERN_PROMPT)
            .with_patch(ScratchpadPatch::none().set(keys::HAS_SYSTEM, yes_no_label(answer))),
        None => Transition::stay(S::TechOpsHasSystem, YES_NO_HINT),
    }
}

fn tech_ops_pain_point(_: &UserId, _: &Scratchpad, input: &str) -> Transition {
    let concern = match normalized(input).as_str() {
        "1" => "security",
        "2" => "lgpd",
        "3" => "infrastructure",
        "4" => "unsure",
        _ => return Transition::stay(S::TechOpsPainPoint, CONCERN_PROMPT),
    };
    Transition::to(S::TechOpsHistory, HISTORY_PROMPT)
        .with_patch(ScratchpadPatch::none().set(keys::MAIN_CONCERN, concern))
}

fn tech_ops_history(_: &UserId, _: &Scratchpad, input: &str) -> Transition {
    match yes_no(input) {
        Some(answer) => Transition::to(S::TechOpsPreAnalysisRepo, REPO_PROMPT).with_patch(
            ScratchpadPatch::none().set(keys::INCIDENT_HISTORY, yes_no_label(answer)),
        ),
        None => Transition::stay(S::TechOpsHistory, YES_NO_HINT),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Pre-analysis
// ════════════════════════════════════════════════════════════════════════════

fn pre_analysis_repo(_: &UserId, _: &Scratchpad, input: &str) -> Transition {
    match yes_no(input) {
        Some(true) => Transition::to(S::TechOpsPreAnalysisRepoLink, REPO_LINK_PROMPT),
        Some(false) => Transition::to(S::TechOpsPreAnalysisSite, SITE_PROMPT),
        None => Transition::stay(S::TechOpsPreAnalysisRepo, YES_NO_HINT),
    }
}

fn pre_analysis_repo_link(_: &UserId, _: &Scratchpad, input: &str) -> Transition {
    if !looks_like_link(input) {
        return Transition::stay(
            S::TechOpsPreAnalysisRepoLink,
            "That doesn't look like a link. Please send the repository URL.",
        );
    }
    Transition::to(S::TechOpsPreAnalysisSite, SITE_PROMPT)
        .with_patch(ScratchpadPatch::none().set(keys::REPO_URL, input.trim()))
}

fn pre_analysis_site(_: &UserId, _: &Scratchpad, input: &str) -> Transition {
    match yes_no(input) {
        Some(true) => Transition::to(S::TechOpsPreAnalysisSiteLink, SITE_LINK_PROMPT),
        Some(false) => Transition::to(S::TechOpsPreAnalysisProblem, PROBLEM_PROMPT),
        None => Transition::stay(S::TechOpsPreAnalysisSite, YES_NO_HINT),
    }
}

fn pre_analysis_site_link(_: &UserId, _: &Scratchpad, input: &str) -> Transition {
    if !looks_like_link(input) {
        return Transition::stay(
            S::TechOpsPreAnalysisSiteLink,
            "That doesn't look like an address. Please send the site URL.",
        );
    }
    Transition::to(S::TechOpsPreAnalysisProblem, PROBLEM_PROMPT)
        .with_patch(ScratchpadPatch::none().set(keys::SYSTEM_URL, input.trim()))
}

fn pre_analysis_problem(_: &UserId, _: &Scratchpad, input: &str) -> Transition {
    let problem = input.trim();
    if problem.is_empty() {
        return Transition::stay(S::TechOpsPreAnalysisProblem, PROBLEM_PROMPT);
    }
    Transition::to(S::TechOpsAskDomain, DOMAIN_PROMPT)
        .with_patch(ScratchpadPatch::none().set(keys::PROBLEM_DESCRIPTION, problem))
}

// ════════════════════════════════════════════════════════════════════════════
// Domain and contact
// ════════════════════════════════════════════════════════════════════════════

fn ask_domain(_: &UserId, _: &Scratchpad, input: &str) -> Transition {
    match normalize_domain(input) {
        Ok(domain) => Transition::to(
            S::TechOpsCheckDomainOwner,
            format!("Do you already own {domain}? (yes / no)"),
        )
        .with_patch(ScratchpadPatch::none().set(keys::DOMAIN, domain)),
        Err(_) => Transition::stay(
            S::TechOpsAskDomain,
            "That doesn't look like a valid domain. Please try again (for example: mycompany.com.br).",
        ),
    }
}

fn check_domain_owner(_: &UserId, pad: &Scratchpad, input: &str) -> Transition {
    let domain = domain_of(pad);
    match yes_no(input) {
        Some(true) => Transition::to(
            S::TechOpsHandleTransfer,
            format!(
                "Great. We'll point {domain} to our servers once your account is ready. \
                 Type OK to continue."
            ),
        )
        .with_patch(ScratchpadPatch::none().set(keys::DOMAIN_ACTION, "transfer")),
        Some(false) => Transition::to(
            S::TechOpsHandleRegister,
            format!("No problem. We'll register {domain} for you. Type OK to continue."),
        )
        .with_patch(ScratchpadPatch::none().set(keys::DOMAIN_ACTION, "register")),
        None => Transition::stay(S::TechOpsCheckDomainOwner, YES_NO_HINT),
    }
}

fn confirm_domain_action(current: ConversationState, input: &str) -> Transition {
    if normalized(input) == "ok" {
        Transition::to(S::TechOpsContactEmail, EMAIL_PROMPT)
    } else {
        Transition::stay(current, "Please type OK to confirm and continue.")
    }
}

fn handle_transfer(_: &UserId, _: &Scratchpad, input: &str) -> Transition {
    confirm_domain_action(S::TechOpsHandleTransfer, input)
}

fn handle_register(_: &UserId, _: &Scratchpad, input: &str) -> Transition {
    confirm_domain_action(S::TechOpsHandleRegister, input)
}

fn contact_email(_: &UserId, pad: &Scratchpad, input: &str) -> Transition {
    let email = input.trim();
    if validate_email(email).is_err() {
        return Transition::stay(
            S::TechOpsContactEmail,
            "That doesn't look like a valid e-mail. Please try again.",
        );
    }
    let domain = domain_of(pad);
    Transition::to(
        S::AwaitingPayment,
        format!(
            "All set! Complete the payment for {domain} using this secure link. \
             We'll let you know here as soon as it is confirmed."
        ),
    )
    .with_patch(ScratchpadPatch::none().set(keys::CONTACT_EMAIL, email))
    .with_effect(Effect::StartCheckout {
        domain: domain.to_string(),
        contact_email: email.to_string(),
    })
}

// ════════════════════════════════════════════════════════════════════════════
// Payment
// ════════════════════════════════════════════════════════════════════════════

fn awaiting_payment(_: &UserId, pad: &Scratchpad, input: &str) -> Transition {
    if matches!(normalized(input).as_str(), "cancel" | "cancelar") {
        return Transition::to(S::Initial, format!("Order cancelled.\n\n{MAIN_MENU}")).with_patch(
            ScratchpadPatch::none()
                .remove(keys::DOMAIN)
                .remove(keys::DOMAIN_ACTION)
                .remove(keys::CONTACT_EMAIL)
                .remove(keys::CHECKOUT_REFERENCE)
                .remove(keys::CHECKOUT_URL),
        );
    }
    let link = pad
        .get(keys::CHECKOUT_URL)
        .map(|url| format!("\nPayment link: {url}"))
        .unwrap_or_default();
    Transition::stay(
        S::AwaitingPayment,
        format!(
            "We're still waiting for the payment confirmation for {}.{link}\n\
             Type CANCEL to start over.",
            domain_of(pad)
        ),
    )
}

fn awaiting_credentials(_: &UserId, pad: &Scratchpad, input: &str) -> Transition {
    if normalized(input) == "menu" {
        return Transition::to(S::Initial, MAIN_MENU);
    }
    let domain = pad
        .get(keys::PROVISIONED_DOMAIN)
        .unwrap_or_else(|| domain_of(pad));
    Transition::stay(
        S::AwaitingCredentials,
        format!(
            "Your hosting account for {domain} has been created. The access credentials \
             will be sent to your e-mail shortly. Type MENU to return to the main menu."
        ),
    )
}

// ════════════════════════════════════════════════════════════════════════════
// Client area and support
// ════════════════════════════════════════════════════════════════════════════

fn client_login(_: &UserId, _: &Scratchpad, input: &str) -> Transition {
    match cpf_digits(input) {
        Some(cpf) => Transition::to(S::ClientMainMenu, CLIENT_MENU)
            .with_patch(ScratchpadPatch::none().set(keys::CLIENT_DOCUMENT, cpf)),
        None => Transition::stay(
            S::ClientLogin,
            "Invalid CPF. Please enter the 11 digits of your CPF.",
        ),
    }
}

fn client_main_menu(_: &UserId, _: &Scratchpad, input: &str) -> Transition {
    let request = match normalized(input).as_str() {
        "0" => return Transition::to(S::Initial, MAIN_MENU),
        "1" => "services",
        "2" => "domains",
        "3" => "invoices",
        "4" => "ticket",
        _ => return Transition::stay(S::ClientMainMenu, CLIENT_MENU),
    };
    Transition::to(
        S::Initial,
        format!(
            "Your request about {request} was forwarded to our team. \
             A specialist will contact you shortly."
        ),
    )
    .with_patch(ScratchpadPatch::none().set(keys::CLIENT_REQUEST, request))
}

fn support(_: &UserId, _: &Scratchpad, input: &str) -> Transition {
    let request = input.trim();
    if request.is_empty() {
        return Transition::stay(S::Support, SUPPORT_PROMPT);
    }
    Transition::to(
        S::Initial,
        "Thanks! Your request was registered and a specialist will contact you shortly.",
    )
    .with_patch(ScratchpadPatch::none().set(keys::SUPPORT_REQUEST, request))
}
