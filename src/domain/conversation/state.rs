//! Conversation states.
//!
//! Every point of the scripted conversation is a variant of
//! [`ConversationState`]. Variants are declared in script order, so the
//! derived `Ord` follows the flow from the root menu onwards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in the conversation script.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationState {
    /// Root menu. Every new or expired session starts here.
    #[default]
    Initial,

    // Tech Ops: lead qualification
    TechOpsStart,
    TechOpsHasSystem,
    TechOpsPainPoint,
    TechOpsHistory,

    // Tech Ops: pre-analysis
    TechOpsPreAnalysisRepo,
    TechOpsPreAnalysisRepoLink,
    TechOpsPreAnalysisSite,
    TechOpsPreAnalysisSiteLink,
    TechOpsPreAnalysisProblem,

    // Tech Ops: domain and order
    TechOpsAskDomain,
    TechOpsCheckDomainOwner,
    TechOpsHandleTransfer,
    TechOpsHandleRegister,
    TechOpsContactEmail,

    /// Order placed, waiting for the payment provider to confirm.
    AwaitingPayment,

    /// Payment confirmed and account provisioned; credentials pending.
    AwaitingCredentials,

    // Client area
    ClientLogin,
    ClientMainMenu,

    /// Free-text support request.
    Support,
}

impl ConversationState {
    /// All states in declaration order.
    pub const ALL: [ConversationState; 20] = [
        ConversationState::Initial,
        ConversationState::TechOpsStart,
        ConversationState::TechOpsHasSystem,
        ConversationState::TechOpsPainPoint,
        ConversationState::TechOpsHistory,
        ConversationState::TechOpsPreAnalysisRepo,
        ConversationState::TechOpsPreAnalysisRepoLink,
        ConversationState::TechOpsPreAnalysisSite,
        ConversationState::TechOpsPreAnalysisSiteLink,
        ConversationState::TechOpsPreAnalysisProblem,
        ConversationState::TechOpsAskDomain,
        ConversationState::TechOpsCheckDomainOwner,
        ConversationState::TechOpsHandleTransfer,
        ConversationState::TechOpsHandleRegister,
        ConversationState::TechOpsContactEmail,
        ConversationState::AwaitingPayment,
        ConversationState::AwaitingCredentials,
        ConversationState::ClientLogin,
        ConversationState::ClientMainMenu,
        ConversationState::Support,
    ];

    /// The state every conversation starts in.
    pub fn initial() -> Self {
        ConversationState::Initial
    }

    /// Returns true for the initial state.
    pub fn is_initial(&self) -> bool {
        matches!(self, Self::Initial)
    }

    /// Returns true if the session is waiting on the payment ingress
    /// rather than on the user.
    pub fn is_awaiting_payment(&self) -> bool {
        matches!(self, Self::AwaitingPayment)
    }

    /// Returns the stable wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "INITIAL",
            Self::TechOpsStart => "TECH_OPS_START",
            Self::TechOpsHasSystem => "TECH_OPS_HAS_SYSTEM",
            Self::TechOpsPainPoint => "TECH_OPS_PAIN_POINT",
            Self::TechOpsHistory => "TECH_OPS_HISTORY",
            Self::TechOpsPreAnalysisRepo => "TECH_OPS_PRE_ANALYSIS_REPO",
            Self::TechOpsPreAnalysisRepoLink => "TECH_OPS_PRE_ANALYSIS_REPO_LINK",
            Self::TechOpsPreAnalysisSite => "TECH_OPS_PRE_ANALYSIS_SITE",
            Self::TechOpsPreAnalysisSiteLink => "TECH_OPS_PRE_ANALYSIS_SITE_LINK",
            Self::TechOpsPreAnalysisProblem => "TECH_OPS_PRE_ANALYSIS_PROBLEM",
            Self::TechOpsAskDomain => "TECH_OPS_ASK_DOMAIN",
            Self::TechOpsCheckDomainOwner => "TECH_OPS_CHECK_DOMAIN_OWNER",
            Self::TechOpsHandleTransfer => "TECH_OPS_HANDLE_TRANSFER",
            Self::TechOpsHandleRegister => "TECH_OPS_HANDLE_REGISTER",
            Self::TechOpsContactEmail => "TECH_OPS_CONTACT_EMAIL",
            Self::AwaitingPayment => "AWAITING_PAYMENT",
            Self::AwaitingCredentials => "AWAITING_CREDENTIALS",
            Self::ClientLogin => "CLIENT_LOGIN",
            Self::ClientMainMenu => "CLIENT_MAIN_MENU",
            Self::Support => "SUPPORT",
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
