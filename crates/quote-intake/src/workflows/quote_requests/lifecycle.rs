use serde::Serialize;

use super::domain::QuoteStatus;

/// Fulfillment steps guarded by the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentAction {
    SendQuote,
    SendPolicy,
}

impl FulfillmentAction {
    pub const fn label(self) -> &'static str {
        match self {
            FulfillmentAction::SendQuote => "send a quote",
            FulfillmentAction::SendPolicy => "send a policy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {} while the quote request is {}", .action.label(), .status.label())]
pub struct StateTransitionError {
    pub action: FulfillmentAction,
    pub status: QuoteStatus,
}

/// Statuses the natural workflow may move to from `status`.
///
/// `Completed` and `Rejected` have no successors; only the administrative override
/// leaves them.
pub const fn natural_successors(status: QuoteStatus) -> &'static [QuoteStatus] {
    match status {
        QuoteStatus::Pending => &[QuoteStatus::QuoteSent, QuoteStatus::Rejected],
        QuoteStatus::QuoteSent => &[QuoteStatus::Completed, QuoteStatus::Rejected],
        QuoteStatus::Completed | QuoteStatus::Rejected => &[],
    }
}

pub const fn is_terminal(status: QuoteStatus) -> bool {
    natural_successors(status).is_empty()
}

/// Status after a quote is sent. A rejected request may be re-quoted but stays rejected.
pub fn after_quote(current: QuoteStatus) -> Result<QuoteStatus, StateTransitionError> {
    advance(current, FulfillmentAction::SendQuote, QuoteStatus::QuoteSent)
}

/// Status after a policy is sent. Quoted requests complete; rejected ones accept the
/// documents but stay rejected.
pub fn after_policy(current: QuoteStatus) -> Result<QuoteStatus, StateTransitionError> {
    advance(current, FulfillmentAction::SendPolicy, QuoteStatus::Completed)
}

fn advance(
    current: QuoteStatus,
    action: FulfillmentAction,
    target: QuoteStatus,
) -> Result<QuoteStatus, StateTransitionError> {
    if natural_successors(current).contains(&target) {
        return Ok(target);
    }
    // Fulfillment documents may still be attached to a rejected request.
    if current == QuoteStatus::Rejected {
        return Ok(current);
    }
    Err(StateTransitionError {
        action,
        status: current,
    })
}
