use crate::domain::request::{Approval, Purchase};

/// First completeness rule a request fails, in evaluation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletenessGap {
    MissingEmployeeId,
    PurchaseWithoutEvidence { index: usize },
    NoApprovals,
    ApprovalWithoutEvidence { index: usize },
}

impl CompletenessGap {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingEmployeeId => "missing_employee_id",
            Self::PurchaseWithoutEvidence { .. } => "purchase_without_evidence",
            Self::NoApprovals => "no_approvals",
            Self::ApprovalWithoutEvidence { .. } => "approval_without_evidence",
        }
    }
}

/// Evaluates the completeness rules in order and stops at the first failure.
pub fn first_gap(
    employee_id: Option<i64>,
    purchases: &[Purchase],
    approvals: &[Approval],
) -> Option<CompletenessGap> {
    if !employee_id.is_some_and(|id| id != 0) {
        return Some(CompletenessGap::MissingEmployeeId);
    }
    if let Some(index) = purchases.iter().position(|purchase| !purchase.has_evidence()) {
        return Some(CompletenessGap::PurchaseWithoutEvidence { index });
    }
    if approvals.is_empty() {
        return Some(CompletenessGap::NoApprovals);
    }
    if let Some(index) = approvals.iter().position(|approval| !approval.has_evidence()) {
        return Some(CompletenessGap::ApprovalWithoutEvidence { index });
    }
    None
}

pub fn is_complete(
    employee_id: Option<i64>,
    purchases: &[Purchase],
    approvals: &[Approval],
) -> bool {
    first_gap(employee_id, purchases, approvals).is_none()
}
