//! Shape checks for inbound payloads, applied before anything reaches the lifecycle engine.

use rust_decimal::Decimal;

use crate::domain::request::{NewRequest, Purchase, RequestUpdate};
use crate::errors::DomainError;

pub const MAX_COST: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);
pub const MAX_COMMENT_CHARS: usize = 300;

pub fn check_submission(submission: &NewRequest) -> Result<(), DomainError> {
    require_name("firstName", &submission.first_name)?;
    require_name("lastName", &submission.last_name)?;

    let idir = submission.idir.trim();
    if idir.is_empty() || !idir.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(invalid("idir must be a non-empty alphanumeric identity code"));
    }
    if submission.employee_id.is_some_and(|id| id < 0) {
        return Err(invalid("employeeId must not be negative"));
    }

    check_purchases(&submission.purchases)?;
    check_comments(submission.additional_comments.as_deref())
}

pub fn check_update(update: &RequestUpdate) -> Result<(), DomainError> {
    if update.employee_id.is_some_and(|id| id < 0) {
        return Err(invalid("employeeId must not be negative"));
    }
    if let Some(purchases) = &update.purchases {
        check_purchases(purchases)?;
    }
    check_comments(update.additional_comments.as_deref())
}

fn check_purchases(purchases: &[Purchase]) -> Result<(), DomainError> {
    for (index, purchase) in purchases.iter().enumerate() {
        if purchase.supplier.trim().is_empty() {
            return Err(invalid(format!("purchases[{index}].supplier is required")));
        }
        if purchase.cost.is_sign_negative() || purchase.cost > MAX_COST {
            return Err(invalid(format!(
                "purchases[{index}].cost must be between 0 and {MAX_COST}"
            )));
        }
    }
    Ok(())
}

fn check_comments(comments: Option<&str>) -> Result<(), DomainError> {
    match comments {
        Some(text) if text.chars().count() > MAX_COMMENT_CHARS => Err(invalid(format!(
            "additionalComments must be at most {MAX_COMMENT_CHARS} characters"
        ))),
        _ => Ok(()),
    }
}

fn require_name(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{field} is required")));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> DomainError {
    DomainError::InvalidSubmission(message.into())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{check_submission, check_update};
    use crate::domain::request::{NewRequest, Purchase, RequestUpdate};
    use crate::errors::DomainError;

    fn purchase(cost: Decimal) -> Purchase {
        Purchase {
            supplier: "X".to_string(),
            purchase_date: "2024-01-01T00:00:00-07:00".parse().expect("date"),
            cost,
            files: Vec::new(),
        }
    }

    fn submission() -> NewRequest {
        NewRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            employee_id: Some(1),
            idir: "AAAA0001".to_string(),
            email: None,
            purchases: vec![purchase(Decimal::new(10, 0))],
            approvals: Vec::new(),
            additional_comments: None,
            late_entry: false,
            submit: true,
        }
    }

    #[test]
    fn accepts_well_formed_submission() {
        assert_eq!(check_submission(&submission()), Ok(()));
    }

    #[test]
    fn cost_is_bounded() {
        let mut over = submission();
        over.purchases = vec![purchase(Decimal::new(1_000_001, 2))];
        assert!(matches!(check_submission(&over), Err(DomainError::InvalidSubmission(_))));

        let mut negative = submission();
        negative.purchases = vec![purchase(Decimal::new(-1, 0))];
        assert!(check_submission(&negative).is_err());

        let mut limit = submission();
        limit.purchases = vec![purchase(Decimal::new(10_000, 0))];
        assert_eq!(check_submission(&limit), Ok(()));
    }

    #[test]
    fn comments_are_capped_at_300_chars() {
        let update = RequestUpdate {
            additional_comments: Some("x".repeat(301)),
            ..RequestUpdate::default()
        };
        assert!(check_update(&update).is_err());

        let update = RequestUpdate {
            additional_comments: Some("x".repeat(300)),
            ..RequestUpdate::default()
        };
        assert_eq!(check_update(&update), Ok(()));
    }

    #[test]
    fn idir_must_be_alphanumeric() {
        let mut bad = submission();
        bad.idir = "AAAA 0001".to_string();
        assert!(check_submission(&bad).is_err());

        bad.idir = String::new();
        assert!(check_submission(&bad).is_err());
    }
}
