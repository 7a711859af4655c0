use super::MultipartForm;
use crate::error::BillingError;
use crate::models::{ListPaymentsFilter, PaymentStatus, PaymentType, Upload};
use crate::services::SubmitPayment;
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use std::str::FromStr;
use validator::Validate;

/// Raw payment submission as posted by the customer portal.
#[derive(Debug, Validate)]
pub struct SubmitPaymentForm {
    #[validate(length(min = 1, message = "customer_id is required"))]
    pub customer_id: String,
    #[validate(length(min = 1, message = "bill_id is required"))]
    pub bill_id: String,
    #[validate(length(min = 1, message = "amount is required"))]
    pub amount: String,
    #[validate(length(min = 1, message = "payment_type is required"))]
    pub payment_type: String,
    #[validate(length(min = 1, max = 50, message = "payment_method is required"))]
    pub payment_method: String,
    #[validate(length(min = 1, max = 50, message = "account_number is required"))]
    pub account_number: String,
    #[validate(length(min = 1, max = 50, message = "meter_number is required"))]
    pub meter_number: String,
    #[validate(length(max = 128))]
    pub idempotency_key: Option<String>,
    pub user_id: Option<String>,
    pub proof: Option<Upload>,
}

impl SubmitPaymentForm {
    pub fn from_multipart(mut form: MultipartForm) -> Self {
        let proof = form.take_file("proof_of_payment");
        Self {
            customer_id: form.text("customer_id").unwrap_or_default(),
            bill_id: form.text("bill_id").unwrap_or_default(),
            amount: form.text("amount").unwrap_or_default(),
            payment_type: form.text("payment_type").unwrap_or_default(),
            payment_method: form.text("payment_method").unwrap_or_default(),
            account_number: form.text("account_number").unwrap_or_default(),
            meter_number: form.text("meter_number").unwrap_or_default(),
            idempotency_key: form.text("idempotency_key"),
            user_id: form.text("user_id"),
            proof,
        }
    }

    /// Validates the raw fields and converts them to typed input.
    pub fn into_request(self) -> Result<SubmitPayment, AppError> {
        self.validate()?;

        let customer_id = parse_id("customer_id", &self.customer_id)?;
        let bill_id = parse_id("bill_id", &self.bill_id)?;
        let amount = Decimal::from_str(&self.amount)
            .map_err(|_| BillingError::validation(format!("amount '{}' is not a number", self.amount)))?;
        let payment_type = PaymentType::from_string(&self.payment_type).ok_or_else(|| {
            BillingError::validation("payment_type must be Full or Partial")
        })?;
        let proof = self
            .proof
            .ok_or_else(|| BillingError::validation("proof_of_payment image is required"))?;

        Ok(SubmitPayment {
            customer_id,
            bill_id,
            amount,
            payment_type,
            payment_method: self.payment_method,
            account_number: self.account_number,
            meter_number: self.meter_number,
            proof,
            user_id: self.user_id,
            idempotency_key: self.idempotency_key,
        })
    }
}

fn parse_id(field: &str, raw: &str) -> Result<i64, BillingError> {
    raw.parse()
        .map_err(|_| BillingError::validation(format!("{} must be an integer", field)))
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentListQuery {
    pub status: Option<String>,
    pub customer_id: Option<i64>,
    pub bill_id: Option<i64>,
    pub customer_type: Option<String>,
}

impl TryFrom<PaymentListQuery> for ListPaymentsFilter {
    type Error = BillingError;

    fn try_from(query: PaymentListQuery) -> Result<Self, Self::Error> {
        let status = match query.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(PaymentStatus::from_string(raw).ok_or_else(|| {
                BillingError::validation(format!("unknown payment status '{}'", raw))
            })?),
        };
        let customer_type = query
            .customer_type
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty() && t != "all");

        Ok(ListPaymentsFilter {
            status,
            customer_id: query.customer_id,
            bill_id: query.bill_id,
            customer_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(amount: &str, payment_type: &str) -> MultipartForm {
        MultipartForm::from_parts(
            &[
                ("customer_id", "3"),
                ("bill_id", "7"),
                ("amount", amount),
                ("payment_type", payment_type),
                ("payment_method", "GCash"),
                ("account_number", "511901200173"),
                ("meter_number", "MTR-0042"),
            ],
            vec![("proof_of_payment", Upload::new("r.png", vec![1, 2, 3]))],
        )
    }

    #[test]
    fn test_form_converts_to_typed_request() {
        let request = SubmitPaymentForm::from_multipart(form("1500.00", "full"))
            .into_request()
            .unwrap();

        assert_eq!(request.amount, Decimal::new(150000, 2));
        assert_eq!(request.payment_type, PaymentType::Full);
        assert_eq!(request.bill_id, 7);
        assert_eq!(request.proof.len(), 3);
    }

    #[test]
    fn test_bad_amount_is_validation_error() {
        let err = SubmitPaymentForm::from_multipart(form("lots", "full"))
            .into_request()
            .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn test_missing_fields_fail_validation() {
        let form = MultipartForm::from_parts(&[("amount", "10")], Vec::new());
        let err = SubmitPaymentForm::from_multipart(form)
            .into_request()
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn test_list_query_all_means_no_filter() {
        let filter = ListPaymentsFilter::try_from(PaymentListQuery {
            status: Some("all".to_string()),
            customer_type: Some("Residential".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert!(filter.status.is_none());
        assert_eq!(filter.customer_type.as_deref(), Some("Residential"));
    }
}
