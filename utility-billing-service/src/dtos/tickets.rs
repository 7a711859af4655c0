use super::MultipartForm;
use crate::error::BillingError;
use crate::models::{Ticket, TicketChanges, TicketPriority, TicketStatus, Upload};
use crate::services::CreateTicket;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

#[derive(Debug, Validate)]
pub struct CreateTicketForm {
    #[validate(length(min = 1, max = 50, message = "account_number is required"))]
    pub account_number: String,
    #[validate(length(min = 1, max = 100, message = "category is required"))]
    pub category: String,
    #[validate(length(min = 1, max = 100, message = "subcategory is required"))]
    pub subcategory: String,
    #[validate(length(min = 1, message = "description is required"))]
    pub description: String,
    pub image: Option<Upload>,
}

impl CreateTicketForm {
    pub fn from_multipart(mut form: MultipartForm) -> Self {
        let image = form.take_file("image");
        Self {
            account_number: form.text("account_number").unwrap_or_default(),
            category: form.text("category").unwrap_or_default(),
            subcategory: form.text("subcategory").unwrap_or_default(),
            description: form.text("description").unwrap_or_default(),
            image,
        }
    }

    pub fn into_request(self) -> Result<CreateTicket, AppError> {
        self.validate()?;
        Ok(CreateTicket {
            account_number: self.account_number,
            category: self.category,
            subcategory: self.subcategory,
            description: self.description,
            image: self.image,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CreateTicketResponse {
    pub ticket_reference: String,
    pub ticket: Ticket,
}

impl From<Ticket> for CreateTicketResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            ticket_reference: ticket.ticket_reference.clone(),
            ticket,
        }
    }
}

/// Staff edit. Every field is optional; absent means unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTicketRequest {
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(alias = "ticket_remarks", alias = "remarks")]
    #[validate(length(max = 2000, message = "remark is too long"))]
    pub remark_text: Option<String>,
}

impl UpdateTicketRequest {
    pub fn into_changes(self) -> Result<TicketChanges, AppError> {
        self.validate()?;

        let status = match self.status.as_deref() {
            None => None,
            Some(raw) => Some(TicketStatus::from_string(raw).ok_or_else(|| {
                BillingError::validation(format!("unknown ticket status '{}'", raw))
            })?),
        };
        let priority = match self.priority.as_deref() {
            None => None,
            Some(raw) => Some(TicketPriority::from_string(raw).ok_or_else(|| {
                BillingError::validation(format!("unknown ticket priority '{}'", raw))
            })?),
        };

        Ok(TicketChanges {
            status,
            priority,
            remark_text: self.remark_text,
        })
    }
}
