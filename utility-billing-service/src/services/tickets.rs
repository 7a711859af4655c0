//! Ticket creation and lifecycle. Every change goes through one versioned
//! write so concurrent staff edits are never silently lost.

use super::customers::CustomerDirectory;
use super::gateway::{from_record, next_version, to_record, Filter, Record, StoreGateway};
use super::metrics;
use super::reference::TicketReferenceGenerator;
use super::remarks::RemarksAuditLog;
use super::storage::{ensure_upload_size, BlobStore, TICKET_IMAGE_PREFIX};
use crate::error::{BillingError, BillingResult};
use crate::models::{
    is_known_category, ticket_categories, NewTicket, Principal, Ticket, TicketChanges,
    TicketLocator, TicketPriority, TicketStatus, Upload,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const MAX_REFERENCE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct CreateTicket {
    pub account_number: String,
    pub category: String,
    pub subcategory: String,
    pub description: String,
    pub image: Option<Upload>,
}

#[derive(Clone)]
pub struct TicketWorkflowEngine {
    store: Arc<dyn StoreGateway>,
    customers: CustomerDirectory,
    blobs: Arc<dyn BlobStore>,
    references: TicketReferenceGenerator,
    table: String,
    max_update_attempts: u32,
    max_upload_bytes: usize,
}

impl TicketWorkflowEngine {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        customers: CustomerDirectory,
        blobs: Arc<dyn BlobStore>,
        table: impl Into<String>,
        max_update_attempts: u32,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            store,
            customers,
            blobs,
            references: TicketReferenceGenerator::new(),
            table: table.into(),
            max_update_attempts: max_update_attempts.max(1),
            max_upload_bytes,
        }
    }

    pub fn categories(&self) -> BTreeMap<&'static str, Vec<&'static str>> {
        ticket_categories()
    }

    #[instrument(skip(self, request), fields(account_number = %request.account_number, category = %request.category))]
    pub async fn create(&self, request: CreateTicket) -> BillingResult<Ticket> {
        let result = self.try_create(request).await;
        observe("create", &result);
        result
    }

    async fn try_create(&self, request: CreateTicket) -> BillingResult<Ticket> {
        let account_number = request.account_number.trim();
        let category = request.category.trim();
        let subcategory = request.subcategory.trim();
        let description = request.description.trim();

        if account_number.is_empty() {
            return Err(BillingError::validation("account_number is required"));
        }
        if description.is_empty() {
            return Err(BillingError::validation("description is required"));
        }
        if !is_known_category(category, subcategory) {
            return Err(BillingError::validation(format!(
                "unknown category '{}' / subcategory '{}'",
                category, subcategory
            )));
        }
        if let Some(image) = &request.image {
            ensure_upload_size(image, self.max_upload_bytes)?;
        }

        // A ticket for an unknown account is still accepted, just unlinked.
        let customer = self.customers.find_by_account(account_number).await?;
        if customer.is_none() {
            debug!(account_number, "No customer for account, creating unlinked ticket");
        }

        let reference = self.unused_reference().await?;

        let image = match request.image {
            Some(image) => Some(
                self.blobs
                    .store(
                        image.bytes,
                        &format!("{}/{}", TICKET_IMAGE_PREFIX, image.file_name),
                    )
                    .await?,
            ),
            None => None,
        };

        let now = Utc::now();
        let new_ticket = NewTicket {
            ticket_reference: reference,
            customer_id: customer.as_ref().map(|c| c.id),
            customer_name: customer.and_then(|c| c.name),
            account_number: account_number.to_string(),
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            subject: format!("{} - {}", category, subcategory),
            description: description.to_string(),
            status: TicketStatus::Open,
            priority: TicketPriority::Medium,
            remarks_history: Vec::new(),
            image,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let record = self.store.insert(&self.table, to_record(&new_ticket)?).await?;
        let ticket: Ticket = from_record(&self.table, record)?;

        info!(
            ticket_id = ticket.id,
            ticket_reference = %ticket.ticket_reference,
            "Ticket created"
        );
        Ok(ticket)
    }

    async fn unused_reference(&self) -> BillingResult<String> {
        for attempt in 1..=MAX_REFERENCE_ATTEMPTS {
            let reference = self.references.generate();
            let taken = Filter::new().eq("ticket_reference", reference.as_str());
            if self.store.get(&self.table, &taken).await?.is_empty() {
                return Ok(reference);
            }
            debug!(attempt, reference = %reference, "Ticket reference already taken");
        }
        Err(BillingError::Conflict(
            "could not allocate an unused ticket reference".to_string(),
        ))
    }

    #[instrument(skip(self, locator), fields(locator = %locator))]
    pub async fn get(&self, locator: &TicketLocator) -> BillingResult<Ticket> {
        let record = match locator {
            TicketLocator::Id(id) => self.store.get_one(&self.table, *id).await?,
            // Nothing stored can match a malformed reference.
            TicketLocator::Reference(reference)
                if !TicketReferenceGenerator::is_valid(reference) =>
            {
                None
            }
            TicketLocator::Reference(reference) => {
                let filter = Filter::new().eq("ticket_reference", reference.as_str());
                self.store.get(&self.table, &filter).await?.into_iter().next()
            }
        };

        match record {
            Some(record) => from_record(&self.table, record),
            None => Err(BillingError::TicketNotFound(locator.to_string())),
        }
    }

    /// All tickets, newest first.
    #[instrument(skip(self))]
    pub async fn list(&self) -> BillingResult<Vec<Ticket>> {
        let mut tickets = self
            .store
            .get(&self.table, &Filter::new())
            .await?
            .into_iter()
            .map(|record| from_record::<Ticket>(&self.table, record))
            .collect::<BillingResult<Vec<_>>>()?;

        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tickets)
    }

    /// Applies a partial change. A write against a stale version re-reads
    /// the ticket and applies the same change again.
    #[instrument(skip(self, locator, changes, principal), fields(locator = %locator, staff = %principal.id))]
    pub async fn update(
        &self,
        locator: &TicketLocator,
        changes: TicketChanges,
        principal: &Principal,
    ) -> BillingResult<Ticket> {
        let result = self.try_update(locator, &changes, principal).await;
        let action = if changes.status == Some(TicketStatus::Deleted) {
            "delete"
        } else {
            "update"
        };
        observe(action, &result);
        result
    }

    /// Soft delete: the ticket stays in the store with status `deleted`.
    pub async fn delete(&self, locator: &TicketLocator, principal: &Principal) -> BillingResult<Ticket> {
        let changes = TicketChanges {
            status: Some(TicketStatus::Deleted),
            ..Default::default()
        };
        self.update(locator, changes, principal).await
    }

    async fn try_update(
        &self,
        locator: &TicketLocator,
        changes: &TicketChanges,
        principal: &Principal,
    ) -> BillingResult<Ticket> {
        for attempt in 1..=self.max_update_attempts {
            let current = self.get(locator).await?;
            if changes.is_empty() {
                return Ok(current);
            }

            let partial = apply_changes(&current, changes, principal)?;
            let guard = Filter::by_id(current.id).at_version(current.version);

            if let Some(record) = self
                .store
                .update_where(&self.table, &guard, partial)
                .await?
                .into_iter()
                .next()
            {
                let updated: Ticket = from_record(&self.table, record)?;
                info!(
                    ticket_reference = %updated.ticket_reference,
                    status = updated.status.as_str(),
                    remarks = updated.remarks_history.len(),
                    "Ticket updated"
                );
                return Ok(updated);
            }

            debug!(
                ticket_id = current.id,
                attempt,
                version = ?current.version,
                "Stale ticket version, re-reading"
            );
        }

        Err(BillingError::Conflict(format!(
            "ticket {} was modified concurrently, retry the update",
            locator
        )))
    }
}

/// Builds the single write for `changes` on top of `current`: bumped
/// version, timestamp, any changed fields and the full remarks history.
fn apply_changes(
    current: &Ticket,
    changes: &TicketChanges,
    principal: &Principal,
) -> BillingResult<Record> {
    let now = Utc::now();
    let mut partial = Record::new();
    partial.insert(
        "version".to_string(),
        Value::from(next_version(current.version)),
    );
    partial.insert("updated_at".to_string(), Value::String(now.to_rfc3339()));

    if let Some(status) = changes.status {
        if !current.status.can_transition_to(status) {
            return Err(BillingError::InvalidTransition {
                from: current.status.as_str(),
                to: status.as_str(),
            });
        }
        partial.insert("status".to_string(), Value::from(status.as_str()));
    }

    if let Some(priority) = changes.priority {
        partial.insert("priority".to_string(), Value::from(priority.as_str()));
    }

    if let Some(text) = changes.remark() {
        let history =
            RemarksAuditLog::append(&current.remarks_history, &principal.display_name, text, now);
        partial.insert(
            "remarks_history".to_string(),
            serde_json::to_value(&history)
                .map_err(|e| BillingError::validation(format!("unserializable remarks: {}", e)))?,
        );
        partial.insert("remarks".to_string(), Value::from(text));
    }

    Ok(partial)
}

fn observe<T>(action: &str, result: &BillingResult<T>) {
    match result {
        Ok(_) => metrics::record_ticket(action, "ok"),
        Err(e) => {
            warn!(action, kind = e.kind(), error = %e, "Ticket operation failed");
            metrics::record_ticket(action, e.kind());
            metrics::record_error(e.kind());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StaffRole;

    fn ticket(status: TicketStatus) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: 1,
            ticket_reference: "TKT-1732000000000-042".to_string(),
            customer_id: None,
            customer_name: None,
            account_number: "511901200173".to_string(),
            category: "Technical".to_string(),
            subcategory: "Report Leak".to_string(),
            subject: "Technical - Report Leak".to_string(),
            description: "Leak".to_string(),
            status,
            priority: TicketPriority::Medium,
            remarks: None,
            remarks_history: Vec::new(),
            image: None,
            version: Some(4),
            created_at: now,
            updated_at: now,
        }
    }

    fn staff() -> Principal {
        Principal::new("7", "Maria Santos", StaffRole::MeterHandler)
    }

    #[test]
    fn test_apply_changes_builds_single_write() {
        let changes = TicketChanges {
            status: Some(TicketStatus::Pending),
            priority: None,
            remark_text: Some("Inspected meter".to_string()),
        };

        let partial = apply_changes(&ticket(TicketStatus::Open), &changes, &staff()).unwrap();

        assert_eq!(partial["version"], 5);
        assert_eq!(partial["status"], "pending");
        assert_eq!(partial["remarks"], "Inspected meter");
        assert_eq!(partial["remarks_history"][0]["sequence"], 1);
        assert_eq!(partial["remarks_history"][0]["author"], "Maria Santos");
        assert!(!partial.contains_key("priority"));
    }

    #[test]
    fn test_apply_changes_rejects_leaving_deleted() {
        let changes = TicketChanges {
            status: Some(TicketStatus::Open),
            ..Default::default()
        };

        let err = apply_changes(&ticket(TicketStatus::Deleted), &changes, &staff()).unwrap_err();
        assert!(matches!(
            err,
            BillingError::InvalidTransition {
                from: "deleted",
                to: "open"
            }
        ));
        assert_eq!(err.kind(), "ValidationError");
    }
}
