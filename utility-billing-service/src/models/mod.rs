//! Domain models for utility-billing-service.

mod bill;
mod customer;
mod payment;
mod principal;
mod ticket;
mod upload;

pub use bill::{Bill, BillStatus};
pub use customer::Customer;
pub use payment::{ListPaymentsFilter, NewPayment, Payment, PaymentStatus, PaymentType};
pub use principal::{Principal, StaffRole};
pub use ticket::{
    is_known_category, ticket_categories, NewTicket, RemarkEntry, Ticket, TicketChanges, TicketLocator,
    TicketPriority, TicketStatus, TICKET_CATEGORIES,
};
pub use upload::Upload;
