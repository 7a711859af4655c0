mod multipart;
mod payments;
mod tickets;

pub use multipart::MultipartForm;
pub use payments::{PaymentListQuery, SubmitPaymentForm};
pub use tickets::{CreateTicketForm, CreateTicketResponse, UpdateTicketRequest};
