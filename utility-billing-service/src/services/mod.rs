pub mod customers;
pub mod gateway;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod payments;
pub mod reference;
pub mod remarks;
pub mod storage;
pub mod supabase;
pub mod tickets;

pub use customers::CustomerDirectory;
pub use gateway::{next_version, Condition, Filter, Operator, Record, StoreGateway};
pub use ledger::BillBalanceLedger;
pub use memory::InMemoryStore;
pub use payments::{PaymentProcessor, SubmitPayment};
pub use reference::TicketReferenceGenerator;
pub use remarks::RemarksAuditLog;
pub use storage::{BlobStore, LocalBlobStore, SupabaseBlobStore};
pub use supabase::SupabaseGateway;
pub use tickets::{CreateTicket, TicketWorkflowEngine};
