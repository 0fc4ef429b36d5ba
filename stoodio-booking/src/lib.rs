pub mod ranking;
pub mod job_board;
pub mod models;
pub mod finance;
pub mod session;
pub mod manager;
pub mod orchestrator;
pub mod memory;
pub mod broadcast;

pub use broadcast::BroadcastPublisher;
pub use finance::{Reconciliation, WalletLedger};
pub use manager::{BookingManager, CreditOutcome};
pub use memory::InMemoryStore;
pub use orchestrator::{CheckoutOrchestrator, CheckoutOutcome, MockCheckoutAdapter};
pub use session::SessionState;
