// Application layer - use cases and orchestration.
// The transfer engine owns the transactional algorithm; the service adds the
// account-level checks a client performs before asking for a transfer.

pub mod error;
mod service;
mod transfer_tx;

pub use error::*;
pub use service::*;
pub use transfer_tx::*;
