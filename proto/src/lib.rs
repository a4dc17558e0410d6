pub mod constants;
pub mod error;
pub mod seq;
pub mod transfer;

pub use error::{Error, Result};
pub use seq::SeqRegistry;
pub use transfer::{Buffer, Direction, State as TransferState, TransferSession};
pub use netstore_wire as wire;
