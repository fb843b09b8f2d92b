pub mod log_stream;
pub mod rpc;
pub mod wallet;

pub use log_stream::{LogStream, LogStreamConfig, LogStreamError};
pub use rpc::SolanaClient;
pub use wallet::{WalletError, WalletManager};
