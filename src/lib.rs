pub mod approval;
pub mod card;
pub mod claim;
pub mod config;
pub mod confirmations;
pub mod detector;
pub mod error;
pub mod grid;
pub mod http;
pub mod ports;
pub mod reveal;
pub mod session;
pub mod simulated;

pub use error::{
    EngineError,
    ErrorKind,
    Result,
};
