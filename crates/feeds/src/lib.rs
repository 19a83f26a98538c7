//! Market price sources.
//!
//! - `source` - the `PriceSource` trait consumed by the detection pipeline
//! - `rest` - Binance REST implementation (ticker prices and symbol validation)
//! - `error` - feed error taxonomy

pub mod error;
pub mod rest;
pub mod source;

pub use error::*;
pub use rest::*;
pub use source::*;
