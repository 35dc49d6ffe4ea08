//! 🔑 Distribution keyer: deals routing keys like a croupier with exactly `width` chairs.
//!
//! Keys go `1 mod W, 2 mod W, 3 mod W, ...`. The counter only moves when a key is
//! actually handed out, so every envelope that gets routed gets the next seat.

use crate::error::StreamError;

#[derive(Debug, Clone)]
pub struct DistributionKeyer {
    width: u64,
    counter: u64,
}

impl DistributionKeyer {
    /// 🚧 Rejects `width <= 0` here, so the hot loop never divides by zero.
    pub fn new(width: i64) -> Result<Self, StreamError> {
        if width <= 0 {
            return Err(StreamError::configuration(format!(
                "fanout_width must be a positive integer, got {width}"
            )));
        }
        Ok(Self {
            width: width as u64,
            counter: 0,
        })
    }

    pub fn next_key(&mut self) -> String {
        self.counter += 1;
        (self.counter % self.width).to_string()
    }

    /// How many keys have been handed out so far.
    pub fn issued(&self) -> u64 {
        self.counter
    }
}
