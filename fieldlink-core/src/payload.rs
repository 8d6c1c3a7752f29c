//! Measurement Payload Formatting
//!
//! Sensor adapters report several variables per sampling cycle. They are sent
//! as one event whose payload is an array of measurement objects:
//!
//! ```text
//! [{"variable": "<uuid>", "value": 23.46, "crop": "<uuid>", "datetime": "2024-05-01T10:00:00 -05:00"}, ...]
//! ```
//!
//! Values are written with two decimals. [`PayloadBuilder`] formats straight
//! into the event's fixed-capacity text; an entry that would not fit leaves
//! the builder untouched and returns [`PayloadError::Overflow`].
//!
//! ```rust
//! use fieldlink_core::payload::PayloadBuilder;
//! use fieldlink_core::Event;
//!
//! let ts = "2024-05-01T10:00:00 -05:00";
//! let mut batch = PayloadBuilder::new();
//! batch.push("temp-uuid", 23.456, "crop-uuid", ts).unwrap();
//! batch.push("rh-uuid", 61.0, "crop-uuid", ts).unwrap();
//!
//! let event = Event::measurement_batch(ts, batch).unwrap();
//! assert!(event.payload().contains("\"value\": 23.46"));
//! ```

use core::fmt::Write as _;

use crate::constants::MAX_PAYLOAD_LEN;
use crate::errors::{PayloadError, PayloadResult};
use crate::events::{Event, Payload};

/// Incremental builder for a measurement array
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    text: Payload,
    entries: usize,
}

impl PayloadBuilder {
    /// Start an empty array
    pub fn new() -> Self {
        let mut text = Payload::new();
        // Capacity is far above one byte
        let _ = text.push('[');
        Self { text, entries: 0 }
    }

    /// Append one measurement object
    ///
    /// Rejects NaN and infinities; sensors report those when a read failed
    /// and the server has no representation for them.
    pub fn push(
        &mut self,
        variable: &str,
        value: f32,
        crop: &str,
        datetime: &str,
    ) -> PayloadResult<&mut Self> {
        if !value.is_finite() {
            return Err(PayloadError::InvalidValue);
        }

        let mark = self.text.len();
        let separator = if self.entries == 0 { "" } else { ", " };
        let written = write!(
            self.text,
            "{}{{\"variable\": \"{}\", \"value\": {:.2}, \"crop\": \"{}\", \"datetime\": \"{}\"}}",
            separator, variable, value, crop, datetime
        );

        // Keep one byte for the closing bracket
        if written.is_err() || self.text.len() >= MAX_PAYLOAD_LEN {
            self.text.truncate(mark);
            return Err(PayloadError::Overflow { max: MAX_PAYLOAD_LEN });
        }

        self.entries += 1;
        Ok(self)
    }

    /// Number of measurement objects written so far
    pub fn len(&self) -> usize {
        self.entries
    }

    /// True when nothing was pushed
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Close the array
    pub fn finish(mut self) -> PayloadResult<Payload> {
        self.text
            .push(']')
            .map_err(|_| PayloadError::Overflow { max: MAX_PAYLOAD_LEN })?;
        Ok(self.text)
    }
}

impl Default for PayloadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    /// Measurement event carrying a formatted batch
    pub fn measurement_batch(timestamp: &str, batch: PayloadBuilder) -> PayloadResult<Self> {
        let payload = batch.finish()?;
        Ok(Event::measurement(timestamp, payload.as_str())?)
    }
}
