//! Main decoder API
//!
//! This module provides the primary interface for turning received frames
//! into decoded events. The Decoder struct owns the signal database and
//! pairs it with any source of frames: a live `DeviceInterface`, a replayed
//! capture, or frames built by hand.

use crate::signals::{RuleTable, SignalDatabase};
use crate::types::{DecodedEvent, Frame, Result};
use std::path::Path;

/// The main decoder struct - entry point for signal decoding
pub struct Decoder {
    /// Active rule set
    signal_db: SignalDatabase,
}

impl Decoder {
    /// Create a decoder with no rules; every frame decodes as raw
    pub fn new() -> Self {
        Self {
            signal_db: SignalDatabase::new(),
        }
    }

    /// Load a rule table file, replacing the current rules
    ///
    /// # Arguments
    /// * `path` - Path to a `.toml`, `.json` or `.xml` rule table
    ///
    /// # Returns
    /// * `Result<()>` - Ok if loaded, Err if the file is unreadable or any
    ///   rule is malformed (the previous rules then stay active)
    ///
    /// # Example
    /// ```no_run
    /// use usbcan_decoder::Decoder;
    /// use std::path::Path;
    ///
    /// let mut decoder = Decoder::new();
    /// decoder.load_rules(Path::new("rules.toml")).unwrap();
    /// ```
    pub fn load_rules(&mut self, path: &Path) -> Result<()> {
        log::info!("Loading rule table: {:?}", path);
        let table = RuleTable::from_path(path)?;
        self.signal_db.load(&table)?;
        log::info!("Rule table loaded successfully: {:?}", path);
        Ok(())
    }

    /// Install an already parsed rule table
    pub fn load_rule_table(&mut self, table: &RuleTable) -> Result<()> {
        self.signal_db.load(table)
    }

    /// Decode one frame
    pub fn decode_frame(&self, frame: Frame) -> DecodedEvent {
        match self.signal_db.decode(&frame) {
            Some(message) => {
                log::debug!("Decoded message: {} (ID 0x{:X})", message.name, frame.identifier);
                DecodedEvent::Message { frame, message }
            }
            None => {
                log::trace!("No rule for ID 0x{:X}, emitting as raw frame", frame.identifier);
                DecodedEvent::RawFrame(frame)
            }
        }
    }

    /// Lazily decode a sequence of frames
    ///
    /// # Example
    /// ```no_run
    /// use usbcan_decoder::{Decoder, DeviceConfig, DeviceInterface};
    ///
    /// let decoder = Decoder::new();
    /// let mut device = DeviceInterface::from_config(&DeviceConfig::new()).unwrap();
    /// device.open().unwrap();
    ///
    /// for event in decoder.decode_frames(device.receive().unwrap()) {
    ///     println!("{:?}", event);
    /// }
    /// ```
    pub fn decode_frames<I>(&self, frames: I) -> DecodingIterator<'_, I::IntoIter>
    where
        I: IntoIterator<Item = Frame>,
    {
        DecodingIterator::new(frames.into_iter(), self)
    }

    /// Get the active signal database
    pub fn signal_database(&self) -> &SignalDatabase {
        &self.signal_db
    }

    /// Get statistics about the loaded rules
    pub fn database_stats(&self) -> DatabaseStats {
        self.signal_db.stats()
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator that turns frames into decoded events
pub struct DecodingIterator<'a, I>
where
    I: Iterator<Item = Frame>,
{
    frame_iter: I,
    decoder: &'a Decoder,
}

impl<'a, I> DecodingIterator<'a, I>
where
    I: Iterator<Item = Frame>,
{
    fn new(frame_iter: I, decoder: &'a Decoder) -> Self {
        Self { frame_iter, decoder }
    }
}

impl<'a, I> Iterator for DecodingIterator<'a, I>
where
    I: Iterator<Item = Frame>,
{
    type Item = DecodedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.frame_iter.next()?;
        Some(self.decoder.decode_frame(frame))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.frame_iter.size_hint()
    }
}

// Re-export DatabaseStats for public API
pub use crate::signals::DatabaseStats;
