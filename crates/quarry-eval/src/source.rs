//! Interfaces to upstream event producers.
//!
//! The expression core consumes events one at a time and never retains
//! them; everything upstream (packet capture, flow reassembly, file
//! readers) sits behind [`EventSource`]. The PCAP ingestor is an
//! external collaborator: only its tuning surface lives here, because the
//! core's semantics do not depend on it.

use chrono::TimeDelta;

use crate::event::Event;

/// A stream of events feeding the engine.
pub trait EventSource {
    /// The next event, or `None` when the stream is exhausted.
    fn next_event(&mut self) -> Option<Event>;
}

/// Any event iterator is a source.
impl<I> EventSource for I
where
    I: Iterator<Item = Event>,
{
    fn next_event(&mut self) -> Option<Event> {
        self.next()
    }
}

/// Tuning for the PCAP flow ingestor.
///
/// None of these affect expression semantics; they bound the resource use
/// of the upstream flow table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcapIngestConfig {
    /// Bytes recorded per flow before the remainder of the flow is cut
    /// off. `u64::MAX` disables the cutoff.
    pub flow_cutoff: u64,
    /// Maximum number of concurrently tracked flows.
    pub max_flows: usize,
    /// Idle time after which a flow becomes eligible for eviction.
    pub flow_idle_timeout: TimeDelta,
    /// Interval between eviction sweeps of the flow table.
    pub eviction_interval: TimeDelta,
}

impl Default for PcapIngestConfig {
    fn default() -> Self {
        PcapIngestConfig {
            flow_cutoff: u64::MAX,
            max_flows: 1 << 20,
            flow_idle_timeout: TimeDelta::seconds(30),
            eviction_interval: TimeDelta::seconds(10),
        }
    }
}
