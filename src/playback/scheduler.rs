// Gapless playback scheduling
//
// Every decoded chunk starts exactly where the previous one ends, or at the
// output clock if playback has fallen idle. The cursor only moves forward
// until `stop()` resets it.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use super::output::{AudioOutput, UnitId};
use crate::audio::codec::{decode_frame, AudioBuffer, EncodedPayload};
use crate::error::Result;

/// A buffer handed to the output, tracked until it ends or is stopped
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScheduledUnit {
    pub id: UnitId,
    /// Output-clock time the unit starts at, in seconds
    pub start_time: f64,
    /// Seconds
    pub duration: f64,
}

impl ScheduledUnit {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

pub struct PlaybackScheduler {
    output: Box<dyn AudioOutput>,
    next_start: Option<f64>,
    active: BTreeMap<UnitId, ScheduledUnit>,
    units_scheduled: u64,
}

impl PlaybackScheduler {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            next_start: None,
            active: BTreeMap::new(),
            units_scheduled: 0,
        }
    }

    /// Decode an inbound chunk and queue it right after everything already queued
    ///
    /// A payload that fails to decode leaves the cursor and the active set
    /// exactly as they were.
    pub fn enqueue(
        &mut self,
        payload: &EncodedPayload,
        sample_rate: u32,
        channels: u16,
    ) -> Result<ScheduledUnit> {
        let buffer = decode_frame(payload, sample_rate, channels)?;
        self.schedule_buffer(buffer)
    }

    /// Queue an already decoded buffer
    pub fn schedule_buffer(&mut self, buffer: AudioBuffer) -> Result<ScheduledUnit> {
        let now = self.output.current_time();
        let start_time = self.next_start.map_or(now, |cursor| cursor.max(now));
        let duration = buffer.duration();

        let id = self.output.schedule(buffer, start_time)?;
        self.next_start = Some(start_time + duration);
        self.units_scheduled += 1;

        let unit = ScheduledUnit {
            id,
            start_time,
            duration,
        };
        self.active.insert(id, unit);
        debug!(
            "Scheduled unit {:?} at {:.3}s for {:.3}s ({} active)",
            id,
            start_time,
            duration,
            self.active.len()
        );
        Ok(unit)
    }

    /// Forget units the output has finished playing
    pub fn reap(&mut self) -> usize {
        let ended = self.output.take_ended();
        let mut removed = 0;
        for id in ended {
            if self.active.remove(&id).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Silence everything queued and reset the cursor
    pub fn stop(&mut self) {
        let count = self.active.len();
        for id in std::mem::take(&mut self.active).into_keys() {
            self.output.stop_unit(id);
        }
        self.next_start = None;
        if count > 0 {
            info!("Stopped {} queued playback units", count);
        }
    }

    /// Release the output device
    pub fn close_output(&mut self) -> Result<()> {
        self.output.close()
    }

    pub fn next_start_time(&self) -> Option<f64> {
        self.next_start
    }

    pub fn active_units(&self) -> usize {
        self.active.len()
    }

    pub fn units_scheduled(&self) -> u64 {
        self.units_scheduled
    }

    pub fn current_time(&self) -> f64 {
        self.output.current_time()
    }
}
