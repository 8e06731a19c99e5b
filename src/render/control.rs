// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Per-channel controller timelines with step interpolation.
use crate::performance::{ControlChangeEvent, CHANNEL_COUNT};

/// Controllers that shape rendered notes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Controller {
    Modulation,
    Volume,
    Pan,
    Expression,
    ChorusSend,
}

impl Controller {
    const ALL: [Controller; 5] = [
        Controller::Modulation,
        Controller::Volume,
        Controller::Pan,
        Controller::Expression,
        Controller::ChorusSend,
    ];

    /// Maps a MIDI controller number to a tracked controller.
    pub fn from_number(number: u8) -> Option<Controller> {
        match number {
            0x01 => Some(Controller::Modulation),
            0x07 => Some(Controller::Volume),
            0x0a => Some(Controller::Pan),
            0x0b => Some(Controller::Expression),
            0x5d => Some(Controller::ChorusSend),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Controller values in effect for a channel at some instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlSnapshot {
    pub modulation: f32,
    pub volume: f32,
    pub expression: f32,
    pub pan: f32,
    pub chorus_send: f32,
}

impl Default for ControlSnapshot {
    fn default() -> Self {
        ControlSnapshot {
            modulation: 0.0,
            volume: 0.787,
            expression: 1.0,
            pan: 0.5,
            chorus_send: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ControlPoint {
    time: f64,
    value: f32,
}

/// Sorted controller timelines for all channels, built once before rendering and then shared
/// read-only between workers.
#[derive(Clone, Debug)]
pub struct ChannelControls {
    /// Indexed by `channel * Controller::ALL.len() + controller`.
    timelines: Vec<Vec<ControlPoint>>,
}

impl ChannelControls {
    pub fn new(events: &[ControlChangeEvent]) -> ChannelControls {
        let mut timelines = vec![Vec::new(); CHANNEL_COUNT * Controller::ALL.len()];

        for event in events {
            if event.channel as usize >= CHANNEL_COUNT {
                continue;
            }
            if let Some(controller) = Controller::from_number(event.controller) {
                timelines[slot(event.channel, controller)].push(ControlPoint {
                    time: event.time,
                    value: event.value,
                });
            }
        }
        for timeline in timelines.iter_mut() {
            timeline.sort_by(|a, b| a.time.total_cmp(&b.time));
        }

        ChannelControls { timelines }
    }

    /// Returns the last value set at or before `time`, if any.
    pub fn value_at(&self, channel: u8, controller: Controller, time: f64) -> Option<f32> {
        if channel as usize >= CHANNEL_COUNT {
            return None;
        }
        let timeline = &self.timelines[slot(channel, controller)];
        let after = timeline.partition_point(|point| point.time <= time);
        after.checked_sub(1).map(|i| timeline[i].value)
    }

    /// Returns every tracked controller's value at `time`, falling back to defaults.
    pub fn snapshot(&self, channel: u8, time: f64) -> ControlSnapshot {
        let defaults = ControlSnapshot::default();
        let value = |controller, default| self.value_at(channel, controller, time).unwrap_or(default);

        ControlSnapshot {
            modulation: value(Controller::Modulation, defaults.modulation),
            volume: value(Controller::Volume, defaults.volume),
            expression: value(Controller::Expression, defaults.expression),
            pan: value(Controller::Pan, defaults.pan),
            chorus_send: value(Controller::ChorusSend, defaults.chorus_send),
        }
    }
}

fn slot(channel: u8, controller: Controller) -> usize {
    channel as usize * Controller::ALL.len() + controller.index()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_interpolation() {
        let controls = ChannelControls::new(&[
            ControlChangeEvent::new(2.0, 0, 0x07, 0.2),
            ControlChangeEvent::new(1.0, 0, 0x07, 0.5),
            ControlChangeEvent::new(3.0, 1, 0x07, 0.9),
        ]);

        assert_eq!(controls.value_at(0, Controller::Volume, 0.5), None);
        assert_eq!(controls.value_at(0, Controller::Volume, 1.0), Some(0.5));
        assert_eq!(controls.value_at(0, Controller::Volume, 1.99), Some(0.5));
        assert_eq!(controls.value_at(0, Controller::Volume, 2.0), Some(0.2));
        assert_eq!(controls.value_at(0, Controller::Volume, 100.0), Some(0.2));
        assert_eq!(controls.value_at(1, Controller::Volume, 2.5), None);
        assert_eq!(controls.value_at(1, Controller::Pan, 5.0), None);
    }

    #[test]
    fn test_same_time_last_wins() {
        let controls = ChannelControls::new(&[
            ControlChangeEvent::new(1.0, 3, 0x0a, 0.1),
            ControlChangeEvent::new(1.0, 3, 0x0a, 0.7),
        ]);

        assert_eq!(controls.value_at(3, Controller::Pan, 1.0), Some(0.7));
    }

    #[test]
    fn test_snapshot_defaults() {
        let controls = ChannelControls::new(&[
            ControlChangeEvent::new(0.0, 2, 0x5d, 0.4),
            // Untracked controllers are ignored.
            ControlChangeEvent::new(0.0, 2, 0x47, 1.0),
        ]);

        assert_eq!(controls.snapshot(0, 10.0), ControlSnapshot::default());
        assert_eq!(
            controls.snapshot(2, 10.0),
            ControlSnapshot {
                chorus_send: 0.4,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_controller_numbers() {
        assert_eq!(Controller::from_number(0x01), Some(Controller::Modulation));
        assert_eq!(Controller::from_number(0x0b), Some(Controller::Expression));
        assert_eq!(Controller::from_number(0x40), None);
    }
}
