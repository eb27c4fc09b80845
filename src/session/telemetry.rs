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
use std::fmt;

use crate::util::seconds_minutes_seconds;

pub(super) const ZERO_DISPLAY: &str = "0:00";

/// What the display shows about the bound track.
#[derive(Clone, Debug, PartialEq)]
pub struct Telemetry {
    pub is_loading: bool,
    pub is_playing: bool,
    /// Elapsed time as m:ss.
    pub elapsed_display: String,
    /// Duration as m:ss.
    pub duration_display: String,
    /// 0 to 100.
    pub progress_percent: f64,
}

impl Default for Telemetry {
    fn default() -> Self {
        Telemetry {
            is_loading: false,
            is_playing: false,
            elapsed_display: ZERO_DISPLAY.to_string(),
            duration_display: ZERO_DISPLAY.to_string(),
            progress_percent: 0.0,
        }
    }
}

impl Telemetry {
    pub(super) fn set_duration(&mut self, duration: f64) {
        self.duration_display = seconds_minutes_seconds(duration);
    }

    /// Applies a position update. Positions that can't be placed on the progress bar are
    /// ignored, except for a rewind to zero.
    pub(super) fn set_progress(&mut self, elapsed: f64, duration: f64, attached: bool) {
        if elapsed.is_finite() && duration.is_finite() && duration > 0.0 {
            self.progress_percent = (elapsed / duration * 100.0).clamp(0.0, 100.0);
            self.elapsed_display = seconds_minutes_seconds(elapsed);
        } else if elapsed == 0.0 && attached {
            self.progress_percent = 0.0;
            self.elapsed_display = ZERO_DISPLAY.to_string();
        }
    }

    pub(super) fn reset_position(&mut self) {
        self.elapsed_display = ZERO_DISPLAY.to_string();
        self.duration_display = ZERO_DISPLAY.to_string();
        self.progress_percent = 0.0;
    }
}

impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_loading {
            "LOADING TAPE..."
        } else if self.is_playing {
            "TAPE IS ROLLING"
        } else {
            "TAPE PAUSED"
        };
        write!(
            f,
            "{} {} / {} ({:.0}%)",
            status, self.elapsed_display, self.duration_display, self.progress_percent
        )
    }
}
