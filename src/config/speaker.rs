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
use std::{error::Error, time::Duration};

use duration_string::DurationString;
use serde::Deserialize;

const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// A YAML representation of the speaker output settings.
#[derive(Deserialize, Clone, Default)]
pub struct Speaker {
    /// How often the playback position is reported while playing.
    progress_interval: Option<String>,
}

impl Speaker {
    /// Returns the progress interval from the configuration (default: 250ms).
    pub fn progress_interval(&self) -> Result<Duration, Box<dyn Error>> {
        match &self.progress_interval {
            Some(progress_interval) => {
                Ok(DurationString::from_string(progress_interval.clone())?.into())
            }
            None => Ok(DEFAULT_PROGRESS_INTERVAL),
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::Speaker;

    #[test]
    fn test_progress_interval() {
        assert_eq!(
            Duration::from_millis(250),
            Speaker::default().progress_interval().unwrap()
        );

        let speaker = Speaker {
            progress_interval: Some("1s".to_string()),
        };
        assert_eq!(Duration::from_secs(1), speaker.progress_interval().unwrap());

        let speaker = Speaker {
            progress_interval: Some("soon".to_string()),
        };
        assert!(speaker.progress_interval().is_err());
    }
}
