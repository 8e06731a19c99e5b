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

/// Raised when render options cannot be read or hold values the renderer cannot use.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The options file was missing or could not be deserialized.
    #[error("unable to read render options: {0}")]
    Load(#[from] config::ConfigError),

    /// An option parsed but is out of range.
    #[error("render option {field} is invalid: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
