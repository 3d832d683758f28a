// IPPAN Gateway - explorer and proxy front for an IPPAN node
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Gateway Common - shared process plumbing for the IPPAN gateway
//!
//! Logging setup and shutdown signal handling used by the gateway binary
//! and its tests.

/// Logging setup for console, JSON and rolling file output
pub mod logging;
/// Process shutdown signal helpers
pub mod shutdown;

pub use logging::*;
pub use shutdown::*;
