// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Contribution graph gardening.
//!
//! Greenwall maintains a dedicated __history repository__ and fills it with
//! commits whose author dates are chosen on purpose: a handful today, a
//! random spread across a past date range, or the cells of a pattern drawn
//! onto the contribution calendar. A scheduler repeats today's run on a
//! cron expression and pushes the result to a remote.
//!
//! # Layout
//!
//! - [`coords`]: map calendar grid cells to timestamps.
//! - [`gateway`]: the only code that touches the repository.
//! - [`commit`]: write the marker file and commit it at a chosen time.
//! - [`run`]: sequence commits into today, backfill, and pattern runs.
//! - [`schedule`]: cron and manual triggers with single execution.
//! - [`server`]: HTTP control surface for the scheduler.
//! - [`config`] and [`path`]: settings and their default locations.

pub mod commit;
pub mod config;
pub mod coords;
pub mod gateway;
pub mod path;
pub mod run;
pub mod schedule;
pub mod server;
