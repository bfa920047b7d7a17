// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Graph coordinate mapping.
//!
//! Contribution graphs lay days out in a grid: seven rows, one per day of the
//! week, and one column per week. Greenwall addresses that grid through a
//! __week offset__ and a __day offset__, both counted from a fixed __origin__
//! that lies a configured number of years in the past:
//!
//! ```text
//! origin = today - years_back years + 1 day
//! date   = origin + week_offset weeks + day_of_week days
//! ```
//!
//! Only the calendar date of "today" enters the computation, and every
//! resulting timestamp is pinned to noon local time. Mapping the same
//! coordinates twice on the same day therefore yields the same timestamp.
//!
//! # Pattern Grids
//!
//! A [`PatternGrid`] is a named 7 × W boolean matrix. Each lit cell becomes
//! one or more commits on the date its coordinates map to. Expansion walks
//! the grid column by column (week, then day within week), and that order is
//! the order in which commits land in history.

use chrono::{DateTime, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;

/// Rows in every pattern grid.
pub const DAYS_PER_WEEK: usize = 7;

/// Map graph coordinates onto concrete timestamps.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateMapper {
    timezone: Tz,
    years_back: u32,
}

impl CoordinateMapper {
    /// Construct new coordinate mapper.
    pub fn new(timezone: Tz, years_back: u32) -> Self {
        Self {
            timezone,
            years_back,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Current calendar date in the mapper's timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    /// Map coordinates relative to the current date.
    ///
    /// # Errors
    ///
    /// - Return [`PatternError::OutOfRange`] if the date cannot be represented.
    pub fn date_for_offset(&self, week_offset: u32, day_of_week: u32) -> Result<DateTime<Tz>> {
        self.date_for_offset_from(self.today(), week_offset, day_of_week)
    }

    /// Map coordinates relative to an explicit "today".
    ///
    /// # Errors
    ///
    /// - Return [`PatternError::OutOfRange`] if the date cannot be represented.
    pub fn date_for_offset_from(
        &self,
        today: NaiveDate,
        week_offset: u32,
        day_of_week: u32,
    ) -> Result<DateTime<Tz>> {
        let date = offset_date(today, self.years_back, week_offset, day_of_week)
            .ok_or(PatternError::OutOfRange {
                week_offset,
                day_of_week,
            })?;

        Ok(localize(self.timezone, date.and_time(noon())))
    }

    /// Expand pattern grid relative to the current date.
    ///
    /// # Errors
    ///
    /// - Return [`PatternError::ZeroIntensity`] if `intensity` is zero.
    /// - Return [`PatternError::OutOfRange`] if a cell maps outside the
    ///   representable calendar.
    pub fn expand_pattern(
        &self,
        grid: &PatternGrid,
        start_week_offset: u32,
        intensity: u32,
    ) -> Result<Vec<DateTime<Tz>>> {
        self.expand_pattern_from(self.today(), grid, start_week_offset, intensity)
    }

    /// Expand pattern grid relative to an explicit "today".
    ///
    /// Each lit cell contributes `intensity` consecutive copies of its
    /// timestamp. Cells are visited week by week, then day by day.
    ///
    /// # Errors
    ///
    /// - Return [`PatternError::ZeroIntensity`] if `intensity` is zero.
    /// - Return [`PatternError::OutOfRange`] if a cell maps outside the
    ///   representable calendar.
    pub fn expand_pattern_from(
        &self,
        today: NaiveDate,
        grid: &PatternGrid,
        start_week_offset: u32,
        intensity: u32,
    ) -> Result<Vec<DateTime<Tz>>> {
        if intensity == 0 {
            return Err(PatternError::ZeroIntensity);
        }

        let mut timestamps = Vec::with_capacity(grid.lit_count() * intensity as usize);
        for (week, day) in grid.lit_cells() {
            let week_offset = start_week_offset.checked_add(week as u32).ok_or(
                PatternError::OutOfRange {
                    week_offset: start_week_offset,
                    day_of_week: day as u32,
                },
            )?;
            let timestamp = self.date_for_offset_from(today, week_offset, day as u32)?;
            timestamps.extend(std::iter::repeat_n(timestamp, intensity as usize));
        }

        Ok(timestamps)
    }
}

/// Compute origin of the addressable graph window.
pub fn origin_date(today: NaiveDate, years_back: u32) -> Option<NaiveDate> {
    today
        .checked_sub_months(Months::new(years_back.checked_mul(12)?))?
        .checked_add_days(Days::new(1))
}

/// Compute calendar date of graph coordinates.
pub fn offset_date(
    today: NaiveDate,
    years_back: u32,
    week_offset: u32,
    day_of_week: u32,
) -> Option<NaiveDate> {
    let days = u64::from(week_offset) * DAYS_PER_WEEK as u64 + u64::from(day_of_week);
    origin_date(today, years_back)?.checked_add_days(Days::new(days))
}

/// Attach timezone to naive local date-time.
///
/// Ambiguous local times resolve to the earlier instant. Local times that
/// fall into a DST gap are read as UTC.
pub fn localize(timezone: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    timezone
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| timezone.from_utc_datetime(&naive))
}

fn noon() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Named 7 × W boolean matrix of graph cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternGrid {
    name: String,
    rows: Vec<Vec<bool>>,
}

impl PatternGrid {
    /// Construct new pattern grid from boolean rows.
    ///
    /// # Errors
    ///
    /// - Return [`PatternError::InvalidGrid`] unless there are exactly seven
    ///   non-empty rows of equal width.
    pub fn new(name: impl Into<String>, rows: Vec<Vec<bool>>) -> Result<Self> {
        let name = name.into();
        if rows.len() != DAYS_PER_WEEK {
            return Err(PatternError::InvalidGrid {
                name,
                reason: format!("expected {DAYS_PER_WEEK} rows, found {}", rows.len()),
            });
        }

        let width = rows[0].len();
        if width == 0 {
            return Err(PatternError::InvalidGrid {
                name,
                reason: "rows must not be empty".into(),
            });
        }

        if let Some(day) = rows.iter().position(|row| row.len() != width) {
            return Err(PatternError::InvalidGrid {
                name,
                reason: format!(
                    "row {day} has width {}, expected {width}",
                    rows[day].len()
                ),
            });
        }

        Ok(Self { name, rows })
    }

    /// Parse pattern grid from textual rows.
    ///
    /// `#`, `x`, `X`, and `1` mark lit cells. `.`, `-`, ` `, and `0` mark dark
    /// cells.
    ///
    /// # Errors
    ///
    /// - Return [`PatternError::InvalidGrid`] on unknown cell characters or
    ///   malformed dimensions.
    pub fn parse(name: impl Into<String>, rows: &[impl AsRef<str>]) -> Result<Self> {
        let name = name.into();
        let mut cells = Vec::with_capacity(rows.len());
        for (day, row) in rows.iter().enumerate() {
            let mut line = Vec::new();
            for symbol in row.as_ref().chars() {
                match symbol {
                    '#' | 'x' | 'X' | '1' => line.push(true),
                    '.' | '-' | ' ' | '0' => line.push(false),
                    other => {
                        return Err(PatternError::InvalidGrid {
                            name,
                            reason: format!("row {day} contains unknown cell {other:?}"),
                        })
                    }
                }
            }
            cells.push(line);
        }

        Self::new(name, cells)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of week columns.
    pub fn width(&self) -> usize {
        self.rows[0].len()
    }

    pub fn is_lit(&self, day: usize, week: usize) -> bool {
        self.rows
            .get(day)
            .and_then(|row| row.get(week))
            .copied()
            .unwrap_or(false)
    }

    pub fn lit_count(&self) -> usize {
        self.rows.iter().flatten().filter(|cell| **cell).count()
    }

    /// Iterate lit cells as `(week, day)` pairs in column-major order.
    pub fn lit_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.width()).flat_map(move |week| {
            (0..DAYS_PER_WEEK)
                .filter(move |day| self.is_lit(*day, week))
                .map(move |day| (week, day))
        })
    }
}

/// Registry of named pattern grids.
#[derive(Debug, Clone, Default)]
pub struct PatternBook {
    grids: BTreeMap<String, PatternGrid>,
}

impl PatternBook {
    /// Construct pattern book holding only built-in grids.
    pub fn builtin() -> Self {
        let mut book = Self::default();
        for (name, rows) in BUILTIN_PATTERNS {
            // INVARIANT: Built-in grids are well-formed.
            if let Ok(grid) = PatternGrid::parse(*name, rows) {
                book.insert(grid);
            }
        }

        book
    }

    /// Construct pattern book from built-in grids plus custom grids.
    ///
    /// Custom grids replace built-in grids of the same name.
    ///
    /// # Errors
    ///
    /// - Return [`PatternError::InvalidGrid`] if a custom grid is malformed.
    pub fn with_custom(custom: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut book = Self::builtin();
        for (name, rows) in custom {
            book.insert(PatternGrid::parse(name.as_str(), rows.as_slice())?);
        }

        Ok(book)
    }

    pub fn insert(&mut self, grid: PatternGrid) {
        self.grids.insert(grid.name().to_string(), grid);
    }

    /// Look up grid by name.
    ///
    /// # Errors
    ///
    /// - Return [`PatternError::NotFound`] naming the requested key and the
    ///   valid keys.
    pub fn get(&self, name: &str) -> Result<&PatternGrid> {
        self.grids.get(name).ok_or_else(|| PatternError::NotFound {
            requested: name.to_string(),
            available: self.names().collect::<Vec<_>>().join(", "),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.grids.keys().map(String::as_str)
    }
}

const BUILTIN_PATTERNS: &[(&str, [&str; DAYS_PER_WEEK])] = &[
    (
        "heart",
        [
            ".##.##.",
            "#######",
            "#######",
            ".#####.",
            "..###..",
            "...#...",
            ".......",
        ],
    ),
    (
        "hi",
        [
            "#..#.###",
            "#..#..#.",
            "####..#.",
            "#..#..#.",
            "#..#.###",
            "........",
            "........",
        ],
    ),
    (
        "stairs",
        [
            "#......",
            ".#.....",
            "..#....",
            "...#...",
            "....#..",
            ".....#.",
            "......#",
        ],
    ),
    (
        "checker",
        [
            "#.#.#.#.",
            ".#.#.#.#",
            "#.#.#.#.",
            ".#.#.#.#",
            "#.#.#.#.",
            ".#.#.#.#",
            "#.#.#.#.",
        ],
    ),
];

/// Pattern error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    /// Requested pattern does not exist.
    #[error("unknown pattern {requested:?}, expected one of: {available}")]
    NotFound { requested: String, available: String },

    /// Pattern grid is malformed.
    #[error("invalid pattern grid {name:?}: {reason}")]
    InvalidGrid { name: String, reason: String },

    /// Intensity of zero would draw nothing.
    #[error("pattern intensity must be at least 1")]
    ZeroIntensity,

    /// Coordinates map outside the representable calendar.
    #[error("coordinates (week {week_offset}, day {day_of_week}) are out of range")]
    OutOfRange { week_offset: u32, day_of_week: u32 },
}

/// Friendly result alias :3
type Result<T, E = PatternError> = std::result::Result<T, E>;
