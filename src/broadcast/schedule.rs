//! The program schedule: which show is on the air right now.
//!
//! A static table of time-of-day windows. Windows may wrap midnight.
//! Overlap is rejected at load time.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One show's slot in the broadcast day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleWindow {
    /// When the show starts.
    pub start: NaiveTime,
    /// When it ends (exclusive). `end < start` means it wraps midnight.
    pub end: NaiveTime,
    /// Show name.
    pub show_name: String,
    /// Anchors fronting this show.
    pub persona_ids: Vec<String>,
}

impl ScheduleWindow {
    /// Create a window.
    pub fn new(start: NaiveTime, end: NaiveTime, show_name: impl Into<String>, persona_ids: Vec<String>) -> Self {
        Self {
            start,
            end,
            show_name: show_name.into(),
            persona_ids,
        }
    }

    /// Whether `time` falls inside this window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            // Wraps midnight
            time >= self.start || time < self.end
        }
    }
}

/// The full broadcast day.
#[derive(Debug, Clone)]
pub struct ProgramSchedule {
    windows: Vec<ScheduleWindow>,
}

impl ProgramSchedule {
    /// Build a schedule, rejecting overlapping windows.
    pub fn new(windows: Vec<ScheduleWindow>) -> Result<Self> {
        let schedule = Self { windows };
        schedule.validate()?;
        Ok(schedule)
    }

    /// The default 24-hour lineup.
    pub fn default_lineup() -> Self {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).expect("static schedule times are valid");
        Self {
            windows: vec![
                ScheduleWindow::new(t(6, 0), t(12, 0), "Dawn Patrol", vec!["rex".to_string()]),
                ScheduleWindow::new(t(12, 0), t(18, 0), "The Afternoon Spiral", vec!["blair".to_string()]),
                ScheduleWindow::new(
                    t(18, 0),
                    t(0, 0),
                    "Prime Time Panic",
                    vec!["rex".to_string(), "blair".to_string(), "sven".to_string()],
                ),
                ScheduleWindow::new(t(0, 0), t(6, 0), "The Graveyard Loop", vec!["sven".to_string()]),
            ],
        }
    }

    /// Reject pairwise overlaps; probes each window's edges against the rest.
    fn validate(&self) -> Result<()> {
        for (i, a) in self.windows.iter().enumerate() {
            for b in self.windows.iter().skip(i + 1) {
                if a.contains(b.start) || b.contains(a.start) {
                    return Err(Error::ScheduleOverlap {
                        first: a.show_name.clone(),
                        second: b.show_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The show on the air at `time`, if any window covers it.
    pub fn show_at(&self, time: NaiveTime) -> Option<&ScheduleWindow> {
        self.windows.iter().find(|w| w.contains(time))
    }

    /// All windows.
    pub fn windows(&self) -> &[ScheduleWindow] {
        &self.windows
    }
}
