use std::{
    fmt,
    time::{Duration, Instant},
};

pub struct Split {
    pub name: &'static str,
    pub duration: Duration,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.name, self.duration)
    }
}

/// Named timing splits for one frame, reported through `log`.
pub struct Stopwatch {
    pub splits: Vec<Split>,
    pub name: &'static str,
    pub start_total: Instant,
    pub start_split: Instant,
}

impl Stopwatch {
    pub fn new(name: &'static str) -> Stopwatch {
        let now = Instant::now();
        Stopwatch {
            splits: Vec::default(),
            name,
            start_total: now,
            start_split: now,
        }
    }

    pub fn total_elapsed(&self) -> Duration {
        self.start_total.elapsed()
    }

    pub fn split_elapsed(&self) -> Duration {
        self.start_split.elapsed()
    }

    pub fn record_split(&mut self, name: &'static str) -> Duration {
        let duration = self.split_elapsed();
        self.start_split = Instant::now();
        self.splits.push(Split { name, duration });
        duration
    }

    pub fn log_splits(&self) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        log::debug!("{}", self);
    }
}

impl fmt::Display for Stopwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stopwatch: {};  Total elapsed duration: {:?}",
            self.name,
            self.total_elapsed()
        )?;
        for split in self.splits.iter() {
            write!(f, "\n  {}", split)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_are_recorded_in_order() {
        let mut stopwatch = Stopwatch::new("frame");
        stopwatch.record_split("escape");
        stopwatch.record_split("color");
        let names: Vec<&str> = stopwatch.splits.iter().map(|split| split.name).collect();
        assert_eq!(names, vec!["escape", "color"]);

        let total: Duration = stopwatch.splits.iter().map(|split| split.duration).sum();
        assert!(total <= stopwatch.total_elapsed());

        let report = stopwatch.to_string();
        assert!(report.starts_with("Stopwatch: frame;"));
        assert!(report.contains("\n  escape: "));
        stopwatch.log_splits();
    }
}
