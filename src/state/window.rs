use crate::ArchiveError;
use chrono::NaiveDate;

/// Format used for every calendar date the crawler reads or writes
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a `YYYY-MM-DD` date, rejecting anything else
pub fn parse_date(input: &str) -> Result<NaiveDate, ArchiveError> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT)
        .map_err(|_| ArchiveError::InvalidInput(format!("invalid date '{}', expected YYYY-MM-DD", input)))
}

/// An inclusive range of calendar days to crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl CrawlWindow {
    /// Creates a window, rejecting `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ArchiveError> {
        if start > end {
            return Err(ArchiveError::InvalidInput(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Every day of the window, oldest first
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        let d = parse_date("2021-01-01").unwrap();
        assert_eq!(d.to_string(), "2021-01-01");
        assert_eq!(parse_date(" 2021-01-01\n").unwrap(), d);

        assert!(matches!(parse_date("2021-13-01"), Err(ArchiveError::InvalidInput(_))));
        assert!(parse_date("01/02/2021").is_err());
        assert!(parse_date("2021-02-30").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn test_window_days_are_inclusive() {
        let start = parse_date("2021-01-01").unwrap();
        let end = parse_date("2021-01-03").unwrap();
        let window = CrawlWindow::new(start, end).unwrap();

        let days: Vec<String> = window.days().map(|d| d.to_string()).collect();
        assert_eq!(days, vec!["2021-01-01", "2021-01-02", "2021-01-03"]);
        assert_eq!(window.start(), start);
        assert_eq!(window.end(), end);
    }

    #[test]
    fn test_single_day_window() {
        let day = parse_date("2021-01-01").unwrap();
        let window = CrawlWindow::new(day, day).unwrap();
        assert_eq!(window.days().collect::<Vec<_>>(), vec![day]);
    }

    #[test]
    fn test_reversed_window_rejected() {
        let start = parse_date("2021-01-02").unwrap();
        let end = parse_date("2021-01-01").unwrap();
        assert!(CrawlWindow::new(start, end).is_err());
    }
}
