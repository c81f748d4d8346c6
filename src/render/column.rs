use crossterm::style::{style, Color, Stylize};

use crate::error::{Error, Result};
use crate::job::{Entry, Job};
use crate::state::JobState;

/// Names that are computed from other columns rather than queried directly
pub const DERIVED: [&str; 7] = [
    "CPUEff", "MemEff", "TimeEff", "GPU", "GPUEff", "GPUMem", "Energy",
];

// Efficiency limits for mid and high targets
const MID_LIMIT_LOW: f64 = 20.0;
const MID_LIMIT_HIGH: f64 = 90.0;
const MID_LIMIT_GOOD: f64 = 60.0;
const HIGH_LIMIT_LOW: f64 = 20.0;
const HIGH_LIMIT_GOOD: f64 = 80.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// How the values of a column are colored
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorScheme {
    Plain,
    /// Colored by job state
    State,
    /// Efficiencies that should be as high as possible, e.g. CPU usage
    High,
    /// Efficiencies that should be high, but not too close to the limit, e.g. memory
    Mid,
}

impl ColorScheme {
    fn from_title(title: &str) -> ColorScheme {
        match title.to_ascii_lowercase().as_str() {
            "state" => ColorScheme::State,
            "cpueff" | "gpueff" | "gpu" => ColorScheme::High,
            "timeeff" | "memeff" | "gpumem" => ColorScheme::Mid,
            _ => ColorScheme::Plain,
        }
    }

    /// Returns the text and color of a value
    fn render(self, entry: &Entry) -> (String, Option<Color>) {
        match (self, entry) {
            (ColorScheme::State, Entry::Text(state)) => (
                state.clone(),
                JobState::from_name(state).and_then(|state| state.color()),
            ),
            (ColorScheme::High, Entry::Percent(value)) => {
                (format!("{:.1}%", value), color_high(*value))
            }
            (ColorScheme::Mid, Entry::Percent(value)) => {
                (format!("{:.1}%", value), color_mid(*value))
            }
            _ => (entry.to_string(), None),
        }
    }
}

fn color_mid(value: f64) -> Option<Color> {
    if !(MID_LIMIT_LOW..=MID_LIMIT_HIGH).contains(&value) {
        Some(Color::Red)
    } else if value > MID_LIMIT_GOOD {
        Some(Color::Green)
    } else {
        None
    }
}

fn color_high(value: f64) -> Option<Color> {
    if value < HIGH_LIMIT_LOW {
        Some(Color::Red)
    } else if value > HIGH_LIMIT_GOOD {
        Some(Color::Green)
    } else {
        None
    }
}

/// A single column of the report, parsed from `NAME[(%|:)[ALIGNMENT][WIDTH[e|$]]]`
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnFormatter {
    pub title: String,
    pub alignment: Alignment,
    /// Fixed width; computed from the values if not set
    pub width: Option<usize>,
    /// Keep the end of values that are too wide, rather than the start
    pub end: bool,
    pub scheme: ColorScheme,
}

impl ColumnFormatter {
    /// Creates a centered column with computed width
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            alignment: Alignment::Center,
            width: None,
            end: false,
            scheme: ColorScheme::from_title(title),
        }
    }

    pub fn parse(token: &str) -> Result<Self> {
        let invalid = || Error::FormatToken {
            token: token.to_string(),
            hint: if token.contains('%') {
                ", did you forget to wrap in quotes?"
            } else {
                ""
            },
        };

        let (title, options) = match token.find(['%', ':']) {
            Some(idx) => (&token[..idx], Some(&token[idx + 1..])),
            None => (token, None),
        };

        if title.is_empty() {
            return Err(invalid());
        }

        let mut formatter = Self::new(title);
        let Some(options) = options else {
            return Ok(formatter);
        };

        let mut rest = options;
        let mut aligned = false;
        if let Some(alignment) = rest.chars().next().and_then(|c| match c {
            '<' => Some(Alignment::Left),
            '^' => Some(Alignment::Center),
            '>' => Some(Alignment::Right),
            _ => None,
        }) {
            formatter.alignment = alignment;
            aligned = true;
            rest = &rest[1..];
        }

        let digits = rest.bytes().take_while(|c| c.is_ascii_digit()).count();
        if digits > 0 {
            formatter.width = Some(rest[..digits].parse().map_err(|_| invalid())?);
            rest = &rest[digits..];

            if rest == "e" || rest == "$" {
                formatter.end = true;
                rest = "";
            }
        }

        if !rest.is_empty() || !(aligned || formatter.width.is_some()) {
            return Err(invalid());
        }

        Ok(formatter)
    }

    /// Matches the title against the valid titles, ignoring case, and adopts
    /// the canonical spelling. `Total<NAME>` is valid for any queried NAME.
    ///
    /// Returns the name of the column that must be queried for this formatter.
    pub fn validate_title(&mut self, valid_titles: &[String]) -> Result<String> {
        let known = valid_titles
            .iter()
            .map(|title| title.as_str())
            .chain(DERIVED)
            .find(|title| title.eq_ignore_ascii_case(&self.title));

        if let Some(title) = known {
            self.title = title.to_string();
            return Ok(self.title.clone());
        }

        let summed = match (self.title.get(..5), self.title.get(5..)) {
            (Some(prefix), Some(name)) if prefix.eq_ignore_ascii_case("total") => valid_titles
                .iter()
                .filter(|title| !DERIVED.contains(&title.as_str()))
                .find(|title| title.eq_ignore_ascii_case(name)),
            _ => None,
        };

        match summed {
            Some(name) => {
                self.title = format!("Total{name}");
                Ok(name.clone())
            }
            None => Err(Error::Title(self.title.clone())),
        }
    }

    /// Left aligned, unpadded and uncolored
    pub fn no_formatting(&mut self) {
        self.alignment = Alignment::Left;
        self.width = None;
        self.scheme = ColorScheme::Plain;
    }

    /// Sets the width to fit the title and all values, plus a border
    pub fn compute_width(&mut self, jobs: &[&Job], node: bool, gpu: bool) {
        if self.width.is_some() {
            return;
        }

        let mut width = self.title.chars().count();
        for job in jobs {
            let entries = if node {
                job.get_node_entries(&self.title, gpu)
            } else {
                vec![job.get_entry(&self.title)]
            };

            for entry in entries {
                width = width.max(entry.to_string().chars().count());
            }
        }

        self.width = Some(width + 2);
    }

    pub fn format_title(&self, bold: bool) -> String {
        let title = self.format_entry(&self.title, None);
        if bold {
            style(title).bold().to_string()
        } else {
            title
        }
    }

    pub fn format_job(&self, job: &Job, color: bool) -> String {
        self.format_value(&job.get_entry(&self.title), color)
    }

    /// One value for the job, followed by one per node and GPU
    pub fn format_node_job(&self, job: &Job, gpu: bool, color: bool) -> Vec<String> {
        job.get_node_entries(&self.title, gpu)
            .iter()
            .map(|entry| self.format_value(entry, color))
            .collect()
    }

    fn format_value(&self, entry: &Entry, color: bool) -> String {
        let (text, fg) = self.scheme.render(entry);
        self.format_entry(&text, fg.filter(|_| color))
    }

    /// Truncates, aligns and colors a value
    pub fn format_entry(&self, entry: &str, color: Option<Color>) -> String {
        let result = match self.width {
            None => entry.to_string(),
            Some(width) => {
                let length = entry.chars().count();
                let entry: String = if length <= width {
                    entry.to_string()
                } else if self.end {
                    entry.chars().skip(length - width).collect()
                } else {
                    entry.chars().take(width).collect()
                };

                match self.alignment {
                    Alignment::Left => format!("{entry:<width$}"),
                    Alignment::Center => format!("{entry:^width$}"),
                    Alignment::Right => format!("{entry:>width$}"),
                }
            }
        };

        match color {
            Some(color) => style(result).with(color).to_string(),
            None => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles() -> Vec<String> {
        ["JobID", "State", "Elapsed", "TotalCPU", "AveRSS", "MaxRSS"]
            .iter()
            .map(|v| v.to_string())
            .collect()
    }

    #[test]
    fn test_parse() {
        let fmt = ColumnFormatter::parse("JobID").unwrap();
        assert_eq!(fmt.title, "JobID");
        assert_eq!(fmt.alignment, Alignment::Center);
        assert_eq!(fmt.width, None);
        assert!(!fmt.end);
        assert_eq!(fmt.scheme, ColorScheme::Plain);

        let fmt = ColumnFormatter::parse("JobID%>15").unwrap();
        assert_eq!(fmt.alignment, Alignment::Right);
        assert_eq!(fmt.width, Some(15));

        let fmt = ColumnFormatter::parse("JobName:10$").unwrap();
        assert_eq!(fmt.alignment, Alignment::Center);
        assert_eq!(fmt.width, Some(10));
        assert!(fmt.end);

        let fmt = ColumnFormatter::parse("cpueff%<4e").unwrap();
        assert_eq!(fmt.alignment, Alignment::Left);
        assert!(fmt.end);
        assert_eq!(fmt.scheme, ColorScheme::High);

        assert_eq!(ColumnFormatter::parse("State%^").unwrap().scheme, ColorScheme::State);
        assert_eq!(ColumnFormatter::parse("MemEff").unwrap().scheme, ColorScheme::Mid);
    }

    #[test]
    fn test_parse_invalid() {
        for token in ["JobID%", "JobID:", "JobID%e", "JobID%>e", "JobID%>5x", "%>5", "JobID%>5%"] {
            let result = ColumnFormatter::parse(token);
            assert!(
                matches!(result, Err(Error::FormatToken { token: ref t, .. }) if t == token),
                "{token:?}"
            );
        }

        let message = ColumnFormatter::parse("JobID%").unwrap_err().to_string();
        assert_eq!(
            message,
            "Unable to parse format token \"JobID%\", did you forget to wrap in quotes?"
        );
        let message = ColumnFormatter::parse("JobID:").unwrap_err().to_string();
        assert_eq!(message, "Unable to parse format token \"JobID:\"");
    }

    #[test]
    fn test_validate_title() {
        let mut fmt = ColumnFormatter::parse("jobid%>").unwrap();
        assert_eq!(fmt.validate_title(&titles()).unwrap(), "JobID");
        assert_eq!(fmt.title, "JobID");

        let mut fmt = ColumnFormatter::parse("CPUEFF").unwrap();
        assert_eq!(fmt.validate_title(&titles()).unwrap(), "CPUEff");

        let mut fmt = ColumnFormatter::parse("totalaverss").unwrap();
        assert_eq!(fmt.validate_title(&titles()).unwrap(), "AveRSS");
        assert_eq!(fmt.title, "TotalAveRSS");

        // queried titles win over sums
        let mut fmt = ColumnFormatter::parse("TotalCPU").unwrap();
        assert_eq!(fmt.validate_title(&titles()).unwrap(), "TotalCPU");
    }

    #[test]
    fn test_validate_title_invalid() {
        for title in ["JobName", "TotalCPUEff", "Total", "TotalMemEff"] {
            let mut fmt = ColumnFormatter::parse(title).unwrap();
            let result = fmt.validate_title(&titles());
            assert!(matches!(result, Err(Error::Title(ref t)) if t == title), "{title}");
        }

        let mut fmt = ColumnFormatter::parse("jobname").unwrap();
        assert_eq!(
            fmt.validate_title(&titles()).unwrap_err().to_string(),
            "\"jobname\" is not a valid title. Run sacct --helpformat for a list of allowed values."
        );
    }

    #[test]
    fn test_format_entry() {
        let mut fmt = ColumnFormatter::parse("JobID%>8").unwrap();
        assert_eq!(fmt.format_entry("1234", None), "    1234");
        assert_eq!(fmt.format_entry("123456789", None), "12345678");

        fmt.end = true;
        assert_eq!(fmt.format_entry("123456789", None), "23456789");

        fmt.alignment = Alignment::Center;
        assert_eq!(fmt.format_entry("123", None), "  123   ");
        fmt.alignment = Alignment::Left;
        assert_eq!(fmt.format_entry("123", None), "123     ");

        fmt.no_formatting();
        assert_eq!(fmt.format_entry("123456789", None), "123456789");

        let colored = fmt.format_entry("123", Some(Color::Red));
        assert_eq!(colored, style("123").with(Color::Red).to_string());
        assert_ne!(colored, "123");
    }

    #[test]
    fn test_render_values() {
        assert_eq!(
            ColorScheme::High.render(&Entry::Percent(85.0)),
            ("85.0%".to_string(), Some(Color::Green))
        );
        assert_eq!(
            ColorScheme::High.render(&Entry::Percent(50.0)),
            ("50.0%".to_string(), None)
        );
        assert_eq!(
            ColorScheme::High.render(&Entry::Percent(19.9)),
            ("19.9%".to_string(), Some(Color::Red))
        );
        assert_eq!(
            ColorScheme::Mid.render(&Entry::Percent(95.0)),
            ("95.0%".to_string(), Some(Color::Red))
        );
        assert_eq!(
            ColorScheme::Mid.render(&Entry::Percent(75.0)),
            ("75.0%".to_string(), Some(Color::Green))
        );
        assert_eq!(
            ColorScheme::Mid.render(&Entry::Percent(40.0)),
            ("40.0%".to_string(), None)
        );
        assert_eq!(
            ColorScheme::Mid.render(&Entry::Missing),
            ("---".to_string(), None)
        );
        assert_eq!(
            ColorScheme::State.render(&Entry::from("TIMEOUT")),
            ("TIMEOUT".to_string(), Some(Color::Red))
        );
        assert_eq!(
            ColorScheme::State.render(&Entry::from("REQUEUED")),
            ("REQUEUED".to_string(), None)
        );
        assert_eq!(
            ColorScheme::Plain.render(&Entry::Percent(75.0)),
            ("75.0".to_string(), None)
        );
    }
}
