use crate::command::Command;
use crate::error::ParseError;
use crate::pylontech::decoder::PROMPT;
use crate::pylontech::field;

// printed after the body of every command, not part of the data
const TRAILERS: [&str; 2] = ["Command completed successfully", "$$"];

/// Body of a console response with the echo, marker and trailers removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    command: Command,
    lines: Vec<String>,
}

impl Response {
    pub fn new(command: Command, raw: Vec<String>) -> Result<Self, ParseError> {
        let mut lines = raw
            .into_iter()
            .map(|l| l.trim_end().to_string())
            .filter(|l| !l.is_empty());

        let echo = lines.next();
        let echo_ok = echo
            .as_deref()
            .map(|e| e.trim_start_matches(PROMPT).trim())
            .is_some_and(|e| e.eq_ignore_ascii_case(command.as_str()));
        if !echo_ok {
            return Err(ParseError::UnexpectedEcho { command, got: echo });
        }

        if lines.next().as_deref().map(str::trim) != Some("@") {
            return Err(ParseError::MissingMarker { command });
        }

        let lines = lines
            .filter(|l| !TRAILERS.contains(&l.trim()))
            .collect();

        Ok(Self { command, lines })
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Tabular data rows, recognised by a leading integer column.
    pub fn rows(&self) -> Vec<Row<'_>> {
        self.lines
            .iter()
            .filter(|l| is_row(l))
            .enumerate()
            .map(|(n, l)| Row {
                command: self.command,
                row: n + 1,
                tokens: l.split_whitespace().collect(),
            })
            .collect()
    }

    /// `Label : value` lines, in the order they appear.
    pub fn fields(&self) -> Fields<'_> {
        let entries = self
            .lines
            .iter()
            .filter(|l| !is_row(l))
            .filter_map(|l| l.split_once(':'))
            .map(|(label, value)| (field::normalise_label(label), value.trim()))
            .collect();

        Fields {
            command: self.command,
            entries,
        }
    }
}

fn is_row(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|first| first.parse::<i64>().is_ok())
}

// Row {{{
#[derive(Debug)]
pub struct Row<'a> {
    command: Command,
    row: usize,
    tokens: Vec<&'a str>,
}

impl<'a> Row<'a> {
    pub fn require(&self, columns: usize) -> Result<(), ParseError> {
        if self.tokens.len() < columns {
            return Err(ParseError::ShortRow {
                command: self.command,
                row: self.row,
                expected: columns,
                got: self.tokens.len(),
            });
        }
        Ok(())
    }

    fn token(&self, column: usize, field: &'static str) -> Result<&'a str, ParseError> {
        self.tokens
            .get(column)
            .copied()
            .ok_or(ParseError::MissingField {
                command: self.command,
                field,
            })
    }

    fn invalid(&self, field: &'static str, value: &str) -> ParseError {
        ParseError::InvalidValue {
            command: self.command,
            field,
            value: value.to_string(),
        }
    }

    pub fn int(&self, column: usize, field: &'static str) -> Result<i64, ParseError> {
        let token = self.token(column, field)?;
        field::number(token, "").ok_or_else(|| self.invalid(field, token))
    }

    /// Milli-units (mV, mA, m°C, mAh) scaled to base units.
    pub fn milli(&self, column: usize, field: &'static str) -> Result<f64, ParseError> {
        self.scaled(column, field, 1000.0)
    }

    pub fn scaled(&self, column: usize, field: &'static str, divider: f64) -> Result<f64, ParseError> {
        let token = self.token(column, field)?;
        field::number(token, "mA")
            .map(|v| v as f64 / divider)
            .ok_or_else(|| self.invalid(field, token))
    }

    pub fn percent(&self, column: usize, field: &'static str) -> Result<u8, ParseError> {
        let token = self.token(column, field)?;
        field::number(token, "%")
            .and_then(|v| u8::try_from(v).ok())
            .filter(|v| *v <= 100)
            .ok_or_else(|| self.invalid(field, token))
    }

    pub fn text(&self, column: usize, field: &'static str) -> Result<String, ParseError> {
        self.token(column, field).map(str::to_string)
    }

    pub fn flag(&self, column: usize, field: &'static str) -> Result<bool, ParseError> {
        let token = self.token(column, field)?;
        field::flag(token).ok_or_else(|| self.invalid(field, token))
    }
} // }}}

// Fields {{{
#[derive(Debug)]
pub struct Fields<'a> {
    command: Command,
    entries: Vec<(String, &'a str)>,
}

impl<'a> Fields<'a> {
    /// First value whose label equals `label` exactly (normalised).
    pub fn get(&self, label: &str) -> Option<&'a str> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| *v)
    }

    /// All values for a label that repeats, like the per-unit `Module` lines.
    pub fn all(&self, label: &str) -> Vec<&'a str> {
        self.entries
            .iter()
            .filter(|(l, _)| l == label)
            .map(|(_, v)| *v)
            .collect()
    }

    /// First value whose label starts with any of `prefixes`.
    pub fn find(&self, prefixes: &[&str]) -> Option<&'a str> {
        self.entries
            .iter()
            .find(|(l, _)| prefixes.iter().any(|p| l.starts_with(p)))
            .map(|(_, v)| *v)
    }

    pub fn require(&self, prefixes: &[&str], field: &'static str) -> Result<&'a str, ParseError> {
        self.find(prefixes).ok_or(ParseError::MissingField {
            command: self.command,
            field,
        })
    }

    pub fn scaled(
        &self,
        prefixes: &[&str],
        field: &'static str,
        divider: f64,
    ) -> Result<f64, ParseError> {
        let value = self.require(prefixes, field)?;
        field::number(value, "mA")
            .map(|v| v as f64 / divider)
            .ok_or_else(|| ParseError::InvalidValue {
                command: self.command,
                field,
                value: value.to_string(),
            })
    }

    pub fn milli(&self, prefixes: &[&str], field: &'static str) -> Result<f64, ParseError> {
        self.scaled(prefixes, field, 1000.0)
    }
} // }}}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn strips_echo_marker_and_trailers() {
        let response = Response::new(
            Command::Pwr,
            raw(&["pylon>pwr", "@", "DC Voltage : 1  ", "Command completed successfully", "$$"]),
        )
        .unwrap();

        assert_eq!(response.lines(), &["DC Voltage : 1".to_string()]);
    }

    #[test]
    fn wrong_echo() {
        assert_eq!(
            Response::new(Command::Pwr, raw(&["unit", "@"])),
            Err(ParseError::UnexpectedEcho {
                command: Command::Pwr,
                got: Some("unit".to_string())
            })
        );
        assert_eq!(
            Response::new(Command::Pwr, vec![]),
            Err(ParseError::UnexpectedEcho {
                command: Command::Pwr,
                got: None
            })
        );
    }

    #[test]
    fn missing_marker() {
        assert_eq!(
            Response::new(Command::Bat, raw(&["bat", "Battery  Volt"])),
            Err(ParseError::MissingMarker {
                command: Command::Bat
            })
        );
    }

    #[test]
    fn rows_and_fields_are_told_apart() {
        let response = Response::new(
            Command::Pwr,
            raw(&["pwr", "@", "Bat  Voltage : 14850", "Volt Curr", "1 2 10:23:45"]),
        )
        .unwrap();

        let rows = response.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].int(1, "curr"), Ok(2));

        let fields = response.fields();
        assert_eq!(fields.get("bat voltage"), Some("14850"));
        assert_eq!(fields.find(&["bat volt"]), Some("14850"));
        assert_eq!(fields.get("volt curr"), None);
    }
}
