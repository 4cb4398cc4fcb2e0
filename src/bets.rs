use std::{fmt, str::FromStr};

use chrono::NaiveDate;

const FIELD_SEPARATOR: char = ';';
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single bet placed through an agency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    pub agency: u32,
    pub first_name: String,
    pub last_name: String,
    pub document: String,
    pub birth_date: NaiveDate,
    pub number: i64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BetParseError {
    #[error("expected 6 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid agency: {0}")]
    Agency(String),

    #[error("invalid birth date: {0}")]
    BirthDate(String),

    #[error("invalid number: {0}")]
    Number(String),

    #[error("the {0} field is empty")]
    Empty(&'static str),

    #[error("the {0} field spans more than one line")]
    LineBreak(&'static str),
}

impl Bet {
    /// Checks whether the bet matches the number of the draw
    pub fn has_won(&self, winning_number: i64) -> bool {
        self.number == winning_number
    }
}

impl FromStr for Bet {
    type Err = BetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(FIELD_SEPARATOR).collect();
        let [agency, first_name, last_name, document, birth_date, number] = parts[..] else {
            return Err(BetParseError::FieldCount(parts.len()));
        };

        let agency = match agency.trim().parse::<u32>() {
            Ok(agency) if agency > 0 => agency,
            _ => return Err(BetParseError::Agency(agency.into())),
        };

        let birth_date = NaiveDate::parse_from_str(birth_date.trim(), DATE_FORMAT)
            .map_err(|_| BetParseError::BirthDate(birth_date.into()))?;

        let number = number
            .trim()
            .parse()
            .map_err(|_| BetParseError::Number(number.into()))?;

        for (name, value) in [
            ("first name", first_name),
            ("last name", last_name),
            ("document", document),
        ] {
            if value.trim().is_empty() {
                return Err(BetParseError::Empty(name));
            }

            // the store keeps one bet per line
            if value.contains(['\n', '\r']) {
                return Err(BetParseError::LineBreak(name));
            }
        }

        Ok(Self {
            agency,
            first_name: first_name.into(),
            last_name: last_name.into(),
            document: document.into(),
            birth_date,
            number,
        })
    }
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{};{};{};{}",
            self.agency,
            self.first_name,
            self.last_name,
            self.document,
            self.birth_date.format(DATE_FORMAT),
            self.number
        )
    }
}
