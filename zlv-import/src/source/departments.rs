//! Department code filter

use crate::error::{ImportError, ImportResult};

/// Set of 2-character department codes (`75`, `2A`, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Departments(Vec<String>);

impl Departments {
    /// Parse a comma-separated list; an empty string means "no filter"
    pub fn parse(list: &str) -> ImportResult<Self> {
        let codes = list
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(|code| Self::check(code).map(|_| code.to_ascii_uppercase()))
            .collect::<ImportResult<Vec<_>>>()?;
        Ok(Departments(codes))
    }

    /// Build from already separated codes
    pub fn from_codes<I, S>(codes: I) -> ImportResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let codes = codes
            .into_iter()
            .map(|code| {
                let code = code.as_ref().trim();
                Self::check(code).map(|_| code.to_ascii_uppercase())
            })
            .collect::<ImportResult<Vec<_>>>()?;
        Ok(Departments(codes))
    }

    fn check(code: &str) -> ImportResult<()> {
        if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphanumeric()) {
            Ok(())
        } else {
            Err(ImportError::InvalidInput(format!(
                "department code must be 2 characters, got '{}'",
                code
            )))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn codes(&self) -> &[String] {
        &self.0
    }

    /// True when `key` starts with one of the codes
    pub fn matches(&self, key: &str) -> bool {
        self.0.iter().any(|code| {
            key.get(..2)
                .map(|prefix| prefix.eq_ignore_ascii_case(code))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_match() {
        let departments = Departments::parse("75, 2a").unwrap();
        assert_eq!(departments.codes(), &["75".to_string(), "2A".to_string()]);
        assert!(departments.matches("75056"));
        assert!(departments.matches("2A004"));
        assert!(!departments.matches("92012"));
        assert!(!departments.matches("7"));
    }

    #[test]
    fn test_invalid_codes_rejected() {
        assert!(Departments::parse("750").is_err());
        assert!(Departments::from_codes(["7-"]).is_err());
        assert!(Departments::parse("").unwrap().is_empty());
    }
}
