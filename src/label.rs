//! Subject labels.
//!
//! A label is what the training stage sees next to every signal row. Its text
//! form is the one written into triplet files:
//!
//! ```text
//! 007_25_male     subject 7, age 25, sex "male"    (ECG-ID)
//! 042             subject 42, no demographics      (Heartprint)
//! ```
//!
//! Identity is the subject number alone.
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectLabel {
    pub subject: u32,
    pub age: Option<u32>,
    pub sex: Option<String>,
}

impl SubjectLabel {
    /// Label carrying only the subject identifier.
    pub fn anonymous(subject: u32) -> Self {
        Self { subject, age: None, sex: None }
    }

    pub fn with_demographics(subject: u32, age: u32, sex: impl Into<String>) -> Self {
        Self { subject, age: Some(age), sex: Some(sex.into()) }
    }

    #[inline]
    pub fn identity(&self) -> u32 {
        self.subject
    }

    /// Age and sex are both set or both absent. Only such labels survive the
    /// text form unchanged.
    pub fn is_representable(&self) -> bool {
        self.age.is_some() == self.sex.is_some()
    }
}

impl fmt::Display for SubjectLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.subject)?;
        if let (Some(age), Some(sex)) = (self.age, self.sex.as_deref()) {
            write!(f, "_{age}_{sex}")?;
        }
        Ok(())
    }
}

impl FromStr for SubjectLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, '_');
        let subject = parts
            .next()
            .unwrap_or_default()
            .parse::<u32>()
            .with_context(|| format!("label {s:?}: bad subject id"))?;
        match (parts.next(), parts.next()) {
            (None, None) => Ok(Self::anonymous(subject)),
            (Some(age), Some(sex)) => {
                let age = age
                    .parse::<u32>()
                    .with_context(|| format!("label {s:?}: bad age"))?;
                Ok(Self::with_demographics(subject, age, sex))
            }
            _ => bail!("label {s:?}: expected `id` or `id_age_sex`"),
        }
    }
}

/// Label metadata attached to one triplet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripletLabel {
    /// Label of the anchor (and positive) sample.
    pub anchor: SubjectLabel,
    /// Label of the negative sample.
    pub negative: SubjectLabel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_form_with_demographics() {
        let l = SubjectLabel::with_demographics(7, 25, "male");
        assert_eq!(l.to_string(), "007_25_male");
        assert_eq!("007_25_male".parse::<SubjectLabel>().unwrap(), l);
    }

    #[test]
    fn text_form_anonymous() {
        let l = SubjectLabel::anonymous(142);
        assert_eq!(l.to_string(), "142");
        assert_eq!("142".parse::<SubjectLabel>().unwrap(), l);
    }

    #[test]
    fn sex_may_contain_separator() {
        let l: SubjectLabel = "003_40_not_given".parse().unwrap();
        assert_eq!(l.sex.as_deref(), Some("not_given"));
    }

    #[test]
    fn half_set_demographics_not_representable() {
        assert!(SubjectLabel::anonymous(4).is_representable());
        assert!(SubjectLabel::with_demographics(4, 30, "male").is_representable());
        let l = SubjectLabel { subject: 4, age: Some(30), sex: None };
        assert!(!l.is_representable());
    }

    #[test]
    fn malformed_labels_rejected() {
        assert!("abc".parse::<SubjectLabel>().is_err());
        assert!("001_25".parse::<SubjectLabel>().is_err());
        assert!("001_x_male".parse::<SubjectLabel>().is_err());
    }
}
