use std::fmt;

/// Field of a billing request an input error points at.
///
/// Period indexes are 0-based positions in submission order (earliest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingField {
    /// The request as a whole, e.g. a body that is not valid JSON.
    Request,
    MaxDayDiff,
    Periods,
    BeginDate(usize),
    EndDate(usize),
}

impl fmt::Display for BillingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::MaxDayDiff => f.write_str("max-day-diff"),
            Self::Periods => f.write_str("periods"),
            Self::BeginDate(i) => write!(f, "begin-date[{i}]"),
            Self::EndDate(i) => write!(f, "end-date[{i}]"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BillingError {
    #[error("{field}: {message}")]
    Input { field: BillingField, message: String },
    #[error("There is no sub meter.")]
    NoSubMeter,
    #[error("source error: {0}")]
    Source(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl BillingError {
    pub fn input(field: BillingField, message: impl Into<String>) -> Self {
        Self::Input {
            field,
            message: message.into(),
        }
    }

    /// Whether the error should be shown to the user as is, rather than
    /// reported as an internal failure.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::Input { .. } | Self::NoSubMeter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_error_names_the_field() {
        let err = BillingError::input(
            BillingField::BeginDate(1),
            "Begin date must follow previous billing period's end date.",
        );
        assert_eq!(
            err.to_string(),
            "begin-date[1]: Begin date must follow previous billing period's end date."
        );
        assert!(err.is_user_facing());
    }

    #[test]
    fn storage_error_is_internal() {
        assert!(BillingError::NoSubMeter.is_user_facing());
        assert!(!BillingError::Storage("connection reset".to_string()).is_user_facing());
    }
}
