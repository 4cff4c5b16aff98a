use core::fmt;

/// Identifies one of the operations exposed by the calculator service.
///
/// The string form returned by [`Operation::as_str`] is stable; it is used as
/// the `operation` attribute on logs and metrics and inside error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Factorial,
    DescriptiveStats,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "Add",
            Self::Subtract => "Subtract",
            Self::Multiply => "Multiply",
            Self::Divide => "Divide",
            Self::Power => "Power",
            Self::Factorial => "Factorial",
            Self::DescriptiveStats => "DescriptiveStats",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
