use crate::error::{GridGaError, Result};
use rand::Rng;
use std::fmt;

/// Characters accepted between categories in a categorical definition
const CATEGORY_SEPARATORS: &[char] = &[',', ' ', ':', ';', '|'];

/// The shape of one dimension of the search space.
///
/// Stepped kinds only ever hold `min + k * step`; the highest legal value is
/// therefore the largest such number not above `max`, which may be below
/// `max` itself when the range is not a multiple of the step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterKind {
    LinearInteger { min: i32, max: i32, step: i32 },
    /// Searched on the exponent; workers see `2^value`.
    Log2Integer { min: i32, max: i32, step: i32 },
    Categorical { categories: Vec<String> },
}

impl ParameterKind {
    /// Inclusive range of legal internal values.
    pub fn bounds(&self) -> (i32, i32) {
        match self {
            ParameterKind::LinearInteger { min, max, step }
            | ParameterKind::Log2Integer { min, max, step } => {
                let span = (*max as i64 - *min as i64) / *step as i64;
                (*min, (*min as i64 + span * *step as i64) as i32)
            }
            ParameterKind::Categorical { categories } => (0, categories.len() as i32 - 1),
        }
    }

    pub fn step(&self) -> i32 {
        match self {
            ParameterKind::LinearInteger { step, .. } | ParameterKind::Log2Integer { step, .. } => {
                *step
            }
            ParameterKind::Categorical { .. } => 1,
        }
    }

    /// Number of distinct legal values.
    pub fn value_count(&self) -> u64 {
        let (low, high) = self.bounds();
        ((high as i64 - low as i64) / self.step() as i64 + 1) as u64
    }

    /// Clamp into bounds, then snap down onto the step grid.
    fn snap(&self, value: i64) -> i32 {
        let (low, high) = self.bounds();
        let clamped = value.clamp(low as i64, high as i64);
        let step = self.step() as i64;
        (low as i64 + ((clamped - low as i64) / step) * step) as i32
    }

    fn type_name(&self) -> &'static str {
        match self {
            ParameterKind::LinearInteger { .. } => "integer",
            ParameterKind::Log2Integer { .. } => "exp-2",
            ParameterKind::Categorical { .. } => "categorical",
        }
    }
}

/// One tunable parameter together with its current value.
///
/// Every genome holds its own clone of each descriptor, so mutating one
/// genome never touches another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    identifier: String,
    kind: ParameterKind,
    value: i32,
}

impl ParameterDescriptor {
    pub fn new(identifier: impl Into<String>, kind: ParameterKind) -> Result<Self> {
        let identifier = identifier.into();
        if identifier.trim().is_empty() {
            return Err(GridGaError::InvalidParameter(
                "Parameter identifier must not be empty".to_string(),
            ));
        }

        match &kind {
            ParameterKind::LinearInteger { min, max, step }
            | ParameterKind::Log2Integer { min, max, step } => {
                if *step <= 0 {
                    return Err(GridGaError::InvalidParameter(format!(
                        "{}: step must be positive, got {}",
                        identifier, step
                    )));
                }
                if min > max {
                    return Err(GridGaError::InvalidParameter(format!(
                        "{}: low ({}) is greater than high ({})",
                        identifier, min, max
                    )));
                }
            }
            ParameterKind::Categorical { categories } => {
                if categories.is_empty() {
                    return Err(GridGaError::InvalidParameter(format!(
                        "{}: categorical parameter needs at least one value",
                        identifier
                    )));
                }
            }
        }

        // Start in the middle of the range
        let (low, high) = kind.bounds();
        let value = kind.snap((low as i64 + high as i64) / 2);

        Ok(Self {
            identifier,
            kind,
            value,
        })
    }

    pub fn linear(identifier: impl Into<String>, min: i32, max: i32, step: i32) -> Result<Self> {
        Self::new(identifier, ParameterKind::LinearInteger { min, max, step })
    }

    pub fn log2(identifier: impl Into<String>, min: i32, max: i32, step: i32) -> Result<Self> {
        Self::new(identifier, ParameterKind::Log2Integer { min, max, step })
    }

    pub fn categorical<S: Into<String>>(
        identifier: impl Into<String>,
        categories: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        Self::new(
            identifier,
            ParameterKind::Categorical {
                categories: categories.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// Build a categorical descriptor from a list such as `"h1,h4,single,none"`.
    pub fn categorical_from_list(identifier: impl Into<String>, list: &str) -> Result<Self> {
        Self::categorical(
            identifier,
            list.split(CATEGORY_SEPARATORS).filter(|s| !s.is_empty()),
        )
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn kind(&self) -> &ParameterKind {
        &self.kind
    }

    pub fn internal_value(&self) -> i32 {
        self.value
    }

    /// Out-of-range values are clamped and snapped, never rejected.
    pub fn set_internal_value(&mut self, value: i32) {
        self.value = self.kind.snap(value as i64);
    }

    /// Assign a uniformly random legal value and return it.
    pub fn random_value<R: Rng + ?Sized>(&mut self, rng: &mut R) -> i32 {
        let (low, _) = self.kind.bounds();
        let k = rng.gen_range(0..self.kind.value_count()) as i64;
        self.value = (low as i64 + k * self.kind.step() as i64) as i32;
        self.value
    }

    pub fn increase(&mut self) {
        self.value = self.kind.snap(self.value as i64 + self.kind.step() as i64);
    }

    pub fn decrease(&mut self) {
        self.value = self.kind.snap(self.value as i64 - self.kind.step() as i64);
    }

    /// The representation handed to the evaluated program.
    pub fn display_value(&self) -> String {
        match &self.kind {
            ParameterKind::LinearInteger { .. } => self.value.to_string(),
            ParameterKind::Log2Integer { .. } => {
                if (0..63).contains(&self.value) {
                    (1u64 << self.value).to_string()
                } else {
                    2f64.powi(self.value).to_string()
                }
            }
            ParameterKind::Categorical { categories } => categories[self.value as usize].clone(),
        }
    }

    pub fn is_within_bounds(&self) -> bool {
        let (low, high) = self.kind.bounds();
        (low..=high).contains(&self.value)
            && (self.value as i64 - low as i64) % self.kind.step() as i64 == 0
    }
}

impl fmt::Display for ParameterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) = {}",
            self.identifier,
            self.kind.type_name(),
            self.display_value()
        )
    }
}
