use serde::{Deserialize, Serialize};

/// Payment processor backing a billable entity.
///
/// `None` is the state of a billable that has never been charged or
/// subscribed; adapter selection fails until a processor is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Processor {
    Stripe,
    Braintree,
    None,
}

impl Processor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Processor::Stripe => "stripe",
            Processor::Braintree => "braintree",
            Processor::None => "none",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Processor::None)
    }
}

impl Default for Processor {
    fn default() -> Self {
        Processor::None
    }
}

impl std::fmt::Display for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Processor {
    type Err = UnknownProcessor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(Processor::Stripe),
            "braintree" => Ok(Processor::Braintree),
            "none" | "" => Ok(Processor::None),
            other => Err(UnknownProcessor(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown payment processor: {0}")]
pub struct UnknownProcessor(pub String);
