#![forbid(unsafe_code)]

/// A named cost/quality class of model. The built-in tiers are `haiku`,
/// `sonnet` and `opus`, but the set is open: configuration may register any
/// identifier that passes validation, so new tiers arrive without a code
/// change.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelTier(String);

impl ModelTier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, ModelTierError> {
        let value = value.into();
        validate_tier(&value)?;
        Ok(Self(value))
    }

    pub fn haiku() -> Self {
        Self("haiku".to_string())
    }

    pub fn sonnet() -> Self {
        Self("sonnet".to_string())
    }

    pub fn opus() -> Self {
        Self("opus".to_string())
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelTierError {
    Empty,
    TooLong,
    InvalidFirstChar,
    InvalidChar { ch: char, index: usize },
}

fn validate_tier(value: &str) -> Result<(), ModelTierError> {
    if value.is_empty() {
        return Err(ModelTierError::Empty);
    }
    if value.len() > 64 {
        return Err(ModelTierError::TooLong);
    }
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return Err(ModelTierError::Empty);
    };
    if !first.is_ascii_alphanumeric() {
        return Err(ModelTierError::InvalidFirstChar);
    }
    for (index, ch) in value.chars().enumerate() {
        if index == 0 {
            continue;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            continue;
        }
        return Err(ModelTierError::InvalidChar { ch, index });
    }
    Ok(())
}
