use std::fmt;

/// A non-negative base-unit amount of any size, kept as canonical decimal digits (no sign, no
/// leading zeros).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseAmount(String);

impl BaseAmount {
    pub fn digits(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BaseAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.digits())
    }
}

impl From<u128> for BaseAmount {
    fn from(v: u128) -> Self {
        Self(v.to_string())
    }
}

/// Parse a base-unit amount (no decimals) as sent by the embedding application.
pub fn parse_base_amount(s: &str) -> eyre::Result<BaseAmount> {
    let s = s.trim();
    if s.is_empty() {
        eyre::bail!("empty amount");
    }
    if s.starts_with('-') {
        eyre::bail!("amount must be non-negative");
    }
    let digits = s.strip_prefix('+').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        eyre::bail!("parse base amount {s:?}: expected decimal digits");
    }
    let canonical = digits.trim_start_matches('0');
    if canonical.is_empty() {
        return Ok(BaseAmount("0".to_owned()));
    }
    Ok(BaseAmount(canonical.to_owned()))
}

/// Map a bank denomination to its key in the brand registry: `ubld` (any case) is the staking
/// token `BLD`; everything else is used upper-cased.
pub fn brand_key_for_denom(denom: &str) -> String {
    let d = denom.trim();
    if d.eq_ignore_ascii_case("ubld") {
        return "BLD".to_owned();
    }
    d.to_uppercase()
}
