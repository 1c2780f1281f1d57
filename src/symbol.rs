//! Symbol normalization
//!
//! Upstream systems and user input spell A-share tickers in several ways
//! (`600519`, `sh600519`, `600519.SH`, `600519SH`, `SH.600519`). Everything
//! internal uses the canonical `CODE.EXCHANGE` form.

use crate::error::MarketDataError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    Shanghai,
    Shenzhen,
}

impl Exchange {
    pub fn tag(&self) -> &'static str {
        match self {
            Exchange::Shanghai => "SH",
            Exchange::Shenzhen => "SZ",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "SH" => Some(Exchange::Shanghai),
            "SZ" => Some(Exchange::Shenzhen),
            _ => None,
        }
    }

    /// Codes starting with 6 or 9 list in Shanghai, everything else in Shenzhen.
    pub fn infer(code: &str) -> Self {
        if code.starts_with('6') || code.starts_with('9') {
            Exchange::Shanghai
        } else {
            Exchange::Shenzhen
        }
    }

    /// Market digit used by the Eastmoney `secid` convention
    fn secid_digit(&self) -> char {
        match self {
            Exchange::Shanghai => '1',
            Exchange::Shenzhen => '0',
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Canonicalize a ticker into `CODE.EXCHANGE`.
///
/// Input that does not reduce to a 6-digit code comes back uppercased with
/// separators removed. Never fails.
pub fn normalize_symbol(symbol: &str) -> String {
    let s: String = symbol
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .collect();
    // Dropping a separator can expose edge whitespace
    let s = s.trim();

    let (exchange, code) = split_exchange_affix(s);

    if !is_six_digit_code(code) {
        return s.to_string();
    }
    let exchange = exchange.unwrap_or_else(|| Exchange::infer(code));
    format!("{}.{}", code, exchange.tag())
}

fn split_exchange_affix(s: &str) -> (Option<Exchange>, &str) {
    for exchange in [Exchange::Shanghai, Exchange::Shenzhen] {
        let tag = exchange.tag();
        if let Some(rest) = s.strip_prefix(tag) {
            return (Some(exchange), rest.strip_prefix('.').unwrap_or(rest));
        }
    }
    for exchange in [Exchange::Shanghai, Exchange::Shenzhen] {
        let tag = exchange.tag();
        if let Some(rest) = s.strip_suffix(tag) {
            return (Some(exchange), rest.strip_suffix('.').unwrap_or(rest));
        }
    }
    (None, s)
}

pub(crate) fn is_six_digit_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

/// Convert to the Eastmoney security id (`1.600519`, `0.000001`).
pub fn to_secid(symbol: &str) -> Result<String, MarketDataError> {
    let norm = normalize_symbol(symbol);
    let mut parts = norm.split('.');
    let (code, tag) = match (parts.next(), parts.next(), parts.next()) {
        (Some(code), Some(tag), None) => (code, tag),
        _ => return Err(MarketDataError::InvalidSymbol(symbol.to_string())),
    };
    let exchange =
        Exchange::from_tag(tag).ok_or_else(|| MarketDataError::InvalidSymbol(symbol.to_string()))?;
    Ok(format!("{}.{}", exchange.secid_digit(), code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_spellings_agree() {
        for input in ["600519", "sh600519", "600519.SH", "600519SH", "SH.600519", " 600519.sh "] {
            assert_eq!(normalize_symbol(input), "600519.SH", "input {input:?}");
        }
        assert_eq!(normalize_symbol("sz000001"), "000001.SZ");
        assert_eq!(normalize_symbol("300750"), "300750.SZ");
        assert_eq!(normalize_symbol("900901"), "900901.SH");
        assert_eq!(normalize_symbol("000-001_sz"), "000001.SZ");
        assert_eq!(normalize_symbol("-\t600519"), "600519.SH");
        assert_eq!(normalize_symbol("600519_\n"), "600519.SH");
    }

    #[test]
    fn explicit_tag_wins_over_inference() {
        assert_eq!(normalize_symbol("600519.SZ"), "600519.SZ");
    }

    #[test]
    fn unparseable_input_passes_through() {
        assert_eq!(normalize_symbol("ABCXYZ"), "ABCXYZ");
        assert_eq!(normalize_symbol(" btc-usdt "), "BTCUSDT");
        assert_eq!(normalize_symbol("60051"), "60051");
        assert_eq!(normalize_symbol(""), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in [
            "600519",
            "sh600519",
            "ABCXYZ",
            "000001.sz",
            "SH.60",
            "shsz",
            "6005190",
            "a b\tc",
            "-\t600519",
            "600519_\n",
            "_ \tsz000001-\n",
        ] {
            let once = normalize_symbol(input);
            assert_eq!(normalize_symbol(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn secid_conversion() {
        assert_eq!(to_secid("600519").unwrap(), "1.600519");
        assert_eq!(to_secid("000001.SZ").unwrap(), "0.000001");
        assert_eq!(to_secid("-\t600519").unwrap(), "1.600519");
        assert!(matches!(
            to_secid("ABCXYZ"),
            Err(MarketDataError::InvalidSymbol(_))
        ));
    }
}
