use std::{collections::BTreeMap, fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChainId {
    fn from(value: u64) -> Self {
        ChainId(value)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChainInfo {
    pub id: ChainId,
    pub name: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenType {
    #[serde(rename = "USDT")]
    Usdt,
    #[serde(rename = "USDC")]
    Usdc,
}

impl TokenType {
    pub const ALL: [TokenType; 2] = [TokenType::Usdt, TokenType::Usdc];

    pub fn symbol(self) -> &'static str {
        match self {
            TokenType::Usdt => "USDT",
            TokenType::Usdc => "USDC",
        }
    }

    pub fn metadata(self) -> TokenMetadata {
        let (name, image, color) = match self {
            TokenType::Usdt => ("Tether USD", "/tokens/usdt.png", "green-400"),
            TokenType::Usdc => ("USD Coin", "/tokens/usdc.png", "blue-400"),
        };
        TokenMetadata {
            symbol: self.symbol().to_string(),
            name: name.to_string(),
            image: image.to_string(),
            color: color.to_string(),
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub symbol: String,
    pub name: String,
    pub image: String,
    pub color: String,
}

pub fn token_metadata_table() -> BTreeMap<TokenType, TokenMetadata> {
    TokenType::ALL
        .iter()
        .map(|token_type| (*token_type, token_type.metadata()))
        .collect()
}

/// One positive stablecoin balance on one chain.
///
/// `balance_usd` is the balance itself rounded to cents: both tokens are
/// valued at a 1:1 USD peg.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetItem {
    pub chain: ChainInfo,
    pub symbol: String,
    pub token_type: TokenType,
    pub balance: String,
    #[serde(rename = "balanceUSD")]
    pub balance_usd: String,
    pub token_address: String,
    pub token_image: String,
}

impl AssetItem {
    /// USD value as a float, `None` when the stored string is not numeric.
    pub fn usd_value(&self) -> Option<f64> {
        self.balance_usd
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub assets: Vec<AssetItem>,
    pub total_usd_value: String,
    pub token_metadata: BTreeMap<TokenType, TokenMetadata>,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub success: bool,
    #[serde(flatten)]
    pub snapshot: BalanceSnapshot,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_age: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_refresh_in: Option<u64>,
}

impl BalanceResponse {
    pub fn fresh(snapshot: BalanceSnapshot, cache_window: Duration) -> Self {
        Self {
            success: true,
            snapshot,
            cached: false,
            cache_age: None,
            next_refresh_in: Some(rounded_secs(cache_window)),
        }
    }

    pub fn cached(snapshot: BalanceSnapshot, age: Duration, next_refresh_in: Duration) -> Self {
        Self {
            success: true,
            snapshot,
            cached: true,
            cache_age: Some(rounded_secs(age)),
            next_refresh_in: Some(rounded_secs(next_refresh_in)),
        }
    }
}

/// Two-decimal USD string, rounding exact ties up.
///
/// Rounds the exact binary value of `value`, so `0.625` gives `"0.63"`
/// while `1.005` (stored just below the tie) gives `"1.00"`.
pub fn format_usd(value: f64) -> String {
    if !value.is_finite() {
        return format!("{value:.2}");
    }
    // 60 fractional digits hold any f64 fraction exactly.
    let exact = format!("{:.60}", value.abs());
    let (whole, fraction) = exact.split_once('.').unwrap_or((exact.as_str(), ""));
    let mut digits: Vec<u8> = whole
        .bytes()
        .chain(fraction.bytes().chain(std::iter::repeat(b'0')).take(2))
        .map(|b| b - b'0')
        .collect();

    if fraction.as_bytes().get(2).is_some_and(|d| *d >= b'5') {
        let mut carry = true;
        for digit in digits.iter_mut().rev() {
            if *digit == 9 {
                *digit = 0;
            } else {
                *digit += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, 1);
        }
    }

    let split = digits.len() - 2;
    let render = |part: &[u8]| part.iter().map(|d| char::from(b'0' + d)).collect::<String>();
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}{}.{}", render(&digits[..split]), render(&digits[split..]))
}

/// RFC 3339 with millisecond precision, e.g. `2024-05-01T12:00:00.123Z`.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|value| value.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Whole seconds, rounding half up.
pub fn rounded_secs(value: Duration) -> u64 {
    (value.as_millis() as u64 + 500) / 1000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

/// Registry entry as published to clients: no RPC endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PublicTokenConfig {
    pub chain: ChainInfo,
    pub token_type: TokenType,
    pub token_address: String,
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_asset() -> AssetItem {
        AssetItem {
            chain: ChainInfo {
                id: ChainId(1),
                name: "Ethereum".to_string(),
                color: "blue".to_string(),
                icon: Some("/chains/ethereum.png".to_string()),
            },
            symbol: "USDC".to_string(),
            token_type: TokenType::Usdc,
            balance: "100.123456".to_string(),
            balance_usd: "100.12".to_string(),
            token_address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string(),
            token_image: "/tokens/usdc.png".to_string(),
        }
    }

    #[test]
    fn asset_item_uses_wire_field_names() {
        let json = serde_json::to_value(sample_asset()).unwrap();
        assert_eq!(json["balanceUSD"], "100.12");
        assert_eq!(json["tokenType"], "USDC");
        assert_eq!(json["tokenAddress"], "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
        assert_eq!(json["chain"]["id"], 1);
    }

    #[test]
    fn cached_response_flattens_snapshot() {
        let snapshot = BalanceSnapshot {
            assets: vec![sample_asset()],
            total_usd_value: "100.12".to_string(),
            token_metadata: token_metadata_table(),
            timestamp: Utc::now(),
        };
        let response = BalanceResponse::cached(
            snapshot,
            Duration::from_millis(12_400),
            Duration::from_millis(17_600),
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["cached"], true);
        assert_eq!(json["cacheAge"], 12);
        assert_eq!(json["nextRefreshIn"], 18);
        assert_eq!(json["totalUsdValue"], "100.12");
        assert_eq!(json["tokenMetadata"]["USDT"]["name"], "Tether USD");
    }

    #[test]
    fn fresh_response_omits_cache_age() {
        let snapshot = BalanceSnapshot {
            assets: vec![],
            total_usd_value: "0.00".to_string(),
            token_metadata: token_metadata_table(),
            timestamp: Utc::now(),
        };
        let json =
            serde_json::to_value(BalanceResponse::fresh(snapshot, Duration::from_secs(30)))
                .unwrap();
        assert!(json.get("cacheAge").is_none());
        assert_eq!(json["nextRefreshIn"], 30);
        assert_eq!(json["cached"], false);
    }

    #[test]
    fn usd_value_rejects_non_numeric() {
        let mut asset = sample_asset();
        asset.balance_usd = "n/a".to_string();
        assert_eq!(asset.usd_value(), None);
    }

    #[test]
    fn usd_rounds_exact_ties_up() {
        let cases = [
            (0.625, "0.63"),
            (0.125, "0.13"),
            (1.125, "1.13"),
            (2.375, "2.38"),
            (100.123456, "100.12"),
            (9.999, "10.00"),
            (1.005, "1.00"),
            (0.995, "0.99"),
        ];
        for (value, expected) in cases {
            assert_eq!(format_usd(value), expected, "{value}");
        }
    }

    #[test]
    fn usd_zero_is_unsigned() {
        assert_eq!(format_usd(0.0), "0.00");
        assert_eq!(format_usd(-0.0), "0.00");
    }

    #[test]
    fn snapshot_timestamp_has_millisecond_precision() {
        use chrono::TimeZone;

        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let snapshot = BalanceSnapshot {
            assets: vec![],
            total_usd_value: "0.00".to_string(),
            token_metadata: token_metadata_table(),
            timestamp,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00.123Z");

        let back: BalanceSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back.timestamp.timestamp_millis(), timestamp.timestamp_millis());
    }
}
