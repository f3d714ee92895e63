//! Money representations shared by the ledger and the price adapter.

/// Signed fiat minor units (cents). Positive balances are owed, negative owe.
pub type Cents = i64;

/// Smallest denomination of the settlement asset (wei-equivalent).
pub type ValueUnits = u128;

/// Fixed-point decimals of one whole settlement asset in `ValueUnits`.
pub const VALUE_UNIT_DECIMALS: u32 = 18;

/// Minor units per whole fiat unit.
pub const CENTS_PER_FIAT: u128 = 100;

/// Serde adapter writing `ValueUnits` as a decimal string.
///
/// JSON numbers cannot carry the full `u128` range (and `serde_json::Value`
/// rejects anything above `u64::MAX`), so persisted payloads use strings.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use splitter_core::{ValueUnits, money::units_as_string};
///
/// #[derive(Serialize, Deserialize)]
/// struct Paid {
///     #[serde(with = "units_as_string")]
///     units: ValueUnits,
/// }
///
/// let json = serde_json::to_string(&Paid { units: 25_000_000_000_000_000_000 }).unwrap();
/// assert_eq!(json, r#"{"units":"25000000000000000000"}"#);
/// ```
pub mod units_as_string {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    use super::ValueUnits;

    pub fn serialize<S>(units: &ValueUnits, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(units)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ValueUnits, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Transfer {
        #[serde(with = "units_as_string")]
        units: ValueUnits,
    }

    #[test]
    fn units_above_u64_survive_json_values() {
        let transfer = Transfer {
            units: u128::from(u64::MAX) * 10,
        };
        let value = serde_json::to_value(&transfer).unwrap();
        let back: Transfer = serde_json::from_value(value).unwrap();
        assert_eq!(back, transfer);
    }

    #[test]
    fn non_numeric_units_are_rejected() {
        assert!(serde_json::from_str::<Transfer>(r#"{"units":"lots"}"#).is_err());
    }
}
