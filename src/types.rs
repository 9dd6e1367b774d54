use num_bigint::{BigInt, BigUint};
use serde::{Deserialize, Deserializer, Serialize};

/// Raw token base units (e.g. USDC with 6 decimals). Never floating point.
pub type Amount = u128;

/// Unbounded sum of many `Amount`s.
pub type Total = BigUint;

/// Unbounded running total that may dip below zero on malformed input.
pub type SignedTotal = BigInt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PolicyId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PoolId(pub u64);

/// Block time in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Timestamp(pub u64);

impl<'de> Deserialize<'de> for PolicyId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        decimal::deserialize_u64(deserializer).map(PolicyId)
    }
}

impl<'de> Deserialize<'de> for PoolId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        decimal::deserialize_u64(deserializer).map(PoolId)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        decimal::deserialize_u64(deserializer).map(Timestamp)
    }
}

/// Integers travel as JSON numbers or as decimal strings (graph-node encodes
/// `BigInt` as a string). Outgoing amounts are always decimal strings, so
/// anything this crate writes reads back exactly.
pub mod decimal {
    use std::fmt;
    use std::marker::PhantomData;
    use std::str::FromStr;

    use serde::de::{self, Visitor};
    use serde::{Deserialize, Deserializer, Serializer};

    struct DecimalVisitor<T>(PhantomData<T>);

    impl<'de, T> Visitor<'de> for DecimalVisitor<T>
    where
        T: FromStr + TryFrom<u64> + TryFrom<u128>,
    {
        type Value = T;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a non-negative integer or a decimal integer string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<T, E> {
            T::try_from(v).map_err(|_| E::custom(format!("integer {v} out of range")))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<T, E> {
            T::try_from(v).map_err(|_| E::custom(format!("integer {v} out of range")))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<T, E> {
            match u64::try_from(v) {
                Ok(v) => self.visit_u64(v),
                Err(_) => Err(E::invalid_value(de::Unexpected::Signed(v), &self)),
            }
        }

        // JSON numbers past u64 arrive here already rounded.
        fn visit_f64<E: de::Error>(self, v: f64) -> Result<T, E> {
            Err(E::invalid_value(de::Unexpected::Float(v), &self))
        }

        fn visit_str<E: de::Error>(self, s: &str) -> Result<T, E> {
            s.trim()
                .parse::<T>()
                .map_err(|_| E::custom(format!("invalid decimal integer {s:?}")))
        }
    }

    struct Decimal<T>(T);

    impl<'de, T> Deserialize<'de> for Decimal<T>
    where
        T: FromStr + TryFrom<u64> + TryFrom<u128>,
    {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_any(DecimalVisitor(PhantomData)).map(Decimal)
        }
    }

    pub fn deserialize_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        Decimal::deserialize(deserializer).map(|d| d.0)
    }

    pub fn deserialize_u128<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        Decimal::deserialize(deserializer).map(|d| d.0)
    }

    pub fn deserialize_opt_u128<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u128>, D::Error> {
        Option::<Decimal<u128>>::deserialize(deserializer).map(|o| o.map(|d| d.0))
    }

    pub fn serialize<T: ToString, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn serialize_opt<T: ToString, S: Serializer>(
        value: &Option<T>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }
}
