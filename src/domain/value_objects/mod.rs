//! Value Objects for dealer purchase orders

use rust_decimal::Decimal;
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier types that are backed by a positive database key.
pub trait NumericId: Copy + Sized {
    const LABEL: &'static str;
    fn from_raw(value: i64) -> Result<Self, IdError>;
    fn get(self) -> i64;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    NotPositive { label: &'static str, value: i64 },
    NotNumeric { label: &'static str, value: String },
}

impl std::error::Error for IdError {}
impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPositive { label, value } => write!(f, "{label} must be a positive integer, got {value}"),
            Self::NotNumeric { label, value } => write!(f, "{label} must be numeric, got {value:?}"),
        }
    }
}

impl From<IdError> for crate::PoError {
    fn from(err: IdError) -> Self {
        crate::PoError::Validation(err.to_string())
    }
}

fn parse_id<T: NumericId>(raw: &str) -> Result<T, IdError> {
    let trimmed = raw.trim();
    let value = trimmed
        .parse::<i64>()
        .map_err(|_| IdError::NotNumeric { label: T::LABEL, value: trimmed.to_string() })?;
    T::from_raw(value)
}

macro_rules! numeric_id {
    ($name:ident, $label:literal) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(i64);

        impl $name {
            pub fn new(value: i64) -> Result<Self, IdError> {
                if value <= 0 {
                    return Err(IdError::NotPositive { label: $label, value });
                }
                Ok(Self(value))
            }
        }

        impl NumericId for $name {
            const LABEL: &'static str = $label;
            fn from_raw(value: i64) -> Result<Self, IdError> { Self::new(value) }
            fn get(self) -> i64 { self.0 }
        }

        impl FromStr for $name {
            type Err = IdError;
            fn from_str(s: &str) -> Result<Self, Self::Err> { parse_id(s) }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_i64(self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_any(IdVisitor::<$name>(PhantomData))
            }
        }
    };
}

numeric_id!(DealerId, "dealerId");
numeric_id!(ProductId, "productId");
numeric_id!(PoId, "poId");
numeric_id!(LineItemId, "lineItemId");
numeric_id!(ColorId, "colorId");
numeric_id!(AddOnId, "addOnId");
numeric_id!(PlatformId, "bodyId");
numeric_id!(CategoryId, "catId");
numeric_id!(VendorId, "vendorId");

/// Accepts a JSON number or a numeric string. Form inputs send both.
struct IdVisitor<T>(PhantomData<T>);

impl<'de, T: NumericId> Visitor<'de> for IdVisitor<T> {
    type Value = T;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a positive integer {}", T::LABEL)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<T, E> {
        T::from_raw(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<T, E> {
        let v = i64::try_from(v).map_err(|_| E::custom(format!("{} is too large", T::LABEL)))?;
        self.visit_i64(v)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<T, E> {
        parse_id(v).map_err(E::custom)
    }
}

struct OptionalIdVisitor<T>(PhantomData<T>);

impl<'de, T: NumericId> Visitor<'de> for OptionalIdVisitor<T> {
    type Value = Option<T>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "an optional positive integer {}", T::LABEL)
    }

    fn visit_none<E: de::Error>(self) -> Result<Option<T>, E> { Ok(None) }
    fn visit_unit<E: de::Error>(self) -> Result<Option<T>, E> { Ok(None) }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Option<T>, D::Error> {
        optional_id(d)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Option<T>, E> {
        IdVisitor::<T>(PhantomData).visit_i64(v).map(Some)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Option<T>, E> {
        IdVisitor::<T>(PhantomData).visit_u64(v).map(Some)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Option<T>, E> {
        if v.trim().is_empty() {
            return Ok(None);
        }
        IdVisitor::<T>(PhantomData).visit_str(v).map(Some)
    }
}

/// `deserialize_with` helper for optional identifiers: null, a missing field
/// or an empty string mean "not selected".
pub fn optional_id<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: NumericId,
{
    deserializer.deserialize_any(OptionalIdVisitor::<T>(PhantomData))
}

// =============================================================================
// Delimited identifier lists
// =============================================================================

/// Catalog domains (colors, add-ons) are stored as comma-delimited id lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdList<T>(Vec<T>);

impl<T: NumericId + PartialEq> IdList<T> {
    /// Parses `"1, 2,,3"`. Segments that are not positive integers are dropped.
    pub fn parse(raw: &str) -> Self {
        let ids = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match parse_id::<T>(s) {
                Ok(id) => Some(id),
                Err(err) => {
                    tracing::warn!(segment = s, error = %err, "dropping malformed id in delimited list");
                    None
                }
            })
            .collect();
        Self(ids)
    }

    pub fn contains(&self, id: T) -> bool { self.0.contains(&id) }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn ids(&self) -> &[T] { &self.0 }

    pub fn to_delimited(&self) -> String {
        self.0.iter().map(|id| id.get().to_string()).collect::<Vec<_>>().join(",")
    }
}

impl<T> Default for IdList<T> {
    fn default() -> Self { Self(Vec::new()) }
}

impl<T: NumericId> Serialize for IdList<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|id| id.get()))
    }
}

impl<'de, T: NumericId + PartialEq> Deserialize<'de> for IdList<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ListVisitor<T>(PhantomData<T>);

        impl<'de, T: NumericId + PartialEq> Visitor<'de> for ListVisitor<T> {
            type Value = IdList<T>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a comma-delimited string or an array of {} values", T::LABEL)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<IdList<T>, E> { Ok(IdList::parse(v)) }
            fn visit_unit<E: de::Error>(self) -> Result<IdList<T>, E> { Ok(IdList::default()) }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<IdList<T>, A::Error> {
                let mut ids = Vec::new();
                while let Some(raw) = seq.next_element::<i64>()? {
                    ids.push(T::from_raw(raw).map_err(de::Error::custom)?);
                }
                Ok(IdList(ids))
            }
        }

        deserializer.deserialize_any(ListVisitor(PhantomData))
    }
}

// =============================================================================
// Money & quantities
// =============================================================================

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn usd(amount: Decimal) -> Self { Self::new(amount, "USD") }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount * Decimal::from(qty), &self.currency) }
}

impl Default for Money { fn default() -> Self { Self::zero("USD") } }

#[derive(Debug, Clone)] pub enum MoneyError { CurrencyMismatch }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Currency mismatch") }
}

/// Quantity as sent by the storefront. Missing, non-numeric and non-positive
/// values normalize to 1; anything else is kept for range checking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RequestedQuantity(u32);

impl RequestedQuantity {
    pub fn new(value: u32) -> Self { Self(value.max(1)) }
    pub fn value(self) -> u32 { self.0 }

    fn from_i64(v: i64) -> Self {
        if v <= 0 { Self(1) } else { Self(u32::try_from(v).unwrap_or(u32::MAX)) }
    }
}

impl Default for RequestedQuantity { fn default() -> Self { Self(1) } }

impl<'de> Deserialize<'de> for RequestedQuantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct QtyVisitor;

        impl<'de> Visitor<'de> for QtyVisitor {
            type Value = RequestedQuantity;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "a quantity") }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> { Ok(RequestedQuantity::from_i64(v)) }
            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(RequestedQuantity::from_i64(i64::try_from(v).unwrap_or(i64::MAX)))
            }
            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                if v.is_finite() && v >= 1.0 {
                    Ok(RequestedQuantity::from_i64(v.min(i64::MAX as f64) as i64))
                } else {
                    Ok(RequestedQuantity::default())
                }
            }
            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(v.trim().parse::<i64>().map(RequestedQuantity::from_i64).unwrap_or_default())
            }
            fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> { Ok(RequestedQuantity::default()) }
            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> { Ok(RequestedQuantity::default()) }
            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> { Ok(RequestedQuantity::default()) }
        }

        deserializer.deserialize_any(QtyVisitor)
    }
}

struct WholeNumberVisitor;

impl<'de> Visitor<'de> for WholeNumberVisitor {
    type Value = i64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "an integer or numeric string") }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> { Ok(v) }
    fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> { Ok(i64::try_from(v).unwrap_or(i64::MAX)) }
    fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
        v.trim().parse().map_err(|_| E::custom(format!("expected an integer, got {v:?}")))
    }
}

/// `deserialize_with` helper for strict integer fields that may arrive as
/// form strings. Unlike `RequestedQuantity`, junk is an error.
pub fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    deserializer.deserialize_any(WholeNumberVisitor)
}

// =============================================================================
// Human-readable document numbers
// =============================================================================

/// PO number, allocated from a database sequence at send time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoNumber(i64);

impl PoNumber {
    pub const PREFIX: &'static str = "PO-";
    pub const FIRST: i64 = 1001;
    pub fn new(value: i64) -> Self { Self(value) }
    pub fn value(self) -> i64 { self.0 }

    /// Accepts `PO-1001`, `po-1001` or `1001`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let digits = match raw.get(..Self::PREFIX.len()) {
            Some(head) if head.eq_ignore_ascii_case(Self::PREFIX) => &raw[Self::PREFIX.len()..],
            _ => raw,
        };
        digits.parse::<i64>().ok().filter(|n| *n > 0).map(Self)
    }
}

impl fmt::Display for PoNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}{}", Self::PREFIX, self.0) }
}

impl Serialize for PoNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Sales order number. Orders begin at 660000.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(i64);

impl OrderNumber {
    pub const PREFIX: &'static str = "BMR-";
    pub const FIRST: i64 = 660_000;
    pub fn new(value: i64) -> Self { Self(value) }
    pub fn value(self) -> i64 { self.0 }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}{}", Self::PREFIX, self.0) }
}

impl Serialize for OrderNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct FormFields {
        #[serde(default, deserialize_with = "optional_id")]
        color: Option<ColorId>,
        #[serde(default)]
        qty: RequestedQuantity,
    }

    #[test]
    fn test_ids_accept_numbers_and_numeric_strings() {
        let a: ProductId = serde_json::from_str("101").unwrap();
        let b: ProductId = serde_json::from_str("\" 101 \"").unwrap();
        assert_eq!(a, b);
        assert!(serde_json::from_str::<ProductId>("\"abc\"").is_err());
        assert!(serde_json::from_str::<ProductId>("0").is_err());
        assert!(serde_json::from_str::<ProductId>("-4").is_err());
        assert!("12x".parse::<DealerId>().is_err());
    }

    #[test]
    fn test_optional_id_treats_blank_as_unselected() {
        let p: FormFields = serde_json::from_str(r#"{"color": ""}"#).unwrap();
        assert_eq!(p.color, None);
        let p: FormFields = serde_json::from_str(r#"{"color": null}"#).unwrap();
        assert_eq!(p.color, None);
        let p: FormFields = serde_json::from_str(r#"{"color": "7"}"#).unwrap();
        assert_eq!(p.color, Some(ColorId::new(7).unwrap()));
        assert!(serde_json::from_str::<FormFields>(r#"{"color": "red"}"#).is_err());
    }

    #[test]
    fn test_whole_number_accepts_form_strings_only_when_numeric() {
        #[derive(Deserialize)]
        struct Edit {
            #[serde(deserialize_with = "whole_number")]
            quantity: i64,
        }
        let quantity = |json: &str| serde_json::from_str::<Edit>(json).map(|e| e.quantity);
        assert_eq!(quantity(r#"{"quantity": 5}"#).unwrap(), 5);
        assert_eq!(quantity(r#"{"quantity": " 7 "}"#).unwrap(), 7);
        assert_eq!(quantity(r#"{"quantity": "-2"}"#).unwrap(), -2);
        assert!(quantity(r#"{"quantity": "five"}"#).is_err());
        assert!(quantity(r#"{"quantity": ""}"#).is_err());
        assert!(quantity(r#"{"quantity": true}"#).is_err());
    }

    #[test]
    fn test_quantity_normalization() {
        let qty = |json: &str| serde_json::from_str::<FormFields>(json).unwrap().qty.value();
        assert_eq!(qty("{}"), 1);
        assert_eq!(qty(r#"{"qty": 0}"#), 1);
        assert_eq!(qty(r#"{"qty": -3}"#), 1);
        assert_eq!(qty(r#"{"qty": "abc"}"#), 1);
        assert_eq!(qty(r#"{"qty": "4"}"#), 4);
        assert_eq!(qty(r#"{"qty": 12}"#), 12);
    }

    #[test]
    fn test_id_list_parsing() {
        let list = IdList::<ColorId>::parse(" 1, 2,,x, 9 ");
        assert_eq!(list.to_delimited(), "1,2,9");
        assert!(list.contains(ColorId::new(9).unwrap()));
        assert!(!list.contains(ColorId::new(3).unwrap()));
        assert!(IdList::<ColorId>::parse("").is_empty());
        let from_array: IdList<ColorId> = serde_json::from_str("[4, 5]").unwrap();
        assert_eq!(from_array.to_delimited(), "4,5");
    }

    #[test]
    fn test_document_numbers() {
        assert_eq!(PoNumber::new(1001).to_string(), "PO-1001");
        assert_eq!(PoNumber::parse("po-1001"), Some(PoNumber::new(1001)));
        assert_eq!(PoNumber::parse("1001"), Some(PoNumber::new(1001)));
        assert_eq!(PoNumber::parse("PO-x"), None);
        assert_eq!(OrderNumber::new(OrderNumber::FIRST).to_string(), "BMR-660000");
    }

    #[test]
    fn test_money_add() {
        let a = Money::usd(Decimal::new(100, 0));
        let b = Money::usd(Decimal::new(50, 0));
        assert_eq!(a.add(&b).unwrap().amount(), Decimal::new(150, 0));
        assert!(a.add(&Money::zero("EUR")).is_err());
    }
}
