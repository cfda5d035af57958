//! Typed property values and coercion from raw column values.

use chrono::{NaiveDate, NaiveDateTime};
use storable_core::{CustomColumn, EntityType, InternalType, PropertyDescriptor, SqlValue};

use crate::error::{OrmError, Result};
use crate::instance::{EntityRef, Handle};

/// A resolved property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// No value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// String.
    String(String),
    /// Decoded JSON.
    Mixed(serde_json::Value),
    /// Referenced instance.
    Entity(EntityRef),
    /// Raw value of a custom column type.
    Custom(SqlValue),
}

impl PropertyValue {
    /// Returns true for [`PropertyValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short type name, for messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Mixed(_) => "mixed",
            Self::Entity(_) => "entity",
            Self::Custom(_) => "custom",
        }
    }

    /// Returns the referenced instance, if any.
    #[must_use]
    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }
}

/// Describes the declared type of `property`, for messages.
pub(crate) fn declared_type(property: &PropertyDescriptor) -> String {
    match &property.internal_type {
        InternalType::Bool => "bool".to_string(),
        InternalType::Int => "int".to_string(),
        InternalType::Float => "float".to_string(),
        InternalType::String => "string".to_string(),
        InternalType::Mixed => "mixed".to_string(),
        InternalType::Entity => format!(
            "entity {}",
            property.referenced_entity.as_deref().unwrap_or("?")
        ),
        InternalType::Custom(name) => name.clone(),
    }
}

/// Turns a raw column value into a typed one.
///
/// References are left to the session, which resolves them through the
/// identity cache.
pub(crate) fn coerce(property: &PropertyDescriptor, raw: &SqlValue) -> Result<PropertyValue> {
    if raw.is_null() {
        return Ok(PropertyValue::Null);
    }
    let mismatch = || OrmError::TypeMismatch {
        entity: String::new(),
        property: property.name.clone(),
        expected: declared_type(property),
        found: format!("{raw:?}"),
    };
    Ok(match &property.internal_type {
        InternalType::Bool => PropertyValue::Bool(raw.as_bool().ok_or_else(mismatch)?),
        InternalType::Int | InternalType::Entity => {
            PropertyValue::Int(raw.as_i64().ok_or_else(mismatch)?)
        }
        InternalType::Float => PropertyValue::Float(raw.as_f64().ok_or_else(mismatch)?),
        InternalType::String => PropertyValue::String(raw.to_text().unwrap_or_default()),
        InternalType::Mixed => {
            let text = raw.to_text().unwrap_or_default();
            PropertyValue::Mixed(serde_json::from_str(&text)?)
        }
        InternalType::Custom(_) => PropertyValue::Custom(raw.clone()),
    })
}

/// Turns a typed value into what is written to the column.
pub(crate) fn to_column(value: &PropertyValue) -> Result<SqlValue> {
    Ok(match value {
        PropertyValue::Null => SqlValue::Null,
        PropertyValue::Bool(b) => SqlValue::Bool(*b),
        PropertyValue::Int(n) => SqlValue::Int(*n),
        PropertyValue::Float(f) => SqlValue::Float(*f),
        PropertyValue::String(s) => SqlValue::Text(s.clone()),
        PropertyValue::Mixed(json) => SqlValue::Text(serde_json::to_string(json)?),
        PropertyValue::Custom(raw) => raw.clone(),
        PropertyValue::Entity(entity) => {
            let state = entity.state();
            match state.id() {
                Some(id) => SqlValue::Int(id),
                None => return Err(OrmError::NotStored(state.label())),
            }
        }
    })
}

/// Checks `value` against the declared type of `property`.
///
/// Integers are widened to floats; anything but a reference or a custom
/// value is accepted by a mixed property and encoded as JSON.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn validate(
    entity: &str,
    property: &PropertyDescriptor,
    value: PropertyValue,
) -> Result<PropertyValue> {
    let mismatch = |found: &str| OrmError::TypeMismatch {
        entity: entity.to_string(),
        property: property.name.clone(),
        expected: declared_type(property),
        found: found.to_string(),
    };
    let found = value.type_name();
    match (&property.internal_type, value) {
        (_, PropertyValue::Null) if property.allow_null => Ok(PropertyValue::Null),
        (_, PropertyValue::Null) => Err(mismatch("null")),
        (_, PropertyValue::Float(f)) if !f.is_finite() => Err(mismatch("non-finite float")),
        (InternalType::Bool, v @ PropertyValue::Bool(_))
        | (InternalType::Int, v @ PropertyValue::Int(_))
        | (InternalType::Float, v @ PropertyValue::Float(_))
        | (InternalType::String, v @ PropertyValue::String(_))
        | (InternalType::Mixed, v @ PropertyValue::Mixed(_))
        | (InternalType::Custom(_), v @ PropertyValue::Custom(_)) => Ok(v),
        (InternalType::Float, PropertyValue::Int(n)) => Ok(PropertyValue::Float(n as f64)),
        (InternalType::Mixed, PropertyValue::Bool(b)) => Ok(PropertyValue::Mixed(b.into())),
        (InternalType::Mixed, PropertyValue::Int(n)) => Ok(PropertyValue::Mixed(n.into())),
        (InternalType::Mixed, PropertyValue::Float(f)) => Ok(PropertyValue::Mixed(f.into())),
        (InternalType::Mixed, PropertyValue::String(s)) => Ok(PropertyValue::Mixed(s.into())),
        (InternalType::Entity, PropertyValue::Entity(target)) => {
            let expected = property.referenced_entity.as_deref().unwrap_or_default();
            let state = target.state();
            if state.is_a(expected) {
                drop(state);
                Ok(PropertyValue::Entity(target))
            } else {
                Err(mismatch(&format!("entity {}", state.entity_name())))
            }
        }
        _ => Err(mismatch(found)),
    }
}

/// Rust types that can be read from and written to a property.
pub trait FieldValue: Sized {
    /// Converts into a property value.
    fn into_value(self) -> PropertyValue;

    /// Converts from a property value, or `None` if the shape differs.
    fn from_value(value: PropertyValue) -> Option<Self>;

    /// Name used in type mismatch errors.
    fn type_name() -> &'static str;
}

impl FieldValue for PropertyValue {
    fn into_value(self) -> PropertyValue {
        self
    }

    fn from_value(value: PropertyValue) -> Option<Self> {
        Some(value)
    }

    fn type_name() -> &'static str {
        "value"
    }
}

impl FieldValue for bool {
    fn into_value(self) -> PropertyValue {
        PropertyValue::Bool(self)
    }

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    fn type_name() -> &'static str {
        "bool"
    }
}

macro_rules! int_field_value {
    ($($ty:ty),*) => {
        $(
            impl FieldValue for $ty {
                fn into_value(self) -> PropertyValue {
                    PropertyValue::Int(i64::from(self))
                }

                fn from_value(value: PropertyValue) -> Option<Self> {
                    match value {
                        PropertyValue::Int(n) => <$ty>::try_from(n).ok(),
                        _ => None,
                    }
                }

                fn type_name() -> &'static str {
                    stringify!($ty)
                }
            }
        )*
    };
}

int_field_value!(i8, i16, i32, i64, u8, u16, u32);

impl FieldValue for f64 {
    fn into_value(self) -> PropertyValue {
        PropertyValue::Float(self)
    }

    #[allow(clippy::cast_precision_loss)]
    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Float(f) => Some(f),
            PropertyValue::Int(n) => Some(n as f64),
            _ => None,
        }
    }

    fn type_name() -> &'static str {
        "f64"
    }
}

impl FieldValue for String {
    fn into_value(self) -> PropertyValue {
        PropertyValue::String(self)
    }

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn type_name() -> &'static str {
        "String"
    }
}

impl FieldValue for serde_json::Value {
    fn into_value(self) -> PropertyValue {
        PropertyValue::Mixed(self)
    }

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Mixed(json) => Some(json),
            PropertyValue::Null => Some(Self::Null),
            _ => None,
        }
    }

    fn type_name() -> &'static str {
        "serde_json::Value"
    }
}

impl<T: EntityType> FieldValue for Handle<T> {
    fn into_value(self) -> PropertyValue {
        PropertyValue::Entity(self.into_entity_ref())
    }

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Entity(entity) => Handle::try_from_ref(entity),
            _ => None,
        }
    }

    fn type_name() -> &'static str {
        T::NAME
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn into_value(self) -> PropertyValue {
        self.map_or(PropertyValue::Null, FieldValue::into_value)
    }

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn type_name() -> &'static str {
        T::type_name()
    }
}

/// Implements [`FieldValue`] for a [`CustomColumn`] type.
///
/// ```ignore
/// storable_orm::custom_field_value!(Money);
/// ```
#[macro_export]
macro_rules! custom_field_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::FieldValue for $ty {
                fn into_value(self) -> $crate::PropertyValue {
                    $crate::PropertyValue::Custom(
                        <$ty as $crate::storable_core::CustomColumn>::to_sql_value(&self),
                    )
                }

                fn from_value(value: $crate::PropertyValue) -> Option<Self> {
                    match value {
                        $crate::PropertyValue::Custom(raw) => {
                            <$ty as $crate::storable_core::CustomColumn>::from_sql_value(&raw).ok()
                        }
                        _ => None,
                    }
                }

                fn type_name() -> &'static str {
                    <$ty as $crate::storable_core::CustomColumn>::TYPE_NAME
                }
            }
        )*
    };
}

// Built-in custom columns; expanded by hand since the macro names `$crate`.
impl FieldValue for NaiveDateTime {
    fn into_value(self) -> PropertyValue {
        PropertyValue::Custom(CustomColumn::to_sql_value(&self))
    }

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Custom(raw) => <Self as CustomColumn>::from_sql_value(&raw).ok(),
            _ => None,
        }
    }

    fn type_name() -> &'static str {
        <Self as CustomColumn>::TYPE_NAME
    }
}

impl FieldValue for NaiveDate {
    fn into_value(self) -> PropertyValue {
        PropertyValue::Custom(CustomColumn::to_sql_value(&self))
    }

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Custom(raw) => <Self as CustomColumn>::from_sql_value(&raw).ok(),
            _ => None,
        }
    }

    fn type_name() -> &'static str {
        <Self as CustomColumn>::TYPE_NAME
    }
}
