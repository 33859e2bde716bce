// SPDX-License-Identifier: MIT

//! Type-erased attribute values.
//!
//! [`Attribute`] pairs a value with a [`Datatype`] discriminator, the same
//! way a DDS `DynamicValue` pairs a payload with its `TypeKind`: the enum
//! tag *is* the thing a backend dispatches on, so there is no separate
//! open-ended `dyn Any` path here.

use crate::datatype::Datatype;
use crate::error::{Error, Result};

/// A type-erased value paired with a [`Datatype`] discriminator.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Char(i8),
    UChar(u8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    /// Rust has no native extended-precision float; `long double` round-trips
    /// as `f64` (see DESIGN.md).
    LongDouble(f64),
    Bool(bool),
    String(String),
    VecChar(Vec<i8>),
    VecUChar(Vec<u8>),
    VecInt16(Vec<i16>),
    VecInt32(Vec<i32>),
    VecInt64(Vec<i64>),
    VecUInt16(Vec<u16>),
    VecUInt32(Vec<u32>),
    VecUInt64(Vec<u64>),
    VecFloat(Vec<f32>),
    VecDouble(Vec<f64>),
    VecLongDouble(Vec<f64>),
    VecString(Vec<String>),
    ArrDbl7([f64; 7]),
    Datatype(Datatype),
}

impl Attribute {
    /// The discriminator backends dispatch on.
    pub fn dtype(&self) -> Datatype {
        match self {
            Self::Char(_) => Datatype::Char,
            Self::UChar(_) => Datatype::UChar,
            Self::Int16(_) => Datatype::Int16,
            Self::Int32(_) => Datatype::Int32,
            Self::Int64(_) => Datatype::Int64,
            Self::UInt16(_) => Datatype::UInt16,
            Self::UInt32(_) => Datatype::UInt32,
            Self::UInt64(_) => Datatype::UInt64,
            Self::Float(_) => Datatype::Float,
            Self::Double(_) => Datatype::Double,
            Self::LongDouble(_) => Datatype::LongDouble,
            Self::Bool(_) => Datatype::Bool,
            Self::String(_) => Datatype::String,
            Self::VecChar(_) => Datatype::VecChar,
            Self::VecUChar(_) => Datatype::VecUChar,
            Self::VecInt16(_) => Datatype::VecInt16,
            Self::VecInt32(_) => Datatype::VecInt32,
            Self::VecInt64(_) => Datatype::VecInt64,
            Self::VecUInt16(_) => Datatype::VecUInt16,
            Self::VecUInt32(_) => Datatype::VecUInt32,
            Self::VecUInt64(_) => Datatype::VecUInt64,
            Self::VecFloat(_) => Datatype::VecFloat,
            Self::VecDouble(_) => Datatype::VecDouble,
            Self::VecLongDouble(_) => Datatype::VecLongDouble,
            Self::VecString(_) => Datatype::VecString,
            Self::ArrDbl7(_) => Datatype::ArrDbl7,
            Self::Datatype(_) => Datatype::Datatype,
        }
    }

    /// Returns the stored value when `T` matches the discriminator.
    pub fn get<T: FromAttribute>(&self) -> Result<T> {
        T::from_attribute(self)
    }

    /// Read a stored float of any of the three widths, widening or
    /// narrowing to `F` with a diagnostic when a cast actually occurs.
    pub fn read_floatingpoint<F: FromWidenedFloat>(&self) -> Result<F> {
        F::from_any_float(self)
    }

    /// Vector counterpart of [`Attribute::read_floatingpoint`].
    pub fn read_vector_floatingpoint<F: FromWidenedFloat>(&self) -> Result<Vec<F>> {
        F::from_any_float_vec(self)
    }
}

/// Implemented by every Rust type an [`Attribute`] can be constructed from
/// or decoded back into.
pub trait FromAttribute: Sized {
    fn from_attribute(attr: &Attribute) -> Result<Self>;
}

macro_rules! scalar_conversion {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Attribute {
            fn from(v: $ty) -> Self {
                Attribute::$variant(v)
            }
        }

        impl FromAttribute for $ty {
            fn from_attribute(attr: &Attribute) -> Result<Self> {
                match attr {
                    Attribute::$variant(v) => Ok(v.clone()),
                    other => Err(Error::TypeMismatch {
                        stored: other.dtype(),
                        requested: Datatype::$variant,
                    }),
                }
            }
        }
    };
}

scalar_conversion!(i8, Char);
scalar_conversion!(u8, UChar);
scalar_conversion!(i16, Int16);
scalar_conversion!(i32, Int32);
scalar_conversion!(i64, Int64);
scalar_conversion!(u16, UInt16);
scalar_conversion!(u32, UInt32);
scalar_conversion!(u64, UInt64);
scalar_conversion!(f32, Float);
scalar_conversion!(bool, Bool);
scalar_conversion!(String, String);
scalar_conversion!(Vec<i8>, VecChar);
scalar_conversion!(Vec<u8>, VecUChar);
scalar_conversion!(Vec<i16>, VecInt16);
scalar_conversion!(Vec<i32>, VecInt32);
scalar_conversion!(Vec<i64>, VecInt64);
scalar_conversion!(Vec<u16>, VecUInt16);
scalar_conversion!(Vec<u32>, VecUInt32);
scalar_conversion!(Vec<u64>, VecUInt64);
scalar_conversion!(Vec<String>, VecString);
scalar_conversion!(Datatype, Datatype);

// `f64`, `Vec<f32>`, `Vec<f64>` need hand rolled impls: the `Default`-based
// dtype probe in the macro doesn't work for `Double` vs `LongDouble`
// (both carry `f64`), and `FromAttribute` for the floats goes through the
// widening helper below instead of a strict match.

impl From<f64> for Attribute {
    fn from(v: f64) -> Self {
        Attribute::Double(v)
    }
}

impl FromAttribute for f64 {
    fn from_attribute(attr: &Attribute) -> Result<Self> {
        match attr {
            Attribute::Double(v) => Ok(*v),
            other => Err(Error::TypeMismatch {
                stored: other.dtype(),
                requested: Datatype::Double,
            }),
        }
    }
}

impl From<Vec<f32>> for Attribute {
    fn from(v: Vec<f32>) -> Self {
        Attribute::VecFloat(v)
    }
}

impl FromAttribute for Vec<f32> {
    fn from_attribute(attr: &Attribute) -> Result<Self> {
        match attr {
            Attribute::VecFloat(v) => Ok(v.clone()),
            other => Err(Error::TypeMismatch {
                stored: other.dtype(),
                requested: Datatype::VecFloat,
            }),
        }
    }
}

impl From<Vec<f64>> for Attribute {
    fn from(v: Vec<f64>) -> Self {
        Attribute::VecDouble(v)
    }
}

impl FromAttribute for Vec<f64> {
    fn from_attribute(attr: &Attribute) -> Result<Self> {
        match attr {
            Attribute::VecDouble(v) => Ok(v.clone()),
            other => Err(Error::TypeMismatch {
                stored: other.dtype(),
                requested: Datatype::VecDouble,
            }),
        }
    }
}

impl From<&str> for Attribute {
    fn from(v: &str) -> Self {
        Attribute::String(v.to_string())
    }
}

impl From<[f64; 7]> for Attribute {
    fn from(v: [f64; 7]) -> Self {
        Attribute::ArrDbl7(v)
    }
}

impl FromAttribute for [f64; 7] {
    fn from_attribute(attr: &Attribute) -> Result<Self> {
        match attr {
            Attribute::ArrDbl7(v) => Ok(*v),
            other => Err(Error::TypeMismatch {
                stored: other.dtype(),
                requested: Datatype::ArrDbl7,
            }),
        }
    }
}

/// Widening/narrowing float accessor backing `readFloatingpoint`.
pub trait FromWidenedFloat: Sized {
    fn from_any_float(attr: &Attribute) -> Result<Self>;
    fn from_any_float_vec(attr: &Attribute) -> Result<Vec<Self>>;
}

macro_rules! widened_float {
    ($ty:ty, $self_variant:ident, $self_vec_variant:ident) => {
        impl FromWidenedFloat for $ty {
            fn from_any_float(attr: &Attribute) -> Result<Self> {
                let (value, stored) = match attr {
                    Attribute::Float(v) => (*v as f64, Datatype::Float),
                    Attribute::Double(v) => (*v, Datatype::Double),
                    Attribute::LongDouble(v) => (*v, Datatype::LongDouble),
                    other => {
                        return Err(Error::TypeMismatch {
                            stored: other.dtype(),
                            requested: Datatype::$self_variant,
                        })
                    }
                };
                if stored != Datatype::$self_variant {
                    tracing::warn!(
                        "attribute stored as {}, read as {}: casting with possible loss of precision",
                        stored,
                        Datatype::$self_variant
                    );
                }
                Ok(value as $ty)
            }

            fn from_any_float_vec(attr: &Attribute) -> Result<Vec<Self>> {
                let (values, stored): (Vec<f64>, Datatype) = match attr {
                    Attribute::VecFloat(v) => (v.iter().map(|x| *x as f64).collect(), Datatype::VecFloat),
                    Attribute::VecDouble(v) => (v.clone(), Datatype::VecDouble),
                    Attribute::VecLongDouble(v) => (v.clone(), Datatype::VecLongDouble),
                    other => {
                        return Err(Error::TypeMismatch {
                            stored: other.dtype(),
                            requested: Datatype::$self_vec_variant,
                        })
                    }
                };
                if stored != Datatype::$self_vec_variant {
                    tracing::warn!(
                        "attribute stored as {}, read as {}: casting with possible loss of precision",
                        stored,
                        Datatype::$self_vec_variant
                    );
                }
                Ok(values.into_iter().map(|x| x as $ty).collect())
            }
        }
    };
}

widened_float!(f32, Float, VecFloat);
widened_float!(f64, Double, VecDouble);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_matching_type() {
        let attr = Attribute::from(vec![1.0_f64, 2.0, 3.0]);
        assert_eq!(attr.get::<Vec<f64>>().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn mismatched_type_is_an_error() {
        let attr = Attribute::from(42_i32);
        let err = attr.get::<String>().unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn dtype_reflects_discriminator() {
        assert_eq!(Attribute::from("hi").dtype(), Datatype::String);
        assert_eq!(Attribute::from(1_u64).dtype(), Datatype::UInt64);
        assert_eq!(Attribute::ArrDbl7([0.0; 7]).dtype(), Datatype::ArrDbl7);
    }

    #[test]
    fn widened_float_read_crosses_widths() {
        let attr = Attribute::Float(1.5);
        let widened: f64 = attr.read_floatingpoint().unwrap();
        assert_eq!(widened, 1.5);
    }
}
