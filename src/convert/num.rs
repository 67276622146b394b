//! Преобразование числовых значений с контролем диапазона.

use num_traits::{NumCast, ToPrimitive};

use crate::Result;
use crate::error::Error;
use crate::types::ValueType;

use super::{FromValue, Value};

/// Приводит числовое значение к целевому типу, если оно представимо в нем без переполнения.
fn cast<T: NumCast, S: ToPrimitive>(value: S, ty: ValueType) -> Result<T> {
  T::from(value).ok_or(Error::Conversion(ty))
}

fn numeric<T: NumCast>(value: &Value, ty: ValueType) -> Result<T> {
  match *value {
    Value::Bool(v)   => cast(v as u8, ty),
    Value::Int8(v)   => cast(v, ty),
    Value::Int16(v)  => cast(v, ty),
    Value::Int32(v)  => cast(v, ty),
    Value::Int64(v)  => cast(v, ty),
    Value::UInt8(v)  => cast(v, ty),
    Value::UInt16(v) => cast(v, ty),
    Value::UInt32(v) => cast(v, ty),
    Value::UInt64(v) => cast(v, ty),
    Value::Float(v)  => cast(v, ty),
    Value::Double(v) => cast(v, ty),
    Value::String(ref s) => {
      let s = s.trim();
      // Целые числа не проходят через f64, чтобы не потерять точность после 2^53
      if let Ok(v) = s.parse::<i128>() {
        return cast(v, ty);
      }
      let v: f64 = s.parse().map_err(|_| Error::Conversion(ty))?;
      cast(v, ty)
    },
    _ => Err(Error::Conversion(ty)),
  }
}

macro_rules! number {
  ($($ty:ty => $vt:ident),+) => {$(
    impl FromValue for $ty {
      fn from_value(value: &Value) -> Result<Self> {
        numeric(value, ValueType::$vt)
      }
    }
    impl From<$ty> for Value {
      fn from(v: $ty) -> Self { Value::$vt(v) }
    }
  )+};
}
number!(
  i8 => Int8, i16 => Int16, i32 => Int32, i64 => Int64,
  u8 => UInt8, u16 => UInt16, u32 => UInt32, u64 => UInt64,
  f32 => Float, f64 => Double
);

impl FromValue for usize {
  fn from_value(value: &Value) -> Result<Self> {
    numeric(value, ValueType::UInt64)
  }
}
impl From<usize> for Value {
  fn from(v: usize) -> Self { Value::UInt64(v as u64) }
}

impl FromValue for bool {
  fn from_value(value: &Value) -> Result<Self> {
    match *value {
      Value::Bool(v) => Ok(v),
      ref v => numeric::<f64>(v, ValueType::Bool).map(|n| n != 0.0),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn widening_and_narrowing() {
    assert_eq!(i64::from_value(&Value::Int8(-5)).expect("Can't widen"), -5);
    assert_eq!(u8::from_value(&Value::Int64(200)).expect("Can't narrow"), 200);
    assert!(u8::from_value(&Value::Int64(256)).is_err());
    assert!(u32::from_value(&Value::Int32(-1)).is_err());
  }

  #[test]
  fn text_and_bool_sources() {
    assert_eq!(i32::from_value(&Value::String(" 42 ".into())).expect("Can't parse"), 42);
    assert_eq!(u8::from_value(&Value::Bool(true)).expect("Can't convert bool"), 1);
    assert_eq!(bool::from_value(&Value::Int32(3)).expect("Can't convert int"), true);
    assert!(i32::from_value(&Value::Raw(vec![1])).is_err());
  }

  #[test]
  fn large_integers_from_text_keep_precision() {
    let max = Value::String(u64::max_value().to_string());
    assert_eq!(u64::from_value(&max).expect("Can't parse u64"), u64::max_value());
    let odd = Value::String("9007199254740993".into());
    assert_eq!(i64::from_value(&odd).expect("Can't parse i64"), 9_007_199_254_740_993);
    assert!(i64::from_value(&max).is_err());
    assert_eq!(i32::from_value(&Value::String("1.5e1".into())).expect("Can't parse float"), 15);
  }
}
