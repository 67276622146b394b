//! Связывание даты и времени `chrono`. Нативное представление -- количество микросекунд от начала эпохи.

#![allow(deprecated)]

use chrono::NaiveDateTime;

use crate::Result;
use crate::error::Error;
use crate::types::ValueType;

use super::{Adapt, FromValue, Value};

const MICROS: i64 = 1_000_000;

fn from_micros(micros: i64) -> Result<NaiveDateTime> {
  let secs = micros.div_euclid(MICROS);
  let nanos = (micros.rem_euclid(MICROS) * 1000) as u32;
  NaiveDateTime::from_timestamp_opt(secs, nanos).ok_or(Error::Conversion(ValueType::DateTime))
}

impl Adapt for NaiveDateTime {
  const TYPE: ValueType = ValueType::DateTime;
  type Native = i64;

  fn to_native(&self) -> i64 {
    self.timestamp() * MICROS + self.timestamp_subsec_micros() as i64
  }
  fn from_native(native: i64) -> Result<Self> {
    from_micros(native)
  }
}
impl FromValue for NaiveDateTime {
  fn from_value(value: &Value) -> Result<Self> {
    match *value {
      Value::DateTime(micros) => from_micros(micros),
      Value::String(ref s) => s.parse().map_err(|_| Error::Conversion(ValueType::DateTime)),
      _ => Err(Error::Conversion(ValueType::DateTime)),
    }
  }
}
impl From<NaiveDateTime> for Value {
  fn from(v: NaiveDateTime) -> Self { Value::DateTime(v.to_native()) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn before_epoch() {
    let dt = from_micros(-1).expect("Can't build date");
    assert_eq!(dt.to_native(), -1);
    assert_eq!(dt.to_string(), "1969-12-31 23:59:59.999999");
  }
}
