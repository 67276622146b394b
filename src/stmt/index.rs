//! Содержит структуры, предназначенные для унифицированного представления индексаторов.
use std::fmt;

use crate::Result;
use crate::error::Error;

/// Обобщенный индекс связываемых параметров. Позволяет связывать параметры как по позиции,
/// так и по имени, используя один и тот же вызов [`bind`][1], перегруженный по принимаемым аргументам.
///
/// [1]: ../struct.Statement.html#method.bind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindIndex<'a> {
  /// Связывание осуществляется по имени переменной.
  Name(&'a str),
  /// Связывание осуществляется по позиции переменной (нумерация с 1).
  Index(usize)
}
impl<'a> BindIndex<'a> {
  /// Имя переменной, под которым она связывается с выражением. Позиция `n` превращается в имя `:n`.
  pub fn to_name(&self) -> Result<String> {
    match *self {
      BindIndex::Name(name) => Ok(name.to_owned()),
      BindIndex::Index(0) => Err(Error::OutOfBounds { what: "bind position", value: 0, min: 1, max: usize::max_value() }),
      BindIndex::Index(pos) => Ok(format!(":{}", pos)),
    }
  }
}
impl<'a> fmt::Display for BindIndex<'a> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match *self {
      BindIndex::Name(name) => write!(f, "{}", name),
      BindIndex::Index(pos) => write!(f, ":{}", pos),
    }
  }
}

impl<'a> From<usize> for BindIndex<'a> {
  fn from(t: usize) -> Self {
    BindIndex::Index(t)
  }
}
impl<'a> From<&'a str> for BindIndex<'a> {
  fn from(t: &'a str) -> Self {
    BindIndex::Name(t)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn position_becomes_placeholder() {
    assert_eq!(BindIndex::from(2).to_name().expect("Can't convert index"), ":2");
    assert_eq!(BindIndex::from(":id").to_name().expect("Can't convert name"), ":id");
    assert!(BindIndex::Index(0).to_name().is_err());
  }
}
