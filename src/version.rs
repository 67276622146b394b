//! Содержит определение структуры для описания версии сервера и методы для ее преобразования в строку,
//! разбора из строки и извлечения из баннера, возвращаемого сервером.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use thiserror::Error;

/// Возможные ошибки разбора версии из строкового представления.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseVersionError {
  /// Указанная часть версии не является целым неотрицательным числом в диапазоне `[0; i32::MAX]`.
  #[error("version part {0} is not a number: {1}")]
  Part(u8, ParseIntError),
  /// Количество цифр версии, разделенных точкой, превышает 5 штук.
  #[error("version has more than 5 parts")]
  Count,
  /// В баннере не найдено ни одного фрагмента, похожего на номер версии.
  #[error("no version found in banner")]
  NotFound,
}
/// Описывает версию сервера. Версии упорядочены лексикографически по полям.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
  /// Старшая версия. Для релиза `12.2с` это 12.
  pub major: i32,
  /// Младшая версия. Для релиза `12.2с` это 2.
  pub minor: i32,
  /// The update number.
  pub update: i32,
  /// The patch number that was applied to the library.
  pub patch: i32,
  /// The port-specific patch applied to the library.
  pub port_update: i32,
}
impl Version {
  /// Формирует версию, в которой все поля, кроме [`major`](#structfield.major) равны `0`.
  #[inline]
  pub fn major(major: i32) -> Self { Self::minor(major, 0) }
  /// Формирует версию, в которой все поля, кроме [`major`](#structfield.major) и [`minor`](#structfield.minor) равны `0`.
  #[inline]
  pub fn minor(major: i32, minor: i32) -> Self {
    Version { major, minor, update: 0, patch: 0, port_update: 0 }
  }
  /// Извлекает версию из баннера сервера вида `Oracle Database 19c Enterprise Edition Release 19.3.0.0.0 - Production`.
  /// Версией считается первое слово, состоящее из чисел, разделенных точками.
  pub fn from_banner(banner: &str) -> Result<Self, ParseVersionError> {
    banner.split_whitespace()
      .filter(|word| word.contains('.') || word.chars().all(|c| c.is_ascii_digit()))
      .find_map(|word| word.parse().ok())
      .ok_or(ParseVersionError::NotFound)
  }
}
impl Default for Version {
  /// Создает версию, в которой все поля равны `0`.
  fn default() -> Self {
    Version::major(0)
  }
}
impl fmt::Display for Version {
  /// Распечатывает версию в виде пяти чисел, разделенных точками. Из данного представления оно потом может быть распарсено
  /// при помощи типажа `FromStr`.
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "{}.{}.{}.{}.{}", self.major, self.minor, self.update, self.patch, self.port_update)
  }
}
impl FromStr for Version {
  type Err = ParseVersionError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut v = [0; 5];
    for (i, part) in s.split('.').enumerate() {
      if i >= v.len() {
        return Err(ParseVersionError::Count);
      }
      v[i] = part.parse().map_err(|e| ParseVersionError::Part(i as u8, e))?;
    }
    Ok(Version { major: v[0], minor: v[1], update: v[2], patch: v[3], port_update: v[4] })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_and_print() {
    let v: Version = "12.2.0.1".parse().expect("Can't parse version");
    assert_eq!(v, Version { major: 12, minor: 2, update: 0, patch: 1, port_update: 0 });
    assert_eq!(v.to_string(), "12.2.0.1.0");
    assert_eq!("1.2.3.4.5.6".parse::<Version>(), Err(ParseVersionError::Count));
    assert!(match "1.x".parse::<Version>() { Err(ParseVersionError::Part(1, _)) => true, _ => false });
  }

  #[test]
  fn banner() {
    let banner = "Oracle Database 19c Enterprise Edition Release 19.3.0.0.0 - Production";
    assert_eq!(Version::from_banner(banner), "19.3".parse());
    assert_eq!(Version::from_banner("no digits here"), Err(ParseVersionError::NotFound));
  }

  #[test]
  fn ordering() {
    assert!(Version::major(8) < Version::minor(9, 2));
    assert!(Version::minor(9, 0) >= Version::major(9));
  }
}
