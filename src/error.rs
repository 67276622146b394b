//! Виды ошибок, которые могут генерироваться библиотекой.

use std::error;
use std::fmt;

use thiserror::Error;

use crate::ffi::NativeHandle;
use crate::types::{HandleKind, ValueType};
use crate::version::Version;

/// Информация об одной ошибке/предупреждении Oracle
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Info {
  /// Код ошибки оракла, `ORA-xxxxx`.
  pub code: isize,
  /// Сообщение оракла об ошибке в том виде, в каком его вернула нативная библиотека.
  pub message: String,
}
impl Info {
  /// Создает описание ошибки с указанным кодом и сообщением.
  pub fn new<S: Into<String>>(code: isize, message: S) -> Self {
    Info { code, message: message.into() }
  }
}
impl fmt::Display for Info {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "ORA-{:05}: {}", self.code, self.message)
  }
}

fn join(infos: &[Info]) -> String {
  infos.iter().map(Info::to_string).collect::<Vec<_>>().join("; ")
}

/// Ошибки, возникающие при вызове примитивов нативной библиотеки.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DbError {
  /// Ошибка вызова одного из примитивов. Содержит коды и сообщения об ошибках в том порядке,
  /// в котором их вернула нативная библиотека.
  #[error("{}", join(.0))]
  Fault(Vec<Info>),
  /// Хендл, переданный в функцию, оказался некорректным.
  #[error("invalid handle passed to native call")]
  InvalidHandle,
  /// Асинхронная операция начата, но еще не завершена.
  #[error("asynchronous call not yet completed, still executing")]
  StillExecuting,
  /// Вызов функции получения данных не вернул никаких данных.
  #[error("no data")]
  NoData,
  /// Примитив сообщил о неудаче, но не оставил информации об ошибке.
  #[error("native call failed with unknown return code {0}")]
  Unknown(isize),
}
impl DbError {
  /// Создает ошибку с единственным кодом и сообщением.
  pub fn fault<S: Into<String>>(code: isize, message: S) -> Self {
    DbError::Fault(vec![Info::new(code, message)])
  }
  /// Код первой ошибки, если он есть.
  pub fn code(&self) -> Option<isize> {
    match *self {
      DbError::Fault(ref infos) => infos.first().map(|i| i.code),
      _ => None,
    }
  }
}

/// Локальный контекст, в котором произошла ошибка нативного вызова.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
  /// Текст выражения, выполнявшегося в момент ошибки.
  pub sql: Option<String>,
  /// Имя связанной переменной, при обработке которой возникла ошибка.
  pub bind: Option<String>,
  /// Номер строки выборки (нумерация с 1).
  pub row: Option<usize>,
  /// Адрес нативного хендла, над которым выполнялась операция.
  pub handle: Option<usize>,
}
impl Context {
  /// Возвращает `true`, если контекст не содержит никакой информации.
  pub fn is_empty(&self) -> bool {
    self.sql.is_none() && self.bind.is_none() && self.row.is_none() && self.handle.is_none()
  }
}
impl fmt::Display for Context {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    if self.is_empty() {
      return Ok(());
    }
    let mut parts = Vec::new();
    if let Some(ref sql) = self.sql {
      parts.push(format!("sql: `{}`", sql));
    }
    if let Some(ref bind) = self.bind {
      parts.push(format!("bind: `{}`", bind));
    }
    if let Some(row) = self.row {
      parts.push(format!("row: {}", row));
    }
    if let Some(handle) = self.handle {
      parts.push(format!("handle: {:#x}", handle));
    }
    write!(f, " ({})", parts.join(", "))
  }
}

/// Категория ошибки, независимая от деталей ее представления.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// Неудачный вызов примитива нативной библиотеки.
  ExternalOperation,
  /// Обязательный хендл отсутствует.
  NullHandle,
  /// Операция несовместима с текущим состоянием объекта.
  InvalidState,
  /// Возможность не поддерживается версией сервера.
  CapabilityUnavailable,
  /// Индекс или размер вне допустимого диапазона.
  Bounds,
  /// Значение невозможно преобразовать.
  Conversion,
  /// Ошибка, возвращенная пользовательским обработчиком.
  Callback,
}

/// Ошибка, которую может вернуть библиотека. Включает ошибки взаимодействия с базой данных,
/// ошибки конвертации значений и нарушения протокола работы с объектами.
#[derive(Debug, Error)]
pub enum Error {
  /// Ошибка вызова одного из примитивов нативной библиотеки.
  #[error("{source}{context}")]
  Db {
    /// Ошибка в том виде, в каком ее вернула нативная библиотека.
    #[source]
    source: DbError,
    /// Локальный контекст операции.
    context: Context,
  },
  /// Хендл, обязательный для выполнения операции, отсутствует или уже освобожден.
  #[error("required {0:?} handle is null or already released")]
  NullHandle(HandleKind),
  /// Операция вызвана в неподходящем состоянии объекта.
  #[error("operation `{operation}` is not allowed: {state}")]
  InvalidState {
    /// Вызванная операция.
    operation: &'static str,
    /// Описание текущего состояния.
    state: String,
  },
  /// Переменная с таким именем уже связана, а повторное связывание запрещено.
  #[error("bind variable `{0}` is already used")]
  BindAlreadyUsed(String),
  /// Повторное связывание переменной значением другого типа.
  #[error("bind variable `{name}` is bound as {bound:?} and can't be rebound as {requested:?}")]
  RebindBadType {
    /// Имя переменной.
    name: String,
    /// Тип текущего связывания.
    bound: ValueType,
    /// Запрошенный тип.
    requested: ValueType,
  },
  /// Возможность не поддерживается текущей версией сервера.
  #[error("{feature} is not supported by server version {version}")]
  Unsupported {
    /// Запрошенная возможность.
    feature: &'static str,
    /// Версия сервера, с которым установлено соединение.
    version: Version,
  },
  /// Индекс или размер вне допустимого диапазона.
  #[error("{what} = {value} is out of range [{min}; {max}]")]
  OutOfBounds {
    /// Что именно вышло за границы.
    what: &'static str,
    /// Переданное значение.
    value: usize,
    /// Минимальное допустимое значение.
    min: usize,
    /// Максимальное допустимое значение.
    max: usize,
  },
  /// Ошибка преобразования значения Rust в значение базы данных или наоборот
  #[error("can't convert value from/to {0:?}")]
  Conversion(ValueType),
  /// Ошибка, которую вернул пользовательский обработчик строки или адаптер.
  #[error("row callback failed: {0}")]
  Callback(#[source] Box<dyn error::Error + Send + Sync>),
}
impl Error {
  /// Оборачивает произвольную пользовательскую ошибку.
  pub fn callback<E: Into<Box<dyn error::Error + Send + Sync>>>(err: E) -> Self {
    Error::Callback(err.into())
  }
  /// Категория ошибки.
  pub fn kind(&self) -> ErrorKind {
    match *self {
      Error::Db { .. } => ErrorKind::ExternalOperation,
      Error::NullHandle(_) => ErrorKind::NullHandle,
      Error::InvalidState { .. } |
      Error::BindAlreadyUsed(_) |
      Error::RebindBadType { .. } => ErrorKind::InvalidState,
      Error::Unsupported { .. } => ErrorKind::CapabilityUnavailable,
      Error::OutOfBounds { .. } => ErrorKind::Bounds,
      Error::Conversion(_) => ErrorKind::Conversion,
      Error::Callback(_) => ErrorKind::Callback,
    }
  }
  /// Ошибка нативной библиотеки, если это ошибка нативного вызова.
  pub fn db_error(&self) -> Option<&DbError> {
    match *self {
      Error::Db { ref source, .. } => Some(source),
      _ => None,
    }
  }
  /// Контекст ошибки нативного вызова.
  pub fn context(&self) -> Option<&Context> {
    match *self {
      Error::Db { ref context, .. } => Some(context),
      _ => None,
    }
  }
  fn map_context<F: FnOnce(&mut Context)>(mut self, f: F) -> Self {
    if let Error::Db { ref mut context, .. } = self {
      f(context);
    }
    self
  }
  /// Дополняет ошибку текстом выражения, если он еще не указан.
  pub fn with_sql<S: AsRef<str>>(self, sql: Option<S>) -> Self {
    self.map_context(|c| if c.sql.is_none() { c.sql = sql.map(|s| s.as_ref().to_owned()); })
  }
  /// Дополняет ошибку именем связанной переменной, если оно еще не указано.
  pub fn with_bind(self, name: &str) -> Self {
    self.map_context(|c| if c.bind.is_none() { c.bind = Some(name.to_owned()); })
  }
  /// Дополняет ошибку номером строки выборки.
  pub fn with_row(self, row: usize) -> Self {
    self.map_context(|c| if c.row.is_none() { c.row = Some(row); })
  }
  /// Дополняет ошибку адресом хендла, над которым выполнялась операция.
  pub fn with_handle(self, handle: NativeHandle) -> Self {
    self.map_context(|c| if c.handle.is_none() { c.handle = Some(handle.addr()); })
  }
  pub(crate) fn invalid_state<S: Into<String>>(operation: &'static str, state: S) -> Self {
    Error::InvalidState { operation, state: state.into() }
  }
}
impl From<DbError> for Error {
  fn from(err: DbError) -> Self {
    Error::Db { source: err, context: Context::default() }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn context_is_appended_to_message() {
    let err = Error::from(DbError::fault(942, "table or view does not exist"))
      .with_sql(Some("select * from missing"))
      .with_bind(":id")
      .with_row(3);
    assert_eq!(
      err.to_string(),
      "ORA-00942: table or view does not exist (sql: `select * from missing`, bind: `:id`, row: 3)"
    );
    assert_eq!(err.kind(), ErrorKind::ExternalOperation);
    assert_eq!(err.db_error().and_then(DbError::code), Some(942));
  }

  #[test]
  fn context_keeps_first_value() {
    let err = Error::from(DbError::InvalidHandle).with_bind(":a").with_bind(":b");
    assert_eq!(err.context().and_then(|c| c.bind.clone()), Some(":a".to_owned()));
  }

  #[test]
  fn context_is_ignored_for_local_errors() {
    let err = Error::NullHandle(HandleKind::Statement).with_sql(Some("select 1 from dual"));
    assert!(err.context().is_none());
    assert_eq!(err.kind(), ErrorKind::NullHandle);
  }

  #[test]
  fn multiple_infos_are_preserved_verbatim() {
    let err = DbError::Fault(vec![Info::new(1, "first"), Info::new(2, "second")]);
    assert_eq!(err.to_string(), "ORA-00001: first; ORA-00002: second");
  }
}
