//! Содержит структуры, описывающие параметры инициализации окружения и подключения к базе данных
use std::time::Duration;

use crate::types::CreateMode;

/// Максимальное количество связанных переменных в одном выражении по умолчанию.
pub const MAX_BINDS: usize = 65535;

/// Параметры инициализации менеджера подключений к базе данных.
#[derive(Clone, Debug)]
pub struct InitParams {
  /// Возможности, которые будут доступны при работе с базой данных. В режиме
  /// [`Threaded`](../types/enum.CreateMode.html#variant.Threaded) реестр пользовательских
  /// обработчиков защищается блокировкой.
  pub mode: CreateMode,
  /// Максимальное количество связанных переменных в одном выражении.
  pub max_binds: usize,
}
impl Default for InitParams {
  fn default() -> Self {
    InitParams { mode: Default::default(), max_binds: MAX_BINDS }
  }
}
impl From<CreateMode> for InitParams {
  /// Преобразует режим инициализации менеджера подключений в параметры менеджера подключений, в качестве
  /// режима используя собственное значение и оставляя остальные параметры по умолчанию.
  fn from(mode: CreateMode) -> InitParams {
    InitParams { mode, ..Default::default() }
  }
}
/// Содержит учетные данные пользователя, которые должны использоваться для аутентификации в базе.
#[derive(Clone, Debug)]
pub enum Credentials {
  /// База будет проводить аутентификацию по паре пользователь/пароль.
  Rdbms {
    /// Имя пользователя, под которым установить соединение к базе данных
    username: String,
    /// Пароль пользователя, под которым установить соединение к базе данных
    password: String,
  },
  /// База будет проводить аутентификацию, используя внешние учетные данные.
  Ext,
}
/// Сетевые таймауты соединения. Значения передаются нативной библиотеке как есть, `None` означает
/// отсутствие ограничения.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timeouts {
  /// Ограничение времени одного обращения к серверу.
  pub call: Option<Duration>,
  /// Ограничение времени отправки данных по сети.
  pub send: Option<Duration>,
  /// Ограничение времени получения данных по сети.
  pub receive: Option<Duration>,
}
/// Параметры подключения к базе данных
#[derive(Clone, Debug)]
pub struct ConnectParams {
  /// Адрес базы и указатель сервиса, к которому следует подключиться.
  /// В случае внешней аутентификации не требуется, т.к. база всегда запущена на той же машине
  pub dblink: String,
  /// Учетные данные, используемые для логина в базу
  pub credentials: Credentials,
  /// Сетевые таймауты соединения.
  pub timeouts: Timeouts,
}
impl ConnectParams {
  /// Параметры подключения по паре пользователь/пароль без таймаутов.
  pub fn rdbms<L, U, P>(dblink: L, username: U, password: P) -> Self
    where L: Into<String>, U: Into<String>, P: Into<String>
  {
    ConnectParams {
      dblink: dblink.into(),
      credentials: Credentials::Rdbms { username: username.into(), password: password.into() },
      timeouts: Timeouts::default(),
    }
  }
}
