//! Ядро биндинга клиентской библиотеки Oracle для Rust
//! ---------------------------------------------------
//! [![Build Status](https://travis-ci.org/Mingun/rust-oci.svg?branch=master)](https://travis-ci.org/Mingun/rust-oci)
//!
//! Библиотека отвечает за три вещи: владение нативными хендлами (подсчет ссылок с каскадным
//! освобождением подчиненных хендлов), связывание переменных приложения с выражениями и обход
//! выборок с пользовательскими обработчиками. Все реальные операции выполняет нативная библиотека,
//! доступ к которой абстрагирован типажом [`Native`](ffi/trait.Native.html). В комплекте есть
//! реализация [`MemoryNative`](ffi/memory/struct.MemoryNative.html), работающая в памяти процесса.
//!
//! # Пример использования
//! ```rust
//! use std::sync::Arc;
//! use oci_core::Environment;
//! use oci_core::convert::{HostVar, Value};
//! use oci_core::ffi::memory::MemoryNative;
//! use oci_core::params::ConnectParams;
//! use oci_core::types::{CreateMode, Direction};
//!
//! let native = Arc::new(MemoryNative::new());
//! native.add_resultset("select name from users where id = :id", vec![
//!   vec![Value::from("scott")],
//! ]);
//!
//! // Инициализируем окружение
//! let env = Environment::new(native, CreateMode::Threaded).expect("Can't create environment");
//! // Соединяемся с сервером
//! let conn = env.connect(ConnectParams::rdbms("localhost/xe", "scott", "tiger")).expect("Can't connect");
//! println!("Server version: {}", conn.server_version().expect("Can't get server version"));
//!
//! // Готовим запрос, связываем переменную и выполняем
//! let mut stmt = conn.prepare("select name from users where id = :id").expect("Can't prepare statement");
//! let id = HostVar::new(42i32);
//! stmt.bind(":id", &id, Direction::In).expect("Can't bind variable");
//! let mut names = Vec::new();
//! let rows = stmt.execute_prepared_with(|row| {
//!   names.push(row.get::<String>(1)?);
//!   Ok(true)
//! }).expect("Can't execute query");
//! assert_eq!(rows, 1);
//! assert_eq!(names, vec!["scott".to_owned()]);
//! ```

#![warn(missing_docs)]

pub mod convert;
pub mod error;
pub mod ffi;
pub mod params;
pub mod stmt;
pub mod types;
pub mod version;

/// Тип результата, возвращаемый всеми функциями библиотеки, которые могут привести к ошибке.
/// Библиотека никогда не генерирует панику, всегда возвращая ошибочный результат. Немногочисленные
/// места, где ошибку вернуть невозможно (реализации типажа [`Drop`][1]), пишут ее в журнал.
///
/// [1]: https://doc.rust-lang.org/std/ops/trait.Drop.html
pub type Result<T> = std::result::Result<T, error::Error>;
/// Тип результата, возвращаемый функциями-обертками, непосредственно вызывающими примитивы
/// нативной библиотеки.
pub(crate) type DbResult<T> = std::result::Result<T, error::DbError>;

use std::fmt;
use std::sync::Arc;

use log::{debug, trace};

use convert::{FromValue, Value};
use error::Error;
use ffi::{CallbackRegistry, Env, HandleRef, Native, NativeHandle, ReleaseFn, SmartHandle, SyncMode};
use ffi::{check, require};
use params::{ConnectParams, Credentials, InitParams, Timeouts};
use stmt::Statement;
use types::{Attr, FailoverEvent, FailoverReply, HandleKind, ValueType};
use version::Version;

//-------------------------------------------------------------------------------------------------
/// Объект, владеющий нативным хендлом.
pub trait HandleHolder {
  /// Умный хендл объекта.
  fn handle(&self) -> &SmartHandle;
  /// Нативный хендл, или нулевой хендл, если объект уже освобожден.
  #[inline]
  fn native(&self) -> NativeHandle {
    self.handle().native()
  }
  /// Освобожден ли хендл объекта, например, каскадно вместе с родителем.
  #[inline]
  fn is_released(&self) -> bool {
    self.handle().is_null()
  }
}

/// Нативный хендл, если он еще не освобожден.
pub(crate) fn live(handle: &SmartHandle) -> Result<NativeHandle> {
  let h = handle.native();
  if h.is_null() {
    return Err(Error::NullHandle(handle.kind()));
  }
  Ok(h)
}

//-------------------------------------------------------------------------------------------------
/// Окружение представляет собой менеджер соединений к базе. Является корнем дерева хендлов:
/// при очистке окружения все открытые соединения, выражения и выборки автоматически освобождаются.
pub struct Environment {
  env: Env,
  root: SmartHandle,
}
impl Environment {
  /// Создает окружение -- менеджер подключений к базе данных. Если в параметрах указан режим
  /// [`Threaded`](types/enum.CreateMode.html#variant.Threaded), реестр обработчиков защищается
  /// блокировкой.
  pub fn new<P: Into<InitParams>>(native: Arc<dyn Native>, params: P) -> Result<Self> {
    let params = params.into();
    let env = Env::new(native, &params);
    let root = require(env.native(), env.native().create(HandleKind::Environment, NativeHandle::null()))?;
    let root = SmartHandle::allocated(&env, root, HandleKind::Environment, None)?;
    debug!("Environment {:?} initialized: {:?}, sync {:?}", root.native(), params.mode, env.guard().mode());

    Ok(Environment { env, root })
  }
  /// Освобождает все хендлы окружения, очищает реестр обработчиков и переводит его в однопоточный
  /// режим. Повторный вызов ничего не делает. Вызывается автоматически при уничтожении окружения.
  pub fn cleanup(&mut self) {
    if self.root.is_null() {
      return;
    }
    let native = self.root.native();
    self.root.release();
    self.env.callbacks().clear();
    self.env.guard().set_mode(SyncMode::Unsafe);
    debug!("Environment {:?} cleaned up", native);
  }
  /// Осуществляет подключение к базе данных с указанными параметрами.
  pub fn connect<P: Into<ConnectParams>>(&self, params: P) -> Result<Connection> {
    Connection::new(&self.env, &self.root, &params.into())
  }
  /// Создает нативный хендл указанного вида и оборачивает его. Если родитель не указан,
  /// хендл подчиняется корню окружения.
  pub fn allocate(&self, kind: HandleKind, parent: Option<&SmartHandle>) -> Result<SmartHandle> {
    let parent = parent.unwrap_or(&self.root);
    let native = self.env.native();
    let handle = require(native, native.create(kind, live(parent)?))?;
    SmartHandle::allocated(&self.env, handle, kind, Some(parent))
  }
  /// Реестр пользовательских обработчиков.
  #[inline]
  pub fn callbacks(&self) -> &CallbackRegistry {
    self.env.callbacks()
  }
  /// Текущий режим блокировок реестра обработчиков.
  #[inline]
  pub fn sync_mode(&self) -> SyncMode {
    self.env.guard().mode()
  }
  /// Контекст окружения.
  #[inline]
  pub fn env(&self) -> &Env {
    &self.env
  }
  /// Уведомляет обработчик, зарегистрированный для соединения, о переключении на резервный сервер.
  /// Вызывается нативной библиотекой, которая знает только хендл соединения. Если обработчика
  /// нет, возвращает [`FailoverReply::Ok`](types/enum.FailoverReply.html#variant.Ok).
  pub fn notify_failover(&self, conn: NativeHandle, event: FailoverEvent) -> FailoverReply {
    match self.env.callbacks().get::<FailoverHandler>(conn) {
      Some(handler) => (handler.0)(event),
      None => FailoverReply::default(),
    }
  }
}
impl HandleHolder for Environment {
  fn handle(&self) -> &SmartHandle { &self.root }
}
impl Drop for Environment {
  fn drop(&mut self) {
    self.cleanup();
  }
}
impl fmt::Debug for Environment {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    fmt.debug_struct("Environment")
       .field("root", &self.root)
       .field("env", &self.env)
       .finish()
  }
}

struct FailoverHandler(Box<dyn Fn(FailoverEvent) -> FailoverReply + Send + Sync>);

//-------------------------------------------------------------------------------------------------
/// Представляет соединение к базе данных, с определенным пользователем и паролем.
/// Соединение является подчиненным хендлом окружения. Копии соединения разделяют один и тот же
/// нативный хендл, который освобождается вместе с последней копией или вместе с окружением.
#[derive(Clone)]
pub struct Connection {
  env: Env,
  handle: SmartHandle,
}
impl Connection {
  fn new(env: &Env, root: &SmartHandle, params: &ConnectParams) -> Result<Self> {
    let native = env.native();
    let conn = require(native, native.create(HandleKind::Connection, live(root)?))?;
    // Обработчики соединения не должны пережить его хендл
    let on_release: ReleaseFn = Box::new(|h: &HandleRef| {
      if h.env().callbacks().remove(h.native()) {
        trace!("{:?}: callbacks unregistered", h.native());
      }
    });
    let handle = match SmartHandle::allocated_with_release(env, conn, HandleKind::Connection, Some(root), on_release) {
      Ok(handle) => handle,
      Err(e) => {
        native.destroy(HandleKind::Connection, conn);
        return Err(e);
      },
    };
    let conn = Connection { env: env.clone(), handle };

    conn.set_attr(Attr::DbLink, Value::from(params.dblink.as_str()))?;
    match params.credentials {
      Credentials::Rdbms { ref username, ref password } => {
        conn.set_attr(Attr::Username, Value::from(username.as_str()))?;
        conn.set_attr(Attr::Password, Value::from(password.as_str()))?;
      },
      Credentials::Ext => conn.set_attr(Attr::ExternalAuth, Value::Bool(true))?,
    }
    conn.set_timeouts(params.timeouts)?;
    debug!("{:?} connected to `{}`", conn.handle.native(), params.dblink);
    Ok(conn)
  }
  fn set_attr(&self, attr: Attr, value: Value) -> Result<()> {
    let h = live(&self.handle)?;
    let native = self.env.native();
    check(native, native.set_attr(h, attr, value)).map_err(|e| Error::from(e).with_handle(h))
  }

  /// Контекст окружения, в котором создано соединение.
  #[inline]
  pub fn env(&self) -> &Env {
    &self.env
  }
  /// Возвращает версию сервера Oracle-а, к которому подключен клиент.
  pub fn server_version(&self) -> Result<Version> {
    let h = live(&self.handle)?;
    let native = self.env.native();
    let banner = require(native, native.get_attr(h, Attr::ServerVersion)).map_err(|e| Error::from(e).with_handle(h))?;
    let banner = String::from_value(&banner)?;
    Version::from_banner(&banner).map_err(|_| Error::Conversion(ValueType::String))
  }
  /// Передает нативной библиотеке сетевые таймауты, в миллисекундах. Отсутствующие значения
  /// не изменяются.
  pub fn set_timeouts(&self, timeouts: Timeouts) -> Result<()> {
    let values = [
      (Attr::CallTimeout, timeouts.call),
      (Attr::SendTimeout, timeouts.send),
      (Attr::ReceiveTimeout, timeouts.receive),
    ];
    for &(attr, value) in &values {
      if let Some(d) = value {
        self.set_attr(attr, Value::UInt64(d.as_secs() * 1000 + u64::from(d.subsec_millis())))?;
      }
    }
    Ok(())
  }
  /// Прерывает блокирующий вызов, выполняющийся в этом соединении в другом потоке.
  pub fn break_call(&self) -> Result<()> {
    let h = live(&self.handle)?;
    let native = self.env.native();
    check(native, native.break_call(h)).map_err(|e| Error::from(e).with_handle(h))
  }
  /// Создает новое выражение без текста.
  pub fn statement(&self) -> Result<Statement> {
    Statement::new(self)
  }
  /// Создает выражение и подготавливает его к выполнению.
  pub fn prepare(&self, sql: &str) -> Result<Statement> {
    let mut stmt = Statement::new(self)?;
    stmt.prepare(sql)?;
    Ok(stmt)
  }
  /// Регистрирует обработчик переключения соединения на резервный сервер, заменяя предыдущий.
  /// `None` удаляет обработчик. Обработчик удаляется автоматически при освобождении соединения.
  pub fn set_failover_handler<F>(&self, handler: Option<F>) -> Result<()>
    where F: Fn(FailoverEvent) -> FailoverReply + Send + Sync + 'static
  {
    let h = live(&self.handle)?;
    self.env.callbacks().set(h, handler.map(|f| FailoverHandler(Box::new(f))));
    Ok(())
  }
}
impl HandleHolder for Connection {
  fn handle(&self) -> &SmartHandle { &self.handle }
}
impl fmt::Debug for Connection {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    fmt.debug_struct("Connection").field("handle", &self.handle).finish()
  }
}
