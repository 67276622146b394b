//! Выборки, полученные при выполнении выражений, и обход их строк с пользовательскими обработчиками.

use std::fmt;

use log::trace;

use crate::{HandleHolder, Result};
use crate::live;
use crate::convert::FromValue;
use crate::error::Error;
use crate::ffi::{Env, FetchOp, SmartHandle};
use crate::ffi::require;
use crate::types::SeekMode;

/// Результат, возвращаемый обработчиком строки: продолжать ли обход.
///
/// Реализован для `bool` (`false` прекращает обход), для `()` (обход всегда продолжается) и для
/// [`Result<bool>`](../type.Result.html) (ошибка прерывает обход и возвращается вызывающему коду без изменений).
pub trait Flow {
  /// Превращает значение в признак продолжения обхода.
  fn proceed(self) -> Result<bool>;
}
impl Flow for bool {
  #[inline]
  fn proceed(self) -> Result<bool> { Ok(self) }
}
impl Flow for () {
  #[inline]
  fn proceed(self) -> Result<bool> { Ok(true) }
}
impl Flow for Result<bool> {
  #[inline]
  fn proceed(self) -> Result<bool> { self }
}

/// Выборка, полученная при выполнении выражения. Нативным ресурсом выборки владеет выражение:
/// при повторном выполнении или подготовке выражения, а также при его освобождении, выборка
/// становится недействительной, и все операции с ней возвращают ошибку [`NullHandle`][1].
///
/// [1]: ../../error/enum.Error.html#variant.NullHandle
pub struct Resultset {
  env: Env,
  handle: SmartHandle,
  sql: Option<String>,
  scrollable: bool,
}
impl Resultset {
  pub(crate) fn new(env: Env, handle: SmartHandle, sql: Option<String>, scrollable: bool) -> Self {
    Resultset { env, handle, sql, scrollable }
  }
  fn context(&self, err: Error, row: Option<usize>) -> Error {
    let err = err.with_sql(self.sql.as_ref()).with_handle(self.handle.native());
    match row {
      Some(row) => err.with_row(row),
      None => err,
    }
  }
  fn fetch(&mut self, op: FetchOp) -> Result<bool> {
    let rs = live(&self.handle)?;
    let native = self.env.native();
    if native.fetch(rs, op) {
      return Ok(true);
    }
    match native.take_error() {
      None => Ok(false),
      Some(err) => {
        let row = native.current_row(rs);
        Err(self.context(err.into(), row))
      },
    }
  }
  fn scrolling(&self, operation: &'static str) -> Result<()> {
    if self.scrollable {
      Ok(())
    } else {
      Err(Error::invalid_state(operation, "resultset is forward-only"))
    }
  }

  /// Может ли курсор выборки перемещаться в произвольном направлении.
  #[inline]
  pub fn is_scrollable(&self) -> bool {
    self.scrollable
  }
  /// Переходит к следующей строке. Возвращает `false`, если строк больше нет.
  pub fn next(&mut self) -> Result<bool> {
    self.fetch(FetchOp::Next)
  }
  /// Переходит к предыдущей строке. Только для прокручиваемых выборок.
  pub fn prev(&mut self) -> Result<bool> {
    self.scrolling("prev")?;
    self.fetch(FetchOp::Prev)
  }
  /// Переходит к первой строке. Только для прокручиваемых выборок.
  pub fn first(&mut self) -> Result<bool> {
    self.scrolling("first")?;
    self.fetch(FetchOp::First)
  }
  /// Переходит к последней строке. Только для прокручиваемых выборок.
  pub fn last(&mut self) -> Result<bool> {
    self.scrolling("last")?;
    self.fetch(FetchOp::Last)
  }
  /// Перемещает курсор на указанную позицию. Только для прокручиваемых выборок.
  pub fn seek(&mut self, mode: SeekMode, offset: i32) -> Result<bool> {
    self.scrolling("seek")?;
    self.fetch(match mode {
      SeekMode::Absolute => FetchOp::Absolute(offset),
      SeekMode::Relative => FetchOp::Relative(offset),
    })
  }
  /// Номер текущей строки (нумерация с 1, `0` -- строка еще не получена).
  pub fn current_row(&self) -> Result<usize> {
    let rs = live(&self.handle)?;
    require(self.env.native(), self.env.native().current_row(rs)).map_err(|e| self.context(e.into(), None))
  }
  /// Количество колонок в выборке.
  pub fn column_count(&self) -> Result<usize> {
    let rs = live(&self.handle)?;
    require(self.env.native(), self.env.native().column_count(rs)).map_err(|e| self.context(e.into(), None))
  }
  /// Получает значение колонки текущей строки (нумерация с 1) и преобразует его в тип Rust.
  pub fn get<T: FromValue>(&self, index: usize) -> Result<T> {
    let count = self.column_count()?;
    if index < 1 || index > count {
      return Err(Error::OutOfBounds { what: "column index", value: index, min: 1, max: count });
    }
    let rs = live(&self.handle)?;
    let native = self.env.native();
    let value = require(native, native.column_value(rs, index))
      .map_err(|e| self.context(e.into(), native.current_row(rs)))?;
    T::from_value(&value)
  }

  /// Обходит оставшиеся строки выборки, вызывая для каждой обработчик, пока строки не закончатся
  /// или обработчик не попросит остановиться. Возвращает количество строк, которые обработчик принял.
  ///
  /// # Пример
  /// ```
  /// # use std::sync::Arc;
  /// # use oci_core::Environment;
  /// # use oci_core::convert::Value;
  /// # use oci_core::ffi::memory::MemoryNative;
  /// # use oci_core::params::ConnectParams;
  /// # use oci_core::types::CreateMode;
  /// let native = Arc::new(MemoryNative::new());
  /// native.add_resultset("select n from t", vec![vec![Value::Int32(1)], vec![Value::Int32(2)]]);
  /// let env = Environment::new(native, CreateMode::default()).unwrap();
  /// let conn = env.connect(ConnectParams::rdbms("db", "scott", "tiger")).unwrap();
  /// let mut stmt = conn.statement().unwrap();
  /// stmt.execute("select n from t").unwrap();
  ///
  /// let mut sum = 0;
  /// let mut rs = stmt.resultset().unwrap().unwrap();
  /// let rows = rs.for_each(|row| { sum += row.get::<i32>(1)?; Ok(true) }).unwrap();
  /// assert_eq!((rows, sum), (2, 3));
  /// ```
  pub fn for_each<F, R>(&mut self, mut cb: F) -> Result<usize>
    where F: FnMut(&Resultset) -> R,
          R: Flow,
  {
    let mut count = 0;
    while self.next()? {
      if !cb(&*self).proceed()? {
        break;
      }
      count += 1;
    }
    trace!("{} rows accepted", count);
    Ok(count)
  }
  /// То же, что и [`for_each`](#method.for_each), но каждая строка сначала преобразуется адаптером,
  /// и обработчик получает уже результат преобразования.
  pub fn for_each_adapted<T, A, F, R>(&mut self, mut cb: F, mut adapter: A) -> Result<usize>
    where A: FnMut(&Resultset) -> Result<T>,
          F: FnMut(T) -> R,
          R: Flow,
  {
    self.for_each(|row| -> Result<bool> {
      let value = adapter(row)?;
      cb(value).proceed()
    })
  }
}
impl HandleHolder for Resultset {
  fn handle(&self) -> &SmartHandle { &self.handle }
}
impl fmt::Debug for Resultset {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    fmt.debug_struct("Resultset")
       .field("handle", &self.handle)
       .field("scrollable", &self.scrollable)
       .finish()
  }
}
