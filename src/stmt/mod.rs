//! Содержит определение подготовленных выражений, которые используются для эффективного исполнения запросов,
//! и структур, связанных с ними.
pub mod bind;
pub mod index;
pub mod query;
mod holder;

use std::fmt;

use log::{debug, trace};
use parking_lot::MappedMutexGuard;

use crate::{Connection, HandleHolder, Result};
use crate::live;
use crate::convert::{Element, FromValue, HostVar, Value, VarLen};
use crate::error::Error;
use crate::ffi::{Env, HandleRef, NativeHandle, ReleaseFn, SmartHandle};
use crate::ffi::{check, optional, require};
use crate::types::{Attr, Direction, FetchMode, HandleKind, PrepareMode, ValueType, VectorKind};
use crate::version::Version;

use self::bind::{BindArray, BindCtx, BindObject, BindObjectAdaptor, Bindable};
use self::holder::StatementData;
use self::index::BindIndex;
use self::query::{Flow, Resultset};

pub use self::holder::{BindsHolder, Status};

/// Подготовленное выражение.
///
/// Выражение является подчиненным хендлом соединения и удерживает его, пока живо само. Все
/// объекты связывания, состояние и настройки выражения хранятся вместе с его хендлом и
/// освобождаются при освобождении хендла, в том числе при каскадном освобождении окружения.
///
/// Выражение не синхронизировано: одновременное использование одного выражения (или других
/// хендлов того же соединения) из нескольких потоков не поддерживается.
pub struct Statement {
  env: Env,
  conn: Connection,
  handle: SmartHandle,
}
impl Statement {
  pub(crate) fn new(conn: &Connection) -> Result<Self> {
    let env = conn.env().clone();
    let parent = conn.handle();
    if parent.is_null() {
      return Err(Error::NullHandle(HandleKind::Connection));
    }
    let native = env.native();
    let stmt = require(native, native.create(HandleKind::Statement, parent.native()))?;
    let on_release: ReleaseFn = Box::new(|h: &HandleRef| {
      if let Some(data) = h.take_extra_infos::<StatementData>() {
        trace!("{:?}: {} binds freed", h.native(), data.binds.len());
      }
    });
    let handle = match SmartHandle::allocated_with_release(&env, stmt, HandleKind::Statement, Some(parent), on_release) {
      Ok(handle) => handle,
      Err(e) => {
        native.destroy(HandleKind::Statement, stmt);
        return Err(e);
      },
    };
    handle.set_extra_infos(Box::new(StatementData::default()))?;
    debug!("{:?} allocated in connection {:?}", stmt, parent.native());

    Ok(Statement { env, conn: conn.clone(), handle })
  }
  fn data(&self) -> Result<MappedMutexGuard<StatementData>> {
    self.handle.extra_infos::<StatementData>().ok_or(Error::NullHandle(HandleKind::Statement))
  }
  fn require_status(data: &StatementData, min: Status, operation: &'static str) -> Result<()> {
    if data.status < min {
      return Err(Error::invalid_state(operation, format!("statement is {:?}, {:?} required", data.status, min)));
    }
    Ok(())
  }

  /// Соединение, в котором создано выражение.
  #[inline]
  pub fn connection(&self) -> &Connection {
    &self.conn
  }

  //-----------------------------------------------------------------------------------------------
  fn prepare_impl(&mut self, sql: &str, mode: PrepareMode, status: Status) -> Result<()> {
    let stmt = live(&self.handle)?;
    self.release_resultsets();
    let mut guard = self.data()?;
    let data = &mut *guard;
    data.reset(sql);

    let native = self.env.native();
    check(native, native.prepare(stmt, sql, mode))
      .map_err(|e| Error::from(e).with_sql(Some(sql)).with_handle(stmt))?;
    data.status = status;
    debug!("{:?} {:?}: {}", stmt, mode, sql);
    Ok(())
  }
  /// Подготавливает выражение к выполнению. Все ранее связанные переменные и полученные выборки
  /// освобождаются, размер массива связывания сбрасывается в 1.
  pub fn prepare(&mut self, sql: &str) -> Result<()> {
    self.prepare_impl(sql, PrepareMode::Prepare, Status::Prepared)
  }
  /// Подготавливает выражение и разбирает его на сервере, не выполняя.
  pub fn parse(&mut self, sql: &str) -> Result<()> {
    self.prepare_impl(sql, PrepareMode::Parse, Status::Parsed)
  }
  /// Подготавливает выражение, разбирает его и получает описание списка выбора, не выполняя.
  pub fn describe(&mut self, sql: &str) -> Result<()> {
    self.prepare_impl(sql, PrepareMode::Describe, Status::Described)
  }

  /// Выполняет подготовленное выражение столько раз, каков текущий [размер массива связывания][1].
  /// Перед выполнением данные всех связанных переменных копируются в их буферы, после выполнения
  /// результаты копируются обратно в переменные приложения.
  ///
  /// [1]: #method.set_bind_array_size
  pub fn execute_prepared(&mut self) -> Result<()> {
    let stmt = live(&self.handle)?;
    self.release_resultsets();
    let mut guard = self.data()?;
    let data = &mut *guard;
    Self::require_status(data, Status::Prepared, "execute")?;

    let native = self.env.native();
    let ctx = BindCtx { native, stmt, array_size: data.array_size };
    data.binds.set_in_data(&ctx).map_err(|e| e.with_sql(data.sql.as_ref()))?;
    check(native, native.execute(stmt, data.array_size))
      .map_err(|e| Error::from(e).with_sql(data.sql.as_ref()).with_handle(stmt))?;
    data.status = Status::Executed;
    data.binds.set_out_data(&ctx).map_err(|e| e.with_sql(data.sql.as_ref()))?;
    debug!("{:?} executed {} times", stmt, data.array_size);
    Ok(())
  }
  /// Подготавливает и выполняет выражение.
  pub fn execute(&mut self, sql: &str) -> Result<()> {
    self.prepare(sql)?;
    self.execute_prepared()
  }
  /// Подготавливает и выполняет выражение, после чего обходит все полученные выборки, вызывая
  /// обработчик для каждой строки. Возвращает общее количество принятых обработчиком строк.
  pub fn execute_with<F, R>(&mut self, sql: &str, cb: F) -> Result<usize>
    where F: FnMut(&Resultset) -> R,
          R: Flow,
  {
    self.execute(sql)?;
    self.fetch(cb)
  }
  /// Выполняет подготовленное выражение и обходит все полученные выборки.
  pub fn execute_prepared_with<F, R>(&mut self, cb: F) -> Result<usize>
    where F: FnMut(&Resultset) -> R,
          R: Flow,
  {
    self.execute_prepared()?;
    self.fetch(cb)
  }
  /// Выполняет подготовленное выражение и обходит все полученные выборки, преобразуя каждую строку адаптером.
  pub fn execute_prepared_adapted<T, A, F, R>(&mut self, cb: F, adapter: A) -> Result<usize>
    where A: FnMut(&Resultset) -> Result<T>,
          F: FnMut(T) -> R,
          R: Flow,
  {
    self.execute_prepared()?;
    self.fetch_adapted(cb, adapter)
  }
  /// Подготавливает и выполняет выражение и обходит все полученные выборки, преобразуя каждую строку адаптером.
  pub fn execute_adapted<T, A, F, R>(&mut self, sql: &str, cb: F, adapter: A) -> Result<usize>
    where A: FnMut(&Resultset) -> Result<T>,
          F: FnMut(T) -> R,
          R: Flow,
  {
    self.execute(sql)?;
    self.fetch_adapted(cb, adapter)
  }

  //-----------------------------------------------------------------------------------------------
  fn bind_object<F>(&mut self, index: BindIndex, ty: ValueType, build: F) -> Result<()>
    where F: FnOnce(String, &StatementData) -> Box<dyn BindObject>
  {
    let stmt = live(&self.handle)?;
    let name = index.to_name()?;
    let max_binds = self.env.max_binds();
    let mut guard = self.data()?;
    let data = &mut *guard;
    Self::require_status(data, Status::Prepared, "bind")?;

    match data.binds.get(&name).map(|b| b.value_type()) {
      Some(_) if !data.allow_rebinding => return Err(Error::BindAlreadyUsed(name)),
      Some(bound) if bound != ty => return Err(Error::RebindBadType { name, bound, requested: ty }),
      Some(_) => {},
      None => {
        if data.status == Status::Executed {
          return Err(Error::invalid_state("bind", "statement is already executed, prepare it again to bind new variables"));
        }
        if data.binds.len() >= max_binds {
          return Err(Error::OutOfBounds { what: "bind count", value: data.binds.len() + 1, min: 1, max: max_binds });
        }
      },
    }

    let mut obj = build(name, data);
    let native = self.env.native();
    // Буфер объекта не перемещается, а сам объект хранится в наборе, пока выражение не будет
    // подготовлено заново или освобождено. При ошибке объект уничтожается, так и не попав в набор
    let ok = unsafe { native.bind(stmt, &obj.desc()) };
    check(native, ok).map_err(|e| Error::from(e).with_sql(data.sql.as_ref()).with_bind(obj.name()))?;
    trace!("{:?}: bound {} as {:?} ({:?})", stmt, obj.name(), obj.value_type(), obj.direction());
    data.binds.add(obj, data.allow_rebinding);
    Ok(())
  }
  /// Связывает переменную приложения с переменной выражения. Строки и массивы байт связываются
  /// с буфером, размер которого равен длине значения на момент связывания; чтобы получать более
  /// длинные значения, используйте [`bind_sized`](#method.bind_sized).
  ///
  /// Переменная может быть указана по имени (`":name"`) или по позиции (нумерация с 1).
  pub fn bind<'i, I, T>(&mut self, index: I, var: &HostVar<T>, direction: Direction) -> Result<()>
    where I: Into<BindIndex<'i>>,
          T: Bindable,
  {
    let var = var.clone();
    self.bind_object(index.into(), T::TYPE, |name, _| T::bind_object(name, var, 0, direction))
  }
  /// Связывает строку или массив байт с буфером указанного максимального размера.
  pub fn bind_sized<'i, I, T>(&mut self, index: I, var: &HostVar<T>, size: usize, direction: Direction) -> Result<()>
    where I: Into<BindIndex<'i>>,
          T: VarLen,
  {
    let var = var.clone();
    self.bind_object(index.into(), T::TYPE, |name, _| -> Box<dyn BindObject> {
      Box::new(BindObjectAdaptor::new(name, var, size, direction))
    })
  }
  /// Связывает вектор значений: массив для пакетного выполнения или PL/SQL таблицу.
  pub fn bind_vector<'i, I, T>(&mut self, index: I, var: &HostVar<Vec<T>>, direction: Direction, kind: VectorKind) -> Result<()>
    where I: Into<BindIndex<'i>>,
          T: Element,
  {
    self.bind_vector_sized(index, var, 0, direction, kind)
  }
  /// Связывает вектор значений, указывая максимальный размер элемента для строк и массивов байт.
  pub fn bind_vector_sized<'i, I, T>(&mut self, index: I, var: &HostVar<Vec<T>>, size: usize, direction: Direction, kind: VectorKind) -> Result<()>
    where I: Into<BindIndex<'i>>,
          T: Element,
  {
    let var = var.clone();
    self.bind_object(index.into(), T::TYPE, |name, data| -> Box<dyn BindObject> {
      // Размер массива может вернуться к начальному, буфер должен вместить все итерации
      let capacity = data.array_size.max(data.initial_array_size);
      Box::new(BindArray::new(name, var, direction, kind, size, capacity))
    })
  }
  /// Регистрирует выходную переменную конструкции `RETURNING ... INTO`. Значения такой переменной
  /// возвращаются в виде выборок, по одной на каждую итерацию выполнения.
  pub fn register(&mut self, name: &str, ty: ValueType, max_len: usize) -> Result<()> {
    let stmt = live(&self.handle)?;
    let data = self.data()?;
    Self::require_status(&data, Status::Prepared, "register")?;
    if ty.is_variable() && max_len < 1 {
      return Err(Error::OutOfBounds { what: "returning value length", value: max_len, min: 1, max: usize::max_value() });
    }
    let native = self.env.native();
    check(native, native.register(stmt, name, ty, max_len))
      .map_err(|e| Error::from(e).with_sql(data.sql.as_ref()).with_bind(name))?;
    Ok(())
  }

  //-----------------------------------------------------------------------------------------------
  /// Устанавливает количество итераций пакетного выполнения. Пока с выражением связана хотя бы одна
  /// переменная, размер нельзя увеличить сверх того, который действовал при первом связывании.
  pub fn set_bind_array_size(&mut self, size: usize) -> Result<()> {
    let stmt = live(&self.handle)?;
    let mut guard = self.data()?;
    let data = &mut *guard;
    Self::require_status(data, Status::Prepared, "set_bind_array_size")?;
    let max = if data.binds.is_empty() { usize::max_value() } else { data.initial_array_size };
    if size < 1 || size > max {
      return Err(Error::OutOfBounds { what: "bind array size", value: size, min: 1, max });
    }
    let native = self.env.native();
    check(native, native.set_attr(stmt, Attr::BindArraySize, Value::UInt64(size as u64)))
      .map_err(|e| Error::from(e).with_sql(data.sql.as_ref()))?;
    data.array_size = size;
    if data.binds.is_empty() {
      data.initial_array_size = size;
    }
    Ok(())
  }
  /// Текущее количество итераций пакетного выполнения.
  pub fn bind_array_size(&self) -> Result<usize> {
    Ok(self.data()?.array_size)
  }
  /// Разрешает или запрещает повторное связывание переменной с тем же именем.
  pub fn allow_rebinding(&mut self, allow: bool) -> Result<()> {
    self.data()?.allow_rebinding = allow;
    Ok(())
  }
  /// Разрешено ли повторное связывание.
  pub fn is_rebinding_allowed(&self) -> Result<bool> {
    Ok(self.data()?.allow_rebinding)
  }
  /// Устанавливает режим выборки. Прокручиваемые курсоры требуют сервера версии 9 или новее.
  pub fn set_fetch_mode(&mut self, mode: FetchMode) -> Result<()> {
    let stmt = live(&self.handle)?;
    if mode == FetchMode::Scrollable {
      let version = self.conn.server_version()?;
      if version < Version::major(9) {
        return Err(Error::Unsupported { feature: "scrollable cursor", version });
      }
    }
    let native = self.env.native();
    check(native, native.set_attr(stmt, Attr::FetchMode, Value::Bool(mode == FetchMode::Scrollable)))?;
    self.data()?.fetch_mode = mode;
    Ok(())
  }
  /// Текущий режим выборки.
  pub fn fetch_mode(&self) -> Result<FetchMode> {
    Ok(self.data()?.fetch_mode)
  }

  //-----------------------------------------------------------------------------------------------
  fn wrap_resultset(&self, rs: NativeHandle, sql: Option<String>, scrollable: bool) -> Result<Resultset> {
    let handle = SmartHandle::transient(&self.env, rs, HandleKind::Resultset, Some(&self.handle))?;
    Ok(Resultset::new(self.env.clone(), handle, sql, scrollable))
  }
  fn resultset_impl(&self, operation: &'static str, first: bool) -> Result<Option<Resultset>> {
    let stmt = live(&self.handle)?;
    let (sql, scrollable) = {
      let data = self.data()?;
      Self::require_status(&data, Status::Executed, operation)?;
      (data.sql.clone(), data.fetch_mode == FetchMode::Scrollable)
    };
    let native = self.env.native();
    let rs = if first { native.resultset(stmt) } else { native.next_resultset(stmt) };
    match optional(native, rs).map_err(|e| Error::from(e).with_sql(sql.as_ref()).with_handle(stmt))? {
      Some(rs) => self.wrap_resultset(rs, sql, scrollable).map(Some),
      None => Ok(None),
    }
  }
  /// Первая выборка, полученная при выполнении выражения, или `None`, если выражение не вернуло выборок.
  pub fn resultset(&self) -> Result<Option<Resultset>> {
    self.resultset_impl("resultset", true)
  }
  /// Следующая выборка в цепочке, или `None`, если выборок больше нет.
  pub fn next_resultset(&self) -> Result<Option<Resultset>> {
    self.resultset_impl("next_resultset", false)
  }
  /// Освобождает все выборки выражения. Возвращает количество освобожденных выборок.
  pub fn release_resultsets(&self) -> usize {
    self.handle.release_children(|h| h.kind() == HandleKind::Resultset)
  }
  /// Обходит всю цепочку выборок выполненного выражения, вызывая обработчик для каждой строки.
  /// Обработчик, вернувший `false`, прекращает обход текущей выборки, после чего обход продолжается
  /// со следующей. Возвращает общее количество принятых обработчиком строк.
  pub fn fetch<F, R>(&self, mut cb: F) -> Result<usize>
    where F: FnMut(&Resultset) -> R,
          R: Flow,
  {
    let mut total = 0;
    let mut next = self.resultset()?;
    while let Some(mut rs) = next {
      total += rs.for_each(&mut cb)?;
      next = self.next_resultset()?;
    }
    Ok(total)
  }
  /// То же, что и [`fetch`](#method.fetch), но каждая строка сначала преобразуется адаптером.
  pub fn fetch_adapted<T, A, F, R>(&self, mut cb: F, mut adapter: A) -> Result<usize>
    where A: FnMut(&Resultset) -> Result<T>,
          F: FnMut(T) -> R,
          R: Flow,
  {
    let mut total = 0;
    let mut next = self.resultset()?;
    while let Some(mut rs) = next {
      total += rs.for_each_adapted(&mut cb, &mut adapter)?;
      next = self.next_resultset()?;
    }
    Ok(total)
  }

  //-----------------------------------------------------------------------------------------------
  /// Количество связанных переменных.
  pub fn bind_count(&self) -> Result<usize> {
    Ok(self.data()?.binds.len())
  }
  /// Имена связанных переменных в порядке связывания.
  pub fn bind_names(&self) -> Result<Vec<String>> {
    Ok(self.data()?.binds.names())
  }
  /// Максимальная длина PL/SQL таблицы, переданная при связывании переменной, `0` для остальных
  /// переменных, или `None`, если переменная не связана.
  pub fn size_for_bind_call(&self, name: &str) -> Result<Option<usize>> {
    Ok(self.data()?.binds.get(name).map(|b| b.size_for_bind_call()))
  }
  /// Количество строк, затронутых последним выполнением.
  pub fn affected_rows(&self) -> Result<u64> {
    let stmt = live(&self.handle)?;
    let native = self.env.native();
    let value = require(native, native.get_attr(stmt, Attr::RowCount))?;
    u64::from_value(&value)
  }
  /// Текст последнего подготовленного выражения.
  pub fn sql(&self) -> Result<Option<String>> {
    Ok(self.data()?.sql.clone())
  }
  /// Стадия жизненного цикла выражения.
  pub fn status(&self) -> Result<Status> {
    Ok(self.data()?.status)
  }
}
impl HandleHolder for Statement {
  fn handle(&self) -> &SmartHandle { &self.handle }
}
impl fmt::Debug for Statement {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    fmt.debug_struct("Statement")
       .field("handle", &self.handle)
       .field("connection", &self.conn.handle().native())
       .finish()
  }
}
