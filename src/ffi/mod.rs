//! Граница с нативной библиотекой. Ядро не разыменовывает нативные хендлы и не знает их внутреннего
//! устройства: все реальные операции выполняются через примитивы типажа [`Native`](trait.Native.html).

use std::fmt;
use std::os::raw::c_void;
use std::ptr;

use crate::DbResult;
use crate::convert::Value;
use crate::error::DbError;
use crate::types::{Attr, Direction, HandleKind, PrepareMode, ValueType};

mod env;
mod handle;
mod registry;
mod sync;
pub mod memory;

pub use self::env::Env;
pub use self::handle::{HandleRef, HandleStore, ReleaseFn, SmartHandle};
pub use self::registry::CallbackRegistry;
pub use self::sync::{Guarded, SyncGuard, SyncMode};

//-------------------------------------------------------------------------------------------------
/// Непрозрачный указатель на ресурс, принадлежащий нативной библиотеке.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(*mut c_void);

// Хендл никогда не разыменовывается ядром, это просто идентификатор ресурса.
unsafe impl Send for NativeHandle {}
unsafe impl Sync for NativeHandle {}

impl NativeHandle {
  /// Отсутствующий хендл.
  #[inline]
  pub const fn null() -> Self {
    NativeHandle(ptr::null_mut())
  }
  /// Оборачивает указатель, полученный от нативной библиотеки.
  #[inline]
  pub fn from_ptr(ptr: *mut c_void) -> Self {
    NativeHandle(ptr)
  }
  /// Восстанавливает хендл по его адресу.
  #[inline]
  pub fn from_addr(addr: usize) -> Self {
    NativeHandle(addr as *mut c_void)
  }
  /// Получает голый указатель для передачи в нативные функции.
  #[inline]
  pub fn as_ptr(self) -> *mut c_void {
    self.0
  }
  /// Адрес хендла, используемый как ключ и для диагностики.
  #[inline]
  pub fn addr(self) -> usize {
    self.0 as usize
  }
  /// Является ли хендл нулевым.
  #[inline]
  pub fn is_null(self) -> bool {
    self.0.is_null()
  }
}
impl Default for NativeHandle {
  fn default() -> Self { NativeHandle::null() }
}
impl fmt::Debug for NativeHandle {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "NativeHandle({:#x})", self.addr())
  }
}

//-------------------------------------------------------------------------------------------------
/// Описание буфера, передаваемое нативной библиотеке при связывании переменной. Создается только
/// объектами связывания ядра, которые владеют описываемым буфером.
///
/// Вне ядра описание не создать, а связывание через него требует `unsafe`:
/// ```compile_fail
/// use oci_core::ffi::{BindDesc, Native, NativeHandle};
/// use oci_core::ffi::memory::MemoryNative;
/// use oci_core::types::{Direction, ValueType};
///
/// let native = MemoryNative::new();
/// let desc = BindDesc {
///   name: ":v", ty: ValueType::Int32, data: 8 as *mut u8,
///   elem_size: 4, elem_count: 1, array_size: 0, direction: Direction::In,
/// };
/// native.bind(NativeHandle::from_addr(8), &desc);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BindDesc<'a> {
  pub(crate) name: &'a str,
  pub(crate) ty: ValueType,
  /// Буфер не перемещается и не меняет размер до освобождения объекта связывания.
  pub(crate) data: *mut u8,
  pub(crate) elem_size: usize,
  pub(crate) elem_count: usize,
  pub(crate) array_size: usize,
  pub(crate) direction: Direction,
}
impl<'a> BindDesc<'a> {
  pub(crate) fn new(name: &'a str, ty: ValueType, data: *mut u8, elem_size: usize, elem_count: usize, array_size: usize, direction: Direction) -> Self {
    BindDesc { name, ty, data, elem_size, elem_count, array_size, direction }
  }
  /// Имя переменной в тексте выражения, например, `:id` или `:1`.
  #[inline]
  pub fn name(&self) -> &'a str { self.name }
  /// Тип значения.
  #[inline]
  pub fn ty(&self) -> ValueType { self.ty }
  /// Начало буфера.
  #[inline]
  pub fn data(&self) -> *mut u8 { self.data }
  /// Размер одного элемента в буфере, в байтах.
  #[inline]
  pub fn elem_size(&self) -> usize { self.elem_size }
  /// Количество элементов, под которые выделен буфер.
  #[inline]
  pub fn elem_count(&self) -> usize { self.elem_count }
  /// Максимальная длина PL/SQL таблицы, `0` для остальных связываний.
  #[inline]
  pub fn array_size(&self) -> usize { self.array_size }
  /// Направление передачи данных.
  #[inline]
  pub fn direction(&self) -> Direction { self.direction }
  /// Общий размер буфера в байтах.
  #[inline]
  pub fn len(&self) -> usize {
    self.elem_size * self.elem_count
  }
}

/// Операция перемещения курсора выборки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOp {
  /// Следующая строка.
  Next,
  /// Предыдущая строка.
  Prev,
  /// Первая строка.
  First,
  /// Последняя строка.
  Last,
  /// Строка с указанным номером (нумерация с 1).
  Absolute(i32),
  /// Строка со смещением относительно текущей.
  Relative(i32),
}

/// Примитивы нативной библиотеки, которыми пользуется ядро.
///
/// Каждый примитив, который может завершиться неудачей, возвращает признак успеха или `Option`.
/// В случае неудачи нативная библиотека запоминает ошибку, которую затем можно получить вызовом
/// [`take_error`](#tymethod.take_error). Неудача без запомненной ошибки у примитивов навигации
/// ([`fetch`](#tymethod.fetch), [`resultset`](#tymethod.resultset), [`next_resultset`](#tymethod.next_resultset))
/// означает отсутствие данных.
pub trait Native: Send + Sync {
  /// Создает хендл указанного вида, подчиненный хендлу `parent`.
  fn create(&self, kind: HandleKind, parent: NativeHandle) -> Option<NativeHandle>;
  /// Разрушает хендл, созданный вызовом [`create`](#tymethod.create).
  fn destroy(&self, kind: HandleKind, handle: NativeHandle) -> bool;
  /// Читает значение атрибута хендла.
  fn get_attr(&self, handle: NativeHandle, attr: Attr) -> Option<Value>;
  /// Устанавливает значение атрибута хендла.
  fn set_attr(&self, handle: NativeHandle, attr: Attr, value: Value) -> bool;

  /// Подготавливает текст выражения с указанной глубиной разбора.
  fn prepare(&self, stmt: NativeHandle, sql: &str, mode: PrepareMode) -> bool;
  /// Связывает буфер с переменной выражения.
  ///
  /// # Safety
  /// Буфер, описанный `desc`, должен содержать не менее `desc.len()` байт, доступных для чтения и
  /// записи, и оставаться действительным, пока переменная не будет связана заново, выражение не будет
  /// подготовлено повторно или его хендл не будет разрушен. Все это время библиотека может читать
  /// и писать буфер при каждом вызове [`execute`](#tymethod.execute).
  unsafe fn bind(&self, stmt: NativeHandle, desc: &BindDesc) -> bool;
  /// Регистрирует выходную переменную для конструкции `RETURNING ... INTO`.
  fn register(&self, stmt: NativeHandle, name: &str, ty: ValueType, max_len: usize) -> bool;
  /// Фактический размер данных элемента связанной переменной (позиция с 1).
  fn bind_data_size(&self, stmt: NativeHandle, name: &str, pos: usize) -> Option<usize>;
  /// Устанавливает фактический размер данных элемента связанной переменной (позиция с 1).
  fn set_bind_data_size(&self, stmt: NativeHandle, name: &str, pos: usize, size: usize) -> bool;
  /// Выполняет подготовленное выражение указанное количество раз.
  fn execute(&self, stmt: NativeHandle, iters: usize) -> bool;

  /// Первая выборка, полученная при выполнении выражения.
  fn resultset(&self, stmt: NativeHandle) -> Option<NativeHandle>;
  /// Следующая выборка в цепочке.
  fn next_resultset(&self, stmt: NativeHandle) -> Option<NativeHandle>;
  /// Перемещает курсор выборки.
  fn fetch(&self, rs: NativeHandle, op: FetchOp) -> bool;
  /// Номер текущей строки выборки (нумерация с 1, `0` -- перед первой строкой).
  fn current_row(&self, rs: NativeHandle) -> Option<usize>;
  /// Количество колонок выборки.
  fn column_count(&self, rs: NativeHandle) -> Option<usize>;
  /// Значение колонки текущей строки (нумерация с 1).
  fn column_value(&self, rs: NativeHandle, index: usize) -> Option<Value>;

  /// Асинхронно прерывает блокирующий вызов, выполняющийся в соединении в другом потоке.
  fn break_call(&self, conn: NativeHandle) -> bool;
  /// Забирает последнюю ошибку, запомненную нативной библиотекой.
  fn take_error(&self) -> Option<DbError>;
}

/// Последняя ошибка нативной библиотеки. Если библиотека сообщила о неудаче, но ничего не запомнила,
/// возвращает [`DbError::Unknown`](../error/enum.DbError.html#variant.Unknown).
#[inline]
pub(crate) fn last_error(native: &dyn Native) -> DbError {
  native.take_error().unwrap_or(DbError::Unknown(-1))
}
/// Транслирует признак успеха примитива в результат.
#[inline]
pub(crate) fn check(native: &dyn Native, ok: bool) -> DbResult<()> {
  if ok { Ok(()) } else { Err(last_error(native)) }
}
/// Транслирует результат примитива, возвращающего значение, в результат.
#[inline]
pub(crate) fn require<T>(native: &dyn Native, value: Option<T>) -> DbResult<T> {
  value.ok_or_else(|| last_error(native))
}
/// Для примитивов навигации: отсутствие значения без ошибки означает конец данных.
#[inline]
pub(crate) fn optional<T>(native: &dyn Native, value: Option<T>) -> DbResult<Option<T>> {
  match value {
    Some(v) => Ok(Some(v)),
    None => match native.take_error() {
      Some(err) => Err(err),
      None => Ok(None),
    },
  }
}
