//! Объекты связывания: буферы, через которые данные переменных приложения передаются в выражение
//! и обратно.
//!
//! Объект связывания владеет нативным буфером, адрес которого сообщается нативной библиотеке
//! при связывании. Буфер выделяется один раз при создании объекта и не перемещается до его
//! уничтожения. Непосредственно перед выполнением выражения объект копирует данные из переменной
//! приложения в буфер ([`set_in_data`]), а сразу после выполнения -- из буфера обратно в переменную
//! ([`set_out_data`]).
//!
//! [`set_in_data`]: trait.BindObject.html#tymethod.set_in_data
//! [`set_out_data`]: trait.BindObject.html#tymethod.set_out_data

use std::cmp;
use std::fmt;

use log::trace;

use crate::Result;
use crate::convert::{Adapt, Element, HostVar, Scalar, VarLen};
use crate::ffi::{BindDesc, Native, NativeHandle};
use crate::ffi::{check, require};
use crate::types::{Direction, ValueType, VectorKind};

/// Окружение, в котором объект связывания обменивается данными.
#[derive(Clone, Copy)]
pub struct BindCtx<'a> {
  /// Нативная библиотека.
  pub native: &'a dyn Native,
  /// Выражение, с которым связан объект.
  pub stmt: NativeHandle,
  /// Текущий размер массива связывания выражения.
  pub array_size: usize,
}
impl<'a> fmt::Debug for BindCtx<'a> {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    fmt.debug_struct("BindCtx")
       .field("stmt", &self.stmt)
       .field("array_size", &self.array_size)
       .finish()
  }
}

/// Общий интерфейс всех объектов связывания.
pub trait BindObject: Send {
  /// Имя переменной в тексте выражения.
  fn name(&self) -> &str;
  /// Направление передачи данных.
  fn direction(&self) -> Direction;
  /// Тип значения.
  fn value_type(&self) -> ValueType;
  /// Описание буфера для передачи нативной библиотеке.
  fn desc(&mut self) -> BindDesc;
  /// Копирует данные из переменной приложения в буфер. Вызывается перед выполнением выражения.
  fn set_in_data(&mut self, ctx: &BindCtx) -> Result<()>;
  /// Копирует данные из буфера в переменную приложения. Вызывается после выполнения выражения.
  fn set_out_data(&mut self, ctx: &BindCtx) -> Result<()>;
  /// Максимальная длина PL/SQL таблицы для передачи при связывании, `0` для остальных объектов.
  fn size_for_bind_call(&self) -> usize { 0 }
}
impl fmt::Debug for dyn BindObject {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    fmt.debug_struct("BindObject")
       .field("name", &self.name())
       .field("direction", &self.direction())
       .field("type", &self.value_type())
       .finish()
  }
}

//-------------------------------------------------------------------------------------------------
/// Связывание скалярного значения, которое на границе транслируется в нативное представление.
pub struct BindTypeAdaptor<T: Adapt> {
  name: String,
  var: HostVar<T>,
  direction: Direction,
  cell: Vec<u8>,
}
impl<T: Adapt> BindTypeAdaptor<T> {
  /// Создает объект связывания для переменной приложения.
  pub fn new(name: String, var: HostVar<T>, direction: Direction) -> Self {
    BindTypeAdaptor { name, var, direction, cell: vec![0; <T::Native as Scalar>::SIZE] }
  }
}
impl<T: Adapt> BindObject for BindTypeAdaptor<T> {
  fn name(&self) -> &str { &self.name }
  fn direction(&self) -> Direction { self.direction }
  fn value_type(&self) -> ValueType { T::TYPE }
  fn desc(&mut self) -> BindDesc {
    BindDesc::new(&self.name, T::TYPE, self.cell.as_mut_ptr(), self.cell.len(), 1, 0, self.direction)
  }
  fn set_in_data(&mut self, _: &BindCtx) -> Result<()> {
    if self.direction.is_in() || <T::Native as Scalar>::IS_HANDLE {
      self.var.lock().to_native().write_native(&mut self.cell);
      trace!("{}: pushed {:?}", self.name, T::TYPE);
    }
    Ok(())
  }
  fn set_out_data(&mut self, _: &BindCtx) -> Result<()> {
    if self.direction.is_out() {
      *self.var.lock() = T::from_native(Scalar::read_native(&self.cell))?;
      trace!("{}: pulled {:?}", self.name, T::TYPE);
    }
    Ok(())
  }
}

//-------------------------------------------------------------------------------------------------
/// Связывание значения переменной длины (строки или массива байт). Под значение выделяется буфер
/// объявленного размера и еще один байт под завершающий ноль.
pub struct BindObjectAdaptor<T: VarLen> {
  name: String,
  var: HostVar<T>,
  direction: Direction,
  /// Максимальный размер данных, без терминатора.
  size: usize,
  buf: Vec<u8>,
}
impl<T: VarLen> BindObjectAdaptor<T> {
  /// Создает объект связывания. Если размер равен `0`, используется текущая длина значения
  /// переменной, но не меньше 1.
  pub fn new(name: String, var: HostVar<T>, size: usize, direction: Direction) -> Self {
    let size = if size == 0 { cmp::max(var.lock().len(), 1) } else { size };
    BindObjectAdaptor { name, var, direction, size, buf: vec![0; size + 1] }
  }
  /// Максимальный размер данных.
  pub fn size(&self) -> usize { self.size }
}
impl<T: VarLen> BindObject for BindObjectAdaptor<T> {
  fn name(&self) -> &str { &self.name }
  fn direction(&self) -> Direction { self.direction }
  fn value_type(&self) -> ValueType { T::TYPE }
  fn desc(&mut self) -> BindDesc {
    BindDesc::new(&self.name, T::TYPE, self.buf.as_mut_ptr(), self.buf.len(), 1, 0, self.direction)
  }
  fn set_in_data(&mut self, ctx: &BindCtx) -> Result<()> {
    if !self.direction.is_in() {
      return Ok(());
    }
    let n = self.var.lock().write_native(&mut self.buf[..self.size]);
    self.buf[self.size] = 0;
    check(ctx.native, ctx.native.set_bind_data_size(ctx.stmt, &self.name, 1, n))?;
    trace!("{}: pushed {} of {} bytes", self.name, n, self.size);
    Ok(())
  }
  fn set_out_data(&mut self, ctx: &BindCtx) -> Result<()> {
    if !self.direction.is_out() {
      return Ok(());
    }
    let n = require(ctx.native, ctx.native.bind_data_size(ctx.stmt, &self.name, 1))?;
    let n = cmp::min(n, self.size);
    *self.var.lock() = T::read_native(&self.buf[..n])?;
    trace!("{}: pulled {} bytes", self.name, n);
    Ok(())
  }
}

//-------------------------------------------------------------------------------------------------
/// Связывание вектора значений: массива для пакетного выполнения DML или PL/SQL таблицы.
///
/// Элементы размещаются в буфере с постоянным шагом, элемент `i` находится по смещению
/// `i * elem_size`. При обмене данными копируется не больше `min(elem_count, size, len)` элементов,
/// где `elem_count` -- количество элементов, под которые выделен буфер, `size` -- текущий
/// [размер](#method.size) массива, а `len` -- текущая длина вектора приложения. Элементы вектора,
/// для которых нет места в буфере, в обмене не участвуют; длина вектора никогда не меняется.
pub struct BindArray<T: Element> {
  name: String,
  var: HostVar<Vec<T>>,
  direction: Direction,
  kind: VectorKind,
  elem_size: usize,
  elem_count: usize,
  buf: Vec<u8>,
}
impl<T: Element> BindArray<T> {
  /// Создает объект связывания.
  ///
  /// # Параметры
  /// - `size`:
  ///   Максимальный размер одного элемента для элементов переменной длины. Если равен `0`,
  ///   используется длина самого длинного элемента вектора, но не меньше 1. Для элементов
  ///   фиксированной длины игнорируется.
  /// - `array_size`:
  ///   Наибольший размер массива связывания, до которого выражение может дойти, пока связан
  ///   объект. Определяет количество элементов буфера для обычных массивов.
  pub fn new(name: String, var: HostVar<Vec<T>>, direction: Direction, kind: VectorKind, size: usize, array_size: usize) -> Self {
    let (len, longest) = {
      let vec = var.lock();
      (vec.len(), vec.iter().map(Element::len).max().unwrap_or(0))
    };
    let size = if size == 0 { cmp::max(longest, 1) } else { size };
    let elem_size = T::stride(size);
    let elem_count = match kind {
      VectorKind::Regular => array_size,
      VectorKind::PlSqlTable => len,
    };
    BindArray { name, var, direction, kind, elem_size, elem_count, buf: vec![0; elem_size * elem_count] }
  }
  /// Вид массива.
  pub fn kind(&self) -> VectorKind { self.kind }
  /// Количество элементов, под которые выделен буфер.
  pub fn elem_count(&self) -> usize { self.elem_count }
  /// Шаг элементов в буфере.
  pub fn elem_size(&self) -> usize { self.elem_size }
  /// Текущий размер массива: длина вектора для PL/SQL таблиц или размер массива связывания
  /// выражения для обычных массивов.
  pub fn size(&self, ctx: &BindCtx) -> usize {
    self.size_for(self.var.lock().len(), ctx)
  }
  fn size_for(&self, len: usize, ctx: &BindCtx) -> usize {
    match self.kind {
      VectorKind::Regular => ctx.array_size,
      VectorKind::PlSqlTable => len,
    }
  }
  /// Количество элементов, участвующих в обмене.
  fn count(&self, len: usize, ctx: &BindCtx) -> usize {
    cmp::min(cmp::min(self.elem_count, self.size_for(len, ctx)), len)
  }
  fn cell(&mut self, i: usize) -> &mut [u8] {
    let start = i * self.elem_size;
    &mut self.buf[start..start + self.elem_size]
  }
}
impl<T: Element> BindObject for BindArray<T> {
  fn name(&self) -> &str { &self.name }
  fn direction(&self) -> Direction { self.direction }
  fn value_type(&self) -> ValueType { T::TYPE }
  fn desc(&mut self) -> BindDesc {
    BindDesc::new(&self.name, T::TYPE, self.buf.as_mut_ptr(), self.elem_size, self.elem_count, self.size_for_bind_call(), self.direction)
  }
  fn set_in_data(&mut self, ctx: &BindCtx) -> Result<()> {
    if !(self.direction.is_in() || T::IS_HANDLE) {
      return Ok(());
    }
    let var = self.var.clone();
    let vec = var.lock();
    let count = self.count(vec.len(), ctx);
    for (i, item) in vec.iter().take(count).enumerate() {
      let n = item.write_elem(self.cell(i))?;
      if T::TYPE.is_variable() {
        check(ctx.native, ctx.native.set_bind_data_size(ctx.stmt, &self.name, i + 1, n))?;
      }
    }
    trace!("{}: pushed {} of {} elements", self.name, count, vec.len());
    Ok(())
  }
  fn set_out_data(&mut self, ctx: &BindCtx) -> Result<()> {
    if !self.direction.is_out() {
      return Ok(());
    }
    let var = self.var.clone();
    let mut vec = var.lock();
    let count = self.count(vec.len(), ctx);
    // Последний байт ячейки переменной длины зарезервирован под терминатор
    let capacity = if T::TYPE.is_variable() { self.elem_size.saturating_sub(1) } else { self.elem_size };
    for i in 0..count {
      let n = if T::TYPE.is_variable() {
        let n = require(ctx.native, ctx.native.bind_data_size(ctx.stmt, &self.name, i + 1))?;
        cmp::min(n, capacity)
      } else {
        capacity
      };
      vec[i] = T::read_elem(&self.cell(i)[..n])?;
    }
    trace!("{}: pulled {} elements", self.name, count);
    Ok(())
  }
  fn size_for_bind_call(&self) -> usize {
    match self.kind {
      VectorKind::Regular => 0,
      VectorKind::PlSqlTable => self.elem_count,
    }
  }
}

//-------------------------------------------------------------------------------------------------
/// Тип переменной приложения, которую можно связать с выражением вызовом [`Statement::bind`][1].
/// Определяет, какой объект связывания будет создан для переменной.
///
/// [1]: ../struct.Statement.html#method.bind
pub trait Bindable: Send + Sized + 'static {
  /// Тип значения, сообщаемый нативной библиотеке.
  const TYPE: ValueType;
  /// Создает объект связывания. Размер учитывается только типами переменной длины, `0` означает
  /// текущую длину значения.
  fn bind_object(name: String, var: HostVar<Self>, size: usize, direction: Direction) -> Box<dyn BindObject>;
}
impl<T: Adapt> Bindable for T {
  const TYPE: ValueType = <T as Adapt>::TYPE;

  fn bind_object(name: String, var: HostVar<Self>, _: usize, direction: Direction) -> Box<dyn BindObject> {
    Box::new(BindTypeAdaptor::new(name, var, direction))
  }
}
impl Bindable for String {
  const TYPE: ValueType = ValueType::String;

  fn bind_object(name: String, var: HostVar<Self>, size: usize, direction: Direction) -> Box<dyn BindObject> {
    Box::new(BindObjectAdaptor::new(name, var, size, direction))
  }
}
impl Bindable for Vec<u8> {
  const TYPE: ValueType = ValueType::Raw;

  fn bind_object(name: String, var: HostVar<Self>, size: usize, direction: Direction) -> Box<dyn BindObject> {
    Box::new(BindObjectAdaptor::new(name, var, size, direction))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use crate::ffi::memory::MemoryNative;
  use crate::types::{HandleKind, PrepareMode};
  use super::*;

  fn prepared(native: &MemoryNative) -> NativeHandle {
    let stmt = native.create(HandleKind::Statement, NativeHandle::null()).expect("Can't create statement");
    assert!(native.prepare(stmt, "insert into t values (:v)", PrepareMode::Prepare));
    stmt
  }
  fn bind(native: &MemoryNative, stmt: NativeHandle, obj: &mut dyn BindObject) {
    // Объект переживает все выполнения в тесте
    assert!(unsafe { native.bind(stmt, &obj.desc()) });
  }

  #[test]
  fn regular_array_copies_at_most_array_size() {
    let native = Arc::new(MemoryNative::new());
    let stmt = prepared(&native);
    let var = HostVar::new(vec![1i32, 2, 3, 4, 5]);
    let mut array = BindArray::new(":v".into(), var.clone(), Direction::In, VectorKind::Regular, 0, 3);
    bind(&native, stmt, &mut array);

    let ctx = BindCtx { native: &*native, stmt, array_size: 2 };
    assert_eq!(array.size(&ctx), 2);
    assert_eq!(array.size_for_bind_call(), 0);
    array.set_in_data(&ctx).expect("Can't push data");

    assert!(native.execute(stmt, 2));
    let exec = native.last_execution().expect("Statement must be executed");
    assert_eq!(exec.scalars::<i32>(":v"), vec![1, 2, 0]);
  }

  #[test]
  fn plsql_table_size_follows_vector() {
    let native = MemoryNative::new();
    let stmt = prepared(&native);
    let var = HostVar::new(vec!["a".to_owned(), "bcd".to_owned()]);
    let mut array = BindArray::new(":v".into(), var.clone(), Direction::InOut, VectorKind::PlSqlTable, 0, 1);
    assert_eq!(array.elem_count(), 2);
    assert_eq!(array.elem_size(), 4);
    assert_eq!(array.size_for_bind_call(), 2);
    bind(&native, stmt, &mut array);

    let ctx = BindCtx { native: &native, stmt, array_size: 1 };
    var.lock().pop();
    assert_eq!(array.size(&ctx), 1);
    array.set_in_data(&ctx).expect("Can't push data");
    array.set_out_data(&ctx).expect("Can't pull data");
    assert_eq!(var.get(), vec!["a".to_owned()]);
  }

  #[test]
  fn empty_vector_is_safe() {
    let native = MemoryNative::new();
    let stmt = prepared(&native);
    let var = HostVar::new(Vec::<i64>::new());
    let mut array = BindArray::new(":v".into(), var.clone(), Direction::InOut, VectorKind::Regular, 0, 4);
    bind(&native, stmt, &mut array);
    let ctx = BindCtx { native: &native, stmt, array_size: 4 };
    array.set_in_data(&ctx).expect("Can't push data");
    array.set_out_data(&ctx).expect("Can't pull data");
    assert!(var.get().is_empty());
  }

  #[test]
  fn empty_plsql_table_has_no_cells() {
    let native = MemoryNative::new();
    let stmt = prepared(&native);
    let var = HostVar::new(Vec::<String>::new());
    let mut array = BindArray::new(":v".into(), var.clone(), Direction::InOut, VectorKind::PlSqlTable, 0, 1);
    assert_eq!(array.elem_count(), 0);
    assert_eq!(array.size_for_bind_call(), 0);
    bind(&native, stmt, &mut array);

    let ctx = BindCtx { native: &native, stmt, array_size: 1 };
    assert_eq!(array.size(&ctx), 0);
    array.set_in_data(&ctx).expect("Can't push data");
    array.set_out_data(&ctx).expect("Can't pull data");
    assert!(var.get().is_empty());
  }

  #[test]
  fn string_is_truncated_to_declared_size() {
    let native = MemoryNative::new();
    let stmt = prepared(&native);
    let var = HostVar::new("abcdef".to_owned());
    let mut obj = BindObjectAdaptor::new(":v".into(), var.clone(), 4, Direction::In);
    bind(&native, stmt, &mut obj);
    obj.set_in_data(&BindCtx { native: &native, stmt, array_size: 1 }).expect("Can't push data");
    assert!(native.execute(stmt, 1));
    let exec = native.last_execution().expect("Statement must be executed");
    assert_eq!(exec.strings(":v"), vec!["abcd".to_owned()]);
  }

  #[test]
  fn out_only_scalar_is_not_pushed() {
    let native = MemoryNative::new();
    let stmt = prepared(&native);
    let var = HostVar::new(7u16);
    let mut obj = BindTypeAdaptor::new(":v".into(), var.clone(), Direction::Out);
    bind(&native, stmt, &mut obj);
    obj.set_in_data(&BindCtx { native: &native, stmt, array_size: 1 }).expect("Can't push data");
    assert!(native.execute(stmt, 1));
    let exec = native.last_execution().expect("Statement must be executed");
    assert_eq!(exec.scalars::<u16>(":v"), vec![0]);
  }
}
