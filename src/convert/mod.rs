//! Содержит код для преобразования между типами Rust и нативным представлением значений.
//!
//! Все связываемые типы делятся на три группы:
//! - [`Scalar`] -- типы фиксированной длины, нативное представление которых совпадает с их
//!   представлением в памяти;
//! - [`Adapt`] -- типы, которые перед передачей в базу транслируются в один из скалярных типов
//!   (например, `bool` передается как 32-битное целое);
//! - [`VarLen`] -- типы переменной длины (строки и массивы байт), для которых выделяется буфер
//!   объявленного максимального размера.
//!
//! [`Scalar`]: trait.Scalar.html
//! [`Adapt`]: trait.Adapt.html
//! [`VarLen`]: trait.VarLen.html

use std::fmt;
use std::mem;
use std::str;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::Result;
use crate::error::Error;
use crate::ffi::NativeHandle;
use crate::types::ValueType;

mod num;
#[cfg(feature = "with-chrono")]
mod chrono;

//-------------------------------------------------------------------------------------------------
/// Значение, полученное из нативной библиотеки: элемент строки выборки или значение атрибута.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  /// Значение отсутствует (`NULL`).
  Null,
  /// Логическое значение.
  Bool(bool),
  /// `i8`
  Int8(i8),
  /// `i16`
  Int16(i16),
  /// `i32`
  Int32(i32),
  /// `i64`
  Int64(i64),
  /// `u8`
  UInt8(u8),
  /// `u16`
  UInt16(u16),
  /// `u32`
  UInt32(u32),
  /// `u64`
  UInt64(u64),
  /// `f32`
  Float(f32),
  /// `f64`
  Double(f64),
  /// Строка.
  String(String),
  /// Массив байт.
  Raw(Vec<u8>),
  /// Дата и время, микросекунды от начала эпохи.
  DateTime(i64),
  /// Ссылка на нативный хендл.
  Handle(NativeHandle),
}
impl Value {
  /// Тип значения, или `None` для `NULL`.
  pub fn value_type(&self) -> Option<ValueType> {
    Some(match *self {
      Value::Null        => return None,
      Value::Bool(_)     => ValueType::Bool,
      Value::Int8(_)     => ValueType::Int8,
      Value::Int16(_)    => ValueType::Int16,
      Value::Int32(_)    => ValueType::Int32,
      Value::Int64(_)    => ValueType::Int64,
      Value::UInt8(_)    => ValueType::UInt8,
      Value::UInt16(_)   => ValueType::UInt16,
      Value::UInt32(_)   => ValueType::UInt32,
      Value::UInt64(_)   => ValueType::UInt64,
      Value::Float(_)    => ValueType::Float,
      Value::Double(_)   => ValueType::Double,
      Value::String(_)   => ValueType::String,
      Value::Raw(_)      => ValueType::Raw,
      Value::DateTime(_) => ValueType::DateTime,
      Value::Handle(_)   => ValueType::Handle,
    })
  }
  /// Является ли значение `NULL`-ом.
  #[inline]
  pub fn is_null(&self) -> bool {
    *self == Value::Null
  }
}
impl<'a> From<&'a str> for Value {
  fn from(s: &'a str) -> Self { Value::String(s.to_owned()) }
}
impl From<String> for Value {
  fn from(s: String) -> Self { Value::String(s) }
}
impl From<Vec<u8>> for Value {
  fn from(b: Vec<u8>) -> Self { Value::Raw(b) }
}
impl From<bool> for Value {
  fn from(b: bool) -> Self { Value::Bool(b) }
}
impl From<NativeHandle> for Value {
  fn from(h: NativeHandle) -> Self { Value::Handle(h) }
}
impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self { v.map_or(Value::Null, Into::into) }
}

/// Преобразует значение, полученное из нативной библиотеки, в тип Rust.
pub trait FromValue: Sized {
  /// Выполняет преобразование. Если преобразование невозможно, возвращает [`Conversion`][1].
  ///
  /// [1]: ../error/enum.Error.html#variant.Conversion
  fn from_value(value: &Value) -> Result<Self>;
}
impl<T: FromValue> FromValue for Option<T> {
  fn from_value(value: &Value) -> Result<Self> {
    match *value {
      Value::Null => Ok(None),
      ref v => T::from_value(v).map(Some),
    }
  }
}
impl FromValue for Value {
  fn from_value(value: &Value) -> Result<Self> { Ok(value.clone()) }
}
impl FromValue for String {
  fn from_value(value: &Value) -> Result<Self> {
    match *value {
      Value::String(ref s) => Ok(s.clone()),
      Value::Raw(ref b) => str::from_utf8(b).map(str::to_owned).map_err(|_| Error::Conversion(ValueType::String)),
      _ => Err(Error::Conversion(ValueType::String)),
    }
  }
}
impl FromValue for Vec<u8> {
  fn from_value(value: &Value) -> Result<Self> {
    match *value {
      Value::Raw(ref b) => Ok(b.clone()),
      Value::String(ref s) => Ok(s.clone().into_bytes()),
      _ => Err(Error::Conversion(ValueType::Raw)),
    }
  }
}
impl FromValue for NativeHandle {
  fn from_value(value: &Value) -> Result<Self> {
    match *value {
      Value::Handle(h) => Ok(h),
      _ => Err(Error::Conversion(ValueType::Handle)),
    }
  }
}

//-------------------------------------------------------------------------------------------------
/// Тип фиксированной длины, который может быть непосредственно размещен в нативном буфере.
pub trait Scalar: Copy + Send + 'static {
  /// Тип значения, сообщаемый нативной библиотеке при связывании.
  const TYPE: ValueType;
  /// Размер нативного представления в байтах.
  const SIZE: usize = mem::size_of::<Self>();
  /// Является ли значение ссылкой на нативный хендл. Такие значения передаются в базу
  /// при любом направлении связывания.
  const IS_HANDLE: bool = false;

  /// Записывает значение в начало буфера. Буфер должен иметь размер не менее [`SIZE`](#associatedconstant.SIZE).
  fn write_native(&self, buf: &mut [u8]);
  /// Читает значение из начала буфера.
  fn read_native(buf: &[u8]) -> Self;
}

macro_rules! scalar {
  ($($ty:ty => $vt:ident),+) => {$(
    impl Scalar for $ty {
      const TYPE: ValueType = ValueType::$vt;

      #[inline]
      fn write_native(&self, buf: &mut [u8]) {
        buf[..Self::SIZE].copy_from_slice(&self.to_ne_bytes());
      }
      #[inline]
      fn read_native(buf: &[u8]) -> Self {
        let mut raw = [0u8; mem::size_of::<$ty>()];
        raw.copy_from_slice(&buf[..Self::SIZE]);
        <$ty>::from_ne_bytes(raw)
      }
    }
  )+};
}
scalar!(
  i8 => Int8, i16 => Int16, i32 => Int32, i64 => Int64,
  u8 => UInt8, u16 => UInt16, u32 => UInt32, u64 => UInt64,
  f32 => Float, f64 => Double
);

impl Scalar for NativeHandle {
  const TYPE: ValueType = ValueType::Handle;
  const IS_HANDLE: bool = true;

  fn write_native(&self, buf: &mut [u8]) {
    buf[..Self::SIZE].copy_from_slice(&self.addr().to_ne_bytes());
  }
  fn read_native(buf: &[u8]) -> Self {
    let mut raw = [0u8; mem::size_of::<usize>()];
    raw.copy_from_slice(&buf[..Self::SIZE]);
    NativeHandle::from_addr(usize::from_ne_bytes(raw))
  }
}

//-------------------------------------------------------------------------------------------------
/// Тип Rust, который при передаче в базу транслируется в один нативный скалярный тип.
/// Трансляция выполняется на границе: непосредственно перед выполнением выражения и сразу после него.
pub trait Adapt: Send + 'static {
  /// Тип значения, сообщаемый нативной библиотеке при связывании.
  const TYPE: ValueType;
  /// Нативное представление.
  type Native: Scalar;

  /// Преобразует значение в нативное представление.
  fn to_native(&self) -> Self::Native;
  /// Восстанавливает значение из нативного представления.
  fn from_native(native: Self::Native) -> Result<Self> where Self: Sized;
}

macro_rules! identity {
  ($($ty:ty),+) => {$(
    impl Adapt for $ty {
      const TYPE: ValueType = <$ty as Scalar>::TYPE;
      type Native = $ty;

      #[inline]
      fn to_native(&self) -> $ty { *self }
      #[inline]
      fn from_native(native: $ty) -> Result<Self> { Ok(native) }
    }
  )+};
}
identity!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, NativeHandle);

impl Adapt for bool {
  const TYPE: ValueType = ValueType::Bool;
  type Native = i32;

  #[inline]
  fn to_native(&self) -> i32 { *self as i32 }
  #[inline]
  fn from_native(native: i32) -> Result<Self> { Ok(native != 0) }
}

//-------------------------------------------------------------------------------------------------
/// Тип переменной длины. Для значений таких типов выделяется буфер объявленного размера плюс
/// один байт под завершающий ноль.
pub trait VarLen: Send + 'static {
  /// Тип значения, сообщаемый нативной библиотеке при связывании.
  const TYPE: ValueType;

  /// Длина нативного представления в байтах.
  fn len(&self) -> usize;
  /// Записывает значение в буфер, усекая его, если оно не помещается. Незанятая часть буфера
  /// заполняется нулями. Возвращает количество записанных байт.
  fn write_native(&self, buf: &mut [u8]) -> usize;
  /// Восстанавливает значение из фактически полученных байт.
  fn read_native(buf: &[u8]) -> Result<Self> where Self: Sized;
}
impl VarLen for String {
  const TYPE: ValueType = ValueType::String;

  #[inline]
  fn len(&self) -> usize { String::len(self) }
  fn write_native(&self, buf: &mut [u8]) -> usize {
    let mut n = self.len().min(buf.len());
    // Многобайтовый символ не разрезается
    while !self.is_char_boundary(n) {
      n -= 1;
    }
    buf[..n].copy_from_slice(&self.as_bytes()[..n]);
    for b in &mut buf[n..] { *b = 0; }
    n
  }
  fn read_native(buf: &[u8]) -> Result<Self> {
    str::from_utf8(buf).map(str::to_owned).map_err(|_| Error::Conversion(ValueType::String))
  }
}
impl VarLen for Vec<u8> {
  const TYPE: ValueType = ValueType::Raw;

  #[inline]
  fn len(&self) -> usize { Vec::len(self) }
  fn write_native(&self, buf: &mut [u8]) -> usize {
    let n = self.len().min(buf.len());
    buf[..n].copy_from_slice(&self[..n]);
    for b in &mut buf[n..] { *b = 0; }
    n
  }
  fn read_native(buf: &[u8]) -> Result<Self> {
    Ok(buf.to_vec())
  }
}

//-------------------------------------------------------------------------------------------------
/// Элемент связываемого вектора. Элементы размещаются в нативном буфере с фиксированным шагом
/// [`stride`](#tymethod.stride), элемент `i` находится по смещению `i * stride`.
pub trait Element: Send + 'static {
  /// Тип значения, сообщаемый нативной библиотеке при связывании.
  const TYPE: ValueType;
  /// Является ли элемент ссылкой на нативный хендл.
  const IS_HANDLE: bool = false;

  /// Шаг элементов в буфере для объявленного максимального размера элемента `size`.
  /// Для типов фиксированной длины размер игнорируется.
  fn stride(size: usize) -> usize;
  /// Длина значения, используемая для вычисления размера, если он не задан явно.
  fn len(&self) -> usize;
  /// Записывает элемент в ячейку буфера, возвращает фактический размер данных.
  fn write_elem(&self, cell: &mut [u8]) -> Result<usize>;
  /// Читает элемент из ячейки, усеченной до фактического размера данных.
  fn read_elem(cell: &[u8]) -> Result<Self> where Self: Sized;
}

macro_rules! adapted_element {
  ($($ty:ty),+) => {$(
    impl Element for $ty {
      const TYPE: ValueType = <$ty as Adapt>::TYPE;
      const IS_HANDLE: bool = <<$ty as Adapt>::Native as Scalar>::IS_HANDLE;

      #[inline]
      fn stride(_: usize) -> usize { <<$ty as Adapt>::Native as Scalar>::SIZE }
      #[inline]
      fn len(&self) -> usize { <<$ty as Adapt>::Native as Scalar>::SIZE }
      fn write_elem(&self, cell: &mut [u8]) -> Result<usize> {
        self.to_native().write_native(cell);
        Ok(<<$ty as Adapt>::Native as Scalar>::SIZE)
      }
      fn read_elem(cell: &[u8]) -> Result<Self> {
        <$ty as Adapt>::from_native(Scalar::read_native(cell))
      }
    }
  )+};
}
adapted_element!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, bool, NativeHandle);
#[cfg(feature = "with-chrono")]
adapted_element!(::chrono::NaiveDateTime);

macro_rules! var_element {
  ($($ty:ty),+) => {$(
    impl Element for $ty {
      const TYPE: ValueType = <$ty as VarLen>::TYPE;

      #[inline]
      fn stride(size: usize) -> usize { size + 1 }
      #[inline]
      fn len(&self) -> usize { VarLen::len(self) }
      fn write_elem(&self, cell: &mut [u8]) -> Result<usize> {
        // Последний байт ячейки зарезервирован под терминатор
        let capacity = cell.len().saturating_sub(1);
        let n = VarLen::write_native(self, &mut cell[..capacity]);
        if let Some(last) = cell.last_mut() {
          *last = 0;
        }
        Ok(n)
      }
      fn read_elem(cell: &[u8]) -> Result<Self> {
        <$ty as VarLen>::read_native(cell)
      }
    }
  )+};
}
var_element!(String, Vec<u8>);

//-------------------------------------------------------------------------------------------------
/// Переменная приложения, связываемая с выражением. Объект связывания хранит копию этой переменной
/// и читает из нее данные перед выполнением выражения, а после выполнения записывает в нее результат.
pub struct HostVar<T>(Arc<Mutex<T>>);

impl<T> HostVar<T> {
  /// Создает переменную с указанным значением.
  pub fn new(value: T) -> Self {
    HostVar(Arc::new(Mutex::new(value)))
  }
  /// Блокирует переменную для чтения или изменения значения.
  #[inline]
  pub fn lock(&self) -> MutexGuard<T> {
    self.0.lock()
  }
  /// Устанавливает новое значение переменной.
  pub fn set(&self, value: T) {
    *self.0.lock() = value;
  }
  /// Устанавливает новое значение переменной, возвращая старое.
  pub fn replace(&self, value: T) -> T {
    mem::replace(&mut *self.0.lock(), value)
  }
}
impl<T: Clone> HostVar<T> {
  /// Получает копию текущего значения переменной.
  pub fn get(&self) -> T {
    self.0.lock().clone()
  }
}
impl<T> Clone for HostVar<T> {
  fn clone(&self) -> Self { HostVar(self.0.clone()) }
}
impl<T: Default> Default for HostVar<T> {
  fn default() -> Self { HostVar::new(T::default()) }
}
impl<T> From<T> for HostVar<T> {
  fn from(value: T) -> Self { HostVar::new(value) }
}
impl<T: fmt::Debug> fmt::Debug for HostVar<T> {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    fmt.debug_tuple("HostVar").field(&*self.0.lock()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn string_is_truncated_at_char_boundary() {
    let s = String::from("привет");
    let mut buf = [0xFFu8; 5];
    assert_eq!(VarLen::write_native(&s, &mut buf), 4);
    assert_eq!(&buf, &[0xD0, 0xBF, 0xD1, 0x80, 0]);
  }

  #[test]
  fn var_element_reserves_terminator() {
    let mut cell = [0xFFu8; 4];
    let n = "abcdef".to_owned().write_elem(&mut cell).expect("Can't write element");
    assert_eq!(n, 3);
    assert_eq!(&cell, b"abc\0");
    assert_eq!(String::stride(3), 4);
  }

  #[test]
  fn var_element_clears_terminator_of_reused_cell() {
    let mut cell = [0xFFu8; 4];
    let n = vec![1u8, 2, 3, 4, 5].write_elem(&mut cell).expect("Can't write element");
    assert_eq!(n, 3);
    assert_eq!(&cell, &[1, 2, 3, 0]);

    let mut empty: [u8; 0] = [];
    assert_eq!(String::new().write_elem(&mut empty).expect("Can't write empty cell"), 0);
  }

  #[test]
  fn bool_is_nonzero_integer() {
    assert_eq!(true.to_native(), 1);
    assert_eq!(false.to_native(), 0);
    assert_eq!(bool::from_native(-7).expect("Can't adapt"), true);
    assert_eq!(bool::from_native(0).expect("Can't adapt"), false);
  }

  #[test]
  fn handle_round_trips_through_buffer() {
    let h = NativeHandle::from_addr(0xDEAD0);
    let mut buf = [0u8; 16];
    h.write_native(&mut buf);
    assert_eq!(NativeHandle::read_native(&buf), h);
  }

  #[test]
  fn null_converts_to_none() {
    assert_eq!(Option::<String>::from_value(&Value::Null).expect("Can't convert"), None);
    assert!(String::from_value(&Value::Null).is_err());
  }
}
