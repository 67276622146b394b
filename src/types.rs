//! Перечисления, описывающие режимы работы, виды хендлов и типы значений.

/// Режим создания окружения. Влияет на дисциплину блокировок внутренних структур библиотеки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum CreateMode {
  /// Однопоточный режим, значение по умолчанию.
  Default                   = 0,
  /// Uses threaded environment. Internal data structures not exposed to the user are protected from concurrent
  /// accesses by multiple threads.
  Threaded                  = 1 << 0,
  /// Uses object features.
  Object                    = 1 << 1,
  /// Uses publish-subscribe notifications.
  Events                    = 1 << 2,
}
impl Default for CreateMode {
  fn default() -> Self { CreateMode::Default }
}
impl CreateMode {
  /// Возвращает `true`, если окружение должно быть защищено от одновременного доступа из нескольких потоков.
  #[inline]
  pub fn is_threaded(self) -> bool {
    self as u32 & CreateMode::Threaded as u32 != 0
  }
}

/// Вид нативного хендла. Используется для диагностики и передается в примитивы создания и разрушения.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
  /// Окружение, корень дерева хендлов.
  Environment,
  /// Соединение с базой данных.
  Connection,
  /// Подготовленное выражение.
  Statement,
  /// Выборка, полученная при выполнении выражения.
  Resultset,
  /// Большой объект.
  Lob,
  /// Экземпляр пользовательского типа.
  Object,
}

/// Направление передачи данных через связанную переменную.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
  /// Переменная только передает данные в выражение.
  In,
  /// Переменная только получает данные из выражения.
  Out,
  /// Переменная и передает, и получает данные.
  InOut,
}
impl Default for Direction {
  fn default() -> Self { Direction::In }
}
impl Direction {
  /// Включает ли направление передачу данных в выражение.
  #[inline]
  pub fn is_in(self) -> bool { self != Direction::Out }
  /// Включает ли направление получение данных из выражения.
  #[inline]
  pub fn is_out(self) -> bool { self != Direction::In }
}

/// Дисциплина связывания массивов.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorKind {
  /// Массив для пакетного выполнения DML. Количество элементов определяется размером массива
  /// связывания выражения.
  Regular,
  /// PL/SQL таблица. Количество элементов определяется длиной вектора на момент связывания.
  PlSqlTable,
}
impl Default for VectorKind {
  fn default() -> Self { VectorKind::Regular }
}

/// Режим выборки данных.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchMode {
  /// Курсор может двигаться только вперед.
  ForwardOnly,
  /// Курсор может перемещаться в произвольном направлении.
  Scrollable,
}
impl Default for FetchMode {
  fn default() -> Self { FetchMode::ForwardOnly }
}

/// Способ позиционирования прокручиваемого курсора.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeekMode {
  /// Смещение задает номер строки (нумерация с 1).
  Absolute,
  /// Смещение задается относительно текущей строки.
  Relative,
}

/// Глубина разбора выражения при подготовке.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrepareMode {
  /// Только подготовка на клиенте.
  Prepare,
  /// Подготовка и разбор на сервере.
  Parse,
  /// Подготовка, разбор и получение описания списка выбора.
  Describe,
}

/// Атрибуты хендлов, которыми ядро обменивается с нативной библиотекой.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attr {
  /// Адрес базы и имя сервиса.
  DbLink,
  /// Имя пользователя.
  Username,
  /// Пароль пользователя.
  Password,
  /// Признак внешней аутентификации.
  ExternalAuth,
  /// Строка с описанием версии сервера.
  ServerVersion,
  /// Таймаут вызова, в миллисекундах.
  CallTimeout,
  /// Таймаут отправки данных по сети, в миллисекундах.
  SendTimeout,
  /// Таймаут получения данных по сети, в миллисекундах.
  ReceiveTimeout,
  /// Количество итераций пакетного выполнения.
  BindArraySize,
  /// Режим выборки (прокручиваемый курсор или нет).
  FetchMode,
  /// Количество строк, затронутых последним выполнением.
  RowCount,
}

/// Тип значения, которым обмениваются с базой данных. Закрытый набор вариантов,
/// через который проходят все операции связывания и получения данных.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
  /// Логическое значение, в нативном представлении -- 32-битное целое.
  Bool,
  /// `i8`
  Int8,
  /// `i16`
  Int16,
  /// `i32`
  Int32,
  /// `i64`
  Int64,
  /// `u8`
  UInt8,
  /// `u16`
  UInt16,
  /// `u32`
  UInt32,
  /// `u64`
  UInt64,
  /// `f32`
  Float,
  /// `f64`
  Double,
  /// Строка переменной длины.
  String,
  /// Массив байт переменной длины.
  Raw,
  /// Дата и время, в нативном представлении -- микросекунды от начала эпохи.
  DateTime,
  /// Ссылка на другой нативный хендл.
  Handle,
}
impl ValueType {
  /// Имеет ли тип переменную длину.
  #[inline]
  pub fn is_variable(self) -> bool {
    match self {
      ValueType::String | ValueType::Raw => true,
      _ => false,
    }
  }
  /// Размер нативного представления для типов фиксированной длины.
  pub fn size(self) -> Option<usize> {
    use std::mem::size_of;
    Some(match self {
      ValueType::Bool   => size_of::<i32>(),
      ValueType::Int8   | ValueType::UInt8  => 1,
      ValueType::Int16  | ValueType::UInt16 => 2,
      ValueType::Int32  | ValueType::UInt32 | ValueType::Float => 4,
      ValueType::Int64  | ValueType::UInt64 | ValueType::Double | ValueType::DateTime => 8,
      ValueType::Handle => size_of::<usize>(),
      ValueType::String | ValueType::Raw => return None,
    })
  }
}

/// Событие переключения соединения на резервный сервер.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailoverEvent {
  /// Соединение потеряно, начато переключение.
  Begin,
  /// Переключение успешно завершено.
  End,
  /// Переключение невозможно.
  Abort,
  /// Пользователь повторно аутентифицирован.
  Reauth,
  /// Попытка переключения неудачна, может быть повторена.
  Error,
}

/// Ответ обработчика события переключения.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailoverReply {
  /// Продолжить обычным образом.
  Ok,
  /// Повторить попытку переключения.
  Retry,
}
impl Default for FailoverReply {
  fn default() -> Self { FailoverReply::Ok }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn direction_flags() {
    assert!(Direction::In.is_in() && !Direction::In.is_out());
    assert!(!Direction::Out.is_in() && Direction::Out.is_out());
    assert!(Direction::InOut.is_in() && Direction::InOut.is_out());
  }

  #[test]
  fn threaded_mode() {
    assert!(CreateMode::Threaded.is_threaded());
    assert!(!CreateMode::Default.is_threaded());
    assert!(!CreateMode::Events.is_threaded());
  }
}
