//! Хранилище объектов связывания выражения и прочее состояние, прикрепляемое к хендлу выражения.

use std::fmt;

use crate::Result;
use crate::types::FetchMode;

use super::bind::{BindCtx, BindObject};

/// Упорядоченный набор объектов связывания одного выражения.
#[derive(Default)]
pub struct BindsHolder {
  binds: Vec<Box<dyn BindObject>>,
}
impl BindsHolder {
  /// Добавляет объект в конец набора. Если повторное связывание разрешено, предварительно удаляет
  /// объект с тем же именем, если он есть. Возвращает удаленный объект.
  pub fn add(&mut self, obj: Box<dyn BindObject>, allow_rebinding: bool) -> Option<Box<dyn BindObject>> {
    let old = if allow_rebinding {
      self.binds.iter().position(|b| b.name() == obj.name()).map(|i| self.binds.remove(i))
    } else {
      None
    };
    self.binds.push(obj);
    old
  }
  /// Копирует входные данные всех объектов в порядке их добавления.
  pub fn set_in_data(&mut self, ctx: &BindCtx) -> Result<()> {
    for b in &mut self.binds {
      b.set_in_data(ctx).map_err(|e| e.with_bind(b.name()))?;
    }
    Ok(())
  }
  /// Копирует выходные данные всех объектов в порядке их добавления.
  pub fn set_out_data(&mut self, ctx: &BindCtx) -> Result<()> {
    for b in &mut self.binds {
      b.set_out_data(ctx).map_err(|e| e.with_bind(b.name()))?;
    }
    Ok(())
  }
  /// Удаляет все объекты.
  pub fn clear(&mut self) {
    self.binds.clear();
  }
  /// Объект, связанный с переменной с указанным именем.
  pub fn get(&self, name: &str) -> Option<&dyn BindObject> {
    self.binds.iter().find(|b| b.name() == name).map(|b| &**b)
  }
  /// Количество объектов.
  pub fn len(&self) -> usize {
    self.binds.len()
  }
  /// Пуст ли набор.
  pub fn is_empty(&self) -> bool {
    self.binds.is_empty()
  }
  /// Имена связанных переменных в порядке связывания.
  pub fn names(&self) -> Vec<String> {
    self.binds.iter().map(|b| b.name().to_owned()).collect()
  }
}
impl fmt::Debug for BindsHolder {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    fmt.debug_list().entries(self.binds.iter()).finish()
  }
}

/// Стадия жизненного цикла выражения.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
  /// Текст выражения еще не задан.
  Closed,
  /// Выражение подготовлено на клиенте.
  Prepared,
  /// Выражение разобрано сервером.
  Parsed,
  /// Получено описание списка выбора.
  Described,
  /// Выражение выполнено.
  Executed,
}

/// Данные выражения, хранящиеся вместе с его хендлом и освобождаемые вместе с ним.
#[derive(Debug)]
pub struct StatementData {
  /// Объекты связывания.
  pub binds: BindsHolder,
  /// Стадия жизненного цикла.
  pub status: Status,
  /// Текст последнего подготовленного выражения.
  pub sql: Option<String>,
  /// Разрешено ли повторное связывание переменной с тем же именем.
  pub allow_rebinding: bool,
  /// Количество итераций выполнения.
  pub array_size: usize,
  /// Размер массива на момент первого связывания, больше которого массив нельзя увеличить,
  /// пока есть связанные переменные.
  pub initial_array_size: usize,
  /// Режим выборки.
  pub fetch_mode: FetchMode,
}
impl Default for StatementData {
  fn default() -> Self {
    StatementData {
      binds: BindsHolder::default(),
      status: Status::Closed,
      sql: None,
      allow_rebinding: false,
      array_size: 1,
      initial_array_size: 1,
      fetch_mode: FetchMode::default(),
    }
  }
}
impl StatementData {
  /// Сбрасывает состояние перед подготовкой нового текста.
  pub fn reset(&mut self, sql: &str) {
    self.binds.clear();
    self.sql = Some(sql.to_owned());
    self.status = Status::Closed;
    self.array_size = 1;
    self.initial_array_size = 1;
  }
}

#[cfg(test)]
mod tests {
  use crate::convert::HostVar;
  use crate::types::Direction;
  use super::super::bind::BindTypeAdaptor;
  use super::*;

  fn obj(name: &str, value: i32) -> Box<dyn BindObject> {
    Box::new(BindTypeAdaptor::new(name.into(), HostVar::new(value), Direction::In))
  }

  #[test]
  fn rebinding_replaces_and_moves_to_end() {
    let mut holder = BindsHolder::default();
    holder.add(obj(":a", 1), true);
    holder.add(obj(":b", 2), true);
    let old = holder.add(obj(":a", 3), true);
    assert_eq!(old.map(|o| o.name().to_owned()), Some(":a".to_owned()));
    assert_eq!(holder.names(), vec![":b".to_owned(), ":a".to_owned()]);
  }

  #[test]
  fn without_rebinding_objects_accumulate() {
    let mut holder = BindsHolder::default();
    holder.add(obj(":a", 1), false);
    assert!(holder.add(obj(":a", 2), false).is_none());
    assert_eq!(holder.len(), 2);
    holder.clear();
    assert!(holder.is_empty());
  }

  #[test]
  fn status_is_ordered() {
    assert!(Status::Closed < Status::Prepared);
    assert!(Status::Described < Status::Executed);
  }
}
