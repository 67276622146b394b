//! Реестр пользовательских обработчиков, которые нативная библиотека вызывает асинхронно,
//! передавая только свой хендл (переключение на резервный сервер, уведомления и т.п.).

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::NativeHandle;
use super::sync::{Guarded, SyncGuard, SyncMode};

type Entry = Arc<dyn Any + Send + Sync>;

/// Отображение нативного хендла на пользовательские данные произвольного типа. Ни одна операция
/// реестра не завершается ошибкой: для нулевого хендла все они ничего не делают, а отсутствие
/// записи не является ошибкой.
pub struct CallbackRegistry {
  entries: Guarded<HashMap<NativeHandle, Entry>>,
}
impl CallbackRegistry {
  /// Создает пустой реестр, подчиняющийся указанной дисциплине блокировок.
  pub fn new(guard: Arc<SyncGuard>) -> Self {
    CallbackRegistry { entries: Guarded::new(guard, HashMap::new()) }
  }
  /// Запоминает значение для хендла, заменяя предыдущее. Передача `None` удаляет запись.
  pub fn set<T: Any + Send + Sync>(&self, key: NativeHandle, value: Option<T>) {
    if key.is_null() {
      return;
    }
    match value {
      Some(value) => { self.entries.with(|map| map.insert(key, Arc::new(value))); },
      None => { self.remove(key); },
    }
  }
  /// Получает значение, зарегистрированное для хендла. Если записи нет, или она другого типа, возвращает `None`.
  pub fn get<T: Any + Send + Sync>(&self, key: NativeHandle) -> Option<Arc<T>> {
    if key.is_null() {
      return None;
    }
    self.entries.with(|map| map.get(&key).cloned())
      .and_then(|entry| entry.downcast::<T>().ok())
  }
  /// Удаляет запись для хендла. Возвращает `true`, если запись существовала.
  pub fn remove(&self, key: NativeHandle) -> bool {
    if key.is_null() {
      return false;
    }
    self.entries.with(|map| map.remove(&key).is_some())
  }
  /// Количество записей в реестре.
  pub fn len(&self) -> usize {
    self.entries.with(|map| map.len())
  }
  /// Пуст ли реестр.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
  /// Удаляет все записи.
  pub fn clear(&self) {
    self.entries.with(|map| map.clear())
  }
  /// Режим блокировок, в котором сейчас работает реестр.
  pub fn mode(&self) -> SyncMode {
    self.entries.mode()
  }
}
impl fmt::Debug for CallbackRegistry {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    fmt.debug_struct("CallbackRegistry")
       .field("mode", &self.mode())
       .field("len", &self.len())
       .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn registry(mode: SyncMode) -> CallbackRegistry {
    CallbackRegistry::new(Arc::new(SyncGuard::new(mode)))
  }

  #[test]
  fn typed_lookup() {
    for &mode in &[SyncMode::Safe, SyncMode::Unsafe] {
      let reg = registry(mode);
      let key = NativeHandle::from_addr(0x10);
      reg.set(key, Some(42u32));
      assert_eq!(reg.get::<u32>(key).map(|v| *v), Some(42));
      assert!(reg.get::<String>(key).is_none());
      reg.set(key, Some(7u32));
      assert_eq!(reg.get::<u32>(key).map(|v| *v), Some(7));
      reg.set::<u32>(key, None);
      assert!(reg.get::<u32>(key).is_none());
      assert!(reg.is_empty());
    }
  }

  #[test]
  fn null_key_is_ignored() {
    let reg = registry(SyncMode::Safe);
    reg.set(NativeHandle::null(), Some(1u8));
    assert!(reg.is_empty());
    assert!(reg.get::<u8>(NativeHandle::null()).is_none());
    assert!(!reg.remove(NativeHandle::null()));
  }
}
