use std::fmt;
use std::sync::Arc;

use crate::params::InitParams;
use crate::types::CreateMode;

use super::Native;
use super::handle::HandleStore;
use super::registry::CallbackRegistry;
use super::sync::{SyncGuard, SyncMode};

struct Inner {
  native: Arc<dyn Native>,
  guard: Arc<SyncGuard>,
  callbacks: CallbackRegistry,
  store: HandleStore,
  mode: CreateMode,
  max_binds: usize,
}

/// Явный контекст процесса: нативная библиотека, реестр обработчиков и дисциплина блокировок.
/// Передается всем объектам, которым он нужен, вместо глобального состояния. Копирование
/// дешево, все копии разделяют одно и то же состояние.
#[derive(Clone)]
pub struct Env {
  inner: Arc<Inner>,
}
impl Env {
  /// Создает контекст. Режим блокировок выбирается по флагу `Threaded` в параметрах.
  pub fn new(native: Arc<dyn Native>, params: &InitParams) -> Self {
    let mode = if params.mode.is_threaded() { SyncMode::Safe } else { SyncMode::Unsafe };
    let guard = Arc::new(SyncGuard::new(mode));
    Env {
      inner: Arc::new(Inner {
        native,
        callbacks: CallbackRegistry::new(guard.clone()),
        guard,
        store: HandleStore::default(),
        mode: params.mode,
        max_binds: params.max_binds,
      }),
    }
  }
  /// Нативная библиотека.
  #[inline]
  pub fn native(&self) -> &dyn Native {
    &*self.inner.native
  }
  /// Реестр пользовательских обработчиков.
  #[inline]
  pub fn callbacks(&self) -> &CallbackRegistry {
    &self.inner.callbacks
  }
  /// Хранилище живых хендлов.
  #[inline]
  pub fn store(&self) -> &HandleStore {
    &self.inner.store
  }
  /// Объект, задающий дисциплину блокировок.
  #[inline]
  pub fn guard(&self) -> &SyncGuard {
    &self.inner.guard
  }
  /// Режим, с которым было создано окружение.
  #[inline]
  pub fn mode(&self) -> CreateMode {
    self.inner.mode
  }
  /// Максимальное количество связанных переменных в одном выражении.
  #[inline]
  pub fn max_binds(&self) -> usize {
    self.inner.max_binds
  }
}
impl fmt::Debug for Env {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    fmt.debug_struct("Env")
       .field("mode", &self.inner.mode)
       .field("sync", &self.inner.guard.mode())
       .field("handles", &self.inner.store)
       .finish()
  }
}
