//! Переключаемая дисциплина блокировок для разделяемых структур окружения.
//!
//! Режим выбирается один раз при создании окружения (по флагу [`Threaded`][1]) и еще раз при его
//! очистке, когда он принудительно возвращается в [`Unsafe`](enum.SyncMode.html#variant.Unsafe).
//!
//! [1]: ../../types/enum.CreateMode.html#variant.Threaded

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::warn;
use parking_lot::Mutex;

/// Дисциплина блокировок.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncMode {
  /// Каждый доступ к защищаемым данным выполняется под блокировкой.
  Safe,
  /// Окружение однопоточное, блокировка не ожидается. Если она все же оказывается занятой,
  /// это нарушение контракта окружения: о нем пишется предупреждение, после чего доступ
  /// все равно сериализуется.
  Unsafe,
}

/// Разделяемый объект, задающий режим блокировок для всех [`Guarded`](struct.Guarded.html) значений окружения.
#[derive(Debug)]
pub struct SyncGuard {
  safe: AtomicBool,
  /// Количество обнаруженных одновременных обращений в режиме `Unsafe`.
  contended: AtomicUsize,
}
impl SyncGuard {
  /// Создает объект в указанном режиме.
  pub fn new(mode: SyncMode) -> Self {
    SyncGuard { safe: AtomicBool::new(mode == SyncMode::Safe), contended: AtomicUsize::new(0) }
  }
  /// Текущий режим.
  #[inline]
  pub fn mode(&self) -> SyncMode {
    if self.safe.load(Ordering::Acquire) { SyncMode::Safe } else { SyncMode::Unsafe }
  }
  /// Перенацеливает объект на новый режим.
  pub fn set_mode(&self, mode: SyncMode) {
    self.safe.store(mode == SyncMode::Safe, Ordering::Release);
  }
  /// Сколько раз в однопоточном режиме было обнаружено одновременное обращение.
  pub fn contended(&self) -> usize {
    self.contended.load(Ordering::Relaxed)
  }
}
impl Default for SyncGuard {
  fn default() -> Self { SyncGuard::new(SyncMode::Unsafe) }
}

/// Данные, доступ к которым выполняется по правилам общего [`SyncGuard`](struct.SyncGuard.html).
#[derive(Debug)]
pub struct Guarded<T> {
  guard: Arc<SyncGuard>,
  data: Mutex<T>,
}
impl<T> Guarded<T> {
  /// Оборачивает данные.
  pub fn new(guard: Arc<SyncGuard>, data: T) -> Self {
    Guarded { guard, data: Mutex::new(data) }
  }
  /// Выполняет функцию над данными с учетом текущего режима.
  pub fn with<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R {
    match self.guard.mode() {
      SyncMode::Safe => f(&mut *self.data.lock()),
      SyncMode::Unsafe => match self.data.try_lock() {
        Some(mut data) => f(&mut *data),
        None => {
          self.guard.contended.fetch_add(1, Ordering::Relaxed);
          warn!("concurrent access to a structure of single-threaded environment, create environment with CreateMode::Threaded");
          f(&mut *self.data.lock())
        },
      },
    }
  }
  /// Режим, в котором сейчас работает значение.
  #[inline]
  pub fn mode(&self) -> SyncMode {
    self.guard.mode()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::mpsc;
  use std::thread;

  use super::*;

  #[test]
  fn mode_is_retargeted() {
    let guard = Arc::new(SyncGuard::new(SyncMode::Safe));
    let value = Guarded::new(guard.clone(), 0);
    assert_eq!(value.mode(), SyncMode::Safe);
    guard.set_mode(SyncMode::Unsafe);
    assert_eq!(value.mode(), SyncMode::Unsafe);
    value.with(|v| *v += 1);
    assert_eq!(value.with(|v| *v), 1);
    assert_eq!(guard.contended(), 0);
  }

  #[test]
  fn unsafe_mode_reports_contention_and_serializes() {
    let guard = Arc::new(SyncGuard::new(SyncMode::Unsafe));
    let value = Arc::new(Guarded::new(guard.clone(), 0));
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let holder = {
      let value = value.clone();
      thread::spawn(move || value.with(|v| {
        locked_tx.send(()).expect("Can't signal lock");
        release_rx.recv().expect("Can't wait for release");
        *v += 1;
      }))
    };
    locked_rx.recv().expect("Lock holder is gone");
    let intruder = {
      let value = value.clone();
      thread::spawn(move || value.with(|v| *v += 1))
    };
    // Второй поток обнаруживает занятую блокировку до того, как начнет ее ждать
    while guard.contended() == 0 {
      thread::yield_now();
    }
    release_tx.send(()).expect("Can't release lock");
    holder.join().expect("Thread panicked");
    intruder.join().expect("Thread panicked");

    assert_eq!(guard.contended(), 1);
    assert_eq!(value.with(|v| *v), 2);
  }
}
