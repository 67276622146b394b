//! Умный хендл: подсчет ссылок на нативный ресурс с каскадным освобождением подчиненных хендлов.
//!
//! Хендлы образуют дерево. Родитель владеет списком детей, ребенок ссылается на родителя только
//! слабой ссылкой, поэтому циклов владения не возникает. Освобождение родителя сначала освобождает
//! всех детей (рекурсивно, начиная с самых глубоких), и только потом разрушает собственный
//! нативный ресурс.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::{debug, trace, warn};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::Result;
use crate::error::Error;
use crate::types::HandleKind;

use super::{Env, NativeHandle};
use super::last_error;

/// Функция, вызываемая при освобождении хендла, перед разрушением нативного ресурса.
pub type ReleaseFn = Box<dyn FnOnce(&HandleRef) + Send>;
type Extra = Option<Box<dyn Any + Send>>;

//-------------------------------------------------------------------------------------------------
struct Node {
  native: NativeHandle,
  kind: HandleKind,
  /// Владеет ли хендл нативным ресурсом, т.е. надо ли его разрушать при освобождении.
  allocated: bool,
  /// Количество оберток `SmartHandle`, ссылающихся на узел.
  holders: AtomicUsize,
  /// Единственный признак того, что хендл уже освобожден.
  released: AtomicBool,
  parent: Mutex<Weak<Node>>,
  children: Mutex<Vec<Arc<Node>>>,
  on_release: Mutex<Option<ReleaseFn>>,
  extra: Mutex<Extra>,
  env: Env,
}
impl Node {
  /// Освобождает узел. Возвращает `false`, если узел уже был освобожден.
  fn release(self: &Arc<Self>) -> bool {
    if self.released.swap(true, Ordering::AcqRel) {
      return false;
    }
    // Дети освобождаются раньше родителя и отвязываются от всех своих оберток
    let children = mem::take(&mut *self.children.lock());
    for child in &children {
      *child.parent.lock() = Weak::new();
      child.release();
    }
    let parent = mem::replace(&mut *self.parent.lock(), Weak::new()).upgrade();
    if let Some(parent) = parent {
      parent.children.lock().retain(|c| !Arc::ptr_eq(c, self));
    }
    self.env.store().remove(self.native, self);

    let on_release = self.on_release.lock().take();
    if let Some(f) = on_release {
      f(&HandleRef { node: self });
    }
    if self.allocated {
      let native = self.env.native();
      if native.destroy(self.kind, self.native) {
        debug!("{:?} {:?} destroyed", self.kind, self.native);
      } else {
        // Из деструктора ошибку вернуть нельзя
        warn!("Can't destroy {:?} {:?}: {}", self.kind, self.native, last_error(native));
      }
    } else {
      trace!("{:?} {:?} detached", self.kind, self.native);
    }
    true
  }
  #[inline]
  fn is_released(&self) -> bool {
    self.released.load(Ordering::Acquire)
  }
  fn acquire(self: &Arc<Self>) -> SmartHandle {
    self.holders.fetch_add(1, Ordering::AcqRel);
    SmartHandle { node: Some(self.clone()) }
  }
}
impl fmt::Debug for Node {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    fmt.debug_struct("Node")
       .field("native", &self.native)
       .field("kind", &self.kind)
       .field("allocated", &self.allocated)
       .field("holders", &self.holders.load(Ordering::Relaxed))
       .field("released", &self.is_released())
       .finish()
  }
}

//-------------------------------------------------------------------------------------------------
/// Отображение нативных хендлов на живые узлы. Позволяет повторно обернуть уже обернутый хендл,
/// получив ту же самую запись со счетчиком ссылок, а не вторую независимую.
#[derive(Default)]
pub struct HandleStore {
  nodes: Mutex<HashMap<NativeHandle, Weak<Node>>>,
}
impl HandleStore {
  fn find(&self, native: NativeHandle) -> Option<Arc<Node>> {
    self.nodes.lock()
      .get(&native)
      .and_then(Weak::upgrade)
      .filter(|node| !node.is_released())
  }
  fn insert(&self, node: &Arc<Node>) {
    self.nodes.lock().insert(node.native, Arc::downgrade(node));
  }
  fn remove(&self, native: NativeHandle, node: &Arc<Node>) {
    let mut nodes = self.nodes.lock();
    let same = nodes.get(&native).map_or(false, |n| n.as_ptr() == Arc::as_ptr(node));
    if same {
      nodes.remove(&native);
    }
  }
  /// Количество живых хендлов, известных хранилищу.
  pub fn len(&self) -> usize {
    self.nodes.lock().values().filter(|n| n.strong_count() > 0).count()
  }
  /// Пусто ли хранилище.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
impl fmt::Debug for HandleStore {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    fmt.debug_struct("HandleStore").field("len", &self.len()).finish()
  }
}

//-------------------------------------------------------------------------------------------------
/// Ссылка на освобождаемый хендл, передаваемая в функцию освобождения.
pub struct HandleRef<'a> {
  node: &'a Node,
}
impl<'a> HandleRef<'a> {
  /// Нативный хендл. Ресурс в момент вызова функции освобождения еще не разрушен.
  #[inline]
  pub fn native(&self) -> NativeHandle { self.node.native }
  /// Вид хендла.
  #[inline]
  pub fn kind(&self) -> HandleKind { self.node.kind }
  /// Окружение, в котором создан хендл.
  #[inline]
  pub fn env(&self) -> &Env { &self.node.env }
  /// Забирает дополнительные данные, если они имеют указанный тип.
  pub fn take_extra_infos<T: Any + Send>(&self) -> Option<Box<T>> {
    take_extra(&self.node.extra)
  }
}

fn take_extra<T: Any + Send>(extra: &Mutex<Extra>) -> Option<Box<T>> {
  let mut extra = extra.lock();
  if !extra.as_ref().map_or(false, |e| e.is::<T>()) {
    return None;
  }
  extra.take().and_then(|e| e.downcast::<T>().ok())
}

//-------------------------------------------------------------------------------------------------
/// Обертка над нативным хендлом со счетчиком ссылок.
///
/// Каждая копия (`clone`) увеличивает счетчик, каждое освобождение (`drop` или [`release`](#method.release))
/// уменьшает его. Нативный ресурс разрушается ровно один раз: при переходе счетчика из 1 в 0
/// или при каскадном освобождении родителя. После каскадного освобождения оставшиеся обертки
/// видят нулевой хендл.
///
/// Повторное оборачивание хендла, который уже обернут и еще не освобожден, возвращает копию
/// существующей обертки: ее родитель и признак владения не меняются, а новая функция освобождения
/// не регистрируется. Оборачивать с владением хендл, уже обернутый без владения, нельзя.
pub struct SmartHandle {
  node: Option<Arc<Node>>,
}
impl SmartHandle {
  /// Оборачивает хендл, владение которым переходит к обертке: при освобождении последней копии
  /// нативный ресурс будет разрушен.
  pub fn allocated(env: &Env, native: NativeHandle, kind: HandleKind, parent: Option<&SmartHandle>) -> Result<Self> {
    Self::acquire(env, native, kind, parent, true, None)
  }
  /// То же, что и [`allocated`](#method.allocated), но дополнительно регистрирует функцию, вызываемую
  /// при освобождении хендла перед разрушением нативного ресурса.
  pub fn allocated_with_release(
    env: &Env, native: NativeHandle, kind: HandleKind, parent: Option<&SmartHandle>, on_release: ReleaseFn
  ) -> Result<Self> {
    Self::acquire(env, native, kind, parent, true, Some(on_release))
  }
  /// Оборачивает хендл, которым владеет кто-то другой (например, выборкой владеет выражение).
  /// Связь с родителем регистрируется, но освобождение не разрушает нативный ресурс.
  pub fn transient(env: &Env, native: NativeHandle, kind: HandleKind, parent: Option<&SmartHandle>) -> Result<Self> {
    Self::acquire(env, native, kind, parent, false, None)
  }
  fn acquire(
    env: &Env, native: NativeHandle, kind: HandleKind, parent: Option<&SmartHandle>,
    allocated: bool, on_release: Option<ReleaseFn>
  ) -> Result<Self> {
    if native.is_null() {
      return Err(Error::NullHandle(kind));
    }
    if let Some(node) = env.store().find(native) {
      // Владение не может появиться у хендла, уже обернутого без него: ресурс не был бы разрушен
      if allocated && !node.allocated {
        return Err(Error::invalid_state("acquire", "handle is already wrapped as transient"));
      }
      return Ok(node.acquire());
    }
    let parent = match parent {
      Some(p) => Some(p.live_node().ok_or(Error::NullHandle(p.kind()))?),
      None => None,
    };
    let node = Arc::new(Node {
      native,
      kind,
      allocated,
      holders: AtomicUsize::new(1),
      released: AtomicBool::new(false),
      parent: Mutex::new(parent.map_or_else(Weak::new, Arc::downgrade)),
      children: Mutex::new(Vec::new()),
      on_release: Mutex::new(on_release),
      extra: Mutex::new(None),
      env: env.clone(),
    });
    if let Some(parent) = parent {
      parent.children.lock().push(node.clone());
    }
    env.store().insert(&node);
    trace!("{:?} {:?} acquired (allocated: {})", kind, native, allocated);
    Ok(SmartHandle { node: Some(node) })
  }
  fn live_node(&self) -> Option<&Arc<Node>> {
    self.node.as_ref().filter(|n| !n.is_released())
  }

  /// Нативный хендл, или нулевой хендл, если обертка уже освобождена.
  #[inline]
  pub fn native(&self) -> NativeHandle {
    self.live_node().map_or_else(NativeHandle::null, |n| n.native)
  }
  /// Освобожден ли хендл.
  #[inline]
  pub fn is_null(&self) -> bool {
    self.live_node().is_none()
  }
  /// Вид хендла.
  pub fn kind(&self) -> HandleKind {
    self.node.as_ref().map_or(HandleKind::Environment, |n| n.kind)
  }
  /// Владеет ли обертка нативным ресурсом.
  pub fn is_allocated(&self) -> bool {
    self.node.as_ref().map_or(false, |n| n.allocated)
  }
  /// Количество оберток, ссылающихся на тот же хендл.
  pub fn holders(&self) -> usize {
    self.live_node().map_or(0, |n| n.holders.load(Ordering::Acquire))
  }
  /// Нативный хендл родителя, или нулевой хендл, если родителя нет.
  pub fn parent_native(&self) -> NativeHandle {
    self.live_node()
      .and_then(|n| n.parent.lock().upgrade())
      .map_or_else(NativeHandle::null, |p| p.native)
  }
  /// Количество подчиненных хендлов.
  pub fn children_count(&self) -> usize {
    self.live_node().map_or(0, |n| n.children.lock().len())
  }

  /// Уменьшает счетчик ссылок. Если это была последняя обертка, освобождает хендл вместе со всеми
  /// подчиненными. Повторный вызов ничего не делает.
  pub fn release(&mut self) {
    if let Some(node) = self.node.take() {
      if node.holders.fetch_sub(1, Ordering::AcqRel) == 1 {
        node.release();
      }
    }
  }

  /// Прикрепляет к хендлу дополнительные данные, заменяя предыдущие.
  pub fn set_extra_infos(&self, extra: Box<dyn Any + Send>) -> Result<()> {
    let node = self.live_node().ok_or(Error::NullHandle(self.kind()))?;
    *node.extra.lock() = Some(extra);
    Ok(())
  }
  /// Получает доступ к дополнительным данным, если они есть и имеют указанный тип.
  pub fn extra_infos<T: Any + Send>(&self) -> Option<MappedMutexGuard<T>> {
    let node = self.live_node()?;
    MutexGuard::try_map(node.extra.lock(), |e| e.as_mut().and_then(|b| b.downcast_mut::<T>())).ok()
  }
  /// Забирает дополнительные данные, если они имеют указанный тип.
  pub fn take_extra_infos<T: Any + Send>(&self) -> Option<Box<T>> {
    self.live_node().and_then(|n| take_extra(&n.extra))
  }

  /// Ищет подчиненный хендл, удовлетворяющий условию, и возвращает новую обертку для него.
  pub fn find_child<P: Fn(&HandleRef) -> bool>(&self, predicate: P) -> Option<SmartHandle> {
    let node = self.live_node()?;
    let children = node.children.lock();
    children.iter()
      .find(|c| predicate(&HandleRef { node: c }))
      .map(|c| c.acquire())
  }
  /// Принудительно освобождает все подчиненные хендлы, удовлетворяющие условию, независимо от
  /// количества ссылающихся на них оберток. Возвращает количество освобожденных хендлов.
  pub fn release_children<P: Fn(&HandleRef) -> bool>(&self, predicate: P) -> usize {
    let node = match self.live_node() {
      Some(node) => node,
      None => return 0,
    };
    let found: Vec<_> = node.children.lock().iter()
      .filter(|c| predicate(&HandleRef { node: c }))
      .cloned()
      .collect();
    found.iter().filter(|c| c.release()).count()
  }
}
impl Clone for SmartHandle {
  fn clone(&self) -> Self {
    match self.live_node() {
      Some(node) => node.acquire(),
      None => SmartHandle { node: None },
    }
  }
}
impl Drop for SmartHandle {
  fn drop(&mut self) {
    self.release();
  }
}
impl PartialEq for SmartHandle {
  fn eq(&self, other: &Self) -> bool {
    match (&self.node, &other.node) {
      (Some(a), Some(b)) => Arc::ptr_eq(a, b),
      (None, None) => true,
      _ => false,
    }
  }
}
impl fmt::Debug for SmartHandle {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    match self.node {
      Some(ref node) => fmt.debug_tuple("SmartHandle").field(node).finish(),
      None => fmt.write_str("SmartHandle(released)"),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use crate::ffi::Native;
  use crate::ffi::memory::MemoryNative;
  use crate::params::InitParams;
  use super::*;

  fn setup() -> (Arc<MemoryNative>, Env) {
    let native = Arc::new(MemoryNative::new());
    let env = Env::new(native.clone(), &InitParams::default());
    (native, env)
  }
  fn create(native: &MemoryNative, kind: HandleKind, parent: NativeHandle) -> NativeHandle {
    native.create(kind, parent).expect("Can't create native handle")
  }

  #[test]
  fn rewrapping_shares_counter() {
    let (native, env) = setup();
    let h = create(&native, HandleKind::Connection, NativeHandle::null());
    let a = SmartHandle::allocated(&env, h, HandleKind::Connection, None).expect("Can't wrap handle");
    let b = SmartHandle::transient(&env, h, HandleKind::Connection, None).expect("Can't rewrap handle");
    assert_eq!(a, b);
    assert_eq!(a.holders(), 2);
    drop(a);
    assert!(native.is_alive(h));
    drop(b);
    assert!(!native.is_alive(h));
    assert!(env.store().is_empty());
  }

  #[test]
  fn transient_handle_cant_be_rewrapped_as_owner() {
    let (native, env) = setup();
    let h = create(&native, HandleKind::Resultset, NativeHandle::null());
    let t = SmartHandle::transient(&env, h, HandleKind::Resultset, None).expect("Can't wrap handle");
    let err = SmartHandle::allocated(&env, h, HandleKind::Resultset, None).expect_err("Ownership can't be added");
    assert!(match err { Error::InvalidState { operation: "acquire", .. } => true, _ => false });
    assert_eq!(t.holders(), 1);
    assert!(!t.is_allocated());
  }

  #[test]
  fn null_handle_is_rejected() {
    let (_, env) = setup();
    let err = SmartHandle::allocated(&env, NativeHandle::null(), HandleKind::Statement, None)
      .expect_err("Null handle must be rejected");
    assert!(match err { Error::NullHandle(HandleKind::Statement) => true, _ => false });
  }

  #[test]
  fn extra_infos_are_typed() {
    let (native, env) = setup();
    let h = create(&native, HandleKind::Statement, NativeHandle::null());
    let handle = SmartHandle::allocated(&env, h, HandleKind::Statement, None).expect("Can't wrap handle");
    handle.set_extra_infos(Box::new(vec![1, 2, 3])).expect("Can't set extra infos");
    assert!(handle.extra_infos::<String>().is_none());
    handle.extra_infos::<Vec<i32>>().expect("Extra infos must exist").push(4);
    assert_eq!(handle.take_extra_infos::<Vec<i32>>().map(|b| *b), Some(vec![1, 2, 3, 4]));
    assert!(handle.extra_infos::<Vec<i32>>().is_none());
  }

  #[test]
  fn children_are_found_and_released_by_predicate() {
    let (native, env) = setup();
    let p = create(&native, HandleKind::Statement, NativeHandle::null());
    let parent = SmartHandle::allocated(&env, p, HandleKind::Statement, None).expect("Can't wrap parent");
    let rs = create(&native, HandleKind::Resultset, p);
    let lob = create(&native, HandleKind::Lob, p);
    let rs = SmartHandle::transient(&env, rs, HandleKind::Resultset, Some(&parent)).expect("Can't wrap resultset");
    let lob = SmartHandle::allocated(&env, lob, HandleKind::Lob, Some(&parent)).expect("Can't wrap LOB");
    assert_eq!(parent.children_count(), 2);

    let found = parent.find_child(|h| h.kind() == HandleKind::Lob).expect("Child must be found");
    assert_eq!(found, lob);
    assert_eq!(lob.holders(), 2);

    assert_eq!(parent.release_children(|h| h.kind() == HandleKind::Resultset), 1);
    assert!(rs.is_null());
    assert!(!lob.is_null());
    // Выборка не принадлежит обертке и не разрушается
    assert!(native.destroyed().is_empty());
    assert_eq!(parent.children_count(), 1);
  }
}
