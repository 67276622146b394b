//! Нативная библиотека, работающая целиком в памяти процесса.
//!
//! Не реализует никакой семантики SQL: результаты выполнения выражений задаются заранее
//! ([`add_resultset`](struct.MemoryNative.html#method.add_resultset)), а изменение выходных
//! переменных моделируется обработчиками ([`on_execute`](struct.MemoryNative.html#method.on_execute)).
//! Зато она запоминает все, что с ней делали: порядок разрушения хендлов, содержимое связанных
//! буферов на момент каждого выполнения, установленные атрибуты. Этого достаточно, чтобы
//! проверять ядро без сервера базы данных.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::slice;

use parking_lot::Mutex;

use crate::convert::{Scalar, Value};
use crate::error::DbError;
use crate::types::{Attr, Direction, HandleKind, PrepareMode, ValueType};

use super::{BindDesc, FetchOp, Native, NativeHandle};

/// Примитив, в который можно внедрить однократный отказ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
  /// [`Native::create`](../trait.Native.html#tymethod.create)
  Create,
  /// [`Native::destroy`](../trait.Native.html#tymethod.destroy)
  Destroy,
  /// [`Native::get_attr`](../trait.Native.html#tymethod.get_attr)
  GetAttr,
  /// [`Native::set_attr`](../trait.Native.html#tymethod.set_attr)
  SetAttr,
  /// [`Native::prepare`](../trait.Native.html#tymethod.prepare)
  Prepare,
  /// [`Native::bind`](../trait.Native.html#tymethod.bind)
  Bind,
  /// [`Native::register`](../trait.Native.html#tymethod.register)
  Register,
  /// Чтение и запись фактического размера данных связанной переменной.
  DataSize,
  /// [`Native::execute`](../trait.Native.html#tymethod.execute)
  Execute,
  /// Получение выборок выражения.
  Resultset,
  /// [`Native::fetch`](../trait.Native.html#tymethod.fetch)
  Fetch,
  /// [`Native::column_value`](../trait.Native.html#tymethod.column_value)
  ColumnValue,
  /// [`Native::break_call`](../trait.Native.html#tymethod.break_call)
  Break,
}

//-------------------------------------------------------------------------------------------------
struct Bound {
  ty: ValueType,
  data: *mut u8,
  elem_size: usize,
  elem_count: usize,
  array_size: usize,
  direction: Direction,
  /// Фактические размеры данных элементов.
  sizes: Vec<usize>,
}
// Буфер принадлежит объекту связывания и живет, пока переменная связана с выражением.
unsafe impl Send for Bound {}

impl Bound {
  fn new(desc: &BindDesc) -> Self {
    let initial = if desc.ty.is_variable() { 0 } else { desc.elem_size };
    Bound {
      ty: desc.ty,
      data: desc.data,
      elem_size: desc.elem_size,
      elem_count: desc.elem_count,
      array_size: desc.array_size,
      direction: desc.direction,
      sizes: vec![initial; desc.elem_count],
    }
  }
  fn cell(&self, pos: usize) -> Option<&[u8]> {
    if pos < 1 || pos > self.elem_count {
      return None;
    }
    Some(unsafe { slice::from_raw_parts(self.data.add((pos - 1) * self.elem_size), self.elem_size) })
  }
  fn cell_mut(&mut self, pos: usize) -> Option<&mut [u8]> {
    if pos < 1 || pos > self.elem_count {
      return None;
    }
    Some(unsafe { slice::from_raw_parts_mut(self.data.add((pos - 1) * self.elem_size), self.elem_size) })
  }
  /// Фактические данные элемента.
  fn data(&self, pos: usize) -> Option<Vec<u8>> {
    let cell = self.cell(pos)?;
    let size = if self.ty.is_variable() { self.sizes[pos - 1].min(cell.len()) } else { cell.len() };
    Some(cell[..size].to_vec())
  }
}

/// Параметры связанной переменной, как их видит нативная библиотека.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindInfo {
  /// Тип значения.
  pub ty: ValueType,
  /// Размер одного элемента.
  pub elem_size: usize,
  /// Количество элементов в буфере.
  pub elem_count: usize,
  /// Максимальная длина PL/SQL таблицы.
  pub array_size: usize,
  /// Направление передачи данных.
  pub direction: Direction,
}

/// Снимок входных данных одного выполнения выражения.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
  /// Текст выражения.
  pub sql: String,
  /// Количество итераций.
  pub iters: usize,
  /// Фактические данные всех элементов каждой связанной переменной.
  pub binds: BTreeMap<String, Vec<Vec<u8>>>,
}
impl Execution {
  /// Данные элементов переменной.
  pub fn get(&self, name: &str) -> Option<&[Vec<u8>]> {
    self.binds.get(name).map(Vec::as_slice)
  }
  /// Элементы переменной фиксированного размера.
  pub fn scalars<T: Scalar>(&self, name: &str) -> Vec<T> {
    self.get(name).map_or_else(Vec::new, |cells| cells.iter().map(|c| T::read_native(c)).collect())
  }
  /// Элементы строковой переменной.
  pub fn strings(&self, name: &str) -> Vec<String> {
    self.get(name).map_or_else(Vec::new, |cells| {
      cells.iter().map(|c| String::from_utf8_lossy(c).into_owned()).collect()
    })
  }
}

/// Доступ обработчика выполнения к связанным буферам. Позиции элементов нумеруются с 1.
pub struct ExecContext<'a> {
  sql: &'a str,
  iters: usize,
  binds: &'a mut Vec<(String, Bound)>,
}
impl<'a> ExecContext<'a> {
  fn bound(&self, name: &str) -> Option<&Bound> {
    self.binds.iter().find(|(n, _)| n == name).map(|(_, b)| b)
  }
  fn bound_mut(&mut self, name: &str) -> Option<&mut Bound> {
    self.binds.iter_mut().find(|(n, _)| n == name).map(|(_, b)| b)
  }
  /// Текст выполняемого выражения.
  pub fn sql(&self) -> &str { self.sql }
  /// Количество итераций выполнения.
  pub fn iters(&self) -> usize { self.iters }
  /// Количество элементов в буфере переменной.
  pub fn elem_count(&self, name: &str) -> Option<usize> {
    self.bound(name).map(|b| b.elem_count)
  }
  /// Читает элемент фиксированного размера.
  pub fn read<T: Scalar>(&self, name: &str, pos: usize) -> Option<T> {
    let cell = self.bound(name)?.cell(pos)?;
    if cell.len() < T::SIZE { None } else { Some(T::read_native(cell)) }
  }
  /// Записывает элемент фиксированного размера.
  pub fn write<T: Scalar>(&mut self, name: &str, pos: usize, value: T) -> bool {
    match self.bound_mut(name).and_then(|b| b.cell_mut(pos)) {
      Some(cell) if cell.len() >= T::SIZE => { value.write_native(cell); true },
      _ => false,
    }
  }
  /// Читает фактические данные элемента.
  pub fn read_bytes(&self, name: &str, pos: usize) -> Option<Vec<u8>> {
    self.bound(name)?.data(pos)
  }
  /// Читает строковый элемент.
  pub fn read_str(&self, name: &str, pos: usize) -> Option<String> {
    self.read_bytes(name, pos).and_then(|b| String::from_utf8(b).ok())
  }
  /// Записывает данные элемента переменной длины, усекая их до размера ячейки без терминатора,
  /// и устанавливает фактический размер.
  pub fn write_bytes(&mut self, name: &str, pos: usize, bytes: &[u8]) -> bool {
    let bound = match self.bound_mut(name) {
      Some(b) => b,
      None => return false,
    };
    let n = match bound.cell_mut(pos) {
      Some(cell) => {
        let n = bytes.len().min(cell.len().saturating_sub(1));
        cell[..n].copy_from_slice(&bytes[..n]);
        for b in &mut cell[n..] { *b = 0; }
        n
      },
      None => return false,
    };
    bound.sizes[pos - 1] = n;
    true
  }
  /// Записывает строковый элемент.
  pub fn write_str(&mut self, name: &str, pos: usize, value: &str) -> bool {
    self.write_bytes(name, pos, value.as_bytes())
  }
}

//-------------------------------------------------------------------------------------------------
type Hook = Box<dyn FnMut(&mut ExecContext) + Send>;

#[derive(Default)]
struct Stmt {
  sql: Option<String>,
  mode: Option<PrepareMode>,
  binds: Vec<(String, Bound)>,
  registered: Vec<(String, ValueType, usize)>,
  resultsets: Vec<NativeHandle>,
  cursor: Option<usize>,
}

struct Rs {
  rows: Vec<Vec<Value>>,
  /// `0` -- перед первой строкой, `rows.len() + 1` -- после последней.
  pos: usize,
}
impl Rs {
  fn fetch(&mut self, op: FetchOp) -> bool {
    let len = self.rows.len() as i64;
    let target = match op {
      FetchOp::Next => self.pos as i64 + 1,
      FetchOp::Prev => self.pos as i64 - 1,
      FetchOp::First => 1,
      FetchOp::Last => len,
      FetchOp::Absolute(n) => n as i64,
      FetchOp::Relative(n) => self.pos as i64 + n as i64,
    };
    if target >= 1 && target <= len {
      self.pos = target as usize;
      true
    } else {
      match op {
        FetchOp::Next => self.pos = self.rows.len() + 1,
        FetchOp::Prev => self.pos = 0,
        _ => {},
      }
      false
    }
  }
}

struct State {
  next: usize,
  handles: HashMap<NativeHandle, HandleKind>,
  destroyed: Vec<(HandleKind, NativeHandle)>,
  attrs: HashMap<(NativeHandle, Attr), Value>,
  stmts: HashMap<NativeHandle, Stmt>,
  rsets: HashMap<NativeHandle, Rs>,
  scripts: HashMap<String, Vec<Vec<Vec<Value>>>>,
  hooks: HashMap<String, Hook>,
  failures: HashMap<Op, DbError>,
  error: Option<DbError>,
  executions: Vec<Execution>,
  breaks: usize,
  server_version: String,
}
impl State {
  /// Начинает выполнение примитива: сбрасывает последнюю ошибку и срабатывает внедренный отказ.
  fn begin(&mut self, op: Op) -> bool {
    self.error = self.failures.remove(&op);
    self.error.is_none()
  }
  fn fail<T>(&mut self, err: DbError) -> Option<T> {
    self.error = Some(err);
    None
  }
  fn alloc(&mut self, kind: HandleKind) -> NativeHandle {
    self.next += 0x10;
    let handle = NativeHandle::from_addr(self.next);
    self.handles.insert(handle, kind);
    handle
  }
  fn drop_resultsets(&mut self, stmt: NativeHandle) {
    let old = match self.stmts.get_mut(&stmt) {
      Some(st) => { st.cursor = None; std::mem::replace(&mut st.resultsets, Vec::new()) },
      None => return,
    };
    for rs in old {
      self.rsets.remove(&rs);
      self.handles.remove(&rs);
    }
  }
  fn prepared(&mut self, stmt: NativeHandle) -> Option<&mut Stmt> {
    match self.stmts.get(&stmt).map(|st| st.sql.is_some()) {
      None => return self.fail(DbError::InvalidHandle),
      Some(false) => return self.fail(DbError::fault(24337, "statement handle not prepared")),
      Some(true) => {},
    }
    self.stmts.get_mut(&stmt)
  }
  fn bound(&mut self, stmt: NativeHandle, name: &str, pos: usize) -> Option<&mut Bound> {
    let found = self.stmts.get(&stmt)
      .and_then(|st| st.binds.iter().find(|(n, _)| n == name))
      .map(|(_, b)| pos >= 1 && pos <= b.elem_count);
    match found {
      None => return self.fail(DbError::fault(1036, "illegal variable name/number")),
      Some(false) => return self.fail(DbError::fault(22165, "given index is out of range")),
      Some(true) => {},
    }
    self.stmts.get_mut(&stmt)
      .and_then(|st| st.binds.iter_mut().find(|(n, _)| n == name))
      .map(|(_, b)| b)
  }
}

/// Нативная библиотека в памяти процесса.
pub struct MemoryNative {
  state: Mutex<State>,
}
impl MemoryNative {
  /// Создает библиотеку, представляющуюся сервером версии `19.3.0.0.0`.
  pub fn new() -> Self {
    MemoryNative {
      state: Mutex::new(State {
        next: 0x1000,
        handles: HashMap::new(),
        destroyed: Vec::new(),
        attrs: HashMap::new(),
        stmts: HashMap::new(),
        rsets: HashMap::new(),
        scripts: HashMap::new(),
        hooks: HashMap::new(),
        failures: HashMap::new(),
        error: None,
        executions: Vec::new(),
        breaks: 0,
        server_version: "19.3.0.0.0".into(),
      }),
    }
  }
  /// Меняет версию сервера, о которой сообщают соединения.
  pub fn set_server_version(&self, version: &str) {
    self.state.lock().server_version = version.into();
  }
  /// Добавляет выборку, которую будет возвращать каждое выполнение указанного выражения.
  /// Выборки образуют цепочку в порядке добавления.
  pub fn add_resultset(&self, sql: &str, rows: Vec<Vec<Value>>) {
    self.state.lock().scripts.entry(sql.into()).or_insert_with(Vec::new).push(rows);
  }
  /// Устанавливает обработчик, вызываемый при каждом выполнении указанного выражения. Обработчик
  /// выполняется под внутренней блокировкой и не должен обращаться к самой библиотеке.
  pub fn on_execute<F>(&self, sql: &str, hook: F)
    where F: FnMut(&mut ExecContext) + Send + 'static
  {
    self.state.lock().hooks.insert(sql.into(), Box::new(hook));
  }
  /// Следующий вызов указанного примитива завершится указанной ошибкой.
  pub fn fail_next(&self, op: Op, err: DbError) {
    self.state.lock().failures.insert(op, err);
  }

  /// Существует ли хендл.
  pub fn is_alive(&self, handle: NativeHandle) -> bool {
    self.state.lock().handles.contains_key(&handle)
  }
  /// Количество существующих хендлов указанного вида.
  pub fn alive(&self, kind: HandleKind) -> usize {
    self.state.lock().handles.values().filter(|&&k| k == kind).count()
  }
  /// Разрушенные хендлы в порядке разрушения.
  pub fn destroyed(&self) -> Vec<(HandleKind, NativeHandle)> {
    self.state.lock().destroyed.clone()
  }
  /// Снимки всех выполнений.
  pub fn executions(&self) -> Vec<Execution> {
    self.state.lock().executions.clone()
  }
  /// Снимок последнего выполнения.
  pub fn last_execution(&self) -> Option<Execution> {
    self.state.lock().executions.last().cloned()
  }
  /// Параметры переменной, связанной с выражением.
  pub fn bound(&self, stmt: NativeHandle, name: &str) -> Option<BindInfo> {
    let state = self.state.lock();
    state.stmts.get(&stmt)?.binds.iter().find(|(n, _)| n == name).map(|(_, b)| BindInfo {
      ty: b.ty,
      elem_size: b.elem_size,
      elem_count: b.elem_count,
      array_size: b.array_size,
      direction: b.direction,
    })
  }
  /// Количество переменных, связанных с выражением.
  pub fn bind_count(&self, stmt: NativeHandle) -> usize {
    self.state.lock().stmts.get(&stmt).map_or(0, |st| st.binds.len())
  }
  /// Выходные переменные `RETURNING`, зарегистрированные для выражения.
  pub fn registered(&self, stmt: NativeHandle) -> Vec<(String, ValueType, usize)> {
    self.state.lock().stmts.get(&stmt).map_or_else(Vec::new, |st| st.registered.clone())
  }
  /// Текст и режим подготовки выражения.
  pub fn prepared(&self, stmt: NativeHandle) -> Option<(String, PrepareMode)> {
    let state = self.state.lock();
    let st = state.stmts.get(&stmt)?;
    Some((st.sql.clone()?, st.mode?))
  }
  /// Значение атрибута без побочных эффектов.
  pub fn attr(&self, handle: NativeHandle, attr: Attr) -> Option<Value> {
    self.state.lock().attrs.get(&(handle, attr)).cloned()
  }
  /// Количество вызовов прерывания.
  pub fn breaks(&self) -> usize {
    self.state.lock().breaks
  }
}
impl Default for MemoryNative {
  fn default() -> Self { MemoryNative::new() }
}
impl fmt::Debug for MemoryNative {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    let state = self.state.lock();
    fmt.debug_struct("MemoryNative")
       .field("handles", &state.handles.len())
       .field("executions", &state.executions.len())
       .field("server_version", &state.server_version)
       .finish()
  }
}

impl Native for MemoryNative {
  fn create(&self, kind: HandleKind, parent: NativeHandle) -> Option<NativeHandle> {
    let mut state = self.state.lock();
    if !state.begin(Op::Create) {
      return None;
    }
    if !parent.is_null() && !state.handles.contains_key(&parent) {
      return state.fail(DbError::InvalidHandle);
    }
    let handle = state.alloc(kind);
    if kind == HandleKind::Statement {
      state.stmts.insert(handle, Stmt::default());
    }
    Some(handle)
  }
  fn destroy(&self, kind: HandleKind, handle: NativeHandle) -> bool {
    let mut state = self.state.lock();
    if !state.begin(Op::Destroy) {
      return false;
    }
    if state.handles.remove(&handle).is_none() {
      return state.fail::<()>(DbError::InvalidHandle).is_some();
    }
    state.drop_resultsets(handle);
    state.stmts.remove(&handle);
    state.attrs.retain(|&(h, _), _| h != handle);
    state.destroyed.push((kind, handle));
    true
  }
  fn get_attr(&self, handle: NativeHandle, attr: Attr) -> Option<Value> {
    let mut state = self.state.lock();
    if !state.begin(Op::GetAttr) {
      return None;
    }
    if !state.handles.contains_key(&handle) {
      return state.fail(DbError::InvalidHandle);
    }
    if attr == Attr::ServerVersion {
      let banner = format!("Oracle Database Enterprise Edition Release {} - Production", state.server_version);
      return Some(Value::String(banner));
    }
    match state.attrs.get(&(handle, attr)).cloned() {
      Some(value) => Some(value),
      None => state.fail(DbError::fault(24315, "illegal attribute type")),
    }
  }
  fn set_attr(&self, handle: NativeHandle, attr: Attr, value: Value) -> bool {
    let mut state = self.state.lock();
    if !state.begin(Op::SetAttr) {
      return false;
    }
    if !state.handles.contains_key(&handle) {
      return state.fail::<()>(DbError::InvalidHandle).is_some();
    }
    state.attrs.insert((handle, attr), value);
    true
  }

  fn prepare(&self, stmt: NativeHandle, sql: &str, mode: PrepareMode) -> bool {
    let mut state = self.state.lock();
    if !state.begin(Op::Prepare) {
      return false;
    }
    if !state.stmts.contains_key(&stmt) {
      return state.fail::<()>(DbError::InvalidHandle).is_some();
    }
    if sql.trim().is_empty() {
      return state.fail::<()>(DbError::fault(900, "invalid SQL statement")).is_some();
    }
    state.drop_resultsets(stmt);
    state.attrs.remove(&(stmt, Attr::RowCount));
    if let Some(st) = state.stmts.get_mut(&stmt) {
      st.sql = Some(sql.into());
      st.mode = Some(mode);
      st.binds.clear();
      st.registered.clear();
    }
    true
  }
  unsafe fn bind(&self, stmt: NativeHandle, desc: &BindDesc) -> bool {
    let mut state = self.state.lock();
    if !state.begin(Op::Bind) {
      return false;
    }
    if desc.data.is_null() && desc.len() > 0 {
      return state.fail::<()>(DbError::fault(1009, "missing mandatory parameter")).is_some();
    }
    match state.prepared(stmt) {
      Some(st) => {
        let bound = Bound::new(desc);
        match st.binds.iter_mut().find(|(n, _)| n == desc.name) {
          Some(slot) => slot.1 = bound,
          None => st.binds.push((desc.name.to_owned(), bound)),
        }
        true
      },
      None => false,
    }
  }
  fn register(&self, stmt: NativeHandle, name: &str, ty: ValueType, max_len: usize) -> bool {
    let mut state = self.state.lock();
    if !state.begin(Op::Register) {
      return false;
    }
    match state.prepared(stmt) {
      Some(st) => {
        st.registered.retain(|(n, _, _)| n != name);
        st.registered.push((name.to_owned(), ty, max_len));
        true
      },
      None => false,
    }
  }
  fn bind_data_size(&self, stmt: NativeHandle, name: &str, pos: usize) -> Option<usize> {
    let mut state = self.state.lock();
    if !state.begin(Op::DataSize) {
      return None;
    }
    state.bound(stmt, name, pos).map(|b| b.sizes[pos - 1])
  }
  fn set_bind_data_size(&self, stmt: NativeHandle, name: &str, pos: usize, size: usize) -> bool {
    let mut state = self.state.lock();
    if !state.begin(Op::DataSize) {
      return false;
    }
    let fits = match state.bound(stmt, name, pos) {
      Some(b) if size <= b.elem_size => { b.sizes[pos - 1] = size; true },
      Some(_) => false,
      None => return false,
    };
    if !fits {
      state.error = Some(DbError::fault(1460, "unimplemented or unreasonable conversion requested"));
    }
    fits
  }
  fn execute(&self, stmt: NativeHandle, iters: usize) -> bool {
    let mut guard = self.state.lock();
    if !guard.begin(Op::Execute) {
      return false;
    }
    if guard.prepared(stmt).is_none() {
      return false;
    }
    guard.drop_resultsets(stmt);

    let state = &mut *guard;
    let (sql, binds) = match state.stmts.get_mut(&stmt) {
      Some(st) => (st.sql.clone().unwrap_or_default(), &mut st.binds),
      None => return false,
    };
    let snapshot = binds.iter()
      .map(|(name, b)| (name.clone(), (1..=b.elem_count).filter_map(|pos| b.data(pos)).collect()))
      .collect();
    if let Some(hook) = state.hooks.get_mut(&sql) {
      hook(&mut ExecContext { sql: &sql, iters, binds });
    }
    let scripts = state.scripts.get(&sql).cloned().unwrap_or_default();
    let mut handles = Vec::with_capacity(scripts.len());
    for rows in scripts {
      let rs = state.alloc(HandleKind::Resultset);
      state.rsets.insert(rs, Rs { rows, pos: 0 });
      handles.push(rs);
    }
    let affected = if handles.is_empty() { iters } else { 0 };
    if let Some(st) = state.stmts.get_mut(&stmt) {
      st.resultsets = handles;
    }
    state.attrs.insert((stmt, Attr::RowCount), Value::UInt64(affected as u64));
    state.executions.push(Execution { sql, iters, binds: snapshot });
    true
  }

  fn resultset(&self, stmt: NativeHandle) -> Option<NativeHandle> {
    let mut state = self.state.lock();
    if !state.begin(Op::Resultset) {
      return None;
    }
    let st = match state.stmts.get_mut(&stmt) {
      Some(st) => st,
      None => return state.fail(DbError::InvalidHandle),
    };
    let first = st.resultsets.first().copied();
    if first.is_some() {
      st.cursor = Some(0);
    }
    first
  }
  fn next_resultset(&self, stmt: NativeHandle) -> Option<NativeHandle> {
    let mut state = self.state.lock();
    if !state.begin(Op::Resultset) {
      return None;
    }
    let st = match state.stmts.get_mut(&stmt) {
      Some(st) => st,
      None => return state.fail(DbError::InvalidHandle),
    };
    let next = st.cursor.map_or(0, |c| c + 1);
    st.cursor = Some(next.min(st.resultsets.len()));
    st.resultsets.get(next).copied()
  }
  fn fetch(&self, rs: NativeHandle, op: FetchOp) -> bool {
    let mut state = self.state.lock();
    if !state.begin(Op::Fetch) {
      return false;
    }
    match state.rsets.get_mut(&rs) {
      Some(r) => r.fetch(op),
      None => state.fail::<()>(DbError::InvalidHandle).is_some(),
    }
  }
  fn current_row(&self, rs: NativeHandle) -> Option<usize> {
    let state = self.state.lock();
    state.rsets.get(&rs).map(|r| r.pos.min(r.rows.len()))
  }
  fn column_count(&self, rs: NativeHandle) -> Option<usize> {
    let mut state = self.state.lock();
    match state.rsets.get(&rs) {
      Some(r) => Some(r.rows.first().map_or(0, Vec::len)),
      None => state.fail(DbError::InvalidHandle),
    }
  }
  fn column_value(&self, rs: NativeHandle, index: usize) -> Option<Value> {
    let mut state = self.state.lock();
    if !state.begin(Op::ColumnValue) {
      return None;
    }
    let value = match state.rsets.get(&rs) {
      None => Err(DbError::InvalidHandle),
      Some(r) if r.pos < 1 || r.pos > r.rows.len() => Err(DbError::fault(1002, "fetch out of sequence")),
      Some(r) => r.rows[r.pos - 1].get(index.wrapping_sub(1)).cloned()
        .ok_or_else(|| DbError::fault(1007, "variable not in select list")),
    };
    match value {
      Ok(v) => Some(v),
      Err(e) => state.fail(e),
    }
  }

  fn break_call(&self, conn: NativeHandle) -> bool {
    let mut state = self.state.lock();
    if !state.begin(Op::Break) {
      return false;
    }
    if !state.handles.contains_key(&conn) {
      return state.fail::<()>(DbError::InvalidHandle).is_some();
    }
    state.breaks += 1;
    true
  }
  fn take_error(&self) -> Option<DbError> {
    self.state.lock().error.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resultset_cursor() {
    let mut rs = Rs { rows: vec![vec![Value::Int32(1)], vec![Value::Int32(2)]], pos: 0 };
    assert!(rs.fetch(FetchOp::Next));
    assert!(rs.fetch(FetchOp::Next));
    assert!(!rs.fetch(FetchOp::Next));
    assert_eq!(rs.pos, 3);
    assert!(rs.fetch(FetchOp::Prev));
    assert_eq!(rs.pos, 2);
    assert!(rs.fetch(FetchOp::Absolute(1)));
    assert!(!rs.fetch(FetchOp::Relative(5)));
    assert_eq!(rs.pos, 1);
  }

  #[test]
  fn injected_failure_fires_once() {
    let native = MemoryNative::new();
    native.fail_next(Op::Create, DbError::fault(1019, "unable to allocate memory"));
    assert!(native.create(HandleKind::Environment, NativeHandle::null()).is_none());
    assert_eq!(native.take_error().and_then(|e| e.code()), Some(1019));
    assert!(native.create(HandleKind::Environment, NativeHandle::null()).is_some());
    assert!(native.take_error().is_none());
  }

  #[test]
  fn navigation_without_data_is_not_an_error() {
    let native = MemoryNative::new();
    let stmt = native.create(HandleKind::Statement, NativeHandle::null()).expect("Can't create statement");
    assert!(native.prepare(stmt, "begin null; end;", PrepareMode::Prepare));
    assert!(native.execute(stmt, 1));
    assert!(native.resultset(stmt).is_none());
    assert!(native.take_error().is_none());
  }
}
