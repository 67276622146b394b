use std::thread;

use oci_core::HandleHolder;
use oci_core::types::{CreateMode, HandleKind};

mod utils;

#[test]
fn cleanup_releases_children_before_parents() {
  let (native, mut env, conn) = utils::setup();
  native.add_resultset("select 1 from dual", vec![vec![1i32.into()]]);

  let mut stmt = conn.statement().expect("Can't create statement");
  stmt.execute("select 1 from dual").expect("Can't execute statement");
  let rs = stmt.resultset().expect("Can't get resultset").expect("Resultset must exist");
  let lob = env.allocate(HandleKind::Lob, Some(conn.handle())).expect("Can't allocate LOB handle");

  let (e, c, s, l) = (env.native(), conn.native(), stmt.native(), lob.native());
  env.cleanup();

  assert_eq!(native.destroyed(), vec![
    (HandleKind::Statement, s),
    (HandleKind::Lob, l),
    (HandleKind::Connection, c),
    (HandleKind::Environment, e),
  ]);
  // Все обертки видят освобожденные хендлы
  assert!(env.is_released());
  assert!(conn.is_released());
  assert!(stmt.is_released());
  assert!(rs.is_released());
  assert!(lob.is_null());
  assert!(env.env().store().is_empty());

  // Повторная очистка ничего не делает
  env.cleanup();
  drop((stmt, conn, rs, lob));
  assert_eq!(native.destroyed().len(), 4);
}

#[test]
fn released_objects_report_null_handle() {
  let (_, mut env, conn) = utils::setup();
  let stmt = conn.prepare("select * from dual").expect("Can't prepare statement");
  env.cleanup();

  assert!(conn.statement().is_err());
  assert!(stmt.bind_count().is_err());
  assert!(conn.server_version().is_err());
  let err = conn.break_call().expect_err("Connection is already released");
  assert_eq!(err.to_string(), "required Connection handle is null or already released");
}

#[test]
fn handle_lives_while_any_copy_is_alive() {
  let (native, env, conn) = utils::setup();
  let copy = conn.clone();
  let h = conn.native();
  assert_eq!(conn.handle().holders(), 2);
  assert_eq!(conn.handle().parent_native(), env.native());

  drop(conn);
  assert!(native.is_alive(h));
  assert!(!copy.is_released());

  drop(copy);
  assert!(!native.is_alive(h));
  assert_eq!(native.destroyed(), vec![(HandleKind::Connection, h)]);
  assert_eq!(env.handle().children_count(), 0);
}

#[test]
fn statement_keeps_connection_alive() {
  let (native, _env, conn) = utils::setup();
  let stmt = conn.statement().expect("Can't create statement");
  let (c, s) = (conn.native(), stmt.native());
  drop(conn);
  assert!(native.is_alive(c));
  assert_eq!(stmt.connection().native(), c);

  drop(stmt);
  assert_eq!(native.destroyed(), vec![(HandleKind::Statement, s), (HandleKind::Connection, c)]);
}

#[test]
fn dropping_statement_frees_its_binds() {
  use oci_core::convert::HostVar;
  use oci_core::types::Direction;

  let (native, _env, conn) = utils::setup();
  let mut stmt = conn.prepare("insert into t values (:a, :b)").expect("Can't prepare statement");
  stmt.bind(":a", &HostVar::new(1i32), Direction::In).expect("Can't bind :a");
  stmt.bind(":b", &HostVar::new("x".to_owned()), Direction::In).expect("Can't bind :b");
  let s = stmt.native();
  assert_eq!(native.bind_count(s), 2);

  drop(stmt);
  assert!(!native.is_alive(s));
  assert_eq!(native.bind_count(s), 0);
}

#[test]
fn failed_allocation_leaves_nothing_behind() {
  use oci_core::error::{DbError, ErrorKind};
  use oci_core::ffi::memory::Op;

  let (native, env, _conn) = utils::setup();
  native.fail_next(Op::Create, DbError::fault(1019, "unable to allocate memory in the user side"));
  let err = env.allocate(HandleKind::Object, None).expect_err("Allocation must fail");
  assert_eq!(err.kind(), ErrorKind::ExternalOperation);
  assert_eq!(native.alive(HandleKind::Object), 0);
  assert_eq!(env.handle().children_count(), 1);
}

#[test]
fn native_destroy_is_called_once_for_all_copies() {
  let (native, env, _conn) = utils::setup();
  let mut first = env.allocate(HandleKind::Object, None).expect("Can't allocate handle");
  let second = first.clone();
  let h = first.native();
  assert_eq!(second.holders(), 2);

  first.release();
  assert!(first.is_null());
  assert!(native.is_alive(h));
  assert!(native.destroyed().is_empty());

  drop(second);
  assert_eq!(native.destroyed(), vec![(HandleKind::Object, h)]);
}

#[test]
fn last_copy_may_be_dropped_on_another_thread() {
  let (native, env) = utils::env(CreateMode::Threaded);
  let conn = utils::connect(&env);
  let h = conn.native();
  let copy = conn.clone();

  let worker = thread::spawn(move || {
    assert_eq!(copy.native(), h);
    assert!(copy.server_version().is_ok());
    drop(copy);
  });
  drop(conn);
  worker.join().expect("Thread panicked");

  let destroyed: Vec<_> = native.destroyed().into_iter().filter(|&(_, n)| n == h).collect();
  assert_eq!(destroyed, vec![(HandleKind::Connection, h)]);
  assert!(!native.is_alive(h));
  assert!(!env.is_released());
}
