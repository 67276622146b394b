use std::sync::Arc;
use std::thread;
use std::time::Duration;

use oci_core::HandleHolder;
use oci_core::convert::Value;
use oci_core::ffi::SyncMode;
use oci_core::params::{ConnectParams, Credentials, InitParams, Timeouts};
use oci_core::types::{Attr, CreateMode, FailoverEvent, FailoverReply};
use oci_core::version::Version;

mod utils;

#[test]
fn sync_mode_follows_create_mode() {
  for &(mode, expected) in &[(CreateMode::Default, SyncMode::Unsafe), (CreateMode::Threaded, SyncMode::Safe)] {
    let (_, mut env) = utils::env(mode);
    assert_eq!(env.sync_mode(), expected, "CreateMode={:?}", mode);
    assert_eq!(env.callbacks().mode(), expected);
    env.cleanup();
    assert_eq!(env.sync_mode(), SyncMode::Unsafe);
  }
}

#[test]
fn registry_roundtrip_in_both_modes() {
  for &mode in &[CreateMode::Default, CreateMode::Threaded] {
    let (_, mut env) = utils::env(mode);
    let conn = utils::connect(&env);
    let key = conn.native();

    env.callbacks().set(key, Some(42u32));
    assert_eq!(env.callbacks().get::<u32>(key).map(|v| *v), Some(42));
    // Запись другого типа не видна
    assert!(env.callbacks().get::<String>(key).is_none());

    env.callbacks().set(key, Some(String::from("replaced")));
    assert_eq!(env.callbacks().len(), 1);
    assert_eq!(env.callbacks().get::<String>(key).map(|v| (*v).clone()), Some("replaced".to_owned()));

    env.cleanup();
    assert!(env.callbacks().is_empty());
    assert!(env.callbacks().get::<String>(key).is_none());
  }
}

#[test]
fn registry_ignores_null_handle() {
  use oci_core::ffi::NativeHandle;

  let (_, env) = utils::env(CreateMode::default());
  env.callbacks().set(NativeHandle::null(), Some(1u8));
  assert!(env.callbacks().is_empty());
  assert!(env.callbacks().get::<u8>(NativeHandle::null()).is_none());
  assert!(!env.callbacks().remove(NativeHandle::null()));
}

#[test]
fn threaded_registry_is_shared_between_threads() {
  let (_, env) = utils::env(CreateMode::Threaded);
  let env = Arc::new(env);
  let handles: Vec<_> = (0..4).map(|_| utils::connect(&env)).collect();

  let threads: Vec<_> = handles.iter().enumerate().map(|(i, conn)| {
    let env = env.clone();
    let key = conn.native();
    thread::spawn(move || {
      for n in 0..100 {
        env.callbacks().set(key, Some(i * 1000 + n));
        assert!(env.callbacks().get::<usize>(key).is_some());
      }
    })
  }).collect();
  for t in threads {
    t.join().expect("Thread panicked");
  }

  assert_eq!(env.callbacks().len(), 4);
  for (i, conn) in handles.iter().enumerate() {
    assert_eq!(env.callbacks().get::<usize>(conn.native()).map(|v| *v), Some(i * 1000 + 99));
  }
  assert_eq!(env.env().guard().contended(), 0);
}

#[test]
fn failover_handler_is_called_and_unregistered_with_connection() {
  let (_, env, conn) = utils::setup();
  let key = conn.native();
  conn.set_failover_handler(Some(|event: FailoverEvent| match event {
    FailoverEvent::Error => FailoverReply::Retry,
    _ => FailoverReply::Ok,
  })).expect("Can't set failover handler");

  assert_eq!(env.notify_failover(key, FailoverEvent::Error), FailoverReply::Retry);
  assert_eq!(env.notify_failover(key, FailoverEvent::End), FailoverReply::Ok);
  assert_eq!(env.callbacks().len(), 1);

  drop(conn);
  assert!(env.callbacks().is_empty());
  assert_eq!(env.notify_failover(key, FailoverEvent::Error), FailoverReply::Ok);
}

#[test]
fn failover_handler_can_be_removed() {
  let (_, env, conn) = utils::setup();
  conn.set_failover_handler(Some(|_: FailoverEvent| FailoverReply::Retry)).expect("Can't set failover handler");
  conn.set_failover_handler(None::<fn(FailoverEvent) -> FailoverReply>).expect("Can't remove failover handler");
  assert!(env.callbacks().is_empty());
  assert_eq!(env.notify_failover(conn.native(), FailoverEvent::Begin), FailoverReply::Ok);
}

#[test]
fn connect_sets_credentials_and_timeouts() {
  let (native, env) = utils::env(CreateMode::default());
  let mut params = ConnectParams::rdbms("localhost/xe", "scott", "tiger");
  params.timeouts = Timeouts {
    call: Some(Duration::from_millis(1500)),
    send: None,
    receive: Some(Duration::from_secs(3)),
  };
  let conn = env.connect(params).expect("Can't connect");
  let h = conn.native();

  assert_eq!(native.attr(h, Attr::DbLink), Some(Value::from("localhost/xe")));
  assert_eq!(native.attr(h, Attr::Username), Some(Value::from("scott")));
  assert_eq!(native.attr(h, Attr::Password), Some(Value::from("tiger")));
  assert_eq!(native.attr(h, Attr::CallTimeout), Some(Value::UInt64(1500)));
  assert_eq!(native.attr(h, Attr::SendTimeout), None);
  assert_eq!(native.attr(h, Attr::ReceiveTimeout), Some(Value::UInt64(3000)));
}

#[test]
fn external_credentials() {
  let (native, env) = utils::env(CreateMode::default());
  let params = ConnectParams { dblink: "".into(), credentials: Credentials::Ext, timeouts: Timeouts::default() };
  let conn = env.connect(params).expect("Can't connect with external credentials");
  assert_eq!(native.attr(conn.native(), Attr::ExternalAuth), Some(Value::Bool(true)));
  assert_eq!(native.attr(conn.native(), Attr::Username), None);
}

#[test]
fn server_version_is_parsed_from_banner() {
  let (native, _env, conn) = utils::setup();
  assert_eq!(conn.server_version().expect("Can't get server version"), "19.3.0.0.0".parse::<Version>().expect("Can't parse version"));
  native.set_server_version("11.2.0.4.0");
  let version = conn.server_version().expect("Can't get server version");
  assert!(version >= Version::minor(11, 2));
  assert!(version < Version::major(12));
}

#[test]
fn break_is_forwarded() {
  let (native, _env, conn) = utils::setup();
  conn.break_call().expect("Can't break call");
  conn.break_call().expect("Can't break call");
  assert_eq!(native.breaks(), 2);
}

#[test]
fn init_params_limit_binds() {
  use oci_core::Environment;
  use oci_core::convert::HostVar;
  use oci_core::error::ErrorKind;
  use oci_core::ffi::memory::MemoryNative;
  use oci_core::types::Direction;

  let native = Arc::new(MemoryNative::new());
  let env = Environment::new(native, InitParams { max_binds: 2, ..Default::default() }).expect("Can't create environment");
  let conn = utils::connect(&env);
  let mut stmt = conn.prepare("insert into t values (:1, :2, :3)").expect("Can't prepare statement");
  let var = HostVar::new(0i64);
  stmt.bind(1usize, &var, Direction::In).expect("Can't bind :1");
  stmt.bind(2usize, &var, Direction::In).expect("Can't bind :2");
  let err = stmt.bind(3usize, &var, Direction::In).expect_err("Bind limit must be enforced");
  assert_eq!(err.kind(), ErrorKind::Bounds);
  assert_eq!(stmt.bind_names().expect("Can't get bind names"), vec![":1".to_owned(), ":2".to_owned()]);
}
