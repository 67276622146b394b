//! Общие функции интеграционных тестов.
#![allow(dead_code)]

use std::sync::Arc;

use oci_core::{Connection, Environment};
use oci_core::ffi::memory::MemoryNative;
use oci_core::params::ConnectParams;
use oci_core::types::CreateMode;

/// Нативная библиотека в памяти и окружение над ней.
pub fn env(mode: CreateMode) -> (Arc<MemoryNative>, Environment) {
  let native = Arc::new(MemoryNative::new());
  let env = Environment::new(native.clone(), mode)
    .expect(format!("Can't create environment with CreateMode={:?}", mode).as_str());
  (native, env)
}

pub fn connect(env: &Environment) -> Connection {
  env.connect(ConnectParams::rdbms("localhost/xe", "scott", "tiger")).expect("Can't connect to database")
}

/// Окружение по умолчанию вместе с соединением.
pub fn setup() -> (Arc<MemoryNative>, Environment, Connection) {
  let (native, env) = env(CreateMode::default());
  let conn = connect(&env);
  (native, env, conn)
}
