#![allow(dead_code)]

pub mod fake_ftp;

use ftpin_core::session::SessionOptions;

pub fn options() -> SessionOptions {
    let mut o = SessionOptions::new("127.0.0.1");
    o.user = Some("scott".to_string());
    o.password = Some("tiger".to_string());
    o
}
