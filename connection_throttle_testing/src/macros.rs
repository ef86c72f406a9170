//! Assertion macros shared by integration tests.

/// Await a connection future and panic with contextual diagnostics on failure.
#[macro_export]
macro_rules! connect_expect {
    ($fut:expr) => {{
        $fut.await
            .expect(concat!("connect failed at ", file!(), ":", line!()))
    }};
    ($fut:expr, $msg:expr) => {{
        let m = ::std::format!("{msg} at {}:{}", file!(), line!(), msg = $msg);
        $fut.await.expect(&m)
    }};
}

/// Await a connection future that must fail and return its error.
#[macro_export]
macro_rules! connect_expect_err {
    ($fut:expr) => {{
        match $fut.await {
            Ok(()) => panic!(concat!("connect unexpectedly succeeded at ", file!(), ":", line!())),
            Err(error) => error,
        }
    }};
}

pub use crate::{connect_expect, connect_expect_err};
