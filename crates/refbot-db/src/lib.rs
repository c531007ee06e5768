//! # refbot-db
//!
//! Process-wide Postgres pool for refbot.
//!
//! [`PgConnectionPool`] implements [`ConnectionPool`](refbot_proto::ConnectionPool):
//! `init` connects eagerly so an unreachable database fails startup, and
//! `close` may be called any number of times.

mod pool;

pub use pool::{PgConnectionPool, PoolSettings};
