//! Caller-Facing Command Surface
//!
//! A [`Resource`] is the bridge as seen by one calling module. Every command
//! is exposed twice:
//!
//! ```text
//! resource.get("key", |value, err| ...)   callback style, never fails
//! resource.get_async("key").await?        awaited, returns the error
//! ```
//!
//! Both go through the resource's transaction session, so while a
//! transaction is open they queue instead of executing and report
//! `"QUEUED"`.
//!
//! Hosts that look commands up by export name use [`resolve_export`], which
//! understands the plain, `_async` and deprecated `Sync` spellings.

use crate::bridge::{with_callback, Callback, Dispatcher, Reply, Session, MULTI_EXEC_LABEL};
use crate::commands::CommandDescriptor;
use crate::error::Result;
use crate::profiler::Sample;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Values accepted as command arguments. Sequences are spread into
/// separate arguments and `None` adds nothing.
pub trait IntoArgs {
    fn push_into(self, args: &mut Vec<Value>);
}

macro_rules! scalar_args {
    ($($ty:ty),*) => {
        $(
            impl IntoArgs for $ty {
                fn push_into(self, args: &mut Vec<Value>) {
                    args.push(Value::from(self));
                }
            }
        )*
    };
}

scalar_args!(&str, String, i32, i64, u32, u64, f64, bool, Value);

impl IntoArgs for &String {
    fn push_into(self, args: &mut Vec<Value>) {
        args.push(Value::from(self.as_str()));
    }
}

impl<T: IntoArgs> IntoArgs for Option<T> {
    fn push_into(self, args: &mut Vec<Value>) {
        if let Some(value) = self {
            value.push_into(args);
        }
    }
}

impl<T: IntoArgs> IntoArgs for Vec<T> {
    fn push_into(self, args: &mut Vec<Value>) {
        for value in self {
            value.push_into(args);
        }
    }
}

impl<T: IntoArgs, const N: usize> IntoArgs for [T; N] {
    fn push_into(self, args: &mut Vec<Value>) {
        for value in self {
            value.push_into(args);
        }
    }
}

/// The command surface for one caller.
#[derive(Clone)]
pub struct Resource {
    session: Arc<Session>,
    dispatcher: Arc<Dispatcher>,
}

impl Resource {
    pub fn new(caller: Arc<str>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            session: Arc::new(Session::new(caller, Arc::clone(&dispatcher))),
            dispatcher,
        }
    }

    pub fn caller(&self) -> &str {
        self.session.caller()
    }

    /// This caller's transaction session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_ready(&self) -> bool {
        self.dispatcher.connection().is_ready()
    }

    /// Waits until the shared connection exists.
    pub async fn await_connection(&self) -> bool {
        self.dispatcher.connection().wait_until_ready().await;
        true
    }

    /// Queue-or-run is settled in the calling frame, before the task spawns.
    fn dispatch(&self, descriptor: CommandDescriptor, callback: impl Callback) -> JoinHandle<()> {
        match self.session.try_queue(descriptor) {
            Some(descriptor) => {
                let session = Arc::clone(&self.session);
                with_callback(async move { session.run(descriptor).await }, callback)
            }
            None => {
                let queued: Result<Value> = Ok(Reply::Queued.into_value());
                with_callback(async move { queued }, callback)
            }
        }
    }

    async fn dispatch_async(&self, descriptor: CommandDescriptor) -> Result<Value> {
        self.session.execute(descriptor).await.map(Reply::into_value)
    }

    /// Runs any descriptor: typed when the table knows it, raw otherwise.
    pub async fn command_async(&self, descriptor: CommandDescriptor) -> Result<Value> {
        self.dispatch_async(descriptor).await
    }

    /// Sends `command` verbatim, bypassing the typed command table.
    pub fn raw(&self, command: &str, args: Vec<Value>, callback: impl Callback) -> JoinHandle<()> {
        self.dispatch(CommandDescriptor::raw(command, args), callback)
    }

    pub async fn raw_async(&self, command: &str, args: Vec<Value>) -> Result<Value> {
        self.dispatch_async(CommandDescriptor::raw(command, args)).await
    }

    /// Runs `{command, args}` entries as one MULTI/EXEC batch. The callback
    /// receives the results as an array.
    pub fn multi(&self, commands: Vec<Value>, callback: impl Callback) -> JoinHandle<()> {
        let resource = self.clone();
        with_callback(
            async move { resource.multi_async(commands).await.map(Value::Array) },
            callback,
        )
    }

    pub async fn multi_async(&self, commands: Vec<Value>) -> Result<Vec<Value>> {
        let batch = match CommandDescriptor::batch_from_json(&commands) {
            Ok(batch) => batch,
            Err(e) => {
                self.dispatcher.profiler().record_error(
                    Sample {
                        caller: self.caller(),
                        command: MULTI_EXEC_LABEL,
                        args: &commands,
                        latency_ms: 0.0,
                    },
                    &e,
                );
                return Err(e);
            }
        };
        self.dispatcher.execute_batch(self.caller(), &batch).await
    }

    /// `SRANDMEMBER key [count]`.
    pub fn srandmember(
        &self,
        key: impl IntoArgs,
        count: Option<i64>,
        callback: impl Callback,
    ) -> JoinHandle<()> {
        self.dispatch(srandmember_descriptor(key, count), callback)
    }

    pub async fn srandmember_async(&self, key: impl IntoArgs, count: Option<i64>) -> Result<Value> {
        self.dispatch_async(srandmember_descriptor(key, count)).await
    }
}

fn srandmember_descriptor(key: impl IntoArgs, count: Option<i64>) -> CommandDescriptor {
    let mut args = Vec::new();
    key.push_into(&mut args);
    match count {
        Some(count) => {
            args.push(Value::from(count));
            CommandDescriptor::new("SRANDMEMBERCOUNT", args)
        }
        None => CommandDescriptor::new("SRANDMEMBER", args),
    }
}

macro_rules! command_pairs {
    ($( $name:ident, $async_name:ident => $command:literal ( $($arg:ident : $ty:ty),* ); )*) => {
        impl Resource {
            $(
                #[doc = concat!("`", $command, "`, reporting to `callback`.")]
                pub fn $name(&self, $($arg: $ty,)* callback: impl Callback) -> JoinHandle<()> {
                    #[allow(unused_mut)]
                    let mut args = Vec::new();
                    $( $arg.push_into(&mut args); )*
                    self.dispatch(CommandDescriptor::new($command, args), callback)
                }

                #[doc = concat!("`", $command, "`, awaited.")]
                pub async fn $async_name(&self, $($arg: $ty),*) -> Result<Value> {
                    #[allow(unused_mut)]
                    let mut args = Vec::new();
                    $( $arg.push_into(&mut args); )*
                    self.dispatch_async(CommandDescriptor::new($command, args)).await
                }
            )*
        }
    };
}

command_pairs! {
    // String commands
    get, get_async => "GET" (key: impl IntoArgs);
    set, set_async => "SET" (key: impl IntoArgs, value: impl IntoArgs, options: Option<Value>);
    del, del_async => "DEL" (keys: impl IntoArgs);
    exists, exists_async => "EXISTS" (keys: impl IntoArgs);
    expire, expire_async => "EXPIRE" (key: impl IntoArgs, seconds: i64);
    ttl, ttl_async => "TTL" (key: impl IntoArgs);
    incr, incr_async => "INCR" (key: impl IntoArgs);
    incrby, incrby_async => "INCRBY" (key: impl IntoArgs, increment: i64);
    decr, decr_async => "DECR" (key: impl IntoArgs);
    decrby, decrby_async => "DECRBY" (key: impl IntoArgs, decrement: i64);
    mget, mget_async => "MGET" (keys: impl IntoArgs);
    mset, mset_async => "MSET" (pairs: Value);

    // Hash commands
    hget, hget_async => "HGET" (key: impl IntoArgs, field: impl IntoArgs);
    hset, hset_async => "HSET" (key: impl IntoArgs, field: impl IntoArgs, value: impl IntoArgs);
    hmset, hmset_async => "HSET" (key: impl IntoArgs, fields: Value);
    hgetall, hgetall_async => "HGETALL" (key: impl IntoArgs);
    hdel, hdel_async => "HDEL" (key: impl IntoArgs, fields: impl IntoArgs);
    hincrby, hincrby_async => "HINCRBY" (key: impl IntoArgs, field: impl IntoArgs, increment: i64);
    hexists, hexists_async => "HEXISTS" (key: impl IntoArgs, field: impl IntoArgs);
    hkeys, hkeys_async => "HKEYS" (key: impl IntoArgs);
    hvals, hvals_async => "HVALS" (key: impl IntoArgs);
    hlen, hlen_async => "HLEN" (key: impl IntoArgs);

    // List commands
    lpush, lpush_async => "LPUSH" (key: impl IntoArgs, values: impl IntoArgs);
    rpush, rpush_async => "RPUSH" (key: impl IntoArgs, values: impl IntoArgs);
    lpop, lpop_async => "LPOP" (key: impl IntoArgs);
    rpop, rpop_async => "RPOP" (key: impl IntoArgs);
    lrange, lrange_async => "LRANGE" (key: impl IntoArgs, start: i64, stop: i64);
    llen, llen_async => "LLEN" (key: impl IntoArgs);
    lindex, lindex_async => "LINDEX" (key: impl IntoArgs, index: i64);
    lset, lset_async => "LSET" (key: impl IntoArgs, index: i64, value: impl IntoArgs);
    lrem, lrem_async => "LREM" (key: impl IntoArgs, count: i64, value: impl IntoArgs);

    // Set commands
    sadd, sadd_async => "SADD" (key: impl IntoArgs, members: impl IntoArgs);
    srem, srem_async => "SREM" (key: impl IntoArgs, members: impl IntoArgs);
    smembers, smembers_async => "SMEMBERS" (key: impl IntoArgs);
    sismember, sismember_async => "SISMEMBER" (key: impl IntoArgs, member: impl IntoArgs);
    scard, scard_async => "SCARD" (key: impl IntoArgs);
    spop, spop_async => "SPOP" (key: impl IntoArgs);

    // Sorted set commands
    zadd, zadd_async => "ZADD" (key: impl IntoArgs, members: Value, options: Option<Value>);
    zrange, zrange_async => "ZRANGE" (key: impl IntoArgs, start: i64, stop: i64);
    zrange_with_scores, zrange_with_scores_async => "ZRANGEWITHSCORES" (key: impl IntoArgs, start: i64, stop: i64);
    zrem, zrem_async => "ZREM" (key: impl IntoArgs, members: impl IntoArgs);
    zscore, zscore_async => "ZSCORE" (key: impl IntoArgs, member: impl IntoArgs);
    zrank, zrank_async => "ZRANK" (key: impl IntoArgs, member: impl IntoArgs);
    zcard, zcard_async => "ZCARD" (key: impl IntoArgs);
    zincrby, zincrby_async => "ZINCRBY" (key: impl IntoArgs, increment: f64, member: impl IntoArgs);

    // Key commands
    keys, keys_async => "KEYS" (pattern: impl IntoArgs);
    scan, scan_async => "SCAN" (cursor: u64, options: Option<Value>);
    key_type, key_type_async => "TYPE" (key: impl IntoArgs);
    rename, rename_async => "RENAME" (key: impl IntoArgs, new_key: impl IntoArgs);
    persist, persist_async => "PERSIST" (key: impl IntoArgs);
    pttl, pttl_async => "PTTL" (key: impl IntoArgs);
    expireat, expireat_async => "EXPIREAT" (key: impl IntoArgs, timestamp: i64);

    // Server commands
    ping, ping_async => "PING" ();
    flushdb, flushdb_async => "FLUSHDB" ();
    dbsize, dbsize_async => "DBSIZE" ();
    info, info_async => "INFO" (section: Option<Value>);
}

/// Every export a host may look up, in their host-facing spelling.
pub const EXPORTS: &[&str] = &[
    "isReady", "awaitConnection",
    "get", "set", "del", "exists", "expire", "ttl", "incr", "incrby", "decr", "decrby", "mget", "mset",
    "hget", "hset", "hmset", "hgetall", "hdel", "hincrby", "hexists", "hkeys", "hvals", "hlen",
    "lpush", "rpush", "lpop", "rpop", "lrange", "llen", "lindex", "lset", "lrem",
    "sadd", "srem", "smembers", "sismember", "scard", "spop", "srandmember",
    "zadd", "zrange", "zrangeWithScores", "zrem", "zscore", "zrank", "zcard", "zincrby",
    "multi",
    "keys", "scan", "type", "rename", "persist", "pttl", "expireat",
    "ping", "flushdb", "dbsize", "info",
    "raw",
];

/// How an export delivers its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    /// Plain name, trailing callback.
    Callback,
    /// `name_async`, awaited.
    Async,
    /// `nameSync`, an old spelling of `name_async`.
    DeprecatedSync,
}

impl Convention {
    pub fn is_async(self) -> bool {
        !matches!(self, Convention::Callback)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Export {
    pub name: &'static str,
    pub convention: Convention,
}

/// Maps an export name such as `getSync` to its base export and calling
/// convention. Unknown names resolve to `None`.
pub fn resolve_export(name: &str) -> Option<Export> {
    let (base, convention) = if let Some(base) = name.strip_suffix("_async") {
        (base, Convention::Async)
    } else if let Some(base) = name.strip_suffix("Sync") {
        (base, Convention::DeprecatedSync)
    } else {
        (name, Convention::Callback)
    };

    EXPORTS
        .iter()
        .find(|export| **export == base)
        .map(|export| Export {
            name: export,
            convention,
        })
}
