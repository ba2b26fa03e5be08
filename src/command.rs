use std::fmt;

use bytes::Bytes;

use crate::utils::key_hash_slot;

/// A higher-level command submission: a name plus binary-safe arguments.
///
/// The routing slot is derived lazily from the first key argument; commands
/// without keys route to an arbitrary node of the requested role.
#[derive(Clone)]
pub struct Command {
    name: String,
    args: Vec<Bytes>,
}

impl Command {
    pub fn new(name: impl Into<String>, args: Vec<Bytes>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            args,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Hash slot this command routes to, when it carries a key.
    pub fn slot(&self) -> Option<u16> {
        self.first_key().map(key_hash_slot)
    }

    fn first_key(&self) -> Option<&[u8]> {
        first_key_position(&self.name, &self.args).map(|idx| self.args[idx].as_ref())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .collect();
        write!(f, "Command({} {})", self.name, args.join(" "))
    }
}

/// Subscriber-mode transitions a command triggers on its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberMode {
    Enter,
    Exit,
    None,
}

/// Whether the command name is known to the registry.
pub fn exists(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    is_readonly(&upper)
        || matches!(
            upper.as_str(),
            "SET" | "SETNX"
                | "SETEX"
                | "PSETEX"
                | "APPEND"
                | "DEL"
                | "UNLINK"
                | "EXPIRE"
                | "PEXPIRE"
                | "INCR"
                | "DECR"
                | "INCRBY"
                | "DECRBY"
                | "GETSET"
                | "GETDEL"
                | "MSET"
                | "HSET"
                | "HMSET"
                | "HDEL"
                | "HINCRBY"
                | "SADD"
                | "SREM"
                | "SPOP"
                | "SMOVE"
                | "ZADD"
                | "ZREM"
                | "ZINCRBY"
                | "ZPOPMIN"
                | "ZPOPMAX"
                | "LPUSH"
                | "RPUSH"
                | "LPOP"
                | "RPOP"
                | "LSET"
                | "LREM"
                | "LTRIM"
                | "RPOPLPUSH"
                | "XADD"
                | "XDEL"
                | "SETBIT"
                | "SETRANGE"
                | "PFADD"
                | "GEOADD"
                | "PING"
                | "INFO"
                | "CLUSTER"
                | "SUBSCRIBE"
                | "UNSUBSCRIBE"
                | "PSUBSCRIBE"
                | "PUNSUBSCRIBE"
                | "SSUBSCRIBE"
                | "SUNSUBSCRIBE"
                | "PUBLISH"
                | "EVAL"
                | "EVALSHA"
                | "MULTI"
                | "EXEC"
                | "DISCARD"
                | "FLUSHALL"
                | "FLUSHDB"
        )
}

/// Whether a command may be served by a replica.
pub fn is_readonly(name: &str) -> bool {
    matches!(
        name.to_ascii_uppercase().as_str(),
        "GET" | "MGET"
            | "EXISTS"
            | "TYPE"
            | "TTL"
            | "PTTL"
            | "STRLEN"
            | "GETRANGE"
            | "SUBSTR"
            | "KEYS"
            | "SCAN"
            | "RANDOMKEY"
            | "HGET"
            | "HMGET"
            | "HGETALL"
            | "HKEYS"
            | "HVALS"
            | "HLEN"
            | "HEXISTS"
            | "HSCAN"
            | "HRANDFIELD"
            | "HSTRLEN"
            | "LRANGE"
            | "LLEN"
            | "LINDEX"
            | "LPOS"
            | "SMEMBERS"
            | "SCARD"
            | "SISMEMBER"
            | "SMISMEMBER"
            | "SRANDMEMBER"
            | "SSCAN"
            | "SUNION"
            | "SINTER"
            | "SDIFF"
            | "ZRANGE"
            | "ZRANGEBYSCORE"
            | "ZRANGEBYLEX"
            | "ZREVRANGE"
            | "ZREVRANGEBYSCORE"
            | "ZREVRANGEBYLEX"
            | "ZCARD"
            | "ZSCORE"
            | "ZMSCORE"
            | "ZCOUNT"
            | "ZLEXCOUNT"
            | "ZRANK"
            | "ZREVRANK"
            | "ZRANDMEMBER"
            | "ZSCAN"
            | "XRANGE"
            | "XREVRANGE"
            | "XLEN"
            | "XREAD"
            | "XINFO"
            | "BITCOUNT"
            | "BITPOS"
            | "GETBIT"
            | "PFCOUNT"
            | "GEODIST"
            | "GEOHASH"
            | "GEOPOS"
            | "GEOSEARCH"
            | "DUMP"
            | "MEMORY"
            | "OBJECT"
            | "TOUCH"
    )
}

/// Subscriber-mode classification, mirroring the enter/exit flag tables of
/// the command registry.
pub fn subscriber_mode(name: &str) -> SubscriberMode {
    match name.to_ascii_uppercase().as_str() {
        "SUBSCRIBE" | "PSUBSCRIBE" | "SSUBSCRIBE" => SubscriberMode::Enter,
        "UNSUBSCRIBE" | "PUNSUBSCRIBE" | "SUNSUBSCRIBE" => SubscriberMode::Exit,
        _ => SubscriberMode::None,
    }
}

/// Index of the first key argument, or `None` for keyless commands.
fn first_key_position(name: &str, args: &[Bytes]) -> Option<usize> {
    if args.is_empty() {
        return None;
    }
    match name.to_ascii_uppercase().as_str() {
        "PING" | "INFO" | "DBSIZE" | "CLUSTER" | "CONFIG" | "CLIENT" | "COMMAND" | "TIME"
        | "RANDOMKEY" | "WAIT" | "SCAN" | "SCRIPT" | "SUBSCRIBE" | "UNSUBSCRIBE" | "PSUBSCRIBE"
        | "PUNSUBSCRIBE" | "SSUBSCRIBE" | "SUNSUBSCRIBE" | "MULTI" | "EXEC" | "DISCARD"
        | "FLUSHALL" | "FLUSHDB" | "QUIT" => None,
        // key follows the numkeys argument when numkeys > 0
        "EVAL" | "EVALSHA" => {
            let numkeys = std::str::from_utf8(args.get(1)?).ok()?.parse::<usize>().ok()?;
            if numkeys > 0 && args.len() > 2 {
                Some(2)
            } else {
                None
            }
        }
        // key follows the STREAMS keyword
        "XREAD" | "XREADGROUP" => args
            .iter()
            .position(|arg| arg.eq_ignore_ascii_case(b"STREAMS"))
            .filter(|idx| idx + 1 < args.len())
            .map(|idx| idx + 1),
        _ => Some(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(name: &str, args: &[&str]) -> Command {
        Command::new(name, args.iter().map(|a| Bytes::copy_from_slice(a.as_bytes())).collect())
    }

    #[test]
    fn slot_of_keyed_command() {
        assert_eq!(cmd("GET", &["foo"]).slot(), Some(12182));
    }

    #[test]
    fn keyless_commands_have_no_slot() {
        assert_eq!(cmd("PING", &[]).slot(), None);
        assert_eq!(cmd("INFO", &["server"]).slot(), None);
    }

    #[test]
    fn eval_key_follows_numkeys() {
        assert_eq!(
            cmd("EVAL", &["return 1", "1", "foo"]).slot(),
            cmd("GET", &["foo"]).slot()
        );
        assert_eq!(cmd("EVAL", &["return 1", "0"]).slot(), None);
    }

    #[test]
    fn xread_key_follows_streams_keyword() {
        assert_eq!(
            cmd("XREAD", &["COUNT", "2", "STREAMS", "foo", "0"]).slot(),
            Some(12182)
        );
    }

    #[test]
    fn readonly_classification() {
        assert!(is_readonly("get"));
        assert!(is_readonly("ZSCORE"));
        assert!(!is_readonly("set"));
        assert!(!is_readonly("nosuchcommand"));
    }

    #[test]
    fn subscriber_mode_tables() {
        assert_eq!(subscriber_mode("subscribe"), SubscriberMode::Enter);
        assert_eq!(subscriber_mode("PSUBSCRIBE"), SubscriberMode::Enter);
        assert_eq!(subscriber_mode("unsubscribe"), SubscriberMode::Exit);
        assert_eq!(subscriber_mode("get"), SubscriberMode::None);
    }
}
